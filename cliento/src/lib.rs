pub mod config;
pub mod error;
pub mod logging;
pub mod plugins;
pub mod storage;
pub mod sync;
pub mod updater;

use crate::config::ClientConfig;
use crate::storage::LocalStore;
use crate::updater::{Updater, WsExchange};

/// Exit status asking the supervisor to start the client again.
pub const RESTART_EXIT_CODE: i32 = 3;

/// Brings the core bundle and then every plugin up to date, each over its
/// own connection. Returns true when freshly installed files need a restart.
/// Unreachable servers are logged and leave the install as it is.
pub async fn run_updates(config: &ClientConfig, store: &LocalStore) -> bool {
    let mut restart = false;

    match WsExchange::connect(&config.server_url).await {
        Ok(exchange) => {
            let mut updater = Updater::new(exchange, store.clone(), config.dev_mode);
            restart |= updater.check_and_update().await;
            updater.into_exchange().close().await;
        }
        Err(e) => log::warn!("Skipping core update: {}", e),
    }

    match WsExchange::connect(&config.server_url).await {
        Ok(exchange) => {
            let mut updater = Updater::new(exchange, store.clone(), config.dev_mode);
            restart |= updater.check_and_update_plugins().await;
            updater.into_exchange().close().await;
        }
        Err(e) => log::warn!("Skipping plugin update: {}", e),
    }

    restart
}
