use std::path::PathBuf;

use cliento::config::ClientConfig;
use cliento::plugins::PluginRegistry;
use cliento::storage::LocalStore;
use cliento::sync::{AgentEvent, SyncAgent};

#[tokio::main]
async fn main() {
    let root = PathBuf::from(std::env::var("CLIENTO_ROOT").unwrap_or_else(|_| ".".to_string()));
    cliento::logging::init(&root.join("logs"));

    let config = ClientConfig::load(&root);
    let store = LocalStore::new(root);
    log::info!("Server: {} (dev mode: {})", config.server_url, config.dev_mode);

    if cliento::run_updates(&config, &store).await {
        log::info!("Update installed, restart required");
        std::process::exit(cliento::RESTART_EXIT_CODE);
    }

    let plugins = PluginRegistry::with_defaults(store.clone());
    let (agent, mut events) = SyncAgent::new(&config.server_url, store, plugins);
    let handle = agent.start();

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(AgentEvent::Error(message)) => log::warn!("{}", message),
                Some(event) => log::info!("{:?}", event),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                log::info!("Shutting down");
                break;
            }
        }
    }

    agent.shutdown().await;
    let _ = handle.await;
}
