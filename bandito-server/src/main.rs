use std::sync::Arc;

use bandito_server::actions::ActionRunner;
use bandito_server::config::ServerConfig;
use bandito_server::events::{EventSink, FanoutSink, TracingSink};
use bandito_server::AppState;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("bandito_server=debug,tower_http=debug")),
        )
        .init();

    let config = ServerConfig::from_env();
    tracing::info!("Project root: {}", config.root.display());

    let runner = ActionRunner::new(config.root.clone(), config.shortcut_helper.clone());
    let events: Arc<dyn EventSink> = Arc::new(FanoutSink(vec![
        Arc::new(TracingSink),
        Arc::new(runner),
    ]));
    let state = AppState::new(config.root.clone(), events);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .expect("Failed to bind listen address");
    tracing::info!("Listening on {}", config.listen_addr);
    tracing::info!("Admin endpoint at {}/api/broadcast", config.admin_url);

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    if let Err(e) = bandito_server::serve(listener, state, shutdown).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
    tracing::info!("Server stopped");
}
