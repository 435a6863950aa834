pub mod api;
pub mod config;
pub mod core_state;
pub mod models;
pub mod pipeline;
pub mod profile_store;

use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Initialise tracing from `RUST_LOG`, falling back to the default filter.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();
}

/// Serve the chat API until Ctrl-C.
pub async fn run() -> Result<(), String> {
    init_tracing();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let config = config::ChatConfig::from_env();
    let bind_addr = config.bind_addr;
    tracing::info!(
        model = %config.model,
        threshold = config.similarity_threshold,
        max_output_tokens = config.max_output_tokens,
        "Configuration loaded"
    );

    let core = Arc::new(core_state::CoreState::from_config(config));
    let mut server = api::start_chat_server(core, bind_addr).await?;
    tracing::info!(addr = %server.session.server_addr, "Listening");

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
    }

    server.shutdown();
    server.stopped().await;
    Ok(())
}
