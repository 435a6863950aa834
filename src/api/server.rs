//! Chat API server lifecycle. Starts/stops the axum HTTP server that serves
//! `chat_api_router()`.
//!
//! bind → spawn background task → return handle with shutdown channel.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::api::router::chat_api_router;
use crate::core_state::CoreState;

/// Where a running chat server is listening.
#[derive(Debug, Clone)]
pub struct ChatServerSession {
    pub server_addr: String,
    pub port: u16,
}

/// Handle to a running chat server.
pub struct ChatServer {
    pub session: ChatServerSession,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl ChatServer {
    /// Ask the server to stop accepting connections. In-flight streams are
    /// allowed to finish.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
            tracing::info!("Chat server shutdown signal sent");
        }
    }

    /// Wait until the server task has exited.
    pub async fn stopped(self) {
        if let Err(e) = self.task.await {
            tracing::error!("Chat server task failed: {e}");
        }
    }
}

/// Start the chat server on `addr` (port 0 picks an ephemeral port).
///
/// Returns a `ChatServer` handle with the bound address and a shutdown
/// channel.
pub async fn start_chat_server(
    core: Arc<CoreState>,
    addr: SocketAddr,
) -> Result<ChatServer, String> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| format!("Failed to bind chat server on {addr}: {e}"))?;

    let addr = listener
        .local_addr()
        .map_err(|e| format!("Failed to get server address: {e}"))?;

    let app = chat_api_router(core);

    let session = ChatServerSession {
        server_addr: addr.to_string(),
        port: addr.port(),
    };

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let task = tokio::spawn(async move {
        let shutdown_signal = async move {
            let _ = shutdown_rx.await;
            tracing::info!("Chat server received shutdown signal");
        };

        tracing::info!(%addr, "Chat server started");

        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
        {
            tracing::error!("Chat server error: {e}");
        }

        tracing::info!("Chat server stopped");
    });

    Ok(ChatServer {
        session,
        shutdown_tx: Some(shutdown_tx),
        task,
    })
}
