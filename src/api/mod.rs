//! HTTP surface of the chat service.
//!
//! `chat_api_router()` returns a composable `Router` with every route under
//! `/api/`; `start_chat_server()` binds it and runs it in the background.

pub mod endpoints;
pub mod error;
pub mod router;
pub mod server;
pub mod types;

pub use router::chat_api_router;
pub use server::{start_chat_server, ChatServer, ChatServerSession};
pub use types::ApiContext;
