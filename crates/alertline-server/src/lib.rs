//! # alertline-server
//!
//! Broadcasts every fact produced by an [`AlertSource`](alertline_core::AlertSource)
//! to all connected WebSocket viewers.

pub mod broadcaster;
pub mod event_bridge;
pub mod server;
pub mod session;

pub use broadcaster::{BroadcastReport, Broadcaster, ViewerSession};
pub use server::{build_router, start, AppState, ServerConfig, ServerHandle};
