//! # alertline-client
//!
//! Viewer side of the pipeline: a [`ConnectionManager`] keeps one reconnecting
//! connection to the broadcaster and hands normalized alerts to an
//! [`AlertStore`], which a [`Dashboard`] filters and summarizes for display.

pub mod connection;
pub mod dashboard;
pub mod demo;
pub mod filter;
pub mod store;
pub mod transport;

pub use connection::{ConnectionManager, ConnectionState, ReconnectPolicy};
pub use dashboard::Dashboard;
pub use demo::spawn_demo_feed;
pub use filter::{AlertFilter, FilterKind, UnknownFilterKind};
pub use store::{AlertCounts, AlertStore, DEFAULT_CAPACITY};
pub use transport::{Connector, FrameStream, TransportError, WsConnector};
