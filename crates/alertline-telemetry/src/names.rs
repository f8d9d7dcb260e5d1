//! Metric names recorded across the workspace.

/// Gauge: viewers currently registered with the broadcaster.
pub const WS_SESSIONS_ACTIVE: &str = "ws.sessions.active";
/// Counter: viewers ever accepted.
pub const WS_SESSIONS_TOTAL: &str = "ws.sessions.total";
/// Counter: facts taken off the source channel.
pub const BROADCAST_FACTS_TOTAL: &str = "broadcast.facts.total";
/// Counter: frames queued to an open viewer.
pub const BROADCAST_DELIVERIES_TOTAL: &str = "broadcast.deliveries.total";
/// Counter: frames dropped, labelled by `reason` (`queue_full`, `closed`, `lagged`).
pub const BROADCAST_DROPS_TOTAL: &str = "broadcast.drops.total";
/// Counter: connection attempts started by the viewer, labelled by `outcome`.
pub const CLIENT_CONNECT_ATTEMPTS_TOTAL: &str = "client.connect.attempts.total";
/// Counter: alerts normalized and handed to the store.
pub const CLIENT_ALERTS_RECEIVED_TOTAL: &str = "client.alerts.received.total";
/// Counter: inbound frames rejected, labelled by `kind`.
pub const CLIENT_PAYLOADS_MALFORMED_TOTAL: &str = "client.payloads.malformed.total";
