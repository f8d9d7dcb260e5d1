//! Alert sources: anything that publishes raw facts on an interval.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::alert::RawAlertFact;
use crate::errors::CatalogError;

const DEFAULT_MESSAGES: [&str; 10] = [
    "Unauthorized process detected",
    "Suspicious network activity from external IP",
    "Critical system file modified",
    "Warning: High CPU usage detected",
    "Security scan completed successfully",
    "Failed login attempt detected",
    "Malware signature detected in file",
    "System backup completed",
    "Network intrusion attempt blocked",
    "User privilege escalation detected",
];

const DEFAULT_HOSTNAMES: [&str; 6] = [
    "PC-01",
    "SERVER-02",
    "WEB-03",
    "DB-04",
    "ROUTER-01",
    "FIREWALL-01",
];

/// Producer of raw alert facts.
///
/// Implementations publish into `tx` until `cancel` fires. Publishing must not
/// depend on whether anyone is subscribed.
#[async_trait]
pub trait AlertSource: Send + Sync {
    async fn run(&self, tx: broadcast::Sender<RawAlertFact>, cancel: CancellationToken);
}

/// Message and hostname pools for synthetic facts. Never empty.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Catalog {
    messages: Vec<String>,
    hostnames: Vec<String>,
}

impl Catalog {
    pub fn new(messages: Vec<String>, hostnames: Vec<String>) -> Result<Self, CatalogError> {
        if messages.is_empty() {
            return Err(CatalogError::NoMessages);
        }
        if hostnames.is_empty() {
            return Err(CatalogError::NoHostnames);
        }
        Ok(Self { messages, hostnames })
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    pub fn hostnames(&self) -> &[String] {
        &self.hostnames
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self {
            messages: DEFAULT_MESSAGES.iter().map(|s| (*s).to_string()).collect(),
            hostnames: DEFAULT_HOSTNAMES.iter().map(|s| (*s).to_string()).collect(),
        }
    }
}

/// Periodic generator drawing uniformly from a [`Catalog`].
///
/// Shared by the server's broadcast loop and the viewer's demo path.
#[derive(Clone, Debug)]
pub struct SyntheticSource {
    catalog: Catalog,
    interval: Duration,
}

impl SyntheticSource {
    pub fn new(catalog: Catalog, interval: Duration) -> Self {
        Self { catalog, interval }
    }

    pub fn with_interval(interval: Duration) -> Self {
        Self::new(Catalog::default(), interval)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Draw one fact using the thread-local RNG.
    pub fn draw(&self) -> RawAlertFact {
        self.draw_with(&mut rand::thread_rng())
    }

    pub fn draw_with<R: Rng + ?Sized>(&self, rng: &mut R) -> RawAlertFact {
        let message = &self.catalog.messages[rng.gen_range(0..self.catalog.messages.len())];
        let hostname = &self.catalog.hostnames[rng.gen_range(0..self.catalog.hostnames.len())];
        RawAlertFact::new(hostname.clone(), message.clone())
    }
}

#[async_trait]
impl AlertSource for SyntheticSource {
    async fn run(&self, tx: broadcast::Sender<RawAlertFact>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.tick().await; // consume first immediate tick

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("synthetic source stopped");
                    break;
                }
                _ = ticker.tick() => {
                    let fact = self.draw();
                    // Err only means nobody is subscribed right now.
                    match tx.send(fact) {
                        Ok(receivers) => tracing::trace!(receivers, "synthetic fact emitted"),
                        Err(_) => tracing::trace!("synthetic fact emitted with no subscribers"),
                    }
                }
            }
        }
    }
}
