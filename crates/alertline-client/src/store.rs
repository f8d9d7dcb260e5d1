use std::collections::{HashSet, VecDeque};

use alertline_core::{Alert, AlertId, Severity};
use serde::Serialize;

use crate::filter::AlertFilter;

/// Alerts retained when no capacity is configured.
pub const DEFAULT_CAPACITY: usize = 100;

/// Aggregates over the retained alerts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct AlertCounts {
    pub total: usize,
    pub critical: usize,
    pub warning: usize,
    pub info: usize,
    pub success: usize,
    /// Distinct hostnames.
    pub active_hosts: usize,
}

/// Bounded, most-recent-first alert buffer.
#[derive(Clone, Debug)]
pub struct AlertStore {
    alerts: VecDeque<Alert>,
    capacity: usize,
}

impl Default for AlertStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl AlertStore {
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            alerts: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Insert at the head, evicting from the tail. Returns how many were evicted.
    pub fn append(&mut self, alert: Alert) -> usize {
        self.alerts.push_front(alert);
        let mut evicted = 0;
        while self.alerts.len() > self.capacity {
            let _ = self.alerts.pop_back();
            evicted += 1;
        }
        evicted
    }

    pub fn counts(&self) -> AlertCounts {
        let mut counts = AlertCounts {
            total: self.alerts.len(),
            ..AlertCounts::default()
        };
        let mut hosts = HashSet::new();
        for alert in &self.alerts {
            match alert.severity {
                Severity::Critical => counts.critical += 1,
                Severity::Warning => counts.warning += 1,
                Severity::Info => counts.info += 1,
                Severity::Success => counts.success += 1,
            }
            let _ = hosts.insert(alert.hostname.as_str());
        }
        counts.active_hosts = hosts.len();
        counts
    }

    /// Alerts matching `filter`, most recent first.
    pub fn filter<'a>(&'a self, filter: &AlertFilter) -> impl Iterator<Item = &'a Alert> + 'a {
        let matcher = filter.compile();
        self.alerts.iter().filter(move |a| matcher.matches(a))
    }

    /// All alerts, most recent first.
    pub fn iter(&self) -> impl Iterator<Item = &Alert> {
        self.alerts.iter()
    }

    pub fn get(&self, id: &AlertId) -> Option<&Alert> {
        self.alerts.iter().find(|a| &a.id == id)
    }

    /// Most recent alert.
    pub fn head(&self) -> Option<&Alert> {
        self.alerts.front()
    }

    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.alerts.clear();
    }
}
