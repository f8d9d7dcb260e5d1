use alertline_core::{Alert, AlertId, SyntheticSource};
use tokio::sync::watch;

use crate::connection::ConnectionState;
use crate::filter::{AlertFilter, FilterKind};
use crate::store::{AlertCounts, AlertStore};

/// What a renderer needs: connectivity, filtered alerts, counts, selection.
pub struct Dashboard {
    store: AlertStore,
    filter: AlertFilter,
    selected: Option<AlertId>,
    connection: Option<watch::Receiver<ConnectionState>>,
    demo: SyntheticSource,
}

impl Dashboard {
    pub fn new(store: AlertStore, demo: SyntheticSource) -> Self {
        Self {
            store,
            filter: AlertFilter::default(),
            selected: None,
            connection: None,
            demo,
        }
    }

    /// Track connectivity from a [`ConnectionManager`](crate::ConnectionManager).
    pub fn with_connection(mut self, state: watch::Receiver<ConnectionState>) -> Self {
        self.connection = Some(state);
        self
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection
            .as_ref()
            .map_or(ConnectionState::Disconnected { attempt: 0 }, |rx| *rx.borrow())
    }

    pub fn is_connected(&self) -> bool {
        self.connection_state().is_connected()
    }

    /// Accept an alert from the live feed. Returns how many were evicted.
    pub fn ingest(&mut self, alert: Alert) -> usize {
        self.store.append(alert)
    }

    /// Draw a synthetic alert now and insert it like a live one.
    pub fn generate_demo_alert(&mut self) -> Alert {
        let alert = Alert::from_fact(self.demo.draw());
        self.store.append(alert.clone());
        alert
    }

    /// Alerts passing the current filter, most recent first.
    pub fn alerts(&self) -> impl Iterator<Item = &Alert> {
        self.store.filter(&self.filter)
    }

    pub fn counts(&self) -> AlertCounts {
        self.store.counts()
    }

    pub fn filter(&self) -> &AlertFilter {
        &self.filter
    }

    pub fn set_filter_kind(&mut self, kind: FilterKind) {
        self.filter.set_kind(kind);
    }

    pub fn set_filter_value(&mut self, value: impl Into<String>) {
        self.filter.set_value(value);
    }

    /// Select an alert for detail view. Returns false if it is not retained.
    pub fn select(&mut self, id: &AlertId) -> bool {
        if self.store.get(id).is_some() {
            self.selected = Some(id.clone());
            true
        } else {
            false
        }
    }

    /// The selected alert, unless it has since been evicted.
    pub fn selected(&self) -> Option<&Alert> {
        self.selected.as_ref().and_then(|id| self.store.get(id))
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
    }

    /// Drop every alert and the selection.
    pub fn clear(&mut self) {
        self.store.clear();
        self.selected = None;
    }

    pub fn store(&self) -> &AlertStore {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use alertline_core::{RawAlertFact, Severity};

    use super::*;

    fn dashboard(capacity: usize) -> Dashboard {
        Dashboard::new(
            AlertStore::new(capacity),
            SyntheticSource::with_interval(Duration::from_secs(5)),
        )
    }

    fn alert(hostname: &str, message: &str) -> Alert {
        Alert::from_fact(RawAlertFact::new(hostname, message))
    }

    #[test]
    fn disconnected_without_manager() {
        let d = dashboard(10);
        assert!(!d.is_connected());
        assert_eq!(d.connection_state(), ConnectionState::Disconnected { attempt: 0 });
    }

    #[test]
    fn follows_connection_state() {
        let (tx, rx) = watch::channel(ConnectionState::Connecting);
        let d = dashboard(10).with_connection(rx);
        assert!(!d.is_connected());
        tx.send_replace(ConnectionState::Connected);
        assert!(d.is_connected());
    }

    #[test]
    fn demo_alert_lands_at_head() {
        let mut d = dashboard(10);
        let id = d.generate_demo_alert().id;
        assert_eq!(d.store().head().unwrap().id, id);
        assert_eq!(d.counts().total, 1);
    }

    #[test]
    fn filter_applies_to_alerts() {
        let mut d = dashboard(10);
        d.ingest(alert("PC-01", "Unauthorized process detected"));
        d.ingest(alert("WEB-03", "Failed login attempt detected"));

        d.set_filter_kind(FilterKind::Severity);
        d.set_filter_value("critical");
        let hosts: Vec<_> = d.alerts().map(|a| a.hostname.as_str()).collect();
        assert_eq!(hosts, ["PC-01"]);

        // Counts stay over the full store.
        assert_eq!(d.counts().total, 2);

        d.set_filter_kind(FilterKind::Hostname);
        assert_eq!(d.filter().value(), "");
        assert_eq!(d.alerts().count(), 2);
    }

    #[test]
    fn selection_survives_until_eviction() {
        let mut d = dashboard(2);
        let first = alert("PC-01", "m");
        let first_id = first.id.clone();
        d.ingest(first);
        assert!(d.select(&first_id));
        assert_eq!(d.selected().unwrap().severity, Severity::Info);

        d.ingest(alert("DB-04", "m"));
        assert!(d.selected().is_some());
        d.ingest(alert("WEB-03", "m"));
        assert!(d.selected().is_none());
    }

    #[test]
    fn select_unknown_is_rejected() {
        let mut d = dashboard(2);
        assert!(!d.select(&AlertId::new()));
        assert!(d.selected().is_none());
    }

    #[test]
    fn clear_resets_store_and_selection() {
        let mut d = dashboard(5);
        let id = d.generate_demo_alert().id;
        d.select(&id);
        d.clear();
        assert!(d.store().is_empty());
        assert!(d.selected().is_none());
        d.clear_selection();
    }
}
