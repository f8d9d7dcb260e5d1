use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// One metric value with its labels.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub name: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub labels: BTreeMap<String, String>,
    pub value: f64,
}

/// Point-in-time copy of every counter and gauge.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub captured_at: DateTime<Utc>,
    pub counters: Vec<MetricSample>,
    pub gauges: Vec<MetricSample>,
}

impl MetricsSnapshot {
    /// Sum of all samples with `name`, across label sets.
    pub fn counter_total(&self, name: &str) -> f64 {
        self.counters
            .iter()
            .filter(|s| s.name == name)
            .map(|s| s.value)
            .sum()
    }
}

/// In-memory counter. Monotonically increasing.
struct Counter {
    value: AtomicU64,
}

impl Counter {
    fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }
    fn increment(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }
    fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// In-memory gauge. Can go up or down.
struct Gauge {
    // f64 bits, so the value can be updated atomically
    value: AtomicI64,
}

impl Gauge {
    fn new() -> Self {
        Self {
            value: AtomicI64::new(0f64.to_bits() as i64),
        }
    }
    fn set(&self, v: f64) {
        self.value.store(v.to_bits() as i64, Ordering::Relaxed);
    }
    fn increment(&self, delta: f64) {
        loop {
            let current = self.value.load(Ordering::Relaxed);
            let new_f = f64::from_bits(current as u64) + delta;
            if self
                .value
                .compare_exchange_weak(
                    current,
                    new_f.to_bits() as i64,
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                )
                .is_ok()
            {
                break;
            }
        }
    }
    fn get(&self) -> f64 {
        f64::from_bits(self.value.load(Ordering::Relaxed) as u64)
    }
}

/// Metric key: name + labels sorted by label name.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
struct MetricKey {
    name: String,
    labels: Vec<(String, String)>,
}

impl MetricKey {
    fn new(name: impl Into<String>, labels: &[(&str, &str)]) -> Self {
        let mut sorted: Vec<(String, String)> = labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        sorted.sort_by(|a, b| a.0.cmp(&b.0));
        Self {
            name: name.into(),
            labels: sorted,
        }
    }

    fn sample(&self, value: f64) -> MetricSample {
        MetricSample {
            name: self.name.clone(),
            labels: self.labels.iter().cloned().collect(),
            value,
        }
    }
}

/// Thread-safe in-process metrics recorder.
pub struct MetricsRecorder {
    counters: RwLock<HashMap<MetricKey, Counter>>,
    gauges: RwLock<HashMap<MetricKey, Gauge>>,
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self {
            counters: RwLock::new(HashMap::new()),
            gauges: RwLock::new(HashMap::new()),
        }
    }

    pub fn counter_inc(&self, name: &str, labels: &[(&str, &str)], n: u64) {
        let key = MetricKey::new(name, labels);
        {
            let counters = self.counters.read();
            if let Some(c) = counters.get(&key) {
                c.increment(n);
                return;
            }
        }
        self.counters
            .write()
            .entry(key)
            .or_insert_with(Counter::new)
            .increment(n);
    }

    pub fn gauge_set(&self, name: &str, labels: &[(&str, &str)], value: f64) {
        let key = MetricKey::new(name, labels);
        {
            let gauges = self.gauges.read();
            if let Some(g) = gauges.get(&key) {
                g.set(value);
                return;
            }
        }
        self.gauges
            .write()
            .entry(key)
            .or_insert_with(Gauge::new)
            .set(value);
    }

    pub fn gauge_inc(&self, name: &str, labels: &[(&str, &str)], delta: f64) {
        let key = MetricKey::new(name, labels);
        {
            let gauges = self.gauges.read();
            if let Some(g) = gauges.get(&key) {
                g.increment(delta);
                return;
            }
        }
        self.gauges
            .write()
            .entry(key)
            .or_insert_with(Gauge::new)
            .increment(delta);
    }

    pub fn counter_get(&self, name: &str, labels: &[(&str, &str)]) -> u64 {
        let key = MetricKey::new(name, labels);
        self.counters.read().get(&key).map_or(0, Counter::get)
    }

    pub fn gauge_get(&self, name: &str, labels: &[(&str, &str)]) -> f64 {
        let key = MetricKey::new(name, labels);
        self.gauges.read().get(&key).map_or(0.0, Gauge::get)
    }

    /// Copy every current value, sorted by name then labels.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut counters: Vec<MetricSample> = self
            .counters
            .read()
            .iter()
            .map(|(k, c)| k.sample(c.get() as f64))
            .collect();
        let mut gauges: Vec<MetricSample> = self
            .gauges
            .read()
            .iter()
            .map(|(k, g)| k.sample(g.get()))
            .collect();
        let order = |a: &MetricSample, b: &MetricSample| {
            a.name.cmp(&b.name).then_with(|| a.labels.cmp(&b.labels))
        };
        counters.sort_by(order);
        gauges.sort_by(order);
        MetricsSnapshot {
            captured_at: Utc::now(),
            counters,
            gauges,
        }
    }
}
