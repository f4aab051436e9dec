//! Counter store (§6): `get` raises not-found when unset, `increment`
//! creates-on-first-use, `clear_all` resets everything. Paths are exactly
//! `('zones', zone_name, 'notifyoutv4' | 'notifyoutv6')`.

use dashmap::DashMap;
use thiserror::Error;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum CounterMetric {
    NotifyOutV4,
    NotifyOutV6,
}

impl CounterMetric {
    pub fn path_segment(self) -> &'static str {
        match self {
            CounterMetric::NotifyOutV4 => "notifyoutv4",
            CounterMetric::NotifyOutV6 => "notifyoutv6",
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CounterError {
    #[error("counter not found for zone '{zone}' metric '{metric}'")]
    NotFound { zone: String, metric: &'static str },
}

pub trait CounterStore: Send + Sync {
    fn increment(&self, zone_name: &str, metric: CounterMetric);
    fn get(&self, zone_name: &str, metric: CounterMetric) -> Result<u64, CounterError>;
    fn clear_all(&self);
}

#[derive(Default)]
pub struct InMemoryCounterStore {
    counts: DashMap<(String, CounterMetric), u64>,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(zone_name: &str, metric: CounterMetric) -> (String, CounterMetric) {
        (zone_name.trim_end_matches('.').to_ascii_lowercase(), metric)
    }
}

impl CounterStore for InMemoryCounterStore {
    fn increment(&self, zone_name: &str, metric: CounterMetric) {
        *self.counts.entry(Self::key(zone_name, metric)).or_insert(0) += 1;
    }

    fn get(&self, zone_name: &str, metric: CounterMetric) -> Result<u64, CounterError> {
        self.counts
            .get(&Self::key(zone_name, metric))
            .map(|v| *v)
            .ok_or_else(|| CounterError::NotFound {
                zone: zone_name.to_string(),
                metric: metric.path_segment(),
            })
    }

    fn clear_all(&self) {
        self.counts.clear();
    }
}
