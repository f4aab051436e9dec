//! Prometheus metrics for the NOTIFY dispatcher: the counter-store contract
//! (§6) mirrored into an operator-facing registry, plus admitted/waiting
//! gauges. The counter store itself (`dispatch::counters`) remains the
//! thing the dispatch loop's invariants are checked against; this is
//! additive exposition on top of it.

use prometheus::{CounterVec, Encoder, IntGauge, Registry, TextEncoder, opts};

pub struct NotifyMetrics {
    registry: Registry,
    notify_sends: CounterVec,
    admitted_zones: IntGauge,
    waiting_zones: IntGauge,
}

impl NotifyMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let notify_sends = CounterVec::new(
            opts!(
                "notifyd_sends_total",
                "Total UDP NOTIFY sends per zone and address family"
            ),
            &["zone", "family"],
        )?;

        let admitted_zones = IntGauge::with_opts(opts!(
            "notifyd_admitted_zones",
            "Zones currently in the admitted set"
        ))?;

        let waiting_zones = IntGauge::with_opts(opts!(
            "notifyd_waiting_zones",
            "Zones currently queued awaiting admission"
        ))?;

        registry.register(Box::new(notify_sends.clone()))?;
        registry.register(Box::new(admitted_zones.clone()))?;
        registry.register(Box::new(waiting_zones.clone()))?;

        Ok(Self {
            registry,
            notify_sends,
            admitted_zones,
            waiting_zones,
        })
    }

    pub fn record_send(&self, zone_name: &str, family: &str) {
        self.notify_sends.with_label_values(&[zone_name, family]).inc();
    }

    pub fn set_admitted(&self, count: i64) {
        self.admitted_zones.set(count);
    }

    pub fn set_waiting(&self, count: i64) {
        self.waiting_zones.set(count);
    }

    pub fn export(&self) -> Result<String, prometheus::Error> {
        let metric_families = self.registry.gather();
        let encoder = TextEncoder::new();
        let mut buf = Vec::new();
        encoder.encode(&metric_families, &mut buf)?;
        Ok(String::from_utf8(buf).expect("prometheus text encoding is always valid utf-8"))
    }
}
