//! The dispatcher loop (§4.4): the single worker that owns all sockets and
//! all per-zone mutable state.

use std::sync::Arc;

use futures::stream::FuturesUnordered;
use futures::StreamExt;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::NotifyConfig;
use crate::dispatch::admission::AdmissionState;
use crate::dispatch::clock::Clock;
use crate::dispatch::counters::{CounterMetric, CounterStore};
use crate::dispatch::resolver::resolve_secondaries;
use crate::dispatch::socket::{AddressFamily, SocketFactory};
use crate::dispatch::state::{ZoneKey, ZoneNotifyInfo};
use crate::dispatch::wakeup::Wakeup;
use crate::metrics::NotifyMetrics;
use crate::wire::{encode_notify_query, validate_response, ValidationResult};
use crate::zone::SharedZoneDataSource;

const READ_BUF_LEN: usize = 512;

pub struct Worker {
    pub config: NotifyConfig,
    pub admission: Arc<AdmissionState>,
    pub wakeup: Arc<Wakeup>,
    pub clock: Arc<dyn Clock>,
    pub sockets: Arc<dyn SocketFactory>,
    pub data_source: SharedZoneDataSource,
    pub counters: Arc<dyn CounterStore>,
    pub metrics: Option<Arc<NotifyMetrics>>,
}

enum WakeEvent {
    Read(ZoneKey, std::io::Result<(usize, [u8; READ_BUF_LEN])>),
    Timeout,
    Wake,
}

impl Worker {
    pub async fn run(self) {
        info!("dispatcher worker starting");
        loop {
            self.report_gauges();

            if self.wakeup.is_stopping() {
                self.shutdown_cleanup();
                info!("dispatcher worker stopped");
                return;
            }

            self.arm_fresh_admissions().await;

            let keys = self.admission.admitted_keys();
            let earliest_deadline = keys
                .iter()
                .filter_map(|k| self.admission.with_zone(k, |info| info.deadline()).flatten())
                .min();

            let event = self.wait_for_event(&keys, earliest_deadline).await;
            self.handle_event(event).await;
            self.sweep_timeouts().await;
        }
    }

    async fn wait_for_event(&self, keys: &[ZoneKey], earliest_deadline: Option<Instant>) -> WakeEvent {
        let mut reads = FuturesUnordered::new();
        for key in keys {
            if let Some(socket) = self.admission.with_zone(key, |info| info.socket()).flatten() {
                let key = key.clone();
                reads.push(async move {
                    let mut buf = [0u8; READ_BUF_LEN];
                    let result = socket.recv_from(&mut buf).await;
                    (key, result.map(|(n, _from)| (n, buf)))
                });
            }
        }

        let sleep = async {
            match earliest_deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.wakeup.notified() => WakeEvent::Wake,
            Some((key, result)) = reads.next() => WakeEvent::Read(key, result),
            _ = sleep => WakeEvent::Timeout,
        }
    }

    async fn handle_event(&self, event: WakeEvent) {
        match event {
            WakeEvent::Wake => {
                self.wakeup.set_has_work(self.admission.admitted_count() > 0);
            }
            // The post-event deadline sweep below handles every admitted
            // zone whose deadline has passed, not just the one that woke us.
            WakeEvent::Timeout => {}
            WakeEvent::Read(key, result) => {
                self.handle_read(&key, result).await;
            }
        }
    }

    async fn handle_read(&self, key: &ZoneKey, result: std::io::Result<(usize, [u8; READ_BUF_LEN])>) {
        let Some(expected_id) = self.admission.with_zone(key, |info| info.message_id()) else {
            return;
        };

        let validation = match result {
            Ok((n, buf)) => {
                validate_response(expected_id, key.name().trim_end_matches('.'), key.class(), &buf[..n])
            }
            Err(err) => {
                warn!(zone = key.name(), %err, "socket read error, treating as bad response");
                ValidationResult::BadReplyPacket
            }
        };

        if validation.is_ok() {
            debug!(zone = key.name(), "received REPLY_OK, advancing target");
            self.admission.with_zone(key, |info| info.set_next_notify_target());
            self.advance_or_finish(key).await;
        } else {
            warn!(zone = key.name(), ?validation, "bad NOTIFY response, treating as timeout");
            self.retry_or_advance(key).await;
        }
    }

    async fn sweep_timeouts(&self) {
        let keys = self.admission.admitted_keys();
        for key in keys {
            let timed_out = self
                .admission
                .with_zone(&key, |info| info.deadline().map(|d| self.clock.now() >= d))
                .flatten()
                .unwrap_or(false);

            if timed_out {
                self.retry_or_advance(&key).await;
            }
        }
    }

    /// TIMEOUT handler (§4.4). Retries the current target with backoff, or
    /// (once `max_try` is exhausted) advances past it.
    async fn retry_or_advance(&self, key: &ZoneKey) {
        let Some(retry_count) = self.admission.with_zone(key, |info| info.retry_count()) else {
            return;
        };

        if retry_count < self.config.max_try {
            self.admission.with_zone(key, |info| info.increment_retry());
            self.send_to_current_target(key).await;
        } else {
            self.admission.with_zone(key, |info| info.set_next_notify_target());
            self.advance_or_finish(key).await;
        }
    }

    /// Sends to the zone's current target if one remains, or finishes the
    /// zone (freeing its admitted slot and promoting a waiting zone) if the
    /// target index just ran past the end of the secondary list.
    async fn advance_or_finish(&self, key: &ZoneKey) {
        match self.admission.with_zone(key, |info| info.is_finished()) {
            Some(true) => {
                self.admission.with_zone(key, |info| info.finish_notify_out());
                info!(zone = key.name(), "zone finished, all targets notified or exhausted");
                if let Some(promoted) = self.admission.finish_and_promote(key) {
                    self.resolve_and_arm(&promoted).await;
                }
            }
            Some(false) => self.send_to_current_target(key).await,
            None => {}
        }
    }

    /// Resolves secondaries for a freshly admitted or promoted zone, arms
    /// its first deadline, and fires the first send. Used both when
    /// `send_notify` admits a zone directly and when a finished zone's slot
    /// is handed to the next waiting zone.
    async fn resolve_and_arm(&self, key: &ZoneKey) {
        let secondaries = resolve_secondaries(self.data_source.as_ref(), key.name(), key.class()).await;
        let mut info = ZoneNotifyInfo::new(secondaries);
        info.prepare_notify_out(self.clock.now(), self.config.initial_timeout);
        let finished = info.is_finished();
        self.admission.complete_admit(key, info);

        if finished {
            info!(zone = key.name(), "zone has no secondaries, finishing immediately");
            if let Some(promoted) = self.admission.finish_and_promote(key) {
                Box::pin(self.resolve_and_arm(&promoted)).await;
            }
        } else {
            self.send_to_current_target(key).await;
        }
    }

    /// Send step (§4.4): allocates a socket for the current target's address
    /// family, encodes a fresh query, transmits, and increments counters.
    /// Any failure along the way degrades to a retry on the next sweep,
    /// exactly like a timeout.
    async fn send_to_current_target(&self, key: &ZoneKey) {
        let Some(secondary) = self.admission.with_zone(key, |info| info.current_secondary().cloned()).flatten()
        else {
            return;
        };

        let Some(family) = AddressFamily::of(&secondary.ip) else {
            warn!(zone = key.name(), addr = %secondary.ip, "malformed secondary address, treating as timeout");
            return;
        };

        let target_addr: std::net::SocketAddr = match format!("{secondary}").parse() {
            Ok(addr) => addr,
            Err(_) => {
                warn!(zone = key.name(), addr = %secondary, "unparseable socket address, treating as timeout");
                return;
            }
        };

        let socket = match self.sockets.bind(family).await {
            Ok(socket) => socket,
            Err(err) => {
                warn!(zone = key.name(), %err, "socket allocation failed, treating as timeout");
                return;
            }
        };

        let (bytes, id) = encode_notify_query(key.name(), key.class());

        match socket.send_to(&bytes, target_addr).await {
            Ok(_) => {
                let metric = match family {
                    AddressFamily::V4 => CounterMetric::NotifyOutV4,
                    AddressFamily::V6 => CounterMetric::NotifyOutV6,
                };
                self.counters.increment(key.name(), metric);
                if let Some(metrics) = &self.metrics {
                    metrics.record_send(key.name(), family.as_metric_label());
                }
                debug!(zone = key.name(), target = %secondary, "sent NOTIFY");

                let now = self.clock.now();
                self.admission.with_zone(key, |info| {
                    let retry = info.retry_count();
                    info.set_socket(socket, family);
                    info.set_message_id(id);
                    info.set_deadline(now + self.config.initial_timeout * 2u32.pow(retry));
                });
            }
            Err(err) => {
                warn!(zone = key.name(), %err, "send failed, treating as timeout");
            }
        }
    }

    fn report_gauges(&self) {
        if let Some(metrics) = &self.metrics {
            metrics.set_admitted(self.admission.admitted_count() as i64);
            metrics.set_waiting(self.admission.waiting_count() as i64);
        }
    }

    fn shutdown_cleanup(&self) {
        self.admission.clear_all();
    }

    /// Entry point used by `send_notify` once it has reserved a slot:
    /// resolves secondaries and fires the first send for a newly admitted
    /// zone, exactly like `resolve_and_arm` but exposed to the dispatcher
    /// handle's task.
    pub async fn admit_and_arm(&self, key: &ZoneKey) {
        self.resolve_and_arm(key).await;
    }

    /// `send_notify` only reserves a slot (placeholder `ZoneNotifyInfo` with
    /// no deadline); the worker itself resolves and arms it on its next
    /// iteration. A placeholder is any admitted zone with no deadline set —
    /// zones promoted from the waiting queue are armed inline by
    /// `advance_or_finish`/`resolve_and_arm`, so the only placeholders left
    /// for this sweep to find are fresh direct admissions.
    async fn arm_fresh_admissions(&self) {
        let keys = self.admission.admitted_keys();
        for key in keys {
            let unarmed = self
                .admission
                .with_zone(&key, |info| info.deadline().is_none())
                .unwrap_or(false);
            if unarmed {
                self.resolve_and_arm(&key).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::clock::FakeClock;
    use crate::dispatch::counters::InMemoryCounterStore;
    use crate::dispatch::socket::mock::MockSocketFactory;
    use crate::wire::RRClass;
    use crate::zone::{InMemoryZoneDataSource, SecondaryEndpoint};
    use std::collections::HashSet;

    fn key(name: &str) -> ZoneKey {
        ZoneKey::new(name, RRClass::IN)
    }

    fn test_worker(
        max_notify_num: usize,
        configured: HashSet<ZoneKey>,
        data_source: InMemoryZoneDataSource,
    ) -> (Worker, Arc<FakeClock>, Arc<MockSocketFactory>) {
        let clock = FakeClock::new();
        let sockets = Arc::new(MockSocketFactory::new());
        let config = NotifyConfig {
            max_notify_num,
            ..Default::default()
        };
        let worker = Worker {
            config,
            admission: Arc::new(AdmissionState::new(max_notify_num, configured)),
            wakeup: Arc::new(Wakeup::new()),
            clock: clock.clone(),
            sockets: sockets.clone(),
            data_source: Arc::new(data_source),
            counters: Arc::new(InMemoryCounterStore::new()),
            metrics: None,
        };
        (worker, clock, sockets)
    }

    #[tokio::test]
    async fn resolve_and_arm_finishes_zones_with_no_secondaries() {
        let mut configured = HashSet::new();
        configured.insert(key("empty.example."));
        let (worker, _clock, _sockets) = test_worker(2, configured, InMemoryZoneDataSource::new());

        worker.admission.try_reserve(&key("empty.example."));
        worker.admit_and_arm(&key("empty.example.")).await;

        assert_eq!(worker.admission.admitted_count(), 0);
    }

    #[tokio::test]
    async fn send_to_current_target_increments_counters_and_transmits() {
        let mut configured = HashSet::new();
        configured.insert(key("example.com."));
        let data_source = InMemoryZoneDataSource::new();
        data_source.add_configured_secondary(
            "example.com.",
            RRClass::IN,
            SecondaryEndpoint::new("127.0.0.1"),
        );
        let (worker, _clock, sockets) = test_worker(2, configured, data_source);

        worker.admission.try_reserve(&key("example.com."));
        worker.admit_and_arm(&key("example.com.")).await;

        assert_eq!(worker.admission.admitted_count(), 1);
        assert_eq!(
            worker.counters.get("example.com.", CounterMetric::NotifyOutV4).unwrap(),
            1
        );
        assert_eq!(sockets.v4.sent.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn timeout_retries_then_advances_past_exhausted_target() {
        let mut configured = HashSet::new();
        configured.insert(key("example.com."));
        let data_source = InMemoryZoneDataSource::new();
        data_source.add_configured_secondary(
            "example.com.",
            RRClass::IN,
            SecondaryEndpoint::new("127.0.0.1"),
        );
        let (worker, clock, sockets) = test_worker(2, configured, data_source);

        worker.admission.try_reserve(&key("example.com."));
        worker.admit_and_arm(&key("example.com.")).await;
        assert_eq!(sockets.v4.sent.lock().await.len(), 1);

        let max_try = worker.config.max_try;
        for _ in 0..=max_try {
            clock.advance(std::time::Duration::from_secs(3600));
            worker.sweep_timeouts().await;
        }

        // Single-secondary zone: every retry resends to the same target until
        // max_try is exhausted, then the zone finishes (no more targets).
        assert_eq!(worker.admission.admitted_count(), 0);
        assert!(sockets.v4.sent.lock().await.len() as u32 >= max_try);
    }

    #[tokio::test]
    async fn well_formed_reply_advances_to_next_target() {
        let mut configured = HashSet::new();
        configured.insert(key("example.com."));
        let data_source = InMemoryZoneDataSource::new();
        data_source.add_configured_secondary(
            "example.com.",
            RRClass::IN,
            SecondaryEndpoint::new("127.0.0.1"),
        );
        data_source.add_configured_secondary(
            "example.com.",
            RRClass::IN,
            SecondaryEndpoint::new("192.0.2.1"),
        );
        let (worker, _clock, sockets) = test_worker(2, configured, data_source);

        worker.admission.try_reserve(&key("example.com."));
        worker.admit_and_arm(&key("example.com.")).await;

        let id = worker
            .admission
            .with_zone(&key("example.com."), |info| info.message_id())
            .unwrap();

        let bytes = good_reply_bytes(id, "example.com.", RRClass::IN);
        let n = bytes.len();
        let mut buf = [0u8; READ_BUF_LEN];
        buf[..n].copy_from_slice(&bytes);

        worker.handle_read(&key("example.com."), Ok((n, buf))).await;

        let current = worker
            .admission
            .with_zone(&key("example.com."), |info| info.current_secondary().cloned())
            .flatten();
        assert_eq!(current, Some(SecondaryEndpoint::new("192.0.2.1")));
        assert_eq!(sockets.v4.sent.lock().await.len(), 2);
    }

    #[tokio::test]
    async fn mutated_id_response_increments_retry_without_advancing() {
        let mut configured = HashSet::new();
        configured.insert(key("example.com."));
        let data_source = InMemoryZoneDataSource::new();
        data_source.add_configured_secondary(
            "example.com.",
            RRClass::IN,
            SecondaryEndpoint::new("127.0.0.1"),
        );
        data_source.add_configured_secondary(
            "example.com.",
            RRClass::IN,
            SecondaryEndpoint::new("192.0.2.1"),
        );
        let (worker, _clock, sockets) = test_worker(2, configured, data_source);

        worker.admission.try_reserve(&key("example.com."));
        worker.admit_and_arm(&key("example.com.")).await;
        assert_eq!(sockets.v4.sent.lock().await.len(), 1);

        let id = worker
            .admission
            .with_zone(&key("example.com."), |info| info.message_id())
            .unwrap();
        let wrong_id = id.wrapping_add(1);

        let bytes = good_reply_bytes(wrong_id, "example.com.", RRClass::IN);
        let n = bytes.len();
        let mut buf = [0u8; READ_BUF_LEN];
        buf[..n].copy_from_slice(&bytes);

        worker.handle_read(&key("example.com."), Ok((n, buf))).await;

        let current = worker
            .admission
            .with_zone(&key("example.com."), |info| info.current_secondary().cloned())
            .flatten();
        assert_eq!(
            current,
            Some(SecondaryEndpoint::new("127.0.0.1")),
            "BAD_QUERY_ID must not advance the target"
        );

        let retry_count = worker
            .admission
            .with_zone(&key("example.com."), |info| info.retry_count())
            .unwrap();
        assert_eq!(retry_count, 1, "bad response counts as a timeout, incrementing the retry counter");

        // Treated exactly like a timeout: a retry resend goes out to the same target.
        assert_eq!(sockets.v4.sent.lock().await.len(), 2);
    }

    #[tokio::test]
    async fn backoff_deadline_doubles_with_each_retry_send() {
        let mut configured = HashSet::new();
        configured.insert(key("example.com."));
        let data_source = InMemoryZoneDataSource::new();
        data_source.add_configured_secondary(
            "example.com.",
            RRClass::IN,
            SecondaryEndpoint::new("127.0.0.1"),
        );
        let (worker, clock, _sockets) = test_worker(2, configured, data_source);

        worker.admission.try_reserve(&key("example.com."));
        worker.admit_and_arm(&key("example.com.")).await;

        let initial_timeout = worker.config.initial_timeout;
        let max_try = worker.config.max_try;

        // After the k-th send (k=0 is the initial send, k=1..max_try are
        // retries), the deadline relative to the send's own "now" must be
        // INITIAL_TIMEOUT * 2^k.
        for k in 0..max_try {
            let deadline = worker
                .admission
                .with_zone(&key("example.com."), |info| info.deadline())
                .flatten()
                .unwrap();
            let expected_relative = initial_timeout * 2u32.pow(k);
            assert_eq!(
                deadline - clock.now(),
                expected_relative,
                "relative deadline after the {k}-th send"
            );

            clock.advance(expected_relative);
            worker.sweep_timeouts().await;

            let retry_count = worker
                .admission
                .with_zone(&key("example.com."), |info| info.retry_count())
                .unwrap();
            assert_eq!(retry_count, k + 1);
        }
    }

    #[tokio::test]
    async fn retry_exhaustion_on_last_target_finishes_zone_and_promotes_waiting() {
        let mut configured = HashSet::new();
        configured.insert(key("a.example."));
        configured.insert(key("b.example."));
        let data_source = InMemoryZoneDataSource::new();
        data_source.add_configured_secondary(
            "a.example.",
            RRClass::IN,
            SecondaryEndpoint::new("127.0.0.1"),
        );
        data_source.add_configured_secondary(
            "b.example.",
            RRClass::IN,
            SecondaryEndpoint::new("192.0.2.9"),
        );
        let (worker, clock, sockets) = test_worker(1, configured, data_source);

        worker.admission.try_reserve(&key("a.example."));
        worker.admit_and_arm(&key("a.example.")).await;
        worker.admission.try_reserve(&key("b.example."));
        assert_eq!(worker.admission.admitted_count(), 1);
        assert_eq!(worker.admission.waiting_count(), 1);

        let max_try = worker.config.max_try;
        for _ in 0..=max_try {
            clock.advance(std::time::Duration::from_secs(3600));
            worker.sweep_timeouts().await;
        }

        assert_eq!(
            worker.admission.admitted_keys(),
            vec![key("b.example.")],
            "a.example. must finish and free its slot to b.example."
        );
        assert_eq!(worker.admission.waiting_count(), 0);

        // b.example.'s first send happens in the same sweep that finishes
        // a.example.: max_try retries plus the initial send for each zone.
        assert_eq!(sockets.v4.sent.lock().await.len() as u32, max_try + 2);
    }

    fn good_reply_bytes(id: u16, name: &str, class: RRClass) -> Vec<u8> {
        use bitstream_io::{BigEndian, BitWriter};
        use crate::wire::{DnsHeader, DnsQuestion, OPCODE_NOTIFY};

        let header = DnsHeader {
            id,
            qr: true,
            opcode: OPCODE_NOTIFY,
            aa: false,
            tc: false,
            rd: false,
            ra: false,
            z: 0,
            rcode: 0,
            qdcount: 1,
            ancount: 0,
            nscount: 0,
            arcount: 0,
        };
        let question = DnsQuestion::for_zone(name, class);

        let mut bytes = Vec::new();
        let mut writer = BitWriter::endian(&mut bytes, BigEndian);
        header.write(&mut writer).unwrap();
        question.write(&mut writer).unwrap();
        bytes
    }
}
