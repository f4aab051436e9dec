//! Per-zone key and per-target state (§3, §4.3).

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::dispatch::socket::{AddressFamily, AsyncUdpSocket};
use crate::wire::RRClass;
use crate::zone::SecondaryEndpoint;

/// A zone is identified by its canonical, dot-terminated, lowercase name and
/// its class. Two keys that differ only by case or trailing dot compare equal.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ZoneKey {
    name: String,
    class: RRClass,
}

impl ZoneKey {
    pub fn new(zone_name: &str, class: RRClass) -> Self {
        Self {
            name: canonicalize(zone_name),
            class,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn class(&self) -> RRClass {
        self.class
    }
}

pub fn canonicalize(zone_name: &str) -> String {
    let lower = zone_name.trim_end_matches('.').to_ascii_lowercase();
    format!("{lower}.")
}

/// One notification cycle's worth of mutable state for a single zone.
/// Lives entirely on the dispatcher worker; never shared behind a lock.
pub struct ZoneNotifyInfo {
    secondaries: Vec<SecondaryEndpoint>,
    current_target: Option<usize>,
    message_id: u16,
    socket: Option<Arc<dyn AsyncUdpSocket>>,
    retry_count: u32,
    deadline: Option<Instant>,
    family: Option<AddressFamily>,
}

impl ZoneNotifyInfo {
    pub fn new(secondaries: Vec<SecondaryEndpoint>) -> Self {
        Self {
            secondaries,
            current_target: None,
            message_id: 0,
            socket: None,
            retry_count: 0,
            deadline: None,
            family: None,
        }
    }

    pub fn secondaries(&self) -> &[SecondaryEndpoint] {
        &self.secondaries
    }

    pub fn current_secondary(&self) -> Option<&SecondaryEndpoint> {
        self.current_target.and_then(|i| self.secondaries.get(i))
    }

    pub fn current_target_index(&self) -> Option<usize> {
        self.current_target
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn message_id(&self) -> u16 {
        self.message_id
    }

    pub fn socket(&self) -> Option<Arc<dyn AsyncUdpSocket>> {
        self.socket.clone()
    }

    pub fn family(&self) -> Option<AddressFamily> {
        self.family
    }

    /// Arms the first target. Does not allocate a socket; that happens
    /// lazily on the first send.
    pub fn prepare_notify_out(&mut self, now: Instant, initial_timeout: Duration) {
        self.retry_count = 0;
        self.current_target = if self.secondaries.is_empty() { None } else { Some(0) };
        self.deadline = Some(now + initial_timeout);
    }

    /// Advances to the next secondary in order; becomes "none" past the end.
    pub fn set_next_notify_target(&mut self) {
        self.retry_count = 0;
        self.socket = None;
        self.family = None;
        self.current_target = match self.current_target {
            Some(i) if i + 1 < self.secondaries.len() => Some(i + 1),
            _ => None,
        };
    }

    pub fn is_finished(&self) -> bool {
        self.current_target.is_none()
    }

    pub fn finish_notify_out(&mut self) {
        self.socket = None;
        self.family = None;
        self.deadline = None;
        self.current_target = None;
    }

    pub fn set_socket(&mut self, socket: Arc<dyn AsyncUdpSocket>, family: AddressFamily) {
        self.socket = Some(socket);
        self.family = Some(family);
    }

    pub fn set_deadline(&mut self, deadline: Instant) {
        self.deadline = Some(deadline);
    }

    pub fn increment_retry(&mut self) {
        self.retry_count += 1;
    }

    /// Records the message id used by the send that just went out. The id
    /// itself is chosen by `encode_notify_query`; this just remembers it so
    /// the corresponding read can correlate a response.
    pub fn set_message_id(&mut self, id: u16) {
        self.message_id = id;
    }
}
