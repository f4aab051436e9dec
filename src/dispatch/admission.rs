//! Admission queue (§4.5): the bounded admitted set plus a FIFO waiting
//! queue, and the single mutex producers and the dispatcher worker share at
//! their respective boundary points.

use std::collections::{HashSet, VecDeque};

use parking_lot::Mutex;

use crate::dispatch::state::{ZoneKey, ZoneNotifyInfo};

/// Shared between `send_notify` callers and the dispatcher worker. Producers
/// touch only membership and the waiting queue; the worker owns everything
/// inside `ZoneNotifyInfo` once a key is admitted, locking only to splice
/// waiting zones into the admitted set at iteration boundaries.
pub struct AdmissionState {
    max_notify_num: usize,
    configured_zones: HashSet<ZoneKey>,
    inner: Mutex<Inner>,
}

/// Admitted zones in insertion order. `MAX_NOTIFY_NUM` is small (default 16),
/// so a linear scan per lookup is cheaper and simpler than pulling in an
/// ordered-map crate for this.
struct Inner {
    admitted: Vec<(ZoneKey, ZoneNotifyInfo)>,
    waiting: VecDeque<ZoneKey>,
}

impl Inner {
    fn admitted_index(&self, key: &ZoneKey) -> Option<usize> {
        self.admitted.iter().position(|(k, _)| k == key)
    }
}

pub enum AdmitOutcome {
    /// Newly admitted; the caller must resolve secondaries and arm it.
    Admit,
    /// Already admitted or waiting; no action needed.
    AlreadyPresent,
    /// Admitted set is full; appended to the waiting queue.
    Queued,
    /// Not in the configured zone set.
    Rejected,
}

impl AdmissionState {
    pub fn new(max_notify_num: usize, configured_zones: HashSet<ZoneKey>) -> Self {
        Self {
            max_notify_num,
            configured_zones,
            inner: Mutex::new(Inner {
                admitted: Vec::new(),
                waiting: VecDeque::new(),
            }),
        }
    }

    pub fn is_configured(&self, key: &ZoneKey) -> bool {
        self.configured_zones.contains(key)
    }

    /// Reserves a slot for `key` if possible. Returns `Admit` only when the
    /// caller must now build a `ZoneNotifyInfo` and insert it via
    /// `complete_admit` — this split lets the reservation happen before any
    /// `.await` so two concurrent `send_notify` calls for the same zone
    /// cannot both decide to admit it.
    pub fn try_reserve(&self, key: &ZoneKey) -> AdmitOutcome {
        if !self.configured_zones.contains(key) {
            return AdmitOutcome::Rejected;
        }

        let mut inner = self.inner.lock();
        if inner.admitted_index(key).is_some() || inner.waiting.contains(key) {
            return AdmitOutcome::AlreadyPresent;
        }

        if inner.admitted.len() < self.max_notify_num {
            inner.admitted.push((key.clone(), ZoneNotifyInfo::new(Vec::new())));
            AdmitOutcome::Admit
        } else {
            inner.waiting.push_back(key.clone());
            AdmitOutcome::Queued
        }
    }

    /// Replaces the placeholder inserted by `try_reserve` with the fully
    /// resolved, armed state. No-op if the key was removed in the interim
    /// (e.g. by a shutdown racing the resolve step).
    pub fn complete_admit(&self, key: &ZoneKey, info: ZoneNotifyInfo) {
        let mut inner = self.inner.lock();
        if let Some(idx) = inner.admitted_index(key) {
            inner.admitted[idx].1 = info;
        }
    }

    pub fn admitted_keys(&self) -> Vec<ZoneKey> {
        self.inner.lock().admitted.iter().map(|(k, _)| k.clone()).collect()
    }

    pub fn admitted_count(&self) -> usize {
        self.inner.lock().admitted.len()
    }

    pub fn waiting_count(&self) -> usize {
        self.inner.lock().waiting.len()
    }

    pub fn with_zone<R>(&self, key: &ZoneKey, f: impl FnOnce(&mut ZoneNotifyInfo) -> R) -> Option<R> {
        let mut inner = self.inner.lock();
        let idx = inner.admitted_index(key)?;
        Some(f(&mut inner.admitted[idx].1))
    }

    /// Removes `key` from the admitted set, then pops the next waiting key
    /// (if room allows and the queue is non-empty) to take its place,
    /// returning that promoted key for the caller to resolve and arm.
    pub fn finish_and_promote(&self, key: &ZoneKey) -> Option<ZoneKey> {
        let mut inner = self.inner.lock();
        if let Some(idx) = inner.admitted_index(key) {
            inner.admitted.remove(idx);
        }
        if inner.admitted.len() < self.max_notify_num {
            if let Some(promoted) = inner.waiting.pop_front() {
                inner.admitted.push((promoted.clone(), ZoneNotifyInfo::new(Vec::new())));
                return Some(promoted);
            }
        }
        None
    }

    pub fn clear_all(&self) {
        let mut inner = self.inner.lock();
        inner.admitted.clear();
        inner.waiting.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::RRClass;

    fn key(name: &str) -> ZoneKey {
        ZoneKey::new(name, RRClass::IN)
    }

    #[test]
    fn rejects_unconfigured_zone() {
        let state = AdmissionState::new(2, HashSet::new());
        assert!(matches!(state.try_reserve(&key("example.com.")), AdmitOutcome::Rejected));
    }

    #[test]
    fn admits_up_to_cap_then_queues() {
        let mut configured = HashSet::new();
        configured.insert(key("a.example."));
        configured.insert(key("b.example."));
        configured.insert(key("c.example."));
        let state = AdmissionState::new(2, configured);

        assert!(matches!(state.try_reserve(&key("a.example.")), AdmitOutcome::Admit));
        assert!(matches!(state.try_reserve(&key("b.example.")), AdmitOutcome::Admit));
        assert!(matches!(state.try_reserve(&key("c.example.")), AdmitOutcome::Queued));
        assert_eq!(state.admitted_count(), 2);
        assert_eq!(state.waiting_count(), 1);
    }

    #[test]
    fn duplicate_reserve_is_a_no_op() {
        let mut configured = HashSet::new();
        configured.insert(key("a.example."));
        let state = AdmissionState::new(2, configured);

        assert!(matches!(state.try_reserve(&key("a.example.")), AdmitOutcome::Admit));
        assert!(matches!(state.try_reserve(&key("a.example.")), AdmitOutcome::AlreadyPresent));
    }

    #[test]
    fn finish_promotes_from_waiting() {
        let mut configured = HashSet::new();
        configured.insert(key("a.example."));
        configured.insert(key("b.example."));
        let state = AdmissionState::new(1, configured);

        state.try_reserve(&key("a.example."));
        state.try_reserve(&key("b.example."));
        assert_eq!(state.waiting_count(), 1);

        let promoted = state.finish_and_promote(&key("a.example."));
        assert_eq!(promoted, Some(key("b.example.")));
        assert_eq!(state.admitted_count(), 1);
        assert_eq!(state.waiting_count(), 0);
    }
}
