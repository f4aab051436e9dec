//! The NOTIFY dispatcher: a single background worker plus a handle producers
//! use to enqueue zones and to shut the worker down.

mod admission;
mod clock;
mod counters;
mod resolver;
mod socket;
mod state;
mod wakeup;
mod worker;

pub use admission::AdmitOutcome;
pub use clock::{Clock, SystemClock};
pub use counters::{CounterError, CounterMetric, CounterStore, InMemoryCounterStore};
pub use socket::{AddressFamily, AsyncUdpSocket, SocketFactory, TokioSocketFactory};
pub use state::ZoneKey;

#[cfg(test)]
pub use clock::FakeClock;
#[cfg(test)]
pub use socket::mock::{MockSocket, MockSocketFactory};

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::NotifyConfig;
use crate::error::{NotifyError, Result};
use crate::metrics::NotifyMetrics;
use crate::zone::SharedZoneDataSource;

use admission::AdmissionState;
use wakeup::Wakeup;
use worker::Worker;

/// A handle to the running dispatcher worker. Cloning shares the same
/// worker; `send_notify` and `shutdown` are safe to call from any clone.
#[derive(Clone)]
pub struct DispatcherHandle {
    admission: Arc<AdmissionState>,
    wakeup: Arc<Wakeup>,
    join: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl DispatcherHandle {
    /// Enqueues a NOTIFY dispatch for `zone_name`/`class` (§4.5). Returns
    /// `true` unless the zone key is not in the configured zone set; this is
    /// a fire-and-forget queue interface, not a delivery acknowledgment.
    pub fn send_notify(&self, zone_name: &str, class: crate::wire::RRClass) -> bool {
        let key = ZoneKey::new(zone_name, class);
        match self.admission.try_reserve(&key) {
            AdmitOutcome::Rejected => false,
            AdmitOutcome::AlreadyPresent | AdmitOutcome::Queued => true,
            AdmitOutcome::Admit => {
                self.wakeup.signal();
                true
            }
        }
    }

    /// Signals the worker to stop and waits for it to exit (§4.7).
    pub async fn shutdown(&self) -> Result<()> {
        self.wakeup.request_stop();
        let handle = self.join.lock().take();
        if let Some(handle) = handle {
            handle.await.map_err(|e| NotifyError::WorkerJoin(e.to_string()))?;
        }
        Ok(())
    }
}

/// The construction parameters for a dispatcher worker, held until the first
/// call to [`Dispatcher::dispatcher`] actually spawns it.
struct SpawnArgs {
    config: NotifyConfig,
    configured_zones: HashSet<ZoneKey>,
    data_source: SharedZoneDataSource,
    counters: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
    sockets: Arc<dyn SocketFactory>,
    metrics: Option<Arc<NotifyMetrics>>,
}

enum DispatcherState {
    NotStarted(SpawnArgs),
    Running(DispatcherHandle),
}

/// Builds a dispatcher worker lazily. Mirrors the spec's `dispatcher()`
/// accessor (§6): `dispatcher()` launches the worker on its first call and
/// is idempotent on every call after that, returning the same handle rather
/// than spawning a second worker.
pub struct Dispatcher {
    state: Mutex<DispatcherState>,
}

impl Dispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: NotifyConfig,
        configured_zones: HashSet<ZoneKey>,
        data_source: SharedZoneDataSource,
        counters: Arc<dyn CounterStore>,
        clock: Arc<dyn Clock>,
        sockets: Arc<dyn SocketFactory>,
        metrics: Option<Arc<NotifyMetrics>>,
    ) -> Self {
        Self {
            state: Mutex::new(DispatcherState::NotStarted(SpawnArgs {
                config,
                configured_zones,
                data_source,
                counters,
                clock,
                sockets,
                metrics,
            })),
        }
    }

    /// Launches the worker if it is not already running; idempotent.
    pub fn dispatcher(&self) -> DispatcherHandle {
        let mut state = self.state.lock();
        match &*state {
            DispatcherState::Running(handle) => return handle.clone(),
            DispatcherState::NotStarted(_) => {}
        }

        let DispatcherState::NotStarted(args) =
            std::mem::replace(&mut *state, DispatcherState::NotStarted(SpawnArgs::empty()))
        else {
            unreachable!("checked above")
        };

        let handle = spawn_worker(args);
        *state = DispatcherState::Running(handle.clone());
        handle
    }

    /// Convenience for callers that only ever start one dispatcher and have
    /// no use for holding onto the `Dispatcher` itself: builds and launches
    /// it in one step.
    #[allow(clippy::too_many_arguments)]
    pub fn spawn(
        config: NotifyConfig,
        configured_zones: HashSet<ZoneKey>,
        data_source: SharedZoneDataSource,
        counters: Arc<dyn CounterStore>,
        clock: Arc<dyn Clock>,
        sockets: Arc<dyn SocketFactory>,
        metrics: Option<Arc<NotifyMetrics>>,
    ) -> DispatcherHandle {
        Self::new(config, configured_zones, data_source, counters, clock, sockets, metrics).dispatcher()
    }
}

impl SpawnArgs {
    /// Placeholder used only to satisfy `mem::replace`'s need for a value to
    /// put back; immediately overwritten in `Dispatcher::dispatcher` and
    /// never observed otherwise.
    fn empty() -> Self {
        Self {
            config: NotifyConfig::default(),
            configured_zones: HashSet::new(),
            data_source: Arc::new(crate::zone::InMemoryZoneDataSource::new()),
            counters: Arc::new(InMemoryCounterStore::new()),
            clock: Arc::new(clock::SystemClock),
            sockets: Arc::new(TokioSocketFactory::new(None)),
            metrics: None,
        }
    }
}

fn spawn_worker(args: SpawnArgs) -> DispatcherHandle {
    let admission = Arc::new(AdmissionState::new(args.config.max_notify_num, args.configured_zones));
    let wakeup = Arc::new(Wakeup::new());

    let worker = Worker {
        config: args.config,
        admission: admission.clone(),
        wakeup: wakeup.clone(),
        clock: args.clock,
        sockets: args.sockets,
        data_source: args.data_source,
        counters: args.counters,
        metrics: args.metrics,
    };

    info!("spawning dispatcher worker task");
    let join = tokio::spawn(worker.run());

    DispatcherHandle {
        admission,
        wakeup,
        join: Arc::new(Mutex::new(Some(join))),
    }
}
