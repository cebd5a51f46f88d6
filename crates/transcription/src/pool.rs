use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::try_join_all;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::asr::RecognizerFactory;
use crate::error::{TranscribeError, TranscribeResult};
use crate::worker::{DeviceId, ModelConfig, Worker};

/// How a request wants its workers laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceMode {
    /// Up to `max_workers` workers sharing the first configured device.
    Single,
    /// One worker on every configured device, leased as a set.
    Multi,
}

impl fmt::Display for DeviceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceMode::Single => f.write_str("single"),
            DeviceMode::Multi => f.write_str("multi"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LeaseId(pub u64);

impl fmt::Display for LeaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub device_ids: Vec<DeviceId>,
    pub max_workers: usize,
    pub acquire_timeout: Duration,
}

impl PoolConfig {
    pub fn validate(&self) -> TranscribeResult<()> {
        if self.device_ids.is_empty() {
            return Err(TranscribeError::Config("worker pool needs at least one device".into()));
        }
        let unique: HashSet<DeviceId> = self.device_ids.iter().copied().collect();
        if unique.len() != self.device_ids.len() {
            return Err(TranscribeError::Config(format!(
                "duplicate device ids: {:?}",
                self.device_ids
            )));
        }
        if self.max_workers == 0 {
            return Err(TranscribeError::Config("max_workers must be at least 1".into()));
        }
        Ok(())
    }
}

/// Snapshot of one mode's bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerStatus {
    pub mode: DeviceMode,
    /// Maximum number of leasable units (a worker, or a worker set in multi mode).
    pub capacity: usize,
    pub devices: Vec<DeviceId>,
    pub live_workers: usize,
    pub leased_workers: usize,
    pub idle_workers: usize,
    /// Units currently loading a model.
    pub building: usize,
    pub waiting: usize,
    pub created_total: u64,
    pub retired_total: u64,
    pub configs: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolStatus {
    pub shut_down: bool,
    pub single: BrokerStatus,
    pub multi: BrokerStatus,
}

/// One leasable unit: a single worker, or a full device set in multi mode.
struct Slot {
    config: ModelConfig,
    workers: Vec<Arc<Worker>>,
    lease: Option<LeaseId>,
    last_used: Instant,
}

enum Grant {
    Ready { lease: LeaseId, workers: Vec<Arc<Worker>> },
    /// A reservation was made on the waiter's behalf; it must build the unit.
    Build,
    Shutdown,
}

struct Waiter {
    id: u64,
    config: ModelConfig,
    grant: oneshot::Sender<Grant>,
}

enum Take {
    Ready(LeaseId, Vec<Arc<Worker>>),
    Build,
    Wait,
}

struct Broker {
    mode: DeviceMode,
    capacity: usize,
    devices: Vec<DeviceId>,
    slots: Vec<Slot>,
    /// Units being built outside the lock; counted toward `capacity`.
    reserved: usize,
    waiters: VecDeque<Waiter>,
    created_total: u64,
    retired_total: u64,
}

impl Broker {
    fn new(mode: DeviceMode, capacity: usize, devices: Vec<DeviceId>) -> Self {
        Self {
            mode,
            capacity,
            devices,
            slots: Vec::new(),
            reserved: 0,
            waiters: VecDeque::new(),
            created_total: 0,
            retired_total: 0,
        }
    }

    fn try_take(&mut self, config: &ModelConfig, next_lease: &AtomicU64) -> Take {
        // Idle with matching config, most recently used first.
        let idle_match = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.lease.is_none() && s.config == *config)
            .max_by_key(|(_, s)| s.last_used)
            .map(|(i, _)| i);
        if let Some(pos) = idle_match {
            let lease = LeaseId(next_lease.fetch_add(1, Ordering::Relaxed));
            let slot = &mut self.slots[pos];
            slot.lease = Some(lease);
            slot.last_used = Instant::now();
            debug!(mode = %self.mode, lease = %lease, model = %config, "Reusing idle worker");
            return Take::Ready(lease, slot.workers.clone());
        }

        if self.slots.len() + self.reserved < self.capacity {
            self.reserved += 1;
            return Take::Build;
        }

        // At capacity: evict the least recently used idle unit with another config.
        let idle_stale = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.lease.is_none())
            .min_by_key(|(_, s)| s.last_used)
            .map(|(i, _)| i);
        if let Some(pos) = idle_stale {
            let evicted = self.slots.swap_remove(pos);
            self.retired_total += 1;
            self.reserved += 1;
            warn!(
                mode = %self.mode,
                evicted = %evicted.config,
                requested = %config,
                "Evicting idle worker with stale model config"
            );
            return Take::Build;
        }

        Take::Wait
    }

    /// Hands freed capacity to the head of the queue, in arrival order.
    fn service_waiters(&mut self, next_lease: &AtomicU64) {
        while let Some(head) = self.waiters.front() {
            if head.grant.is_closed() {
                self.waiters.pop_front();
                continue;
            }
            let config = head.config.clone();
            let take = self.try_take(&config, next_lease);
            if matches!(take, Take::Wait) {
                break;
            }
            let Some(waiter) = self.waiters.pop_front() else {
                break;
            };

            let grant = match take {
                Take::Ready(lease, workers) => Grant::Ready { lease, workers },
                _ => Grant::Build,
            };
            if let Err(unsent) = waiter.grant.send(grant) {
                self.revoke(unsent);
            }
        }
    }

    /// Undoes a grant nobody will consume.
    fn revoke(&mut self, grant: Grant) {
        match grant {
            Grant::Ready { lease, .. } => {
                if let Some(slot) = self.slots.iter_mut().find(|s| s.lease == Some(lease)) {
                    slot.lease = None;
                }
            }
            Grant::Build => self.reserved = self.reserved.saturating_sub(1),
            Grant::Shutdown => {}
        }
    }

    fn enqueue(&mut self, id: u64, config: &ModelConfig) -> oneshot::Receiver<Grant> {
        let (grant, rx) = oneshot::channel();
        self.waiters.push_back(Waiter {
            id,
            config: config.clone(),
            grant,
        });
        rx
    }

    fn status(&self) -> BrokerStatus {
        let live_workers = self.slots.iter().map(|s| s.workers.len()).sum();
        let leased_workers = self
            .slots
            .iter()
            .filter(|s| s.lease.is_some())
            .map(|s| s.workers.len())
            .sum();
        BrokerStatus {
            mode: self.mode,
            capacity: self.capacity,
            devices: self.devices.clone(),
            live_workers,
            leased_workers,
            idle_workers: live_workers - leased_workers,
            building: self.reserved,
            waiting: self.waiters.iter().filter(|w| !w.grant.is_closed()).count(),
            created_total: self.created_total,
            retired_total: self.retired_total,
            configs: self.slots.iter().map(|s| s.config.to_string()).collect(),
        }
    }
}

struct PoolState {
    shut_down: bool,
    single: Broker,
    multi: Broker,
}

impl PoolState {
    fn broker(&mut self, mode: DeviceMode) -> &mut Broker {
        match mode {
            DeviceMode::Single => &mut self.single,
            DeviceMode::Multi => &mut self.multi,
        }
    }
}

struct PoolShared {
    state: Mutex<PoolState>,
    factory: Arc<dyn RecognizerFactory>,
    acquire_timeout: Duration,
    next_lease: AtomicU64,
    next_waiter: AtomicU64,
}

impl PoolShared {
    fn release(&self, lease: LeaseId) -> bool {
        let mut state = self.state.lock();
        let shut_down = state.shut_down;
        for mode in [DeviceMode::Single, DeviceMode::Multi] {
            let broker = state.broker(mode);
            let Some(pos) = broker.slots.iter().position(|s| s.lease == Some(lease)) else {
                continue;
            };
            if shut_down {
                broker.slots.swap_remove(pos);
                broker.retired_total += 1;
                debug!(mode = %mode, lease = %lease, "Lease returned after shutdown, worker retired");
            } else {
                let slot = &mut broker.slots[pos];
                slot.lease = None;
                slot.last_used = Instant::now();
                debug!(mode = %mode, lease = %lease, "Lease released");
                broker.service_waiters(&self.next_lease);
            }
            return true;
        }
        false
    }
}

/// Undoes a capacity reservation unless the built unit was registered.
struct Reservation {
    shared: Arc<PoolShared>,
    mode: DeviceMode,
    armed: bool,
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = self.shared.state.lock();
        let broker = state.broker(self.mode);
        broker.reserved = broker.reserved.saturating_sub(1);
        broker.service_waiters(&self.shared.next_lease);
    }
}

/// A queued acquire. Dropping it before a grant is consumed withdraws it.
struct PendingWaiter {
    shared: Arc<PoolShared>,
    mode: DeviceMode,
    id: u64,
    rx: oneshot::Receiver<Grant>,
    settled: bool,
}

impl Drop for PendingWaiter {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let mut state = self.shared.state.lock();
        let broker = state.broker(self.mode);
        broker.waiters.retain(|w| w.id != self.id);
        // Grants are only sent under the lock, so anything in flight is visible now.
        if let Ok(grant) = self.rx.try_recv() {
            broker.revoke(grant);
        }
        broker.service_waiters(&self.shared.next_lease);
    }
}

enum Start {
    Ready(LeaseId, Vec<Arc<Worker>>),
    Build,
    Wait(u64, oneshot::Receiver<Grant>),
}

/// Brokers workers across concurrent sessions.
///
/// A worker is leased to at most one session at a time and is only reused for
/// an equal [`ModelConfig`]. Both modes share one lock held for bookkeeping only;
/// models load outside it against a reserved slot.
#[derive(Clone)]
pub struct WorkerPool {
    shared: Arc<PoolShared>,
}

impl WorkerPool {
    pub fn new(config: PoolConfig, factory: Arc<dyn RecognizerFactory>) -> TranscribeResult<Self> {
        config.validate()?;

        let primary = vec![config.device_ids[0]];
        let state = PoolState {
            shut_down: false,
            single: Broker::new(DeviceMode::Single, config.max_workers, primary),
            multi: Broker::new(DeviceMode::Multi, 1, config.device_ids.clone()),
        };
        info!(
            devices = ?config.device_ids,
            max_workers = config.max_workers,
            factory = factory.name(),
            "Worker pool created"
        );

        Ok(Self {
            shared: Arc::new(PoolShared {
                state: Mutex::new(state),
                factory,
                acquire_timeout: config.acquire_timeout,
                next_lease: AtomicU64::new(1),
                next_waiter: AtomicU64::new(1),
            }),
        })
    }

    /// Leases one worker on the primary device.
    pub async fn acquire_single(&self, config: &ModelConfig) -> TranscribeResult<WorkerLease> {
        self.acquire(DeviceMode::Single, config).await
    }

    /// Leases one worker per configured device.
    pub async fn acquire_multi(&self, config: &ModelConfig) -> TranscribeResult<WorkerLease> {
        self.acquire(DeviceMode::Multi, config).await
    }

    /// Reuses an idle matching worker, builds one under the cap, evicts an idle
    /// stale one at the cap, or waits in FIFO order up to the acquire timeout.
    pub async fn acquire(&self, mode: DeviceMode, config: &ModelConfig) -> TranscribeResult<WorkerLease> {
        let started = Instant::now();

        let start = {
            let mut state = self.shared.state.lock();
            if state.shut_down {
                return Err(TranscribeError::PoolShutdown);
            }
            let broker = state.broker(mode);
            broker.waiters.retain(|w| !w.grant.is_closed());
            if broker.waiters.is_empty() {
                match broker.try_take(config, &self.shared.next_lease) {
                    Take::Ready(lease, workers) => Start::Ready(lease, workers),
                    Take::Build => Start::Build,
                    Take::Wait => {
                        let id = self.shared.next_waiter.fetch_add(1, Ordering::Relaxed);
                        Start::Wait(id, broker.enqueue(id, config))
                    }
                }
            } else {
                let id = self.shared.next_waiter.fetch_add(1, Ordering::Relaxed);
                Start::Wait(id, broker.enqueue(id, config))
            }
        };

        match start {
            Start::Ready(lease, workers) => Ok(self.lease(lease, mode, config, workers)),
            Start::Build => {
                let reservation = self.reserve(mode);
                self.build(mode, config, reservation).await
            }
            Start::Wait(id, rx) => {
                debug!(mode = %mode, model = %config, "All workers busy, queueing");
                let mut pending = PendingWaiter {
                    shared: self.shared.clone(),
                    mode,
                    id,
                    rx,
                    settled: false,
                };

                let waited = tokio::time::timeout(self.shared.acquire_timeout, &mut pending.rx).await;
                match waited {
                    Ok(Ok(Grant::Ready { lease, workers })) => {
                        pending.settled = true;
                        Ok(self.lease(lease, mode, config, workers))
                    }
                    Ok(Ok(Grant::Build)) => {
                        pending.settled = true;
                        let reservation = self.reserve(mode);
                        self.build(mode, config, reservation).await
                    }
                    Ok(Ok(Grant::Shutdown)) | Ok(Err(_)) => {
                        pending.settled = true;
                        Err(TranscribeError::PoolShutdown)
                    }
                    Err(_) => {
                        let waited = started.elapsed();
                        info!(mode = %mode, model = %config, ?waited, "Timed out waiting for a worker");
                        Err(TranscribeError::PoolExhausted { waited })
                    }
                }
            }
        }
    }

    /// Returns a lease's workers to the idle set. Returns false if the lease
    /// was already released.
    pub fn release(&self, lease: LeaseId) -> bool {
        self.shared.release(lease)
    }

    /// Retires idle workers and fails queued acquires. Leased workers are
    /// retired when their lease comes back.
    pub fn shutdown(&self) {
        let mut state = self.shared.state.lock();
        state.shut_down = true;
        for mode in [DeviceMode::Single, DeviceMode::Multi] {
            let broker = state.broker(mode);
            let before = broker.slots.len();
            broker.slots.retain(|s| s.lease.is_some());
            broker.retired_total += (before - broker.slots.len()) as u64;
            for waiter in broker.waiters.drain(..) {
                let _ = waiter.grant.send(Grant::Shutdown);
            }
        }
        info!("Worker pool shut down");
    }

    pub fn status(&self) -> PoolStatus {
        let state = self.shared.state.lock();
        PoolStatus {
            shut_down: state.shut_down,
            single: state.single.status(),
            multi: state.multi.status(),
        }
    }

    fn reserve(&self, mode: DeviceMode) -> Reservation {
        Reservation {
            shared: self.shared.clone(),
            mode,
            armed: true,
        }
    }

    fn lease(&self, id: LeaseId, mode: DeviceMode, config: &ModelConfig, workers: Vec<Arc<Worker>>) -> WorkerLease {
        WorkerLease {
            id,
            mode,
            config: config.clone(),
            workers,
            shared: self.shared.clone(),
            released: false,
        }
    }

    async fn build(
        &self,
        mode: DeviceMode,
        config: &ModelConfig,
        mut reservation: Reservation,
    ) -> TranscribeResult<WorkerLease> {
        let devices = self.shared.state.lock().broker(mode).devices.clone();
        info!(mode = %mode, model = %config, devices = ?devices, "Building workers");

        let spawned = try_join_all(
            devices
                .iter()
                .map(|&device| Worker::spawn(device, config.clone(), self.shared.factory.clone())),
        )
        .await;
        // On error the reservation drops here and frees its slot.
        let workers: Vec<Arc<Worker>> = spawned?.into_iter().map(Arc::new).collect();

        let lease = LeaseId(self.shared.next_lease.fetch_add(1, Ordering::Relaxed));
        let mut state = self.shared.state.lock();
        reservation.armed = false;
        let shut_down = state.shut_down;
        let broker = state.broker(mode);
        broker.reserved = broker.reserved.saturating_sub(1);
        broker.created_total += 1;

        if shut_down {
            broker.retired_total += 1;
            return Err(TranscribeError::PoolShutdown);
        }

        broker.slots.push(Slot {
            config: config.clone(),
            workers: workers.clone(),
            lease: Some(lease),
            last_used: Instant::now(),
        });
        drop(state);

        Ok(self.lease(lease, mode, config, workers))
    }
}

/// Exclusive use of one worker, or one worker per device in multi mode.
///
/// Released on drop.
pub struct WorkerLease {
    id: LeaseId,
    mode: DeviceMode,
    config: ModelConfig,
    workers: Vec<Arc<Worker>>,
    shared: Arc<PoolShared>,
    released: bool,
}

impl WorkerLease {
    pub fn id(&self) -> LeaseId {
        self.id
    }

    pub fn mode(&self) -> DeviceMode {
        self.mode
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn workers(&self) -> &[Arc<Worker>] {
        &self.workers
    }

    pub fn release(mut self) -> bool {
        self.released = true;
        self.shared.release(self.id)
    }
}

impl fmt::Debug for WorkerLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerLease")
            .field("id", &self.id)
            .field("mode", &self.mode)
            .field("config", &self.config)
            .field("workers", &self.workers.len())
            .finish()
    }
}

impl Drop for WorkerLease {
    fn drop(&mut self) {
        if !self.released {
            self.shared.release(self.id);
        }
    }
}
