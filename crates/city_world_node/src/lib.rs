//! Background world runtime: owns the shared world state, drives the cycle
//! scheduler on a worker thread, and hands out operation handles.
//!
//! The runtime and every `WorldHandle` clone share one mutex around the
//! kernel, so precondition checks, capacity arithmetic, and scheduler
//! mutations never interleave, and snapshots observe a consistent
//! point-in-time view.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::Value;
use tracing::{debug, info};

use city_world::{
    initialize_world, now_unix_ms, FacilityId, FacilityKind, PersonId, RegisterOutcome, Snapshot,
    TransitionOutcome, WorldClock, WorldConfig, WorldError, WorldKernel,
};

/// Floor for the scheduler poll interval, whatever the time rate.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// The scheduler polls inversely proportionally to the time rate: one second
/// of wall time per world-clock unit at rate 1, faster as the world speeds
/// up, floored at [`MIN_POLL_INTERVAL`].
pub fn poll_interval(time_rate: u64) -> Duration {
    Duration::from_millis(1_000 / time_rate.max(1)).max(MIN_POLL_INTERVAL)
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    AlreadyRunning,
    NotRunning,
    ThreadSpawnFailed { reason: String },
    ThreadJoinFailed,
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeError::AlreadyRunning => write!(f, "world runtime already running"),
            RuntimeError::NotRunning => write!(f, "world runtime not running"),
            RuntimeError::ThreadSpawnFailed { reason } => {
                write!(f, "failed to spawn scheduler thread: {}", reason)
            }
            RuntimeError::ThreadJoinFailed => write!(f, "failed to join scheduler thread"),
        }
    }
}

impl std::error::Error for RuntimeError {}

// ============================================================================
// Runtime State
// ============================================================================

#[derive(Debug, Clone, Default)]
struct RuntimeState {
    tick_count: u64,
    last_tick_unix_ms: Option<i64>,
    last_clock: WorldClock,
}

/// Observable runtime bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeSnapshot {
    pub running: bool,
    pub tick_count: u64,
    pub last_tick_unix_ms: Option<i64>,
    pub last_clock: WorldClock,
}

// ============================================================================
// WorldRuntime
// ============================================================================

/// Owner of the world state and the scheduler worker thread.
///
/// `new` initializes the world from the config (population plus initial
/// queue fills); `start` spawns the polling loop; `stop` signals it and
/// joins. Dropping a running runtime stops it.
#[derive(Debug)]
pub struct WorldRuntime {
    seed: u64,
    time_rate: u64,
    world: Arc<Mutex<WorldKernel>>,
    running: Arc<AtomicBool>,
    state: Arc<Mutex<RuntimeState>>,
    stop_tx: Option<mpsc::Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl WorldRuntime {
    pub fn new(config: WorldConfig) -> Self {
        let config = config.sanitized();
        let seed = match config.seed {
            0 => now_unix_ms() as u64,
            seed => seed,
        };
        let mut rng = StdRng::seed_from_u64(seed);
        let (kernel, _report) = initialize_world(&config, &mut rng);
        Self {
            seed,
            time_rate: config.time_rate,
            world: Arc::new(Mutex::new(kernel)),
            running: Arc::new(AtomicBool::new(false)),
            state: Arc::new(Mutex::new(RuntimeState::default())),
            stop_tx: None,
            worker: None,
        }
    }

    /// A cloneable facade over the shared world state. Valid before, during,
    /// and after the scheduler runs.
    pub fn handle(&self) -> WorldHandle {
        WorldHandle {
            world: Arc::clone(&self.world),
        }
    }

    pub fn start(&mut self) -> Result<(), RuntimeError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(RuntimeError::AlreadyRunning);
        }

        let interval = poll_interval(self.time_rate);
        let world = Arc::clone(&self.world);
        let running = Arc::clone(&self.running);
        let state = Arc::clone(&self.state);
        let mut rng = StdRng::seed_from_u64(self.seed);
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let worker = thread::Builder::new()
            .name("city-world-scheduler".to_string())
            .spawn(move || {
                loop {
                    match stop_rx.recv_timeout(interval) {
                        Ok(()) => break,
                        Err(mpsc::RecvTimeoutError::Timeout) => {
                            let report = {
                                let mut kernel = lock(&world);
                                kernel.run_cycles(&mut rng)
                            };
                            let mut current = lock(&state);
                            current.tick_count = current.tick_count.saturating_add(1);
                            current.last_tick_unix_ms = Some(now_unix_ms());
                            current.last_clock = report.clock;
                            drop(current);
                            if report.fired_anything() {
                                debug!(clock = report.clock, "scheduler cycle fired");
                            }
                        }
                        Err(mpsc::RecvTimeoutError::Disconnected) => break,
                    }
                }
                running.store(false, Ordering::SeqCst);
            })
            .map_err(|err| {
                self.running.store(false, Ordering::SeqCst);
                RuntimeError::ThreadSpawnFailed {
                    reason: err.to_string(),
                }
            })?;

        self.stop_tx = Some(stop_tx);
        self.worker = Some(worker);
        info!(poll_ms = interval.as_millis() as u64, "world runtime started");
        Ok(())
    }

    pub fn stop(&mut self) -> Result<(), RuntimeError> {
        if !self.running.load(Ordering::SeqCst) && self.worker.is_none() {
            return Err(RuntimeError::NotRunning);
        }
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(worker) = self.worker.take() {
            worker.join().map_err(|_| RuntimeError::ThreadJoinFailed)?;
        }
        self.running.store(false, Ordering::SeqCst);
        info!("world runtime stopped");
        Ok(())
    }

    pub fn status(&self) -> RuntimeSnapshot {
        let state = lock(&self.state);
        RuntimeSnapshot {
            running: self.running.load(Ordering::SeqCst),
            tick_count: state.tick_count,
            last_tick_unix_ms: state.last_tick_unix_ms,
            last_clock: state.last_clock,
        }
    }
}

impl Drop for WorldRuntime {
    fn drop(&mut self) {
        if self.worker.is_some() {
            let _ = self.stop();
        }
    }
}

// ============================================================================
// WorldHandle
// ============================================================================

/// Cloneable operation facade. Every call locks the shared kernel for the
/// duration of the operation, so a check-then-act sequence is atomic with
/// respect to both other callers and the scheduler.
#[derive(Debug, Clone)]
pub struct WorldHandle {
    world: Arc<Mutex<WorldKernel>>,
}

impl WorldHandle {
    pub fn register(
        &self,
        kind: FacilityKind,
        max_capacity: i64,
        attributes: BTreeMap<String, Value>,
    ) -> Result<RegisterOutcome, WorldError> {
        lock(&self.world).register(kind, max_capacity, attributes)
    }

    pub fn snapshot(&self, facility_id: FacilityId) -> Result<Snapshot, WorldError> {
        lock(&self.world).snapshot(facility_id)
    }

    pub fn accept(&self, facility_id: FacilityId, person_ids: &[PersonId]) -> TransitionOutcome {
        lock(&self.world).accept(facility_id, person_ids)
    }

    pub fn service_done(
        &self,
        facility_id: FacilityId,
        person_ids: &[PersonId],
    ) -> TransitionOutcome {
        lock(&self.world).service_done(facility_id, person_ids)
    }

    pub fn update_self(
        &self,
        facility_id: FacilityId,
        max_capacity: i64,
        attributes: BTreeMap<String, Value>,
    ) -> bool {
        lock(&self.world).update_self(facility_id, max_capacity, attributes)
    }

    pub fn person_injury(
        &self,
        facility_id: FacilityId,
        person_ids: &[PersonId],
    ) -> TransitionOutcome {
        lock(&self.world).person_injury(facility_id, person_ids)
    }

    pub fn person_death(
        &self,
        facility_id: FacilityId,
        person_ids: &[PersonId],
    ) -> TransitionOutcome {
        lock(&self.world).person_death(facility_id, person_ids)
    }

    pub fn start_earthquake(&self) {
        lock(&self.world).start_earthquake();
    }

    pub fn stop_earthquake(&self) {
        lock(&self.world).stop_earthquake();
    }

    pub fn earthquake_active(&self) -> bool {
        lock(&self.world).earthquake_active()
    }

    pub fn clock(&self) -> WorldClock {
        lock(&self.world).clock()
    }

    pub fn person_count(&self) -> usize {
        lock(&self.world).model().persons.len()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
