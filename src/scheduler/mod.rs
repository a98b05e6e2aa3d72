//! The coordinator's task-assignment state machine.
//!
//! [`Scheduler`] owns the [`TaskStore`] behind one mutex. Every operation takes
//! the lock once and does all of its check-then-act work inside that single
//! critical section. Nothing inside the lock blocks or awaits.

use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;

mod task_store;

pub use task_store::TaskStore;

/// Job-wide stage. Ordered `Map < Reduce < Done`; never moves backward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Phase {
    Map,
    Reduce,
    Done,
}

impl Phase {
    /// The phase that follows this one, if any.
    pub fn next(self) -> Option<Phase> {
        match self {
            Phase::Map => Some(Phase::Reduce),
            Phase::Reduce => Some(Phase::Done),
            Phase::Done => None,
        }
    }
}

/// Lifecycle status of a single map or reduce unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum UnitStatus {
    #[default]
    Idle,
    Running,
    Completed,
}

/// Result of asking for work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assignment<T> {
    /// A unit, now marked Running on behalf of the caller.
    Unit(T),
    /// Nothing is assignable right now; poll again later.
    NoneAvailable,
    /// This phase has no more work ever. For reduce this means the job is done.
    PhaseAdvance,
}

impl<T> Assignment<T> {
    pub fn unit(self) -> Option<T> {
        match self {
            Assignment::Unit(task) => Some(task),
            _ => None,
        }
    }
}

/// An [`Assignment`] along with the job phase observed when it was made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch<T> {
    pub phase: Phase,
    pub assignment: Assignment<T>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapTask {
    pub input_identifier: String,
    pub input_index: u32,
    pub reduce_count: u32,
    /// Lease token; echoed back in the report for this unit.
    pub attempt: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReduceTask {
    pub bucket_index: u32,
    pub map_unit_count: u32,
    pub attempt: u64,
}

/// A worker's verdict on a map unit: `Completed`, or `Idle` for failure.
///
/// `attempt` is the token from the [`MapTask`] being reported. A failure
/// report only takes effect while that attempt still holds the unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapReport {
    pub input_identifier: String,
    pub attempt: u64,
    pub status: UnitStatus,
    pub produced_blob_names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReduceReport {
    pub bucket_index: u32,
    pub attempt: u64,
    pub status: UnitStatus,
    pub output_blob_name: Option<String>,
}

/// What a status report did to the Task Store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportOutcome {
    /// The unit changed state.
    Applied,
    /// The unit was already in the reported state.
    Duplicate,
    /// A report that arrived too late or too early to matter: a failure from
    /// an attempt that no longer holds the unit, or a reduce report during Map.
    Ignored,
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("reduce bucket count must be positive")]
    NoReduceBuckets,

    #[error("input `{0}` appears more than once")]
    DuplicateInput(String),

    #[error("no map unit for input `{0}`")]
    UnknownMapUnit(String),

    #[error("no reduce unit for bucket {0}")]
    UnknownBucket(u32),

    #[error("a unit can only be reported as completed or idle")]
    RunningReport,
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Number of reduce buckets `R`.
    pub n_reduce: u32,
    /// How long a unit may stay Running before it is handed to someone else.
    pub task_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            n_reduce: 10,
            task_timeout: Duration::from_secs(15),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MapUnitSnapshot {
    pub input_identifier: String,
    pub input_index: u32,
    pub status: UnitStatus,
    pub running_ms: Option<u64>,
    pub produced_blob_names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReduceUnitSnapshot {
    pub bucket_index: u32,
    pub status: UnitStatus,
    pub running_ms: Option<u64>,
    pub output_blob_name: Option<String>,
}

/// Point-in-time copy of the whole Task Store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobSnapshot {
    pub phase: Phase,
    pub reduce_count: u32,
    pub maps_remaining: u32,
    pub reduces_remaining: u32,
    pub map_units: Vec<MapUnitSnapshot>,
    pub reduce_units: Vec<ReduceUnitSnapshot>,
}

/// Shared scheduler state, passed by reference (usually in an `Arc`) to every
/// RPC handler.
#[derive(Debug)]
pub struct Scheduler {
    store: Mutex<TaskStore>,
    config: SchedulerConfig,
}

impl Scheduler {
    /// Create every unit of a job over `inputs`, in order.
    pub fn new(inputs: Vec<String>, config: SchedulerConfig) -> Result<Self, SchedulerError> {
        let store = TaskStore::new(inputs, config.n_reduce)?;
        Ok(Self {
            store: Mutex::new(store),
            config,
        })
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    // Each critical section leaves the store consistent, so a panic elsewhere
    // while holding the lock does not invalidate it.
    fn lock(&self) -> MutexGuard<'_, TaskStore> {
        self.store.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn assign_map_unit(&self) -> Dispatch<MapTask> {
        self.assign_map_unit_at(Instant::now())
    }

    pub fn assign_map_unit_at(&self, now: Instant) -> Dispatch<MapTask> {
        let mut store = self.lock();
        let assignment = store.assign_map(now, self.config.task_timeout);
        Dispatch {
            phase: store.phase(),
            assignment,
        }
    }

    pub fn assign_reduce_unit(&self) -> Dispatch<ReduceTask> {
        self.assign_reduce_unit_at(Instant::now())
    }

    pub fn assign_reduce_unit_at(&self, now: Instant) -> Dispatch<ReduceTask> {
        let mut store = self.lock();
        let assignment = store.assign_reduce(now, self.config.task_timeout);
        Dispatch {
            phase: store.phase(),
            assignment,
        }
    }

    pub fn report_map_status(&self, report: MapReport) -> Result<ReportOutcome, SchedulerError> {
        self.lock().report_map(report)
    }

    pub fn report_reduce_status(
        &self,
        report: ReduceReport,
    ) -> Result<ReportOutcome, SchedulerError> {
        self.lock().report_reduce(report)
    }

    pub fn is_done(&self) -> bool {
        self.lock().is_done()
    }

    pub fn phase(&self) -> Phase {
        self.lock().phase()
    }

    pub fn snapshot(&self) -> JobSnapshot {
        self.snapshot_at(Instant::now())
    }

    pub fn snapshot_at(&self, now: Instant) -> JobSnapshot {
        self.lock().snapshot(now)
    }
}
