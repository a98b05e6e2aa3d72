//! The worker loop.
//!
//! A worker polls for map units until told the map phase is over, then polls
//! for reduce units until told the job is done. Each unit runs to completion
//! before the next poll, and every unit ends in exactly one status report:
//! `Completed` on success, `Idle` on any failure.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use tonic::{Code, Status};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::scheduler::{
    Assignment, Dispatch, MapReport, MapTask, ReduceReport, ReduceTask, Scheduler,
    SchedulerError, UnitStatus,
};
use crate::store::BlobStore;
use crate::Workload;

mod map;
mod reduce;

pub use map::perform_map;
pub use reduce::perform_reduce;

/// Where a worker gets its units and sends its reports.
///
/// Implemented in-process by [`Scheduler`] and over gRPC by
/// [`RemoteCoordinator`](crate::rpc::RemoteCoordinator).
#[async_trait]
pub trait TaskSource: Send + Sync {
    async fn assign_map_unit(&self) -> Result<Dispatch<MapTask>>;
    async fn assign_reduce_unit(&self) -> Result<Dispatch<ReduceTask>>;
    async fn report_map_status(&self, report: MapReport) -> Result<()>;
    async fn report_reduce_status(&self, report: ReduceReport) -> Result<()>;
}

#[async_trait]
impl TaskSource for Scheduler {
    async fn assign_map_unit(&self) -> Result<Dispatch<MapTask>> {
        Ok(Scheduler::assign_map_unit(self))
    }

    async fn assign_reduce_unit(&self) -> Result<Dispatch<ReduceTask>> {
        Ok(Scheduler::assign_reduce_unit(self))
    }

    async fn report_map_status(&self, report: MapReport) -> Result<()> {
        Scheduler::report_map_status(self, report)?;
        Ok(())
    }

    async fn report_reduce_status(&self, report: ReduceReport) -> Result<()> {
        Scheduler::report_reduce_status(self, report)?;
        Ok(())
    }
}

#[async_trait]
impl<T: TaskSource + ?Sized> TaskSource for Arc<T> {
    async fn assign_map_unit(&self) -> Result<Dispatch<MapTask>> {
        (**self).assign_map_unit().await
    }

    async fn assign_reduce_unit(&self) -> Result<Dispatch<ReduceTask>> {
        (**self).assign_reduce_unit().await
    }

    async fn report_map_status(&self, report: MapReport) -> Result<()> {
        (**self).report_map_status(report).await
    }

    async fn report_reduce_status(&self, report: ReduceReport) -> Result<()> {
        (**self).report_reduce_status(report).await
    }
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// First sleep after a `NoneAvailable` reply.
    pub min_backoff: Duration,
    /// Upper bound for the doubling backoff.
    pub max_backoff: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            min_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(1),
        }
    }
}

/// Capped exponential backoff between unanswered polls.
#[derive(Debug)]
struct Backoff {
    next: Duration,
    min: Duration,
    max: Duration,
}

impl Backoff {
    fn new(config: &WorkerConfig) -> Self {
        let min = config.min_backoff.min(config.max_backoff);
        Self {
            next: min,
            min,
            max: config.max_backoff,
        }
    }

    fn reset(&mut self) {
        self.next = self.min;
    }

    fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = (self.next * 2).min(self.max);
        delay
    }

    async fn wait(&mut self) {
        let delay = self.next_delay();
        debug!(?delay, "no unit available, backing off");
        tokio::time::sleep(delay).await;
    }
}

/// How one unit ended, as far as this worker knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitOutcome {
    /// Ran to completion and the coordinator took the report.
    Completed,
    /// Failed and was reported back as Idle.
    Failed,
    /// The report was lost or refused, so the coordinator's view is unknown.
    Unreported,
}

/// Units a worker handled over its lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerSummary {
    pub maps_completed: usize,
    pub maps_failed: usize,
    pub reduces_completed: usize,
    pub reduces_failed: usize,
    pub unreported: usize,
}

impl WorkerSummary {
    fn record_map(&mut self, outcome: UnitOutcome) {
        match outcome {
            UnitOutcome::Completed => self.maps_completed += 1,
            UnitOutcome::Failed => self.maps_failed += 1,
            UnitOutcome::Unreported => self.unreported += 1,
        }
    }

    fn record_reduce(&mut self, outcome: UnitOutcome) {
        match outcome {
            UnitOutcome::Completed => self.reduces_completed += 1,
            UnitOutcome::Failed => self.reduces_failed += 1,
            UnitOutcome::Unreported => self.unreported += 1,
        }
    }
}

pub struct Worker<S, B> {
    id: String,
    source: S,
    store: B,
    workload: Workload,
    aux: Bytes,
    config: WorkerConfig,
}

impl<S: TaskSource, B: BlobStore> Worker<S, B> {
    /// `aux` is handed unchanged to every map and reduce call.
    pub fn new(source: S, store: B, workload: Workload, aux: Bytes) -> Self {
        let mut id = Uuid::new_v4().simple().to_string();
        id.truncate(8);
        Self {
            id,
            source,
            store,
            workload,
            aux,
            config: WorkerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: WorkerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Work until the job is done.
    ///
    /// Unit failures are reported and counted, not returned. An error here
    /// means the task source itself could not be reached.
    pub async fn run(&self) -> Result<WorkerSummary> {
        info!(worker = %self.id, "worker started");
        let mut summary = WorkerSummary::default();
        let mut backoff = Backoff::new(&self.config);

        loop {
            let dispatch = self.source.assign_map_unit().await?;
            match dispatch.assignment {
                Assignment::Unit(task) => {
                    backoff.reset();
                    summary.record_map(self.execute_map(task).await);
                }
                Assignment::NoneAvailable => backoff.wait().await,
                Assignment::PhaseAdvance => break,
            }
        }
        info!(worker = %self.id, "map phase over");

        backoff.reset();
        loop {
            let dispatch = self.source.assign_reduce_unit().await?;
            match dispatch.assignment {
                Assignment::Unit(task) => {
                    backoff.reset();
                    summary.record_reduce(self.execute_reduce(task).await);
                }
                Assignment::NoneAvailable => backoff.wait().await,
                Assignment::PhaseAdvance => break,
            }
        }

        info!(worker = %self.id, ?summary, "job done, worker exiting");
        Ok(summary)
    }

    /// Run one map unit and report the result.
    pub async fn execute_map(&self, task: MapTask) -> UnitOutcome {
        info!(worker = %self.id, input = %task.input_identifier, index = task.input_index, "running map unit");
        let report = match perform_map(&self.store, self.workload, &self.aux, &task).await {
            Ok(produced_blob_names) => MapReport {
                input_identifier: task.input_identifier,
                attempt: task.attempt,
                status: UnitStatus::Completed,
                produced_blob_names,
            },
            Err(e) => {
                warn!(worker = %self.id, input = %task.input_identifier, "map unit failed: {e:#}");
                MapReport {
                    input_identifier: task.input_identifier,
                    attempt: task.attempt,
                    status: UnitStatus::Idle,
                    produced_blob_names: Vec::new(),
                }
            }
        };

        let status = report.status;
        self.send_report(status, self.source.report_map_status(report).await)
    }

    /// Run one reduce unit and report the result.
    pub async fn execute_reduce(&self, task: ReduceTask) -> UnitOutcome {
        info!(worker = %self.id, bucket = task.bucket_index, "running reduce unit");
        let report = match perform_reduce(&self.store, self.workload, &self.aux, &task).await {
            Ok(output) => ReduceReport {
                bucket_index: task.bucket_index,
                attempt: task.attempt,
                status: UnitStatus::Completed,
                output_blob_name: Some(output),
            },
            Err(e) => {
                warn!(worker = %self.id, bucket = task.bucket_index, "reduce unit failed: {e:#}");
                ReduceReport {
                    bucket_index: task.bucket_index,
                    attempt: task.attempt,
                    status: UnitStatus::Idle,
                    output_blob_name: None,
                }
            }
        };

        let status = report.status;
        self.send_report(status, self.source.report_reduce_status(report).await)
    }

    // A lost report is not fatal: the unit stays Running and is reclaimed
    // once its timeout passes.
    fn send_report(&self, status: UnitStatus, result: Result<()>) -> UnitOutcome {
        match result {
            Ok(()) if status == UnitStatus::Completed => UnitOutcome::Completed,
            Ok(()) => UnitOutcome::Failed,
            Err(e) if is_rejection(&e) => {
                error!(worker = %self.id, ?status, "coordinator rejected status report: {e:#}");
                UnitOutcome::Unreported
            }
            Err(e) => {
                warn!(worker = %self.id, ?status, "status report was lost: {e:#}");
                UnitOutcome::Unreported
            }
        }
    }
}

/// Whether the coordinator received a report and refused it, as opposed to
/// the report never arriving.
fn is_rejection(err: &anyhow::Error) -> bool {
    if err.downcast_ref::<SchedulerError>().is_some() {
        return true;
    }
    err.downcast_ref::<Status>().is_some_and(|status| {
        matches!(
            status.code(),
            Code::NotFound | Code::InvalidArgument | Code::FailedPrecondition
        )
    })
}
