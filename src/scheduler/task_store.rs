use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::{
    Assignment, JobSnapshot, MapReport, MapTask, MapUnitSnapshot, Phase, ReduceReport,
    ReduceTask, ReduceUnitSnapshot, ReportOutcome, SchedulerError, UnitStatus,
};

/// Status of one unit plus the time it was last handed out.
///
/// `attempt` counts hand-outs, so each assignment of the unit carries a
/// distinct token.
#[derive(Debug, Clone, Default)]
struct Lease {
    status: UnitStatus,
    assigned_at: Option<Instant>,
    attempt: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Claim {
    Idle,
    /// Running for longer than the task timeout; its worker is presumed dead.
    Expired,
}

impl Lease {
    fn claim(&self, now: Instant, timeout: Duration) -> Option<Claim> {
        match self.status {
            UnitStatus::Idle => Some(Claim::Idle),
            UnitStatus::Running => self
                .assigned_at
                .filter(|at| now.saturating_duration_since(*at) > timeout)
                .map(|_| Claim::Expired),
            UnitStatus::Completed => None,
        }
    }

    fn start(&mut self, now: Instant) {
        self.status = UnitStatus::Running;
        self.assigned_at = Some(now);
        self.attempt += 1;
    }

    fn complete(&mut self) {
        self.status = UnitStatus::Completed;
    }

    fn reset(&mut self) {
        self.status = UnitStatus::Idle;
        self.assigned_at = None;
    }

    fn running_for(&self, now: Instant) -> Option<Duration> {
        match self.status {
            UnitStatus::Running => self.assigned_at.map(|at| now.saturating_duration_since(at)),
            _ => None,
        }
    }
}

/// Claim the first unit, in index order, that is Idle or whose lease expired.
fn claim_next<'a>(
    leases: impl Iterator<Item = &'a mut Lease>,
    now: Instant,
    timeout: Duration,
) -> Option<(usize, Claim)> {
    for (index, lease) in leases.enumerate() {
        if let Some(claim) = lease.claim(now, timeout) {
            lease.start(now);
            return Some((index, claim));
        }
    }
    None
}

#[derive(Debug, Clone)]
struct MapUnit {
    input_identifier: String,
    input_index: u32,
    lease: Lease,
    produced: Vec<String>,
}

#[derive(Debug, Clone)]
struct ReduceUnit {
    bucket_index: u32,
    lease: Lease,
    output: Option<String>,
}

/// Every map and reduce unit of the job, plus the job phase.
///
/// Plain data: callers serialize access (see [`super::Scheduler`]). Map units
/// are stored at their input index, so scanning the vector is scanning in
/// input order.
#[derive(Debug, Clone)]
pub struct TaskStore {
    phase: Phase,
    n_reduce: u32,
    map_units: Vec<MapUnit>,
    map_lookup: HashMap<String, usize>,
    reduce_units: Vec<ReduceUnit>,
    maps_remaining: usize,
    reduces_remaining: usize,
}

impl TaskStore {
    /// Create every unit of a job. Input `i` of `inputs` becomes map unit `i`.
    ///
    /// A job without inputs has nothing to map and starts in [`Phase::Reduce`].
    pub fn new(inputs: Vec<String>, n_reduce: u32) -> Result<Self, SchedulerError> {
        if n_reduce == 0 {
            return Err(SchedulerError::NoReduceBuckets);
        }

        let mut map_lookup = HashMap::with_capacity(inputs.len());
        let mut map_units = Vec::with_capacity(inputs.len());
        for (index, input_identifier) in inputs.into_iter().enumerate() {
            if map_lookup.insert(input_identifier.clone(), index).is_some() {
                return Err(SchedulerError::DuplicateInput(input_identifier));
            }
            map_units.push(MapUnit {
                input_identifier,
                input_index: index as u32,
                lease: Lease::default(),
                produced: Vec::new(),
            });
        }

        let reduce_units = (0..n_reduce)
            .map(|bucket_index| ReduceUnit {
                bucket_index,
                lease: Lease::default(),
                output: None,
            })
            .collect();

        let maps_remaining = map_units.len();
        let mut store = Self {
            phase: Phase::Map,
            n_reduce,
            map_units,
            map_lookup,
            reduce_units,
            maps_remaining,
            reduces_remaining: n_reduce as usize,
        };
        if store.maps_remaining == 0 {
            store.advance();
        }
        Ok(store)
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_done(&self) -> bool {
        self.phase == Phase::Done
    }

    pub fn n_reduce(&self) -> u32 {
        self.n_reduce
    }

    pub fn map_unit_count(&self) -> u32 {
        self.map_units.len() as u32
    }

    pub fn maps_remaining(&self) -> usize {
        self.maps_remaining
    }

    pub fn reduces_remaining(&self) -> usize {
        self.reduces_remaining
    }

    /// Step to the next phase. Phases only move forward, one at a time.
    fn advance(&mut self) {
        if let Some(to) = self.phase.next() {
            info!(from = ?self.phase, ?to, "job phase transition");
            self.phase = to;
        }
    }

    pub fn assign_map(&mut self, now: Instant, timeout: Duration) -> Assignment<MapTask> {
        if self.phase != Phase::Map {
            return Assignment::PhaseAdvance;
        }

        let leases = self.map_units.iter_mut().map(|unit| &mut unit.lease);
        let Some((index, claim)) = claim_next(leases, now, timeout) else {
            return Assignment::NoneAvailable;
        };

        let unit = &self.map_units[index];
        let attempt = unit.lease.attempt;
        if claim == Claim::Expired {
            warn!(
                input = %unit.input_identifier,
                index = unit.input_index,
                "map unit exceeded its timeout, reassigning"
            );
        }
        debug!(input = %unit.input_identifier, index = unit.input_index, attempt, "assigned map unit");

        Assignment::Unit(MapTask {
            input_identifier: unit.input_identifier.clone(),
            input_index: unit.input_index,
            reduce_count: self.n_reduce,
            attempt,
        })
    }

    pub fn assign_reduce(&mut self, now: Instant, timeout: Duration) -> Assignment<ReduceTask> {
        match self.phase {
            Phase::Map => return Assignment::NoneAvailable,
            Phase::Done => return Assignment::PhaseAdvance,
            Phase::Reduce => {}
        }

        let leases = self.reduce_units.iter_mut().map(|unit| &mut unit.lease);
        let Some((index, claim)) = claim_next(leases, now, timeout) else {
            return Assignment::NoneAvailable;
        };

        let unit = &self.reduce_units[index];
        let (bucket_index, attempt) = (unit.bucket_index, unit.lease.attempt);
        if claim == Claim::Expired {
            warn!(bucket = bucket_index, "reduce unit exceeded its timeout, reassigning");
        }
        debug!(bucket = bucket_index, attempt, "assigned reduce unit");

        Assignment::Unit(ReduceTask {
            bucket_index,
            map_unit_count: self.map_unit_count(),
            attempt,
        })
    }

    pub fn report_map(&mut self, report: MapReport) -> Result<ReportOutcome, SchedulerError> {
        if report.status == UnitStatus::Running {
            return Err(SchedulerError::RunningReport);
        }
        let index = *self
            .map_lookup
            .get(&report.input_identifier)
            .ok_or_else(|| SchedulerError::UnknownMapUnit(report.input_identifier.clone()))?;

        let unit = &mut self.map_units[index];
        let outcome = apply_report(&mut unit.lease, report.status, report.attempt);
        match (outcome, report.status) {
            (ReportOutcome::Applied, UnitStatus::Completed) => {
                unit.produced = report.produced_blob_names;
                info!(input = %unit.input_identifier, index = unit.input_index, "map unit completed");
                self.maps_remaining -= 1;
                if self.maps_remaining == 0 {
                    self.advance();
                }
            }
            (ReportOutcome::Applied, _) => {
                warn!(input = %unit.input_identifier, "map unit failed, back to idle");
            }
            (outcome, status) => {
                debug!(input = %unit.input_identifier, ?status, ?outcome, "map report had no effect");
            }
        }
        Ok(outcome)
    }

    pub fn report_reduce(&mut self, report: ReduceReport) -> Result<ReportOutcome, SchedulerError> {
        if report.status == UnitStatus::Running {
            return Err(SchedulerError::RunningReport);
        }
        let unit = self
            .reduce_units
            .get_mut(report.bucket_index as usize)
            .ok_or(SchedulerError::UnknownBucket(report.bucket_index))?;

        // No reduce unit has been handed out yet, so nothing can have run.
        if self.phase == Phase::Map {
            warn!(bucket = unit.bucket_index, status = ?report.status, "reduce report during map phase ignored");
            return Ok(ReportOutcome::Ignored);
        }

        let outcome = apply_report(&mut unit.lease, report.status, report.attempt);
        match (outcome, report.status) {
            (ReportOutcome::Applied, UnitStatus::Completed) => {
                unit.output = report.output_blob_name;
                info!(bucket = unit.bucket_index, "reduce unit completed");
                self.reduces_remaining -= 1;
                if self.reduces_remaining == 0 {
                    self.advance();
                }
            }
            (ReportOutcome::Applied, _) => {
                warn!(bucket = unit.bucket_index, "reduce unit failed, back to idle");
            }
            (outcome, status) => {
                debug!(bucket = unit.bucket_index, ?status, ?outcome, "reduce report had no effect");
            }
        }
        Ok(outcome)
    }

    pub fn snapshot(&self, now: Instant) -> JobSnapshot {
        let running_ms = |lease: &Lease| lease.running_for(now).map(|d| d.as_millis() as u64);
        JobSnapshot {
            phase: self.phase,
            reduce_count: self.n_reduce,
            maps_remaining: self.maps_remaining as u32,
            reduces_remaining: self.reduces_remaining as u32,
            map_units: self
                .map_units
                .iter()
                .map(|unit| MapUnitSnapshot {
                    input_identifier: unit.input_identifier.clone(),
                    input_index: unit.input_index,
                    status: unit.lease.status,
                    running_ms: running_ms(&unit.lease),
                    produced_blob_names: unit.produced.clone(),
                })
                .collect(),
            reduce_units: self
                .reduce_units
                .iter()
                .map(|unit| ReduceUnitSnapshot {
                    bucket_index: unit.bucket_index,
                    status: unit.lease.status,
                    running_ms: running_ms(&unit.lease),
                    output_blob_name: unit.output.clone(),
                })
                .collect(),
        }
    }
}

/// Apply a Completed or Idle report from `attempt` to a lease.
///
/// The first Completed report wins, whichever attempt sent it; later ones are
/// duplicates. A failure report only matters while the unit is Running under
/// the same attempt that failed.
fn apply_report(lease: &mut Lease, status: UnitStatus, attempt: u64) -> ReportOutcome {
    match (status, lease.status) {
        (UnitStatus::Completed, UnitStatus::Completed) => ReportOutcome::Duplicate,
        (UnitStatus::Completed, _) => {
            lease.complete();
            ReportOutcome::Applied
        }
        (_, UnitStatus::Running) if attempt == lease.attempt => {
            lease.reset();
            ReportOutcome::Applied
        }
        (_, UnitStatus::Running) => ReportOutcome::Ignored,
        (_, UnitStatus::Idle) => ReportOutcome::Duplicate,
        (_, UnitStatus::Completed) => ReportOutcome::Ignored,
    }
}
