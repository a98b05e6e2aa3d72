//! The wire contract between coordinator and workers.
//!
//! `proto` is generated from `proto/mapreduce.proto`. The conversions below are
//! the only place that knows how domain types map onto protobuf messages, so
//! both the server and [`RemoteCoordinator`] go through them.

use tonic::Status;

use crate::scheduler::{
    Assignment, Dispatch, JobSnapshot, MapReport, MapTask, MapUnitSnapshot, Phase, ReduceReport,
    ReduceTask, ReduceUnitSnapshot, SchedulerError, UnitStatus,
};

mod client;

pub use client::{RemoteCoordinator, RetryPolicy};

pub mod proto {
    tonic::include_proto!("mapreduce");
}

use proto::{assign_map_unit_reply, assign_reduce_unit_reply};

impl From<Phase> for proto::Phase {
    fn from(phase: Phase) -> Self {
        match phase {
            Phase::Map => proto::Phase::Map,
            Phase::Reduce => proto::Phase::Reduce,
            Phase::Done => proto::Phase::Done,
        }
    }
}

impl From<proto::Phase> for Phase {
    fn from(phase: proto::Phase) -> Self {
        match phase {
            proto::Phase::Map => Phase::Map,
            proto::Phase::Reduce => Phase::Reduce,
            proto::Phase::Done => Phase::Done,
        }
    }
}

impl From<UnitStatus> for proto::UnitStatus {
    fn from(status: UnitStatus) -> Self {
        match status {
            UnitStatus::Idle => proto::UnitStatus::Idle,
            UnitStatus::Running => proto::UnitStatus::Running,
            UnitStatus::Completed => proto::UnitStatus::Completed,
        }
    }
}

impl From<proto::UnitStatus> for UnitStatus {
    fn from(status: proto::UnitStatus) -> Self {
        match status {
            proto::UnitStatus::Idle => UnitStatus::Idle,
            proto::UnitStatus::Running => UnitStatus::Running,
            proto::UnitStatus::Completed => UnitStatus::Completed,
        }
    }
}

fn phase_from_wire(value: i32) -> Result<Phase, Status> {
    proto::Phase::try_from(value)
        .map(Phase::from)
        .map_err(|_| Status::invalid_argument(format!("unknown phase {value}")))
}

fn status_from_wire(value: i32) -> Result<UnitStatus, Status> {
    proto::UnitStatus::try_from(value)
        .map(UnitStatus::from)
        .map_err(|_| Status::invalid_argument(format!("unknown unit status {value}")))
}

fn missing_outcome() -> Status {
    Status::invalid_argument("assignment reply carries no outcome")
}

impl From<Dispatch<MapTask>> for proto::AssignMapUnitReply {
    fn from(dispatch: Dispatch<MapTask>) -> Self {
        use assign_map_unit_reply::Outcome;

        let outcome = match dispatch.assignment {
            Assignment::Unit(task) => Outcome::Unit(proto::MapAssignment {
                input_identifier: task.input_identifier,
                input_index: task.input_index,
                reduce_count: task.reduce_count,
                attempt: task.attempt,
            }),
            Assignment::NoneAvailable => Outcome::NoneAvailable(proto::Empty {}),
            Assignment::PhaseAdvance => Outcome::PhaseAdvance(proto::Empty {}),
        };
        Self {
            phase: proto::Phase::from(dispatch.phase) as i32,
            outcome: Some(outcome),
        }
    }
}

impl TryFrom<proto::AssignMapUnitReply> for Dispatch<MapTask> {
    type Error = Status;

    fn try_from(reply: proto::AssignMapUnitReply) -> Result<Self, Status> {
        use assign_map_unit_reply::Outcome;

        let assignment = match reply.outcome.ok_or_else(missing_outcome)? {
            Outcome::Unit(unit) => Assignment::Unit(MapTask {
                input_identifier: unit.input_identifier,
                input_index: unit.input_index,
                reduce_count: unit.reduce_count,
                attempt: unit.attempt,
            }),
            Outcome::NoneAvailable(_) => Assignment::NoneAvailable,
            Outcome::PhaseAdvance(_) => Assignment::PhaseAdvance,
        };
        Ok(Dispatch {
            phase: phase_from_wire(reply.phase)?,
            assignment,
        })
    }
}

impl From<Dispatch<ReduceTask>> for proto::AssignReduceUnitReply {
    fn from(dispatch: Dispatch<ReduceTask>) -> Self {
        use assign_reduce_unit_reply::Outcome;

        let outcome = match dispatch.assignment {
            Assignment::Unit(task) => Outcome::Unit(proto::ReduceAssignment {
                bucket_index: task.bucket_index,
                map_unit_count: task.map_unit_count,
                attempt: task.attempt,
            }),
            Assignment::NoneAvailable => Outcome::NoneAvailable(proto::Empty {}),
            Assignment::PhaseAdvance => Outcome::JobDone(proto::Empty {}),
        };
        Self {
            phase: proto::Phase::from(dispatch.phase) as i32,
            outcome: Some(outcome),
        }
    }
}

impl TryFrom<proto::AssignReduceUnitReply> for Dispatch<ReduceTask> {
    type Error = Status;

    fn try_from(reply: proto::AssignReduceUnitReply) -> Result<Self, Status> {
        use assign_reduce_unit_reply::Outcome;

        let assignment = match reply.outcome.ok_or_else(missing_outcome)? {
            Outcome::Unit(unit) => Assignment::Unit(ReduceTask {
                bucket_index: unit.bucket_index,
                map_unit_count: unit.map_unit_count,
                attempt: unit.attempt,
            }),
            Outcome::NoneAvailable(_) => Assignment::NoneAvailable,
            Outcome::JobDone(_) => Assignment::PhaseAdvance,
        };
        Ok(Dispatch {
            phase: phase_from_wire(reply.phase)?,
            assignment,
        })
    }
}

impl From<MapReport> for proto::ReportMapStatusRequest {
    fn from(report: MapReport) -> Self {
        Self {
            status: proto::UnitStatus::from(report.status) as i32,
            input_identifier: report.input_identifier,
            produced_blob_names: report.produced_blob_names,
            attempt: report.attempt,
        }
    }
}

impl TryFrom<proto::ReportMapStatusRequest> for MapReport {
    type Error = Status;

    fn try_from(request: proto::ReportMapStatusRequest) -> Result<Self, Status> {
        Ok(Self {
            status: status_from_wire(request.status)?,
            input_identifier: request.input_identifier,
            attempt: request.attempt,
            produced_blob_names: request.produced_blob_names,
        })
    }
}

impl From<ReduceReport> for proto::ReportReduceStatusRequest {
    fn from(report: ReduceReport) -> Self {
        Self {
            status: proto::UnitStatus::from(report.status) as i32,
            bucket_index: report.bucket_index,
            output_blob_name: report.output_blob_name.unwrap_or_default(),
            attempt: report.attempt,
        }
    }
}

impl TryFrom<proto::ReportReduceStatusRequest> for ReduceReport {
    type Error = Status;

    fn try_from(request: proto::ReportReduceStatusRequest) -> Result<Self, Status> {
        Ok(Self {
            status: status_from_wire(request.status)?,
            bucket_index: request.bucket_index,
            attempt: request.attempt,
            output_blob_name: Some(request.output_blob_name).filter(|name| !name.is_empty()),
        })
    }
}

impl From<JobSnapshot> for proto::JobStatus {
    fn from(snapshot: JobSnapshot) -> Self {
        Self {
            phase: proto::Phase::from(snapshot.phase) as i32,
            reduce_count: snapshot.reduce_count,
            maps_remaining: snapshot.maps_remaining,
            reduces_remaining: snapshot.reduces_remaining,
            map_units: snapshot
                .map_units
                .into_iter()
                .map(|unit| proto::MapUnitStatus {
                    input_identifier: unit.input_identifier,
                    input_index: unit.input_index,
                    status: proto::UnitStatus::from(unit.status) as i32,
                    running_ms: unit.running_ms,
                    produced_blob_names: unit.produced_blob_names,
                })
                .collect(),
            reduce_units: snapshot
                .reduce_units
                .into_iter()
                .map(|unit| proto::ReduceUnitStatus {
                    bucket_index: unit.bucket_index,
                    status: proto::UnitStatus::from(unit.status) as i32,
                    running_ms: unit.running_ms,
                    output_blob_name: unit.output_blob_name,
                })
                .collect(),
        }
    }
}

impl TryFrom<proto::JobStatus> for JobSnapshot {
    type Error = Status;

    fn try_from(status: proto::JobStatus) -> Result<Self, Status> {
        let map_units = status
            .map_units
            .into_iter()
            .map(|unit| {
                Ok(MapUnitSnapshot {
                    status: status_from_wire(unit.status)?,
                    input_identifier: unit.input_identifier,
                    input_index: unit.input_index,
                    running_ms: unit.running_ms,
                    produced_blob_names: unit.produced_blob_names,
                })
            })
            .collect::<Result<_, Status>>()?;
        let reduce_units = status
            .reduce_units
            .into_iter()
            .map(|unit| {
                Ok(ReduceUnitSnapshot {
                    status: status_from_wire(unit.status)?,
                    bucket_index: unit.bucket_index,
                    running_ms: unit.running_ms,
                    output_blob_name: unit.output_blob_name,
                })
            })
            .collect::<Result<_, Status>>()?;

        Ok(Self {
            phase: phase_from_wire(status.phase)?,
            reduce_count: status.reduce_count,
            maps_remaining: status.maps_remaining,
            reduces_remaining: status.reduces_remaining,
            map_units,
            reduce_units,
        })
    }
}

impl From<SchedulerError> for Status {
    fn from(err: SchedulerError) -> Self {
        match err {
            SchedulerError::UnknownMapUnit(_) | SchedulerError::UnknownBucket(_) => {
                Status::not_found(err.to_string())
            }
            SchedulerError::RunningReport
            | SchedulerError::NoReduceBuckets
            | SchedulerError::DuplicateInput(_) => Status::invalid_argument(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use tonic::Code;

    use super::*;

    #[test]
    fn map_dispatch_crosses_the_wire() {
        let dispatch = Dispatch {
            phase: Phase::Map,
            assignment: Assignment::Unit(MapTask {
                input_identifier: "pg-3.txt".into(),
                input_index: 3,
                reduce_count: 5,
                attempt: 2,
            }),
        };
        let reply = proto::AssignMapUnitReply::from(dispatch.clone());
        assert_eq!(reply.phase, proto::Phase::Map as i32);
        assert_eq!(Dispatch::<MapTask>::try_from(reply).unwrap(), dispatch);
    }

    #[test]
    fn job_done_is_phase_advance_for_reduce() {
        let reply = proto::AssignReduceUnitReply::from(Dispatch::<ReduceTask> {
            phase: Phase::Done,
            assignment: Assignment::PhaseAdvance,
        });
        assert!(matches!(
            reply.outcome,
            Some(assign_reduce_unit_reply::Outcome::JobDone(_))
        ));
        let back = Dispatch::<ReduceTask>::try_from(reply).unwrap();
        assert_eq!(back.phase, Phase::Done);
        assert_eq!(back.assignment, Assignment::PhaseAdvance);
    }

    #[test]
    fn reply_without_outcome_is_rejected() {
        let reply = proto::AssignMapUnitReply {
            phase: proto::Phase::Map as i32,
            outcome: None,
        };
        let err = Dispatch::<MapTask>::try_from(reply).unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument);
    }

    #[test]
    fn unknown_enum_values_are_rejected() {
        let request = proto::ReportMapStatusRequest {
            status: 42,
            input_identifier: "a".into(),
            produced_blob_names: vec![],
            attempt: 1,
        };
        assert_eq!(
            MapReport::try_from(request).unwrap_err().code(),
            Code::InvalidArgument
        );
    }

    #[test]
    fn empty_output_name_means_none() {
        let report = ReduceReport {
            bucket_index: 2,
            attempt: 3,
            status: UnitStatus::Idle,
            output_blob_name: None,
        };
        let request = proto::ReportReduceStatusRequest::from(report.clone());
        assert_eq!(request.output_blob_name, "");
        assert_eq!(ReduceReport::try_from(request).unwrap(), report);
    }

    #[test]
    fn scheduler_errors_map_to_status_codes() {
        assert_eq!(
            Status::from(SchedulerError::UnknownBucket(9)).code(),
            Code::NotFound
        );
        assert_eq!(
            Status::from(SchedulerError::RunningReport).code(),
            Code::InvalidArgument
        );
    }
}
