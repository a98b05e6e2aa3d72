//! gRPC front end of the [`Scheduler`].
//!
//! The service is a thin adapter: decode the request, make one scheduler call,
//! encode the reply. All state lives in the shared [`Scheduler`].

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tonic::{Request, Response, Status};
use tracing::{debug, info};

use crate::rpc::proto;
use crate::rpc::proto::coordinator_server::{Coordinator, CoordinatorServer};
use crate::scheduler::{MapReport, ReduceReport, Scheduler};

/// How often the shutdown watcher checks whether the job has finished.
const DONE_POLL_INTERVAL: Duration = Duration::from_millis(200);

pub struct CoordinatorService {
    scheduler: Arc<Scheduler>,
}

impl CoordinatorService {
    pub fn new(scheduler: Arc<Scheduler>) -> Self {
        Self { scheduler }
    }

    pub fn into_server(self) -> CoordinatorServer<Self> {
        CoordinatorServer::new(self)
    }
}

fn peer<T>(request: &Request<T>) -> String {
    request
        .remote_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

#[tonic::async_trait]
impl Coordinator for CoordinatorService {
    async fn assign_map_unit(
        &self,
        request: Request<proto::AssignMapUnitRequest>,
    ) -> Result<Response<proto::AssignMapUnitReply>, Status> {
        let dispatch = self.scheduler.assign_map_unit();
        debug!(peer = %peer(&request), ?dispatch, "AssignMapUnit");
        Ok(Response::new(dispatch.into()))
    }

    async fn assign_reduce_unit(
        &self,
        request: Request<proto::AssignReduceUnitRequest>,
    ) -> Result<Response<proto::AssignReduceUnitReply>, Status> {
        let dispatch = self.scheduler.assign_reduce_unit();
        debug!(peer = %peer(&request), ?dispatch, "AssignReduceUnit");
        Ok(Response::new(dispatch.into()))
    }

    async fn report_map_status(
        &self,
        request: Request<proto::ReportMapStatusRequest>,
    ) -> Result<Response<proto::Ack>, Status> {
        let peer = peer(&request);
        let report = MapReport::try_from(request.into_inner())?;
        let outcome = self.scheduler.report_map_status(report)?;
        debug!(%peer, ?outcome, "ReportMapStatus");
        Ok(Response::new(proto::Ack {}))
    }

    async fn report_reduce_status(
        &self,
        request: Request<proto::ReportReduceStatusRequest>,
    ) -> Result<Response<proto::Ack>, Status> {
        let peer = peer(&request);
        let report = ReduceReport::try_from(request.into_inner())?;
        let outcome = self.scheduler.report_reduce_status(report)?;
        debug!(%peer, ?outcome, "ReportReduceStatus");
        Ok(Response::new(proto::Ack {}))
    }

    async fn is_done(
        &self,
        _request: Request<proto::IsDoneRequest>,
    ) -> Result<Response<proto::IsDoneReply>, Status> {
        Ok(Response::new(proto::IsDoneReply {
            done: self.scheduler.is_done(),
        }))
    }

    async fn system_status(
        &self,
        _request: Request<proto::StatusRequest>,
    ) -> Result<Response<proto::JobStatus>, Status> {
        Ok(Response::new(self.scheduler.snapshot().into()))
    }
}

/// Resolves once the job is done and `linger` has passed, so that workers
/// still polling get to observe the final phase before the server goes away.
pub async fn wait_until_done(scheduler: Arc<Scheduler>, linger: Duration) {
    let mut ticker = tokio::time::interval(DONE_POLL_INTERVAL);
    while !scheduler.is_done() {
        ticker.tick().await;
    }
    info!(?linger, "job done, lingering before shutdown");
    tokio::time::sleep(linger).await;
}

/// Serve `scheduler` on `addr` until the job is done.
pub async fn serve(scheduler: Arc<Scheduler>, addr: SocketAddr, linger: Duration) -> Result<()> {
    info!(%addr, "coordinator listening");
    Server::builder()
        .add_service(CoordinatorService::new(scheduler.clone()).into_server())
        .serve_with_shutdown(addr, wait_until_done(scheduler, linger))
        .await?;
    info!("coordinator shut down");
    Ok(())
}

/// Like [`serve`], on an already bound listener (e.g. port 0 in tests).
pub async fn serve_with_listener(
    scheduler: Arc<Scheduler>,
    listener: TcpListener,
    linger: Duration,
) -> Result<()> {
    info!(addr = ?listener.local_addr().ok(), "coordinator listening");
    Server::builder()
        .add_service(CoordinatorService::new(scheduler.clone()).into_server())
        .serve_with_incoming_shutdown(
            TcpListenerStream::new(listener),
            wait_until_done(scheduler, linger),
        )
        .await?;
    info!("coordinator shut down");
    Ok(())
}
