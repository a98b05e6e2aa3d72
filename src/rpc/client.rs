use std::future::Future;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use tonic::transport::Channel;
use tonic::{Code, Response, Status};
use tracing::{debug, warn};

use super::proto;
use super::proto::coordinator_client::CoordinatorClient;
use crate::scheduler::{Dispatch, JobSnapshot, MapReport, MapTask, ReduceReport, ReduceTask};
use crate::worker::TaskSource;

/// How hard the client tries before giving up on an unreachable coordinator.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 10,
            delay: Duration::from_millis(500),
        }
    }
}

/// Worker-side handle on a coordinator reached over gRPC.
#[derive(Debug, Clone)]
pub struct RemoteCoordinator {
    client: CoordinatorClient<Channel>,
    retry: RetryPolicy,
}

impl RemoteCoordinator {
    /// Connect to `addr` (`host:port`, or a full `http://` URI).
    pub async fn connect(addr: &str) -> Result<Self> {
        Self::connect_with(addr, RetryPolicy::default()).await
    }

    pub async fn connect_with(addr: &str, retry: RetryPolicy) -> Result<Self> {
        let endpoint = if addr.contains("://") {
            addr.to_string()
        } else {
            format!("http://{addr}")
        };

        let mut attempt = 1;
        loop {
            match CoordinatorClient::connect(endpoint.clone()).await {
                Ok(client) => {
                    debug!(%endpoint, "connected to coordinator");
                    return Ok(Self { client, retry });
                }
                Err(e) if attempt < retry.attempts => {
                    warn!(%endpoint, attempt, "coordinator unreachable: {e}");
                    tokio::time::sleep(retry.delay).await;
                    attempt += 1;
                }
                Err(e) => bail!("could not connect to coordinator at {endpoint}: {e}"),
            }
        }
    }

    /// Issue an RPC, retrying while the coordinator reports `Unavailable`.
    async fn call<T, F, Fut>(&self, rpc: &'static str, mut f: F) -> Result<T, Status>
    where
        F: FnMut(CoordinatorClient<Channel>) -> Fut,
        Fut: Future<Output = Result<Response<T>, Status>>,
    {
        let mut attempt = 1;
        loop {
            match f(self.client.clone()).await {
                Ok(response) => return Ok(response.into_inner()),
                Err(status) if status.code() == Code::Unavailable && attempt < self.retry.attempts => {
                    warn!(rpc, attempt, "coordinator unavailable: {}", status.message());
                    tokio::time::sleep(self.retry.delay).await;
                    attempt += 1;
                }
                Err(status) => return Err(status),
            }
        }
    }

    pub async fn is_done(&self) -> Result<bool> {
        let reply = self
            .call("IsDone", |mut client| async move {
                client.is_done(proto::IsDoneRequest {}).await
            })
            .await?;
        Ok(reply.done)
    }

    pub async fn status(&self) -> Result<JobSnapshot> {
        let reply = self
            .call("SystemStatus", |mut client| async move {
                client.system_status(proto::StatusRequest {}).await
            })
            .await?;
        Ok(JobSnapshot::try_from(reply)?)
    }
}

#[async_trait]
impl TaskSource for RemoteCoordinator {
    async fn assign_map_unit(&self) -> Result<Dispatch<MapTask>> {
        let reply = self
            .call("AssignMapUnit", |mut client| async move {
                client.assign_map_unit(proto::AssignMapUnitRequest {}).await
            })
            .await?;
        Ok(Dispatch::try_from(reply)?)
    }

    async fn assign_reduce_unit(&self) -> Result<Dispatch<ReduceTask>> {
        let reply = self
            .call("AssignReduceUnit", |mut client| async move {
                client.assign_reduce_unit(proto::AssignReduceUnitRequest {}).await
            })
            .await?;
        Ok(Dispatch::try_from(reply)?)
    }

    async fn report_map_status(&self, report: MapReport) -> Result<()> {
        let request = proto::ReportMapStatusRequest::from(report);
        self.call("ReportMapStatus", |mut client| {
            let request = request.clone();
            async move { client.report_map_status(request).await }
        })
        .await?;
        Ok(())
    }

    async fn report_reduce_status(&self, report: ReduceReport) -> Result<()> {
        let request = proto::ReportReduceStatusRequest::from(report);
        self.call("ReportReduceStatus", |mut client| {
            let request = request.clone();
            async move { client.report_reduce_status(request).await }
        })
        .await?;
        Ok(())
    }
}
