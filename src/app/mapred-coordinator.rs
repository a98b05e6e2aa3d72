use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use mapred::cmd::coordinator::Args;
use mapred::scheduler::Scheduler;
use mapred::{coordinator, utils};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    utils::init_tracing();
    let args = Args::parse();

    let inputs = utils::expand_inputs(&args.inputs)?;
    if inputs.is_empty() {
        warn!("no input files, the job goes straight to reduce");
    }
    info!(
        inputs = inputs.len(),
        n_reduce = args.n_reduce,
        timeout_s = args.timeout,
        "creating job"
    );
    let scheduler = Arc::new(Scheduler::new(inputs, args.scheduler_config())?);

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    coordinator::serve(scheduler, addr, args.linger()).await
}
