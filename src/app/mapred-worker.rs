use anyhow::Result;
use clap::Parser;
use mapred::cmd::worker::Args;
use mapred::rpc::RemoteCoordinator;
use mapred::store::LocalBlobStore;
use mapred::worker::Worker;
use mapred::{utils, workload};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    utils::init_tracing();
    let args = Args::parse();

    let workload = workload::named(&args.workload)?;
    let aux = args.aux()?;
    info!(coordinator = %args.join, dir = %args.dir.display(), workload = %args.workload, "joining");

    let source = RemoteCoordinator::connect(&args.join).await?;
    let store = LocalBlobStore::new(&args.dir);
    let worker = Worker::new(source, store, workload, aux).with_config(args.worker_config());

    let summary = worker.run().await?;
    info!(worker = worker.id(), ?summary, "done");
    Ok(())
}
