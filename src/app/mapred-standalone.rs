use anyhow::Result;
use clap::Parser;
use mapred::standalone::{engine::run_job, Args, Job};
use mapred::utils;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    utils::init_tracing();
    let job = Job::from(Args::parse().command);

    let snapshot = run_job(&job).await?;
    let outputs: Vec<_> = snapshot
        .reduce_units
        .iter()
        .filter_map(|unit| unit.output_blob_name.as_deref())
        .collect();
    info!(
        maps = snapshot.map_units.len(),
        output = %job.output.display(),
        "job done, wrote {}",
        outputs.join(", ")
    );
    Ok(())
}
