use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use mapred::cmd::ctl::{Args, Commands};
use mapred::rpc::{RemoteCoordinator, RetryPolicy};
use mapred::scheduler::{JobSnapshot, UnitStatus};

fn display_status(unit: UnitStatus, running_ms: Option<u64>) -> String {
    match (unit, running_ms) {
        (UnitStatus::Running, Some(ms)) => format!("Running ({ms} ms)"),
        (status, _) => format!("{status:?}"),
    }
}

fn display_job(job: &JobSnapshot) {
    let n_maps = job.map_units.len();
    println!("-----------------------------------");
    println!("Phase:\t\t{:?}", job.phase);
    println!("Map units:\t{} / {n_maps} left", job.maps_remaining);
    println!("Reduce units:\t{} / {} left", job.reduces_remaining, job.reduce_count);
    println!("---------- MAP UNITS --------------");
    if n_maps == 0 {
        println!("(no inputs)");
    }
    for unit in &job.map_units {
        println!(
            "[{}]\t{}\tIN: [{}]\tOUT: [{}]",
            unit.input_index,
            display_status(unit.status, unit.running_ms),
            unit.input_identifier,
            unit.produced_blob_names.join(", ")
        );
    }
    println!("---------- REDUCE UNITS -----------");
    for unit in &job.reduce_units {
        println!(
            "[{}]\t{}\tOUT: [{}]",
            unit.bucket_index,
            display_status(unit.status, unit.running_ms),
            unit.output_blob_name.as_deref().unwrap_or("")
        );
    }
    println!("-----------------------------------");
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let retry = RetryPolicy {
        attempts: 3,
        ..Default::default()
    };
    let client = RemoteCoordinator::connect_with(&args.host, retry).await?;

    match args.command {
        Commands::Status { json } => {
            let job = client.status().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&job)?);
            } else {
                display_job(&job);
            }
        }
        Commands::Wait { interval_ms } => {
            let interval = Duration::from_millis(interval_ms);
            while !client.is_done().await? {
                tokio::time::sleep(interval).await;
            }
            println!("Job done");
        }
    }

    Ok(())
}
