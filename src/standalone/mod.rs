//! Run a whole job inside one process: one [`Scheduler`](crate::scheduler::Scheduler),
//! several workers, no network.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub mod engine;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a job to completion
    Submit {
        /// Glob pattern for the input files
        #[arg(short, long)]
        input: String,

        /// Name of the workload
        #[arg(short, long)]
        workload: String,

        /// Output directory, also used for intermediate shards
        #[arg(short, long)]
        output: PathBuf,

        /// Number of reduce buckets
        #[arg(short = 'r', long, default_value_t = 10)]
        n_reduce: u32,

        /// Number of concurrent workers
        #[arg(short = 'n', long, default_value_t = 4)]
        workers: usize,

        /// Auxiliary arguments to pass to the MapReduce application.
        #[clap(value_parser, last = true)]
        args: Vec<String>,
    },
}

#[derive(Debug, Clone)]
pub struct Job {
    pub input: String,
    pub workload: String,
    pub output: PathBuf,
    pub n_reduce: u32,
    pub workers: usize,
    pub args: Vec<String>,
}

impl From<Commands> for Job {
    fn from(command: Commands) -> Self {
        match command {
            Commands::Submit {
                input,
                workload,
                output,
                n_reduce,
                workers,
                args,
            } => Job {
                input,
                workload,
                output,
                n_reduce,
                workers,
                args,
            },
        }
    }
}
