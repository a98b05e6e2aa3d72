use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use bytes::Bytes;
use clap::Parser;

use crate::utils;
use crate::worker::WorkerConfig;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Connect to a coordinator at the given IP address and port
    #[clap(short, long)]
    pub join: String,
    /// Root directory of the blob store shared with the other workers
    #[clap(short, long, default_value = ".")]
    pub dir: PathBuf,
    /// Name of the workload to run
    #[clap(short, long, default_value = "wc")]
    pub workload: String,
    /// First backoff, in milliseconds, when no unit is available
    #[clap(long, default_value_t = 100)]
    pub poll_ms: u64,
    /// Backoff ceiling in milliseconds
    #[clap(long, default_value_t = 1000)]
    pub max_poll_ms: u64,
    /// Auxiliary arguments to pass to the MapReduce application.
    #[clap(value_parser, last = true)]
    pub args: Vec<String>,
}

impl Args {
    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            min_backoff: Duration::from_millis(self.poll_ms),
            max_backoff: Duration::from_millis(self.max_poll_ms),
        }
    }

    pub fn aux(&self) -> Result<Bytes> {
        utils::encode_aux_args(&self.args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_args_reach_the_workload() {
        let args = Args::try_parse_from([
            "mapred-worker", "-j", "127.0.0.1:50051", "-w", "grep", "--", "--term", "red",
        ])
        .unwrap();
        assert_eq!(args.workload, "grep");
        assert_eq!(args.dir, PathBuf::from("."));
        assert_eq!(args.aux().unwrap(), r#"["--term","red"]"#);
        assert_eq!(args.worker_config().max_backoff, Duration::from_secs(1));
    }

    #[test]
    fn join_is_required() {
        assert!(Args::try_parse_from(["mapred-worker"]).is_err());
    }
}
