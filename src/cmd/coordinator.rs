use std::time::Duration;

use clap::Parser;

use crate::scheduler::SchedulerConfig;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Port for the coordinator to listen on
    #[clap(short = 'P', long, default_value_t = 50051)]
    pub port: u16,
    /// Number of reduce buckets
    #[clap(short = 'r', long, default_value_t = 10)]
    pub n_reduce: u32,
    /// Seconds a unit may run before it is handed to another worker
    #[clap(short, long, default_value_t = 15)]
    pub timeout: u64,
    /// Seconds to keep serving once the job is done, so polling workers see it
    #[clap(long, default_value_t = 3)]
    pub linger: u64,
    /// Input files; glob patterns are expanded
    #[clap(value_parser)]
    pub inputs: Vec<String>,
}

impl Args {
    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            n_reduce: self.n_reduce,
            task_timeout: Duration::from_secs(self.timeout),
        }
    }

    pub fn linger(&self) -> Duration {
        Duration::from_secs(self.linger)
    }
}
