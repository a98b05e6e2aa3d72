use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[clap(subcommand)]
    pub command: Commands,
    /// Address of the coordinator
    #[clap(short = 'J', long, default_value = "127.0.0.1:50051")]
    pub host: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Displays the job phase, the outstanding unit counts and the status
    /// of every map and reduce unit.
    Status {
        /// Print the status as JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Blocks until the coordinator reports the job as done.
    Wait {
        /// Milliseconds between polls
        #[arg(long, default_value_t = 1000)]
        interval_ms: u64,
    },
}
