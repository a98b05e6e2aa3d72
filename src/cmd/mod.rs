//! Command-line arguments of the `mapred-*` binaries.

pub mod coordinator;
pub mod ctl;
pub mod worker;
