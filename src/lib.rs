pub mod accumulator;
pub mod channel;
pub mod command;
pub mod config;
pub mod error;
pub mod events;
pub mod geometry;
pub mod logging;
pub mod merger;
pub mod naming;
pub mod run;
pub mod sink;
pub mod summary;
pub mod worker;

pub use channel::{Channel, ChannelRegistry};
pub use error::*;
pub use merger::{MergeReport, ResultMerger};
pub use run::{FinishedRun, RunController, RunOutcome};
pub use sink::{ResultRow, WorkerReport, WorkerResultSink};
pub use worker::WorkerIdentity;
