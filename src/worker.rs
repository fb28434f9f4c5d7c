use crate::{Result, TallyError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Raw id the host uses for the coordinating (master) thread.
pub const COORDINATOR_ID: i64 = -1;

/// Who produced an intermediate artifact.
///
/// Ordering is the merge order: the coordinator sorts before every worker,
/// workers sort by index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum WorkerIdentity {
    Coordinator,
    Worker(u32),
}

impl WorkerIdentity {
    pub fn from_raw(id: i64) -> Result<Self> {
        match id {
            COORDINATOR_ID => Ok(WorkerIdentity::Coordinator),
            n => u32::try_from(n)
                .map(WorkerIdentity::Worker)
                .map_err(|_| TallyError::Config(format!("invalid worker id {}", n))),
        }
    }

    pub fn raw(&self) -> i64 {
        match self {
            WorkerIdentity::Coordinator => COORDINATOR_ID,
            WorkerIdentity::Worker(n) => i64::from(*n),
        }
    }

    pub fn is_coordinator(&self) -> bool {
        matches!(self, WorkerIdentity::Coordinator)
    }

    pub fn tag(&self) -> &'static str {
        match self {
            WorkerIdentity::Coordinator => "master",
            WorkerIdentity::Worker(_) => "worker",
        }
    }

    /// File name of this identity's intermediate artifact: `<tag><id>_<base>`.
    pub fn artifact_name(&self, base_name: &str) -> String {
        format!("{}{}_{}", self.tag(), self.raw(), base_name)
    }

    /// Coordinator first, then workers `0..worker_count`.
    pub fn merge_order(worker_count: u32) -> impl Iterator<Item = WorkerIdentity> {
        std::iter::once(WorkerIdentity::Coordinator).chain((0..worker_count).map(WorkerIdentity::Worker))
    }
}

impl fmt::Display for WorkerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerIdentity::Coordinator => write!(f, "coordinator"),
            WorkerIdentity::Worker(n) => write!(f, "worker {}", n),
        }
    }
}
