use crate::accumulator::Accumulator;
use crate::channel::Channel;
use crate::naming;
use crate::sink::{format_value, WorkerReport};
use crate::Result;
use serde::Serialize;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Channel totals for a whole run, summed over every worker.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub channels: Vec<Channel>,
    pub deposited: Accumulator,
    pub passing: Accumulator,
    pub rows: usize,
    pub workers: usize,
}

impl RunSummary {
    pub fn from_reports(channels: &[Channel], reports: &[WorkerReport]) -> Self {
        let mut deposited = Accumulator::new(channels.len());
        let mut passing = Accumulator::new(channels.len());
        let mut rows = 0;
        for report in reports {
            deposited.merge(&report.deposited);
            passing.merge(&report.passing);
            rows += report.rows;
        }
        Self {
            channels: channels.to_vec(),
            deposited,
            passing,
            rows,
            workers: reports.iter().filter(|r| !r.identity.is_coordinator()).count(),
        }
    }

    /// Write `run_<id>_summary.csv` into `dir` without overwriting older runs.
    pub fn write(&self, dir: &Path, run_id: u32) -> Result<PathBuf> {
        let (path, file) = naming::create_unique(dir, &format!("run_{}_summary.csv", run_id))?;
        let mut out = BufWriter::new(file);
        writeln!(out, "Channel,EnergyDeposit,PassingEnergy")?;
        for ((channel, deposit), passing) in self
            .channels
            .iter()
            .zip(self.deposited.totals())
            .zip(self.passing.totals())
        {
            writeln!(out, "{},{},{}", channel, format_value(*deposit), format_value(*passing))?;
        }
        out.flush()?;
        Ok(path)
    }
}
