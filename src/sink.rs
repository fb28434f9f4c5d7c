use crate::accumulator::Accumulator;
use crate::channel::{Channel, ChannelRegistry};
use crate::worker::WorkerIdentity;
use crate::{Result, TallyError};
use itertools::Itertools;
use serde::Serialize;
use smallvec::SmallVec;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// One unit of work's values, one per channel in registry order.
pub type ResultRow = SmallVec<[f64; 8]>;

/// Text form of a value inside an artifact row.
pub fn format_value(value: f64) -> String {
    format!("{:?}", value)
}

/// What a worker hands to the coordinator once its sink is closed.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerReport {
    pub identity: WorkerIdentity,
    pub path: PathBuf,
    pub rows: usize,
    pub deposited: Accumulator,
    pub passing: Accumulator,
}

/// One worker's intermediate artifact for one run.
///
/// The artifact is truncated on `begin_run` and written row by row; nothing
/// else touches it until `end_run` has returned.
pub struct WorkerResultSink {
    registry: Arc<ChannelRegistry>,
    identity: WorkerIdentity,
    path: PathBuf,
    writer: BufWriter<File>,
    deposited: Accumulator,
    passing: Accumulator,
    event: ResultRow,
    event_dirty: bool,
    rows: usize,
}

impl WorkerResultSink {
    /// Create (or truncate) the artifact for `identity` and write the header.
    pub fn begin_run(
        registry: Arc<ChannelRegistry>,
        output_dir: &Path,
        identity: WorkerIdentity,
        base_name: &str,
    ) -> Result<Self> {
        let header = registry.header()?;
        let path = output_dir.join(identity.artifact_name(base_name));
        let file = File::create(&path).map_err(|source| TallyError::ArtifactCreate {
            path: path.clone(),
            source,
        })?;
        let mut writer = BufWriter::new(file);
        writeln!(writer, "{}", header)
            .and_then(|_| writer.flush())
            .map_err(|source| TallyError::ArtifactCreate {
                path: path.clone(),
                source,
            })?;

        tracing::debug!(worker = %identity, path = %path.display(), "Opened intermediate artifact");

        let channel_count = registry.len();
        Ok(Self {
            registry,
            identity,
            path,
            writer,
            deposited: Accumulator::new(channel_count),
            passing: Accumulator::new(channel_count),
            event: SmallVec::from_elem(0.0, channel_count),
            event_dirty: false,
            rows: 0,
        })
    }

    pub fn identity(&self) -> WorkerIdentity {
        self.identity
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rows written so far.
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn deposited(&self) -> &Accumulator {
        &self.deposited
    }

    pub fn passing(&self) -> &Accumulator {
        &self.passing
    }

    /// Add energy deposited in `channel` during the current event.
    pub fn add_deposit(&mut self, channel: Channel, value: f64) -> Result<()> {
        let column = self.registry.index_of(channel)?;
        self.deposited.add_at(column, value);
        self.event[column] += value;
        self.event_dirty = true;
        Ok(())
    }

    /// Add energy passing through `channel`. Only the run total is kept.
    pub fn add_passing(&mut self, channel: Channel, value: f64) -> Result<()> {
        let column = self.registry.index_of(channel)?;
        self.passing.add_at(column, value);
        Ok(())
    }

    /// Write the current event's deposits as one row and start a new event.
    pub fn end_event(&mut self) -> Result<()> {
        let row = std::mem::replace(&mut self.event, SmallVec::from_elem(0.0, self.registry.len()));
        self.event_dirty = false;
        self.write_row(&row)
    }

    /// Append a ready-made row; its values count towards the deposit totals.
    pub fn append_row(&mut self, row: &[f64]) -> Result<()> {
        let expected = self.registry.len();
        if row.len() != expected {
            return Err(TallyError::RowWidth { expected, actual: row.len() });
        }
        for (column, value) in row.iter().enumerate() {
            self.deposited.add_at(column, *value);
        }
        self.write_row(row)
    }

    fn write_row(&mut self, row: &[f64]) -> Result<()> {
        let line = row.iter().map(|v| format_value(*v)).join(",");
        writeln!(self.writer, "{}", line)?;
        self.rows += 1;
        Ok(())
    }

    /// Flush and close the artifact. A pending event is written first.
    pub fn end_run(mut self) -> Result<WorkerReport> {
        if self.event_dirty {
            self.end_event()?;
        }
        self.writer.flush()?;

        tracing::debug!(worker = %self.identity, rows = self.rows, "Closed intermediate artifact");

        Ok(WorkerReport {
            identity: self.identity,
            path: self.path,
            rows: self.rows,
            deposited: self.deposited,
            passing: self.passing,
        })
    }
}
