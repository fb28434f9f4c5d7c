use crate::channel::ChannelRegistry;
use crate::naming;
use crate::worker::WorkerIdentity;
use crate::{Result, TallyError};
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Outcome of one merge.
#[derive(Debug, Clone, Serialize)]
pub struct MergeReport {
    pub final_path: PathBuf,
    /// Data rows in the final artifact (header excluded)
    pub rows: usize,
    pub merged: Vec<WorkerIdentity>,
    pub missing: Vec<WorkerIdentity>,
    /// Intermediate artifacts that were merged but could not be deleted
    pub leftover: Vec<PathBuf>,
}

/// Concatenates every worker's intermediate artifact into one final artifact.
///
/// Precondition: every worker in `0..worker_count` (and the coordinator) has
/// returned from `WorkerResultSink::end_run`. The merger does no
/// synchronization of its own; `RunController` provides the barrier.
pub struct ResultMerger {
    registry: Arc<ChannelRegistry>,
    output_dir: PathBuf,
}

impl ResultMerger {
    pub fn new(registry: Arc<ChannelRegistry>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            registry,
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn merge(&self, base_name: &str, worker_count: u32) -> Result<MergeReport> {
        let header = self.registry.header()?;
        let (final_path, file) = naming::create_unique(&self.output_dir, base_name)?;
        let pending = PendingArtifact::new(final_path);

        let mut out = BufWriter::new(file);
        let collected = self.write_merged(&mut out, &header, base_name, worker_count)?;

        // Intermediates are only removed once the merged rows are on disk
        let file = out.into_inner().map_err(|e| TallyError::Io(e.into_error()))?;
        file.sync_all()?;
        drop(file);
        let final_path = pending.commit();

        let mut leftover = Vec::new();
        for path in collected.opened {
            if let Err(e) = fs::remove_file(&path) {
                tracing::warn!(path = %path.display(), error = %e, "Could not remove intermediate artifact");
                leftover.push(path);
            }
        }

        tracing::info!(
            path = %final_path.display(),
            rows = collected.rows,
            merged = collected.merged.len(),
            missing = collected.missing.len(),
            "Merged worker results"
        );

        Ok(MergeReport {
            final_path,
            rows: collected.rows,
            merged: collected.merged,
            missing: collected.missing,
            leftover,
        })
    }

    /// Header plus every readable intermediate, in merge order.
    ///
    /// Each worker's rows are staged in memory first, so a worker whose
    /// artifact fails mid-read contributes nothing rather than a partial body.
    fn write_merged<W: Write>(
        &self,
        out: &mut W,
        header: &str,
        base_name: &str,
        worker_count: u32,
    ) -> Result<Collected> {
        writeln!(out, "{}", header)?;

        let mut collected = Collected::default();
        let mut staged = Vec::new();
        for identity in WorkerIdentity::merge_order(worker_count) {
            let path = self.output_dir.join(identity.artifact_name(base_name));
            let source = match File::open(&path) {
                Ok(f) => f,
                Err(source) => {
                    let expected = identity.is_coordinator() && source.kind() == ErrorKind::NotFound;
                    let err = TallyError::ArtifactOpen { path, source };
                    if expected {
                        tracing::debug!(error = %err, "No coordinator artifact to merge");
                    } else {
                        tracing::warn!(worker = %identity, error = %err, "Skipping worker artifact");
                        collected.missing.push(identity);
                    }
                    continue;
                }
            };

            staged.clear();
            let rows = match copy_rows(BufReader::new(source), &mut staged, header, identity) {
                Ok(rows) => rows,
                Err(source) => {
                    let err = TallyError::ArtifactOpen { path, source };
                    tracing::warn!(worker = %identity, error = %err, "Skipping unreadable worker artifact");
                    collected.missing.push(identity);
                    continue;
                }
            };

            out.write_all(&staged)?;
            collected.rows += rows;
            collected.merged.push(identity);
            collected.opened.push(path);
        }
        Ok(collected)
    }
}

#[derive(Default)]
struct Collected {
    rows: usize,
    merged: Vec<WorkerIdentity>,
    missing: Vec<WorkerIdentity>,
    opened: Vec<PathBuf>,
}

/// A freshly created final artifact that is deleted again unless committed.
struct PendingArtifact {
    path: Option<PathBuf>,
}

impl PendingArtifact {
    fn new(path: PathBuf) -> Self {
        Self { path: Some(path) }
    }

    fn commit(mut self) -> PathBuf {
        self.path.take().unwrap_or_default()
    }
}

impl Drop for PendingArtifact {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            if let Err(e) = fs::remove_file(&path) {
                tracing::warn!(path = %path.display(), error = %e, "Could not remove incomplete final artifact");
            }
        }
    }
}

/// Copy every line after the header verbatim. Rows are not re-parsed.
fn copy_rows<R: BufRead, W: Write>(
    mut reader: R,
    out: &mut W,
    header: &str,
    identity: WorkerIdentity,
) -> std::io::Result<usize> {
    let mut line = Vec::new();
    if reader.read_until(b'\n', &mut line)? == 0 {
        return Ok(0);
    }
    if trim_newline(&line) != header.as_bytes() {
        tracing::warn!(worker = %identity, "Intermediate header differs from registry header");
    }

    let mut rows = 0;
    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            break;
        }
        if trim_newline(&line).is_empty() {
            continue;
        }
        out.write_all(&line)?;
        if !line.ends_with(b"\n") {
            out.write_all(b"\n")?;
        }
        rows += 1;
    }
    Ok(rows)
}

fn trim_newline(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}
