use crate::channel::ChannelRegistry;
use crate::config::RunConfig;
use crate::geometry::LayerGeometry;
use crate::merger::{MergeReport, ResultMerger};
use crate::sink::{WorkerReport, WorkerResultSink};
use crate::summary::RunSummary;
use crate::worker::WorkerIdentity;
use crate::{Result, TallyError};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

/// Every worker of a run has closed its sink.
///
/// Only `RunController::run_workers` builds this, after joining all worker
/// threads, so holding one is proof the merge barrier has been passed.
#[derive(Debug)]
pub struct FinishedRun {
    run_id: u32,
    worker_count: u32,
    save_name: String,
    output_dir: PathBuf,
    reports: Vec<WorkerReport>,
}

impl FinishedRun {
    pub fn run_id(&self) -> u32 {
        self.run_id
    }

    pub fn worker_count(&self) -> u32 {
        self.worker_count
    }

    /// Coordinator report first, then workers by index.
    pub fn reports(&self) -> &[WorkerReport] {
        &self.reports
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub run_id: u32,
    pub merge: MergeReport,
    pub summary: RunSummary,
    pub summary_path: PathBuf,
}

/// Drives the run lifecycle: per-worker sinks, barrier, merge, summary.
pub struct RunController {
    registry: Arc<ChannelRegistry>,
    config: RunConfig,
    next_run_id: u32,
}

impl RunController {
    pub fn new(registry: Arc<ChannelRegistry>, config: RunConfig) -> Self {
        Self {
            registry,
            config,
            next_run_id: 0,
        }
    }

    pub fn registry(&self) -> &Arc<ChannelRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Settings can only change between runs; a run holds `&mut self`.
    pub fn config_mut(&mut self) -> &mut RunConfig {
        &mut self.config
    }

    /// Load channels from the configured geometry unless already initialized.
    pub fn ensure_registry(&self) -> Result<()> {
        if !self.registry.is_initialized() {
            let geometry = LayerGeometry::from_path(&self.config.geometry)?;
            tracing::info!(
                layers = geometry.len(),
                stack_height_mm = geometry.total_stack_height_mm(self.config.layer_gap_mm),
                "Scintillator stack loaded"
            );
            self.registry.initialize(&geometry)?;
        }
        Ok(())
    }

    /// Run `body` once per worker, each on its own thread with its own sink,
    /// and wait for all of them.
    ///
    /// A failing or panicking worker fails the whole run; the intermediate
    /// artifacts stay on disk so they can be merged by hand.
    pub fn run_workers<F>(&mut self, body: &F) -> Result<FinishedRun>
    where
        F: Fn(&mut WorkerResultSink) -> Result<()> + Sync,
    {
        self.config.validate()?;
        self.ensure_registry()?;
        fs::create_dir_all(&self.config.output_dir)?;

        let run_id = self.next_run_id;
        self.next_run_id += 1;

        let worker_count = self.config.workers;
        let save_name = self.config.save_name.clone();
        let output_dir = self.config.output_dir.clone();
        tracing::info!(run_id, workers = worker_count, save_name = %save_name, "Run started");

        let coordinator = WorkerResultSink::begin_run(
            self.registry.clone(),
            &output_dir,
            WorkerIdentity::Coordinator,
            &save_name,
        )?;

        let dir = output_dir.as_path();
        let base = save_name.as_str();
        let joined: Vec<(WorkerIdentity, thread::Result<Result<WorkerReport>>)> = thread::scope(|s| {
            let handles: Vec<_> = (0..worker_count)
                .map(|index| {
                    let identity = WorkerIdentity::Worker(index);
                    let registry = self.registry.clone();
                    let handle = s.spawn(move || run_worker(registry, dir, identity, base, body));
                    (identity, handle)
                })
                .collect();
            handles
                .into_iter()
                .map(|(identity, handle)| (identity, handle.join()))
                .collect()
        });

        let mut reports = Vec::with_capacity(joined.len() + 1);
        reports.push(coordinator.end_run()?);

        let mut first_error = None;
        for (identity, outcome) in joined {
            match outcome {
                Ok(Ok(report)) => reports.push(report),
                Ok(Err(e)) => {
                    tracing::error!(worker = %identity, error = %e, "Worker failed");
                    first_error.get_or_insert(e);
                }
                Err(_) => {
                    tracing::error!(worker = %identity, "Worker panicked");
                    first_error.get_or_insert(TallyError::WorkerPanicked(identity));
                }
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        Ok(FinishedRun {
            run_id,
            worker_count,
            save_name,
            output_dir,
            reports,
        })
    }

    /// Coordinator-side end of run: merge artifacts and write the summary.
    pub fn finish(&self, finished: FinishedRun) -> Result<RunOutcome> {
        let merger = ResultMerger::new(self.registry.clone(), &finished.output_dir);
        let merge = merger.merge(&finished.save_name, finished.worker_count)?;

        let summary = RunSummary::from_reports(self.registry.channels()?, &finished.reports);
        let summary_path = summary.write(&finished.output_dir, finished.run_id)?;

        tracing::info!(
            run_id = finished.run_id,
            rows = merge.rows,
            output = %merge.final_path.display(),
            summary = %summary_path.display(),
            "Run ended"
        );

        Ok(RunOutcome {
            run_id: finished.run_id,
            merge,
            summary,
            summary_path,
        })
    }

    pub fn execute<F>(&mut self, body: F) -> Result<RunOutcome>
    where
        F: Fn(&mut WorkerResultSink) -> Result<()> + Sync,
    {
        let finished = self.run_workers(&body)?;
        self.finish(finished)
    }
}

fn run_worker<F>(
    registry: Arc<ChannelRegistry>,
    output_dir: &Path,
    identity: WorkerIdentity,
    base_name: &str,
    body: &F,
) -> Result<WorkerReport>
where
    F: Fn(&mut WorkerResultSink) -> Result<()> + Sync,
{
    let mut sink = WorkerResultSink::begin_run(registry, output_dir, identity, base_name)?;
    body(&mut sink)?;
    sink.end_run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::Channel;

    fn controller(dir: &Path, workers: u32) -> RunController {
        let registry = ChannelRegistry::new();
        registry.initialize_with([Channel(1), Channel(2)]).unwrap();
        let config = RunConfig {
            output_dir: dir.to_path_buf(),
            workers,
            save_name: "out.csv".to_string(),
            ..RunConfig::default()
        };
        RunController::new(Arc::new(registry), config)
    }

    #[test]
    fn test_run_ids_increase() {
        let dir = tempfile::tempdir().unwrap();
        let mut controller = controller(dir.path(), 1);
        let first = controller.execute(|_| Ok(())).unwrap();
        let second = controller.execute(|_| Ok(())).unwrap();
        assert_eq!(first.run_id, 0);
        assert_eq!(second.run_id, 1);
        assert_eq!(second.merge.final_path, dir.path().join("out(1).csv"));
    }

    #[test]
    fn test_worker_error_fails_run() {
        let dir = tempfile::tempdir().unwrap();
        let mut controller = controller(dir.path(), 2);
        let result = controller.execute(|sink| {
            if sink.identity() == WorkerIdentity::Worker(1) {
                sink.add_deposit(Channel(99), 1.0)?;
            }
            Ok(())
        });
        assert!(matches!(result, Err(TallyError::ChannelNotFound(Channel(99)))));
        assert!(!dir.path().join("out.csv").exists());
        assert!(dir.path().join("worker0_out.csv").exists());
    }

    #[test]
    fn test_worker_panic_reported() {
        let dir = tempfile::tempdir().unwrap();
        let mut controller = controller(dir.path(), 2);
        let result = controller.execute(|sink| {
            if sink.identity() == WorkerIdentity::Worker(0) {
                panic!("simulated crash");
            }
            Ok(())
        });
        assert!(matches!(result, Err(TallyError::WorkerPanicked(WorkerIdentity::Worker(0)))));
    }

    #[test]
    fn test_missing_geometry_fails_before_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let config = RunConfig {
            output_dir: dir.path().to_path_buf(),
            geometry: dir.path().join("missing.csv"),
            ..RunConfig::default()
        };
        let mut controller = RunController::new(Arc::new(ChannelRegistry::new()), config);
        assert!(matches!(controller.execute(|_| Ok(())), Err(TallyError::Geometry(_))));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
