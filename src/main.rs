use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tally::command::CommandInterpreter;
use tally::config::{ConfigOverrides, RunConfig};
use tally::events::EventSource;
use tally::geometry::LayerGeometry;
use tally::logging::init_logging;
use tally::{Channel, ChannelRegistry, ResultMerger, RunController, TallyError};

#[derive(Parser)]
#[command(name = "tally")]
#[command(about = "Per-worker layer results with a merged output file", long_about = None)]
struct Cli {
    /// Debug-level logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct RunArgs {
    /// JSON config file; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    geometry: Option<PathBuf>,
    #[arg(long)]
    output_dir: Option<PathBuf>,
    #[arg(long)]
    save_name: Option<String>,
    #[arg(long)]
    workers: Option<u32>,
}

impl RunArgs {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            geometry: self.geometry.clone(),
            output_dir: self.output_dir.clone(),
            save_name: self.save_name.clone(),
            workers: self.workers,
        }
    }

    /// Config file (or defaults), then `macro_file`, then explicit flags.
    fn resolve(&self, macro_file: Option<&Path>) -> Result<RunConfig, TallyError> {
        let mut config = match &self.config {
            Some(path) => RunConfig::from_json_file(path)?,
            None => RunConfig::default(),
        };
        if let Some(path) = macro_file {
            CommandInterpreter::new(&mut config).apply_macro(path)?;
        }
        self.overrides().apply(&mut config)?;
        Ok(config)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Print the channel header and stack height of a geometry file
    Channels {
        #[arg(long, default_value = tally::config::DEFAULT_GEOMETRY)]
        geometry: PathBuf,
        #[arg(long, default_value_t = 0.0)]
        layer_gap_mm: f64,
    },
    /// Replay an events file across workers, then merge
    Run {
        #[command(flatten)]
        args: RunArgs,
        /// One event per line: N deposits then N passing values
        #[arg(long)]
        events: PathBuf,
        /// Command macro applied before the run (e.g. /tally/setSaveName)
        #[arg(long = "macro")]
        macro_file: Option<PathBuf>,
    },
    /// Merge intermediate artifacts left behind by a failed run
    Merge {
        #[command(flatten)]
        args: RunArgs,
    },
}

fn main() -> Result<(), TallyError> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Channels { geometry, layer_gap_mm } => {
            let geometry = LayerGeometry::from_path(&geometry)?;
            let registry = ChannelRegistry::new();
            registry.initialize(&geometry)?;
            println!("{}", registry.header()?);
            println!(
                "{} layers, stack height {} mm",
                geometry.len(),
                geometry.total_stack_height_mm(layer_gap_mm)
            );
        }
        Commands::Run { args, events, macro_file } => {
            let config = args.resolve(macro_file.as_deref())?;
            let mut controller = RunController::new(Arc::new(ChannelRegistry::new()), config);
            controller.ensure_registry()?;
            let channels: Vec<Channel> = controller.registry().channels()?.to_vec();
            let source = EventSource::from_path(&events, channels.len())?;
            let worker_count = controller.config().workers;
            tracing::info!(events = source.len(), workers = worker_count, "Replaying events");

            let outcome = controller.execute(|sink| {
                for event in source.for_worker(sink.identity(), worker_count) {
                    for ((channel, deposit), passing) in channels.iter().zip(&event.deposits).zip(&event.passing) {
                        sink.add_deposit(*channel, *deposit)?;
                        sink.add_passing(*channel, *passing)?;
                    }
                    sink.end_event()?;
                }
                Ok(())
            })?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Commands::Merge { args } => {
            let config = args.resolve(None)?;
            let geometry = LayerGeometry::from_path(&config.geometry)?;
            let registry = Arc::new(ChannelRegistry::new());
            registry.initialize(&geometry)?;
            let merger = ResultMerger::new(registry, &config.output_dir);
            let report = merger.merge(&config.save_name, config.workers)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}
