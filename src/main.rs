//! Sensor Sweep CLI
//!
//! Runs one fixed-window collection cycle and archives the bundle.

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use sensor_sweep::{
    audit::{create_shared_log, FanoutSink, RotatingFileSink, TelemetrySink, TracingSink},
    config::Config,
    devices::{self, Devices},
    publish::{ArchivePublisher, OutboxTransport, Publisher},
    CancelToken, Orchestrator, RunError, COLLECTION_NOTICE, VERSION,
};

#[derive(Parser)]
#[command(name = "sensor-sweep")]
#[command(version = VERSION)]
#[command(about = "Fixed-window multi-sensor capture with stub fallback", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    run: RunArgs,
}

#[derive(Args)]
struct RunArgs {
    /// Use the scripted demo devices instead of the no-op backend
    #[arg(long)]
    simulate: bool,

    /// Directory for the artifact bundle
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Collection window in seconds
    #[arg(long)]
    duration: Option<u64>,

    /// Write the bundle but skip archiving it to the outbox
    #[arg(long)]
    no_publish: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the effective configuration
    Config,
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Config) => {
            cmd_config(&cli.run);
            ExitCode::SUCCESS
        }
        None => match cmd_run(&cli.run) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("Error: {e:#}");
                ExitCode::FAILURE
            }
        },
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

/// Load the config file and apply command-line overrides.
///
/// An unreadable or invalid config falls back to defaults; a run is always
/// attempted.
fn effective_config(args: &RunArgs) -> Config {
    let mut config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            warn!("Could not load config, using defaults: {}", e);
            Config::default()
        }
    };
    if let Some(dir) = &args.output {
        config.output_dir = dir.clone();
    }
    if let Some(secs) = args.duration {
        config.window_duration = Duration::from_secs(secs);
    }
    if args.no_publish {
        config.publish.enabled = false;
    }
    if let Err(e) = config.validate() {
        warn!("Invalid configuration ({}), using defaults", e);
        let mut fallback = Config {
            output_dir: config.output_dir.clone(),
            ..Config::default()
        };
        fallback.publish.enabled = config.publish.enabled;
        config = fallback;
    }
    config
}

fn cmd_run(args: &RunArgs) -> anyhow::Result<()> {
    let config = effective_config(args);

    println!("{COLLECTION_NOTICE}");
    println!(
        "Collecting for {}s into {}",
        config.window_duration.as_secs_f64(),
        config.output_dir.display()
    );

    if let Err(e) = config.ensure_directories() {
        warn!("Could not create data directories: {}", e);
    }

    let mut sinks: Vec<Box<dyn TelemetrySink>> = vec![Box::new(TracingSink)];
    match RotatingFileSink::open(config.log_path(), config.log.max_bytes, config.log.backups) {
        Ok(file) => sinks.push(Box::new(file)),
        Err(e) => warn!("Audit file log unavailable, continuing without it: {}", e),
    }
    let audit = create_shared_log(Box::new(FanoutSink::new(sinks)));

    let devices = if args.simulate {
        info!("Using scripted demo devices");
        devices::scripted::demo()
    } else {
        info!("Using no-op devices; every producer will fall back to a stub");
        Devices::noop()
    };

    let orchestrator = Orchestrator::new(config.clone(), devices, audit.clone());
    ctrlc_handler(orchestrator.interrupt_token());

    let finished = orchestrator.run().map_err(RunError::from)?;

    println!();
    println!("Run {} finished in {:.2}s", finished.run_id, finished.outcome.elapsed.as_secs_f64());
    for (id, result) in &finished.outcome.results {
        let detail = match result.stub_reason() {
            Some(reason) => format!("{:?} ({})", result.outcome(), reason.describe()),
            None => format!("{:?}", result.outcome()),
        };
        println!("  {:<11} {}", id.name(), detail);
    }
    println!("Bundle written to {}", config.output_dir.display());

    if config.publish.enabled {
        let transport = OutboxTransport::new(config.outbox_dir(), config.publish.max_attachment_bytes);
        let publisher = ArchivePublisher::new(Box::new(transport), config.archive_path(), audit.clone())
            .allow_insecure(config.publish.allow_insecure);
        let receipt = publisher
            .publish(&finished.bundle, &config.output_dir)
            .map_err(RunError::from)
            .context("bundle was written but could not be archived")?;
        println!(
            "Archived {} files ({} bytes) to {}",
            receipt.entries,
            receipt.archive_bytes,
            receipt.delivered_to.display()
        );
    } else {
        println!("Publishing disabled");
    }

    audit.flush();
    println!();
    println!("{}", audit.summary());
    Ok(())
}

fn cmd_config(args: &RunArgs) {
    let config = effective_config(args);

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&config).unwrap_or_else(|_| "Error".to_string())
    );
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(interrupt: CancelToken) {
    if let Err(e) = ctrlc::set_handler(move || interrupt.cancel()) {
        warn!("Could not install Ctrl+C handler: {}", e);
    }
}
