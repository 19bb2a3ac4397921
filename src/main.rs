//! Demo Recorder CLI
//!
//! Interactive recording of synchronized arm-state / camera demonstrations.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use crossbeam_channel::{select, Receiver};
use demo_recorder::{
    config::Config,
    core::{SessionCommand, SessionController},
    dataset::{load_dataset, DatasetMetadata, DatasetWriter, JsonDatasetWriter},
    device::{SimulatedArm, SimulatedCamera},
    stats::create_shared_stats_with_persistence,
    HOTKEYS, VERSION,
};
use std::io::{self, BufRead, Write};
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "demo-recorder")]
#[command(version = VERSION)]
#[command(about = "Synchronized arm-state and camera demonstration recorder", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record demonstrations interactively (b / n / m / q)
    Record {
        /// Sampling period in milliseconds (overrides the config file)
        #[arg(long)]
        period_ms: Option<u64>,

        /// Directory the dataset is written to
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Simulated camera latency per frame in milliseconds
        #[arg(long, default_value = "20")]
        camera_latency_ms: u64,
    },

    /// Show the structure of a saved dataset
    Inspect {
        /// Dataset file written by `record`
        path: PathBuf,
    },

    /// Show configuration
    Config,

    /// Display key bindings
    Keys,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Record {
            period_ms,
            output,
            camera_latency_ms,
        } => cmd_record(period_ms, output, camera_latency_ms),
        Commands::Inspect { path } => cmd_inspect(&path),
        Commands::Config => cmd_config(),
        Commands::Keys => {
            println!("{HOTKEYS}");
            Ok(())
        }
    }
}

fn cmd_record(period_ms: Option<u64>, output: Option<PathBuf>, camera_latency_ms: u64) -> Result<()> {
    let mut config = Config::load().context("loading configuration")?;
    if let Some(ms) = period_ms {
        config.period = Duration::from_millis(ms);
    }
    if let Some(dir) = output {
        config.saved_path = dir;
    }
    config.validate()?;
    if let Err(e) = config.ensure_directories() {
        warn!("could not create directories: {e}");
    }

    println!("Demo Recorder v{VERSION}");
    println!();
    println!("  Frequency: {:.1} Hz", config.frequency_hz());
    println!(
        "  Camera: {}x{} (simulated, {camera_latency_ms} ms latency)",
        config.camera.width, config.camera.height
    );
    println!("  Output: {}", config.saved_path.display());
    println!("{HOTKEYS}");

    let stats = create_shared_stats_with_persistence(config.data_path.join("stats.json"));
    let camera = SimulatedCamera::new(config.camera.width, config.camera.height)
        .with_latency(Duration::from_millis(camera_latency_ms));
    let mut recorder =
        SessionController::spawn(&config, SimulatedArm::new(), camera, stats.clone())?;

    let lines = spawn_line_reader();
    let interrupts = interrupt_channel()?;
    let events = recorder.events().clone();

    loop {
        select! {
            recv(lines) -> line => match line {
                Ok(line) => {
                    if handle_line(&mut recorder, &line).is_break() {
                        break;
                    }
                }
                Err(_) => {
                    info!("input closed; quitting");
                    break;
                }
            },
            recv(interrupts) -> _ => {
                println!();
                println!("Interrupted.");
                break;
            }
            recv(events) -> event => {
                if let Ok(event) = event {
                    eprintln!("Recorder fault: {event}");
                }
                break;
            }
        }
    }

    let summary = recorder.quit();
    if let Some(fault) = &summary.fault {
        eprintln!("Recording stopped early ({fault})");
    }
    println!("Total demos saved: {}", summary.saved_count());

    if let Err(e) = stats.save() {
        warn!("could not save recorder stats: {e}");
    }

    if summary.saved_count() == 0 {
        println!("Nothing to write.");
        println!();
        println!("{}", stats.summary());
        return Ok(());
    }

    print!("Instruction for this dataset: ");
    io::stdout().flush()?;
    let instruction = select! {
        recv(lines) -> line => line.unwrap_or_default(),
        recv(interrupts) -> _ => String::new(),
    };

    let set = summary.into_trajectory_set(instruction.trim(), DatasetMetadata::for_config(&config));
    let writer = JsonDatasetWriter::new(&config.saved_path);
    let path = writer.persist(&set).context("writing dataset")?;
    println!("Dataset written to {}", path.display());

    println!();
    println!("{}", stats.summary());
    Ok(())
}

/// Apply one line of operator input. Breaks on quit.
fn handle_line(recorder: &mut SessionController, line: &str) -> ControlFlow<()> {
    let command = match SessionCommand::parse(line) {
        Ok(command) => command,
        Err(e) => {
            println!("{e}");
            return ControlFlow::Continue(());
        }
    };

    match command {
        SessionCommand::Start => match recorder.start() {
            Ok(started) if started.restarted => println!(
                "Restarted {} ({} unsaved samples dropped)",
                started.id, started.discarded
            ),
            Ok(started) => println!("Recording {}...", started.id),
            Err(e) => eprintln!("Cannot start: {e}"),
        },
        SessionCommand::Save => match recorder.save() {
            Some(saved) => {
                println!("Saved {} ({} steps)", saved.id, saved.steps);
                if let Some(trim) = saved.trim {
                    println!(
                        "  Trimmed {} states / {} frames to {}",
                        trim.states, trim.frames, trim.kept
                    );
                }
            }
            None => println!("Not recording."),
        },
        SessionCommand::Reject => match recorder.reject() {
            Some(rejected) => println!(
                "Rejected {} ({} states discarded)",
                rejected.id, rejected.states
            ),
            None => println!("Not recording."),
        },
        SessionCommand::Quit => return ControlFlow::Break(()),
    }
    ControlFlow::Continue(())
}

fn cmd_inspect(path: &Path) -> Result<()> {
    let set = load_dataset(path).with_context(|| format!("reading {}", path.display()))?;

    println!("Dataset {}", path.display());
    println!("=======");
    println!();
    println!(
        "Producer: {} v{} on {} ({})",
        set.metadata.producer, set.metadata.version, set.metadata.host, set.metadata.instance_id
    );
    println!("{}", set.summary());
    Ok(())
}

fn cmd_config() -> Result<()> {
    let config = Config::load().context("loading configuration")?;

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

/// Forward stdin lines to a channel so the command loop can also wait on
/// interrupts and worker faults.
fn spawn_line_reader() -> Receiver<String> {
    let (tx, rx) = crossbeam_channel::unbounded();
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// Ctrl+C behaves like `q`.
fn interrupt_channel() -> Result<Receiver<()>> {
    let (tx, rx) = crossbeam_channel::bounded(1);
    ctrlc::set_handler(move || {
        let _ = tx.try_send(());
    })
    .context("installing Ctrl+C handler")?;
    Ok(rx)
}
