//! Surface Glitch - demo host
//!
//! Runs the glitch scheduler against in-memory material surfaces for a fixed
//! time, then stops it and checks every surface is back on its baseline.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use surface_glitch::settings::seconds_to_duration;
use surface_glitch::telemetry::{init_logging, LogConfig};
use surface_glitch::{GlitchConfig, GlitchScheduler, MaterialSurface, ParameterSet, SurfaceArena};

#[derive(Parser, Debug)]
#[command(name = "surface-glitch", version, about = "Run the glitch controller against in-memory surfaces")]
struct Cli {
    /// Config file to load (defaults to the user config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of surfaces to glitch
    #[arg(long, default_value_t = 4)]
    surfaces: usize,

    /// How long to keep the scheduler active, in seconds
    #[arg(long, default_value_t = 5.0)]
    seconds: f32,

    /// Seed for a reproducible run
    #[arg(long)]
    seed: Option<u64>,

    /// Write the default config to this path and exit
    #[arg(long)]
    save_default: Option<PathBuf>,

    /// Emit JSON logs
    #[arg(long, default_value_t = false)]
    json_logs: bool,

    /// Also log to this file
    #[arg(long)]
    log_file: Option<PathBuf>,
}

fn glitched_count(surfaces: &[Arc<MaterialSurface>]) -> usize {
    surfaces
        .iter()
        .filter(|s| {
            ParameterSet::read_from(&***s)
                .map(|values| values != ParameterSet::default())
                .unwrap_or(true)
        })
        .count()
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_config = LogConfig {
        json_format: cli.json_logs,
        file_enabled: cli.log_file.is_some(),
        file_path: cli.log_file.clone(),
        ..Default::default()
    };
    // Keep the guard alive for the program duration
    let _log_guard = match init_logging(&log_config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            None
        }
    };

    if let Some(path) = &cli.save_default {
        return match GlitchConfig::default().save_to_file(path) {
            Ok(()) => {
                tracing::info!("Wrote default config to {}", path.display());
                ExitCode::SUCCESS
            }
            Err(e) => {
                tracing::error!("Failed to write {}: {}", path.display(), e);
                ExitCode::FAILURE
            }
        };
    }

    let mut config = match &cli.config {
        Some(path) => match GlitchConfig::load_from_file(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::error!("Failed to load {}: {}", path.display(), e);
                return ExitCode::FAILURE;
            }
        },
        None => GlitchConfig::load(),
    };
    if cli.seed.is_some() {
        config.seed = cli.seed;
    }

    let surfaces: Vec<Arc<MaterialSurface>> = (0..cli.surfaces)
        .map(|i| Arc::new(MaterialSurface::glitch_ready(format!("surface-{}", i))))
        .collect();
    let mut arena = SurfaceArena::new();
    for surface in &surfaces {
        arena.insert(surface.clone());
    }

    let mut scheduler = GlitchScheduler::new(arena, config);
    if let Err(e) = scheduler.start() {
        tracing::error!("Failed to start glitch scheduler: {}", e);
        return ExitCode::FAILURE;
    }

    let run_for = seconds_to_duration(cli.seconds);
    let deadline = tokio::time::sleep(run_for);
    tokio::pin!(deadline);
    let mut progress = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            _ = &mut deadline => break,
            _ = progress.tick() => {
                let counters = scheduler.stats().counters();
                tracing::debug!(
                    triggers = counters.triggers,
                    in_flight = counters.in_flight,
                    glitched = glitched_count(&surfaces),
                    "Progress"
                );
            }
        }
    }

    let report = scheduler.stop().await;
    let counters = scheduler.stats().counters();
    tracing::info!(
        ticks = counters.ticks,
        triggers = counters.triggers,
        completed = counters.completed,
        cancelled = counters.cancelled,
        trigger_rate = counters.trigger_rate(),
        "Run finished"
    );

    let dirty = glitched_count(&surfaces);
    if dirty > 0 || !report.is_complete() {
        tracing::error!(dirty, failed = report.failed.len(), "Surfaces were not restored");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
