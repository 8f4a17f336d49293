//! # Galsampler: Monte Carlo Galaxy Resampling
//!
//! Populates the halos of a target simulation with galaxies drawn from a
//! source catalog.
//!
//! ## Usage
//! ```bash
//! # Uniform draw within each cell
//! galsampler --input run.json --out selection.json --seed 43
//!
//! # Require 5 source halos per cell and match on concentration
//! galsampler --input run.json --out selection.json --nhalo-min 5 --match-property conc
//!
//! # With profiling output
//! galsampler --input run.json --out selection.json --profile
//! ```

use std::time::Instant;

use galsampler::config::Config;
use galsampler::pipelines::ResamplePipeline;
use galsampler::utils::threading::build_thread_pool;
use galsampler::utils::telemetry::{HeartbeatConfig, HeartbeatHandle, Stage, TelemetryBlackboard};
use galsampler::Result;

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Initialize tracing subscriber for hierarchical profiling output
fn init_profiling() {
    use tracing_subscriber::fmt::format::FmtSpan;
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_span_events(FmtSpan::CLOSE)
                .with_target(false)
                .with_timer(fmt::time::uptime()),
        )
        .init();
}

fn run() -> Result<()> {
    let start = Instant::now();

    let config = Config::parse_and_validate()?;

    if config.profile {
        init_profiling();
        eprintln!("=== Profiling enabled ===\n");
    }

    let n_threads = config.nthreads();
    let pool = build_thread_pool(n_threads)?;

    eprintln!("Galsampler v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("Threads: {}", n_threads);
    eprintln!("Input: {:?}", config.input);
    match config.seed {
        Some(seed) => eprintln!("Seed: {}", seed),
        None => eprintln!("Seed: from OS entropy"),
    }

    let telemetry = TelemetryBlackboard::new();
    let heartbeat = HeartbeatHandle::spawn(
        telemetry.clone(),
        HeartbeatConfig {
            interval_secs: config.heartbeat_secs,
            ..HeartbeatConfig::default()
        },
    )?;

    telemetry.set_stage(Stage::LoadingCatalogs);

    let out_path = config.out.clone();
    let mut pipeline = ResamplePipeline::new(config, Some(telemetry.clone()));
    let output = pool.install(|| pipeline.run());

    telemetry.set_stage(Stage::Complete);
    heartbeat.shutdown();
    let output = output?;

    eprintln!(
        "\nSelected {} galaxies for {} target halos ({} of {} cells well sampled)",
        output.galaxy_indices.len(),
        output.source_halo_indices.len(),
        output.diagnostics.n_well_sampled_cells,
        output.diagnostics.n_cells,
    );
    eprintln!("Output: {:?}", out_path);
    eprintln!("Completed in {:.2}s", start.elapsed().as_secs_f64());

    Ok(())
}
