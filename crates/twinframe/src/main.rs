//! # TWINFRAME host
//!
//! Headless stand-in for an engine main loop. Runs a Rhai script on the
//! worker thread and ticks the orchestrator at a fixed rate, reading only
//! front buffers.
//!
//! ```text
//! RUST_LOG=info twinframe --script scripts/demo.rhai --config twinframe.toml --ticks 300
//! ```

mod handlers;

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use parking_lot::Mutex;
use tracing::{debug, info, warn};
use twinframe_core::{BufferSet, RuntimeConfig, SwapPolicy, TwinframeError};
use twinframe_dispatch::{AgentId, CallbackQueue, CommandExecutor, CommandQueue};
use twinframe_script::{FrameOrchestrator, RhaiRuntime, ScriptBuffer, ScriptWorld, WorkerFrameJob};

use crate::handlers::HostBuffers;

/// Ticks between sweeps of idle rate-limit windows.
const PRUNE_EVERY: u64 = 600;

#[derive(Debug, Parser)]
#[command(name = "twinframe", version, about = "Drive a scripting worker from a fixed-rate main loop")]
struct Cli {
    /// TOML runtime configuration. Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Rhai script defining `update(world, frame)` and optionally `produce(world, frame)`.
    #[arg(long)]
    script: PathBuf,

    /// Number of main-thread ticks to run.
    #[arg(long, default_value_t = 600)]
    ticks: u64,

    /// Agent id the script submits commands as.
    #[arg(long, default_value_t = 1)]
    agent: u64,

    /// Log a stats line every N ticks (0 disables).
    #[arg(long, default_value_t = 60)]
    stats_every: u64,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => RuntimeConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => RuntimeConfig::default(),
    };
    info!(?config, script = %cli.script.display(), "starting twinframe host");

    let (mut orchestrator, buffers) = bootstrap(&cli, &config)?;
    run_loop(&mut orchestrator, &cli, config.tick_duration());

    match orchestrator.shutdown(config.shutdown_timeout()) {
        Ok(()) => {}
        Err(TwinframeError::WorkerShutdownTimeout { waited_ms }) => {
            warn!(waited_ms, "worker abandoned at exit");
        }
        Err(err) => return Err(err).context("stopping worker"),
    }

    summarize(&mut orchestrator, &buffers);
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn bootstrap(cli: &Cli, config: &RuntimeConfig) -> Result<(FrameOrchestrator, HostBuffers)> {
    let buffers = HostBuffers {
        entities: Arc::new(ScriptBuffer::with_policy("entities", SwapPolicy::DirtyTracked)),
        audio: Arc::new(ScriptBuffer::new("audio")),
    };
    let camera = Arc::new(ScriptBuffer::new("camera"));

    let commands = Arc::new(CommandQueue::new(config.queue_capacity));
    let callbacks = Arc::new(CallbackQueue::new());

    let mut executor = CommandExecutor::from_config(config);
    handlers::register_all(&mut executor, &buffers);

    let world = ScriptWorld::new(
        Arc::clone(&commands),
        AgentId(cli.agent),
        [
            Arc::clone(&buffers.entities),
            Arc::clone(&camera),
            Arc::clone(&buffers.audio),
        ],
    );
    let runtime = RhaiRuntime::from_file(&cli.script, world, config)
        .with_context(|| format!("loading script {}", cli.script.display()))?;
    let worker = WorkerFrameJob::spawn(
        Arc::new(Mutex::new(runtime)),
        Arc::clone(&callbacks),
        config.shutdown_timeout(),
    )?;

    let set = BufferSet::new()
        .with(buffers.entities.clone())
        .with(camera)
        .with(buffers.audio.clone());
    debug!(buffers = ?set.names(), "buffers wired");

    Ok((
        FrameOrchestrator::new(commands, executor, callbacks, set, worker),
        buffers,
    ))
}

/// Fixed-rate loop: tick, then sleep out the rest of the period.
fn run_loop(orchestrator: &mut FrameOrchestrator, cli: &Cli, period: Duration) {
    let mut next = Instant::now();
    for _ in 0..cli.ticks {
        let report = orchestrator.tick();
        if report.skipped() {
            debug!(tick = report.tick, "frame skipped");
        }
        if report.tick % PRUNE_EVERY == 0 {
            orchestrator.executor_mut().prune_rate_windows();
        }

        if cli.stats_every > 0 && report.tick % cli.stats_every == 0 {
            let stats = orchestrator.stats();
            let worker = orchestrator.worker().stats();
            info!(
                tick = stats.ticks,
                frames = worker.frames_completed,
                skips = stats.frame_skips,
                commands = stats.commands_executed,
                faults = worker.faults,
                tick_us = u64::try_from(report.duration.as_micros()).unwrap_or(u64::MAX),
                "tick stats",
            );
        }

        next += period;
        let now = Instant::now();
        if next > now {
            thread::sleep(next - now);
        } else {
            // Behind schedule; do not try to catch up with a burst.
            next = now;
        }
    }
}

fn summarize(orchestrator: &mut FrameOrchestrator, buffers: &HostBuffers) {
    let stats = orchestrator.stats();
    let executor = orchestrator.executor().stats();
    let queue = orchestrator.commands().stats();
    let worker = orchestrator.worker().stats();

    info!(
        ticks = stats.ticks,
        swaps = stats.swaps,
        frame_skips = stats.frame_skips,
        frames = worker.frames_completed,
        script_faults = worker.faults,
        "frame summary",
    );
    info!(
        executed = executor.executed,
        succeeded = executor.succeeded,
        failed = executor.failed,
        rate_limited = executor.rate_limited,
        unknown = executor.unknown,
        dropped = queue.rejected,
        "command summary",
    );
    info!(
        entities = buffers.entities.front().len(),
        sounds = buffers.audio.front().len(),
        "visible state",
    );
}
