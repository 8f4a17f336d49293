//! # Telemetry Blackboard
//!
//! Thread-safe progress tracking for the resampling pipeline.
//! Uses atomic counters that can be cheaply updated from rayon parallel iterators.
//!
//! The blackboard pattern decouples work execution from progress reporting:
//! - Worker threads update atomic counters with minimal overhead
//! - A background heartbeat thread periodically reads and reports progress

use std::io::{self, IsTerminal, Write};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Processing stage for high-level progress tracking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Stage {
    Initializing = 0,
    LoadingCatalogs = 1,
    Binning = 2,
    Richness = 3,
    SelectingHalos = 4,
    ExpandingGalaxies = 5,
    WritingOutput = 6,
    Complete = 7,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Initializing => "Initializing",
            Stage::LoadingCatalogs => "Loading Catalogs",
            Stage::Binning => "Binning",
            Stage::Richness => "Richness",
            Stage::SelectingHalos => "Selecting Halos",
            Stage::ExpandingGalaxies => "Expanding Galaxies",
            Stage::WritingOutput => "Writing Output",
            Stage::Complete => "Complete",
        }
    }

    fn from_u64(val: u64) -> Self {
        match val {
            0 => Stage::Initializing,
            1 => Stage::LoadingCatalogs,
            2 => Stage::Binning,
            3 => Stage::Richness,
            4 => Stage::SelectingHalos,
            5 => Stage::ExpandingGalaxies,
            6 => Stage::WritingOutput,
            _ => Stage::Complete,
        }
    }
}

/// Shared progress state, updated with relaxed atomics from hot loops.
///
/// The heartbeat thread only needs eventual visibility and reads
/// approximate values.
pub struct TelemetryBlackboard {
    stage: AtomicU64,

    cells_processed: AtomicU64,
    total_cells: AtomicU64,
    halos_selected: AtomicU64,
    total_target_halos: AtomicU64,
    galaxies_emitted: AtomicU64,

    start_time: Instant,
    last_progress_nanos: AtomicU64,

    shutdown: AtomicBool,
}

impl TelemetryBlackboard {
    /// Create a new telemetry blackboard
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    #[inline]
    pub fn set_stage(&self, stage: Stage) {
        self.stage.store(stage as u64, Ordering::Relaxed);
        self.touch_progress();
    }

    #[inline]
    pub fn stage(&self) -> Stage {
        Stage::from_u64(self.stage.load(Ordering::Relaxed))
    }

    // === Counters ===

    pub fn set_total_cells(&self, n: u64) {
        self.total_cells.store(n, Ordering::Relaxed);
        self.cells_processed.store(0, Ordering::Relaxed);
    }

    pub fn set_total_target_halos(&self, n: u64) {
        self.total_target_halos.store(n, Ordering::Relaxed);
    }

    #[inline]
    pub fn add_cells_processed(&self, n: u64) {
        self.cells_processed.fetch_add(n, Ordering::Relaxed);
        self.touch_progress();
    }

    #[inline]
    pub fn add_halos_selected(&self, n: u64) {
        self.halos_selected.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub fn add_galaxies_emitted(&self, n: u64) {
        self.galaxies_emitted.fetch_add(n, Ordering::Relaxed);
        self.touch_progress();
    }

    pub fn halos_selected(&self) -> u64 {
        self.halos_selected.load(Ordering::Relaxed)
    }

    pub fn galaxies_emitted(&self) -> u64 {
        self.galaxies_emitted.load(Ordering::Relaxed)
    }

    // === Timing ===

    #[inline]
    fn touch_progress(&self) {
        let elapsed = self.start_time.elapsed().as_nanos() as u64;
        self.last_progress_nanos.store(elapsed, Ordering::Relaxed);
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start_time.elapsed().as_secs_f64()
    }

    fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            stage: self.stage(),
            cells_processed: self.cells_processed.load(Ordering::Relaxed),
            total_cells: self.total_cells.load(Ordering::Relaxed),
            halos_selected: self.halos_selected.load(Ordering::Relaxed),
            total_target_halos: self.total_target_halos.load(Ordering::Relaxed),
            galaxies_emitted: self.galaxies_emitted.load(Ordering::Relaxed),
            elapsed_secs: self.elapsed_secs(),
            last_progress_nanos: self.last_progress_nanos.load(Ordering::Relaxed),
            current_nanos: self.start_time.elapsed().as_nanos() as u64,
        }
    }

    fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    fn signal_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}

impl Default for TelemetryBlackboard {
    fn default() -> Self {
        Self {
            stage: AtomicU64::new(Stage::Initializing as u64),
            cells_processed: AtomicU64::new(0),
            total_cells: AtomicU64::new(0),
            halos_selected: AtomicU64::new(0),
            total_target_halos: AtomicU64::new(0),
            galaxies_emitted: AtomicU64::new(0),
            start_time: Instant::now(),
            last_progress_nanos: AtomicU64::new(0),
            shutdown: AtomicBool::new(false),
        }
    }
}

struct TelemetrySnapshot {
    stage: Stage,
    cells_processed: u64,
    total_cells: u64,
    halos_selected: u64,
    total_target_halos: u64,
    galaxies_emitted: u64,
    elapsed_secs: f64,
    last_progress_nanos: u64,
    current_nanos: u64,
}

/// Heartbeat output configuration
pub struct HeartbeatConfig {
    /// Interval between heartbeats (seconds)
    pub interval_secs: u64,
    /// Stall warning threshold (seconds with no progress)
    pub stall_threshold_secs: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            stall_threshold_secs: 300,
        }
    }
}

/// Handle to the heartbeat thread
pub struct HeartbeatHandle {
    handle: Option<JoinHandle<()>>,
    blackboard: Arc<TelemetryBlackboard>,
}

impl HeartbeatHandle {
    /// Spawn the heartbeat thread
    pub fn spawn(blackboard: Arc<TelemetryBlackboard>, config: HeartbeatConfig) -> io::Result<Self> {
        let bb = blackboard.clone();
        let is_tty = io::stderr().is_terminal();

        let handle = thread::Builder::new()
            .name("heartbeat".to_string())
            .spawn(move || {
                heartbeat_loop(bb, config, is_tty);
            })?;

        Ok(Self {
            handle: Some(handle),
            blackboard,
        })
    }

    /// Signal shutdown and wait for thread to finish
    pub fn shutdown(mut self) {
        self.blackboard.signal_shutdown();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for HeartbeatHandle {
    fn drop(&mut self) {
        // Don't block in drop - just signal shutdown
        self.blackboard.signal_shutdown();
    }
}

/// Format duration in human-readable form
fn format_duration(secs: f64) -> String {
    if secs < 60.0 {
        format!("{:.0}s", secs)
    } else if secs < 3600.0 {
        let mins = (secs / 60.0).floor();
        let remaining_secs = secs % 60.0;
        format!("{:.0}m{:.0}s", mins, remaining_secs)
    } else {
        format!("{:.1}h", secs / 3600.0)
    }
}

fn progress_pct(snap: &TelemetrySnapshot) -> f64 {
    if snap.total_cells > 0 {
        (snap.cells_processed as f64 / snap.total_cells as f64 * 100.0).min(100.0)
    } else {
        0.0
    }
}

fn heartbeat_loop(bb: Arc<TelemetryBlackboard>, config: HeartbeatConfig, is_tty: bool) {
    // Sleep in short slices so shutdown is not delayed by a full interval
    let tick = Duration::from_millis(100);
    let interval = Duration::from_secs(config.interval_secs.max(1));
    let mut last_halos = 0u64;
    let mut last_time = Instant::now();

    loop {
        let wake = Instant::now() + interval;
        while Instant::now() < wake {
            if bb.is_shutdown() {
                break;
            }
            thread::sleep(tick);
        }
        if bb.is_shutdown() {
            break;
        }

        let snap = bb.snapshot();

        let now = Instant::now();
        let dt = now.duration_since(last_time).as_secs_f64();
        let velocity = if dt > 0.1 {
            snap.halos_selected.saturating_sub(last_halos) as f64 / dt
        } else {
            0.0
        };
        last_halos = snap.halos_selected;
        last_time = now;

        let stall_secs =
            (snap.current_nanos.saturating_sub(snap.last_progress_nanos)) / 1_000_000_000;
        let is_stalled = stall_secs > config.stall_threshold_secs;

        if is_tty {
            print_tty_progress(&snap, velocity, is_stalled);
        } else {
            print_log_progress(&snap, velocity, is_stalled);
        }
    }

    if is_tty {
        eprint!("\r\x1b[K");
        let _ = io::stderr().flush();
    }
}

/// Print progress for TTY (rewriting single line)
fn print_tty_progress(snap: &TelemetrySnapshot, velocity: f64, is_stalled: bool) {
    let pct = progress_pct(snap);
    let bar_width = 20;
    let filled = ((pct / 100.0) * bar_width as f64) as usize;
    let bar: String = "=".repeat(filled.min(bar_width))
        + &" ".repeat(bar_width.saturating_sub(filled));
    let stall_str = if is_stalled { " [STALLED]" } else { "" };

    eprint!(
        "\r[{}] {:>5.1}% | {} | C{}/{} H{}/{} G{} | {:.0} halos/s | {}{}    \x1b[K",
        bar,
        pct,
        snap.stage.as_str(),
        snap.cells_processed,
        snap.total_cells,
        snap.halos_selected,
        snap.total_target_halos,
        snap.galaxies_emitted,
        velocity,
        format_duration(snap.elapsed_secs),
        stall_str
    );
    let _ = io::stderr().flush();
}

/// Print progress for non-TTY (structured log line)
fn print_log_progress(snap: &TelemetrySnapshot, velocity: f64, is_stalled: bool) {
    eprintln!(
        "[HEARTBEAT] stage=\"{}\" cells={}/{} halos={}/{} galaxies={} \
         velocity={:.0}/s elapsed={:.0}s stalled={}",
        snap.stage.as_str(),
        snap.cells_processed,
        snap.total_cells,
        snap.halos_selected,
        snap.total_target_halos,
        snap.galaxies_emitted,
        velocity,
        snap.elapsed_secs,
        is_stalled
    );
}
