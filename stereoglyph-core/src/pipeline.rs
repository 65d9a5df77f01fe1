//! Stereo pacing loop
//!
//! One cycle per display refresh: acquire both eyes, fuse them, present the
//! result to every sink, apply pending control commands, then sleep out the
//! rest of the frame period.
//!
//! ```text
//! Idle -> Capturing -> Rendering -> Presenting -> Sleeping -> Capturing ...
//!                                        |
//!                                        +-> Stopped (quit / frame limit)
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::capture::{AcquiredFrame, CaptureSource, SourceStats};
use crate::config::{AcquireStrategy, StereoConfig};
use crate::error::{Result, ResultExt, StereoError};
use crate::output::{FrameSink, MonitorSink, RawOutputSink};
use crate::performance::{PerformanceMetrics, Stage, create_metrics};
use crate::render::{RenderMode, render};
use crate::types::{Eye, FrameGeometry, Handle, WorkingFrame};

/// Capacity of the control channel
const CONTROL_CAPACITY: usize = 16;

/// Command applied at the end of a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlCommand {
    /// Advance to the next render mode
    CycleMode,
    /// Stop after the current cycle
    Quit,
}

/// Pipeline state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Created, sources not yet streaming
    Idle,
    /// Acquiring frames
    Capturing,
    /// Fusing the pair
    Rendering,
    /// Handing the output to sinks
    Presenting,
    /// Waiting out the frame period
    Sleeping,
    /// Sources released; terminal
    Stopped,
}

/// Fixed-rate pacing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacer {
    period: Duration,
}

impl Pacer {
    /// Pace at `fps` cycles per second
    pub fn new(fps: u32) -> Self {
        Self {
            period: Duration::from_secs(1) / fps.max(1),
        }
    }

    /// Budget of one cycle
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Sleep needed after `elapsed` of work; zero on overrun
    pub fn remaining(&self, elapsed: Duration) -> Duration {
        self.period.saturating_sub(elapsed)
    }
}

/// Summary of a run
#[derive(Debug, Clone)]
pub struct PipelineStats {
    /// Pipeline handle
    pub handle: Handle,
    /// State at the time of the snapshot
    pub state: PipelineState,
    /// Frame geometry
    pub geometry: FrameGeometry,
    /// Target rate
    pub fps: u32,
    /// Mode in effect
    pub mode: RenderMode,
    /// Completed cycles
    pub cycles: u64,
    /// Frames presented (once per cycle)
    pub frames_presented: u64,
    /// Cycles that exceeded the period
    pub overruns: u64,
    /// Acquire timeouts that were retried
    pub retries: u64,
    /// Left source counters
    pub left: SourceStats,
    /// Right source counters
    pub right: SourceStats,
    /// Measured rate
    pub actual_fps: f64,
    /// Time since the first cycle
    pub elapsed_seconds: f64,
}

impl std::fmt::Display for PipelineStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Pipeline {}: {:?} - {} @ {}fps (actual: {:.1}fps), {}, {} cycles, {} overruns, {} retries",
            self.handle,
            self.state,
            self.geometry,
            self.fps,
            self.actual_fps,
            self.mode,
            self.cycles,
            self.overruns,
            self.retries
        )
    }
}

/// The stereo pacing loop
pub struct StereoPipeline {
    handle: Handle,
    left: CaptureSource,
    right: CaptureSource,
    left_frame: WorkingFrame,
    right_frame: WorkingFrame,
    output: Vec<u8>,
    sinks: Vec<Box<dyn FrameSink>>,
    geometry: FrameGeometry,
    mode: RenderMode,
    strategy: AcquireStrategy,
    retries: u32,
    timeout: Duration,
    pacer: Pacer,
    fps: u32,
    state: PipelineState,
    control_tx: mpsc::Sender<ControlCommand>,
    control_rx: mpsc::Receiver<ControlCommand>,
    metrics: Arc<PerformanceMetrics>,
    cycles: u64,
    max_cycles: Option<u64>,
    stats_interval: u64,
    parity_warned: bool,
    start_time: Option<Instant>,
}

impl StereoPipeline {
    /// Build a pipeline over two initialized sources
    ///
    /// Sinks are added separately with [`add_sink`](Self::add_sink).
    pub fn new(left: CaptureSource, right: CaptureSource, config: &StereoConfig) -> Result<Self> {
        config.validate_strict()?;
        let geometry = config.geometry;
        for (eye, source) in [(Eye::Left, &left), (Eye::Right, &right)] {
            if source.geometry() != geometry {
                return Err(StereoError::configuration(format!(
                    "{} camera delivers {}, pipeline expects {}",
                    eye,
                    source.geometry(),
                    geometry
                )));
            }
        }

        let (control_tx, control_rx) = mpsc::channel(CONTROL_CAPACITY);
        Ok(Self {
            handle: Handle::new(),
            left,
            right,
            left_frame: WorkingFrame::new(geometry),
            right_frame: WorkingFrame::new(geometry),
            output: vec![0; geometry.frame_len()],
            sinks: Vec::new(),
            geometry,
            mode: config.mode,
            strategy: config.strategy,
            retries: config.acquire_retries,
            timeout: config.timeout,
            pacer: Pacer::new(config.fps),
            fps: config.fps,
            state: PipelineState::Idle,
            control_tx,
            control_rx,
            metrics: create_metrics(),
            cycles: 0,
            max_cycles: config.max_frames,
            stats_interval: config.stats_interval,
            parity_warned: false,
            start_time: None,
        })
    }

    /// Open both cameras and the configured sinks
    pub fn from_config(config: &StereoConfig) -> Result<Self> {
        config.validate_strict()?;
        for warning in config.validate() {
            warn!("{}", warning);
        }

        let options = config.capture_options();
        let left = CaptureSource::initialize(&config.left_device, options)
            .context(format!("Opening left camera {}", config.left_device))?;
        let right = CaptureSource::initialize(&config.right_device, options)
            .context(format!("Opening right camera {}", config.right_device))?;

        let mut pipeline = Self::new(left, right, config)?;
        if config.monitor {
            pipeline.add_sink(Box::new(
                MonitorSink::new().with_log_every(config.stats_interval),
            ));
        }
        if let Some(path) = &config.raw_output {
            pipeline.add_sink(Box::new(RawOutputSink::open(path)?));
        }
        Ok(pipeline)
    }

    /// Append a sink; the first sink added is the primary one
    pub fn add_sink(&mut self, sink: Box<dyn FrameSink>) {
        debug!("Added sink '{}'", sink.name());
        self.sinks.push(sink);
    }

    /// Sender for control commands
    pub fn control_sender(&self) -> mpsc::Sender<ControlCommand> {
        self.control_tx.clone()
    }

    /// Shared metrics
    pub fn metrics(&self) -> Arc<PerformanceMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Pipeline handle
    pub fn handle(&self) -> Handle {
        self.handle
    }

    /// Current state
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Mode used for the next render
    pub fn mode(&self) -> RenderMode {
        self.mode
    }

    /// Most recent fused frame
    pub fn output(&self) -> &[u8] {
        &self.output
    }

    /// Run one full cycle
    ///
    /// Returns `Ok(false)` once the pipeline has stopped (quit command or
    /// frame limit); the sources are released at that point.
    pub fn step(&mut self) -> Result<bool> {
        match self.state {
            PipelineState::Stopped => {
                return Err(StereoError::Unsupported(
                    "pipeline has already stopped".to_string(),
                ));
            }
            PipelineState::Idle => self.start()?,
            _ => {}
        }

        let cycle_start = Instant::now();
        self.metrics.record_cycle_start(cycle_start);

        self.state = PipelineState::Capturing;
        let stage_start = Instant::now();
        let (left, right) = self.capture()?;
        self.metrics.record_stage(Stage::Capture, stage_start.elapsed());
        trace!(
            "Cycle {}: left buf {} seq {}, right buf {} seq {}",
            self.cycles, left.index, left.sequence, right.index, right.sequence
        );

        self.state = PipelineState::Rendering;
        let stage_start = Instant::now();
        let parity = self.parity();
        render(
            self.left_frame.as_bytes(),
            self.right_frame.as_bytes(),
            &mut self.output,
            self.mode,
            self.geometry.width as usize,
            parity,
        )
        .context(format!("Rendering {}", self.mode))?;
        self.metrics.record_stage(Stage::Render, stage_start.elapsed());

        self.state = PipelineState::Presenting;
        let stage_start = Instant::now();
        for sink in &mut self.sinks {
            sink.present(&self.output, self.geometry)
                .context(format!("Presenting to {}", sink.name()))?;
        }
        self.metrics.record_stage(Stage::Present, stage_start.elapsed());
        self.metrics.record_presented();
        self.cycles += 1;

        let mut keep_going = self.apply_commands();
        if self.max_cycles.is_some_and(|max| self.cycles >= max) {
            debug!("Frame limit of {} reached", self.cycles);
            keep_going = false;
        }

        let busy = cycle_start.elapsed();
        if self.metrics.record_cycle_work(busy, self.pacer.period()) {
            debug!(
                "Cycle {} overran: {:?} of {:?}",
                self.cycles,
                busy,
                self.pacer.period()
            );
        }
        if self.stats_interval > 0 && self.cycles % self.stats_interval == 0 {
            debug!("{}", self.metrics.snapshot().format_line());
        }

        if !keep_going {
            self.shutdown();
            return Ok(false);
        }

        self.state = PipelineState::Sleeping;
        let remaining = self.pacer.remaining(busy);
        if !remaining.is_zero() {
            std::thread::sleep(remaining);
        }
        Ok(true)
    }

    /// Loop until quit, the frame limit, or a fatal error
    ///
    /// Sources are released on every exit path.
    pub fn run(&mut self) -> Result<PipelineStats> {
        info!(
            "Starting pipeline {}: {} @ {}fps, {}, {} capture",
            self.handle, self.geometry, self.fps, self.mode, self.strategy
        );

        let outcome = loop {
            match self.step() {
                Ok(true) => continue,
                Ok(false) => break Ok(()),
                Err(e) => break Err(e),
            }
        };

        self.shutdown();
        let stats = self.stats();
        info!("{}", stats);
        debug!("{}", self.metrics.snapshot().format_detailed());
        outcome.map(|()| stats)
    }

    /// Release both sources and close the sinks
    ///
    /// Idempotent; failures are logged.
    pub fn shutdown(&mut self) {
        if self.state == PipelineState::Stopped {
            return;
        }
        self.left.disarm();
        self.right.disarm();
        for sink in &mut self.sinks {
            if let Err(e) = sink.close() {
                warn!("Closing sink '{}' failed: {}", sink.name(), e);
            }
        }
        self.state = PipelineState::Stopped;
        info!("Pipeline {} stopped", self.handle);
    }

    /// Current statistics
    pub fn stats(&self) -> PipelineStats {
        let elapsed = self
            .start_time
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        let metrics = self.metrics.snapshot();
        PipelineStats {
            handle: self.handle,
            state: self.state,
            geometry: self.geometry,
            fps: self.fps,
            mode: self.mode,
            cycles: self.cycles,
            frames_presented: metrics.frames_presented,
            overruns: metrics.overruns,
            retries: metrics.retries,
            left: self.left.stats(),
            right: self.right.stats(),
            actual_fps: if elapsed > 0.0 {
                self.cycles as f64 / elapsed
            } else {
                0.0
            },
            elapsed_seconds: elapsed,
        }
    }

    fn start(&mut self) -> Result<()> {
        if self.sinks.is_empty() {
            return Err(StereoError::configuration("No frame sinks registered"));
        }
        self.left.arm().context("Arming left camera")?;
        self.right.arm().context("Arming right camera")?;
        self.start_time = Some(Instant::now());
        Ok(())
    }

    fn capture(&mut self) -> Result<(AcquiredFrame, AcquiredFrame)> {
        let timeout = self.timeout;
        let retries = self.retries;
        let metrics = &*self.metrics;

        match self.strategy {
            AcquireStrategy::Sequential => {
                let left = acquire_eye(
                    Eye::Left,
                    &mut self.left,
                    &mut self.left_frame,
                    timeout,
                    retries,
                    metrics,
                )?;
                let right = acquire_eye(
                    Eye::Right,
                    &mut self.right,
                    &mut self.right_frame,
                    timeout,
                    retries,
                    metrics,
                )?;
                Ok((left, right))
            }
            AcquireStrategy::Concurrent => {
                let (left_src, left_frame) = (&mut self.left, &mut self.left_frame);
                let (right_src, right_frame) = (&mut self.right, &mut self.right_frame);

                let (left, right) = std::thread::scope(|s| {
                    let left = s.spawn(move || {
                        acquire_eye(Eye::Left, left_src, left_frame, timeout, retries, metrics)
                    });
                    let right = s.spawn(move || {
                        acquire_eye(Eye::Right, right_src, right_frame, timeout, retries, metrics)
                    });
                    (join_worker(Eye::Left, left), join_worker(Eye::Right, right))
                });
                Ok((left?, right?))
            }
        }
    }

    /// Scanline phase for interlace, from the primary sink's position
    fn parity(&mut self) -> u32 {
        let offset = self.sinks.first().and_then(|s| s.vertical_offset());
        match offset {
            Some(offset) => offset.rem_euclid(2) as u32,
            None => {
                if self.mode.is_interlace() && !self.parity_warned {
                    warn!(
                        "Display offset unknown; interlacing with parity 0. \
                         Eyes may be swapped on the physical display."
                    );
                    self.parity_warned = true;
                }
                0
            }
        }
    }

    /// Drain pending commands; returns whether to keep running
    fn apply_commands(&mut self) -> bool {
        let mut keep_going = true;
        while let Ok(command) = self.control_rx.try_recv() {
            match command {
                ControlCommand::CycleMode => {
                    self.mode = self.mode.next();
                    info!("Render mode: {}", self.mode);
                }
                ControlCommand::Quit => {
                    info!("Quit requested");
                    keep_going = false;
                }
            }
        }
        keep_going
    }
}

impl Drop for StereoPipeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Acquire one eye, retrying timeouts up to `retries` times
fn acquire_eye(
    eye: Eye,
    source: &mut CaptureSource,
    frame: &mut WorkingFrame,
    timeout: Duration,
    retries: u32,
    metrics: &PerformanceMetrics,
) -> Result<AcquiredFrame> {
    let mut attempt = 0;
    loop {
        match source.acquire(frame, timeout) {
            Ok(acquired) => return Ok(acquired),
            Err(e) if e.is_recoverable() && attempt < retries => {
                attempt += 1;
                metrics.record_retry();
                warn!("{} camera: {} (retry {}/{})", eye, e, attempt, retries);
            }
            Err(e) => {
                return Err(e.with_context(format!(
                    "Capturing {} eye from {}",
                    eye,
                    source.identifier()
                )));
            }
        }
    }
}

fn join_worker(
    eye: Eye,
    handle: std::thread::ScopedJoinHandle<'_, Result<AcquiredFrame>>,
) -> Result<AcquiredFrame> {
    handle
        .join()
        .unwrap_or_else(|_| Err(StereoError::resource(format!("{} capture worker panicked", eye))))
}
