//! Performance metrics for the pacing loop
//!
//! Provides:
//! - Per-stage timing (capture, render, present) as rolling averages
//! - Achieved frame rate from cycle-to-cycle intervals
//! - Overrun and retry counters

use parking_lot::RwLock;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Samples kept per rolling average
const WINDOW: usize = 120;

/// Pipeline stage being timed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Acquiring both eyes
    Capture,
    /// Fusing the pair
    Render,
    /// Handing the output to sinks
    Present,
}

impl Stage {
    const ALL: [Stage; 3] = [Stage::Capture, Stage::Render, Stage::Present];

    fn slot(self) -> usize {
        match self {
            Stage::Capture => 0,
            Stage::Render => 1,
            Stage::Present => 2,
        }
    }
}

/// Metrics snapshot
#[derive(Debug, Clone, Default)]
pub struct LatencyStats {
    /// Average capture time in milliseconds
    pub capture_ms: f64,
    /// Average render time in milliseconds
    pub render_ms: f64,
    /// Average present time in milliseconds
    pub present_ms: f64,
    /// Average work time per cycle (excluding sleep) in milliseconds
    pub busy_ms: f64,
    /// Achieved cycles per second
    pub fps: f64,
    /// Frames handed to the sinks
    pub frames_presented: u64,
    /// Cycles whose work exceeded the frame period
    pub overruns: u64,
    /// Acquire timeouts that were retried
    pub retries: u64,
}

impl LatencyStats {
    /// One-line summary for periodic logging
    pub fn format_line(&self) -> String {
        format!(
            "capture {:.1}ms | render {:.1}ms | present {:.1}ms | {:.1}fps | overruns {}",
            self.capture_ms, self.render_ms, self.present_ms, self.fps, self.overruns
        )
    }

    /// Multi-line summary for the end of a run
    pub fn format_detailed(&self) -> String {
        format!(
            "Stages: capture={:.2}ms render={:.2}ms present={:.2}ms busy={:.2}ms\n\
             Pacing: fps={:.1} presented={} overruns={} retries={}",
            self.capture_ms,
            self.render_ms,
            self.present_ms,
            self.busy_ms,
            self.fps,
            self.frames_presented,
            self.overruns,
            self.retries
        )
    }
}

#[derive(Debug)]
struct RollingAverage {
    samples: VecDeque<Duration>,
    capacity: usize,
}

impl RollingAverage {
    fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn push(&mut self, sample: Duration) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    fn mean(&self) -> Duration {
        match self.samples.len() {
            0 => Duration::ZERO,
            n => self.samples.iter().sum::<Duration>() / n as u32,
        }
    }

    fn mean_ms(&self) -> f64 {
        self.mean().as_secs_f64() * 1000.0
    }

    fn clear(&mut self) {
        self.samples.clear();
    }
}

/// Thread-safe metrics collector shared between the loop and observers
#[derive(Debug)]
pub struct PerformanceMetrics {
    stages: [RwLock<RollingAverage>; 3],
    busy: RwLock<RollingAverage>,
    intervals: RwLock<RollingAverage>,
    last_cycle_start: RwLock<Option<Instant>>,
    frames_presented: AtomicU64,
    overruns: AtomicU64,
    retries: AtomicU64,
}

impl Default for PerformanceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PerformanceMetrics {
    /// Create an empty collector
    pub fn new() -> Self {
        Self {
            stages: Stage::ALL.map(|_| RwLock::new(RollingAverage::new(WINDOW))),
            busy: RwLock::new(RollingAverage::new(WINDOW)),
            intervals: RwLock::new(RollingAverage::new(WINDOW)),
            last_cycle_start: RwLock::new(None),
            frames_presented: AtomicU64::new(0),
            overruns: AtomicU64::new(0),
            retries: AtomicU64::new(0),
        }
    }

    /// Record how long a stage took
    pub fn record_stage(&self, stage: Stage, duration: Duration) {
        self.stages[stage.slot()].write().push(duration);
    }

    /// Mark the start of a cycle; the gap to the previous start feeds the fps
    pub fn record_cycle_start(&self, now: Instant) {
        let mut last = self.last_cycle_start.write();
        if let Some(prev) = last.replace(now) {
            self.intervals.write().push(now.saturating_duration_since(prev));
        }
    }

    /// Record the work time of a finished cycle against its budget
    ///
    /// Returns whether the cycle overran.
    pub fn record_cycle_work(&self, busy: Duration, budget: Duration) -> bool {
        self.busy.write().push(busy);
        let overran = busy > budget;
        if overran {
            self.overruns.fetch_add(1, Ordering::Relaxed);
        }
        overran
    }

    /// Count a presented frame
    pub fn record_presented(&self) {
        self.frames_presented.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a retried acquire timeout
    pub fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    /// Frames handed to the sinks so far
    pub fn frames_presented(&self) -> u64 {
        self.frames_presented.load(Ordering::Relaxed)
    }

    /// Overrun cycles so far
    pub fn overruns(&self) -> u64 {
        self.overruns.load(Ordering::Relaxed)
    }

    /// Current snapshot
    pub fn snapshot(&self) -> LatencyStats {
        let interval = self.intervals.read().mean();
        let fps = if interval.is_zero() {
            0.0
        } else {
            1.0 / interval.as_secs_f64()
        };

        LatencyStats {
            capture_ms: self.stages[Stage::Capture.slot()].read().mean_ms(),
            render_ms: self.stages[Stage::Render.slot()].read().mean_ms(),
            present_ms: self.stages[Stage::Present.slot()].read().mean_ms(),
            busy_ms: self.busy.read().mean_ms(),
            fps,
            frames_presented: self.frames_presented(),
            overruns: self.overruns(),
            retries: self.retries.load(Ordering::Relaxed),
        }
    }

    /// Reset everything
    pub fn reset(&self) {
        for stage in &self.stages {
            stage.write().clear();
        }
        self.busy.write().clear();
        self.intervals.write().clear();
        *self.last_cycle_start.write() = None;
        self.frames_presented.store(0, Ordering::Relaxed);
        self.overruns.store(0, Ordering::Relaxed);
        self.retries.store(0, Ordering::Relaxed);
    }
}

/// Create a shared metrics instance
pub fn create_metrics() -> Arc<PerformanceMetrics> {
    Arc::new(PerformanceMetrics::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rolling_window_drops_oldest() {
        let mut avg = RollingAverage::new(2);
        avg.push(Duration::from_millis(10));
        avg.push(Duration::from_millis(20));
        avg.push(Duration::from_millis(40));
        assert!((avg.mean_ms() - 30.0).abs() < 0.01);
    }

    #[test]
    fn test_overrun_counting() {
        let metrics = PerformanceMetrics::new();
        let budget = Duration::from_millis(33);
        assert!(!metrics.record_cycle_work(Duration::from_millis(10), budget));
        assert!(metrics.record_cycle_work(Duration::from_millis(50), budget));
        assert_eq!(metrics.overruns(), 1);
    }

    #[test]
    fn test_fps_from_intervals() {
        let metrics = PerformanceMetrics::new();
        let start = Instant::now();
        metrics.record_cycle_start(start);
        metrics.record_cycle_start(start + Duration::from_millis(40));
        metrics.record_cycle_start(start + Duration::from_millis(80));
        let stats = metrics.snapshot();
        assert!((stats.fps - 25.0).abs() < 0.01);
    }

    #[test]
    fn test_reset() {
        let metrics = PerformanceMetrics::new();
        metrics.record_presented();
        metrics.record_stage(Stage::Render, Duration::from_millis(3));
        metrics.reset();
        let stats = metrics.snapshot();
        assert_eq!(stats.frames_presented, 0);
        assert_eq!(stats.render_ms, 0.0);
    }
}
