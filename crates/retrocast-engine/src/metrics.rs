//! Per-session metrics collection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::RwLock;

use retrocast_ipc::{SessionMetrics, TARGET_TICK_RATE};

/// Collects counters for one session.
///
/// Counters are updated from the capture thread and read by snapshot
/// requests on the runtime, so everything is atomic or behind a short lock.
pub struct MetricsCollector {
    start_time: RwLock<Option<Instant>>,
    ticks: AtomicU64,
    tick_failures: AtomicU64,
    frames_published: AtomicU64,
    audio_chunks_published: AtomicU64,
    mailbox_drops: AtomicU64,
    inputs_applied: AtomicU64,
    last_report_time: RwLock<Instant>,
    last_tick_count: AtomicU64,
    tick_rate: RwLock<f32>,
    target_tick_rate: f32,
}

impl MetricsCollector {
    /// Create a new metrics collector.
    pub fn new(target_tick_rate: f32) -> Self {
        Self {
            start_time: RwLock::new(None),
            ticks: AtomicU64::new(0),
            tick_failures: AtomicU64::new(0),
            frames_published: AtomicU64::new(0),
            audio_chunks_published: AtomicU64::new(0),
            mailbox_drops: AtomicU64::new(0),
            inputs_applied: AtomicU64::new(0),
            last_report_time: RwLock::new(Instant::now()),
            last_tick_count: AtomicU64::new(0),
            tick_rate: RwLock::new(0.0),
            target_tick_rate,
        }
    }

    /// Start collection. Counters keep accumulating across restarts.
    pub fn start(&self) {
        *self.start_time.write() = Some(Instant::now());
        *self.last_report_time.write() = Instant::now();
        self.last_tick_count
            .store(self.ticks.load(Ordering::Relaxed), Ordering::Relaxed);
    }

    /// Stop collection.
    pub fn stop(&self) {
        *self.start_time.write() = None;
        *self.tick_rate.write() = 0.0;
    }

    /// Record a completed tick.
    pub fn record_tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed tick.
    pub fn record_tick_failure(&self) {
        self.tick_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a frame handed to the broadcast layer.
    pub fn record_frame_published(&self) {
        self.frames_published.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an audio chunk handed to the broadcast layer.
    pub fn record_audio_published(&self) {
        self.audio_chunks_published.fetch_add(1, Ordering::Relaxed);
    }

    /// Record mailbox overwrites.
    pub fn record_mailbox_drops(&self, count: usize) {
        if count > 0 {
            self.mailbox_drops.fetch_add(count as u64, Ordering::Relaxed);
        }
    }

    /// Record an input event applied to the core.
    pub fn record_input_applied(&self) {
        self.inputs_applied.fetch_add(1, Ordering::Relaxed);
    }

    /// Ticks completed so far.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Measure the tick rate since the previous report and start a new window.
    pub fn mark_reported(&self) -> f32 {
        let now = Instant::now();
        let elapsed = now.duration_since(*self.last_report_time.read());
        let ticks = self.ticks.load(Ordering::Relaxed);
        let last = self.last_tick_count.swap(ticks, Ordering::Relaxed);

        let rate = if elapsed.as_secs_f32() > 0.0 {
            ticks.saturating_sub(last) as f32 / elapsed.as_secs_f32()
        } else {
            0.0
        };

        *self.tick_rate.write() = rate;
        *self.last_report_time.write() = now;
        rate
    }

    /// Get current metrics snapshot.
    pub fn snapshot(&self) -> SessionMetrics {
        let now = Instant::now();
        let started = *self.start_time.read();

        // Before the first report window closes, use the running average.
        let mut tick_rate = *self.tick_rate.read();
        if tick_rate == 0.0 {
            if let Some(start) = started {
                let elapsed = now.duration_since(start).as_secs_f32();
                let ticks = self
                    .ticks
                    .load(Ordering::Relaxed)
                    .saturating_sub(self.last_tick_count.load(Ordering::Relaxed));
                if elapsed > 0.0 {
                    tick_rate = ticks as f32 / elapsed;
                }
            }
        }

        SessionMetrics {
            ticks: self.ticks.load(Ordering::Relaxed),
            tick_failures: self.tick_failures.load(Ordering::Relaxed),
            frames_published: self.frames_published.load(Ordering::Relaxed),
            audio_chunks_published: self.audio_chunks_published.load(Ordering::Relaxed),
            mailbox_drops: self.mailbox_drops.load(Ordering::Relaxed),
            inputs_applied: self.inputs_applied.load(Ordering::Relaxed),
            tick_rate,
            target_tick_rate: self.target_tick_rate,
            uptime_seconds: started
                .map(|s| now.duration_since(s).as_secs())
                .unwrap_or(0),
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new(TARGET_TICK_RATE as f32)
    }
}
