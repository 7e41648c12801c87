//! Fixed-rate capture loop.
//!
//! One loop runs on a dedicated thread per running session. Every tick it
//! applies pending input, steps the core by one frame, and publishes the
//! resulting frame and audio to the broadcast layer. The loop never waits on
//! viewers.

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use parking_lot::RwLock;
use tracing::{debug, error, info, warn};

use retrocast_core::{AudioChunk, CaptureTimestamp, EmulatorCore, Frame};
use retrocast_ipc::{JoypadButton, SessionId, StopReason, StreamMode};
use retrocast_transport::Broadcaster;

use crate::metrics::MetricsCollector;
use crate::STATS_LOG_INTERVAL_SECS;

/// Everything a capture loop owns while it runs.
pub(crate) struct CaptureLoop {
    pub session_id: SessionId,
    pub core: Box<dyn EmulatorCore>,
    pub input_rx: Receiver<(JoypadButton, bool)>,
    pub broadcaster: Arc<Broadcaster>,
    pub stream_mode: Arc<RwLock<StreamMode>>,
    pub metrics: Arc<MetricsCollector>,
    pub tick_interval: Duration,
    pub max_consecutive_failures: u32,
}

/// How a capture loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum LoopExit {
    /// The stop flag was raised.
    Cancelled,

    /// Too many ticks failed in a row.
    Failed(StopReason),
}

impl CaptureLoop {
    /// Run until `should_stop` is raised or ticks keep failing.
    ///
    /// The core is dropped before this returns.
    pub(crate) fn run(mut self, should_stop: &AtomicBool) -> LoopExit {
        debug!(session_id = %self.session_id, core = self.core.name(), "Capture loop starting");

        let start_time = Instant::now();
        let stats_interval = Duration::from_secs(STATS_LOG_INTERVAL_SECS);
        let mut last_log_time = Instant::now();
        let mut sequence: u64 = 0;
        let mut consecutive_failures: u32 = 0;
        let mut exit = LoopExit::Cancelled;

        while !should_stop.load(Ordering::SeqCst) {
            let tick_start = Instant::now();

            if last_log_time.elapsed() >= stats_interval {
                let rate = self.metrics.mark_reported();
                let snapshot = self.metrics.snapshot();
                info!(
                    session_id = %self.session_id,
                    "Capture stats: ticks={}, failures={}, frames={}, audio={}, dropped={}, rate={:.1}/s",
                    snapshot.ticks,
                    snapshot.tick_failures,
                    snapshot.frames_published,
                    snapshot.audio_chunks_published,
                    snapshot.mailbox_drops,
                    rate
                );
                last_log_time = Instant::now();
            }

            match self.guarded_tick(start_time, sequence) {
                Ok(()) => {
                    consecutive_failures = 0;
                    self.metrics.record_tick();
                }
                Err(message) => {
                    consecutive_failures += 1;
                    self.metrics.record_tick_failure();
                    warn!(
                        session_id = %self.session_id,
                        consecutive = consecutive_failures,
                        "Tick failed: {}",
                        message
                    );

                    if consecutive_failures >= self.max_consecutive_failures {
                        error!(
                            session_id = %self.session_id,
                            "Giving up after {} consecutive tick failures",
                            consecutive_failures
                        );
                        exit = LoopExit::Failed(StopReason::TickFailures {
                            count: consecutive_failures,
                            message,
                        });
                        break;
                    }
                }
            }
            sequence += 1;

            // Overruns are not caught up.
            let elapsed = tick_start.elapsed();
            if elapsed < self.tick_interval {
                thread::sleep(self.tick_interval - elapsed);
            }
        }

        info!(
            session_id = %self.session_id,
            "Capture loop stopped: ticks={}, uptime={:.1}s",
            self.metrics.ticks(),
            start_time.elapsed().as_secs_f32()
        );

        let CaptureLoop { core, .. } = self;
        drop(core);
        exit
    }

    /// Run one tick, turning core panics into failures.
    fn guarded_tick(&mut self, start_time: Instant, sequence: u64) -> Result<(), String> {
        match panic::catch_unwind(AssertUnwindSafe(|| self.tick(start_time, sequence))) {
            Ok(result) => result,
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                Err(format!("core panicked: {message}"))
            }
        }
    }

    fn tick(&mut self, start_time: Instant, sequence: u64) -> Result<(), String> {
        while let Ok((button, pressed)) = self.input_rx.try_recv() {
            self.core.set_input(button, pressed);
            self.metrics.record_input_applied();
        }

        self.core.run_frame().map_err(|e| e.to_string())?;

        let frame = Frame::from_core(&*self.core, start_time, sequence)
            .map_err(|e| e.to_string())?;

        let samples = self.core.audio_buffer();
        self.core.clear_audio_buffer();

        let mode = *self.stream_mode.read();

        if let Some(frame) = frame {
            if sequence < 3 || sequence % 600 == 0 {
                debug!(
                    session_id = %self.session_id,
                    "Frame #{}: {}x{}",
                    sequence,
                    frame.width,
                    frame.height
                );
            }
            let stats = self.broadcaster.publish_frame(&self.session_id, mode, frame);
            self.metrics.record_frame_published();
            self.metrics.record_mailbox_drops(stats.dropped);
        }

        if let Some(samples) = samples.filter(|s| !s.is_empty()) {
            let chunk = AudioChunk::stereo(
                samples,
                self.core.sample_rate(),
                CaptureTimestamp::now(start_time),
            );
            let stats = self.broadcaster.publish_audio(&self.session_id, mode, chunk);
            self.metrics.record_audio_published();
            self.metrics.record_mailbox_drops(stats.dropped);
        }

        Ok(())
    }
}

/// Handle to a capture loop thread.
pub(crate) struct CaptureHandle {
    should_stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl CaptureHandle {
    /// Spawn the loop on its own thread.
    ///
    /// `on_failure` runs on the capture thread after the core is released
    /// when the loop gives up on its own.
    pub(crate) fn spawn<F>(capture: CaptureLoop, on_failure: F) -> io::Result<Self>
    where
        F: FnOnce(StopReason) + Send + 'static,
    {
        let should_stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&should_stop);
        let name = format!("capture-{}", short_id(&capture.session_id));

        let thread = thread::Builder::new().name(name).spawn(move || {
            if let LoopExit::Failed(reason) = capture.run(&flag) {
                on_failure(reason);
            }
        })?;

        Ok(Self {
            should_stop,
            thread: Some(thread),
        })
    }

    /// Signal the loop and wait until its thread, and with it the core, is gone.
    pub(crate) async fn stop(mut self) {
        self.should_stop.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            match tokio::task::spawn_blocking(move || thread.join()).await {
                Ok(Ok(())) => {}
                Ok(Err(_)) => error!("Capture thread panicked"),
                Err(e) => error!("Failed to join capture thread: {}", e),
            }
        }
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        // Not joined here; the thread exits at its next tick boundary.
        self.should_stop.store(true, Ordering::SeqCst);
    }
}

fn short_id(id: &SessionId) -> &str {
    let s = id.as_str();
    s.get(..8).unwrap_or(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    use bytes::Bytes;
    use parking_lot::Mutex;
    use retrocast_core::{CoreError, CoreResult};
    use retrocast_ipc::input_channel;
    use retrocast_transport::SinkKind;

    #[derive(Default)]
    struct Script {
        inputs: Mutex<Vec<(JoypadButton, bool)>>,
        frames: Mutex<u64>,
        dropped: AtomicBool,
    }

    struct ScriptedCore {
        script: Arc<Script>,
        fail_after: Option<u64>,
        audio: bool,
    }

    impl EmulatorCore for ScriptedCore {
        fn load_core(&mut self, _: &Path) -> CoreResult<()> {
            Ok(())
        }

        fn load_game(&mut self, _: &Path) -> CoreResult<()> {
            Ok(())
        }

        fn run_frame(&mut self) -> CoreResult<()> {
            let mut frames = self.script.frames.lock();
            if self.fail_after.is_some_and(|n| *frames >= n) {
                return Err(CoreError::NotLoaded);
            }
            *frames += 1;
            Ok(())
        }

        fn frame_buffer(&self) -> Option<Bytes> {
            Some(Bytes::from(vec![255u8; 2 * 2 * 4]))
        }

        fn frame_width(&self) -> u32 {
            2
        }

        fn frame_height(&self) -> u32 {
            2
        }

        fn audio_buffer(&self) -> Option<Vec<i16>> {
            self.audio.then(|| vec![1, -1, 2, -2])
        }

        fn clear_audio_buffer(&mut self) {}

        fn set_input(&mut self, button: JoypadButton, pressed: bool) {
            self.script.inputs.lock().push((button, pressed));
        }

        fn name(&self) -> &'static str {
            "scripted"
        }
    }

    impl Drop for ScriptedCore {
        fn drop(&mut self) {
            self.script.dropped.store(true, Ordering::SeqCst);
        }
    }

    fn capture_loop(
        core: ScriptedCore,
        broadcaster: Arc<Broadcaster>,
        input_rx: Receiver<(JoypadButton, bool)>,
    ) -> CaptureLoop {
        CaptureLoop {
            session_id: SessionId::from("capture-test"),
            core: Box::new(core),
            input_rx,
            broadcaster,
            stream_mode: Arc::new(RwLock::new(StreamMode::Both)),
            metrics: Arc::new(MetricsCollector::default()),
            tick_interval: Duration::from_millis(1),
            max_consecutive_failures: 3,
        }
    }

    #[test]
    fn test_failing_ticks_end_the_loop() {
        let script = Arc::new(Script::default());
        let core = ScriptedCore {
            script: Arc::clone(&script),
            fail_after: Some(2),
            audio: false,
        };
        let (_tx, rx) = input_channel();
        let capture = capture_loop(core, Arc::new(Broadcaster::new()), rx);
        let metrics = Arc::clone(&capture.metrics);

        let exit = capture.run(&AtomicBool::new(false));

        match exit {
            LoopExit::Failed(StopReason::TickFailures { count, .. }) => assert_eq!(count, 3),
            other => panic!("unexpected exit: {other:?}"),
        }
        assert!(script.dropped.load(Ordering::SeqCst));
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.ticks, 2);
        assert_eq!(snapshot.tick_failures, 3);
    }

    #[test]
    fn test_input_applied_before_frame_and_media_published() {
        let script = Arc::new(Script::default());
        let core = ScriptedCore {
            script: Arc::clone(&script),
            fail_after: None,
            audio: true,
        };
        let broadcaster = Arc::new(Broadcaster::new());
        let session_id = SessionId::from("capture-test");
        let sink = broadcaster.register_sink(&session_id, SinkKind::PubSub);

        let (tx, rx) = input_channel();
        tx.send((JoypadButton::A, true)).unwrap();
        let capture = capture_loop(core, Arc::clone(&broadcaster), rx);

        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let thread = thread::spawn(move || capture.run(&flag));

        let deadline = Instant::now() + Duration::from_secs(2);
        while *script.frames.lock() < 5 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(2));
        }
        stop.store(true, Ordering::SeqCst);
        assert_eq!(thread.join().unwrap(), LoopExit::Cancelled);

        assert_eq!(script.inputs.lock().as_slice(), &[(JoypadButton::A, true)]);
        let frame = sink.take_frame().unwrap();
        assert_eq!((frame.width, frame.height), (2, 2));
        let audio = sink.take_audio().unwrap();
        assert_eq!(audio.samples, vec![1, -1, 2, -2]);
        assert!(script.dropped.load(Ordering::SeqCst));
    }

    #[test]
    fn test_panicking_core_counts_as_failure() {
        struct PanickyCore;

        impl EmulatorCore for PanickyCore {
            fn load_core(&mut self, _: &Path) -> CoreResult<()> {
                Ok(())
            }
            fn load_game(&mut self, _: &Path) -> CoreResult<()> {
                Ok(())
            }
            fn run_frame(&mut self) -> CoreResult<()> {
                panic!("bad opcode")
            }
            fn frame_buffer(&self) -> Option<Bytes> {
                None
            }
            fn frame_width(&self) -> u32 {
                0
            }
            fn frame_height(&self) -> u32 {
                0
            }
            fn audio_buffer(&self) -> Option<Vec<i16>> {
                None
            }
            fn clear_audio_buffer(&mut self) {}
            fn set_input(&mut self, _: JoypadButton, _: bool) {}
            fn name(&self) -> &'static str {
                "panicky"
            }
        }

        let (_tx, rx) = input_channel();
        let capture = CaptureLoop {
            session_id: SessionId::from("panicky"),
            core: Box::new(PanickyCore),
            input_rx: rx,
            broadcaster: Arc::new(Broadcaster::new()),
            stream_mode: Arc::new(RwLock::new(StreamMode::PubSub)),
            metrics: Arc::new(MetricsCollector::default()),
            tick_interval: Duration::from_millis(1),
            max_consecutive_failures: 3,
        };

        match capture.run(&AtomicBool::new(false)) {
            LoopExit::Failed(StopReason::TickFailures { message, .. }) => {
                assert!(message.contains("bad opcode"))
            }
            other => panic!("unexpected exit: {other:?}"),
        }
    }
}
