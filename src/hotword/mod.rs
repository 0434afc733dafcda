//! Background hotword watchers (wake word, stop word).
//!
//! A watcher owns its own input stream at the detector's native sample
//! rate and frame length, resizes incoming blocks to the exact frame
//! length, and reports detections over a channel. Detector failures are
//! reported the same way and never cross into the orchestrator loop as
//! errors; the orchestrator counts them toward the ASR-fallback circuit
//! breaker.

#[cfg(feature = "porcupine")]
pub mod porcupine;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::Result;
use crossbeam_channel::{bounded, Receiver, Sender};
use tracing::{debug, info, warn};

use crate::audio::barge::FrameQueue;
use crate::audio::capture::{resolve_input_device, start_block_stream};

/// Keyword spotting engine contract.
///
/// `process` consumes exactly `frame_length()` samples at `sample_rate()`
/// and returns the index of the detected keyword, or a negative value for
/// no detection.
pub trait HotwordDetector: Send {
    fn sample_rate(&self) -> u32;
    fn frame_length(&self) -> usize;
    fn process(&mut self, frame: &[i16]) -> Result<i32>;
}

/// Messages a watcher emits.
#[derive(Debug, Clone)]
pub enum WatcherMsg {
    Detected { keyword_index: i32 },
    Failed(String),
}

/// Frames the watcher queue holds before dropping the oldest.
const WATCHER_QUEUE_CAPACITY: usize = 8;

/// Running watcher. Dropping it (or calling [`stop`](Self::stop)) signals
/// the thread and joins it.
pub struct WatcherHandle {
    events: Receiver<WatcherMsg>,
    stop_flag: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl WatcherHandle {
    pub fn events(&self) -> &Receiver<WatcherMsg> {
        &self.events
    }

    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop_flag.store(true, Ordering::Release);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }

    /// Event-only handle with no backing thread (used by tests and
    /// in-process event sources).
    pub fn from_events(events: Receiver<WatcherMsg>) -> Self {
        Self {
            events,
            stop_flag: Arc::new(AtomicBool::new(false)),
            thread: None,
        }
    }
}

impl Drop for WatcherHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Factory the orchestrator calls whenever it needs a (re)started watcher.
pub type WatcherFactory = Box<dyn FnMut() -> WatcherHandle + Send>;

/// Pad with zeros or truncate to the detector's exact frame length.
pub fn resize_frame(frame: &[i16], frame_length: usize) -> Vec<i16> {
    let mut out = frame.to_vec();
    out.resize(frame_length, 0);
    out
}

/// Detection loop shared by all watchers: drain the queue, resize, feed
/// the detector, emit events. Returns when stopped, failed, or (for
/// non-continuous watchers) after the first detection.
fn detector_loop(
    mut detector: Box<dyn HotwordDetector>,
    queue: &FrameQueue,
    stop: &AtomicBool,
    events: &Sender<WatcherMsg>,
    continuous: bool,
    label: &str,
) {
    let frame_length = detector.frame_length();
    while !stop.load(Ordering::Acquire) {
        let Some(block) = queue.pop() else {
            std::thread::sleep(Duration::from_millis(10));
            continue;
        };
        let frame = if block.len() == frame_length {
            block
        } else {
            resize_frame(&block, frame_length)
        };
        match detector.process(&frame) {
            Ok(idx) if idx >= 0 => {
                info!(label, keyword_index = idx, "Hotword detected");
                let _ = events.send(WatcherMsg::Detected { keyword_index: idx });
                if !continuous {
                    return;
                }
            }
            Ok(_) => {}
            Err(e) => {
                warn!(label, "Hotword detector error: {e}");
                let _ = events.send(WatcherMsg::Failed(e.to_string()));
                return;
            }
        }
    }
}

/// Spawn a watcher with its own input stream.
///
/// `make_detector` runs on the watcher thread; construction or stream
/// errors surface as [`WatcherMsg::Failed`], never as panics or `Err`.
pub fn spawn_watcher(
    make_detector: impl FnOnce() -> Result<Box<dyn HotwordDetector>> + Send + 'static,
    device_hint: String,
    prefer_echo_cancel: bool,
    label: String,
    continuous: bool,
) -> WatcherHandle {
    let (tx, rx) = bounded::<WatcherMsg>(16);
    let stop_flag = Arc::new(AtomicBool::new(false));
    let thread_stop = Arc::clone(&stop_flag);

    let thread = std::thread::Builder::new()
        .name(format!("hotword-{label}"))
        .spawn(move || {
            let detector = match make_detector() {
                Ok(d) => d,
                Err(e) => {
                    warn!(label = %label, "Hotword detector init failed: {e}");
                    let _ = tx.send(WatcherMsg::Failed(e.to_string()));
                    return;
                }
            };
            let sample_rate = detector.sample_rate();
            let frame_length = detector.frame_length();
            debug!(label = %label, sample_rate, frame_length, "Hotword watcher starting");

            let queue = FrameQueue::new(WATCHER_QUEUE_CAPACITY);
            let producer_queue = queue.clone();
            let stream = match resolve_input_device(&device_hint, prefer_echo_cancel)
                .and_then(|device| {
                    start_block_stream(&device, sample_rate, frame_length, move |chunk| {
                        producer_queue.push(chunk)
                    })
                }) {
                Ok(s) => s,
                Err(e) => {
                    warn!(label = %label, "Hotword input stream failed: {e}");
                    let _ = tx.send(WatcherMsg::Failed(e.to_string()));
                    return;
                }
            };

            detector_loop(detector, &queue, &thread_stop, &tx, continuous, &label);
            drop(stream);
        })
        .expect("spawning hotword watcher thread");

    WatcherHandle {
        events: rx,
        stop_flag,
        thread: Some(thread),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ScriptedDetector {
        /// Result per processed frame; after the script ends, no detection.
        script: Vec<Result<i32>>,
    }

    impl ScriptedDetector {
        fn new(script: Vec<Result<i32>>) -> Self {
            Self { script }
        }
    }

    impl HotwordDetector for ScriptedDetector {
        fn sample_rate(&self) -> u32 {
            16_000
        }

        fn frame_length(&self) -> usize {
            512
        }

        fn process(&mut self, frame: &[i16]) -> Result<i32> {
            assert_eq!(frame.len(), self.frame_length());
            if self.script.is_empty() {
                Ok(-1)
            } else {
                self.script.remove(0)
            }
        }
    }

    #[test]
    fn resize_pads_and_truncates() {
        assert_eq!(resize_frame(&[1, 2, 3], 5), vec![1, 2, 3, 0, 0]);
        assert_eq!(resize_frame(&[1, 2, 3, 4, 5], 3), vec![1, 2, 3]);
        assert_eq!(resize_frame(&[7; 4], 4), vec![7; 4]);
    }

    #[test]
    fn loop_emits_detection_and_exits_when_not_continuous() {
        let detector = Box::new(ScriptedDetector::new(vec![Ok(-1), Ok(0)]));
        let queue = FrameQueue::new(8);
        queue.push(vec![0i16; 512]);
        queue.push(vec![0i16; 512]);
        let stop = AtomicBool::new(false);
        let (tx, rx) = bounded(4);

        detector_loop(detector, &queue, &stop, &tx, false, "test");

        match rx.try_recv().unwrap() {
            WatcherMsg::Detected { keyword_index } => assert_eq!(keyword_index, 0),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn loop_resizes_mismatched_frames() {
        let detector = Box::new(ScriptedDetector::new(vec![Ok(0)]));
        let queue = FrameQueue::new(8);
        queue.push(vec![0i16; 300]);
        let stop = AtomicBool::new(false);
        let (tx, rx) = bounded(4);

        detector_loop(detector, &queue, &stop, &tx, false, "test");
        assert!(matches!(rx.try_recv().unwrap(), WatcherMsg::Detected { .. }));
    }

    #[test]
    fn loop_reports_failure_and_stops() {
        let detector = Box::new(ScriptedDetector::new(vec![Err(anyhow::anyhow!("boom"))]));
        let queue = FrameQueue::new(8);
        queue.push(vec![0i16; 512]);
        let stop = AtomicBool::new(false);
        let (tx, rx) = bounded(4);

        detector_loop(detector, &queue, &stop, &tx, true, "test");
        match rx.try_recv().unwrap() {
            WatcherMsg::Failed(msg) => assert!(msg.contains("boom")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn continuous_loop_keeps_emitting() {
        let detector = Box::new(ScriptedDetector::new(vec![Ok(0), Ok(-1), Ok(1)]));
        let queue = FrameQueue::new(8);
        for _ in 0..3 {
            queue.push(vec![0i16; 512]);
        }
        let stop = Arc::new(AtomicBool::new(false));
        let (tx, rx) = bounded(8);

        // Stop the loop once the queue drains.
        let stopper = Arc::clone(&stop);
        let waiter = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(100));
            stopper.store(true, Ordering::Release);
        });
        detector_loop(detector, &queue, &stop, &tx, true, "test");
        waiter.join().unwrap();

        let msgs: Vec<WatcherMsg> = rx.try_iter().collect();
        let detections = msgs
            .iter()
            .filter(|m| matches!(m, WatcherMsg::Detected { .. }))
            .count();
        assert_eq!(detections, 2);
    }
}
