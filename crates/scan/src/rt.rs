use std::sync::{Arc, Mutex, RwLock};

use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::image_ops::decode_and_resize;
use crate::ports::{DetBox, Detector};

/// One frame from the streaming client.
#[derive(Debug, Clone)]
pub struct FrameMsg {
    pub seq: u64,
    /// Encoded image bytes (JPEG/WebP/PNG).
    pub data: Vec<u8>,
}

/// Latest detection outcome, replaced wholesale per processed frame.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectSnapshot {
    pub seq: u64,
    pub boxes: Vec<DetBox>,
    /// Set instead of `boxes` when decode or detection failed; the stream
    /// keeps running.
    pub error: Option<String>,
}

/// Backpressured single-frame worker for a streaming detect feed.
///
/// The queue holds exactly one frame: pushing over a full slot drops the
/// stale frame first, so the worker always sees the freshest input and a
/// slow detector shows up as skipped frames, not growing latency. On top of
/// that, only every N-th received frame is processed (throttle).
///
/// Consumers read [`RtWorker::last_result`]; the snapshot is swapped as a
/// whole struct, so a reader sees either the previous or the new result,
/// never a mix.
pub struct RtWorker {
    slot: Arc<Mutex<Option<FrameMsg>>>,
    notify: Arc<Notify>,
    last: Arc<RwLock<Option<DetectSnapshot>>>,
    handle: JoinHandle<()>,
}

impl RtWorker {
    /// Spawn the worker loop. `process_every` throttles to every N-th frame
    /// (minimum 1).
    pub fn start(detector: Arc<dyn Detector>, process_every: u64) -> Self {
        let slot: Arc<Mutex<Option<FrameMsg>>> = Arc::new(Mutex::new(None));
        let notify = Arc::new(Notify::new());
        let last: Arc<RwLock<Option<DetectSnapshot>>> = Arc::new(RwLock::new(None));

        let handle = tokio::spawn(Self::run_loop(
            detector,
            process_every.max(1),
            Arc::clone(&slot),
            Arc::clone(&notify),
            Arc::clone(&last),
        ));

        Self {
            slot,
            notify,
            last,
            handle,
        }
    }

    /// Enqueue a frame, dropping any stale one still waiting.
    pub fn push(&self, frame: FrameMsg) {
        {
            let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
            *slot = Some(frame);
        }
        self.notify.notify_one();
    }

    /// Latest detection snapshot, if any frame has been processed yet.
    pub fn last_result(&self) -> Option<DetectSnapshot> {
        self.last
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Cancel the worker. Safe at any await point; the in-flight decode
    /// buffer is dropped with the task.
    pub async fn stop(self) {
        self.handle.abort();
        let _ = self.handle.await;
    }

    async fn run_loop(
        detector: Arc<dyn Detector>,
        process_every: u64,
        slot: Arc<Mutex<Option<FrameMsg>>>,
        notify: Arc<Notify>,
        last: Arc<RwLock<Option<DetectSnapshot>>>,
    ) {
        let mut seen: u64 = 0;
        loop {
            notify.notified().await;
            // Drain whatever is in the slot; more may arrive while we work.
            loop {
                let frame = {
                    let mut slot = slot.lock().unwrap_or_else(|e| e.into_inner());
                    slot.take()
                };
                let Some(frame) = frame else { break };

                seen += 1;
                if seen % process_every != 0 {
                    continue;
                }

                let snapshot = Self::process(&detector, &frame).await;
                *last.write().unwrap_or_else(|e| e.into_inner()) = Some(snapshot);
            }
        }
    }

    async fn process(detector: &Arc<dyn Detector>, frame: &FrameMsg) -> DetectSnapshot {
        let data = frame.data.clone();
        let decoded = tokio::task::spawn_blocking(move || decode_and_resize(&data)).await;
        let img = match decoded {
            Ok(Ok(img)) => img,
            Ok(Err(e)) => {
                return DetectSnapshot {
                    seq: frame.seq,
                    boxes: Vec::new(),
                    error: Some(format!("decode failed: {e}")),
                }
            }
            Err(e) => {
                return DetectSnapshot {
                    seq: frame.seq,
                    boxes: Vec::new(),
                    error: Some(format!("decode task failed: {e}")),
                }
            }
        };

        match detector.detect(&img).await {
            Ok(boxes) => DetectSnapshot {
                seq: frame.seq,
                boxes,
                error: None,
            },
            Err(e) => {
                warn!(seq = frame.seq, error = %e, "detect failed");
                DetectSnapshot {
                    seq: frame.seq,
                    boxes: Vec::new(),
                    error: Some(format!("detect failed: {e}")),
                }
            }
        }
    }
}
