//! Latest-wins frame pipeline.
//!
//! # Architecture
//!
//! ```text
//!            present(F)                 spawn_blocking
//! frame ──► Slot ─── idle? ──────────► decoder ──► DecodeOutcome ──► complete()
//!            │                                                          │
//!            └── busy: pending = F (older pending dropped)  ◄───────────┘
//!                                                        start pending, if any
//! ```
//!
//! Each camera has at most one decode in flight and one pending frame. A
//! newer frame replaces the pending one, so the view is never more than one
//! frame behind and the console loop never waits on a decode.
//!
//! Every slot carries an epoch drawn from a sink-wide counter. `cancel` and
//! `remove` retire the epoch, so outcomes from a superseded connection are
//! recognized as stale and dropped.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use image::ImageFormat;
use tokio::sync::mpsc;

use crate::error::ConsoleError;
use crate::protocol::CameraId;

/// Decoded RGBA8 image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Row-major RGBA8 pixels.
    pub pixels: Vec<u8>,
}

/// Turns encoded frame bytes into pixels. Runs on the blocking pool.
pub trait FrameDecoder: Send + Sync + std::fmt::Debug {
    /// Decode one frame.
    fn decode(&self, data: &[u8]) -> Result<DecodedFrame, ConsoleError>;
}

/// JPEG decoder backed by the `image` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct JpegDecoder;

impl FrameDecoder for JpegDecoder {
    fn decode(&self, data: &[u8]) -> Result<DecodedFrame, ConsoleError> {
        let image = image::load_from_memory_with_format(data, ImageFormat::Jpeg)
            .map_err(|e| ConsoleError::Decode(format!("JPEG decode failed: {e}")))?
            .to_rgba8();
        Ok(DecodedFrame {
            width: image.width(),
            height: image.height(),
            pixels: image.into_raw(),
        })
    }
}

/// Result of one background decode.
#[derive(Debug)]
pub struct DecodeOutcome {
    /// Camera the frame came from.
    pub camera_id: CameraId,
    /// Slot epoch when the decode started.
    pub epoch: u64,
    /// Per-camera arrival sequence number.
    pub seq: u64,
    /// Decoded pixels or the reason decoding failed.
    pub result: Result<DecodedFrame, ConsoleError>,
}

/// Frame currently shown for a camera.
#[derive(Debug, Clone)]
pub struct PresentedFrame {
    /// Arrival sequence number.
    pub seq: u64,
    /// Pixels.
    pub frame: Arc<DecodedFrame>,
    /// When it was presented.
    pub presented_at: Instant,
}

/// Diagnostic counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FrameStats {
    /// Frames that reached the view.
    pub presented: u64,
    /// Pending frames replaced by a newer one before decoding.
    pub superseded: u64,
    /// Frames that failed to decode.
    pub failed: u64,
    /// Decodes that finished after their slot was cancelled or removed.
    pub stale: u64,
}

#[derive(Debug)]
struct Slot {
    epoch: u64,
    next_seq: u64,
    in_flight: Option<u64>,
    pending: Option<(u64, Bytes)>,
    presented: Option<PresentedFrame>,
}

impl Slot {
    fn new(epoch: u64) -> Self {
        Self {
            epoch,
            next_seq: 0,
            in_flight: None,
            pending: None,
            presented: None,
        }
    }
}

/// Per-camera single-slot mailboxes feeding the blocking decode pool.
#[derive(Debug)]
pub struct FrameSink {
    decoder: Arc<dyn FrameDecoder>,
    slots: HashMap<CameraId, Slot>,
    next_epoch: u64,
    stats: FrameStats,
    done_tx: mpsc::UnboundedSender<DecodeOutcome>,
}

impl FrameSink {
    /// Create a sink and the receiver its decode jobs report to.
    ///
    /// Every received [`DecodeOutcome`] must be passed back to
    /// [`complete`](Self::complete).
    pub fn new(decoder: Arc<dyn FrameDecoder>) -> (Self, mpsc::UnboundedReceiver<DecodeOutcome>) {
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        (
            Self {
                decoder,
                slots: HashMap::new(),
                next_epoch: 0,
                stats: FrameStats::default(),
                done_tx,
            },
            done_rx,
        )
    }

    fn bump_epoch(&mut self) -> u64 {
        self.next_epoch += 1;
        self.next_epoch
    }

    /// Accept an encoded frame. Never blocks.
    pub fn present(&mut self, camera_id: &CameraId, data: Bytes) {
        if !self.slots.contains_key(camera_id) {
            let epoch = self.bump_epoch();
            self.slots.insert(camera_id.clone(), Slot::new(epoch));
        }
        let Some(slot) = self.slots.get_mut(camera_id) else {
            return;
        };

        let seq = slot.next_seq;
        slot.next_seq += 1;

        if slot.in_flight.is_some() {
            if let Some((dropped, _)) = slot.pending.replace((seq, data)) {
                log::trace!("camera {}: frame {} superseded by {}", camera_id, dropped, seq);
                self.stats.superseded += 1;
            }
        } else {
            slot.in_flight = Some(seq);
            spawn_decode(&self.decoder, &self.done_tx, camera_id, slot.epoch, seq, data);
        }
    }

    /// Apply a finished decode. Returns whether a frame was presented.
    pub fn complete(&mut self, outcome: DecodeOutcome) -> bool {
        let Some(slot) = self.slots.get_mut(&outcome.camera_id) else {
            self.stats.stale += 1;
            return false;
        };
        if outcome.epoch != slot.epoch || slot.in_flight != Some(outcome.seq) {
            log::trace!(
                "camera {}: dropping stale decode of frame {}",
                outcome.camera_id,
                outcome.seq
            );
            self.stats.stale += 1;
            return false;
        }
        slot.in_flight = None;

        let presented = match outcome.result {
            Ok(frame) => {
                slot.presented = Some(PresentedFrame {
                    seq: outcome.seq,
                    frame: Arc::new(frame),
                    presented_at: Instant::now(),
                });
                self.stats.presented += 1;
                true
            }
            Err(e) => {
                // Keep the previous frame on screen.
                log::debug!("camera {}: frame {} dropped: {}", outcome.camera_id, outcome.seq, e);
                self.stats.failed += 1;
                false
            }
        };

        if let Some((seq, data)) = slot.pending.take() {
            slot.in_flight = Some(seq);
            spawn_decode(
                &self.decoder,
                &self.done_tx,
                &outcome.camera_id,
                slot.epoch,
                seq,
                data,
            );
        }

        presented
    }

    /// Drop pending work for a camera and ignore in-flight decodes.
    ///
    /// The presented frame is kept.
    pub fn cancel(&mut self, camera_id: &CameraId) {
        let epoch = self.bump_epoch();
        if let Some(slot) = self.slots.get_mut(camera_id) {
            slot.epoch = epoch;
            slot.in_flight = None;
            if slot.pending.take().is_some() {
                self.stats.superseded += 1;
            }
        }
    }

    /// Forget a camera entirely. Returns `false` if it was unknown.
    pub fn remove(&mut self, camera_id: &CameraId) -> bool {
        self.slots.remove(camera_id).is_some()
    }

    /// Frame currently shown for a camera.
    pub fn presented(&self, camera_id: &CameraId) -> Option<&PresentedFrame> {
        self.slots.get(camera_id)?.presented.as_ref()
    }

    /// Whether a decode is running for a camera.
    pub fn is_decoding(&self, camera_id: &CameraId) -> bool {
        self.slots
            .get(camera_id)
            .is_some_and(|slot| slot.in_flight.is_some())
    }

    /// Diagnostic counters.
    pub fn stats(&self) -> FrameStats {
        self.stats
    }
}

fn spawn_decode(
    decoder: &Arc<dyn FrameDecoder>,
    done_tx: &mpsc::UnboundedSender<DecodeOutcome>,
    camera_id: &CameraId,
    epoch: u64,
    seq: u64,
    data: Bytes,
) {
    let decoder = Arc::clone(decoder);
    let done_tx = done_tx.clone();
    let camera_id = camera_id.clone();
    tokio::task::spawn_blocking(move || {
        let result = decoder.decode(&data);
        let _ = done_tx.send(DecodeOutcome {
            camera_id,
            epoch,
            seq,
            result,
        });
    });
}
