// FramePool - lock-free band frame pool with dual SPSC queues
//
// Band vectors leave the capture callback through two rtrb ring buffers so
// the callback never allocates:
// - DATA_QUEUE: capture thread pushes filled frames, consumer pops them
// - POOL_QUEUE: consumer returns drained frames, capture thread recycles them
//
// When the pool is empty (consumer is behind) the capture side drops the frame
// and bumps a counter instead of waiting. Slow consumers miss frames; nothing
// is ever queued beyond the pool size.

use rtrb::{Consumer, Producer};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// One visualizer output: band levels in [0, 1] plus wall-clock time
#[derive(Debug, Clone, PartialEq)]
pub struct BandFrame {
    pub bands: Vec<f64>,
    /// Seconds since the Unix epoch when the frame was computed
    pub timestamp_secs: f64,
}

impl BandFrame {
    fn with_bands(band_count: usize) -> Self {
        Self {
            bands: vec![0.0; band_count],
            timestamp_secs: 0.0,
        }
    }
}

/// Capture-side half of the pool
pub struct BandFrameSender {
    data_producer: Producer<BandFrame>,
    pool_consumer: Consumer<BandFrame>,
    dropped: Arc<AtomicU64>,
}

/// Consumer-side half of the pool
pub struct BandFrameReceiver {
    data_consumer: Consumer<BandFrame>,
    pool_producer: Producer<BandFrame>,
    dropped: Arc<AtomicU64>,
}

/// Pre-allocates `frame_count` band frames and splits the pool into its two halves
///
/// # Arguments
/// * `frame_count` - Number of frames in circulation (at least 1)
/// * `band_count` - Length of every frame's band vector
pub fn frame_pool(frame_count: usize, band_count: usize) -> (BandFrameSender, BandFrameReceiver) {
    let frame_count = frame_count.max(1);
    let (mut pool_producer, pool_consumer) = rtrb::RingBuffer::new(frame_count);
    let (data_producer, data_consumer) = rtrb::RingBuffer::new(frame_count);

    for _ in 0..frame_count {
        if pool_producer.push(BandFrame::with_bands(band_count)).is_err() {
            break;
        }
    }

    let dropped = Arc::new(AtomicU64::new(0));
    (
        BandFrameSender {
            data_producer,
            pool_consumer,
            dropped: Arc::clone(&dropped),
        },
        BandFrameReceiver {
            data_consumer,
            pool_producer,
            dropped,
        },
    )
}

impl BandFrameSender {
    /// Publish a frame without blocking
    ///
    /// Returns false when the frame was dropped because no recycled frame
    /// was available.
    pub fn publish(&mut self, bands: &[f64], timestamp_secs: f64) -> bool {
        let mut frame = match self.pool_consumer.pop() {
            Ok(frame) => frame,
            Err(_) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                return false;
            }
        };

        let n = bands.len().min(frame.bands.len());
        frame.bands[..n].copy_from_slice(&bands[..n]);
        frame.timestamp_secs = timestamp_secs;

        if self.data_producer.push(frame).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        true
    }

    pub fn dropped_frames(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl BandFrameReceiver {
    /// Take the oldest pending frame, if any
    ///
    /// Hand the frame back with [`recycle`](Self::recycle) once done with it,
    /// otherwise the pool shrinks.
    pub fn try_recv(&mut self) -> Option<BandFrame> {
        self.data_consumer.pop().ok()
    }

    pub fn recycle(&mut self, frame: BandFrame) {
        let _ = self.pool_producer.push(frame);
    }

    /// Visit every pending frame and return each to the pool
    pub fn drain<F: FnMut(&BandFrame)>(&mut self, mut visit: F) -> usize {
        let mut count = 0;
        while let Some(frame) = self.try_recv() {
            visit(&frame);
            self.recycle(frame);
            count += 1;
        }
        count
    }

    /// Frames the capture side had to drop so far
    pub fn dropped_frames(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
