//! Audio chunk and buffering types
//!
//! The capture callback runs on a real-time thread and must never block, so
//! captured sample blocks cross into async land through a lock-free ring
//! buffer, and a `Chunker` reframes them into the fixed chunk size the
//! transport expects.

use bytes::Bytes;
use crossbeam::queue::ArrayQueue;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::codec::{f32_to_pcm16, pcm16_to_f32};

/// An immutable block of PCM16 audio tagged with its format.
///
/// Produced by the capture pipeline (16 kHz mono, outbound) or by the
/// transport (24 kHz mono, inbound). Never mutated after creation; handing a
/// chunk off transfers ownership (clones share the underlying bytes).
#[derive(Debug, Clone)]
pub struct AudioChunk {
    data: Bytes,
    sample_rate: u32,
    channels: u16,
}

impl AudioChunk {
    pub fn new(data: Bytes, sample_rate: u32, channels: u16) -> Self {
        Self {
            data,
            sample_rate,
            channels,
        }
    }

    /// Build a chunk from f32 samples, converting to PCM16.
    pub fn from_f32(samples: &[f32], sample_rate: u32, channels: u16) -> Self {
        Self::new(f32_to_pcm16(samples), sample_rate, channels)
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Number of samples per channel
    pub fn samples_per_channel(&self) -> usize {
        self.data.len() / 2 / self.channels as usize
    }

    /// Chunk duration in seconds
    pub fn duration_secs(&self) -> f64 {
        self.samples_per_channel() as f64 / self.sample_rate as f64
    }

    /// Decode back to f32 samples for playback
    pub fn to_f32(&self) -> Vec<f32> {
        pcm16_to_f32(&self.data)
    }
}

/// Accumulates capture-callback sample blocks and emits fixed-size chunks.
///
/// Leftover samples below the chunk size stay pending until the next push;
/// they are discarded with the chunker on teardown rather than flushed as a
/// short chunk.
pub struct Chunker {
    pending: Vec<f32>,
    chunk_samples: usize,
    sample_rate: u32,
}

impl Chunker {
    pub fn new(chunk_samples: usize, sample_rate: u32) -> Self {
        Self {
            pending: Vec::with_capacity(chunk_samples * 2),
            chunk_samples,
            sample_rate,
        }
    }

    /// Append a block of mono samples.
    pub fn push(&mut self, samples: &[f32]) {
        self.pending.extend_from_slice(samples);
    }

    /// Take the next complete chunk, if one has accumulated.
    pub fn pop_chunk(&mut self) -> Option<AudioChunk> {
        if self.pending.len() < self.chunk_samples {
            return None;
        }
        let samples: Vec<f32> = self.pending.drain(..self.chunk_samples).collect();
        Some(AudioChunk::from_f32(&samples, self.sample_rate, 1))
    }

    /// Samples waiting for a full chunk
    pub fn pending_samples(&self) -> usize {
        self.pending.len()
    }
}

/// Lock-free ring buffer carrying capture-callback sample blocks
pub struct RingBuffer {
    queue: ArrayQueue<Vec<f32>>,
    overflow_count: AtomicUsize,
    underrun_count: AtomicUsize,
}

impl RingBuffer {
    /// Create a new ring buffer with the specified capacity
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: ArrayQueue::new(capacity),
            overflow_count: AtomicUsize::new(0),
            underrun_count: AtomicUsize::new(0),
        }
    }

    /// Push a block into the buffer
    /// Returns false if buffer is full (overflow)
    pub fn push(&self, block: Vec<f32>) -> bool {
        match self.queue.push(block) {
            Ok(()) => true,
            Err(_) => {
                self.overflow_count.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Pop a block from the buffer
    /// Returns None if buffer is empty (underrun)
    pub fn pop(&self) -> Option<Vec<f32>> {
        match self.queue.pop() {
            Some(block) => Some(block),
            None => {
                self.underrun_count.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Try to pop without counting underrun
    pub fn try_pop(&self) -> Option<Vec<f32>> {
        self.queue.pop()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    pub fn overflow_count(&self) -> usize {
        self.overflow_count.load(Ordering::Relaxed)
    }

    pub fn underrun_count(&self) -> usize {
        self.underrun_count.load(Ordering::Relaxed)
    }
}

/// Thread-safe handle to a ring buffer
pub type SharedRingBuffer = Arc<RingBuffer>;

/// Create a new shared ring buffer
pub fn create_shared_buffer(capacity: usize) -> SharedRingBuffer {
    Arc::new(RingBuffer::new(capacity))
}
