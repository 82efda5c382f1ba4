//! Audio subsystem module

pub mod buffer;
pub mod capture;
pub mod device;
pub mod playback;

pub use buffer::{AudioChunk, Chunker, RingBuffer};
pub use capture::AudioCapture;
pub use playback::{AudioOutput, PlaybackScheduler, Timeline};
