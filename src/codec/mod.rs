//! PCM codec helpers
//!
//! The live API speaks raw little-endian PCM16: 16 kHz mono upstream,
//! 24 kHz mono downstream. This module owns the float/integer conversions
//! between cpal's f32 sample format and that wire format.

pub mod pcm;

pub use pcm::{f32_to_pcm16, pcm16_to_f32, sample_to_i16};
