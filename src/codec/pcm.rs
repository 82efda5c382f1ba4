//! f32 <-> PCM16LE sample conversion
//!
//! Capture produces f32 samples in [-1.0, 1.0]; the wire carries 16-bit
//! signed integers. Conversion saturates, so no input — including values
//! outside the nominal range or NaN — can leave the i16 domain.

use bytes::{Bytes, BytesMut};

/// Convert one f32 sample to a 16-bit signed integer.
///
/// Linear scaling by 32768 with saturation at the i16 bounds. NaN maps to 0.
#[inline]
pub fn sample_to_i16(sample: f32) -> i16 {
    // `as` casts from float saturate (and send NaN to 0), so the scale by
    // 32768 cannot overflow even for inputs outside [-1.0, 1.0].
    (sample * 32768.0) as i16
}

/// Convert a block of f32 samples to little-endian PCM16 bytes.
pub fn f32_to_pcm16(samples: &[f32]) -> Bytes {
    let mut buf = BytesMut::with_capacity(samples.len() * 2);
    for &sample in samples {
        buf.extend_from_slice(&sample_to_i16(sample).to_le_bytes());
    }
    buf.freeze()
}

/// Convert little-endian PCM16 bytes back to f32 samples in [-1.0, 1.0).
///
/// A trailing odd byte is ignored.
pub fn pcm16_to_f32(data: &[u8]) -> Vec<f32> {
    data.chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_scaling() {
        assert_eq!(sample_to_i16(0.0), 0);
        assert_eq!(sample_to_i16(0.5), 16384);
        assert_eq!(sample_to_i16(-0.5), -16384);
        assert_eq!(sample_to_i16(-1.0), -32768);
    }

    #[test]
    fn test_saturation() {
        assert_eq!(sample_to_i16(1.0), 32767);
        assert_eq!(sample_to_i16(2.5), 32767);
        assert_eq!(sample_to_i16(-3.0), -32768);
        assert_eq!(sample_to_i16(f32::INFINITY), 32767);
        assert_eq!(sample_to_i16(f32::NEG_INFINITY), -32768);
        assert_eq!(sample_to_i16(f32::NAN), 0);
    }

    #[test]
    fn test_pcm16_bytes_layout() {
        let bytes = f32_to_pcm16(&[0.5, -0.5]);
        assert_eq!(bytes.len(), 4);
        assert_eq!(i16::from_le_bytes([bytes[0], bytes[1]]), 16384);
        assert_eq!(i16::from_le_bytes([bytes[2], bytes[3]]), -16384);
    }

    #[test]
    fn test_roundtrip_close() {
        let samples = vec![0.0, 0.25, -0.25, 0.9, -0.9];
        let back = pcm16_to_f32(&f32_to_pcm16(&samples));
        assert_eq!(back.len(), samples.len());
        for (a, b) in samples.iter().zip(back.iter()) {
            assert!((a - b).abs() < 1.0 / 32768.0 + f32::EPSILON);
        }
    }

    #[test]
    fn test_odd_trailing_byte_ignored() {
        let samples = pcm16_to_f32(&[0x00, 0x40, 0x7f]);
        assert_eq!(samples.len(), 1);
    }

    proptest! {
        #[test]
        fn conversion_never_leaves_i16_range(samples in prop::collection::vec(-1.0f32..=1.0, 0..4096)) {
            let bytes = f32_to_pcm16(&samples);
            for pair in bytes.chunks_exact(2) {
                let v = i16::from_le_bytes([pair[0], pair[1]]) as i32;
                prop_assert!((-32768..=32767).contains(&v));
            }
        }

        #[test]
        fn conversion_saturates_out_of_range(sample in prop::num::f32::ANY) {
            let v = sample_to_i16(sample) as i32;
            prop_assert!((-32768..=32767).contains(&v));
        }
    }
}
