//! Stateful linear resampling
//!
//! 16-bit mono linear interpolation with filter state held by the caller
//! across calls, so chunk boundaries do not introduce artifacts: the trailing
//! sample and the fractional read position carry over into the next chunk.

use crate::{CodecError, Result};

/// Linear interpolating resampler. One instance per audio direction; feed it
/// consecutive chunks of the same stream.
#[derive(Debug, Clone)]
pub struct LinearResampler {
    in_rate: u32,
    out_rate: u32,
    /// Fractional read position relative to the carried sample
    pos: f64,
    /// Final input sample from the previous chunk
    prev: Option<i16>,
}

impl LinearResampler {
    pub fn new(in_rate: u32, out_rate: u32) -> Result<Self> {
        if in_rate == 0 || out_rate == 0 {
            return Err(CodecError::InvalidParameter("sample rates must be non-zero"));
        }
        Ok(Self {
            in_rate,
            out_rate,
            pos: 0.0,
            prev: None,
        })
    }

    /// Resample one chunk of samples, continuing from prior state.
    pub fn process(&mut self, input: &[i16]) -> Vec<i16> {
        if input.is_empty() {
            return Vec::new();
        }
        if self.in_rate == self.out_rate {
            self.prev = input.last().copied();
            return input.to_vec();
        }

        let step = self.in_rate as f64 / self.out_rate as f64;

        let mut window: Vec<i16> = Vec::with_capacity(input.len() + 1);
        if let Some(p) = self.prev {
            window.push(p);
        }
        window.extend_from_slice(input);

        let last_idx = (window.len() - 1) as f64;
        let mut out = Vec::with_capacity((input.len() as f64 / step) as usize + 2);
        let mut pos = self.pos;

        while pos <= last_idx {
            let idx = pos.floor() as usize;
            let frac = pos - idx as f64;
            let sample = if idx + 1 < window.len() {
                window[idx] as f64 * (1.0 - frac) + window[idx + 1] as f64 * frac
            } else {
                window[idx] as f64
            };
            out.push(sample.round() as i16);
            pos += step;
        }

        // The last input sample becomes index 0 of the next window.
        self.pos = pos - last_idx;
        self.prev = window.last().copied();
        out
    }

    /// Resample little-endian PCM16 bytes.
    pub fn process_bytes(&mut self, input: &[u8]) -> Result<Vec<u8>> {
        if input.len() % 2 != 0 {
            return Err(CodecError::OddPcmLength(input.len()));
        }
        let samples: Vec<i16> = input
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]))
            .collect();
        let out = self.process(&samples);
        Ok(out.iter().flat_map(|s| s.to_le_bytes()).collect())
    }

    /// Drop carried state, e.g. when the stream restarts.
    pub fn reset(&mut self) {
        self.pos = 0.0;
        self.prev = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_rate_rejected() {
        assert!(LinearResampler::new(0, 8000).is_err());
        assert!(LinearResampler::new(8000, 0).is_err());
    }

    #[test]
    fn test_upsample_steady_state_ratio() {
        let mut r = LinearResampler::new(8000, 16000).unwrap();
        let chunk = vec![0i16; 160];
        let mut total = 0usize;
        for _ in 0..10 {
            total += r.process(&chunk).len();
        }
        // 10 × 160 @ 8 kHz should produce ~10 × 320 @ 16 kHz
        assert!((3198..=3200).contains(&total), "total={total}");
    }

    #[test]
    fn test_downsample_24k_to_8k() {
        let mut r = LinearResampler::new(24000, 8000).unwrap();
        let chunk = vec![100i16; 480];
        let first = r.process(&chunk);
        let second = r.process(&chunk);
        assert_eq!(first.len(), 160);
        assert_eq!(second.len(), 160);
        assert!(second.iter().all(|&s| s == 100));
    }

    #[test]
    fn test_chunk_boundary_continuity() {
        // A ramp split across chunks must stay monotonic through the seam
        let ramp: Vec<i16> = (0..320).map(|i| i as i16).collect();
        let mut split = LinearResampler::new(8000, 16000).unwrap();
        let mut joined = LinearResampler::new(8000, 16000).unwrap();

        let mut out_split = split.process(&ramp[..160]);
        out_split.extend(split.process(&ramp[160..]));
        let out_joined = joined.process(&ramp);

        assert_eq!(out_split, out_joined);
        assert!(out_split.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_same_rate_passthrough() {
        let mut r = LinearResampler::new(8000, 8000).unwrap();
        let chunk = vec![1i16, 2, 3];
        assert_eq!(r.process(&chunk), chunk);
    }
}
