//! 20 ms framing for carrier egress

use crate::{CodecError, Result};

/// μ-law silence byte
pub const MULAW_SILENCE: u8 = 0xFF;

/// Split μ-law bytes into whole frames of `frame_size`, returning the frames
/// in order plus any trailing partial bytes. Mid-stream the remainder waits
/// in the caller's buffer for the next chunk.
pub fn frame_mulaw(bytes: &[u8], frame_size: usize) -> Result<(Vec<Vec<u8>>, Vec<u8>)> {
    if frame_size == 0 {
        return Err(CodecError::InvalidParameter("frame_size must be non-zero"));
    }
    let whole = bytes.len() / frame_size * frame_size;
    let frames = bytes[..whole]
        .chunks_exact(frame_size)
        .map(|c| c.to_vec())
        .collect();
    Ok((frames, bytes[whole..].to_vec()))
}

/// As [`frame_mulaw`], but pads a trailing partial frame with μ-law silence.
/// Used at end-of-utterance flush only.
pub fn frame_mulaw_padded(bytes: &[u8], frame_size: usize) -> Result<Vec<Vec<u8>>> {
    let (mut frames, rest) = frame_mulaw(bytes, frame_size)?;
    if !rest.is_empty() {
        let mut last = rest;
        last.resize(frame_size, MULAW_SILENCE);
        frames.push(last);
    }
    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_multiple() {
        let data = vec![1u8; 480];
        let (frames, rest) = frame_mulaw(&data, 160).unwrap();
        assert_eq!(frames.len(), 3);
        assert!(rest.is_empty());
        assert!(frames.iter().all(|f| f.len() == 160));
    }

    #[test]
    fn test_remainder_returned() {
        let data = vec![2u8; 400];
        let (frames, rest) = frame_mulaw(&data, 160).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(rest.len(), 80);
    }

    #[test]
    fn test_padded_flush() {
        let data = vec![3u8; 400];
        let frames = frame_mulaw_padded(&data, 160).unwrap();
        assert_eq!(frames.len(), 3);
        assert_eq!(&frames[2][..80], &[3u8; 80][..]);
        assert!(frames[2][80..].iter().all(|&b| b == MULAW_SILENCE));
    }

    #[test]
    fn test_zero_frame_size_rejected() {
        assert!(frame_mulaw(&[1, 2, 3], 0).is_err());
    }
}
