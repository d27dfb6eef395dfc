//! Sentence units emitted by streaming LLM generation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A unit of LLM output, ended by `.`, `?`, `!` or stream completion.
/// Sentences are ordered by emission and flow into TTS in that order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sentence {
    pub text: String,
    /// 1-based position within the response
    pub sentence_num: u32,
    pub is_first: bool,
    pub is_last: bool,
    pub send_timestamp: DateTime<Utc>,
}

impl Sentence {
    pub fn new(text: impl Into<String>, sentence_num: u32, is_first: bool, is_last: bool) -> Self {
        Self {
            text: text.into(),
            sentence_num,
            is_first,
            is_last,
            send_timestamp: Utc::now(),
        }
    }

    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }

    /// Heuristic playback duration: real audio length is unknown until
    /// synthesis finishes, so queued sentences extend the expected end by
    /// this estimate.
    pub fn estimated_duration_secs(&self) -> f64 {
        (0.4 * self.word_count() as f64 + 1.0).max(1.5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_floor() {
        // One word: 0.4 + 1.0 = 1.4 -> floored at 1.5
        let s = Sentence::new("Hi.", 1, true, false);
        assert_eq!(s.estimated_duration_secs(), 1.5);
    }

    #[test]
    fn test_duration_scales_with_words() {
        let s = Sentence::new("one two three four five six seven eight nine ten", 1, true, false);
        assert!((s.estimated_duration_secs() - 5.0).abs() < 1e-9);
    }
}
