//! Filler filter
//!
//! While the agent is speaking (or its audio is still in flight within the
//! network-propagation buffer), short backchannel finals like "yeah",
//! "okay" and "mm-hmm" are acknowledgments, not interruptions. They are
//! dropped and must never generate LLM turns.

use std::collections::HashSet;

use once_cell::sync::Lazy;

static BACKCHANNEL_TOKENS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "um", "uh", "uhh", "umm", "er", "ah", "hm", "hmm", "mm", "mhm", "mmhmm", "uhhuh",
        "yeah", "yep", "yes", "ya", "no", "nope", "ok", "okay", "kay", "right", "sure",
        "alright", "gotcha", "totally", "cool", "fine", "exactly", "correct", "great",
    ]
    .into_iter()
    .collect()
});

fn clean(word: &str) -> String {
    word.chars()
        .filter(|c| c.is_alphanumeric())
        .collect::<String>()
        .to_lowercase()
}

/// True when a final transcript arriving during agent speech should be
/// dropped: 1–2 words, or composed entirely of backchannel tokens.
pub fn is_dropped_while_speaking(text: &str) -> bool {
    let words: Vec<String> = text
        .split_whitespace()
        .map(clean)
        .filter(|w| !w.is_empty())
        .collect();

    if words.is_empty() {
        return true;
    }
    if words.len() <= 2 {
        return true;
    }
    words.iter().all(|w| BACKCHANNEL_TOKENS.contains(w.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_finals_dropped() {
        assert!(is_dropped_while_speaking("yeah"));
        assert!(is_dropped_while_speaking("okay"));
        assert!(is_dropped_while_speaking("oh okay"));
        assert!(is_dropped_while_speaking("next tuesday"));
    }

    #[test]
    fn test_backchannel_runs_dropped() {
        assert!(is_dropped_while_speaking("yeah yeah okay"));
        assert!(is_dropped_while_speaking("mm-hmm right sure"));
    }

    #[test]
    fn test_substantive_speech_kept() {
        assert!(!is_dropped_while_speaking("actually wait stop"));
        assert!(!is_dropped_while_speaking("I have a question about that"));
        // Three words, only two of which are backchannel
        assert!(!is_dropped_while_speaking("yeah but tomorrow"));
    }
}
