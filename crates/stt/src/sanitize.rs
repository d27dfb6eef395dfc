//! Transcript sanitation
//!
//! The carrier speaker loop produces garbled fragments the vendor sometimes
//! transcribes: stuttered single letters, bare punctuation, short vowel-less
//! noise. These are dropped before the orchestrator ever sees them, with an
//! exception for number/time shorthand (`4K`, `2PM`), which looks similar but
//! is real speech.

use once_cell::sync::Lazy;
use regex::Regex;

/// Number/time shorthand: digits followed by a short alphabetic unit.
static SHORTHAND: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+\s?[A-Za-z]{1,2}$").expect("shorthand regex"));

const VOWELS: &[char] = &['a', 'e', 'i', 'o', 'u', 'y'];

/// True when a transcript should be discarded as garbled echo.
pub fn is_garbled_echo(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return true;
    }

    if SHORTHAND.is_match(trimmed) {
        return false;
    }

    // Pure punctuation
    if !trimmed.chars().any(|c| c.is_alphanumeric()) {
        return true;
    }

    // Single-letter repetitions: "k k k k", "a a a"
    let tokens: Vec<&str> = trimmed.split_whitespace().collect();
    if tokens.len() >= 2 && tokens.iter().all(|t| t.chars().count() == 1) {
        let first = tokens[0].to_lowercase();
        if tokens.iter().all(|t| t.to_lowercase() == first) {
            return true;
        }
    }

    // One letter stuttered without spaces: "kkkk"
    let lower: Vec<char> = trimmed.to_lowercase().chars().filter(|c| !c.is_whitespace()).collect();
    if lower.len() >= 2 && lower.iter().all(|&c| c == lower[0] && c.is_alphabetic()) {
        return true;
    }

    // Short vowel-less fragment: "hm", "pfft", "mm"
    if tokens.len() == 1 {
        let word: String = tokens[0].chars().filter(|c| c.is_alphabetic()).collect();
        let lower = word.to_lowercase();
        if !lower.is_empty() && lower.chars().count() <= 5 && !lower.chars().any(|c| VOWELS.contains(&c)) {
            return true;
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shorthand_kept() {
        assert!(!is_garbled_echo("4K"));
        assert!(!is_garbled_echo("2PM"));
        assert!(!is_garbled_echo("10 AM"));
    }

    #[test]
    fn test_single_letter_repetitions_dropped() {
        assert!(is_garbled_echo("k k k k"));
        assert!(is_garbled_echo("a a a"));
        assert!(is_garbled_echo("kkkk"));
    }

    #[test]
    fn test_pure_punctuation_dropped() {
        assert!(is_garbled_echo("..."));
        assert!(is_garbled_echo("?!"));
        assert!(is_garbled_echo("  -  "));
    }

    #[test]
    fn test_vowelless_fragments_dropped() {
        assert!(is_garbled_echo("hm"));
        assert!(is_garbled_echo("pfft"));
        assert!(is_garbled_echo("mm."));
    }

    #[test]
    fn test_real_speech_kept() {
        assert!(!is_garbled_echo("yes"));
        assert!(!is_garbled_echo("I need to reschedule my appointment"));
        assert!(!is_garbled_echo("okay"));
        // Long vowel-less strings are unusual but not our call to drop
        assert!(!is_garbled_echo("rhythms"));
    }

    #[test]
    fn test_empty_dropped() {
        assert!(is_garbled_echo(""));
        assert!(is_garbled_echo("   "));
    }
}
