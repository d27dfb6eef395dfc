//! Transcript-side voicemail and gatekeeper detection
//!
//! Runs independently of the carrier's AMD. Recognizes voicemail prompts and
//! long unattended opening monologues (hang up), and IVR gatekeepers that
//! want a DTMF digit (press it instead of hanging up).

use once_cell::sync::Lazy;
use regex::Regex;

/// A first user "turn" longer than this with no interaction yet is a
/// recorded greeting, not a person.
const OPENING_MONOLOGUE_WORDS: usize = 40;

static VOICEMAIL_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"leave (a|your) message",
        r"after the (tone|beep)",
        r"record your message",
        r"is not available",
        r"can'?t (take|get to) (the phone|your call)",
        r"voice ?mail",
        r"mail ?box",
        r"has been forwarded",
        r"at the sound of the",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("voicemail pattern"))
    .collect()
});

static GATEKEEPER_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"press (\d|zero|one|two|three|four|five|six|seven|eight|nine)")
        .expect("gatekeeper pattern")
});

fn digit_from_word(word: &str) -> Option<char> {
    match word {
        "zero" => Some('0'),
        "one" => Some('1'),
        "two" => Some('2'),
        "three" => Some('3'),
        "four" => Some('4'),
        "five" => Some('5'),
        "six" => Some('6'),
        "seven" => Some('7'),
        "eight" => Some('8'),
        "nine" => Some('9'),
        w if w.len() == 1 && w.chars().next().is_some_and(|c| c.is_ascii_digit()) => {
            w.chars().next()
        }
        _ => None,
    }
}

/// What a user turn looks like to the detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoicemailVerdict {
    /// Nothing suspicious
    Human,
    /// Hang up; a machine is talking
    Voicemail,
    /// An IVR wants this digit pressed to reach a human
    Gatekeeper(char),
}

#[derive(Debug, Default)]
pub struct VoicemailDetector {
    /// Completed user↔agent exchanges so far
    exchanges: u32,
}

impl VoicemailDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Call after each agent response so the monologue heuristic only fires
    /// on the call opening.
    pub fn note_exchange(&mut self) {
        self.exchanges += 1;
    }

    pub fn assess(&self, text: &str) -> VoicemailVerdict {
        let lower = text.to_lowercase();

        // Gatekeeper bypass takes precedence: a single digit press beats a
        // hangup when both patterns appear
        if let Some(caps) = GATEKEEPER_PATTERN.captures(&lower) {
            if let Some(digit) = caps.get(1).and_then(|m| digit_from_word(m.as_str())) {
                return VoicemailVerdict::Gatekeeper(digit);
            }
        }

        if VOICEMAIL_PATTERNS.iter().any(|p| p.is_match(&lower)) {
            return VoicemailVerdict::Voicemail;
        }

        // Long opening monologue without any interaction
        if self.exchanges == 0 && lower.split_whitespace().count() > OPENING_MONOLOGUE_WORDS {
            return VoicemailVerdict::Voicemail;
        }

        VoicemailVerdict::Human
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_voicemail_prompts() {
        let detector = VoicemailDetector::new();
        assert_eq!(
            detector.assess("Please leave a message after the tone"),
            VoicemailVerdict::Voicemail
        );
        assert_eq!(
            detector.assess("The person you are calling is not available"),
            VoicemailVerdict::Voicemail
        );
        assert_eq!(
            detector.assess("Your call has been forwarded to an automated voice mail system"),
            VoicemailVerdict::Voicemail
        );
    }

    #[test]
    fn test_gatekeeper_beats_hangup() {
        let detector = VoicemailDetector::new();
        assert_eq!(
            detector.assess("press 1 to continue"),
            VoicemailVerdict::Gatekeeper('1')
        );
        assert_eq!(
            detector.assess("to leave a message press two"),
            VoicemailVerdict::Gatekeeper('2')
        );
    }

    #[test]
    fn test_opening_monologue() {
        let detector = VoicemailDetector::new();
        let monologue = "hello you have reached the main office of the company we are \
                         currently assisting other customers our normal business hours are \
                         monday through friday nine to five please call back during those \
                         hours or visit our website for more information thank you";
        assert_eq!(detector.assess(monologue), VoicemailVerdict::Voicemail);
    }

    #[test]
    fn test_monologue_heuristic_only_at_opening() {
        let mut detector = VoicemailDetector::new();
        detector.note_exchange();
        let long_answer = "well let me think about that for a moment because there are \
                           quite a few things to consider here first of all the schedule \
                           next week is pretty full but i might be able to move some things \
                           around if that helps you fit me in somewhere on tuesday";
        assert_eq!(detector.assess(long_answer), VoicemailVerdict::Human);
    }

    #[test]
    fn test_normal_speech_is_human() {
        let detector = VoicemailDetector::new();
        assert_eq!(
            detector.assess("I need to reschedule my appointment"),
            VoicemailVerdict::Human
        );
    }
}
