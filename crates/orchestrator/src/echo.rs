//! Echo suppression
//!
//! The carrier speaker loop feeds the agent's own audio back into STT. Any
//! transcript arriving while the agent is speaking is compared against the
//! last three agent utterances; a match means the "user speech" is the agent
//! hearing itself, and it is discarded before it can trigger a turn.

use std::collections::{HashSet, VecDeque};

/// Agent utterances retained for comparison
const RECENT_CAP: usize = 3;

/// Word-set similarity above which a transcript is echo
const SIMILARITY_THRESHOLD: f64 = 0.7;

/// Minimum normalized length for the containment check; tiny fragments are
/// handled by the filler filter instead
const CONTAINMENT_MIN_CHARS: usize = 8;

/// Normalize for comparison: lowercase, strip punctuation, expand the digits
/// STT renders inconsistently ("2 PM" vs "two PM").
fn normalize_words(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split_whitespace()
        .map(|w| {
            let cleaned: String = w.chars().filter(|c| c.is_alphanumeric()).collect();
            match cleaned.as_str() {
                "0" => "zero".to_string(),
                "1" => "one".to_string(),
                "2" => "two".to_string(),
                "3" => "three".to_string(),
                "4" => "four".to_string(),
                "5" => "five".to_string(),
                "6" => "six".to_string(),
                "7" => "seven".to_string(),
                "8" => "eight".to_string(),
                "9" => "nine".to_string(),
                "10" => "ten".to_string(),
                _ => cleaned,
            }
        })
        .filter(|w| !w.is_empty())
        .collect()
}

/// Fraction of transcript words present in the agent utterance.
fn word_set_similarity(transcript: &[String], agent: &HashSet<&String>) -> f64 {
    if transcript.is_empty() {
        return 0.0;
    }
    let hits = transcript.iter().filter(|w| agent.contains(w)).count();
    hits as f64 / transcript.len() as f64
}

fn trigrams(words: &[String]) -> HashSet<(String, String, String)> {
    words
        .windows(3)
        .map(|w| (w[0].clone(), w[1].clone(), w[2].clone()))
        .collect()
}

/// Bounded list of recent agent utterances plus the echo predicate.
#[derive(Debug, Default)]
pub struct EchoFilter {
    recent: VecDeque<String>,
}

impl EchoFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an agent utterance; the oldest beyond three falls off.
    pub fn push_agent_text(&mut self, text: impl Into<String>) {
        self.recent.push_back(text.into());
        while self.recent.len() > RECENT_CAP {
            self.recent.pop_front();
        }
    }

    pub fn recent_texts(&self) -> Vec<String> {
        self.recent.iter().cloned().collect()
    }

    /// True when `transcript` matches any recent agent utterance by
    /// word-set similarity, substring containment (either direction), or a
    /// shared 3-gram phrase.
    pub fn is_echo(&self, transcript: &str) -> bool {
        let words = normalize_words(transcript);
        if words.is_empty() {
            return false;
        }
        let joined = words.join(" ");
        let grams = trigrams(&words);

        for agent_text in &self.recent {
            let agent_words = normalize_words(agent_text);
            if agent_words.is_empty() {
                continue;
            }
            let agent_set: HashSet<&String> = agent_words.iter().collect();

            if word_set_similarity(&words, &agent_set) >= SIMILARITY_THRESHOLD {
                return true;
            }

            let agent_joined = agent_words.join(" ");
            if joined.len() >= CONTAINMENT_MIN_CHARS
                && (agent_joined.contains(&joined) || joined.contains(&agent_joined))
            {
                return true;
            }

            if !grams.is_empty() && !grams.is_disjoint(&trigrams(&agent_words)) {
                return true;
            }
        }
        false
    }
}
