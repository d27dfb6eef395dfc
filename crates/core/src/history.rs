//! Bounded conversation window passed to the LLM

use unicode_segmentation::UnicodeSegmentation;

use crate::transcript::{TranscriptEntry, TranscriptRole};

/// Rough token estimate: ~4 characters per token for English-like text,
/// counted over grapheme clusters so multi-byte scripts don't overcount.
pub fn estimate_tokens(text: &str) -> usize {
    (text.graphemes(true).count().max(1)) / 4 + 1
}

/// Recent transcript entries kept under a per-agent token budget.
/// The oldest entries are trimmed first; the transcript itself (persisted,
/// append-only) is unaffected by trimming here.
#[derive(Debug, Clone)]
pub struct ConversationHistory {
    entries: Vec<TranscriptEntry>,
    token_budget: usize,
}

impl ConversationHistory {
    pub fn new(token_budget: usize) -> Self {
        Self {
            entries: Vec::new(),
            token_budget,
        }
    }

    pub fn push(&mut self, entry: TranscriptEntry) {
        self.entries.push(entry);
        self.trim();
    }

    pub fn push_user(&mut self, text: impl Into<String>) {
        self.push(TranscriptEntry::user(text));
    }

    pub fn push_assistant(&mut self, text: impl Into<String>) {
        self.push(TranscriptEntry::assistant(text));
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The last ≤`n` assistant utterances, newest last. The echo filter
    /// compares incoming transcripts against these.
    pub fn recent_agent_texts(&self, n: usize) -> Vec<&str> {
        let mut texts: Vec<&str> = self
            .entries
            .iter()
            .rev()
            .filter(|e| e.role == TranscriptRole::Assistant)
            .take(n)
            .map(|e| e.text.as_str())
            .collect();
        texts.reverse();
        texts
    }

    fn estimated_total(&self) -> usize {
        self.entries.iter().map(|e| estimate_tokens(&e.text)).sum()
    }

    fn trim(&mut self) {
        while self.entries.len() > 1 && self.estimated_total() > self.token_budget {
            self.entries.remove(0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trims_oldest_first() {
        let mut history = ConversationHistory::new(20);
        history.push_user("first message that is reasonably long for the budget");
        history.push_assistant("second message that is also reasonably long here");
        history.push_user("third");

        // Budget forces the oldest out, the newest stays
        assert!(history.len() < 3);
        assert_eq!(history.entries().last().unwrap().text, "third");
    }

    #[test]
    fn test_recent_agent_texts_bounded() {
        let mut history = ConversationHistory::new(10_000);
        history.push_assistant("a1");
        history.push_user("u1");
        history.push_assistant("a2");
        history.push_assistant("a3");
        history.push_assistant("a4");

        let recent = history.recent_agent_texts(3);
        assert_eq!(recent, vec!["a2", "a3", "a4"]);
    }

    #[test]
    fn test_estimate_tokens_nonzero() {
        assert!(estimate_tokens("") >= 1);
        assert!(estimate_tokens("hello world this is a sentence") > 1);
    }
}
