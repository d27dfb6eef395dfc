//! Sentence splitting for streamed tokens
//!
//! Buffers deltas and yields a sentence whenever the buffer ends with
//! terminal punctuation (`.`, `?`, `!`), with lookahead for closing quotes
//! and brackets so `He said "stop!"` stays one unit.

const TERMINATORS: &[char] = &['.', '?', '!'];
const TRAILERS: &[char] = &['"', '\'', ')', ']', '\u{201D}', '\u{2019}'];

/// Stateful splitter. One instance per response.
#[derive(Debug, Default)]
pub struct SentenceSplitter {
    buffer: String,
}

impl SentenceSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one delta; returns any sentences completed by it, in order.
    pub fn push(&mut self, delta: &str) -> Vec<String> {
        self.buffer.push_str(delta);

        let mut sentences = Vec::new();
        let chars: Vec<char> = self.buffer.chars().collect();
        let mut current = String::new();
        let mut consumed = 0usize;
        let mut i = 0usize;

        while i < chars.len() {
            let c = chars[i];
            current.push(c);
            i += 1;

            if TERMINATORS.contains(&c) {
                // Attach trailing quotes/brackets to the sentence
                while i < chars.len() && TRAILERS.contains(&chars[i]) {
                    current.push(chars[i]);
                    i += 1;
                }
                // A terminator mid-number ("3.5") is not a boundary
                let next_is_alnum = chars.get(i).map(|n| n.is_alphanumeric()).unwrap_or(false);
                if c == '.' && next_is_alnum {
                    continue;
                }
                // Consume the separating whitespace
                while i < chars.len() && chars[i].is_whitespace() {
                    i += 1;
                }
                let sentence = current.trim().to_string();
                if !sentence.is_empty() {
                    sentences.push(sentence);
                }
                current.clear();
                consumed = i;
            }
        }

        if !sentences.is_empty() {
            self.buffer = chars[consumed..].iter().collect();
        }
        sentences
    }

    /// Drain whatever remains (stream end counts as a boundary).
    pub fn flush(&mut self) -> Option<String> {
        let remainder = self.buffer.trim().to_string();
        self.buffer.clear();
        if remainder.is_empty() {
            None
        } else {
            Some(remainder)
        }
    }

    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_sentences_in_one_delta() {
        let mut s = SentenceSplitter::new();
        let out = s.push("Hello there. How can I help you today?");
        assert_eq!(out, vec!["Hello there.", "How can I help you today?"]);
        assert!(s.flush().is_none());
    }

    #[test]
    fn test_sentence_across_deltas() {
        let mut s = SentenceSplitter::new();
        assert!(s.push("Your appointment is ").is_empty());
        assert!(s.push("on Monday").is_empty());
        let out = s.push(" at 2 PM. See");
        assert_eq!(out, vec!["Your appointment is on Monday at 2 PM."]);
        assert_eq!(s.flush(), Some("See".to_string()));
    }

    #[test]
    fn test_decimal_not_a_boundary() {
        let mut s = SentenceSplitter::new();
        let out = s.push("The rate is 3.5 percent today.");
        assert_eq!(out, vec!["The rate is 3.5 percent today."]);
    }

    #[test]
    fn test_quote_trailer_attached() {
        let mut s = SentenceSplitter::new();
        let out = s.push("He said \"stop!\" Then silence.");
        assert_eq!(out, vec!["He said \"stop!\"", "Then silence."]);
    }

    #[test]
    fn test_flush_on_stream_end() {
        let mut s = SentenceSplitter::new();
        assert!(s.push("One moment please").is_empty());
        assert_eq!(s.flush(), Some("One moment please".to_string()));
        assert!(s.flush().is_none());
    }

    #[test]
    fn test_exclamation_and_question() {
        let mut s = SentenceSplitter::new();
        let out = s.push("Wait! Really?");
        assert_eq!(out, vec!["Wait!", "Really?"]);
    }
}
