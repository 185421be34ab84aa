//! Sentence-greedy text chunker with word overlap.
//!
//! Splits extracted document text into windows bounded by an approximate
//! token budget. Sentences are found by splitting on `". "`; they are
//! appended to the current window until the next one would push it over
//! `max_tokens`, at which point the window is emitted and a new one is
//! seeded with the last `overlap_words` words of the old one.
//!
//! Tokens are approximated as `chars / 4`. The overlap is measured in
//! whitespace-separated words, so a new window's starting token count is
//! the approximate token count of those words, not `overlap_words`.
//!
//! A single sentence larger than the budget is emitted whole.

/// Approximate chars-per-token ratio.
const CHARS_PER_TOKEN: usize = 4;

const SENTENCE_DELIMITER: &str = ". ";

pub const DEFAULT_MAX_TOKENS: usize = 1000;
pub const DEFAULT_OVERLAP_WORDS: usize = 200;

/// Approximate token count of `text`.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count() / CHARS_PER_TOKEN
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    pub max_tokens: usize,
    pub overlap_words: usize,
}

impl Default for Chunker {
    fn default() -> Self {
        Self {
            max_tokens: DEFAULT_MAX_TOKENS,
            overlap_words: DEFAULT_OVERLAP_WORDS,
        }
    }
}

impl Chunker {
    pub fn new(max_tokens: usize, overlap_words: usize) -> Self {
        Self {
            max_tokens,
            overlap_words,
        }
    }

    /// Split `text` into ordered, trimmed, non-empty chunks.
    pub fn chunk(&self, text: &str) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut buf = String::new();
        let mut tokens = 0usize;

        let mut sentences = text.split(SENTENCE_DELIMITER).peekable();
        while let Some(sentence) = sentences.next() {
            let sentence_tokens = estimate_tokens(sentence);

            if tokens + sentence_tokens > self.max_tokens && !buf.trim().is_empty() {
                chunks.push(buf.trim().to_string());

                let overlap = last_words(&buf, self.overlap_words);
                tokens = estimate_tokens(&overlap);
                buf = overlap;
                if !buf.is_empty() {
                    buf.push(' ');
                }
            }

            buf.push_str(sentence);
            // The final piece already carries whatever terminated the text.
            if sentences.peek().is_some() {
                buf.push_str(SENTENCE_DELIMITER);
            }
            tokens += sentence_tokens;
        }

        let tail = buf.trim();
        if !tail.is_empty() {
            chunks.push(tail.to_string());
        }

        chunks
    }
}

/// The last `n` whitespace-separated words of `text`, joined by single spaces.
pub fn last_words(text: &str, n: usize) -> String {
    if n == 0 {
        return String::new();
    }
    let words: Vec<&str> = text.split_whitespace().collect();
    let start = words.len().saturating_sub(n);
    words[start..].join(" ")
}
