use lazy_static::lazy_static;
use regex::Regex;
use scraper::Html;
use std::collections::HashSet;

use crate::config::SyncConfig;

/// Fragment content longer than this many characters is cut.
pub const MAX_FRAGMENT_CHARS: usize = 8001;

lazy_static! {
    static ref WORD_CHAR: Regex = Regex::new(r"\w").expect("valid regex");
}

/// One line of a post, kept for indexing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    /// Position among the non-blank lines of the post. Dropped fragments
    /// leave gaps; the index is part of the document id.
    pub index: usize,
    pub content: String,
    pub word_count: usize,
    pub is_wordy: bool,
}

#[derive(Debug, Clone)]
pub struct ContentSegmenter {
    wordiness_threshold: usize,
    skip_words: HashSet<String>,
}

impl Default for ContentSegmenter {
    fn default() -> Self {
        Self::from_config(&SyncConfig::default())
    }
}

impl ContentSegmenter {
    pub fn new<I, S>(wordiness_threshold: usize, skip_words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            wordiness_threshold,
            skip_words: skip_words.into_iter().map(|w| w.as_ref().to_lowercase()).collect(),
        }
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            wordiness_threshold: config.wordiness_threshold,
            skip_words: config.skip_word_set(),
        }
    }

    pub fn wordiness_threshold(&self) -> usize {
        self.wordiness_threshold
    }

    /// Segment a rendered (HTML) post body.
    pub fn segment(&self, cooked: &str) -> Vec<Fragment> {
        self.segment_text(&render_plain_text(cooked))
    }

    /// Segment text that has already been stripped of markup.
    pub fn segment_text(&self, text: &str) -> Vec<Fragment> {
        let mut fragments = Vec::new();
        let lines = text.split('\n').filter(|line| !is_blank(line));

        for (index, line) in lines.enumerate() {
            // lines of bare symbols, e.g. formatted code
            if !WORD_CHAR.is_match(line) {
                tracing::trace!(index, "skipping fragment without word characters");
                continue;
            }

            let words = normalize_words(line);
            if words.len() <= self.wordiness_threshold
                && words.iter().any(|w| self.skip_words.contains(w))
            {
                tracing::trace!(index, "skipping salutation fragment");
                continue;
            }

            fragments.push(Fragment {
                index,
                content: truncate_chars(line, MAX_FRAGMENT_CHARS),
                word_count: words.len(),
                is_wordy: words.len() >= self.wordiness_threshold,
            });
        }
        fragments
    }
}

/// Blank means ASCII whitespace and NUL only. A line holding just a
/// non-breaking space keeps its index and is dropped later for having no
/// word characters.
fn is_blank(line: &str) -> bool {
    line.chars().all(|c| c.is_ascii_whitespace() || c == '\x0B' || c == '\0')
}

/// Text nodes of the HTML in document order, tags removed.
pub fn render_plain_text(cooked: &str) -> String {
    let doc = Html::parse_fragment(cooked);
    doc.root_element().text().collect()
}

/// Whitespace-separated tokens, lowercased, with non-alphanumerics removed.
/// Tokens that normalize to nothing still count as words.
pub fn normalize_words(line: &str) -> Vec<String> {
    line.split_whitespace()
        .map(|token| {
            token
                .chars()
                .filter(|c| c.is_alphanumeric())
                .flat_map(char::to_lowercase)
                .collect::<String>()
        })
        .collect()
}

fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((byte_idx, _)) => s[..byte_idx].to_string(),
        None => s.to_string(),
    }
}
