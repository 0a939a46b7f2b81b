//! Split oversized text into bounded segments along natural boundaries.
//!
//! Lengths are measured in characters, not bytes. Paragraphs (blank-line
//! separated) are packed greedily; a paragraph that alone exceeds the limit
//! is broken at sentence boundaries, and a sentence that still does not fit
//! is cut into fixed-size character chunks.

use std::sync::LazyLock;

use regex::Regex;

const PARAGRAPH_SEPARATOR: &str = "\n\n";
const SENTENCE_SEPARATOR: &str = " ";

static PARAGRAPH_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n[ \t\r]*\n").expect("static paragraph pattern is valid"));

/// Split `text` into ordered segments of at most `max_chars` characters.
///
/// Input at or under the limit comes back as a single segment equal to the
/// input. The result is never empty and contains no empty segments unless
/// the input itself is empty.
pub fn segment_text(text: &str, max_chars: usize) -> Vec<String> {
    let limit = max_chars.max(1);
    if char_len(text) <= max_chars {
        return vec![text.to_string()];
    }

    let paragraphs: Vec<&str> = PARAGRAPH_BREAK
        .split(text)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();

    if paragraphs.is_empty() {
        return vec![text.to_string()];
    }

    let mut segments = Vec::new();
    let mut packer = Packer::new(limit, PARAGRAPH_SEPARATOR);

    for paragraph in paragraphs {
        if char_len(paragraph) > limit {
            packer.flush_into(&mut segments);
            segments.extend(split_paragraph(paragraph, limit));
        } else {
            packer.push(paragraph, &mut segments);
        }
    }
    packer.flush_into(&mut segments);

    tracing::debug!(
        "Segmented {} chars into {} segments (limit {})",
        char_len(text),
        segments.len(),
        limit
    );
    segments
}

/// Break one oversized paragraph at ". " boundaries, falling back to
/// character chunks.
fn split_paragraph(paragraph: &str, limit: usize) -> Vec<String> {
    let sentences = split_sentences(paragraph);
    if sentences.len() < 2 {
        return chunk_chars(paragraph, limit);
    }

    let mut segments = Vec::new();
    let mut packer = Packer::new(limit, SENTENCE_SEPARATOR);
    for sentence in &sentences {
        if char_len(sentence) > limit {
            packer.flush_into(&mut segments);
            segments.extend(chunk_chars(sentence, limit));
        } else {
            packer.push(sentence, &mut segments);
        }
    }
    packer.flush_into(&mut segments);
    segments
}

/// Split on ". ", keeping the period with its sentence.
fn split_sentences(paragraph: &str) -> Vec<String> {
    let parts: Vec<&str> = paragraph.split(". ").collect();
    let last = parts.len().saturating_sub(1);
    parts
        .into_iter()
        .enumerate()
        .filter(|(_, p)| !p.trim().is_empty())
        .map(|(i, p)| if i < last { format!("{p}.") } else { p.to_string() })
        .collect()
}

fn chunk_chars(text: &str, limit: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(limit)
        .map(|c| c.iter().collect::<String>())
        .collect()
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Greedy accumulator joining pieces with a separator under a limit.
struct Packer {
    limit: usize,
    separator: &'static str,
    current: String,
    current_len: usize,
}

impl Packer {
    fn new(limit: usize, separator: &'static str) -> Self {
        Self {
            limit,
            separator,
            current: String::new(),
            current_len: 0,
        }
    }

    fn push(&mut self, piece: &str, out: &mut Vec<String>) {
        let piece_len = char_len(piece);
        if self.current.is_empty() {
            self.current.push_str(piece);
            self.current_len = piece_len;
            return;
        }

        let joined = self.current_len + char_len(self.separator) + piece_len;
        if joined <= self.limit {
            self.current.push_str(self.separator);
            self.current.push_str(piece);
            self.current_len = joined;
        } else {
            self.flush_into(out);
            self.current.push_str(piece);
            self.current_len = piece_len;
        }
    }

    fn flush_into(&mut self, out: &mut Vec<String>) {
        if !self.current.is_empty() {
            out.push(std::mem::take(&mut self.current));
            self.current_len = 0;
        }
    }
}
