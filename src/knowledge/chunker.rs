//! Text chunking for the knowledge base.
//!
//! Documents are split into overlapping chunks by recursive descent over a
//! separator preference order: paragraph breaks first, then line breaks,
//! then spaces, then single characters as a last resort. Small pieces are
//! greedily re-merged (joined by the separator they were split on) up to the
//! policy's chunk size, carrying a tail of the previous chunk into the next
//! one as overlap.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

const SEPARATORS: [&str; 3] = ["\n\n", "\n", " "];

/// Chunk size and overlap, both in characters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkPolicy {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl ChunkPolicy {
    /// Policy for the seed document rebuild.
    pub fn seed() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 100,
        }
    }

    /// Policy for ingested uploads.
    pub fn upload() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

impl Default for ChunkPolicy {
    fn default() -> Self {
        Self::seed()
    }
}

/// Splits `text` into chunks under the given policy.
///
/// Deterministic: the same input and policy always produce the same chunks.
/// Emitted chunks are trimmed; chunks that trim to nothing are dropped, so
/// empty or whitespace-only input yields an empty list.
pub fn split_text(text: &str, policy: &ChunkPolicy) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }
    let chunk_size = policy.chunk_size.max(1);
    split_recursive(text, &SEPARATORS, chunk_size, policy.chunk_overlap)
}

fn split_recursive(
    text: &str,
    separators: &[&str],
    chunk_size: usize,
    chunk_overlap: usize,
) -> Vec<String> {
    // Coarsest separator actually present in the text; none left means
    // character-level splitting.
    let (separator, finer) = match separators.iter().position(|sep| text.contains(sep)) {
        Some(i) => (separators[i], &separators[i + 1..]),
        None => ("", &[] as &[&str]),
    };

    let pieces = split_on(text, separator);

    let mut chunks = Vec::new();
    let mut pending: Vec<String> = Vec::new();
    for piece in pieces {
        if char_len(&piece) < chunk_size {
            pending.push(piece);
            continue;
        }

        if !pending.is_empty() {
            merge_pieces(&mut chunks, &pending, separator, chunk_size, chunk_overlap);
            pending.clear();
        }

        if separator.is_empty() {
            push_trimmed(&mut chunks, &piece);
        } else {
            chunks.extend(split_recursive(&piece, finer, chunk_size, chunk_overlap));
        }
    }
    if !pending.is_empty() {
        merge_pieces(&mut chunks, &pending, separator, chunk_size, chunk_overlap);
    }
    chunks
}

fn split_on(text: &str, separator: &str) -> Vec<String> {
    if separator.is_empty() {
        text.chars().map(String::from).collect()
    } else {
        text.split(separator)
            .filter(|piece| !piece.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Greedily packs small pieces into chunks of at most `chunk_size`
/// characters. When a chunk is emitted, leading pieces are dropped from the
/// window until at most `chunk_overlap` characters remain to seed the next
/// chunk.
fn merge_pieces(
    chunks: &mut Vec<String>,
    pieces: &[String],
    separator: &str,
    chunk_size: usize,
    chunk_overlap: usize,
) {
    let sep_len = char_len(separator);
    let mut window: VecDeque<&str> = VecDeque::new();
    let mut total = 0usize;

    for piece in pieces {
        let piece_len = char_len(piece);
        let joined = if window.is_empty() { 0 } else { sep_len };

        if total + piece_len + joined > chunk_size && !window.is_empty() {
            emit_window(chunks, &window, separator);

            while !window.is_empty()
                && (total > chunk_overlap
                    || (total + piece_len + if window.is_empty() { 0 } else { sep_len }
                        > chunk_size
                        && total > 0))
            {
                let dropped_sep = if window.len() > 1 { sep_len } else { 0 };
                if let Some(first) = window.pop_front() {
                    total = total.saturating_sub(char_len(first) + dropped_sep);
                }
            }
        }

        window.push_back(piece);
        total += piece_len + if window.len() > 1 { sep_len } else { 0 };
    }

    emit_window(chunks, &window, separator);
}

fn emit_window(chunks: &mut Vec<String>, window: &VecDeque<&str>, separator: &str) {
    if window.is_empty() {
        return;
    }
    let joined = window
        .iter()
        .copied()
        .collect::<Vec<_>>()
        .join(separator);
    push_trimmed(chunks, &joined);
}

fn push_trimmed(chunks: &mut Vec<String>, candidate: &str) {
    let trimmed = candidate.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unbroken_text(len: usize) -> String {
        (0..len)
            .map(|i| char::from(b'a' + (i % 23) as u8))
            .collect()
    }

    #[test]
    fn empty_and_whitespace_input_yield_nothing() {
        let policy = ChunkPolicy::seed();
        assert!(split_text("", &policy).is_empty());
        assert!(split_text("   \n\n \t ", &policy).is_empty());
    }

    #[test]
    fn short_input_is_a_single_trimmed_chunk() {
        let policy = ChunkPolicy::seed();
        let chunks = split_text("  Contracts require offer and acceptance.  \n", &policy);
        assert_eq!(chunks, vec!["Contracts require offer and acceptance."]);
    }

    #[test]
    fn paragraphs_split_before_lines_and_spaces() {
        let policy = ChunkPolicy {
            chunk_size: 80,
            chunk_overlap: 10,
        };
        let text = "First paragraph about contract law and its formation rules.\n\nSecond paragraph about negligence and the duty of care owed.";
        let chunks = split_text(text, &policy);

        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].starts_with("First paragraph"));
        assert!(chunks[1].starts_with("Second paragraph"));
        assert!(chunks.iter().all(|c| c.chars().count() <= 80));
    }

    #[test]
    fn oversized_paragraph_falls_back_to_word_windows() {
        let policy = ChunkPolicy {
            chunk_size: 40,
            chunk_overlap: 10,
        };
        let text = "one two three four five six seven eight nine ten eleven twelve";
        let chunks = split_text(text, &policy);

        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.chars().count() <= 40));
        // Word boundaries are preserved by the space separator.
        assert!(chunks.iter().all(|c| !c.starts_with(' ') && !c.ends_with(' ')));
    }

    #[test]
    fn unbroken_text_becomes_overlapping_windows() {
        let policy = ChunkPolicy {
            chunk_size: 500,
            chunk_overlap: 100,
        };
        let text = unbroken_text(1200);
        let chunks = split_text(&text, &policy);

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0], text[0..500]);
        assert_eq!(chunks[1], text[400..900]);
        assert_eq!(chunks[2], text[800..1200]);

        // Every non-final chunk shares its last 100 chars with the head of
        // the next one, and stripping that overlap reconstructs the input.
        let mut rebuilt = chunks[0].clone();
        for pair in chunks.windows(2) {
            let tail = &pair[0][pair[0].len() - 100..];
            let head = &pair[1][..100];
            assert_eq!(tail, head);
            rebuilt.push_str(&pair[1][100..]);
        }
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn splitting_is_deterministic() {
        let policy = ChunkPolicy::upload();
        let text = "alpha beta gamma\n\ndelta epsilon\nzeta ".repeat(40);
        assert_eq!(split_text(&text, &policy), split_text(&text, &policy));
    }

    #[test]
    fn degenerate_policy_still_terminates() {
        let policy = ChunkPolicy {
            chunk_size: 1,
            chunk_overlap: 5,
        };
        let chunks = split_text("ab cd", &policy);
        assert!(!chunks.is_empty());
        assert!(chunks.iter().all(|c| c.chars().count() == 1));
    }

    #[test]
    fn size_limit_counts_characters_not_bytes() {
        let policy = ChunkPolicy {
            chunk_size: 10,
            chunk_overlap: 2,
        };
        let text = "契約 には 申込 と 承諾 が 必要 です よ ね".repeat(3);
        let chunks = split_text(&text, &policy);
        assert!(chunks.iter().all(|c| c.chars().count() <= 10));
    }
}
