//! Overlapping character-window text splitter.
//!
//! Windows are at most `chunk_size` characters. Each window is cut at the
//! strongest boundary found in its second half (paragraph break, line break,
//! sentence end, space) before falling back to a hard cut. The next window
//! starts up to `chunk_overlap` characters before the cut, on a word
//! boundary when there is one, and always strictly after the previous start.

use serde::Serialize;

use crate::ingestion::Segment;

/// Boundaries in order of preference; the cut falls after the separator.
const SEPARATORS: [&str; 4] = ["\n\n", "\n", ". ", " "];

/// Chars between segments when computing document offsets.
const SEGMENT_GAP: usize = 2;

/// A chunk of document text with its provenance
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextChunk {
    pub content: String,
    pub chunk_index: usize,
    pub page_number: Option<u32>,
    pub section_title: Option<String>,
    /// Offset of the first char, counted over the whole document
    pub char_offset: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl TextSplitter {
    /// Overlap is clamped below the chunk size so splitting always advances.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size - 1),
        }
    }

    /// Split a single text into `(char_offset, content)` pairs.
    pub fn split_text(&self, text: &str) -> Vec<(usize, String)> {
        let chars: Vec<char> = text.chars().collect();
        let len = chars.len();
        let mut pieces = Vec::new();
        let mut start = 0;

        while start < len {
            let end = (start + self.chunk_size).min(len);
            let cut = if end == len {
                len
            } else {
                find_cut(&chars, start, end)
            };

            let window = &chars[start..cut];
            let leading = window.iter().take_while(|c| c.is_whitespace()).count();
            let content: String = window.iter().collect::<String>().trim().to_string();
            if !content.is_empty() {
                pieces.push((start + leading, content));
            }

            if cut >= len {
                break;
            }
            let back = cut.saturating_sub(self.chunk_overlap).max(start + 1);
            start = overlap_start(&chars, back, cut);
        }

        pieces
    }

    /// Split every segment of a document, numbering chunks across the whole document.
    pub fn split_segments(&self, segments: &[Segment]) -> Vec<TextChunk> {
        let mut chunks = Vec::new();
        let mut base_offset = 0;

        for segment in segments {
            for (offset, content) in self.split_text(&segment.text) {
                chunks.push(TextChunk {
                    content,
                    chunk_index: chunks.len(),
                    page_number: segment.page_number,
                    section_title: segment.section_title.clone(),
                    char_offset: base_offset + offset,
                });
            }
            base_offset += segment.text.chars().count() + SEGMENT_GAP;
        }

        chunks
    }
}

/// Start of the next window: `back`, moved forward to a word boundary when it
/// lands inside a word. Unbroken text keeps `back`.
fn overlap_start(chars: &[char], back: usize, cut: usize) -> usize {
    if back == 0 || chars[back - 1].is_whitespace() || chars[back].is_whitespace() {
        return back;
    }
    chars[back..cut]
        .iter()
        .position(|c| c.is_whitespace())
        .map_or(back, |i| back + i)
}

/// Position just past the best separator in the second half of `chars[start..end]`,
/// or `end` when there is none.
fn find_cut(chars: &[char], start: usize, end: usize) -> usize {
    let floor = start + (end - start) / 2;

    for separator in SEPARATORS {
        let sep: Vec<char> = separator.chars().collect();
        if end < sep.len() {
            continue;
        }
        let mut i = end - sep.len();
        while i >= floor && i > start {
            if chars[i..i + sep.len()] == sep[..] {
                return i + sep.len();
            }
            i -= 1;
        }
    }

    end
}
