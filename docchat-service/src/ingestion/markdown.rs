//! Plain text and Markdown extraction.

use super::{Segment, decode_utf8};
use crate::error::ServiceResult;

/// Extract a Markdown file, one segment per heading-delimited section.
pub fn extract_markdown(bytes: &[u8]) -> ServiceResult<Vec<Segment>> {
    let content = decode_utf8(bytes)?;
    Ok(parse_markdown_sections(&content))
}

/// Parse markdown into sections based on headers.
pub fn parse_markdown_sections(content: &str) -> Vec<Segment> {
    let mut sections = Vec::new();
    let mut current_section = String::new();
    let mut current_title: Option<String> = None;
    let mut in_code_block = false;

    for line in content.lines() {
        if line.trim_start().starts_with("```") {
            in_code_block = !in_code_block;
        }

        if !in_code_block && is_heading(line) {
            if !current_section.trim().is_empty() {
                sections.push(Segment {
                    text: current_section.trim().to_string(),
                    page_number: None,
                    section_title: current_title.clone(),
                });
            }
            current_section.clear();

            current_title = Some(line.trim_start_matches('#').trim().to_string())
                .filter(|title| !title.is_empty());
            // Keep the heading text searchable
            current_section.push_str(line.trim());
            current_section.push('\n');
        } else {
            current_section.push_str(line);
            current_section.push('\n');
        }
    }

    if !current_section.trim().is_empty() {
        sections.push(Segment {
            text: current_section.trim().to_string(),
            page_number: None,
            section_title: current_title,
        });
    }

    sections
}

/// ATX heading: 1-6 `#` followed by a space or end of line.
fn is_heading(line: &str) -> bool {
    let hashes = line.chars().take_while(|c| *c == '#').count();
    (1..=6).contains(&hashes)
        && line[hashes..]
            .chars()
            .next()
            .is_none_or(|c| c.is_whitespace())
}

/// Extract content from a plain text file.
pub fn extract_text(bytes: &[u8]) -> ServiceResult<Vec<Segment>> {
    let content = decode_utf8(bytes)?;
    Ok(vec![Segment::plain(content.trim())])
}
