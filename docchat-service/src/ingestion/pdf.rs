//! PDF text extraction.

use std::panic::{AssertUnwindSafe, catch_unwind};

use tracing::{debug, warn};

use super::Segment;
use crate::error::{ProcessingError, ServiceResult};

/// Extract one segment per page. Empty pages are kept here and dropped by the caller.
pub fn extract_pdf(bytes: &[u8]) -> ServiceResult<Vec<Segment>> {
    // The parser can panic on malformed input
    let pages = catch_unwind(AssertUnwindSafe(|| {
        pdf_extract::extract_text_from_mem_by_pages(bytes)
    }))
    .map_err(|_| {
        warn!("PDF parser panicked");
        ProcessingError::ExtractionFailed {
            message: "The PDF file is corrupted or could not be parsed.".to_string(),
        }
    })?
    .map_err(|e| {
        warn!(error = %e, "Failed to parse PDF");
        ProcessingError::ExtractionFailed {
            message: format!("The PDF file could not be parsed: {}", e),
        }
    })?;

    debug!(pages = pages.len(), "Parsed PDF");

    Ok(pages
        .into_iter()
        .enumerate()
        .map(|(index, text)| Segment {
            text: normalize_page_text(&text),
            page_number: Some(index as u32 + 1),
            section_title: None,
        })
        .collect())
}

/// Collapse runs of blank lines and trailing spaces left by the layout pass.
fn normalize_page_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut blank_run = 0;

    for line in text.lines() {
        let line = line.trim_end();
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run == 1 && !out.is_empty() {
                out.push('\n');
            }
            continue;
        }
        blank_run = 0;
        out.push_str(line);
        out.push('\n');
    }

    out.trim().to_string()
}

/// Build a minimal text-only PDF with one page per entry.
#[cfg(test)]
pub(crate) fn sample_pdf(pages: &[&str]) -> Vec<u8> {
    let page_count = pages.len();
    let font_id = 3 + 2 * page_count;
    let mut objects: Vec<String> = Vec::new();

    objects.push("<< /Type /Catalog /Pages 2 0 R >>".to_string());
    let kids = (0..page_count)
        .map(|i| format!("{} 0 R", 3 + 2 * i))
        .collect::<Vec<_>>()
        .join(" ");
    objects.push(format!(
        "<< /Type /Pages /Kids [{}] /Count {} >>",
        kids, page_count
    ));

    for (i, text) in pages.iter().enumerate() {
        let escaped = text
            .replace('\\', "\\\\")
            .replace('(', "\\(")
            .replace(')', "\\)");
        let stream = format!("BT /F1 12 Tf 72 720 Td ({}) Tj ET", escaped);
        objects.push(format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Resources << /Font << /F1 {} 0 R >> >> /Contents {} 0 R >>",
            font_id,
            4 + 2 * i
        ));
        objects.push(format!(
            "<< /Length {} >>\nstream\n{}\nendstream",
            stream.len(),
            stream
        ));
    }

    objects.push(
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>"
            .to_string(),
    );

    let mut out = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, body).as_bytes());
    }

    let xref_offset = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n", objects.len() + 1).as_bytes());
    out.extend_from_slice(b"0000000000 65535 f \n");
    for offset in offsets {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref_offset
        )
        .as_bytes(),
    );

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_pages_in_order() {
        let pdf = sample_pdf(&["Lighthouse keepers log the weather", "Storms arrive in autumn"]);
        let segments = extract_pdf(&pdf).unwrap();

        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].page_number, Some(1));
        assert_eq!(segments[1].page_number, Some(2));
        assert!(segments[0].text.contains("Lighthouse"));
        assert!(segments[1].text.contains("autumn"));
    }

    #[test]
    fn test_garbage_is_extraction_failure() {
        assert!(extract_pdf(b"%PDF-1.4\nnot really").is_err());
        assert!(extract_pdf(&[]).is_err());
    }

    #[test]
    fn test_normalize_page_text() {
        let text = "  first line  \n\n\n\nsecond line\n   \n";
        assert_eq!(normalize_page_text(text), "first line\n\nsecond line");
    }
}
