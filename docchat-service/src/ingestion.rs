//! Document text extraction.
//!
//! Turns uploaded bytes into ordered text segments carrying page or section
//! provenance. Formats are PDF, DOCX, plain text and Markdown. Only text is
//! extracted; embedded images are ignored.

mod docx;
mod markdown;
mod pdf;

#[cfg(test)]
pub(crate) use docx::sample_docx;
#[cfg(test)]
pub(crate) use pdf::sample_pdf;

use std::path::Path;

use serde::Serialize;
use tracing::{debug, info};

use crate::error::{ProcessingError, ServiceResult};

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Supported input formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentFormat {
    Pdf,
    Docx,
    Text,
    Markdown,
}

impl DocumentFormat {
    /// Determine the format from the file extension, falling back to the
    /// declared MIME type when the extension is missing or unknown.
    pub fn detect(filename: &str, content_type: Option<&str>) -> Result<Self, ProcessingError> {
        let extension = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase());

        if let Some(format) = extension.as_deref().and_then(Self::from_extension) {
            return Ok(format);
        }

        if let Some(format) = content_type.and_then(Self::from_mime) {
            return Ok(format);
        }

        Err(ProcessingError::UnsupportedFormat {
            format: extension
                .or_else(|| content_type.map(str::to_string))
                .unwrap_or_else(|| "unknown".to_string()),
        })
    }

    fn from_extension(extension: &str) -> Option<Self> {
        match extension {
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            "txt" | "text" => Some(Self::Text),
            "md" | "markdown" => Some(Self::Markdown),
            _ => None,
        }
    }

    fn from_mime(content_type: &str) -> Option<Self> {
        let mime: mime::Mime = content_type.parse().ok()?;
        match mime.essence_str() {
            MIME_PDF => Some(Self::Pdf),
            MIME_DOCX => Some(Self::Docx),
            "text/plain" => Some(Self::Text),
            "text/markdown" | "text/x-markdown" => Some(Self::Markdown),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::Text => "text",
            Self::Markdown => "markdown",
        }
    }
}

/// A contiguous piece of extracted text
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub text: String,
    /// 1-based page for paginated formats
    pub page_number: Option<u32>,
    pub section_title: Option<String>,
}

impl Segment {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            page_number: None,
            section_title: None,
        }
    }
}

/// Result of extraction, segments in document order
#[derive(Debug, Clone)]
pub struct ExtractedDocument {
    pub format: DocumentFormat,
    pub segments: Vec<Segment>,
}

impl ExtractedDocument {
    pub fn char_count(&self) -> usize {
        self.segments.iter().map(|s| s.text.chars().count()).sum()
    }
}

/// Extract text segments from an uploaded document.
///
/// The size ceiling is checked before any parsing. Segments with no visible
/// text are dropped; a document left with none is an extraction failure.
pub fn extract_document(
    bytes: &[u8],
    filename: &str,
    content_type: Option<&str>,
    max_bytes: u64,
) -> ServiceResult<ExtractedDocument> {
    let size = bytes.len() as u64;
    if size > max_bytes {
        return Err(ProcessingError::FileTooLarge {
            size,
            max: max_bytes,
        }
        .into());
    }

    let format = DocumentFormat::detect(filename, content_type)?;
    debug!(filename, format = format.as_str(), size, "Extracting document");

    let segments = match format {
        DocumentFormat::Pdf => pdf::extract_pdf(bytes)?,
        DocumentFormat::Docx => docx::extract_docx(bytes)?,
        DocumentFormat::Text => markdown::extract_text(bytes)?,
        DocumentFormat::Markdown => markdown::extract_markdown(bytes)?,
    };

    let segments: Vec<Segment> = segments
        .into_iter()
        .filter(|s| !s.text.trim().is_empty())
        .collect();

    if segments.is_empty() {
        return Err(ProcessingError::ExtractionFailed {
            message: "The document is empty or its content could not be extracted.".to_string(),
        }
        .into());
    }

    let document = ExtractedDocument { format, segments };
    info!(
        filename,
        format = format.as_str(),
        segments = document.segments.len(),
        chars = document.char_count(),
        "Extracted document text"
    );

    Ok(document)
}

/// Decode bytes as UTF-8, rejecting invalid sequences.
fn decode_utf8(bytes: &[u8]) -> Result<String, ProcessingError> {
    String::from_utf8(bytes.to_vec()).map_err(|e| ProcessingError::ExtractionFailed {
        message: format!("File is not valid UTF-8 text: {}", e.utf8_error()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;

    #[test]
    fn test_detect_by_extension() {
        assert_eq!(
            DocumentFormat::detect("Report.PDF", None).unwrap(),
            DocumentFormat::Pdf
        );
        assert_eq!(
            DocumentFormat::detect("notes.txt", Some("application/octet-stream")).unwrap(),
            DocumentFormat::Text
        );
        assert_eq!(
            DocumentFormat::detect("readme.md", None).unwrap(),
            DocumentFormat::Markdown
        );
        assert_eq!(
            DocumentFormat::detect("letter.docx", None).unwrap(),
            DocumentFormat::Docx
        );
    }

    #[test]
    fn test_detect_falls_back_to_mime() {
        assert_eq!(
            DocumentFormat::detect("upload", Some("application/pdf")).unwrap(),
            DocumentFormat::Pdf
        );
        assert_eq!(
            DocumentFormat::detect("upload.bin", Some("text/plain; charset=utf-8")).unwrap(),
            DocumentFormat::Text
        );
    }

    #[test]
    fn test_detect_rejects_unknown() {
        let err = DocumentFormat::detect("photo.png", Some("image/png")).unwrap_err();
        assert!(matches!(err, ProcessingError::UnsupportedFormat { ref format } if format == "png"));
        assert!(DocumentFormat::detect("noext", None).is_err());
    }

    #[test]
    fn test_size_checked_before_format() {
        let bytes = vec![0u8; 11];
        let err = extract_document(&bytes, "image.png", None, 10).unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Processing(ProcessingError::FileTooLarge { size: 11, max: 10 })
        ));
    }

    #[test]
    fn test_size_at_limit_is_accepted() {
        let doc = extract_document(b"0123456789", "a.txt", None, 10).unwrap();
        assert_eq!(doc.char_count(), 10);
    }

    #[test]
    fn test_text_document() {
        let doc = extract_document(b"Hello world.\n\nSecond paragraph.", "a.txt", None, 1024)
            .unwrap();
        assert_eq!(doc.format, DocumentFormat::Text);
        assert_eq!(doc.segments.len(), 1);
        assert!(doc.segments[0].text.contains("Second paragraph."));
    }

    #[test]
    fn test_whitespace_only_document_fails() {
        let err = extract_document(b"   \n\t  ", "blank.txt", None, 1024).unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Processing(ProcessingError::ExtractionFailed { .. })
        ));
    }

    #[test]
    fn test_invalid_utf8_fails() {
        let err = extract_document(&[0x66, 0x6f, 0xff, 0xfe], "a.txt", None, 1024).unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Processing(ProcessingError::ExtractionFailed { .. })
        ));
    }

    #[test]
    fn test_corrupt_pdf_fails() {
        let err = extract_document(b"this is not a pdf at all", "broken.pdf", None, 1024)
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Processing(ProcessingError::ExtractionFailed { .. })
        ));
    }
}
