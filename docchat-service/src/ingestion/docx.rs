//! DOCX text extraction from `word/document.xml`.

use std::io::{Cursor, Read};

use quick_xml::Reader;
use quick_xml::events::Event;

use super::Segment;
use crate::error::{ProcessingError, ServiceResult};

/// Maximum decompressed bytes read from the document part (zip-bomb guard).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

const DOCUMENT_PART: &str = "word/document.xml";

fn ooxml_error(message: impl std::fmt::Display) -> ProcessingError {
    ProcessingError::ExtractionFailed {
        message: format!("The DOCX file could not be read: {}", message),
    }
}

pub fn extract_docx(bytes: &[u8]) -> ServiceResult<Vec<Segment>> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).map_err(ooxml_error)?;

    let entry = archive
        .by_name(DOCUMENT_PART)
        .map_err(|_| ooxml_error(format!("{} not found", DOCUMENT_PART)))?;

    let mut xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut xml)
        .map_err(ooxml_error)?;
    if xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ooxml_error(format!("{} exceeds size limit", DOCUMENT_PART)).into());
    }

    let text = paragraphs_text(&xml)?;
    Ok(vec![Segment::plain(text)])
}

/// Join `w:t` runs, one line per `w:p` paragraph.
fn paragraphs_text(xml: &[u8]) -> Result<String, ProcessingError> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut out = String::new();
    let mut paragraph = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    let line = paragraph.trim();
                    if !line.is_empty() {
                        out.push_str(line);
                        out.push('\n');
                    }
                    paragraph.clear();
                }
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"tab" => paragraph.push('\t'),
                b"br" | b"cr" => paragraph.push('\n'),
                _ => {}
            },
            Ok(Event::Text(t)) if in_text => {
                let text = t.unescape().map_err(ooxml_error)?;
                paragraph.push_str(&text);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ooxml_error(e)),
            _ => {}
        }
        buf.clear();
    }

    // Text outside a closed paragraph
    if !paragraph.trim().is_empty() {
        out.push_str(paragraph.trim());
    }

    Ok(out.trim_end().to_string())
}

#[cfg(test)]
pub(crate) fn sample_docx(paragraphs: &[&str]) -> Vec<u8> {
    use std::io::Write;

    let body: String = paragraphs
        .iter()
        .map(|p| format!(r#"<w:p><w:r><w:t xml:space="preserve">{}</w:t></w:r></w:p>"#, p))
        .collect();
    let document = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{}</w:body></w:document>"#,
        body
    );

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut zip = zip::ZipWriter::new(&mut cursor);
        let options = zip::write::SimpleFileOptions::default();
        zip.start_file(DOCUMENT_PART, options).unwrap();
        zip.write_all(document.as_bytes()).unwrap();
        zip.finish().unwrap();
    }
    cursor.into_inner()
}
