//! Document loading: turn uploaded bytes into plain UTF-8 text.
//!
//! The loader picks a format from the file extension and supports plain
//! text (`.txt`, `.md`), PDF, and Word (`.docx`) documents.

use std::io::Read;
use std::path::Path;

use crate::error::{IngestError, LoaderError};

pub const MIME_TEXT: &str = "text/plain";
pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Map a file name to the content type the loader understands.
pub fn content_type_for(name: &str) -> Result<&'static str, LoaderError> {
    let ext = Path::new(name)
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "txt" | "md" | "markdown" | "text" => Ok(MIME_TEXT),
        "pdf" => Ok(MIME_PDF),
        "docx" => Ok(MIME_DOCX),
        "" => Err(LoaderError::UnsupportedFileType(name.to_string())),
        other => Err(LoaderError::UnsupportedFileType(other.to_string())),
    }
}

/// Load the text of a persisted upload.
pub fn load_file(path: &Path) -> Result<String, IngestError> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let content_type = content_type_for(&name)?;
    let bytes = std::fs::read(path)?;
    Ok(extract_text(&bytes, content_type)?)
}

/// Extract plain text from in-memory content of a known content type.
pub fn extract_text(bytes: &[u8], content_type: &str) -> Result<String, LoaderError> {
    match content_type {
        MIME_TEXT => Ok(String::from_utf8(bytes.to_vec())?),
        MIME_PDF => extract_pdf(bytes),
        MIME_DOCX => extract_docx(bytes),
        _ => Err(LoaderError::UnsupportedFileType(content_type.to_string())),
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<String, LoaderError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| LoaderError::Pdf(e.to_string()))
}

fn extract_docx(bytes: &[u8]) -> Result<String, LoaderError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| LoaderError::Ooxml(e.to_string()))?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|_| LoaderError::Ooxml("word/document.xml not found".to_string()))?;

    let mut doc_xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut doc_xml)
        .map_err(|e| LoaderError::Ooxml(e.to_string()))?;
    if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(LoaderError::Ooxml(
            "word/document.xml exceeds size limit".to_string(),
        ));
    }
    docx_paragraphs(&doc_xml)
}

/// Collect `<w:t>` runs, one output line per `<w:p>` paragraph.
///
/// Paragraph breaks matter here: the splitter cuts on newlines, so a docx
/// flattened into one line would come out as a single oversized chunk.
fn docx_paragraphs(xml: &[u8]) -> Result<String, LoaderError> {
    use quick_xml::events::Event;

    let mut out = String::new();
    let mut paragraph = String::new();
    let mut in_text = false;
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::Text(te)) if in_text => {
                let text = te
                    .unescape()
                    .map_err(|e| LoaderError::Ooxml(e.to_string()))?;
                paragraph.push_str(&text);
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    if !paragraph.trim().is_empty() {
                        out.push_str(paragraph.trim());
                        out.push('\n');
                    }
                    paragraph.clear();
                }
                _ => {}
            },
            Ok(Event::Empty(e)) if e.local_name().as_ref() == b"br" => paragraph.push(' '),
            Ok(Event::Eof) => break,
            Err(e) => return Err(LoaderError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    if !paragraph.trim().is_empty() {
        out.push_str(paragraph.trim());
        out.push('\n');
    }
    Ok(out)
}
