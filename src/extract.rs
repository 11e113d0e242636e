//! Text and metadata extraction for uploaded documents (PDF, DOCX, TXT).
//!
//! Upload handling supplies raw bytes plus the original file name; this
//! module returns plain UTF-8 text ready for preprocessing. Extraction never
//! panics on malformed input: every failure is a typed error the caller maps
//! to an HTTP status.

use std::io::Read;

use chrono::Utc;

use crate::models::ChunkMetadata;

/// File extensions accepted for upload, without the dot.
pub const ALLOWED_EXTENSIONS: &[&str] = &["pdf", "docx", "txt"];

/// Maximum decompressed bytes read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug)]
pub enum ExtractError {
    UnsupportedExtension(String),
    Pdf(String),
    Docx(String),
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::UnsupportedExtension(ext) => write!(
                f,
                "Unsupported file type: .{}. Supported types: .pdf, .docx, .txt",
                ext
            ),
            ExtractError::Pdf(e) => write!(f, "PDF extraction failed: {}", e),
            ExtractError::Docx(e) => write!(f, "DOCX extraction failed: {}", e),
        }
    }
}

impl std::error::Error for ExtractError {}

/// Lowercased extension of a file name, without the dot.
pub fn file_extension(filename: &str) -> String {
    filename
        .rsplit('.')
        .next()
        .filter(|ext| *ext != filename)
        .unwrap_or("")
        .to_ascii_lowercase()
}

/// Whether the file name carries an accepted extension (case-insensitive).
pub fn is_allowed(filename: &str) -> bool {
    ALLOWED_EXTENSIONS.contains(&file_extension(filename).as_str())
}

/// Extract plain text from document bytes, dispatching on the extension.
pub fn extract_text(bytes: &[u8], filename: &str) -> Result<String, ExtractError> {
    match file_extension(filename).as_str() {
        "pdf" => extract_pdf(bytes),
        "docx" => extract_docx(bytes),
        "txt" => Ok(extract_txt(bytes)),
        other => Err(ExtractError::UnsupportedExtension(other.to_string())),
    }
}

/// Build document-level metadata for an upload.
pub fn file_metadata(filename: &str, size: u64) -> ChunkMetadata {
    let ext = file_extension(filename);
    ChunkMetadata {
        filename: filename.to_string(),
        filetype: if ext.is_empty() {
            String::new()
        } else {
            format!(".{}", ext)
        },
        size,
        date: Utc::now().to_rfc3339(),
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}

/// Decode text bytes as UTF-8, falling back to Latin-1 when invalid.
fn extract_txt(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

/// Pull paragraph text out of `word/document.xml` inside the OOXML archive.
fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Docx(e.to_string()))?;

    let mut doc_xml = Vec::new();
    {
        let entry = archive
            .by_name("word/document.xml")
            .map_err(|_| ExtractError::Docx("word/document.xml not found".to_string()))?;
        entry
            .take(MAX_XML_ENTRY_BYTES)
            .read_to_end(&mut doc_xml)
            .map_err(|e| ExtractError::Docx(e.to_string()))?;
        if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
            return Err(ExtractError::Docx(
                "word/document.xml exceeds size limit".to_string(),
            ));
        }
    }

    extract_paragraph_text(&doc_xml)
}

/// Collect `w:t` run text, joining paragraphs with newlines.
fn extract_paragraph_text(xml: &[u8]) -> Result<String, ExtractError> {
    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                if e.local_name().as_ref() == b"t" {
                    if let Ok(quick_xml::events::Event::Text(te)) = reader.read_event_into(&mut buf)
                    {
                        out.push_str(te.unescape().unwrap_or_default().as_ref());
                    }
                }
            }
            Ok(quick_xml::events::Event::End(e)) => {
                if e.local_name().as_ref() == b"p" && !out.is_empty() && !out.ends_with('\n') {
                    out.push('\n');
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(ExtractError::Docx(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(out.trim_end().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_matching_is_case_insensitive() {
        assert!(is_allowed("Report.PDF"));
        assert!(is_allowed("notes.Txt"));
        assert!(is_allowed("minutes.docx"));
        assert!(!is_allowed("payload.exe"));
        assert!(!is_allowed("no_extension"));
    }

    #[test]
    fn unsupported_extension_returns_typed_error() {
        let err = extract_text(b"MZ", "payload.exe").unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedExtension(_)));
        assert!(err.to_string().contains(".pdf, .docx, .txt"));
    }

    #[test]
    fn invalid_pdf_returns_error() {
        let err = extract_text(b"not a pdf", "file.pdf").unwrap_err();
        assert!(matches!(err, ExtractError::Pdf(_)));
    }

    #[test]
    fn invalid_docx_returns_error() {
        let err = extract_text(b"not a zip", "file.docx").unwrap_err();
        assert!(matches!(err, ExtractError::Docx(_)));
    }

    #[test]
    fn txt_decodes_utf8() {
        let text = extract_text("héllo wörld".as_bytes(), "a.txt").unwrap();
        assert_eq!(text, "héllo wörld");
    }

    #[test]
    fn txt_falls_back_to_latin1() {
        // 0xE9 is é in Latin-1 but invalid as a standalone UTF-8 byte.
        let bytes = vec![b'c', b'a', b'f', 0xE9];
        let text = extract_text(&bytes, "a.txt").unwrap();
        assert_eq!(text, "café");
    }

    #[test]
    fn metadata_carries_name_type_and_size() {
        let meta = file_metadata("Audit Report.PDF", 2048);
        assert_eq!(meta.filename, "Audit Report.PDF");
        assert_eq!(meta.filetype, ".pdf");
        assert_eq!(meta.size, 2048);
        assert!(!meta.date.is_empty());
    }

    #[test]
    fn docx_paragraphs_join_with_newlines() {
        let xml = br#"<w:document xmlns:w="ns"><w:body>
            <w:p><w:r><w:t>First paragraph.</w:t></w:r></w:p>
            <w:p><w:r><w:t>Second paragraph.</w:t></w:r></w:p>
        </w:body></w:document>"#;
        let text = extract_paragraph_text(xml).unwrap();
        assert_eq!(text, "First paragraph.\nSecond paragraph.");
    }
}
