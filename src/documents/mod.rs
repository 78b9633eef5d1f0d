//! Turning uploaded files into plain text.
//!
//! PDFs go through `pdf-extract`; everything else must be UTF-8 text.


use std::path::Path;
use tracing::{debug, warn};

use crate::{RagError, Result};

const PDF_MAGIC: &[u8] = b"%PDF-";
const UTF8_BOM: &str = "\u{feff}";

/// Raw text of an uploaded file. Only lives until it has been chunked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub filename: String,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Text,
}

impl DocumentKind {
    /// Decide from the file extension, falling back to the PDF magic bytes
    #[inline]
    pub fn detect(filename: &str, bytes: &[u8]) -> Self {
        let is_pdf_extension = Path::new(filename)
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

        if is_pdf_extension || bytes.starts_with(PDF_MAGIC) {
            Self::Pdf
        } else {
            Self::Text
        }
    }
}

/// Decode an uploaded byte stream
#[inline]
pub fn load_document(filename: &str, bytes: &[u8]) -> Result<Document> {
    let kind = DocumentKind::detect(filename, bytes);
    debug!(
        "Loading {} ({} bytes) as {:?}",
        filename,
        bytes.len(),
        kind
    );

    let text = match kind {
        DocumentKind::Pdf => extract_pdf_text(filename, bytes)?,
        DocumentKind::Text => {
            let text = std::str::from_utf8(bytes)
                .map_err(|e| RagError::document_load(filename, format!("not UTF-8 text: {}", e)))?;
            text.strip_prefix(UTF8_BOM).unwrap_or(text).to_string()
        }
    };

    Ok(Document {
        filename: filename.to_string(),
        text,
    })
}

/// Extract PDF text; some malformed PDFs panic inside `pdf-extract`
fn extract_pdf_text(filename: &str, bytes: &[u8]) -> Result<String> {
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        pdf_extract::extract_text_from_mem(bytes)
    }));

    match result {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(e)) => Err(RagError::document_load(
            filename,
            format!("unreadable PDF: {}", e),
        )),
        Err(panic) => {
            let reason = panic
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown error".to_string());
            warn!("PDF extraction of {} panicked: {}", filename, reason);
            Err(RagError::document_load(
                filename,
                format!("malformed PDF: {}", reason),
            ))
        }
    }
}

/// Read and decode a file from disk
#[inline]
pub fn load_document_file(path: &Path) -> Result<Document> {
    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    let bytes = std::fs::read(path).map_err(|e| RagError::document_load(&filename, e))?;
    load_document(&filename, &bytes)
}
