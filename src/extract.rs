//! Best-effort text extraction from supplementary PDF documents.
//!
//! Extraction failures are not raised: [`extract`] turns them into an inline
//! marker so they surface inside the compiled prompt instead of aborting the
//! analysis.

use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use thiserror::Error;

/// Prefix of the inline marker produced when a document cannot be read.
pub const EXTRACTION_ERROR_PREFIX: &str = "Error reading PDF file: ";

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    PdfParsing(String),
    #[error("PDF parser aborted: {0}")]
    Aborted(String),
}

/// Page-wise text source for a document.
pub trait TextExtractor: Send + Sync {
    fn extract_pages(&self, path: &Path) -> Result<Vec<String>, ExtractionError>;
}

/// Extractor for PDFs with an embedded text layer.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfTextExtractor;

impl TextExtractor for PdfTextExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<String>, ExtractionError> {
        let bytes = fs::read(path)?;
        // The parser can panic on malformed font tables; treat that as a
        // parse failure rather than losing the worker thread.
        let parsed = panic::catch_unwind(AssertUnwindSafe(|| {
            pdf_extract::extract_text_from_mem_by_pages(&bytes)
        }))
        .map_err(|payload| ExtractionError::Aborted(panic_message(payload.as_ref())))?;
        parsed.map_err(|err| ExtractionError::PdfParsing(err.to_string()))
    }
}

/// Concatenate the non-empty pages of `path`, or return the inline error marker.
pub fn extract(extractor: &dyn TextExtractor, path: &Path) -> String {
    match extractor.extract_pages(path) {
        Ok(pages) => {
            let total = pages.len();
            let text: String = pages
                .into_iter()
                .filter(|page| !page.is_empty())
                .collect();
            tracing::debug!(
                path = %path.display(),
                pages = total,
                chars = text.len(),
                "extracted document text"
            );
            text
        }
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "document extraction failed");
            format!("{EXTRACTION_ERROR_PREFIX}{err}")
        }
    }
}

/// Extract the selected document, or the empty string when none is selected.
pub fn extract_optional(extractor: &dyn TextExtractor, path: Option<&Path>) -> String {
    path.map(|path| extract(extractor, path)).unwrap_or_default()
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "unknown panic".to_string()
    }
}
