use crate::extractor::extract_pdf_text;
use crate::{Document, IngestError};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;

const KNOWN_EXTENSIONS: [&str; 3] = [".pdf", ".txt", ".md"];
const PLACEHOLDER: char = '_';
const FALLBACK_ID: &str = "document";

/// Turns a caller-supplied identifier (usually an upload's file name) into a
/// filesystem-safe storage key: a known extension is stripped and every
/// character outside `[A-Za-z0-9_-]` becomes `_`.
pub fn normalize_document_id(document_id: &str) -> String {
    let trimmed = document_id.trim();
    let lowered = trimmed.to_ascii_lowercase();
    let stem = KNOWN_EXTENSIONS
        .iter()
        .find(|extension| lowered.ends_with(*extension))
        .map(|extension| &trimmed[..trimmed.len() - extension.len()])
        .unwrap_or(trimmed);

    let normalized: String = stem
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '_' || ch == '-' {
                ch
            } else {
                PLACEHOLDER
            }
        })
        .collect();

    if normalized.is_empty() {
        FALLBACK_ID.to_string()
    } else {
        normalized
    }
}

pub fn digest_text(text: &str) -> String {
    digest_bytes(text.as_bytes())
}

pub(crate) fn digest_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Reads a resume from disk. The document id is the file name.
pub fn load_resume(path: &Path) -> Result<Document, IngestError> {
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| IngestError::MissingFileName(path.display().to_string()))?;

    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default();

    let text = match extension.as_str() {
        "pdf" => extract_pdf_text(path)?,
        "txt" | "md" => fs::read_to_string(path)?,
        other => {
            return Err(IngestError::UnsupportedFormat(format!(
                "{} (extension {other:?})",
                path.display()
            )))
        }
    };

    if text.trim().is_empty() {
        return Err(IngestError::EmptyDocument(path.display().to_string()));
    }

    Ok(Document::new(name, text))
}
