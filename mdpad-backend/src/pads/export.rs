//! Markdown import/export helpers for pads

use std::path::Path;

pub const MARKDOWN_MIME: &str = "text/markdown";

/// Extensions stripped from an imported filename to form the pad name
const IMPORT_EXTENSIONS: [&str; 3] = ["md", "markdown", "txt"];

/// A pad rendered as a downloadable file
#[derive(Debug, Clone, PartialEq)]
pub struct PadExport {
    pub filename: String,
    pub mime: &'static str,
    pub body: String,
}

impl PadExport {
    /// `Content-Disposition` value for the download. Non-ASCII names are
    /// carried in the RFC 5987 `filename*` parameter.
    pub fn disposition(&self) -> String {
        let fallback: String = self
            .filename
            .chars()
            .map(|c| if c.is_ascii() && c != '"' && c != '\\' { c } else { '_' })
            .collect();
        format!(
            "attachment; filename=\"{}\"; filename*=UTF-8''{}",
            fallback,
            urlencoding::encode(&self.filename)
        )
    }
}

pub fn export_pad(name: &str, content: String) -> PadExport {
    PadExport {
        filename: format!("{}.md", name),
        mime: MARKDOWN_MIME,
        body: content,
    }
}

/// Pad name for an uploaded file (e.g. "notes/Todo List.md" -> "Todo List")
///
/// Only known text extensions are dropped, so "v1.2" stays "v1.2".
pub fn pad_name_from_filename(filename: &str) -> String {
    // Browsers on Windows may send the full client path
    let base = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    let path = Path::new(base);

    let known_ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .map(|e| IMPORT_EXTENSIONS.contains(&e.as_str()))
        .unwrap_or(false);

    if known_ext {
        path.file_stem()
            .map(|s| s.to_string_lossy().trim().to_string())
            .unwrap_or_default()
    } else {
        base.trim().to_string()
    }
}
