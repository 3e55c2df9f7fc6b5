//! Source file loading and text extraction.
//!
//! Text produced by PDF extractors separates pages with a form feed
//! (`\x0c`); such files become one [`Document`] per non-empty page.

use crate::types::Document;
use mitra_core::{AppError, AppResult};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const PAGE_BREAK: char = '\x0c';

/// Content type classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    Markdown,
    Html,
    PlainText,
    Unsupported,
}

impl ContentType {
    /// Detect content type from file extension.
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        match ext.as_deref() {
            Some("md") | Some("markdown") => Self::Markdown,
            Some("html") | Some("htm") => Self::Html,
            Some("txt") | Some("text") => Self::PlainText,
            _ => Self::Unsupported,
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, Self::Unsupported)
    }
}

/// Load a file into documents, one per page.
pub fn load_file(path: &Path) -> AppResult<Vec<Document>> {
    let content_type = ContentType::from_path(path);
    if !content_type.is_supported() {
        return Err(AppError::InvalidConfiguration(format!(
            "Unsupported document type: {}",
            path.display()
        )));
    }

    let raw = fs::read_to_string(path)?;
    if raw.contains('\0') {
        return Err(AppError::InvalidConfiguration(format!(
            "Binary file not supported: {}",
            path.display()
        )));
    }

    let source = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());

    Ok(split_pages(&source, &raw, content_type))
}

/// Collect the loadable files under `path` (a file or a directory), sorted
/// so ingestion order is stable.
pub fn collect_files(path: &Path) -> AppResult<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    if !path.is_dir() {
        return Err(AppError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("No such file or directory: {}", path.display()),
        )));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(path).follow_links(false) {
        let entry = entry.map_err(|e| {
            AppError::Io(std::io::Error::other(format!(
                "Failed to walk {}: {}",
                path.display(),
                e
            )))
        })?;

        if entry.file_type().is_file() && ContentType::from_path(entry.path()).is_supported() {
            files.push(entry.into_path());
        } else if entry.file_type().is_file() {
            tracing::debug!("Skipping unsupported file: {:?}", entry.path());
        }
    }

    files.sort();
    Ok(files)
}

fn split_pages(source: &str, raw: &str, content_type: ContentType) -> Vec<Document> {
    if !raw.contains(PAGE_BREAK) {
        let text = clean(raw, content_type);
        if text.is_empty() {
            return vec![];
        }
        return vec![Document::new(source, text)];
    }

    raw.split(PAGE_BREAK)
        .enumerate()
        .filter_map(|(i, page)| {
            let text = clean(page, content_type);
            if text.is_empty() {
                None
            } else {
                Some(Document::with_page(source, i as u32 + 1, text))
            }
        })
        .collect()
}

fn clean(text: &str, content_type: ContentType) -> String {
    match content_type {
        ContentType::Markdown => clean_markdown(text),
        ContentType::Html => clean_html(text),
        ContentType::PlainText | ContentType::Unsupported => text.trim().to_string(),
    }
}

/// Drop heading markers, rules and code fences; keep prose.
fn clean_markdown(text: &str) -> String {
    let mut result = String::with_capacity(text.len());

    for line in text.lines() {
        let trimmed = line.trim_start_matches('#').trim();

        if trimmed.starts_with("---") || trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            continue;
        }

        if !trimmed.is_empty() {
            result.push_str(trimmed);
            result.push('\n');
        }
    }

    result.trim().to_string()
}

/// Strip tags, scripts and styles; collapse whitespace.
fn clean_html(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut in_tag = false;
    let mut skip_depth: Option<&str> = None;
    let lower = text.to_lowercase();

    for (i, ch) in text.char_indices() {
        if ch == '<' {
            in_tag = true;
            let rest = lower.get(i..).unwrap_or("");
            match skip_depth {
                None if rest.starts_with("<script") => skip_depth = Some("</script"),
                None if rest.starts_with("<style") => skip_depth = Some("</style"),
                Some(close) if rest.starts_with(close) => skip_depth = None,
                _ => {}
            }
        } else if ch == '>' {
            in_tag = false;
            result.push(' ');
        } else if !in_tag && skip_depth.is_none() {
            result.push(ch);
        }
    }

    result.split_whitespace().collect::<Vec<_>>().join(" ")
}
