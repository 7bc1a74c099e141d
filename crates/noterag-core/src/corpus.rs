//! Walking and reading the markdown corpus.

use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use walkdir::{DirEntry, WalkDir};

use crate::error::{Error, Result};
use crate::frontmatter::{parse_note, Frontmatter};

const MARKDOWN_EXTENSIONS: &[&str] = &["md", "markdown"];

/// A note file discovered under the notes directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteFile {
    pub abs_path: PathBuf,
    /// Corpus-relative path with `/` separators.
    pub rel_path: String,
}

/// A note read from disk.
#[derive(Debug, Clone)]
pub struct NoteSource {
    pub file: NoteFile,
    pub text: String,
    pub frontmatter: Option<Frontmatter>,
    pub mtime_ms: i64,
}

impl NoteSource {
    /// Frontmatter title, else the file stem.
    pub fn title(&self) -> String {
        self.frontmatter
            .as_ref()
            .and_then(|fm| fm.title.clone())
            .unwrap_or_else(|| file_stem(&self.file.rel_path))
    }
}

pub fn is_markdown(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| MARKDOWN_EXTENSIONS.iter().any(|m| e.eq_ignore_ascii_case(m)))
        .unwrap_or(false)
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0 && entry.file_name().to_str().map(|s| s.starts_with('.')).unwrap_or(false)
}

/// Corpus-relative path of `path` with `/` separators, or `None` when it lies outside `root`.
pub fn relative_note_path(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    (!parts.is_empty()).then(|| parts.join("/"))
}

/// File stem of a corpus-relative path, used as the fallback title.
pub fn file_stem(rel_path: &str) -> String {
    let name = rel_path.rsplit('/').next().unwrap_or(rel_path);
    match name.rfind('.') {
        Some(dot) if dot > 0 => name[..dot].to_string(),
        _ => name.to_string(),
    }
}

/// All markdown files under `root`, skipping hidden directories, sorted by relative path.
pub fn list_notes(root: &Path) -> Result<Vec<NoteFile>> {
    if !root.is_dir() {
        return Err(Error::corpus(root.display().to_string(), "notes directory does not exist"));
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(true).into_iter().filter_entry(|e| !is_hidden(e)) {
        let entry = match entry {
            Ok(e) => e,
            Err(err) => {
                tracing::warn!(error = %err, "skipping unreadable corpus entry");
                continue;
            }
        };
        if !entry.file_type().is_file() || !is_markdown(entry.path()) {
            continue;
        }
        if let Some(rel_path) = relative_note_path(root, entry.path()) {
            files.push(NoteFile { abs_path: entry.path().to_path_buf(), rel_path });
        }
    }
    files.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
    Ok(files)
}

pub fn modified_ms(path: &Path) -> Result<i64> {
    let meta = std::fs::metadata(path).map_err(|e| Error::corpus(path.display().to_string(), e))?;
    let modified = meta.modified().map_err(|e| Error::corpus(path.display().to_string(), e))?;
    Ok(modified
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0))
}

pub fn read_note(file: &NoteFile) -> Result<NoteSource> {
    let text = std::fs::read_to_string(&file.abs_path).map_err(|e| Error::corpus(&file.rel_path, e))?;
    let mtime_ms = modified_ms(&file.abs_path)?;
    let frontmatter = parse_note(&text).frontmatter;
    Ok(NoteSource { file: file.clone(), text, frontmatter, mtime_ms })
}
