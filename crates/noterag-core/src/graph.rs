//! Wiki-link graph over the corpus.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, warn};

use crate::chunker::without_code_blocks;
use crate::corpus::{file_stem, list_notes, read_note};
use crate::error::{Error, Result};
use crate::frontmatter::parse_note;
use crate::traits::GraphAnalyzer;
use crate::types::{normalize_title, BacklinkEntry, NoteGraphStats};

fn wiki_link_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // [[Target]], [[Target|alias]], [[Target#heading]]
    RE.get_or_init(|| Regex::new(r"\[\[([^\[\]|#]+)(?:#[^\[\]|]*)?(?:\|[^\[\]]*)?\]\]").expect("valid regex"))
}

fn markdown_link_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // [text](relative/path.md) with an optional #fragment
    RE.get_or_init(|| {
        Regex::new(r"\[[^\]]*\]\(<?([^)<>\s#]+\.(?:md|markdown))(?:#[^)\s]*)?>?\)").expect("valid regex")
    })
}

/// Distinct normalized link targets in a note body, in order of first appearance.
///
/// Fenced code is ignored, external URLs are skipped, and markdown links resolve
/// to the linked file's stem.
pub fn extract_links(body: &str) -> Vec<String> {
    let text = without_code_blocks(body);
    let mut found: Vec<(usize, String)> = Vec::new();
    for caps in wiki_link_re().captures_iter(&text) {
        if let (Some(all), Some(target)) = (caps.get(0), caps.get(1)) {
            found.push((all.start(), normalize_title(target.as_str())));
        }
    }
    for caps in markdown_link_re().captures_iter(&text) {
        let (Some(all), Some(target)) = (caps.get(0), caps.get(1)) else { continue };
        let target = target.as_str();
        if target.contains("://") {
            continue;
        }
        let decoded = target.replace("%20", " ");
        found.push((all.start(), normalize_title(&file_stem(&decoded))));
    }
    found.sort_by_key(|(pos, _)| *pos);

    let mut links: Vec<String> = Vec::new();
    for (_, target) in found {
        if !target.is_empty() && !links.contains(&target) {
            links.push(target);
        }
    }
    links
}

/// [`GraphAnalyzer`] over `[[wiki links]]` and relative markdown links.
#[derive(Default)]
pub struct WikiLinkAnalyzer {
    cache: Mutex<HashMap<PathBuf, NoteGraphStats>>,
}

impl WikiLinkAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<dyn GraphAnalyzer> {
        Arc::new(Self::new())
    }

    fn cached(&self, dir: &Path) -> Option<NoteGraphStats> {
        self.cache.lock().ok().and_then(|c| c.get(dir).cloned())
    }

    fn store(&self, dir: &Path, stats: &NoteGraphStats) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(dir.to_path_buf(), stats.clone());
        }
    }
}

/// Build link statistics for every note under `notes_dir`. Unreadable notes are skipped.
pub fn analyze_dir(notes_dir: &Path) -> Result<NoteGraphStats> {
    let files = list_notes(notes_dir)?;
    let mut stats = NoteGraphStats { note_count: files.len(), ..Default::default() };
    for file in &files {
        let note = match read_note(file) {
            Ok(note) => note,
            Err(err) => {
                warn!(path = %file.rel_path, error = %err, "skipping note in link analysis");
                continue;
            }
        };
        let title = note.title();
        let own = [normalize_title(&title), normalize_title(&file_stem(&file.rel_path))];
        let links: Vec<String> = extract_links(parse_note(&note.text).body)
            .into_iter()
            .filter(|t| !own.contains(t))
            .collect();
        for target in &links {
            stats.backlinks.entry(target.clone()).or_default().push(BacklinkEntry {
                source_path: file.rel_path.clone(),
                source_title: title.clone(),
            });
        }
        stats.forward_links.insert(file.rel_path.clone(), links);
    }
    debug!(notes = stats.note_count, targets = stats.backlinks.len(), "analyzed link graph");
    Ok(stats)
}

#[async_trait]
impl GraphAnalyzer for WikiLinkAnalyzer {
    async fn analyze(&self, notes_dir: &Path, reuse_cache: bool) -> Result<NoteGraphStats> {
        if reuse_cache {
            if let Some(stats) = self.cached(notes_dir) {
                return Ok(stats);
            }
        }
        let dir = notes_dir.to_path_buf();
        let stats = tokio::task::spawn_blocking(move || analyze_dir(&dir))
            .await
            .map_err(|e| Error::corpus(notes_dir.display().to_string(), e))??;
        self.store(notes_dir, &stats);
        Ok(stats)
    }
}
