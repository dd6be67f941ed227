//! Knowledge corpus loading.
//!
//! Reads the configured knowledge directory into an ordered set of
//! (filename, text) pairs. Files are returned in sorted relative-path order so
//! that chunking and fingerprinting are deterministic across runs regardless of
//! directory iteration order.

use anyhow::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::warn;
use walkdir::WalkDir;

use crate::config::Config;
use crate::error::TutorError;

/// One source document, immutable per index build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDoc {
    /// Path relative to the knowledge directory.
    pub name: String,
    pub text: String,
}

/// Load all knowledge files matching the configured include globs.
///
/// Unreadable or non-UTF-8 files are skipped with a warning rather than
/// loaded as empty documents, so they never shift the corpus fingerprint
/// silently.
///
/// Returns [`TutorError::CorpusMissing`] when the directory does not exist or
/// contains no matching files — the tutor cannot answer anything without a
/// corpus, so this is the one fatal startup condition.
pub fn load_corpus(config: &Config) -> Result<Vec<SourceDoc>> {
    let root = &config.knowledge.dir;
    if !root.exists() {
        return Err(TutorError::CorpusMissing { dir: root.clone() }.into());
    }

    let include_set = build_globset(&config.knowledge.include_globs)?;

    let mut docs = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().to_string();

        if !include_set.is_match(&rel_str) {
            continue;
        }

        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                warn!(file = %rel_str, error = %e, "skipping unreadable knowledge file");
                continue;
            }
        };
        docs.push(SourceDoc {
            name: rel_str,
            text,
        });
    }

    if docs.is_empty() {
        return Err(TutorError::CorpusMissing { dir: root.clone() }.into());
    }

    // Sort for deterministic ordering
    docs.sort_by(|a, b| a.name.cmp(&b.name));

    Ok(docs)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
