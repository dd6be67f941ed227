//! Content fingerprinting of the knowledge corpus.
//!
//! A [`Fingerprint`] maps each filename to the SHA-256 of its contents, plus an
//! aggregate hash over the sorted entries. Two equal fingerprints mean the
//! corpus bytes are unchanged, which is the only signal that gates index
//! rebuilds — file modification times never participate.
//!
//! The last-known fingerprint is persisted as a small JSON file, read at
//! startup and written only after a successful rebuild.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::corpus::SourceDoc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    /// filename → SHA-256 hex of the file contents.
    pub files: BTreeMap<String, String>,
    /// SHA-256 over the sorted (filename, hash) pairs.
    pub aggregate: String,
}

/// Hash every document in the corpus. Pure and deterministic: equal inputs
/// produce byte-identical output.
pub fn fingerprint(corpus: &[SourceDoc]) -> Fingerprint {
    let mut files = BTreeMap::new();
    for doc in corpus {
        let mut hasher = Sha256::new();
        hasher.update(doc.text.as_bytes());
        files.insert(doc.name.clone(), format!("{:x}", hasher.finalize()));
    }

    // BTreeMap iteration is sorted, so the aggregate is order-independent
    // of how the corpus was scanned. Filenames are included so a rename
    // invalidates the index even when contents are identical.
    let mut agg = Sha256::new();
    for (name, hash) in &files {
        agg.update(name.as_bytes());
        agg.update(b"\0");
        agg.update(hash.as_bytes());
        agg.update(b"\0");
    }

    Fingerprint {
        files,
        aggregate: format!("{:x}", agg.finalize()),
    }
}

/// Read the persisted fingerprint, if any. A missing file is not an error —
/// it simply means no index has been built yet.
pub fn load(path: &Path) -> Result<Option<Fingerprint>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read fingerprint file: {}", path.display()))?;
    let fp = serde_json::from_str(&content)
        .with_context(|| format!("Corrupt fingerprint file: {}", path.display()))?;
    Ok(Some(fp))
}

/// Persist the fingerprint. Called only after a rebuild has fully succeeded.
pub fn store(path: &Path, fp: &Fingerprint) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(fp)?;
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write fingerprint file: {}", path.display()))?;
    Ok(())
}
