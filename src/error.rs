//! Error taxonomy for the tutor pipeline.
//!
//! Only [`TutorError::CorpusMissing`] is fatal; every other variant is caught at
//! the dialogue boundary and turned into a user-facing message so the
//! conversation can continue.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TutorError {
    /// No knowledge documents found at startup. Nothing works without a corpus.
    #[error("no knowledge documents found in {dir}")]
    CorpusMissing { dir: PathBuf },

    /// The chat model oracle failed or timed out.
    #[error("model oracle unavailable: {0}")]
    Oracle(String),

    /// The retrieval backend failed (distinct from an empty result).
    #[error("retrieval backend error: {0}")]
    Index(String),

    /// The record store rejected or failed a write.
    #[error("persistence failed: {0}")]
    Persistence(String),
}

impl TutorError {
    /// True when the conversation can continue after this error.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, TutorError::CorpusMissing { .. })
    }
}
