//! SQLite connection handling for the knowledge index.

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

/// Open the index database at `path`, creating the file and any missing
/// parent directories. WAL mode, so a sync mid-rebuild never blocks a
/// concurrent retrieval read.
///
/// The pool is deliberately small: a session has one writer (the sync pass)
/// and one reader (retrieval), never more.
pub async fn connect(path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(2)
        .connect_with(options)
        .await?;

    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn creates_the_file_and_missing_parent_directories() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("data").join("lingua.sqlite");

        let pool = connect(&path).await.unwrap();
        pool.close().await;

        assert!(path.exists());
    }
}
