//! Shared atomic-write discipline: write to a temp file, fsync, rename.
//!
//! Used by the Tracer's finding/index writers, the Run Plan, Notes and
//! Progress stores — anywhere spec.md requires "write to temp → fsync →
//! rename" to avoid torn writes on crash.

use crate::Result;
use serde::Serialize;
use std::path::Path;
use tokio::io::AsyncWriteExt;

/// Serializes `value` as pretty JSON and atomically replaces `path`.
pub async fn atomic_write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    atomic_write_bytes(path, &bytes).await
}

/// Atomically replaces `path` with `contents`, fsyncing both the temp file
/// and (best-effort) the containing directory before the rename is trusted.
pub async fn atomic_write_bytes(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    tokio::fs::create_dir_all(dir).await?;

    let tmp_path = dir.join(format!(".{}.tmp-{}", file_stem(path), uuid::Uuid::new_v4().simple()));

    let mut file = tokio::fs::File::create(&tmp_path).await?;
    file.write_all(contents).await?;
    file.sync_all().await?;
    drop(file);

    tokio::fs::rename(&tmp_path, path).await?;

    if let Ok(dir_file) = tokio::fs::File::open(dir).await {
        let _ = dir_file.sync_all().await;
    }

    Ok(())
}

fn file_stem(path: &Path) -> String {
    path.file_name().and_then(|n| n.to_str()).unwrap_or("file").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[tokio::test]
    async fn write_then_read_back_roundtrips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.json");
        atomic_write_json(&path, &json!({"a": 1})).await.unwrap();
        let read: serde_json::Value = serde_json::from_slice(&tokio::fs::read(&path).await.unwrap()).unwrap();
        assert_eq!(read, json!({"a": 1}));
    }

    #[tokio::test]
    async fn overwrite_replaces_previous_contents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.json");
        atomic_write_json(&path, &json!({"a": 1})).await.unwrap();
        atomic_write_json(&path, &json!({"a": 2})).await.unwrap();
        let read: serde_json::Value = serde_json::from_slice(&tokio::fs::read(&path).await.unwrap()).unwrap();
        assert_eq!(read, json!({"a": 2}));
    }

    #[tokio::test]
    async fn creates_missing_parent_directories() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/deep/data.json");
        atomic_write_json(&path, &json!({"ok": true})).await.unwrap();
        assert!(path.exists());
    }
}
