//! Whole-document JSON persistence
//!
//! Writes go to a sibling temp file which is then renamed over the target,
//! so the last persisted document is always a complete one. Reads are
//! tolerant: a missing or corrupt document yields `None` and the caller
//! falls back to an empty skeleton.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::fail_open::fail_open;
use crate::{FlowError, Result};

/// Serialize `value` and atomically replace the file at `path`
pub async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(|e| {
            FlowError::Storage(format!("Failed to create {}: {}", parent.display(), e))
        })?;
    }

    let tmp_path = temp_path(path);
    tokio::fs::write(&tmp_path, json).await.map_err(|e| {
        FlowError::Storage(format!("Failed to write {}: {}", tmp_path.display(), e))
    })?;

    tokio::fs::rename(&tmp_path, path).await.map_err(|e| {
        FlowError::Storage(format!("Failed to replace {}: {}", path.display(), e))
    })?;

    debug!("Persisted {}", path.display());
    Ok(())
}

/// Read and parse a JSON document, propagating every failure
pub async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = tokio::fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&content)?)
}

/// Read a JSON document, returning `None` when it is missing or unreadable
pub async fn read_json_tolerant<T: DeserializeOwned>(path: &Path) -> Option<T> {
    if !path.exists() {
        debug!("No document at {}, starting empty", path.display());
        return None;
    }

    let name = format!("load {}", path.display());
    let loaded = fail_open(&name, || read_json(path)).await;
    if loaded.is_none() {
        warn!("Ignoring unreadable document {}", path.display());
    }
    loaded
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_write_then_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("doc.json");

        let mut doc = HashMap::new();
        doc.insert("a".to_string(), 1u32);
        write_json_atomic(&path, &doc).await.unwrap();

        let back: HashMap<String, u32> = read_json(&path).await.unwrap();
        assert_eq!(back, doc);
        assert!(!dir.path().join("nested").join("doc.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_tolerant_read_missing_and_corrupt() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("doc.json");

        let missing: Option<HashMap<String, u32>> = read_json_tolerant(&path).await;
        assert!(missing.is_none());

        tokio::fs::write(&path, "{ not json").await.unwrap();
        let corrupt: Option<HashMap<String, u32>> = read_json_tolerant(&path).await;
        assert!(corrupt.is_none());
    }

    #[tokio::test]
    async fn test_write_failure_is_storage_error() {
        let dir = tempdir().unwrap();
        // A directory where the file should go makes the rename fail
        let path = dir.path().join("taken");
        tokio::fs::create_dir_all(path.join("child")).await.unwrap();

        let err = write_json_atomic(&path, &1u32).await.unwrap_err();
        assert!(matches!(err, FlowError::Storage(_)));
    }
}
