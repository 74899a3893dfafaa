//! Progress store: an opaque JSON key-value checkpoint store supporting
//! list-append semantics, so agents can offload context across crashes.
//!
//! Ported from `original_source/strix/tools/progress/progress_actions.py`,
//! fixing its module-level `_progress_cache`/`_progress_file_path` globals
//! into an explicit store constructed with the run directory.

use crate::persistence::atomic_write_json;
use crate::{Result, RuntimeError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEntry {
    pub data: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub struct ProgressStore {
    path: PathBuf,
    entries: RwLock<HashMap<String, ProgressEntry>>,
}

impl ProgressStore {
    pub async fn open(run_dir: &std::path::Path) -> Result<Self> {
        let path = run_dir.join(crate::constants::PROGRESS_FILE);
        let entries = if path.exists() {
            let contents = tokio::fs::read(&path).await?;
            serde_json::from_slice(&contents)?
        } else {
            HashMap::new()
        };
        Ok(Self { path, entries: RwLock::new(entries) })
    }

    async fn persist(&self, entries: &HashMap<String, ProgressEntry>) -> Result<()> {
        atomic_write_json(&self.path, entries).await
    }

    /// When `append` is true and the existing entry's data is a list while
    /// `data` is `{"items": [...]}`, extends the existing list instead of
    /// replacing it.
    pub async fn save(&self, key: &str, data: Value, append: bool) -> Result<ProgressEntry> {
        let key = key.trim();
        if key.is_empty() {
            return Err(RuntimeError::ArgumentCoercion {
                argument: "key".to_string(),
                message: "key must not be empty".to_string(),
            });
        }

        let mut entries = self.entries.write().await;
        let now = Utc::now();

        let entry = if append {
            match entries.get_mut(key) {
                Some(existing) => {
                    let items = data.get("items").and_then(Value::as_array).cloned();
                    match (existing.data.as_array_mut(), items) {
                        (Some(list), Some(items)) => {
                            list.extend(items);
                            existing.updated_at = now;
                        }
                        _ => {
                            existing.data = data;
                            existing.updated_at = now;
                        }
                    }
                    existing.clone()
                }
                None => {
                    let entry = ProgressEntry { data, created_at: now, updated_at: now };
                    entries.insert(key.to_string(), entry.clone());
                    entry
                }
            }
        } else {
            let entry = ProgressEntry {
                data,
                created_at: entries.get(key).map(|e| e.created_at).unwrap_or(now),
                updated_at: now,
            };
            entries.insert(key.to_string(), entry.clone());
            entry
        };

        self.persist(&entries).await?;
        Ok(entry)
    }

    pub async fn load(&self, key: &str) -> Option<ProgressEntry> {
        self.entries.read().await.get(key).cloned()
    }

    pub async fn list_keys(&self) -> Vec<String> {
        let entries = self.entries.read().await;
        let mut keys: Vec<(String, DateTime<Utc>)> =
            entries.iter().map(|(k, v)| (k.clone(), v.updated_at)).collect();
        keys.sort_by(|a, b| b.1.cmp(&a.1));
        keys.into_iter().map(|(k, _)| k).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[tokio::test]
    async fn save_then_load_roundtrips_modulo_timestamps() {
        let dir = tempdir().unwrap();
        let store = ProgressStore::open(dir.path()).await.unwrap();
        store.save("scanned_ports", json!({"ports": [80, 443]}), false).await.unwrap();
        let loaded = store.load("scanned_ports").await.unwrap();
        assert_eq!(loaded.data, json!({"ports": [80, 443]}));
    }

    #[tokio::test]
    async fn append_extends_existing_list() {
        let dir = tempdir().unwrap();
        let store = ProgressStore::open(dir.path()).await.unwrap();
        store.save("hosts", json!([1, 2]), false).await.unwrap();
        store.save("hosts", json!({"items": [3, 4]}), true).await.unwrap();
        let loaded = store.load("hosts").await.unwrap();
        assert_eq!(loaded.data, json!([1, 2, 3, 4]));
    }

    #[tokio::test]
    async fn empty_key_is_rejected() {
        let dir = tempdir().unwrap();
        let store = ProgressStore::open(dir.path()).await.unwrap();
        assert!(store.save("  ", json!({}), false).await.is_err());
    }

    #[tokio::test]
    async fn list_keys_sorted_by_most_recently_updated() {
        let dir = tempdir().unwrap();
        let store = ProgressStore::open(dir.path()).await.unwrap();
        store.save("a", json!({}), false).await.unwrap();
        store.save("b", json!({}), false).await.unwrap();
        let keys = store.list_keys().await;
        assert_eq!(keys, vec!["b".to_string(), "a".to_string()]);
    }
}
