//! Notes store: a JSON-backed, durable side-channel for structured agent
//! output, keyed by a short generated id.
//!
//! Ported from `original_source/strix/tools/notes/notes_actions.py`, fixing
//! its module-level `_notes_storage`/`_notes_file_path` globals into an
//! explicit, dependency-injected store (spec.md §9's re-architecture
//! guidance) constructed with the run directory rather than discovered
//! through a global tracer lookup.

use crate::persistence::atomic_write_json;
use crate::{Result, RuntimeError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoteCategory {
    General,
    Findings,
    Methodology,
    Todo,
    Questions,
    Plan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotePriority {
    Low,
    Normal,
    High,
    Urgent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Note {
    pub note_id: String,
    pub title: String,
    pub content: String,
    pub category: NoteCategory,
    #[serde(default)]
    pub tags: Vec<String>,
    pub priority: NotePriority,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Default, Serialize, Deserialize)]
struct NotesFile(HashMap<String, Note>);

pub struct NotesStore {
    path: PathBuf,
    notes: RwLock<HashMap<String, Note>>,
}

impl NotesStore {
    pub async fn open(run_dir: &std::path::Path) -> Result<Self> {
        let path = run_dir.join(crate::constants::NOTES_FILE);
        let notes = if path.exists() {
            let contents = tokio::fs::read(&path).await?;
            serde_json::from_slice::<NotesFile>(&contents)?.0
        } else {
            HashMap::new()
        };
        Ok(Self { path, notes: RwLock::new(notes) })
    }

    async fn persist(&self, notes: &HashMap<String, Note>) -> Result<()> {
        atomic_write_json(&self.path, &NotesFile(notes.clone())).await
    }

    pub async fn create(
        &self,
        title: String,
        content: String,
        category: NoteCategory,
        tags: Vec<String>,
        priority: NotePriority,
    ) -> Result<Note> {
        if title.trim().is_empty() || content.trim().is_empty() {
            return Err(RuntimeError::ArgumentCoercion {
                argument: "title/content".to_string(),
                message: "title and content must not be empty".to_string(),
            });
        }

        let now = Utc::now();
        let note_id = uuid::Uuid::new_v4().simple().to_string()[..5].to_string();
        let note = Note {
            note_id: note_id.clone(),
            title: title.trim().to_string(),
            content: content.trim().to_string(),
            category,
            tags,
            priority,
            created_at: now,
            updated_at: now,
        };

        let mut notes = self.notes.write().await;
        notes.insert(note_id, note.clone());
        self.persist(&notes).await?;
        Ok(note)
    }

    pub async fn update(
        &self,
        note_id: &str,
        title: Option<String>,
        content: Option<String>,
        tags: Option<Vec<String>>,
        priority: Option<NotePriority>,
    ) -> Result<Note> {
        let mut notes = self.notes.write().await;
        let note = notes
            .get_mut(note_id)
            .ok_or_else(|| RuntimeError::ArgumentCoercion {
                argument: "note_id".to_string(),
                message: format!("note '{note_id}' not found"),
            })?;

        if let Some(title) = title {
            note.title = title.trim().to_string();
        }
        if let Some(content) = content {
            note.content = content.trim().to_string();
        }
        if let Some(tags) = tags {
            note.tags = tags;
        }
        if let Some(priority) = priority {
            note.priority = priority;
        }
        note.updated_at = Utc::now();
        let updated = note.clone();
        self.persist(&notes).await?;
        Ok(updated)
    }

    pub async fn delete(&self, note_id: &str) -> Result<Note> {
        let mut notes = self.notes.write().await;
        let note = notes.remove(note_id).ok_or_else(|| RuntimeError::ArgumentCoercion {
            argument: "note_id".to_string(),
            message: format!("note '{note_id}' not found"),
        })?;
        self.persist(&notes).await?;
        Ok(note)
    }

    pub async fn list(
        &self,
        category: Option<NoteCategory>,
        tags: Option<&[String]>,
        priority: Option<NotePriority>,
        search: Option<&str>,
    ) -> Vec<Note> {
        let notes = self.notes.read().await;
        let mut matches: Vec<Note> = notes
            .values()
            .filter(|n| match category {
                None => true,
                Some(c) => c == n.category,
            })
            .filter(|n| match priority {
                None => true,
                Some(p) => p == n.priority,
            })
            .filter(|n| match tags {
                None => true,
                Some(tags) => tags.iter().any(|t| n.tags.contains(t)),
            })
            .filter(|n| match search {
                None => true,
                Some(q) => {
                    let q = q.to_lowercase();
                    n.title.to_lowercase().contains(&q) || n.content.to_lowercase().contains(&q)
                }
            })
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matches
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn create_then_list_roundtrips() {
        let dir = tempdir().unwrap();
        let store = NotesStore::open(dir.path()).await.unwrap();
        store
            .create("T".into(), "C".into(), NoteCategory::General, vec!["x".into()], NotePriority::Normal)
            .await
            .unwrap();
        let notes = store.list(None, None, None, None).await;
        assert_eq!(notes.len(), 1);
    }

    #[tokio::test]
    async fn update_changes_fields_and_bumps_updated_at() {
        let dir = tempdir().unwrap();
        let store = NotesStore::open(dir.path()).await.unwrap();
        let note = store
            .create("T".into(), "C".into(), NoteCategory::General, Vec::new(), NotePriority::Normal)
            .await
            .unwrap();
        let updated = store.update(&note.note_id, Some("T2".into()), None, None, Some(NotePriority::High)).await.unwrap();
        assert_eq!(updated.title, "T2");
        assert_eq!(updated.priority, NotePriority::High);
    }

    #[tokio::test]
    async fn delete_removes_note() {
        let dir = tempdir().unwrap();
        let store = NotesStore::open(dir.path()).await.unwrap();
        let note = store
            .create("T".into(), "C".into(), NoteCategory::General, Vec::new(), NotePriority::Normal)
            .await
            .unwrap();
        store.delete(&note.note_id).await.unwrap();
        assert!(store.list(None, None, None, None).await.is_empty());
    }

    #[tokio::test]
    async fn reopening_store_loads_persisted_notes() {
        let dir = tempdir().unwrap();
        {
            let store = NotesStore::open(dir.path()).await.unwrap();
            store
                .create("T".into(), "C".into(), NoteCategory::Todo, Vec::new(), NotePriority::Low)
                .await
                .unwrap();
        }
        let reopened = NotesStore::open(dir.path()).await.unwrap();
        assert_eq!(reopened.list(None, None, None, None).await.len(), 1);
    }

    #[tokio::test]
    async fn empty_title_is_rejected() {
        let dir = tempdir().unwrap();
        let store = NotesStore::open(dir.path()).await.unwrap();
        let result = store.create("  ".into(), "C".into(), NoteCategory::General, Vec::new(), NotePriority::Normal).await;
        assert!(result.is_err());
    }
}
