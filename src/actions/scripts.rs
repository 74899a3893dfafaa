//! Script store: named, reusable scripts agents register once and then
//! execute deterministically instead of re-deriving the same commands
//! generatively every time.
//!
//! Ported from `original_source/strix/tools/scripts/scripts_registry.py`,
//! collapsing its on-disk `metadata/*.json` + sibling script-file layout
//! into one JSON-backed store (mirroring [`crate::notes::NotesStore`]'s
//! shape) and its module-level `_global_registry` singleton into an
//! explicitly constructed store.

use crate::persistence::atomic_write_json;
use crate::{Result, RuntimeError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptCategory {
    Reconnaissance,
    Scanning,
    Exploitation,
    PostExploitation,
    Reporting,
    Utility,
    Validation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptLanguage {
    Bash,
    Python,
    Ruby,
    Perl,
    Powershell,
}

impl ScriptLanguage {
    pub fn interpreter(&self) -> &'static str {
        match self {
            ScriptLanguage::Bash => "/bin/bash",
            ScriptLanguage::Python => "python3",
            ScriptLanguage::Ruby => "ruby",
            ScriptLanguage::Perl => "perl",
            ScriptLanguage::Powershell => "pwsh",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Script {
    pub name: String,
    pub content: String,
    pub description: String,
    pub category: ScriptCategory,
    pub language: ScriptLanguage,
    #[serde(default)]
    pub parameters: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub timeout_seconds: u64,
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub struct ScriptStore {
    path: PathBuf,
    scripts: RwLock<HashMap<String, Script>>,
}

impl ScriptStore {
    pub async fn open(run_dir: &std::path::Path) -> Result<Self> {
        let path = run_dir.join("scripts.json");
        let scripts = if path.exists() {
            let contents = tokio::fs::read(&path).await?;
            serde_json::from_slice(&contents)?
        } else {
            HashMap::new()
        };
        Ok(Self { path, scripts: RwLock::new(scripts) })
    }

    async fn persist(&self, scripts: &HashMap<String, Script>) -> Result<()> {
        atomic_write_json(&self.path, scripts).await
    }

    fn validate_name(name: &str) -> Result<()> {
        if !name.chars().all(|c| c.is_alphanumeric() || c == '_') || name.is_empty() {
            return Err(RuntimeError::ArgumentCoercion {
                argument: "name".to_string(),
                message: format!("invalid script name '{name}': use alphanumeric and underscore only"),
            });
        }
        Ok(())
    }

    /// Registers a new script, or re-registers an existing one with an
    /// incremented version.
    pub async fn register(
        &self,
        name: String,
        content: String,
        description: String,
        category: ScriptCategory,
        language: ScriptLanguage,
        parameters: Vec<String>,
        tags: Vec<String>,
        timeout_seconds: u64,
    ) -> Result<Script> {
        Self::validate_name(&name)?;
        let mut scripts = self.scripts.write().await;
        let now = Utc::now();
        let version = scripts.get(&name).map(|s| s.version + 1).unwrap_or(1);
        let created_at = scripts.get(&name).map(|s| s.created_at).unwrap_or(now);

        let script = Script {
            name: name.clone(),
            content,
            description,
            category,
            language,
            parameters,
            tags,
            timeout_seconds,
            version,
            created_at,
            updated_at: now,
        };
        scripts.insert(name, script.clone());
        self.persist(&scripts).await?;
        Ok(script)
    }

    pub async fn get(&self, name: &str) -> Option<Script> {
        self.scripts.read().await.get(name).cloned()
    }

    pub async fn list(&self, category: Option<ScriptCategory>, tags: Option<&[String]>) -> Vec<Script> {
        let scripts = self.scripts.read().await;
        let mut matches: Vec<Script> = scripts
            .values()
            .filter(|s| match category {
                None => true,
                Some(c) => c == s.category,
            })
            .filter(|s| match tags {
                None => true,
                Some(tags) => tags.iter().any(|t| s.tags.contains(t)),
            })
            .cloned()
            .collect();
        matches.sort_by(|a, b| a.name.cmp(&b.name));
        matches
    }

    pub async fn delete(&self, name: &str) -> Result<()> {
        let mut scripts = self.scripts.write().await;
        if scripts.remove(name).is_none() {
            return Err(RuntimeError::ArgumentCoercion {
                argument: "name".to_string(),
                message: format!("script '{name}' not found"),
            });
        }
        self.persist(&scripts).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn store() -> ScriptStore {
        ScriptStore::open(tempdir().unwrap().path()).await.unwrap()
    }

    #[tokio::test]
    async fn register_then_get_roundtrips() {
        let store = store().await;
        store
            .register(
                "nmap_quick".into(),
                "#!/bin/bash\nnmap $1".into(),
                "quick scan".into(),
                ScriptCategory::Reconnaissance,
                ScriptLanguage::Bash,
                vec!["target".into()],
                vec!["nmap".into()],
                120,
            )
            .await
            .unwrap();
        let script = store.get("nmap_quick").await.unwrap();
        assert_eq!(script.version, 1);
    }

    #[tokio::test]
    async fn re_registering_increments_version() {
        let store = store().await;
        let args = (
            "s".to_string(),
            "v1".to_string(),
            "d".to_string(),
            ScriptCategory::Utility,
            ScriptLanguage::Bash,
            Vec::new(),
            Vec::new(),
            60,
        );
        store.register(args.0.clone(), args.1, args.2.clone(), args.3, args.4, args.5.clone(), args.6.clone(), args.7).await.unwrap();
        let updated = store
            .register("s".into(), "v2".into(), "d".into(), ScriptCategory::Utility, ScriptLanguage::Bash, Vec::new(), Vec::new(), 60)
            .await
            .unwrap();
        assert_eq!(updated.version, 2);
        assert_eq!(updated.content, "v2");
    }

    #[tokio::test]
    async fn invalid_name_is_rejected() {
        let store = store().await;
        let result = store
            .register("bad name!".into(), "x".into(), "d".into(), ScriptCategory::Utility, ScriptLanguage::Bash, Vec::new(), Vec::new(), 60)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn delete_removes_script() {
        let store = store().await;
        store.register("s".into(), "x".into(), "d".into(), ScriptCategory::Utility, ScriptLanguage::Bash, Vec::new(), Vec::new(), 60).await.unwrap();
        store.delete("s").await.unwrap();
        assert!(store.get("s").await.is_none());
    }

    #[tokio::test]
    async fn list_filters_by_category() {
        let store = store().await;
        store.register("a".into(), "x".into(), "d".into(), ScriptCategory::Reconnaissance, ScriptLanguage::Bash, Vec::new(), Vec::new(), 60).await.unwrap();
        store.register("b".into(), "x".into(), "d".into(), ScriptCategory::Utility, ScriptLanguage::Bash, Vec::new(), Vec::new(), 60).await.unwrap();
        let recon = store.list(Some(ScriptCategory::Reconnaissance), None).await;
        assert_eq!(recon.len(), 1);
        assert_eq!(recon[0].name, "a");
    }
}
