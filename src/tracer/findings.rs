//! Finding store: an append-only set of severity-tagged results, each
//! persisted as an individual markdown artifact plus a rewritten CSV index.

use crate::models::Severity;
use crate::persistence::atomic_write_bytes;
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub finding_id: String,
    pub title: String,
    pub body: String,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
}

fn severity_rank(s: Severity) -> u8 {
    match s {
        Severity::Critical => 0,
        Severity::High => 1,
        Severity::Medium => 2,
        Severity::Low => 3,
        Severity::Info => 4,
    }
}

pub struct FindingStore {
    run_dir: PathBuf,
    inner: Mutex<Vec<Finding>>,
}

impl FindingStore {
    pub fn new(run_dir: impl Into<PathBuf>) -> Self {
        Self { run_dir: run_dir.into(), inner: Mutex::new(Vec::new()) }
    }

    fn vulnerabilities_dir(&self) -> PathBuf {
        self.run_dir.join(crate::constants::VULNERABILITIES_DIR)
    }

    fn index_path(&self) -> PathBuf {
        self.run_dir.join(crate::constants::VULNERABILITIES_INDEX_FILE)
    }

    /// Assigns a zero-padded sequential id, writes the finding's markdown
    /// artifact, rewrites the CSV index, and never reuses an id even if
    /// this finding is functionally a duplicate of an earlier one.
    pub async fn add_finding(&self, title: String, body: String, severity: Severity) -> Result<Finding> {
        let mut findings = self.inner.lock().await;
        let seq = findings.len() + 1;
        let finding = Finding {
            finding_id: format!("vuln-{seq:04}"),
            title: title.trim().to_string(),
            body: body.trim().to_string(),
            severity,
            timestamp: Utc::now(),
        };

        let artifact_path = self.vulnerabilities_dir().join(format!("{}.md", finding.finding_id));
        let markdown = format!(
            "# {}\n\n**Severity:** {}\n**Recorded:** {}\n\n{}\n",
            finding.title,
            finding.severity,
            finding.timestamp.to_rfc3339(),
            finding.body
        );
        atomic_write_bytes(&artifact_path, markdown.as_bytes()).await?;

        findings.push(finding.clone());
        self.rewrite_index(&findings).await?;

        Ok(finding)
    }

    async fn rewrite_index(&self, findings: &[Finding]) -> Result<()> {
        let mut sorted: Vec<&Finding> = findings.iter().collect();
        sorted.sort_by(|a, b| {
            severity_rank(a.severity).cmp(&severity_rank(b.severity)).then(a.timestamp.cmp(&b.timestamp))
        });

        let mut csv = String::from("id,title,severity,timestamp,file\n");
        for f in sorted {
            csv.push_str(&format!(
                "{},{},{},{},{}.md\n",
                f.finding_id,
                csv_escape(&f.title),
                f.severity.to_string().to_uppercase(),
                f.timestamp.to_rfc3339(),
                f.finding_id,
            ));
        }

        atomic_write_bytes(&self.index_path(), csv.as_bytes()).await
    }

    pub async fn all(&self) -> Vec<Finding> {
        self.inner.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }
}

fn csv_escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn adding_finding_creates_artifact_and_index_row() {
        let dir = tempdir().unwrap();
        let store = FindingStore::new(dir.path());
        let finding = store.add_finding("T".into(), "B".into(), Severity::High).await.unwrap();

        let artifact = dir.path().join("vulnerabilities").join(format!("{}.md", finding.finding_id));
        assert!(artifact.exists());

        let csv = tokio::fs::read_to_string(dir.path().join("vulnerabilities.csv")).await.unwrap();
        assert!(csv.contains("HIGH"));
        assert!(csv.contains(&finding.finding_id));
    }

    #[tokio::test]
    async fn two_findings_get_distinct_sequential_ids() {
        let dir = tempdir().unwrap();
        let store = FindingStore::new(dir.path());
        let a = store.add_finding("A".into(), "a".into(), Severity::Low).await.unwrap();
        let b = store.add_finding("B".into(), "b".into(), Severity::Low).await.unwrap();
        assert_ne!(a.finding_id, b.finding_id);
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn index_sorts_by_severity_rank_then_timestamp() {
        let dir = tempdir().unwrap();
        let store = FindingStore::new(dir.path());
        store.add_finding("low-sev".into(), "b".into(), Severity::Info).await.unwrap();
        store.add_finding("high-sev".into(), "b".into(), Severity::Critical).await.unwrap();

        let csv = tokio::fs::read_to_string(dir.path().join("vulnerabilities.csv")).await.unwrap();
        let critical_pos = csv.find("CRITICAL").unwrap();
        let info_pos = csv.find("INFO").unwrap();
        assert!(critical_pos < info_pos);
    }
}
