//! On-disk archive of finished runs.
//!
//! Layout:
//! ```text
//! <data_dir>/runs/
//!   index.json        # summaries, newest last
//!   <run_id>.json     # full RunSnapshot
//! ```

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::dag::{RunSnapshot, RunStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunIndex {
    pub version: u32,
    pub runs: Vec<RunSummary>,
}

impl Default for RunIndex {
    fn default() -> Self {
        Self {
            version: 1,
            runs: Vec::new(),
        }
    }
}

/// Index entry for one archived run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub iteration: u32,
    pub parent_run: Option<String>,
    pub status: RunStatus,
    pub created_at: DateTime<Utc>,
    pub goals: String,
    pub task_count: usize,
    pub succeeded: usize,
    pub has_program: bool,
}

impl From<&RunSnapshot> for RunSummary {
    fn from(snapshot: &RunSnapshot) -> Self {
        Self {
            run_id: snapshot.run_id.clone(),
            iteration: snapshot.iteration,
            parent_run: snapshot.parent_run.clone(),
            status: snapshot.status,
            created_at: snapshot.created_at,
            goals: snapshot.inputs.goals.text.clone(),
            task_count: snapshot.dag.tasks.len(),
            succeeded: snapshot.dag.tasks.iter().filter(|t| t.is_succeeded()).count(),
            has_program: snapshot.program().is_some(),
        }
    }
}

impl RunSummary {
    pub fn display_line(&self) -> String {
        let icon = match self.status {
            RunStatus::Pending => "○",
            RunStatus::Running => "◐",
            RunStatus::Succeeded => "●",
            RunStatus::Failed => "✗",
            RunStatus::Cancelled => "◌",
        };
        let lineage = self
            .parent_run
            .as_ref()
            .map(|p| format!(" <- {} (iter {})", p, self.iteration))
            .unwrap_or_default();

        format!(
            "{} {}{}  {}/{}  {}  {}",
            icon,
            self.run_id,
            lineage,
            self.succeeded,
            self.task_count,
            self.created_at.format("%Y-%m-%d %H:%M"),
            truncate(&self.goals, 40)
        )
    }
}

pub struct RunArchive {
    data_dir: PathBuf,
}

impl RunArchive {
    pub fn new(data_dir: impl AsRef<Path>) -> Result<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();

        let runs_dir = data_dir.join("runs");
        if !runs_dir.exists() {
            std::fs::create_dir_all(&runs_dir)
                .with_context(|| format!("Failed to create: {:?}", runs_dir))?;
        }

        Ok(Self { data_dir })
    }

    pub fn runs_dir(&self) -> PathBuf {
        self.data_dir.join("runs")
    }

    pub fn index_path(&self) -> PathBuf {
        self.runs_dir().join("index.json")
    }

    pub fn run_path(&self, run_id: &str) -> PathBuf {
        self.runs_dir().join(format!("{}.json", run_id))
    }

    pub fn load_index(&self) -> Result<RunIndex> {
        let index_path = self.index_path();
        if !index_path.exists() {
            return Ok(RunIndex::default());
        }

        let content = std::fs::read_to_string(&index_path)
            .with_context(|| format!("Failed to read: {:?}", index_path))?;

        serde_json::from_str(&content).with_context(|| "Failed to parse run index")
    }

    fn save_index(&self, index: &RunIndex) -> Result<()> {
        let content = serde_json::to_string_pretty(index)?;
        std::fs::write(self.index_path(), content)?;
        Ok(())
    }

    /// Write the snapshot and upsert its index entry
    pub fn save(&self, snapshot: &RunSnapshot) -> Result<PathBuf> {
        let path = self.run_path(&snapshot.run_id);
        let content = serde_json::to_string_pretty(snapshot)?;
        std::fs::write(&path, content).with_context(|| format!("Failed to write: {:?}", path))?;

        let mut index = self.load_index()?;
        let summary = RunSummary::from(snapshot);
        match index.runs.iter_mut().find(|r| r.run_id == summary.run_id) {
            Some(existing) => *existing = summary,
            None => index.runs.push(summary),
        }
        self.save_index(&index)?;

        tracing::debug!("Archived run {} to {:?}", snapshot.run_id, path);
        Ok(path)
    }

    /// Load by exact id, then by unique prefix
    pub fn load(&self, run_id: &str) -> Result<RunSnapshot> {
        let path = self.run_path(run_id);
        if path.exists() {
            return read_snapshot(&path);
        }

        let index = self.load_index()?;
        let matches: Vec<&RunSummary> = index
            .runs
            .iter()
            .filter(|r| r.run_id.starts_with(run_id) || r.run_id.starts_with(&format!("run-{}", run_id)))
            .collect();

        match matches.as_slice() {
            [] => Err(anyhow!("Run not found: {}", run_id)),
            [only] => read_snapshot(&self.run_path(&only.run_id)),
            many => Err(anyhow!(
                "Run id {} is ambiguous ({} matches)",
                run_id,
                many.len()
            )),
        }
    }

    pub fn list(&self) -> Result<Vec<RunSummary>> {
        Ok(self.load_index()?.runs)
    }

    /// Most recently created run, if any
    pub fn latest(&self) -> Result<Option<RunSummary>> {
        Ok(self
            .list()?
            .into_iter()
            .max_by_key(|r| r.created_at))
    }
}

fn read_snapshot(path: &Path) -> Result<RunSnapshot> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read: {:?}", path))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse run: {:?}", path))
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        format!("{}...", s.chars().take(max_len - 3).collect::<String>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_archive() {
        let tmp = tempfile::TempDir::new().unwrap();
        let archive = RunArchive::new(tmp.path()).unwrap();

        assert!(archive.runs_dir().exists());
        assert!(archive.list().unwrap().is_empty());
        assert!(archive.latest().unwrap().is_none());
        assert!(archive.load("run-missing").is_err());
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a much longer goal text", 10), "a much ...");
    }
}
