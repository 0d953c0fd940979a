//! Project discovery and on-disk layout.
//!
//! A project is any directory holding a `.oracle/` state directory:
//!
//! ```text
//! .oracle/
//! ├── staging/              files queued for the next commit (+ .index)
//! ├── database.db           catalog, index journal, checkpoints
//! ├── vectors.db            embedded chunks
//! ├── thread                conversation thread id
//! ├── repo-graph-lock.json  repository structure snapshot
//! └── transcripts/          saved `ask --save` sessions
//! ```

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;

use crate::error::OracleError;
use crate::registry::StoreKey;

pub const STATE_DIR: &str = ".oracle";

#[derive(Debug, Clone)]
pub struct Project {
    root: PathBuf,
}

impl Project {
    /// Find the nearest project at or above `start`.
    pub fn discover(start: &Path) -> Result<Self> {
        let mut dir = start.to_path_buf();
        loop {
            if dir.join(STATE_DIR).is_dir() {
                return Ok(Self { root: dir });
            }
            if !dir.pop() {
                return Err(OracleError::NotInitialized(start.to_path_buf()).into());
            }
        }
    }

    /// Create the state directory under `root` and a fresh thread id.
    pub fn init(root: &Path) -> Result<Self> {
        let project = Self {
            root: root.to_path_buf(),
        };
        if project.state_dir().exists() {
            return Err(OracleError::AlreadyInitialized(project.state_dir()).into());
        }

        for dir in [project.staging_dir(), project.transcripts_dir()] {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        let thread = uuid::Uuid::new_v4().to_string();
        std::fs::write(project.thread_file(), format!("{}\n", thread))
            .with_context(|| format!("Failed to write {}", project.thread_file().display()))?;

        Ok(project)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn state_dir(&self) -> PathBuf {
        self.root.join(STATE_DIR)
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.state_dir().join("staging")
    }

    pub fn relational_db(&self) -> PathBuf {
        self.state_dir().join("database.db")
    }

    pub fn vector_db(&self) -> PathBuf {
        self.state_dir().join("vectors.db")
    }

    pub fn thread_file(&self) -> PathBuf {
        self.state_dir().join("thread")
    }

    pub fn graph_lock(&self) -> PathBuf {
        self.state_dir().join("repo-graph-lock.json")
    }

    pub fn transcripts_dir(&self) -> PathBuf {
        self.state_dir().join("transcripts")
    }

    pub fn store_key(&self) -> StoreKey {
        StoreKey::new(self.vector_db(), self.relational_db())
    }

    pub fn thread_id(&self) -> Result<String> {
        let raw = std::fs::read_to_string(self.thread_file())
            .with_context(|| format!("Failed to read {}", self.thread_file().display()))?;
        let id = raw.trim();
        if id.is_empty() {
            anyhow::bail!("Thread file {} is empty", self.thread_file().display());
        }
        Ok(id.to_string())
    }

    /// Delete the whole state directory.
    pub fn destroy(&self) -> Result<()> {
        std::fs::remove_dir_all(self.state_dir())
            .with_context(|| format!("Failed to remove {}", self.state_dir().display()))
    }

    /// Append a question/answer session to the thread's transcript file.
    pub fn save_transcript(&self, thread_id: &str, exchanges: &[(String, String)]) -> Result<PathBuf> {
        std::fs::create_dir_all(self.transcripts_dir())?;
        let path = self.transcripts_dir().join(format!("{}.txt", thread_id));
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open {}", path.display()))?;

        writeln!(file, "=== {} ===", Local::now().format("%Y-%m-%d %H:%M:%S"))?;
        for (question, answer) in exchanges {
            writeln!(file, "--- USER ---\n{}", question)?;
            writeln!(file, "--- AGENT ---\n{}\n", answer)?;
        }
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discover_from_nested_dir() {
        let root = tempfile::tempdir().unwrap();
        Project::init(root.path()).unwrap();
        let nested = root.path().join("src").join("deep");
        std::fs::create_dir_all(&nested).unwrap();

        let found = Project::discover(&nested).unwrap();
        assert_eq!(found.root(), root.path());
    }

    #[test]
    fn test_discover_outside_project() {
        let root = tempfile::tempdir().unwrap();
        let err = Project::discover(root.path()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<OracleError>(),
            Some(OracleError::NotInitialized(_))
        ));
    }

    #[test]
    fn test_init_twice_fails() {
        let root = tempfile::tempdir().unwrap();
        let project = Project::init(root.path()).unwrap();
        assert!(project.staging_dir().is_dir());
        assert_eq!(project.thread_id().unwrap().len(), 36);

        let err = Project::init(root.path()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<OracleError>(),
            Some(OracleError::AlreadyInitialized(_))
        ));
    }

    #[test]
    fn test_transcript_appends() {
        let root = tempfile::tempdir().unwrap();
        let project = Project::init(root.path()).unwrap();
        let exchanges = vec![("what?".to_string(), "that".to_string())];
        let path = project.save_transcript("t", &exchanges).unwrap();
        project.save_transcript("t", &exchanges).unwrap();

        let text = std::fs::read_to_string(path).unwrap();
        assert_eq!(text.matches("--- USER ---").count(), 2);
        assert!(text.contains("--- AGENT ---\nthat"));
    }
}
