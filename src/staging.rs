//! The staging area.
//!
//! `oracle add` copies files flat into `.oracle/staging/`; `oracle commit`
//! indexes them. Each copy remembers where it came from in a `.index` JSON
//! map (`name -> absolute origin path`) so commits track the original
//! filepath, not the staged copy. Two origins sharing a file name get
//! distinct copies (`mod.rs`, `2~mod.rs`).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tracing::debug;
use walkdir::WalkDir;

use crate::document_store::SourceFile;
use crate::project::STATE_DIR;

pub const INDEX_FILE: &str = ".index";

const SKIPPED_DIRS: &[&str] = &[".git", STATE_DIR];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    pub name: String,
    pub location: PathBuf,
    pub origin: PathBuf,
}

impl StagedFile {
    pub fn source(&self) -> SourceFile {
        SourceFile::staged(self.origin.display().to_string(), self.location.clone())
    }
}

pub struct Staging {
    dir: PathBuf,
}

impl Staging {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn index_path(&self) -> PathBuf {
        self.dir.join(INDEX_FILE)
    }

    fn load_index(&self) -> Result<BTreeMap<String, String>> {
        let path = self.index_path();
        if !path.exists() {
            return Ok(BTreeMap::new());
        }
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("Corrupt staging index {}", path.display()))
    }

    fn save_index(&self, index: &BTreeMap<String, String>) -> Result<()> {
        let json = serde_json::to_string_pretty(index)?;
        std::fs::write(self.index_path(), json)
            .with_context(|| format!("Failed to write {}", self.index_path().display()))
    }

    /// Stage a file, or every file under a directory.
    pub fn add(&self, path: &Path) -> Result<Vec<StagedFile>> {
        if !path.exists() {
            bail!("Path does not exist: {}", path.display());
        }
        let path = path
            .canonicalize()
            .with_context(|| format!("Failed to resolve {}", path.display()))?;
        std::fs::create_dir_all(&self.dir)?;

        let files: Vec<PathBuf> = if path.is_dir() {
            WalkDir::new(&path)
                .follow_links(false)
                .sort_by_file_name()
                .into_iter()
                .filter_entry(|e| {
                    e.depth() == 0
                        || !e
                            .file_name()
                            .to_str()
                            .map(|n| SKIPPED_DIRS.contains(&n))
                            .unwrap_or(false)
                })
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .map(|e| e.into_path())
                .collect()
        } else {
            vec![path]
        };

        let mut index = self.load_index()?;
        let mut staged = Vec::with_capacity(files.len());
        for origin in files {
            let Some(name) = origin.file_name().map(|n| n.to_string_lossy().to_string()) else {
                continue;
            };
            if name == INDEX_FILE {
                continue;
            }
            let origin_str = origin.display().to_string();
            let name = staged_name(&index, &self.dir, &name, &origin_str);

            let location = self.dir.join(&name);
            std::fs::copy(&origin, &location)
                .with_context(|| format!("Failed to stage {}", origin.display()))?;
            debug!(origin = %origin_str, "staged");
            index.insert(name.clone(), origin_str);
            staged.push(StagedFile {
                name,
                location,
                origin,
            });
        }
        self.save_index(&index)?;
        Ok(staged)
    }

    /// Unstage `path`. Matches the staged origin first, then a staged
    /// name equal to `path`'s file name.
    pub fn remove(&self, path: &Path) -> Result<bool> {
        let mut index = self.load_index()?;
        let origin = match path.canonicalize() {
            Ok(p) => p,
            Err(_) => std::env::current_dir()?.join(path),
        };
        let origin = origin.display().to_string();

        let name = match index.iter().find(|(_, o)| **o == origin) {
            Some((name, _)) => name.clone(),
            None => match path.file_name() {
                Some(n) => n.to_string_lossy().to_string(),
                None => return Ok(false),
            },
        };

        let location = self.dir.join(&name);
        let existed = location.is_file();
        if existed {
            std::fs::remove_file(&location)
                .with_context(|| format!("Failed to remove {}", location.display()))?;
        }
        let indexed = index.remove(&name).is_some();
        self.save_index(&index)?;
        Ok(existed || indexed)
    }

    /// Remove every staged file. Returns how many there were.
    pub fn clear(&self) -> Result<usize> {
        let staged = self.list()?;
        for file in &staged {
            std::fs::remove_file(&file.location)
                .with_context(|| format!("Failed to remove {}", file.location.display()))?;
        }
        if self.index_path().exists() {
            std::fs::remove_file(self.index_path())?;
        }
        Ok(staged.len())
    }

    /// Staged files sorted by name.
    pub fn list(&self) -> Result<Vec<StagedFile>> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }
        let index = self.load_index()?;
        let mut out = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if name == INDEX_FILE {
                continue;
            }
            let origin = index
                .get(&name)
                .map(PathBuf::from)
                .unwrap_or_else(|| entry.path());
            out.push(StagedFile {
                name,
                location: entry.path(),
                origin,
            });
        }
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }
}

/// The staged name for `origin`: its current copy if already staged, else
/// `file_name`, else the first free `N~file_name`.
fn staged_name(
    index: &BTreeMap<String, String>,
    dir: &Path,
    file_name: &str,
    origin: &str,
) -> String {
    if let Some((name, _)) = index.iter().find(|(_, o)| o.as_str() == origin) {
        return name.clone();
    }
    let free = |name: &str| !index.contains_key(name) && !dir.join(name).exists();
    if free(file_name) {
        return file_name.to_string();
    }
    let mut n = 2;
    loop {
        let candidate = format!("{}~{}", n, file_name);
        if free(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (tempfile::TempDir, Staging) {
        let dir = tempfile::tempdir().unwrap();
        let staging = Staging::new(dir.path().join(".oracle/staging"));
        (dir, staging)
    }

    #[test]
    fn test_add_directory_flattens_and_skips_vcs() {
        let (dir, staging) = setup();
        let src = dir.path().join("proj");
        std::fs::create_dir_all(src.join("pkg")).unwrap();
        std::fs::create_dir_all(src.join(".git")).unwrap();
        std::fs::write(src.join("pkg/lib.rs"), "pub fn a() {}").unwrap();
        std::fs::write(src.join("README.md"), "# proj").unwrap();
        std::fs::write(src.join(".git/HEAD"), "ref").unwrap();

        let staged = staging.add(&src).unwrap();
        assert_eq!(staged.len(), 2);

        let listed = staging.list().unwrap();
        let names: Vec<&str> = listed.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["README.md", "lib.rs"]);
        let lib = listed.iter().find(|f| f.name == "lib.rs").unwrap();
        assert!(lib.origin.ends_with("proj/pkg/lib.rs"));
        assert_eq!(lib.source().filepath, lib.origin.display().to_string());
    }

    #[test]
    fn test_remove_and_clear() {
        let (dir, staging) = setup();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        std::fs::write(&a, "a").unwrap();
        std::fs::write(&b, "b").unwrap();
        staging.add(&a).unwrap();
        staging.add(&b).unwrap();

        assert!(staging.remove(&a).unwrap());
        assert!(!staging.remove(&a).unwrap());
        assert_eq!(staging.list().unwrap().len(), 1);

        assert_eq!(staging.clear().unwrap(), 1);
        assert!(staging.list().unwrap().is_empty());
    }

    #[test]
    fn test_same_file_name_from_two_directories() {
        let (dir, staging) = setup();
        for pkg in ["a", "b"] {
            std::fs::create_dir_all(dir.path().join(pkg)).unwrap();
            std::fs::write(dir.path().join(pkg).join("mod.rs"), format!("// {}", pkg)).unwrap();
        }
        let a = dir.path().join("a/mod.rs");
        let b = dir.path().join("b/mod.rs");
        staging.add(&a).unwrap();
        staging.add(&b).unwrap();
        // Restaging reuses the existing copy.
        staging.add(&a).unwrap();

        let listed = staging.list().unwrap();
        assert_eq!(listed.len(), 2);
        for file in &listed {
            let pkg = if file.origin.ends_with("a/mod.rs") { "a" } else { "b" };
            let copy = std::fs::read_to_string(&file.location).unwrap();
            assert_eq!(copy, format!("// {}", pkg));
        }
        let names: Vec<&str> = listed.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["2~mod.rs", "mod.rs"]);

        assert!(staging.remove(&b).unwrap());
        let left = staging.list().unwrap();
        assert_eq!(left.len(), 1);
        assert!(left[0].origin.ends_with("a/mod.rs"));
    }

    #[test]
    fn test_add_missing_path() {
        let (dir, staging) = setup();
        assert!(staging.add(&dir.path().join("ghost.rs")).is_err());
    }
}
