//! Repository structure snapshot.
//!
//! Walks the project tree (skipping VCS metadata, the tool's own state and
//! common build/cache directories), builds a [`RepoTree`], and persists it
//! as node-link JSON in `.oracle/repo-graph-lock.json`.

use std::path::Path;

use anyhow::{Context, Result};
use walkdir::{DirEntry, WalkDir};

use oracle_core::repo_tree::RepoTree;

pub const EXCLUDED_DIRS: &[&str] = &[
    ".git",
    ".oracle",
    "__pycache__",
    ".DS_Store",
    "dist",
    "build",
    "env",
    "venv",
    ".venv",
    "pytest_cache",
    ".pytest_cache",
    "target",
    "node_modules",
];

fn is_excluded(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .map(|name| EXCLUDED_DIRS.contains(&name))
            .unwrap_or(false)
}

/// Build the tree rooted at `root`.
pub fn build(root: &Path) -> Result<RepoTree> {
    let root_name = root
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| root.display().to_string());
    let mut tree = RepoTree::new(root_name, root.display().to_string());

    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_excluded(e));

    for entry in walker {
        let entry = entry.with_context(|| format!("Failed to walk {}", root.display()))?;
        if entry.depth() == 0 {
            continue;
        }
        let parent = entry
            .path()
            .parent()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        tree.insert(
            &parent,
            entry.file_name().to_string_lossy().to_string(),
            entry.path().display().to_string(),
            entry.file_type().is_dir(),
        )?;
    }

    tree.sort_children();
    Ok(tree)
}

pub fn save(tree: &RepoTree, lock_path: &Path) -> Result<()> {
    let json = tree.to_json()?;
    std::fs::write(lock_path, json)
        .with_context(|| format!("Failed to write {}", lock_path.display()))
}

pub fn load(lock_path: &Path) -> Result<RepoTree> {
    let json = std::fs::read_to_string(lock_path).with_context(|| {
        format!(
            "No repository snapshot at {} (run `oracle commit` to create one)",
            lock_path.display()
        )
    })?;
    Ok(RepoTree::from_json(&json)?)
}

/// Rebuild the snapshot of `root` and write it to `lock_path`.
pub fn refresh(root: &Path, lock_path: &Path) -> Result<RepoTree> {
    let tree = build(root)?;
    save(&tree, lock_path)?;
    tracing::debug!(nodes = tree.len(), files = tree.file_count(), "repository snapshot written");
    Ok(tree)
}
