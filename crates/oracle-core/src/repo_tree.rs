//! Repository structure as an ownership tree.
//!
//! Nodes live in an arena; each directory owns the indices of its children
//! and a `path → index` map gives constant-time lookup. The tree persists
//! as node-link JSON (`nodes` + parent→child `links` keyed by path) and
//! renders as a box-drawing outline:
//!
//! ```text
//! ╙── project
//!     ├── src
//!     │   └── main.rs
//!     └── README.md
//! ```

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeNode {
    pub name: String,
    pub path: String,
    pub is_dir: bool,
    pub children: Vec<usize>,
}

impl TreeNode {
    pub fn is_file(&self) -> bool {
        !self.is_dir
    }
}

/// Serialized node of the snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeEntry {
    pub name: String,
    pub path: String,
    pub is_file: bool,
    pub is_dir: bool,
}

/// Serialized parent→child containment edge, by path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkEntry {
    pub source: String,
    pub target: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeLink {
    #[serde(default = "default_directed")]
    pub directed: bool,
    pub nodes: Vec<NodeEntry>,
    pub links: Vec<LinkEntry>,
}

fn default_directed() -> bool {
    true
}

#[derive(Debug, Clone)]
pub struct RepoTree {
    nodes: Vec<TreeNode>,
    index: HashMap<String, usize>,
}

impl RepoTree {
    pub const ROOT: usize = 0;

    pub fn new(root_name: impl Into<String>, root_path: impl Into<String>) -> Self {
        let root = TreeNode {
            name: root_name.into(),
            path: root_path.into(),
            is_dir: true,
            children: Vec::new(),
        };
        let mut index = HashMap::new();
        index.insert(root.path.clone(), Self::ROOT);
        Self {
            nodes: vec![root],
            index,
        }
    }

    /// Attach a node under the node at `parent_path`.
    ///
    /// Re-adding an existing path returns its index unchanged.
    pub fn insert(
        &mut self,
        parent_path: &str,
        name: impl Into<String>,
        path: impl Into<String>,
        is_dir: bool,
    ) -> Result<usize, CoreError> {
        let path = path.into();
        if let Some(&existing) = self.index.get(&path) {
            return Ok(existing);
        }
        let parent = *self.index.get(parent_path).ok_or_else(|| {
            CoreError::MalformedSnapshot(format!("unknown parent path: {}", parent_path))
        })?;
        if !self.nodes[parent].is_dir {
            return Err(CoreError::MalformedSnapshot(format!(
                "file node cannot have children: {}",
                parent_path
            )));
        }

        let id = self.nodes.len();
        self.index.insert(path.clone(), id);
        self.nodes.push(TreeNode {
            name: name.into(),
            path,
            is_dir,
            children: Vec::new(),
        });
        self.nodes[parent].children.push(id);
        Ok(id)
    }

    pub fn root(&self) -> &TreeNode {
        &self.nodes[Self::ROOT]
    }

    pub fn get(&self, path: &str) -> Option<&TreeNode> {
        self.index.get(path).map(|&i| &self.nodes[i])
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    pub fn file_count(&self) -> usize {
        self.nodes.iter().filter(|n| !n.is_dir).count()
    }

    /// Order every child list by name.
    pub fn sort_children(&mut self) {
        let names: Vec<String> = self.nodes.iter().map(|n| n.name.clone()).collect();
        for node in &mut self.nodes {
            node.children.sort_by(|a, b| names[*a].cmp(&names[*b]));
        }
    }

    pub fn to_node_link(&self) -> NodeLink {
        let nodes = self
            .nodes
            .iter()
            .map(|n| NodeEntry {
                name: n.name.clone(),
                path: n.path.clone(),
                is_file: !n.is_dir,
                is_dir: n.is_dir,
            })
            .collect();
        let links = self
            .nodes
            .iter()
            .flat_map(|parent| {
                parent.children.iter().map(move |&c| LinkEntry {
                    source: parent.path.clone(),
                    target: self.nodes[c].path.clone(),
                })
            })
            .collect();
        NodeLink {
            directed: true,
            nodes,
            links,
        }
    }

    /// Rebuild a tree from node-link data.
    ///
    /// The graph must have exactly one root, every node at most one parent,
    /// and every node reachable from the root.
    pub fn from_node_link(data: &NodeLink) -> Result<Self, CoreError> {
        let by_path: HashMap<&str, &NodeEntry> =
            data.nodes.iter().map(|n| (n.path.as_str(), n)).collect();
        if by_path.len() != data.nodes.len() {
            return Err(CoreError::MalformedSnapshot("duplicate node path".into()));
        }

        let mut children: HashMap<&str, Vec<&str>> = HashMap::new();
        let mut has_parent: HashSet<&str> = HashSet::new();
        for link in &data.links {
            for end in [&link.source, &link.target] {
                if !by_path.contains_key(end.as_str()) {
                    return Err(CoreError::MalformedSnapshot(format!(
                        "link references unknown node: {}",
                        end
                    )));
                }
            }
            if !has_parent.insert(link.target.as_str()) {
                return Err(CoreError::MalformedSnapshot(format!(
                    "node has more than one parent: {}",
                    link.target
                )));
            }
            children
                .entry(link.source.as_str())
                .or_default()
                .push(link.target.as_str());
        }

        let roots: Vec<&NodeEntry> = data
            .nodes
            .iter()
            .filter(|n| !has_parent.contains(n.path.as_str()))
            .collect();
        let root = match roots.as_slice() {
            [only] => *only,
            [] => return Err(CoreError::MalformedSnapshot("no root node".into())),
            _ => return Err(CoreError::MalformedSnapshot("multiple root nodes".into())),
        };

        let mut tree = RepoTree::new(root.name.clone(), root.path.clone());
        let mut stack = vec![root.path.as_str()];
        while let Some(parent) = stack.pop() {
            for &child in children.get(parent).map(Vec::as_slice).unwrap_or(&[]) {
                let entry = by_path[child];
                tree.insert(parent, entry.name.clone(), entry.path.clone(), entry.is_dir)?;
                stack.push(child);
            }
        }

        if tree.len() != data.nodes.len() {
            return Err(CoreError::MalformedSnapshot(
                "nodes unreachable from root".into(),
            ));
        }
        Ok(tree)
    }

    pub fn to_json(&self) -> Result<String, CoreError> {
        Ok(serde_json::to_string_pretty(&self.to_node_link())?)
    }

    pub fn from_json(json: &str) -> Result<Self, CoreError> {
        let data: NodeLink = serde_json::from_str(json)?;
        Self::from_node_link(&data)
    }

    /// Indented outline of names.
    pub fn render(&self) -> String {
        let mut out = format!("╙── {}\n", self.root().name);
        self.render_children(Self::ROOT, "    ", &mut out);
        out
    }

    fn render_children(&self, node: usize, prefix: &str, out: &mut String) {
        let children = &self.nodes[node].children;
        for (i, &child) in children.iter().enumerate() {
            let last = i + 1 == children.len();
            let (connector, extend) = if last {
                ("└── ", "    ")
            } else {
                ("├── ", "│   ")
            };
            out.push_str(prefix);
            out.push_str(connector);
            out.push_str(&self.nodes[child].name);
            out.push('\n');
            self.render_children(child, &format!("{}{}", prefix, extend), out);
        }
    }
}
