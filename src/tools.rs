//! The tools offered to the model.
//!
//! The set is closed: a [`ToolCall`] from the model is parsed into a
//! [`ToolInvocation`] variant carrying typed arguments, and [`ToolBox`]
//! matches on it exhaustively.
//!
//! ```text
//!   ToolCall { name, arguments }
//!            │ ToolInvocation::parse
//!            ▼
//!   ToolInvocation ──inject_store_paths──► ToolInvocation
//!            │ ToolBox::execute
//!            ▼
//!   ToolOutput::Text | ToolOutput::TextWithArtifacts
//! ```
//!
//! Two tools take store locations as arguments. The agent loop overwrites
//! them with [`ToolInvocation::inject_store_paths`] before execution; tool
//! bodies use whatever paths they are given and never look them up.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{json, Value};

use oracle_core::conversation::{ChatModel, ToolCall, ToolSpec};
use oracle_core::models::ScoredChunk;

use crate::error::OracleError;
use crate::registry::{StoreKey, StoreRegistry};
use crate::repo_graph;
use crate::sql_tool;
use crate::web_search::{self, WebSearch};

pub const RETRIEVE_CONTEXT: &str = "retrieve_context";
pub const SEARCH_WEB: &str = "search_web";
pub const SEARCH_DB: &str = "search_db";
pub const RETRIEVE_REPO_GRAPH: &str = "retrieve_repo_graph";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RetrieveContextArgs {
    pub query: String,
    #[serde(default)]
    pub vector_db_path: String,
    #[serde(default)]
    pub relational_db_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SearchWebArgs {
    pub search_terms: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SearchDbArgs {
    pub query: String,
    #[serde(default)]
    pub relational_db_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolInvocation {
    RetrieveContext(RetrieveContextArgs),
    SearchWeb(SearchWebArgs),
    SearchDb(SearchDbArgs),
    RetrieveRepoGraph,
}

impl ToolInvocation {
    /// Parse a model tool call. Unknown names and malformed arguments fail.
    pub fn parse(call: &ToolCall) -> Result<Self> {
        let args = match &call.arguments {
            Value::Null => json!({}),
            other => other.clone(),
        };
        let invocation = match call.name.as_str() {
            RETRIEVE_CONTEXT => ToolInvocation::RetrieveContext(
                serde_json::from_value(args).context("invalid arguments")?,
            ),
            SEARCH_WEB => {
                ToolInvocation::SearchWeb(serde_json::from_value(args).context("invalid arguments")?)
            }
            SEARCH_DB => {
                ToolInvocation::SearchDb(serde_json::from_value(args).context("invalid arguments")?)
            }
            RETRIEVE_REPO_GRAPH => ToolInvocation::RetrieveRepoGraph,
            other => return Err(OracleError::UnknownTool(other.to_string()).into()),
        };
        Ok(invocation)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ToolInvocation::RetrieveContext(_) => RETRIEVE_CONTEXT,
            ToolInvocation::SearchWeb(_) => SEARCH_WEB,
            ToolInvocation::SearchDb(_) => SEARCH_DB,
            ToolInvocation::RetrieveRepoGraph => RETRIEVE_REPO_GRAPH,
        }
    }

    /// Overwrite any store locations with the deployment's own.
    pub fn inject_store_paths(&mut self, stores: &StoreKey) {
        match self {
            ToolInvocation::RetrieveContext(args) => {
                args.vector_db_path = stores.vector.display().to_string();
                args.relational_db_path = stores.relational.display().to_string();
            }
            ToolInvocation::SearchDb(args) => {
                args.relational_db_path = stores.relational.display().to_string();
            }
            ToolInvocation::SearchWeb(_) | ToolInvocation::RetrieveRepoGraph => {}
        }
    }
}

#[derive(Debug, Clone)]
pub enum ToolOutput {
    Text(String),
    TextWithArtifacts(String, Vec<ScoredChunk>),
}

impl ToolOutput {
    /// The part that becomes the visible tool-result message.
    pub fn into_text(self) -> String {
        match self {
            ToolOutput::Text(text) | ToolOutput::TextWithArtifacts(text, _) => text,
        }
    }
}

/// Definitions sent to the model with every decision step.
pub fn tool_specs() -> Vec<ToolSpec> {
    vec![
        ToolSpec {
            name: RETRIEVE_CONTEXT.to_string(),
            description: "Semantic search over the indexed repository files. Returns the \
                          best-matching chunks with their source metadata."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string", "description": "What to look for."},
                    "vector_db_path": {"type": "string", "description": "Leave empty; filled in automatically."},
                    "relational_db_path": {"type": "string", "description": "Leave empty; filled in automatically."}
                },
                "required": ["query"]
            }),
        },
        ToolSpec {
            name: SEARCH_WEB.to_string(),
            description: "Search the web for information the repository does not contain."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "search_terms": {"type": "string", "description": "What to search for."}
                },
                "required": ["search_terms"]
            }),
        },
        ToolSpec {
            name: SEARCH_DB.to_string(),
            description: "Answer a question about the index catalog (indexed files, hashes, \
                          chunk counts, timestamps) by querying its SQL database."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string", "description": "The question or SQL query to run."},
                    "relational_db_path": {"type": "string", "description": "Leave empty; filled in automatically."}
                },
                "required": ["query"]
            }),
        },
        ToolSpec {
            name: RETRIEVE_REPO_GRAPH.to_string(),
            description: "The repository's directory tree.".to_string(),
            parameters: json!({"type": "object", "properties": {}}),
        },
    ]
}

/// Executes tool invocations against their backing services.
pub struct ToolBox {
    registry: Arc<StoreRegistry>,
    summarizer: Arc<dyn ChatModel>,
    web: Arc<dyn WebSearch>,
    graph_lock: PathBuf,
    top_k: usize,
    sql_top_k: usize,
    sql_max_rows: usize,
}

impl ToolBox {
    pub fn new(
        registry: Arc<StoreRegistry>,
        summarizer: Arc<dyn ChatModel>,
        web: Arc<dyn WebSearch>,
        graph_lock: PathBuf,
    ) -> Self {
        Self {
            registry,
            summarizer,
            web,
            graph_lock,
            top_k: 10,
            sql_top_k: 5,
            sql_max_rows: 100,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    pub fn with_sql_limits(mut self, top_k: usize, max_rows: usize) -> Self {
        self.sql_top_k = top_k.max(1);
        self.sql_max_rows = max_rows.max(1);
        self
    }

    pub async fn execute(&self, invocation: ToolInvocation) -> Result<ToolOutput> {
        match invocation {
            ToolInvocation::RetrieveContext(args) => self.retrieve_context(args).await,
            ToolInvocation::SearchWeb(args) => self.search_web(args).await,
            ToolInvocation::SearchDb(args) => Ok(self.search_db(args).await),
            ToolInvocation::RetrieveRepoGraph => self.retrieve_repo_graph(),
        }
    }

    async fn retrieve_context(&self, args: RetrieveContextArgs) -> Result<ToolOutput> {
        let key = StoreKey::new(&args.vector_db_path, &args.relational_db_path);
        let store = self.registry.open(&key).await?;
        let matches = store.similarity_search(&args.query, self.top_k).await?;

        if matches.is_empty() {
            return Ok(ToolOutput::TextWithArtifacts(
                "No matching context found.".to_string(),
                matches,
            ));
        }

        let serialized = matches
            .iter()
            .map(|m| {
                let meta = serde_json::to_string(&m.chunk.metadata)
                    .unwrap_or_else(|_| m.chunk.metadata.source.clone());
                format!("Source: {}\nContent: {}", meta, m.chunk.text)
            })
            .collect::<Vec<_>>()
            .join("\n\n");
        Ok(ToolOutput::TextWithArtifacts(serialized, matches))
    }

    async fn search_web(&self, args: SearchWebArgs) -> Result<ToolOutput> {
        let query = web_search::reformulate_query(self.summarizer.as_ref(), &args.search_terms).await?;
        tracing::debug!(query = %query, "web search");
        let results = self.web.search(&query).await?;
        Ok(ToolOutput::Text(web_search::format_results(&results)))
    }

    async fn search_db(&self, args: SearchDbArgs) -> ToolOutput {
        let pool = match self
            .registry
            .read_only_pool(std::path::Path::new(&args.relational_db_path))
            .await
        {
            Ok(pool) => pool,
            Err(e) => return ToolOutput::Text(format!("Error querying database: {:#}", e)),
        };
        ToolOutput::Text(
            sql_tool::search_db(
                self.summarizer.as_ref(),
                &pool,
                &args.query,
                self.sql_top_k,
                self.sql_max_rows,
            )
            .await,
        )
    }

    fn retrieve_repo_graph(&self) -> Result<ToolOutput> {
        let tree = repo_graph::load(&self.graph_lock)?;
        Ok(ToolOutput::Text(tree.render()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, arguments: Value) -> ToolCall {
        ToolCall {
            id: "1".into(),
            name: name.into(),
            arguments,
        }
    }

    #[test]
    fn test_parse_each_tool() {
        let rc = ToolInvocation::parse(&call(RETRIEVE_CONTEXT, json!({"query": "q"}))).unwrap();
        assert_eq!(rc.name(), RETRIEVE_CONTEXT);

        let web = ToolInvocation::parse(&call(SEARCH_WEB, json!({"search_terms": "tokio"}))).unwrap();
        assert_eq!(
            web,
            ToolInvocation::SearchWeb(SearchWebArgs {
                search_terms: "tokio".into()
            })
        );

        let graph = ToolInvocation::parse(&call(RETRIEVE_REPO_GRAPH, Value::Null)).unwrap();
        assert_eq!(graph, ToolInvocation::RetrieveRepoGraph);
    }

    #[test]
    fn test_parse_failures() {
        let err = ToolInvocation::parse(&call("rm_rf", json!({}))).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<OracleError>(),
            Some(OracleError::UnknownTool(name)) if name == "rm_rf"
        ));
        assert!(ToolInvocation::parse(&call(SEARCH_DB, json!({"sql": "x"}))).is_err());
    }

    #[test]
    fn test_injection_overrides_model_paths() {
        let stores = StoreKey::new("/proj/.oracle/vectors.db", "/proj/.oracle/database.db");

        let mut rc = ToolInvocation::parse(&call(
            RETRIEVE_CONTEXT,
            json!({"query": "q", "vector_db_path": "/etc/passwd", "relational_db_path": "../../x"}),
        ))
        .unwrap();
        rc.inject_store_paths(&stores);
        match rc {
            ToolInvocation::RetrieveContext(a) => {
                assert_eq!(a.vector_db_path, "/proj/.oracle/vectors.db");
                assert_eq!(a.relational_db_path, "/proj/.oracle/database.db");
                assert_eq!(a.query, "q");
            }
            other => panic!("unexpected {:?}", other),
        }

        let mut db = ToolInvocation::parse(&call(SEARCH_DB, json!({"query": "q"}))).unwrap();
        db.inject_store_paths(&stores);
        match db {
            ToolInvocation::SearchDb(a) => assert_eq!(a.relational_db_path, "/proj/.oracle/database.db"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_output_drops_artifacts() {
        let out = ToolOutput::TextWithArtifacts("shown".into(), vec![]);
        assert_eq!(out.into_text(), "shown");
    }

    #[test]
    fn test_specs_cover_every_tool() {
        let names: Vec<String> = tool_specs().into_iter().map(|s| s.name).collect();
        assert_eq!(
            names,
            vec![RETRIEVE_CONTEXT, SEARCH_WEB, SEARCH_DB, RETRIEVE_REPO_GRAPH]
        );
    }
}
