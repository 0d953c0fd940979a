//! CLI command implementations.
//!
//! Each `run_*` function backs one `oracle` subcommand. Results go to stdout;
//! diagnostics go through `tracing` to stderr.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::warn;

use oracle_core::agent::TransitionPolicy;
use oracle_core::conversation::ChatModel;
use oracle_core::digest::content_digest;

use crate::agent::AgentLoop;
use crate::checkpoint::SqliteCheckpointSaver;
use crate::config::{self, Config};
use crate::document_store::{DocumentStore, SourceFile};
use crate::embedding::create_embedder;
use crate::error::OracleError;
use crate::llm::create_chat_model;
use crate::progress;
use crate::project::Project;
use crate::registry::StoreRegistry;
use crate::repo_graph;
use crate::staging::Staging;
use crate::tools::ToolBox;
use crate::web_search::create_web_search;

/// Registry wired with the configured embedder and chunking policy.
pub fn build_registry(cfg: &Config) -> Result<Arc<StoreRegistry>> {
    let embedder = create_embedder(&cfg.embedding)?;
    Ok(Arc::new(
        StoreRegistry::new(embedder, cfg.chunking.policy())
            .with_embed_batch_size(cfg.embedding.batch_size),
    ))
}

async fn open_store(
    registry: &StoreRegistry,
    project: &Project,
) -> Result<Arc<DocumentStore>> {
    registry.open(&project.store_key()).await
}

/// `oracle config`: write the template config if none exists.
pub fn run_config(path: &Path) -> Result<()> {
    if path.exists() {
        bail!("Config file already exists: {}", path.display());
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(path, config::CONFIG_TEMPLATE)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Wrote config template to {}", path.display());
    Ok(())
}

/// `oracle init`: create `.oracle/`, both databases and the snapshot.
pub async fn run_init(cfg: &Config, root: &Path) -> Result<()> {
    let project = Project::init(root)?;
    initialize_stores(cfg, &project).await?;
    println!("Initialized empty oracle project in {}", project.state_dir().display());
    Ok(())
}

async fn initialize_stores(cfg: &Config, project: &Project) -> Result<()> {
    let registry = build_registry(cfg)?;
    open_store(&registry, project).await?;
    registry.close_all().await;
    repo_graph::refresh(project.root(), &project.graph_lock())?;
    Ok(())
}

/// `oracle add <path>`
pub fn run_add(project: &Project, path: &Path) -> Result<()> {
    let staged = Staging::new(project.staging_dir()).add(path)?;
    if staged.is_empty() {
        println!("No files to stage under {}", path.display());
    } else {
        println!("Staged {} file(s).", staged.len());
    }
    Ok(())
}

/// `oracle rm <path>`
pub fn run_rm(project: &Project, path: &Path) -> Result<()> {
    if Staging::new(project.staging_dir()).remove(path)? {
        println!("Unstaged {}", path.display());
    } else {
        println!("{} is not staged.", path.display());
    }
    Ok(())
}

/// `oracle reset [--hard]`
pub async fn run_reset(cfg: &Config, project: &Project, hard: bool) -> Result<()> {
    if hard {
        project.destroy()?;
        let project = Project::init(project.root())?;
        initialize_stores(cfg, &project).await?;
        println!("Reset project at {}", project.root().display());
        return Ok(());
    }
    let cleared = Staging::new(project.staging_dir()).clear()?;
    println!("Cleared {} staged file(s).", cleared);
    Ok(())
}

/// `oracle status`
pub fn run_status(project: &Project) -> Result<()> {
    let staged = Staging::new(project.staging_dir()).list()?;
    if staged.is_empty() {
        println!("Nothing staged.");
        return Ok(());
    }
    println!("Staged for commit:");
    for file in staged {
        println!("  {}", file.origin.display());
    }
    Ok(())
}

/// `oracle diff`: classify staged files against the catalog.
pub async fn run_diff(cfg: &Config, project: &Project) -> Result<()> {
    let staged = Staging::new(project.staging_dir()).list()?;
    if staged.is_empty() {
        println!("Nothing staged.");
        return Ok(());
    }

    let registry = build_registry(cfg)?;
    let store = open_store(&registry, project).await?;

    let origins: Vec<String> = staged
        .iter()
        .filter(|f| f.origin.exists())
        .map(|f| f.origin.display().to_string())
        .collect();
    let known: HashMap<String, String> = store.get_current_hashes(&origins).await?;

    for file in &staged {
        let bytes = std::fs::read(&file.location)
            .with_context(|| format!("Failed to read {}", file.location.display()))?;
        let digest = content_digest(&bytes);
        let state = match known.get(&file.origin.display().to_string()) {
            None => "new",
            Some(h) if *h == digest => "unchanged",
            Some(_) => "modified",
        };
        println!("{:<10} {}", state, file.origin.display());
    }
    registry.close_all().await;
    Ok(())
}

/// `oracle commit [--verbose]`: index everything staged.
pub async fn run_commit(cfg: &Config, project: &Project, verbose: bool) -> Result<()> {
    let staging = Staging::new(project.staging_dir());
    let staged = staging.list()?;
    if staged.is_empty() {
        println!("Nothing to commit.");
        return Ok(());
    }

    let registry = build_registry(cfg)?;
    let store = open_store(&registry, project).await?;
    let sources: Vec<SourceFile> = staged.iter().map(|f| f.source()).collect();
    let reporter = progress::reporter(verbose);
    let report = store
        .add_documents_batch(&sources, reporter.as_ref())
        .await?;

    for (path, reason) in &report.skipped {
        warn!(path = %path, "not indexed: {}", reason);
    }
    repo_graph::refresh(project.root(), &project.graph_lock())?;
    staging.clear()?;
    registry.close_all().await;

    println!("Commit complete:");
    println!("  indexed:   {}", report.indexed.len());
    println!("  unchanged: {}", report.unchanged.len());
    println!("  skipped:   {}", report.skipped.len());
    println!("  chunks:    {}", report.chunks_written);
    Ok(())
}

/// `oracle ls`: the catalog as a table.
pub async fn run_ls(cfg: &Config, project: &Project) -> Result<()> {
    let registry = build_registry(cfg)?;
    let store = open_store(&registry, project).await?;
    let docs = store.list().await?;
    registry.close_all().await;

    if docs.is_empty() {
        println!("No documents indexed.");
        return Ok(());
    }
    println!(
        "{:<36}  {:<12}  {:>6}  {:<25}  FILEPATH",
        "ID", "HASH", "CHUNKS", "LAST INDEXED"
    );
    for doc in docs {
        let short_hash: String = doc.content_hash.chars().take(12).collect();
        println!(
            "{:<36}  {:<12}  {:>6}  {:<25}  {}",
            doc.id, short_hash, doc.chunk_count, doc.last_indexed, doc.filepath
        );
    }
    Ok(())
}

/// `oracle search <query> [-k N]`
pub async fn run_search(cfg: &Config, project: &Project, query: &str, k: Option<usize>) -> Result<()> {
    let k = k.unwrap_or(cfg.retrieval.search_k).max(1);
    let registry = build_registry(cfg)?;
    let store = open_store(&registry, project).await?;
    let results = store.similarity_search(query, k).await?;
    registry.close_all().await;

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }
    for (i, result) in results.iter().enumerate() {
        let meta = &result.chunk.metadata;
        println!("{}. [{:.3}] {} (offset {})", i + 1, result.score, meta.source, meta.start_index);
        let excerpt: String = result.chunk.text.chars().take(240).collect();
        for line in excerpt.lines() {
            println!("    {}", line);
        }
        println!();
    }
    Ok(())
}

/// `oracle tree`
pub fn run_tree(project: &Project) -> Result<()> {
    let tree = repo_graph::load(&project.graph_lock())?;
    print!("{}", tree.render());
    Ok(())
}

fn summarizer_model(cfg: &Config, chat: &Arc<dyn ChatModel>) -> Result<Arc<dyn ChatModel>> {
    if cfg.summarizer.is_enabled() {
        create_chat_model(&cfg.summarizer, "Summarizer")
    } else {
        Ok(Arc::clone(chat))
    }
}

/// Agent wired to the project's stores and the configured providers.
pub async fn build_agent(
    cfg: &Config,
    project: &Project,
    registry: Arc<StoreRegistry>,
) -> Result<AgentLoop> {
    if !cfg.chat.is_enabled() {
        return Err(OracleError::ProviderNotConfigured("Chat").into());
    }
    let chat = create_chat_model(&cfg.chat, "Chat")?;
    let summarizer = summarizer_model(cfg, &chat)?;
    let web = create_web_search(&cfg.web_search)?;

    open_store(&registry, project).await?;
    let checkpoints = Arc::new(
        SqliteCheckpointSaver::new(registry.relational_pool(&project.relational_db()).await?)
            .with_retention(cfg.agent.checkpoint_retention),
    );

    let tools = ToolBox::new(registry, summarizer, web, project.graph_lock())
        .with_top_k(cfg.retrieval.top_k)
        .with_sql_limits(cfg.sql.top_k, cfg.sql.max_rows);

    Ok(AgentLoop::new(chat, tools, checkpoints, project.store_key())
        .with_policy(TransitionPolicy {
            summarize_after: cfg.agent.summarize_after,
            retain_recent: cfg.agent.retain_recent,
        })
        .with_max_steps(cfg.agent.max_steps))
}

/// `oracle ask [--save]`: interactive session on the project thread.
pub async fn run_ask(cfg: &Config, project: &Project, save: bool) -> Result<()> {
    let registry = build_registry(cfg)?;
    let agent = build_agent(cfg, project, Arc::clone(&registry)).await?;
    let thread_id = project.thread_id()?;

    println!("Ask about this repository. Enter q to quit.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    let mut exchanges: Vec<(String, String)> = Vec::new();

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if question == "q" || question == "Q" {
            break;
        }

        match agent.run_turn(&thread_id, question).await {
            Ok(answer) => {
                println!("{}\n", answer);
                exchanges.push((question.to_string(), answer));
            }
            Err(e) => eprintln!("Error: {:#}\n", e),
        }
    }

    if save && !exchanges.is_empty() {
        let path = project.save_transcript(&thread_id, &exchanges)?;
        println!("Transcript saved to {}", path.display());
    }
    registry.close_all().await;
    Ok(())
}
