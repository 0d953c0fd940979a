//! # repo-oracle
//!
//! A local-first assistant that answers questions about a code repository.
//!
//! Files are staged, then committed into two stores: a vector store of
//! embedded chunks and a relational catalog tracking one content digest per
//! file, so unchanged files are never re-embedded. Questions are answered by
//! a tool-calling agent loop that retrieves context, queries the catalog,
//! searches the web or reads the repository tree, and summarizes its own
//! history once it grows long.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐  add/commit  ┌───────────────┐    ┌────────────┐
//! │   CLI    │─────────────▶│ DocumentStore │──▶ │ vectors.db │
//! │ (oracle) │              │  digest+chunk │──▶ │ database.db│
//! └────┬─────┘              └───────▲───────┘    └────────────┘
//!      │ ask                        │ retrieve_context / search_db
//!      ▼                            │
//! ┌──────────┐  tool calls   ┌──────┴──────┐
//! │AgentLoop │──────────────▶│   ToolBox   │──▶ web search, repo tree
//! └──────────┘               └─────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`agent`] | Agent loop runtime with per-step checkpoints |
//! | [`tools`] | Closed set of tools and their execution |
//! | [`document_store`] | Change-aware indexing over both stores |
//! | [`registry`] | One live store per location pair |
//! | [`catalog`] | SQLite document catalog |
//! | [`vector_store`] | SQLite vector index |
//! | [`checkpoint`] | SQLite conversation checkpoints |
//! | [`sql_tool`] | Two-pass read-only SQL question answering |
//! | [`web_search`] | Web search provider and query reformulation |
//! | [`llm`] | Chat-completion providers |
//! | [`embedding`] | Embedding providers |
//! | [`repo_graph`] | Repository structure snapshot |
//! | [`staging`] | Staging area for `add` / `commit` |
//! | [`project`] | Project discovery and layout |
//! | [`config`] | TOML configuration |
//! | [`commands`] | CLI command implementations |

pub mod agent;
pub mod catalog;
pub mod checkpoint;
pub mod commands;
pub mod config;
pub mod db;
pub mod document_store;
pub mod embedding;
pub mod error;
pub mod http;
pub mod llm;
pub mod migrate;
pub mod progress;
pub mod project;
pub mod prompts;
pub mod registry;
pub mod repo_graph;
pub mod sql_tool;
pub mod staging;
pub mod tools;
pub mod vector_store;
pub mod web_search;
