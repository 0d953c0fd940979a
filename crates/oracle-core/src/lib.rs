//! # Oracle Core
//!
//! Shared, runtime-agnostic logic for repo-oracle: data models, chunk
//! splitting, store and provider traits, conversation types, the agent's
//! transition rules, and the repository tree.
//!
//! This crate contains no tokio, sqlx, HTTP clients, or filesystem I/O.
//! Everything that touches a disk or a network lives in the `repo-oracle`
//! application crate and plugs in through the traits defined here.

pub mod agent;
pub mod chunk;
pub mod conversation;
pub mod digest;
pub mod embedding;
pub mod error;
pub mod models;
pub mod repo_tree;
pub mod store;

pub use error::CoreError;
