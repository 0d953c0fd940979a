//! Natural-language questions over the relational catalog.
//!
//! The `search_db` tool runs as a three-stage pipeline:
//!
//! 1. **check**: the model reviews the incoming query against a checklist
//!    of common SQL mistakes and the live schema, and returns a corrected
//!    query (or the original).
//! 2. **generate**: the model is asked for one read-only, row-limited query
//!    and may call `sql_db_query` with it. A plain-text reply is returned
//!    as the answer instead.
//! 3. **execute**: [`ensure_read_only`] gates the statement, then it runs
//!    inside a transaction that is always rolled back, on a read-only
//!    connection when called through the tool.
//!
//! [`search_db`] never fails: any error becomes
//! `"Error querying database: <cause>"`.

use anyhow::Result;
use serde_json::{json, Value};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row, SqlitePool, ValueRef};
use tracing::debug;

use oracle_core::conversation::{ChatModel, Message, ToolSpec};

use crate::error::OracleError;
use crate::prompts;

const DIALECT: &str = "SQLite";

/// Statement keywords that write. `replace` is only a write as
/// `REPLACE INTO`; on its own it is the string function.
const MUTATING_KEYWORDS: &[&str] = &[
    "insert", "update", "delete", "drop", "alter", "create", "attach", "detach", "pragma",
    "vacuum", "reindex",
];

/// Result of the generation stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Generated {
    Query(String),
    Answer(String),
}

/// Rows returned by the execution stage, already rendered per cell.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryRows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub truncated: bool,
}

impl QueryRows {
    /// One parenthesized, comma-separated line per row.
    pub fn render(&self) -> String {
        if self.rows.is_empty() {
            return "No results found".to_string();
        }
        let mut out = self
            .rows
            .iter()
            .map(|r| format!("({})", r.join(", ")))
            .collect::<Vec<_>>()
            .join("\n");
        if self.truncated {
            out.push_str(&format!("\n(truncated to {} rows)", self.rows.len()));
        }
        out
    }
}

/// `CREATE` statements of every user table.
pub async fn schema_text(pool: &SqlitePool) -> Result<String> {
    let statements: Vec<String> = sqlx::query_scalar(
        "SELECT sql FROM sqlite_master \
         WHERE type = 'table' AND name NOT LIKE 'sqlite_%' AND sql IS NOT NULL \
         ORDER BY name",
    )
    .fetch_all(pool)
    .await?;
    Ok(statements.join(";\n\n"))
}

/// Accept a single `SELECT`/`WITH` statement that writes nothing.
/// Returns the statement without a trailing semicolon.
///
/// String literals, quoted identifiers and comments are masked before the
/// keyword scan, so `WHERE filepath = 'src/delete.rs'` and calls such as
/// `replace(filepath, ...)` pass. The connection the tool runs on is
/// read-only as well.
pub fn ensure_read_only(sql: &str) -> Result<String> {
    let statement = sql.trim().trim_end_matches(';').trim();
    let reject = || OracleError::ReadOnlyViolation(sql.trim().to_string());

    let Some(masked) = mask_literals(sql) else {
        return Err(reject().into());
    };
    let masked = masked.trim().trim_end_matches(|c: char| c == ';' || c.is_whitespace());
    if masked.is_empty() || masked.contains(';') {
        return Err(reject().into());
    }

    let words: Vec<String> = masked
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect();

    match words.first().map(String::as_str) {
        Some("select") | Some("with") => {}
        _ => return Err(reject().into()),
    }
    let writes = words.iter().any(|w| MUTATING_KEYWORDS.contains(&w.as_str()))
        || words.windows(2).any(|pair| pair[0] == "replace" && pair[1] == "into");
    if writes {
        return Err(reject().into());
    }
    Ok(statement.to_string())
}

/// Blank out quoted text and drop comments. `None` when a quote is left
/// open.
fn mask_literals(sql: &str) -> Option<String> {
    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        let close = match c {
            '\'' | '"' | '`' => c,
            '[' => ']',
            '-' if chars.peek() == Some(&'-') => {
                for next in chars.by_ref() {
                    if next == '\n' {
                        break;
                    }
                }
                out.push('\n');
                continue;
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for next in chars.by_ref() {
                    if prev == '*' && next == '/' {
                        break;
                    }
                    prev = next;
                }
                out.push(' ');
                continue;
            }
            _ => {
                out.push(c);
                continue;
            }
        };

        let mut closed = false;
        while let Some(next) = chars.next() {
            if next == close {
                // A doubled quote is an escaped quote, except for brackets.
                if close != ']' && chars.peek() == Some(&close) {
                    chars.next();
                    continue;
                }
                closed = true;
                break;
            }
        }
        if !closed {
            return None;
        }
        out.push_str(" _ ");
    }
    Some(out)
}

/// Run a read-only statement in a transaction that is rolled back.
pub async fn execute(pool: &SqlitePool, sql: &str, max_rows: usize) -> Result<QueryRows> {
    let statement = ensure_read_only(sql)?;

    let mut tx = pool.begin().await?;
    let fetched = sqlx::query(&statement).fetch_all(&mut *tx).await;
    tx.rollback().await?;
    let fetched = fetched?;

    let columns = fetched
        .first()
        .map(|r| r.columns().iter().map(|c| c.name().to_string()).collect())
        .unwrap_or_default();
    let truncated = fetched.len() > max_rows;
    let rows = fetched.iter().take(max_rows).map(render_row).collect();

    Ok(QueryRows {
        columns,
        rows,
        truncated,
    })
}

fn render_row(row: &SqliteRow) -> Vec<String> {
    (0..row.columns().len()).map(|i| render_cell(row, i)).collect()
}

fn render_cell(row: &SqliteRow, i: usize) -> String {
    if row.try_get_raw(i).map(|v| v.is_null()).unwrap_or(true) {
        return "NULL".to_string();
    }
    if let Ok(v) = row.try_get::<i64, _>(i) {
        return v.to_string();
    }
    if let Ok(v) = row.try_get::<f64, _>(i) {
        return v.to_string();
    }
    if let Ok(v) = row.try_get::<String, _>(i) {
        return format!("'{}'", v.replace('\'', "\\'"));
    }
    if let Ok(v) = row.try_get::<Vec<u8>, _>(i) {
        return format!("<{} bytes>", v.len());
    }
    "?".to_string()
}

fn strip_fences(text: &str) -> String {
    let trimmed = text.trim();
    if let Some(rest) = trimmed.strip_prefix("```") {
        let body = rest.split_once('\n').map(|(_, b)| b).unwrap_or("");
        return body.trim_end().trim_end_matches("```").trim().to_string();
    }
    trimmed.to_string()
}

fn query_tool_spec() -> ToolSpec {
    ToolSpec {
        name: "sql_db_query".to_string(),
        description: "Execute a read-only SQL query against the database and get back the result."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "A detailed and correct SQL query."}
            },
            "required": ["query"]
        }),
    }
}

/// Stage 1: have the model review `query` against the schema.
pub async fn check_query(model: &dyn ChatModel, schema: &str, query: &str) -> Result<String> {
    let system = prompts::sql_check_prompt(DIALECT, schema);
    let reply = model
        .complete(Some(&system), &[Message::user(query)], &[])
        .await?;
    let checked = strip_fences(&reply.content.answer_text());
    Ok(if checked.is_empty() {
        query.to_string()
    } else {
        checked
    })
}

/// Stage 2: ask for one query to run, or a direct answer.
pub async fn generate_query(
    model: &dyn ChatModel,
    schema: &str,
    request: &str,
    top_k: usize,
) -> Result<Generated> {
    let system = prompts::sql_generate_prompt(DIALECT, top_k, schema);
    let reply = model
        .complete(Some(&system), &[Message::user(request)], &[query_tool_spec()])
        .await?;

    let query = reply
        .tool_calls
        .iter()
        .find(|c| c.name == "sql_db_query")
        .and_then(|c| c.arguments.get("query"))
        .and_then(Value::as_str)
        .map(str::to_string);

    Ok(match query {
        Some(q) => Generated::Query(q),
        None => Generated::Answer(reply.content.answer_text()),
    })
}

async fn run_pipeline(
    model: &dyn ChatModel,
    pool: &SqlitePool,
    query: &str,
    top_k: usize,
    max_rows: usize,
) -> Result<String> {
    let schema = schema_text(pool).await?;
    let checked = check_query(model, &schema, query).await?;
    debug!(checked = %checked, "sql check stage");

    match generate_query(model, &schema, &checked, top_k).await? {
        Generated::Query(sql) => {
            debug!(sql = %sql, "sql execute stage");
            Ok(execute(pool, &sql, max_rows).await?.render())
        }
        Generated::Answer(text) => Ok(text),
    }
}

/// The `search_db` tool body. Always returns text.
pub async fn search_db(
    model: &dyn ChatModel,
    pool: &SqlitePool,
    query: &str,
    top_k: usize,
    max_rows: usize,
) -> String {
    match run_pipeline(model, pool, query, top_k, max_rows).await {
        Ok(text) => text,
        Err(e) => format!("Error querying database: {:#}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use oracle_core::conversation::ToolCall;
    use std::sync::Mutex;

    struct Scripted(Mutex<Vec<Message>>);

    #[async_trait]
    impl ChatModel for Scripted {
        fn model_name(&self) -> &str {
            "scripted"
        }
        async fn complete(
            &self,
            _system: Option<&str>,
            _messages: &[Message],
            _tools: &[ToolSpec],
        ) -> Result<Message> {
            let mut queue = self.0.lock().unwrap();
            if queue.is_empty() {
                anyhow::bail!("script exhausted");
            }
            Ok(queue.remove(0))
        }
    }

    fn run_query(sql: &str) -> Message {
        Message::assistant_with_tools(
            "",
            vec![ToolCall {
                id: "q".into(),
                name: "sql_db_query".into(),
                arguments: json!({ "query": sql }),
            }],
        )
    }

    async fn sample_pool() -> (tempfile::TempDir, SqlitePool) {
        let dir = tempfile::tempdir().unwrap();
        let pool = crate::db::connect(&dir.path().join("db.sqlite")).await.unwrap();
        crate::migrate::migrate_relational(&pool).await.unwrap();
        sqlx::query(
            "INSERT INTO docs (id, filepath, file_hash, chunk_count, last_indexed) \
             VALUES ('1', '/r/a.rs', 'h1', 3, '2025-01-01'), ('2', '/r/b.md', 'h2', NULL, '2025-01-02')",
        )
        .execute(&pool)
        .await
        .unwrap();
        (dir, pool)
    }

    #[test]
    fn test_read_only_gate() {
        assert!(ensure_read_only("SELECT * FROM docs;").is_ok());
        assert!(ensure_read_only("  with x as (select 1) select * from x").is_ok());
        assert!(ensure_read_only("SELECT last_update FROM t").is_ok());

        assert!(ensure_read_only("DELETE FROM docs").is_err());
        assert!(ensure_read_only("SELECT 1; DROP TABLE docs").is_err());
        assert!(ensure_read_only("WITH x AS (DELETE FROM docs RETURNING *) SELECT * FROM x").is_err());
        assert!(ensure_read_only("PRAGMA table_info(docs)").is_err());
        assert!(ensure_read_only("WITH x AS (SELECT 1) REPLACE INTO docs SELECT * FROM x").is_err());
        assert!(ensure_read_only("SELECT 'open").is_err());
        assert!(ensure_read_only("").is_err());
    }

    #[test]
    fn test_keywords_inside_literals_pass() {
        let accepted = [
            "SELECT file_hash FROM docs WHERE filepath = '/repo/src/commands/delete.rs'",
            "SELECT replace(filepath, '/repo/', '') FROM docs",
            "SELECT filepath FROM docs WHERE filepath LIKE '%update%'",
            "SELECT \"drop\" FROM t WHERE a = 'it''s; fine'",
            "SELECT 1 -- insert here\n",
            "SELECT /* delete */ 1;",
        ];
        for sql in accepted {
            assert!(ensure_read_only(sql).is_ok(), "{}", sql);
        }
        assert_eq!(
            ensure_read_only("SELECT ';' ;").unwrap(),
            "SELECT ';'"
        );
        assert!(ensure_read_only("SELECT 'x'; DELETE FROM docs").is_err());
    }

    #[test]
    fn test_strip_fences() {
        assert_eq!(strip_fences("```sql\nSELECT 1\n```"), "SELECT 1");
        assert_eq!(strip_fences("  SELECT 2  "), "SELECT 2");
    }

    #[tokio::test]
    async fn test_execute_renders_rows() {
        let (_dir, pool) = sample_pool().await;
        let rows = execute(&pool, "SELECT filepath, chunk_count FROM docs ORDER BY filepath", 100)
            .await
            .unwrap();
        assert_eq!(rows.columns, vec!["filepath", "chunk_count"]);
        assert_eq!(rows.render(), "('/r/a.rs', 3)\n('/r/b.md', NULL)");

        let capped = execute(&pool, "SELECT id FROM docs", 1).await.unwrap();
        assert!(capped.truncated);
        assert_eq!(capped.rows.len(), 1);

        let empty = execute(&pool, "SELECT id FROM docs WHERE 0", 10).await.unwrap();
        assert_eq!(empty.render(), "No results found");
    }

    #[tokio::test]
    async fn test_execute_with_literal_keywords() {
        let (dir, pool) = sample_pool().await;
        let rows = execute(
            &pool,
            "SELECT replace(filepath, '/r/', '') FROM docs WHERE filepath NOT LIKE '%delete%' ORDER BY 1",
            10,
        )
        .await
        .unwrap();
        assert_eq!(rows.render(), "('a.rs')\n('b.md')");

        let read_only = crate::db::connect_read_only(&dir.path().join("db.sqlite"))
            .await
            .unwrap();
        let rows = execute(&read_only, "SELECT file_hash FROM docs WHERE filepath = '/r/a.rs'", 10)
            .await
            .unwrap();
        assert_eq!(rows.render(), "('h1')");
        assert!(sqlx::query("DELETE FROM docs").execute(&read_only).await.is_err());
    }

    #[tokio::test]
    async fn test_execute_refuses_mutation() {
        let (_dir, pool) = sample_pool().await;
        let err = execute(&pool, "DELETE FROM docs", 10).await.unwrap_err();
        assert!(err.downcast_ref::<OracleError>().is_some());
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM docs")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn test_pipeline_runs_generated_query() {
        let (_dir, pool) = sample_pool().await;
        let model = Scripted(Mutex::new(vec![
            Message::assistant("SELECT filepath FROM docs WHERE file_hash = 'h1'"),
            run_query("SELECT filepath FROM docs WHERE file_hash = 'h1'"),
        ]));
        let out = search_db(&model, &pool, "which file has hash h1?", 5, 100).await;
        assert_eq!(out, "('/r/a.rs')");
    }

    #[tokio::test]
    async fn test_pipeline_text_answer_passthrough() {
        let (_dir, pool) = sample_pool().await;
        let model = Scripted(Mutex::new(vec![
            Message::assistant("SELECT 1"),
            Message::assistant("There are two documents."),
        ]));
        let out = search_db(&model, &pool, "how many?", 5, 100).await;
        assert_eq!(out, "There are two documents.");
    }

    #[tokio::test]
    async fn test_pipeline_errors_become_text() {
        let (_dir, pool) = sample_pool().await;
        let model = Scripted(Mutex::new(vec![
            Message::assistant("DROP TABLE docs"),
            run_query("DROP TABLE docs"),
        ]));
        let out = search_db(&model, &pool, "drop it", 5, 100).await;
        assert!(out.starts_with("Error querying database:"), "{}", out);

        let broken = Scripted(Mutex::new(vec![
            Message::assistant("SELECT nope FROM missing"),
            run_query("SELECT nope FROM missing"),
        ]));
        let out = search_db(&broken, &pool, "?", 5, 100).await;
        assert!(out.starts_with("Error querying database:"));

        let silent = Scripted(Mutex::new(vec![]));
        let out = search_db(&silent, &pool, "?", 5, 100).await;
        assert!(out.contains("script exhausted"));
    }
}
