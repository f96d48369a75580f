//! Database adapter: answers sub-queries with model-planned read-only SQL.
//!
//! The `SQLite` file is opened read-only on first use and its schema is
//! shown to the query model, which plans one or more `SELECT` statements.
//! Each statement that passes the guard runs on the blocking pool and
//! contributes a markdown table citing `sqlite://<path>#<fingerprint>`.

use std::collections::hash_map::DefaultHasher;
use std::fmt::Write;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use super::{DispatchContext, EvidenceItem, EvidenceSource};
use crate::agent::config::AgentConfig;
use crate::agent::gateway::LlmGateway;
use crate::agent::message::{ChatRequest, system_message, user_message};
use crate::agent::prompt::{PromptSet, build_sql_prompt, render};
use crate::agent::schema::{SqlPlan, SqlStatement};
use crate::error::AgentError;

const SOURCE_NAME: &str = "database";
/// Rows rendered per statement.
const MAX_ROWS: usize = 20;
/// Statements run per sub-query.
const MAX_STATEMENTS: usize = 4;

/// Open connection plus the schema text shown to the planner.
struct DbHandle {
    conn: Mutex<Connection>,
    schema: String,
}

/// Rows returned by one statement.
#[derive(Debug, Clone, PartialEq, Eq)]
struct QueryTable {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
    truncated: bool,
}

/// `SQLite` evidence source.
pub struct DatabaseSource {
    path: PathBuf,
    gateway: LlmGateway,
    model: String,
    max_tokens: u32,
    system_prompt: String,
    handle: OnceCell<Arc<DbHandle>>,
}

impl std::fmt::Debug for DatabaseSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseSource")
            .field("path", &self.path)
            .field("model", &self.model)
            .field("opened", &self.handle.initialized())
            .finish_non_exhaustive()
    }
}

impl DatabaseSource {
    /// Creates the adapter. The database is not opened until first use.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::InvalidConfig`] when no database path is set.
    pub fn new(
        config: &AgentConfig,
        gateway: LlmGateway,
        prompts: &PromptSet,
    ) -> Result<Self, AgentError> {
        let path = config
            .database_path
            .clone()
            .ok_or_else(|| AgentError::InvalidConfig {
                message: "search mode 'database' requires a database path (SCOUT_DATABASE_PATH)"
                    .to_string(),
            })?;
        Ok(Self {
            path,
            gateway,
            model: config.query_model.clone(),
            max_tokens: config.planning_max_tokens,
            system_prompt: prompts.sql_planner.clone(),
            handle: OnceCell::new(),
        })
    }

    async fn handle(&self) -> Result<Arc<DbHandle>, AgentError> {
        self.handle
            .get_or_try_init(|| async {
                let path = self.path.clone();
                let handle = tokio::task::spawn_blocking(move || open(&path))
                    .await
                    .map_err(|e| evidence_error(format!("task join error: {e}")))??;
                info!(path = %self.path.display(), "Opened database evidence source");
                Ok(Arc::new(handle))
            })
            .await
            .cloned()
    }

    async fn plan(
        &self,
        query: &str,
        schema: &str,
        current_date: &str,
    ) -> Result<SqlPlan, AgentError> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                system_message(&render(
                    &self.system_prompt,
                    &[("current_date", current_date)],
                )),
                user_message(&build_sql_prompt(query, schema)),
            ],
            temperature: Some(0.0),
            max_tokens: Some(self.max_tokens),
            json_mode: false,
            response_schema: None,
        };
        self.gateway.invoke_structured(request).await
    }

    fn origin(&self, sql: &str) -> String {
        format!("sqlite://{}#{}", self.path.display(), fingerprint(sql))
    }
}

#[async_trait]
impl EvidenceSource for DatabaseSource {
    fn name(&self) -> &'static str {
        SOURCE_NAME
    }

    async fn search(
        &self,
        query: &str,
        ctx: &mut DispatchContext,
    ) -> Result<Vec<EvidenceItem>, AgentError> {
        let handle = self.handle().await?;
        let plan = self.plan(query, &handle.schema, &ctx.current_date).await?;
        debug!(
            dispatch_id = ctx.dispatch_id(),
            statements = plan.queries.len(),
            "SQL plan ready"
        );

        let mut items = Vec::new();
        for statement in plan.queries.into_iter().take(MAX_STATEMENTS) {
            let sql = match guard(&statement.sql) {
                Ok(sql) => sql,
                Err(reason) => {
                    warn!(sql = %statement.sql, reason = %reason, "Rejected planned SQL");
                    items.push(EvidenceItem::note(format!(
                        "Skipped query `{}`: {reason}",
                        statement.sql.trim()
                    )));
                    continue;
                }
            };

            let handle = Arc::clone(&handle);
            let run_sql = sql.clone();
            let outcome = tokio::task::spawn_blocking(move || run(&handle, &run_sql))
                .await
                .map_err(|e| evidence_error(format!("task join error: {e}")))?;

            match outcome {
                Ok(table) => {
                    let label = statement_label(&statement);
                    let rendered = render_table(&table);
                    let record = ctx.allocator.allocate(&self.origin(&sql), &label, &rendered);
                    items.push(EvidenceItem {
                        text: format!(
                            "{label}\n\n```sql\n{sql}\n```\n\n{rendered}\n\nSource: [{label}]({})",
                            record.short_token
                        ),
                        sources: vec![record],
                    });
                }
                Err(e) => {
                    warn!(sql = %sql, error = %e, "Planned SQL failed");
                    items.push(EvidenceItem::note(format!("Query `{sql}` failed: {e}")));
                }
            }
        }
        Ok(items)
    }
}

fn open(path: &std::path::Path) -> Result<DbHandle, AgentError> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(|e| evidence_error(format!("cannot open {}: {e}", path.display())))?;
    let schema = read_schema(&conn)?;
    Ok(DbHandle {
        conn: Mutex::new(conn),
        schema,
    })
}

fn read_schema(conn: &Connection) -> Result<String, AgentError> {
    let mut stmt = conn
        .prepare(
            "SELECT sql FROM sqlite_master \
             WHERE type IN ('table', 'view') AND sql IS NOT NULL AND name NOT LIKE 'sqlite_%' \
             ORDER BY name",
        )
        .map_err(|e| evidence_error(format!("schema query failed: {e}")))?;
    let statements = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .and_then(|rows| rows.collect::<Result<Vec<_>, _>>())
        .map_err(|e| evidence_error(format!("schema query failed: {e}")))?;
    Ok(statements.join(";\n"))
}

/// Accepts one `SELECT` or `WITH` statement and returns it without a
/// trailing semicolon.
fn guard(sql: &str) -> Result<String, String> {
    let sql = sql.trim().trim_end_matches(';').trim_end();
    if sql.is_empty() {
        return Err("empty statement".to_string());
    }
    if sql.contains(';') {
        return Err("multiple statements are not allowed".to_string());
    }
    let keyword = sql
        .split(|c: char| c.is_whitespace() || c == '(')
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();
    if keyword != "select" && keyword != "with" {
        return Err(format!("only SELECT statements are allowed, got {keyword}"));
    }
    Ok(sql.to_string())
}

fn run(handle: &DbHandle, sql: &str) -> Result<QueryTable, AgentError> {
    let conn = handle
        .conn
        .lock()
        .map_err(|_| evidence_error("connection lock poisoned".to_string()))?;
    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| evidence_error(e.to_string()))?;
    if !stmt.readonly() {
        return Err(evidence_error("statement is not read-only".to_string()));
    }
    let columns: Vec<String> = stmt.column_names().iter().map(ToString::to_string).collect();
    let mut rows = stmt.query([]).map_err(|e| evidence_error(e.to_string()))?;

    let mut table = QueryTable {
        columns,
        rows: Vec::new(),
        truncated: false,
    };
    while let Some(row) = rows.next().map_err(|e| evidence_error(e.to_string()))? {
        if table.rows.len() == MAX_ROWS {
            table.truncated = true;
            break;
        }
        let mut cells = Vec::with_capacity(table.columns.len());
        for i in 0..table.columns.len() {
            let value = row.get_ref(i).map_err(|e| evidence_error(e.to_string()))?;
            cells.push(format_value(value));
        }
        table.rows.push(cells);
    }
    Ok(table)
}

fn format_value(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => "NULL".to_string(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(t) => String::from_utf8_lossy(t).replace('|', "\\|").replace('\n', " "),
        ValueRef::Blob(b) => format!("<{} bytes>", b.len()),
    }
}

fn render_table(table: &QueryTable) -> String {
    if table.rows.is_empty() {
        return "(no rows)".to_string();
    }
    let mut out = format!("| {} |\n", table.columns.join(" | "));
    let _ = writeln!(out, "|{}", " --- |".repeat(table.columns.len()));
    for row in &table.rows {
        let _ = writeln!(out, "| {} |", row.join(" | "));
    }
    if table.truncated {
        let _ = writeln!(out, "\n(showing first {MAX_ROWS} rows)");
    }
    out.trim_end().to_string()
}

fn statement_label(statement: &SqlStatement) -> String {
    let explanation = statement.explanation.trim();
    if explanation.is_empty() {
        "Database query".to_string()
    } else {
        explanation.to_string()
    }
}

/// Stable within a process for the same statement. Keyword case and
/// whitespace are ignored; quoted literals are kept verbatim.
fn fingerprint(sql: &str) -> String {
    let mut normalized = String::with_capacity(sql.len());
    let mut quote: Option<char> = None;
    let mut pending_space = false;
    for c in sql.trim().chars() {
        match quote {
            Some(q) => {
                normalized.push(c);
                if c == q {
                    quote = None;
                }
            }
            None if c.is_whitespace() => pending_space = true,
            None => {
                if pending_space {
                    normalized.push(' ');
                    pending_space = false;
                }
                if c == '\'' || c == '"' {
                    quote = Some(c);
                }
                normalized.extend(c.to_lowercase());
            }
        }
    }
    let mut hasher = DefaultHasher::new();
    normalized.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

fn evidence_error(message: String) -> AgentError {
    AgentError::Evidence {
        source_name: SOURCE_NAME.to_string(),
        message,
    }
}
