use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, params};

use crate::models::{CodeArtifact, DeploymentRecord, TaskRequest};

/// Async-safe handle to the deployment store.
///
/// Wraps `TaskStore` behind `Arc<Mutex>` and runs all access on tokio's
/// blocking thread pool via `spawn_blocking`, preventing synchronous SQLite
/// I/O from tying up async worker threads.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<TaskStore>>,
}

impl DbHandle {
    pub fn new(store: TaskStore) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(store)),
        }
    }

    /// Run a closure with access to the store on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&TaskStore) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let store = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = store
                .lock()
                .map_err(|e| anyhow::anyhow!("store lock poisoned: {}", e))?;
            f(&guard)
        })
        .await
        .context("store task panicked")?
    }
}

/// SQLite-backed record of task submissions and deployments.
pub struct TaskStore {
    conn: Connection,
}

impl TaskStore {
    /// Open (or create) the store at the given path and run migrations.
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        let store = Self { conn };
        store.init()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing).
    pub fn new_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let store = Self { conn };
        store.init()?;
        Ok(store)
    }

    fn init(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS task_submissions (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    email TEXT NOT NULL,
                    task TEXT NOT NULL,
                    round INTEGER NOT NULL,
                    nonce TEXT NOT NULL,
                    brief TEXT NOT NULL,
                    checks TEXT NOT NULL DEFAULT '[]',
                    evaluation_url TEXT NOT NULL,
                    attachment_count INTEGER NOT NULL DEFAULT 0,
                    received_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS deployments (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    email TEXT NOT NULL,
                    task TEXT NOT NULL,
                    round INTEGER NOT NULL,
                    nonce TEXT NOT NULL,
                    repo_url TEXT NOT NULL,
                    commit_sha TEXT NOT NULL,
                    pages_url TEXT NOT NULL,
                    html TEXT NOT NULL,
                    readme TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_submissions_key
                    ON task_submissions(email, task, round);
                CREATE INDEX IF NOT EXISTS idx_deployments_key
                    ON deployments(email, task, round);
                ",
            )
            .context("Failed to create tables")?;
        Ok(())
    }

    /// Record an incoming task submission.
    pub fn save_task(&self, request: &TaskRequest) -> Result<()> {
        let checks =
            serde_json::to_string(&request.checks).context("Failed to serialize checks")?;
        self.conn
            .execute(
                "INSERT INTO task_submissions
                 (email, task, round, nonce, brief, checks, evaluation_url, attachment_count)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    request.email,
                    request.task,
                    request.round,
                    request.nonce,
                    request.brief,
                    checks,
                    request.evaluation_url,
                    request.attachments.len() as i64,
                ],
            )
            .context("Failed to insert task submission")?;
        Ok(())
    }

    /// Record a completed deployment, code snapshot included.
    pub fn save_deployment(&self, record: &DeploymentRecord) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO deployments
                 (email, task, round, nonce, repo_url, commit_sha, pages_url, html, readme, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    record.email,
                    record.task,
                    record.round,
                    record.nonce,
                    record.repo_url,
                    record.commit_sha,
                    record.pages_url,
                    record.snapshot.html,
                    record.snapshot.readme,
                    record.created_at.to_rfc3339(),
                ],
            )
            .context("Failed to insert deployment")?;
        Ok(())
    }

    /// Fetch the newest deployment record for (email, task, round).
    pub fn get_deployment(
        &self,
        email: &str,
        task: &str,
        round: u32,
    ) -> Result<Option<DeploymentRecord>> {
        self.conn
            .query_row(
                "SELECT email, task, round, nonce, repo_url, commit_sha, pages_url,
                        html, readme, created_at
                 FROM deployments
                 WHERE email = ?1 AND task = ?2 AND round = ?3
                 ORDER BY id DESC LIMIT 1",
                params![email, task, round],
                |row| {
                    let created_at: String = row.get(9)?;
                    Ok(DeploymentRecord {
                        email: row.get(0)?,
                        task: row.get(1)?,
                        round: row.get(2)?,
                        nonce: row.get(3)?,
                        repo_url: row.get(4)?,
                        commit_sha: row.get(5)?,
                        pages_url: row.get(6)?,
                        snapshot: CodeArtifact {
                            html: row.get(7)?,
                            readme: row.get(8)?,
                        },
                        created_at: chrono::DateTime::parse_from_rfc3339(&created_at)
                            .map(|dt| dt.with_timezone(&chrono::Utc))
                            .unwrap_or_default(),
                    })
                },
            )
            .optional()
            .context("Failed to query deployment")
    }

    /// Count stored submissions (health/diagnostic use).
    pub fn submission_count(&self) -> Result<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM task_submissions", [], |row| row.get(0))
            .context("Failed to count submissions")
    }
}
