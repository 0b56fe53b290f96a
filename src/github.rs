//! GitHub REST client: repository publishing and baseline retrieval.
//!
//! Publishing is idempotent end to end: repository creation falls back to
//! fetching an existing repository of the same name, and every file write
//! probes current state first to choose between create and update (the
//! update path supplies the current content sha, per the contents API's
//! optimistic-concurrency contract). Expected "already exists" and "not
//! found" conditions are modeled as enum outcomes, not errors.

use anyhow::Context as _;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use serde::{Deserialize, Serialize};

use crate::errors::PipelineError;
use crate::models::{CodeArtifact, PublishReceipt};

const GITHUB_API: &str = "https://api.github.com";
const USER_AGENT: &str = "shipwright";
const DEFAULT_BRANCH: &str = "main";
const REPO_PREFIX: &str = "llm-app-";

/// Abstraction over the hosting platform for testability.
/// Real implementation: `GitHubPublisher`. Test double: `MockRepoHost`.
#[async_trait]
pub trait RepoHost: Send + Sync {
    /// Ensure the task's repository exists, write the given files, and
    /// enable static-site publishing. Empty file contents are skipped.
    async fn publish(
        &self,
        task_id: &str,
        files: &[(String, String)],
        is_update: bool,
    ) -> Result<PublishReceipt, PipelineError>;

    /// Read the currently published artifact back out of the repository.
    /// Returns `None` when the repository or its index document is absent.
    async fn fetch_site_files(&self, task_id: &str)
    -> Result<Option<CodeArtifact>, PipelineError>;
}

/// Outcome of the idempotent create-or-get step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepoDisposition {
    Created,
    Existing,
}

/// Outcome of probing a file path on the target branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileProbe {
    Present { sha: String },
    Absent,
}

/// Derive the deterministic repository name for a task id.
///
/// Stable across rounds of the same task, which is what makes re-publish
/// idempotent: round 2 re-targets the round-1 repository by construction.
pub fn repo_name_for_task(task_id: &str) -> String {
    format!("{}{}", REPO_PREFIX, slugify(task_id))
}

/// Convert a task id to a lowercase slug, collapsing any run of
/// non-alphanumeric characters to a single dash.
fn slugify(raw: &str) -> String {
    raw.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// GitHub publisher bound to one account.
pub struct GitHubPublisher {
    client: reqwest::Client,
    token: String,
    owner: String,
}

impl GitHubPublisher {
    pub fn new(token: impl Into<String>, owner: impl Into<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .context("Failed to build GitHub HTTP client")?;
        Ok(Self {
            client,
            token: token.into(),
            owner: owner.into(),
        })
    }

    fn request(&self, method: reqwest::Method, url: String) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("User-Agent", USER_AGENT)
            .header("Accept", "application/vnd.github+json")
    }

    /// Deterministic Pages URL for a repository under this account.
    pub fn pages_url(&self, repo_name: &str) -> String {
        format!("https://{}.github.io/{}/", self.owner, repo_name)
    }

    /// Create the repository, or fetch it when the name is already taken.
    async fn ensure_repo(
        &self,
        repo_name: &str,
        task_id: &str,
    ) -> Result<(RepoInfo, RepoDisposition), PipelineError> {
        let response = self
            .request(reqwest::Method::POST, format!("{}/user/repos", GITHUB_API))
            .json(&serde_json::json!({
                "name": repo_name,
                "description": format!("LLM generated code for task {}", task_id),
                "private": false,
            }))
            .send()
            .await
            .map_err(|e| publish_transport_error("repository creation", e))?;

        let status = response.status();
        if status.is_success() {
            let repo: RepoInfo = response
                .json()
                .await
                .map_err(|e| publish_parse_error("repository creation", e))?;
            Ok((repo, RepoDisposition::Created))
        } else if status == reqwest::StatusCode::UNPROCESSABLE_ENTITY {
            // 422 covers more than name collisions; only a collision may
            // fall through to the existing repository.
            let body = read_body(response).await;
            if body.contains("already exists") {
                let repo = self.get_repo(repo_name).await?;
                Ok((repo, RepoDisposition::Existing))
            } else {
                Err(publish_status_error("repository creation", status, body))
            }
        } else {
            Err(publish_status_error(
                "repository creation",
                status,
                read_body(response).await,
            ))
        }
    }

    async fn get_repo(&self, repo_name: &str) -> Result<RepoInfo, PipelineError> {
        let url = format!("{}/repos/{}/{}", GITHUB_API, self.owner, repo_name);
        let response = self
            .request(reqwest::Method::GET, url)
            .send()
            .await
            .map_err(|e| publish_transport_error("repository lookup", e))?;

        if !response.status().is_success() {
            return Err(publish_status_error(
                "repository lookup",
                response.status(),
                read_body(response).await,
            ));
        }
        response
            .json()
            .await
            .map_err(|e| publish_parse_error("repository lookup", e))
    }

    /// Probe whether a file exists on the default branch.
    async fn probe_file(&self, repo_name: &str, path: &str) -> Result<FileProbe, PipelineError> {
        let url = format!(
            "{}/repos/{}/{}/contents/{}?ref={}",
            GITHUB_API, self.owner, repo_name, path, DEFAULT_BRANCH
        );
        let response = self
            .request(reqwest::Method::GET, url)
            .send()
            .await
            .map_err(|e| publish_transport_error("file probe", e))?;

        let status = response.status();
        if status.is_success() {
            let contents: ContentsFile = response
                .json()
                .await
                .map_err(|e| publish_parse_error("file probe", e))?;
            Ok(FileProbe::Present { sha: contents.sha })
        } else if status == reqwest::StatusCode::NOT_FOUND {
            Ok(FileProbe::Absent)
        } else {
            Err(publish_status_error(
                "file probe",
                status,
                read_body(response).await,
            ))
        }
    }

    /// Create or update one file; returns the sha of the commit produced.
    async fn put_file(
        &self,
        repo_name: &str,
        path: &str,
        content: &str,
        existing_sha: Option<&str>,
        message: String,
    ) -> Result<String, PipelineError> {
        let url = format!(
            "{}/repos/{}/{}/contents/{}",
            GITHUB_API, self.owner, repo_name, path
        );
        let mut body = serde_json::json!({
            "message": message,
            "content": BASE64_STANDARD.encode(content.as_bytes()),
            "branch": DEFAULT_BRANCH,
        });
        if let Some(sha) = existing_sha {
            body["sha"] = serde_json::Value::String(sha.to_string());
        }

        let response = self
            .request(reqwest::Method::PUT, url)
            .json(&body)
            .send()
            .await
            .map_err(|e| publish_transport_error("file write", e))?;

        if !response.status().is_success() {
            return Err(publish_status_error(
                "file write",
                response.status(),
                read_body(response).await,
            ));
        }

        let written: PutContentsResponse = response
            .json()
            .await
            .map_err(|e| publish_parse_error("file write", e))?;
        Ok(written.commit.sha)
    }

    /// Set the default branch and enable Pages from it. Returns whether the
    /// follow-up Pages status lookup confirmed the site; on lookup failure
    /// the deterministic URL is assumed correct and publishing proceeds.
    async fn configure_pages(&self, repo_name: &str) -> Result<bool, PipelineError> {
        let repo_url = format!("{}/repos/{}/{}", GITHUB_API, self.owner, repo_name);

        let response = self
            .request(reqwest::Method::PATCH, repo_url.clone())
            .json(&serde_json::json!({ "default_branch": DEFAULT_BRANCH }))
            .send()
            .await
            .map_err(|e| publish_transport_error("default branch setup", e))?;
        if !response.status().is_success() {
            return Err(publish_status_error(
                "default branch setup",
                response.status(),
                read_body(response).await,
            ));
        }

        let response = self
            .request(reqwest::Method::POST, format!("{}/pages", repo_url))
            .json(&serde_json::json!({
                "source": { "branch": DEFAULT_BRANCH, "path": "/" }
            }))
            .send()
            .await
            .map_err(|e| publish_transport_error("pages enablement", e))?;
        let status = response.status();
        // 409 means Pages was already configured on an earlier round.
        if !status.is_success() && status != reqwest::StatusCode::CONFLICT {
            return Err(publish_status_error(
                "pages enablement",
                status,
                read_body(response).await,
            ));
        }

        // Best-effort verification only; never fails the publish.
        match self
            .request(reqwest::Method::GET, format!("{}/pages", repo_url))
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => Ok(true),
            Ok(response) => {
                tracing::warn!(
                    "pages status lookup for {} returned {}; publication URL is assumed, not confirmed",
                    repo_name,
                    response.status()
                );
                Ok(false)
            }
            Err(e) => {
                tracing::warn!(
                    "pages status lookup for {} failed: {}; publication URL is assumed, not confirmed",
                    repo_name,
                    e
                );
                Ok(false)
            }
        }
    }

    async fn fetch_file(
        &self,
        repo_name: &str,
        path: &str,
    ) -> Result<Option<String>, PipelineError> {
        let url = format!(
            "{}/repos/{}/{}/contents/{}?ref={}",
            GITHUB_API, self.owner, repo_name, path, DEFAULT_BRANCH
        );
        let response = self
            .request(reqwest::Method::GET, url)
            .send()
            .await
            .map_err(|e| publish_transport_error("baseline fetch", e))?;

        let status = response.status();
        if status.is_success() {
            let contents: ContentsFile = response
                .json()
                .await
                .map_err(|e| publish_parse_error("baseline fetch", e))?;
            let text = decode_content(contents.content.as_deref().unwrap_or_default()).map_err(
                |e| PipelineError::Publish {
                    stage: "baseline fetch",
                    message: format!("undecodable content for {}: {}", path, e),
                },
            )?;
            Ok(Some(text))
        } else if status == reqwest::StatusCode::NOT_FOUND {
            Ok(None)
        } else {
            Err(publish_status_error(
                "baseline fetch",
                status,
                read_body(response).await,
            ))
        }
    }
}

#[async_trait]
impl RepoHost for GitHubPublisher {
    async fn publish(
        &self,
        task_id: &str,
        files: &[(String, String)],
        is_update: bool,
    ) -> Result<PublishReceipt, PipelineError> {
        let repo_name = repo_name_for_task(task_id);
        let (repo, disposition) = self.ensure_repo(&repo_name, task_id).await?;
        tracing::info!(
            "repository {} for task {}: {}",
            repo_name,
            task_id,
            match disposition {
                RepoDisposition::Created => "created",
                RepoDisposition::Existing => "reusing existing",
            }
        );
        if is_update && disposition == RepoDisposition::Created {
            tracing::warn!(
                "update-mode publish for task {} had to create the repository",
                task_id
            );
        }

        let mut commit_sha = String::new();
        for (filename, content) in files {
            if content.trim().is_empty() {
                tracing::info!("skipping empty file {}", filename);
                continue;
            }
            let (existing_sha, message) = match self.probe_file(&repo_name, filename).await? {
                FileProbe::Present { sha } => (
                    Some(sha),
                    format!("Update {} for task {}", filename, task_id),
                ),
                FileProbe::Absent => (
                    None,
                    format!("Initial commit of {} for task {}", filename, task_id),
                ),
            };
            // Files are committed independently; a failure here leaves any
            // earlier files already committed.
            commit_sha = self
                .put_file(
                    &repo_name,
                    filename,
                    content,
                    existing_sha.as_deref(),
                    message,
                )
                .await?;
            tracing::info!("committed {} ({})", filename, &commit_sha[..7.min(commit_sha.len())]);
        }

        let pages_confirmed = self.configure_pages(&repo_name).await?;

        Ok(PublishReceipt {
            repo_url: repo.html_url,
            commit_sha,
            pages_url: self.pages_url(&repo_name),
            pages_confirmed,
        })
    }

    async fn fetch_site_files(
        &self,
        task_id: &str,
    ) -> Result<Option<CodeArtifact>, PipelineError> {
        let repo_name = repo_name_for_task(task_id);
        let Some(html) = self.fetch_file(&repo_name, "index.html").await? else {
            return Ok(None);
        };
        let readme = self
            .fetch_file(&repo_name, "README.md")
            .await?
            .unwrap_or_default();
        Ok(Some(CodeArtifact { html, readme }))
    }
}

/// Decode a contents-API base64 payload (the API inserts line breaks).
fn decode_content(encoded: &str) -> anyhow::Result<String> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = BASE64_STANDARD
        .decode(compact.as_bytes())
        .context("invalid base64 in contents response")?;
    String::from_utf8(bytes).context("contents are not valid UTF-8")
}

async fn read_body(response: reqwest::Response) -> String {
    response
        .text()
        .await
        .unwrap_or_else(|_| "failed to read response body".to_string())
}

fn publish_transport_error(stage: &'static str, err: reqwest::Error) -> PipelineError {
    PipelineError::Publish {
        stage,
        message: err.to_string(),
    }
}

fn publish_parse_error(stage: &'static str, err: reqwest::Error) -> PipelineError {
    PipelineError::Publish {
        stage,
        message: format!("unexpected response shape: {}", err),
    }
}

fn publish_status_error(
    stage: &'static str,
    status: reqwest::StatusCode,
    body: String,
) -> PipelineError {
    let detail: String = body.chars().take(300).collect();
    PipelineError::Publish {
        stage,
        message: format!("{}: {}", status, detail),
    }
}

// ── Wire types (subset of fields we care about) ──────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct RepoInfo {
    pub name: String,
    pub html_url: String,
    pub default_branch: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentsFile {
    sha: String,
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PutContentsResponse {
    commit: CommitRef,
}

#[derive(Debug, Deserialize)]
struct CommitRef {
    sha: String,
}
