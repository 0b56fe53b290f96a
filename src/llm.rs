//! Gemini REST client for application generation and revision.
//!
//! One HTTP attempt per prompt, no retry loop: a failed or empty model
//! response is a generation error and the round is abandoned. The wire
//! types mirror the `generateContent` request/response shapes.

use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::PipelineError;
use crate::models::{Attachment, CodeArtifact};
use crate::prompts;

const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Per-prompt request timeout. Generation of a full application can run
/// long; this bounds a hung connection, not normal latency.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(180);

/// Abstraction over code generation for testability.
/// Real implementation: `GeminiGenerator`. Test double: `MockGenerator`.
#[async_trait]
pub trait AppGenerator: Send + Sync {
    /// Produce a fresh application and README from a brief.
    async fn generate(
        &self,
        brief: &str,
        checks: &[String],
        attachments: &[Attachment],
    ) -> Result<CodeArtifact, PipelineError>;

    /// Amend an existing artifact with new requirements, preserving the
    /// round-1 behavior.
    async fn revise(
        &self,
        baseline: &CodeArtifact,
        new_brief: &str,
        new_checks: &[String],
        new_attachments: &[Attachment],
    ) -> Result<CodeArtifact, PipelineError>;
}

/// Client for the Gemini `generateContent` endpoint.
pub struct GeminiGenerator {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl GeminiGenerator {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build Gemini HTTP client")?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            model: model.into(),
        })
    }

    async fn send_prompt(&self, prompt: String) -> Result<String, PipelineError> {
        let url = format!(
            "{}/{model}:generateContent?key={api_key}",
            BASE_URL,
            model = self.model,
            api_key = self.api_key
        );

        let request = GenerateContentRequest {
            contents: vec![Content {
                role: "user".to_string(),
                parts: vec![Part { text: prompt }],
            }],
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| PipelineError::Generation(format!("Gemini request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "failed to read error body".to_string());
            return Err(PipelineError::Generation(format!(
                "Gemini API returned {}: {}",
                status,
                summarize_error_body(&body)
            )));
        }

        let parsed: GenerateContentResponse = response.json().await.map_err(|e| {
            PipelineError::Generation(format!("Failed to parse Gemini response: {}", e))
        })?;

        extract_text(parsed)
            .ok_or_else(|| PipelineError::Generation("Gemini returned no text candidates".into()))
    }
}

#[async_trait]
impl AppGenerator for GeminiGenerator {
    async fn generate(
        &self,
        brief: &str,
        checks: &[String],
        attachments: &[Attachment],
    ) -> Result<CodeArtifact, PipelineError> {
        let raw_html = self
            .send_prompt(prompts::build_app_prompt(brief, checks, attachments))
            .await?;
        let html = extract_code_block(&raw_html, "html");

        let raw_readme = self
            .send_prompt(prompts::build_readme_prompt(brief, checks))
            .await?;
        let readme = extract_code_block(&raw_readme, "markdown");

        if html.trim().is_empty() {
            return Err(PipelineError::Generation(
                "model produced an empty HTML document".into(),
            ));
        }
        Ok(CodeArtifact { html, readme })
    }

    async fn revise(
        &self,
        baseline: &CodeArtifact,
        new_brief: &str,
        new_checks: &[String],
        new_attachments: &[Attachment],
    ) -> Result<CodeArtifact, PipelineError> {
        let raw_html = self
            .send_prompt(prompts::revise_app_prompt(
                &baseline.html,
                new_brief,
                new_checks,
                new_attachments,
            ))
            .await?;
        let html = extract_code_block(&raw_html, "html");

        let raw_readme = self
            .send_prompt(prompts::revise_readme_prompt(
                &baseline.readme,
                new_brief,
                new_checks,
            ))
            .await?;
        let readme = extract_code_block(&raw_readme, "markdown");

        if html.trim().is_empty() {
            return Err(PipelineError::Generation(
                "model produced an empty revised document".into(),
            ));
        }
        Ok(CodeArtifact { html, readme })
    }
}

/// Extract the first fenced code block from model output, discarding any
/// conversational wrapper text.
///
/// Prefers a fence tagged with `lang`, falls back to the first untagged
/// fence, and finally to the trimmed raw text when no fence is present.
pub fn extract_code_block(text: &str, lang: &str) -> String {
    let tagged = format!("```{}", lang);
    let fence_start = text
        .find(&tagged)
        .map(|idx| idx + tagged.len())
        .or_else(|| text.find("```").map(|idx| idx + 3));

    let Some(start) = fence_start else {
        return text.trim().to_string();
    };

    let rest = &text[start..];
    // Skip the remainder of the fence line (e.g. a language tag we did not match)
    let body_start = rest.find('\n').map(|idx| idx + 1).unwrap_or(0);
    let body = &rest[body_start..];

    match body.find("```") {
        Some(end) => body[..end].trim().to_string(),
        None => body.trim().to_string(),
    }
}

fn summarize_error_body(body: &str) -> String {
    serde_json::from_str::<ErrorWrapper>(body)
        .ok()
        .and_then(|wrapper| wrapper.error.message)
        .unwrap_or_else(|| body.chars().take(300).collect())
}

fn extract_text(response: GenerateContentResponse) -> Option<String> {
    response
        .candidates?
        .into_iter()
        .next()?
        .content?
        .parts
        .into_iter()
        .find_map(|part| part.text)
}

// ── Wire types ────────────────────────────────────────────────────────

#[derive(Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
}

#[derive(Serialize)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct Part {
    text: String,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<ContentResponse>,
}

#[derive(Deserialize)]
struct ContentResponse {
    parts: Vec<PartResponse>,
}

#[derive(Deserialize)]
struct PartResponse {
    text: Option<String>,
}

#[derive(Deserialize)]
struct ErrorWrapper {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
}
