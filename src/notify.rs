//! Best-effort completion callback to the caller's evaluation endpoint.

use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;

use crate::models::CompletionPayload;

/// The receiving evaluation process may itself be slow, so the callback
/// gets a timeout measured in minutes rather than seconds.
const CALLBACK_TIMEOUT: Duration = Duration::from_secs(300);

/// Abstraction over completion notification for testability.
/// Real implementation: `EvaluationNotifier`. Test double: `MockNotifier`.
#[async_trait]
pub trait CompletionNotifier: Send + Sync {
    /// POST the payload to the evaluation URL. Returns delivery success;
    /// never raises — a failed notification must not fail the request.
    async fn notify(&self, evaluation_url: &str, payload: &CompletionPayload) -> bool;
}

pub struct EvaluationNotifier {
    client: reqwest::Client,
}

impl EvaluationNotifier {
    pub fn new() -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(CALLBACK_TIMEOUT)
            .build()
            .context("Failed to build notifier HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl CompletionNotifier for EvaluationNotifier {
    async fn notify(&self, evaluation_url: &str, payload: &CompletionPayload) -> bool {
        match self.client.post(evaluation_url).json(payload).send().await {
            Ok(response) if response.status().is_success() => {
                tracing::info!(
                    "evaluation callback delivered for task {} round {}",
                    payload.task,
                    payload.round
                );
                true
            }
            Ok(response) => {
                tracing::warn!(
                    "evaluation callback for task {} returned {} (deployment succeeded regardless)",
                    payload.task,
                    response.status()
                );
                false
            }
            Err(e) => {
                tracing::warn!(
                    "evaluation callback for task {} failed: {} (deployment succeeded regardless)",
                    payload.task,
                    e
                );
                false
            }
        }
    }
}
