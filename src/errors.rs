//! Typed error hierarchy for the deployment pipeline.
//!
//! Every step of request processing converts its failure into a
//! `PipelineError` variant at the orchestrator boundary; the HTTP layer
//! maps variants to status codes without losing the underlying message.

use thiserror::Error;

/// Errors from the build/revise pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Authentication failed: secret mismatch")]
    Unauthorized,

    #[error("Service not fully initialized: {0}")]
    ServiceUnavailable(&'static str),

    #[error("Code generation failed: {0}")]
    Generation(String),

    #[error("Generated HTML has invalid structure")]
    InvalidArtifact,

    #[error("Publish failed during {stage}: {message}")]
    Publish { stage: &'static str, message: String },

    #[error("No round-1 deployment found for task {task} in store or repository")]
    BaselineNotFound { task: String },

    #[error("Database error: {0}")]
    Database(#[source] anyhow::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PipelineError {
    /// HTTP status code the transport layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            PipelineError::Validation(_) => 400,
            PipelineError::Unauthorized => 401,
            PipelineError::BaselineNotFound { .. } => 404,
            PipelineError::ServiceUnavailable(_) => 503,
            _ => 500,
        }
    }
}
