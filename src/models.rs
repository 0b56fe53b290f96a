use serde::{Deserialize, Serialize};

/// A single file attachment carried in the webhook payload.
///
/// `url` is a self-contained data URI encoding the file bytes; no size or
/// type validation is performed beyond presence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    /// Original filename
    pub name: String,
    /// Base64 data URI of the file content
    pub url: String,
}

/// The complete schema for the incoming `POST /generate-code` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRequest {
    pub email: String,
    /// Shared secret; checked against `WEBHOOK_SECRET` when configured
    pub secret: String,
    /// Stable identifier for one logical task across rounds
    pub task: String,
    /// 1 = build, 2 = revise
    pub round: u32,
    /// Caller-supplied token correlating this submission instance
    pub nonce: String,
    /// Free-text task description for the generator
    pub brief: String,
    #[serde(default)]
    pub checks: Vec<String>,
    /// URL notified after deployment completes
    pub evaluation_url: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

/// A generated application: one self-contained HTML document plus README.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeArtifact {
    pub html: String,
    pub readme: String,
}

/// Result of publishing a file set to the hosting platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishReceipt {
    pub repo_url: String,
    /// Sha of the last file's commit — files are committed independently,
    /// so this identifier is not atomic with the other files' commits.
    pub commit_sha: String,
    pub pages_url: String,
    /// False when the Pages status lookup failed after enablement and the
    /// URL is assumed from the naming convention.
    pub pages_confirmed: bool,
}

/// A persisted deployment, keyed by (email, task, round).
///
/// Created once per successful round and never mutated; round 2 reads the
/// round-1 record to obtain its baseline snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub email: String,
    pub task: String,
    pub round: u32,
    pub nonce: String,
    pub repo_url: String,
    pub commit_sha: String,
    pub pages_url: String,
    pub snapshot: CodeArtifact,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Body of the completion callback POSTed to the evaluation URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionPayload {
    pub email: String,
    pub task: String,
    pub round: u32,
    pub nonce: String,
    pub repo_url: String,
    pub commit_sha: String,
    pub pages_url: String,
}

/// Successful pipeline outcome surfaced to the HTTP caller.
#[derive(Debug, Clone, Serialize)]
pub struct DeploymentOutcome {
    pub round: u32,
    pub repo_url: String,
    pub commit_sha: String,
    pub pages_url: String,
}

impl DeploymentRecord {
    pub fn new(request: &TaskRequest, receipt: &PublishReceipt, snapshot: CodeArtifact) -> Self {
        Self {
            email: request.email.clone(),
            task: request.task.clone(),
            round: request.round,
            nonce: request.nonce.clone(),
            repo_url: receipt.repo_url.clone(),
            commit_sha: receipt.commit_sha.clone(),
            pages_url: receipt.pages_url.clone(),
            snapshot,
            created_at: chrono::Utc::now(),
        }
    }
}

impl CompletionPayload {
    pub fn new(request: &TaskRequest, receipt: &PublishReceipt) -> Self {
        Self {
            email: request.email.clone(),
            task: request.task.clone(),
            round: request.round,
            nonce: request.nonce.clone(),
            repo_url: receipt.repo_url.clone(),
            commit_sha: receipt.commit_sha.clone(),
            pages_url: receipt.pages_url.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_request() -> TaskRequest {
        serde_json::from_value(serde_json::json!({
            "email": "dev@example.com",
            "secret": "s3cret",
            "task": "abc",
            "round": 1,
            "nonce": "n-1",
            "brief": "build a todo app",
            "checks": ["has an input field"],
            "evaluation_url": "https://eval.example.com/hook"
        }))
        .unwrap()
    }

    #[test]
    fn task_request_defaults_checks_and_attachments() {
        let req = sample_request();
        assert_eq!(req.checks.len(), 1);
        assert!(req.attachments.is_empty());
    }

    #[test]
    fn task_request_roundtrip() {
        let req = sample_request();
        let json = serde_json::to_string(&req).unwrap();
        let parsed: TaskRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.task, "abc");
        assert_eq!(parsed.round, 1);
    }

    #[test]
    fn attachment_deserializes_data_uri() {
        let json = r#"{"name": "logo.png", "url": "data:image/png;base64,iVBORw0KGgo="}"#;
        let att: Attachment = serde_json::from_str(json).unwrap();
        assert_eq!(att.name, "logo.png");
        assert!(att.url.starts_with("data:image/png"));
    }

    #[test]
    fn completion_payload_copies_receipt_fields() {
        let req = sample_request();
        let receipt = PublishReceipt {
            repo_url: "https://github.com/o/llm-app-abc".into(),
            commit_sha: "deadbeef".into(),
            pages_url: "https://o.github.io/llm-app-abc/".into(),
            pages_confirmed: true,
        };
        let payload = CompletionPayload::new(&req, &receipt);
        assert_eq!(payload.commit_sha, "deadbeef");
        assert_eq!(payload.nonce, "n-1");
        assert_eq!(payload.round, 1);
    }

    #[test]
    fn deployment_record_snapshots_artifact() {
        let req = sample_request();
        let receipt = PublishReceipt {
            repo_url: "r".into(),
            commit_sha: "c".into(),
            pages_url: "p".into(),
            pages_confirmed: false,
        };
        let artifact = CodeArtifact {
            html: "<!DOCTYPE html><html></html>".into(),
            readme: "# Todo".into(),
        };
        let record = DeploymentRecord::new(&req, &receipt, artifact.clone());
        assert_eq!(record.snapshot, artifact);
        assert_eq!(record.task, "abc");
    }
}
