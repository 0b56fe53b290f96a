//! Request orchestration: validate → persist → generate → check →
//! publish → persist deployment → notify.
//!
//! One request is one linear sequence of awaited remote calls; each step
//! depends on the previous step's output, so there is nothing to
//! parallelize. Round 1 builds a fresh artifact; round 2 revises the
//! round-1 artifact, loading its baseline from the store or, failing
//! that, from the hosting repository itself. Every failure is converted
//! into a `PipelineError` here — nothing escapes to the transport layer
//! uncaught.

use std::sync::Arc;

use crate::db::DbHandle;
use crate::errors::PipelineError;
use crate::github::RepoHost;
use crate::llm::AppGenerator;
use crate::models::{
    CodeArtifact, CompletionPayload, DeploymentOutcome, DeploymentRecord, PublishReceipt,
    TaskRequest,
};
use crate::notify::CompletionNotifier;
use crate::validate::{is_valid_html, validate_request};

/// File set published for every artifact. Empty entries are skipped by
/// the publisher, never committed.
fn artifact_files(artifact: &CodeArtifact) -> Vec<(String, String)> {
    vec![
        ("index.html".to_string(), artifact.html.clone()),
        ("README.md".to_string(), artifact.readme.clone()),
    ]
}

/// Sequences one build/revise request across the external collaborators.
pub struct Pipeline {
    store: DbHandle,
    generator: Arc<dyn AppGenerator>,
    host: Arc<dyn RepoHost>,
    notifier: Arc<dyn CompletionNotifier>,
}

impl Pipeline {
    pub fn new(
        store: DbHandle,
        generator: Arc<dyn AppGenerator>,
        host: Arc<dyn RepoHost>,
        notifier: Arc<dyn CompletionNotifier>,
    ) -> Self {
        Self {
            store,
            generator,
            host,
            notifier,
        }
    }

    /// Process one request end to end.
    pub async fn process(
        &self,
        request: TaskRequest,
    ) -> Result<DeploymentOutcome, PipelineError> {
        tracing::info!(
            "processing request for {} task {} round {}",
            request.email,
            request.task,
            request.round
        );

        validate_request(&request).map_err(PipelineError::Validation)?;

        let submission = request.clone();
        self.store
            .call(move |db| db.save_task(&submission))
            .await
            .map_err(PipelineError::Database)?;

        match request.round {
            1 => self.handle_build(request).await,
            2 => self.handle_revise(request).await,
            round => Err(PipelineError::Validation(format!(
                "invalid round {} (expected 1 or 2)",
                round
            ))),
        }
    }

    /// Round 1: fresh generation, create-mode publish.
    async fn handle_build(
        &self,
        request: TaskRequest,
    ) -> Result<DeploymentOutcome, PipelineError> {
        tracing::info!("round 1 build for task {}", request.task);

        tracing::info!("step 1/4: generating code");
        let artifact = self
            .generator
            .generate(&request.brief, &request.checks, &request.attachments)
            .await?;
        if !is_valid_html(&artifact.html) {
            return Err(PipelineError::InvalidArtifact);
        }

        tracing::info!("step 2/4: publishing repository");
        let receipt = self
            .host
            .publish(&request.task, &artifact_files(&artifact), false)
            .await?;

        tracing::info!("step 3/4: saving deployment");
        self.persist_deployment(&request, &receipt, artifact).await?;

        tracing::info!("step 4/4: notifying evaluation endpoint");
        self.notify(&request, &receipt).await;

        Ok(outcome(&request, &receipt))
    }

    /// Round 2: revise the round-1 baseline, update-mode publish.
    async fn handle_revise(
        &self,
        request: TaskRequest,
    ) -> Result<DeploymentOutcome, PipelineError> {
        tracing::info!("round 2 revise for task {}", request.task);

        tracing::info!("step 1/5: retrieving round-1 baseline");
        let baseline = self.load_baseline(&request).await?;

        tracing::info!("step 2/5: generating revised code");
        let artifact = self
            .generator
            .revise(
                &baseline,
                &request.brief,
                &request.checks,
                &request.attachments,
            )
            .await?;
        if !is_valid_html(&artifact.html) {
            return Err(PipelineError::InvalidArtifact);
        }

        tracing::info!("step 3/5: updating repository");
        let receipt = self
            .host
            .publish(&request.task, &artifact_files(&artifact), true)
            .await?;

        tracing::info!("step 4/5: saving deployment");
        self.persist_deployment(&request, &receipt, artifact).await?;

        tracing::info!("step 5/5: notifying evaluation endpoint");
        self.notify(&request, &receipt).await;

        Ok(outcome(&request, &receipt))
    }

    /// Round-1 snapshot from the store, falling back to reading the files
    /// directly from the hosting repository when the store has a gap.
    async fn load_baseline(&self, request: &TaskRequest) -> Result<CodeArtifact, PipelineError> {
        let email = request.email.clone();
        let task = request.task.clone();
        let stored = self
            .store
            .call(move |db| db.get_deployment(&email, &task, 1))
            .await
            .map_err(PipelineError::Database)?;

        if let Some(record) = stored {
            return Ok(record.snapshot);
        }

        tracing::warn!(
            "no round-1 record in store for task {}; falling back to repository files",
            request.task
        );
        match self.host.fetch_site_files(&request.task).await? {
            Some(artifact) => Ok(artifact),
            None => Err(PipelineError::BaselineNotFound {
                task: request.task.clone(),
            }),
        }
    }

    async fn persist_deployment(
        &self,
        request: &TaskRequest,
        receipt: &PublishReceipt,
        artifact: CodeArtifact,
    ) -> Result<(), PipelineError> {
        let record = DeploymentRecord::new(request, receipt, artifact);
        self.store
            .call(move |db| db.save_deployment(&record))
            .await
            .map_err(PipelineError::Database)
    }

    async fn notify(&self, request: &TaskRequest, receipt: &PublishReceipt) {
        let payload = CompletionPayload::new(request, receipt);
        if !self.notifier.notify(&request.evaluation_url, &payload).await {
            tracing::warn!(
                "evaluation notification failed for task {} (deployment succeeded)",
                request.task
            );
        }
    }
}

fn outcome(request: &TaskRequest, receipt: &PublishReceipt) -> DeploymentOutcome {
    DeploymentOutcome {
        round: request.round,
        repo_url: receipt.repo_url.clone(),
        commit_sha: receipt.commit_sha.clone(),
        pages_url: receipt.pages_url.clone(),
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::db::TaskStore;

    fn request(round: u32) -> TaskRequest {
        TaskRequest {
            email: "dev@example.com".into(),
            secret: "s3cret".into(),
            task: "abc".into(),
            round,
            nonce: "n-1".into(),
            brief: "build a todo app".into(),
            checks: vec!["has an input".into()],
            evaluation_url: "https://eval.example.com/hook".into(),
            attachments: vec![],
        }
    }

    struct Fixture {
        pipeline: Pipeline,
        store: DbHandle,
        generator: Arc<MockGenerator>,
        host: Arc<MockRepoHost>,
        notifier: Arc<MockNotifier>,
    }

    fn fixture_with(generator: MockGenerator, host: MockRepoHost, notifier: MockNotifier) -> Fixture {
        let store = DbHandle::new(TaskStore::new_in_memory().unwrap());
        let generator = Arc::new(generator);
        let host = Arc::new(host);
        let notifier = Arc::new(notifier);
        let pipeline = Pipeline::new(
            store.clone(),
            generator.clone(),
            host.clone(),
            notifier.clone(),
        );
        Fixture {
            pipeline,
            store,
            generator,
            host,
            notifier,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(
            MockGenerator::returning(VALID_HTML),
            MockRepoHost::new(),
            MockNotifier::new(true),
        )
    }

    #[tokio::test]
    async fn round_one_builds_in_create_mode() {
        let fx = fixture();
        let outcome = fx.pipeline.process(request(1)).await.unwrap();

        assert!(!outcome.commit_sha.is_empty());
        let publishes = fx.host.publishes.lock().unwrap();
        assert_eq!(publishes.len(), 1);
        assert!(!publishes[0].is_update);
        assert_eq!(publishes[0].task_id, "abc");
        let filenames: Vec<_> = publishes[0].files.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(filenames, ["index.html", "README.md"]);
    }

    #[tokio::test]
    async fn round_one_persists_submission_and_deployment() {
        let fx = fixture();
        fx.pipeline.process(request(1)).await.unwrap();

        let count = fx.store.call(|db| db.submission_count()).await.unwrap();
        assert_eq!(count, 1);
        let record = fx
            .store
            .call(|db| db.get_deployment("dev@example.com", "abc", 1))
            .await
            .unwrap()
            .expect("deployment persisted");
        assert_eq!(record.commit_sha, "deadbeef");
        assert_eq!(record.snapshot.html, VALID_HTML);
    }

    #[tokio::test]
    async fn round_two_uses_stored_baseline_and_update_mode() {
        let fx = fixture();
        fx.pipeline.process(request(1)).await.unwrap();
        fx.pipeline.process(request(2)).await.unwrap();

        // The stored round-1 HTML was handed to the generator as baseline.
        let baseline = fx.generator.last_baseline.lock().unwrap();
        assert_eq!(baseline.as_ref().unwrap().html, VALID_HTML);

        let publishes = fx.host.publishes.lock().unwrap();
        assert_eq!(publishes.len(), 2);
        assert!(publishes[1].is_update);
        // No repository fallback was needed.
        assert_eq!(*fx.host.fetches.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn round_two_falls_back_to_repository_files() {
        let mut host = MockRepoHost::new();
        host.site_files = Some(crate::models::CodeArtifact {
            html: "<html>from repo</html>".into(),
            readme: "# from repo".into(),
        });
        let fx = fixture_with(
            MockGenerator::returning(VALID_HTML),
            host,
            MockNotifier::new(true),
        );

        fx.pipeline.process(request(2)).await.unwrap();

        assert_eq!(*fx.host.fetches.lock().unwrap(), 1);
        let baseline = fx.generator.last_baseline.lock().unwrap();
        assert_eq!(baseline.as_ref().unwrap().html, "<html>from repo</html>");
    }

    #[tokio::test]
    async fn round_two_without_any_baseline_is_not_found() {
        let fx = fixture();
        let err = fx.pipeline.process(request(2)).await.unwrap_err();
        assert!(matches!(err, PipelineError::BaselineNotFound { .. }));
        // The fallback was attempted before giving up.
        assert_eq!(*fx.host.fetches.lock().unwrap(), 1);
        // Nothing was published.
        assert!(fx.host.publishes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn round_three_is_rejected_before_any_side_effect() {
        let fx = fixture();
        let err = fx.pipeline.process(request(3)).await.unwrap_err();

        assert!(matches!(err, PipelineError::Validation(_)));
        let count = fx.store.call(|db| db.submission_count()).await.unwrap();
        assert_eq!(count, 0);
        assert!(fx.host.publishes.lock().unwrap().is_empty());
        assert!(fx.notifier.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_html_aborts_before_publish() {
        let fx = fixture_with(
            MockGenerator::returning("<!DOCTYPE html><html><body>truncated"),
            MockRepoHost::new(),
            MockNotifier::new(true),
        );
        let err = fx.pipeline.process(request(1)).await.unwrap_err();

        assert!(matches!(err, PipelineError::InvalidArtifact));
        assert!(fx.host.publishes.lock().unwrap().is_empty());
        assert!(fx.notifier.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn notification_failure_does_not_fail_the_request() {
        let fx = fixture_with(
            MockGenerator::returning(VALID_HTML),
            MockRepoHost::new(),
            MockNotifier::new(false),
        );
        let outcome = fx.pipeline.process(request(1)).await.unwrap();

        // Deployment fields are still returned in full.
        assert_eq!(outcome.commit_sha, "deadbeef");
        assert_eq!(outcome.pages_url, "https://octocat.github.io/llm-app-abc/");
        assert_eq!(fx.notifier.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn notifier_receives_full_payload() {
        let fx = fixture();
        fx.pipeline.process(request(1)).await.unwrap();

        let calls = fx.notifier.calls.lock().unwrap();
        let (url, payload) = &calls[0];
        assert_eq!(url, "https://eval.example.com/hook");
        assert_eq!(payload.nonce, "n-1");
        assert_eq!(payload.commit_sha, "deadbeef");
        assert_eq!(payload.round, 1);
    }

    #[tokio::test]
    async fn publish_receipt_fields_flow_to_outcome() {
        let mut host = MockRepoHost::new();
        host.receipt = PublishReceipt {
            repo_url: "https://github.com/octocat/llm-app-xyz".into(),
            commit_sha: "cafe".into(),
            pages_url: "https://octocat.github.io/llm-app-xyz/".into(),
            pages_confirmed: false,
        };
        let fx = fixture_with(
            MockGenerator::returning(VALID_HTML),
            host,
            MockNotifier::new(true),
        );
        let outcome = fx.pipeline.process(request(1)).await.unwrap();
        assert_eq!(outcome.repo_url, "https://github.com/octocat/llm-app-xyz");
        assert_eq!(outcome.commit_sha, "cafe");
    }
}
