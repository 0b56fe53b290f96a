//! Payload and artifact shape checks.
//!
//! These are deliberately shallow: the request validator checks presence
//! and accepted round values only (no email/URL semantics), and the HTML
//! check exists purely to catch grossly truncated or malformed generator
//! output before it is published.

use crate::models::TaskRequest;

/// Rounds the pipeline knows how to process: 1 = build, 2 = revise.
pub const ACCEPTED_ROUNDS: &[u32] = &[1, 2];

/// Check an incoming payload for required fields and an accepted round.
///
/// Returns `Err` with a human-readable message naming the first problem
/// found. The orchestrator must short-circuit before any persistence or
/// remote call when this fails.
pub fn validate_request(request: &TaskRequest) -> Result<(), String> {
    let required = [
        ("email", &request.email),
        ("secret", &request.secret),
        ("task", &request.task),
        ("nonce", &request.nonce),
        ("brief", &request.brief),
        ("evaluation_url", &request.evaluation_url),
    ];
    for (name, value) in required {
        if value.trim().is_empty() {
            return Err(format!("missing required field: {}", name));
        }
    }
    if !ACCEPTED_ROUNDS.contains(&request.round) {
        return Err(format!(
            "invalid round {} (expected 1 or 2)",
            request.round
        ));
    }
    Ok(())
}

/// Minimal structural sanity check on generated HTML.
///
/// Accepts a document that opens with a doctype or `<html` root marker and
/// contains a closing `</html>` marker. Not a parser — truncated model
/// output is the failure mode this guards against.
pub fn is_valid_html(html: &str) -> bool {
    let lower = html.trim_start().to_lowercase();
    let opens = lower.starts_with("<!doctype html") || lower.starts_with("<html");
    let has_root = lower.contains("<html");
    let closes = lower.contains("</html>");
    opens && has_root && closes
}
