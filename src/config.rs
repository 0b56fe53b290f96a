//! Environment-backed service configuration.
//!
//! Credentials come from the process environment (a `.env` file is
//! honored at startup). A missing credential does not abort startup:
//! the affected collaborator is marked unavailable, the health endpoint
//! reflects it, and request handling answers 503.

use crate::llm::DEFAULT_MODEL;

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub github_token: Option<String>,
    pub github_username: Option<String>,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub webhook_secret: Option<String>,
}

impl ServiceConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            github_token: non_empty("GITHUB_TOKEN"),
            github_username: non_empty("GITHUB_USERNAME"),
            gemini_api_key: non_empty("GEMINI_API_KEY"),
            gemini_model: non_empty("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            webhook_secret: non_empty("WEBHOOK_SECRET"),
        }
    }

    /// Both values needed to talk to the hosting platform.
    pub fn github_credentials(&self) -> Option<(&str, &str)> {
        match (&self.github_token, &self.github_username) {
            (Some(token), Some(user)) => Some((token, user)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> ServiceConfig {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServiceConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn full_configuration_parses() {
        let config = config_from(&[
            ("GITHUB_TOKEN", "ghp_abc"),
            ("GITHUB_USERNAME", "octocat"),
            ("GEMINI_API_KEY", "AIza-key"),
            ("GEMINI_MODEL", "gemini-2.5-pro"),
            ("WEBHOOK_SECRET", "hush"),
        ]);
        assert_eq!(config.github_credentials(), Some(("ghp_abc", "octocat")));
        assert_eq!(config.gemini_model, "gemini-2.5-pro");
        assert_eq!(config.webhook_secret.as_deref(), Some("hush"));
    }

    #[test]
    fn model_defaults_when_unset() {
        let config = config_from(&[]);
        assert_eq!(config.gemini_model, DEFAULT_MODEL);
    }

    #[test]
    fn empty_values_count_as_unset() {
        let config = config_from(&[("GITHUB_TOKEN", "  "), ("GEMINI_API_KEY", "")]);
        assert!(config.github_token.is_none());
        assert!(config.gemini_api_key.is_none());
    }

    #[test]
    fn github_credentials_require_both_values() {
        let config = config_from(&[("GITHUB_TOKEN", "ghp_abc")]);
        assert!(config.github_credentials().is_none());
    }

    #[test]
    fn missing_secret_means_check_skipped() {
        let config = config_from(&[]);
        assert!(config.webhook_secret.is_none());
    }
}
