//! Configuration management for the service binaries.

use std::env;

/// Application configuration loaded from environment variables.
///
/// Backend identifiers that are secret material (knowledge base id, bucket,
/// model ids, database credentials) live in [`crate::secrets::AppSecrets`];
/// everything here is plain deployment wiring.
#[derive(Debug, Clone)]
pub struct Config {
    /// AWS region
    pub aws_region: String,
    /// Name of the secret holding application settings
    pub app_secret_name: String,
    /// ARN of the secret containing database credentials
    pub db_secret_arn: Option<String>,
    /// Database host
    pub db_host: Option<String>,
    /// Database name
    pub db_name: String,
    /// Lexical classifier confidence threshold; at or below it the
    /// text model breaks the tie
    pub intent_confidence_threshold: f32,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            aws_region: env::var("AWS_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
            app_secret_name: env::var("SECRET_NAME")
                .unwrap_or_else(|_| "agent-core-secret".to_string()),
            db_secret_arn: env::var("DB_SECRET_ARN").ok(),
            db_host: env::var("DB_HOST").ok(),
            db_name: env::var("DB_NAME").unwrap_or_else(|_| "diary_agent".to_string()),
            intent_confidence_threshold: env::var("INTENT_CONFIDENCE_THRESHOLD")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0.75),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        // Only assert the defaults that do not depend on ambient env vars.
        let config = Config {
            aws_region: "us-east-1".into(),
            app_secret_name: "agent-core-secret".into(),
            db_secret_arn: None,
            db_host: None,
            db_name: "diary_agent".into(),
            intent_confidence_threshold: 0.75,
        };
        assert!(config.intent_confidence_threshold > 0.0);
        assert!(config.intent_confidence_threshold < 1.0);
    }
}
