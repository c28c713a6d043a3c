//! AWS Secrets Manager integration.

use aws_sdk_secretsmanager::Client as SecretsClient;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::OnceLock;
use tokio::sync::RwLock;

use crate::{Error, Result};

/// Cached secrets with lazy initialization.
static SECRETS_CACHE: OnceLock<RwLock<HashMap<String, String>>> = OnceLock::new();

fn get_cache() -> &'static RwLock<HashMap<String, String>> {
    SECRETS_CACHE.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Database credentials from Secrets Manager.
#[derive(Debug, Deserialize)]
pub struct DatabaseCredentials {
    pub username: String,
    pub password: String,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub dbname: Option<String>,
}

/// Application settings from Secrets Manager.
///
/// Deserialized from the `agent-core-secret` payload. Missing model ids fall
/// back to the deployment defaults so a partially-populated secret still
/// boots the service.
#[derive(Debug, Clone, Deserialize)]
pub struct AppSecrets {
    /// Bedrock knowledge base holding indexed diary entries
    #[serde(rename = "KNOWLEDGE_BASE_ID")]
    pub knowledge_base_id: String,
    /// S3 bucket for persisted diary images
    #[serde(rename = "KNOWLEDGE_BASE_BUCKET", default)]
    pub image_bucket: String,
    /// Text model for classification, answers, summaries, and reports
    #[serde(rename = "BEDROCK_LLM_MODEL_ID", default = "default_text_model")]
    pub text_model_id: String,
    /// Image synthesis model
    #[serde(rename = "BEDROCK_NOVA_CANVAS_MODEL_ID", default = "default_image_model")]
    pub image_model_id: String,
}

fn default_text_model() -> String {
    "us.anthropic.claude-sonnet-4-20250514-v1:0".to_string()
}

fn default_image_model() -> String {
    "amazon.nova-canvas-v1:0".to_string()
}

/// Get a secret value from Secrets Manager with caching.
pub async fn get_secret(client: &SecretsClient, secret_id: &str) -> Result<String> {
    // Check cache first
    {
        let cache = get_cache().read().await;
        if let Some(value) = cache.get(secret_id) {
            return Ok(value.clone());
        }
    }

    // Fetch from Secrets Manager
    let response = client
        .get_secret_value()
        .secret_id(secret_id)
        .send()
        .await
        .map_err(|e| Error::Upstream(format!("Failed to get secret: {}", e)))?;

    let secret_string = response
        .secret_string()
        .ok_or_else(|| Error::Config("Secret has no string value".to_string()))?
        .to_string();

    // Cache the result
    {
        let mut cache = get_cache().write().await;
        cache.insert(secret_id.to_string(), secret_string.clone());
    }

    Ok(secret_string)
}

/// Get database credentials from Secrets Manager.
pub async fn get_database_credentials(
    client: &SecretsClient,
    secret_arn: &str,
) -> Result<DatabaseCredentials> {
    let secret_string = get_secret(client, secret_arn).await?;

    serde_json::from_str(&secret_string)
        .map_err(|e| Error::Config(format!("Failed to parse database credentials: {}", e)))
}

/// Get application settings from Secrets Manager.
pub async fn get_app_secrets(client: &SecretsClient, secret_name: &str) -> Result<AppSecrets> {
    let secret_string = get_secret(client, secret_name).await?;

    serde_json::from_str(&secret_string)
        .map_err(|e| Error::Config(format!("Failed to parse app secrets: {}", e)))
}

/// Clear the secrets cache (useful for testing or credential rotation).
pub async fn clear_cache() {
    let mut cache = get_cache().write().await;
    cache.clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_credentials() {
        let json = r#"{"username":"admin","password":"secret123","host":"db.example.com","port":5432,"dbname":"mydb"}"#;
        let creds: DatabaseCredentials = serde_json::from_str(json).unwrap();
        assert_eq!(creds.username, "admin");
        assert_eq!(creds.password, "secret123");
        assert_eq!(creds.host, Some("db.example.com".to_string()));
    }

    #[test]
    fn test_parse_app_secrets_with_defaults() {
        let json = r#"{"KNOWLEDGE_BASE_ID":"KB123456"}"#;
        let secrets: AppSecrets = serde_json::from_str(json).unwrap();
        assert_eq!(secrets.knowledge_base_id, "KB123456");
        assert!(secrets.image_bucket.is_empty());
        assert_eq!(secrets.image_model_id, "amazon.nova-canvas-v1:0");
        assert!(!secrets.text_model_id.is_empty());
    }

    #[test]
    fn test_parse_app_secrets_full() {
        let json = r#"{
            "KNOWLEDGE_BASE_ID": "KB123456",
            "KNOWLEDGE_BASE_BUCKET": "diary-images",
            "BEDROCK_LLM_MODEL_ID": "us.amazon.nova-pro-v1:0",
            "BEDROCK_NOVA_CANVAS_MODEL_ID": "amazon.nova-canvas-v1:0"
        }"#;
        let secrets: AppSecrets = serde_json::from_str(json).unwrap();
        assert_eq!(secrets.image_bucket, "diary-images");
        assert_eq!(secrets.text_model_id, "us.amazon.nova-pro-v1:0");
    }
}
