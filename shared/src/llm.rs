//! Bedrock model clients behind the capability traits.

use async_trait::async_trait;
use aws_sdk_bedrockruntime::primitives::Blob;
use aws_sdk_bedrockruntime::types::{
    ContentBlock, ConversationRole, InferenceConfiguration, Message, SystemContentBlock,
};
use aws_sdk_bedrockruntime::Client as BedrockClient;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::{Error, Result};

/// Sampling parameters for a single completion.
#[derive(Debug, Clone, Copy)]
pub struct InferenceParams {
    /// Sampling temperature; `None` uses the model default
    pub temperature: Option<f32>,
    /// Completion token budget
    pub max_tokens: i32,
}

impl Default for InferenceParams {
    fn default() -> Self {
        Self {
            temperature: None,
            max_tokens: 1024,
        }
    }
}

/// Text generation capability.
///
/// One seam for classification fallback, answer composition, summaries,
/// prompt derivation, and report analysis, so all of them are testable
/// against a fake.
#[async_trait]
pub trait TextModel: Send + Sync {
    async fn complete(&self, system: &str, user: &str, params: InferenceParams) -> Result<String>;
}

/// Image synthesis capability.
#[async_trait]
pub trait ImageSynthesizer: Send + Sync {
    /// Synthesize one image; returns the base64-encoded PNG.
    async fn synthesize(&self, positive_prompt: &str, negative_prompt: &str) -> Result<String>;
}

/// Text model client over the Bedrock Converse API.
pub struct BedrockTextModel {
    client: BedrockClient,
    model_id: String,
}

impl BedrockTextModel {
    pub fn new(client: BedrockClient, model_id: String) -> Self {
        Self { client, model_id }
    }
}

#[async_trait]
impl TextModel for BedrockTextModel {
    async fn complete(&self, system: &str, user: &str, params: InferenceParams) -> Result<String> {
        let message = Message::builder()
            .role(ConversationRole::User)
            .content(ContentBlock::Text(user.to_string()))
            .build()
            .map_err(|e| Error::Internal(format!("Failed to build message: {}", e)))?;

        let mut inference_config = InferenceConfiguration::builder().max_tokens(params.max_tokens);
        if let Some(temperature) = params.temperature {
            inference_config = inference_config.temperature(temperature);
        }

        let response = self
            .client
            .converse()
            .model_id(&self.model_id)
            .system(SystemContentBlock::Text(system.to_string()))
            .messages(message)
            .inference_config(inference_config.build())
            .send()
            .await
            .map_err(|e| Error::Upstream(format!("Model invocation failed: {}", e)))?;

        let output = response
            .output
            .ok_or_else(|| Error::Upstream("Model returned no output".to_string()))?;

        let message = output
            .as_message()
            .map_err(|_| Error::Upstream("Model returned a non-message output".to_string()))?;

        let text: String = message
            .content()
            .iter()
            .filter_map(|block| block.as_text().ok().map(String::as_str))
            .collect();

        if text.trim().is_empty() {
            return Err(Error::Upstream("Model returned an empty completion".to_string()));
        }

        Ok(text.trim().to_string())
    }
}

/// Image generation settings for Nova Canvas.
const IMAGE_WIDTH: u32 = 1024;
const IMAGE_HEIGHT: u32 = 1280;
const IMAGE_CFG_SCALE: f64 = 6.5;

/// Nova Canvas client over the Bedrock InvokeModel API.
pub struct NovaCanvasSynthesizer {
    client: BedrockClient,
    model_id: String,
}

impl NovaCanvasSynthesizer {
    pub fn new(client: BedrockClient, model_id: String) -> Self {
        Self { client, model_id }
    }

    fn random_seed() -> i64 {
        // Nova Canvas accepts seeds in [0, 2147483647]; clock entropy is
        // enough since the seed only needs to vary per request.
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.subsec_nanos() as i64)
            .unwrap_or(0);
        nanos % 2_147_483_647
    }
}

#[async_trait]
impl ImageSynthesizer for NovaCanvasSynthesizer {
    async fn synthesize(&self, positive_prompt: &str, negative_prompt: &str) -> Result<String> {
        let seed = Self::random_seed();

        let request_body = serde_json::json!({
            "taskType": "TEXT_IMAGE",
            "textToImageParams": {
                "text": positive_prompt,
                "negativeText": negative_prompt,
            },
            "imageGenerationConfig": {
                "cfgScale": IMAGE_CFG_SCALE,
                "seed": seed,
                "width": IMAGE_WIDTH,
                "height": IMAGE_HEIGHT,
                "numberOfImages": 1,
            },
        });

        tracing::info!(seed, "Generating image with Nova Canvas");

        let response = self
            .client
            .invoke_model()
            .model_id(&self.model_id)
            .content_type("application/json")
            .accept("*/*")
            .body(Blob::new(serde_json::to_vec(&request_body)?))
            .send()
            .await
            .map_err(|e| Error::Upstream(format!("Image synthesis failed: {}", e)))?;

        let payload: serde_json::Value = serde_json::from_slice(response.body().as_ref())?;

        payload["images"]
            .get(0)
            .and_then(|image| image.as_str())
            .map(String::from)
            .ok_or_else(|| Error::Upstream("No images returned from Nova Canvas".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_in_range() {
        for _ in 0..32 {
            let seed = NovaCanvasSynthesizer::random_seed();
            assert!((0..2_147_483_647).contains(&seed));
        }
    }

    #[test]
    fn test_default_params() {
        let params = InferenceParams::default();
        assert!(params.temperature.is_none());
        assert_eq!(params.max_tokens, 1024);
    }
}
