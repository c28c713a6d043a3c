//! Diary-to-image pipeline: persist, preview, or prompt-only.
//!
//! Sub-intent selection is a priority-ordered predicate chain over field
//! presence — persistence > preview-generation > prompt-only — with the
//! natural-language cue in `content` breaking the one genuinely ambiguous
//! combination (`text` + `image_base64` without the full persist field set).

use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{Datelike, NaiveDate, Utc};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::knowledge::parse_reference_date;
use crate::llm::{ImageSynthesizer, InferenceParams, TextModel};
use crate::models::ImageRequest;
use crate::{Error, Result};

const PROMPT_CUES: &[&str] = &["프롬프트", "prompt"];
const PERSIST_CUES: &[&str] = &["저장", "업로드", "히스토리", "save", "upload"];

const NEGATIVE_PROMPT: &str = "anime, cartoon, illustration, painting, sketch, drawing, \
3d render, cgi, unreal engine, fantasy, surreal, low quality, low resolution, blurry, \
out of focus, noise, overexposed, underexposed, jpeg artifacts, deformed body, \
distorted face, bad anatomy, extra fingers, missing fingers, fused fingers, extra limbs, \
missing limbs, overly posed, studio lighting, text, caption, subtitle, watermark, logo, \
wrong food, wrong animal, substituted items, inaccurate details";

const PROMPT_SYSTEM: &str = "\
You are an expert at converting Korean diary entries into detailed English image \
generation prompts for realistic photography.

CRITICAL RULES:
1. Read the Korean diary CAREFULLY and extract ALL visual elements
2. Your output must be ONLY the English prompt - no explanations, no Korean text
3. The prompt must accurately reflect what is described in the diary

MUST INCLUDE if mentioned in the diary: weather, time of day, location, animals with \
their specific actions, and mood. If the diary mentions doing something WITH a pet, \
the image MUST show the person and the animal together. All people in the image must \
be Asian/East Asian.

PROMPT STRUCTURE:
\"A realistic photo of [person/animal doing activity], [weather], [lighting], \
[specific details], [mood], natural photography style, high quality\"

Keep the prompt under 500 characters.";

const MAX_PROMPT_LEN: usize = 1024;

/// Resolved image sub-intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageIntent {
    /// Upload the supplied image into the user's history
    Persist {
        user_id: String,
        record_date: String,
        image_base64: String,
    },
    /// Derive a prompt and synthesize an inline preview
    Preview { text: String },
    /// Derive and return the prompt pair only
    PromptOnly { text: String },
}

fn contains_any(text: &str, cues: &[&str]) -> bool {
    let lowercase = text.to_lowercase();
    cues.iter().any(|cue| lowercase.contains(cue))
}

/// Select the sub-intent from field presence, falling back to the
/// natural-language cue in `content` for the ambiguous combination.
pub fn resolve_intent(request: &ImageRequest) -> Result<ImageIntent> {
    let content = request.content.as_deref().unwrap_or("");
    let has_image = request.image_base64.as_deref().is_some_and(|s| !s.is_empty());
    let has_text = request.text.as_deref().is_some_and(|s| !s.is_empty());

    // Persistence wins outright when its field set is complete.
    if has_image {
        if let (Some(user_id), Some(record_date)) =
            (request.user_id.as_deref(), request.record_date.as_deref())
        {
            return Ok(ImageIntent::Persist {
                user_id: user_id.to_string(),
                record_date: record_date.to_string(),
                image_base64: request.image_base64.clone().unwrap_or_default(),
            });
        }
    }

    if has_text {
        // text + image without persist fields: the content cue decides.
        if has_image && contains_any(content, PERSIST_CUES) {
            return Err(Error::InvalidInput(
                "이미지 저장에는 user_id와 record_date가 필요합니다.".to_string(),
            ));
        }
        if contains_any(content, PROMPT_CUES) {
            return Ok(ImageIntent::PromptOnly {
                text: request.text.clone().unwrap_or_default(),
            });
        }
        return Ok(ImageIntent::Preview {
            text: request.text.clone().unwrap_or_default(),
        });
    }

    if has_image {
        return Err(Error::InvalidInput(
            "이미지 저장에는 user_id와 record_date가 필요합니다.".to_string(),
        ));
    }

    Err(Error::InvalidInput(
        "이미지 생성에는 text가 필요합니다.".to_string(),
    ))
}

/// Decode a base64 image payload; garbage is the caller's fault, not an
/// upstream failure.
pub fn decode_image(image_base64: &str) -> Result<Vec<u8>> {
    BASE64
        .decode(image_base64.trim())
        .map_err(|e| Error::InvalidInput(format!("이미지 디코딩에 실패했습니다: {}", e)))
}

/// Positive/negative prompt pair for synthesis.
#[derive(Debug, Clone)]
pub struct PromptPair {
    pub positive: String,
    pub negative: String,
}

/// Durable image storage for persisted diary images.
pub struct ImageStore {
    client: S3Client,
    bucket: String,
    region: String,
}

impl ImageStore {
    pub fn new(client: S3Client, bucket: String, region: String) -> Self {
        Self {
            client,
            bucket,
            region,
        }
    }

    /// History key for a persisted image:
    /// `{user_id}/history/{YYYY}/{MM}/{DD}/image_{millis}.png`.
    pub fn history_key(user_id: &str, date: NaiveDate, millis: u128) -> String {
        format!(
            "{}/history/{:04}/{:02}/{:02}/image_{}.png",
            user_id,
            date.year(),
            date.month(),
            date.day(),
            millis
        )
    }

    /// Upload a PNG and return `(s3_key, public object URL)`.
    pub async fn upload_png(&self, user_id: &str, record_date: &str, bytes: Vec<u8>) -> Result<(String, String)> {
        let date = parse_reference_date(record_date).unwrap_or_else(|| Utc::now().date_naive());
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        let key = Self::history_key(user_id, date, millis);

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(bytes))
            .content_type("image/png")
            .send()
            .await
            .map_err(|e| Error::Upstream(format!("Image upload failed: {}", e)))?;

        let url = format!(
            "https://{}.s3.{}.amazonaws.com/{}",
            self.bucket, self.region, key
        );

        Ok((key, url))
    }
}

/// The image capability: resolves the sub-intent and executes its branch.
pub struct ImagePipeline {
    model: Arc<dyn TextModel>,
    synthesizer: Arc<dyn ImageSynthesizer>,
    store: ImageStore,
}

impl ImagePipeline {
    pub fn new(
        model: Arc<dyn TextModel>,
        synthesizer: Arc<dyn ImageSynthesizer>,
        store: ImageStore,
    ) -> Self {
        Self {
            model,
            synthesizer,
            store,
        }
    }

    /// Run one image request to completion.
    pub async fn run(&self, request: &ImageRequest) -> Result<serde_json::Value> {
        match resolve_intent(request)? {
            ImageIntent::Persist {
                user_id,
                record_date,
                image_base64,
            } => {
                let bytes = decode_image(&image_base64)?;
                // The write happens only after the payload fully decoded;
                // nothing partial ever lands in the bucket.
                let (s3_key, image_url) =
                    self.store.upload_png(&user_id, &record_date, bytes).await?;
                tracing::info!(user_id = %user_id, s3_key = %s3_key, "Image persisted");
                Ok(serde_json::json!({
                    "user_id": user_id,
                    "s3_key": s3_key,
                    "image_url": image_url,
                }))
            }
            ImageIntent::Preview { text } => {
                let prompt = self.derive_prompt(&text).await;
                let image_base64 = self
                    .synthesizer
                    .synthesize(&prompt.positive, &prompt.negative)
                    .await?;
                Ok(serde_json::json!({
                    "image_base64": image_base64,
                    "prompt": {
                        "positive": prompt.positive,
                        "negative": prompt.negative,
                    },
                }))
            }
            ImageIntent::PromptOnly { text } => {
                let prompt = self.derive_prompt(&text).await;
                Ok(serde_json::json!({
                    "positive_prompt": prompt.positive,
                    "negative_prompt": prompt.negative,
                }))
            }
        }
    }

    /// Derive the prompt pair from diary text. A model failure degrades to
    /// a documentary-style fallback so preview generation still proceeds.
    async fn derive_prompt(&self, text: &str) -> PromptPair {
        let positive = match self
            .model
            .complete(
                PROMPT_SYSTEM,
                &format!(
                    "Convert this Korean diary entry into an English image generation prompt:\n\n{}",
                    text
                ),
                InferenceParams {
                    temperature: None,
                    max_tokens: 1024,
                },
            )
            .await
        {
            Ok(prompt) if prompt.chars().count() > MAX_PROMPT_LEN => {
                prompt.chars().take(MAX_PROMPT_LEN).collect()
            }
            Ok(prompt) => prompt,
            Err(e) => {
                tracing::warn!(error = %e, "Prompt derivation failed, using fallback");
                let excerpt: String = text.chars().take(200).collect();
                format!("A realistic documentary-style photo representing: {}", excerpt)
            }
        };

        PromptPair {
            positive,
            negative: NEGATIVE_PROMPT.to_string(),
        }
    }
}
