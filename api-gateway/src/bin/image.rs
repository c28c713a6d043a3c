//! Image Lambda - Handles POST /agent/image.
//!
//! Routes to persist / preview / prompt-only based on which optional fields
//! the request populates, with the content cue breaking the ambiguous case.

use lambda_http::{run, service_fn, Body, Error, Request, Response};
use shared::http::{error_response, json_response};
use shared::{
    parse_body, BedrockTextModel, CapabilityResponse, Config, ImagePipeline, ImageRequest,
    ImageStore, NovaCanvasSynthesizer,
};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Application state shared across requests.
struct AppState {
    pipeline: ImagePipeline,
}

impl AppState {
    async fn new() -> Result<Self, Error> {
        let config = Config::from_env();
        let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;

        let secrets_client = aws_sdk_secretsmanager::Client::new(&aws_config);
        let secrets = shared::get_app_secrets(&secrets_client, &config.app_secret_name).await?;

        let bedrock_client = aws_sdk_bedrockruntime::Client::new(&aws_config);
        let s3_client = aws_sdk_s3::Client::new(&aws_config);

        let model = Arc::new(BedrockTextModel::new(
            bedrock_client.clone(),
            secrets.text_model_id.clone(),
        ));
        let synthesizer = Arc::new(NovaCanvasSynthesizer::new(
            bedrock_client,
            secrets.image_model_id.clone(),
        ));
        let store = ImageStore::new(
            s3_client,
            secrets.image_bucket.clone(),
            config.aws_region.clone(),
        );

        Ok(Self {
            pipeline: ImagePipeline::new(model, synthesizer, store),
        })
    }
}

async fn handler(state: Arc<AppState>, event: Request) -> Result<Response<Body>, Error> {
    let request: ImageRequest = parse_body!(event.body());

    if request
        .content
        .as_deref()
        .map(str::trim)
        .unwrap_or_default()
        .is_empty()
    {
        return error_response(400, "요청 내용이 필요합니다.");
    }

    info!(
        has_text = request.text.is_some(),
        has_image = request.image_base64.is_some(),
        "Processing image request"
    );

    match state.pipeline.run(&request).await {
        Ok(response) => json_response(200, &CapabilityResponse::success(response)),
        Err(e) => {
            error!(error = %e, "Image request failed");
            error_response(e.status_code(), e.to_string())
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    let state = Arc::new(AppState::new().await?);

    run(service_fn(move |event| {
        let state = Arc::clone(&state);
        async move { handler(state, event).await }
    }))
    .await
}
