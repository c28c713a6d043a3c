//! Summarize Lambda - Handles POST /agent/summarize.

use lambda_http::{run, service_fn, Body, Error, Request, Response};
use serde::Serialize;
use shared::http::{error_response, json_response};
use shared::{parse_body, BedrockTextModel, Config, SummarizationAdapter, SummarizeRequest};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Summarize response payload.
#[derive(Debug, Serialize)]
struct SummarizeResponse {
    response: String,
}

/// Application state shared across requests.
struct AppState {
    adapter: SummarizationAdapter,
}

impl AppState {
    async fn new() -> Result<Self, Error> {
        let config = Config::from_env();
        let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;

        let secrets_client = aws_sdk_secretsmanager::Client::new(&aws_config);
        let secrets = shared::get_app_secrets(&secrets_client, &config.app_secret_name).await?;

        let bedrock_client = aws_sdk_bedrockruntime::Client::new(&aws_config);
        let model = Arc::new(BedrockTextModel::new(
            bedrock_client,
            secrets.text_model_id.clone(),
        ));

        Ok(Self {
            adapter: SummarizationAdapter::new(model),
        })
    }
}

async fn handler(state: Arc<AppState>, event: Request) -> Result<Response<Body>, Error> {
    let request: SummarizeRequest = parse_body!(event.body());

    let content = match request.content.as_deref().map(str::trim) {
        Some(content) if !content.is_empty() => content,
        _ => return error_response(400, "내용이 필요합니다."),
    };

    info!(temperature = ?request.temperature, "Processing summarize request");

    match state.adapter.summarize(content, request.temperature).await {
        Ok(diary) => json_response(200, &SummarizeResponse { response: diary }),
        Err(e) => {
            error!(error = %e, "Summarize request failed");
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
