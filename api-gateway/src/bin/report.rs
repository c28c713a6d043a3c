//! Report Lambda - Handles POST /agent/report.
//!
//! Routes to fetch / generate / list based on which identifying fields the
//! request populates. Reports are immutable once created; fetching one the
//! caller does not own is indistinguishable from fetching one that does not
//! exist.

use lambda_http::{run, service_fn, Body, Error, Request, Response};
use shared::http::{error_response, json_response};
use shared::{
    parse_body, BedrockTextModel, CapabilityResponse, Config, ReportAnalyzer, ReportRequest,
    ReportService, ReportStore,
};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Application state shared across requests.
struct AppState {
    service: ReportService,
}

impl AppState {
    async fn new() -> Result<Self, Error> {
        let config = Config::from_env();
        let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;

        let secrets_client = aws_sdk_secretsmanager::Client::new(&aws_config);
        let secrets = shared::get_app_secrets(&secrets_client, &config.app_secret_name).await?;

        let db_secret_arn = config
            .db_secret_arn
            .clone()
            .ok_or("DB_SECRET_ARN not set")?;
        let db_creds = shared::get_database_credentials(&secrets_client, &db_secret_arn).await?;
        let pool = shared::db::create_pool(&config, &db_creds).await?;

        let bedrock_client = aws_sdk_bedrockruntime::Client::new(&aws_config);
        let model = Arc::new(BedrockTextModel::new(
            bedrock_client,
            secrets.text_model_id.clone(),
        ));

        Ok(Self {
            service: ReportService::new(ReportStore::new(pool), ReportAnalyzer::new(model)),
        })
    }
}

async fn handler(state: Arc<AppState>, event: Request) -> Result<Response<Body>, Error> {
    let request: ReportRequest = parse_body!(event.body());

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
        has_report_id = request.report_id.is_some(),
        has_range = request.start_date.is_some() && request.end_date.is_some(),
        "Processing report request"
    );

    match state.service.run(&request).await {
        Ok(response) => json_response(200, &CapabilityResponse::success(response)),
        Err(e) => {
            error!(error = %e, "Report request failed");
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
