//! Report Dispatcher Lambda - Generates weekly reports on a schedule.
//!
//! Runs weekly via EventBridge and:
//! 1. Finds users with diary entries in the trailing seven days
//! 2. Skips users whose report already covers that window
//! 3. Generates the missing reports through the shared report service
//!
//! Per-user failures are logged and counted, never fatal to the batch.

use chrono::{Duration, NaiveDate, Utc};
use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use serde::{Deserialize, Serialize};
use shared::{BedrockTextModel, Config, ReportAnalyzer, ReportService, ReportStore};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Deserialize)]
struct ScheduledEvent {
    // EventBridge scheduled event
    #[serde(default)]
    detail_type: String,
}

#[derive(Debug, Serialize)]
struct DispatcherResponse {
    users_processed: u32,
    reports_generated: u32,
    errors: u32,
}

struct AppState {
    pool: PgPool,
    store: ReportStore,
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
            pool: pool.clone(),
            store: ReportStore::new(pool.clone()),
            service: ReportService::new(ReportStore::new(pool), ReportAnalyzer::new(model)),
        })
    }
}

/// Users with at least one diary entry in the window.
async fn users_with_entries(
    pool: &PgPool,
    start_date: NaiveDate,
    end_date: NaiveDate,
) -> Result<Vec<String>, Error> {
    let user_ids: Vec<String> = sqlx::query_scalar(
        r#"
        SELECT DISTINCT user_id
        FROM diary_entries
        WHERE record_date BETWEEN $1 AND $2
        ORDER BY user_id
        "#,
    )
    .bind(start_date)
    .bind(end_date)
    .fetch_all(pool)
    .await
    .map_err(|e| format!("Failed to query users: {}", e))?;

    Ok(user_ids)
}

async fn handler(
    state: Arc<AppState>,
    _event: LambdaEvent<ScheduledEvent>,
) -> Result<DispatcherResponse, Error> {
    let today = Utc::now().date_naive();
    let start_date = today - Duration::days(7);
    let end_date = today - Duration::days(1);

    info!(%start_date, %end_date, "Starting weekly report dispatch");

    let user_ids = users_with_entries(&state.pool, start_date, end_date).await?;

    info!(users_found = user_ids.len(), "Found users with diary entries");

    let mut reports_generated = 0u32;
    let mut errors = 0u32;

    for user_id in &user_ids {
        match state
            .store
            .covering_report_exists(user_id, start_date, end_date)
            .await
        {
            Ok(true) => {
                info!(user_id = %user_id, "Report already covers window, skipping");
                continue;
            }
            Ok(false) => {}
            Err(e) => {
                error!(user_id = %user_id, error = %e, "Failed to check existing reports");
                errors += 1;
                continue;
            }
        }

        match state.service.generate(user_id, start_date, end_date).await {
            Ok(_) => reports_generated += 1,
            Err(e) => {
                error!(user_id = %user_id, error = %e, "Failed to generate report");
                errors += 1;
            }
        }
    }

    let response = DispatcherResponse {
        users_processed: user_ids.len() as u32,
        reports_generated,
        errors,
    };

    info!(
        users_processed = response.users_processed,
        reports_generated = response.reports_generated,
        errors = response.errors,
        "Weekly report dispatch complete"
    );

    Ok(response)
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
