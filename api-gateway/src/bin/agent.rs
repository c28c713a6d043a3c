//! Agent Lambda - Handles POST /agent.
//!
//! Classifies the utterance as a question or a statement, answers questions
//! from the caller's diary knowledge base, and acknowledges statements for
//! pass-through storage. Every failure is returned as the orchestrator
//! envelope's error branch, never as a transport-level fault.

use lambda_http::{run, service_fn, Body, Error, Request, Response};
use shared::http::json_response;
use shared::models::EnvelopeType;
use shared::{
    parse_body, AgentEnvelope, AgentRequest, BedrockTextModel, Config, IntentClassifier,
    KnowledgeBaseRetriever, KnowledgeSearchAdapter, Orchestrator,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Application state shared across requests.
struct AppState {
    orchestrator: Orchestrator,
}

impl AppState {
    async fn new() -> Result<Self, Error> {
        let config = Config::from_env();
        let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;

        let secrets_client = aws_sdk_secretsmanager::Client::new(&aws_config);
        let secrets = shared::get_app_secrets(&secrets_client, &config.app_secret_name).await?;

        let bedrock_client = aws_sdk_bedrockruntime::Client::new(&aws_config);
        let agent_client = aws_sdk_bedrockagentruntime::Client::new(&aws_config);

        let model = Arc::new(BedrockTextModel::new(
            bedrock_client,
            secrets.text_model_id.clone(),
        ));
        let retriever = Arc::new(KnowledgeBaseRetriever::new(
            agent_client,
            secrets.knowledge_base_id.clone(),
        ));

        let classifier = IntentClassifier::new(model.clone(), config.intent_confidence_threshold);
        let knowledge = KnowledgeSearchAdapter::new(retriever, model);

        Ok(Self {
            orchestrator: Orchestrator::new(classifier, knowledge),
        })
    }
}

async fn handler(state: Arc<AppState>, event: Request) -> Result<Response<Body>, Error> {
    let request: AgentRequest = parse_body!(event.body());

    if request
        .content
        .as_deref()
        .map(str::trim)
        .unwrap_or_default()
        .is_empty()
    {
        return json_response(400, &AgentEnvelope::error("입력 데이터가 필요합니다."));
    }

    info!(
        user_scoped = request.user_id.is_some(),
        dated = request.reference_date().is_some(),
        "Processing agent request"
    );

    let envelope = state.orchestrator.handle(&request).await;

    let status = match envelope.envelope_type {
        EnvelopeType::Error => 500,
        _ => 200,
    };

    json_response(status, &envelope)
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
