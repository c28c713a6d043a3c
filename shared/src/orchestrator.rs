//! Top-level request dispatch: question answering or data pass-through.

use crate::intent::{Intent, IntentClassifier};
use crate::knowledge::KnowledgeSearchAdapter;
use crate::models::{AgentEnvelope, AgentRequest};
use crate::Result;

const ANSWER_MESSAGE: &str = "질문에 대한 답변을 생성했습니다.";
const DATA_MESSAGE: &str = "일기 내용을 저장 서비스로 전달했습니다.";

/// Dispatches an utterance to knowledge search or the storage pass-through.
pub struct Orchestrator {
    classifier: IntentClassifier,
    knowledge: KnowledgeSearchAdapter,
}

impl Orchestrator {
    pub fn new(classifier: IntentClassifier, knowledge: KnowledgeSearchAdapter) -> Self {
        Self {
            classifier,
            knowledge,
        }
    }

    /// Handle one request. Never propagates an error to the transport
    /// layer: every failure becomes the envelope's error branch.
    pub async fn handle(&self, request: &AgentRequest) -> AgentEnvelope {
        match self.dispatch(request).await {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::error!(error = %e, "Agent request failed");
                AgentEnvelope::error(format!("요청 처리 중 오류가 발생했습니다: {}", e))
            }
        }
    }

    async fn dispatch(&self, request: &AgentRequest) -> Result<AgentEnvelope> {
        let content = request.content.as_deref().unwrap_or("");
        let intent = self.classifier.classify(content).await?;

        match intent {
            Intent::Question => {
                tracing::info!(user_scoped = request.user_id.is_some(), "Dispatching question");
                let answer = self
                    .knowledge
                    .search(
                        content,
                        request.user_id.as_deref(),
                        request.reference_date(),
                    )
                    .await?;
                Ok(AgentEnvelope::answer(answer, ANSWER_MESSAGE))
            }
            Intent::Statement => {
                // The utterance passes through unchanged for the external
                // diary store; the envelope itself carries no content.
                tracing::info!("Dispatching statement for storage");
                Ok(AgentEnvelope::data(DATA_MESSAGE))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::IntentClassifier;
    use crate::knowledge::{Passage, PassageRetriever, SearchFilter};
    use crate::llm::{InferenceParams, TextModel};
    use crate::models::EnvelopeType;
    use crate::Error;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct FixedModel(&'static str);

    #[async_trait]
    impl TextModel for FixedModel {
        async fn complete(
            &self,
            _system: &str,
            _user: &str,
            _params: InferenceParams,
        ) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    struct FakeRetriever {
        result: std::result::Result<Vec<Passage>, &'static str>,
    }

    #[async_trait]
    impl PassageRetriever for FakeRetriever {
        async fn retrieve(&self, _query: &str, _filter: &SearchFilter) -> Result<Vec<Passage>> {
            match &self.result {
                Ok(passages) => Ok(passages.clone()),
                Err(message) => Err(Error::Upstream(message.to_string())),
            }
        }
    }

    fn orchestrator(
        retriever: FakeRetriever,
        model: &'static str,
    ) -> Orchestrator {
        let model: Arc<dyn TextModel> = Arc::new(FixedModel(model));
        Orchestrator::new(
            IntentClassifier::new(model.clone(), 0.75),
            KnowledgeSearchAdapter::new(Arc::new(retriever), model),
        )
    }

    fn request(content: &str) -> AgentRequest {
        AgentRequest {
            content: Some(content.to_string()),
            user_id: Some("user123".to_string()),
            current_date: Some("2026-01-14".to_string()),
            record_date: None,
        }
    }

    #[tokio::test]
    async fn test_statement_returns_data_envelope() {
        let orchestrator = orchestrator(FakeRetriever { result: Ok(vec![]) }, "unused");
        let envelope = orchestrator
            .handle(&request("오늘 점심에 김치찌개 먹었어"))
            .await;
        assert_eq!(envelope.envelope_type, EnvelopeType::Data);
        assert!(envelope.content.is_empty());
        assert!(!envelope.message.is_empty());
    }

    #[tokio::test]
    async fn test_question_returns_answer_envelope() {
        let orchestrator = orchestrator(
            FakeRetriever {
                result: Ok(vec![Passage {
                    text: "김치찌개를 먹었다".to_string(),
                    score: 0.9,
                }]),
            },
            "김치찌개를 드셨습니다.",
        );
        let envelope = orchestrator.handle(&request("2026-01-13일에 나 뭐 먹었어?")).await;
        assert_eq!(envelope.envelope_type, EnvelopeType::Answer);
        assert_eq!(envelope.content, "김치찌개를 드셨습니다.");
    }

    #[tokio::test]
    async fn test_search_failure_becomes_error_envelope() {
        let orchestrator = orchestrator(
            FakeRetriever {
                result: Err("knowledge base unreachable"),
            },
            "unused",
        );
        let envelope = orchestrator.handle(&request("어제 뭐 먹었어?")).await;
        assert_eq!(envelope.envelope_type, EnvelopeType::Error);
        assert!(envelope.content.is_empty());
        assert!(!envelope.message.is_empty());
    }

    #[tokio::test]
    async fn test_missing_content_becomes_error_envelope() {
        let orchestrator = orchestrator(FakeRetriever { result: Ok(vec![]) }, "unused");
        let envelope = orchestrator
            .handle(&AgentRequest {
                content: None,
                user_id: None,
                current_date: None,
                record_date: None,
            })
            .await;
        assert_eq!(envelope.envelope_type, EnvelopeType::Error);
    }
}
