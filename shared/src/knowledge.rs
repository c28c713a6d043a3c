//! Knowledge-base search over indexed diary entries.
//!
//! Retrieval is scoped by a hard `user_id` metadata filter and, when the
//! question carries temporal references, by resolved absolute dates.
//! Zero retrieved passages is not an error: it surfaces as the fixed
//! low-confidence no-record answer.

use async_trait::async_trait;
use aws_sdk_bedrockagentruntime::types::{
    FilterAttribute, KnowledgeBaseQuery, KnowledgeBaseRetrievalConfiguration,
    KnowledgeBaseVectorSearchConfiguration, RetrievalFilter,
};
use aws_sdk_bedrockagentruntime::Client as BedrockAgentClient;
use aws_smithy_types::Document;
use chrono::{Duration, NaiveDate};
use regex::Regex;
use std::sync::{Arc, OnceLock};

use crate::llm::{InferenceParams, TextModel};
use crate::{Error, Result};

/// Answer returned when retrieval finds nothing for the question.
pub const NO_RECORD_ANSWER: &str = "해당 날짜의 일기 기록을 찾을 수 없습니다.";

const ANSWER_SYSTEM_PROMPT: &str = "\
당신은 일기를 분석하여 질문에 답변하는 AI 어시스턴트입니다.

<답변지침>
- 검색된 기록에서 찾은 내용만을 근거로 답변합니다
- 다른 사용자의 기록은 답변에 포함하지 않습니다
- 기록에 없는 내용은 추측하지 않습니다
- 질문에 대한 답변만 하고, 추가 의견이나 조언은 붙이지 않습니다
- user_id는 답변에 포함하지 않습니다
- 간결하고 자연스러운 한국어로 작성합니다
- 백틱이나 코드 블록 포맷을 사용하지 않습니다
</답변지침>";

const MAX_RESULTS: i32 = 5;

/// One retrieved knowledge-base passage.
#[derive(Debug, Clone)]
pub struct Passage {
    pub text: String,
    pub score: f64,
}

/// Retrieval scope for one search.
#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    /// Hard ownership filter; `None` only when the caller supplied no user
    pub user_id: Option<String>,
    /// Absolute dates resolved from the question; empty means all dates
    pub dates: Vec<NaiveDate>,
}

/// Passage retrieval capability.
#[async_trait]
pub trait PassageRetriever: Send + Sync {
    async fn retrieve(&self, query: &str, filter: &SearchFilter) -> Result<Vec<Passage>>;
}

/// Bedrock knowledge-base retriever.
pub struct KnowledgeBaseRetriever {
    client: BedrockAgentClient,
    knowledge_base_id: String,
}

impl KnowledgeBaseRetriever {
    pub fn new(client: BedrockAgentClient, knowledge_base_id: String) -> Self {
        Self {
            client,
            knowledge_base_id,
        }
    }

    fn equals_filter(key: &str, value: String) -> Result<RetrievalFilter> {
        let attribute = FilterAttribute::builder()
            .key(key)
            .value(Document::String(value))
            .build()
            .map_err(|e| Error::Internal(format!("Failed to build retrieval filter: {}", e)))?;
        Ok(RetrievalFilter::Equals(attribute))
    }

    fn build_filter(filter: &SearchFilter) -> Result<Option<RetrievalFilter>> {
        let mut clauses = Vec::new();

        if let Some(user_id) = &filter.user_id {
            clauses.push(Self::equals_filter("user_id", user_id.clone())?);
        }

        if !filter.dates.is_empty() {
            let mut date_clauses = Vec::new();
            for date in &filter.dates {
                date_clauses.push(Self::equals_filter("record_date", date.to_string())?);
            }
            clauses.push(if date_clauses.len() == 1 {
                date_clauses.remove(0)
            } else {
                RetrievalFilter::OrAll(date_clauses)
            });
        }

        Ok(match clauses.len() {
            0 => None,
            1 => Some(clauses.remove(0)),
            _ => Some(RetrievalFilter::AndAll(clauses)),
        })
    }
}

#[async_trait]
impl PassageRetriever for KnowledgeBaseRetriever {
    async fn retrieve(&self, query: &str, filter: &SearchFilter) -> Result<Vec<Passage>> {
        let mut vector_search =
            KnowledgeBaseVectorSearchConfiguration::builder().number_of_results(MAX_RESULTS);
        if let Some(retrieval_filter) = Self::build_filter(filter)? {
            vector_search = vector_search.filter(retrieval_filter);
        }

        let retrieval_configuration = KnowledgeBaseRetrievalConfiguration::builder()
            .vector_search_configuration(vector_search.build())
            .build();

        let retrieval_query = KnowledgeBaseQuery::builder().text(query).build();

        let response = self
            .client
            .retrieve()
            .knowledge_base_id(&self.knowledge_base_id)
            .retrieval_query(retrieval_query)
            .retrieval_configuration(retrieval_configuration)
            .send()
            .await
            .map_err(|e| Error::Upstream(format!("Knowledge base retrieval failed: {}", e)))?;

        let passages = response
            .retrieval_results()
            .iter()
            .filter_map(|result| {
                let text = result.content().map(|content| content.text())?;
                if text.trim().is_empty() {
                    return None;
                }
                Some(Passage {
                    text: text.to_string(),
                    score: result.score().unwrap_or_default(),
                })
            })
            .collect();

        Ok(passages)
    }
}

static ISO_DATE: OnceLock<Regex> = OnceLock::new();

fn iso_date_regex() -> &'static Regex {
    ISO_DATE.get_or_init(|| Regex::new(r"\d{4}-\d{2}-\d{2}").expect("valid regex"))
}

/// Relative temporal words and their day offsets.
const RELATIVE_DATES: &[(&str, i64)] = &[
    ("그저께", -2),
    ("그제", -2),
    ("어저께", -1),
    ("어제", -1),
    ("오늘", 0),
    ("yesterday", -1),
    ("today", 0),
];

/// Parse a reference date from a request field, accepting either a plain
/// `YYYY-MM-DD` or an ISO datetime prefix.
pub fn parse_reference_date(value: &str) -> Option<NaiveDate> {
    let head = value.get(..10)?;
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}

/// Resolve the question's temporal references into absolute dates.
///
/// Explicit ISO dates are always picked up; relative words only resolve
/// when a reference date is available. Without one the result may stay
/// empty, which widens recall to all dates — degraded mode, not an error.
pub fn resolve_date_hints(question: &str, reference: Option<NaiveDate>) -> Vec<NaiveDate> {
    let mut dates: Vec<NaiveDate> = Vec::new();

    for found in iso_date_regex().find_iter(question) {
        if let Ok(date) = NaiveDate::parse_from_str(found.as_str(), "%Y-%m-%d") {
            if !dates.contains(&date) {
                dates.push(date);
            }
        }
    }

    if let Some(today) = reference {
        for (word, offset) in RELATIVE_DATES {
            if question.contains(word) {
                let date = today + Duration::days(*offset);
                if !dates.contains(&date) {
                    dates.push(date);
                }
            }
        }
    }

    dates
}

/// Grounded question answering over the knowledge base.
pub struct KnowledgeSearchAdapter {
    retriever: Arc<dyn PassageRetriever>,
    model: Arc<dyn TextModel>,
}

impl KnowledgeSearchAdapter {
    pub fn new(retriever: Arc<dyn PassageRetriever>, model: Arc<dyn TextModel>) -> Self {
        Self { retriever, model }
    }

    /// Answer a question from the caller's diary records.
    pub async fn search(
        &self,
        question: &str,
        user_id: Option<&str>,
        current_date: Option<&str>,
    ) -> Result<String> {
        let reference = current_date.and_then(parse_reference_date);
        if current_date.is_some() && reference.is_none() {
            tracing::warn!("Unparseable current_date, falling back to all-dates scope");
        }

        let filter = SearchFilter {
            user_id: user_id.map(String::from),
            dates: resolve_date_hints(question, reference),
        };

        tracing::info!(
            user_scoped = filter.user_id.is_some(),
            date_hints = filter.dates.len(),
            "Retrieving diary records"
        );

        let passages = self.retriever.retrieve(question, &filter).await?;
        if passages.is_empty() {
            return Ok(NO_RECORD_ANSWER.to_string());
        }

        let context = passages
            .iter()
            .enumerate()
            .map(|(i, passage)| format!("[기록 {}]\n{}", i + 1, passage.text))
            .collect::<Vec<_>>()
            .join("\n\n");

        let user_prompt = format!(
            "<기록>\n{}\n</기록>\n\n질문: {}\n\n위 기록만을 근거로 질문에 답변하세요. \
             기록에 근거가 없으면 \"{}\"라고 답변하세요.",
            context, question, NO_RECORD_ANSWER
        );

        self.model
            .complete(
                ANSWER_SYSTEM_PROMPT,
                &user_prompt,
                InferenceParams {
                    temperature: Some(0.2),
                    max_tokens: 1024,
                },
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeRetriever {
        passages: Vec<Passage>,
    }

    #[async_trait]
    impl PassageRetriever for FakeRetriever {
        async fn retrieve(&self, _query: &str, _filter: &SearchFilter) -> Result<Vec<Passage>> {
            Ok(self.passages.clone())
        }
    }

    struct EchoModel;

    #[async_trait]
    impl TextModel for EchoModel {
        async fn complete(
            &self,
            _system: &str,
            user: &str,
            _params: InferenceParams,
        ) -> Result<String> {
            Ok(format!("grounded: {}", user.len()))
        }
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_explicit_iso_date_extracted() {
        let hints = resolve_date_hints("2026-01-13일에 나 뭐 먹었어?", None);
        assert_eq!(hints, vec![date("2026-01-13")]);
    }

    #[test]
    fn test_relative_dates_resolved_against_reference() {
        let hints = resolve_date_hints("어제 뭐 했지?", Some(date("2026-01-14")));
        assert_eq!(hints, vec![date("2026-01-13")]);

        let hints = resolve_date_hints("오늘 기분 어땠어?", Some(date("2026-01-14")));
        assert_eq!(hints, vec![date("2026-01-14")]);

        let hints = resolve_date_hints("그저께 일기 보여줘", Some(date("2026-01-14")));
        assert_eq!(hints, vec![date("2026-01-12")]);
    }

    #[test]
    fn test_relative_dates_without_reference_widen_scope() {
        let hints = resolve_date_hints("어제 뭐 했지?", None);
        assert!(hints.is_empty());
    }

    #[test]
    fn test_duplicate_dates_collapse() {
        let hints = resolve_date_hints("오늘 2026-01-14에 뭐 했지?", Some(date("2026-01-14")));
        assert_eq!(hints, vec![date("2026-01-14")]);
    }

    #[test]
    fn test_parse_reference_date_accepts_datetime_prefix() {
        assert_eq!(
            parse_reference_date("2026-01-13T09:30:00Z"),
            Some(date("2026-01-13"))
        );
        assert_eq!(parse_reference_date("2026-01-13"), Some(date("2026-01-13")));
        assert_eq!(parse_reference_date("not a date"), None);
    }

    #[tokio::test]
    async fn test_no_passages_returns_no_record_answer() {
        let adapter = KnowledgeSearchAdapter::new(
            Arc::new(FakeRetriever { passages: vec![] }),
            Arc::new(EchoModel),
        );
        let answer = adapter
            .search("어제 뭐 먹었어?", Some("user123"), Some("2026-01-14"))
            .await
            .unwrap();
        assert_eq!(answer, NO_RECORD_ANSWER);
    }

    #[tokio::test]
    async fn test_passages_are_composed_into_answer() {
        let adapter = KnowledgeSearchAdapter::new(
            Arc::new(FakeRetriever {
                passages: vec![Passage {
                    text: "김치찌개를 먹었다".to_string(),
                    score: 0.9,
                }],
            }),
            Arc::new(EchoModel),
        );
        let answer = adapter
            .search("어제 뭐 먹었어?", Some("user123"), Some("2026-01-14"))
            .await
            .unwrap();
        assert!(answer.starts_with("grounded:"));
    }
}
