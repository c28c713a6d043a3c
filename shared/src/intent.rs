//! Question-vs-statement intent classification.
//!
//! A lexical layer scores interrogative cues against declarative signals and
//! produces a confidence; only when the confidence is at or below the
//! configured threshold does the text model break the tie with a one-word
//! binary label. Everything unresolvable defers to `Statement` — storing a
//! misread question is recoverable, answering a misread statement is not.

use std::sync::Arc;

use crate::llm::{InferenceParams, TextModel};
use crate::{Error, Result};

/// Utterance intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Question,
    Statement,
}

/// A classification with its confidence in [0, 1].
#[derive(Debug, Clone, Copy)]
pub struct Classification {
    pub intent: Intent,
    pub confidence: f32,
}

const CLASSIFY_SYSTEM_PROMPT: &str = "\
사용자 입력이 과거 기록에 대한 질문인지, 일기로 저장할 서술인지 판별하세요.
질문이면 question, 서술이면 statement 한 단어로만 답하세요.";

/// Interrogative sentence endings (Korean), matched after trailing
/// punctuation is stripped.
const QUESTION_ENDINGS: &[&str] = &[
    "까", "까요", "니", "냐", "나요", "가요", "는지", "은지", "을까", "려나", "어때",
];

/// Question words, anywhere in the utterance.
const QUESTION_WORDS: &[&str] = &[
    "뭐", "뭘", "무엇", "무슨", "언제", "어디", "누구", "누가", "왜", "어떻게", "몇", "얼마",
];

/// Retrieval directives that read as questions even without a question mark.
const QUESTION_DIRECTIVES: &[&str] = &["알려줘", "알려 줘", "말해줘", "찾아줘", "검색해"];

const QUESTION_OPENERS_EN: &[&str] = &[
    "what", "when", "where", "who", "why", "how", "which", "did ", "do ", "does ", "is ",
    "are ", "was ", "were ", "can ", "could ", "should ",
];

/// Declarative sentence endings (Korean).
const STATEMENT_ENDINGS: &[&str] = &["다", "어", "야", "지", "음", "네", "요"];

/// Past-tense narrative markers.
const PAST_TENSE_MARKERS: &[&str] = &["었", "았", "했", "였"];

fn contains_any(text: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| text.contains(needle))
}

fn ends_with_any(text: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| text.ends_with(needle))
}

fn starts_with_any(text: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| text.starts_with(needle))
}

/// Score the utterance lexically. Deterministic, no side effects.
pub fn lexical_classification(content: &str) -> Classification {
    let trimmed = content.trim();
    let stripped = trimmed.trim_end_matches(['?', '？', '!', '！', '.', '…', ' ']);
    let lowercase = trimmed.to_lowercase();

    let mut question = 0.0_f32;
    let mut statement = 0.0_f32;

    let has_question_mark = trimmed.ends_with('?') || trimmed.ends_with('？');
    if has_question_mark {
        question += 0.9;
    }
    if ends_with_any(stripped, QUESTION_ENDINGS) {
        question += 0.6;
    }
    if contains_any(stripped, QUESTION_WORDS) {
        question += 0.5;
    }
    if contains_any(stripped, QUESTION_DIRECTIVES) {
        question += 0.4;
    }
    if starts_with_any(&lowercase, QUESTION_OPENERS_EN) {
        question += 0.6;
    }

    // A terminal question mark overrides a declarative sentence ending.
    if ends_with_any(stripped, STATEMENT_ENDINGS)
        && !ends_with_any(stripped, QUESTION_ENDINGS)
        && !has_question_mark
    {
        statement += 0.4;
    }
    if contains_any(stripped, PAST_TENSE_MARKERS) {
        statement += 0.3;
    }

    let total = question + statement;
    if total == 0.0 {
        // No signal at all: fully ambiguous, let the model decide.
        return Classification {
            intent: Intent::Statement,
            confidence: 0.0,
        };
    }

    // Ties break toward Statement.
    if question > statement {
        Classification {
            intent: Intent::Question,
            confidence: question / total,
        }
    } else {
        Classification {
            intent: Intent::Statement,
            confidence: statement / total,
        }
    }
}

fn parse_label(label: &str) -> Option<Intent> {
    let label = label.to_lowercase();
    if label.contains("question") || label.contains("질문") {
        Some(Intent::Question)
    } else if label.contains("statement") || label.contains("서술") {
        Some(Intent::Statement)
    } else {
        None
    }
}

/// Question-vs-statement classifier: lexical fast path, model tie-break.
pub struct IntentClassifier {
    model: Arc<dyn TextModel>,
    threshold: f32,
}

impl IntentClassifier {
    pub fn new(model: Arc<dyn TextModel>, threshold: f32) -> Self {
        Self { model, threshold }
    }

    /// Classify an utterance.
    ///
    /// Lexical confidence above the threshold decides directly; otherwise
    /// the model is asked for a one-word label. An unparseable label
    /// resolves to `Statement`; a failed model call propagates so the
    /// caller can surface its error envelope.
    pub async fn classify(&self, content: &str) -> Result<Intent> {
        if content.trim().is_empty() {
            return Err(Error::InvalidInput("입력 데이터가 필요합니다.".to_string()));
        }

        let lexical = lexical_classification(content);
        if lexical.confidence > self.threshold {
            tracing::debug!(
                intent = ?lexical.intent,
                confidence = lexical.confidence,
                "Lexical classification"
            );
            return Ok(lexical.intent);
        }

        let label = self
            .model
            .complete(
                CLASSIFY_SYSTEM_PROMPT,
                content,
                InferenceParams {
                    temperature: Some(0.0),
                    max_tokens: 8,
                },
            )
            .await?;

        Ok(parse_label(&label).unwrap_or(Intent::Statement))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

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

    struct FailingModel;

    #[async_trait]
    impl TextModel for FailingModel {
        async fn complete(
            &self,
            _system: &str,
            _user: &str,
            _params: InferenceParams,
        ) -> Result<String> {
            Err(Error::Upstream("model unreachable".to_string()))
        }
    }

    #[test]
    fn test_question_mark_is_question() {
        let c = lexical_classification("2026-01-13일에 나 뭐 먹었어?");
        assert_eq!(c.intent, Intent::Question);
        assert!(c.confidence > 0.75);
    }

    #[test]
    fn test_past_tense_narrative_is_statement() {
        let c = lexical_classification("오늘 점심에 김치찌개 먹었어");
        assert_eq!(c.intent, Intent::Statement);
        assert!(c.confidence > 0.75);
    }

    #[test]
    fn test_question_particle_without_question_mark() {
        let c = lexical_classification("어제 저녁에 뭐 먹었을까");
        assert_eq!(c.intent, Intent::Question);
    }

    #[test]
    fn test_retrieval_directive_is_question() {
        let c = lexical_classification("지난주에 본 영화 제목 알려줘");
        assert_eq!(c.intent, Intent::Question);
    }

    #[test]
    fn test_english_opener() {
        let c = lexical_classification("What did I eat yesterday");
        assert_eq!(c.intent, Intent::Question);
    }

    #[test]
    fn test_no_signal_defers_with_zero_confidence() {
        let c = lexical_classification("12345");
        assert_eq!(c.intent, Intent::Statement);
        assert_eq!(c.confidence, 0.0);
    }

    #[tokio::test]
    async fn test_model_breaks_ambiguous_tie() {
        let classifier = IntentClassifier::new(Arc::new(FixedModel("question")), 0.75);
        let intent = classifier.classify("12345").await.unwrap();
        assert_eq!(intent, Intent::Question);
    }

    #[tokio::test]
    async fn test_unparseable_label_falls_back_to_statement() {
        let classifier = IntentClassifier::new(Arc::new(FixedModel("maybe?")), 0.75);
        let intent = classifier.classify("12345").await.unwrap();
        assert_eq!(intent, Intent::Statement);
    }

    #[tokio::test]
    async fn test_confident_lexical_skips_model() {
        // FailingModel would error if consulted.
        let classifier = IntentClassifier::new(Arc::new(FailingModel), 0.75);
        let intent = classifier.classify("오늘 점심에 김치찌개 먹었어").await.unwrap();
        assert_eq!(intent, Intent::Statement);
    }

    #[tokio::test]
    async fn test_empty_content_rejected() {
        let classifier = IntentClassifier::new(Arc::new(FailingModel), 0.75);
        let result = classifier.classify("   ").await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }
}
