//! Free text to diary-entry summarization.

use std::sync::Arc;

use crate::llm::{InferenceParams, TextModel};
use crate::{Error, Result};

const SUMMARIZE_SYSTEM_PROMPT: &str = "\
당신은 일기를 작성하는 AI 어시스턴트입니다.

<작업순서>
1. 입력 받은 정보를 바탕으로 일기를 작성합니다
</작업순서>

<답변지침>
- 일기 형식의 줄글, 1인칭 시점으로 작성합니다
- 맞춤법과 문단 나누기를 엄격하게 지킵니다
- 전문적이면서도 따뜻한 톤을 유지합니다
- 오늘의 날짜는 따로 작성하지 않습니다 (단, 내용에서 언급된 경우는 제외)
- 입력 내용이 누락되어서는 안됩니다
- 추측성, 애매모호한 표현을 사용하지 않습니다
- 백틱이나 코드 블록 포맷을 붙이지 않습니다
- 자연스러운 한국어로 작성합니다
</답변지침>";

/// Diary-style rewriting of free narrative text. Pure transform, no
/// persistence.
pub struct SummarizationAdapter {
    model: Arc<dyn TextModel>,
}

impl SummarizationAdapter {
    pub fn new(model: Arc<dyn TextModel>) -> Self {
        Self { model }
    }

    /// Rewrite `content` as a diary entry. An out-of-range temperature is
    /// clamped into [0, 1], never rejected.
    pub async fn summarize(&self, content: &str, temperature: Option<f32>) -> Result<String> {
        if content.trim().is_empty() {
            return Err(Error::InvalidInput("내용이 필요합니다.".to_string()));
        }

        let temperature = temperature.map(|t| t.clamp(0.0, 1.0));

        self.model
            .complete(
                SUMMARIZE_SYSTEM_PROMPT,
                content,
                InferenceParams {
                    temperature,
                    max_tokens: 1024,
                },
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Fake that records the sampling temperature it was handed.
    struct RecordingModel {
        seen_temperature: Mutex<Option<f32>>,
    }

    #[async_trait]
    impl TextModel for RecordingModel {
        async fn complete(
            &self,
            _system: &str,
            _user: &str,
            params: InferenceParams,
        ) -> Result<String> {
            *self.seen_temperature.lock().unwrap() = params.temperature;
            Ok("오늘은 영화를 보고 파스타를 먹었다.".to_string())
        }
    }

    fn adapter() -> (Arc<RecordingModel>, SummarizationAdapter) {
        let model = Arc::new(RecordingModel {
            seen_temperature: Mutex::new(None),
        });
        (model.clone(), SummarizationAdapter::new(model))
    }

    #[tokio::test]
    async fn test_in_range_temperature_passes_through() {
        let (model, adapter) = adapter();
        let diary = adapter
            .summarize("오늘 영화 보고 파스타 먹었어", Some(0.7))
            .await
            .unwrap();
        assert!(!diary.is_empty());
        assert_eq!(*model.seen_temperature.lock().unwrap(), Some(0.7));
    }

    #[tokio::test]
    async fn test_out_of_range_temperature_is_clamped() {
        let (model, adapter) = adapter();
        adapter
            .summarize("오늘 영화 보고 파스타 먹었어", Some(3.5))
            .await
            .unwrap();
        assert_eq!(*model.seen_temperature.lock().unwrap(), Some(1.0));

        adapter
            .summarize("오늘 영화 보고 파스타 먹었어", Some(-0.2))
            .await
            .unwrap();
        assert_eq!(*model.seen_temperature.lock().unwrap(), Some(0.0));
    }

    #[tokio::test]
    async fn test_missing_temperature_uses_model_default() {
        let (model, adapter) = adapter();
        adapter
            .summarize("오늘 영화 보고 파스타 먹었어", None)
            .await
            .unwrap();
        assert_eq!(*model.seen_temperature.lock().unwrap(), None);
    }

    #[tokio::test]
    async fn test_empty_content_rejected() {
        let (_, adapter) = adapter();
        assert!(matches!(
            adapter.summarize("  ", Some(0.5)).await,
            Err(Error::InvalidInput(_))
        ));
    }
}
