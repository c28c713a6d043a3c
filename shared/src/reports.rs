//! Weekly sentiment reports: generate, list, fetch.
//!
//! Sub-operation selection is a priority-ordered predicate chain over field
//! presence: fetch-by-id > range-generate > list-all. Reports are immutable
//! once inserted; there is deliberately no UPDATE path in this module.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use crate::llm::{InferenceParams, TextModel};
use crate::models::ReportRequest;
use crate::{Error, Result};

/// Single message for a missing report and a report owned by someone else.
/// The two cases must be indistinguishable to the caller.
pub const REPORT_NOT_FOUND: &str = "리포트를 찾을 수 없습니다.";

const NO_ENTRIES_MESSAGE: &str = "해당 기간의 일기 기록이 없습니다.";

const REPORT_SYSTEM_PROMPT: &str = "\
당신은 일기를 분석하는 전문 심리 상담사입니다.

## 감정 점수 기준 (1-10점)
- 1-2점: 매우 부정적 (우울, 절망, 분노 폭발)
- 3-4점: 부정적 (스트레스, 짜증, 불안, 피로)
- 5-6점: 중립/보통 (평범한 하루, 특별한 감정 없음)
- 7-8점: 긍정적 (기쁨, 만족, 즐거움)
- 9-10점: 매우 긍정적 (행복, 감동, 성취감)

## 분석 시 주의사항
- 각 일기의 구체적인 내용과 표현을 바탕으로 점수를 차등 부여하세요
- 일기에 언급된 구체적인 활동, 사람, 장소를 key_themes에 포함하세요
- 일기 내용을 직접 언급하는 따뜻하고 공감하는 피드백을 3-5개 작성하세요

## 출력 형식
반드시 아래 형태의 JSON만 출력하세요. 백틱이나 코드 블록 없이 JSON만 출력합니다.
{\"entry_scores\": [{\"date\": \"YYYY-MM-DD\", \"score\": 7}],
 \"key_themes\": [\"...\"],
 \"feedback\": [\"...\"]}";

/// Resolved report sub-operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportOperation {
    /// Full report by id; ownership is checked against `user_id`
    Fetch {
        report_id: i64,
        user_id: Option<String>,
    },
    /// Aggregate the range and persist a new report
    Generate {
        user_id: String,
        start_date: NaiveDate,
        end_date: NaiveDate,
    },
    /// All report summaries for the user, newest-first
    List { user_id: String },
}

fn parse_date(value: &str, field: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| Error::InvalidInput(format!("{}는 YYYY-MM-DD 형식이어야 합니다.", field)))
}

/// Select the sub-operation from field presence.
pub fn resolve_operation(request: &ReportRequest) -> Result<ReportOperation> {
    if let Some(report_id) = request.report_id {
        return Ok(ReportOperation::Fetch {
            report_id,
            user_id: request.user_id.clone(),
        });
    }

    let user_id = request.user_id.clone().ok_or_else(|| {
        Error::InvalidInput("user_id 또는 report_id가 필요합니다.".to_string())
    })?;

    match (request.start_date.as_deref(), request.end_date.as_deref()) {
        (Some(start), Some(end)) => {
            let start_date = parse_date(start, "start_date")?;
            let end_date = parse_date(end, "end_date")?;
            if start_date > end_date {
                return Err(Error::InvalidInput(
                    "start_date는 end_date보다 늦을 수 없습니다.".to_string(),
                ));
            }
            Ok(ReportOperation::Generate {
                user_id,
                start_date,
                end_date,
            })
        }
        (None, None) => Ok(ReportOperation::List { user_id }),
        _ => Err(Error::InvalidInput(
            "start_date와 end_date는 함께 제공되어야 합니다.".to_string(),
        )),
    }
}

/// A diary entry row pulled for aggregation.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DiaryEntryRow {
    pub id: Uuid,
    pub content: String,
    pub record_date: NaiveDate,
}

/// A stored report. Ownership lives in the fetch query's WHERE clause, so
/// the row itself does not carry the user id.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ReportRow {
    pub id: i64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub average_sentiment: f64,
    pub analysis: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// A report list entry.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ReportSummaryRow {
    pub id: i64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub average_sentiment: f64,
    pub created_at: DateTime<Utc>,
}

/// Per-entry sentiment score from the analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryScore {
    pub date: NaiveDate,
    pub score: f64,
}

/// Parsed sentiment/theme analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportAnalysis {
    pub entry_scores: Vec<EntryScore>,
    pub key_themes: Vec<String>,
    pub feedback: Vec<String>,
}

impl ReportAnalysis {
    /// Mean of the per-entry scores; recomputed here rather than trusted
    /// from the model output.
    pub fn average_sentiment(&self) -> f64 {
        if self.entry_scores.is_empty() {
            return 0.0;
        }
        let total: f64 = self.entry_scores.iter().map(|entry| entry.score).sum();
        total / self.entry_scores.len() as f64
    }
}

/// Strip a Markdown code fence if the model wrapped its JSON anyway.
fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.trim_start_matches(['\r', '\n'])
        .strip_suffix("```")
        .unwrap_or(rest)
        .trim()
}

/// Sentiment/theme analysis through the text model.
pub struct ReportAnalyzer {
    model: Arc<dyn TextModel>,
}

impl ReportAnalyzer {
    pub fn new(model: Arc<dyn TextModel>) -> Self {
        Self { model }
    }

    pub async fn analyze(&self, entries: &[DiaryEntryRow]) -> Result<ReportAnalysis> {
        let journal = entries
            .iter()
            .map(|entry| format!("[{}]\n{}", entry.record_date, entry.content))
            .collect::<Vec<_>>()
            .join("\n\n");

        let completion = self
            .model
            .complete(
                REPORT_SYSTEM_PROMPT,
                &format!("다음 일기들을 분석하세요:\n\n{}", journal),
                InferenceParams {
                    temperature: Some(0.3),
                    max_tokens: 2048,
                },
            )
            .await?;

        let analysis: ReportAnalysis = serde_json::from_str(strip_code_fences(&completion))
            .map_err(|e| Error::Upstream(format!("Unparseable analysis from model: {}", e)))?;

        if analysis.entry_scores.is_empty() {
            return Err(Error::Upstream(
                "Analysis contained no entry scores".to_string(),
            ));
        }

        Ok(analysis)
    }
}

/// Postgres-backed report store.
pub struct ReportStore {
    pool: PgPool,
}

impl ReportStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Diary entries for a user in `[start_date, end_date]`.
    pub async fn entries_in_range(
        &self,
        user_id: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<DiaryEntryRow>> {
        let entries: Vec<DiaryEntryRow> = sqlx::query_as(
            r#"
            SELECT id, content, record_date
            FROM diary_entries
            WHERE user_id = $1
            AND record_date BETWEEN $2 AND $3
            ORDER BY record_date ASC
            "#,
        )
        .bind(user_id)
        .bind(start_date)
        .bind(end_date)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// Insert a completed report, returning its id. Called only after the
    /// analysis fully succeeded; a failed analysis stores nothing.
    pub async fn insert_report(
        &self,
        user_id: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
        analysis: &ReportAnalysis,
    ) -> Result<i64> {
        let report_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO reports (user_id, start_date, end_date, average_sentiment, analysis)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(user_id)
        .bind(start_date)
        .bind(end_date)
        .bind(analysis.average_sentiment())
        .bind(serde_json::to_value(analysis)?)
        .fetch_one(&self.pool)
        .await?;

        Ok(report_id)
    }

    /// Fetch a report the caller owns. A missing id and a foreign id both
    /// come back as the same `NotFound`; nothing leaks existence.
    pub async fn fetch(&self, report_id: i64, user_id: Option<&str>) -> Result<ReportRow> {
        let Some(user_id) = user_id else {
            return Err(Error::NotFound(REPORT_NOT_FOUND.to_string()));
        };

        let report: Option<ReportRow> = sqlx::query_as(
            r#"
            SELECT id, start_date, end_date, average_sentiment, analysis, created_at
            FROM reports
            WHERE id = $1 AND user_id = $2
            "#,
        )
        .bind(report_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        report.ok_or_else(|| Error::NotFound(REPORT_NOT_FOUND.to_string()))
    }

    /// All report summaries for a user, newest-first.
    pub async fn list(&self, user_id: &str) -> Result<Vec<ReportSummaryRow>> {
        let summaries: Vec<ReportSummaryRow> = sqlx::query_as(
            r#"
            SELECT id, start_date, end_date, average_sentiment, created_at
            FROM reports
            WHERE user_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(summaries)
    }

    /// Whether a report already covers `[start_date, end_date]` for the user.
    pub async fn covering_report_exists(
        &self,
        user_id: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM reports
            WHERE user_id = $1 AND start_date = $2 AND end_date = $3
            "#,
        )
        .bind(user_id)
        .bind(start_date)
        .bind(end_date)
        .fetch_one(&self.pool)
        .await?;

        Ok(count > 0)
    }
}

/// The report capability: resolves the sub-operation and executes it.
pub struct ReportService {
    store: ReportStore,
    analyzer: ReportAnalyzer,
}

impl ReportService {
    pub fn new(store: ReportStore, analyzer: ReportAnalyzer) -> Self {
        Self { store, analyzer }
    }

    /// Generate one report for the range; the row is inserted only after
    /// the analysis fully succeeded.
    pub async fn generate(
        &self,
        user_id: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<serde_json::Value> {
        let entries = self.store.entries_in_range(user_id, start_date, end_date).await?;
        if entries.is_empty() {
            return Err(Error::NotFound(NO_ENTRIES_MESSAGE.to_string()));
        }

        tracing::info!(user_id = %user_id, entries = entries.len(), "Analyzing diary entries");
        let analysis = self.analyzer.analyze(&entries).await?;

        let report_id = self
            .store
            .insert_report(user_id, start_date, end_date, &analysis)
            .await?;

        tracing::info!(report_id, "Report created");

        Ok(serde_json::json!({
            "report_id": report_id,
            "start_date": start_date,
            "end_date": end_date,
            "average_sentiment": analysis.average_sentiment(),
        }))
    }

    /// Run one report request to completion.
    pub async fn run(&self, request: &ReportRequest) -> Result<serde_json::Value> {
        match resolve_operation(request)? {
            ReportOperation::Fetch { report_id, user_id } => {
                let report = self.store.fetch(report_id, user_id.as_deref()).await?;
                Ok(serde_json::json!({
                    "report_id": report.id,
                    "start_date": report.start_date,
                    "end_date": report.end_date,
                    "average_sentiment": report.average_sentiment,
                    "analysis": report.analysis,
                    "created_at": report.created_at,
                }))
            }
            ReportOperation::Generate {
                user_id,
                start_date,
                end_date,
            } => self.generate(&user_id, start_date, end_date).await,
            ReportOperation::List { user_id } => {
                let summaries = self.store.list(&user_id).await?;
                Ok(serde_json::json!({ "reports": summaries }))
            }
        }
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

    fn request(
        user_id: Option<&str>,
        start_date: Option<&str>,
        end_date: Option<&str>,
        report_id: Option<i64>,
    ) -> ReportRequest {
        ReportRequest {
            content: Some("리포트".to_string()),
            user_id: user_id.map(String::from),
            start_date: start_date.map(String::from),
            end_date: end_date.map(String::from),
            report_id,
        }
    }

    #[test]
    fn test_report_id_wins_over_range() {
        let operation = resolve_operation(&request(
            Some("user123"),
            Some("2026-01-01"),
            Some("2026-01-07"),
            Some(42),
        ))
        .unwrap();
        assert_eq!(
            operation,
            ReportOperation::Fetch {
                report_id: 42,
                user_id: Some("user123".to_string())
            }
        );
    }

    #[test]
    fn test_full_range_selects_generate() {
        let operation = resolve_operation(&request(
            Some("user123"),
            Some("2026-01-01"),
            Some("2026-01-07"),
            None,
        ))
        .unwrap();
        assert!(matches!(operation, ReportOperation::Generate { .. }));
    }

    #[test]
    fn test_reversed_range_is_invalid_input() {
        let result = resolve_operation(&request(
            Some("user123"),
            Some("2026-01-07"),
            Some("2026-01-01"),
            None,
        ));
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_half_open_range_is_invalid_input() {
        let result = resolve_operation(&request(Some("user123"), Some("2026-01-01"), None, None));
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_user_only_selects_list() {
        let operation = resolve_operation(&request(Some("user123"), None, None, None)).unwrap();
        assert_eq!(
            operation,
            ReportOperation::List {
                user_id: "user123".to_string()
            }
        );
    }

    #[test]
    fn test_no_identifying_fields_is_invalid_input() {
        let result = resolve_operation(&request(None, None, None, None));
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_unparseable_date_is_invalid_input() {
        let result = resolve_operation(&request(
            Some("user123"),
            Some("01/01/2026"),
            Some("2026-01-07"),
            None,
        ));
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_average_sentiment_recomputed_from_scores() {
        let analysis = ReportAnalysis {
            entry_scores: vec![
                EntryScore {
                    date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
                    score: 4.0,
                },
                EntryScore {
                    date: NaiveDate::from_ymd_opt(2026, 1, 2).unwrap(),
                    score: 8.0,
                },
            ],
            key_themes: vec!["야근".to_string()],
            feedback: vec!["수고했어요".to_string()],
        };
        assert!((analysis.average_sentiment() - 6.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("{\"a\":1}"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n{\"a\":1}\n```"), "{\"a\":1}");
    }

    #[tokio::test]
    async fn test_analyzer_parses_fenced_json() {
        let analyzer = ReportAnalyzer::new(Arc::new(FixedModel(
            "```json\n{\"entry_scores\":[{\"date\":\"2026-01-01\",\"score\":7}],\
             \"key_themes\":[\"산책\"],\"feedback\":[\"좋은 한 주였어요\"]}\n```",
        )));
        let entries = vec![DiaryEntryRow {
            id: Uuid::new_v4(),
            content: "공원에서 산책했다".to_string(),
            record_date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
        }];
        let analysis = analyzer.analyze(&entries).await.unwrap();
        assert_eq!(analysis.entry_scores.len(), 1);
        assert_eq!(analysis.key_themes, vec!["산책"]);
    }

    #[tokio::test]
    async fn test_analyzer_rejects_prose() {
        let analyzer = ReportAnalyzer::new(Arc::new(FixedModel("이번 주는 평온했습니다.")));
        let entries = vec![DiaryEntryRow {
            id: Uuid::new_v4(),
            content: "x".to_string(),
            record_date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
        }];
        assert!(matches!(
            analyzer.analyze(&entries).await,
            Err(Error::Upstream(_))
        ));
    }
}
