//! Shared library for the diary agent service binaries.
//!
//! This crate provides the orchestration core — intent classification,
//! dispatch, and the capability adapters — plus the common config, error,
//! and HTTP plumbing used across all endpoint binaries.

pub mod config;
pub mod db;
pub mod error;
pub mod http;
pub mod image;
pub mod intent;
pub mod knowledge;
pub mod llm;
pub mod models;
pub mod orchestrator;
pub mod reports;
pub mod secrets;
pub mod summarize;

pub use config::Config;
pub use error::{Error, Result};
pub use image::{ImagePipeline, ImageStore};
pub use intent::{Intent, IntentClassifier};
pub use knowledge::{KnowledgeBaseRetriever, KnowledgeSearchAdapter};
pub use llm::{BedrockTextModel, NovaCanvasSynthesizer};
pub use models::{
    AgentEnvelope, AgentRequest, CapabilityResponse, ImageRequest, ReportRequest,
    SummarizeRequest,
};
pub use orchestrator::Orchestrator;
pub use reports::{ReportAnalyzer, ReportService, ReportStore};
pub use secrets::{get_app_secrets, get_database_credentials, get_secret, AppSecrets};
pub use summarize::SummarizationAdapter;
