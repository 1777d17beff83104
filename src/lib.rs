//! # Callsight
//!
//! Structured insight extraction from customer call transcripts using LLMs.
//!
//! ## Pipeline
//!
//! transcript → [`PromptBuilder`] → [`ModelInvoker`] → [`extract`] →
//! [`validate`] → [`InsightStore`] → [`Analysis`]
//!
//! - **Strict contract**: model output is validated against a fixed 13-field
//!   [`Insight`] schema and rejected, never patched, when it does not fit
//! - **Append-only storage**: sled-backed call records with generated ids,
//!   plus a tantivy index for full-text search
//! - **Provider agnostic**: Gemini via rstructor or any OpenAI-compatible endpoint
//! - **Measurable**: [`eval`] scores the pipeline against hand-labelled transcripts

pub mod agent;
pub mod config;
pub mod db;
pub mod eval;
pub mod extract;
pub mod insight;
pub mod pipeline;
pub mod prompt;
pub mod search;
pub mod storage;
pub mod validate;

pub use agent::{GenerationError, ModelInvoker};
pub use config::Config;
pub use db::{InsightStore, SearchIndex};
pub use extract::extract;
pub use insight::{Insight, Sentiment};
pub use pipeline::{Analysis, AnalyzeError, Analyzer, ErrorKind};
pub use prompt::PromptBuilder;
pub use storage::CallRecord;
pub use validate::validate;
