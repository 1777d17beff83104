//! The insight pipeline: prompt, model, extraction, validation, persistence.

use crate::agent::{GenerationError, ModelInvoker};
use crate::extract::extract;
use crate::insight::Insight;
use crate::prompt::PromptBuilder;
use crate::storage::{InsightStore, StorageError};
use crate::validate::{validate, SchemaError, ValidationError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Successful result of one analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Analysis {
    pub record_id: u64,
    pub insights: Insight,
}

#[derive(Error, Debug)]
pub enum AnalyzeError {
    #[error("transcript is empty")]
    EmptyTranscript,
    #[error("model generation failed: {0}")]
    Generation(#[from] GenerationError),
    /// The candidate text is kept for operators; it is not part of the message.
    #[error("model output is not valid JSON: {source}")]
    Parse {
        #[source]
        source: serde_json::Error,
        candidate: String,
    },
    #[error("model output violates the insight schema: {0}")]
    Schema(#[from] SchemaError),
    #[error("failed to persist call record: {0}")]
    Persistence(#[from] StorageError),
}

impl From<ValidationError> for AnalyzeError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::Parse { source, candidate } => AnalyzeError::Parse { source, candidate },
            ValidationError::Schema(e) => AnalyzeError::Schema(e),
        }
    }
}

/// Externally visible failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    GenerationFailure,
    ParseFailure,
    SchemaFailure,
    PersistenceFailure,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::GenerationFailure => "generation_failure",
            ErrorKind::ParseFailure => "parse_failure",
            ErrorKind::SchemaFailure => "schema_failure",
            ErrorKind::PersistenceFailure => "persistence_failure",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AnalyzeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AnalyzeError::EmptyTranscript => ErrorKind::InvalidInput,
            AnalyzeError::Generation(_) => ErrorKind::GenerationFailure,
            AnalyzeError::Parse { .. } => ErrorKind::ParseFailure,
            AnalyzeError::Schema(_) => ErrorKind::SchemaFailure,
            AnalyzeError::Persistence(_) => ErrorKind::PersistenceFailure,
        }
    }
}

/// Runs transcripts through the pipeline.
///
/// One `Analyzer` is shared by every request; `analyze` takes `&self` and
/// concurrent calls do not interact apart from sharing the store.
pub struct Analyzer {
    invoker: Arc<dyn ModelInvoker>,
    store: InsightStore,
    prompt: PromptBuilder,
    timeout: Duration,
    log_raw_output: bool,
}

impl Analyzer {
    /// The store must already have its schema in place.
    pub fn new(invoker: Arc<dyn ModelInvoker>, store: InsightStore, timeout: Duration) -> Self {
        Self {
            invoker,
            store,
            prompt: PromptBuilder::default(),
            timeout,
            log_raw_output: false,
        }
    }

    pub fn with_prompt(mut self, prompt: PromptBuilder) -> Self {
        self.prompt = prompt;
        self
    }

    /// Log raw model output when it fails to parse or validate.
    pub fn with_raw_output_logging(mut self, enabled: bool) -> Self {
        self.log_raw_output = enabled;
        self
    }

    pub fn store(&self) -> &InsightStore {
        &self.store
    }

    /// Analyze one transcript and persist the result.
    ///
    /// Nothing is written unless every earlier stage succeeded. Dropping the
    /// returned future before the model answers leaves the store untouched.
    pub async fn analyze(&self, transcript: &str) -> Result<Analysis, AnalyzeError> {
        if transcript.trim().is_empty() {
            return Err(AnalyzeError::EmptyTranscript);
        }

        let started = Instant::now();
        let prompt = self.prompt.build(transcript);
        debug!(
            model = self.invoker.model(),
            prompt_bytes = prompt.len(),
            "invoking model"
        );

        let raw = match tokio::time::timeout(self.timeout, self.invoker.invoke(&prompt)).await {
            Ok(Ok(raw)) if raw.trim().is_empty() => Err(GenerationError::EmptyResponse),
            Ok(result) => result,
            Err(_) => Err(GenerationError::Timeout(self.timeout)),
        }
        .inspect_err(|e| warn!(model = self.invoker.model(), error = %e, "model call failed"))?;

        let candidate = extract(&raw);
        let insights = validate(candidate).map_err(|e| {
            let err = AnalyzeError::from(e);
            warn!(kind = %err.kind(), error = %err, "model output rejected");
            if self.log_raw_output {
                warn!(raw = %raw, "rejected model output");
            }
            err
        })?;

        let record_id = self
            .store
            .persist(transcript, &insights)
            .await
            .inspect_err(|e| warn!(error = %e, "failed to persist call record"))?;

        info!(
            record_id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "analyzed transcript"
        );
        Ok(Analysis {
            record_id,
            insights,
        })
    }
}
