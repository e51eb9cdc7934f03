use thiserror::Error;

use crate::llm_client::LlmError;

/// Application-level error type.
///
/// Variants map onto the failure taxonomy of a run: missing fact-store documents,
/// generative-port transport and malformed-output failures, pipeline wiring errors,
/// and plain IO/serialization failures.
#[derive(Debug, Error)]
pub enum AppError {
    /// A required fact-store document is absent. Carries the document's logical role.
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("LLM error in {stage}: {source}")]
    Llm {
        stage: &'static str,
        #[source]
        source: LlmError,
    },

    /// The model answered, but not with the structure the stage asked for.
    #[error("Malformed model output in {stage}: {reason}")]
    MalformedOutput { stage: &'static str, reason: String },

    #[error("Pipeline composition error: {0}")]
    Composition(String),

    #[error("Render error: {0}")]
    Render(#[from] minijinja::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn llm(stage: &'static str, source: LlmError) -> Self {
        AppError::Llm { stage, source }
    }

    /// Short machine-readable code, used when errors are recorded in the run record.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Llm { .. } => "LLM_ERROR",
            AppError::MalformedOutput { .. } => "MALFORMED_OUTPUT",
            AppError::Composition(_) => "COMPOSITION_ERROR",
            AppError::Render(_) => "RENDER_ERROR",
            AppError::Io(_) => "IO_ERROR",
            AppError::Yaml(_) => "YAML_ERROR",
            AppError::Json(_) => "JSON_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}
