//! Error types for the profile and match pipelines.

use std::time::Duration;

/// Top-level error type for the service layer.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Stored profile for user {user_id} could not be decoded: {source}")]
    CorruptProfile {
        user_id: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures talking to the text-generation backend.
#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Malformed response frame: {0}")]
    MalformedResponse(String),

    #[error("Backend reported an error: {0}")]
    Backend(String),
}

/// Failures turning raw model output into a typed value.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("No JSON object found in model output")]
    NoJsonObject,

    #[error("Invalid JSON for target shape: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Field {field} out of range: {value} not in [{min}, {max}]")]
    OutOfRange {
        field: String,
        value: f64,
        min: f64,
        max: f64,
    },
}

/// Failure of one invoke-and-parse step. Every variant is retryable.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error(transparent)]
    Inference(#[from] InferenceError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("Model returned an empty {0}")]
    EmptyResult(String),

    #[error("Gave up after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        #[source]
        last: Box<GenerationError>,
    },
}

/// Stage of the match pipeline, used for logging and error context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStage {
    CandidatesSelected,
    Explaining,
    Arbitrating,
    Finalizing,
    Done,
}

impl MatchStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStage::CandidatesSelected => "candidates_selected",
            MatchStage::Explaining => "explaining",
            MatchStage::Arbitrating => "arbitrating",
            MatchStage::Finalizing => "finalizing",
            MatchStage::Done => "done",
        }
    }
}

impl std::fmt::Display for MatchStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that abort a whole profile build or match attempt.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Facet {facet} failed: {source}")]
    FacetGeneration {
        facet: String,
        #[source]
        source: GenerationError,
    },

    #[error("Stage {stage} exceeded its deadline of {after:?}")]
    DeadlineExceeded { stage: &'static str, after: Duration },

    #[error("No explained candidate matches {id:?}")]
    NoCandidate { id: String },

    #[error("Match step {stage} failed: {source}")]
    MatchStep {
        stage: MatchStage,
        #[source]
        source: GenerationError,
    },

    #[error("Worker task failed: {0}")]
    TaskFailed(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Persistence errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Store lock poisoned")]
    Poisoned,
}

pub type Result<T> = std::result::Result<T, Error>;
