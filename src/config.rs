//! Runtime configuration.
//!
//! Model assignments, concurrency limits, deadlines and retry bounds are all
//! carried in [`PipelineConfig`] and handed to the pipelines at construction.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;
use crate::facets::Facet;
use crate::features::Feature;

// Model identifiers understood by the inference gateway
pub const MODEL_GPT4: &str = "gpt4-new";
pub const MODEL_GPT3_5: &str = "gpt3-5";
pub const MODEL_CLAUDE_HAIKU: &str = "anthropic.claude-3-haiku-20240307-v1:0";
pub const MODEL_CLAUDE_SONNET: &str = "anthropic.claude-3-sonnet-20240229-v1:0";

/// Sender/receiver id of the service chat bot; messages addressed to it are
/// the user's direct questions.
pub const SERVICE_BOT_ID: &str = "00000000-0000-0000-0000-000000000000";

/// Models used by the match pipeline.
#[derive(Debug, Clone)]
pub struct MatchModels {
    pub candidates: String,
    pub explanation: String,
    pub arbiter: String,
    pub personal_reason: String,
}

impl Default for MatchModels {
    fn default() -> Self {
        Self {
            candidates: MODEL_CLAUDE_SONNET.to_string(),
            explanation: MODEL_CLAUDE_SONNET.to_string(),
            arbiter: MODEL_GPT4.to_string(),
            personal_reason: MODEL_GPT3_5.to_string(),
        }
    }
}

/// How many items list-shaped prompts ask for.
#[derive(Debug, Clone)]
pub struct ItemCounts {
    pub interests: usize,
    pub skills: usize,
    pub goals: usize,
    pub values: usize,
    pub lived_experiences: usize,
    pub habits: usize,
    pub hobbies: usize,
    pub tags: usize,
    pub key_questions: usize,
}

impl Default for ItemCounts {
    fn default() -> Self {
        Self {
            interests: 10,
            skills: 5,
            goals: 3,
            values: 3,
            lived_experiences: 3,
            habits: 3,
            hobbies: 5,
            tags: 4,
            key_questions: 3,
        }
    }
}

/// Everything the profile and match pipelines need to know about models,
/// limits and policies.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub facet_models: HashMap<Facet, String>,
    pub feature_models: HashMap<Feature, String>,
    pub match_models: MatchModels,
    /// Used when a facet or feature has no explicit assignment.
    pub fallback_model: String,
    /// Maximum in-flight inference calls per fan-out stage.
    pub concurrency_limit: usize,
    /// Shared deadline for each fan-out stage.
    pub stage_deadline: Duration,
    /// Total invoke+parse attempts per structured request.
    pub retry_attempts: u32,
    /// Base delay between attempts; jitter is added on top.
    pub retry_backoff: Duration,
    /// Facets whose successful parse must contain at least one item.
    pub non_empty_facets: HashSet<Facet>,
    pub candidate_count: usize,
    pub freshness_threshold: Duration,
    /// Upper bound on questions and messages fed into a profile build.
    pub corpus_limit: usize,
    pub counts: ItemCounts,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let facet_models = Facet::ALL
            .iter()
            .map(|facet| {
                let model = match facet {
                    Facet::Demographics | Facet::InterpersonalSkills => MODEL_GPT4,
                    Facet::ConversationPersonality
                    | Facet::ConversationInterpersonalSkills
                    | Facet::Topics => MODEL_CLAUDE_SONNET,
                    _ => MODEL_GPT3_5,
                };
                (*facet, model.to_string())
            })
            .collect();

        let feature_models = Feature::ALL
            .iter()
            .map(|feature| {
                let model = match feature {
                    Feature::KeyQuestions => MODEL_CLAUDE_SONNET,
                    _ => MODEL_GPT4,
                };
                (*feature, model.to_string())
            })
            .collect();

        Self {
            facet_models,
            feature_models,
            match_models: MatchModels::default(),
            fallback_model: MODEL_GPT4.to_string(),
            concurrency_limit: 4,
            stage_deadline: Duration::from_secs(60),
            retry_attempts: 3,
            retry_backoff: Duration::from_millis(250),
            non_empty_facets: [Facet::Interests, Facet::Skills, Facet::Goals, Facet::Values]
                .into_iter()
                .collect(),
            candidate_count: 4,
            freshness_threshold: Duration::from_secs(60),
            corpus_limit: 60,
            counts: ItemCounts::default(),
        }
    }
}

impl PipelineConfig {
    pub fn facet_model(&self, facet: Facet) -> &str {
        self.facet_models
            .get(&facet)
            .map(String::as_str)
            .unwrap_or(&self.fallback_model)
    }

    pub fn feature_model(&self, feature: Feature) -> &str {
        self.feature_models
            .get(&feature)
            .map(String::as_str)
            .unwrap_or(&self.fallback_model)
    }

    pub fn requires_items(&self, facet: Facet) -> bool {
        self.non_empty_facets.contains(&facet)
    }

    /// Apply `FRIENDMATCH_*` overrides on top of the defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        config.concurrency_limit =
            parse_optional_env("FRIENDMATCH_CONCURRENCY", config.concurrency_limit)?;
        if config.concurrency_limit == 0 {
            return Err(ConfigError::InvalidValue {
                key: "FRIENDMATCH_CONCURRENCY".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        let deadline_secs = parse_optional_env(
            "FRIENDMATCH_STAGE_TIMEOUT_SECS",
            config.stage_deadline.as_secs(),
        )?;
        config.stage_deadline = Duration::from_secs(deadline_secs);

        config.retry_attempts =
            parse_optional_env("FRIENDMATCH_RETRY_ATTEMPTS", config.retry_attempts)?.max(1);
        config.candidate_count =
            parse_optional_env("FRIENDMATCH_CANDIDATES", config.candidate_count)?;

        let freshness_secs = parse_optional_env(
            "FRIENDMATCH_FRESHNESS_SECS",
            config.freshness_threshold.as_secs(),
        )?;
        config.freshness_threshold = Duration::from_secs(freshness_secs);

        Ok(config)
    }
}

/// Process-level configuration: where things live plus the pipeline policy.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub websocket_uri: String,
    pub connect_timeout: Duration,
    pub database_path: PathBuf,
    pub log_dir: Option<PathBuf>,
    pub pipeline: PipelineConfig,
}

impl AppConfig {
    /// Load `.env` (if present) and read the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let websocket_uri = optional_env("LLM_WEBSOCKET_URI")?
            .ok_or_else(|| ConfigError::MissingEnvVar("LLM_WEBSOCKET_URI".to_string()))?;
        let database_path = optional_env("FRIENDMATCH_DB_PATH")?
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("friendmatch.db"));
        let log_dir = optional_env("FRIENDMATCH_LOG_DIR")?.map(PathBuf::from);
        let connect_secs = parse_optional_env("FRIENDMATCH_CONNECT_TIMEOUT_SECS", 10u64)?;

        Ok(Self {
            websocket_uri,
            connect_timeout: Duration::from_secs(connect_secs),
            database_path,
            log_dir,
            pipeline: PipelineConfig::from_env()?,
        })
    }
}

pub(crate) fn optional_env(key: &str) -> Result<Option<String>, ConfigError> {
    match std::env::var(key) {
        Ok(val) if val.is_empty() => Ok(None),
        Ok(val) => Ok(Some(val)),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
    }
}

pub(crate) fn parse_optional_env<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    optional_env(key)?
        .map(|s| {
            s.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            })
        })
        .transpose()
        .map(|opt| opt.unwrap_or(default))
}
