//! Narrative features derived from an intermediate profile.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::fanout::FanOut;
use crate::inference::ModelRequest;
use crate::logging;
use crate::models::{IntermediateProfile, ProfileFeatures, Tag};
use crate::prompts;
use crate::structured::{StructuredClient, Validate};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    Summary,
    Bio,
    Subtitle,
    Tags,
    LookingFor,
    KeyQuestions,
}

impl Feature {
    pub const ALL: [Feature; 6] = [
        Feature::Summary,
        Feature::Bio,
        Feature::Subtitle,
        Feature::Tags,
        Feature::LookingFor,
        Feature::KeyQuestions,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Feature::Summary => "summary",
            Feature::Bio => "bio",
            Feature::Subtitle => "subtitle",
            Feature::Tags => "tags",
            Feature::LookingFor => "looking_for",
            Feature::KeyQuestions => "key_questions",
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FeatureValue {
    Text(String),
    Tags(Vec<Tag>),
    Questions(Vec<String>),
}

#[derive(Debug, Deserialize)]
struct SummaryEnvelope {
    summary: String,
}

#[derive(Debug, Deserialize)]
struct BioEnvelope {
    bio: String,
}

#[derive(Debug, Deserialize)]
struct SubtitleEnvelope {
    subtitle: String,
}

#[derive(Debug, Deserialize)]
struct LookingForEnvelope {
    looking_for: String,
}

#[derive(Debug, Deserialize)]
struct TagsEnvelope {
    tags: Vec<Tag>,
}

#[derive(Debug, Deserialize)]
struct KeyQuestionsEnvelope {
    key_questions: Vec<String>,
}

impl Validate for SummaryEnvelope {}
impl Validate for BioEnvelope {}
impl Validate for SubtitleEnvelope {}
impl Validate for LookingForEnvelope {}
impl Validate for TagsEnvelope {}
impl Validate for KeyQuestionsEnvelope {}

/// Key-question prompts see the profile and the questions the user asked.
#[derive(Serialize)]
struct KeyQuestionsContext<'a, P: Serialize> {
    user: P,
    questions: &'a str,
}

#[derive(Clone)]
pub struct FeatureSynthesizer {
    client: StructuredClient,
    config: Arc<PipelineConfig>,
}

impl FeatureSynthesizer {
    pub fn new(client: StructuredClient, config: Arc<PipelineConfig>) -> Self {
        Self { client, config }
    }

    pub async fn generate(&self, feature: Feature, context: &str) -> Result<FeatureValue, PipelineError> {
        let request = ModelRequest {
            label: feature.as_str().to_string(),
            model: self.config.feature_model(feature).to_string(),
            prompt: context.to_string(),
            system: prompts::feature_prompt(feature, &self.config.counts),
            temperature: None,
        };
        let client = &self.client;

        let value = match feature {
            Feature::Summary => client
                .request::<SummaryEnvelope>(&request, false)
                .await
                .map(|e| FeatureValue::Text(e.summary)),
            Feature::Bio => client
                .request::<BioEnvelope>(&request, false)
                .await
                .map(|e| FeatureValue::Text(e.bio)),
            Feature::Subtitle => client
                .request::<SubtitleEnvelope>(&request, false)
                .await
                .map(|e| FeatureValue::Text(e.subtitle)),
            Feature::LookingFor => client
                .request::<LookingForEnvelope>(&request, false)
                .await
                .map(|e| FeatureValue::Text(e.looking_for)),
            Feature::Tags => client
                .request::<TagsEnvelope>(&request, false)
                .await
                .map(|e| FeatureValue::Tags(e.tags)),
            Feature::KeyQuestions => client
                .request::<KeyQuestionsEnvelope>(&request, false)
                .await
                .map(|e| FeatureValue::Questions(e.key_questions)),
        };

        value.map_err(|source| PipelineError::FacetGeneration {
            facet: feature.as_str().to_string(),
            source,
        })
    }

    /// Run every feature concurrently over the public view of `profile` and
    /// assemble the result. Any failing feature fails the whole stage.
    pub async fn build_features(
        &self,
        profile: &IntermediateProfile,
        questions: &str,
    ) -> Result<ProfileFeatures, PipelineError> {
        let public = profile.public_view();
        let profile_json: Arc<str> = serde_json::to_string(&public)?.into();
        let questions_json: Arc<str> = serde_json::to_string(&KeyQuestionsContext {
            user: &public,
            questions,
        })?
        .into();

        let tasks: Vec<_> = Feature::ALL
            .into_iter()
            .map(|feature| {
                let synthesizer = self.clone();
                let context = match feature {
                    Feature::KeyQuestions => Arc::clone(&questions_json),
                    _ => Arc::clone(&profile_json),
                };
                (feature, async move { synthesizer.generate(feature, &context).await })
            })
            .collect();

        let fanout = FanOut::new("features", self.config.concurrency_limit, self.config.stage_deadline);
        let results = fanout.join_all(tasks).await?;

        let mut features = ProfileFeatures::default();
        for (feature, value) in results {
            match (feature, value) {
                (Feature::Summary, FeatureValue::Text(text)) => features.summary = text,
                (Feature::Bio, FeatureValue::Text(text)) => features.bio = text,
                (Feature::Subtitle, FeatureValue::Text(text)) => features.subtitle = text,
                (Feature::LookingFor, FeatureValue::Text(text)) => features.looking_for = text,
                (_, FeatureValue::Tags(tags)) => features.tags = tags,
                (_, FeatureValue::Questions(questions)) => features.key_questions = questions,
                (feature, _) => {
                    logging::log_error(None, &format!("Feature {} produced a mismatched value", feature));
                }
            }
        }

        Ok(features)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InferenceError;
    use crate::inference::InferenceClient;
    use crate::testing::{sample_profile, StubBackend};
    use std::time::Duration;

    fn synthesizer(backend: Arc<StubBackend>) -> FeatureSynthesizer {
        let config = Arc::new(PipelineConfig::default());
        let client = StructuredClient::new(InferenceClient::new(backend), config.retry_attempts, Duration::ZERO);
        FeatureSynthesizer::new(client, config)
    }

    #[tokio::test]
    async fn builds_every_feature() {
        let backend = Arc::new(StubBackend::canned());
        let profile = sample_profile().traits;
        let features = synthesizer(backend.clone())
            .build_features(&profile, r#"["How do I train finger strength?"]"#)
            .await
            .unwrap();

        assert_eq!(features.summary, "A climber who bakes.");
        assert_eq!(features.bio, "I climb rocks and bake bread.");
        assert_eq!(features.subtitle, "Chalk and crumbs");
        assert_eq!(features.looking_for, "Climbing partners who love carbs");
        assert_eq!(features.tags[0].tag, "outdoorsy");
        assert_eq!(features.key_questions.len(), 1);
        assert_eq!(backend.call_count(), Feature::ALL.len());
    }

    #[tokio::test]
    async fn prompts_never_see_sensitive_fields() {
        let backend = Arc::new(StubBackend::canned());
        let profile = sample_profile().traits;
        synthesizer(backend.clone()).build_features(&profile, "[]").await.unwrap();

        for call in backend.calls() {
            assert!(!call.prompt.contains("dyslexia"), "{} leaked circumstances", call.label);
            assert!(!call.prompt.contains("independent"), "{} leaked affiliation", call.label);
        }
        let key_questions = &backend.calls_labelled("key_questions")[0];
        let context: serde_json::Value = serde_json::from_str(&key_questions.prompt).unwrap();
        assert_eq!(context["questions"], "[]");
        assert!(context["user"].get("interests").is_some());
    }

    #[tokio::test]
    async fn one_failing_feature_fails_the_stage() {
        let backend = Arc::new(StubBackend::new(|request| {
            if request.label == "subtitle" {
                Err(InferenceError::Transport("reset".into()))
            } else {
                crate::testing::canned_response(request)
            }
        }));
        let err = synthesizer(backend)
            .build_features(&sample_profile().traits, "[]")
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::FacetGeneration { ref facet, .. } if facet == "subtitle"));
    }
}
