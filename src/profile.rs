//! Profile pipeline: facet fan-out, merge, then narrative features.

use std::sync::Arc;

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::facets::{Facet, FacetGenerator, FacetValue};
use crate::fanout::FanOut;
use crate::features::FeatureSynthesizer;
use crate::inference::InferenceClient;
use crate::logging;
use crate::models::{FinalProfile, IntermediateProfile, InterpersonalSkills, Personality};
use crate::structured::StructuredClient;

#[derive(Clone)]
pub struct ProfilePipeline {
    facets: FacetGenerator,
    features: FeatureSynthesizer,
    config: Arc<PipelineConfig>,
}

impl ProfilePipeline {
    pub fn new(inference: InferenceClient, config: Arc<PipelineConfig>) -> Self {
        let client = StructuredClient::new(inference, config.retry_attempts, config.retry_backoff);
        Self {
            facets: FacetGenerator::new(client.clone(), Arc::clone(&config)),
            features: FeatureSynthesizer::new(client, Arc::clone(&config)),
            config,
        }
    }

    /// Run every facet generator concurrently and merge the results.
    ///
    /// Without a conversation corpus the conversation-derived facets are
    /// skipped and topics stay empty. With one, personality and interpersonal
    /// skills are computed from both corpora and averaged per trait.
    pub async fn build_intermediate_profile(
        &self,
        user_id: &str,
        questions: &str,
        conversations: Option<&str>,
    ) -> Result<IntermediateProfile, PipelineError> {
        let questions: Arc<str> = Arc::from(questions);
        let conversations: Option<Arc<str>> = conversations.map(Arc::from);

        let tasks: Vec<_> = Facet::ALL
            .into_iter()
            .filter_map(|facet| {
                let corpus = if facet.from_conversations() {
                    Arc::clone(conversations.as_ref()?)
                } else {
                    Arc::clone(&questions)
                };
                let generator = self.facets.clone();
                let user_id = user_id.to_string();
                Some((facet, async move { generator.generate(facet, &user_id, &corpus).await }))
            })
            .collect();

        logging::log_profile(Some(user_id), &format!("Generating {} facets", tasks.len()));

        let fanout = FanOut::new("facets", self.config.concurrency_limit, self.config.stage_deadline);
        let results = fanout.join_all(tasks).await?;

        Ok(assemble(results))
    }

    /// Build the full profile for `user_id` from its serialized corpora.
    pub async fn generate(
        &self,
        user_id: &str,
        questions: &str,
        conversations: Option<&str>,
    ) -> Result<FinalProfile, PipelineError> {
        logging::log_profile(Some(user_id), &format!(
            "Profile build started (conversations: {})",
            conversations.is_some()
        ));

        let traits = self.build_intermediate_profile(user_id, questions, conversations).await?;
        let features = self.features.build_features(&traits, questions).await?;

        logging::log_profile(Some(user_id), &format!(
            "Profile build finished: {} interests, {} topics, {} tags",
            traits.interests.len(),
            traits.topics.len(),
            features.tags.len()
        ));

        Ok(FinalProfile::new(traits, features))
    }
}

/// Slot each facet into the profile, averaging the doubly computed ones.
fn assemble(results: Vec<(Facet, FacetValue)>) -> IntermediateProfile {
    let mut profile = IntermediateProfile::default();
    let mut conversation_personality: Option<Personality> = None;
    let mut conversation_skills: Option<InterpersonalSkills> = None;

    for (facet, value) in results {
        match value {
            FacetValue::Personality(p) if facet == Facet::ConversationPersonality => {
                conversation_personality = Some(p)
            }
            FacetValue::Personality(p) => profile.personality = p,
            FacetValue::InterpersonalSkills(s) if facet == Facet::ConversationInterpersonalSkills => {
                conversation_skills = Some(s)
            }
            FacetValue::InterpersonalSkills(s) => profile.interpersonal_skills = s,
            FacetValue::Interests(v) => profile.interests = v,
            FacetValue::Skills(v) => profile.skills = v,
            FacetValue::Goals(v) => profile.goals = v,
            FacetValue::Values(v) => profile.values = v,
            FacetValue::Demographics(v) => profile.demographics = v,
            FacetValue::LivedExperiences(v) => profile.lived_experiences = v,
            FacetValue::Habits(v) => profile.habits = v,
            FacetValue::Hobbies(v) => profile.hobbies = v,
            FacetValue::ExceptionalCircumstances(v) => profile.exceptional_circumstances = v,
            FacetValue::Topics(v) => profile.topics = v,
        }
    }

    if let Some(p) = conversation_personality {
        profile.personality = profile.personality.mean(&p);
    }
    if let Some(s) = conversation_skills {
        profile.interpersonal_skills = profile.interpersonal_skills.mean(&s);
    }

    profile
}
