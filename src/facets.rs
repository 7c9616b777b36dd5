//! Facet generators: one structured model call per profile facet.

use serde::Deserialize;
use std::fmt;
use std::sync::Arc;

use crate::config::PipelineConfig;
use crate::error::{ParseError, PipelineError};
use crate::inference::ModelRequest;
use crate::models::{
    CoreValue, Demographics, Goal, Interest, InterpersonalSkills, Personality, Skill, Topic,
};
use crate::prompts;
use crate::structured::{StructuredClient, Validate};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Facet {
    Interests,
    Personality,
    Skills,
    Goals,
    Values,
    Demographics,
    LivedExperiences,
    Habits,
    Hobbies,
    InterpersonalSkills,
    ExceptionalCircumstances,
    ConversationPersonality,
    ConversationInterpersonalSkills,
    Topics,
}

impl Facet {
    pub const ALL: [Facet; 14] = [
        Facet::Interests,
        Facet::Personality,
        Facet::Skills,
        Facet::Goals,
        Facet::Values,
        Facet::Demographics,
        Facet::LivedExperiences,
        Facet::Habits,
        Facet::Hobbies,
        Facet::InterpersonalSkills,
        Facet::ExceptionalCircumstances,
        Facet::ConversationPersonality,
        Facet::ConversationInterpersonalSkills,
        Facet::Topics,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Facet::Interests => "interests",
            Facet::Personality => "personality",
            Facet::Skills => "skills",
            Facet::Goals => "goals",
            Facet::Values => "values",
            Facet::Demographics => "demographics",
            Facet::LivedExperiences => "lived_experiences",
            Facet::Habits => "habits",
            Facet::Hobbies => "hobbies",
            Facet::InterpersonalSkills => "interpersonal_skills",
            Facet::ExceptionalCircumstances => "exceptional_circumstances",
            Facet::ConversationPersonality => "conversation_personality",
            Facet::ConversationInterpersonalSkills => "conversation_interpersonal_skills",
            Facet::Topics => "topics",
        }
    }

    /// Whether this facet reads the peer-conversation corpus instead of the
    /// question corpus.
    pub fn from_conversations(&self) -> bool {
        matches!(
            self,
            Facet::ConversationPersonality | Facet::ConversationInterpersonalSkills | Facet::Topics
        )
    }
}

impl fmt::Display for Facet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded facet, ready to slot into an intermediate profile.
#[derive(Debug, Clone, PartialEq)]
pub enum FacetValue {
    Interests(Vec<Interest>),
    Personality(Personality),
    Skills(Vec<Skill>),
    Goals(Vec<Goal>),
    Values(Vec<CoreValue>),
    Demographics(Demographics),
    LivedExperiences(Vec<String>),
    Habits(Vec<String>),
    Hobbies(Vec<String>),
    InterpersonalSkills(InterpersonalSkills),
    ExceptionalCircumstances(Vec<String>),
    Topics(Vec<Topic>),
}

// ============ Response Envelopes ============

// List facets come back wrapped in a single-key object.
macro_rules! list_envelope {
    ($name:ident, $field:ident, $key:literal, $item:ty) => {
        #[derive(Debug, Deserialize)]
        struct $name {
            #[serde(rename = $key)]
            $field: Vec<$item>,
        }

        impl Validate for $name {
            fn validate(&self) -> Result<(), ParseError> {
                self.$field.validate()
            }

            fn is_empty(&self) -> bool {
                Validate::is_empty(&self.$field)
            }
        }
    };
}

list_envelope!(InterestsEnvelope, interests, "interests", Interest);
list_envelope!(SkillsEnvelope, skills, "skills", Skill);
list_envelope!(GoalsEnvelope, goals, "goals", Goal);
list_envelope!(ValuesEnvelope, values, "core_values", CoreValue);
list_envelope!(LivedExperiencesEnvelope, lived_experiences, "lived_experiences", String);
list_envelope!(HabitsEnvelope, habits, "habits", String);
list_envelope!(HobbiesEnvelope, hobbies, "hobbies", String);
list_envelope!(CircumstancesEnvelope, circumstances, "exceptional_circumstances", String);
list_envelope!(TopicsEnvelope, topics, "topics", Topic);

// ============ Generator ============

#[derive(Clone)]
pub struct FacetGenerator {
    client: StructuredClient,
    config: Arc<PipelineConfig>,
}

impl FacetGenerator {
    pub fn new(client: StructuredClient, config: Arc<PipelineConfig>) -> Self {
        Self { client, config }
    }

    /// Generate one facet from `corpus`. Exhausted retries surface as
    /// `FacetGeneration` naming the facet.
    pub async fn generate(
        &self,
        facet: Facet,
        user_id: &str,
        corpus: &str,
    ) -> Result<FacetValue, PipelineError> {
        let request = ModelRequest {
            label: facet.as_str().to_string(),
            model: self.config.facet_model(facet).to_string(),
            prompt: corpus.to_string(),
            system: prompts::facet_prompt(facet, user_id, &self.config.counts),
            temperature: None,
        };
        let require_items = self.config.requires_items(facet);
        let client = &self.client;

        let value = match facet {
            Facet::Interests => client
                .request::<InterestsEnvelope>(&request, require_items)
                .await
                .map(|e| FacetValue::Interests(e.interests)),
            Facet::Personality | Facet::ConversationPersonality => client
                .request::<Personality>(&request, require_items)
                .await
                .map(FacetValue::Personality),
            Facet::Skills => client
                .request::<SkillsEnvelope>(&request, require_items)
                .await
                .map(|e| FacetValue::Skills(e.skills)),
            Facet::Goals => client
                .request::<GoalsEnvelope>(&request, require_items)
                .await
                .map(|e| FacetValue::Goals(e.goals)),
            Facet::Values => client
                .request::<ValuesEnvelope>(&request, require_items)
                .await
                .map(|e| FacetValue::Values(e.values)),
            Facet::Demographics => client
                .request::<Demographics>(&request, require_items)
                .await
                .map(FacetValue::Demographics),
            Facet::LivedExperiences => client
                .request::<LivedExperiencesEnvelope>(&request, require_items)
                .await
                .map(|e| FacetValue::LivedExperiences(e.lived_experiences)),
            Facet::Habits => client
                .request::<HabitsEnvelope>(&request, require_items)
                .await
                .map(|e| FacetValue::Habits(e.habits)),
            Facet::Hobbies => client
                .request::<HobbiesEnvelope>(&request, require_items)
                .await
                .map(|e| FacetValue::Hobbies(e.hobbies)),
            Facet::InterpersonalSkills | Facet::ConversationInterpersonalSkills => client
                .request::<InterpersonalSkills>(&request, require_items)
                .await
                .map(FacetValue::InterpersonalSkills),
            Facet::ExceptionalCircumstances => client
                .request::<CircumstancesEnvelope>(&request, require_items)
                .await
                .map(|e| FacetValue::ExceptionalCircumstances(e.circumstances)),
            Facet::Topics => client
                .request::<TopicsEnvelope>(&request, require_items)
                .await
                .map(|e| FacetValue::Topics(e.topics)),
        };

        value.map_err(|source| PipelineError::FacetGeneration {
            facet: facet.as_str().to_string(),
            source,
        })
    }
}
