//! Profile and match data shared by the pipelines and the store.

use serde::{Deserialize, Serialize};

use crate::error::ParseError;
use crate::structured::{check_range, Validate};

// ============ Profile Facets ============

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Interest {
    pub interest: String,
    pub level: f64,
    #[serde(default)]
    pub emoji: String,
}

/// Big Five (OCEAN) scores, each 0–5.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Default)]
pub struct Personality {
    pub openness: f64,
    pub conscientiousness: f64,
    #[serde(alias = "extroversion")]
    pub extraversion: f64,
    pub agreeableness: f64,
    pub neuroticism: f64,
}

impl Personality {
    /// Per-trait arithmetic mean of two assessments.
    pub fn mean(&self, other: &Personality) -> Personality {
        Personality {
            openness: (self.openness + other.openness) / 2.0,
            conscientiousness: (self.conscientiousness + other.conscientiousness) / 2.0,
            extraversion: (self.extraversion + other.extraversion) / 2.0,
            agreeableness: (self.agreeableness + other.agreeableness) / 2.0,
            neuroticism: (self.neuroticism + other.neuroticism) / 2.0,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Skill {
    pub skill: String,
    pub level: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Goal {
    pub goal: String,
    pub importance: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CoreValue {
    pub value: String,
    pub importance: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct Demographics {
    pub age_range: Option<String>,
    pub gender: Option<String>,
    pub occupation: Option<String>,
    pub highest_education: Option<String>,
    pub living_status: Option<String>,
    pub political_affiliation: Option<String>,
    pub religious_affiliation: Option<String>,
    pub nationality: Option<String>,
    #[serde(default)]
    pub spoken_languages: Vec<String>,
    pub social_class: Option<String>,
}

/// Nine interpersonal traits, each 0–1.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Default)]
pub struct InterpersonalSkills {
    pub active_listening: f64,
    pub teamwork: f64,
    pub responsibility: f64,
    pub dependability: f64,
    pub leadership: f64,
    pub motivation: f64,
    pub flexibility: f64,
    pub patience: f64,
    pub empathy: f64,
}

impl InterpersonalSkills {
    fn fields(&self) -> [(&'static str, f64); 9] {
        [
            ("active_listening", self.active_listening),
            ("teamwork", self.teamwork),
            ("responsibility", self.responsibility),
            ("dependability", self.dependability),
            ("leadership", self.leadership),
            ("motivation", self.motivation),
            ("flexibility", self.flexibility),
            ("patience", self.patience),
            ("empathy", self.empathy),
        ]
    }

    /// Per-trait arithmetic mean of two assessments.
    pub fn mean(&self, other: &InterpersonalSkills) -> InterpersonalSkills {
        InterpersonalSkills {
            active_listening: (self.active_listening + other.active_listening) / 2.0,
            teamwork: (self.teamwork + other.teamwork) / 2.0,
            responsibility: (self.responsibility + other.responsibility) / 2.0,
            dependability: (self.dependability + other.dependability) / 2.0,
            leadership: (self.leadership + other.leadership) / 2.0,
            motivation: (self.motivation + other.motivation) / 2.0,
            flexibility: (self.flexibility + other.flexibility) / 2.0,
            patience: (self.patience + other.patience) / 2.0,
            empathy: (self.empathy + other.empathy) / 2.0,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Topic {
    pub topic: String,
    pub level: f64,
    #[serde(default)]
    pub emoji: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Tag {
    pub tag: String,
    #[serde(default)]
    pub emoji: String,
}

// ============ Range Validation ============

impl Validate for Interest {
    fn validate(&self) -> Result<(), ParseError> {
        check_range("interest.level", self.level, 0.0, 1.0)
    }
}

impl Validate for Skill {
    fn validate(&self) -> Result<(), ParseError> {
        check_range("skill.level", self.level, 0.0, 1.0)
    }
}

impl Validate for Goal {
    fn validate(&self) -> Result<(), ParseError> {
        check_range("goal.importance", self.importance, 0.0, 1.0)
    }
}

impl Validate for CoreValue {
    fn validate(&self) -> Result<(), ParseError> {
        check_range("core_value.importance", self.importance, 0.0, 1.0)
    }
}

impl Validate for Topic {
    fn validate(&self) -> Result<(), ParseError> {
        check_range("topic.level", self.level, 0.0, 1.0)
    }
}

impl Validate for Personality {
    fn validate(&self) -> Result<(), ParseError> {
        check_range("openness", self.openness, 0.0, 5.0)?;
        check_range("conscientiousness", self.conscientiousness, 0.0, 5.0)?;
        check_range("extraversion", self.extraversion, 0.0, 5.0)?;
        check_range("agreeableness", self.agreeableness, 0.0, 5.0)?;
        check_range("neuroticism", self.neuroticism, 0.0, 5.0)
    }
}

impl Validate for InterpersonalSkills {
    fn validate(&self) -> Result<(), ParseError> {
        for (field, value) in self.fields() {
            check_range(field, value, 0.0, 1.0)?;
        }
        Ok(())
    }
}

impl Validate for Demographics {}

impl<T: Validate> Validate for Vec<T> {
    fn validate(&self) -> Result<(), ParseError> {
        self.iter().try_for_each(Validate::validate)
    }

    fn is_empty(&self) -> bool {
        <[T]>::is_empty(self)
    }
}

impl Validate for String {
    fn is_empty(&self) -> bool {
        self.trim().is_empty()
    }
}

// ============ Profiles ============

/// Facets produced by the profile orchestrator. Facets come from independent
/// calls and are not cross-checked against each other.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct IntermediateProfile {
    pub interests: Vec<Interest>,
    pub personality: Personality,
    pub skills: Vec<Skill>,
    pub goals: Vec<Goal>,
    pub values: Vec<CoreValue>,
    pub demographics: Demographics,
    pub lived_experiences: Vec<String>,
    pub habits: Vec<String>,
    pub hobbies: Vec<String>,
    pub interpersonal_skills: InterpersonalSkills,
    pub exceptional_circumstances: Vec<String>,
    #[serde(default)]
    pub topics: Vec<Topic>,
}

/// Demographics without political or religious affiliation.
#[derive(Debug, Serialize)]
pub struct PublicDemographics<'a> {
    pub age_range: Option<&'a str>,
    pub gender: Option<&'a str>,
    pub occupation: Option<&'a str>,
    pub highest_education: Option<&'a str>,
    pub living_status: Option<&'a str>,
    pub nationality: Option<&'a str>,
    pub spoken_languages: &'a [String],
    pub social_class: Option<&'a str>,
}

/// The view of an intermediate profile that narrative prompts get to see.
#[derive(Debug, Serialize)]
pub struct PublicProfile<'a> {
    pub interests: &'a [Interest],
    pub personality: &'a Personality,
    pub skills: &'a [Skill],
    pub goals: &'a [Goal],
    pub values: &'a [CoreValue],
    pub demographics: PublicDemographics<'a>,
    pub lived_experiences: &'a [String],
    pub habits: &'a [String],
    pub hobbies: &'a [String],
    pub interpersonal_skills: &'a InterpersonalSkills,
    pub topics: &'a [Topic],
}

impl IntermediateProfile {
    pub fn public_view(&self) -> PublicProfile<'_> {
        let d = &self.demographics;
        PublicProfile {
            interests: &self.interests,
            personality: &self.personality,
            skills: &self.skills,
            goals: &self.goals,
            values: &self.values,
            demographics: PublicDemographics {
                age_range: d.age_range.as_deref(),
                gender: d.gender.as_deref(),
                occupation: d.occupation.as_deref(),
                highest_education: d.highest_education.as_deref(),
                living_status: d.living_status.as_deref(),
                nationality: d.nationality.as_deref(),
                spoken_languages: &d.spoken_languages,
                social_class: d.social_class.as_deref(),
            },
            lived_experiences: &self.lived_experiences,
            habits: &self.habits,
            hobbies: &self.hobbies,
            interpersonal_skills: &self.interpersonal_skills,
            topics: &self.topics,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct ProfileFeatures {
    pub summary: String,
    pub bio: String,
    pub subtitle: String,
    pub looking_for: String,
    pub tags: Vec<Tag>,
    pub key_questions: Vec<String>,
}

/// Stored profile: every facet plus the narrative layer. Replaced wholesale on
/// regeneration.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct FinalProfile {
    #[serde(flatten)]
    pub traits: IntermediateProfile,
    #[serde(flatten)]
    pub features: ProfileFeatures,
}

impl FinalProfile {
    pub fn new(traits: IntermediateProfile, features: ProfileFeatures) -> Self {
        Self { traits, features }
    }

    pub fn summary(&self) -> &str {
        &self.features.summary
    }
}

// ============ Users, Messages and Matches ============

/// A user row as stored. `profile` and `profile_generated_at` are written
/// together.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct UserRecord {
    pub id: String,
    pub name: String,
    pub avatar: Option<String>,
    pub updated_at: String,
    pub profile: Option<String>,
    pub profile_generated_at: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Message {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub message: String,
    pub created_at: String,
}

/// A user whose stored profile has been decoded.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ProfiledUser {
    pub id: String,
    pub name: String,
    pub avatar: Option<String>,
    pub profile: FinalProfile,
}

/// Outcome of a successful match attempt. Each side gets its own reason.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Match {
    pub id: String,
    pub user_id: String,
    pub match_id: String,
    /// Addressed to `user_id`, about `match_id`.
    pub user_reason: String,
    /// Addressed to `match_id`, about `user_id`.
    pub match_reason: String,
    pub created_at: String,
}
