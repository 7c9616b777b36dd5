//! Test doubles and fixtures shared by the unit tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::error::InferenceError;
use crate::inference::{InferenceBackend, ModelRequest};
use crate::models::{
    CoreValue, Demographics, FinalProfile, Goal, IntermediateProfile, Interest,
    InterpersonalSkills, Personality, ProfileFeatures, ProfiledUser, Skill, Tag, Topic,
};

type Handler = dyn Fn(&ModelRequest) -> Result<String, InferenceError> + Send + Sync;

/// Scripted backend. Records every request and the peak number of calls in
/// flight at once.
pub struct StubBackend {
    handler: Box<Handler>,
    delay: Duration,
    calls: Mutex<Vec<ModelRequest>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl StubBackend {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&ModelRequest) -> Result<String, InferenceError> + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    /// Replay `responses` in order regardless of the request.
    pub fn sequence(responses: Vec<Result<String, InferenceError>>) -> Self {
        let queue = Mutex::new(VecDeque::from(responses));
        Self::new(move |_| {
            queue
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(InferenceError::Transport("script exhausted".into())))
        })
    }

    /// Answer every label with [`canned_response`].
    pub fn canned() -> Self {
        Self::new(canned_response)
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<ModelRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_labelled(&self, prefix: &str) -> Vec<ModelRequest> {
        self.calls()
            .into_iter()
            .filter(|r| r.label.starts_with(prefix))
            .collect()
    }

    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InferenceBackend for StubBackend {
    async fn run_model(&self, request: &ModelRequest) -> Result<String, InferenceError> {
        self.calls.lock().unwrap().push(request.clone());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let result = (self.handler)(request);

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// Well-formed answers for every label the pipelines use, some wrapped in
/// prose or fences the way real models answer.
pub fn canned_response(request: &ModelRequest) -> Result<String, InferenceError> {
    let label = request.label.as_str();
    let body = match label {
        "interests" => r#"{"interests":[{"interest":"bouldering","level":0.8,"emoji":"🧗"},{"interest":"sourdough","level":0.6,"emoji":"🍞"}]}"#,
        "personality" => r#"{"openness":3,"conscientiousness":2,"extraversion":4,"agreeableness":3,"neuroticism":1}"#,
        "conversation_personality" => r#"{"analysis":"chatty","openness":5,"conscientiousness":4,"extroversion":2,"agreeableness":5,"neuroticism":3}"#,
        "skills" => r#"```json
{"skills":[{"skill":"rust","level":0.7}]}
```"#,
        "goals" => r#"{"goals":[{"goal":"climb 7a","importance":0.9}]}"#,
        "values" => r#"Sure: {"core_values":[{"value":"honesty","importance":0.8}]}"#,
        "demographics" => r#"{"analysis":"...","age_range":"25-34","gender":"female","occupation":"engineer","highest_education":"bachelor","living_status":"renting","political_affiliation":"independent","religious_affiliation":"none","nationality":"Canadian","spoken_languages":["English","French"],"social_class":"middle"}"#,
        "lived_experiences" => r#"{"lived_experiences":["moved abroad"]}"#,
        "habits" => r#"{"habits":["journals daily"]}"#,
        "hobbies" => r#"{"hobbies":["baking bread"]}"#,
        "interpersonal_skills" => r#"{"active_listening":0.6,"teamwork":0.5,"responsibility":0.7,"dependability":0.8,"leadership":0.4,"motivation":0.9,"flexibility":0.5,"patience":0.2,"empathy":0.6}"#,
        "conversation_interpersonal_skills" => r#"{"analysis":"kind","active_listening":0.8,"teamwork":0.5,"responsibility":0.7,"dependability":0.8,"leadership":0.6,"motivation":0.9,"flexibility":0.5,"patience":0.4,"empathy":1.0}"#,
        "exceptional_circumstances" => r#"{"exceptional_circumstances":[]}"#,
        "topics" => r#"{"topics":[{"topic":"climbing","level":0.7,"emoji":"⛰️"}]}"#,
        "summary" => r#"{"summary":"A climber who bakes."}"#,
        "bio" => r#"{"bio":"I climb rocks and bake bread."}"#,
        "subtitle" => r#"{"subtitle":"Chalk and crumbs"}"#,
        "looking_for" => r#"{"looking_for":"Climbing partners who love carbs"}"#,
        "tags" => r#"{"tags":[{"tag":"outdoorsy","emoji":"🌲"}]}"#,
        "key_questions" => r#"{"key_questions":["How do I train finger strength?"]}"#,
        _ => return Err(InferenceError::Backend(format!("no canned response for {}", label))),
    };
    Ok(body.to_string())
}

pub fn sample_profile() -> FinalProfile {
    FinalProfile::new(
        IntermediateProfile {
            interests: vec![Interest {
                interest: "bouldering".to_string(),
                level: 0.8,
                emoji: "🧗".to_string(),
            }],
            personality: Personality {
                openness: 4.0,
                conscientiousness: 3.5,
                extraversion: 2.0,
                agreeableness: 4.5,
                neuroticism: 1.0,
            },
            skills: vec![Skill { skill: "rust".to_string(), level: 0.7 }],
            goals: vec![Goal { goal: "run a marathon".to_string(), importance: 0.6 }],
            values: vec![CoreValue { value: "honesty".to_string(), importance: 0.9 }],
            demographics: Demographics {
                age_range: Some("25-34".to_string()),
                political_affiliation: Some("independent".to_string()),
                spoken_languages: vec!["English".to_string()],
                ..Default::default()
            },
            lived_experiences: vec!["moved abroad".to_string()],
            habits: vec!["journals daily".to_string()],
            hobbies: vec!["baking bread".to_string()],
            interpersonal_skills: InterpersonalSkills {
                empathy: 0.9,
                ..Default::default()
            },
            exceptional_circumstances: vec!["dyslexia".to_string()],
            topics: vec![Topic {
                topic: "climbing".to_string(),
                level: 0.5,
                emoji: "⛰️".to_string(),
            }],
        },
        ProfileFeatures {
            summary: "Curious climber".to_string(),
            bio: "I climb and bake.".to_string(),
            subtitle: "Chalk and crumbs".to_string(),
            looking_for: "Friends for weekend crags".to_string(),
            tags: vec![Tag { tag: "outdoorsy".to_string(), emoji: "🌲".to_string() }],
            key_questions: vec!["How do I train finger strength?".to_string()],
        },
    )
}

pub fn profiled_user(id: &str, name: &str, summary: &str) -> ProfiledUser {
    let mut profile = sample_profile();
    profile.features.summary = summary.to_string();
    ProfiledUser {
        id: id.to_string(),
        name: name.to_string(),
        avatar: None,
        profile,
    }
}
