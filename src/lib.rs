pub mod config;
pub mod corpus;
pub mod db;
pub mod error;
pub mod facets;
pub mod fanout;
pub mod features;
pub mod freshness;
pub mod inference;
pub mod logging;
pub mod matching;
pub mod models;
pub mod profile;
pub mod prompts;
pub mod structured;

#[cfg(test)]
mod testing;

use std::sync::Arc;
use uuid::Uuid;

pub use config::{AppConfig, PipelineConfig, SERVICE_BOT_ID};
pub use db::{SqliteStore, Store};
pub use error::{Error, PipelineError, Result};
pub use inference::{InferenceBackend, InferenceClient, WebSocketBackend};
pub use models::{FinalProfile, Match, Message, ProfiledUser, UserRecord};

use matching::MatchPipeline;
use profile::ProfilePipeline;

/// How many messages each direction contributes to a conversation view.
const CONVERSATION_PAGE: usize = 50;

/// User-facing operations: profiles on read, matches on demand, messaging.
pub struct Matchmaker<S: Store> {
    store: S,
    profiles: ProfilePipeline,
    matcher: MatchPipeline,
    config: Arc<PipelineConfig>,
}

impl<S: Store> Matchmaker<S> {
    pub fn new(store: S, inference: InferenceClient, config: PipelineConfig) -> Self {
        let config = Arc::new(config);
        Self {
            store,
            profiles: ProfilePipeline::new(inference.clone(), Arc::clone(&config)),
            matcher: MatchPipeline::new(inference, Arc::clone(&config)),
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    // ============ Users ============

    pub fn register_user(&self, name: &str, avatar: Option<&str>) -> Result<UserRecord> {
        let id = Uuid::new_v4().to_string();
        Ok(self.store.create_user(&id, name, avatar)?)
    }

    /// Read a user with an up-to-date profile, rebuilding it inline when the
    /// stored one is stale. A failed rebuild leaves the stored profile as it was.
    pub async fn user(&self, id: &str) -> Result<ProfiledUser> {
        let record = self.store.get_user(id)?;

        if !freshness::needs_regeneration(&record, self.config.freshness_threshold) {
            if let Some(profile) = decode_profile(&record)? {
                return Ok(profiled(record, profile));
            }
        }

        logging::log_profile(Some(id), "Stored profile is stale, regenerating");

        let limit = self.config.corpus_limit;
        let mut questions: Vec<String> = self
            .store
            .recent_messages(id, SERVICE_BOT_ID, limit)?
            .into_iter()
            .map(|m| m.message)
            .collect();
        questions.reverse();

        let mut messages = self.store.recent_messages_all_conversations(id, limit)?;
        messages.reverse();
        let partitions = corpus::partition_conversations(id, &messages);

        let question_corpus = corpus::question_corpus(&questions).map_err(PipelineError::from)?;
        let conversation_corpus = corpus::conversation_corpus(&partitions).map_err(PipelineError::from)?;

        let profile = match self
            .profiles
            .generate(id, &question_corpus, conversation_corpus.as_deref())
            .await
        {
            Ok(profile) => profile,
            Err(e) => {
                logging::log_error(Some(id), &format!("Profile generation failed: {}", e));
                return Err(e.into());
            }
        };

        let data = serde_json::to_string(&profile).map_err(PipelineError::from)?;
        self.store.update_user_profile(id, &data)?;

        Ok(profiled(record, profile))
    }

    // ============ Matches ============

    /// Find, explain and persist a new match for `id`.
    pub async fn generate_match(&self, id: &str) -> Result<Match> {
        let target = self.user(id).await?;

        let pool: Vec<ProfiledUser> = self
            .store
            .non_matched_users(id)?
            .into_iter()
            .filter_map(|record| match decode_profile(&record) {
                Ok(Some(profile)) => Some(profiled(record, profile)),
                Ok(None) => None,
                Err(e) => {
                    logging::log_error(Some(&record.id), &format!("Skipping pool member: {}", e));
                    None
                }
            })
            .collect();

        let outcome = match self.matcher.run(&target, &pool).await {
            Ok(outcome) => outcome,
            Err(e) => {
                logging::log_error(Some(id), &format!("Match generation failed: {}", e));
                return Err(e.into());
            }
        };

        Ok(self.store.create_match(
            id,
            &outcome.match_id,
            &outcome.user_reason,
            &outcome.match_reason,
        )?)
    }

    pub fn matches(&self, id: &str) -> Result<Vec<Match>> {
        Ok(self.store.user_matches(id)?)
    }

    // ============ Messages ============

    /// Store a message and mark both participants as active, which makes
    /// their profiles stale.
    pub fn send_message(&self, sender_id: &str, receiver_id: &str, text: &str) -> Result<Message> {
        self.store.get_user(sender_id)?;
        if receiver_id != SERVICE_BOT_ID {
            self.store.get_user(receiver_id)?;
        }

        let message = self.store.create_message(sender_id, receiver_id, text)?;

        self.store.mark_user_updated(sender_id)?;
        if receiver_id != SERVICE_BOT_ID {
            self.store.mark_user_updated(receiver_id)?;
        }
        Ok(message)
    }

    /// Both directions of a conversation, newest first.
    pub fn conversation(&self, a: &str, b: &str) -> Result<Vec<Message>> {
        let mut messages = self.store.recent_messages(a, b, CONVERSATION_PAGE)?;
        messages.extend(self.store.recent_messages(b, a, CONVERSATION_PAGE)?);
        messages.sort_by(|x, y| y.created_at.cmp(&x.created_at));
        Ok(messages)
    }
}

fn decode_profile(record: &UserRecord) -> Result<Option<FinalProfile>> {
    record
        .profile
        .as_deref()
        .map(|data| {
            serde_json::from_str(data).map_err(|source| Error::CorruptProfile {
                user_id: record.id.clone(),
                source,
            })
        })
        .transpose()
}

fn profiled(record: UserRecord, profile: FinalProfile) -> ProfiledUser {
    ProfiledUser {
        id: record.id,
        name: record.name,
        avatar: record.avatar,
        profile,
    }
}
