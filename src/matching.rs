//! Match pipeline.
//!
//! `CandidatesSelected -> Explaining -> Arbitrating -> Finalizing -> Done`.
//! Any failing step aborts the attempt; nothing is persisted here.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::config::PipelineConfig;
use crate::error::{MatchStage, PipelineError};
use crate::fanout::FanOut;
use crate::inference::{InferenceClient, ModelRequest};
use crate::logging;
use crate::models::ProfiledUser;
use crate::prompts;
use crate::structured::{StructuredClient, Validate};

// ============ Response Envelopes ============

#[derive(Debug, Deserialize)]
struct CandidatesEnvelope {
    matches: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ExplanationEnvelope {
    explanation: String,
}

#[derive(Debug, Deserialize)]
struct ArbiterEnvelope {
    best_match: String,
}

impl Validate for CandidatesEnvelope {
    fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }
}

impl Validate for ExplanationEnvelope {
    fn is_empty(&self) -> bool {
        Validate::is_empty(&self.explanation)
    }
}

impl Validate for ArbiterEnvelope {
    fn is_empty(&self) -> bool {
        Validate::is_empty(&self.best_match)
    }
}

// ============ Prompt Payloads ============

#[derive(Serialize)]
struct CandidateSummary<'a> {
    id: &'a str,
    summary: &'a str,
}

#[derive(Serialize)]
struct SelectionContext<'a> {
    user: &'a ProfiledUser,
    users: Vec<CandidateSummary<'a>>,
}

#[derive(Serialize)]
struct PairContext<'a> {
    user1: &'a ProfiledUser,
    user2: &'a ProfiledUser,
}

/// Which side of the match a personal reason is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    ToUser,
    ToMatch,
}

/// A chosen match with one reason per participant.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchOutcome {
    pub match_id: String,
    /// Addressed to the target, about the match.
    pub user_reason: String,
    /// Addressed to the match, about the target.
    pub match_reason: String,
}

#[derive(Clone)]
pub struct MatchPipeline {
    client: StructuredClient,
    config: Arc<PipelineConfig>,
}

impl MatchPipeline {
    pub fn new(inference: InferenceClient, config: Arc<PipelineConfig>) -> Self {
        let client = StructuredClient::new(inference, config.retry_attempts, config.retry_backoff);
        Self { client, config }
    }

    /// Find the best match for `target` among `pool`.
    pub async fn run(&self, target: &ProfiledUser, pool: &[ProfiledUser]) -> Result<MatchOutcome, PipelineError> {
        logging::log_match(Some(&target.id), &format!("Matching against a pool of {}", pool.len()));

        if pool.is_empty() {
            return Err(PipelineError::NoCandidate { id: String::new() });
        }

        let candidates = self.select_candidates(target, pool).await?;
        self.transition(target, MatchStage::CandidatesSelected, &format!("{:?}", candidates));

        self.transition(target, MatchStage::Explaining, "");
        let explanations = self.explain_candidates(target, pool, &candidates).await?;
        if explanations.is_empty() {
            return Err(PipelineError::NoCandidate {
                id: candidates.join(","),
            });
        }

        self.transition(target, MatchStage::Arbitrating, &format!("{} explained", explanations.len()));
        let best_id = self.arbitrate(&explanations).await?;

        let best = pool
            .iter()
            .find(|u| u.id == best_id)
            .ok_or_else(|| PipelineError::NoCandidate { id: best_id.clone() })?;

        self.transition(target, MatchStage::Finalizing, &best.id);
        let (user_reason, match_reason) = self.finalize(target, best).await?;

        self.transition(target, MatchStage::Done, &best.id);
        Ok(MatchOutcome {
            match_id: best.id.clone(),
            user_reason,
            match_reason,
        })
    }

    fn transition(&self, target: &ProfiledUser, stage: MatchStage, detail: &str) {
        if detail.is_empty() {
            logging::log_match(Some(&target.id), &format!("-> {}", stage));
        } else {
            logging::log_match(Some(&target.id), &format!("-> {} ({})", stage, detail));
        }
    }

    /// Shortlist candidate ids from pool summaries. Duplicates and the
    /// target's own id are dropped; unknown ids are left for the explainer to
    /// skip.
    pub async fn select_candidates(
        &self,
        target: &ProfiledUser,
        pool: &[ProfiledUser],
    ) -> Result<Vec<String>, PipelineError> {
        let context = SelectionContext {
            user: target,
            users: pool
                .iter()
                .map(|u| CandidateSummary {
                    id: &u.id,
                    summary: u.profile.summary(),
                })
                .collect(),
        };

        let request = ModelRequest {
            label: "candidates".to_string(),
            model: self.config.match_models.candidates.clone(),
            prompt: serde_json::to_string(&context)?,
            system: prompts::candidates_prompt(self.config.candidate_count),
            temperature: None,
        };

        let envelope: CandidatesEnvelope = self
            .client
            .request(&request, true)
            .await
            .map_err(|source| PipelineError::MatchStep {
                stage: MatchStage::CandidatesSelected,
                source,
            })?;

        let mut seen = HashSet::new();
        Ok(envelope
            .matches
            .into_iter()
            .filter(|id| *id != target.id && seen.insert(id.clone()))
            .collect())
    }

    /// Explain each resolvable candidate concurrently, keyed by candidate id.
    pub async fn explain_candidates(
        &self,
        target: &ProfiledUser,
        pool: &[ProfiledUser],
        candidates: &[String],
    ) -> Result<HashMap<String, String>, PipelineError> {
        let mut tasks = Vec::new();
        for id in candidates {
            let Some(candidate) = pool.iter().find(|u| &u.id == id) else {
                logging::log_match(Some(&target.id), &format!("Skipping unknown candidate {}", id));
                continue;
            };

            let request = ModelRequest {
                label: "explanation".to_string(),
                model: self.config.match_models.explanation.clone(),
                prompt: serde_json::to_string(&PairContext {
                    user1: target,
                    user2: candidate,
                })?,
                system: prompts::EXPLANATION_PROMPT.to_string(),
                temperature: None,
            };
            let client = self.client.clone();
            tasks.push((id.clone(), async move {
                client
                    .request::<ExplanationEnvelope>(&request, true)
                    .await
                    .map(|e| e.explanation)
                    .map_err(|source| PipelineError::MatchStep {
                        stage: MatchStage::Explaining,
                        source,
                    })
            }));
        }

        let fanout = FanOut::new("explaining", self.config.concurrency_limit, self.config.stage_deadline);
        Ok(fanout.join_all(tasks).await?.into_iter().collect())
    }

    /// Ask for the single best candidate. The answer must be one of the
    /// explained ids.
    pub async fn arbitrate(&self, explanations: &HashMap<String, String>) -> Result<String, PipelineError> {
        let request = ModelRequest {
            label: "arbiter".to_string(),
            model: self.config.match_models.arbiter.clone(),
            prompt: serde_json::to_string(explanations)?,
            system: prompts::ARBITER_PROMPT.to_string(),
            temperature: None,
        };

        let envelope: ArbiterEnvelope = self
            .client
            .request(&request, true)
            .await
            .map_err(|source| PipelineError::MatchStep {
                stage: MatchStage::Arbitrating,
                source,
            })?;

        let best = envelope.best_match.trim().to_string();
        if explanations.contains_key(&best) {
            Ok(best)
        } else {
            Err(PipelineError::NoCandidate { id: best })
        }
    }

    /// Write one matchmaker message to each participant, concurrently.
    pub async fn finalize(
        &self,
        target: &ProfiledUser,
        matched: &ProfiledUser,
    ) -> Result<(String, String), PipelineError> {
        let directions = [
            (Direction::ToUser, target, matched),
            (Direction::ToMatch, matched, target),
        ];

        let mut tasks = Vec::with_capacity(directions.len());
        for (direction, recipient, counterpart) in directions {
            let request = ModelRequest {
                label: "personal_reason".to_string(),
                model: self.config.match_models.personal_reason.clone(),
                prompt: serde_json::to_string(&PairContext {
                    user1: recipient,
                    user2: counterpart,
                })?,
                system: prompts::personal_reason_prompt(&recipient.name, &counterpart.name),
                temperature: None,
            };
            let client = self.client.clone();
            tasks.push((direction, async move {
                client
                    .request::<ExplanationEnvelope>(&request, true)
                    .await
                    .map(|e| e.explanation)
                    .map_err(|source| PipelineError::MatchStep {
                        stage: MatchStage::Finalizing,
                        source,
                    })
            }));
        }

        let fanout = FanOut::new("finalizing", self.config.concurrency_limit, self.config.stage_deadline);
        let mut user_reason = String::new();
        let mut match_reason = String::new();
        for (direction, reason) in fanout.join_all(tasks).await? {
            match direction {
                Direction::ToUser => user_reason = reason,
                Direction::ToMatch => match_reason = reason,
            }
        }

        Ok((user_reason, match_reason))
    }
}
