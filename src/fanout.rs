//! Bounded fan-out with a fail-fast join.
//!
//! One tokio task per unit of work; each task takes a limiter permit before it
//! starts. The join returns when every task succeeded, on the first failure,
//! or when the stage deadline passes. In the latter two cases every
//! outstanding task is aborted. Aborting drops the task's future at its next
//! await point, which closes an in-flight socket; code already running
//! between awaits finishes that stretch first.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::error::PipelineError;
use crate::logging;

pub struct FanOut {
    stage: &'static str,
    limiter: Arc<Semaphore>,
    deadline: Duration,
}

impl FanOut {
    pub fn new(stage: &'static str, concurrency_limit: usize, deadline: Duration) -> Self {
        Self {
            stage,
            limiter: Arc::new(Semaphore::new(concurrency_limit.max(1))),
            deadline,
        }
    }

    /// Run every `(key, task)` pair and collect `(key, value)` in completion
    /// order.
    pub async fn join_all<K, T, F>(&self, tasks: Vec<(K, F)>) -> Result<Vec<(K, T)>, PipelineError>
    where
        K: Send + 'static,
        T: Send + 'static,
        F: Future<Output = Result<T, PipelineError>> + Send + 'static,
    {
        let expires = tokio::time::Instant::now() + self.deadline;
        let mut set = JoinSet::new();

        for (key, task) in tasks {
            let limiter = Arc::clone(&self.limiter);
            set.spawn(async move {
                let _permit = limiter
                    .acquire_owned()
                    .await
                    .map_err(|e| PipelineError::TaskFailed(e.to_string()))?;
                task.await.map(|value| (key, value))
            });
        }

        let mut results = Vec::with_capacity(set.len());
        loop {
            match tokio::time::timeout_at(expires, set.join_next()).await {
                Err(_) => {
                    set.abort_all();
                    logging::log_error(None, &format!(
                        "Stage {} hit its {:?} deadline; cancelled {} tasks",
                        self.stage, self.deadline, set.len()
                    ));
                    return Err(PipelineError::DeadlineExceeded {
                        stage: self.stage,
                        after: self.deadline,
                    });
                }
                Ok(None) => break,
                Ok(Some(Ok(Ok(pair)))) => results.push(pair),
                Ok(Some(Ok(Err(e)))) => {
                    set.abort_all();
                    logging::log_error(None, &format!("Stage {} failed fast: {}", self.stage, e));
                    return Err(e);
                }
                Ok(Some(Err(join_error))) => {
                    set.abort_all();
                    return Err(PipelineError::TaskFailed(join_error.to_string()));
                }
            }
        }

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GenerationError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    type BoxedTask = std::pin::Pin<Box<dyn Future<Output = Result<u32, PipelineError>> + Send>>;

    fn task<F>(f: F) -> BoxedTask
    where
        F: Future<Output = Result<u32, PipelineError>> + Send + 'static,
    {
        Box::pin(f)
    }

    fn failure(facet: &str) -> PipelineError {
        PipelineError::FacetGeneration {
            facet: facet.to_string(),
            source: GenerationError::EmptyResult(facet.to_string()),
        }
    }

    #[tokio::test]
    async fn collects_every_result() {
        let fanout = FanOut::new("test", 4, Duration::from_secs(5));
        let tasks: Vec<(u32, BoxedTask)> = (0..6)
            .map(|i| (i, task(async move { Ok(i * 10) })))
            .collect();

        let mut results = fanout.join_all(tasks).await.unwrap();
        results.sort();
        assert_eq!(results, (0..6).map(|i| (i, i * 10)).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn one_failure_fails_the_stage_and_cancels_the_rest() {
        let finished = Arc::new(AtomicUsize::new(0));
        let fanout = FanOut::new("test", 4, Duration::from_secs(30));

        let mut tasks: Vec<(u32, BoxedTask)> = Vec::new();
        for i in 0..3 {
            let finished = Arc::clone(&finished);
            tasks.push((i, task(async move {
                tokio::time::sleep(Duration::from_secs(10)).await;
                finished.fetch_add(1, Ordering::SeqCst);
                Ok(i)
            })));
        }
        tasks.push((3, task(async { Err(failure("habits")) })));

        let started = Instant::now();
        let err = fanout.join_all(tasks).await.unwrap_err();
        assert!(matches!(err, PipelineError::FacetGeneration { ref facet, .. } if facet == "habits"));
        assert!(started.elapsed() < Duration::from_secs(5));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn deadline_cancels_the_stage() {
        let fanout = FanOut::new("slow", 2, Duration::from_millis(50));
        let tasks: Vec<(u32, BoxedTask)> = vec![
            (0, task(async { Ok(0) })),
            (1, task(async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(1)
            })),
        ];

        let err = fanout.join_all(tasks).await.unwrap_err();
        assert!(matches!(err, PipelineError::DeadlineExceeded { stage: "slow", .. }));
    }

    #[tokio::test]
    async fn concurrency_never_exceeds_the_limit() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let fanout = FanOut::new("capped", 2, Duration::from_secs(5));

        let tasks: Vec<(u32, BoxedTask)> = (0..8)
            .map(|i| {
                let in_flight = Arc::clone(&in_flight);
                let peak = Arc::clone(&peak);
                (i, task(async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    Ok(i)
                }))
            })
            .collect();

        assert_eq!(fanout.join_all(tasks).await.unwrap().len(), 8);
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn empty_stage_succeeds() {
        let fanout = FanOut::new("empty", 4, Duration::from_secs(1));
        let tasks: Vec<(u32, BoxedTask)> = Vec::new();
        assert!(fanout.join_all(tasks).await.unwrap().is_empty());
    }
}
