use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use log::warn;
use parking_lot::Mutex;
use serde::{Serialize, Deserialize};
use tokio::sync::Notify;
use tokio::time::{timeout_at, Instant};

use crate::config::FALLBACK_FEEDBACK;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Response {
    pub question_id: u32,
    pub text: String,
    pub elapsed_seconds: u64, // never exceeds the question's time limit
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Evaluation {
    pub question_id: u32,
    pub score: u8, // 0-100
    pub feedback: String,
}

impl Evaluation {
    /// Sentinel recorded when the scoring capability fails, times out or
    /// returns output that cannot be used.
    pub fn fallback(question_id: u32, score: u8) -> Self {
        Self {
            question_id,
            score,
            feedback: FALLBACK_FEEDBACK.to_string(),
        }
    }
}

/// Append-only store of evaluations keyed by question id. Concurrent scoring
/// completions write into it; the first evaluation recorded for a question
/// wins and later ones are ignored.
#[derive(Clone, Default)]
pub struct EvaluationStore {
    inner: Arc<StoreInner>,
}

#[derive(Default)]
struct StoreInner {
    evaluations: Mutex<HashMap<u32, Evaluation>>,
    arrival: Notify,
}

impl EvaluationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an evaluation. Returns false if the question already has one.
    pub fn record(&self, evaluation: Evaluation) -> bool {
        let question_id = evaluation.question_id;
        let inserted = {
            let mut evaluations = self.inner.evaluations.lock();
            match evaluations.entry(question_id) {
                Entry::Vacant(slot) => {
                    slot.insert(evaluation);
                    true
                }
                Entry::Occupied(_) => false,
            }
        };
        if inserted {
            self.inner.arrival.notify_waiters();
        } else {
            warn!("Duplicate evaluation for question {} ignored", question_id);
        }
        inserted
    }

    pub fn get(&self, question_id: u32) -> Option<Evaluation> {
        self.inner.evaluations.lock().get(&question_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.evaluations.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Block until every listed question has an evaluation or the grace
    /// period lapses, whichever comes first.
    pub async fn wait_for_all(&self, question_ids: &[u32], grace: Duration) {
        let deadline = Instant::now() + grace;
        loop {
            // register interest before checking, so an arrival between the
            // check and the await still wakes us
            let arrival = self.inner.arrival.notified();
            {
                let evaluations = self.inner.evaluations.lock();
                if question_ids.iter().all(|id| evaluations.contains_key(id)) {
                    return;
                }
            }
            if timeout_at(deadline, arrival).await.is_err() {
                return; // grace period exhausted
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FALLBACK_SCORE;

    fn evaluation(question_id: u32, score: u8) -> Evaluation {
        Evaluation {
            question_id,
            score,
            feedback: format!("feedback for {}", question_id),
        }
    }

    #[test]
    fn first_evaluation_wins() {
        let store = EvaluationStore::new();
        assert!(store.record(evaluation(1, 80)));
        assert!(!store.record(evaluation(1, 20)));
        assert_eq!(store.get(1).map(|e| e.score), Some(80));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn fallback_carries_advisory_feedback() {
        let sentinel = Evaluation::fallback(7, FALLBACK_SCORE);
        assert_eq!(sentinel.question_id, 7);
        assert_eq!(sentinel.score, FALLBACK_SCORE);
        assert_eq!(sentinel.feedback, FALLBACK_FEEDBACK);
    }

    #[tokio::test]
    async fn wait_returns_once_all_arrive() {
        let store = EvaluationStore::new();
        store.record(evaluation(1, 60));
        let writer = store.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            writer.record(evaluation(2, 70));
        });
        let started = Instant::now();
        store.wait_for_all(&[1, 2], Duration::from_secs(5)).await;
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn wait_gives_up_after_grace_period() {
        let store = EvaluationStore::new();
        let started = Instant::now();
        store.wait_for_all(&[1], Duration::from_millis(50)).await;
        assert!(started.elapsed() >= Duration::from_millis(50));
        assert!(store.is_empty());
    }
}
