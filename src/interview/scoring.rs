use std::env;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::Client;
use serde_json::Value;
use tokio::time::timeout;

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use super::answers::{Evaluation, EvaluationStore, Response};
use super::questions::Question;

const OPENAI_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

/// Raw score produced by an external evaluation capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScorePayload {
    pub score: u8,
    pub feedback: String,
}

/// The external evaluation capability. Implementations may take arbitrarily
/// long; the pipeline bounds the wait and substitutes the fallback sentinel.
#[async_trait]
pub trait ScoreSource: Send + Sync {
    async fn evaluate(&self, question: &Question, response: &Response) -> Result<ScorePayload>;
}

/// Scores responses through the OpenAI chat completions API. Without an API
/// key every evaluation reports the capability as unavailable, which the
/// pipeline converts into fallback sentinels, so the engine keeps working.
pub struct OpenAiScorer {
    client: Client,
    api_key: Option<String>,
    endpoint: String,
}

impl OpenAiScorer {
    pub fn new(api_key: Option<String>) -> Self {
        if api_key.is_none() {
            warn!("OpenAI API key not found - responses will receive fallback scores");
        }
        Self {
            client: Client::new(),
            api_key,
            endpoint: OPENAI_ENDPOINT.to_string(),
        }
    }

    pub fn from_env() -> Self {
        Self::new(env::var("OPENAI_API_KEY").ok())
    }

    #[cfg(test)]
    fn with_endpoint(api_key: Option<String>, endpoint: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            endpoint,
        }
    }

    fn build_prompt(question: &Question, response: &Response) -> String {
        format!(
            "Analyze this interview response and provide feedback in JSON format:\n\n\
             Question: {}\n\
             Response: {}\n\
             Response Time: {} seconds\n\n\
             Return only a JSON object with:\n\
             {{\"score\": number (0-100), \"feedback\": \"detailed feedback on the response \
             including strengths and areas for improvement\"}}",
            question.text, response.text, response.elapsed_seconds
        )
    }

    fn parse_payload(content: &str) -> Result<ScorePayload> {
        let value: Value = serde_json::from_str(content.trim())
            .map_err(|e| EngineError::MalformedScoringOutput(format!("not valid JSON: {}", e)))?;
        let score = value["score"]
            .as_u64()
            .ok_or_else(|| EngineError::MalformedScoringOutput("missing score field".into()))?;
        let feedback = value["feedback"]
            .as_str()
            .ok_or_else(|| EngineError::MalformedScoringOutput("missing feedback field".into()))?;
        Ok(ScorePayload {
            score: score.min(100) as u8,
            feedback: feedback.to_string(),
        })
    }
}

#[async_trait]
impl ScoreSource for OpenAiScorer {
    async fn evaluate(&self, question: &Question, response: &Response) -> Result<ScorePayload> {
        let api_key = self.api_key.as_ref().ok_or_else(|| {
            EngineError::ScoringUnavailable("no API key configured".to_string())
        })?;

        let request_body = serde_json::json!({
            "model": "gpt-4",
            "messages": [
                {
                    "role": "user",
                    "content": Self::build_prompt(question, response)
                }
            ],
            "max_tokens": 200,
            "temperature": 0.2
        });

        let http_response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", api_key))
            .json(&request_body)
            .send()
            .await
            .map_err(|e| EngineError::ScoringUnavailable(format!("request failed: {}", e)))?;

        if !http_response.status().is_success() {
            return Err(EngineError::ScoringUnavailable(format!(
                "API error: {}",
                http_response.status()
            )));
        }

        let body: Value = http_response
            .json()
            .await
            .map_err(|e| EngineError::MalformedScoringOutput(format!("response body: {}", e)))?;

        let content = body["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| {
                EngineError::MalformedScoringOutput("no content in completion".into())
            })?;

        Self::parse_payload(content)
    }
}

/// Dispatches (question, response) pairs for evaluation without blocking the
/// session loop. Exactly one evaluation lands in the store per response, a
/// genuine one or the fallback sentinel, keyed by question id regardless of
/// completion order.
#[derive(Clone)]
pub struct ScoringPipeline {
    source: Arc<dyn ScoreSource>,
    store: EvaluationStore,
    scoring_timeout: Duration,
    fallback_score: u8,
}

impl ScoringPipeline {
    pub fn new(source: Arc<dyn ScoreSource>, store: EvaluationStore, config: &EngineConfig) -> Self {
        Self {
            source,
            store,
            scoring_timeout: config.scoring_timeout,
            fallback_score: config.fallback_score,
        }
    }

    pub fn store(&self) -> &EvaluationStore {
        &self.store
    }

    /// Fire-and-forget from the caller's perspective.
    pub fn dispatch(&self, question: Question, response: Response) {
        let source = self.source.clone();
        let store = self.store.clone();
        let wait = self.scoring_timeout;
        let fallback_score = self.fallback_score;

        tokio::spawn(async move {
            let question_id = response.question_id;
            let evaluation = match timeout(wait, source.evaluate(&question, &response)).await {
                Ok(Ok(payload)) => {
                    info!("Question {} scored {}/100", question_id, payload.score);
                    Evaluation {
                        question_id,
                        score: payload.score.min(100),
                        feedback: payload.feedback,
                    }
                }
                Ok(Err(e)) => {
                    warn!(
                        "Scoring failed for question {}: {} - recording fallback",
                        question_id, e
                    );
                    Evaluation::fallback(question_id, fallback_score)
                }
                Err(_) => {
                    warn!(
                        "Scoring timed out for question {} after {:?} - recording fallback",
                        question_id, wait
                    );
                    Evaluation::fallback(question_id, fallback_score)
                }
            };
            if store.record(evaluation) {
                debug!("Evaluation stored for question {}", question_id);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FALLBACK_FEEDBACK, FALLBACK_SCORE};
    use super::super::questions::{QuestionCategory, QuestionDifficulty};
    use tokio::time::sleep;

    fn question(id: u32) -> Question {
        Question {
            id,
            text: format!("question {}", id),
            category: QuestionCategory::Behavioral,
            difficulty: QuestionDifficulty::Easy,
            time_limit_seconds: 60,
        }
    }

    fn response(question_id: u32) -> Response {
        Response {
            question_id,
            text: "a thoughtful answer".to_string(),
            elapsed_seconds: 12,
        }
    }

    fn test_config() -> EngineConfig {
        EngineConfig {
            scoring_timeout: Duration::from_millis(100),
            ..EngineConfig::default()
        }
    }

    struct CannedScorer {
        score: u8,
        delay: Duration,
    }

    #[async_trait]
    impl ScoreSource for CannedScorer {
        async fn evaluate(&self, _: &Question, response: &Response) -> Result<ScorePayload> {
            sleep(self.delay).await;
            Ok(ScorePayload {
                score: self.score,
                feedback: format!("scored question {}", response.question_id),
            })
        }
    }

    struct FailingScorer;

    #[async_trait]
    impl ScoreSource for FailingScorer {
        async fn evaluate(&self, _: &Question, _: &Response) -> Result<ScorePayload> {
            Err(EngineError::MalformedScoringOutput("garbage".into()))
        }
    }

    #[test]
    fn parse_accepts_well_formed_content() {
        let payload =
            OpenAiScorer::parse_payload(r#"{"score": 88, "feedback": "solid answer"}"#).unwrap();
        assert_eq!(payload.score, 88);
        assert_eq!(payload.feedback, "solid answer");
    }

    #[test]
    fn parse_clamps_out_of_range_scores() {
        let payload =
            OpenAiScorer::parse_payload(r#"{"score": 400, "feedback": "x"}"#).unwrap();
        assert_eq!(payload.score, 100);
    }

    #[test]
    fn parse_rejects_non_json_and_missing_fields() {
        assert!(matches!(
            OpenAiScorer::parse_payload("I think the answer was great!"),
            Err(EngineError::MalformedScoringOutput(_))
        ));
        assert!(matches!(
            OpenAiScorer::parse_payload(r#"{"feedback": "no score"}"#),
            Err(EngineError::MalformedScoringOutput(_))
        ));
        assert!(matches!(
            OpenAiScorer::parse_payload(r#"{"score": 50}"#),
            Err(EngineError::MalformedScoringOutput(_))
        ));
    }

    #[tokio::test]
    async fn scorer_without_key_reports_unavailable() {
        let scorer = OpenAiScorer::new(None);
        let result = scorer.evaluate(&question(1), &response(1)).await;
        assert!(matches!(result, Err(EngineError::ScoringUnavailable(_))));
    }

    #[tokio::test]
    async fn unreachable_endpoint_reports_unavailable() {
        // nothing listens on this port
        let scorer = OpenAiScorer::with_endpoint(
            Some("test-key".to_string()),
            "http://127.0.0.1:9/v1/chat/completions".to_string(),
        );
        let result = scorer.evaluate(&question(1), &response(1)).await;
        assert!(matches!(result, Err(EngineError::ScoringUnavailable(_))));
    }

    #[tokio::test]
    async fn dispatch_records_genuine_scores() {
        let store = EvaluationStore::new();
        let source = Arc::new(CannedScorer {
            score: 90,
            delay: Duration::ZERO,
        });
        let pipeline = ScoringPipeline::new(source, store.clone(), &test_config());
        pipeline.dispatch(question(1), response(1));
        store.wait_for_all(&[1], Duration::from_secs(2)).await;
        assert_eq!(store.get(1).map(|e| e.score), Some(90));
    }

    #[tokio::test]
    async fn dispatch_falls_back_on_failure() {
        let store = EvaluationStore::new();
        let pipeline =
            ScoringPipeline::new(Arc::new(FailingScorer), store.clone(), &test_config());
        pipeline.dispatch(question(2), response(2));
        store.wait_for_all(&[2], Duration::from_secs(2)).await;
        let evaluation = store.get(2).expect("fallback recorded");
        assert_eq!(evaluation.score, FALLBACK_SCORE);
        assert_eq!(evaluation.feedback, FALLBACK_FEEDBACK);
    }

    #[tokio::test]
    async fn dispatch_falls_back_on_timeout() {
        let store = EvaluationStore::new();
        let source = Arc::new(CannedScorer {
            score: 95,
            delay: Duration::from_secs(30), // far beyond the 100ms budget
        });
        let pipeline = ScoringPipeline::new(source, store.clone(), &test_config());
        pipeline.dispatch(question(3), response(3));
        store.wait_for_all(&[3], Duration::from_secs(2)).await;
        assert_eq!(store.get(3).map(|e| e.score), Some(FALLBACK_SCORE));
    }

    #[tokio::test]
    async fn out_of_order_completions_keep_their_question_ids() {
        let store = EvaluationStore::new();
        let config = EngineConfig {
            scoring_timeout: Duration::from_secs(2),
            ..EngineConfig::default()
        };
        let slow = ScoringPipeline::new(
            Arc::new(CannedScorer {
                score: 10,
                delay: Duration::from_millis(80),
            }),
            store.clone(),
            &config,
        );
        let fast = ScoringPipeline::new(
            Arc::new(CannedScorer {
                score: 20,
                delay: Duration::ZERO,
            }),
            store.clone(),
            &config,
        );
        slow.dispatch(question(1), response(1));
        fast.dispatch(question(2), response(2));
        store.wait_for_all(&[1, 2], Duration::from_secs(2)).await;
        assert_eq!(store.get(1).map(|e| e.score), Some(10));
        assert_eq!(store.get(2).map(|e| e.score), Some(20));
    }
}
