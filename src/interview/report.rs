use std::time::Duration;

use chrono::{DateTime, Utc};
use log::info;
use serde::{Serialize, Deserialize};
use uuid::Uuid;

use super::answers::{Evaluation, EvaluationStore, Response};

/// Per-question breakdown embedded in the final report.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuestionResult {
    pub question_id: u32,
    pub response: String,
    pub elapsed_seconds: u64,
    pub score: u8,
    pub feedback: String,
}

/// Final session report. Field names are the export compatibility contract;
/// a report serialized to JSON and re-parsed yields identical values.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub session_id: Uuid,
    pub overall_score: f64,
    pub total_time_minutes: f64,
    pub questions_answered: usize,
    pub total_questions: usize,
    pub recommendations: Vec<String>,
    pub question_results: Vec<QuestionResult>,
    pub completed_at: DateTime<Utc>,
}

/// Fold the recorded responses and whatever evaluations are available into a
/// report. Waits up to `grace` for outstanding evaluations, then substitutes
/// the fallback sentinel for anything still missing so every response is
/// accounted for.
pub(crate) async fn aggregate(
    session_id: Uuid,
    total_questions: usize,
    responses: &[Response],
    store: &EvaluationStore,
    fallback_score: u8,
    grace: Duration,
    started_at: DateTime<Utc>,
) -> Report {
    let question_ids: Vec<u32> = responses.iter().map(|r| r.question_id).collect();
    store.wait_for_all(&question_ids, grace).await;

    let still_missing = question_ids
        .iter()
        .filter(|id| store.get(**id).is_none())
        .count();
    if still_missing > 0 {
        info!(
            "{} evaluation(s) still pending after {:?} grace - substituting fallbacks",
            still_missing, grace
        );
    }

    build_report(
        session_id,
        total_questions,
        responses,
        store,
        fallback_score,
        started_at,
        Utc::now(),
    )
}

fn build_report(
    session_id: Uuid,
    total_questions: usize,
    responses: &[Response],
    store: &EvaluationStore,
    fallback_score: u8,
    started_at: DateTime<Utc>,
    completed_at: DateTime<Utc>,
) -> Report {
    let mut question_results = Vec::with_capacity(responses.len());
    let mut score_sum: u64 = 0;
    for response in responses {
        let evaluation = store
            .get(response.question_id)
            .unwrap_or_else(|| Evaluation::fallback(response.question_id, fallback_score));
        score_sum += u64::from(evaluation.score);
        question_results.push(QuestionResult {
            question_id: response.question_id,
            response: response.text.clone(),
            elapsed_seconds: response.elapsed_seconds,
            score: evaluation.score,
            feedback: evaluation.feedback,
        });
    }

    // zero answered questions is a legitimate outcome, not a division
    let overall_score = if question_results.is_empty() {
        0.0
    } else {
        score_sum as f64 / question_results.len() as f64
    };

    let elapsed_ms = (completed_at - started_at).num_milliseconds().max(0);
    let total_time_minutes = elapsed_ms as f64 / 60_000.0;

    Report {
        session_id,
        overall_score,
        total_time_minutes,
        questions_answered: question_results.len(),
        total_questions,
        recommendations: recommendations_for(overall_score),
        question_results,
        completed_at,
    }
}

/// Fixed recommendation tiers keyed by overall score. Deterministic: the same
/// score always selects the same tier.
pub fn recommendations_for(overall_score: f64) -> Vec<String> {
    let tier: &[&str] = if overall_score >= 85.0 {
        &[
            "Excellent performance! You demonstrated strong communication skills.",
            "Continue practicing to maintain this high level of performance.",
            "Consider focusing on advanced technical questions for senior roles.",
        ]
    } else if overall_score >= 70.0 {
        &[
            "Good performance with room for improvement.",
            "Practice providing more specific examples in your responses.",
            "Work on structuring your answers using the STAR method.",
        ]
    } else {
        &[
            "Focus on improving your response structure and clarity.",
            "Practice common interview questions more frequently.",
            "Consider working with a mentor or career coach.",
        ]
    };
    tier.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FALLBACK_FEEDBACK, FALLBACK_SCORE};

    fn response(question_id: u32, elapsed_seconds: u64) -> Response {
        Response {
            question_id,
            text: format!("answer {}", question_id),
            elapsed_seconds,
        }
    }

    fn scored(store: &EvaluationStore, question_id: u32, score: u8) {
        store.record(Evaluation {
            question_id,
            score,
            feedback: "ok".to_string(),
        });
    }

    #[test]
    fn empty_session_reports_zero_without_dividing() {
        let store = EvaluationStore::new();
        let report = build_report(
            Uuid::new_v4(),
            3,
            &[],
            &store,
            FALLBACK_SCORE,
            Utc::now(),
            Utc::now(),
        );
        assert_eq!(report.overall_score, 0.0);
        assert_eq!(report.questions_answered, 0);
        assert_eq!(report.total_questions, 3);
        assert!(report.question_results.is_empty());
        assert_eq!(report.recommendations.len(), 3);
    }

    #[test]
    fn mean_over_recorded_evaluations() {
        let store = EvaluationStore::new();
        scored(&store, 1, 80);
        scored(&store, 2, 90);
        let report = build_report(
            Uuid::new_v4(),
            2,
            &[response(1, 30), response(2, 45)],
            &store,
            FALLBACK_SCORE,
            Utc::now(),
            Utc::now(),
        );
        assert_eq!(report.overall_score, 85.0);
        assert_eq!(report.questions_answered, 2);
    }

    #[test]
    fn missing_evaluations_become_sentinels() {
        let store = EvaluationStore::new();
        scored(&store, 1, 40);
        let report = build_report(
            Uuid::new_v4(),
            2,
            &[response(1, 10), response(2, 20)],
            &store,
            FALLBACK_SCORE,
            Utc::now(),
            Utc::now(),
        );
        assert_eq!(report.question_results.len(), 2);
        let substituted = &report.question_results[1];
        assert_eq!(substituted.score, FALLBACK_SCORE);
        assert_eq!(substituted.feedback, FALLBACK_FEEDBACK);
        assert_eq!(report.overall_score, (40.0 + 75.0) / 2.0);
    }

    #[test]
    fn recommendation_tiers_are_deterministic() {
        assert!(recommendations_for(85.0)[0].starts_with("Excellent"));
        assert!(recommendations_for(84.9)[0].starts_with("Good"));
        assert!(recommendations_for(70.0)[0].starts_with("Good"));
        assert!(recommendations_for(69.9)[0].starts_with("Focus"));
        assert_eq!(recommendations_for(90.0), recommendations_for(99.0));
    }

    #[test]
    fn report_round_trips_through_json() {
        let store = EvaluationStore::new();
        scored(&store, 1, 88);
        let report = build_report(
            Uuid::new_v4(),
            1,
            &[response(1, 55)],
            &store,
            FALLBACK_SCORE,
            Utc::now(),
            Utc::now(),
        );
        let json = serde_json::to_string(&report).expect("serialize");
        let parsed: Report = serde_json::from_str(&json).expect("parse");
        assert_eq!(parsed, report);
        // contract field names are stable
        assert!(json.contains("\"overallScore\""));
        assert!(json.contains("\"totalTimeMinutes\""));
        assert!(json.contains("\"questionsAnswered\""));
        assert!(json.contains("\"totalQuestions\""));
        assert!(json.contains("\"recommendations\""));
    }

    #[tokio::test]
    async fn aggregate_waits_for_late_evaluations() {
        let store = EvaluationStore::new();
        let writer = store.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(40)).await;
            scored(&writer, 1, 100);
        });
        let report = aggregate(
            Uuid::new_v4(),
            1,
            &[response(1, 5)],
            &store,
            FALLBACK_SCORE,
            Duration::from_secs(2),
            Utc::now(),
        )
        .await;
        assert_eq!(report.overall_score, 100.0);
    }
}
