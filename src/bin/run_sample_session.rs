// Scripted end-to-end driver: runs the built-in sample questions against the
// engine with whatever scoring capability the environment provides (set
// OPENAI_API_KEY for genuine scores; without it every answer gets the
// fallback sentinel) and prints the final report as JSON.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use log::{debug, info};

use mocksim::{
    format_clock, sample_questions, spawn_session, EngineConfig, EngineEvent, OpenAiScorer,
};

const CANNED_ANSWERS: [&str; 4] = [
    "I have spent six years building backend services, most recently leading a small team.",
    "We inherited a flaky data pipeline; I added replayable checkpoints and cut failures by 90%.",
    "I triage ruthlessly, communicate early when a deadline is at risk, and protect focus time.",
    "I am strongest at debugging production systems and mentoring newer engineers.",
];

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    env_logger::init();

    let config = EngineConfig::from_env();

    // shrink the budgets so the scripted run finishes in under a minute
    let mut questions = sample_questions();
    for question in &mut questions {
        question.time_limit_seconds = 6;
    }

    let (session, mut events) =
        spawn_session(questions, Arc::new(OpenAiScorer::from_env()), config)?;
    session.start().await?;

    // answer the first four questions, then let the last one run out of time
    let driver = session.clone();
    tokio::spawn(async move {
        for answer in CANNED_ANSWERS {
            tokio::time::sleep(Duration::from_secs(2)).await;
            if driver.submit_or_advance(answer).await.is_err() {
                break;
            }
        }
    });

    while let Some(event) = events.recv().await {
        match event {
            EngineEvent::QuestionChanged { index, question } => {
                info!("Question {}: {}", index + 1, question.text);
            }
            EngineEvent::TimerTick { remaining_seconds } => {
                debug!("Time remaining: {}", format_clock(remaining_seconds));
            }
            EngineEvent::SessionCompleted { report } => {
                println!("{}", serde_json::to_string_pretty(&report)?);
                break;
            }
        }
    }

    Ok(())
}
