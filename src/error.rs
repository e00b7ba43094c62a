use thiserror::Error;

use crate::interview::engine::SessionStatus;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("{command} is not allowed while the session is {status:?}")]
    InvalidState {
        command: &'static str,
        status: SessionStatus,
    },
    #[error("Scoring capability unavailable: {0}")]
    ScoringUnavailable(String),
    #[error("Malformed scoring output: {0}")]
    MalformedScoringOutput(String),
    #[error("Invalid question sequence: {0}")]
    InvalidQuestionSequence(String),
    #[error("Session engine is no longer running")]
    EngineGone,
}

pub type Result<T> = std::result::Result<T, EngineError>;
