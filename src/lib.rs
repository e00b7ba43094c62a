// Timed mock-interview session engine. Questions run one at a time under a
// hard time budget; each captured response is dispatched for asynchronous AI
// scoring while the session moves on, and a final report is aggregated once
// the session completes. The presentation layer drives it through
// SessionHandle commands and consumes EngineEvent notifications; nothing here
// renders or persists anything.

pub mod config;
pub mod error;
pub mod interview;

pub use config::{EngineConfig, FALLBACK_FEEDBACK, FALLBACK_SCORE};
pub use error::{EngineError, Result};
pub use interview::engine::{spawn_session, EngineEvent, SessionHandle, SessionStatus};
pub use interview::answers::{Evaluation, Response};
pub use interview::questions::{sample_questions, Question, QuestionCategory, QuestionDifficulty};
pub use interview::report::{Report, QuestionResult};
pub use interview::scoring::{OpenAiScorer, ScorePayload, ScoreSource};
pub use interview::timer::format_clock;
