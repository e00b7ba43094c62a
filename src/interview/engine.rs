use std::mem;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Serialize, Deserialize};
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use super::answers::{EvaluationStore, Response};
use super::questions::Question;
use super::report::{self, Report};
use super::scoring::{ScoreSource, ScoringPipeline};
use super::timer::{CountdownTimer, TimerSignal};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionStatus {
    NotStarted,
    Active,
    Completed,
}

/// One end-to-end run of the timed question sequence. Exclusively owned and
/// mutated by the engine task; everything else sees it through events.
#[derive(Debug)]
pub struct Session {
    pub session_id: Uuid,
    pub questions: Vec<Question>,
    pub responses: Vec<Response>,
    pub current_index: usize,
    pub status: SessionStatus,
    pub started_at: Option<DateTime<Utc>>,
}

impl Session {
    fn new(questions: Vec<Question>) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            questions,
            responses: Vec::new(),
            current_index: 0,
            status: SessionStatus::NotStarted,
            started_at: None,
        }
    }
}

enum SessionCommand {
    Start {
        reply: oneshot::Sender<Result<()>>,
    },
    SubmitOrAdvance {
        text: String,
        reply: oneshot::Sender<Result<()>>,
    },
    UpdateDraft {
        text: String,
        reply: oneshot::Sender<Result<()>>,
    },
    End {
        reply: oneshot::Sender<Result<()>>,
    },
}

/// Events the engine publishes for a presentation layer.
#[derive(Clone, Debug)]
pub enum EngineEvent {
    QuestionChanged { index: usize, question: Question },
    TimerTick { remaining_seconds: u64 },
    SessionCompleted { report: Report },
}

/// Command side of a running session. Cheap to clone; all commands are
/// serialized through the engine task that owns the session.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<SessionCommand>,
}

impl SessionHandle {
    /// Begin the session: arms the timer for question 0.
    pub async fn start(&self) -> Result<()> {
        self.send(|reply| SessionCommand::Start { reply }).await
    }

    /// Capture the current question's response (possibly empty) and move on.
    pub async fn submit_or_advance(&self, text: impl Into<String>) -> Result<()> {
        let text = text.into();
        self.send(|reply| SessionCommand::SubmitOrAdvance { text, reply })
            .await
    }

    /// Buffer partial response text; captured as-is if the timer expires.
    pub async fn update_draft(&self, text: impl Into<String>) -> Result<()> {
        let text = text.into();
        self.send(|reply| SessionCommand::UpdateDraft { text, reply })
            .await
    }

    /// Terminate early. No response is synthesized for the open question.
    pub async fn end(&self) -> Result<()> {
        self.send(|reply| SessionCommand::End { reply }).await
    }

    async fn send<F>(&self, command: F) -> Result<()>
    where
        F: FnOnce(oneshot::Sender<Result<()>>) -> SessionCommand,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(command(reply_tx))
            .map_err(|_| EngineError::EngineGone)?;
        reply_rx.await.map_err(|_| EngineError::EngineGone)?
    }
}

/// Spawn a session engine over the given question sequence. Returns the
/// command handle and the event stream consumed by the presentation layer.
pub fn spawn_session(
    questions: Vec<Question>,
    source: Arc<dyn ScoreSource>,
    config: EngineConfig,
) -> Result<(SessionHandle, mpsc::UnboundedReceiver<EngineEvent>)> {
    if questions.is_empty() {
        return Err(EngineError::InvalidQuestionSequence(
            "at least one question is required".to_string(),
        ));
    }
    if let Some(question) = questions.iter().find(|q| q.time_limit_seconds == 0) {
        return Err(EngineError::InvalidQuestionSequence(format!(
            "question {} has a zero time limit",
            question.id
        )));
    }

    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (timer_tx, timer_rx) = mpsc::unbounded_channel();

    let store = EvaluationStore::new();
    let pipeline = ScoringPipeline::new(source, store.clone(), &config);

    let engine = SessionEngine {
        session: Session::new(questions),
        config,
        pipeline,
        store,
        events: event_tx,
        commands: command_rx,
        timer_rx,
        timer_tx,
        timer: None,
        next_generation: 0,
        draft: String::new(),
    };
    tokio::spawn(engine.run());

    Ok((SessionHandle { commands: command_tx }, event_rx))
}

/// The single writer. All state transitions, whether they originate from
/// commands, timer expiry or early termination, funnel through this task's
/// select loop.
struct SessionEngine {
    session: Session,
    config: EngineConfig,
    pipeline: ScoringPipeline,
    store: EvaluationStore,
    events: mpsc::UnboundedSender<EngineEvent>,
    commands: mpsc::UnboundedReceiver<SessionCommand>,
    timer_rx: mpsc::UnboundedReceiver<TimerSignal>,
    timer_tx: mpsc::UnboundedSender<TimerSignal>,
    timer: Option<CountdownTimer>,
    next_generation: u64,
    draft: String,
}

impl SessionEngine {
    async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    // every handle dropped: nothing can reach the session anymore
                    None => break,
                },
                Some(signal) = self.timer_rx.recv() => {
                    self.handle_timer_signal(signal).await;
                }
            }
        }
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
        debug!("Session {} engine stopped", self.session.session_id);
    }

    async fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Start { reply } => {
                let _ = reply.send(self.handle_start());
            }
            SessionCommand::SubmitOrAdvance { text, reply } => {
                let result = self.handle_submit("submit_or_advance", Some(text)).await;
                let _ = reply.send(result);
            }
            SessionCommand::UpdateDraft { text, reply } => {
                let _ = reply.send(self.handle_update_draft(text));
            }
            SessionCommand::End { reply } => {
                let result = self.handle_end().await;
                let _ = reply.send(result);
            }
        }
    }

    fn handle_start(&mut self) -> Result<()> {
        if self.session.status != SessionStatus::NotStarted {
            return Err(EngineError::InvalidState {
                command: "start",
                status: self.session.status,
            });
        }
        self.session.status = SessionStatus::Active;
        self.session.started_at = Some(Utc::now());
        self.session.current_index = 0;
        info!(
            "🎬 Interview session {} started with {} questions",
            self.session.session_id,
            self.session.questions.len()
        );
        self.begin_question(0);
        Ok(())
    }

    fn handle_update_draft(&mut self, text: String) -> Result<()> {
        if self.session.status != SessionStatus::Active {
            return Err(EngineError::InvalidState {
                command: "update_draft",
                status: self.session.status,
            });
        }
        self.draft = text;
        Ok(())
    }

    async fn handle_end(&mut self) -> Result<()> {
        if self.session.status != SessionStatus::Active {
            return Err(EngineError::InvalidState {
                command: "end",
                status: self.session.status,
            });
        }
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
        info!(
            "⏹️ Session {} ended early on question {} of {}",
            self.session.session_id,
            self.session.current_index + 1,
            self.session.questions.len()
        );
        self.complete().await;
        Ok(())
    }

    /// Shared by explicit submits (`text` provided) and timer expiry (`None`,
    /// which captures whatever draft was buffered). Expiry is indistinguishable
    /// from a submit in terms of state transition.
    async fn handle_submit(&mut self, command: &'static str, text: Option<String>) -> Result<()> {
        if self.session.status != SessionStatus::Active {
            return Err(EngineError::InvalidState {
                command,
                status: self.session.status,
            });
        }

        let question = self.session.questions[self.session.current_index].clone();
        let remaining = self
            .timer
            .as_ref()
            .map(|t| t.remaining_seconds())
            .unwrap_or(0);
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }

        let text = match text {
            Some(text) => {
                self.draft.clear();
                text
            }
            None => mem::take(&mut self.draft),
        };
        let elapsed = question.time_limit_seconds.saturating_sub(remaining);
        let response = Response {
            question_id: question.id,
            text,
            elapsed_seconds: elapsed.min(question.time_limit_seconds),
        };
        self.session.responses.push(response.clone());
        debug!(
            "Captured response for question {} after {}s",
            question.id, response.elapsed_seconds
        );

        // fire-and-forget; the engine never awaits the evaluation
        self.pipeline.dispatch(question, response);

        let next = self.session.current_index + 1;
        self.session.current_index = next;
        if next < self.session.questions.len() {
            self.begin_question(next);
        } else {
            self.complete().await;
        }
        Ok(())
    }

    async fn handle_timer_signal(&mut self, signal: TimerSignal) {
        // signals from a cancelled countdown lose the race unconditionally
        let current = match &self.timer {
            Some(timer) => timer.generation(),
            None => return,
        };
        match signal {
            TimerSignal::Tick {
                generation,
                remaining_seconds,
            } if generation == current => {
                self.emit(EngineEvent::TimerTick { remaining_seconds });
            }
            TimerSignal::Expired { generation } if generation == current => {
                info!(
                    "⏰ Time expired on question {} of {}",
                    self.session.current_index + 1,
                    self.session.questions.len()
                );
                if let Err(e) = self.handle_submit("timer_expiry", None).await {
                    warn!("Expiry capture rejected: {}", e);
                }
            }
            stale => debug!("Stale timer signal ignored: {:?}", stale),
        }
    }

    fn begin_question(&mut self, index: usize) {
        let question = self.session.questions[index].clone();
        let generation = self.next_generation;
        self.next_generation += 1;
        self.timer = Some(CountdownTimer::start(
            Duration::from_secs(question.time_limit_seconds),
            self.config.tick_interval,
            generation,
            self.timer_tx.clone(),
        ));
        self.draft.clear();
        debug!(
            "Question {} armed with a {}s budget (countdown {})",
            question.id, question.time_limit_seconds, generation
        );
        // seed the display with the full budget before the first tick
        let remaining_seconds = question.time_limit_seconds;
        self.emit(EngineEvent::QuestionChanged { index, question });
        self.emit(EngineEvent::TimerTick { remaining_seconds });
    }

    async fn complete(&mut self) {
        self.session.status = SessionStatus::Completed;
        let started_at = self.session.started_at.unwrap_or_else(Utc::now);
        let report = report::aggregate(
            self.session.session_id,
            self.session.questions.len(),
            &self.session.responses,
            &self.store,
            self.config.fallback_score,
            self.config.aggregation_grace,
            started_at,
        )
        .await;
        info!(
            "🏁 Session {} completed: {:.1}/100 across {}/{} questions",
            self.session.session_id,
            report.overall_score,
            report.questions_answered,
            report.total_questions
        );
        self.emit(EngineEvent::SessionCompleted { report });
    }

    fn emit(&self, event: EngineEvent) {
        if self.events.send(event).is_err() {
            debug!("Event receiver dropped; event discarded");
        }
    }
}
