use std::time::Duration;

use log::debug;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep_until, Instant};

/// Signals a running countdown delivers into the session loop. Every signal
/// carries the generation of the countdown that produced it so the loop can
/// discard anything from a countdown it already cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerSignal {
    Tick {
        generation: u64,
        remaining_seconds: u64,
    },
    Expired {
        generation: u64,
    },
}

/// A cancellable single-shot countdown. Fires `Expired` exactly once, at or
/// after the requested duration and never before, unless cancelled first.
/// Restarting means constructing a fresh countdown; there is no reuse.
pub struct CountdownTimer {
    generation: u64,
    deadline: Instant,
    cancel: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl CountdownTimer {
    pub fn start(
        duration: Duration,
        tick_interval: Duration,
        generation: u64,
        signals: mpsc::UnboundedSender<TimerSignal>,
    ) -> Self {
        let deadline = Instant::now() + duration;
        let (cancel_tx, mut cancel_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + tick_interval, tick_interval);
            loop {
                tokio::select! {
                    biased;
                    // completes on explicit cancel or when the handle is dropped
                    _ = &mut cancel_rx => {
                        debug!("Countdown {} cancelled", generation);
                        return;
                    }
                    _ = sleep_until(deadline) => {
                        let _ = signals.send(TimerSignal::Expired { generation });
                        return;
                    }
                    _ = ticker.tick() => {
                        let remaining = remaining_seconds_at(deadline, Instant::now());
                        if remaining > 0 {
                            let _ = signals.send(TimerSignal::Tick {
                                generation,
                                remaining_seconds: remaining,
                            });
                        }
                    }
                }
            }
        });

        Self {
            generation,
            deadline,
            cancel: Some(cancel_tx),
            task,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Seconds left until expiry, saturating at zero. Side-effect free; a
    /// freshly started countdown reads its full duration.
    pub fn remaining_seconds(&self) -> u64 {
        remaining_seconds_at(self.deadline, Instant::now())
    }

    /// Synchronous cancel. A no-op if the countdown already fired; the stale
    /// `Expired` signal, if any, is screened out by its generation.
    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
        self.task.abort();
    }
}

fn remaining_seconds_at(deadline: Instant, now: Instant) -> u64 {
    let remaining = deadline.saturating_duration_since(now);
    // round partial seconds up so the display never undersells the budget
    let whole = remaining.as_secs();
    if remaining.subsec_nanos() > 0 {
        whole + 1
    } else {
        whole
    }
}

/// mm:ss rendering of a seconds count for presentation consumers.
pub fn format_clock(seconds: u64) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}
