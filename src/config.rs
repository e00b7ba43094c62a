use std::env;
use std::time::Duration;

use log::warn;

/// Score substituted when the external capability fails, times out or returns
/// output the pipeline cannot use.
pub const FALLBACK_SCORE: u8 = 75;

/// Advisory feedback paired with the fallback score.
pub const FALLBACK_FEEDBACK: &str = "Unable to analyze response at this time.";

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Bounded wait on a single evaluation before the fallback kicks in.
    pub scoring_timeout: Duration,
    /// Grace period granted to outstanding evaluations at session end.
    pub aggregation_grace: Duration,
    /// Cadence of `TimerTick` events while a question is open.
    pub tick_interval: Duration,
    pub fallback_score: u8,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            scoring_timeout: Duration::from_secs(10),
            aggregation_grace: Duration::from_secs(3),
            tick_interval: Duration::from_secs(1),
            fallback_score: FALLBACK_SCORE,
        }
    }
}

impl EngineConfig {
    /// Build a config from `MOCKSIM_*` environment variables, falling back to
    /// the defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();

        let mut config = Self::default();
        if let Some(secs) = env_u64("MOCKSIM_SCORING_TIMEOUT_SECS") {
            config.scoring_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = env_u64("MOCKSIM_AGGREGATION_GRACE_SECS") {
            config.aggregation_grace = Duration::from_secs(secs);
        }
        if let Some(score) = env_u64("MOCKSIM_FALLBACK_SCORE") {
            config.fallback_score = score.min(100) as u8;
        }
        config
    }
}

fn env_u64(key: &str) -> Option<u64> {
    let raw = env::var(key).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring {}: {:?} is not a number", key, raw);
            None
        }
    }
}
