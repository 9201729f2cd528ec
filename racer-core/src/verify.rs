use core::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::PhysicsConfig;
use crate::constants::{FINISH_TOLERANCE_MS_DEFAULT, MAX_FRAMES_DEFAULT};
use crate::course::Course;
use crate::error::TraceError;
use crate::sim::{replay, ReplayOutcome};
use crate::trace::InputTrace;

/// Finish time, coins and trace hash of one attempt, either as claimed by
/// the client or as re-derived by the verifier.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaceOutcome {
    pub finish_time_ms: u64,
    pub coins_collected: u32,
    pub input_hash: String,
}

/// Trace submission as it arrives from a client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResultSubmission {
    pub wallet_address: String,
    pub finish_time_ms: u64,
    pub coins_collected: u32,
    pub input_hash: String,
    pub input_trace: InputTrace,
}

impl ResultSubmission {
    /// The claimed outcome. Surrounding whitespace is dropped from the hash
    /// here so every stored copy is the bare hex digest.
    pub fn claim(&self) -> RaceOutcome {
        RaceOutcome {
            finish_time_ms: self.finish_time_ms,
            coins_collected: self.coins_collected,
            input_hash: self.input_hash.trim().to_string(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    TraceTampered,
    OutcomeMismatch,
    DidNotFinish,
    TraceTooLong,
    TraceEmpty,
    TraceMalformed,
    Forfeit,
}

impl RejectReason {
    pub const ALL: [RejectReason; 7] = [
        Self::TraceTampered,
        Self::OutcomeMismatch,
        Self::DidNotFinish,
        Self::TraceTooLong,
        Self::TraceEmpty,
        Self::TraceMalformed,
        Self::Forfeit,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::TraceTampered => "trace_tampered",
            Self::OutcomeMismatch => "outcome_mismatch",
            Self::DidNotFinish => "did_not_finish",
            Self::TraceTooLong => "trace_too_long",
            Self::TraceEmpty => "trace_empty",
            Self::TraceMalformed => "trace_malformed",
            Self::Forfeit => "forfeit",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|reason| reason.as_str() == value)
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Serializes as `{"status":"accepted"}` or
/// `{"status":"rejected","reason":"trace_tampered"}`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum Verdict {
    Accepted,
    Rejected(RejectReason),
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }

    pub fn reason(&self) -> Option<RejectReason> {
        match self {
            Self::Accepted => None,
            Self::Rejected(reason) => Some(*reason),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verification {
    pub verdict: Verdict,
    /// Present whenever the replay reached the finish line.
    pub verified: Option<RaceOutcome>,
}

impl Verification {
    fn rejected(reason: RejectReason) -> Self {
        Self {
            verdict: Verdict::Rejected(reason),
            verified: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VerifierConfig {
    pub physics: PhysicsConfig,
    pub finish_tolerance_ms: u64,
    pub max_frames: u32,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            physics: PhysicsConfig::REFERENCE,
            finish_tolerance_ms: FINISH_TOLERANCE_MS_DEFAULT,
            max_frames: MAX_FRAMES_DEFAULT,
        }
    }
}

/// Re-simulate `trace` on the server's own course and judge `claim`.
///
/// Never fails: every problem with the submission becomes a rejection.
/// Running it twice on the same inputs gives the same verification.
pub fn verify_submission(
    course: &Course,
    trace: &InputTrace,
    claim: &RaceOutcome,
    config: &VerifierConfig,
) -> Verification {
    verify_with_replay(course, trace, claim, config, replay)
}

fn verify_with_replay<F>(
    course: &Course,
    trace: &InputTrace,
    claim: &RaceOutcome,
    config: &VerifierConfig,
    replay_fn: F,
) -> Verification
where
    F: FnOnce(&Course, &InputTrace, &PhysicsConfig) -> ReplayOutcome,
{
    // Bound the work before hashing anything.
    if trace.len() > config.max_frames as usize {
        return Verification::rejected(RejectReason::TraceTooLong);
    }

    let input_hash = trace.hash();
    if claim.input_hash.trim() != input_hash {
        warn!(
            claimed = %claim.input_hash,
            computed = %input_hash,
            "trace hash mismatch"
        );
        return Verification::rejected(RejectReason::TraceTampered);
    }

    if let Err(err) = trace.validate(&config.physics, config.max_frames) {
        debug!(error = %err, "trace failed structural checks");
        return Verification::rejected(match err {
            TraceError::Empty => RejectReason::TraceEmpty,
            TraceError::TooLong { .. } => RejectReason::TraceTooLong,
            _ => RejectReason::TraceMalformed,
        });
    }

    let outcome = replay_fn(course, trace, &config.physics);
    let Some(finish_time_ms) = outcome.finish_time_ms else {
        debug!(
            progress = ?outcome.progress,
            frames = outcome.frames_consumed,
            "replay did not reach the finish"
        );
        return Verification::rejected(RejectReason::DidNotFinish);
    };

    let verified = RaceOutcome {
        finish_time_ms,
        coins_collected: outcome.coins_collected,
        input_hash,
    };

    let within_tolerance =
        finish_time_ms.abs_diff(claim.finish_time_ms) <= config.finish_tolerance_ms;
    let verdict = if within_tolerance && verified.coins_collected == claim.coins_collected {
        Verdict::Accepted
    } else {
        warn!(
            claimed_ms = claim.finish_time_ms,
            verified_ms = verified.finish_time_ms,
            claimed_coins = claim.coins_collected,
            verified_coins = verified.coins_collected,
            "claimed outcome disagrees with replay"
        );
        Verdict::Rejected(RejectReason::OutcomeMismatch)
    };

    Verification {
        verdict,
        verified: Some(verified),
    }
}
