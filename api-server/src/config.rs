use std::{env, sync::Arc};

use solracer_core::constants::{FINISH_TOLERANCE_MS_DEFAULT, MAX_FRAMES_DEFAULT};
use solracer_core::{PhysicsConfig, VerifierConfig};
use tokio::sync::{Mutex, Semaphore};

use crate::settlement::RaceLocks;
use crate::RaceStore;

// A full 18k-frame trace serializes to roughly 1.3 MB of JSON.
pub(crate) const DEFAULT_MAX_TRACE_BYTES: usize = 2 * 1024 * 1024;
pub(crate) const DEFAULT_SUBMISSION_WINDOW_SECS: u64 = 10 * 60;
pub(crate) const DEFAULT_WAITING_TTL_SECS: u64 = 30 * 60;
pub(crate) const DEFAULT_SWEEP_SECS: u64 = 15;
pub(crate) const DEFAULT_VERIFIER_CONCURRENCY: usize = 4;
// Frame budget per race, one hour at 60 Hz. Server operators may lower it.
pub(crate) const MAX_FRAMES_CEILING: u32 = 216_000;
pub(crate) const MIN_ENTRY_FEE_LAMPORTS: u64 = 5_000_000;
pub(crate) const MAX_ENTRY_FEE_LAMPORTS: u64 = 20_000_000;

#[derive(Debug, Clone, Copy)]
pub(crate) struct ServerPolicy {
    pub(crate) max_frames: u32,
    pub(crate) finish_tolerance_ms: u64,
    pub(crate) submission_window_secs: u64,
    pub(crate) waiting_ttl_secs: u64,
}

impl Default for ServerPolicy {
    fn default() -> Self {
        Self {
            max_frames: MAX_FRAMES_DEFAULT,
            finish_tolerance_ms: FINISH_TOLERANCE_MS_DEFAULT,
            submission_window_secs: DEFAULT_SUBMISSION_WINDOW_SECS,
            waiting_ttl_secs: DEFAULT_WAITING_TTL_SECS,
        }
    }
}

impl ServerPolicy {
    pub(crate) fn from_env() -> Self {
        let mut max_frames = read_env_u32("MAX_FRAMES", MAX_FRAMES_DEFAULT);
        if max_frames > MAX_FRAMES_CEILING {
            tracing::warn!(
                max_frames,
                ceiling = MAX_FRAMES_CEILING,
                "MAX_FRAMES above ceiling. Falling back to default."
            );
            max_frames = MAX_FRAMES_DEFAULT;
        }

        let physics = PhysicsConfig::REFERENCE;
        let frame_ms = physics.ticks_to_ms(1);
        let mut finish_tolerance_ms =
            read_env_u64_allow_zero("FINISH_TOLERANCE_MS", FINISH_TOLERANCE_MS_DEFAULT);
        // More than a second of slack would let a client shave whole ticks.
        if finish_tolerance_ms > 60 * frame_ms {
            tracing::warn!(
                finish_tolerance_ms,
                "FINISH_TOLERANCE_MS above one second. Falling back to default."
            );
            finish_tolerance_ms = FINISH_TOLERANCE_MS_DEFAULT;
        }

        let submission_window_secs =
            read_env_u64("SUBMISSION_WINDOW_SECS", DEFAULT_SUBMISSION_WINDOW_SECS);
        let mut waiting_ttl_secs = read_env_u64("WAITING_TTL_SECS", DEFAULT_WAITING_TTL_SECS);
        if waiting_ttl_secs < submission_window_secs {
            tracing::warn!(
                waiting_ttl_secs,
                submission_window_secs,
                "WAITING_TTL_SECS shorter than the submission window. Using the window."
            );
            waiting_ttl_secs = submission_window_secs;
        }

        Self {
            max_frames,
            finish_tolerance_ms,
            submission_window_secs,
            waiting_ttl_secs,
        }
    }

    pub(crate) fn verifier_config(&self) -> VerifierConfig {
        VerifierConfig {
            physics: PhysicsConfig::REFERENCE,
            finish_tolerance_ms: self.finish_tolerance_ms,
            max_frames: self.max_frames,
        }
    }
}

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) races: Arc<RaceStore>,
    pub(crate) race_locks: Arc<RaceLocks>,
    /// Serializes pairing so two joiners never land in the same seat.
    pub(crate) matchmaking: Arc<Mutex<()>>,
    pub(crate) verifier_semaphore: Arc<Semaphore>,
    pub(crate) verifier_concurrency: usize,
    pub(crate) max_trace_bytes: usize,
    pub(crate) policy: ServerPolicy,
    pub(crate) api_key: Option<String>,
    pub(crate) http_workers: Option<usize>,
}

impl AppState {
    pub(crate) fn new(
        races: RaceStore,
        policy: ServerPolicy,
        verifier_concurrency: usize,
        max_trace_bytes: usize,
        api_key: Option<String>,
    ) -> Self {
        Self {
            races: Arc::new(races),
            race_locks: Arc::new(RaceLocks::default()),
            matchmaking: Arc::new(Mutex::new(())),
            verifier_semaphore: Arc::new(Semaphore::new(verifier_concurrency)),
            verifier_concurrency,
            max_trace_bytes,
            policy,
            api_key,
            http_workers: None,
        }
    }
}

pub(crate) fn read_env_usize(name: &str, default: usize) -> usize {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}

pub(crate) fn read_env_optional_usize(name: &str) -> Option<usize> {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .filter(|value| *value > 0)
}

pub(crate) fn read_env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}

pub(crate) fn read_env_u64_allow_zero(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(default)
}

pub(crate) fn read_env_u32(name: &str, default: u32) -> u32 {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<u32>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}

pub(crate) fn read_env_optional_string(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
