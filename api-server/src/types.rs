use serde::{Deserialize, Serialize};
use solracer_core::{RaceStatus, Settlement};

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct TrackRequest {
    pub(crate) price_samples: Vec<f64>,
    pub(crate) seed: u32,
}

#[derive(Debug, Serialize)]
pub(crate) struct TrackResponse {
    pub(crate) success: bool,
    pub(crate) seed: u32,
    pub(crate) samples: Vec<f64>,
    pub(crate) point_count: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct CreateOrJoinRequest {
    pub(crate) token_mint: String,
    pub(crate) wallet_address: String,
    pub(crate) entry_fee_lamports: u64,
    pub(crate) price_samples: Vec<f64>,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateOrJoinResponse {
    pub(crate) success: bool,
    pub(crate) race_id: String,
    pub(crate) seed: u32,
    pub(crate) status: RaceStatus,
    /// True when the wallet took the second seat of an existing race.
    pub(crate) joined: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) deadline: Option<u64>,
    pub(crate) track_url: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct PlayerView {
    pub(crate) wallet_address: String,
    pub(crate) submitted: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct RaceView {
    pub(crate) success: bool,
    pub(crate) race_id: String,
    pub(crate) status: RaceStatus,
    pub(crate) token_mint: String,
    pub(crate) entry_fee_lamports: u64,
    pub(crate) seed: u32,
    pub(crate) players: Vec<PlayerView>,
    pub(crate) winner_wallet: Option<String>,
    pub(crate) is_settled: bool,
    pub(crate) created_at: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) started_at: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) deadline: Option<u64>,
}

#[derive(Debug, Serialize)]
pub(crate) struct RaceTrackResponse {
    pub(crate) success: bool,
    pub(crate) race_id: String,
    pub(crate) seed: u32,
    pub(crate) samples: Vec<f64>,
    pub(crate) point_count: usize,
}

#[derive(Debug, Serialize)]
pub(crate) struct SubmitResultResponse {
    pub(crate) success: bool,
    pub(crate) race_id: String,
    pub(crate) verified: bool,
    pub(crate) message: &'static str,
    pub(crate) race_status: RaceStatus,
}

#[derive(Debug, Serialize)]
pub(crate) struct SettlementResponse {
    pub(crate) success: bool,
    pub(crate) status: RaceStatus,
    pub(crate) settlement: Settlement,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub(crate) struct RaceCounts {
    pub(crate) waiting: usize,
    pub(crate) active: usize,
    pub(crate) settled: usize,
    pub(crate) voided: usize,
}

#[derive(Debug, Serialize)]
pub(crate) struct HealthResponse {
    pub(crate) status: &'static str,
    pub(crate) service: &'static str,
    pub(crate) physics_version: u16,
    pub(crate) physics_digest: String,
    pub(crate) races: RaceCounts,
    pub(crate) max_trace_bytes: usize,
    pub(crate) max_frames: u32,
    pub(crate) finish_tolerance_ms: u64,
    pub(crate) submission_window_secs: u64,
    pub(crate) waiting_ttl_secs: u64,
    pub(crate) verifier_concurrency: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) http_workers: Option<usize>,
    pub(crate) auth_required: bool,
}
