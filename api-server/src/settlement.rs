//! Matchmaking, submission intake and settlement.
//!
//! Replays run on the blocking pool and may overlap freely across races.
//! Everything that reads and then writes one race's record happens under
//! that race's async lock, so two near-simultaneous submissions can never
//! both see a half-submitted race.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use actix_web::http::StatusCode;
use sha2::{Digest, Sha256};
use solracer_core::{
    generate_track, verify_submission, ArbiterError, Course, Race, RaceStatus, ResultSubmission,
};
use tokio::sync::Mutex as AsyncMutex;
use uuid::Uuid;

use crate::config::{MAX_ENTRY_FEE_LAMPORTS, MIN_ENTRY_FEE_LAMPORTS};
use crate::response::ApiError;
use crate::{AppState, CreateOrJoinRequest};

pub(crate) fn now_unix_s() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_secs())
        .unwrap_or(0)
}

/// One async mutex per race id, created on first use.
#[derive(Default)]
pub(crate) struct RaceLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl RaceLocks {
    pub(crate) fn lock_for(&self, race_id: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap();
        locks
            .entry(race_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Forget locks nobody is holding or waiting on.
    pub(crate) fn prune(&self) -> usize {
        let mut locks = self.locks.lock().unwrap();
        let before = locks.len();
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        before - locks.len()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.locks.lock().unwrap().len()
    }
}

/// Race seed: the first four bytes of SHA-256 over the race id, big endian.
pub(crate) fn derive_seed(race_id: &str) -> u32 {
    let digest = Sha256::digest(race_id.as_bytes());
    u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
}

pub(crate) fn validate_entry_fee(entry_fee_lamports: u64) -> Result<(), ApiError> {
    if !(MIN_ENTRY_FEE_LAMPORTS..=MAX_ENTRY_FEE_LAMPORTS).contains(&entry_fee_lamports) {
        return Err(ApiError::bad_request(
            format!(
                "entry_fee_lamports must be in [{}..={}]",
                MIN_ENTRY_FEE_LAMPORTS, MAX_ENTRY_FEE_LAMPORTS
            ),
            "invalid_entry_fee",
        ));
    }
    Ok(())
}

pub(crate) fn validate_trace_size(size: usize, max_trace_bytes: usize) -> Result<(), ApiError> {
    if size == 0 {
        return Err(ApiError::bad_request("submission body is empty", "body_empty"));
    }
    if size > max_trace_bytes {
        return Err(ApiError::new(
            StatusCode::PAYLOAD_TOO_LARGE,
            format!("submission too large: {size} bytes (max {max_trace_bytes})"),
            "trace_too_large",
        ));
    }
    Ok(())
}

pub(crate) fn arbiter_error(err: ArbiterError) -> ApiError {
    let (status, code) = match &err {
        ArbiterError::WrongStatus { .. } => (StatusCode::BAD_REQUEST, "invalid_race_status"),
        ArbiterError::SameWallet => (StatusCode::BAD_REQUEST, "same_wallet"),
        ArbiterError::UnknownPlayer { .. } => (StatusCode::FORBIDDEN, "not_a_player"),
        ArbiterError::DuplicateSubmission { .. } => (StatusCode::CONFLICT, "already_submitted"),
        ArbiterError::DeadlinePassed { .. } => (StatusCode::BAD_REQUEST, "deadline_passed"),
    };
    ApiError::new(status, err.to_string(), code)
}

/// Rebuild the course for a race from the chart stored at creation.
pub(crate) fn race_course(state: &AppState, race: &Race) -> Result<Course, ApiError> {
    let prices = state
        .races
        .price_samples(&race.race_id)
        .map_err(|e| ApiError::internal("price_samples lookup failed", e))?
        .ok_or_else(|| ApiError::race_not_found(&race.race_id))?;
    Course::generate(&prices, race.seed, &state.policy.verifier_config().physics)
        .map_err(|e| ApiError::internal("stored chart no longer builds a track", e))
}

pub(crate) struct JoinOutcome {
    pub(crate) race: Race,
    pub(crate) joined: bool,
}

pub(crate) async fn create_or_join(
    state: &AppState,
    request: CreateOrJoinRequest,
) -> Result<JoinOutcome, ApiError> {
    let token_mint = request.token_mint.trim();
    let wallet = request.wallet_address.trim();
    if token_mint.is_empty() || wallet.is_empty() {
        return Err(ApiError::bad_request(
            "token_mint and wallet_address are required",
            "missing_field",
        ));
    }
    validate_entry_fee(request.entry_fee_lamports)?;

    let _matchmaking = state.matchmaking.lock().await;
    let fee = request.entry_fee_lamports;

    if let Some(race) = state
        .races
        .find_own_waiting(token_mint, fee, wallet)
        .map_err(|e| ApiError::internal("find_own_waiting failed", e))?
    {
        tracing::debug!(race_id = %race.race_id, wallet, "returning existing waiting race");
        return Ok(JoinOutcome {
            race,
            joined: false,
        });
    }

    if let Some(candidate) = state
        .races
        .find_joinable(token_mint, fee, wallet)
        .map_err(|e| ApiError::internal("find_joinable failed", e))?
    {
        let lock = state.race_locks.lock_for(&candidate.race_id);
        let _guard = lock.lock().await;

        // The sweep may have expired it since the lookup.
        let mut race = state
            .races
            .get(&candidate.race_id)
            .map_err(|e| ApiError::internal("get race failed", e))?
            .ok_or_else(|| ApiError::race_not_found(&candidate.race_id))?;
        if race.status == RaceStatus::Waiting {
            let now = now_unix_s();
            race.join(wallet, now, state.policy.submission_window_secs)
                .map_err(arbiter_error)?;
            state
                .races
                .save(&race, now)
                .map_err(|e| ApiError::internal("save joined race failed", e))?;
            tracing::info!(race_id = %race.race_id, wallet, "race paired");
            return Ok(JoinOutcome { race, joined: true });
        }
    }

    let race_id = Uuid::new_v4().to_string();
    let seed = derive_seed(&race_id);
    // Refuse charts that cannot produce a track before anyone pays into it.
    generate_track(&request.price_samples, seed)
        .map_err(|e| ApiError::bad_request(e.to_string(), "invalid_price_samples"))?;

    let race = Race::new(&race_id, seed, token_mint, fee, wallet, now_unix_s());
    state
        .races
        .insert_race(&race, &request.price_samples)
        .map_err(|e| ApiError::internal("insert race failed", e))?;
    tracing::info!(race_id = %race_id, seed, wallet, token_mint, fee, "race created");

    Ok(JoinOutcome {
        race,
        joined: false,
    })
}

pub(crate) struct SubmitOutcome {
    pub(crate) verified: bool,
    pub(crate) status: RaceStatus,
}

pub(crate) async fn submit_result(
    state: &AppState,
    race_id: &str,
    submission: ResultSubmission,
) -> Result<SubmitOutcome, ApiError> {
    let wallet = submission.wallet_address.trim().to_string();
    let race = state
        .races
        .get(race_id)
        .map_err(|e| ApiError::internal("get race failed", e))?
        .ok_or_else(|| ApiError::race_not_found(race_id))?;
    race.check_submission(&wallet, now_unix_s())
        .map_err(arbiter_error)?;

    let course = race_course(state, &race)?;
    let claim = submission.claim();
    let trace = submission.input_trace;
    let config = state.policy.verifier_config();

    let permit = state
        .verifier_semaphore
        .clone()
        .acquire_owned()
        .await
        .map_err(|e| ApiError::internal("verifier semaphore closed", e))?;
    let replay_claim = claim.clone();
    let (verification, trace) = tokio::task::spawn_blocking(move || {
        let verification = verify_submission(&course, &trace, &replay_claim, &config);
        (verification, trace)
    })
    .await
    .map_err(|e| ApiError::internal("verifier worker join failure", e))?;
    drop(permit);

    if let Some(reason) = verification.verdict.reason() {
        tracing::warn!(
            race_id,
            wallet = %wallet,
            %reason,
            claimed_ms = claim.finish_time_ms,
            claimed_coins = claim.coins_collected,
            "submission rejected"
        );
    }

    let lock = state.race_locks.lock_for(race_id);
    let _guard = lock.lock().await;

    let now = now_unix_s();
    let mut race = state
        .races
        .get(race_id)
        .map_err(|e| ApiError::internal("get race failed", e))?
        .ok_or_else(|| ApiError::race_not_found(race_id))?;
    let verified = verification.verdict.is_accepted();
    race.record_submission(&wallet, claim, verification, now)
        .map_err(arbiter_error)?;
    race.settle_if_ready(now);
    state
        .races
        .save(&race, now)
        .map_err(|e| ApiError::internal("save submission failed", e))?;

    if let Err(e) = state.races.archive_trace(race_id, &wallet, &trace) {
        tracing::error!(race_id, wallet = %wallet, "failed to archive trace: {e}");
    }

    Ok(SubmitOutcome {
        verified,
        status: race.status,
    })
}

/// Settle Active races past their deadline and void stale Waiting ones.
/// Returns how many races changed state.
pub(crate) async fn sweep_once(state: &AppState, now: u64) -> Result<usize, String> {
    let due = state
        .races
        .due_for_sweep(now, state.policy.waiting_ttl_secs)?;

    let mut changed = 0usize;
    for race_id in due {
        let lock = state.race_locks.lock_for(&race_id);
        let _guard = lock.lock().await;

        let Some(mut race) = state.races.get(&race_id)? else {
            continue;
        };
        let transitioned = match race.status {
            RaceStatus::Active => race.settle_if_ready(now).is_some(),
            RaceStatus::Waiting => race.expire_waiting(now, state.policy.waiting_ttl_secs),
            RaceStatus::Settled | RaceStatus::Voided => false,
        };
        if transitioned {
            state.races.save(&race, now)?;
            changed += 1;
        }
    }

    state.race_locks.prune();
    Ok(changed)
}

pub(crate) fn spawn_sweep_task(state: AppState, sweep_secs: u64) {
    tokio::spawn(async move {
        let sweep = Duration::from_secs(sweep_secs);
        loop {
            tokio::time::sleep(sweep).await;
            match sweep_once(&state, now_unix_s()).await {
                Ok(0) => {}
                Ok(n) => tracing::info!(changed = n, "sweep completed"),
                Err(e) => tracing::error!("sweep failed: {e}"),
            }
        }
    });
}
