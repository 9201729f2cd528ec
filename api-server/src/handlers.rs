use actix_web::{
    http::StatusCode,
    web::{Bytes, Data, Json, Path},
    HttpRequest, HttpResponse, Responder,
};
use solracer_core::constants::PHYSICS_VERSION;
use solracer_core::{generate_track, Race, ResultSubmission};

use crate::auth::is_request_authorized;
use crate::response::{json_error_with_code, ApiError};
use crate::settlement::{self, validate_trace_size};
use crate::{
    AppState, CreateOrJoinRequest, CreateOrJoinResponse, HealthResponse, PlayerView,
    RaceTrackResponse, RaceView, SettlementResponse, SubmitResultResponse, TrackRequest,
    TrackResponse,
};

/// Shown for every rejected submission. The reason stays in the server log.
pub(crate) const REJECTED_MESSAGE: &str = "result could not be verified";
pub(crate) const ACCEPTED_MESSAGE: &str = "result verified";

fn load_race(state: &AppState, race_id: &str) -> Result<Race, ApiError> {
    state
        .races
        .get(race_id)
        .map_err(|e| ApiError::internal("get race failed", e))?
        .ok_or_else(|| ApiError::race_not_found(race_id))
}

fn require_api_key(req: &HttpRequest, state: &AppState) -> Result<(), ApiError> {
    if is_request_authorized(req.headers(), state.api_key.as_deref()) {
        Ok(())
    } else {
        Err(ApiError::new(
            StatusCode::UNAUTHORIZED,
            "unauthorized",
            "unauthorized",
        ))
    }
}

fn race_view(race: Race) -> RaceView {
    let winner_wallet = race.winner_wallet().map(str::to_string);
    RaceView {
        success: true,
        is_settled: race.status.is_final(),
        players: race
            .players
            .iter()
            .map(|slot| PlayerView {
                wallet_address: slot.wallet.clone(),
                submitted: slot.submission.is_some(),
            })
            .collect(),
        winner_wallet,
        race_id: race.race_id,
        status: race.status,
        token_mint: race.token_mint,
        entry_fee_lamports: race.entry_fee_lamports,
        seed: race.seed,
        created_at: race.created_at,
        started_at: race.started_at,
        deadline: race.deadline,
    }
}

pub(crate) async fn health(state: Data<AppState>) -> impl Responder {
    let races = match state.races.count_by_status() {
        Ok(counts) => counts,
        Err(e) => return ApiError::internal("health check failed", e).into_response(),
    };

    let physics = state.policy.verifier_config().physics;
    HttpResponse::Ok().json(HealthResponse {
        status: "healthy",
        service: "solracer-api",
        physics_version: PHYSICS_VERSION,
        physics_digest: physics.digest(),
        races,
        max_trace_bytes: state.max_trace_bytes,
        max_frames: state.policy.max_frames,
        finish_tolerance_ms: state.policy.finish_tolerance_ms,
        submission_window_secs: state.policy.submission_window_secs,
        waiting_ttl_secs: state.policy.waiting_ttl_secs,
        verifier_concurrency: state.verifier_concurrency,
        http_workers: state.http_workers,
        auth_required: state.api_key.is_some(),
    })
}

pub(crate) async fn track(body: Json<TrackRequest>) -> impl Responder {
    let TrackRequest {
        price_samples,
        seed,
    } = body.into_inner();
    match generate_track(&price_samples, seed) {
        Ok(samples) => HttpResponse::Ok().json(TrackResponse {
            success: true,
            seed,
            point_count: samples.len(),
            samples,
        }),
        Err(e) => json_error_with_code(
            StatusCode::BAD_REQUEST,
            e.to_string(),
            Some("invalid_price_samples"),
        ),
    }
}

pub(crate) async fn create_or_join(
    state: Data<AppState>,
    body: Json<CreateOrJoinRequest>,
) -> impl Responder {
    match settlement::create_or_join(&state, body.into_inner()).await {
        Ok(outcome) => {
            let race = outcome.race;
            HttpResponse::Ok().json(CreateOrJoinResponse {
                success: true,
                track_url: format!("/api/races/{}/track", race.race_id),
                race_id: race.race_id,
                seed: race.seed,
                status: race.status,
                joined: outcome.joined,
                deadline: race.deadline,
            })
        }
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn get_race(state: Data<AppState>, path: Path<String>) -> impl Responder {
    match load_race(&state, &path.into_inner()) {
        Ok(race) => HttpResponse::Ok().json(race_view(race)),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn get_race_track(state: Data<AppState>, path: Path<String>) -> impl Responder {
    let race_id = path.into_inner();
    let course = match load_race(&state, &race_id)
        .and_then(|race| settlement::race_course(&state, &race))
    {
        Ok(course) => course,
        Err(err) => return err.into_response(),
    };

    let samples = course.track().samples().to_vec();
    HttpResponse::Ok().json(RaceTrackResponse {
        success: true,
        race_id,
        seed: course.seed(),
        point_count: samples.len(),
        samples,
    })
}

/// Takes the raw body so oversized traces are refused with a clear code
/// before any JSON parsing.
pub(crate) async fn submit_result(
    state: Data<AppState>,
    path: Path<String>,
    body: Bytes,
) -> impl Responder {
    let race_id = path.into_inner();
    if let Err(err) = validate_trace_size(body.len(), state.max_trace_bytes) {
        return err.into_response();
    }
    let submission: ResultSubmission = match serde_json::from_slice(&body) {
        Ok(submission) => submission,
        Err(e) => {
            return json_error_with_code(
                StatusCode::BAD_REQUEST,
                format!("invalid submission: {e}"),
                Some("invalid_submission"),
            )
        }
    };

    match settlement::submit_result(&state, &race_id, submission).await {
        Ok(outcome) => HttpResponse::Ok().json(SubmitResultResponse {
            success: true,
            race_id,
            verified: outcome.verified,
            message: if outcome.verified {
                ACCEPTED_MESSAGE
            } else {
                REJECTED_MESSAGE
            },
            race_status: outcome.status,
        }),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn get_settlement(
    req: HttpRequest,
    state: Data<AppState>,
    path: Path<String>,
) -> impl Responder {
    if let Err(err) = require_api_key(&req, &state) {
        return err.into_response();
    }

    let race = match load_race(&state, &path.into_inner()) {
        Ok(race) => race,
        Err(err) => return err.into_response(),
    };
    match race.settlement {
        Some(settlement) if race.status.is_final() => HttpResponse::Ok().json(SettlementResponse {
            success: true,
            status: race.status,
            settlement,
        }),
        _ => json_error_with_code(
            StatusCode::CONFLICT,
            format!("race {} is {}, not settled", race.race_id, race.status),
            Some("not_settled"),
        ),
    }
}

/// Archived trace for one seat, for anti-cheat review.
pub(crate) async fn get_trace(
    req: HttpRequest,
    state: Data<AppState>,
    path: Path<(String, String)>,
) -> impl Responder {
    if let Err(err) = require_api_key(&req, &state) {
        return err.into_response();
    }

    let (race_id, wallet) = path.into_inner();
    match state.races.load_trace(&race_id, &wallet) {
        Ok(Some(trace)) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "race_id": race_id,
            "wallet_address": wallet,
            "input_hash": trace.hash(),
            "input_trace": trace,
        })),
        Ok(None) => json_error_with_code(
            StatusCode::NOT_FOUND,
            format!("no archived trace for {wallet} in race {race_id}"),
            Some("trace_not_found"),
        ),
        Err(e) => ApiError::internal("load_trace failed", e).into_response(),
    }
}
