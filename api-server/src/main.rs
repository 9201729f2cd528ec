mod auth;
mod config;
mod handlers;
mod response;
mod settlement;
mod store;
mod types;

use std::{env, io, path::PathBuf};

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};

pub(crate) use config::{
    read_env_optional_string, read_env_optional_usize, read_env_u64, read_env_usize, AppState,
    ServerPolicy, DEFAULT_MAX_TRACE_BYTES, DEFAULT_SWEEP_SECS, DEFAULT_VERIFIER_CONCURRENCY,
};
pub(crate) use settlement::now_unix_s;
pub(crate) use store::RaceStore;
pub(crate) use types::*;

const DEFAULT_JSON_LIMIT_BYTES: usize = 1024 * 1024;

pub(crate) fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(handlers::health))
        .route("/api/track", web::post().to(handlers::track))
        .route(
            "/api/races/create_or_join",
            web::post().to(handlers::create_or_join),
        )
        .route("/api/races/{race_id}", web::get().to(handlers::get_race))
        .route(
            "/api/races/{race_id}/track",
            web::get().to(handlers::get_race_track),
        )
        .route(
            "/api/races/{race_id}/submit_result",
            web::post().to(handlers::submit_result),
        )
        .route(
            "/api/races/{race_id}/settlement",
            web::get().to(handlers::get_settlement),
        )
        .route(
            "/api/races/{race_id}/traces/{wallet}",
            web::get().to(handlers::get_trace),
        );
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::filter::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let bind_addr = env::var("API_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let data_dir = PathBuf::from(env::var("DATA_DIR").unwrap_or_else(|_| "./data".to_string()));
    let max_trace_bytes = read_env_usize("MAX_TRACE_BYTES", DEFAULT_MAX_TRACE_BYTES);
    let verifier_concurrency =
        read_env_usize("VERIFIER_CONCURRENCY", DEFAULT_VERIFIER_CONCURRENCY);
    let sweep_secs = read_env_u64("SWEEP_SECS", DEFAULT_SWEEP_SECS);
    let json_limit = read_env_usize("JSON_LIMIT_BYTES", DEFAULT_JSON_LIMIT_BYTES);
    let http_workers = read_env_optional_usize("HTTP_WORKERS");
    let api_key = read_env_optional_string("API_KEY");
    let policy = ServerPolicy::from_env();

    let races = RaceStore::open(&data_dir).map_err(io::Error::other)?;

    tracing::info!(
        bind_addr = %bind_addr,
        data_dir = %data_dir.display(),
        verifier_concurrency,
        max_trace_bytes,
        max_frames = policy.max_frames,
        finish_tolerance_ms = policy.finish_tolerance_ms,
        submission_window_secs = policy.submission_window_secs,
        waiting_ttl_secs = policy.waiting_ttl_secs,
        auth_required = api_key.is_some(),
        "starting solracer api"
    );

    let mut state = AppState::new(
        races,
        policy,
        verifier_concurrency,
        max_trace_bytes,
        api_key,
    );
    state.http_workers = http_workers;

    // Windows that closed while the server was down settle before serving.
    match settlement::sweep_once(&state, now_unix_s()).await {
        Ok(0) => {}
        Ok(n) => tracing::warn!(changed = n, "settled races overdue at startup"),
        Err(e) => tracing::error!("startup sweep failed: {e}"),
    }
    settlement::spawn_sweep_task(state.clone(), sweep_secs);

    let mut server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(state.clone()))
            .app_data(web::JsonConfig::default().limit(json_limit))
            // Oversized submissions reach the handler so they get a JSON error.
            .app_data(web::PayloadConfig::new(max_trace_bytes.saturating_mul(2)))
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .configure(configure_routes)
    });
    if let Some(workers) = http_workers {
        server = server.workers(workers);
    }

    server.bind(bind_addr)?.run().await
}
