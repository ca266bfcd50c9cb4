pub mod types;
pub mod config;
pub mod error;
pub mod store;
pub mod registry;
pub mod ledger;
pub mod decision;
pub mod bracket;
pub mod coordinator;
pub mod command;
pub mod notify;
pub mod service;

use types::*;
use config::*;
use notify::BroadcastNotifier;
use service::{EngineSettings, EventOutcome, Tournament};
use store::JsonFileRowStore;

use std::{fs, sync::Arc};
use axum::{
    extract::{Path as AxumPath, State as AxumState},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, error};
use tracing_subscriber::EnvFilter;

// ── HTTP server ────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct AppState {
    pub tournament: SharedTournament,
    pub notifier: BroadcastNotifier,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/events", post(post_event))
        .route("/state.json", get(get_state_json))
        .route("/matches/:court/:game", get(get_match_json))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn start_server(state: AppState, addr: &str) {
    let app = router(state);
    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("scorekeeper server failed to bind {addr}: {e}");
            return;
        }
    };
    info!("scorekeeper server listening at http://{addr}/");
    if let Err(e) = axum::serve(listener, app).await {
        error!("scorekeeper server error: {e}");
    }
}

const NO_STORE_HEADERS: [(&str, &str); 4] = [
    ("Content-Type", "application/json"),
    ("Cache-Control", "no-store"),
    ("Pragma", "no-cache"),
    ("Expires", "0"),
];

async fn post_event(
    AxumState(state): AxumState<AppState>,
    Json(event): Json<InboundEvent>,
) -> Response {
    match state.tournament.handle_event(&event).await {
        EventOutcome::Duplicate => StatusCode::NO_CONTENT.into_response(),
        EventOutcome::Reply(reply) => {
            if let Some(text) = reply.broadcast.clone() {
                let notifier = state.notifier.clone();
                tokio::spawn(async move {
                    let _ = notifier.broadcast(&text).await;
                });
            }
            Json(reply).into_response()
        }
    }
}

async fn get_state_json(AxumState(state): AxumState<AppState>) -> Response {
    match state.tournament.state() {
        Ok(payload) => {
            let body = serde_json::to_string(&payload).unwrap_or_else(|_| "{}".to_string());
            (NO_STORE_HEADERS, body).into_response()
        }
        Err(e) => {
            error!("state.json failed: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn get_match_json(
    AxumState(state): AxumState<AppState>,
    AxumPath((court, game_number)): AxumPath<(String, u32)>,
) -> Response {
    let key = MatchKey::new(court.to_ascii_uppercase(), game_number);
    match state.tournament.match_view(&key) {
        Ok(Some(view)) => {
            let body = serde_json::to_string(&view).unwrap_or_else(|_| "{}".to_string());
            (NO_STORE_HEADERS, body).into_response()
        }
        Ok(None) => (StatusCode::NOT_FOUND, format!("{key} is not registered")).into_response(),
        Err(e) => {
            error!("match view for {key} failed: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

// ── Startup ────────────────────────────────────────────────────────────

/// Opens the row store and seeds it from the bracket definition, if one is configured.
pub fn bootstrap(config: &AppConfig) -> Result<AppState, String> {
    let data_dir = resolve_repo_path(&config.data_dir);
    let store = JsonFileRowStore::open(&data_dir)
        .map_err(|e| format!("open data dir {}: {e}", data_dir.display()))?;
    let tournament = Tournament::new(Arc::new(store), EngineSettings::from(config));

    if !config.bracket_path.trim().is_empty() {
        let path = resolve_repo_path(config.bracket_path.trim());
        let definition = bracket::load_bracket_definition(&path)?;
        bracket::validate_bracket(&definition)?;
        bracket::seed_registry(tournament.registry(), &definition)
            .map_err(|e| format!("seed bracket {}: {e}", path.display()))?;
    }

    Ok(AppState {
        tournament: Arc::new(tournament),
        notifier: BroadcastNotifier::new(&config.broadcast_url),
    })
}

// ── Entry point ────────────────────────────────────────────────────────

pub fn run() {
    load_env_file();

    // Initialize tracing with file output
    let logs_dir = repo_root().join("logs");
    fs::create_dir_all(&logs_dir).ok();
    let file_appender = tracing_appender::rolling::daily(&logs_dir, "scorekeeper.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(non_blocking)
        .with_ansi(false)
        .init();
    info!("Tournament scorekeeper starting");

    let config = load_config_inner().unwrap_or_else(|e| {
        error!("{e}; using defaults");
        apply_env_overrides(AppConfig::default())
    });
    log_env_warnings(&config);

    let state = match bootstrap(&config) {
        Ok(state) => state,
        Err(e) => {
            error!("startup failed: {e}");
            return;
        }
    };
    info!(
        "max innings {}, lock timeout {}ms, dedup window {}s",
        config.max_innings, config.lock_timeout_ms, config.dedup_ttl_secs
    );

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("error while building the async runtime")
        .block_on(start_server(state, &config.bind_addr));
}
