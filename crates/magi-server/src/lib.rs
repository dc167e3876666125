//! HTTP read interface for a running monitor.
//!
//! The server owns one [`Monitor`] behind an async mutex and ticks it from a
//! background task, so every request sees a consistent snapshot and log ids
//! stay monotonic. Clients poll `/logs?since=<id>` for an incremental feed.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::{Query, State},
    http::StatusCode,
    response::Json,
    routing::get,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use magi_core::{AudioCommand, LogEntry, MetricSnapshot, Monitor, StatusReport};

/// Shared server state.
struct AppState {
    monitor: Mutex<Monitor>,
}

#[derive(Deserialize)]
struct LogParams {
    /// Only entries with a larger id.
    since: Option<u64>,
    /// Keep at most this many of the newest matching entries.
    limit: Option<usize>,
}

#[derive(Serialize)]
struct LogsResponse {
    entries: Vec<LogEntry>,
    /// Id to pass as `since` on the next poll.
    #[serde(skip_serializing_if = "Option::is_none")]
    last_id: Option<u64>,
}

#[derive(Deserialize)]
struct ReportParams {
    force: Option<bool>,
}

#[derive(Serialize)]
struct ReportResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    report: Option<StatusReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    monitor_id: String,
    tick: u64,
    sync_rate: f64,
    capabilities: Vec<String>,
}

/// Partial update for voice or BGM settings.
#[derive(Deserialize)]
struct ControlParams {
    enabled: Option<bool>,
    volume: Option<f64>,
}

#[derive(Serialize)]
struct ControlsResponse {
    voice_enabled: bool,
    voice_volume: f64,
    bgm: AudioCommand,
}

async fn handle_snapshot(State(state): State<Arc<AppState>>) -> Json<MetricSnapshot> {
    let monitor = state.monitor.lock().await;
    Json(monitor.snapshot().clone())
}

async fn handle_logs(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LogParams>,
) -> Json<LogsResponse> {
    let monitor = state.monitor.lock().await;
    let mut entries = monitor.logs_since(params.since);
    drop(monitor);

    if let Some(limit) = params.limit
        && entries.len() > limit
    {
        entries.drain(..entries.len() - limit);
    }
    let last_id = entries.last().map(|e| e.id).or(params.since);
    Json(LogsResponse { entries, last_id })
}

async fn handle_report(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ReportParams>,
) -> (StatusCode, Json<ReportResponse>) {
    let mut monitor = state.monitor.lock().await;
    match monitor.report(params.force.unwrap_or(false)) {
        Some(report) => (
            StatusCode::OK,
            Json(ReportResponse {
                success: true,
                report: Some(report),
                error: None,
            }),
        ),
        None => (
            StatusCode::TOO_MANY_REQUESTS,
            Json(ReportResponse {
                success: false,
                report: None,
                error: Some("rate limited; retry later or pass force=true".to_string()),
            }),
        ),
    }
}

async fn handle_health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let monitor = state.monitor.lock().await;
    let snap = monitor.snapshot();
    Json(HealthResponse {
        status: if monitor.is_running() {
            "running".to_string()
        } else {
            "stopped".to_string()
        },
        monitor_id: monitor.id().to_string(),
        tick: snap.tick,
        sync_rate: snap.sync_rate,
        capabilities: monitor
            .capabilities()
            .iter()
            .map(ToString::to_string)
            .collect(),
    })
}

fn controls(monitor: &Monitor) -> ControlsResponse {
    ControlsResponse {
        voice_enabled: monitor.voice().config().enabled,
        voice_volume: monitor.voice().config().volume,
        bgm: monitor.audio().state().clone(),
    }
}

async fn handle_controls(State(state): State<Arc<AppState>>) -> Json<ControlsResponse> {
    let monitor = state.monitor.lock().await;
    Json(controls(&monitor))
}

async fn handle_voice(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ControlParams>,
) -> Json<ControlsResponse> {
    let mut monitor = state.monitor.lock().await;
    let voice = monitor.voice_mut();
    if let Some(enabled) = params.enabled {
        voice.set_enabled(enabled);
    }
    if let Some(volume) = params.volume {
        voice.set_volume(volume);
    }
    Json(controls(&monitor))
}

async fn handle_bgm(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ControlParams>,
) -> Json<ControlsResponse> {
    let mut monitor = state.monitor.lock().await;
    let audio = monitor.audio_mut();
    if let Some(enabled) = params.enabled
        && enabled != audio.state().enabled
    {
        audio.toggle();
    }
    if let Some(volume) = params.volume {
        audio.set_volume(volume);
    }
    Json(controls(&monitor))
}

async fn handle_index(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let monitor = state.monitor.lock().await;
    let id = monitor.id().to_string();
    let interval = monitor.config().refresh_interval_ms;
    drop(monitor);

    Json(serde_json::json!({
        "name": "MAGI Monitor Server",
        "version": magi_core::VERSION,
        "monitor_id": id,
        "refresh_interval_ms": interval,
        "endpoints": {
            "/": "This API index",
            "/snapshot": "Latest metric snapshot",
            "/logs": {
                "method": "GET",
                "description": "Log feed, oldest first",
                "params": {
                    "since": "Only entries with a larger id",
                    "limit": "Newest N entries at most",
                }
            },
            "/report": {
                "method": "GET or POST",
                "description": "Synthesize a status report (rate limited while voice is enabled)",
                "params": { "force": "Bypass the rate limit (default: false)" }
            },
            "/controls": "Voice and BGM settings (POST /controls/voice, /controls/bgm with enabled, volume)",
            "/health": "Health check",
        },
        "examples": {
            "poll_logs": "/logs?since=42",
            "forced_report": "/report?force=true",
        }
    }))
}

/// Build the axum router around an already constructed monitor.
fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handle_index))
        .route("/snapshot", get(handle_snapshot))
        .route("/logs", get(handle_logs))
        .route("/report", get(handle_report).post(handle_report))
        .route("/controls", get(handle_controls))
        .route("/controls/voice", axum::routing::post(handle_voice))
        .route("/controls/bgm", axum::routing::post(handle_bgm))
        .route("/health", get(handle_health))
        .with_state(state)
}

/// Tick the monitor on its configured interval until the state is dropped.
fn spawn_ticker(state: Arc<AppState>, period: Duration) {
    let weak = Arc::downgrade(&state);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            let Some(state) = weak.upgrade() else {
                break;
            };
            state.monitor.lock().await.tick();
        }
    });
}

/// Run the HTTP monitor server until the listener fails.
pub async fn run_server(monitor: Monitor, host: &str, port: u16) -> std::io::Result<()> {
    let period = Duration::from_millis(monitor.config().refresh_interval_ms.max(1));
    let mut monitor = monitor;
    monitor.start();
    let state = Arc::new(AppState {
        monitor: Mutex::new(monitor),
    });
    spawn_ticker(Arc::clone(&state), period);

    let app = build_router(state);
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    log::info!("listening on http://{addr}");
    axum::serve(listener, app).await
}
