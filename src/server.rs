//! HTTP/WebSocket API server: axum router and request handlers.
//!
//! The server runs on the tokio async runtime while every strip mutation
//! happens on the effect worker's plain `std::thread`. Handlers never touch
//! the strip directly; they resolve and enqueue `WorkerCommand`s over
//! `std::sync::mpsc`, so HTTP requests, relay frames, and preference pushes
//! all serialize through the same queue.

use crate::config::{Config, DevicePrefs, EffectPref, SharedPrefs};
use crate::dispatcher::{Dispatcher, EventMessage};
use crate::scheduler::{Scheduler, SchedulerState, WorkerCommand};
use axum::Router;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

// ── App State ────────────────────────────────────────────────────────

/// Shared application state, passed to every handler via axum's `State`
/// extractor. Everything inside is cheap to clone.
#[derive(Clone)]
pub struct AppState {
    /// Channel into the effect worker thread
    pub commands: Sender<WorkerCommand>,
    /// Resolves events against preferences and enqueues them
    pub dispatcher: Arc<Dispatcher>,
    /// Scheduler handle, for status reads only
    pub scheduler: Arc<Scheduler>,
    /// Runtime preference handle (relay pushes replace it)
    pub prefs: SharedPrefs,
    /// On-disk configuration, re-saved when preferences change
    pub config: Arc<Mutex<Config>>,
    /// Where `config` persists
    pub config_path: PathBuf,
}

// ── OpenAPI Documentation ────────────────────────────────────────────

#[derive(OpenApi)]
#[openapi(
    paths(
        get_status,
        post_event,
        get_prefs,
        put_prefs,
        post_idle_start,
        post_idle_stop,
        post_clear,
    ),
    components(schemas(
        EngineStatus,
        SchedulerState,
        DevicePrefs,
        EffectPref,
        EventMessage,
    )),
    tags(
        (name = "events", description = "Event ingest endpoints"),
        (name = "effects", description = "Effect control endpoints"),
        (name = "system", description = "System status and configuration"),
    ),
    info(
        title = "LED Strip Agent API",
        version = env!("CARGO_PKG_VERSION"),
        description = "HTTP API for an event-driven WS281x LED strip"
    )
)]
pub struct ApiDoc;

// ── Request/Response types ───────────────────────────────────────────

/// Snapshot of the engine for GET /api/v1/status.
#[derive(Serialize, utoipa::ToSchema)]
pub struct EngineStatus {
    /// What the scheduler is doing right now
    state: SchedulerState,
    /// Number of addressable LEDs
    leds: usize,
    /// Driver-level global brightness (0-255)
    brightness: u8,
    version: String,
}

// ── Router ───────────────────────────────────────────────────────────

/// Build the axum router with all API endpoints.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(
            SwaggerUi::new("/docs")
                .url("/api-docs/openapi.json", ApiDoc::openapi())
                .config(utoipa_swagger_ui::Config::new(["/api-docs/openapi.json"]).validator_url("none")),
        )
        .route("/api/v1/status", get(get_status))
        .route("/api/v1/event", post(post_event))
        .route("/api/v1/events", get(ws_events))
        .route("/api/v1/prefs", get(get_prefs).put(put_prefs))
        .route("/api/v1/idle/start", post(post_idle_start))
        .route("/api/v1/idle/stop", post(post_idle_stop))
        .route("/api/v1/clear", post(post_clear))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ── Handlers ─────────────────────────────────────────────────────────

/// GET /api/v1/status — current scheduler state
#[utoipa::path(
    get,
    path = "/api/v1/status",
    tag = "system",
    responses(
        (status = 200, description = "Current engine status", body = EngineStatus)
    )
)]
async fn get_status(State(state): State<AppState>) -> Json<EngineStatus> {
    let leds = state.scheduler.strip().lock().unwrap().len();
    let brightness = state.config.lock().unwrap().brightness;
    Json(EngineStatus {
        state: state.scheduler.state(),
        leds,
        brightness,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// POST /api/v1/event — inject one event, as if the relay had sent it
#[utoipa::path(
    post,
    path = "/api/v1/event",
    tag = "events",
    request_body = EventMessage,
    responses(
        (status = 202, description = "Event queued"),
        (status = 400, description = "Event has no name and no effect")
    )
)]
async fn post_event(
    State(state): State<AppState>,
    Json(msg): Json<EventMessage>,
) -> Result<StatusCode, (StatusCode, String)> {
    if msg.event.trim().is_empty() && msg.effect.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "Event needs a type or an effect".to_string(),
        ));
    }
    state.dispatcher.dispatch(&msg);
    Ok(StatusCode::ACCEPTED)
}

/// GET /api/v1/prefs — the current per-event preferences
#[utoipa::path(
    get,
    path = "/api/v1/prefs",
    tag = "system",
    responses(
        (status = 200, description = "Current preferences", body = DevicePrefs)
    )
)]
async fn get_prefs(State(state): State<AppState>) -> Json<DevicePrefs> {
    let prefs = state.prefs.read().unwrap().clone();
    Json(prefs)
}

/// PUT /api/v1/prefs — replace the preferences and restart the idle effect
///
/// The new set persists to the config file so a restart comes back with the
/// same idle effect. A failed save is logged but does not reject the update.
#[utoipa::path(
    put,
    path = "/api/v1/prefs",
    tag = "system",
    request_body = DevicePrefs,
    responses(
        (status = 200, description = "Preferences replaced"),
        (status = 500, description = "Effect worker unavailable")
    )
)]
async fn put_prefs(
    State(state): State<AppState>,
    Json(new_prefs): Json<DevicePrefs>,
) -> Result<StatusCode, (StatusCode, String)> {
    {
        let mut config = state.config.lock().unwrap();
        config.set_prefs(&new_prefs);
        if let Err(e) = config.save(&state.config_path) {
            tracing::warn!("failed to persist preferences: {e}");
        }
    }
    *state.prefs.write().unwrap() = new_prefs;
    tracing::info!("preferences replaced; restarting idle effect");

    send(&state, WorkerCommand::RefreshIdle)?;
    Ok(StatusCode::OK)
}

/// POST /api/v1/idle/start — (re)start the configured idle effect
#[utoipa::path(
    post,
    path = "/api/v1/idle/start",
    tag = "effects",
    responses(
        (status = 202, description = "Idle restart queued"),
    )
)]
async fn post_idle_start(
    State(state): State<AppState>,
) -> Result<StatusCode, (StatusCode, String)> {
    send(&state, WorkerCommand::RefreshIdle)?;
    Ok(StatusCode::ACCEPTED)
}

/// POST /api/v1/idle/stop — stop the idle effect, leave the strip dark
#[utoipa::path(
    post,
    path = "/api/v1/idle/stop",
    tag = "effects",
    responses(
        (status = 202, description = "Idle stop queued"),
    )
)]
async fn post_idle_stop(
    State(state): State<AppState>,
) -> Result<StatusCode, (StatusCode, String)> {
    send(&state, WorkerCommand::StopIdle)?;
    Ok(StatusCode::ACCEPTED)
}

/// POST /api/v1/clear — stop everything and blank the strip
#[utoipa::path(
    post,
    path = "/api/v1/clear",
    tag = "effects",
    responses(
        (status = 202, description = "Clear queued"),
    )
)]
async fn post_clear(State(state): State<AppState>) -> Result<StatusCode, (StatusCode, String)> {
    send(&state, WorkerCommand::Clear(None))?;
    Ok(StatusCode::ACCEPTED)
}

fn send(state: &AppState, command: WorkerCommand) -> Result<(), (StatusCode, String)> {
    state.commands.send(command).map_err(|_| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Effect worker gone".to_string(),
        )
    })
}

// ── WebSocket event ingest ───────────────────────────────────────────

/// GET /api/v1/events — WebSocket endpoint the relay pushes events over.
///
/// Accepted text frames, matching what the relay actually sends:
/// - `"config_updated"` (anywhere in the frame): re-read preferences and
///   restart the idle effect
/// - a JSON [`EventMessage`]
/// - a bare event name (`"deal_won"`)
async fn ws_events(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_event_socket(socket, state))
}

async fn handle_event_socket(mut socket: WebSocket, state: AppState) {
    tracing::info!("relay connected");
    let mut event_count: u64 = 0;

    while let Some(msg) = socket.recv().await {
        let msg = match msg {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!("WebSocket receive error: {}", e);
                break;
            }
        };

        match msg {
            Message::Text(text) => {
                let text = text.as_str();
                if text.contains("config_updated") {
                    tracing::info!("relay pushed a config update");
                    if state.commands.send(WorkerCommand::RefreshIdle).is_err() {
                        tracing::error!("effect worker gone, closing WebSocket");
                        break;
                    }
                    continue;
                }

                match serde_json::from_str::<EventMessage>(text) {
                    Ok(parsed)
                        if !parsed.event.trim().is_empty()
                            || !parsed.effect.trim().is_empty() =>
                    {
                        state.dispatcher.dispatch(&parsed);
                    }
                    // Not JSON (or JSON with nothing usable): treat the
                    // frame as a bare event name.
                    _ => state.dispatcher.dispatch_text(text),
                }
                event_count += 1;
            }
            Message::Close(_) => break,
            _ => {} // Binary ignored, ping/pong handled by axum
        }
    }

    tracing::info!("relay disconnected ({} events received)", event_count);
}
