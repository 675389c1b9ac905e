//! HTTP interface for dashboards and companion apps.
//!
//! This module provides an HTTP server that:
//! - Classifies readings posted to `POST /api/sleep_analysis`
//! - Reports alarm and session status
//! - Lets a client move the wake time, ask whether a given stage would wake
//!   the sleeper at a given time, or fire the alarm
//! - Serves samples and device details from the configured sensor
//!
//! # Architecture
//!
//! ```text
//! Companion app ──→ POST /api/sleep_analysis ──→ StageClassifier ──→ WakeScheduler
//!                                                       │
//!                   GET /api/status  ←──────────────────┘
//! ```
//!
//! The classifier, the scheduler and the sensor sit behind separate async
//! locks. The alarm escalation blocks while it holds each step, so it runs on
//! a blocking task; other handlers wait on the scheduler lock without
//! occupying a runtime thread.

use crate::config::Config;
use crate::core::{
    AlarmStatus, ClassifyError, EscalationOutcome, EscalationTiming, SleepSummary,
    StageClassifier, StageLabel, WakeScheduler,
};
use crate::sensor::types::{DeviceInfo, Reading, SensorSample};
use crate::sensor::{SensorSimulator, SensorSource};
use crate::session::{create_shared_stats, SessionStatsSnapshot, SharedSessionStats};
use axum::{
    extract::State,
    http::{HeaderValue, StatusCode},
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, FixedOffset, Local, Utc};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to bind to (0 for random)
    pub port: u16,
    /// Thresholds and alarm settings
    pub config: Config,
    /// Hold durations used when the alarm fires
    pub escalation_timing: EscalationTiming,
}

impl ServerConfig {
    /// Create a new server configuration
    pub fn new(port: u16, config: Config) -> Self {
        Self {
            port,
            config,
            escalation_timing: EscalationTiming::default(),
        }
    }

    pub fn with_escalation_timing(mut self, timing: EscalationTiming) -> Self {
        self.escalation_timing = timing;
        self
    }
}

/// Shared server state
pub struct ServerState {
    classifier: Mutex<StageClassifier>,
    scheduler: Arc<Mutex<WakeScheduler>>,
    sensor: Mutex<SensorSimulator>,
    stats: SharedSessionStats,
}

impl ServerState {
    /// Create new server state
    pub fn new(config: &ServerConfig) -> anyhow::Result<Self> {
        let classifier = StageClassifier::new(config.config.sleep_detection.thresholds)?;
        let scheduler = WakeScheduler::new(&config.config.alarm_settings)
            .with_timing(config.escalation_timing);

        let device = &config.config.device_settings;
        let rate = config.config.sleep_detection.sampling_rate;
        let sensor = match device.simulator_seed {
            Some(seed) => SensorSimulator::seeded(seed, rate),
            None => SensorSimulator::new(rate),
        }
        .with_device_name(device.device_name.clone());

        Ok(Self {
            classifier: Mutex::new(classifier),
            scheduler: Arc::new(Mutex::new(scheduler)),
            sensor: Mutex::new(sensor),
            stats: create_shared_stats(),
        })
    }
}

/// Reading posted for classification
#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisRequest {
    pub heart_rate: f64,
    pub movement: f64,
    /// Defaults to the time of receipt
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Response from the analysis endpoint
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResponse {
    pub stage: StageLabel,
    pub should_wake: bool,
    pub summary: Option<SleepSummary>,
}

/// Response from the status endpoint
#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub status: String,
    pub timestamp: String,
    pub alarm: AlarmStatus,
    pub device: DeviceInfo,
    pub summary: Option<SleepSummary>,
    pub session: SessionStatsSnapshot,
}

/// Stage and instant to test against the wake window
#[derive(Debug, Clone, Deserialize)]
pub struct AlarmCheckRequest {
    #[serde(default = "default_check_stage")]
    pub sleep_stage: String,
    /// RFC 3339; defaults to the time of receipt
    #[serde(default)]
    pub current_time: Option<DateTime<FixedOffset>>,
}

fn default_check_stage() -> String {
    StageLabel::Awake.as_str().to_string()
}

#[derive(Debug, Clone, Serialize)]
pub struct AlarmCheckResponse {
    pub should_wake_up: bool,
    pub current_time: String,
    pub sleep_stage: StageLabel,
    pub alarm_status: AlarmStatus,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WakeTimeRequest {
    pub wake_time: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct WakeTimeResponse {
    pub wake_time: String,
    /// The requested value was malformed and 07:00 was used
    pub defaulted: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TriggerResponse {
    pub triggered: bool,
    /// Absent when the alarm had already fired
    pub escalation: Option<EscalationOutcome>,
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Error response
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, code: &str, error: String) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error,
            code: code.to_string(),
        }),
    )
}

/// GET /health
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// GET /api/status
async fn status(State(state): State<Arc<ServerState>>) -> Json<StatusResponse> {
    let summary = state.classifier.lock().await.sleep_summary();
    let alarm = state.scheduler.lock().await.status();
    let device = state.sensor.lock().await.device_info();

    Json(StatusResponse {
        status: "running".to_string(),
        timestamp: Utc::now().to_rfc3339(),
        alarm,
        device,
        summary,
        session: state.stats.stats(),
    })
}

/// POST /api/sleep_analysis
///
/// Classifies one reading and reports whether the alarm would fire now.
async fn sleep_analysis(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<AnalysisRequest>,
) -> Result<Json<AnalysisResponse>, ApiError> {
    let reading = Reading::at(
        request.timestamp.unwrap_or_else(Utc::now),
        request.heart_rate,
        request.movement,
    );

    let (stage, summary) = {
        let mut classifier = state.classifier.lock().await;
        let stage = classifier.classify(reading).map_err(|e| {
            state.stats.record_rejected();
            api_error(StatusCode::BAD_REQUEST, "INVALID_READING", e.to_string())
        })?;
        (stage, classifier.sleep_summary())
    };
    state.stats.record_stage(stage);

    let should_wake = state
        .scheduler
        .lock()
        .await
        .should_wake(stage, Local::now().naive_local());

    Ok(Json(AnalysisResponse {
        stage,
        should_wake,
        summary,
    }))
}

/// GET /api/alarm
async fn alarm_status(State(state): State<Arc<ServerState>>) -> Json<AlarmStatus> {
    Json(state.scheduler.lock().await.status())
}

/// POST /api/alarm/check
///
/// Whether the alarm would fire for `sleep_stage` at `current_time`. Does not
/// fire it.
async fn alarm_check(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<AlarmCheckRequest>,
) -> Result<Json<AlarmCheckResponse>, ApiError> {
    let stage: StageLabel = request
        .sleep_stage
        .parse()
        .map_err(|e: ClassifyError| {
            api_error(StatusCode::BAD_REQUEST, "UNKNOWN_STAGE", e.to_string())
        })?;

    let now = request
        .current_time
        .map(|t| t.with_timezone(&Local))
        .unwrap_or_else(Local::now);
    let local = now.naive_local();

    let scheduler = state.scheduler.lock().await;
    Ok(Json(AlarmCheckResponse {
        should_wake_up: scheduler.should_wake(stage, local),
        current_time: now.to_rfc3339(),
        sleep_stage: stage,
        alarm_status: scheduler.status_at(local),
    }))
}

/// PUT /api/alarm/wake_time
async fn update_wake_time(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<WakeTimeRequest>,
) -> Json<WakeTimeResponse> {
    let parsed = state.scheduler.lock().await.update_wake_time(&request.wake_time);

    Json(WakeTimeResponse {
        wake_time: parsed.at().format("%H:%M").to_string(),
        defaulted: parsed.is_default(),
    })
}

/// POST /api/alarm/trigger
async fn trigger_alarm(
    State(state): State<Arc<ServerState>>,
) -> Result<Json<TriggerResponse>, ApiError> {
    let scheduler = Arc::clone(&state.scheduler);

    let escalation = tokio::task::spawn_blocking(move || scheduler.blocking_lock().trigger())
        .await
        .map_err(|e| {
            tracing::error!("Alarm task failed: {}", e);
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "ALARM_TASK_FAILED",
                e.to_string(),
            )
        })?;

    if escalation.is_some() {
        state.stats.record_alarm();
    }

    Ok(Json(TriggerResponse {
        triggered: true,
        escalation,
    }))
}

/// GET /api/sensor_data
async fn sensor_data(
    State(state): State<Arc<ServerState>>,
) -> Result<Json<SensorSample>, ApiError> {
    let sample = state.sensor.lock().await.next_sample().map_err(|e| {
        api_error(StatusCode::SERVICE_UNAVAILABLE, "SENSOR_UNAVAILABLE", e.to_string())
    })?;
    Ok(Json(sample))
}

/// GET /api/device/info
async fn device_info(State(state): State<Arc<ServerState>>) -> Json<DeviceInfo> {
    Json(state.sensor.lock().await.device_info())
}

/// Build the router over `state`.
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/status", get(status))
        .route("/api/sleep_analysis", post(sleep_analysis))
        .route("/api/alarm", get(alarm_status))
        .route("/api/alarm/check", post(alarm_check))
        .route("/api/alarm/wake_time", put(update_wake_time))
        .route("/api/alarm/trigger", post(trigger_alarm))
        .route("/api/sensor_data", get(sensor_data))
        .route("/api/device/info", get(device_info))
        .layer(
            CorsLayer::new()
                .allow_origin([
                    HeaderValue::from_static("http://localhost"),
                    HeaderValue::from_static("http://127.0.0.1"),
                ])
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Run the HTTP server
pub async fn run(
    config: ServerConfig,
) -> anyhow::Result<(SocketAddr, tokio::sync::oneshot::Sender<()>)> {
    let state = Arc::new(ServerState::new(&config)?);
    let app = router(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    tracing::info!("Smart wake server listening on http://{}", actual_addr);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                tracing::info!("Server shutdown signal received");
            })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    Ok((actual_addr, shutdown_tx))
}
