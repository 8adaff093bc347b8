//! HTTP API endpoints.
//!
//! Everything is read-only except the logging toggle and the log clear.
//!
//! # Lock Acquisition
//!
//! Handlers take `state.config` (read) before `state.store`, and hold the
//! store mutex only for the duration of a query.
//!
//! ## Error Handling
//!
//! All endpoints return structured JSON errors via [`AppError`]. Store errors
//! return HTTP 500; malformed input returns 400 and unknown history ids 404.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State, rejection::JsonRejection, rejection::QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime};
use tracing::warn;

use powerman_core::{Phase, PhaseReading};
use powerman_store::{
    HistoryQuery, HistorySummary, LogRecord, RawCounterRow, StoredHistoryRecord, TotalsRow,
};
use powerman_types::checked_delta;

use crate::journal;
use crate::state::{AppState, CycleSummary, PhaseStats};

/// Default number of log entries returned by `GET /logs`.
pub const DEFAULT_LOG_LIMIT: u32 = 10;
/// Largest accepted `limit` for `GET /logs`.
pub const MAX_LOG_LIMIT: u32 = 1000;

/// Create the API router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/status", get(get_status))
        // Ledger
        .route("/raw_data", get(raw_data))
        .route("/total_data", get(total_data))
        // Live meter read
        .route("/data", get(live_data))
        // Diagnostic log
        .route("/logs", get(get_logs))
        .route("/toggle_logging", post(toggle_logging))
        .route("/get_logging_state", get(get_logging_state))
        .route("/clear_logs", post(clear_logs))
        // History lookups
        .route("/data_page", get(data_page_summary).post(data_page_query))
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: OffsetDateTime::now_utc(),
    })
}

/// Service status response.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub version: &'static str,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub collector: CollectorStatus,
    /// Read statistics keyed by phase label.
    pub phases: BTreeMap<&'static str, PhaseStats>,
}

/// Poll loop status.
#[derive(Debug, Serialize)]
pub struct CollectorStatus {
    pub running: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub started_at: Option<OffsetDateTime>,
    pub uptime_seconds: Option<u64>,
    pub cycles: u64,
    pub last_cycle: Option<CycleSummary>,
}

async fn get_status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let started_at = state.collector.started_at();
    let uptime_seconds = started_at
        .filter(|_| state.collector.is_running())
        .map(|s| (OffsetDateTime::now_utc() - s).whole_seconds().max(0) as u64);

    let stats = state.collector.phase_stats.read().await.clone();
    let phases = Phase::ALL
        .into_iter()
        .map(|p| (p.label(), stats[p].clone()))
        .collect();

    Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION"),
        timestamp: OffsetDateTime::now_utc(),
        collector: CollectorStatus {
            running: state.collector.is_running(),
            started_at,
            uptime_seconds,
            cycles: state.collector.cycles(),
            last_cycle: state.collector.last_cycle.read().await.clone(),
        },
        phases,
    })
}

async fn raw_data(State(state): State<Arc<AppState>>) -> Result<Json<RawCounterRow>, AppError> {
    let store = state.store.lock().await;
    Ok(Json(store.raw_counters()?))
}

async fn total_data(State(state): State<Arc<AppState>>) -> Result<Json<TotalsRow>, AppError> {
    let store = state.store.lock().await;
    Ok(Json(store.totals()?))
}

/// Read every configured meter now, without touching the store.
///
/// Phases that cannot be read are left out of the response.
async fn live_data(State(state): State<Arc<AppState>>) -> Json<BTreeMap<&'static str, PhaseReading>> {
    let targets = state.config.read().await.targets();
    let results = join_all(targets.iter().map(|t| state.source.read_phase(t))).await;

    let readings = targets
        .iter()
        .zip(results)
        .filter_map(|(target, result)| match result {
            Ok(reading) => Some((target.phase.label(), reading)),
            Err(e) => {
                warn!("Live read of {} failed: {}", target, e);
                None
            }
        })
        .collect();

    Json(readings)
}

/// Query parameters for `GET /logs`.
#[derive(Debug, Deserialize, Default)]
pub struct LogsQuery {
    pub limit: Option<u32>,
}

impl LogsQuery {
    /// Requested limit, defaulted and checked.
    pub fn limit(&self) -> Result<u32, AppError> {
        match self.limit {
            None => Ok(DEFAULT_LOG_LIMIT),
            Some(limit) if (1..=MAX_LOG_LIMIT).contains(&limit) => Ok(limit),
            Some(limit) => Err(AppError::BadRequest(format!(
                "Invalid limit {}: must be between 1 and {}",
                limit, MAX_LOG_LIMIT
            ))),
        }
    }
}

/// Most recent log entries, newest first. Empty while logging is disabled.
async fn get_logs(
    State(state): State<Arc<AppState>>,
    query: Result<Query<LogsQuery>, QueryRejection>,
) -> Result<Json<Vec<LogRecord>>, AppError> {
    let Query(query) = query.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let limit = query.limit()?;

    let store = state.store.lock().await;
    if !store.logging_enabled()? {
        return Ok(Json(Vec::new()));
    }
    Ok(Json(store.recent_logs(limit)?))
}

/// Logging flag response.
#[derive(Debug, Serialize, Deserialize)]
pub struct LoggingState {
    pub logging_enabled: bool,
}

async fn toggle_logging(State(state): State<Arc<AppState>>) -> Result<Json<LoggingState>, AppError> {
    let store = state.store.lock().await;
    let logging_enabled = journal::toggle(&store, OffsetDateTime::now_utc())?;
    Ok(Json(LoggingState { logging_enabled }))
}

async fn get_logging_state(
    State(state): State<Arc<AppState>>,
) -> Result<Json<LoggingState>, AppError> {
    let store = state.store.lock().await;
    Ok(Json(LoggingState {
        logging_enabled: store.logging_enabled()?,
    }))
}

/// Response for `POST /clear_logs`.
#[derive(Debug, Serialize)]
pub struct ClearLogsResponse {
    pub status: &'static str,
    pub message: &'static str,
    pub deleted: usize,
}

async fn clear_logs(State(state): State<Arc<AppState>>) -> Result<Json<ClearLogsResponse>, AppError> {
    let store = state.store.lock().await;
    let deleted = journal::clear(&store, OffsetDateTime::now_utc())?;
    Ok(Json(ClearLogsResponse {
        status: "success",
        message: journal::LOGS_CLEARED_MESSAGE,
        deleted,
    }))
}

/// Overview of the stored history, so a client can pick ids or dates.
async fn data_page_summary(
    State(state): State<Arc<AppState>>,
) -> Result<Json<HistorySummary>, AppError> {
    let store = state.store.lock().await;
    Ok(Json(store.history_summary()?))
}

/// Per-phase counter difference between two history snapshots.
#[derive(Debug, Serialize)]
pub struct Differences {
    #[serde(rename = "L1Difference")]
    pub l1: u32,
    #[serde(rename = "L2Difference")]
    pub l2: u32,
    #[serde(rename = "L3Difference")]
    pub l3: u32,
}

/// Response for a point-to-point comparison.
#[derive(Debug, Serialize)]
pub struct ComparisonResponse {
    pub result1: StoredHistoryRecord,
    pub result2: StoredHistoryRecord,
    pub differences: Differences,
}

/// History lookups.
///
/// The JSON body selects the operation:
///
/// - `{"inputId1": .., "inputId2": ..}` compares two snapshots
/// - `{"dateStart": .., "dateStop": ..}` lists snapshots in an inclusive range
async fn data_page_query(
    State(state): State<Arc<AppState>>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(body) = body.map_err(|e| AppError::BadRequest(e.body_text()))?;

    if let (Some(first), Some(second)) = (body.get("inputId1"), body.get("inputId2")) {
        let first = parse_id(first)?;
        let second = parse_id(second)?;
        let comparison = compare_history(&state, first, second).await?;
        return Ok(Json(comparison).into_response());
    }

    if let (Some(start), Some(stop)) = (body.get("dateStart"), body.get("dateStop")) {
        let (Some(start), Some(stop)) = (start.as_str(), stop.as_str()) else {
            return Err(AppError::BadRequest(
                "dateStart and dateStop must be strings".to_string(),
            ));
        };
        let since = parse_timestamp(start)?;
        let until = parse_timestamp(stop)?;
        if since > until {
            return Err(AppError::BadRequest(format!(
                "Invalid time range: dateStart ({}) is after dateStop ({})",
                start, stop
            )));
        }

        let store = state.store.lock().await;
        let records = store.query_history(&HistoryQuery::new().since(since).until(until))?;
        return Ok(Json(records).into_response());
    }

    Err(AppError::BadRequest(
        "Expected either inputId1 and inputId2, or dateStart and dateStop".to_string(),
    ))
}

async fn compare_history(
    state: &AppState,
    first_id: i64,
    second_id: i64,
) -> Result<ComparisonResponse, AppError> {
    let store = state.store.lock().await;
    let (Some(first), Some(second)) = (store.get_history(first_id)?, store.get_history(second_id)?)
    else {
        return Err(AppError::NotFound("History record not found".to_string()));
    };
    drop(store);

    let diff = |phase: Phase| {
        checked_delta(first.raw(phase), second.raw(phase)).map_err(|e| {
            AppError::Internal(format!(
                "Corrupt history between records {} and {}: {}",
                first.id, second.id, e
            ))
        })
    };
    let differences = Differences {
        l1: diff(Phase::L1)?,
        l2: diff(Phase::L2)?,
        l3: diff(Phase::L3)?,
    };

    Ok(ComparisonResponse {
        result1: first,
        result2: second,
        differences,
    })
}

/// Accept ids sent as JSON numbers or as numeric strings (form inputs).
fn parse_id(value: &Value) -> Result<i64, AppError> {
    let parsed = match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) if !s.trim().is_empty() => s.trim().parse().ok(),
        Value::String(_) | Value::Null => {
            return Err(AppError::BadRequest("Both ids must be set".to_string()));
        }
        _ => None,
    };
    parsed.ok_or_else(|| AppError::BadRequest(format!("Invalid history id: {}", value)))
}

/// Parse an ISO-8601 timestamp.
///
/// RFC 3339 input (`Z` or an explicit offset) is taken as is. Input without
/// an offset, such as `2024-05-01T12:00` from a browser date picker, is
/// treated as UTC. The date and time may be separated by a space, seconds may
/// carry a fraction, and a bare date means midnight.
pub fn parse_timestamp(input: &str) -> Result<OffsetDateTime, AppError> {
    let trimmed = input.trim();
    let normalized;
    let input = match trimmed.as_bytes().get(10) {
        Some(b' ') => {
            normalized = format!("{}T{}", &trimmed[..10], &trimmed[11..]);
            normalized.as_str()
        }
        _ => trimmed,
    };

    if let Ok(parsed) = OffsetDateTime::parse(input, &Rfc3339) {
        return Ok(parsed);
    }

    let naive_formats = [
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]"),
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
        format_description!("[year]-[month]-[day]T[hour]:[minute]"),
    ];
    naive_formats
        .iter()
        .find_map(|format| PrimitiveDateTime::parse(input, *format).ok())
        .or_else(|| {
            Date::parse(input, format_description!("[year]-[month]-[day]"))
                .ok()
                .map(Date::midnight)
        })
        .map(PrimitiveDateTime::assume_utc)
        .ok_or_else(|| {
            AppError::BadRequest(format!(
                "Invalid timestamp '{}': expected ISO-8601 (e.g. 2024-05-01T12:00:00Z)",
                trimmed
            ))
        })
}

/// Application error type.
#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    BadRequest(String),
    Store(powerman_store::Error),
    Internal(String),
}

impl From<powerman_store::Error> for AppError {
    fn from(e: powerman_store::Error) -> Self {
        AppError::Store(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Store(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = serde_json::json!({
            "error": message,
        });

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request};
    use http_body_util::BodyExt;
    use powerman_core::{MockSource, PhaseSet};
    use powerman_store::Store;
    use time::macros::datetime;
    use tower::ServiceExt;

    use crate::config::Config;
    use crate::sink::RecordingSink;

    const T0: OffsetDateTime = datetime!(2024-05-01 12:00:00 UTC);

    fn create_test_state() -> (Arc<AppState>, Arc<MockSource>) {
        let source = Arc::new(MockSource::new());
        let state = AppState::new(
            Store::open_in_memory().unwrap(),
            Config::default(),
            source.clone(),
            Arc::new(RecordingSink::new()),
        );
        (state, source)
    }

    async fn send(state: &Arc<AppState>, request: Request<Body>) -> (StatusCode, Value) {
        let response = router()
            .with_state(Arc::clone(state))
            .oneshot(request)
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    async fn get(state: &Arc<AppState>, uri: &str) -> (StatusCode, Value) {
        send(state, Request::builder().uri(uri).body(Body::empty()).unwrap()).await
    }

    async fn post_json(state: &Arc<AppState>, uri: &str, body: Value) -> (StatusCode, Value) {
        send(
            state,
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    async fn seed_history(state: &Arc<AppState>, rows: &[(u16, u16, u16)]) -> Vec<i64> {
        let store = state.store.lock().await;
        rows.iter()
            .enumerate()
            .map(|(i, (l1, l2, l3))| {
                store
                    .append_history(
                        &PhaseSet::new(*l1, *l2, *l3),
                        T0 + time::Duration::minutes(i as i64),
                    )
                    .unwrap()
                    .id
            })
            .collect()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let (state, _) = create_test_state();
        let (status, json) = get(&state, "/api/health").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
        assert!(json["version"].is_string());
        assert!(json["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_status_endpoint() {
        let (state, _) = create_test_state();
        let (status, json) = get(&state, "/api/status").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["collector"]["running"], false);
        assert_eq!(json["collector"]["cycles"], 0);
        assert!(json["collector"]["last_cycle"].is_null());
        assert_eq!(json["phases"]["L2"]["success_count"], 0);
    }

    #[tokio::test]
    async fn test_raw_and_total_data() {
        let (state, _) = create_test_state();
        {
            let store = state.store.lock().await;
            let observe = |a, b, c| PhaseSet::new(Some(a), Some(b), Some(c));
            store.apply_reading(&observe(100, 200, 150), T0).unwrap();
            store
                .apply_reading(&observe(150, 50, 150), T0 + time::Duration::seconds(10))
                .unwrap();
        }

        let (status, raw) = get(&state, "/raw_data").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(raw["L1raw"], 150);
        assert_eq!(raw["L2raw"], 50);
        assert_eq!(raw["timestamp"], "2024-05-01T12:00:10Z");

        let (status, total) = get(&state, "/total_data").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(total["L1total"], 50.0);
        assert_eq!(total["L2total"], 65386.0);
        assert_eq!(total["L3total"], 0.0);
    }

    #[tokio::test]
    async fn test_live_data_skips_failing_phase() {
        let (state, source) = create_test_state();
        source.set_energy(Phase::L1, 1200).await;
        source.set_failing(Phase::L2, true).await;

        let (status, json) = get(&state, "/data").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["L1"]["energy_low"], 1200);
        assert!(json.get("L2").is_none());
        assert!(json["L3"].is_object());
        assert_eq!(state.store.lock().await.count_history().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_logs_empty_when_disabled() {
        let (state, _) = create_test_state();
        state.store.lock().await.insert_log("hidden", T0).unwrap();

        let (status, json) = get(&state, "/logs").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json, serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_logs_limit() {
        let (state, _) = create_test_state();
        {
            let store = state.store.lock().await;
            store.set_logging_enabled(true).unwrap();
            for i in 0..15 {
                store
                    .insert_log(&format!("entry {i}"), T0 + time::Duration::seconds(i))
                    .unwrap();
            }
        }

        let (_, json) = get(&state, "/logs").await;
        assert_eq!(json.as_array().unwrap().len(), 10);
        assert_eq!(json[0]["message"], "entry 14");

        let (_, json) = get(&state, "/logs?limit=3").await;
        assert_eq!(json.as_array().unwrap().len(), 3);

        let (status, json) = get(&state, "/logs?limit=abc").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].is_string());

        let (status, _) = get(&state, "/logs?limit=0").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_toggle_logging() {
        let (state, _) = create_test_state();

        let (_, json) = get(&state, "/get_logging_state").await;
        assert_eq!(json["logging_enabled"], false);

        let (status, json) = post_json(&state, "/toggle_logging", Value::Null).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["logging_enabled"], true);

        let (_, json) = get(&state, "/get_logging_state").await;
        assert_eq!(json["logging_enabled"], true);

        let (_, logs) = get(&state, "/logs").await;
        assert_eq!(logs[0]["message"], journal::LOGGING_ENABLED_MESSAGE);

        let (_, json) = post_json(&state, "/toggle_logging", Value::Null).await;
        assert_eq!(json["logging_enabled"], false);
    }

    #[tokio::test]
    async fn test_clear_logs() {
        let (state, _) = create_test_state();
        {
            let store = state.store.lock().await;
            store.set_logging_enabled(true).unwrap();
            store.insert_log("one", T0).unwrap();
            store.insert_log("two", T0).unwrap();
        }

        let (status, json) = post_json(&state, "/clear_logs", Value::Null).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "success");
        assert_eq!(json["deleted"], 2);

        let (_, logs) = get(&state, "/logs").await;
        assert_eq!(logs.as_array().unwrap().len(), 1);
        assert_eq!(logs[0]["message"], journal::LOGS_CLEARED_MESSAGE);
    }

    #[tokio::test]
    async fn test_data_page_summary() {
        let (state, _) = create_test_state();
        let ids = seed_history(&state, &[(1, 1, 1), (2, 2, 2), (3, 3, 3)]).await;

        let (status, json) = get(&state, "/data_page").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["count"], 3);
        assert_eq!(json["first"]["id"], ids[0]);
        assert_eq!(json["last"]["L1history"], 3);
    }

    #[tokio::test]
    async fn test_range_query() {
        let (state, _) = create_test_state();
        seed_history(&state, &[(1, 1, 1), (2, 2, 2), (3, 3, 3), (4, 4, 4)]).await;

        let body = serde_json::json!({
            "dateStart": "2024-05-01T12:01:00Z",
            "dateStop": "2024-05-01T12:02",
        });
        let (status, json) = post_json(&state, "/data_page", body).await;
        assert_eq!(status, StatusCode::OK);
        let records = json.as_array().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["L1history"], 2);
        assert_eq!(records[1]["L1history"], 3);
    }

    #[tokio::test]
    async fn test_range_query_empty_vs_malformed() {
        let (state, _) = create_test_state();
        seed_history(&state, &[(1, 1, 1)]).await;

        let empty = serde_json::json!({
            "dateStart": "2023-01-01T00:00:00Z",
            "dateStop": "2023-01-02T00:00:00Z",
        });
        let (status, json) = post_json(&state, "/data_page", empty).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json, serde_json::json!([]));

        let malformed = serde_json::json!({
            "dateStart": "yesterday",
            "dateStop": "2023-01-02T00:00:00Z",
        });
        let (status, json) = post_json(&state, "/data_page", malformed).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().unwrap().contains("yesterday"));

        let reversed = serde_json::json!({
            "dateStart": "2023-01-02T00:00:00Z",
            "dateStop": "2023-01-01T00:00:00Z",
        });
        let (status, _) = post_json(&state, "/data_page", reversed).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_compare_history_with_wrap() {
        let (state, _) = create_test_state();
        let ids = seed_history(&state, &[(65530, 200, 10), (5, 250, 10)]).await;

        let body = serde_json::json!({ "inputId1": ids[1], "inputId2": ids[0].to_string() });
        let (status, json) = post_json(&state, "/data_page", body).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["result1"]["id"], ids[1]);
        assert_eq!(json["result2"]["id"], ids[0]);
        assert_eq!(json["differences"]["L1Difference"], 11);
        assert_eq!(json["differences"]["L2Difference"], 50);
        assert_eq!(json["differences"]["L3Difference"], 0);
    }

    #[tokio::test]
    async fn test_compare_history_errors() {
        let (state, _) = create_test_state();
        let ids = seed_history(&state, &[(1, 1, 1)]).await;

        let missing = serde_json::json!({ "inputId1": "", "inputId2": ids[0] });
        let (status, _) = post_json(&state, "/data_page", missing).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let unknown = serde_json::json!({ "inputId1": ids[0], "inputId2": 999 });
        let (status, json) = post_json(&state, "/data_page", unknown).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(json["error"].is_string());

        let neither = serde_json::json!({ "foo": 1 });
        let (status, _) = post_json(&state, "/data_page", neither).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_data_page_rejects_invalid_json() {
        let (state, _) = create_test_state();
        let (status, json) = send(
            &state,
            Request::builder()
                .method("POST")
                .uri("/data_page")
                .header("content-type", "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].is_string());
    }

    #[test]
    fn test_parse_timestamp_formats() {
        assert_eq!(parse_timestamp("2024-05-01T12:00:00Z").unwrap(), T0);
        assert_eq!(parse_timestamp("2024-05-01T15:00:00+03:00").unwrap(), T0);
        assert_eq!(parse_timestamp("2024-05-01T12:00:00").unwrap(), T0);
        assert_eq!(parse_timestamp(" 2024-05-01T12:00 ").unwrap(), T0);
        assert!(parse_timestamp("01/05/2024").is_err());
    }

    #[test]
    fn test_parse_timestamp_loose_iso_forms() {
        assert_eq!(parse_timestamp("2024-05-01T12:00:00.000").unwrap(), T0);
        assert_eq!(
            parse_timestamp("2024-05-01T12:00:00.250").unwrap(),
            T0 + time::Duration::milliseconds(250)
        );
        assert_eq!(parse_timestamp("2024-05-01 12:00:00").unwrap(), T0);
        assert_eq!(parse_timestamp("2024-05-01 12:00").unwrap(), T0);
        assert_eq!(parse_timestamp("2024-05-01 15:00:00+03:00").unwrap(), T0);
        assert_eq!(
            parse_timestamp("2024-05-01").unwrap(),
            datetime!(2024-05-01 00:00:00 UTC)
        );
        assert!(parse_timestamp("2024-13-01").is_err());
    }

    #[test]
    fn test_parse_id() {
        assert_eq!(parse_id(&serde_json::json!(7)).unwrap(), 7);
        assert_eq!(parse_id(&serde_json::json!(" 8 ")).unwrap(), 8);
        assert!(parse_id(&serde_json::json!("")).is_err());
        assert!(parse_id(&serde_json::json!("x")).is_err());
        assert!(parse_id(&serde_json::json!(1.5)).is_err());
    }

    #[test]
    fn test_app_error_status_codes() {
        let cases = [
            (AppError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (AppError::BadRequest("x".into()), StatusCode::BAD_REQUEST),
            (AppError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (error, expected) in cases {
            assert_eq!(error.into_response().status(), expected);
        }
    }
}
