use std::fmt::Write as _;
use std::sync::Arc;

use axum::Json;
use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use serde::Deserialize;
use shiftboard_shared::{BoardStatus, PlayerFilter, Roster, ShiftFilter};

use crate::error::ApiError;
use crate::state::{AppState, CountdownState, ObservabilitySnapshot};

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";
const BOARD_CACHE_CONTROL: &str = "no-cache";

#[derive(Debug, Default, Deserialize)]
pub struct BoardQuery {
    search: Option<String>,
    shift: Option<String>,
}

/// The unfiltered board comes straight from the pre-serialized payload;
/// filtered views are built per request.
pub async fn get_board(
    State(state): State<AppState>,
    Query(query): Query<BoardQuery>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    state.observability.record_board_request();
    let filter = PlayerFilter::new(
        query.search.as_deref(),
        ShiftFilter::parse(query.shift.as_deref()),
    );

    if filter.is_unfiltered() {
        let (etag, json): (String, Arc<Bytes>) = {
            let live = state.live.read().await;
            (board_etag(live.seq), Arc::clone(&live.board_json))
        };

        if if_none_match_matches(&headers, &etag) {
            return Ok(not_modified_response(BOARD_CACHE_CONTROL, Some(etag.as_str())));
        }
        return Ok(json_bytes_response(
            (*json).clone(),
            BOARD_CACHE_CONTROL,
            Some(etag.as_str()),
        ));
    }

    let live = state.live.read().await;
    let roster = state.roster.read().await;
    if let ShiftFilter::Shift(shift) = &filter.shift
        && !roster.effective.contains_shift(shift)
    {
        return Err(ApiError::UnknownShift(shift.clone()));
    }
    let board = live.build_board(&roster.effective, &filter);

    Ok(([(header::CACHE_CONTROL, "no-store")], Json(board)).into_response())
}

pub async fn get_snapshot(State(state): State<AppState>) -> Result<Response, ApiError> {
    let live = state.live.read().await;
    let snapshot = live.snapshot.as_ref().ok_or(ApiError::NoSnapshot)?;
    Ok(([(header::CACHE_CONTROL, "no-store")], Json(snapshot)).into_response())
}

pub async fn get_roster(State(state): State<AppState>) -> impl IntoResponse {
    let roster = state.roster.read().await;
    Json(serde_json::json!({
        "groups": roster.effective,
        "base_members": roster.base.member_count(),
        "remote_members": roster.remote.as_ref().map(Roster::member_count),
        "remote_fetched_at": roster.remote_fetched_at,
    }))
}

/// Ask the poller for an immediate refresh. While a fetch is running the
/// request is folded into it.
pub async fn post_refresh(State(state): State<AppState>) -> impl IntoResponse {
    if !state.refresh.request_manual() {
        state.observability.record_coalesced_refresh();
        return (
            StatusCode::ACCEPTED,
            Json(serde_json::json!({ "status": "already_refreshing" })),
        );
    }

    state.observability.record_manual_refresh();
    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "status": "refreshing" })),
    )
}

pub async fn pause_refresh(State(state): State<AppState>) -> Json<CountdownState> {
    state.refresh.pause();
    Json(state.refresh.state())
}

pub async fn resume_refresh(State(state): State<AppState>) -> Json<CountdownState> {
    state.refresh.resume();
    Json(state.refresh.state())
}

pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let (seq, status, player_count, last_error, last_attempt_at) = {
        let live = state.live.read().await;
        (
            live.seq,
            live.status,
            live.snapshot.as_ref().map(|s| s.players.len()),
            live.last_error.clone(),
            live.last_attempt_at,
        )
    };
    let roster_members = state.roster.read().await.effective.member_count();
    let sources: Vec<serde_json::Value> = state
        .sources
        .iter()
        .map(|url| {
            let health = state
                .source_health
                .get(url)
                .map(|entry| entry.value().clone())
                .unwrap_or_default();
            serde_json::json!({ "url": url, "health": health })
        })
        .collect();

    Json(serde_json::json!({
        "status": "ok",
        "board_status": status,
        "seq": seq,
        "players_online": player_count,
        "roster_members": roster_members,
        "last_error": last_error,
        "last_attempt_at": last_attempt_at,
        "countdown": state.refresh.state(),
        "sources": sources,
        "observability": state.observability.snapshot(),
    }))
}

pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let (status, players_online) = {
        let live = state.live.read().await;
        (
            live.status,
            live.snapshot.as_ref().map_or(0, |s| s.players.len()),
        )
    };
    let gauges = BoardGauges {
        players_online,
        roster_members: state.roster.read().await.effective.member_count(),
        stale: matches!(status, BoardStatus::Stale | BoardStatus::Failed),
        paused: state.refresh.state().paused,
    };

    let body = render_prometheus_metrics(gauges, state.observability.snapshot());

    (
        [
            (header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-store"),
        ],
        body,
    )
}

#[derive(Debug, Clone, Copy)]
struct BoardGauges {
    players_online: usize,
    roster_members: usize,
    stale: bool,
    paused: bool,
}

fn write_metric(body: &mut String, name: &str, kind: &str, help: &str, value: u64) {
    let _ = writeln!(body, "# HELP shiftboard_{name} {help}");
    let _ = writeln!(body, "# TYPE shiftboard_{name} {kind}");
    let _ = writeln!(body, "shiftboard_{name} {value}");
}

fn render_prometheus_metrics(gauges: BoardGauges, observability: ObservabilitySnapshot) -> String {
    let mut body = String::new();

    write_metric(
        &mut body,
        "players_online",
        "gauge",
        "Players in the last successful snapshot.",
        gauges.players_online as u64,
    );
    write_metric(
        &mut body,
        "roster_members",
        "gauge",
        "Members in the effective roster.",
        gauges.roster_members as u64,
    );
    write_metric(
        &mut body,
        "board_stale",
        "gauge",
        "Whether the last refresh failed (1 or 0).",
        u64::from(gauges.stale),
    );
    write_metric(
        &mut body,
        "refresh_paused",
        "gauge",
        "Whether the refresh countdown is paused (1 or 0).",
        u64::from(gauges.paused),
    );

    let counters = [
        (
            "fetch_attempts_total",
            "Total upstream status requests, retries included.",
            observability.fetch_attempts_total,
        ),
        (
            "fetch_failures_total",
            "Refreshes where every status source failed.",
            observability.fetch_failures_total,
        ),
        (
            "snapshots_applied_total",
            "Successful refreshes applied to the board.",
            observability.snapshots_applied_total,
        ),
        (
            "stale_refreshes_total",
            "Failed refreshes that kept the previous snapshot.",
            observability.stale_refreshes_total,
        ),
        (
            "manual_refreshes_total",
            "Manual refresh requests accepted.",
            observability.manual_refreshes_total,
        ),
        (
            "coalesced_refreshes_total",
            "Refresh requests folded into a running fetch.",
            observability.coalesced_refreshes_total,
        ),
        (
            "board_requests_total",
            "Total board API requests.",
            observability.board_requests_total,
        ),
        (
            "roster_refresh_failures_total",
            "Failed roster spreadsheet refreshes.",
            observability.roster_refresh_failures_total,
        ),
    ];
    for (name, help, value) in counters {
        write_metric(&mut body, name, "counter", help, value);
    }

    body
}

fn board_etag(seq: u64) -> String {
    format!("\"board-{seq}\"")
}

fn json_bytes_response(body: Bytes, cache_control: &'static str, etag: Option<&str>) -> Response {
    let mut response = Response::new(Body::from(body));
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static(cache_control),
    );
    if let Some(etag) = etag
        && let Ok(etag_header) = HeaderValue::from_str(etag)
    {
        headers.insert(header::ETAG, etag_header);
    }
    response
}

fn not_modified_response(cache_control: &'static str, etag: Option<&str>) -> Response {
    let mut response = StatusCode::NOT_MODIFIED.into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static(cache_control),
    );
    if let Some(etag) = etag
        && let Ok(etag_header) = HeaderValue::from_str(etag)
    {
        headers.insert(header::ETAG, etag_header);
    }
    response
}

fn normalize_etag(candidate: &str) -> &str {
    candidate.strip_prefix("W/").unwrap_or(candidate).trim()
}

fn if_none_match_matches(headers: &HeaderMap, etag: &str) -> bool {
    let Some(value) = headers.get(header::IF_NONE_MATCH) else {
        return false;
    };
    let Ok(raw) = value.to_str() else {
        return false;
    };

    raw.split(',').any(|candidate| {
        let candidate = candidate.trim();
        candidate == "*" || normalize_etag(candidate) == normalize_etag(etag)
    })
}
