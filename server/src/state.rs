use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use shiftboard_shared::{BoardInput, BoardStatus, PlayerFilter, Roster, ShiftBoard, StatusSnapshot};
use tokio::sync::{Notify, RwLock, broadcast};
use tracing::warn;

use crate::config::{
    fetch_retry_attempts, fetch_retry_base_delay, refresh_interval_secs, sse_broadcast_buffer,
    status_sources, upstream_connect_timeout, upstream_http_timeout,
};

/// Pre-serialized SSE event, serialized once and shared by all clients.
#[derive(Debug, Clone)]
pub struct PreSerializedEvent {
    pub kind: &'static str,
    pub seq: u64,
    pub json: Arc<Bytes>,
}

/// What the dashboard currently shows. `snapshot` only ever moves forward to a
/// newer successful fetch; failures flip `status` but keep the data.
#[derive(Debug, Clone)]
pub struct LiveView {
    pub seq: u64,
    pub status: BoardStatus,
    pub snapshot: Option<StatusSnapshot>,
    pub last_error: Option<String>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub board_json: Arc<Bytes>,
}

impl Default for LiveView {
    fn default() -> Self {
        let mut view = Self {
            seq: 0,
            status: BoardStatus::Loading,
            snapshot: None,
            last_error: None,
            last_attempt_at: None,
            board_json: Arc::new(Bytes::new()),
        };
        view.board_json = view.serialize_board(&Roster::default());
        view
    }
}

impl LiveView {
    pub fn build_board(&self, roster: &Roster, filter: &PlayerFilter) -> ShiftBoard {
        let snapshot = self.snapshot.as_ref();
        let fetched_at = snapshot.map(|s| s.fetched_at.to_rfc3339());
        ShiftBoard::build(
            BoardInput {
                seq: self.seq,
                status: self.status,
                hostname: snapshot.and_then(|s| s.hostname.as_deref()),
                capacity: snapshot.and_then(|s| s.capacity),
                players: snapshot.map(|s| s.players.as_slice()).unwrap_or_default(),
                fetched_at: fetched_at.as_deref(),
                source: snapshot.map(|s| s.source.as_str()),
            },
            roster,
            filter,
        )
    }

    pub fn serialize_board(&self, roster: &Roster) -> Arc<Bytes> {
        let board = self.build_board(roster, &PlayerFilter::default());
        match serde_json::to_vec(&board) {
            Ok(json) => Arc::new(Bytes::from(json)),
            Err(e) => {
                warn!(error = %e, "failed to serialize board");
                Arc::new(Bytes::from_static(b"{}"))
            }
        }
    }
}

/// Roster layers: the file-configured base and the optional spreadsheet
/// overlay, plus their merge.
#[derive(Debug, Clone, Default)]
pub struct RosterState {
    pub base: Roster,
    pub remote: Option<Roster>,
    pub effective: Roster,
    pub remote_fetched_at: Option<DateTime<Utc>>,
}

impl RosterState {
    pub fn new(base: Roster) -> Self {
        Self {
            effective: base.clone(),
            base,
            remote: None,
            remote_fetched_at: None,
        }
    }

    /// Replace the overlay and recompute. Returns whether the effective roster changed.
    pub fn apply_remote(&mut self, remote: Roster) -> bool {
        let merged = Roster::merge(&self.base, &remote);
        let changed = merged.fingerprint() != self.effective.fingerprint();
        self.effective = merged;
        self.remote = Some(remote);
        self.remote_fetched_at = Some(Utc::now());
        changed
    }
}

const IN_FLIGHT: u8 = 0b01;
const MANUAL_PENDING: u8 = 0b10;

/// Countdown that drives automatic refreshes, plus the manual-refresh trigger
/// and the single in-flight fetch guard.
#[derive(Debug)]
pub struct RefreshControl {
    interval_secs: u64,
    remaining: AtomicU64,
    paused: AtomicBool,
    /// `IN_FLIGHT` and `MANUAL_PENDING` bits, updated together.
    fetch_flags: AtomicU8,
    manual: Notify,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct CountdownState {
    pub interval_secs: u64,
    pub remaining_secs: u64,
    pub paused: bool,
    pub refreshing: bool,
}

impl RefreshControl {
    pub fn new(interval_secs: u64) -> Self {
        let interval_secs = interval_secs.max(1);
        Self {
            interval_secs,
            remaining: AtomicU64::new(interval_secs),
            paused: AtomicBool::new(false),
            fetch_flags: AtomicU8::new(0),
            manual: Notify::new(),
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn reset(&self) {
        self.remaining.store(self.interval_secs, Ordering::Release);
    }

    /// One countdown second. Returns true when the countdown hit zero.
    pub fn tick(&self) -> bool {
        if self.paused.load(Ordering::Acquire) {
            return false;
        }
        let previous = self
            .remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |left| {
                Some(left.saturating_sub(1))
            })
            .unwrap_or(0);
        previous <= 1
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::Release);
    }

    pub fn resume(&self) {
        self.reset();
        self.paused.store(false, Ordering::Release);
    }

    /// Queue a manual refresh. Returns false when a fetch is already running;
    /// that fetch serves the request.
    pub fn request_manual(&self) -> bool {
        let queued = self
            .fetch_flags
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |flags| {
                (flags & IN_FLIGHT == 0).then_some(flags | MANUAL_PENDING)
            })
            .is_ok();
        if queued {
            self.manual.notify_one();
        }
        queued
    }

    /// Consume a queued manual request. False when a fetch started since the
    /// request was made and already covered it.
    pub fn take_manual(&self) -> bool {
        self.fetch_flags.fetch_and(!MANUAL_PENDING, Ordering::AcqRel) & MANUAL_PENDING != 0
    }

    pub async fn manual_requested(&self) {
        self.manual.notified().await;
    }

    /// Claim the in-flight slot. `None` means a fetch is already running.
    /// Claiming also settles any queued manual request.
    pub fn try_begin(&self) -> Option<InFlightGuard<'_>> {
        self.fetch_flags
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |flags| {
                (flags & IN_FLIGHT == 0).then_some(IN_FLIGHT)
            })
            .ok()
            .map(|_| InFlightGuard { control: self })
    }

    pub fn is_refreshing(&self) -> bool {
        self.fetch_flags.load(Ordering::Acquire) & IN_FLIGHT != 0
    }

    pub fn state(&self) -> CountdownState {
        CountdownState {
            interval_secs: self.interval_secs,
            remaining_secs: self.remaining.load(Ordering::Acquire),
            paused: self.paused.load(Ordering::Acquire),
            refreshing: self.is_refreshing(),
        }
    }
}

/// Releases the in-flight slot and restarts the countdown on drop, so every
/// attempt (successful or not) is followed by a full interval.
pub struct InFlightGuard<'a> {
    control: &'a RefreshControl,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.control.reset();
        self.control
            .fetch_flags
            .fetch_and(!IN_FLIGHT, Ordering::AcqRel);
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SourceHealth {
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
}

#[derive(Debug, Clone)]
pub struct FetchPolicy {
    /// Retries after the first attempt, per source.
    pub retry_attempts: usize,
    pub retry_base_delay: Duration,
}

#[derive(Clone)]
pub struct AppState {
    pub live: Arc<RwLock<LiveView>>,
    pub roster: Arc<RwLock<RosterState>>,
    pub event_tx: broadcast::Sender<PreSerializedEvent>,
    pub refresh: Arc<RefreshControl>,
    pub sources: Arc<Vec<String>>,
    pub source_health: Arc<DashMap<String, SourceHealth>>,
    pub fetch_policy: FetchPolicy,
    pub http_client: reqwest::Client,
    pub observability: Arc<ObservabilityCounters>,
}

#[derive(Debug, Default)]
pub struct ObservabilityCounters {
    fetch_attempts_total: AtomicU64,
    fetch_failures_total: AtomicU64,
    snapshots_applied_total: AtomicU64,
    stale_refreshes_total: AtomicU64,
    manual_refreshes_total: AtomicU64,
    coalesced_refreshes_total: AtomicU64,
    board_requests_total: AtomicU64,
    roster_refresh_failures_total: AtomicU64,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ObservabilitySnapshot {
    pub fetch_attempts_total: u64,
    pub fetch_failures_total: u64,
    pub snapshots_applied_total: u64,
    pub stale_refreshes_total: u64,
    pub manual_refreshes_total: u64,
    pub coalesced_refreshes_total: u64,
    pub board_requests_total: u64,
    pub roster_refresh_failures_total: u64,
}

impl ObservabilityCounters {
    pub fn snapshot(&self) -> ObservabilitySnapshot {
        ObservabilitySnapshot {
            fetch_attempts_total: self.fetch_attempts_total.load(Ordering::Relaxed),
            fetch_failures_total: self.fetch_failures_total.load(Ordering::Relaxed),
            snapshots_applied_total: self.snapshots_applied_total.load(Ordering::Relaxed),
            stale_refreshes_total: self.stale_refreshes_total.load(Ordering::Relaxed),
            manual_refreshes_total: self.manual_refreshes_total.load(Ordering::Relaxed),
            coalesced_refreshes_total: self.coalesced_refreshes_total.load(Ordering::Relaxed),
            board_requests_total: self.board_requests_total.load(Ordering::Relaxed),
            roster_refresh_failures_total: self
                .roster_refresh_failures_total
                .load(Ordering::Relaxed),
        }
    }

    pub fn record_fetch_attempt(&self) {
        self.fetch_attempts_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fetch_failure(&self) {
        self.fetch_failures_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_snapshot_applied(&self) {
        self.snapshots_applied_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stale_refresh(&self) {
        self.stale_refreshes_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_manual_refresh(&self) {
        self.manual_refreshes_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_coalesced_refresh(&self) {
        self.coalesced_refreshes_total
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_board_request(&self) {
        self.board_requests_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_roster_refresh_failure(&self) {
        self.roster_refresh_failures_total
            .fetch_add(1, Ordering::Relaxed);
    }
}

impl AppState {
    pub fn new(base_roster: Roster) -> Self {
        let (event_tx, _) = broadcast::channel(sse_broadcast_buffer());
        let request_timeout = upstream_http_timeout();
        let connect_timeout = upstream_connect_timeout();
        let http_client = reqwest::Client::builder()
            .user_agent("shiftboard/0.1")
            .timeout(request_timeout)
            .connect_timeout(connect_timeout)
            .build()
            .or_else(|e| {
                warn!(
                    error = %e,
                    "failed to build configured HTTP client, retrying without custom user-agent"
                );
                reqwest::Client::builder()
                    .timeout(request_timeout)
                    .connect_timeout(connect_timeout)
                    .build()
            })
            .unwrap_or_else(|e| {
                panic!("failed to build timeout-configured HTTP client: {e}");
            });
        let roster = RosterState::new(base_roster);
        let live = LiveView {
            board_json: LiveView::default().serialize_board(&roster.effective),
            ..LiveView::default()
        };
        Self {
            live: Arc::new(RwLock::new(live)),
            roster: Arc::new(RwLock::new(roster)),
            event_tx,
            refresh: Arc::new(RefreshControl::new(refresh_interval_secs())),
            sources: Arc::new(status_sources()),
            source_health: Arc::new(DashMap::new()),
            fetch_policy: FetchPolicy {
                retry_attempts: fetch_retry_attempts(),
                retry_base_delay: fetch_retry_base_delay(),
            },
            http_client,
            observability: Arc::new(ObservabilityCounters::default()),
        }
    }

    #[cfg(test)]
    pub fn with_sources(mut self, sources: Vec<String>) -> Self {
        self.sources = Arc::new(sources);
        self
    }

    #[cfg(test)]
    pub fn with_fetch_policy(mut self, policy: FetchPolicy) -> Self {
        self.fetch_policy = policy;
        self
    }

    #[cfg(test)]
    pub fn with_refresh_interval(mut self, interval_secs: u64) -> Self {
        self.refresh = Arc::new(RefreshControl::new(interval_secs));
        self
    }
}
