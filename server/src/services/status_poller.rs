use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use shiftboard_shared::{
    BoardEvent, BoardStatus, FAILED_MESSAGE, PlayerFilter, STALE_WARNING, StatusSnapshot,
};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::COUNTDOWN_TICK_SECS;
use crate::error::FetchError;
use crate::services::source_fetcher::fetch_snapshot;
use crate::state::{AppState, PreSerializedEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshTrigger {
    Startup,
    Countdown,
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Applied,
    /// Fetch failed, previous snapshot kept.
    Stale,
    /// Fetch failed with nothing to fall back to.
    Failed,
    /// Another fetch was already running.
    Coalesced,
}

/// Fetch once at boot, then refresh whenever the countdown runs out or a
/// manual refresh is requested.
pub async fn run(state: AppState) {
    info!(
        interval_secs = state.refresh.interval().as_secs(),
        sources = state.sources.len(),
        "status poller started"
    );

    refresh_now(&state, RefreshTrigger::Startup).await;

    let mut ticker = tokio::time::interval(Duration::from_secs(COUNTDOWN_TICK_SECS));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // First tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if state.refresh.tick() {
                    refresh_now(&state, RefreshTrigger::Countdown).await;
                }
            }
            () = state.refresh.manual_requested() => {
                if state.refresh.take_manual() {
                    refresh_now(&state, RefreshTrigger::Manual).await;
                } else {
                    debug!("manual refresh already served by a newer fetch");
                }
            }
        }
    }
}

pub async fn refresh_now(state: &AppState, trigger: RefreshTrigger) -> RefreshOutcome {
    let Some(_guard) = state.refresh.try_begin() else {
        state.observability.record_coalesced_refresh();
        debug!(?trigger, "refresh already in flight; skipping");
        return RefreshOutcome::Coalesced;
    };
    debug!(?trigger, "refreshing status snapshot");

    let result = fetch_snapshot(state).await;
    apply_fetch_result(state, result).await
}

/// Reconcile one fetch result into the live view. A failure never discards
/// the last good snapshot.
async fn apply_fetch_result(
    state: &AppState,
    result: Result<StatusSnapshot, FetchError>,
) -> RefreshOutcome {
    let (outcome, event) = {
        let mut guard = state.live.write().await;
        let live = &mut *guard;
        let roster = state.roster.read().await;

        let Some(seq) = live.seq.checked_add(1) else {
            warn!("sequence counter overflow while applying refresh result");
            return RefreshOutcome::Failed;
        };
        live.seq = seq;
        live.last_attempt_at = Some(Utc::now());

        match result {
            Ok(snapshot) => {
                info!(
                    players = snapshot.players.len(),
                    capacity = ?snapshot.capacity,
                    source = %snapshot.source,
                    "applied status snapshot"
                );
                live.snapshot = Some(snapshot);
                live.status = BoardStatus::Live;
                live.last_error = None;

                let board = live.build_board(&roster.effective, &PlayerFilter::default());
                live.board_json = serialize_or_empty(&board, "board");
                state.observability.record_snapshot_applied();
                (RefreshOutcome::Applied, BoardEvent::Snapshot { seq, board })
            }
            Err(e) => {
                state.observability.record_fetch_failure();
                let error_text = e.to_string();
                live.last_error = Some(error_text.clone());

                let (outcome, event) = match live.snapshot.as_ref() {
                    Some(previous) => {
                        warn!(
                            error = %e,
                            last_success = %previous.fetched_at.to_rfc3339(),
                            "refresh failed; serving last snapshot"
                        );
                        state.observability.record_stale_refresh();
                        let last_success = Some(previous.fetched_at.to_rfc3339());
                        live.status = BoardStatus::Stale;
                        (
                            RefreshOutcome::Stale,
                            BoardEvent::Stale {
                                seq,
                                warning: STALE_WARNING.to_string(),
                                error: error_text,
                                last_success,
                            },
                        )
                    }
                    None => {
                        error!(error = %e, "refresh failed and no snapshot is available");
                        live.status = BoardStatus::Failed;
                        (
                            RefreshOutcome::Failed,
                            BoardEvent::Failed {
                                seq,
                                message: FAILED_MESSAGE.to_string(),
                                error: error_text,
                            },
                        )
                    }
                };
                live.board_json = live.serialize_board(&roster.effective);
                (outcome, event)
            }
        }
    };

    broadcast_event(state, &event);
    outcome
}

/// Rebuild and broadcast the board after a roster change. The snapshot and
/// its status are left untouched.
pub async fn republish(state: &AppState) {
    let event = {
        let mut guard = state.live.write().await;
        let live = &mut *guard;
        let roster = state.roster.read().await;
        let Some(seq) = live.seq.checked_add(1) else {
            warn!("sequence counter overflow while republishing board");
            return;
        };
        live.seq = seq;
        let board = live.build_board(&roster.effective, &PlayerFilter::default());
        live.board_json = serialize_or_empty(&board, "board");
        BoardEvent::Snapshot { seq, board }
    };
    broadcast_event(state, &event);
}

fn broadcast_event(state: &AppState, event: &BoardEvent) {
    let json = serialize_or_empty(event, "board event");
    let _ = state.event_tx.send(PreSerializedEvent {
        kind: event.kind(),
        seq: event.seq(),
        json,
    });
}

fn serialize_or_empty<T: serde::Serialize>(value: &T, context: &str) -> Arc<Bytes> {
    match serde_json::to_vec(value) {
        Ok(json) => Arc::new(Bytes::from(json)),
        Err(e) => {
            warn!("failed to serialize {context}: {e}");
            Arc::new(Bytes::from_static(b"{}"))
        }
    }
}
