use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use chrono::Utc;
use shiftboard_shared::StatusSnapshot;
use tracing::{debug, info, warn};

use crate::config::FETCH_RETRY_MAX_DELAY_SECS;
use crate::error::{FetchError, body_preview};
use crate::normalize::{Normalized, parse_status_payload};
use crate::state::AppState;

/// Walk the configured sources in order and return the first snapshot that
/// decodes. Each source gets its own retry budget for retryable failures.
pub async fn fetch_snapshot(state: &AppState) -> Result<StatusSnapshot, FetchError> {
    let mut last_error = FetchError::NoSources;

    for (idx, url) in state.sources.iter().enumerate() {
        match fetch_with_retry(state, url).await {
            Ok(normalized) => {
                record_source_success(state, url);
                if idx > 0 {
                    info!(source = %url, skipped_sources = idx, "status served by fallback source");
                }
                return Ok(normalized.into_snapshot(url, Utc::now()));
            }
            Err(e) => {
                warn!(source = %url, error = %e, "status source failed");
                record_source_failure(state, url, &e);
                last_error = e;
            }
        }
    }

    Err(last_error)
}

async fn fetch_with_retry(state: &AppState, url: &str) -> Result<Normalized, FetchError> {
    let policy = &state.fetch_policy;
    let backoff = ExponentialBuilder::default()
        .with_min_delay(policy.retry_base_delay)
        .with_max_delay(Duration::from_secs(FETCH_RETRY_MAX_DELAY_SECS))
        .with_max_times(policy.retry_attempts)
        .with_jitter();

    (|| async {
        state.observability.record_fetch_attempt();
        fetch_from_source(&state.http_client, url).await
    })
    .retry(backoff)
    .sleep(tokio::time::sleep)
    .when(FetchError::is_retryable)
    .notify(|e: &FetchError, delay: Duration| {
        debug!(
            source = %url,
            error = %e,
            retry_in_ms = delay.as_millis() as u64,
            "retrying status fetch"
        );
    })
    .await
}

async fn fetch_from_source(client: &reqwest::Client, url: &str) -> Result<Normalized, FetchError> {
    let resp = client
        .get(url)
        .header(reqwest::header::CACHE_CONTROL, "no-store")
        .send()
        .await?;
    let status = resp.status();
    let bytes = resp.bytes().await?;

    if !status.is_success() {
        return Err(FetchError::Status {
            status,
            preview: body_preview(&bytes),
        });
    }

    parse_status_payload(bytes.as_ref()).map_err(|source| FetchError::Decode {
        source,
        preview: body_preview(&bytes),
    })
}

fn record_source_success(state: &AppState, url: &str) {
    let mut health = state.source_health.entry(url.to_string()).or_default();
    health.last_success_at = Some(Utc::now());
    health.consecutive_failures = 0;
}

fn record_source_failure(state: &AppState, url: &str, error: &FetchError) {
    let mut health = state.source_health.entry(url.to_string()).or_default();
    health.last_failure_at = Some(Utc::now());
    health.last_error = Some(error.to_string());
    health.consecutive_failures = health.consecutive_failures.saturating_add(1);
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use axum::Router;
    use axum::http::StatusCode;
    use axum::routing::get;
    use shiftboard_shared::Roster;

    use super::fetch_snapshot;
    use crate::error::FetchError;
    use crate::state::{AppState, FetchPolicy};
    use crate::test_support::{FRONTEND_PAYLOAD, spawn_test_server};

    fn counting_route(hits: Arc<AtomicUsize>, status: StatusCode, body: &'static str) -> axum::routing::MethodRouter {
        get(move || {
            let hits = Arc::clone(&hits);
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
                (status, body)
            }
        })
    }

    fn test_state(sources: Vec<String>, retry_attempts: usize) -> AppState {
        AppState::new(Roster::default())
            .with_sources(sources)
            .with_fetch_policy(FetchPolicy {
                retry_attempts,
                retry_base_delay: Duration::from_millis(1),
            })
    }

    #[tokio::test]
    async fn falls_back_to_next_source_after_retrying_server_errors() {
        let broken_hits = Arc::new(AtomicUsize::new(0));
        let ok_hits = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route(
                "/mirror",
                counting_route(Arc::clone(&broken_hits), StatusCode::BAD_GATEWAY, "down"),
            )
            .route(
                "/canonical",
                counting_route(Arc::clone(&ok_hits), StatusCode::OK, FRONTEND_PAYLOAD),
            );
        let (addr, server_handle) = spawn_test_server(app).await;
        let mirror = format!("http://{addr}/mirror");
        let canonical = format!("http://{addr}/canonical");
        let state = test_state(vec![mirror.clone(), canonical.clone()], 2);

        let snapshot = fetch_snapshot(&state).await.expect("fallback source should succeed");

        assert_eq!(snapshot.source, canonical);
        assert_eq!(snapshot.players.len(), 3);
        assert_eq!(broken_hits.load(Ordering::SeqCst), 3);
        assert_eq!(ok_hits.load(Ordering::SeqCst), 1);
        assert_eq!(state.observability.snapshot().fetch_attempts_total, 4);

        let mirror_health = state.source_health.get(&mirror).expect("mirror health recorded");
        assert_eq!(mirror_health.consecutive_failures, 1);
        assert!(mirror_health.last_error.as_deref().is_some_and(|e| e.contains("502")));
        drop(mirror_health);
        let canonical_health = state
            .source_health
            .get(&canonical)
            .expect("canonical health recorded");
        assert!(canonical_health.last_success_at.is_some());
        drop(canonical_health);

        server_handle.abort();
        let _ = server_handle.await;
    }

    #[tokio::test]
    async fn client_errors_and_bad_payloads_are_not_retried() {
        let missing_hits = Arc::new(AtomicUsize::new(0));
        let garbage_hits = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route(
                "/missing",
                counting_route(Arc::clone(&missing_hits), StatusCode::NOT_FOUND, "no such server"),
            )
            .route(
                "/garbage",
                counting_route(Arc::clone(&garbage_hits), StatusCode::OK, "<html>maintenance</html>"),
            );
        let (addr, server_handle) = spawn_test_server(app).await;
        let state = test_state(
            vec![format!("http://{addr}/missing"), format!("http://{addr}/garbage")],
            3,
        );

        let err = fetch_snapshot(&state).await.expect_err("both sources should fail");

        assert!(matches!(err, FetchError::Decode { .. }));
        assert!(err.to_string().contains("maintenance"));
        assert_eq!(missing_hits.load(Ordering::SeqCst), 1);
        assert_eq!(garbage_hits.load(Ordering::SeqCst), 1);

        server_handle.abort();
        let _ = server_handle.await;
    }

    #[tokio::test]
    async fn empty_source_list_reports_no_sources() {
        let state = test_state(Vec::new(), 0);
        let err = fetch_snapshot(&state).await.expect_err("nothing to fetch");
        assert!(matches!(err, FetchError::NoSources));
    }

    #[tokio::test]
    async fn unreachable_source_is_a_request_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind throwaway listener");
        let addr = listener.local_addr().expect("listener address");
        drop(listener);

        let state = test_state(vec![format!("http://{addr}/gone")], 0);
        let err = fetch_snapshot(&state).await.expect_err("closed port should fail");
        assert!(matches!(err, FetchError::Request(_)));
        assert!(err.is_retryable());
    }
}
