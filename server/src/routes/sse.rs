use std::convert::Infallible;
use std::time::Duration;

use axum::extract::State;
use axum::response::Sse;
use axum::response::sse::{Event, KeepAlive};
use bytes::Bytes;
use futures::stream::Stream;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::warn;

use crate::config::SSE_KEEPALIVE_SECS;
use crate::state::AppState;

/// Current board on connect, then every refresh outcome as it happens.
pub async fn board_events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = async_stream::stream! {
        // Subscribe before reading the board so nothing published in between is lost.
        let rx = state.event_tx.subscribe();

        if let Some(event) = current_board_event(&state).await {
            yield Ok(event);
        }

        let mut stream = BroadcastStream::new(rx);
        while let Some(result) = stream.next().await {
            match result {
                Ok(event) => {
                    let Some(payload) = event_payload(event.json.as_ref()) else {
                        warn!(
                            seq = event.seq,
                            event = event.kind,
                            "event payload is not valid utf-8; dropping SSE event"
                        );
                        continue;
                    };
                    yield Ok(
                        Event::default()
                            .id(event.seq.to_string())
                            .event(event.kind)
                            .data(payload),
                    );
                }
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    warn!(
                        skipped_events = skipped,
                        "SSE client lagged behind broadcast buffer; replaying board"
                    );
                    if let Some(event) = current_board_event(&state).await {
                        yield Ok(event);
                    }
                }
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(SSE_KEEPALIVE_SECS))
            .text("keep-alive"),
    )
}

async fn current_board_event(state: &AppState) -> Option<Event> {
    let (seq, data) = {
        let live = state.live.read().await;
        (live.seq, live.board_json.clone())
    };
    if data.is_empty() {
        return None;
    }
    let Some(payload) = event_payload(data.as_ref()) else {
        warn!(seq, "board payload is not valid utf-8; skipping SSE board event");
        return None;
    };
    Some(
        Event::default()
            .id(seq.to_string())
            .event("board")
            .data(payload),
    )
}

fn event_payload(bytes: &Bytes) -> Option<&str> {
    std::str::from_utf8(bytes.as_ref()).ok()
}
