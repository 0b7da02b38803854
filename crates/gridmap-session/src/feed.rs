//! Reconnecting progress event stream.
//!
//! [`run_feed`] keeps one connection to the event stream open until its
//! cancellation token fires:
//!
//! ```text
//! Disconnected ──► Connecting ──► Open ──► Closed ──(backoff)──► Connecting
//!       ▲                                                            │
//!       └───────────────────────── cancelled ◄───────────────────────┘
//! ```
//!
//! On every `Open`, and whenever the tracker's watched list changes, a
//! `subscribe` frame with the watched scenario ids is sent.

use std::time::Duration;

use async_trait::async_trait;
use gridmap_core::ScenarioId;
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::events::ProgressEvent;
use crate::progress::{ProgressTracker, ProgressUpdate, SubscribeRequest};

/// Connection state of the event stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedState {
    Disconnected,
    Connecting,
    Open,
    Closed,
}

/// Delay before reconnect attempt `attempt` (1-based).
pub trait Backoff: Send + Sync {
    fn delay(&self, attempt: u32) -> Duration;
}

/// Same delay for every attempt, retrying forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedBackoff(pub Duration);

impl Default for FixedBackoff {
    fn default() -> Self {
        Self(Duration::from_millis(500))
    }
}

impl Backoff for FixedBackoff {
    fn delay(&self, _attempt: u32) -> Duration {
        self.0
    }
}

/// An open event stream connection.
#[async_trait]
pub trait FeedConnection: Send {
    async fn send_text(&mut self, text: String) -> Result<()>;

    /// Next text frame, or `None` once the peer closed the connection.
    async fn recv_text(&mut self) -> Result<Option<String>>;
}

/// Opens event stream connections.
#[async_trait]
pub trait FeedConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn FeedConnection>>;
}

/// Run the event stream until `cancel` fires, feeding frames into `tracker`.
pub async fn run_feed<C, B>(
    connector: &C,
    tracker: &ProgressTracker,
    backoff: &B,
    cancel: CancellationToken,
) where
    C: FeedConnector + ?Sized,
    B: Backoff + ?Sized,
{
    let mut events = tracker.subscribe();
    let mut attempt: u32 = 0;

    while !cancel.is_cancelled() {
        tracker.emit(ProgressEvent::Feed(FeedState::Connecting));

        let connected = tokio::select! {
            _ = cancel.cancelled() => break,
            connected = connector.connect() => connected,
        };

        match connected {
            Ok(mut connection) => {
                attempt = 0;
                info!("event stream connected");
                tracker.emit(ProgressEvent::Feed(FeedState::Open));

                let finished = serve(connection.as_mut(), tracker, &mut events, &cancel).await;
                if finished {
                    break;
                }
                info!("event stream closed");
            }
            Err(e) => warn!(error = %e, "event stream connection failed"),
        }

        tracker.emit(ProgressEvent::Feed(FeedState::Closed));
        attempt = attempt.saturating_add(1);
        let delay = backoff.delay(attempt);
        debug!(attempt, ?delay, "reconnecting event stream");

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    tracker.emit(ProgressEvent::Feed(FeedState::Disconnected));
}

/// Pump one open connection. Returns `true` when cancelled.
async fn serve(
    connection: &mut dyn FeedConnection,
    tracker: &ProgressTracker,
    events: &mut tokio::sync::broadcast::Receiver<ProgressEvent>,
    cancel: &CancellationToken,
) -> bool {
    if let Err(e) = subscribe(connection, tracker.watched_ids()).await {
        warn!(error = %e, "event stream subscribe failed");
        return false;
    }

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return true,
            event = events.recv() => {
                let ids = match event {
                    Ok(ProgressEvent::WatchChanged { ids }) => ids,
                    Err(RecvError::Lagged(_)) => tracker.watched_ids(),
                    Ok(_) | Err(RecvError::Closed) => continue,
                };
                if let Err(e) = subscribe(connection, ids).await {
                    warn!(error = %e, "event stream subscribe failed");
                    return false;
                }
            }
            frame = connection.recv_text() => match frame {
                Ok(Some(text)) => handle_frame(tracker, &text),
                Ok(None) => return false,
                Err(e) => {
                    warn!(error = %e, "event stream read failed");
                    return false;
                }
            },
        }
    }
}

async fn subscribe(connection: &mut dyn FeedConnection, ids: Vec<ScenarioId>) -> Result<()> {
    debug!(count = ids.len(), "subscribing to scenario progress");
    let frame = serde_json::to_string(&SubscribeRequest::scenarios(ids))?;
    connection.send_text(frame).await
}

fn handle_frame(tracker: &ProgressTracker, text: &str) {
    match serde_json::from_str::<ProgressUpdate>(text) {
        Ok(update) => {
            debug!(scenario = %update.scenario_id, state = %update.state, "progress frame");
            tracker.upsert(update);
        }
        Err(e) => warn!(error = %e, "skipping malformed progress frame"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_backoff() {
        let backoff = FixedBackoff::default();
        assert_eq!(backoff.delay(1), Duration::from_millis(500));
        assert_eq!(backoff.delay(40), Duration::from_millis(500));
    }

    #[test]
    fn test_malformed_frame_is_skipped() {
        let tracker = ProgressTracker::new();
        handle_frame(&tracker, "not json");
        handle_frame(&tracker, r#"{"state": "PROGRESS"}"#);
        assert!(tracker.is_empty());

        handle_frame(&tracker, r#"{"scenario_id": "s1", "state": "PROGRESS", "progress": 5}"#);
        assert_eq!(tracker.len(), 1);
    }
}
