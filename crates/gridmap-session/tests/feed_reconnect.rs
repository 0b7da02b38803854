//! Event stream loop with a scripted transport.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gridmap_core::{ScenarioId, ScenarioSummary};
use gridmap_session::{
    run_feed, Error, FeedConnection, FeedConnector, FeedState, FixedBackoff, NoticeLevel,
    ProgressEvent, ProgressTracker, Result, SubscribeRequest,
};
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

type SentLog = Arc<Mutex<Vec<(usize, String)>>>;

/// Hands out one scripted connection per script, then refuses.
struct ScriptedConnector {
    scripts: Mutex<VecDeque<Script>>,
    sent: SentLog,
    connects: Mutex<usize>,
}

struct Script {
    frames: Vec<String>,
    /// Keep the connection open after the last frame.
    stay_open: bool,
}

struct ScriptedConnection {
    index: usize,
    frames: VecDeque<String>,
    stay_open: bool,
    sent: SentLog,
}

#[async_trait]
impl FeedConnection for ScriptedConnection {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.sent.lock().push((self.index, text));
        Ok(())
    }

    async fn recv_text(&mut self) -> Result<Option<String>> {
        if let Some(frame) = self.frames.pop_front() {
            return Ok(Some(frame));
        }
        if self.stay_open {
            std::future::pending::<()>().await;
        }
        Ok(None)
    }
}

#[async_trait]
impl FeedConnector for ScriptedConnector {
    async fn connect(&self) -> Result<Box<dyn FeedConnection>> {
        let index = {
            let mut connects = self.connects.lock();
            *connects += 1;
            *connects - 1
        };
        let script = self
            .scripts
            .lock()
            .pop_front()
            .ok_or_else(|| Error::Feed("connection refused".to_string()))?;

        Ok(Box::new(ScriptedConnection {
            index,
            frames: script.frames.into(),
            stay_open: script.stay_open,
            sent: self.sent.clone(),
        }))
    }
}

fn frame(id: &str, state: &str, progress: i64) -> String {
    json!({ "scenario_id": id, "state": state, "progress": progress }).to_string()
}

fn summary(id: &str, name: &str) -> ScenarioSummary {
    serde_json::from_value(json!({ "id": id, "code": id, "name": name })).unwrap()
}

fn subscribed_ids(text: &str) -> Vec<ScenarioId> {
    let request: SubscribeRequest = serde_json::from_str(text).unwrap();
    assert_eq!(request.event, "subscribe");
    assert_eq!(request.channel, "scenarios");
    request.ids
}

async fn next_event(rx: &mut broadcast::Receiver<ProgressEvent>) -> ProgressEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for progress event")
        .unwrap()
}

#[tokio::test]
async fn test_feed_reconnects_and_resubscribes() {
    let sent: SentLog = Arc::default();
    let connector = Arc::new(ScriptedConnector {
        scripts: Mutex::new(VecDeque::from([
            Script {
                frames: vec![frame("s1", "PROGRESS", 10), "garbage".to_string()],
                stay_open: false,
            },
            Script {
                frames: vec![frame("s1", "SUCCESS", 100)],
                stay_open: true,
            },
        ])),
        sent: sent.clone(),
        connects: Mutex::new(0),
    });

    let tracker = ProgressTracker::shared();
    tracker.watch(vec![summary("s1", "Winter peak")]);
    let mut rx = tracker.subscribe();

    let cancel = CancellationToken::new();
    let handle = {
        let (connector, tracker, cancel) = (connector.clone(), tracker.clone(), cancel.clone());
        tokio::spawn(async move {
            let backoff = FixedBackoff(Duration::from_millis(10));
            run_feed(connector.as_ref(), &tracker, &backoff, cancel).await;
        })
    };

    let mut states = Vec::new();
    loop {
        match next_event(&mut rx).await {
            ProgressEvent::Feed(state) => states.push(state),
            ProgressEvent::Notice(notice) => {
                assert_eq!(notice.level, NoticeLevel::Success);
                assert_eq!(notice.message, "Scenario Winter peak successfully calculated");
                break;
            }
            _ => {}
        }
    }
    assert_eq!(tracker.get(&"s1".into()).unwrap().progress, Some(100));

    // A new watch list is pushed over the open connection.
    tracker.watch(vec![summary("s1", "Winter peak"), summary("s2", "Summer")]);
    tokio::time::timeout(Duration::from_secs(5), async {
        while sent.lock().len() < 3 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("no resubscribe after watch change");

    cancel.cancel();
    handle.await.unwrap();
    while let Ok(event) = rx.try_recv() {
        if let ProgressEvent::Feed(state) = event {
            states.push(state);
        }
    }

    assert_eq!(
        states,
        [
            FeedState::Connecting,
            FeedState::Open,
            FeedState::Closed,
            FeedState::Connecting,
            FeedState::Open,
            FeedState::Disconnected,
        ]
    );

    let sent = sent.lock().clone();
    assert_eq!(sent.len(), 3);
    assert_eq!(sent[0].0, 0);
    assert_eq!(subscribed_ids(&sent[0].1), [ScenarioId::from("s1")]);
    assert_eq!(sent[1].0, 1);
    assert_eq!(subscribed_ids(&sent[1].1), [ScenarioId::from("s1")]);
    assert_eq!(sent[2].0, 1);
    assert_eq!(
        subscribed_ids(&sent[2].1),
        [ScenarioId::from("s1"), ScenarioId::from("s2")]
    );
}

#[tokio::test]
async fn test_feed_keeps_retrying_refused_connections() {
    let connector = ScriptedConnector {
        scripts: Mutex::new(VecDeque::new()),
        sent: Arc::default(),
        connects: Mutex::new(0),
    };
    let tracker = ProgressTracker::new();
    let cancel = CancellationToken::new();

    let stop = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(60)).await;
        stop.cancel();
    });

    let backoff = FixedBackoff(Duration::from_millis(5));
    run_feed(&connector, &tracker, &backoff, cancel).await;

    assert!(*connector.connects.lock() >= 2);
    assert!(tracker.is_empty());
}
