//! Scenario calculation progress.
//!
//! The [`ProgressTracker`] records the last frame received per watched
//! scenario and announces finished calculations once.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use gridmap_core::{ScenarioId, ScenarioSummary};
use parking_lot::RwLock;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tokio::sync::broadcast;

use crate::events::{Notice, ProgressEvent};

/// Celery task state of a scenario calculation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum CalculationState {
    Pending,
    Started,
    Progress,
    Success,
    Failure,
    Revoked,
    #[default]
    None,
    Unknown(String),
}

impl CalculationState {
    pub fn as_str(&self) -> &str {
        match self {
            CalculationState::Pending => "PENDING",
            CalculationState::Started => "STARTED",
            CalculationState::Progress => "PROGRESS",
            CalculationState::Success => "SUCCESS",
            CalculationState::Failure => "FAILURE",
            CalculationState::Revoked => "REVOKED",
            CalculationState::None => "NONE",
            CalculationState::Unknown(raw) => raw,
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw {
            "PENDING" => CalculationState::Pending,
            "STARTED" => CalculationState::Started,
            "PROGRESS" => CalculationState::Progress,
            "SUCCESS" => CalculationState::Success,
            "FAILURE" => CalculationState::Failure,
            "REVOKED" => CalculationState::Revoked,
            "NONE" => CalculationState::None,
            other => CalculationState::Unknown(other.to_string()),
        }
    }

    /// Success or failure. Revoked tasks are not announced.
    pub fn is_terminal(&self) -> bool {
        matches!(self, CalculationState::Success | CalculationState::Failure)
    }
}

impl fmt::Display for CalculationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for CalculationState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for CalculationState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.map_or(CalculationState::None, |raw| CalculationState::parse(&raw)))
    }
}

/// One progress frame from the event stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub scenario_id: ScenarioId,
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub state: CalculationState,
    /// Percent complete.
    #[serde(default)]
    pub progress: Option<i64>,
    /// Power flows solved so far.
    #[serde(default)]
    pub powerflows: Option<i64>,
    /// Unix seconds.
    #[serde(default)]
    pub updated_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_reason: Option<String>,
}

impl ProgressUpdate {
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
            .filter(|&secs| secs > 0)
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
    }
}

/// Subscription frame sent to the event stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeRequest {
    pub event: String,
    pub channel: String,
    pub ids: Vec<ScenarioId>,
}

impl SubscribeRequest {
    pub fn scenarios(ids: Vec<ScenarioId>) -> Self {
        Self {
            event: "subscribe".to_string(),
            channel: "scenarios".to_string(),
            ids,
        }
    }
}

/// Last-known progress for the watched scenarios.
pub struct ProgressTracker {
    /// Latest frame per scenario, insertion-ordered by `order`.
    updates: DashMap<ScenarioId, ProgressUpdate>,
    order: RwLock<Vec<ScenarioId>>,

    /// Scenarios whose progress is shown, for names and subscriptions.
    watched: RwLock<Vec<ScenarioSummary>>,

    events_tx: broadcast::Sender<ProgressEvent>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        let (events_tx, _) = broadcast::channel(256);
        Self {
            updates: DashMap::new(),
            order: RwLock::new(Vec::new()),
            watched: RwLock::new(Vec::new()),
            events_tx,
        }
    }

    /// Create a shared tracker.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Replace the watched scenario list. Recorded progress is cleared.
    pub fn watch(&self, scenarios: Vec<ScenarioSummary>) {
        let ids: Vec<ScenarioId> = scenarios.iter().filter_map(|s| s.id.clone()).collect();
        *self.watched.write() = scenarios;
        self.updates.clear();
        self.order.write().clear();
        let _ = self.events_tx.send(ProgressEvent::WatchChanged { ids });
    }

    /// Ids of the watched scenarios, in list order.
    pub fn watched_ids(&self) -> Vec<ScenarioId> {
        self.watched
            .read()
            .iter()
            .filter_map(|s| s.id.clone())
            .collect()
    }

    /// Record a frame, replacing any earlier one for the same scenario.
    ///
    /// Returns the notice for a finished calculation.
    pub fn upsert(&self, update: ProgressUpdate) -> Option<Notice> {
        let notice = self.finish_notice(&update);

        let scenario_id = update.scenario_id.clone();
        if self.updates.insert(scenario_id.clone(), update.clone()).is_none() {
            self.order.write().push(scenario_id);
        }

        let _ = self.events_tx.send(ProgressEvent::Updated(update));
        if let Some(notice) = &notice {
            let _ = self.events_tx.send(ProgressEvent::Notice(notice.clone()));
        }
        notice
    }

    fn finish_notice(&self, update: &ProgressUpdate) -> Option<Notice> {
        if !update.state.is_terminal() {
            return None;
        }

        let name = self.scenario_name(&update.scenario_id);
        Some(match update.state {
            CalculationState::Success => {
                Notice::success(format!("Scenario {name} successfully calculated"))
            }
            _ => Notice::error(format!(
                "Scenario {name} calculation failed: {}",
                update.state_reason.as_deref().unwrap_or("UNKNOWN")
            )),
        })
    }

    fn scenario_name(&self, id: &ScenarioId) -> String {
        self.watched
            .read()
            .iter()
            .find(|s| s.id.as_ref() == Some(id))
            .map(|s| s.name.clone())
            .unwrap_or_else(|| id.to_string())
    }

    pub fn get(&self, id: &ScenarioId) -> Option<ProgressUpdate> {
        self.updates.get(id).map(|entry| entry.value().clone())
    }

    /// All recorded frames, in first-seen order.
    pub fn snapshot(&self) -> Vec<ProgressUpdate> {
        self.order
            .read()
            .iter()
            .filter_map(|id| self.get(id))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.updates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.events_tx.subscribe()
    }

    pub(crate) fn emit(&self, event: ProgressEvent) {
        let _ = self.events_tx.send(event);
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn summary(id: &str, name: &str) -> ScenarioSummary {
        serde_json::from_value(json!({ "id": id, "code": id, "name": name })).unwrap()
    }

    fn frame(id: &str, state: &str, progress: i64) -> ProgressUpdate {
        serde_json::from_value(json!({
            "scenario_id": id,
            "task_id": "t-1",
            "state": state,
            "progress": progress,
            "powerflows": 10,
            "updated_at": 1_700_000_000
        }))
        .unwrap()
    }

    #[test]
    fn test_state_wire_values() {
        assert_eq!(CalculationState::parse("PROGRESS"), CalculationState::Progress);
        assert_eq!(
            CalculationState::parse("RETRY"),
            CalculationState::Unknown("RETRY".into())
        );
        assert!(CalculationState::Failure.is_terminal());
        assert!(!CalculationState::Revoked.is_terminal());

        let update: ProgressUpdate =
            serde_json::from_value(json!({ "scenario_id": "s1", "state": null })).unwrap();
        assert_eq!(update.state, CalculationState::None);
    }

    #[test]
    fn test_upsert_last_wins() {
        let tracker = ProgressTracker::new();
        assert!(tracker.upsert(frame("s1", "PROGRESS", 10)).is_none());
        assert!(tracker.upsert(frame("s2", "STARTED", 0)).is_none());
        assert!(tracker.upsert(frame("s1", "PROGRESS", 60)).is_none());

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].scenario_id.as_str(), "s1");
        assert_eq!(snapshot[0].progress, Some(60));
        assert!(snapshot[0].updated_at().is_some());
    }

    #[test]
    fn test_terminal_notices() {
        let tracker = ProgressTracker::new();
        tracker.watch(vec![summary("s1", "Winter peak")]);

        let done = tracker.upsert(frame("s1", "SUCCESS", 100)).unwrap();
        assert_eq!(done, Notice::success("Scenario Winter peak successfully calculated"));

        let mut failed = frame("s2", "FAILURE", 40);
        failed.state_reason = Some("solver diverged".into());
        let notice = tracker.upsert(failed).unwrap();
        assert_eq!(notice, Notice::error("Scenario s2 calculation failed: solver diverged"));

        let notice = tracker.upsert(frame("s3", "FAILURE", 0)).unwrap();
        assert_eq!(notice.message, "Scenario s3 calculation failed: UNKNOWN");
    }

    #[test]
    fn test_watch_clears_progress() {
        let tracker = ProgressTracker::new();
        tracker.upsert(frame("s1", "PROGRESS", 10));

        let mut rx = tracker.subscribe();
        tracker.watch(vec![summary("s1", "A"), summary("s2", "B")]);

        assert!(tracker.is_empty());
        assert!(tracker.snapshot().is_empty());
        assert_eq!(tracker.watched_ids().len(), 2);
        assert!(matches!(rx.try_recv(), Ok(ProgressEvent::WatchChanged { ids }) if ids.len() == 2));
    }

    #[test]
    fn test_subscribe_request_frame() {
        let frame = SubscribeRequest::scenarios(vec!["s1".into()]);
        assert_eq!(
            serde_json::to_value(&frame).unwrap(),
            json!({ "event": "subscribe", "channel": "scenarios", "ids": ["s1"] })
        );
    }
}
