//! Event types for reactive front-end updates.

use std::fmt;

use gridmap_core::{NetworkId, ScenarioId};
use serde::Serialize;

use crate::feed::FeedState;
use crate::progress::ProgressUpdate;

/// Severity of a user-facing notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// A message meant for the user (toast, status line, log).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn new(level: NoticeLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Info, message)
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Success, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Error, message)
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.level {
            NoticeLevel::Info => "info",
            NoticeLevel::Success => "success",
            NoticeLevel::Warning => "warning",
            NoticeLevel::Error => "error",
        };
        write!(f, "[{level}] {}", self.message)
    }
}

/// Events emitted by the session service when state changes.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The active network changed; all network-scoped state was reset.
    NetworkSwitched { network_id: NetworkId },

    /// Scenario details were applied (or the scenario was cleared).
    ScenarioLoaded { scenario_id: Option<ScenarioId> },

    /// The selection changed.
    SelectionChanged { selected: usize },

    /// A scenario was created on the backend.
    ScenarioCreated { scenario_id: ScenarioId },

    /// A scenario was deleted on the backend.
    ScenarioDeleted { scenario_id: ScenarioId },

    /// Something the user should see.
    Notice(Notice),
}

/// Events emitted by the progress tracker and the feed loop.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// A progress frame was recorded.
    Updated(ProgressUpdate),

    /// The watched scenario list was replaced and recorded progress cleared.
    WatchChanged { ids: Vec<ScenarioId> },

    /// The event stream changed state.
    Feed(FeedState),

    /// A calculation finished.
    Notice(Notice),
}
