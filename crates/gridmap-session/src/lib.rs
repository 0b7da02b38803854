//! # gridmap-session
//!
//! Client-side state and services for the grid capacity map.
//!
//! The backend computes headroom and stores scenarios; this crate keeps the
//! user's side of the conversation consistent while responses arrive late or
//! out of order.
//!
//! ## Architecture
//!
//! ```text
//! gridmap-cli ──► SessionService ──► Session (selection, scenario, layers)
//!                      │   │
//!                      │   └──► MapSink (one push per changed layer)
//!                      └──► GridApi (REST)
//!
//! FeedConnector ──► run_feed ──► ProgressTracker ──► ProgressEvent
//! ```
//!
//! ## Core Components
//!
//! - [`Session`]: Selection reconciliation state machine with stale-response tickets
//! - [`SessionService`]: Async controller applying [`GridApi`] responses to the session
//! - [`ProgressTracker`]: Last-known calculation progress per watched scenario
//! - [`run_feed`]: Reconnecting event-stream loop feeding the tracker
//! - [`GridmapConfig`]: Configuration shared by every front end
//!
//! ## Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use gridmap_session::{GridmapConfig, HttpGridApi, MemoryMapSink, SessionService};
//!
//! let config = GridmapConfig::load()?;
//! let api = Arc::new(HttpGridApi::new(&config.api)?);
//! let service = SessionService::new(api, Arc::new(MemoryMapSink::new())).with_config(config);
//!
//! service.switch_network("net-1".into()).await?;
//! let created = service.create_scenario("Winter peak").await?;
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod events;
pub mod feed;
pub mod http;
pub mod logging;
pub mod map;
pub mod progress;
pub mod selection;
pub mod service;
pub mod session;
pub mod ws;

// Re-exports for convenience
pub use api::{
    AreaBucket, ConnectionRequestQuery, GeoLayer, GridApi, ScenarioQuery, MAX_AREA_POINTS,
};
pub use config::{ApiConfig, FeedConfig, GridmapConfig, SessionConfig};
pub use error::{Error, Result};
pub use events::{Notice, NoticeLevel, ProgressEvent, SessionEvent};
pub use feed::{run_feed, Backoff, FeedConnection, FeedConnector, FeedState, FixedBackoff};
pub use http::HttpGridApi;
pub use logging::init_logging;
pub use map::{MapSink, MemoryMapSink, SourceId};
pub use progress::{CalculationState, ProgressTracker, ProgressUpdate, SubscribeRequest};
pub use selection::{reconcile_selection, Selection};
pub use service::SessionService;
pub use session::{
    AreaTicket, NetworkSwitch, NetworkTicket, PickedElement, PickedKind, ScenarioTicket, Session,
    SessionState, MIN_SCENARIO_NAME_LEN,
};
pub use ws::WsConnector;
