//! Map layer sink.
//!
//! The session pushes derived layers into a [`MapSink`] after each
//! transition. The sink never reports back; renderer state is write-only from
//! the session's point of view.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use gridmap_core::geo::FeatureCollection;

/// Map data sources the session writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SourceId {
    Buses,
    Branches,
    Trafos,
    ConnectionRequests,
    ScenarioLines,
    Density,
    Hexagons,
}

impl SourceId {
    pub const ALL: [SourceId; 7] = [
        SourceId::Buses,
        SourceId::Branches,
        SourceId::Trafos,
        SourceId::ConnectionRequests,
        SourceId::ScenarioLines,
        SourceId::Density,
        SourceId::Hexagons,
    ];

    /// Source name as registered with the renderer.
    pub fn as_str(self) -> &'static str {
        match self {
            SourceId::Buses => "powergrid/geo/buses",
            SourceId::Branches => "powergrid/geo/branches",
            SourceId::Trafos => "powergrid/geo/trafos2w",
            SourceId::ConnectionRequests => "connections/geo/connection_requests",
            SourceId::ScenarioLines => "scenario-connections-lines",
            SourceId::Density => "connection_requests_density",
            SourceId::Hexagons => "hexagons_connection_requests",
        }
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receiver of map layer data.
pub trait MapSink: Send + Sync {
    /// Replace the data of one source.
    fn set_data(&self, source: SourceId, data: &FeatureCollection);
}

/// Sink keeping the last payload per source.
#[derive(Debug, Default)]
pub struct MemoryMapSink {
    sources: DashMap<SourceId, FeatureCollection>,
    writes: AtomicUsize,
}

impl MemoryMapSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last data written to `source`.
    pub fn get(&self, source: SourceId) -> Option<FeatureCollection> {
        self.sources.get(&source).map(|entry| entry.value().clone())
    }

    /// Number of features currently held by `source` (0 if never written).
    pub fn feature_count(&self, source: SourceId) -> usize {
        self.sources.get(&source).map_or(0, |entry| entry.len())
    }

    /// Total number of `set_data` calls.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }
}

impl MapSink for MemoryMapSink {
    fn set_data(&self, source: SourceId, data: &FeatureCollection) {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.sources.insert(source, data.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridmap_core::geo::{Feature, Geometry};
    use serde_json::Map;

    #[test]
    fn test_source_names_are_unique() {
        let mut names: Vec<_> = SourceId::ALL.iter().map(|s| s.as_str()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), SourceId::ALL.len());
        assert_eq!(SourceId::Trafos.to_string(), "powergrid/geo/trafos2w");
    }

    #[test]
    fn test_memory_sink_keeps_last_payload() {
        let sink = MemoryMapSink::new();
        assert_eq!(sink.feature_count(SourceId::Buses), 0);

        let one = FeatureCollection::new(vec![Feature::new(Geometry::point(1.0, 2.0), Map::new())]);
        sink.set_data(SourceId::Buses, &one);
        sink.set_data(SourceId::Buses, &FeatureCollection::empty());

        assert_eq!(sink.write_count(), 2);
        assert_eq!(sink.get(SourceId::Buses), Some(FeatureCollection::empty()));
        assert_eq!(sink.get(SourceId::Hexagons), None);
    }
}
