//! REST boundary.
//!
//! [`GridApi`] is everything the session needs from the backend. The
//! production implementation is [`crate::HttpGridApi`]; tests use in-memory
//! mocks.

use async_trait::async_trait;
use gridmap_core::geo::FeatureCollection;
use gridmap_core::{
    BusNumber, ConnectionRequest, ConnectionStatus, EnergyKind, Network, NetworkId, NewScenario,
    Page, ScenarioDetails, ScenarioId, ScenarioSummary,
};

use crate::error::{Error, Result};

/// Trait for querying and mutating backend data.
#[async_trait]
pub trait GridApi: Send + Sync {
    async fn list_networks(&self) -> Result<Vec<Network>>;

    async fn list_scenarios(
        &self,
        network: &NetworkId,
        query: &ScenarioQuery,
    ) -> Result<Page<ScenarioSummary>>;

    async fn scenario_details(
        &self,
        network: &NetworkId,
        scenario: &ScenarioId,
    ) -> Result<ScenarioDetails>;

    /// Create a scenario and return its id.
    async fn create_scenario(&self, network: &NetworkId, body: &NewScenario)
        -> Result<ScenarioId>;

    async fn delete_scenario(&self, network: &NetworkId, scenario: &ScenarioId) -> Result<()>;

    /// Queue a headroom calculation. A calculation already running is a
    /// [`Error::Conflict`].
    async fn calculate_scenario(
        &self,
        network: &NetworkId,
        scenario: &ScenarioId,
        only_affected_buses: bool,
    ) -> Result<()>;

    async fn connection_requests(
        &self,
        network: &NetworkId,
        query: &ConnectionRequestQuery,
    ) -> Result<Page<ConnectionRequest>>;

    /// GeoJSON for one static layer of the network.
    async fn geojson(&self, network: &NetworkId, layer: GeoLayer) -> Result<FeatureCollection>;
}

/// Static GeoJSON layers served per network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeoLayer {
    Buses,
    Branches,
    Trafos,
    Density,
}

impl GeoLayer {
    pub const ALL: [GeoLayer; 4] = [
        GeoLayer::Buses,
        GeoLayer::Branches,
        GeoLayer::Trafos,
        GeoLayer::Density,
    ];

    /// Path below `/api/nets/{net}/`.
    pub fn path(self) -> &'static str {
        match self {
            GeoLayer::Buses => "geojson/buses",
            GeoLayer::Branches => "geojson/branches",
            GeoLayer::Trafos => "geojson/trafos",
            GeoLayer::Density => "connections/geojson/density",
        }
    }
}

/// Filters for the scenario list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScenarioQuery {
    pub author_full_name: Option<String>,
    pub solver_status: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl ScenarioQuery {
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        push_opt(&mut pairs, "author_full_name", self.author_full_name.as_ref());
        push_opt(&mut pairs, "solver_status", self.solver_status.as_ref());
        push_opt(&mut pairs, "limit", self.limit.as_ref());
        push_opt(&mut pairs, "offset", self.offset.as_ref());
        pairs
    }
}

/// Largest polygon the backend accepts as an area filter.
pub const MAX_AREA_POINTS: usize = 20;

/// Region used to fetch connection requests for the hexagon layer.
#[derive(Debug, Clone, PartialEq)]
pub enum AreaBucket {
    /// Closed polygon of `[lon, lat]` points.
    Polygon(Vec<[f64; 2]>),
    /// H3 cell index.
    H3(String),
}

impl AreaBucket {
    /// Cache key: the polygon's coordinates flattened and comma-joined, or the
    /// H3 index.
    pub fn key(&self) -> String {
        match self {
            AreaBucket::Polygon(points) => points
                .iter()
                .flat_map(|p| p.iter())
                .map(|c| c.to_string())
                .collect::<Vec<_>>()
                .join(","),
            AreaBucket::H3(index) => index.clone(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            AreaBucket::Polygon(points) if points.len() < 3 => Err(Error::Validation(
                "area must have at least 3 points".to_string(),
            )),
            AreaBucket::Polygon(points) if points.len() > MAX_AREA_POINTS => {
                Err(Error::Validation(format!(
                    "area must have at most {MAX_AREA_POINTS} points"
                )))
            }
            AreaBucket::H3(index) if index.trim().is_empty() => {
                Err(Error::Validation("h3 index must not be empty".to_string()))
            }
            _ => Ok(()),
        }
    }
}

/// Filters for the connection request list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectionRequestQuery {
    pub bus_ids: Vec<BusNumber>,
    pub status: Option<ConnectionStatus>,
    pub connection_kind: Option<String>,
    pub connection_energy_kind: Option<EnergyKind>,
    pub power_increase_gt: Option<u32>,
    pub power_increase_lt: Option<u32>,
    /// Polygon as `[lon, lat]` points.
    pub area: Vec<[f64; 2]>,
    pub h3_id: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl ConnectionRequestQuery {
    /// Query matching every request inside `bucket`.
    pub fn for_bucket(bucket: &AreaBucket) -> Self {
        match bucket {
            AreaBucket::Polygon(points) => Self {
                area: points.clone(),
                ..Default::default()
            },
            AreaBucket::H3(index) => Self {
                h3_id: Some(index.clone()),
                ..Default::default()
            },
        }
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Query string pairs. List filters repeat their key once per value.
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        push_opt(&mut pairs, "limit", self.limit.as_ref());
        push_opt(&mut pairs, "offset", self.offset.as_ref());
        for bus in &self.bus_ids {
            pairs.push(("bus_id".to_string(), bus.to_string()));
        }
        push_opt(&mut pairs, "status", self.status.as_ref());
        push_opt(&mut pairs, "connection_kind", self.connection_kind.as_ref());
        push_opt(
            &mut pairs,
            "connection_energy_kind",
            self.connection_energy_kind.as_ref(),
        );
        push_opt(&mut pairs, "power_increase_gt", self.power_increase_gt.as_ref());
        push_opt(&mut pairs, "power_increase_lt", self.power_increase_lt.as_ref());
        for [lon, lat] in &self.area {
            pairs.push(("area".to_string(), format!("{lon},{lat}")));
        }
        push_opt(&mut pairs, "h3_id", self.h3_id.as_ref());
        pairs
    }
}

fn push_opt<T: ToString>(pairs: &mut Vec<(String, String)>, key: &str, value: Option<&T>) {
    if let Some(value) = value {
        pairs.push((key.to_string(), value.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_keys() {
        let polygon = AreaBucket::Polygon(vec![[7.5, 48.0], [8.0, 48.0], [8.0, 48.5]]);
        assert_eq!(polygon.key(), "7.5,48,8,48,8,48.5");
        assert_eq!(AreaBucket::H3("871fb4662ffffff".into()).key(), "871fb4662ffffff");
    }

    #[test]
    fn test_bucket_validation() {
        assert!(AreaBucket::Polygon(vec![[0.0, 0.0], [1.0, 1.0]]).validate().is_err());
        assert!(AreaBucket::H3(" ".into()).validate().is_err());

        let ring = |n: usize| (0..n).map(|i| [i as f64 * 0.1, 48.0]).collect::<Vec<_>>();
        assert!(AreaBucket::Polygon(ring(MAX_AREA_POINTS)).validate().is_ok());
        assert!(matches!(
            AreaBucket::Polygon(ring(MAX_AREA_POINTS + 1)).validate(),
            Err(Error::Validation(_))
        ));
        assert!(AreaBucket::H3("871fb4662ffffff".into()).validate().is_ok());
    }

    #[test]
    fn test_request_query_pairs() {
        let query = ConnectionRequestQuery {
            bus_ids: vec!["A".into(), "B".into()],
            connection_energy_kind: Some(EnergyKind::Production),
            power_increase_gt: Some(15),
            area: vec![[7.5, 48.0], [8.0, 48.0], [8.0, 48.5]],
            ..Default::default()
        }
        .with_limit(50);

        let pairs = query.to_pairs();
        let as_str: Vec<(&str, &str)> = pairs
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        assert_eq!(
            as_str,
            vec![
                ("limit", "50"),
                ("bus_id", "A"),
                ("bus_id", "B"),
                ("connection_energy_kind", "production"),
                ("power_increase_gt", "15"),
                ("area", "7.5,48"),
                ("area", "8,48"),
                ("area", "8,48.5"),
            ]
        );
    }

    #[test]
    fn test_query_for_h3_bucket() {
        let query = ConnectionRequestQuery::for_bucket(&AreaBucket::H3("abc".into()));
        assert_eq!(query.to_pairs(), vec![("h3_id".to_string(), "abc".to_string())]);
    }

    #[test]
    fn test_layer_paths() {
        assert_eq!(GeoLayer::Trafos.path(), "geojson/trafos");
        assert_eq!(GeoLayer::Density.path(), "connections/geojson/density");
    }
}
