//! # gridmap-core: Grid Capacity Map Model
//!
//! Data structures and pure helpers shared by every gridmap front end.
//!
//! The backend owns all grid entities (networks, buses, connection requests,
//! scenarios and their computed headroom). This crate describes those records
//! as they arrive over the wire and provides the side-effect-free logic that
//! turns them into map layers and per-request warnings:
//!
//! - [`geo`] - GeoJSON types, point/line conversion, headroom coloring, tree flattening
//! - [`energy`] - Bus types and the energy kinds each of them can accept
//! - [`warnings`] - Headroom and energy-kind checks for a single connection request
//! - [`diagnostics`] - Non-fatal data-integrity issues collected along the way
//!
//! ## Quick Start
//!
//! ```rust
//! use gridmap_core::*;
//! use gridmap_core::geo::requests_to_point_features;
//!
//! let request: ConnectionRequest = serde_json::from_value(serde_json::json!({
//!     "id": "r1",
//!     "project_id": "PRJ-1",
//!     "connectivity_node": { "id": "A" },
//!     "connection_energy_kind": "production",
//!     "power_increase": 10.0,
//!     "extra": { "wsg84lon": 8.4, "wsg84lat": 49.0 }
//! }))
//! .unwrap();
//!
//! let mut diagnostics = Diagnostics::new();
//! let points = requests_to_point_features(&[request], &mut diagnostics);
//! assert_eq!(points.len(), 1);
//! assert!(!diagnostics.has_issues());
//! ```
//!
//! ## ID System
//!
//! The backend identifies entities with opaque strings (UUIDs for requests,
//! scenarios and networks; names such as `"CabinCrk"` for buses). Each kind
//! gets its own newtype so a bus number can never be passed where a request id
//! is expected.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

pub mod diagnostics;
pub mod energy;
pub mod error;
pub mod geo;
pub mod warnings;

pub use diagnostics::{DiagnosticIssue, Diagnostics, Severity};
pub use energy::{bus_type_supports_energy_kind, BusType, EnergyKind};
pub use error::error_message;
pub use warnings::{warnings_for_connection_request, ConnectionWarnings};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            #[inline]
            pub fn new(value: impl Into<String>) -> Self {
                $name(value.into())
            }
            #[inline]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                $name(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                $name(value)
            }
        }
    };
}

string_id!(
    /// Identifier of a connection request.
    ConnectionRequestId
);
string_id!(
    /// Identifier of a persisted scenario.
    ScenarioId
);
string_id!(
    /// Identifier of a grid network.
    NetworkId
);

/// Bus "number" as used by the grid model.
///
/// Despite the name these are free-form labels. Some importers emit plain
/// integers, so deserialization accepts JSON numbers and stores their decimal
/// rendering.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BusNumber(String);

impl BusNumber {
    #[inline]
    pub fn new(value: impl Into<String>) -> Self {
        BusNumber(value.into())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Read a bus number out of a loosely typed JSON value.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(BusNumber(s.clone())),
            Value::Number(n) => Some(BusNumber(n.to_string())),
            _ => None,
        }
    }
}

impl fmt::Display for BusNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BusNumber {
    fn from(value: &str) -> Self {
        BusNumber(value.to_string())
    }
}

impl Serialize for BusNumber {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for BusNumber {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        BusNumber::from_value(&value)
            .ok_or_else(|| serde::de::Error::custom("bus number must be a string or a number"))
    }
}

/// Lifecycle status of a connection request (and of a scenario).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConnectionStatus {
    Request,
    Reservation,
    Planning,
    Connection,
    Network,
    /// A status this client does not know about, kept verbatim.
    Unknown(String),
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &str {
        match self {
            ConnectionStatus::Request => "1_request",
            ConnectionStatus::Reservation => "2_reservation",
            ConnectionStatus::Planning => "4_planning",
            ConnectionStatus::Connection => "5_connection",
            ConnectionStatus::Network => "6_network",
            ConnectionStatus::Unknown(raw) => raw,
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw {
            "1_request" => ConnectionStatus::Request,
            "2_reservation" => ConnectionStatus::Reservation,
            "4_planning" => ConnectionStatus::Planning,
            "5_connection" => ConnectionStatus::Connection,
            "6_network" => ConnectionStatus::Network,
            other => ConnectionStatus::Unknown(other.to_string()),
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ConnectionStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ConnectionStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(ConnectionStatus::parse(&raw))
    }
}

/// Reference from a connection request to the bus it connects to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectivityNode {
    pub id: BusNumber,
}

/// Geocoding attached to a connection request (WGS84 degrees).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtraKeys {
    #[serde(default)]
    pub wsg84lon: Option<f64>,
    #[serde(default)]
    pub wsg84lat: Option<f64>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

/// A prospective load or generation connection awaiting capacity approval.
///
/// Fields the client does not interpret are kept in `other` so the complete
/// record can be shown in inspectors and re-emitted as feature properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionRequest {
    pub id: ConnectionRequestId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    pub connectivity_node: ConnectivityNode,
    pub connection_energy_kind: EnergyKind,
    #[serde(default)]
    pub power_increase: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ConnectionStatus>,
    #[serde(default)]
    pub extra: Option<ExtraKeys>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl ConnectionRequest {
    /// Create a request with the fields the client reasons about.
    pub fn new(
        id: impl Into<ConnectionRequestId>,
        bus: impl Into<BusNumber>,
        energy_kind: EnergyKind,
        power_increase: f64,
    ) -> Self {
        Self {
            id: id.into(),
            project_id: None,
            connectivity_node: ConnectivityNode { id: bus.into() },
            connection_energy_kind: energy_kind,
            power_increase,
            status: None,
            extra: None,
            other: Map::new(),
        }
    }

    pub fn with_project_id(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    pub fn with_position(mut self, lon: f64, lat: f64) -> Self {
        self.extra = Some(ExtraKeys {
            wsg84lon: Some(lon),
            wsg84lat: Some(lat),
            other: Map::new(),
        });
        self
    }

    /// Number of the bus this request connects to.
    #[inline]
    pub fn bus(&self) -> &BusNumber {
        &self.connectivity_node.id
    }

    /// `[lon, lat]` when the request is geocoded.
    pub fn position(&self) -> Option<[f64; 2]> {
        let extra = self.extra.as_ref()?;
        Some([extra.wsg84lon?, extra.wsg84lat?])
    }

    /// Project id for user-facing messages, falling back to the request id.
    pub fn label(&self) -> &str {
        self.project_id.as_deref().unwrap_or(self.id.as_str())
    }
}

/// Bus metadata embedded in a headroom record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeadroomBus {
    pub number: BusNumber,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub bus_type: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ex_name: Option<String>,
}

/// Branch or transformer endpoints identifying a bottleneck.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Subsystem {
    #[serde(default)]
    pub from_number: Option<BusNumber>,
    #[serde(default)]
    pub to_number: Option<BusNumber>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

/// The element that bounds the available headroom at a bus.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LimitingFactor {
    #[serde(default)]
    pub ss: Option<Subsystem>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl LimitingFactor {
    /// `(from, to)` bus numbers when the limiting element is a branch.
    pub fn endpoints(&self) -> Option<(&BusNumber, &BusNumber)> {
        let ss = self.ss.as_ref()?;
        Some((ss.from_number.as_ref()?, ss.to_number.as_ref()?))
    }
}

/// Computed capacity at one bus, produced by the external solver.
///
/// Each `*_mva` field is a `[value, percentage]` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusHeadroom {
    pub bus: HeadroomBus,
    #[serde(default)]
    pub actual_load_mva: Vec<f64>,
    #[serde(default)]
    pub actual_gen_mva: Vec<f64>,
    #[serde(default)]
    pub load_avail_mva: Vec<f64>,
    #[serde(default)]
    pub gen_avail_mva: Vec<f64>,
    #[serde(default)]
    pub load_lf: Option<LimitingFactor>,
    #[serde(default)]
    pub gen_lf: Option<LimitingFactor>,
}

impl BusHeadroom {
    /// Available load headroom in MVA, if reported.
    pub fn available_load(&self) -> Option<f64> {
        self.load_avail_mva.first().copied()
    }

    /// Available generation headroom in MVA, if reported.
    pub fn available_gen(&self) -> Option<f64> {
        self.gen_avail_mva.first().copied()
    }

    pub fn has_limiting_factor(&self) -> bool {
        self.load_lf.is_some() || self.gen_lf.is_some()
    }

    /// Limiting factors present on this bus (load first).
    pub fn limiting_factors(&self) -> impl Iterator<Item = &LimitingFactor> {
        self.load_lf.iter().chain(self.gen_lf.iter())
    }
}

/// Scenario as returned by the list endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioSummary {
    #[serde(default)]
    pub id: Option<ScenarioId>,
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub state: Option<ConnectionStatus>,
    #[serde(default)]
    pub net_id: Option<NetworkId>,
    #[serde(default)]
    pub connection_requests_count: Option<u64>,
    #[serde(default)]
    pub solver_status: Option<String>,
    #[serde(default)]
    pub solver_status_reason: Option<String>,
}

/// Scenario with its requests and computed headroom.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioDetails {
    #[serde(default)]
    pub id: Option<ScenarioId>,
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub state: Option<ConnectionStatus>,
    #[serde(default)]
    pub net_id: Option<NetworkId>,
    #[serde(default)]
    pub connection_requests_list: Vec<ConnectionRequest>,
    #[serde(default)]
    pub headroom: Option<Vec<BusHeadroom>>,
    #[serde(default)]
    pub solver_status: Option<String>,
    #[serde(default)]
    pub solver_status_reason: Option<String>,
}

/// Reference to an existing connection request inside a create body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionRequestRef {
    pub ref_id: ConnectionRequestId,
}

/// Body of the create-scenario call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewScenario {
    pub code: String,
    pub name: String,
    pub state: Option<ConnectionStatus>,
    pub connection_requests_list: Vec<ConnectionRequestRef>,
}

/// A grid network known to the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Network {
    #[serde(default)]
    pub id: Option<NetworkId>,
    pub title: String,
    #[serde(default)]
    pub geom: Option<geo::Geometry>,
    #[serde(default)]
    pub default_scenario_id: Option<ScenarioId>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl Network {
    /// Outer ring of the network's coverage polygon.
    pub fn outline(&self) -> Option<&[Vec<f64>]> {
        match self.geom.as_ref()? {
            geo::Geometry::Polygon { coordinates } => coordinates.first().map(Vec::as_slice),
            _ => None,
        }
    }
}

/// Paginated list envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    #[serde(default)]
    pub count: Option<u64>,
    pub items: Vec<T>,
}
