//! In-memory backend shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use gridmap_core::geo::FeatureCollection;
use gridmap_core::{
    ConnectionRequest, Network, NetworkId, NewScenario, Page, ScenarioDetails, ScenarioId,
    ScenarioSummary,
};
use gridmap_session::{
    ConnectionRequestQuery, Error, GeoLayer, GridApi, Result, ScenarioQuery,
};
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::Notify;

/// Fake backend holding one network's worth of data.
#[derive(Default)]
pub struct MockApi {
    pub networks: Vec<Network>,
    pub layers: HashMap<GeoLayer, FeatureCollection>,
    /// Every request the backend knows, for resolving create bodies.
    pub requests: Vec<ConnectionRequest>,
    pub scenarios: Mutex<HashMap<ScenarioId, ScenarioDetails>>,
    pub created: Mutex<Vec<NewScenario>>,
    pub calculated: Mutex<Vec<(ScenarioId, bool)>>,
    pub request_queries: Mutex<Vec<ConnectionRequestQuery>>,
    gates: Mutex<HashMap<ScenarioId, Arc<Notify>>>,
    next_id: AtomicUsize,
}

impl MockApi {
    pub fn fixture() -> Self {
        let mut layers = HashMap::new();
        layers.insert(GeoLayer::Buses, buses());
        layers.insert(GeoLayer::Branches, branches());
        layers.insert(GeoLayer::Trafos, FeatureCollection::empty());
        layers.insert(GeoLayer::Density, FeatureCollection::empty());

        let requests = vec![
            request("r1", "B1", "production", 8.01, 49.01),
            request("r2", "B1", "consumption", 8.02, 49.02),
            request("r3", "B2", "production", 8.51, 49.51),
        ];

        let mut scenarios = HashMap::new();
        scenarios.insert(
            ScenarioId::from("s1"),
            details("s1", "Base", &requests[..1], headroom_b1_limited()),
        );
        scenarios.insert(
            ScenarioId::from("s2"),
            details("s2", "Other", &requests[2..], vec![]),
        );

        Self {
            networks: vec![serde_json::from_value(json!({
                "id": "n1",
                "title": "North",
                "default_scenario_id": "s1"
            }))
            .unwrap()],
            layers,
            requests,
            scenarios: Mutex::new(scenarios),
            ..Default::default()
        }
    }

    /// Hold `scenario_details(id)` until [`MockApi::release`] is called.
    pub fn gate(&self, id: &str) {
        self.gates
            .lock()
            .insert(ScenarioId::from(id), Arc::new(Notify::new()));
    }

    pub fn release(&self, id: &str) {
        if let Some(gate) = self.gates.lock().remove(&ScenarioId::from(id)) {
            gate.notify_one();
        }
    }

    pub fn request(&self, id: &str) -> ConnectionRequest {
        self.requests
            .iter()
            .find(|r| r.id.as_str() == id)
            .cloned()
            .unwrap()
    }
}

#[async_trait]
impl GridApi for MockApi {
    async fn list_networks(&self) -> Result<Vec<Network>> {
        Ok(self.networks.clone())
    }

    async fn list_scenarios(
        &self,
        network: &NetworkId,
        _query: &ScenarioQuery,
    ) -> Result<Page<ScenarioSummary>> {
        let items: Vec<ScenarioSummary> = self
            .scenarios
            .lock()
            .values()
            .map(|d| {
                serde_json::from_value(json!({
                    "id": d.id,
                    "code": d.code,
                    "name": d.name,
                    "net_id": network,
                }))
                .unwrap()
            })
            .collect();
        Ok(Page {
            count: Some(items.len() as u64),
            items,
        })
    }

    async fn scenario_details(
        &self,
        _network: &NetworkId,
        scenario: &ScenarioId,
    ) -> Result<ScenarioDetails> {
        let gate = self.gates.lock().get(scenario).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.scenarios
            .lock()
            .get(scenario)
            .cloned()
            .ok_or_else(|| Error::Api {
                status: Some(404),
                message: "Not Found".to_string(),
            })
    }

    async fn create_scenario(&self, _network: &NetworkId, body: &NewScenario) -> Result<ScenarioId> {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let id = format!("new-{n}");
        let included: Vec<ConnectionRequest> = body
            .connection_requests_list
            .iter()
            .map(|r| self.request(r.ref_id.as_str()))
            .collect();

        self.scenarios
            .lock()
            .insert(ScenarioId::from(id.as_str()), details(&id, &body.name, &included, vec![]));
        self.created.lock().push(body.clone());
        Ok(ScenarioId::from(id))
    }

    async fn delete_scenario(&self, _network: &NetworkId, scenario: &ScenarioId) -> Result<()> {
        match self.scenarios.lock().remove(scenario) {
            Some(_) => Ok(()),
            None => Err(Error::Api {
                status: Some(404),
                message: "Not Found".to_string(),
            }),
        }
    }

    async fn calculate_scenario(
        &self,
        _network: &NetworkId,
        scenario: &ScenarioId,
        only_affected_buses: bool,
    ) -> Result<()> {
        self.calculated
            .lock()
            .push((scenario.clone(), only_affected_buses));
        Ok(())
    }

    async fn connection_requests(
        &self,
        _network: &NetworkId,
        query: &ConnectionRequestQuery,
    ) -> Result<Page<ConnectionRequest>> {
        self.request_queries.lock().push(query.clone());
        let offset = query.offset.unwrap_or(0) as usize;
        let limit = query.limit.map_or(usize::MAX, |l| l as usize);
        Ok(Page {
            count: Some(self.requests.len() as u64),
            items: self.requests.iter().skip(offset).take(limit).cloned().collect(),
        })
    }

    async fn geojson(&self, _network: &NetworkId, layer: GeoLayer) -> Result<FeatureCollection> {
        Ok(self.layers.get(&layer).cloned().unwrap_or_default())
    }
}

pub fn request(id: &str, bus: &str, kind: &str, lon: f64, lat: f64) -> ConnectionRequest {
    serde_json::from_value(json!({
        "id": id,
        "project_id": format!("P-{id}"),
        "connectivity_node": { "id": bus },
        "connection_energy_kind": kind,
        "power_increase": 2.5,
        "extra": { "wsg84lon": lon, "wsg84lat": lat }
    }))
    .unwrap()
}

pub fn details(
    id: &str,
    name: &str,
    requests: &[ConnectionRequest],
    headroom: Vec<serde_json::Value>,
) -> ScenarioDetails {
    serde_json::from_value(json!({
        "id": id,
        "code": format!("{name}0"),
        "name": name,
        "state": "1_request",
        "connection_requests_list": requests,
        "headroom": headroom,
    }))
    .unwrap()
}

/// B1 can take load but no more generation; B1-B2 limits it.
pub fn headroom_b1_limited() -> Vec<serde_json::Value> {
    vec![json!({
        "bus": { "number": "B1", "type": 5 },
        "load_avail_mva": [12.0, 40.0],
        "gen_avail_mva": [0.0, 0.0],
        "gen_lf": { "ss": { "from_number": "B1", "to_number": "B2" } }
    })]
}

pub fn buses() -> FeatureCollection {
    serde_json::from_value(json!({
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "geometry": { "type": "Point", "coordinates": [8.0, 49.0] },
                "properties": { "number": "B1", "bus_type": 5 }
            },
            {
                "type": "Feature",
                "geometry": { "type": "Point", "coordinates": [8.5, 49.5] },
                "properties": { "number": "B2", "bus_type": 2 }
            }
        ]
    }))
    .unwrap()
}

pub fn branches() -> FeatureCollection {
    serde_json::from_value(json!({
        "type": "FeatureCollection",
        "features": [{
            "type": "Feature",
            "geometry": { "type": "LineString", "coordinates": [[8.0, 49.0], [8.5, 49.5]] },
            "properties": {
                "from_bus": { "number": "B1" },
                "to_bus": { "number": "B2" }
            }
        }]
    }))
    .unwrap()
}
