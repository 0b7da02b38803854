//! Selection reconciliation state machine.
//!
//! A [`Session`] owns everything the user has staged against one network:
//! the selected connection requests, the scenario being inspected (whose
//! requests are locked into the selection), the scenario's headroom, and the
//! cached geodata. Every transition builds a fresh [`SessionState`], recomputes
//! its warnings and selection layers, and swaps it in; readers hold cheap
//! `Arc` snapshots. Geodata and the layers derived from it are shared between
//! snapshots and only rebuilt when their inputs change.
//!
//! Server responses are applied through tickets issued when the request was
//! made. A ticket from before a network switch or a newer scenario selection
//! is stale and its response is discarded.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use gridmap_core::geo::{
    annotate_branches_with_color, annotate_buses_with_color, bounds_of,
    parse_feature_properties, requests_to_point_features, scenario_requests_to_line_features,
    Bounds, BusIndex, FeatureCollection,
};
use gridmap_core::{
    warnings_for_connection_request, BusHeadroom, BusNumber, ConnectionRequest,
    ConnectionRequestId, ConnectionRequestRef, ConnectionStatus, ConnectionWarnings, Diagnostics,
    Network, NetworkId, NewScenario, ScenarioDetails, ScenarioId,
};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::api::{AreaBucket, GeoLayer};
use crate::error::{Error, Result};
use crate::selection::{reconcile_selection, Selection};

/// Shortest accepted scenario name, after trimming.
pub const MIN_SCENARIO_NAME_LEN: usize = 3;

/// What kind of map element the inspector shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PickedKind {
    Bus,
    Branch,
    Connection,
}

/// A map element picked for inspection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PickedElement {
    pub kind: PickedKind,
    pub properties: Map<String, Value>,
}

/// Guard for responses scoped to a network (geodata).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkTicket {
    epoch: u64,
    network_id: NetworkId,
}

impl NetworkTicket {
    pub fn network_id(&self) -> &NetworkId {
        &self.network_id
    }
}

/// Guard for responses scoped to a scenario selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioTicket {
    network_epoch: u64,
    scenario_epoch: u64,
    network_id: NetworkId,
    scenario_id: ScenarioId,
}

impl ScenarioTicket {
    pub fn network_id(&self) -> &NetworkId {
        &self.network_id
    }

    pub fn scenario_id(&self) -> &ScenarioId {
        &self.scenario_id
    }
}

/// Guard for one area query of the hexagon layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AreaTicket {
    network: NetworkTicket,
    key: String,
}

impl AreaTicket {
    pub fn network_id(&self) -> &NetworkId {
        &self.network.network_id
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

/// Outcome of a network switch: what to fetch next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkSwitch {
    pub network: NetworkTicket,
    /// Present when the network has a default scenario.
    pub scenario: Option<ScenarioTicket>,
}

/// Immutable snapshot of the session.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub network_id: Option<NetworkId>,
    pub networks: Vec<Network>,

    pub scenario_id: Option<ScenarioId>,
    /// Details of `scenario_id`, once loaded.
    pub scenario: Option<ScenarioDetails>,

    pub selection: Selection,
    /// Requests of the loaded scenario. These are locked into the selection.
    pub scenario_requests: Vec<ConnectionRequest>,
    pub previous_scenario_requests: Vec<ConnectionRequest>,
    pub headroom: Arc<Vec<BusHeadroom>>,

    pub buses: Arc<FeatureCollection>,
    pub branches: Arc<FeatureCollection>,
    pub trafos: Arc<FeatureCollection>,
    pub density: Arc<FeatureCollection>,

    /// Connection requests per area bucket key.
    pub hexagon_requests: BTreeMap<String, Vec<ConnectionRequest>>,
    pub created_scenario_ids: Vec<ScenarioId>,
    pub picked: Option<PickedElement>,

    // Derived on every transition.
    pub warnings: BTreeMap<ConnectionRequestId, ConnectionWarnings>,
    /// Bounding box of the current network's coverage polygon.
    pub bounds: Option<Bounds>,
    pub selected_points: Arc<FeatureCollection>,
    pub scenario_lines: Arc<FeatureCollection>,
    pub hexagon_layer: Arc<FeatureCollection>,
    /// Data problems found while deriving.
    pub diagnostics: Diagnostics,

    // Derived when buses or headroom change.
    pub colored_buses: Arc<FeatureCollection>,
    pub colored_branches: Arc<FeatureCollection>,
    pub colored_trafos: Arc<FeatureCollection>,
    bus_index: Arc<BusIndex>,
    /// Position of each bus's first entry in `headroom`.
    headroom_index: Arc<HashMap<BusNumber, usize>>,
}

impl SessionState {
    pub fn is_locked(&self, id: &ConnectionRequestId) -> bool {
        self.scenario_requests.iter().any(|r| &r.id == id)
    }

    /// Selected requests that are not part of the loaded scenario.
    pub fn staged_requests(&self) -> impl Iterator<Item = &ConnectionRequest> {
        self.selection.iter().filter(|r| !self.is_locked(&r.id))
    }

    pub fn network(&self) -> Option<&Network> {
        let id = self.network_id.as_ref()?;
        self.networks.iter().find(|n| n.id.as_ref() == Some(id))
    }

    /// Union of all cached area buckets minus the selection, first
    /// occurrence wins.
    pub fn hexagon_requests_unselected(&self) -> Vec<&ConnectionRequest> {
        let mut seen: HashSet<&ConnectionRequestId> = self.selection.ids().collect();
        let mut unselected = Vec::new();
        for request in self.hexagon_requests.values().flatten() {
            if seen.insert(&request.id) {
                unselected.push(request);
            }
        }
        unselected
    }

    fn headroom_for(&self, bus: &BusNumber) -> Option<&BusHeadroom> {
        self.headroom_index.get(bus).map(|&i| &self.headroom[i])
    }

    /// Recompute derived fields. Layers whose inputs are the same `Arc`s as
    /// in `previous` are kept.
    fn derive(&mut self, previous: &SessionState) {
        let buses_changed = !Arc::ptr_eq(&self.buses, &previous.buses);
        let headroom_changed = !Arc::ptr_eq(&self.headroom, &previous.headroom);

        if buses_changed {
            self.bus_index = Arc::new(BusIndex::from_features(&self.buses));
        }
        if headroom_changed {
            let mut index = HashMap::with_capacity(self.headroom.len());
            for (i, entry) in self.headroom.iter().enumerate() {
                index.entry(entry.bus.number.clone()).or_insert(i);
            }
            self.headroom_index = Arc::new(index);
        }
        if buses_changed || headroom_changed {
            self.colored_buses = Arc::new(annotate_buses_with_color(&self.buses, &self.headroom));
        }
        if headroom_changed || !Arc::ptr_eq(&self.branches, &previous.branches) {
            self.colored_branches =
                Arc::new(annotate_branches_with_color(&self.branches, &self.headroom));
        }
        if headroom_changed || !Arc::ptr_eq(&self.trafos, &previous.trafos) {
            self.colored_trafos =
                Arc::new(annotate_branches_with_color(&self.trafos, &self.headroom));
        }

        let mut diagnostics = Diagnostics::new();

        // Until buses arrive every lookup misses; don't report those.
        let mut lookups = Diagnostics::new();
        self.warnings = self
            .staged_requests()
            .map(|request| {
                let warnings = warnings_for_connection_request(
                    request,
                    self.headroom_for(request.bus()),
                    self.bus_index.properties(request.bus()),
                    &mut lookups,
                );
                (request.id.clone(), warnings)
            })
            .collect();
        if !self.bus_index.is_empty() {
            diagnostics.merge(lookups);
        }

        self.bounds = self.network().and_then(Network::outline).and_then(bounds_of);
        self.selected_points = Arc::new(requests_to_point_features(
            self.selection.as_slice(),
            &mut diagnostics,
        ));
        self.scenario_lines = Arc::new(scenario_requests_to_line_features(
            &self.scenario_requests,
            &self.bus_index,
        ));

        let hexagon: Vec<ConnectionRequest> = self
            .hexagon_requests_unselected()
            .into_iter()
            .cloned()
            .collect();
        self.hexagon_layer = Arc::new(requests_to_point_features(&hexagon, &mut diagnostics));

        self.diagnostics = diagnostics;
    }
}

/// Session state owner. One per application session.
#[derive(Debug)]
pub struct Session {
    state: Arc<SessionState>,
    network_epoch: u64,
    scenario_epoch: u64,
    min_name_len: usize,
    /// Set by a network switch that found no default scenario yet; a later
    /// network list may still supply one.
    awaiting_default: bool,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            state: Arc::new(SessionState::default()),
            network_epoch: 0,
            scenario_epoch: 0,
            min_name_len: MIN_SCENARIO_NAME_LEN,
            awaiting_default: false,
        }
    }

    pub fn with_min_name_len(mut self, min_name_len: usize) -> Self {
        self.min_name_len = min_name_len;
        self
    }

    /// Current snapshot.
    pub fn state(&self) -> Arc<SessionState> {
        Arc::clone(&self.state)
    }

    fn update<R>(&mut self, f: impl FnOnce(&mut SessionState) -> R) -> R {
        let mut next = (*self.state).clone();
        let result = f(&mut next);
        next.derive(&self.state);
        self.state = Arc::new(next);
        result
    }

    // ─────────────────────────────────────────────────────────────────────
    // Networks
    // ─────────────────────────────────────────────────────────────────────

    /// Replace the network list.
    ///
    /// Networks may arrive after the network id. If the last switch could not
    /// select a default scenario and nothing was selected since, the current
    /// network's default scenario is selected now.
    pub fn set_networks(&mut self, networks: Vec<Network>) -> Option<ScenarioTicket> {
        self.update(|state| state.networks = networks);

        if !self.awaiting_default || self.state.scenario_id.is_some() {
            return None;
        }
        let default = self.state.network()?.default_scenario_id.clone()?;
        self.select_scenario(Some(default))
    }

    /// Switch to another network, resetting everything scoped to the old one.
    ///
    /// Returns `None` when `network_id` is already active.
    pub fn switch_network(&mut self, network_id: NetworkId) -> Option<NetworkSwitch> {
        if self.state.network_id.as_ref() == Some(&network_id) {
            return None;
        }

        self.network_epoch += 1;
        self.scenario_epoch += 1;
        debug!(network = %network_id, epoch = self.network_epoch, "switching network");

        let id = network_id.clone();
        self.update(|state| {
            let networks = std::mem::take(&mut state.networks);
            *state = SessionState {
                network_id: Some(id),
                networks,
                ..Default::default()
            };
        });

        let network = NetworkTicket {
            epoch: self.network_epoch,
            network_id,
        };
        let default = self
            .state
            .network()
            .and_then(|n| n.default_scenario_id.clone());
        let scenario = default.and_then(|id| self.select_scenario(Some(id)));
        self.awaiting_default = scenario.is_none();

        Some(NetworkSwitch { network, scenario })
    }

    /// Ticket for (re)loading network-scoped data.
    pub fn network_ticket(&self) -> Option<NetworkTicket> {
        Some(NetworkTicket {
            epoch: self.network_epoch,
            network_id: self.state.network_id.clone()?,
        })
    }

    fn network_ticket_is_current(&self, ticket: &NetworkTicket) -> bool {
        ticket.epoch == self.network_epoch
            && self.state.network_id.as_ref() == Some(&ticket.network_id)
    }

    /// Store one static layer. Returns `false` for a stale ticket.
    pub fn apply_geodata(
        &mut self,
        ticket: &NetworkTicket,
        layer: GeoLayer,
        data: FeatureCollection,
    ) -> bool {
        if !self.network_ticket_is_current(ticket) {
            debug!(?layer, network = %ticket.network_id, "discarding stale geodata");
            return false;
        }

        let data = Arc::new(data);
        self.update(|state| match layer {
            GeoLayer::Buses => state.buses = data,
            GeoLayer::Branches => state.branches = data,
            GeoLayer::Trafos => state.trafos = data,
            GeoLayer::Density => state.density = data,
        });
        true
    }

    // ─────────────────────────────────────────────────────────────────────
    // Scenarios
    // ─────────────────────────────────────────────────────────────────────

    /// Select a scenario, or clear the selection with `None`.
    ///
    /// Selecting returns a ticket for loading the details; nothing changes in
    /// the selection until they arrive. Clearing behaves like loading an empty
    /// scenario: locked requests are released and headroom dropped.
    pub fn select_scenario(&mut self, scenario_id: Option<ScenarioId>) -> Option<ScenarioTicket> {
        self.scenario_epoch += 1;
        self.awaiting_default = false;

        match scenario_id {
            Some(id) => {
                debug!(scenario = %id, epoch = self.scenario_epoch, "selecting scenario");
                let selected = id.clone();
                self.update(|state| {
                    state.scenario_id = Some(selected);
                    state.scenario = None;
                });
                self.scenario_ticket()
            }
            None => {
                debug!("clearing scenario");
                self.update(|state| {
                    state.scenario_id = None;
                    state.scenario = None;
                    state.headroom = Arc::default();
                    state.previous_scenario_requests = std::mem::take(&mut state.scenario_requests);
                    state.selection = reconcile_selection(
                        &state.selection,
                        &state.previous_scenario_requests,
                        &state.scenario_requests,
                    );
                });
                None
            }
        }
    }

    /// Ticket for (re)loading the selected scenario's details.
    pub fn scenario_ticket(&self) -> Option<ScenarioTicket> {
        Some(ScenarioTicket {
            network_epoch: self.network_epoch,
            scenario_epoch: self.scenario_epoch,
            network_id: self.state.network_id.clone()?,
            scenario_id: self.state.scenario_id.clone()?,
        })
    }

    fn scenario_ticket_is_current(&self, ticket: &ScenarioTicket) -> bool {
        ticket.network_epoch == self.network_epoch
            && ticket.scenario_epoch == self.scenario_epoch
            && self.state.network_id.as_ref() == Some(&ticket.network_id)
            && self.state.scenario_id.as_ref() == Some(&ticket.scenario_id)
    }

    /// Apply loaded scenario details and reconcile the selection.
    ///
    /// Returns `false` (state untouched) when the network or scenario changed
    /// since the ticket was issued.
    pub fn apply_scenario_details(
        &mut self,
        ticket: &ScenarioTicket,
        details: ScenarioDetails,
    ) -> bool {
        if !self.scenario_ticket_is_current(ticket) {
            debug!(scenario = %ticket.scenario_id, "discarding stale scenario details");
            return false;
        }

        self.update(|state| {
            state.headroom = Arc::new(details.headroom.clone().unwrap_or_default());
            state.previous_scenario_requests = std::mem::replace(
                &mut state.scenario_requests,
                details.connection_requests_list.clone(),
            );
            state.selection = reconcile_selection(
                &state.selection,
                &state.previous_scenario_requests,
                &state.scenario_requests,
            );
            state.scenario = Some(details);
        });
        true
    }

    /// Build the create body for the current selection.
    pub fn prepare_scenario(&self, name: &str) -> Result<NewScenario> {
        let name = name.trim();
        if name.chars().count() < self.min_name_len {
            return Err(Error::Validation(format!(
                "Scenario name must be at least {} characters",
                self.min_name_len
            )));
        }
        if self.state.selection.is_empty() {
            return Err(Error::Validation(
                "Select at least one connection request".to_string(),
            ));
        }

        Ok(NewScenario {
            code: format!("{name}{}", Utc::now().timestamp_millis()),
            name: name.to_string(),
            state: Some(ConnectionStatus::Request),
            connection_requests_list: self
                .state
                .selection
                .ids()
                .map(|id| ConnectionRequestRef { ref_id: id.clone() })
                .collect(),
        })
    }

    pub fn record_created_scenario(&mut self, scenario_id: ScenarioId) {
        self.update(|state| {
            if !state.created_scenario_ids.contains(&scenario_id) {
                state.created_scenario_ids.push(scenario_id);
            }
        });
    }

    /// Forget a deleted scenario. Clears the active scenario if it was the
    /// one deleted; returns whether it was.
    pub fn forget_scenario(&mut self, scenario_id: &ScenarioId) -> bool {
        self.update(|state| state.created_scenario_ids.retain(|id| id != scenario_id));

        if self.state.scenario_id.as_ref() == Some(scenario_id) {
            self.select_scenario(None);
            true
        } else {
            false
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Selection
    // ─────────────────────────────────────────────────────────────────────

    pub fn is_locked(&self, id: &ConnectionRequestId) -> bool {
        self.state.is_locked(id)
    }

    /// Select or deselect a request. Locked requests are refused.
    pub fn toggle_request(&mut self, request: ConnectionRequest) -> bool {
        if self.state.selection.contains(&request.id) {
            self.deselect_request(&request.id)
        } else {
            self.select_request(request)
        }
    }

    /// Returns `false` if already selected.
    pub fn select_request(&mut self, request: ConnectionRequest) -> bool {
        if self.state.selection.contains(&request.id) {
            return false;
        }
        self.update(|state| state.selection.insert(request))
    }

    /// Returns `false` if not selected or locked by the scenario.
    pub fn deselect_request(&mut self, id: &ConnectionRequestId) -> bool {
        if self.is_locked(id) || !self.state.selection.contains(id) {
            return false;
        }
        self.update(|state| state.selection.remove(id).is_some())
    }

    /// Deselect everything that is not locked.
    pub fn clear_selection(&mut self) {
        self.update(|state| {
            let locked: HashSet<ConnectionRequestId> =
                state.scenario_requests.iter().map(|r| r.id.clone()).collect();
            state.selection.retain(|r| locked.contains(&r.id));
        });
    }

    // ─────────────────────────────────────────────────────────────────────
    // Area buckets
    // ─────────────────────────────────────────────────────────────────────

    pub fn area_ticket(&self, bucket: &AreaBucket) -> Option<AreaTicket> {
        Some(AreaTicket {
            network: self.network_ticket()?,
            key: bucket.key(),
        })
    }

    /// Cache the requests of one area bucket. Returns `false` for a stale
    /// ticket.
    pub fn apply_area_requests(
        &mut self,
        ticket: &AreaTicket,
        requests: Vec<ConnectionRequest>,
    ) -> bool {
        if !self.network_ticket_is_current(&ticket.network) {
            debug!(bucket = %ticket.key, "discarding stale area requests");
            return false;
        }

        let key = ticket.key.clone();
        self.update(|state| {
            state.hexagon_requests.insert(key, requests);
        });
        true
    }

    pub fn clear_area_cache(&mut self) {
        self.update(|state| state.hexagon_requests.clear());
    }

    /// Show an element in the inspector. Properties that map renderers
    /// stringified are parsed back into JSON.
    pub fn pick(&mut self, element: Option<PickedElement>) {
        let element = element.map(|e| PickedElement {
            properties: parse_feature_properties(&e.properties),
            ..e
        });
        self.update(|state| state.picked = element);
    }
}
