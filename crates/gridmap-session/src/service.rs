//! Main session service entry point.
//!
//! The [`SessionService`] drives a [`Session`] from backend responses. Every
//! call follows the same shape: issue a ticket under the lock, release the
//! lock, await the backend, then apply the response under the lock again.
//! Responses whose ticket went stale in the meantime are dropped.
//!
//! After each transition the changed map layers are pushed to the
//! [`MapSink`], and new data problems are reported as warning notices.

use std::sync::Arc;

use gridmap_core::geo::FeatureCollection;
use gridmap_core::{
    ConnectionRequest, ConnectionRequestId, NetworkId, Page, ScenarioId, ScenarioSummary,
};
use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::api::{AreaBucket, ConnectionRequestQuery, GeoLayer, GridApi, ScenarioQuery};
use crate::config::GridmapConfig;
use crate::error::{Error, Result};
use crate::events::{Notice, SessionEvent};
use crate::map::{MapSink, SourceId};
use crate::session::{NetworkTicket, PickedElement, ScenarioTicket, Session, SessionState};

/// Async controller for one session.
///
/// Owns:
/// - the [`Session`] state machine
/// - the [`GridApi`] it loads data from
/// - the [`MapSink`] derived layers are pushed to
pub struct SessionService {
    /// Shared session state.
    session: Arc<RwLock<Session>>,

    api: Arc<dyn GridApi>,
    map: Arc<dyn MapSink>,

    /// Application configuration.
    config: Arc<RwLock<GridmapConfig>>,

    events_tx: broadcast::Sender<SessionEvent>,

    /// Held from a transition until its layers are pushed, so the sink sees
    /// states in the order they were produced.
    publishing: Mutex<()>,
}

impl SessionService {
    pub fn new(api: Arc<dyn GridApi>, map: Arc<dyn MapSink>) -> Self {
        let (events_tx, _) = broadcast::channel(256);
        Self {
            session: Arc::new(RwLock::new(Session::new())),
            api,
            map,
            config: Arc::new(RwLock::new(GridmapConfig::default())),
            events_tx,
            publishing: Mutex::new(()),
        }
    }

    /// Use `config` for limits and validation.
    pub fn with_config(self, config: GridmapConfig) -> Self {
        let min_name_len = config.session.min_scenario_name_len;
        {
            let mut session = self.session.write();
            let current = std::mem::take(&mut *session);
            *session = current.with_min_name_len(min_name_len);
        }
        *self.config.write() = config;
        self
    }

    pub fn session(&self) -> &Arc<RwLock<Session>> {
        &self.session
    }

    /// Current snapshot.
    pub fn state(&self) -> Arc<SessionState> {
        self.session.read().state()
    }

    pub fn config(&self) -> &Arc<RwLock<GridmapConfig>> {
        &self.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events_tx.subscribe()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Plumbing
    // ─────────────────────────────────────────────────────────────────────

    /// Run a transition and publish what changed.
    fn update<R>(&self, f: impl FnOnce(&mut Session) -> R) -> R {
        let _publishing = self.publishing.lock();
        let (previous, result, next) = {
            let mut session = self.session.write();
            let previous = session.state();
            let result = f(&mut session);
            (previous, result, session.state())
        };

        if !Arc::ptr_eq(&previous, &next) {
            self.publish(&previous, &next);
        }
        result
    }

    fn publish(&self, previous: &SessionState, next: &SessionState) {
        for source in SourceId::ALL {
            let (before, after) = (layer(previous, source), layer(next, source));
            if !Arc::ptr_eq(before, after) && before != after {
                self.map.set_data(source, after);
            }
        }

        for issue in next.diagnostics.new_since(&previous.diagnostics) {
            warn!(category = %issue.category, "{}", issue.message);
            self.notify(Notice::warning(issue.message.clone()));
        }

        if previous.selection != next.selection {
            self.emit(SessionEvent::SelectionChanged {
                selected: next.selection.len(),
            });
        }
    }

    /// Push every layer, changed or not.
    pub fn sync_map(&self) {
        let _publishing = self.publishing.lock();
        let state = self.state();
        for source in SourceId::ALL {
            self.map.set_data(source, layer(&state, source));
        }
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events_tx.send(event);
    }

    fn notify(&self, notice: Notice) {
        self.emit(SessionEvent::Notice(notice));
    }

    /// Report a failure to the user and pass it on.
    fn report<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            warn!(error = %e, "request failed");
            self.notify(Notice::error(e.to_string()));
        }
        result
    }

    fn network_id(&self) -> Result<NetworkId> {
        self.state()
            .network_id
            .clone()
            .ok_or(Error::NoNetworkSelected)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Networks
    // ─────────────────────────────────────────────────────────────────────

    /// Fetch the network list, selecting the default scenario if applicable.
    pub async fn load_networks(&self) -> Result<()> {
        let networks = self.report(self.api.list_networks().await)?;
        if let Some(ticket) = self.update(|s| s.set_networks(networks)) {
            self.load_scenario(ticket).await?;
        }
        Ok(())
    }

    /// Switch networks, then load its geodata and default scenario.
    pub async fn switch_network(&self, network_id: NetworkId) -> Result<()> {
        let Some(switch) = self.update(|s| s.switch_network(network_id.clone())) else {
            return Ok(());
        };
        self.emit(SessionEvent::NetworkSwitched { network_id });

        self.load_geodata(&switch.network).await?;
        if let Some(ticket) = switch.scenario {
            self.load_scenario(ticket).await?;
        }
        Ok(())
    }

    async fn load_geodata(&self, ticket: &NetworkTicket) -> Result<()> {
        let network = ticket.network_id();
        let (buses, branches, trafos, density) = tokio::join!(
            self.api.geojson(network, GeoLayer::Buses),
            self.api.geojson(network, GeoLayer::Branches),
            self.api.geojson(network, GeoLayer::Trafos),
            self.api.geojson(network, GeoLayer::Density),
        );

        let mut first_error = None;
        for (layer, result) in [
            (GeoLayer::Buses, buses),
            (GeoLayer::Branches, branches),
            (GeoLayer::Trafos, trafos),
            (GeoLayer::Density, density),
        ] {
            match self.report(result) {
                Ok(data) => {
                    if !self.update(|s| s.apply_geodata(ticket, layer, data)) {
                        return Ok(());
                    }
                }
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Scenarios
    // ─────────────────────────────────────────────────────────────────────

    pub async fn list_scenarios(&self, query: &ScenarioQuery) -> Result<Page<ScenarioSummary>> {
        let network = self.network_id()?;
        self.report(self.api.list_scenarios(&network, query).await)
    }

    /// Select a scenario and load its details, or clear it with `None`.
    pub async fn select_scenario(&self, scenario_id: Option<ScenarioId>) -> Result<bool> {
        if scenario_id.is_some() {
            self.network_id()?;
        }
        match self.update(|s| s.select_scenario(scenario_id)) {
            Some(ticket) => self.load_scenario(ticket).await,
            None => {
                self.emit(SessionEvent::ScenarioLoaded { scenario_id: None });
                Ok(true)
            }
        }
    }

    /// Reload the selected scenario (after a calculation finished).
    pub async fn reload_scenario(&self) -> Result<bool> {
        let ticket = self
            .session
            .read()
            .scenario_ticket()
            .ok_or(Error::NoScenarioSelected)?;
        self.load_scenario(ticket).await
    }

    /// Fetch and apply scenario details. Returns `false` if they arrived stale.
    async fn load_scenario(&self, ticket: ScenarioTicket) -> Result<bool> {
        let details = self.report(
            self.api
                .scenario_details(ticket.network_id(), ticket.scenario_id())
                .await,
        )?;

        let applied = self.update(|s| s.apply_scenario_details(&ticket, details));
        if applied {
            self.emit(SessionEvent::ScenarioLoaded {
                scenario_id: Some(ticket.scenario_id().clone()),
            });
        } else {
            debug!(scenario = %ticket.scenario_id(), "scenario details arrived stale");
        }
        Ok(applied)
    }

    /// Create a scenario from the current selection.
    pub async fn create_scenario(&self, name: &str) -> Result<ScenarioId> {
        let network = self.report(self.network_id())?;
        let body = self.report(self.session.read().prepare_scenario(name))?;

        let scenario_id = self.report(self.api.create_scenario(&network, &body).await)?;

        self.update(|s| s.record_created_scenario(scenario_id.clone()));
        self.notify(Notice::success(format!(
            "Scenario \"{}\" was successfully created.",
            body.name
        )));
        self.emit(SessionEvent::ScenarioCreated {
            scenario_id: scenario_id.clone(),
        });
        Ok(scenario_id)
    }

    pub async fn delete_scenario(&self, scenario_id: &ScenarioId, name: &str) -> Result<()> {
        let network = self.report(self.network_id())?;
        self.report(self.api.delete_scenario(&network, scenario_id).await)?;

        let was_active = self.update(|s| s.forget_scenario(scenario_id));
        self.notify(Notice::success(format!(
            "Scenario \"{name}\" was successfully deleted"
        )));
        self.emit(SessionEvent::ScenarioDeleted {
            scenario_id: scenario_id.clone(),
        });
        if was_active {
            self.emit(SessionEvent::ScenarioLoaded { scenario_id: None });
        }
        Ok(())
    }

    /// Queue a headroom calculation.
    pub async fn calculate_scenario(
        &self,
        scenario_id: &ScenarioId,
        name: &str,
        only_affected_buses: bool,
    ) -> Result<()> {
        let network = self.report(self.network_id())?;
        self.report(
            self.api
                .calculate_scenario(&network, scenario_id, only_affected_buses)
                .await,
        )?;
        self.notify(Notice::info(format!("Scenario \"{name}\" is calculating...")));
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Selection and map
    // ─────────────────────────────────────────────────────────────────────

    pub fn toggle_request(&self, request: ConnectionRequest) -> bool {
        self.update(|s| s.toggle_request(request))
    }

    pub fn select_request(&self, request: ConnectionRequest) -> bool {
        self.update(|s| s.select_request(request))
    }

    pub fn deselect_request(&self, id: &ConnectionRequestId) -> bool {
        self.update(|s| s.deselect_request(id))
    }

    pub fn clear_selection(&self) {
        self.update(|s| s.clear_selection())
    }

    /// Query connection requests of the current network.
    pub async fn connection_requests(
        &self,
        query: &ConnectionRequestQuery,
    ) -> Result<Page<ConnectionRequest>> {
        let network = self.network_id()?;
        self.report(self.api.connection_requests(&network, query).await)
    }

    /// Look up requests by id, paging through the network's requests until
    /// all are found or the list is exhausted. Ids that do not exist are
    /// missing from the result.
    pub async fn find_connection_requests(
        &self,
        ids: &[ConnectionRequestId],
    ) -> Result<Vec<ConnectionRequest>> {
        let limit = self.config.read().api.request_limit.max(1);
        let mut found: Vec<Option<ConnectionRequest>> = vec![None; ids.len()];
        let mut offset = 0u32;

        while found.iter().any(Option::is_none) {
            let query = ConnectionRequestQuery {
                offset: Some(offset),
                ..Default::default()
            }
            .with_limit(limit);
            let page = self.connection_requests(&query).await?;
            let fetched = page.items.len() as u32;

            for request in page.items {
                if let Some(i) = ids.iter().position(|id| *id == request.id) {
                    found[i] = Some(request);
                }
            }

            offset += fetched;
            let exhausted = page.count.is_some_and(|count| u64::from(offset) >= count);
            if fetched == 0 || exhausted {
                break;
            }
        }

        debug!(offset, wanted = ids.len(), "connection request lookup");
        Ok(found.into_iter().flatten().collect())
    }

    /// Load the requests inside one area into the hexagon layer.
    pub async fn load_area(&self, bucket: AreaBucket) -> Result<bool> {
        self.report(bucket.validate())?;
        let ticket = self
            .session
            .read()
            .area_ticket(&bucket)
            .ok_or(Error::NoNetworkSelected)?;

        let limit = self.config.read().api.request_limit;
        let query = ConnectionRequestQuery::for_bucket(&bucket).with_limit(limit);
        let page = self.report(
            self.api
                .connection_requests(ticket.network_id(), &query)
                .await,
        )?;

        Ok(self.update(|s| s.apply_area_requests(&ticket, page.items)))
    }

    pub fn clear_areas(&self) {
        self.update(|s| s.clear_area_cache())
    }

    pub fn pick(&self, element: Option<PickedElement>) {
        self.update(|s| s.pick(element))
    }
}

fn layer(state: &SessionState, source: SourceId) -> &Arc<FeatureCollection> {
    match source {
        SourceId::Buses => &state.colored_buses,
        SourceId::Branches => &state.colored_branches,
        SourceId::Trafos => &state.colored_trafos,
        SourceId::ConnectionRequests => &state.selected_points,
        SourceId::ScenarioLines => &state.scenario_lines,
        SourceId::Density => &state.density,
        SourceId::Hexagons => &state.hexagon_layer,
    }
}
