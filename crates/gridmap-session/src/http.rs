//! [`GridApi`] over HTTP.

use std::time::Duration;

use async_trait::async_trait;
use gridmap_core::geo::FeatureCollection;
use gridmap_core::{
    error_message, ConnectionRequest, Network, NetworkId, NewScenario, Page, ScenarioDetails,
    ScenarioId, ScenarioSummary,
};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::api::{ConnectionRequestQuery, GeoLayer, GridApi, ScenarioQuery};
use crate::config::ApiConfig;
use crate::error::{Error, Result};

/// REST client for the gridmap backend.
#[derive(Debug, Clone)]
pub struct HttpGridApi {
    client: Client,
    base_url: String,
    token: Option<String>,
}

#[derive(Deserialize)]
struct Created {
    id: ScenarioId,
}

impl HttpGridApi {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    /// Absolute URL for a path below `/api/`.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/api/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn net_endpoint(&self, network: &NetworkId, path: &str) -> String {
        self.endpoint(&format!("nets/{network}/{path}"))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = self.authorize(request).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(api_error(status, &body))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: String,
        query: &[(String, String)],
    ) -> Result<T> {
        debug!(%url, "GET");
        let response = self.send(self.client.get(&url).query(query)).await?;
        Ok(response.json().await?)
    }
}

/// Map an unsuccessful response to an [`Error`], extracting the backend's
/// message from the body.
fn api_error(status: StatusCode, body: &str) -> Error {
    let payload = serde_json::from_str::<Value>(body).unwrap_or_else(|_| {
        if body.trim().is_empty() {
            Value::Null
        } else {
            Value::String(body.to_string())
        }
    });

    let message = match error_message(&payload) {
        unknown if unknown == "Unknown error" => status
            .canonical_reason()
            .map(str::to_string)
            .unwrap_or(unknown),
        message => message,
    };

    if status == StatusCode::CONFLICT {
        Error::Conflict(message)
    } else {
        Error::Api {
            status: Some(status.as_u16()),
            message,
        }
    }
}

#[async_trait]
impl GridApi for HttpGridApi {
    async fn list_networks(&self) -> Result<Vec<Network>> {
        self.get_json(self.endpoint("nets/"), &[]).await
    }

    async fn list_scenarios(
        &self,
        network: &NetworkId,
        query: &ScenarioQuery,
    ) -> Result<Page<ScenarioSummary>> {
        self.get_json(self.net_endpoint(network, "scenarios/"), &query.to_pairs())
            .await
    }

    async fn scenario_details(
        &self,
        network: &NetworkId,
        scenario: &ScenarioId,
    ) -> Result<ScenarioDetails> {
        self.get_json(self.net_endpoint(network, &format!("scenarios/{scenario}")), &[])
            .await
    }

    async fn create_scenario(
        &self,
        network: &NetworkId,
        body: &NewScenario,
    ) -> Result<ScenarioId> {
        let url = self.net_endpoint(network, "scenarios/");
        debug!(%url, name = %body.name, "POST");
        let response = self.send(self.client.post(&url).json(body)).await?;
        let created: Created = response.json().await?;
        Ok(created.id)
    }

    async fn delete_scenario(&self, network: &NetworkId, scenario: &ScenarioId) -> Result<()> {
        let url = self.net_endpoint(network, &format!("scenarios/{scenario}"));
        debug!(%url, "DELETE");
        self.send(self.client.delete(&url)).await?;
        Ok(())
    }

    async fn calculate_scenario(
        &self,
        network: &NetworkId,
        scenario: &ScenarioId,
        only_affected_buses: bool,
    ) -> Result<()> {
        let url = self.net_endpoint(network, &format!("scenarios/{scenario}/calculation"));
        debug!(%url, only_affected_buses, "POST");
        let flag = if only_affected_buses { "1" } else { "0" };
        self.send(
            self.client
                .post(&url)
                .query(&[("only_affected_buses", flag)]),
        )
        .await?;
        Ok(())
    }

    async fn connection_requests(
        &self,
        network: &NetworkId,
        query: &ConnectionRequestQuery,
    ) -> Result<Page<ConnectionRequest>> {
        self.get_json(self.net_endpoint(network, "connections/"), &query.to_pairs())
            .await
    }

    async fn geojson(&self, network: &NetworkId, layer: GeoLayer) -> Result<FeatureCollection> {
        self.get_json(self.net_endpoint(network, layer.path()), &[])
            .await
    }
}
