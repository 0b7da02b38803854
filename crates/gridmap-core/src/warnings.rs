//! Per-request checks against the connectivity bus.
//!
//! A request staged for a new scenario is flagged when its bus has no
//! remaining headroom in the direction that matters, or when the bus type
//! cannot accept the request's energy kind at all.

use serde::{Deserialize, Serialize};

use crate::diagnostics::Diagnostics;
use crate::energy::bus_type_supports_energy_kind;
use crate::geo::BusProperties;
use crate::{BusHeadroom, ConnectionRequest};

/// Warnings attached to one connection request. `None` means no problem.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionWarnings {
    /// The bus has no load headroom left.
    pub bus_available_load: Option<String>,
    /// The bus has no generation headroom left.
    pub bus_available_gen: Option<String>,
    /// The bus type does not accept the request's energy kind.
    pub energy_kind: Option<String>,
}

impl ConnectionWarnings {
    pub fn is_clear(&self) -> bool {
        self.messages().next().is_none()
    }

    pub fn messages(&self) -> impl Iterator<Item = &str> {
        [
            &self.bus_available_load,
            &self.bus_available_gen,
            &self.energy_kind,
        ]
        .into_iter()
        .filter_map(|m| m.as_deref())
    }
}

/// Evaluate one request against its bus's headroom and properties.
///
/// Either input may be missing (buses load separately from scenario
/// results). A missing bus is reported to `diagnostics`, not as a warning.
pub fn warnings_for_connection_request(
    request: &ConnectionRequest,
    bus_headroom: Option<&BusHeadroom>,
    bus_properties: Option<&BusProperties>,
    diagnostics: &mut Diagnostics,
) -> ConnectionWarnings {
    let mut warnings = ConnectionWarnings::default();
    let label = request.label();
    let bus = request.bus();

    if let Some(headroom) = bus_headroom {
        if headroom.available_gen().is_some_and(|mva| mva <= 0.0) {
            warnings.bus_available_gen = Some(format!(
                "'{label}' connectivity bus '{bus}' doesn't support generation connection"
            ));
        }
        if headroom.available_load().is_some_and(|mva| mva <= 0.0) {
            warnings.bus_available_load = Some(format!(
                "'{label}' connectivity bus '{bus}' doesn't support load connection"
            ));
        }
    }

    match bus_properties {
        Some(properties) => {
            let code = properties.get("bus_type").and_then(serde_json::Value::as_i64);
            if !bus_type_supports_energy_kind(code, &request.connection_energy_kind, diagnostics) {
                let message =
                    format!("'{label}' has energy kind that is not supported by connectivity bus");
                diagnostics.add_warning_with_entity(
                    "energy_kind",
                    &message,
                    &format!("Connection {}", request.id),
                );
                warnings.energy_kind = Some(message);
            }
        }
        None => diagnostics.add_warning_with_entity(
            "reference",
            &format!(
                "Connection '{}' connectivity bus with number '{bus}' was not found",
                request.id
            ),
            &format!("Connection {}", request.id),
        ),
    }

    warnings
}
