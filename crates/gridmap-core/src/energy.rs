//! Bus types and the energy kinds they accept.
//!
//! A connection request injects (production), withdraws (consumption) or does
//! both at its connectivity bus. Whether that is admissible depends only on the
//! bus's role in the grid model, captured by [`BusType::accepts`].

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::diagnostics::Diagnostics;

/// Direction of power for a connection request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EnergyKind {
    Consumption,
    Production,
    ConsumptionProduction,
    Other,
    /// A value outside the known set, kept verbatim so it can be rejected.
    Unknown(String),
}

impl EnergyKind {
    /// Every value the backend is known to emit.
    pub fn known() -> [EnergyKind; 4] {
        [
            EnergyKind::Consumption,
            EnergyKind::Production,
            EnergyKind::ConsumptionProduction,
            EnergyKind::Other,
        ]
    }

    pub fn as_str(&self) -> &str {
        match self {
            EnergyKind::Consumption => "consumption",
            EnergyKind::Production => "production",
            EnergyKind::ConsumptionProduction => "consumption_production",
            EnergyKind::Other => "other",
            EnergyKind::Unknown(raw) => raw,
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw {
            "consumption" => EnergyKind::Consumption,
            "production" => EnergyKind::Production,
            "consumption_production" => EnergyKind::ConsumptionProduction,
            "other" => EnergyKind::Other,
            other => EnergyKind::Unknown(other.to_string()),
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, EnergyKind::Unknown(_))
    }
}

impl fmt::Display for EnergyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for EnergyKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EnergyKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(EnergyKind::parse(&raw))
    }
}

/// Semantic bus type, decoded from the integer `bus_type` code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusType {
    Unknown,
    Loading,
    Generator,
    Swingbus,
    Disconnected,
    LoadingArea,
    Node,
}

impl BusType {
    pub const ALL: [BusType; 7] = [
        BusType::Unknown,
        BusType::Loading,
        BusType::Generator,
        BusType::Swingbus,
        BusType::Disconnected,
        BusType::LoadingArea,
        BusType::Node,
    ];

    /// Decode a bus type code. Codes outside `0..=6` are rejected.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(BusType::Unknown),
            1 => Some(BusType::Loading),
            2 => Some(BusType::Generator),
            3 => Some(BusType::Swingbus),
            4 => Some(BusType::Disconnected),
            5 => Some(BusType::LoadingArea),
            6 => Some(BusType::Node),
            _ => None,
        }
    }

    pub fn code(self) -> i64 {
        match self {
            BusType::Unknown => 0,
            BusType::Loading => 1,
            BusType::Generator => 2,
            BusType::Swingbus => 3,
            BusType::Disconnected => 4,
            BusType::LoadingArea => 5,
            BusType::Node => 6,
        }
    }

    /// Whether a request of `kind` may connect to a bus of this type.
    pub fn accepts(self, kind: &EnergyKind) -> bool {
        use EnergyKind::*;

        match self {
            BusType::Unknown | BusType::Disconnected => false,
            BusType::Loading | BusType::LoadingArea => matches!(kind, Production | Other),
            BusType::Generator => matches!(kind, Consumption | Other),
            BusType::Swingbus => {
                matches!(kind, Production | Consumption | Other | ConsumptionProduction)
            }
            BusType::Node => matches!(kind, Production | Consumption),
        }
    }

    /// The accepted energy kinds, in [`EnergyKind::known`] order.
    pub fn supported_energy_kinds(self) -> Vec<EnergyKind> {
        EnergyKind::known()
            .into_iter()
            .filter(|kind| self.accepts(kind))
            .collect()
    }
}

impl fmt::Display for BusType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BusType::Unknown => "unknown",
            BusType::Loading => "loading",
            BusType::Generator => "generator",
            BusType::Swingbus => "swingbus",
            BusType::Disconnected => "disconnected",
            BusType::LoadingArea => "loading_area",
            BusType::Node => "node",
        };
        f.write_str(name)
    }
}

/// Check a bus type code against an energy kind.
///
/// Unknown energy kinds and absent or out-of-range bus type codes are
/// reported to `diagnostics` and yield `false`.
pub fn bus_type_supports_energy_kind(
    bus_type_code: Option<i64>,
    energy_kind: &EnergyKind,
    diagnostics: &mut Diagnostics,
) -> bool {
    if !energy_kind.is_known() {
        diagnostics.add_error_with_entity(
            "energy_kind",
            &format!("unknown connection_energy_kind '{energy_kind}'"),
            energy_kind.as_str(),
        );
        return false;
    }

    let Some(bus_type) = bus_type_code.and_then(BusType::from_code) else {
        let code = bus_type_code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "none".to_string());
        diagnostics.add_error_with_entity(
            "bus_type",
            &format!("unknown bus_type code {code}"),
            &code,
        );
        return false;
    };

    bus_type.accepts(energy_kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(bus_type: BusType) -> Vec<EnergyKind> {
        use EnergyKind::*;
        match bus_type {
            BusType::Unknown | BusType::Disconnected => vec![],
            BusType::Loading | BusType::LoadingArea => vec![Production, Other],
            BusType::Generator => vec![Consumption, Other],
            BusType::Swingbus => vec![Production, Consumption, Other, ConsumptionProduction],
            BusType::Node => vec![Production, Consumption],
        }
    }

    #[test]
    fn test_matrix_matches_table() {
        for bus_type in BusType::ALL {
            for kind in EnergyKind::known() {
                let mut diag = Diagnostics::new();
                let expected = table(bus_type).contains(&kind);
                assert_eq!(
                    bus_type_supports_energy_kind(Some(bus_type.code()), &kind, &mut diag),
                    expected,
                    "{bus_type} / {kind}"
                );
                assert!(!diag.has_issues());
            }
        }
    }

    #[test]
    fn test_unknown_energy_kind_is_rejected_for_every_bus_type() {
        let kind = EnergyKind::parse("storage");
        for bus_type in BusType::ALL {
            let mut diag = Diagnostics::new();
            assert!(!bus_type_supports_energy_kind(
                Some(bus_type.code()),
                &kind,
                &mut diag
            ));
            assert_eq!(diag.issues_by_category("energy_kind").count(), 1);
        }
    }

    #[test]
    fn test_unknown_bus_type_code_is_rejected() {
        let mut diag = Diagnostics::new();
        assert!(!bus_type_supports_energy_kind(
            Some(42),
            &EnergyKind::Production,
            &mut diag
        ));
        assert!(!bus_type_supports_energy_kind(
            None,
            &EnergyKind::Production,
            &mut diag
        ));
        assert_eq!(diag.issues_by_category("bus_type").count(), 2);
    }

    #[test]
    fn test_codes_roundtrip() {
        for bus_type in BusType::ALL {
            assert_eq!(BusType::from_code(bus_type.code()), Some(bus_type));
        }
        assert_eq!(BusType::from_code(-1), None);
    }

    #[test]
    fn test_supported_energy_kinds_for_swingbus() {
        assert_eq!(BusType::Swingbus.supported_energy_kinds().len(), 4);
        assert!(BusType::Disconnected.supported_energy_kinds().is_empty());
    }
}
