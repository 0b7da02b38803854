use std::collections::{HashMap, HashSet};

use super::types::{Feature, FeatureCollection};
use crate::{BusHeadroom, BusNumber};

pub const COLOR_RED: &str = "rgb(247, 77, 77)";
pub const COLOR_GREEN: &str = "rgb(56, 150, 42)";
/// "DimGray", used when no headroom has been computed.
pub const DEFAULT_COLOR: &str = "rgb(110, 110, 110)";

/// Color bus features by their headroom.
///
/// Gray without a matching headroom entry, red when any matching entry has a
/// limiting factor, green otherwise.
pub fn annotate_buses_with_color(
    buses: &FeatureCollection,
    headrooms: &[BusHeadroom],
) -> FeatureCollection {
    let mut limited: HashMap<&BusNumber, bool> = HashMap::new();
    for headroom in headrooms {
        *limited.entry(&headroom.bus.number).or_insert(false) |= headroom.has_limiting_factor();
    }

    let features = buses
        .features
        .iter()
        .map(|feature| {
            let color = match bus_number(feature).and_then(|n| limited.get(&n).copied()) {
                None => DEFAULT_COLOR,
                Some(true) => COLOR_RED,
                Some(false) => COLOR_GREEN,
            };
            feature.with_property("color", color)
        })
        .collect();

    FeatureCollection::new(features)
}

/// Color branch (or transformer) features by the limiting factors they cause.
///
/// Red when a load or generation limiting factor names the branch's endpoints,
/// green when headroom exists but none does, gray when there is no headroom at
/// all.
pub fn annotate_branches_with_color(
    branches: &FeatureCollection,
    headrooms: &[BusHeadroom],
) -> FeatureCollection {
    let bottlenecks: HashSet<(&BusNumber, &BusNumber)> = headrooms
        .iter()
        .flat_map(|h| h.limiting_factors())
        .filter_map(|lf| lf.endpoints())
        .collect();

    let features = branches
        .features
        .iter()
        .map(|feature| {
            let color = if headrooms.is_empty() {
                DEFAULT_COLOR
            } else {
                match branch_endpoints(feature) {
                    Some((from, to)) if bottlenecks.contains(&(&from, &to)) => COLOR_RED,
                    _ => COLOR_GREEN,
                }
            };
            feature.with_property("color", color)
        })
        .collect();

    FeatureCollection::new(features)
}

fn bus_number(feature: &Feature) -> Option<BusNumber> {
    feature
        .properties
        .get("number")
        .and_then(BusNumber::from_value)
}

fn branch_endpoints(feature: &Feature) -> Option<(BusNumber, BusNumber)> {
    let from = feature.properties.get("from_bus")?.get("number")?;
    let to = feature.properties.get("to_bus")?.get("number")?;
    Some((BusNumber::from_value(from)?, BusNumber::from_value(to)?))
}
