use std::collections::HashMap;

use serde_json::{Map, Value};

use super::types::{BusProperties, Feature, FeatureCollection, Geometry, Position};
use crate::diagnostics::Diagnostics;
use crate::{BusNumber, ConnectionRequest};

/// Location and properties of one bus feature.
#[derive(Debug, Clone, PartialEq)]
pub struct BusEntry {
    pub position: Position,
    pub properties: BusProperties,
}

/// Bus features keyed by bus number.
///
/// When a collection lists the same number twice, the first feature wins.
#[derive(Debug, Clone, Default)]
pub struct BusIndex {
    by_number: HashMap<BusNumber, BusEntry>,
}

impl BusIndex {
    pub fn from_features(buses: &FeatureCollection) -> Self {
        let mut by_number = HashMap::with_capacity(buses.len());

        for feature in &buses.features {
            let Some(number) = feature.properties.get("number").and_then(BusNumber::from_value)
            else {
                continue;
            };
            let Some(position) = feature.geometry.as_ref().and_then(Geometry::as_point) else {
                continue;
            };

            by_number.entry(number).or_insert_with(|| BusEntry {
                position: position.clone(),
                properties: feature.properties.clone(),
            });
        }

        Self { by_number }
    }

    pub fn get(&self, number: &BusNumber) -> Option<&BusEntry> {
        self.by_number.get(number)
    }

    pub fn properties(&self, number: &BusNumber) -> Option<&BusProperties> {
        self.get(number).map(|entry| &entry.properties)
    }

    pub fn len(&self) -> usize {
        self.by_number.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_number.is_empty()
    }
}

/// One point feature per request, in input order.
///
/// The full request record becomes the feature's properties. Requests without
/// geocoding are placed at `[0, 0]` and reported.
pub fn requests_to_point_features(
    requests: &[ConnectionRequest],
    diagnostics: &mut Diagnostics,
) -> FeatureCollection {
    let features = requests
        .iter()
        .map(|request| {
            let [lon, lat] = request.position().unwrap_or_else(|| {
                diagnostics.add_warning_with_entity(
                    "geodata",
                    &format!(
                        "Connection request with id \"{}\" has no coordinates! Automatically set [0, 0]",
                        request.id
                    ),
                    &format!("Connection {}", request.id),
                );
                [0.0, 0.0]
            });

            Feature::new(Geometry::point(lon, lat), request_properties(request))
        })
        .collect();

    FeatureCollection::new(features)
}

fn request_properties(request: &ConnectionRequest) -> Map<String, Value> {
    match serde_json::to_value(request) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

/// Lines from each request to its connectivity bus.
///
/// Requests whose bus is not (yet) in `buses`, or that are not geocoded, are
/// left out.
pub fn scenario_requests_to_line_features(
    requests: &[ConnectionRequest],
    buses: &BusIndex,
) -> FeatureCollection {
    let features = requests
        .iter()
        .filter_map(|request| {
            let bus = buses.get(request.bus())?;
            let [lon, lat] = request.position()?;

            Some(Feature::new(
                Geometry::LineString {
                    coordinates: vec![vec![lon, lat], bus.position.clone()],
                },
                Map::new(),
            ))
        })
        .collect();

    FeatureCollection::new(features)
}

/// Axis-aligned bounding box in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

/// Bounding box of a set of positions, used to fit the map to a network.
///
/// Returns `None` for an empty slice or if any coordinate is not finite.
pub fn bounds_of(positions: &[Position]) -> Option<Bounds> {
    let mut bounds: Option<Bounds> = None;

    for position in positions {
        let (&lon, &lat) = (position.first()?, position.get(1)?);
        if !lon.is_finite() || !lat.is_finite() {
            return None;
        }

        bounds = Some(match bounds {
            None => Bounds {
                west: lon,
                south: lat,
                east: lon,
                north: lat,
            },
            Some(b) => Bounds {
                west: b.west.min(lon),
                south: b.south.min(lat),
                east: b.east.max(lon),
                north: b.north.max(lat),
            },
        });
    }

    bounds
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EnergyKind;
    use serde_json::json;

    fn buses() -> FeatureCollection {
        serde_json::from_value(json!({
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "geometry": { "type": "Point", "coordinates": [-2.25221777, 51.949337006] },
                    "properties": { "number": "Turner", "bus_type": 1 }
                },
                {
                    "type": "Feature",
                    "geometry": { "type": "Point", "coordinates": [9.0, 9.0] },
                    "properties": { "number": "Turner", "bus_type": 2 }
                }
            ]
        }))
        .unwrap()
    }

    #[test]
    fn test_points_preserve_length_and_order() {
        let requests = vec![
            ConnectionRequest::new("r1", "A", EnergyKind::Production, 1.0).with_position(1.0, 2.0),
            ConnectionRequest::new("r2", "B", EnergyKind::Consumption, 2.0),
            ConnectionRequest::new("r3", "C", EnergyKind::Other, 3.0).with_position(5.0, 6.0),
        ];

        let mut diag = Diagnostics::new();
        let points = requests_to_point_features(&requests, &mut diag);

        assert_eq!(points.len(), 3);
        let ids: Vec<_> = points
            .features
            .iter()
            .map(|f| f.properties["id"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(ids, ["r1", "r2", "r3"]);

        assert_eq!(
            points.features[1].geometry,
            Some(Geometry::point(0.0, 0.0))
        );
        assert_eq!(diag.issues_by_category("geodata").count(), 1);
    }

    #[test]
    fn test_line_to_connectivity_bus() {
        let request = ConnectionRequest::new("r1", "Turner", EnergyKind::Production, 1.0)
            .with_position(-2.127803153144379, 51.94223770356756);
        let index = BusIndex::from_features(&buses());

        let lines = scenario_requests_to_line_features(&[request], &index);

        assert_eq!(lines.len(), 1);
        assert_eq!(
            lines.features[0].geometry,
            Some(Geometry::LineString {
                coordinates: vec![
                    vec![-2.127803153144379, 51.94223770356756],
                    vec![-2.25221777, 51.949337006],
                ]
            })
        );
        assert!(lines.features[0].properties.is_empty());
    }

    #[test]
    fn test_line_dropped_when_bus_missing() {
        let request = ConnectionRequest::new("r1", "Nowhere", EnergyKind::Production, 1.0)
            .with_position(1.0, 1.0);
        let index = BusIndex::from_features(&buses());

        let lines = scenario_requests_to_line_features(&[request], &index);
        assert!(lines.is_empty());
    }

    #[test]
    fn test_bus_index_keeps_first_duplicate() {
        let index = BusIndex::from_features(&buses());
        assert_eq!(index.len(), 1);
        let entry = index.get(&BusNumber::new("Turner")).unwrap();
        assert_eq!(entry.properties["bus_type"], 1);
    }

    #[test]
    fn test_bounds() {
        let ring = vec![vec![7.0, 48.0], vec![8.5, 47.5], vec![7.5, 49.0]];
        assert_eq!(
            bounds_of(&ring),
            Some(Bounds {
                west: 7.0,
                south: 47.5,
                east: 8.5,
                north: 49.0
            })
        );
        assert_eq!(bounds_of(&[]), None);
        assert_eq!(bounds_of(&[vec![f64::NAN, 1.0]]), None);
    }
}
