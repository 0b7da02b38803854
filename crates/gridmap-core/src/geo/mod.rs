//! GeoJSON shaping for map layers.
//!
//! Everything here is pure: records in, feature collections out. Missing
//! geodata degrades to defaults (or the feature is omitted) and is reported
//! through [`Diagnostics`](crate::Diagnostics) instead of failing.

mod color;
mod convert;
mod tree;
mod types;

pub use color::{
    annotate_branches_with_color, annotate_buses_with_color, COLOR_GREEN, COLOR_RED,
    DEFAULT_COLOR,
};
pub use convert::{
    bounds_of, requests_to_point_features, scenario_requests_to_line_features, Bounds, BusEntry,
    BusIndex,
};
pub use tree::{flatten_to_tree, parse_feature_properties, TreeNode};
pub use types::{
    BusProperties, CollectionKind, Feature, FeatureCollection, FeatureKind, Geometry, Position,
};
