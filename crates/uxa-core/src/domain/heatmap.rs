//! Heatmap points: page-absolute rectangles derived from violation nodes.

use serde::{Deserialize, Serialize};

use super::audit::Impact;

/// A violation node's resolved geometry plus its severity.
///
/// `index` is the node's position in the flat `violations[].nodes[]`
/// traversal, counted whether or not the node resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatmapPoint {
    pub index: usize,
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
    pub impact: Impact,
    pub description: String,
}
