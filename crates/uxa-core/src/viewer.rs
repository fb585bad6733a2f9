//! Client-side helpers for drawing heatmap points over a displayed screenshot.
//!
//! Stored [`HeatmapPoint`]s are page-absolute and never modified; every
//! display rectangle is derived from the current geometry and zoom.

use serde::{Deserialize, Serialize};

use crate::domain::HeatmapPoint;

/// Preview zoom multiplier in steps of 0.1 between 0.5 and 2.0.
///
/// Serialized as the number of tenths; out-of-range values are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct ZoomLevel {
    tenths: u8,
}

impl ZoomLevel {
    const MIN_TENTHS: u8 = 5;
    const MAX_TENTHS: u8 = 20;
    const DEFAULT_TENTHS: u8 = 10;

    pub fn factor(&self) -> f64 {
        f64::from(self.tenths) / 10.0
    }

    pub fn zoom_in(self) -> Self {
        Self {
            tenths: self.tenths.saturating_add(1).min(Self::MAX_TENTHS),
        }
    }

    pub fn zoom_out(self) -> Self {
        Self {
            tenths: self.tenths.saturating_sub(1).max(Self::MIN_TENTHS),
        }
    }

    pub fn reset(self) -> Self {
        Self::default()
    }
}

impl TryFrom<u8> for ZoomLevel {
    type Error = String;

    fn try_from(tenths: u8) -> Result<Self, Self::Error> {
        if (Self::MIN_TENTHS..=Self::MAX_TENTHS).contains(&tenths) {
            Ok(Self { tenths })
        } else {
            Err(format!(
                "zoom must be between {} and {} tenths, got {tenths}",
                Self::MIN_TENTHS,
                Self::MAX_TENTHS
            ))
        }
    }
}

impl From<ZoomLevel> for u8 {
    fn from(zoom: ZoomLevel) -> Self {
        zoom.tenths
    }
}

impl Default for ZoomLevel {
    fn default() -> Self {
        Self {
            tenths: Self::DEFAULT_TENTHS,
        }
    }
}

/// Rectangle in rendered pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayRect {
    pub left: i64,
    pub top: i64,
    pub width: i64,
    pub height: i64,
    /// Overlapping rectangles: higher draws on top.
    pub z_index: i64,
}

/// Natural vs. rendered size of the screenshot element plus the zoom.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayGeometry {
    pub natural_width: f64,
    pub natural_height: f64,
    pub rendered_width: f64,
    pub rendered_height: f64,
    pub zoom: ZoomLevel,
}

impl DisplayGeometry {
    pub fn new(natural: (f64, f64), rendered: (f64, f64), zoom: ZoomLevel) -> Self {
        Self {
            natural_width: natural.0,
            natural_height: natural.1,
            rendered_width: rendered.0,
            rendered_height: rendered.1,
            zoom,
        }
    }

    fn ratio(rendered: f64, natural: f64, zoom: f64) -> f64 {
        if natural <= 0.0 || rendered <= 0.0 {
            0.0
        } else {
            rendered * zoom / natural
        }
    }

    pub fn scale_x(&self) -> f64 {
        Self::ratio(self.rendered_width, self.natural_width, self.zoom.factor())
    }

    pub fn scale_y(&self) -> f64 {
        Self::ratio(self.rendered_height, self.natural_height, self.zoom.factor())
    }

    /// Not yet measurable (image not loaded or hidden).
    pub fn is_degenerate(&self) -> bool {
        self.scale_x() == 0.0 || self.scale_y() == 0.0
    }

    /// Map one point; width and height never drop below one pixel.
    pub fn rescale(&self, point: &HeatmapPoint) -> DisplayRect {
        let (sx, sy) = (self.scale_x(), self.scale_y());
        DisplayRect {
            left: (point.left * sx).round() as i64,
            top: (point.top * sy).round() as i64,
            width: ((point.width * sx).round() as i64).max(1),
            height: ((point.height * sy).round() as i64).max(1),
            z_index: stacking_order(point),
        }
    }

    pub fn rescale_all(&self, points: &[HeatmapPoint]) -> Vec<DisplayRect> {
        points.iter().map(|p| self.rescale(p)).collect()
    }
}

/// Smaller page areas stack above larger ones so nested elements stay clickable.
fn stacking_order(point: &HeatmapPoint) -> i64 {
    let area = (point.width * point.height).max(0.0);
    (1000 - (area / 100.0).floor() as i64).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Impact;
    use proptest::prelude::*;

    fn point(left: f64, top: f64, width: f64, height: f64) -> HeatmapPoint {
        HeatmapPoint {
            index: 0,
            left,
            top,
            width,
            height,
            impact: Impact::Serious,
            description: String::new(),
        }
    }

    #[test]
    fn test_zoom_steps_and_clamps() {
        let mut z = ZoomLevel::default();
        for _ in 0..20 {
            z = z.zoom_in();
        }
        assert_eq!(z.factor(), 2.0);
        for _ in 0..30 {
            z = z.zoom_out();
        }
        assert_eq!(z.factor(), 0.5);
        assert_eq!(z.reset().factor(), 1.0);
        assert_eq!(ZoomLevel::default().zoom_in().zoom_in().factor(), 1.2);
    }

    #[test]
    fn test_out_of_range_zoom_is_rejected() {
        assert!(serde_json::from_str::<ZoomLevel>("0").is_err());
        assert!(serde_json::from_str::<ZoomLevel>("255").is_err());
        assert!(ZoomLevel::try_from(21).is_err());

        let z: ZoomLevel = serde_json::from_str("20").unwrap();
        assert_eq!(z.zoom_in().factor(), 2.0);
        assert_eq!(serde_json::to_string(&z.zoom_out()).unwrap(), "19");
    }

    #[test]
    fn test_half_size_render() {
        let g = DisplayGeometry::new((1920.0, 6000.0), (960.0, 3000.0), ZoomLevel::default());
        let r = g.rescale(&point(100.0, 2001.0, 300.0, 1.0));
        assert_eq!(r, DisplayRect { left: 50, top: 1001, width: 150, height: 1, z_index: 997 });
    }

    #[test]
    fn test_independent_axes_and_zoom() {
        let zoom = ZoomLevel::default().zoom_in().zoom_in(); // 1.2
        let g = DisplayGeometry::new((1000.0, 2000.0), (500.0, 2000.0), zoom);
        let r = g.rescale(&point(100.0, 100.0, 10.0, 10.0));
        assert_eq!(r, DisplayRect { left: 60, top: 120, width: 6, height: 12, z_index: 999 });
    }

    #[test]
    fn test_zero_natural_size_maps_to_origin() {
        let g = DisplayGeometry::new((0.0, 0.0), (800.0, 600.0), ZoomLevel::default());
        assert!(g.is_degenerate());
        let r = g.rescale(&point(100.0, 100.0, 50.0, 50.0));
        assert_eq!(r, DisplayRect { left: 0, top: 0, width: 1, height: 1, z_index: 975 });
    }

    #[test]
    fn test_rescale_does_not_touch_points() {
        let points = vec![point(10.0, 20.0, 30.0, 40.0)];
        let before = points.clone();
        let g = DisplayGeometry::new((100.0, 100.0), (50.0, 50.0), ZoomLevel::default().zoom_out());
        let _ = g.rescale_all(&points);
        assert_eq!(points, before);
    }

    #[test]
    fn test_stacking_prefers_small() {
        let small = point(0.0, 0.0, 10.0, 10.0);
        let large = point(0.0, 0.0, 1000.0, 500.0);
        assert!(stacking_order(&small) > stacking_order(&large));
        assert_eq!(stacking_order(&large), 1);

        let g = DisplayGeometry::new((100.0, 100.0), (100.0, 100.0), ZoomLevel::default());
        let rects = g.rescale_all(&[large, small]);
        assert!(rects[1].z_index > rects[0].z_index);
    }

    proptest! {
        #[test]
        fn prop_identity_at_natural_size(
            left in 0.0f64..10_000.0,
            top in 0.0f64..50_000.0,
            width in 1.0f64..2_000.0,
            height in 1.0f64..2_000.0,
            w in 1.0f64..4_000.0,
            h in 1.0f64..60_000.0,
        ) {
            let g = DisplayGeometry::new((w, h), (w, h), ZoomLevel::default());
            let p = point(left, top, width, height);
            let r = g.rescale(&p);
            prop_assert!((r.left as f64 - left).abs() <= 0.5 + 1e-6);
            prop_assert!((r.top as f64 - top).abs() <= 0.5 + 1e-6);
            prop_assert!((r.width as f64 - width).abs() <= 0.5 + 1e-6);
            prop_assert!((r.height as f64 - height).abs() <= 0.5 + 1e-6);
        }

        #[test]
        fn prop_dimensions_never_below_one(
            width in 0.0f64..5.0,
            height in 0.0f64..5.0,
            rendered in 1.0f64..300.0,
        ) {
            let g = DisplayGeometry::new((4000.0, 4000.0), (rendered, rendered), ZoomLevel::default().zoom_out());
            let r = g.rescale(&point(0.0, 0.0, width, height));
            prop_assert!(r.width >= 1 && r.height >= 1);
        }
    }
}
