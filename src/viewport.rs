//! Map viewport fitting
//!
//! Derives a center/zoom (and padded bounding region) from the current set
//! of device positions. Pure and idempotent: the view is recomputed from
//! scratch whenever the position set changes, never patched incrementally.
//! The zoom derivation follows Web-Mercator tile math against a fixed
//! logical view size, since actual map rendering lives outside this core.

use serde::Serialize;
use std::f64::consts::PI;

/// Web-Mercator latitude limit
const MAX_MERCATOR_LAT: f64 = 85.05112878;

/// Pixel size of one world tile at zoom zero
const TILE_SIZE: f64 = 256.0;

/// A geographic coordinate pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// Axis-aligned geographic bounding region.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LatLngBounds {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

impl LatLngBounds {
    pub fn contains(&self, lat: f64, lng: f64) -> bool {
        lat >= self.south && lat <= self.north && lng >= self.west && lng <= self.east
    }
}

/// Computed map view handed to the rendering layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MapView {
    pub center: LatLng,
    pub zoom: u8,
    /// Padded region covering all fitted points; absent for the fallback
    /// and single-point cases where a fixed zoom applies
    pub bounds: Option<LatLngBounds>,
}

/// Tunables for the fit computation.
#[derive(Debug, Clone, Copy)]
pub struct FitConfig {
    /// Logical viewport size the zoom is derived against, in pixels
    pub view_width_px: u32,
    pub view_height_px: u32,
    /// Margin kept between the fitted points and the view edge
    pub padding_px: u32,
    /// Center shown when no device has a usable position
    pub fallback_center: LatLng,
    pub fallback_zoom: u8,
    /// Close-up zoom applied when exactly one position exists
    pub single_point_zoom: u8,
    pub max_zoom: u8,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            view_width_px: 640,
            view_height_px: 420,
            padding_px: 40,
            fallback_center: LatLng::new(13.7563, 100.5018),
            fallback_zoom: 8,
            single_point_zoom: 12,
            max_zoom: 18,
        }
    }
}

/// Fit a view to the given `(lat, lng)` positions.
///
/// Zero points yields the configured fallback; one point centers there at
/// the close-up zoom; two or more produce the minimal padded region
/// covering every point, with zoom derived so that region fits the view.
pub fn fit(positions: &[(f64, f64)], config: &FitConfig) -> MapView {
    match positions {
        [] => MapView {
            center: config.fallback_center,
            zoom: config.fallback_zoom,
            bounds: None,
        },
        [(lat, lng)] => MapView {
            center: LatLng::new(*lat, *lng),
            zoom: config.single_point_zoom,
            bounds: None,
        },
        _ => fit_bounds(positions, config),
    }
}

fn fit_bounds(positions: &[(f64, f64)], config: &FitConfig) -> MapView {
    let mut min_x = f64::MAX;
    let mut min_y = f64::MAX;
    let mut max_x = f64::MIN;
    let mut max_y = f64::MIN;

    for &(lat, lng) in positions {
        let (x, y) = project(lat, lng);
        min_x = min_x.min(x);
        min_y = min_y.min(y);
        max_x = max_x.max(x);
        max_y = max_y.max(y);
    }

    let avail_w = f64::from(config.view_width_px.saturating_sub(2 * config.padding_px).max(1));
    let avail_h = f64::from(config.view_height_px.saturating_sub(2 * config.padding_px).max(1));

    let zoom_for = |span: f64, avail: f64| {
        if span > 0.0 {
            (avail / (span * TILE_SIZE)).log2()
        } else {
            f64::INFINITY
        }
    };

    let zoom = zoom_for(max_x - min_x, avail_w)
        .min(zoom_for(max_y - min_y, avail_h))
        .floor()
        .clamp(0.0, f64::from(config.max_zoom)) as u8;

    let (center_lat, center_lng) = unproject((min_x + max_x) / 2.0, (min_y + max_y) / 2.0);

    // Grow the region by the pixel padding at the chosen zoom so the
    // reported bounds carry the same margin the view shows.
    let world_px = TILE_SIZE * f64::powi(2.0, i32::from(zoom));
    let pad = f64::from(config.padding_px) / world_px;
    let (south, west) = unproject(min_x - pad, (max_y + pad).min(1.0));
    let (north, east) = unproject(max_x + pad, (min_y - pad).max(0.0));

    MapView {
        center: LatLng::new(center_lat, center_lng),
        zoom,
        bounds: Some(LatLngBounds {
            south,
            west,
            north,
            east,
        }),
    }
}

/// Project to normalized Web-Mercator coordinates in [0, 1].
fn project(lat: f64, lng: f64) -> (f64, f64) {
    let lat = lat.clamp(-MAX_MERCATOR_LAT, MAX_MERCATOR_LAT);
    let x = lng / 360.0 + 0.5;
    let y = 0.5 - (PI / 4.0 + lat.to_radians() / 2.0).tan().ln() / (2.0 * PI);
    (x, y)
}

/// Inverse of [`project`].
fn unproject(x: f64, y: f64) -> (f64, f64) {
    let lng = (x - 0.5) * 360.0;
    let lat = (2.0 * ((0.5 - y) * 2.0 * PI).exp().atan() - PI / 2.0).to_degrees();
    (lat, lng)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_positions_falls_back() {
        let config = FitConfig::default();
        let view = fit(&[], &config);

        assert_eq!(view.center, config.fallback_center);
        assert_eq!(view.zoom, config.fallback_zoom);
        assert!(view.bounds.is_none());
    }

    #[test]
    fn test_single_position_centers_close_up() {
        let config = FitConfig::default();
        let view = fit(&[(13.75, 100.50)], &config);

        assert_eq!(view.center, LatLng::new(13.75, 100.50));
        assert_eq!(view.zoom, config.single_point_zoom);
        assert!(view.bounds.is_none());
    }

    #[test]
    fn test_two_positions_bounds_contain_both_with_margin() {
        let config = FitConfig::default();
        let points = [(13.0, 100.0), (14.0, 101.0)];
        let view = fit(&points, &config);

        let bounds = view.bounds.expect("multi-point fit produces bounds");
        for (lat, lng) in points {
            assert!(bounds.contains(lat, lng));
        }
        // The padding margin pushes the region strictly past the points.
        assert!(bounds.south < 13.0);
        assert!(bounds.west < 100.0);
        assert!(bounds.north > 14.0);
        assert!(bounds.east > 101.0);

        // Center sits between the two points.
        assert!(view.center.lat > 13.0 && view.center.lat < 14.0);
        assert!(view.center.lng > 100.0 && view.center.lng < 101.0);
    }

    #[test]
    fn test_zoom_contains_all_points_not_fixed() {
        let config = FitConfig::default();
        let near = fit(&[(13.0, 100.0), (13.1, 100.1)], &config);
        let far = fit(&[(5.0, 95.0), (20.0, 105.0)], &config);

        assert!(near.zoom > far.zoom);
        assert!(far.zoom >= 1);
    }

    #[test]
    fn test_coincident_points_clamp_to_max_zoom() {
        let config = FitConfig::default();
        let view = fit(&[(13.5, 100.5), (13.5, 100.5)], &config);

        assert_eq!(view.zoom, config.max_zoom);
        let bounds = view.bounds.unwrap();
        assert!(bounds.contains(13.5, 100.5));
    }

    #[test]
    fn test_fit_is_idempotent() {
        let config = FitConfig::default();
        let points = [(13.0, 100.0), (14.0, 101.0), (13.4, 100.7)];

        assert_eq!(fit(&points, &config), fit(&points, &config));
    }

    #[test]
    fn test_projection_roundtrip() {
        let (x, y) = project(13.7563, 100.5018);
        let (lat, lng) = unproject(x, y);

        assert!((lat - 13.7563).abs() < 1e-9);
        assert!((lng - 100.5018).abs() < 1e-9);
    }
}
