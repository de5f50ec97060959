use bevy::math::{DVec2, DVec3};
use miniproj::Projection;
use miniproj_ops::popvis_pseudo_mercator::PopVisPseudoMercatorProjection;
use tilemath::Tile as TileMathTile;

use crate::local_origin::MercatorAabb2d;

pub const WEB_MERCATOR_EXTENT: f64 = 20037508.342789244;

/// Latitude at which the square Web Mercator world ends.
pub const MAX_LATITUDE: f64 = 85.051_128_779_806_59;

/// Edge length of a raster tile in screen pixels.
pub const TILE_PIXELS: f64 = 256.0;

// Inlined miniproj::get_projection(3857).unwrap()
const WEB_MERCATOR: PopVisPseudoMercatorProjection = PopVisPseudoMercatorProjection {
    ellipsoid_a: 6378137f64,
    lon_orig: 0f64,
    false_e: 0f64,
    false_n: 0f64,
};

/// Conversion between WGS84 lon/lat degrees and Web Mercator (EPSG:3857) meters.
pub trait WebMercatorConversion {
    fn mercator_to_lonlat(&self) -> Self;

    fn lonlat_to_mercator(&self) -> Self;
}

impl WebMercatorConversion for DVec2 {
    fn mercator_to_lonlat(&self) -> Self {
        DVec2::from(WEB_MERCATOR.projected_to_deg(self.x, self.y))
    }

    /// Latitudes beyond [`MAX_LATITUDE`] are clamped onto the edge of the map.
    fn lonlat_to_mercator(&self) -> Self {
        let lat = self.y.clamp(-MAX_LATITUDE, MAX_LATITUDE);
        DVec2::from(WEB_MERCATOR.deg_to_projected(self.x, lat))
    }
}

impl WebMercatorConversion for DVec3 {
    fn mercator_to_lonlat(&self) -> Self {
        self.truncate().mercator_to_lonlat().extend(self.z)
    }

    fn lonlat_to_mercator(&self) -> Self {
        self.truncate().lonlat_to_mercator().extend(self.z)
    }
}

/// Projects a lon/lat line in one go.
pub trait LonLatLine {
    fn lonlat_to_mercator(&self) -> Vec<DVec2>;
}

impl LonLatLine for [(f64, f64)] {
    fn lonlat_to_mercator(&self) -> Vec<DVec2> {
        self.iter()
            .map(|(lon, lat)| DVec2::new(*lon, *lat).lonlat_to_mercator())
            .collect()
    }
}

/// Meters per screen pixel when the map is shown at `zoom`.
pub fn zoom_to_scale(zoom: f64) -> f64 {
    2.0 * WEB_MERCATOR_EXTENT / (TILE_PIXELS * 2f64.powf(zoom))
}

/// Tile zoom level closest to a camera scale (meters per pixel), clamped to `max_zoom`.
pub fn scale_to_zoom(scale: f64, max_zoom: u8) -> u8 {
    if !scale.is_finite() || scale <= 0.0 {
        return max_zoom;
    }
    let zoom = (2.0 * WEB_MERCATOR_EXTENT / (TILE_PIXELS * scale)).log2();
    zoom.round().clamp(0.0, max_zoom as f64) as u8
}

/// Tiles covering a mercator box at `zoom`, with y counted from the bottom (TMS order).
pub fn covered_tiles(bounds: &MercatorAabb2d, zoom: u8) -> impl Iterator<Item = TileMathTile> {
    let count = 1u32 << zoom;
    let tile_size = 2.0 * WEB_MERCATOR_EXTENT / count as f64;
    let index = |v: f64| {
        ((v + WEB_MERCATOR_EXTENT) / tile_size)
            .floor()
            .clamp(0.0, (count - 1) as f64) as u32
    };
    let (min_x, max_x) = (index(bounds.min.x), index(bounds.max.x));
    let (min_y, max_y) = (index(bounds.min.y), index(bounds.max.y));
    (min_x..=max_x).flat_map(move |x| (min_y..=max_y).map(move |y| TileMathTile { zoom, x, y }))
}

/// Mercator extent of a tile with bottom-origin y.
pub fn tile_to_aabb(tile: TileMathTile) -> MercatorAabb2d {
    let tile_size = (2.0 * WEB_MERCATOR_EXTENT) / (1u32 << tile.zoom) as f64;

    MercatorAabb2d {
        min: DVec2::new(
            tile.x as f64 * tile_size - WEB_MERCATOR_EXTENT,
            -WEB_MERCATOR_EXTENT + tile.y as f64 * tile_size,
        ),
        max: DVec2::new(
            (tile.x + 1) as f64 * tile_size - WEB_MERCATOR_EXTENT,
            -WEB_MERCATOR_EXTENT + (tile.y as f64 + 1.) * tile_size,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lonlat_round_trip() {
        let lonlat = DVec2::new(-94.5, 40.7);
        let back = lonlat.lonlat_to_mercator().mercator_to_lonlat();
        assert!((back - lonlat).length() < 1e-9);
        assert!(DVec2::ZERO.lonlat_to_mercator().length() < 1e-6);
    }

    #[test]
    fn polar_latitudes_stay_on_the_map() {
        for lat in [86.9, 90.0, -90.0] {
            let mercator = DVec2::new(-30.0, lat).lonlat_to_mercator();
            assert!(mercator.y.is_finite());
            assert!((mercator.y.abs() - WEB_MERCATOR_EXTENT).abs() < 1.0);
        }
        let edge = DVec2::new(0.0, MAX_LATITUDE).lonlat_to_mercator();
        assert!((edge.y - WEB_MERCATOR_EXTENT).abs() < 1.0);
    }

    #[test]
    fn zoom_scale_inverse() {
        for zoom in 0..=19u8 {
            assert_eq!(scale_to_zoom(zoom_to_scale(zoom as f64), 19), zoom);
        }
        assert_eq!(scale_to_zoom(zoom_to_scale(25.0), 19), 19);
        assert_eq!(scale_to_zoom(0.0, 19), 19);
    }

    #[test]
    fn whole_world_at_zoom_one() {
        let world = MercatorAabb2d::new(
            DVec2::splat(-WEB_MERCATOR_EXTENT * 2.0),
            DVec2::splat(WEB_MERCATOR_EXTENT * 2.0),
        );
        assert_eq!(covered_tiles(&world, 1).count(), 4);
        let tiles: Vec<_> = covered_tiles(&world, 0).collect();
        assert_eq!(tiles, vec![TileMathTile { zoom: 0, x: 0, y: 0 }]);
    }

    #[test]
    fn tile_bounds_contain_center() {
        let tile = TileMathTile { zoom: 3, x: 2, y: 5 };
        let bounds = tile_to_aabb(tile);
        let center = MercatorAabb2d::new(bounds.center(), bounds.center());
        let tiles: Vec<_> = covered_tiles(&center, 3).collect();
        assert_eq!(tiles, vec![tile]);
    }
}
