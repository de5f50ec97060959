//! Live earthquake map for Bevy.
//!
//! [`MapPlugin`] sets up an OpenStreetMap base layer with a pan/zoom camera, downloads the
//! USGS earthquake feed and the PB2002 plate boundaries, and draws them as two togglable
//! overlays together with a depth legend.

use bevy::{
    math::{DVec2, DVec3},
    prelude::*,
};

mod coord_conversions;
pub mod feed;
pub mod layers;
pub mod legend;
mod local_origin;
mod local_origin_conversions;
pub mod markers;
mod pancam;
pub mod pipeline;
pub mod plates;
pub mod shapes;
pub mod style;
pub mod tile_fetcher;
pub mod tiles;

pub use coord_conversions::{LonLatLine, WebMercatorConversion, scale_to_zoom, zoom_to_scale};
pub use feed::FeedConfig;
pub use layers::{LayerGroup, MapState, Overlay};
pub use local_origin::{
    KeepDisplaySize, LocalOrigin, LocalOriginUpdated, MercatorAabb2d, MercatorCoords,
};
pub use local_origin_conversions::LocalOriginConversion;
pub use pancam::NewScale;
pub use pipeline::{FeedPipeline, FeedStageFinished, StageOutcome};
pub use tile_fetcher::{TileFetchConfig, TileSource};

/// Initial viewport of the map.
#[derive(Resource, Debug, Clone, Copy)]
pub struct MapView {
    pub initial_zoom: u8,
    /// `(longitude, latitude)` in degrees.
    pub initial_center: DVec2,
}

pub struct MapPlugin {
    pub initial_zoom: u8,
    /// `(longitude, latitude)` in degrees.
    pub initial_center: DVec2,
    pub tiles: TileFetchConfig,
    pub feeds: FeedConfig,
}

impl Default for MapPlugin {
    fn default() -> Self {
        Self {
            initial_zoom: 3,
            initial_center: DVec2::new(-94.5, 40.7),
            tiles: TileFetchConfig::default(),
            feeds: FeedConfig::default(),
        }
    }
}

impl Plugin for MapPlugin {
    fn build(&self, app: &mut App) {
        let origin = self.initial_center.lonlat_to_mercator();
        app.insert_resource(MapView {
            initial_zoom: self.initial_zoom,
            initial_center: self.initial_center,
        })
        .insert_resource(LocalOrigin::new(DVec3::new(origin.x, origin.y, 0.0)))
        .insert_resource(self.tiles.clone())
        .insert_resource(self.feeds.clone())
        .insert_resource(ClearColor(Color::srgb(0.67, 0.83, 0.87)))
        .add_plugins((
            pancam::pancam_plugin,
            local_origin::local_origin_plugin,
            tiles::tiles_plugin,
            shapes::shapes_plugin,
            layers::layers_plugin,
            markers::markers_plugin,
            pipeline::pipeline_plugin,
            legend::legend_plugin,
        ));
    }
}
