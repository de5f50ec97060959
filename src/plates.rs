use bevy::{picking::Pickable, prelude::*};

use crate::{
    coord_conversions::LonLatLine,
    feed::PlateCollection,
    shapes::polyline::{GeoPolyline, GeoPolylineConfig, KeepDisplayWidth},
};

/// Drawn below the earthquake markers, above the tiles.
const PLATE_Z: f64 = 5.0;
/// Boundary width in screen pixels.
const PLATE_WIDTH: f32 = 2.0;
const PLATE_COLOR: Color = Color::srgb(0.0, 128.0 / 255.0, 0.0);

/// Spawns every boundary line as a green polyline under `layer`. Returns the number of lines.
pub fn spawn_plate_boundaries(
    commands: &mut Commands,
    layer: Entity,
    plates: &PlateCollection,
) -> usize {
    for boundary in &plates.boundaries {
        let mut entity = commands.spawn((
            GeoPolyline {
                points: boundary.points.lonlat_to_mercator(),
                z: PLATE_Z,
            },
            GeoPolylineConfig::new(PLATE_WIDTH, PLATE_COLOR),
            KeepDisplayWidth(PLATE_WIDTH),
            Pickable::IGNORE,
            ChildOf(layer),
        ));
        if let Some(name) = &boundary.name {
            entity.insert(Name::new(name.clone()));
        }
    }
    plates.boundaries.len()
}
