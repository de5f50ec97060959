//! Raster base layer: keeps the tiles covering the viewport spawned for the active source.

use std::collections::{HashMap, HashSet};

use bevy::{picking::Pickable, prelude::*};
use tilemath::Tile as TileMathTile;

use crate::{
    LocalOrigin, LocalOriginConversion, MercatorCoords,
    coord_conversions::{covered_tiles, scale_to_zoom, tile_to_aabb},
    local_origin::{MercatorAabb2d, camera_scale},
    tile_fetcher::{
        TileFetchConfig, TileFetcher, TileTextureError, apply_tile_fetch_results,
        queue_tile_downloads,
    },
};

const TILE_Z: f64 = 0.0;
const STALE_TILE_Z: f64 = -1.0;

pub(crate) fn tiles_plugin(app: &mut App) {
    app.init_resource::<ActiveBaseLayer>()
        .init_resource::<VisibleTiles>()
        .add_systems(Startup, init_tile_fetcher)
        .add_systems(
            Update,
            (
                switch_base_layer,
                update_visible_tiles,
                queue_tile_downloads,
                apply_tile_fetch_results,
            )
                .chain(),
        );
}

/// Index into [`TileFetchConfig::sources`] of the base layer currently shown.
#[derive(Resource, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ActiveBaseLayer(pub usize);

/// A raster tile entity; `coords` uses bottom-origin y like the mercator axes.
#[derive(Component, Debug, Clone, Copy)]
pub struct Tile {
    pub source: usize,
    pub coords: TileMathTile,
}

#[derive(Resource, Debug, Default)]
struct VisibleTiles {
    tiles: HashMap<TileMathTile, Entity>,
    /// Tiles of a previous zoom level, kept until their replacements are loaded.
    stale: Vec<Entity>,
}

fn init_tile_fetcher(mut commands: Commands, config: Res<TileFetchConfig>) {
    match TileFetcher::new(&config) {
        Ok(fetcher) => commands.insert_resource(fetcher),
        Err(err) => error!("tile fetcher unavailable, base layer disabled: {err}"),
    }
}

fn switch_base_layer(
    mut commands: Commands,
    active: Res<ActiveBaseLayer>,
    config: Res<TileFetchConfig>,
    mut visible: ResMut<VisibleTiles>,
    fetcher: Option<ResMut<TileFetcher>>,
) {
    if !active.is_changed() || active.is_added() {
        return;
    }
    if let Some(source) = config.sources.get(active.0) {
        info!("switching base layer to {}", source.name);
    }
    for (_, entity) in visible.tiles.drain() {
        commands.entity(entity).despawn();
    }
    for entity in visible.stale.drain(..) {
        commands.entity(entity).despawn();
    }
    if let Some(mut fetcher) = fetcher {
        fetcher.cancel_all();
    }
}

fn update_visible_tiles(
    mut commands: Commands,
    mut visible: ResMut<VisibleTiles>,
    active: Res<ActiveBaseLayer>,
    config: Res<TileFetchConfig>,
    origin: Res<LocalOrigin>,
    camera: Single<(&Camera, &Transform, &Projection), With<Camera2d>>,
    finished: Query<(), Or<(With<Sprite>, With<TileTextureError>)>>,
    mut coords: Query<&mut MercatorCoords, With<Tile>>,
) {
    let (camera, transform, projection) = camera.into_inner();
    let Some(viewport) = camera.logical_viewport_size() else {
        return;
    };
    let scale = camera_scale(projection) as f64;
    let zoom = scale_to_zoom(scale, config.max_zoom);
    let center = transform.translation.truncate().local_to_mercator(&origin);
    let half = viewport.as_dvec2() * 0.5 * scale;
    let bounds = MercatorAabb2d::new(center - half, center + half);
    let wanted: HashSet<TileMathTile> = covered_tiles(&bounds, zoom).collect();

    reconcile_tiles(
        &mut commands,
        &mut visible,
        active.0,
        zoom,
        wanted,
        &finished,
        &mut coords,
    );
}

/// Spawns the `wanted` tiles of `source` that are missing. Unwanted tiles of the current
/// `zoom` are despawned; those of other zoom levels stay underneath until every current tile
/// has either a sprite or an error.
fn reconcile_tiles(
    commands: &mut Commands,
    visible: &mut VisibleTiles,
    source: usize,
    zoom: u8,
    wanted: HashSet<TileMathTile>,
    finished: &Query<(), Or<(With<Sprite>, With<TileTextureError>)>>,
    coords: &mut Query<&mut MercatorCoords, With<Tile>>,
) {
    let VisibleTiles { tiles, stale } = visible;
    tiles.retain(|tile, entity| {
        if wanted.contains(tile) {
            return true;
        }
        if tile.zoom == zoom {
            commands.entity(*entity).despawn();
        } else {
            if let Ok(mut c) = coords.get_mut(*entity) {
                c.0.z = STALE_TILE_Z;
            }
            stale.push(*entity);
        }
        false
    });

    for tile in wanted {
        if tiles.contains_key(&tile) {
            continue;
        }
        let bounds = tile_to_aabb(tile);
        let center = bounds.center();
        let size = bounds.size();
        let entity = commands
            .spawn((
                Tile {
                    source,
                    coords: tile,
                },
                MercatorCoords::new(center.x, center.y, TILE_Z),
                Transform::from_scale(Vec3::new(size.x as f32, size.y as f32, 1.0)),
                Visibility::default(),
                Pickable::IGNORE,
            ))
            .id();
        tiles.insert(tile, entity);
    }

    if !stale.is_empty() && tiles.values().all(|entity| finished.contains(*entity)) {
        trace!("dropping {} stale tiles", stale.len());
        for entity in stale.drain(..) {
            commands.entity(entity).despawn();
        }
    }
}
