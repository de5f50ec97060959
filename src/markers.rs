//! Earthquake circle markers: derivation from feed features, spawning into the earthquake
//! layer, rendering and the click popup.

use std::collections::HashMap;

use bevy::{math::DVec2, picking::Pickable, prelude::*};

use crate::{
    KeepDisplaySize, LocalOrigin, LocalOriginConversion, MercatorCoords,
    feed::{QuakeCollection, QuakeFeature},
    local_origin::camera_scale,
    style::{DEPTH_COLORS, DepthColor, color_for_depth, radius_for_magnitude},
};

const MARKER_Z: f64 = 10.0;
const FILL_OPACITY: f32 = 0.75;
/// Outline width in screen pixels.
const STROKE_WIDTH: f32 = 1.5;
/// Extra pixels around a marker that still count as a click on it.
const CLICK_TOLERANCE: f64 = 2.0;

pub(crate) fn markers_plugin(app: &mut App) {
    app.add_systems(Startup, (init_marker_assets, spawn_popup))
        .add_systems(PostUpdate, attach_marker_visuals)
        .add_systems(Startup, observe_map_clicks.after(spawn_popup));
}

/// Visual form of one earthquake.
#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    /// `(longitude, latitude)` in degrees.
    pub position: DVec2,
    pub depth: f64,
    pub fill_color: DepthColor,
    /// Screen pixels; negative for negative magnitudes, 0 when the magnitude is unknown.
    pub radius: f64,
    pub title: String,
}

impl Marker {
    /// `None` when the feature has no usable position.
    pub fn from_feature(feature: &QuakeFeature) -> Option<Self> {
        let (lon, lat, depth) = feature.coordinates?;
        Some(Self {
            position: DVec2::new(lon, lat),
            depth,
            fill_color: color_for_depth(depth),
            radius: feature.magnitude.map_or(0.0, radius_for_magnitude),
            title: feature.title.clone(),
        })
    }

    pub fn popup_html(&self) -> String {
        format!("<h1>{}</h1><hr><h2>Depth: {}m</h2>", self.title, self.depth)
    }

    pub fn popup_text(&self) -> String {
        format!("{}\nDepth: {}m", self.title, self.depth)
    }
}

pub fn markers_from_collection(collection: &QuakeCollection) -> Vec<Marker> {
    collection
        .features
        .iter()
        .filter_map(Marker::from_feature)
        .collect()
}

#[derive(Component, Debug, Clone)]
pub struct EarthquakeMarker(pub Marker);

/// Spawns one marker entity per [`Marker`] as children of `layer`. Returns the number spawned.
pub fn spawn_markers(commands: &mut Commands, layer: Entity, markers: Vec<Marker>) -> usize {
    let count = markers.len();
    for marker in markers {
        let coords = MercatorCoords::from_lonlat(marker.position.x, marker.position.y)
            .with_z(MARKER_Z);
        let size = KeepDisplaySize(marker.radius.abs() as f32);
        commands.spawn((
            Name::new(marker.title.clone()),
            EarthquakeMarker(marker),
            coords,
            size,
            Pickable::IGNORE,
            ChildOf(layer),
        ));
    }
    count
}

#[derive(Resource)]
struct MarkerAssets {
    circle: Handle<Mesh>,
    outline: Handle<ColorMaterial>,
    /// One translucent fill per depth bucket, shared by all markers of that bucket.
    fills: HashMap<DepthColor, Handle<ColorMaterial>>,
}

fn fill_material(color: DepthColor) -> ColorMaterial {
    ColorMaterial::from(Color::from(color).with_alpha(FILL_OPACITY))
}

fn init_marker_assets(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<ColorMaterial>>,
) {
    let fills = DEPTH_COLORS
        .iter()
        .map(|color| (*color, materials.add(fill_material(*color))))
        .collect();
    commands.insert_resource(MarkerAssets {
        circle: meshes.add(Circle::new(1.0)),
        outline: materials.add(ColorMaterial::from(Color::WHITE)),
        fills,
    });
}

fn attach_marker_visuals(
    mut commands: Commands,
    assets: Option<Res<MarkerAssets>>,
    mut materials: ResMut<Assets<ColorMaterial>>,
    added: Query<(Entity, &EarthquakeMarker), Added<EarthquakeMarker>>,
) {
    let Some(assets) = assets else {
        return;
    };
    for (entity, EarthquakeMarker(marker)) in added.iter() {
        let fill = match assets.fills.get(&marker.fill_color) {
            Some(handle) => handle.clone(),
            None => materials.add(fill_material(marker.fill_color)),
        };
        let radius = marker.radius.abs() as f32;
        commands
            .entity(entity)
            .insert((Mesh2d(assets.circle.clone()), MeshMaterial2d(fill)));
        if radius > 0.0 {
            let ring = (radius + STROKE_WIDTH) / radius;
            commands.spawn((
                Mesh2d(assets.circle.clone()),
                MeshMaterial2d(assets.outline.clone()),
                Transform::from_xyz(0.0, 0.0, -0.01).with_scale(Vec3::new(ring, ring, 1.0)),
                Pickable::IGNORE,
                ChildOf(entity),
            ));
        }
    }
}

#[derive(Component, Debug)]
struct PopupPanel;

fn spawn_popup(mut commands: Commands) {
    commands.spawn((
        PopupPanel,
        Text::new(""),
        TextFont {
            font_size: 14.0,
            ..default()
        },
        TextColor(Color::srgb(0.1, 0.1, 0.1)),
        BackgroundColor(Color::WHITE),
        Node {
            position_type: PositionType::Absolute,
            padding: UiRect::all(Val::Px(8.0)),
            max_width: Val::Px(320.0),
            ..default()
        },
        Visibility::Hidden,
    ));
}

fn observe_map_clicks(mut commands: Commands, window: Single<Entity, With<Window>>) {
    commands.entity(*window).observe(show_popup);
}

/// Closest marker whose disc (in screen pixels) contains `cursor`; all positions in mercator meters.
pub fn pick_marker<'a>(
    cursor: DVec2,
    meters_per_pixel: f64,
    markers: impl IntoIterator<Item = (&'a Marker, DVec2)>,
) -> Option<&'a Marker> {
    markers
        .into_iter()
        .filter_map(|(marker, mercator)| {
            let distance = (mercator - cursor).length() / meters_per_pixel;
            (distance <= marker.radius.abs() + CLICK_TOLERANCE).then_some((marker, distance))
        })
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(marker, _)| marker)
}

fn show_popup(
    click: On<Pointer<Click>>,
    camera: Single<(&Camera, &GlobalTransform, &Projection), With<Camera2d>>,
    origin: Res<LocalOrigin>,
    markers: Query<(&EarthquakeMarker, &MercatorCoords, &InheritedVisibility)>,
    popup: Single<(&mut Text, &mut Node, &mut Visibility), With<PopupPanel>>,
) -> Result {
    let (camera, cam_transform, projection) = camera.into_inner();
    let (mut text, mut node, mut visibility) = popup.into_inner();
    let screen = click.pointer_location.position;
    let world = camera.viewport_to_world_2d(cam_transform, screen)?;
    let cursor = world.local_to_mercator(&origin);
    let scale = camera_scale(projection) as f64;

    let hit = pick_marker(
        cursor,
        scale,
        markers
            .iter()
            .filter(|(_, _, visible)| visible.get())
            .map(|(m, coords, _)| (&m.0, coords.xy())),
    );
    match hit {
        Some(marker) => {
            debug!("popup for {}", marker.title);
            text.0 = marker.popup_text();
            node.left = Val::Px(screen.x + 12.0);
            node.top = Val::Px(screen.y + 12.0);
            *visibility = Visibility::Inherited;
        }
        None => *visibility = Visibility::Hidden,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use bevy::ecs::system::RunSystemOnce;

    use super::*;
    use crate::{
        coord_conversions::WebMercatorConversion,
        feed::parse_earthquakes,
        layers::{LayerGroup, Overlay},
    };

    fn feature(coordinates: Option<(f64, f64, f64)>, magnitude: f64) -> QuakeFeature {
        QuakeFeature {
            coordinates,
            magnitude: Some(magnitude),
            title: format!("M {magnitude}"),
        }
    }

    #[test]
    fn marker_style_follows_feature() {
        let marker = Marker::from_feature(&feature(Some((-120.0, 36.0, 95.0)), 2.5)).unwrap();
        assert_eq!(marker.fill_color, DEPTH_COLORS[5]);
        assert_eq!(marker.radius, 10.0);
        assert_eq!(marker.position, DVec2::new(-120.0, 36.0));
        assert_eq!(
            marker.popup_html(),
            "<h1>M 2.5</h1><hr><h2>Depth: 95m</h2>"
        );
    }

    #[test]
    fn only_positioned_features_become_markers() {
        let collection = QuakeCollection {
            features: vec![
                feature(Some((1.0, 2.0, 5.0)), 1.0),
                feature(None, 3.0),
                feature(Some((3.0, 4.0, 40.0)), 0.0),
                feature(None, 0.0),
                feature(Some((5.0, 6.0, -1.0)), 4.2),
            ],
        };
        let markers = markers_from_collection(&collection);
        assert_eq!(markers.len(), 3);
        assert_eq!(markers[1].radius, 1.0);
    }

    #[test]
    fn spawned_markers_belong_to_layer() {
        let mut world = World::new();
        let layer = world.spawn(LayerGroup(Overlay::Earthquakes)).id();
        let markers = markers_from_collection(&QuakeCollection {
            features: vec![feature(Some((10.0, 20.0, 30.0)), 2.0), feature(None, 1.0)],
        });
        let spawned = world
            .run_system_once(move |mut commands: Commands| {
                spawn_markers(&mut commands, layer, markers.clone())
            })
            .unwrap();
        assert_eq!(spawned, 1);

        let mut query = world.query::<(&EarthquakeMarker, &ChildOf, &KeepDisplaySize)>();
        let found: Vec<_> = query.iter(&world).collect();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].1.parent(), layer);
        assert_eq!(found[0].2.0, 8.0);
    }

    #[test]
    fn picks_nearest_marker_under_cursor() {
        let near = Marker::from_feature(&feature(Some((0.0, 0.0, 1.0)), 2.0)).unwrap();
        let far = Marker::from_feature(&feature(Some((1.0, 0.0, 1.0)), 5.0)).unwrap();
        let placed = [
            (&near, near.position.lonlat_to_mercator()),
            (&far, far.position.lonlat_to_mercator()),
        ];
        // 100 m per pixel: `near` has an 8 px radius
        let cursor = DVec2::new(500.0, 0.0);
        assert_eq!(pick_marker(cursor, 100.0, placed), Some(&near));
        let cursor = DVec2::new(5_000.0, 0.0);
        assert_eq!(pick_marker(cursor, 100.0, placed), None);
    }

    #[test]
    fn unknown_magnitude_draws_no_disc() {
        let json = r#"{"type": "FeatureCollection", "features": [
            {"type": "Feature", "properties": {"mag": null, "title": "M ? - unknown"},
             "geometry": {"type": "Point", "coordinates": [10.0, 20.0, 5.0]}},
            {"type": "Feature", "properties": {"mag": 0.0, "title": "M 0.0 - tiny"},
             "geometry": {"type": "Point", "coordinates": [11.0, 21.0, 5.0]}}
        ]}"#;
        let markers = markers_from_collection(&parse_earthquakes(json.as_bytes()).unwrap());
        assert_eq!(markers.len(), 2);
        assert_eq!(markers[0].radius, 0.0);
        assert_eq!(markers[1].radius, 1.0);
    }

    #[test]
    fn markers_share_depth_materials() {
        let mut world = World::new();
        world.init_resource::<Assets<Mesh>>();
        world.init_resource::<Assets<ColorMaterial>>();
        world.run_system_once(init_marker_assets).unwrap();

        let layer = world.spawn(LayerGroup(Overlay::Earthquakes)).id();
        let markers = markers_from_collection(&QuakeCollection {
            features: vec![
                feature(Some((0.0, 0.0, 5.0)), 1.0),
                feature(Some((1.0, 1.0, 8.0)), 2.0),
                feature(Some((2.0, 2.0, 95.0)), 3.0),
            ],
        });
        world
            .run_system_once(move |mut commands: Commands| {
                spawn_markers(&mut commands, layer, markers.clone())
            })
            .unwrap();
        world.run_system_once(attach_marker_visuals).unwrap();

        let mut query =
            world.query::<(&EarthquakeMarker, &MeshMaterial2d<ColorMaterial>)>();
        let fills: Vec<_> = query
            .iter(&world)
            .map(|(marker, material)| (marker.0.depth, material.0.clone()))
            .collect();
        assert_eq!(fills.len(), 3);
        let shallow: Vec<_> = fills.iter().filter(|(depth, _)| *depth < 10.0).collect();
        assert_eq!(shallow[0].1, shallow[1].1);
        assert!(fills.iter().any(|(depth, handle)| *depth > 90.0 && handle != &shallow[0].1));
        // six fills plus the outline
        assert_eq!(world.resource::<Assets<ColorMaterial>>().len(), 7);
    }
}
