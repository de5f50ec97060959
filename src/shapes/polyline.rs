use bevy::{asset::RenderAssetUsages, math::DVec2, mesh::Indices, prelude::*};

use crate::{
    MercatorCoords,
    local_origin::camera_scale,
    pancam::NewScale,
    shapes::utils::{SimpleVertex, WithoutColor, points_to_relative},
};
use lyon::{
    math::point,
    path::{LineCap, LineJoin, Path},
    tessellation::{BuffersBuilder, StrokeOptions, StrokeTessellator, VertexBuffers},
};

pub(crate) fn polyline_plugin(app: &mut App) {
    app.add_systems(PostUpdate, (sync_polyline, sync_polyline_config).chain())
        .add_observer(keep_display_width)
        .add_observer(init_display_width);
}

/// A polyline defined by a list of points in mercator coordinates.
///
/// When adding a GeoPolyline component to an entity, a Mesh2d, MeshMaterial2d and [MercatorCoords] will be automatically created and added to the entity.
/// Set the associated [GeoPolylineConfig] to modify the appearance of the polyline.
#[derive(Component, Debug, Clone, Default)]
#[require(GeoPolylineConfig)]
pub struct GeoPolyline {
    /// The points of the polyline in mercator space.
    pub points: Vec<DVec2>,
    /// Drawing order relative to other map content.
    pub z: f64,
}

/// Configuration for rendering a GeoPolyline.
///
/// `start_cap`, `end_cap`, `line_join`, `miter_limit` and `tolerance` are equivalents to the Lyon [StrokeOptions] settings.
/// `width` and `tolerance` are in mercator meters unless [KeepDisplayWidth] manages them.
#[derive(Component, Debug, Clone)]
pub struct GeoPolylineConfig {
    pub width: f32,
    pub color: Color,
    pub start_cap: LineCap,
    pub end_cap: LineCap,
    pub line_join: LineJoin,
    pub miter_limit: f32,
    pub tolerance: f32,
}

impl GeoPolylineConfig {
    /// Creates a new GeoPolylineConfig with constant line width and color, and round line caps and joins.
    pub fn new(width: f32, color: Color) -> Self {
        Self {
            width,
            color,
            ..Default::default()
        }
    }
}

impl Default for GeoPolylineConfig {
    fn default() -> Self {
        Self {
            width: 1.0,
            color: Color::WHITE,
            start_cap: LineCap::Round,
            end_cap: LineCap::Round,
            line_join: LineJoin::Round,
            miter_limit: 4.0,
            tolerance: 1.0,
        }
    }
}

#[derive(Component, Debug, Clone)]
struct LyonPolyline {
    first_pos: DVec2,
    path: Path,
}

/// Keeps the polyline width at the given number of screen pixels regardless of zoom level.
#[derive(Component, Debug, Clone, Copy)]
pub struct KeepDisplayWidth(pub f32);

fn apply_display_width(config: &mut GeoPolylineConfig, pixels: f32, scale: f32) {
    config.width = pixels * scale;
    // a quarter pixel is plenty for straight segments
    config.tolerance = (scale * 0.25).max(0.0001);
}

fn keep_display_width(
    scale: On<NewScale>,
    mut query: Query<(&mut GeoPolylineConfig, &KeepDisplayWidth)>,
) {
    for (mut config, width) in query.iter_mut() {
        apply_display_width(&mut config, width.0, **scale);
    }
}

fn init_display_width(
    event: On<Add, KeepDisplayWidth>,
    camera: Single<&Projection, With<Camera2d>>,
    mut query: Query<(&mut GeoPolylineConfig, &KeepDisplayWidth)>,
) {
    if let Ok((mut config, width)) = query.get_mut(event.entity) {
        apply_display_width(&mut config, width.0, camera_scale(&camera));
    }
}

fn build_path(points: &[Vec2]) -> Path {
    let mut path_builder = Path::builder();
    if let Some((first, rest)) = points.split_first() {
        path_builder.begin(point(first.x, first.y));
        rest.iter().for_each(|p| {
            path_builder.line_to(point(p.x, p.y));
        });
        path_builder.end(false);
    }
    path_builder.build()
}

fn sync_polyline(
    query: Query<(Entity, &GeoPolyline), Changed<GeoPolyline>>,
    mut commands: Commands,
) {
    for (entity, polyline) in query.iter() {
        let (vertices, first_pos) = points_to_relative(&polyline.points);
        commands.entity(entity).insert((
            LyonPolyline {
                first_pos,
                path: build_path(&vertices),
            },
            MercatorCoords(first_pos.extend(polyline.z)),
        ));
    }
}

fn sync_polyline_config(
    query: Query<
        (Entity, &GeoPolylineConfig, &LyonPolyline),
        Or<(Changed<GeoPolylineConfig>, Changed<LyonPolyline>)>,
    >,
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<ColorMaterial>>,
) {
    for (entity, config, lyon_polyline) in query.iter() {
        let stroke_options = StrokeOptions::default()
            .with_line_width(config.width)
            .with_start_cap(config.start_cap)
            .with_end_cap(config.end_cap)
            .with_line_join(config.line_join)
            .with_miter_limit(config.miter_limit)
            .with_tolerance(config.tolerance);
        let mut tessellator = StrokeTessellator::new();
        let mut buffers: VertexBuffers<SimpleVertex, u32> = VertexBuffers::new();
        if let Err(err) = tessellator.tessellate(
            &lyon_polyline.path,
            &stroke_options,
            &mut BuffersBuilder::new(&mut buffers, WithoutColor),
        ) {
            error!(
                "failed to tessellate polyline starting at {:?}: {:?}",
                lyon_polyline.first_pos, err
            );
            continue;
        }

        let mut mesh = Mesh::new(
            bevy::mesh::PrimitiveTopology::TriangleList,
            RenderAssetUsages::default(),
        );
        let vertices: Vec<[f32; 3]> = buffers.vertices.iter().map(|v| v.position).collect();
        mesh.insert_attribute(Mesh::ATTRIBUTE_POSITION, vertices);
        mesh.insert_indices(Indices::U32(buffers.indices));
        commands.entity(entity).insert((
            Mesh2d(meshes.add(mesh)),
            MeshMaterial2d(materials.add(ColorMaterial::from(config.color))),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_width_follows_scale() {
        let mut config = GeoPolylineConfig::new(1.0, Color::BLACK);
        apply_display_width(&mut config, 2.0, 1_000.0);
        assert_eq!(config.width, 2_000.0);
        assert_eq!(config.tolerance, 250.0);
    }

    #[test]
    fn path_has_one_subpath() {
        let path = build_path(&[Vec2::ZERO, Vec2::new(10.0, 0.0), Vec2::new(10.0, 10.0)]);
        let events: Vec<_> = path.iter().collect();
        // begin, two lines, end
        assert_eq!(events.len(), 4);
        assert!(build_path(&[]).iter().next().is_none());
    }
}
