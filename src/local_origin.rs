use bevy::{
    math::{DVec2, DVec3},
    prelude::*,
    transform::TransformSystems,
};

use crate::{LocalOriginConversion, WebMercatorConversion};

pub(crate) fn local_origin_plugin(app: &mut App) {
    app.add_systems(
        PostUpdate,
        (recenter_origin, sync_mercator_transforms, keep_display_size)
            .chain()
            .before(TransformSystems::Propagate),
    );
}

/// Web mercator coordinates (EPSG:3857) stored in a DVec3 (x, y, z).
///
/// The z coordinate is not used for coordinate conversions but can be used to create layers (i.e. displaying things above other things)
/// Entities with this component automatically get their `Transform` translation set relative to the `LocalOrigin`.
#[derive(Component, Clone, Copy, Debug, PartialEq)]
#[require(Transform)]
pub struct MercatorCoords(pub DVec3);

impl MercatorCoords {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self(DVec3::new(x, y, z))
    }

    /// Creates MercatorCoords from longitude and latitude in degrees (WGS84 / EPSG:4326).
    pub fn from_lonlat(lon: f64, lat: f64) -> Self {
        let mercator = DVec2::new(lon, lat).lonlat_to_mercator();
        Self::new(mercator.x, mercator.y, 0.0)
    }

    /// Sets the vertical component (Bevy `Z`) while keeping the projected X/Y values.
    pub fn with_z(self, z: f64) -> Self {
        Self(DVec3::new(self.0.x, self.0.y, z))
    }

    pub fn xy(self) -> DVec2 {
        self.0.truncate()
    }
}

/// Keeps the entity's scale fixed in screen pixels: the value is the size in pixels of one local unit.
#[derive(Component, Clone, Copy, Debug, PartialEq)]
pub struct KeepDisplaySize(pub f32);

impl Default for KeepDisplaySize {
    fn default() -> Self {
        Self(1.0)
    }
}

/// Local origin in web mercator coordinates and the screen distance at which to recenter.
///
/// Bevy transforms are f32, so everything is positioned relative to this origin and the
/// origin follows the camera once it drifts more than `recenter_distance` pixels away.
#[derive(Resource, Debug, Clone)]
pub struct LocalOrigin {
    mercator_origin: DVec3,
    recenter_distance: f64,
}

impl LocalOrigin {
    pub(crate) const DEFAULT_RECENTER_DISTANCE: f64 = 2_500.0;

    pub fn new(mercator_origin: DVec3) -> Self {
        Self {
            mercator_origin,
            recenter_distance: Self::DEFAULT_RECENTER_DISTANCE,
        }
    }

    pub fn mercator_origin(&self) -> DVec3 {
        self.mercator_origin
    }

    pub(crate) fn recenter_distance(&self) -> f64 {
        self.recenter_distance
    }

    pub(crate) fn shift_mercator_origin(&mut self, delta: DVec3) {
        self.mercator_origin += delta;
    }
}

/// Triggered after the local origin moved; carries the applied shift in meters.
#[derive(Event, Debug, Clone, Copy)]
pub struct LocalOriginUpdated(pub DVec3);

/// Axis-aligned bounding box in web mercator coordinates, uses DVec2 for min and max.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MercatorAabb2d {
    pub min: DVec2,
    pub max: DVec2,
}

impl MercatorAabb2d {
    pub fn new(min: DVec2, max: DVec2) -> Self {
        Self { min, max }
    }

    pub fn center(&self) -> DVec2 {
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> DVec2 {
        self.max - self.min
    }
}

pub(crate) fn camera_scale(projection: &Projection) -> f32 {
    match projection {
        Projection::Orthographic(ortho) => ortho.scale,
        _ => 1.0,
    }
}

fn recenter_origin(
    mut commands: Commands,
    mut origin: ResMut<LocalOrigin>,
    camera: Single<(&mut Transform, &Projection), With<Camera2d>>,
) {
    let (mut cam_transform, projection) = camera.into_inner();
    let offset = cam_transform.translation.truncate().as_dvec2();
    let limit = origin.recenter_distance() * camera_scale(projection) as f64;
    if offset.length() <= limit {
        return;
    }
    let shift = offset.extend(0.0);
    origin.shift_mercator_origin(shift);
    cam_transform.translation.x = 0.0;
    cam_transform.translation.y = 0.0;
    debug!(
        "local origin moved to {:?}",
        origin.mercator_origin().mercator_to_lonlat()
    );
    commands.trigger(LocalOriginUpdated(shift));
}

fn sync_mercator_transforms(
    origin: Res<LocalOrigin>,
    mut query: Query<(Ref<MercatorCoords>, &mut Transform)>,
) {
    let origin_moved = origin.is_changed();
    for (coords, mut transform) in query.iter_mut() {
        if origin_moved || coords.is_changed() {
            transform.translation = coords.0.mercator_to_local(&origin).as_vec3();
        }
    }
}

fn keep_display_size(
    camera: Single<Ref<Projection>, With<Camera2d>>,
    mut query: Query<(Ref<KeepDisplaySize>, &mut Transform)>,
) {
    let zoomed = camera.is_changed();
    let scale = camera_scale(&camera);
    for (size, mut transform) in query.iter_mut() {
        if zoomed || size.is_changed() {
            let s = size.0 * scale;
            transform.scale = Vec3::new(s, s, 1.0);
        }
    }
}
