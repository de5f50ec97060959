use bevy::{input::gestures::PinchGesture, prelude::*};

use crate::{MapView, coord_conversions::zoom_to_scale};

pub(crate) fn pancam_plugin(app: &mut App) {
    app.add_systems(Startup, setup)
        .add_systems(Update, (pinch_zoom, zoom_smooth).chain());
}

fn setup(mut commands: Commands, view: Res<MapView>, window: Single<Entity, With<Window>>) {
    let scale = zoom_to_scale(view.initial_zoom as f64) as f32;
    commands.spawn((
        Camera2d,
        Projection::Orthographic(OrthographicProjection {
            scale,
            ..OrthographicProjection::default_2d()
        }),
        SmoothZoom {
            target_zoom: scale,
            ..default()
        },
    ));
    commands.entity(*window).observe(camera_drag).observe(zoom);
}

fn camera_drag(
    drag: On<Pointer<Drag>>,
    mut cam: Single<(&Camera, &GlobalTransform, &mut Transform)>,
) -> Result {
    let mut cam_viewport = cam.0.world_to_viewport(cam.1, cam.2.translation)?;
    cam_viewport += drag.delta * -1.; // inverted feels more natural
    cam.2.translation = cam.0.viewport_to_world_2d(cam.1, cam_viewport)?.extend(0.0);
    Ok(())
}

/// Orthographic scale (meters per pixel) the camera eases towards, bounded by the zoom range.
#[derive(Component, Debug)]
pub(crate) struct SmoothZoom {
    pub(crate) target_zoom: f32,
    pub(crate) min_scale: f32,
    pub(crate) max_scale: f32,
}

impl Default for SmoothZoom {
    fn default() -> Self {
        Self {
            target_zoom: 1.0,
            min_scale: zoom_to_scale(19.0) as f32,
            max_scale: zoom_to_scale(0.0) as f32,
        }
    }
}

impl SmoothZoom {
    fn scale_by(&mut self, factor: f32) {
        self.target_zoom = (self.target_zoom * factor).clamp(self.min_scale, self.max_scale);
    }
}

fn zoom(scroll: On<Pointer<Scroll>>, mut zoom: Single<&mut SmoothZoom, With<Camera>>) {
    zoom.scale_by(1.0 - (scroll.y / 50.));
}

fn pinch_zoom(
    mut pinch: MessageReader<PinchGesture>,
    mut zoom: Single<&mut SmoothZoom, With<Camera>>,
) {
    for p in pinch.read() {
        zoom.scale_by(1.0 - p.0)
    }
}

/// Triggered whenever the camera scale changes.
#[derive(Event, Debug, Deref)]
pub struct NewScale(pub f32);

fn zoom_smooth(
    mut commands: Commands,
    cam: Single<(&mut Projection, &SmoothZoom), With<Camera>>,
    time: Res<Time>,
) {
    let (mut proj, zoom) = cam.into_inner();
    let Projection::Orthographic(ref ortho) = *proj else {
        return;
    };
    if ortho.scale == zoom.target_zoom {
        return;
    }
    if let Projection::Orthographic(ref mut ortho) = *proj {
        let mut scale_vec = Vec2::new(ortho.scale, 0.0);
        scale_vec.smooth_nudge(&Vec2::new(zoom.target_zoom, 0.0), 30., time.delta_secs());
        // snap once close enough, smooth_nudge only approaches the target
        ortho.scale = if (scale_vec.x - zoom.target_zoom).abs() <= zoom.target_zoom * 1e-4 {
            zoom.target_zoom
        } else {
            scale_vec.x
        };
        commands.trigger(NewScale(ortho.scale));
    }
}
