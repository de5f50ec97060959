pub mod polyline;
use bevy::prelude::*;
mod utils;

use crate::shapes::polyline::polyline_plugin;

pub(crate) fn shapes_plugin(app: &mut App) {
    app.add_plugins(polyline_plugin);
}
