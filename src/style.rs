use bevy::prelude::*;

/// Lower bounds of the depth buckets (km), shallowest first.
pub const DEPTH_THRESHOLDS: [f64; 6] = [0.0, 10.0, 30.0, 50.0, 70.0, 90.0];

/// Fill colors matching [`DEPTH_THRESHOLDS`], least intense first.
pub const DEPTH_COLORS: [DepthColor; 6] = [
    DepthColor::rgb(0x98, 0xee, 0x00),
    DepthColor::rgb(0xd4, 0xee, 0x00),
    DepthColor::rgb(0xee, 0xcc, 0x00),
    DepthColor::rgb(0xee, 0x9c, 0x00),
    DepthColor::rgb(0xea, 0x82, 0x2c),
    DepthColor::rgb(0xea, 0x2c, 0x2c),
];

/// Radius used for earthquakes reported with a magnitude of exactly zero.
pub const MIN_RADIUS: f64 = 1.0;

/// Screen pixels of radius per unit of magnitude.
pub const RADIUS_PER_MAGNITUDE: f64 = 4.0;

/// An sRGB marker color, kept as bytes so it can be compared exactly and printed as hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthColor {
    r: u8,
    g: u8,
    b: u8,
}

impl DepthColor {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// `#rrggbb`, lower case.
    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    /// Index into [`DEPTH_COLORS`], 0 being the least intense.
    pub fn intensity(&self) -> Option<usize> {
        DEPTH_COLORS.iter().position(|c| c == self)
    }
}

impl From<DepthColor> for Color {
    fn from(value: DepthColor) -> Self {
        Color::srgb_u8(value.r, value.g, value.b)
    }
}

/// Step function over the depth buckets. A depth equal to a threshold stays in the
/// lower bucket; NaN and anything at or below 10 km get the least intense color.
pub fn color_for_depth(depth: f64) -> DepthColor {
    DEPTH_THRESHOLDS
        .iter()
        .enumerate()
        .skip(1)
        .rev()
        .find(|(_, threshold)| depth > **threshold)
        .map(|(bucket, _)| DEPTH_COLORS[bucket])
        .unwrap_or(DEPTH_COLORS[0])
}

/// Marker radius in screen pixels. Negative magnitudes are passed through unclamped.
pub fn radius_for_magnitude(magnitude: f64) -> f64 {
    if magnitude == 0.0 {
        return MIN_RADIUS;
    }
    magnitude * RADIUS_PER_MAGNITUDE
}
