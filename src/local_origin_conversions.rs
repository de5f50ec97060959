use crate::coord_conversions::WebMercatorConversion;
use crate::local_origin::LocalOrigin;
use bevy::math::{DVec2, DVec3};
use bevy::prelude::*;

/// Trait to convert between local Bevy world coordinates and web mercator or lon/lat coordinates, given a `LocalOrigin`.
///
/// Mercator coordinates should never be stored in f32 (Vec2/Vec3) as this can lead to significant precision loss. Use DVec2/DVec3 instead.
/// For Vec2 the mercator result is a DVec2 to avoid precision loss.
pub trait LocalOriginConversion {
    type MercatorOutput;
    type Output;
    fn mercator_to_local(&self, origin: &LocalOrigin) -> Self::Output;
    fn local_to_mercator(&self, origin: &LocalOrigin) -> Self::MercatorOutput;
    fn local_to_lonlat(&self, origin: &LocalOrigin) -> Self::MercatorOutput;
}

impl LocalOriginConversion for DVec2 {
    type MercatorOutput = Self;
    type Output = Self;
    fn mercator_to_local(&self, origin: &LocalOrigin) -> Self {
        self - origin.mercator_origin().truncate()
    }

    fn local_to_mercator(&self, origin: &LocalOrigin) -> Self {
        self + origin.mercator_origin().truncate()
    }

    fn local_to_lonlat(&self, origin: &LocalOrigin) -> Self {
        self.local_to_mercator(origin).mercator_to_lonlat()
    }
}

impl LocalOriginConversion for DVec3 {
    type MercatorOutput = Self;
    type Output = Self;
    fn mercator_to_local(&self, origin: &LocalOrigin) -> Self {
        self.truncate().mercator_to_local(origin).extend(self.z)
    }

    fn local_to_mercator(&self, origin: &LocalOrigin) -> Self {
        self.truncate().local_to_mercator(origin).extend(self.z)
    }

    fn local_to_lonlat(&self, origin: &LocalOrigin) -> Self {
        self.local_to_mercator(origin).mercator_to_lonlat()
    }
}

impl LocalOriginConversion for Vec2 {
    type MercatorOutput = DVec2;
    type Output = Self;
    fn mercator_to_local(&self, origin: &LocalOrigin) -> Self {
        self.as_dvec2().mercator_to_local(origin).as_vec2()
    }

    fn local_to_mercator(&self, origin: &LocalOrigin) -> DVec2 {
        self.as_dvec2().local_to_mercator(origin)
    }

    fn local_to_lonlat(&self, origin: &LocalOrigin) -> DVec2 {
        self.as_dvec2().local_to_lonlat(origin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_round_trip() {
        let origin = LocalOrigin::new(DVec3::new(-10_519_000.0, 4_968_000.0, 0.0));
        let merc = DVec2::new(-10_520_250.5, 4_969_001.25);
        let local = merc.mercator_to_local(&origin);
        assert_eq!(local, DVec2::new(-1_250.5, 1_001.25));
        assert_eq!(local.local_to_mercator(&origin), merc);
        assert_eq!(
            Vec2::new(-1_250.5, 1_001.25).local_to_mercator(&origin),
            merc
        );
    }
}
