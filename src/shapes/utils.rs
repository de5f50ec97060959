use bevy::math::{DVec2, Vec2};

use lyon::tessellation::StrokeVertexConstructor;

/// Offsets every point from the first one so the mesh can be built in f32.
pub(crate) fn points_to_relative(points: &[DVec2]) -> (Vec<Vec2>, DVec2) {
    let Some(first) = points.first().copied() else {
        return (vec![], DVec2::ZERO);
    };
    (
        points
            .iter()
            .map(|p| (*p - first).as_vec2())
            .collect::<Vec<Vec2>>(),
        first,
    )
}

#[derive(Debug, Copy, Clone)]
pub(crate) struct SimpleVertex {
    pub(crate) position: [f32; 3],
}

pub(crate) struct WithoutColor;

impl StrokeVertexConstructor<SimpleVertex> for WithoutColor {
    fn new_vertex(&mut self, vertex: lyon::tessellation::StrokeVertex) -> SimpleVertex {
        SimpleVertex {
            position: vertex.position().extend(0.0).to_array(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_to_first_point() {
        let (points, first) = points_to_relative(&[
            DVec2::new(1_000_000.5, 2_000_000.0),
            DVec2::new(1_000_010.5, 1_999_990.0),
        ]);
        assert_eq!(first, DVec2::new(1_000_000.5, 2_000_000.0));
        assert_eq!(points, vec![Vec2::ZERO, Vec2::new(10.0, -10.0)]);
        assert_eq!(points_to_relative(&[]), (vec![], DVec2::ZERO));
    }
}
