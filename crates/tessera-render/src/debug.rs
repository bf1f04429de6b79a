//! Debug line accumulation.
//!
//! A [`LineBatch`] is owned by the pipeline and handed out by shared
//! reference; anything that wants lines drawn this frame pushes into it and
//! [`DebugLineStage`](crate::stage::DebugLineStage) draws and clears it.

use glam::Vec3;
use tessera_math::Aabb;

use crate::buffer::VertexPositionColor;

/// Cluster wireframe colour.
pub const CLUSTER_LINE_COLOR: [f32; 4] = [0.2, 0.8, 1.0, 0.5];

/// Line segments accumulated for the current frame, as line-list vertices.
#[derive(Clone, Debug, Default)]
pub struct LineBatch {
    vertices: Vec<VertexPositionColor>,
}

impl LineBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_line(&mut self, start: Vec3, end: Vec3, color: [f32; 4]) {
        self.vertices.push(VertexPositionColor {
            position: start.to_array(),
            color,
        });
        self.vertices.push(VertexPositionColor {
            position: end.to_array(),
            color,
        });
    }

    /// The 12 edges of `aabb`.
    pub fn add_aabb(&mut self, aabb: &Aabb, color: [f32; 4]) {
        let c = aabb.corners();
        // Corner index bits: 1 = max x, 2 = max y, 4 = max z.
        const EDGES: [(usize, usize); 12] = [
            (0, 1),
            (2, 3),
            (4, 5),
            (6, 7),
            (0, 2),
            (1, 3),
            (4, 6),
            (5, 7),
            (0, 4),
            (1, 5),
            (2, 6),
            (3, 7),
        ];
        for (a, b) in EDGES {
            self.add_line(c[a], c[b], color);
        }
    }

    pub fn clear(&mut self) {
        self.vertices.clear();
    }

    /// Number of line segments.
    pub fn len(&self) -> usize {
        self.vertices.len() / 2
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn vertices(&self) -> &[VertexPositionColor] {
        &self.vertices
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_line() {
        let mut batch = LineBatch::new();
        batch.add_line(Vec3::ZERO, Vec3::X, [1.0; 4]);
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.vertices()[1].position, [1.0, 0.0, 0.0]);
        batch.clear();
        assert!(batch.is_empty());
    }

    #[test]
    fn test_aabb_edges_are_axis_aligned_and_unit() {
        let mut batch = LineBatch::new();
        batch.add_aabb(&Aabb::new(Vec3::ZERO, Vec3::ONE), CLUSTER_LINE_COLOR);
        assert_eq!(batch.len(), 12);
        for pair in batch.vertices().chunks_exact(2) {
            let a = Vec3::from_array(pair[0].position);
            let b = Vec3::from_array(pair[1].position);
            let d = (b - a).abs();
            // Exactly one axis changes, by the full box extent.
            assert_eq!(d.x + d.y + d.z, 1.0);
            assert_eq!(d.max_element(), 1.0);
        }
    }
}
