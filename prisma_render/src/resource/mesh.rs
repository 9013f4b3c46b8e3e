/// Mesh data kept on the CPU until a pass uploads it

use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use slotmap::new_key_type;

use crate::camera::BoundingSphere;
use crate::graphics_device::{VertexAttribute, VertexFormat, VertexLayout};

new_key_type! {
    /// Stable key of a mesh registered with the ResourceManager
    pub struct MeshId;
}

/// Interleaved vertex: position, normal, uv
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl Vertex {
    pub const fn new(position: [f32; 3], normal: [f32; 3], uv: [f32; 2]) -> Self {
        Self { position, normal, uv }
    }

    /// Vertex input layout matching this struct
    pub fn layout() -> VertexLayout {
        VertexLayout {
            stride: std::mem::size_of::<Vertex>() as u32,
            attributes: vec![
                VertexAttribute { location: 0, format: VertexFormat::Float3, offset: 0 },
                VertexAttribute { location: 1, format: VertexFormat::Float3, offset: 12 },
                VertexAttribute { location: 2, format: VertexFormat::Float2, offset: 24 },
            ],
        }
    }
}

/// Vertices plus optional indices and a local-space bounding sphere
#[derive(Debug, Clone, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Option<Vec<u32>>,
    bounds: BoundingSphere,
}

impl MeshData {
    pub fn new(vertices: Vec<Vertex>, indices: Option<Vec<u32>>) -> Self {
        let positions: Vec<Vec3> = vertices.iter().map(|v| Vec3::from(v.position)).collect();
        let bounds = BoundingSphere::from_points(&positions);
        Self { vertices, indices, bounds }
    }

    pub fn bounds(&self) -> BoundingSphere {
        self.bounds
    }

    /// Largest index referenced, `None` for non-indexed meshes
    pub fn max_index(&self) -> Option<u32> {
        self.indices.as_ref().and_then(|indices| indices.iter().copied().max())
    }

    pub fn triangle_count(&self) -> u32 {
        match &self.indices {
            Some(indices) => (indices.len() / 3) as u32,
            None => (self.vertices.len() / 3) as u32,
        }
    }

    /// Single triangle facing +Z
    pub fn triangle() -> Self {
        let normal = [0.0, 0.0, 1.0];
        Self::new(
            vec![
                Vertex::new([-0.5, -0.5, 0.0], normal, [0.0, 1.0]),
                Vertex::new([0.5, -0.5, 0.0], normal, [1.0, 1.0]),
                Vertex::new([0.0, 0.5, 0.0], normal, [0.5, 0.0]),
            ],
            None,
        )
    }

    /// Axis-aligned cube of edge `size`, 24 vertices and 36 indices
    pub fn cube(size: f32) -> Self {
        let h = size * 0.5;
        // (normal, tangent u, tangent v) per face
        let faces: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
            ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]),
            ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
            ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
            ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
            ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
            ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
        ];

        let mut vertices = Vec::with_capacity(24);
        let mut indices = Vec::with_capacity(36);
        for (normal, u, v) in faces {
            let n = Vec3::from(normal);
            let u = Vec3::from(u);
            let v = Vec3::from(v);
            let base = vertices.len() as u32;
            let corners: [(f32, f32, [f32; 2]); 4] =
                [(-1.0, -1.0, [0.0, 1.0]), (1.0, -1.0, [1.0, 1.0]), (1.0, 1.0, [1.0, 0.0]), (-1.0, 1.0, [0.0, 0.0])];
            for (su, sv, uv) in corners {
                let p = (n + u * su + v * sv) * h;
                vertices.push(Vertex::new(p.to_array(), normal, uv));
            }
            indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }

        Self::new(vertices, Some(indices))
    }
}

#[cfg(test)]
#[path = "mesh_tests.rs"]
mod tests;
