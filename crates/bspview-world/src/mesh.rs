// mesh.rs — renderable meshes produced by the scene assembler

use bspview_common::bspfile::DispTriTags;
use bspview_common::mathlib::{cross_product, vector_add, vector_normalize, vector_subtract, Vec3};

/// Vertex layout handed to the renderer for upload.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MeshVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    /// Blend weight; 0 for flat faces.
    pub alpha: f32,
}

/// Flat polygon of one face, fan-triangulated.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceMesh {
    pub face: usize,
    pub normal: Vec3,
    pub vertices: Vec<MeshVertex>,
    pub indices: Vec<u32>,
}

impl FaceMesh {
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }
}

/// Triangulated displacement grid. Node `(i, j)` is vertex `i * side + j`.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplacementMesh {
    pub face: usize,
    pub disp_info: usize,
    pub power: u32,
    pub side: usize,
    pub vertices: Vec<MeshVertex>,
    pub indices: Vec<u32>,
    /// One entry per triangle.
    pub tri_tags: Vec<DispTriTags>,
}

impl DisplacementMesh {
    pub fn node_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    pub fn walkable_triangles(&self) -> usize {
        self.tri_tags
            .iter()
            .filter(|t| t.contains(DispTriTags::WALKABLE))
            .count()
    }
}

/// Either kind of geometry for one face.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FaceGeometry<'a> {
    Flat(&'a FaceMesh),
    Displacement(&'a DisplacementMesh),
}

impl FaceGeometry<'_> {
    pub fn vertices(&self) -> &[MeshVertex] {
        match self {
            FaceGeometry::Flat(m) => &m.vertices,
            FaceGeometry::Displacement(m) => &m.vertices,
        }
    }

    pub fn indices(&self) -> &[u32] {
        match self {
            FaceGeometry::Flat(m) => &m.indices,
            FaceGeometry::Displacement(m) => &m.indices,
        }
    }
}

/// Area-weighted vertex normals from an indexed triangle list.
pub(crate) fn smooth_normals(positions: &[Vec3], indices: &[u32]) -> Vec<Vec3> {
    let mut normals = vec![[0.0f32; 3]; positions.len()];
    for tri in indices.chunks_exact(3) {
        let [a, b, c] = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
        let e1 = vector_subtract(&positions[b], &positions[a]);
        let e2 = vector_subtract(&positions[c], &positions[a]);
        let n = cross_product(&e1, &e2);
        for v in [a, b, c] {
            normals[v] = vector_add(&normals[v], &n);
        }
    }
    for n in &mut normals {
        vector_normalize(n);
    }
    normals
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_layout_is_tightly_packed() {
        assert_eq!(std::mem::size_of::<MeshVertex>(), 28);
        let mesh = FaceMesh {
            face: 0,
            normal: [0.0, 0.0, 1.0],
            vertices: vec![MeshVertex::default(); 3],
            indices: vec![0, 1, 2],
        };
        assert_eq!(mesh.vertex_bytes().len(), 84);
        assert_eq!(mesh.triangle_count(), 1);
    }

    #[test]
    fn smooth_normals_of_flat_quad() {
        let positions = [
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [1.0, 1.0, 0.0],
            [0.0, 1.0, 0.0],
        ];
        let normals = smooth_normals(&positions, &[0, 1, 2, 0, 2, 3]);
        for n in normals {
            assert!((n[2] - 1.0).abs() < 1e-6);
        }
    }
}
