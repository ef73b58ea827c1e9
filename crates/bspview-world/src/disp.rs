// disp.rs — displacement surface synthesis
//
// A displacement replaces its owner face's base quad with a (2^power + 1)²
// grid. The quad corner nearest `start_position` becomes grid origin; the
// other corners follow in loop order. Node (i, j) sits at
//
//     lerp(lerp(c0, c1, u), lerp(c3, c2, u), v) + vec * dist
//
// with u = i / (side - 1) and v = j / (side - 1).

use thiserror::Error;

use bspview_common::bspfile::{DDispInfo, DDispVert, DispTriTags};
use bspview_common::mathlib::{distance_squared, vector_lerp, vector_ma, Vec3};

use crate::face::FaceLoop;
use crate::mesh::{smooth_normals, DisplacementMesh, MeshVertex};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MismatchReason {
    #[error("displacement info index {index} outside {available} entries")]
    InfoOutOfRange { index: usize, available: usize },

    #[error("power {power} outside 0..=4")]
    BadPower { power: i32 },

    #[error("owner face {owner} does not match referencing face")]
    OwnerMismatch { owner: u32 },

    #[error("owner face loop did not resolve")]
    OwnerUnresolved,

    #[error("owner face has {vertices} vertices, expected a quad")]
    NotAQuad { vertices: usize },

    #[error("vertex range {start}+{count} outside {available} displacement vertices")]
    VertexRange {
        start: i32,
        count: usize,
        available: usize,
    },

    #[error("triangle tag range {start}+{count} outside {available} tags")]
    TriangleRange {
        start: i32,
        count: usize,
        available: usize,
    },
}

/// A displacement that could not be built. The owner face stays flat.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("displacement mismatch on face {face}: {reason}")]
pub struct DisplacementMismatch {
    pub face: usize,
    pub reason: MismatchReason,
}

fn checked_range(start: i32, count: usize, available: usize) -> Option<std::ops::Range<usize>> {
    if start < 0 {
        return None;
    }
    let start = start as usize;
    let end = start.checked_add(count)?;
    if end > available {
        return None;
    }
    Some(start..end)
}

/// Index of the corner nearest `point`. Ties go to the earliest corner.
pub fn nearest_corner(corners: &[Vec3], point: &Vec3) -> usize {
    let mut best = 0;
    let mut best_dist = f32::INFINITY;
    for (i, c) in corners.iter().enumerate() {
        let d = distance_squared(c, point);
        if d < best_dist {
            best = i;
            best_dist = d;
        }
    }
    best
}

/// Triangle indices for a side x side grid, two per cell.
pub fn grid_indices(side: usize) -> Vec<u32> {
    let cells = side.saturating_sub(1);
    let mut indices = Vec::with_capacity(cells * cells * 6);
    for i in 0..cells {
        for j in 0..cells {
            let a = (i * side + j) as u32;
            let b = ((i + 1) * side + j) as u32;
            let c = ((i + 1) * side + j + 1) as u32;
            let d = (i * side + j + 1) as u32;
            indices.extend_from_slice(&[a, b, c, a, c, d]);
        }
    }
    indices
}

#[derive(Debug, Clone, Copy)]
pub struct DisplacementBuilder<'a> {
    pub disp_verts: &'a [DDispVert],
    pub disp_tris: &'a [DispTriTags],
}

impl<'a> DisplacementBuilder<'a> {
    /// Build the displacement of face `face_index` from its resolved base
    /// loop and its displacement info.
    pub fn build(
        &self,
        face_index: usize,
        face_loop: &FaceLoop,
        disp_index: usize,
        info: &DDispInfo,
    ) -> Result<DisplacementMesh, DisplacementMismatch> {
        let fail = |reason| DisplacementMismatch {
            face: face_index,
            reason,
        };

        let (side, node_count, tri_count) = match (info.side(), info.vert_count(), info.tri_count()) {
            (Some(s), Some(v), Some(t)) => (s, v, t),
            _ => return Err(fail(MismatchReason::BadPower { power: info.power })),
        };
        if info.map_face as usize != face_index {
            return Err(fail(MismatchReason::OwnerMismatch {
                owner: info.map_face,
            }));
        }
        if face_loop.len() != 4 {
            return Err(fail(MismatchReason::NotAQuad {
                vertices: face_loop.len(),
            }));
        }

        let verts = checked_range(info.disp_vert_start, node_count, self.disp_verts.len())
            .map(|r| &self.disp_verts[r])
            .ok_or_else(|| {
                fail(MismatchReason::VertexRange {
                    start: info.disp_vert_start,
                    count: node_count,
                    available: self.disp_verts.len(),
                })
            })?;
        let tags = checked_range(info.disp_tri_start, tri_count, self.disp_tris.len())
            .map(|r| &self.disp_tris[r])
            .ok_or_else(|| {
                fail(MismatchReason::TriangleRange {
                    start: info.disp_tri_start,
                    count: tri_count,
                    available: self.disp_tris.len(),
                })
            })?;

        let origin = nearest_corner(&face_loop.positions, &info.start_position);
        let c: [Vec3; 4] = std::array::from_fn(|k| face_loop.positions[(origin + k) % 4]);

        let step = 1.0 / (side - 1) as f32;
        let mut positions = Vec::with_capacity(node_count);
        for i in 0..side {
            let u = i as f32 * step;
            let edge_a = vector_lerp(&c[0], &c[1], u);
            let edge_b = vector_lerp(&c[3], &c[2], u);
            for j in 0..side {
                let v = j as f32 * step;
                let base = vector_lerp(&edge_a, &edge_b, v);
                let dv = &verts[i * side + j];
                positions.push(vector_ma(&base, dv.dist, &dv.vec));
            }
        }

        let indices = grid_indices(side);
        let normals = smooth_normals(&positions, &indices);
        let vertices = positions
            .iter()
            .zip(&normals)
            .zip(verts)
            .map(|((&position, &normal), dv)| MeshVertex {
                position,
                normal,
                alpha: dv.alpha,
            })
            .collect();

        Ok(DisplacementMesh {
            face: face_index,
            disp_info: disp_index,
            power: info.power as u32,
            side,
            vertices,
            indices,
            tri_tags: tags.to_vec(),
        })
    }
}
