// face.rs — face loop reconstruction from surfedges
//
// A face owns the surfedge range [firstedge, firstedge + numedges). Surfedge
// `s >= 0` walks edge `s` from v[0] to v[1]; `s < 0` walks edge `-s` from
// v[1] to v[0]. The start vertex of every step, in order, is the loop.

use thiserror::Error;

use bspview_common::bspfile::{DEdge, DFace, DPlane, DVertex};
use bspview_common::mathlib::{vector_normalize, Vec3};

use crate::mesh::{FaceMesh, MeshVertex};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DegenerateReason {
    #[error("surfedge range {first}+{count} outside {available} surfedges")]
    SurfEdgeRange {
        first: i32,
        count: i16,
        available: usize,
    },

    #[error("surfedge {surfedge} selects an edge outside {edges} edges")]
    EdgeOutOfRange { surfedge: i32, edges: usize },

    #[error("vertex {vertex} outside {vertices} vertices")]
    VertexOutOfRange { vertex: u16, vertices: usize },

    #[error("loop is not closed after step {step}")]
    NotClosed { step: usize },

    #[error("vertex {vertex} repeats at step {step}")]
    DuplicateVertex { step: usize, vertex: u16 },

    #[error("only {distinct} distinct vertices")]
    TooFewVertices { distinct: usize },
}

/// A face whose loop could not be resolved. The face is skipped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("degenerate face {face}: {reason}")]
pub struct DegenerateFace {
    pub face: usize,
    pub reason: DegenerateReason,
}

/// Resolved vertex loop of one face, in winding order.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceLoop {
    pub vertex_indices: Vec<u16>,
    pub positions: Vec<Vec3>,
}

impl FaceLoop {
    pub fn len(&self) -> usize {
        self.vertex_indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertex_indices.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FaceResolver<'a> {
    pub vertices: &'a [DVertex],
    pub edges: &'a [DEdge],
    pub surfedges: &'a [i32],
    pub planes: &'a [DPlane],
}

impl<'a> FaceResolver<'a> {
    /// Walk the face's surfedges into a closed loop.
    pub fn resolve_loop(&self, face_index: usize, face: &DFace) -> Result<FaceLoop, DegenerateFace> {
        let fail = |reason| DegenerateFace {
            face: face_index,
            reason,
        };

        let first = face.firstedge as i64;
        let count = face.numedges as i64;
        if first < 0 || count < 0 || first + count > self.surfedges.len() as i64 {
            return Err(fail(DegenerateReason::SurfEdgeRange {
                first: face.firstedge,
                count: face.numedges,
                available: self.surfedges.len(),
            }));
        }

        let range = &self.surfedges[first as usize..(first + count) as usize];
        let mut steps = Vec::with_capacity(range.len());
        for &surfedge in range {
            let edge = self
                .edges
                .get(surfedge.unsigned_abs() as usize)
                .ok_or_else(|| {
                    fail(DegenerateReason::EdgeOutOfRange {
                        surfedge,
                        edges: self.edges.len(),
                    })
                })?;
            let step = if surfedge >= 0 {
                (edge.v[0], edge.v[1])
            } else {
                (edge.v[1], edge.v[0])
            };
            for v in [step.0, step.1] {
                if v as usize >= self.vertices.len() {
                    return Err(fail(DegenerateReason::VertexOutOfRange {
                        vertex: v,
                        vertices: self.vertices.len(),
                    }));
                }
            }
            steps.push(step);
        }

        let n = steps.len();
        for k in 0..n {
            let next = steps[(k + 1) % n];
            if steps[k].1 != next.0 {
                return Err(fail(DegenerateReason::NotClosed { step: k }));
            }
            if n > 1 && steps[k].0 == next.0 {
                return Err(fail(DegenerateReason::DuplicateVertex {
                    step: k,
                    vertex: next.0,
                }));
            }
        }

        let vertex_indices: Vec<u16> = steps.iter().map(|s| s.0).collect();
        let mut distinct = vertex_indices.clone();
        distinct.sort_unstable();
        distinct.dedup();
        if distinct.len() < 3 {
            return Err(fail(DegenerateReason::TooFewVertices {
                distinct: distinct.len(),
            }));
        }

        let positions = vertex_indices
            .iter()
            .map(|&v| self.vertices[v as usize].point)
            .collect();
        Ok(FaceLoop {
            vertex_indices,
            positions,
        })
    }

    /// Face normal: the plane normal, flipped for back-side faces.
    pub fn face_normal(&self, face: &DFace, face_loop: &FaceLoop) -> Vec3 {
        match self.planes.get(face.planenum as usize) {
            Some(plane) if face.side != 0 => [-plane.normal[0], -plane.normal[1], -plane.normal[2]],
            Some(plane) => plane.normal,
            None => newell_normal(&face_loop.positions),
        }
    }

    /// Flat fan-triangulated mesh of a resolved face.
    pub fn build_mesh(&self, face_index: usize, face: &DFace, face_loop: &FaceLoop) -> FaceMesh {
        let normal = self.face_normal(face, face_loop);
        let vertices = face_loop
            .positions
            .iter()
            .map(|&position| MeshVertex {
                position,
                normal,
                alpha: 0.0,
            })
            .collect();
        FaceMesh {
            face: face_index,
            normal,
            vertices,
            indices: fan_indices(face_loop.len()),
        }
    }
}

/// Triangles `(0, k, k + 1)` over a convex loop.
pub fn fan_indices(count: usize) -> Vec<u32> {
    let mut indices = Vec::with_capacity(count.saturating_sub(2) * 3);
    for k in 1..count.saturating_sub(1) {
        indices.extend_from_slice(&[0, k as u32, k as u32 + 1]);
    }
    indices
}

/// Polygon normal by Newell's method.
pub fn newell_normal(points: &[Vec3]) -> Vec3 {
    let mut n = [0.0f32; 3];
    for (i, a) in points.iter().enumerate() {
        let b = &points[(i + 1) % points.len()];
        n[0] += (a[1] - b[1]) * (a[2] + b[2]);
        n[1] += (a[2] - b[2]) * (a[0] + b[0]);
        n[2] += (a[0] - b[0]) * (a[1] + b[1]);
    }
    vector_normalize(&mut n);
    n
}
