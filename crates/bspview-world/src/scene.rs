// scene.rs — immutable loaded map
//
// Everything is addressed by index into flat arrays. A scene never changes
// after assembly; a new load replaces it wholesale.

use std::ops::Range;

use bspview_common::bspfile::{DFace, DLeaf, DModel, DNode, DPlane};
use bspview_common::mathlib::{add_point_to_bounds, clear_bounds, dot_product, Vec3};

use crate::entities::EntityRecord;
use crate::mesh::{DisplacementMesh, FaceGeometry, FaceMesh};
use crate::vis::VisibilityTable;

/// Which mesh, if any, renders a face.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum GeometryRef {
    None,
    Flat(usize),
    Displacement(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SceneStats {
    pub vertices: usize,
    pub faces: usize,
    pub resolved_faces: usize,
    pub static_meshes: usize,
    pub displacement_meshes: usize,
    pub triangles: usize,
    pub clusters: usize,
    pub leaves: usize,
    pub entities: usize,
}

#[derive(Debug, Clone)]
pub struct Scene {
    pub(crate) name: String,
    pub(crate) version: i32,
    pub(crate) revision: i32,
    pub(crate) checksum: u32,
    pub(crate) vertex_count: usize,
    pub(crate) faces: Vec<DFace>,
    pub(crate) static_meshes: Vec<FaceMesh>,
    pub(crate) displacement_meshes: Vec<DisplacementMesh>,
    pub(crate) face_geometry: Vec<GeometryRef>,
    pub(crate) planes: Vec<DPlane>,
    pub(crate) nodes: Vec<DNode>,
    pub(crate) leafs: Vec<DLeaf>,
    pub(crate) leaf_faces: Vec<u16>,
    pub(crate) models: Vec<DModel>,
    pub(crate) cluster_leaves: Vec<Vec<usize>>,
    pub(crate) vis: VisibilityTable,
    pub(crate) entities: Vec<EntityRecord>,
}

impl Scene {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> i32 {
        self.version
    }

    pub fn revision(&self) -> i32 {
        self.revision
    }

    /// CRC-32 of the file the scene was loaded from.
    pub fn checksum(&self) -> u32 {
        self.checksum
    }

    // ============================================================
    // Geometry
    // ============================================================

    pub fn faces(&self) -> &[DFace] {
        &self.faces
    }

    /// Flat meshes of every resolved face without a displacement.
    pub fn static_meshes(&self) -> &[FaceMesh] {
        &self.static_meshes
    }

    pub fn displacement_meshes(&self) -> &[DisplacementMesh] {
        &self.displacement_meshes
    }

    pub fn face_geometry(&self, face: usize) -> Option<FaceGeometry<'_>> {
        match self.face_geometry.get(face)? {
            GeometryRef::None => None,
            GeometryRef::Flat(i) => Some(FaceGeometry::Flat(&self.static_meshes[*i])),
            GeometryRef::Displacement(i) => {
                Some(FaceGeometry::Displacement(&self.displacement_meshes[*i]))
            }
        }
    }

    pub fn models(&self) -> &[DModel] {
        &self.models
    }

    /// Face range of a submodel. Model 0 is the world.
    pub fn model_faces(&self, model: usize) -> Range<usize> {
        let Some(m) = self.models.get(model) else {
            return 0..0;
        };
        let start = (m.firstface.max(0) as usize).min(self.faces.len());
        let end = (start + m.numfaces.max(0) as usize).min(self.faces.len());
        start..end
    }

    // ============================================================
    // Leaves and clusters
    // ============================================================

    pub fn leafs(&self) -> &[DLeaf] {
        &self.leafs
    }

    /// Leaf containing `point`, found by walking the node tree from the
    /// world model's head node.
    pub fn leaf_at(&self, point: &Vec3) -> Option<usize> {
        if self.leafs.is_empty() {
            return None;
        }
        if self.nodes.is_empty() {
            return Some(0);
        }

        let mut num = self.models.first().map_or(0, |m| m.headnode);
        // a well-formed tree reaches a leaf in fewer steps than it has nodes
        for _ in 0..=self.nodes.len() {
            if num < 0 {
                let leaf = (-1 - num) as usize;
                return (leaf < self.leafs.len()).then_some(leaf);
            }
            let node = self.nodes.get(num as usize)?;
            let plane = self.planes.get(node.planenum.max(0) as usize)?;
            let d = dot_product(&plane.normal, point) - plane.dist;
            num = if d >= 0.0 {
                node.children[0]
            } else {
                node.children[1]
            };
        }
        None
    }

    pub fn cluster_of(&self, leaf: usize) -> Option<usize> {
        self.leafs.get(leaf)?.cluster()
    }

    pub fn cluster_count(&self) -> usize {
        self.cluster_leaves.len()
    }

    pub fn leaves_in_cluster(&self, cluster: usize) -> &[usize] {
        self.cluster_leaves
            .get(cluster)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Union of the boxes of a cluster's leaves.
    pub fn cluster_bounds(&self, cluster: usize) -> Option<(Vec3, Vec3)> {
        let leaves = self.leaves_in_cluster(cluster);
        if leaves.is_empty() {
            return None;
        }
        let (mut mins, mut maxs) = ([0.0; 3], [0.0; 3]);
        clear_bounds(&mut mins, &mut maxs);
        for &l in leaves {
            let leaf = &self.leafs[l];
            add_point_to_bounds(&leaf.mins.map(f32::from), &mut mins, &mut maxs);
            add_point_to_bounds(&leaf.maxs.map(f32::from), &mut mins, &mut maxs);
        }
        Some((mins, maxs))
    }

    /// Face indices listed by one leaf, skipping out-of-range entries.
    pub fn leaf_face_indices(&self, leaf: usize) -> impl Iterator<Item = usize> + '_ {
        let range = self.leafs.get(leaf).map_or(0..0, |l| {
            let start = (l.firstleafface as usize).min(self.leaf_faces.len());
            let end = (start + l.numleaffaces as usize).min(self.leaf_faces.len());
            start..end
        });
        self.leaf_faces[range]
            .iter()
            .map(|&f| f as usize)
            .filter(|&f| f < self.faces.len())
    }

    // ============================================================
    // Visibility
    // ============================================================

    pub fn visibility(&self) -> &VisibilityTable {
        &self.vis
    }

    pub fn is_visible(&self, from_cluster: usize, to_cluster: usize) -> bool {
        self.vis.is_visible(from_cluster, to_cluster)
    }

    pub fn is_hearable(&self, from_cluster: usize, to_cluster: usize) -> bool {
        self.vis.is_hearable(from_cluster, to_cluster)
    }

    /// Faces of every leaf whose cluster is visible from `from_leaf`, each
    /// face once, in first-seen order. A leaf outside the world sees
    /// everything; leaves outside the world are never seen.
    pub fn potentially_visible_faces(&self, from_leaf: usize) -> Vec<usize> {
        let Some(leaf) = self.leafs.get(from_leaf) else {
            return Vec::new();
        };
        let from_cluster = leaf.cluster();

        let mut seen = vec![false; self.faces.len()];
        let mut faces = Vec::new();
        for (index, target) in self.leafs.iter().enumerate() {
            let Some(to_cluster) = target.cluster() else {
                continue;
            };
            if let Some(from) = from_cluster {
                if !self.vis.is_visible(from, to_cluster) {
                    continue;
                }
            }
            for face in self.leaf_face_indices(index) {
                if !seen[face] {
                    seen[face] = true;
                    faces.push(face);
                }
            }
        }
        faces
    }

    // ============================================================
    // Entities
    // ============================================================

    pub fn entities(&self) -> &[EntityRecord] {
        &self.entities
    }

    pub fn entities_by_class<'a>(
        &'a self,
        class_name: &'a str,
    ) -> impl Iterator<Item = &'a EntityRecord> + 'a {
        self.entities
            .iter()
            .filter(move |e| e.class_name() == Some(class_name))
    }

    pub fn stats(&self) -> SceneStats {
        let triangles = self
            .static_meshes
            .iter()
            .map(FaceMesh::triangle_count)
            .chain(self.displacement_meshes.iter().map(DisplacementMesh::triangle_count))
            .sum();
        SceneStats {
            vertices: self.vertex_count,
            faces: self.faces.len(),
            resolved_faces: self
                .face_geometry
                .iter()
                .filter(|g| **g != GeometryRef::None)
                .count(),
            static_meshes: self.static_meshes.len(),
            displacement_meshes: self.displacement_meshes.len(),
            triangles,
            clusters: self.cluster_leaves.len(),
            leaves: self.leafs.len(),
            entities: self.entities.len(),
        }
    }
}
