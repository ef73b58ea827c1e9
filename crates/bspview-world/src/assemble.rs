// assemble.rs — BSP bytes to scene
//
// Pipeline: directory -> lump decode (independent, parallel) -> face loops
// -> displacements and flat meshes -> visibility -> entities -> scene.
// Only a bad directory aborts; everything else lands in the load report.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rayon::prelude::*;
use tracing::{debug, info, warn};

use bspview_common::bspfile::DFace;
use bspview_common::cvar::LoaderSettings;
use bspview_common::directory::LumpDirectory;
use bspview_common::lumps::Lumps;

use crate::disp::{DisplacementBuilder, DisplacementMismatch, MismatchReason};
use crate::entities::parse_entities;
use crate::error::{LoadError, LoadReport};
use crate::face::{DegenerateFace, FaceLoop, FaceResolver};
use crate::mesh::DisplacementMesh;
use crate::scene::{GeometryRef, Scene};
use crate::vis::VisibilityTable;

/// Shared flag a running load checks between stages.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    fn check(&self) -> Result<(), LoadError> {
        if self.is_cancelled() {
            Err(LoadError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SceneAssembler {
    settings: LoaderSettings,
}

impl SceneAssembler {
    pub fn new(settings: LoaderSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &LoaderSettings {
        &self.settings
    }

    /// Load a scene from file bytes.
    pub fn load(&self, name: &str, data: &[u8]) -> Result<(Scene, LoadReport), LoadError> {
        self.load_cancellable(name, data, &CancelToken::new())
    }

    /// Load a scene, giving up with `LoadError::Cancelled` at the next stage
    /// boundary once `cancel` is set.
    pub fn load_cancellable(
        &self,
        name: &str,
        data: &[u8],
        cancel: &CancelToken,
    ) -> Result<(Scene, LoadReport), LoadError> {
        let dir = LumpDirectory::open(data)?;
        debug!(
            name,
            version = dir.version(),
            revision = dir.revision(),
            size = dir.file_size(),
            "opened lump directory"
        );
        cancel.check()?;

        let mut report = LoadReport::new();
        let (lumps, malformed) = Lumps::decode(&dir, &self.settings.decode);
        report.extend(malformed);
        cancel.check()?;

        let mut scene = self.assemble(name, lumps, &mut report, cancel)?;
        scene.version = dir.version();
        scene.revision = dir.revision();
        scene.checksum = dir.checksum();

        for issue in report.issues() {
            warn!("{}: {}", name, issue);
        }
        let stats = scene.stats();
        info!(
            name,
            faces = stats.faces,
            static_meshes = stats.static_meshes,
            displacements = stats.displacement_meshes,
            triangles = stats.triangles,
            clusters = stats.clusters,
            entities = stats.entities,
            issues = report.len(),
            "loaded map"
        );
        Ok((scene, report))
    }

    /// Cross-reference decoded lumps into a scene.
    pub fn assemble(
        &self,
        name: &str,
        lumps: Lumps,
        report: &mut LoadReport,
        cancel: &CancelToken,
    ) -> Result<Scene, LoadError> {
        let threshold = self.settings.decode.parallel_threshold;

        // face loops
        let resolver = FaceResolver {
            vertices: &lumps.vertices,
            edges: &lumps.edges,
            surfedges: &lumps.surfedges,
            planes: &lumps.planes,
        };
        let resolve = |(i, face): (usize, &DFace)| resolver.resolve_loop(i, face);
        let loops: Vec<Result<FaceLoop, DegenerateFace>> = if lumps.faces.len() >= threshold {
            lumps.faces.par_iter().enumerate().map(resolve).collect()
        } else {
            lumps.faces.iter().enumerate().map(resolve).collect()
        };
        report.extend(loops.iter().filter_map(|l| l.as_ref().err().cloned()));
        cancel.check()?;

        // displacements
        let builder = DisplacementBuilder {
            disp_verts: &lumps.disp_verts,
            disp_tris: &lumps.disp_tris,
        };
        let build = |(i, face): (usize, &DFace)| -> Option<Result<DisplacementMesh, DisplacementMismatch>> {
            let disp_index = face.disp_info()?;
            let fail = |reason| {
                Some(Err(DisplacementMismatch {
                    face: i,
                    reason,
                }))
            };
            let Some(info) = lumps.disp_infos.get(disp_index) else {
                return fail(MismatchReason::InfoOutOfRange {
                    index: disp_index,
                    available: lumps.disp_infos.len(),
                });
            };
            match &loops[i] {
                Ok(face_loop) => Some(builder.build(i, face_loop, disp_index, info)),
                Err(_) => fail(MismatchReason::OwnerUnresolved),
            }
        };
        let disps: Vec<Option<Result<DisplacementMesh, DisplacementMismatch>>> =
            if lumps.faces.len() >= threshold {
                lumps.faces.par_iter().enumerate().map(build).collect()
            } else {
                lumps.faces.iter().enumerate().map(build).collect()
            };
        cancel.check()?;

        // meshes, in face order
        let mut static_meshes = Vec::new();
        let mut displacement_meshes = Vec::new();
        let mut face_geometry = Vec::with_capacity(lumps.faces.len());
        for (i, (face_loop, disp)) in loops.iter().zip(disps).enumerate() {
            match (face_loop, disp) {
                (Err(_), disp) => {
                    report.extend(disp.and_then(Result::err));
                    face_geometry.push(GeometryRef::None);
                }
                (Ok(_), Some(Ok(mesh))) => {
                    face_geometry.push(GeometryRef::Displacement(displacement_meshes.len()));
                    displacement_meshes.push(mesh);
                }
                (Ok(face_loop), disp) => {
                    report.extend(disp.and_then(Result::err));
                    face_geometry.push(GeometryRef::Flat(static_meshes.len()));
                    static_meshes.push(resolver.build_mesh(i, &lumps.faces[i], face_loop));
                }
            }
        }

        // visibility
        let (mut vis, overruns) = VisibilityTable::decode(&lumps.visibility, threshold);
        report.extend(overruns);
        if self.settings.novis {
            vis.set_novis(true);
        }
        cancel.check()?;

        let (entities, warnings) = parse_entities(&lumps.entities);
        report.extend(warnings);

        // leaves by cluster
        let numclusters = lumps
            .leafs
            .iter()
            .filter_map(|l| l.cluster())
            .map(|c| c + 1)
            .max()
            .unwrap_or(0)
            .max(vis.numclusters());
        let mut cluster_leaves = vec![Vec::new(); numclusters];
        for (i, leaf) in lumps.leafs.iter().enumerate() {
            if let Some(c) = leaf.cluster() {
                cluster_leaves[c].push(i);
            }
        }

        Ok(Scene {
            name: name.to_string(),
            version: 0,
            revision: 0,
            checksum: 0,
            vertex_count: lumps.vertices.len(),
            faces: lumps.faces,
            static_meshes,
            displacement_meshes,
            face_geometry,
            planes: lumps.planes,
            nodes: lumps.nodes,
            leafs: lumps.leafs,
            leaf_faces: lumps.leaf_faces,
            models: lumps.models,
            cluster_leaves,
            vis,
            entities,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::EntityFault;
    use crate::error::{IssueKind, LoadIssue};
    use crate::mesh::FaceGeometry;
    use crate::testmap::{displacement_map, quad_map, two_room_map};
    use bspview_common::bspfile::{DEdge, LumpType};
    use bspview_common::error::{BspError, LumpFault, MalformedLump};

    fn load(data: &[u8]) -> (Scene, LoadReport) {
        SceneAssembler::default().load("test", data).unwrap()
    }

    #[test]
    fn flat_quad() {
        let (scene, report) = load(&quad_map().finish());
        assert!(report.is_empty(), "{:?}", report);
        assert_eq!(scene.static_meshes().len(), 1);
        assert!(scene.displacement_meshes().is_empty());
        let mesh = &scene.static_meshes()[0];
        assert_eq!(mesh.triangle_count(), 2);
        assert_eq!(mesh.normal, [0.0, 0.0, 1.0]);
        assert_eq!(scene.entities().len(), 1);
        assert_eq!(scene.version(), 20);
    }

    #[test]
    fn power_one_displacement() {
        let (scene, report) = load(&displacement_map(1, 8.0).finish());
        assert!(report.is_empty(), "{:?}", report);
        assert_eq!(scene.displacement_meshes().len(), 1);
        let disp = &scene.displacement_meshes()[0];
        assert_eq!(disp.node_count(), 9);
        assert_eq!(disp.triangle_count(), 8);
        assert_eq!(disp.vertices[4].position, [32.0, 32.0, 8.0]);
        // the base quad is replaced, not drawn twice
        assert!(scene.static_meshes().is_empty());
        assert!(matches!(scene.face_geometry(0), Some(FaceGeometry::Displacement(_))));
    }

    #[test]
    fn displacement_mismatch_keeps_flat_face() {
        let mut w = displacement_map(1, 8.0);
        // one vertex short of the 3x3 grid
        w.disp_verts(&[bspview_common::bspfile::DDispVert::default(); 8]);
        let (scene, report) = load(&w.finish());
        assert_eq!(report.len(), 1);
        assert_eq!(report.count(IssueKind::DisplacementMismatch), 1);
        assert!(scene.displacement_meshes().is_empty());
        assert_eq!(scene.static_meshes().len(), 1);
        assert!(matches!(scene.face_geometry(0), Some(FaceGeometry::Flat(_))));
    }

    #[test]
    fn misaligned_vertex_lump() {
        let mut w = two_room_map();
        w.set_lump(LumpType::Vertices, 0, vec![0u8; 12 * 8 + 5]);
        let (scene, report) = load(&w.finish());
        assert_eq!(report.count(IssueKind::MalformedLump), 1);
        assert_eq!(
            report.issues()[0],
            LoadIssue::from(MalformedLump {
                lump: LumpType::Vertices,
                fault: LumpFault::Misaligned {
                    length: 101,
                    width: 12
                },
            })
        );
        assert_eq!(scene.stats().vertices, 0);
        // other lumps are intact
        assert_eq!(scene.faces().len(), 2);
        assert_eq!(scene.leafs().len(), 3);
        assert_eq!(scene.entities().len(), 4);
        assert_eq!(scene.cluster_count(), 2);
        // no vertices: every face is degenerate
        assert_eq!(report.count(IssueKind::DegenerateFace), 2);
    }

    #[test]
    fn degenerate_face_skipped() {
        let mut w = quad_map();
        // last edge no longer returns to vertex 0
        w.edges(&[
            DEdge { v: [0, 0] },
            DEdge { v: [0, 1] },
            DEdge { v: [2, 1] },
            DEdge { v: [2, 3] },
            DEdge { v: [3, 3] },
        ]);
        let (scene, report) = load(&w.finish());
        assert_eq!(report.count(IssueKind::DegenerateFace), 1);
        assert!(scene.static_meshes().is_empty());
        assert!(scene.face_geometry(0).is_none());
        assert_eq!(scene.stats().resolved_faces, 0);
    }

    #[test]
    fn entity_warning_reported() {
        let mut w = quad_map();
        w.entities(r#"{"classname" "light"}{"classname" "light2""#);
        let (scene, report) = load(&w.finish());
        assert_eq!(scene.entities().len(), 1);
        assert_eq!(report.len(), 1);
        match &report.issues()[0] {
            LoadIssue::EntityParseWarning(w) => {
                assert_eq!(w.fault, EntityFault::MissingCloseBrace)
            }
            other => panic!("unexpected issue {}", other),
        }
    }

    #[test]
    fn corrupt_file_aborts() {
        let mut data = quad_map().finish();
        data[0] = b'X';
        let err = SceneAssembler::default().load("bad", &data).unwrap_err();
        assert!(matches!(err, LoadError::Corrupt(BspError::BadMagic { .. })));
    }

    #[test]
    fn deterministic() {
        let data = two_room_map().finish();
        let (a, _) = load(&data);
        let (b, _) = load(&data);
        assert_eq!(a.stats(), b.stats());
        assert_eq!(a.static_meshes(), b.static_meshes());
        assert_eq!(a.visibility(), b.visibility());
        for leaf in 0..a.leafs().len() {
            assert_eq!(a.potentially_visible_faces(leaf), b.potentially_visible_faces(leaf));
        }
    }

    #[test]
    fn parallel_and_sequential_scenes_match() {
        let data = two_room_map().finish();
        let mut sequential = LoaderSettings::default();
        sequential.decode.parallel = false;
        sequential.decode.parallel_threshold = usize::MAX;
        let mut parallel = LoaderSettings::default();
        parallel.decode.parallel_threshold = 1;
        let (a, _) = SceneAssembler::new(sequential).load("a", &data).unwrap();
        let (b, _) = SceneAssembler::new(parallel).load("b", &data).unwrap();
        assert_eq!(a.stats(), b.stats());
        assert_eq!(a.static_meshes(), b.static_meshes());
    }

    #[test]
    fn cancelled_before_decode() {
        let token = CancelToken::new();
        token.cancel();
        let err = SceneAssembler::default()
            .load_cancellable("x", &quad_map().finish(), &token)
            .unwrap_err();
        assert!(matches!(err, LoadError::Cancelled));
    }

    #[test]
    fn checksum_matches_file() {
        let data = quad_map().finish();
        let (scene, _) = load(&data);
        assert_eq!(scene.checksum(), bspview_common::crc::crc_block(&data));
    }
}
