// bspwrite.rs — assembling BSP files in memory
//
// The inverse of the lump decoders. Used to build synthetic maps for tests
// and small tools; record layouts mirror `lumps.rs` field for field.

use crate::bspfile::{
    DDispInfo, DDispVert, DEdge, DFace, DLeaf, DModel, DNode, DPlane, DispTriTags,
    LumpType, HEADER_LUMPS, HEADER_SIZE, IDBSPHEADER, LUMP_DESCRIPTOR_SIZE,
};
use crate::mathlib::Vec3;

/// In-memory BSP file builder. Lumps are laid out after the header in
/// table order, each aligned to 4 bytes.
#[derive(Debug, Clone)]
pub struct BspWriter {
    pub version: i32,
    pub revision: i32,
    lumps: Vec<(i32, Vec<u8>)>,
}

impl Default for BspWriter {
    fn default() -> Self {
        Self::new()
    }
}

fn put_f32s(out: &mut Vec<u8>, v: &[f32]) {
    for f in v {
        out.extend_from_slice(&f.to_le_bytes());
    }
}

fn put_i16s(out: &mut Vec<u8>, v: &[i16]) {
    for x in v {
        out.extend_from_slice(&x.to_le_bytes());
    }
}

impl BspWriter {
    pub fn new() -> Self {
        Self {
            version: 20,
            revision: 1,
            lumps: vec![(0, Vec::new()); HEADER_LUMPS],
        }
    }

    /// Replace a lump's raw contents.
    pub fn set_lump(&mut self, lump: LumpType, version: i32, data: Vec<u8>) -> &mut Self {
        self.lumps[lump.index()] = (version, data);
        self
    }

    pub fn vertices(&mut self, points: &[Vec3]) -> &mut Self {
        let mut out = Vec::with_capacity(points.len() * 12);
        for p in points {
            put_f32s(&mut out, p);
        }
        self.set_lump(LumpType::Vertices, 0, out)
    }

    pub fn planes(&mut self, planes: &[DPlane]) -> &mut Self {
        let mut out = Vec::with_capacity(planes.len() * 20);
        for p in planes {
            put_f32s(&mut out, &p.normal);
            put_f32s(&mut out, &[p.dist]);
            out.extend_from_slice(&p.plane_type.to_le_bytes());
        }
        self.set_lump(LumpType::Planes, 0, out)
    }

    pub fn edges(&mut self, edges: &[DEdge]) -> &mut Self {
        let mut out = Vec::with_capacity(edges.len() * 4);
        for e in edges {
            out.extend_from_slice(&e.v[0].to_le_bytes());
            out.extend_from_slice(&e.v[1].to_le_bytes());
        }
        self.set_lump(LumpType::Edges, 0, out)
    }

    pub fn surfedges(&mut self, surfedges: &[i32]) -> &mut Self {
        let out = surfedges.iter().flat_map(|s| s.to_le_bytes()).collect();
        self.set_lump(LumpType::SurfEdges, 0, out)
    }

    pub fn faces(&mut self, faces: &[DFace]) -> &mut Self {
        let mut out = Vec::with_capacity(faces.len() * 56);
        for f in faces {
            out.extend_from_slice(&f.planenum.to_le_bytes());
            out.push(f.side);
            out.push(f.on_node);
            out.extend_from_slice(&f.firstedge.to_le_bytes());
            put_i16s(&mut out, &[f.numedges, f.texinfo, f.dispinfo, f.surface_fog_volume_id]);
            out.extend_from_slice(&f.styles);
            out.extend_from_slice(&f.lightofs.to_le_bytes());
            put_f32s(&mut out, &[f.area]);
            // lightmap mins / size in luxels
            out.extend_from_slice(&[0u8; 16]);
            out.extend_from_slice(&f.orig_face.to_le_bytes());
            // numPrims, firstPrimID
            out.extend_from_slice(&[0u8; 4]);
            out.extend_from_slice(&f.smoothing_groups.to_le_bytes());
        }
        self.set_lump(LumpType::Faces, 0, out)
    }

    pub fn models(&mut self, models: &[DModel]) -> &mut Self {
        let mut out = Vec::with_capacity(models.len() * 48);
        for m in models {
            put_f32s(&mut out, &m.mins);
            put_f32s(&mut out, &m.maxs);
            put_f32s(&mut out, &m.origin);
            out.extend_from_slice(&m.headnode.to_le_bytes());
            out.extend_from_slice(&m.firstface.to_le_bytes());
            out.extend_from_slice(&m.numfaces.to_le_bytes());
        }
        self.set_lump(LumpType::Models, 0, out)
    }

    pub fn nodes(&mut self, nodes: &[DNode]) -> &mut Self {
        let mut out = Vec::with_capacity(nodes.len() * 32);
        for n in nodes {
            out.extend_from_slice(&n.planenum.to_le_bytes());
            out.extend_from_slice(&n.children[0].to_le_bytes());
            out.extend_from_slice(&n.children[1].to_le_bytes());
            put_i16s(&mut out, &n.mins);
            put_i16s(&mut out, &n.maxs);
            out.extend_from_slice(&n.firstface.to_le_bytes());
            out.extend_from_slice(&n.numfaces.to_le_bytes());
            out.extend_from_slice(&n.area.to_le_bytes());
            out.extend_from_slice(&[0u8; 2]);
        }
        self.set_lump(LumpType::Nodes, 0, out)
    }

    /// Leaves in the 32-byte (lump version 1) layout.
    pub fn leafs(&mut self, leafs: &[DLeaf]) -> &mut Self {
        self.leafs_with_version(leafs, 1)
    }

    /// Leaves in either layout; version 0 appends a zeroed ambient cube.
    pub fn leafs_with_version(&mut self, leafs: &[DLeaf], version: i32) -> &mut Self {
        let mut out = Vec::new();
        for l in leafs {
            out.extend_from_slice(&(l.contents.bits() as i32).to_le_bytes());
            out.extend_from_slice(&l.cluster.to_le_bytes());
            let packed = (l.area & 0x1ff) | ((l.flags as u16 & 0x7f) << 9);
            out.extend_from_slice(&packed.to_le_bytes());
            put_i16s(&mut out, &l.mins);
            put_i16s(&mut out, &l.maxs);
            out.extend_from_slice(&l.firstleafface.to_le_bytes());
            out.extend_from_slice(&l.numleaffaces.to_le_bytes());
            out.extend_from_slice(&l.firstleafbrush.to_le_bytes());
            out.extend_from_slice(&l.numleafbrushes.to_le_bytes());
            out.extend_from_slice(&l.leaf_water_data_id.to_le_bytes());
            if version == 0 {
                out.extend_from_slice(&[0u8; 24]);
            }
            out.extend_from_slice(&[0u8; 2]);
        }
        self.set_lump(LumpType::Leafs, version, out)
    }

    pub fn leaf_faces(&mut self, leaf_faces: &[u16]) -> &mut Self {
        let out = leaf_faces.iter().flat_map(|s| s.to_le_bytes()).collect();
        self.set_lump(LumpType::LeafFaces, 0, out)
    }

    pub fn disp_infos(&mut self, infos: &[DDispInfo]) -> &mut Self {
        let mut out = Vec::with_capacity(infos.len() * 176);
        for d in infos {
            let start = out.len();
            put_f32s(&mut out, &d.start_position);
            out.extend_from_slice(&d.disp_vert_start.to_le_bytes());
            out.extend_from_slice(&d.disp_tri_start.to_le_bytes());
            out.extend_from_slice(&d.power.to_le_bytes());
            out.extend_from_slice(&d.min_tess.to_le_bytes());
            put_f32s(&mut out, &[d.smoothing_angle]);
            out.extend_from_slice(&d.contents.to_le_bytes());
            out.extend_from_slice(&(d.map_face as u16).to_le_bytes());
            out.extend_from_slice(&[0u8; 2]);
            out.extend_from_slice(&d.lightmap_alpha_start.to_le_bytes());
            out.extend_from_slice(&d.lightmap_sample_position_start.to_le_bytes());
            // neighbour tables and allowed verts
            out.resize(start + 176, 0);
        }
        self.set_lump(LumpType::DispInfo, 0, out)
    }

    pub fn disp_verts(&mut self, verts: &[DDispVert]) -> &mut Self {
        let mut out = Vec::with_capacity(verts.len() * 20);
        for v in verts {
            put_f32s(&mut out, &v.vec);
            put_f32s(&mut out, &[v.dist, v.alpha]);
        }
        self.set_lump(LumpType::DispVerts, 0, out)
    }

    pub fn disp_tris(&mut self, tags: &[DispTriTags]) -> &mut Self {
        let out = tags.iter().flat_map(|t| t.bits().to_le_bytes()).collect();
        self.set_lump(LumpType::DispTris, 0, out)
    }

    pub fn entities(&mut self, text: &str) -> &mut Self {
        let mut out = text.as_bytes().to_vec();
        out.push(0);
        self.set_lump(LumpType::Entities, 0, out)
    }

    /// Visibility lump from uncompressed `[pvs, phs]` rows, one per cluster.
    pub fn visibility(&mut self, rows: &[(Vec<u8>, Vec<u8>)]) -> &mut Self {
        let numclusters = rows.len();
        let mut streams = Vec::new();
        let mut bitofs = Vec::with_capacity(numclusters);
        let table = 4 + numclusters * 8;
        for (pvs, phs) in rows {
            let pvs_ofs = table + streams.len();
            streams.extend(compress_vis(pvs));
            let phs_ofs = table + streams.len();
            streams.extend(compress_vis(phs));
            bitofs.push([pvs_ofs as i32, phs_ofs as i32]);
        }

        let mut out = Vec::with_capacity(table + streams.len());
        out.extend_from_slice(&(numclusters as i32).to_le_bytes());
        for [pvs, phs] in bitofs {
            out.extend_from_slice(&pvs.to_le_bytes());
            out.extend_from_slice(&phs.to_le_bytes());
        }
        out.extend(streams);
        self.set_lump(LumpType::Visibility, 0, out)
    }

    /// Serialize header and lumps.
    pub fn finish(&self) -> Vec<u8> {
        let mut out = vec![0u8; HEADER_SIZE];
        out[0..4].copy_from_slice(&IDBSPHEADER.to_le_bytes());
        out[4..8].copy_from_slice(&self.version.to_le_bytes());

        for (index, (version, data)) in self.lumps.iter().enumerate() {
            let base = 8 + index * LUMP_DESCRIPTOR_SIZE;
            let offset = if data.is_empty() { 0 } else { out.len() };
            out[base..base + 4].copy_from_slice(&(offset as i32).to_le_bytes());
            out[base + 4..base + 8].copy_from_slice(&(data.len() as i32).to_le_bytes());
            out[base + 8..base + 12].copy_from_slice(&version.to_le_bytes());
            out.extend_from_slice(data);
            while out.len() % 4 != 0 {
                out.push(0);
            }
        }

        let rev = 8 + HEADER_LUMPS * LUMP_DESCRIPTOR_SIZE;
        out[rev..rev + 4].copy_from_slice(&self.revision.to_le_bytes());
        out
    }
}

/// Run-length encode one visibility row: zero bytes become `0, count`.
pub fn compress_vis(row: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(row.len());
    let mut i = 0;
    while i < row.len() {
        out.push(row[i]);
        if row[i] != 0 {
            i += 1;
            continue;
        }
        let mut rep = 1;
        while i + rep < row.len() && row[i + rep] == 0 && rep < 255 {
            rep += 1;
        }
        out.push(rep as u8);
        i += rep;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compress_zero_runs() {
        assert_eq!(compress_vis(&[0, 0, 0]), vec![0, 3]);
        assert_eq!(compress_vis(&[0xff, 0, 0, 0x01]), vec![0xff, 0, 2, 0x01]);
        assert_eq!(compress_vis(&[]), Vec::<u8>::new());
    }

    #[test]
    fn compress_long_run_splits() {
        let row = vec![0u8; 300];
        assert_eq!(compress_vis(&row), vec![0, 255, 0, 45]);
    }

    #[test]
    fn finish_places_lumps_after_header() {
        let mut w = BspWriter::new();
        w.vertices(&[[1.0, 2.0, 3.0]]);
        let data = w.finish();
        assert_eq!(data.len(), HEADER_SIZE + 12);
        let base = 8 + LumpType::Vertices.index() * LUMP_DESCRIPTOR_SIZE;
        let ofs = i32::from_le_bytes(data[base..base + 4].try_into().unwrap());
        assert_eq!(ofs as usize, HEADER_SIZE);
    }
}
