// lumps.rs — per-lump record decoders
//
// Every lump in `LumpType::ALL` decodes independently of the others into one
// `DecodedLump` variant. A lump that cannot be decoded reads as empty and
// yields a `MalformedLump` for the load report.

use rayon::prelude::*;
use tracing::debug;

use crate::bspfile::{
    Contents, DDispInfo, DDispVert, DEdge, DFace, DLeaf, DModel, DNode, DPlane, DVertex, DVis,
    DispTriTags, LumpType, MAX_MAP_CLUSTERS,
};
use crate::directory::LumpDirectory;
use crate::error::{LumpFault, MalformedLump};
use crate::mathlib::Vec3;

// ============================================================
// Byte helpers
// ============================================================

#[inline]
pub(crate) fn read_i32_le(data: &[u8], offset: usize) -> i32 {
    i32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

#[inline]
pub(crate) fn read_u32_le(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

#[inline]
pub(crate) fn read_u16_le(data: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([data[offset], data[offset + 1]])
}

#[inline]
pub(crate) fn read_i16_le(data: &[u8], offset: usize) -> i16 {
    i16::from_le_bytes([data[offset], data[offset + 1]])
}

#[inline]
pub(crate) fn read_f32_le(data: &[u8], offset: usize) -> f32 {
    f32::from_bits(read_u32_le(data, offset))
}

fn read_vec3_le(data: &[u8], offset: usize) -> Vec3 {
    [
        read_f32_le(data, offset),
        read_f32_le(data, offset + 4),
        read_f32_le(data, offset + 8),
    ]
}

fn read_short3_le(data: &[u8], offset: usize) -> [i16; 3] {
    [
        read_i16_le(data, offset),
        read_i16_le(data, offset + 2),
        read_i16_le(data, offset + 4),
    ]
}

// ============================================================
// Settings
// ============================================================

/// Below this record count, sequential decoding is faster.
pub const PARALLEL_LUMP_THRESHOLD: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeSettings {
    /// Decode independent lumps on the rayon pool.
    pub parallel: bool,
    /// Record count at which one lump's records are decoded in parallel.
    pub parallel_threshold: usize,
}

impl Default for DecodeSettings {
    fn default() -> Self {
        Self {
            parallel: true,
            parallel_threshold: PARALLEL_LUMP_THRESHOLD,
        }
    }
}

// ============================================================
// Fixed-width records
// ============================================================

/// A fixed-width on-disk record.
pub trait LumpRecord: Sized + Send {
    /// Record width in bytes for the given lump version.
    fn width(lump_version: i32) -> usize;

    /// Decode one record at `base`. The caller guarantees `width` bytes.
    fn read(data: &[u8], base: usize, lump_version: i32) -> Self;
}

impl LumpRecord for DVertex {
    fn width(_: i32) -> usize {
        12
    }

    fn read(data: &[u8], base: usize, _: i32) -> Self {
        DVertex {
            point: read_vec3_le(data, base),
        }
    }
}

impl LumpRecord for DPlane {
    fn width(_: i32) -> usize {
        20
    }

    fn read(data: &[u8], base: usize, _: i32) -> Self {
        DPlane {
            normal: read_vec3_le(data, base),
            dist: read_f32_le(data, base + 12),
            plane_type: read_i32_le(data, base + 16),
        }
    }
}

impl LumpRecord for DEdge {
    fn width(_: i32) -> usize {
        4
    }

    fn read(data: &[u8], base: usize, _: i32) -> Self {
        DEdge {
            v: [read_u16_le(data, base), read_u16_le(data, base + 2)],
        }
    }
}

/// Surfedges.
impl LumpRecord for i32 {
    fn width(_: i32) -> usize {
        4
    }

    fn read(data: &[u8], base: usize, _: i32) -> Self {
        read_i32_le(data, base)
    }
}

/// Leaf faces.
impl LumpRecord for u16 {
    fn width(_: i32) -> usize {
        2
    }

    fn read(data: &[u8], base: usize, _: i32) -> Self {
        read_u16_le(data, base)
    }
}

impl LumpRecord for DFace {
    fn width(_: i32) -> usize {
        56
    }

    fn read(data: &[u8], base: usize, _: i32) -> Self {
        let mut styles = [0u8; 4];
        styles.copy_from_slice(&data[base + 16..base + 20]);
        DFace {
            planenum: read_u16_le(data, base),
            side: data[base + 2],
            on_node: data[base + 3],
            firstedge: read_i32_le(data, base + 4),
            numedges: read_i16_le(data, base + 8),
            texinfo: read_i16_le(data, base + 10),
            dispinfo: read_i16_le(data, base + 12),
            surface_fog_volume_id: read_i16_le(data, base + 14),
            styles,
            lightofs: read_i32_le(data, base + 20),
            area: read_f32_le(data, base + 24),
            // 28..44: lightmap mins and size in luxels
            orig_face: read_i32_le(data, base + 44),
            // 48..52: primitive range
            smoothing_groups: read_u32_le(data, base + 52),
        }
    }
}

impl LumpRecord for DModel {
    fn width(_: i32) -> usize {
        48
    }

    fn read(data: &[u8], base: usize, _: i32) -> Self {
        DModel {
            mins: read_vec3_le(data, base),
            maxs: read_vec3_le(data, base + 12),
            origin: read_vec3_le(data, base + 24),
            headnode: read_i32_le(data, base + 36),
            firstface: read_i32_le(data, base + 40),
            numfaces: read_i32_le(data, base + 44),
        }
    }
}

impl LumpRecord for DNode {
    fn width(_: i32) -> usize {
        32
    }

    fn read(data: &[u8], base: usize, _: i32) -> Self {
        DNode {
            planenum: read_i32_le(data, base),
            children: [read_i32_le(data, base + 4), read_i32_le(data, base + 8)],
            mins: read_short3_le(data, base + 12),
            maxs: read_short3_le(data, base + 18),
            firstface: read_u16_le(data, base + 24),
            numfaces: read_u16_le(data, base + 26),
            area: read_i16_le(data, base + 28),
        }
    }
}

impl LumpRecord for DLeaf {
    /// Version 0 leaves carry an ambient light cube after the water id.
    fn width(lump_version: i32) -> usize {
        if lump_version == 0 {
            56
        } else {
            32
        }
    }

    fn read(data: &[u8], base: usize, _: i32) -> Self {
        let packed = read_u16_le(data, base + 6);
        DLeaf {
            contents: Contents::from_bits_retain(read_u32_le(data, base)),
            cluster: read_i16_le(data, base + 4),
            area: packed & 0x1ff,
            flags: (packed >> 9) as u8,
            mins: read_short3_le(data, base + 8),
            maxs: read_short3_le(data, base + 14),
            firstleafface: read_u16_le(data, base + 20),
            numleaffaces: read_u16_le(data, base + 22),
            firstleafbrush: read_u16_le(data, base + 24),
            numleafbrushes: read_u16_le(data, base + 26),
            leaf_water_data_id: read_i16_le(data, base + 28),
        }
    }
}

impl LumpRecord for DDispInfo {
    fn width(_: i32) -> usize {
        176
    }

    fn read(data: &[u8], base: usize, _: i32) -> Self {
        DDispInfo {
            start_position: read_vec3_le(data, base),
            disp_vert_start: read_i32_le(data, base + 12),
            disp_tri_start: read_i32_le(data, base + 16),
            power: read_i32_le(data, base + 20),
            min_tess: read_i32_le(data, base + 24),
            smoothing_angle: read_f32_le(data, base + 28),
            contents: read_i32_le(data, base + 32),
            map_face: read_u16_le(data, base + 36) as u32,
            lightmap_alpha_start: read_i32_le(data, base + 40),
            lightmap_sample_position_start: read_i32_le(data, base + 44),
        }
    }
}

impl LumpRecord for DDispVert {
    fn width(_: i32) -> usize {
        20
    }

    fn read(data: &[u8], base: usize, _: i32) -> Self {
        DDispVert {
            vec: read_vec3_le(data, base),
            dist: read_f32_le(data, base + 12),
            alpha: read_f32_le(data, base + 16),
        }
    }
}

impl LumpRecord for DispTriTags {
    fn width(_: i32) -> usize {
        2
    }

    fn read(data: &[u8], base: usize, _: i32) -> Self {
        DispTriTags::from_bits_retain(read_u16_le(data, base))
    }
}

/// Decode a lump as a packed array of `T`.
pub fn decode_records<T: LumpRecord>(
    lump: LumpType,
    data: &[u8],
    lump_version: i32,
    parallel_threshold: usize,
) -> Result<Vec<T>, MalformedLump> {
    let stride = T::width(lump_version);
    if !data.len().is_multiple_of(stride) {
        return Err(MalformedLump {
            lump,
            fault: LumpFault::Misaligned {
                length: data.len(),
                width: stride,
            },
        });
    }

    let count = data.len() / stride;
    let records = if count >= parallel_threshold {
        (0..count)
            .into_par_iter()
            .map(|i| T::read(data, i * stride, lump_version))
            .collect()
    } else {
        (0..count)
            .map(|i| T::read(data, i * stride, lump_version))
            .collect()
    };
    Ok(records)
}

// ============================================================
// Visibility and entities
// ============================================================

/// Visibility header plus the raw lump bytes its offsets point into.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VisibilityLump {
    pub header: DVis,
    pub data: Vec<u8>,
}

impl VisibilityLump {
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Decode the visibility header. The compressed rows stay in `data` and
/// are expanded later, one cluster at a time.
pub fn decode_visibility(data: &[u8]) -> Result<VisibilityLump, MalformedLump> {
    if data.is_empty() {
        return Ok(VisibilityLump::default());
    }

    let truncated = |clusters: i64| MalformedLump {
        lump: LumpType::Visibility,
        fault: LumpFault::TruncatedHeader {
            clusters,
            length: data.len(),
        },
    };

    if data.len() < 4 {
        return Err(truncated(0));
    }
    let numclusters = read_i32_le(data, 0);
    if numclusters as i64 > MAX_MAP_CLUSTERS as i64 {
        return Err(MalformedLump {
            lump: LumpType::Visibility,
            fault: LumpFault::TooManyClusters {
                clusters: numclusters as i64,
                max: MAX_MAP_CLUSTERS,
            },
        });
    }
    let table_end = 4 + numclusters as i64 * 8;
    if numclusters < 0 || table_end > data.len() as i64 {
        return Err(truncated(numclusters as i64));
    }

    let bitofs = (0..numclusters as usize)
        .map(|i| {
            let base = 4 + i * 8;
            [read_i32_le(data, base), read_i32_le(data, base + 4)]
        })
        .collect();

    Ok(VisibilityLump {
        header: DVis { numclusters, bitofs },
        data: data.to_vec(),
    })
}

/// Entity text, up to the terminating NUL.
pub fn decode_entities(data: &[u8]) -> String {
    let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    String::from_utf8_lossy(&data[..end]).into_owned()
}

// ============================================================
// Decode dispatch
// ============================================================

/// One decoded lump, tagged by its type.
#[derive(Debug, Clone)]
pub enum DecodedLump {
    Entities(String),
    Planes(Vec<DPlane>),
    Vertices(Vec<DVertex>),
    Visibility(VisibilityLump),
    Nodes(Vec<DNode>),
    Faces(Vec<DFace>),
    Leafs(Vec<DLeaf>),
    Edges(Vec<DEdge>),
    SurfEdges(Vec<i32>),
    Models(Vec<DModel>),
    LeafFaces(Vec<u16>),
    DispInfo(Vec<DDispInfo>),
    DispVerts(Vec<DDispVert>),
    DispTris(Vec<DispTriTags>),
}

impl DecodedLump {
    pub fn lump_type(&self) -> LumpType {
        match self {
            DecodedLump::Entities(_) => LumpType::Entities,
            DecodedLump::Planes(_) => LumpType::Planes,
            DecodedLump::Vertices(_) => LumpType::Vertices,
            DecodedLump::Visibility(_) => LumpType::Visibility,
            DecodedLump::Nodes(_) => LumpType::Nodes,
            DecodedLump::Faces(_) => LumpType::Faces,
            DecodedLump::Leafs(_) => LumpType::Leafs,
            DecodedLump::Edges(_) => LumpType::Edges,
            DecodedLump::SurfEdges(_) => LumpType::SurfEdges,
            DecodedLump::Models(_) => LumpType::Models,
            DecodedLump::LeafFaces(_) => LumpType::LeafFaces,
            DecodedLump::DispInfo(_) => LumpType::DispInfo,
            DecodedLump::DispVerts(_) => LumpType::DispVerts,
            DecodedLump::DispTris(_) => LumpType::DispTris,
        }
    }

    /// The empty value a failed decode stands in for.
    pub fn empty(lump: LumpType) -> DecodedLump {
        match lump {
            LumpType::Entities => DecodedLump::Entities(String::new()),
            LumpType::Planes => DecodedLump::Planes(Vec::new()),
            LumpType::Vertices => DecodedLump::Vertices(Vec::new()),
            LumpType::Visibility => DecodedLump::Visibility(VisibilityLump::default()),
            LumpType::Nodes => DecodedLump::Nodes(Vec::new()),
            LumpType::Faces => DecodedLump::Faces(Vec::new()),
            LumpType::Leafs => DecodedLump::Leafs(Vec::new()),
            LumpType::Edges => DecodedLump::Edges(Vec::new()),
            LumpType::SurfEdges => DecodedLump::SurfEdges(Vec::new()),
            LumpType::Models => DecodedLump::Models(Vec::new()),
            LumpType::LeafFaces => DecodedLump::LeafFaces(Vec::new()),
            LumpType::DispInfo => DecodedLump::DispInfo(Vec::new()),
            LumpType::DispVerts => DecodedLump::DispVerts(Vec::new()),
            LumpType::DispTris => DecodedLump::DispTris(Vec::new()),
        }
    }
}

/// Decode one lump from the directory.
pub fn decode_lump(
    dir: &LumpDirectory<'_>,
    lump: LumpType,
    settings: &DecodeSettings,
) -> Result<DecodedLump, MalformedLump> {
    let desc = dir.descriptor(lump);
    if desc.is_compressed() {
        return Err(MalformedLump {
            lump,
            fault: LumpFault::Compressed {
                uncompressed: desc.uncompressed_size(),
            },
        });
    }

    let data = dir.raw_bytes(lump);
    let version = desc.version;
    let threshold = settings.parallel_threshold;

    Ok(match lump {
        LumpType::Entities => DecodedLump::Entities(decode_entities(data)),
        LumpType::Planes => DecodedLump::Planes(decode_records(lump, data, version, threshold)?),
        LumpType::Vertices => {
            DecodedLump::Vertices(decode_records(lump, data, version, threshold)?)
        }
        LumpType::Visibility => DecodedLump::Visibility(decode_visibility(data)?),
        LumpType::Nodes => DecodedLump::Nodes(decode_records(lump, data, version, threshold)?),
        LumpType::Faces => DecodedLump::Faces(decode_records(lump, data, version, threshold)?),
        LumpType::Leafs => DecodedLump::Leafs(decode_records(lump, data, version, threshold)?),
        LumpType::Edges => DecodedLump::Edges(decode_records(lump, data, version, threshold)?),
        LumpType::SurfEdges => {
            DecodedLump::SurfEdges(decode_records(lump, data, version, threshold)?)
        }
        LumpType::Models => DecodedLump::Models(decode_records(lump, data, version, threshold)?),
        LumpType::LeafFaces => {
            DecodedLump::LeafFaces(decode_records(lump, data, version, threshold)?)
        }
        LumpType::DispInfo => {
            DecodedLump::DispInfo(decode_records(lump, data, version, threshold)?)
        }
        LumpType::DispVerts => {
            DecodedLump::DispVerts(decode_records(lump, data, version, threshold)?)
        }
        LumpType::DispTris => {
            DecodedLump::DispTris(decode_records(lump, data, version, threshold)?)
        }
    })
}

/// Every consumed lump, decoded. Failed lumps are empty.
#[derive(Debug, Clone, Default)]
pub struct Lumps {
    pub entities: String,
    pub planes: Vec<DPlane>,
    pub vertices: Vec<DVertex>,
    pub visibility: VisibilityLump,
    pub nodes: Vec<DNode>,
    pub faces: Vec<DFace>,
    pub leafs: Vec<DLeaf>,
    pub edges: Vec<DEdge>,
    pub surfedges: Vec<i32>,
    pub models: Vec<DModel>,
    pub leaf_faces: Vec<u16>,
    pub disp_infos: Vec<DDispInfo>,
    pub disp_verts: Vec<DDispVert>,
    pub disp_tris: Vec<DispTriTags>,
}

impl Lumps {
    /// Decode all lumps. Failures come back in lump-table order regardless
    /// of how the work was scheduled.
    pub fn decode(dir: &LumpDirectory<'_>, settings: &DecodeSettings) -> (Lumps, Vec<MalformedLump>) {
        let results: Vec<Result<DecodedLump, MalformedLump>> = if settings.parallel {
            LumpType::ALL
                .par_iter()
                .map(|&lump| decode_lump(dir, lump, settings))
                .collect()
        } else {
            LumpType::ALL
                .iter()
                .map(|&lump| decode_lump(dir, lump, settings))
                .collect()
        };

        let mut lumps = Lumps::default();
        let mut errors = Vec::new();
        for (lump, result) in LumpType::ALL.iter().zip(results) {
            let decoded = match result {
                Ok(decoded) => decoded,
                Err(err) => {
                    errors.push(err);
                    DecodedLump::empty(*lump)
                }
            };
            lumps.store(decoded);
        }

        debug!(
            vertices = lumps.vertices.len(),
            faces = lumps.faces.len(),
            leafs = lumps.leafs.len(),
            disp_infos = lumps.disp_infos.len(),
            malformed = errors.len(),
            "decoded lumps"
        );
        (lumps, errors)
    }

    fn store(&mut self, decoded: DecodedLump) {
        match decoded {
            DecodedLump::Entities(v) => self.entities = v,
            DecodedLump::Planes(v) => self.planes = v,
            DecodedLump::Vertices(v) => self.vertices = v,
            DecodedLump::Visibility(v) => self.visibility = v,
            DecodedLump::Nodes(v) => self.nodes = v,
            DecodedLump::Faces(v) => self.faces = v,
            DecodedLump::Leafs(v) => self.leafs = v,
            DecodedLump::Edges(v) => self.edges = v,
            DecodedLump::SurfEdges(v) => self.surfedges = v,
            DecodedLump::Models(v) => self.models = v,
            DecodedLump::LeafFaces(v) => self.leaf_faces = v,
            DecodedLump::DispInfo(v) => self.disp_infos = v,
            DecodedLump::DispVerts(v) => self.disp_verts = v,
            DecodedLump::DispTris(v) => self.disp_tris = v,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bspfile::LUMP_DESCRIPTOR_SIZE;
    use crate::bspwrite::BspWriter;

    #[test]
    fn decode_vertices() {
        let mut w = BspWriter::new();
        w.vertices(&[[1.0, 2.0, 3.0], [-4.0, 5.5, 0.0]]);
        let data = w.finish();
        let dir = LumpDirectory::open(&data).unwrap();
        let lumps = decode_lump(&dir, LumpType::Vertices, &DecodeSettings::default()).unwrap();
        match lumps {
            DecodedLump::Vertices(v) => {
                assert_eq!(v.len(), 2);
                assert_eq!(v[1].point, [-4.0, 5.5, 0.0]);
            }
            other => panic!("unexpected {:?}", other.lump_type()),
        }
    }

    #[test]
    fn misaligned_lump_is_malformed() {
        let err = decode_records::<DVertex>(LumpType::Vertices, &[0u8; 13], 0, 64).unwrap_err();
        assert_eq!(err.lump, LumpType::Vertices);
        assert_eq!(err.fault, LumpFault::Misaligned { length: 13, width: 12 });
    }

    #[test]
    fn empty_lump_decodes_to_nothing() {
        let v = decode_records::<DEdge>(LumpType::Edges, &[], 0, 64).unwrap();
        assert!(v.is_empty());
    }

    #[test]
    fn parallel_and_sequential_agree() {
        let edges: Vec<DEdge> = (0..200u16).map(|i| DEdge { v: [i, i + 1] }).collect();
        let mut w = BspWriter::new();
        w.edges(&edges);
        let data = w.finish();
        let dir = LumpDirectory::open(&data).unwrap();
        let raw = dir.raw_bytes(LumpType::Edges);
        let seq = decode_records::<DEdge>(LumpType::Edges, raw, 0, usize::MAX).unwrap();
        let par = decode_records::<DEdge>(LumpType::Edges, raw, 0, 1).unwrap();
        assert_eq!(seq, par);
        assert_eq!(seq, edges);
    }

    #[test]
    fn face_fields() {
        let face = DFace {
            planenum: 7,
            side: 1,
            firstedge: 12,
            numedges: 4,
            texinfo: 3,
            dispinfo: 2,
            area: 64.0,
            smoothing_groups: 0x8000_0001,
            ..Default::default()
        };
        let mut w = BspWriter::new();
        w.faces(&[face]);
        let data = w.finish();
        let dir = LumpDirectory::open(&data).unwrap();
        let faces =
            decode_records::<DFace>(LumpType::Faces, dir.raw_bytes(LumpType::Faces), 0, 64).unwrap();
        assert_eq!(faces, vec![face]);
        assert_eq!(faces[0].disp_info(), Some(2));
    }

    #[test]
    fn leaf_versions() {
        let leaf = DLeaf {
            contents: Contents::SOLID | Contents::WINDOW,
            cluster: 5,
            area: 300,
            flags: 0x41,
            mins: [-16, -16, 0],
            maxs: [16, 16, 64],
            firstleafface: 2,
            numleaffaces: 3,
            leaf_water_data_id: -1,
            ..Default::default()
        };
        for version in [0, 1] {
            let mut w = BspWriter::new();
            w.leafs_with_version(&[leaf, leaf], version);
            let data = w.finish();
            let dir = LumpDirectory::open(&data).unwrap();
            let raw = dir.raw_bytes(LumpType::Leafs);
            assert_eq!(raw.len(), 2 * DLeaf::width(version));
            let leafs = decode_records::<DLeaf>(LumpType::Leafs, raw, version, 64).unwrap();
            assert_eq!(leafs, vec![leaf, leaf]);
        }
    }

    #[test]
    fn disp_info_map_face_widened() {
        let info = DDispInfo {
            start_position: [1.0, 2.0, 3.0],
            disp_vert_start: 9,
            disp_tri_start: 8,
            power: 1,
            map_face: 0xfffe,
            ..Default::default()
        };
        let mut w = BspWriter::new();
        w.disp_infos(&[info]);
        let data = w.finish();
        let dir = LumpDirectory::open(&data).unwrap();
        let raw = dir.raw_bytes(LumpType::DispInfo);
        assert_eq!(raw.len(), 176);
        let infos = decode_records::<DDispInfo>(LumpType::DispInfo, raw, 0, 64).unwrap();
        assert_eq!(infos[0].map_face, 65534);
        assert_eq!(infos[0], info);
    }

    #[test]
    fn visibility_header() {
        let mut w = BspWriter::new();
        w.visibility(&[(vec![0x01], vec![0x03]), (vec![0x02], vec![0x03])]);
        let data = w.finish();
        let dir = LumpDirectory::open(&data).unwrap();
        let vis = decode_visibility(dir.raw_bytes(LumpType::Visibility)).unwrap();
        assert_eq!(vis.header.numclusters, 2);
        assert_eq!(vis.header.bitofs[0], [20, 21]);
        assert_eq!(vis.data[20], 0x01);
    }

    #[test]
    fn visibility_table_larger_than_lump() {
        let mut raw = 100i32.to_le_bytes().to_vec();
        raw.extend_from_slice(&[0u8; 16]);
        let err = decode_visibility(&raw).unwrap_err();
        assert_eq!(
            err.fault,
            LumpFault::TruncatedHeader {
                clusters: 100,
                length: 20
            }
        );
        assert!(decode_visibility(&[]).unwrap().is_empty());
    }

    #[test]
    fn visibility_cluster_limit() {
        // a full-size table so only the count itself is at fault
        let clusters = MAX_MAP_CLUSTERS + 1;
        let mut raw = (clusters as i32).to_le_bytes().to_vec();
        raw.resize(4 + clusters * 8, 0);
        let err = decode_visibility(&raw).unwrap_err();
        assert_eq!(err.lump, LumpType::Visibility);
        assert_eq!(
            err.fault,
            LumpFault::TooManyClusters {
                clusters: clusters as i64,
                max: MAX_MAP_CLUSTERS
            }
        );

        let mut raw = (MAX_MAP_CLUSTERS as i32).to_le_bytes().to_vec();
        raw.resize(4 + MAX_MAP_CLUSTERS * 8, 0);
        let vis = decode_visibility(&raw).unwrap();
        assert_eq!(vis.header.bitofs.len(), MAX_MAP_CLUSTERS);
    }

    #[test]
    fn entities_stop_at_nul() {
        assert_eq!(decode_entities(b"{ }\0garbage"), "{ }");
        assert_eq!(decode_entities(b"{ }"), "{ }");
    }

    #[test]
    fn compressed_lump_is_malformed() {
        let mut w = BspWriter::new();
        w.vertices(&[[0.0; 3]]);
        let mut data = w.finish();
        let base = 8 + LumpType::Vertices.index() * LUMP_DESCRIPTOR_SIZE;
        data[base + 12..base + 16].copy_from_slice(&4096u32.to_le_bytes());
        let dir = LumpDirectory::open(&data).unwrap();
        let err = decode_lump(&dir, LumpType::Vertices, &DecodeSettings::default()).unwrap_err();
        assert_eq!(err.fault, LumpFault::Compressed { uncompressed: 4096 });
    }

    #[test]
    fn one_bad_lump_leaves_others_intact() {
        let mut w = BspWriter::new();
        w.set_lump(LumpType::Vertices, 0, vec![0u8; 25]);
        w.edges(&[DEdge { v: [0, 1] }]);
        w.surfedges(&[0, -1]);
        let data = w.finish();
        let dir = LumpDirectory::open(&data).unwrap();
        for parallel in [false, true] {
            let settings = DecodeSettings {
                parallel,
                ..Default::default()
            };
            let (lumps, errors) = Lumps::decode(&dir, &settings);
            assert!(lumps.vertices.is_empty());
            assert_eq!(errors.len(), 1);
            assert_eq!(errors[0].lump, LumpType::Vertices);
            assert_eq!(lumps.edges.len(), 1);
            assert_eq!(lumps.surfedges, vec![0, -1]);
        }
    }
}
