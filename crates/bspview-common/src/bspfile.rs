// bspfile.rs — VBSP file format structures
//
// d* structures are decoded on-disk records. Field order follows the file;
// padding and fields nothing downstream reads are skipped by the decoders.

use bitflags::bitflags;

use crate::mathlib::Vec3;

// ============================================================
// Header
// ============================================================

/// BSP magic: "VBSP" in little-endian
pub const IDBSPHEADER: i32 =
    (b'P' as i32) << 24 | (b'S' as i32) << 16 | (b'B' as i32) << 8 | b'V' as i32;

/// Oldest and newest header versions whose record layouts this loader reads.
pub const BSPVERSION_MIN: i32 = 19;
pub const BSPVERSION_MAX: i32 = 21;

pub const HEADER_LUMPS: usize = 64;

/// fileofs(4) + filelen(4) + version(4) + fourCC(4)
pub const LUMP_DESCRIPTOR_SIZE: usize = 16;

/// ident(4) + version(4) + lumps + mapRevision(4)
pub const HEADER_SIZE: usize = 8 + HEADER_LUMPS * LUMP_DESCRIPTOR_SIZE + 4;

// ============================================================
// Lump indices
// ============================================================

/// Lumps this loader consumes, keyed by their slot in the header's
/// descriptor table. Slots not listed here are carried by the directory
/// but never decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum LumpType {
    Entities = 0,
    Planes = 1,
    Vertices = 3,
    Visibility = 4,
    Nodes = 5,
    Faces = 7,
    Leafs = 10,
    Edges = 12,
    SurfEdges = 13,
    Models = 14,
    LeafFaces = 16,
    DispInfo = 26,
    DispVerts = 33,
    DispTris = 48,
}

impl LumpType {
    pub const ALL: [LumpType; 14] = [
        LumpType::Entities,
        LumpType::Planes,
        LumpType::Vertices,
        LumpType::Visibility,
        LumpType::Nodes,
        LumpType::Faces,
        LumpType::Leafs,
        LumpType::Edges,
        LumpType::SurfEdges,
        LumpType::Models,
        LumpType::LeafFaces,
        LumpType::DispInfo,
        LumpType::DispVerts,
        LumpType::DispTris,
    ];

    /// Slot in the header's descriptor table.
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<LumpType> {
        Self::ALL.iter().copied().find(|l| l.index() == index)
    }

    pub fn name(self) -> &'static str {
        match self {
            LumpType::Entities => "entities",
            LumpType::Planes => "planes",
            LumpType::Vertices => "vertexes",
            LumpType::Visibility => "visibility",
            LumpType::Nodes => "nodes",
            LumpType::Faces => "faces",
            LumpType::Leafs => "leafs",
            LumpType::Edges => "edges",
            LumpType::SurfEdges => "surfedges",
            LumpType::Models => "models",
            LumpType::LeafFaces => "leaffaces",
            LumpType::DispInfo => "dispinfo",
            LumpType::DispVerts => "dispverts",
            LumpType::DispTris => "disptris",
        }
    }
}

impl std::fmt::Display for LumpType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================
// Geometry records
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DVertex {
    pub point: Vec3,
}

// Plane types
pub const PLANE_X: i32 = 0;
pub const PLANE_Y: i32 = 1;
pub const PLANE_Z: i32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DPlane {
    pub normal: Vec3,
    pub dist: f32,
    pub plane_type: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DEdge {
    pub v: [u16; 2],
}

/// Face record. `dispinfo` is -1 when the face carries no displacement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DFace {
    pub planenum: u16,
    pub side: u8,
    pub on_node: u8,
    pub firstedge: i32,
    pub numedges: i16,
    pub texinfo: i16,
    pub dispinfo: i16,
    pub surface_fog_volume_id: i16,
    pub styles: [u8; 4],
    pub lightofs: i32,
    pub area: f32,
    pub orig_face: i32,
    pub smoothing_groups: u32,
}

impl Default for DFace {
    fn default() -> Self {
        Self {
            planenum: 0,
            side: 0,
            on_node: 0,
            firstedge: 0,
            numedges: 0,
            texinfo: -1,
            dispinfo: -1,
            surface_fog_volume_id: -1,
            styles: [0xff; 4],
            lightofs: -1,
            area: 0.0,
            orig_face: -1,
            smoothing_groups: 0,
        }
    }
}

impl DFace {
    #[inline]
    pub fn disp_info(&self) -> Option<usize> {
        if self.dispinfo < 0 {
            None
        } else {
            Some(self.dispinfo as usize)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DModel {
    pub mins: Vec3,
    pub maxs: Vec3,
    pub origin: Vec3,
    pub headnode: i32,
    pub firstface: i32,
    pub numfaces: i32,
}

/// Node record. Negative children are `-(leaf + 1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DNode {
    pub planenum: i32,
    pub children: [i32; 2],
    pub mins: [i16; 3],
    pub maxs: [i16; 3],
    pub firstface: u16,
    pub numfaces: u16,
    pub area: i16,
}

bitflags! {
    /// Leaf content flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Contents: u32 {
        const SOLID = 0x1;
        const WINDOW = 0x2;
        const AUX = 0x4;
        const GRATE = 0x8;
        const SLIME = 0x10;
        const WATER = 0x20;
        const BLOCKLOS = 0x40;
        const OPAQUE = 0x80;
        const TESTFOGVOLUME = 0x100;
        const MOVEABLE = 0x4000;
        const AREAPORTAL = 0x8000;
        const PLAYERCLIP = 0x1_0000;
        const MONSTERCLIP = 0x2_0000;
        const ORIGIN = 0x100_0000;
        const MONSTER = 0x200_0000;
        const DEBRIS = 0x400_0000;
        const DETAIL = 0x800_0000;
        const TRANSLUCENT = 0x1000_0000;
        const LADDER = 0x2000_0000;
        const HITBOX = 0x4000_0000;
    }
}

/// Cluster id of leaves outside the world.
pub const CLUSTER_NONE: i16 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DLeaf {
    pub contents: Contents,
    pub cluster: i16,
    /// Low 9 bits of the packed area/flags field.
    pub area: u16,
    /// High 7 bits of the packed area/flags field.
    pub flags: u8,
    pub mins: [i16; 3],
    pub maxs: [i16; 3],
    pub firstleafface: u16,
    pub numleaffaces: u16,
    pub firstleafbrush: u16,
    pub numleafbrushes: u16,
    pub leaf_water_data_id: i16,
}

impl DLeaf {
    #[inline]
    pub fn cluster(&self) -> Option<usize> {
        if self.cluster < 0 {
            None
        } else {
            Some(self.cluster as usize)
        }
    }
}

// ============================================================
// Displacements
// ============================================================

pub const MIN_DISP_POWER: i32 = 0;
pub const MAX_DISP_POWER: i32 = 4;

/// Displacement info. Neighbour tables and allowed-vert masks follow
/// `lightmap_sample_position_start` on disk; the loader skips them.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DDispInfo {
    pub start_position: Vec3,
    pub disp_vert_start: i32,
    pub disp_tri_start: i32,
    pub power: i32,
    pub min_tess: i32,
    pub smoothing_angle: f32,
    pub contents: i32,
    /// Owner face. 16 bits on disk.
    pub map_face: u32,
    pub lightmap_alpha_start: i32,
    pub lightmap_sample_position_start: i32,
}

impl DDispInfo {
    #[inline]
    pub fn power_is_valid(&self) -> bool {
        (MIN_DISP_POWER..=MAX_DISP_POWER).contains(&self.power)
    }

    /// Nodes along one grid edge: 2^power + 1.
    pub fn side(&self) -> Option<usize> {
        if self.power_is_valid() {
            Some((1usize << self.power) + 1)
        } else {
            None
        }
    }

    pub fn vert_count(&self) -> Option<usize> {
        self.side().map(|s| s * s)
    }

    pub fn tri_count(&self) -> Option<usize> {
        self.side().map(|s| 2 * (s - 1) * (s - 1))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DDispVert {
    pub vec: Vec3,
    pub dist: f32,
    pub alpha: f32,
}

bitflags! {
    /// Per-triangle displacement tags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DispTriTags: u16 {
        const SURFACE = 0x1;
        const WALKABLE = 0x2;
        const BUILDABLE = 0x4;
        const SURFPROP1 = 0x8;
        const SURFPROP2 = 0x10;
    }
}

// ============================================================
// Visibility
// ============================================================

pub const DVIS_PVS: usize = 0;
pub const DVIS_PHS: usize = 1;

/// Largest cluster count a visibility header may declare.
pub const MAX_MAP_CLUSTERS: usize = 65536;

/// Decoded visibility header: cluster count and the per-cluster
/// `[pvs, phs]` byte offsets, relative to the lump start.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DVis {
    pub numclusters: i32,
    pub bitofs: Vec<[i32; 2]>,
}

/// Bytes needed for one decompressed cluster row.
#[inline]
pub fn vis_row_bytes(numclusters: usize) -> usize {
    (numclusters + 7) >> 3
}

// =============================================================================
// Tests
// =============================================================================
