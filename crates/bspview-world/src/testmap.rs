// testmap.rs — synthetic maps shared by the tests

use bspview_common::bspfile::{
    Contents, DDispInfo, DDispVert, DEdge, DFace, DLeaf, DModel, DNode, DPlane, DispTriTags,
    PLANE_X, PLANE_Z,
};
use bspview_common::bspwrite::BspWriter;
use bspview_common::mathlib::Vec3;

pub(crate) const FLOOR_PLANE: DPlane = DPlane {
    normal: [0.0, 0.0, 1.0],
    dist: 0.0,
    plane_type: PLANE_Z,
};

pub(crate) const SPLIT_PLANE: DPlane = DPlane {
    normal: [1.0, 0.0, 0.0],
    dist: 0.0,
    plane_type: PLANE_X,
};

fn quad_face(firstedge: i32) -> DFace {
    DFace {
        planenum: 0,
        firstedge,
        numedges: 4,
        ..Default::default()
    }
}

fn leaf(cluster: i16, firstleafface: u16, numleaffaces: u16, mins: [i16; 3], maxs: [i16; 3]) -> DLeaf {
    DLeaf {
        contents: if cluster < 0 {
            Contents::SOLID
        } else {
            Contents::empty()
        },
        cluster,
        mins,
        maxs,
        firstleafface,
        numleaffaces,
        leaf_water_data_id: -1,
        ..Default::default()
    }
}

/// One 64x64 floor quad in one cluster, no visibility lump.
pub(crate) fn quad_map() -> BspWriter {
    let mut w = BspWriter::new();
    w.vertices(&[
        [0.0, 0.0, 0.0],
        [64.0, 0.0, 0.0],
        [64.0, 64.0, 0.0],
        [0.0, 64.0, 0.0],
    ])
    .edges(&[
        DEdge { v: [0, 0] },
        DEdge { v: [0, 1] },
        DEdge { v: [2, 1] },
        DEdge { v: [2, 3] },
        DEdge { v: [3, 0] },
    ])
    .surfedges(&[1, -2, 3, 4])
    .planes(&[FLOOR_PLANE])
    .faces(&[quad_face(0)])
    .leafs(&[
        leaf(-1, 0, 0, [0; 3], [0; 3]),
        leaf(0, 0, 1, [0, 0, 0], [64, 64, 64]),
    ])
    .leaf_faces(&[0])
    .models(&[DModel {
        mins: [0.0; 3],
        maxs: [64.0, 64.0, 64.0],
        headnode: 0,
        firstface: 0,
        numfaces: 1,
        ..Default::default()
    }])
    .entities("{\n\"classname\" \"worldspawn\"\n}\n");
    w
}

/// `quad_map` with a displacement of the given power on face 0, lifted
/// `height` units along +z.
pub(crate) fn displacement_map(power: i32, height: f32) -> BspWriter {
    let side = (1usize << power) + 1;
    let mut w = quad_map();
    let mut face = quad_face(0);
    face.dispinfo = 0;
    w.faces(&[face])
        .disp_infos(&[DDispInfo {
            start_position: [0.0, 0.0, 0.0],
            power,
            map_face: 0,
            ..Default::default()
        }])
        .disp_verts(&vec![
            DDispVert {
                vec: [0.0, 0.0, 1.0],
                dist: height,
                alpha: 0.0,
            };
            side * side
        ])
        .disp_tris(&vec![DispTriTags::SURFACE; 2 * (side - 1) * (side - 1)]);
    w
}

/// Two floor quads split at x = 0, each in its own cluster.
///
/// Leaf 1 (cluster 0, x >= 0) holds face 0; leaf 2 (cluster 1, x < 0) holds
/// face 1. Cluster 0 sees only itself; cluster 1 sees both.
pub(crate) fn two_room_map() -> BspWriter {
    let verts: [Vec3; 8] = [
        [0.0, 0.0, 0.0],
        [64.0, 0.0, 0.0],
        [64.0, 64.0, 0.0],
        [0.0, 64.0, 0.0],
        [-64.0, 0.0, 0.0],
        [0.0, 0.0, 0.0],
        [0.0, 64.0, 0.0],
        [-64.0, 64.0, 0.0],
    ];
    let mut w = BspWriter::new();
    w.vertices(&verts)
        .edges(&[
            DEdge { v: [0, 0] },
            DEdge { v: [0, 1] },
            DEdge { v: [1, 2] },
            DEdge { v: [2, 3] },
            DEdge { v: [3, 0] },
            DEdge { v: [4, 5] },
            DEdge { v: [6, 5] },
            DEdge { v: [6, 7] },
            DEdge { v: [7, 4] },
        ])
        .surfedges(&[1, 2, 3, 4, 5, -6, 7, 8])
        .planes(&[FLOOR_PLANE, SPLIT_PLANE])
        .faces(&[quad_face(0), quad_face(4)])
        .nodes(&[DNode {
            planenum: 1,
            children: [-2, -3],
            mins: [-64, 0, 0],
            maxs: [64, 64, 64],
            firstface: 0,
            numfaces: 2,
            area: 0,
        }])
        .leafs(&[
            leaf(-1, 0, 0, [0; 3], [0; 3]),
            leaf(0, 0, 1, [0, 0, 0], [64, 64, 64]),
            leaf(1, 1, 1, [-64, 0, 0], [0, 64, 64]),
        ])
        .leaf_faces(&[0, 1])
        .models(&[DModel {
            mins: [-64.0, 0.0, 0.0],
            maxs: [64.0, 64.0, 64.0],
            headnode: 0,
            firstface: 0,
            numfaces: 2,
            ..Default::default()
        }])
        .visibility(&[
            (vec![0b01], vec![0b01]),
            (vec![0b11], vec![0b11]),
        ])
        .entities(
            r#"{
"classname" "worldspawn"
}
{
"classname" "info_player_start"
"origin" "32 32 16"
}
{
"classname" "light"
"origin" "-32 32 48"
}
{
"classname" "light"
"origin" "32 32 48"
}
"#,
        );
    w
}
