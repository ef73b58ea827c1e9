// vis.rs — PVS / PHS decompression and cluster visibility queries
//
// Each cluster owns two run-length coded rows of `(numclusters + 7) / 8`
// bytes. A non-zero byte is literal; a zero byte is followed by a count of
// zero bytes to emit. A row that cannot be decoded cleanly fails open: every
// cluster is visible from it.

use std::collections::HashMap;
use std::sync::Arc;

use rayon::prelude::*;
use thiserror::Error;

use bspview_common::bspfile::{vis_row_bytes, DVIS_PHS, DVIS_PVS};
use bspview_common::lumps::VisibilityLump;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VisSet {
    Pvs,
    Phs,
}

impl std::fmt::Display for VisSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            VisSet::Pvs => "pvs",
            VisSet::Phs => "phs",
        })
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OverrunKind {
    #[error("run of {run} zeros at output byte {at} passes the {row}-byte row")]
    Output { at: usize, run: usize, row: usize },

    #[error("stream ended after {decoded} of {row} bytes")]
    Input { decoded: usize, row: usize },

    #[error("stream offset {offset} outside the lump")]
    BadOffset { offset: i32 },
}

/// A cluster row that failed to decode. The row reads as all visible.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{set} row of cluster {cluster}: {kind}")]
pub struct VisibilityDecodeOverrun {
    pub cluster: usize,
    pub set: VisSet,
    pub kind: OverrunKind,
}

/// Expand one compressed row into exactly `row` bytes.
pub fn decompress_vis(stream: &[u8], row: usize) -> Result<Vec<u8>, OverrunKind> {
    let mut out = Vec::with_capacity(row);
    let mut inp = 0;

    while out.len() < row {
        let Some(&b) = stream.get(inp) else {
            return Err(OverrunKind::Input {
                decoded: out.len(),
                row,
            });
        };
        if b != 0 {
            out.push(b);
            inp += 1;
            continue;
        }

        let Some(&count) = stream.get(inp + 1) else {
            return Err(OverrunKind::Input {
                decoded: out.len(),
                row,
            });
        };
        let run = count as usize;
        if out.len() + run > row {
            return Err(OverrunKind::Output {
                at: out.len(),
                run,
                row,
            });
        }
        out.resize(out.len() + run, 0);
        inp += 2;
    }

    Ok(out)
}

/// Decompressed rows, one slot per cluster. `None` marks a row that failed
/// to decode. Clusters whose offsets coincide share one row.
type Rows = Vec<Option<Arc<[u8]>>>;

/// Decoded visibility for every cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisibilityTable {
    numclusters: usize,
    pvs: Rows,
    phs: Rows,
    novis: bool,
}

impl VisibilityTable {
    /// Table with no data; every query answers visible.
    pub fn all_visible() -> Self {
        Self {
            numclusters: 0,
            pvs: Vec::new(),
            phs: Vec::new(),
            novis: true,
        }
    }

    /// Decode every cluster's rows. Each distinct stream offset is expanded
    /// once; tables of at least `parallel_threshold` clusters are decoded
    /// on the rayon pool.
    pub fn decode(
        lump: &VisibilityLump,
        parallel_threshold: usize,
    ) -> (Self, Vec<VisibilityDecodeOverrun>) {
        if lump.is_empty() {
            return (Self::all_visible(), Vec::new());
        }

        let numclusters = lump.header.numclusters.max(0) as usize;
        let row = vis_row_bytes(numclusters);
        let table_end = 4 + numclusters as i64 * 8;

        let offset_of = |cluster: usize, set: VisSet| -> i32 {
            let which = match set {
                VisSet::Pvs => DVIS_PVS,
                VisSet::Phs => DVIS_PHS,
            };
            lump.header.bitofs.get(cluster).map_or(-1, |o| o[which])
        };
        let decode_at = |offset: i32| -> Result<Arc<[u8]>, OverrunKind> {
            if (offset as i64) < table_end || offset as usize >= lump.data.len() {
                return Err(OverrunKind::BadOffset { offset });
            }
            decompress_vis(&lump.data[offset as usize..], row).map(Arc::from)
        };

        let mut offsets: Vec<i32> = (0..numclusters)
            .flat_map(|c| [offset_of(c, VisSet::Pvs), offset_of(c, VisSet::Phs)])
            .collect();
        offsets.sort_unstable();
        offsets.dedup();

        let decoded: HashMap<i32, Result<Arc<[u8]>, OverrunKind>> =
            if numclusters >= parallel_threshold {
                offsets.into_par_iter().map(|o| (o, decode_at(o))).collect()
            } else {
                offsets.into_iter().map(|o| (o, decode_at(o))).collect()
            };

        let mut pvs = Vec::with_capacity(numclusters);
        let mut phs = Vec::with_capacity(numclusters);
        let mut errors = Vec::new();
        for cluster in 0..numclusters {
            for (set, rows) in [(VisSet::Pvs, &mut pvs), (VisSet::Phs, &mut phs)] {
                match &decoded[&offset_of(cluster, set)] {
                    Ok(bits) => rows.push(Some(Arc::clone(bits))),
                    Err(kind) => {
                        rows.push(None);
                        errors.push(VisibilityDecodeOverrun {
                            cluster,
                            set,
                            kind: kind.clone(),
                        });
                    }
                }
            }
        }

        (
            Self {
                numclusters,
                pvs,
                phs,
                novis: false,
            },
            errors,
        )
    }

    pub fn numclusters(&self) -> usize {
        self.numclusters
    }

    /// Answer every query with "visible".
    pub fn set_novis(&mut self, novis: bool) {
        self.novis = novis;
    }

    pub fn novis(&self) -> bool {
        self.novis
    }

    fn row(&self, set: VisSet, cluster: usize) -> Option<&[u8]> {
        let rows = match set {
            VisSet::Pvs => &self.pvs,
            VisSet::Phs => &self.phs,
        };
        rows.get(cluster)?.as_deref()
    }

    /// Decompressed PVS row of `cluster`. `None` for clusters out of range
    /// and for rows that failed to decode, which see every cluster.
    pub fn pvs_row(&self, cluster: usize) -> Option<&[u8]> {
        self.row(VisSet::Pvs, cluster)
    }

    pub fn phs_row(&self, cluster: usize) -> Option<&[u8]> {
        self.row(VisSet::Phs, cluster)
    }

    fn test(&self, set: VisSet, from: usize, to: usize) -> bool {
        if self.novis || to >= self.numclusters {
            return true;
        }
        match self.row(set, from) {
            Some(row) => row[to >> 3] & (1 << (to & 7)) != 0,
            None => true,
        }
    }

    pub fn is_visible(&self, from_cluster: usize, to_cluster: usize) -> bool {
        self.test(VisSet::Pvs, from_cluster, to_cluster)
    }

    pub fn is_hearable(&self, from_cluster: usize, to_cluster: usize) -> bool {
        self.test(VisSet::Phs, from_cluster, to_cluster)
    }
}
