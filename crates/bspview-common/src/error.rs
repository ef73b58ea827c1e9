// error.rs — load errors

use thiserror::Error;

use crate::bspfile::LumpType;

/// Fatal directory errors. Any of these aborts the load; no scene is produced.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BspError {
    #[error("corrupt file: {size} bytes is shorter than the {needed}-byte header")]
    TooShort { size: usize, needed: usize },

    #[error("corrupt file: bad magic {found:02x?}, expected \"VBSP\"")]
    BadMagic { found: [u8; 4] },

    #[error("corrupt file: unsupported version {found} (supported {min}..={max})")]
    UnsupportedVersion { found: i32, min: i32, max: i32 },

    #[error("corrupt file: lump {index} range {offset}+{length} outside file of {file_size} bytes")]
    LumpOutOfBounds {
        index: usize,
        offset: i64,
        length: i64,
        file_size: usize,
    },
}

/// Why a lump decoded to an empty sequence.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LumpFault {
    #[error("length {length} is not a multiple of the {width}-byte record")]
    Misaligned { length: usize, width: usize },

    #[error("lump is compressed (uncompressed size {uncompressed})")]
    Compressed { uncompressed: u32 },

    #[error("cluster table for {clusters} clusters does not fit in {length} bytes")]
    TruncatedHeader { clusters: i64, length: usize },

    #[error("{clusters} clusters exceeds the limit of {max}")]
    TooManyClusters { clusters: i64, max: usize },
}

/// A lump that could not be decoded. Non-fatal: the lump reads as empty.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("malformed {lump} lump: {fault}")]
pub struct MalformedLump {
    pub lump: LumpType,
    pub fault: LumpFault,
}

pub type BspResult<T> = Result<T, BspError>;
