#![allow(clippy::too_many_arguments, clippy::needless_range_loop, clippy::float_cmp)]

pub mod mathlib;
pub mod bspfile;
pub mod crc;
pub mod error;
pub mod parse;
pub mod cvar;
pub mod lumps;
pub mod directory;
pub mod bspwrite;
