#![allow(clippy::too_many_arguments, clippy::needless_range_loop, clippy::float_cmp,
         clippy::type_complexity)]

pub mod mesh;
pub mod face;
pub mod disp;
pub mod vis;
pub mod entities;
pub mod error;
pub mod scene;
pub mod assemble;
pub mod loader;
pub mod context;

#[cfg(test)]
mod testmap;

pub use assemble::{CancelToken, SceneAssembler};
pub use error::{LoadError, LoadIssue, LoadReport};
pub use scene::Scene;
