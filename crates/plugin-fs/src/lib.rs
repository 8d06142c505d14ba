//! Filesystem primitives for the plugin manager
//!
//! Provides normalized paths, atomic writes guarded by advisory locks,
//! directory moves that survive filesystem boundaries, and a
//! format-agnostic config store.

pub mod config;
pub mod digest;
pub mod error;
pub mod io;
pub mod path;

pub use config::ConfigStore;
pub use error::{Error, Result};
pub use io::RobustnessConfig;
pub use path::NormalizedPath;
