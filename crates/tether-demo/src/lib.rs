#![forbid(unsafe_code)]

//! Demo scenes for Tether.
//!
//! [`components`] holds a handful of data sources and consumers,
//! [`scene`] builds trees of them from TOML files, and [`scenario`] bundles
//! each built-in scene with a script that exercises it. The `tether-demo`
//! binary runs a scenario (or loads a scene file) and prints the resulting
//! node reports.

pub mod components;
pub mod scenario;
pub mod scene;

pub use scenario::Scenario;
pub use scene::{ComponentRegistry, Scene, SceneError, SceneSpec};
