//! Render pipelines.
//!
//! - `basic`: lit, textured and optionally skinned glTF meshes
//! - `light`: the directional and ambient light uniform
//! - `skybox`: fullscreen equirectangular background

pub mod basic;
pub mod light;
pub mod skybox;
