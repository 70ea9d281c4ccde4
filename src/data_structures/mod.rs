//! Viewer data structures: transforms, scene graph, GPU textures.
//!
//! - `asset` is the GPU-independent part of a loaded model
//! - `instance` holds decomposed node transforms and the per-draw GPU layout
//! - `scene_graph` is the node arena of one loaded model, with bounds
//! - `model` contains meshes and materials uploaded to the GPU
//! - `texture` is the wgpu texture wrapper and creation utilities
//! - `depth_texture` mirrors a depth image into one GPU texture

pub mod asset;
pub mod depth_texture;
pub mod instance;
pub mod model;
pub mod scene_graph;
pub mod texture;
