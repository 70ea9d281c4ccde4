//! arjesus
//!
//! A small glTF viewer built around a per-refresh frame driver. Every display
//! refresh the driver re-arms itself, advances the model's first animation
//! track, asks the renderer to draw and spins the model about its local Z axis.
//! Next to it lives a standalone depth texture resource that mirrors a 16-bit
//! depth image into a GPU texture.
//!
//! High-level modules
//! - `camera`: the fixed viewer camera and its uniform
//! - `clock`: frame clock turning refresh timestamps into elapsed seconds
//! - `choreographer`: the refresh signal the driver re-registers with
//! - `driver`: the frame driver and its armed/disarmed lifecycle
//! - `viewer`: the renderer surface the driver talks to (model, asset, animator)
//! - `depth`: depth image sources and the bounded image pool
//! - `data_structures`: transforms, scene graph, GPU textures and the depth texture
//! - `context`: GPU device/queue/surface ownership
//! - `pipelines`: render pipelines for meshes and the skybox
//! - `resources`: glTF and environment loading
//! - `render`: the wgpu-backed [`render::GltfViewer`]
//! - `flow`: the winit host mapping lifecycle signals onto the driver
//! - `config`: viewer configuration
//!

pub mod camera;
pub mod choreographer;
pub mod clock;
pub mod config;
pub mod context;
pub mod data_structures;
pub mod depth;
pub mod driver;
pub mod flow;
pub mod pipelines;
pub mod render;
pub mod resources;
pub mod viewer;

use std::sync::Once;

// Re-exports commonly used types for convenience in downstream code.
pub use cgmath::{Deg, Matrix4, Vector3};

static INIT: Once = Once::new();

/// One-time process-wide initialisation.
///
/// Must run before any viewer or driver is constructed. Calling it again is a
/// no-op, so hosts and tests can call it unconditionally.
pub fn init() {
    INIT.call_once(|| {
        if let Err(e) = env_logger::try_init() {
            println!("Warning: Could not initialize logger: {}", e);
        }
        log::info!("arjesus {} initialised", env!("CARGO_PKG_VERSION"));
    });
}

/// Returns true once [`init`] has completed.
pub fn is_initialised() -> bool {
    INIT.is_completed()
}
