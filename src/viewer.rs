//! Renderer surface consumed by the frame driver and the host.
//!
//! The driver never touches GPU state directly. It talks to a [`ModelViewer`],
//! which owns the loaded asset (if any) and its animator (if any). Absence is
//! explicit: both accessors return `Option` and the driver checks them before
//! every dependent step.

use cgmath::Matrix4;

/// Names one node of a loaded asset.
///
/// Entity 0 is the asset root: a synthetic node whose children are the scene
/// roots of the loaded file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Entity(pub usize);

impl Entity {
    pub const ROOT: Entity = Entity(0);

    pub fn index(self) -> usize {
        self.0
    }
}

/// A renderer able to draw one loaded model.
pub trait ModelViewer {
    /// Draw the current scene for the refresh at `frame_time_nanos`.
    fn render(&mut self, frame_time_nanos: u64) -> anyhow::Result<()>;

    /// Reset the asset root so the model fits a unit cube in front of the
    /// camera. No-op when nothing is loaded.
    fn transform_to_unit_cube(&mut self);

    fn asset(&mut self) -> Option<&mut dyn Asset>;

    fn animator(&mut self) -> Option<&mut dyn Animator>;
}

/// Node-level access to a loaded model.
pub trait Asset {
    fn root(&self) -> Entity {
        Entity::ROOT
    }

    fn entities(&self) -> Vec<Entity>;

    fn name(&self, entity: Entity) -> Option<&str>;

    /// Whether the entity carries a mesh.
    fn is_renderable(&self, entity: Entity) -> bool;

    /// Local transform of `entity`. Unknown entities report identity.
    fn transform(&self, entity: Entity) -> Matrix4<f32>;

    fn set_transform(&mut self, entity: Entity, transform: Matrix4<f32>);

    fn set_visible(&mut self, entity: Entity, visible: bool);

    /// Overrides the emissive factor of every material the entity renders with.
    fn set_emissive_factor(&mut self, entity: Entity, factor: [f32; 3]);
}

/// Skeletal animation of a loaded model.
pub trait Animator {
    fn animation_count(&self) -> usize;

    fn animation_name(&self, index: usize) -> Option<&str>;

    /// Duration in seconds, `None` for an unknown index.
    fn animation_duration(&self, index: usize) -> Option<f32>;

    /// Pose the model at `seconds` into animation `index`.
    fn apply_animation(&mut self, index: usize, seconds: f32);

    /// Recompute joint matrices from the current pose.
    fn update_bone_matrices(&mut self);

    fn bone_matrices(&self, skin: usize) -> &[Matrix4<f32>];
}
