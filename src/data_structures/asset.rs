//! CPU side of one loaded model.
//!
//! [`ModelAsset`] owns everything about a model that is not a GPU resource:
//! the node arena, mesh bounds, animations, skins and the per-material
//! emissive overrides. It implements [`Asset`] and [`Animator`], so the whole
//! driver-facing surface works without a device.

use cgmath::{Matrix4, SquareMatrix, Vector3};

use crate::{
    data_structures::scene_graph::{Aabb, Scene, unit_cube_transform},
    resources::animation::{AnimationClip, Skin},
    viewer::{Animator, Asset, Entity},
};

#[derive(Clone, Debug)]
pub struct ModelAsset {
    scene: Scene,
    mesh_bounds: Vec<Aabb>,
    /// Material index of every primitive, per mesh.
    mesh_materials: Vec<Vec<usize>>,
    emissive: Vec<[f32; 3]>,
    rest_bounds: Option<Aabb>,
    animations: Vec<AnimationClip>,
    skins: Vec<Skin>,
    bone_matrices: Vec<Vec<Matrix4<f32>>>,
}

impl ModelAsset {
    pub fn new(
        scene: Scene,
        mesh_bounds: Vec<Aabb>,
        mesh_materials: Vec<Vec<usize>>,
        emissive: Vec<[f32; 3]>,
        animations: Vec<AnimationClip>,
        skins: Vec<Skin>,
    ) -> Self {
        let rest_bounds = scene.bounds(&mesh_bounds);
        let mut asset = Self {
            scene,
            mesh_bounds,
            mesh_materials,
            emissive,
            rest_bounds,
            animations,
            bone_matrices: vec![Vec::new(); skins.len()],
            skins,
        };
        asset.update_bone_matrices();
        asset
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut Scene {
        &mut self.scene
    }

    /// Bounds of the model in its rest pose, `None` without meshes.
    pub fn bounds(&self) -> Option<Aabb> {
        self.rest_bounds
    }

    pub fn mesh_bounds(&self) -> &[Aabb] {
        &self.mesh_bounds
    }

    pub fn mesh_materials(&self, mesh: usize) -> &[usize] {
        self.mesh_materials.get(mesh).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Current emissive factor of every material.
    pub fn emissive_factors(&self) -> &[[f32; 3]] {
        &self.emissive
    }

    pub fn animations(&self) -> &[AnimationClip] {
        &self.animations
    }

    pub fn skins(&self) -> &[Skin] {
        &self.skins
    }

    pub fn find(&self, name: &str) -> Option<Entity> {
        self.scene
            .entities()
            .find(|&e| self.scene.node(e).and_then(|n| n.name.as_deref()) == Some(name))
    }

    /// The node a skin deforms, i.e. the first node that references it.
    pub fn skinned_node(&self, skin: usize) -> Option<Entity> {
        self.scene
            .entities()
            .find(|&e| self.scene.node(e).and_then(|n| n.skin) == Some(skin))
    }

    /// Root transform fitting the rest pose into a unit cube at `centre_point`.
    pub fn unit_cube_transform(&self, centre_point: Vector3<f32>) -> Matrix4<f32> {
        let bounds = self
            .rest_bounds
            .unwrap_or_else(|| Aabb::new([0.0; 3], [0.0; 3]));
        unit_cube_transform(&bounds, centre_point)
    }

    pub fn transform_to_unit_cube(&mut self, centre_point: Vector3<f32>) {
        let transform = self.unit_cube_transform(centre_point);
        self.scene.set_local_transform(Entity::ROOT, transform);
    }
}

impl Asset for ModelAsset {
    fn entities(&self) -> Vec<Entity> {
        self.scene.entities().collect()
    }

    fn name(&self, entity: Entity) -> Option<&str> {
        self.scene.node(entity).and_then(|n| n.name.as_deref())
    }

    fn is_renderable(&self, entity: Entity) -> bool {
        self.scene.node(entity).is_some_and(|n| n.mesh.is_some())
    }

    fn transform(&self, entity: Entity) -> Matrix4<f32> {
        self.scene
            .local_transform(entity)
            .unwrap_or_else(Matrix4::identity)
    }

    fn set_transform(&mut self, entity: Entity, transform: Matrix4<f32>) {
        self.scene.set_local_transform(entity, transform);
    }

    fn set_visible(&mut self, entity: Entity, visible: bool) {
        match self.scene.node_mut(entity) {
            Some(node) => node.visible = visible,
            None => log::warn!("cannot change visibility of unknown entity {}", entity.0),
        }
    }

    fn set_emissive_factor(&mut self, entity: Entity, factor: [f32; 3]) {
        let Some(mesh) = self.scene.node(entity).and_then(|n| n.mesh) else {
            log::debug!("entity {} has no mesh, emissive override ignored", entity.0);
            return;
        };
        let materials = self.mesh_materials.get(mesh).map(Vec::as_slice).unwrap_or(&[]);
        for &material in materials {
            if let Some(emissive) = self.emissive.get_mut(material) {
                *emissive = factor;
            }
        }
    }
}

impl Animator for ModelAsset {
    fn animation_count(&self) -> usize {
        self.animations.len()
    }

    fn animation_name(&self, index: usize) -> Option<&str> {
        self.animations.get(index).map(|a| a.name.as_str())
    }

    fn animation_duration(&self, index: usize) -> Option<f32> {
        self.animations.get(index).map(|a| a.duration)
    }

    fn apply_animation(&mut self, index: usize, seconds: f32) {
        match self.animations.get(index) {
            Some(clip) => clip.apply(&mut self.scene, seconds),
            None => log::warn!(
                "animation {} requested, model has {}",
                index,
                self.animations.len()
            ),
        }
    }

    fn update_bone_matrices(&mut self) {
        self.scene.update_world_transforms();
        for idx in 0..self.skins.len() {
            let skinned = self.skinned_node(idx);
            self.bone_matrices[idx] = self.skins[idx].bone_matrices(&self.scene, skinned);
        }
    }

    fn bone_matrices(&self, skin: usize) -> &[Matrix4<f32>] {
        self.bone_matrices.get(skin).map(Vec::as_slice).unwrap_or(&[])
    }
}
