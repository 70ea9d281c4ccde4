//! Keyframe animation and skinning.
//!
//! An [`AnimationClip`] is a set of channels, each driving one component
//! (translation, rotation or scale) of one node. Applying a clip at a time
//! samples every channel and writes the resulting local transforms back into
//! the [`Scene`]. A [`Skin`] turns the posed joints into bone matrices.

use std::collections::HashMap;

use cgmath::{InnerSpace, Matrix4, Quaternion, SquareMatrix, Vector3, VectorSpace};

use crate::{
    data_structures::{instance::Instance, scene_graph::Scene},
    viewer::Entity,
};

#[derive(Clone, Debug)]
pub enum Keyframes {
    Translation(Vec<Vector3<f32>>),
    Rotation(Vec<Quaternion<f32>>),
    Scale(Vec<Vector3<f32>>),
    // morph target weights are read but not applied
    Other,
}

impl Keyframes {
    fn len(&self) -> usize {
        match self {
            Keyframes::Translation(v) => v.len(),
            Keyframes::Rotation(v) => v.len(),
            Keyframes::Scale(v) => v.len(),
            Keyframes::Other => 0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Interpolation {
    Linear,
    Step,
    /// Keyframes keep only the spline values (tangents are dropped at load time)
    /// and are interpolated linearly.
    CubicSpline,
}

#[derive(Clone, Debug)]
pub struct Channel {
    pub target: Entity,
    pub interpolation: Interpolation,
    pub timestamps: Vec<f32>,
    pub keyframes: Keyframes,
}

/// Where `t` falls between two keyframes: indices and blend factor.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Span {
    from: usize,
    to: usize,
    factor: f32,
}

impl Channel {
    fn span(&self, t: f32) -> Option<Span> {
        let len = self.timestamps.len().min(self.keyframes.len());
        if len == 0 {
            return None;
        }
        let next = self.timestamps[..len].partition_point(|&ts| ts <= t);
        if next == 0 {
            return Some(Span { from: 0, to: 0, factor: 0.0 });
        }
        if next >= len {
            return Some(Span { from: len - 1, to: len - 1, factor: 0.0 });
        }
        let from = next - 1;
        if self.interpolation == Interpolation::Step {
            return Some(Span { from, to: from, factor: 0.0 });
        }
        let (t0, t1) = (self.timestamps[from], self.timestamps[next]);
        let factor = if t1 > t0 { (t - t0) / (t1 - t0) } else { 0.0 };
        Some(Span { from, to: next, factor })
    }

    /// Writes this channel's sample at `t` into `pose`.
    pub fn sample_into(&self, t: f32, pose: &mut Instance) {
        let Some(span) = self.span(t) else {
            return;
        };
        match &self.keyframes {
            Keyframes::Translation(values) => {
                pose.position = values[span.from].lerp(values[span.to], span.factor);
            }
            Keyframes::Scale(values) => {
                pose.scale = values[span.from].lerp(values[span.to], span.factor);
            }
            Keyframes::Rotation(values) => {
                let a = values[span.from];
                let mut b = values[span.to];
                // shortest arc
                if a.dot(b) < 0.0 {
                    b = -b;
                }
                pose.rotation = a.slerp(b, span.factor).normalize();
            }
            Keyframes::Other => (),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AnimationClip {
    pub name: String,
    pub channels: Vec<Channel>,
    pub duration: f32,
}

impl AnimationClip {
    pub fn new(name: impl Into<String>, channels: Vec<Channel>) -> Self {
        let duration = channels
            .iter()
            .filter_map(|c| c.timestamps.last().copied())
            .fold(0.0_f32, f32::max);
        Self {
            name: name.into(),
            channels,
            duration,
        }
    }

    /// Maps `seconds` into `[0, duration)`, looping the clip.
    pub fn wrap(&self, seconds: f32) -> f32 {
        if self.duration > 0.0 {
            seconds.rem_euclid(self.duration)
        } else {
            0.0
        }
    }

    /// Poses every targeted node of `scene` at `seconds` into the clip.
    ///
    /// Components a node has no channel for keep their rest value.
    pub fn apply(&self, scene: &mut Scene, seconds: f32) {
        let t = self.wrap(seconds);
        let mut poses: HashMap<Entity, Instance> = HashMap::new();
        for channel in &self.channels {
            let Some(node) = scene.node(channel.target) else {
                log::warn!(
                    "animation {} targets missing node {}",
                    self.name,
                    channel.target.0
                );
                continue;
            };
            let pose = poses.entry(channel.target).or_insert(node.rest);
            channel.sample_into(t, pose);
        }
        for (entity, pose) in poses {
            scene.set_local_transform(entity, pose.to_matrix());
        }
    }
}

#[derive(Clone, Debug)]
pub struct Skin {
    pub name: Option<String>,
    pub joints: Vec<Entity>,
    pub inverse_bind_matrices: Vec<Matrix4<f32>>,
}

impl Skin {
    /// Joint matrices for the current world transforms of `scene`.
    ///
    /// Each matrix is `inverse(world(skinned)) · world(joint) · inverse_bind`,
    /// i.e. relative to the node the skin is attached to.
    pub fn bone_matrices(&self, scene: &Scene, skinned: Option<Entity>) -> Vec<Matrix4<f32>> {
        let to_mesh_space = skinned
            .and_then(|entity| scene.world_transform(entity))
            .and_then(|world| world.invert())
            .unwrap_or_else(Matrix4::identity);
        self.joints
            .iter()
            .enumerate()
            .map(|(i, &joint)| {
                let joint_world = scene
                    .world_transform(joint)
                    .unwrap_or_else(Matrix4::identity);
                let inverse_bind = self
                    .inverse_bind_matrices
                    .get(i)
                    .copied()
                    .unwrap_or_else(Matrix4::identity);
                to_mesh_space * joint_world * inverse_bind
            })
            .collect()
    }
}
