use arjesus::{
    Matrix4, Vector3,
    data_structures::{
        asset::ModelAsset,
        instance::Instance,
        scene_graph::{Aabb, Node, Scene},
    },
    resources::animation::{AnimationClip, Channel, Interpolation, Keyframes, Skin},
    viewer::{Animator, Asset, Entity},
};
use cgmath::{Deg, InnerSpace, Quaternion, Rotation3, SquareMatrix};

use crate::common::test_utils::assert_matrix_eq;

mod common;

fn translation_channel(target: Entity, interpolation: Interpolation) -> Channel {
    Channel {
        target,
        interpolation,
        timestamps: vec![1.0, 2.0, 4.0],
        keyframes: Keyframes::Translation(vec![
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(1.0, 3.0, 0.0),
        ]),
    }
}

fn sample(channel: &Channel, t: f32) -> Instance {
    let mut pose = Instance::default();
    channel.sample_into(t, &mut pose);
    pose
}

#[test]
fn linear_channels_interpolate_between_keyframes() {
    let channel = translation_channel(Entity(1), Interpolation::Linear);
    assert_eq!(sample(&channel, 1.5).position, Vector3::new(0.5, 0.0, 0.0));
    assert_eq!(sample(&channel, 3.0).position, Vector3::new(1.0, 1.5, 0.0));
    assert_eq!(sample(&channel, 2.0).position, Vector3::new(1.0, 0.0, 0.0));
}

#[test]
fn channels_clamp_outside_their_keyframes() {
    let channel = translation_channel(Entity(1), Interpolation::Linear);
    assert_eq!(sample(&channel, 0.0).position, Vector3::new(0.0, 0.0, 0.0));
    assert_eq!(sample(&channel, 9.0).position, Vector3::new(1.0, 3.0, 0.0));
}

#[test]
fn step_channels_hold_the_previous_keyframe() {
    let channel = translation_channel(Entity(1), Interpolation::Step);
    assert_eq!(sample(&channel, 1.99).position, Vector3::new(0.0, 0.0, 0.0));
    assert_eq!(sample(&channel, 3.9).position, Vector3::new(1.0, 0.0, 0.0));
}

#[test]
fn rotations_take_the_short_way_round() {
    let start = Quaternion::from_angle_z(Deg(10.0));
    // same orientation as 350 degrees, stored with the opposite sign
    let end = -Quaternion::from_angle_z(Deg(-10.0));
    let channel = Channel {
        target: Entity(1),
        interpolation: Interpolation::Linear,
        timestamps: vec![0.0, 1.0],
        keyframes: Keyframes::Rotation(vec![start, end]),
    };
    let halfway = sample(&channel, 0.5).rotation;
    assert!((halfway.magnitude() - 1.0).abs() < 1e-5);
    let identity = Quaternion::new(1.0, 0.0, 0.0, 0.0);
    assert!(halfway.dot(identity).abs() > 0.9999, "{halfway:?}");
}

#[test]
fn empty_channels_leave_the_pose_alone() {
    let channel = Channel {
        target: Entity(1),
        interpolation: Interpolation::Linear,
        timestamps: vec![],
        keyframes: Keyframes::Other,
    };
    assert_eq!(sample(&channel, 1.0), Instance::default());
}

#[test]
fn clips_loop_over_their_longest_channel() {
    let clip = AnimationClip::new("walk", vec![translation_channel(Entity(1), Interpolation::Linear)]);
    assert_eq!(clip.duration, 4.0);
    assert_eq!(clip.wrap(5.0), 1.0);
    assert_eq!(clip.wrap(-1.0), 3.0);
    assert_eq!(AnimationClip::new("still", vec![]).wrap(12.0), 0.0);
}

#[test]
fn clips_keep_untouched_components_at_rest() {
    let mut scene = Scene::new();
    let rest = Instance {
        scale: Vector3::new(2.0, 2.0, 2.0),
        ..Instance::default()
    };
    let node = scene.add_node(Entity::ROOT, Node::new(Some("arm".into()), rest));
    let clip = AnimationClip::new("wave", vec![translation_channel(node, Interpolation::Linear)]);

    clip.apply(&mut scene, 1.5);
    assert_matrix_eq(
        scene.local_transform(node).unwrap(),
        Matrix4::from_translation(Vector3::new(0.5, 0.0, 0.0)) * Matrix4::from_scale(2.0),
    );
}

#[test]
fn channels_for_missing_nodes_are_skipped() {
    let mut scene = Scene::new();
    let clip = AnimationClip::new("ghost", vec![translation_channel(Entity(42), Interpolation::Linear)]);
    clip.apply(&mut scene, 1.5);
    assert_eq!(scene.len(), 1);
}

/// Root → `Body` (skinned) and root → `Hip` → `Knee`, a two-joint skin bound
/// at the rest pose.
fn skinned_asset() -> ModelAsset {
    let mut scene = Scene::new();
    let mut body = Node::new(Some("Body".into()), Vector3::new(0.0, 1.0, 0.0).into());
    body.mesh = Some(0);
    body.skin = Some(0);
    let body = scene.add_node(Entity::ROOT, body);
    let hip = scene.add_node(
        Entity::ROOT,
        Node::new(Some("Hip".into()), Vector3::new(0.0, 1.0, 0.0).into()),
    );
    let knee = scene.add_node(hip, Node::new(Some("Knee".into()), Vector3::new(0.0, -0.5, 0.0).into()));
    scene.update_world_transforms();

    // joint space from the skinned node's space
    let body_world = scene.world_transform(body).unwrap();
    let inverse_bind_matrices = [hip, knee]
        .iter()
        .map(|&joint| scene.world_transform(joint).unwrap().invert().unwrap() * body_world)
        .collect();
    let skin = Skin {
        name: Some("Legs".into()),
        joints: vec![hip, knee],
        inverse_bind_matrices,
    };
    let knee_bend = Channel {
        target: knee,
        interpolation: Interpolation::Linear,
        timestamps: vec![0.0, 1.0],
        keyframes: Keyframes::Translation(vec![
            Vector3::new(0.0, -0.5, 0.0),
            Vector3::new(0.0, -0.5, 1.0),
        ]),
    };
    ModelAsset::new(
        scene,
        vec![Aabb::new([-0.5, -1.0, -0.5], [0.5, 1.0, 0.5])],
        vec![vec![0]],
        vec![[0.0; 3]],
        vec![AnimationClip::new("bend", vec![knee_bend])],
        vec![skin],
    )
}

#[test]
fn bones_are_identity_in_the_bind_pose() {
    let asset = skinned_asset();
    let bones = asset.bone_matrices(0);
    assert_eq!(bones.len(), 2);
    for bone in bones {
        assert_matrix_eq(*bone, Matrix4::identity());
    }
    assert!(asset.bone_matrices(1).is_empty());
}

#[test]
fn bones_follow_the_animated_joints() {
    let mut asset = skinned_asset();
    asset.apply_animation(0, 1.0 - f32::EPSILON);
    asset.update_bone_matrices();
    let bones = asset.bone_matrices(0);
    assert_matrix_eq(bones[0], Matrix4::identity());
    let knee = bones[1];
    let moved = knee * cgmath::Vector4::new(0.0, 0.5, 0.0, 1.0);
    assert!((moved.z - 1.0).abs() < 1e-3, "{moved:?}");
}

#[test]
fn bones_are_relative_to_the_skinned_node() {
    let mut asset = skinned_asset();
    let shifted = Matrix4::from_translation(Vector3::new(5.0, 0.0, 0.0));
    // moving the whole model moves the joints and the skinned node alike
    asset.set_transform(asset.root(), shifted);
    asset.update_bone_matrices();
    for bone in asset.bone_matrices(0) {
        assert_matrix_eq(*bone, Matrix4::identity());
    }
    assert_eq!(asset.skinned_node(0), asset.find("Body"));
}
