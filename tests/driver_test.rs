use arjesus::{
    Matrix4, Vector3,
    choreographer::Choreographer,
    config::SpinConfig,
    data_structures::{
        asset::ModelAsset,
        instance::Instance,
        scene_graph::{Aabb, Node, Scene},
    },
    driver::{DriverConfig, DriverState, FrameDriver, rotation, spin_rotation},
    viewer::{Animator, Asset, Entity},
};

use crate::common::test_utils::{
    Call, MockViewer, SECOND, assert_matrix_eq, nanos, triangle_asset,
};

mod common;

fn driver(viewer: MockViewer, config: DriverConfig) -> (FrameDriver<MockViewer, Choreographer>, Choreographer) {
    let choreographer = Choreographer::new();
    let driver = FrameDriver::new(viewer, choreographer.clone(), 0, config);
    (driver, choreographer)
}

fn no_spin() -> DriverConfig {
    DriverConfig {
        spin: SpinConfig {
            enabled: false,
            ..SpinConfig::default()
        },
        ..DriverConfig::default()
    }
}

fn keep_root() -> DriverConfig {
    DriverConfig {
        spin: SpinConfig {
            fit_to_unit_cube: false,
            ..SpinConfig::default()
        },
        ..DriverConfig::default()
    }
}

/// One meshed node with a unit box, no animations.
fn box_asset() -> ModelAsset {
    box_asset_at([-0.5, -0.5, -0.5], [0.5, 0.5, 0.5])
}

fn box_asset_at(min: [f32; 3], max: [f32; 3]) -> ModelAsset {
    let mut scene = Scene::new();
    let mut node = Node::new(Some("Box".into()), Instance::default());
    node.mesh = Some(0);
    scene.add_node(Entity::ROOT, node);
    ModelAsset::new(
        scene,
        vec![Aabb::new(min, max)],
        vec![vec![]],
        vec![],
        vec![],
        vec![],
    )
}

#[test]
fn starts_disarmed_with_nothing_posted() {
    let (driver, choreographer) = driver(MockViewer::empty(), DriverConfig::default());
    assert_eq!(driver.state(), DriverState::Disarmed);
    assert!(!choreographer.is_posted());
    assert_eq!(driver.ticks(), 0);
}

#[test]
fn every_tick_posts_the_next_one() {
    let (mut driver, choreographer) = driver(MockViewer::empty(), DriverConfig::default());
    driver.arm();
    assert!(choreographer.is_posted());

    for frame in 1..=5u64 {
        assert!(choreographer.take_posted(), "frame {frame} was not scheduled");
        driver.on_tick(frame * SECOND / 60).unwrap();
    }
    assert!(choreographer.is_posted());
    assert_eq!(choreographer.dispatched(), 5);
    assert_eq!(driver.ticks(), 5);
    assert_eq!(driver.viewer().renders(), 5);
}

#[test]
fn failing_render_still_schedules_the_next_tick() {
    let (mut driver, choreographer) = driver(MockViewer::empty().failing(), DriverConfig::default());
    driver.arm();
    assert!(choreographer.take_posted());

    let err = driver.on_tick(SECOND).unwrap_err();
    assert!(err.to_string().contains("render failed"));
    assert!(choreographer.is_posted());
    assert_eq!(driver.state(), DriverState::Armed);
}

#[test]
fn failing_render_skips_the_spin() {
    let viewer = MockViewer::with_asset(box_asset()).failing();
    let (mut driver, _) = driver(viewer, DriverConfig::default());
    driver.arm();

    assert!(driver.on_tick(nanos(4.5)).is_err());
    assert!(!driver.viewer().calls().contains(&Call::UnitCube));
    assert_matrix_eq(driver.viewer().root_transform().unwrap(), Matrix4::from_scale(1.0));
}

#[test]
fn ticks_while_disarmed_are_ignored() {
    let (mut driver, choreographer) = driver(MockViewer::empty(), DriverConfig::default());
    driver.on_tick(SECOND).unwrap();
    assert_eq!(driver.ticks(), 0);
    assert_eq!(driver.viewer().renders(), 0);
    assert!(!choreographer.is_posted());
}

#[test]
fn pause_and_resume() {
    let (mut driver, choreographer) = driver(MockViewer::empty(), DriverConfig::default());
    driver.arm();
    driver.on_tick(SECOND).unwrap();

    driver.disarm();
    assert_eq!(driver.state(), DriverState::Disarmed);
    assert!(!choreographer.is_posted());
    driver.on_tick(2 * SECOND).unwrap();
    assert_eq!(driver.ticks(), 1);

    driver.arm();
    assert!(choreographer.is_posted());
    driver.on_tick(3 * SECOND).unwrap();
    assert_eq!(driver.ticks(), 2);
    assert_eq!(driver.viewer().calls(), vec![Call::Render(SECOND), Call::Render(3 * SECOND)]);
}

#[test]
fn arming_twice_posts_once() {
    let (mut driver, choreographer) = driver(MockViewer::empty(), DriverConfig::default());
    driver.arm();
    driver.arm();
    assert_eq!(choreographer.posts(), 1);
    driver.disarm();
    driver.disarm();
    assert!(!choreographer.is_posted());
}

#[test]
fn no_model_only_renders() {
    let (mut driver, _) = driver(MockViewer::empty(), DriverConfig::default());
    driver.arm();
    driver.on_tick(nanos(4.5)).unwrap();
    assert_eq!(driver.viewer().calls(), vec![Call::Render(nanos(4.5))]);
}

#[test]
fn animation_is_applied_before_render() {
    let viewer = MockViewer::with_asset(triangle_asset());
    let (mut driver, _) = driver(viewer, no_spin());
    driver.arm();
    driver.on_tick(SECOND).unwrap();

    assert_eq!(
        driver.viewer().calls(),
        vec![Call::Animate(0, 1.0), Call::Bones, Call::Render(SECOND)]
    );
    let body = driver.viewer().model_asset().find("Body").unwrap();
    assert_matrix_eq(
        driver.viewer().model_asset().transform(body),
        Matrix4::from_translation(Vector3::new(2.0, 0.0, 0.0)),
    );
}

#[test]
fn animation_loops_over_its_duration() {
    let (mut driver, _) = driver(MockViewer::with_asset(triangle_asset()), no_spin());
    driver.arm();
    driver.on_tick(3 * SECOND).unwrap();

    let asset = driver.viewer().model_asset();
    let body = asset.find("Body").unwrap();
    assert_matrix_eq(
        asset.transform(body),
        Matrix4::from_translation(Vector3::new(2.0, 0.0, 0.0)),
    );
}

#[test]
fn missing_animation_track_is_skipped() {
    let config = DriverConfig {
        animation_track: 3,
        ..no_spin()
    };
    let (mut driver, _) = driver(MockViewer::with_asset(triangle_asset()), config);
    driver.arm();
    driver.on_tick(SECOND).unwrap();
    assert_eq!(driver.viewer().calls(), vec![Call::Render(SECOND)]);
}

#[test]
fn model_without_animations_is_not_animated() {
    let (mut driver, _) = driver(MockViewer::with_asset(box_asset()), no_spin());
    driver.arm();
    driver.on_tick(SECOND).unwrap();
    assert_eq!(driver.viewer().model_asset().animation_count(), 0);
    assert_eq!(driver.viewer().calls(), vec![Call::Render(SECOND)]);
}

#[test]
fn spin_composes_rotation_after_the_unit_cube_fit() {
    let (mut driver, _) = driver(MockViewer::with_asset(box_asset()), DriverConfig::default());
    let fit = driver
        .viewer()
        .model_asset()
        .unit_cube_transform(Vector3::new(0.0, 0.0, -4.0));
    driver.arm();

    // 20 degrees per second
    driver.on_tick(nanos(4.5)).unwrap();
    assert_eq!(
        driver.viewer().calls(),
        vec![Call::Render(nanos(4.5)), Call::UnitCube]
    );
    assert_matrix_eq(
        driver.viewer().root_transform().unwrap(),
        fit * rotation(Vector3::unit_z(), 90.0),
    );

    driver.on_tick(nanos(9.0)).unwrap();
    assert_matrix_eq(
        driver.viewer().root_transform().unwrap(),
        fit * rotation(Vector3::unit_z(), 180.0),
    );
}

#[test]
fn spin_rotates_an_off_centre_model_inside_the_fit() {
    let asset = box_asset_at([1.0, 2.0, 0.0], [2.0, 3.0, 1.0]);
    let (mut driver, _) = driver(MockViewer::with_asset(asset), DriverConfig::default());
    let fit = driver
        .viewer()
        .model_asset()
        .unit_cube_transform(Vector3::new(0.0, 0.0, -4.0));
    let quarter = rotation(Vector3::unit_z(), 90.0);
    driver.arm();

    driver.on_tick(nanos(4.5)).unwrap();
    let root = driver.viewer().root_transform().unwrap();
    assert_matrix_eq(root, fit * quarter);

    // the fit translates in X and Y, so the order of the product matters
    let reversed = quarter * fit;
    let a: &[f32; 16] = root.as_ref();
    let r: &[f32; 16] = reversed.as_ref();
    let largest = a.iter().zip(r).map(|(x, y)| (x - y).abs()).fold(0.0, f32::max);
    assert!(largest > 0.5, "rotation applied outside the fit: {root:?}");
}

#[test]
fn unit_cube_fit_puts_the_model_in_front_of_the_camera() {
    let (mut driver, _) = driver(MockViewer::with_asset(triangle_asset()), DriverConfig::default());
    driver.arm();
    driver.on_tick(0).unwrap();
    // bounds (0,0,0)..(2,1,1), largest extent 2, so no scaling
    assert_matrix_eq(
        driver.viewer().root_transform().unwrap(),
        Matrix4::from_translation(Vector3::new(-1.0, -0.5, -4.5)),
    );
}

#[test]
fn spin_without_fit_keeps_the_loaded_root() {
    let mut asset = box_asset();
    let base = Matrix4::from_translation(Vector3::new(1.0, 2.0, 3.0));
    asset.set_transform(Entity::ROOT, base);
    let (mut driver, _) = driver(MockViewer::with_asset(asset), keep_root());
    driver.arm();

    driver.on_tick(nanos(4.5)).unwrap();
    assert!(!driver.viewer().calls().contains(&Call::UnitCube));
    assert_matrix_eq(
        driver.viewer().root_transform().unwrap(),
        base * rotation(Vector3::unit_z(), 90.0),
    );

    // same time again: no accumulation
    driver.on_tick(nanos(4.5)).unwrap();
    assert_matrix_eq(
        driver.viewer().root_transform().unwrap(),
        base * rotation(Vector3::unit_z(), 90.0),
    );

    driver.on_tick(nanos(18.0)).unwrap();
    assert_matrix_eq(driver.viewer().root_transform().unwrap(), base);
}

#[test]
fn reset_spin_captures_a_new_base() {
    let (mut driver, _) = driver(MockViewer::with_asset(box_asset()), keep_root());
    driver.arm();
    driver.on_tick(nanos(4.5)).unwrap();

    let moved = Matrix4::from_translation(Vector3::new(0.0, 0.0, -2.0));
    driver
        .viewer_mut()
        .model
        .as_mut()
        .unwrap()
        .set_transform(Entity::ROOT, moved);
    driver.reset_spin();
    driver.on_tick(nanos(9.0)).unwrap();
    assert_matrix_eq(
        driver.viewer().root_transform().unwrap(),
        moved * rotation(Vector3::unit_z(), 180.0),
    );
}

#[test]
fn disabled_spin_leaves_the_root_alone() {
    let (mut driver, _) = driver(MockViewer::with_asset(box_asset()), no_spin());
    driver.arm();
    driver.on_tick(nanos(4.5)).unwrap();
    assert_matrix_eq(driver.viewer().root_transform().unwrap(), Matrix4::from_scale(1.0));
}

#[test]
fn spin_angle_wraps_without_losing_precision() {
    let spin = SpinConfig::default();
    // ten days at 20 degrees per second is a whole number of turns
    let later = spin_rotation(&spin, 10.0 * 24.0 * 3600.0 + 4.5);
    assert_matrix_eq(later, rotation(Vector3::unit_z(), 90.0));
    assert_matrix_eq(spin_rotation(&spin, 0.0), Matrix4::from_scale(1.0));
}

#[test]
fn time_is_measured_from_construction() {
    let choreographer = Choreographer::new();
    let start = 7 * SECOND;
    let mut driver = FrameDriver::new(
        MockViewer::with_asset(triangle_asset()),
        choreographer,
        start,
        no_spin(),
    );
    driver.arm();
    driver.on_tick(start + SECOND / 2).unwrap();
    assert_eq!(driver.viewer().calls()[0], Call::Animate(0, 0.5));
}
