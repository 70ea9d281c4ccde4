//! Frame driver.
//!
//! [`FrameDriver`] receives one tick per display refresh. Each tick:
//!
//! 1. re-arms the refresh signal, before anything that can fail
//! 2. converts the refresh timestamp into elapsed seconds
//! 3. advances the configured animation track, if the model has one
//! 4. asks the viewer to render
//! 5. spins the model root about the configured axis
//!
//! The driver is either [`DriverState::Armed`] or [`DriverState::Disarmed`].
//! Only the host moves it between the two (resume / pause); the automatic
//! re-arm inside a tick keeps an armed driver armed.

use cgmath::{Deg, Matrix4, Vector3};

use crate::{
    choreographer::RefreshSignal,
    clock::FrameClock,
    config::{SpinConfig, ViewerConfig},
    viewer::ModelViewer,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DriverState {
    Armed,
    Disarmed,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DriverConfig {
    pub animation_track: usize,
    pub spin: SpinConfig,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            animation_track: 0,
            spin: SpinConfig::default(),
        }
    }
}

impl From<&ViewerConfig> for DriverConfig {
    fn from(config: &ViewerConfig) -> Self {
        Self {
            animation_track: config.animation_track,
            spin: config.spin.clone(),
        }
    }
}

#[derive(Debug)]
pub struct FrameDriver<V, R> {
    viewer: V,
    refresh: R,
    clock: FrameClock,
    config: DriverConfig,
    state: DriverState,
    ticks: u64,
    // Root transform the spin composes with when the unit-cube reset is off.
    spin_base: Option<Matrix4<f32>>,
}

impl<V: ModelViewer, R: RefreshSignal> FrameDriver<V, R> {
    pub fn new(viewer: V, refresh: R, start_nanos: u64, config: DriverConfig) -> Self {
        Self {
            viewer,
            refresh,
            clock: FrameClock::new(start_nanos),
            config,
            state: DriverState::Disarmed,
            ticks: 0,
            spin_base: None,
        }
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    /// Ticks handled while armed.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn viewer(&self) -> &V {
        &self.viewer
    }

    pub fn viewer_mut(&mut self) -> &mut V {
        &mut self.viewer
    }

    pub fn into_viewer(self) -> V {
        self.viewer
    }

    /// Start receiving ticks (host resume).
    pub fn arm(&mut self) {
        if self.state == DriverState::Armed {
            return;
        }
        log::info!("frame driver armed");
        self.state = DriverState::Armed;
        self.refresh.post_frame_callback();
    }

    /// Stop receiving ticks (host pause or destroy). A tick already in flight
    /// completes; nothing is scheduled after it.
    pub fn disarm(&mut self) {
        if self.state == DriverState::Disarmed {
            return;
        }
        log::info!("frame driver disarmed after {} ticks", self.ticks);
        self.state = DriverState::Disarmed;
        self.refresh.remove_frame_callback();
    }

    /// Forget the captured spin base so the next tick captures a fresh one.
    /// Call after loading a different model.
    pub fn reset_spin(&mut self) {
        self.spin_base = None;
    }

    pub fn on_tick(&mut self, frame_time_nanos: u64) -> anyhow::Result<()> {
        if self.state == DriverState::Disarmed {
            log::trace!("ignoring tick at {frame_time_nanos}ns while disarmed");
            return Ok(());
        }
        self.refresh.post_frame_callback();
        self.ticks += 1;

        let seconds = self.clock.elapsed_seconds(frame_time_nanos);

        let track = self.config.animation_track;
        if let Some(animator) = self.viewer.animator() {
            if animator.animation_count() > track {
                animator.apply_animation(track, seconds as f32);
                animator.update_bone_matrices();
            }
        }

        self.viewer.render(frame_time_nanos)?;

        if self.config.spin.enabled {
            self.spin(seconds);
        }
        Ok(())
    }

    fn spin(&mut self, seconds: f64) {
        let rotation = spin_rotation(&self.config.spin, seconds);
        if self.config.spin.fit_to_unit_cube {
            if self.viewer.asset().is_none() {
                return;
            }
            self.viewer.transform_to_unit_cube();
            if let Some(asset) = self.viewer.asset() {
                let root = asset.root();
                let root_transform = asset.transform(root);
                asset.set_transform(root, root_transform * rotation);
            }
        } else if let Some(asset) = self.viewer.asset() {
            let root = asset.root();
            let base = *self
                .spin_base
                .get_or_insert_with(|| asset.transform(root));
            asset.set_transform(root, base * rotation);
        }
    }
}

/// Rotation for `seconds` of spin, angle reduced modulo one turn in f64 so it
/// stays exact over long runs.
pub fn spin_rotation(spin: &SpinConfig, seconds: f64) -> Matrix4<f32> {
    let degrees = (spin.degrees_per_second * seconds).rem_euclid(360.0) as f32;
    rotation(spin.axis, degrees)
}

pub fn rotation(axis: Vector3<f32>, degrees: f32) -> Matrix4<f32> {
    use cgmath::InnerSpace;
    Matrix4::from_axis_angle(axis.normalize(), Deg(degrees))
}
