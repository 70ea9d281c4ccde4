//! Viewer configuration.
//!
//! [`ViewerConfig`] collects every knob of the viewer with defaults matching the
//! stock demo: the drone model, the Venetian crossroads environment and a spin
//! of 20 degrees per second around Z. Hosts adjust it either field by field or
//! through [`ViewerConfig::configure`].

use std::path::{Path, PathBuf};

use cgmath::Vector3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModelFormat {
    /// JSON glTF with side files next to it.
    Gltf,
    /// Self-contained binary glTF.
    Glb,
}

impl ModelFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ModelFormat::Gltf => "gltf",
            ModelFormat::Glb => "glb",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ModelSource {
    pub name: String,
    pub format: ModelFormat,
}

impl ModelSource {
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.name, self.format.extension())
    }
}

/// How the driver spins the model each tick.
#[derive(Clone, Debug, PartialEq)]
pub struct SpinConfig {
    pub enabled: bool,
    pub degrees_per_second: f64,
    pub axis: Vector3<f32>,
    /// Reset the root to the unit-cube fit before composing the rotation.
    pub fit_to_unit_cube: bool,
}

impl Default for SpinConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            degrees_per_second: 20.0,
            axis: Vector3::unit_z(),
            fit_to_unit_cube: true,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ViewerConfig {
    pub title: String,
    pub asset_root: PathBuf,
    pub model: Option<ModelSource>,
    pub environment: Option<String>,
    /// Indirect light intensity in lux, turned into an ambient term.
    pub indirect_light_intensity: f32,
    /// Where the unit-cube fit centres the model; the camera sits at the origin.
    pub centre_point: Vector3<f32>,
    pub spin: SpinConfig,
    pub animation_track: usize,
    /// Renderable entities with these names are hidden after loading.
    pub hidden_entities: Vec<String>,
    pub disable_emissive: bool,
    pub clear_colour: wgpu::Color,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            title: "arjesus".to_string(),
            asset_root: PathBuf::from("assets"),
            model: Some(ModelSource {
                name: "BusterDrone".to_string(),
                format: ModelFormat::Gltf,
            }),
            environment: Some("venetian_crossroads_2k".to_string()),
            indirect_light_intensity: 50_000.0,
            centre_point: Vector3::new(0.0, 0.0, -4.0),
            spin: SpinConfig::default(),
            animation_track: 0,
            hidden_entities: vec!["Scheibe_Boden_0".to_string()],
            disable_emissive: true,
            clear_colour: wgpu::Color::BLACK,
        }
    }
}

impl ViewerConfig {
    pub fn configure(mut self, f: impl FnOnce(&mut ViewerConfig)) -> Self {
        f(&mut self);
        self
    }

    pub fn models_dir(&self) -> PathBuf {
        self.asset_root.join("models")
    }

    pub fn environment_dir(&self, name: &str) -> PathBuf {
        self.asset_root.join("envs").join(name)
    }

    pub fn is_hidden(&self, name: &str) -> bool {
        self.hidden_entities.iter().any(|hidden| hidden == name)
    }

    pub fn with_asset_root(self, root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        self.configure(|c| c.asset_root = root)
    }
}
