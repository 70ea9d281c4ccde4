use std::path::PathBuf;

use anyhow::Result;
use arjesus::config::{ModelFormat, ModelSource, ViewerConfig};
use clap::Parser;

/// Spinning glTF viewer
#[derive(Parser)]
#[command(name = "arjesus")]
#[command(about = "Shows an animated glTF model that spins every display refresh")]
struct Cli {
    /// Directory holding `models/` and `envs/`
    #[arg(long, default_value = "assets")]
    assets: PathBuf,

    /// Model name inside `models/`, without extension
    #[arg(long, default_value = "BusterDrone")]
    model: String,

    /// Load `<model>.glb` instead of `<model>.gltf`
    #[arg(long)]
    glb: bool,

    /// Environment name inside `envs/`
    #[arg(long, default_value = "venetian_crossroads_2k")]
    environment: String,

    /// Plain clear colour instead of an environment
    #[arg(long, conflicts_with = "environment")]
    no_environment: bool,

    /// Spin speed in degrees per second
    #[arg(long, default_value_t = 20.0)]
    spin_speed: f64,

    #[arg(long)]
    no_spin: bool,

    /// Keep the model's own root transform instead of fitting a unit cube
    #[arg(long)]
    no_unit_cube: bool,

    /// Hide renderable entities with this name (repeatable)
    #[arg(long, default_values_t = vec!["Scheibe_Boden_0".to_string()])]
    hide: Vec<String>,

    /// Keep emissive factors from the file
    #[arg(long)]
    keep_emissive: bool,

    /// Indirect light intensity in lux
    #[arg(long, default_value_t = 50_000.0)]
    indirect_intensity: f32,
}

impl Cli {
    fn into_config(self) -> ViewerConfig {
        ViewerConfig::default().configure(|c| {
            c.asset_root = self.assets;
            c.model = Some(ModelSource {
                name: self.model,
                format: if self.glb {
                    ModelFormat::Glb
                } else {
                    ModelFormat::Gltf
                },
            });
            c.environment = (!self.no_environment).then_some(self.environment);
            c.spin.enabled = !self.no_spin;
            c.spin.degrees_per_second = self.spin_speed;
            c.spin.fit_to_unit_cube = !self.no_unit_cube;
            c.hidden_entities = self.hide;
            c.disable_emissive = !self.keep_emissive;
            c.indirect_light_intensity = self.indirect_intensity;
        })
    }
}

fn main() -> Result<()> {
    let config = Cli::parse().into_config();
    arjesus::flow::run(config)
}
