//! Host lifecycle and the application event loop.
//!
//! The host maps winit's lifecycle onto the frame driver:
//!
//! - first `resumed`: create the window, GPU context and viewer, load the
//!   model and environment, apply entity overrides (onCreate)
//! - every `resumed`: arm the driver (onResume)
//! - `suspended`: disarm the driver (onPause)
//! - `RedrawRequested`: one driver tick; failures are logged and the next
//!   refresh is already scheduled
//! - `CloseRequested`: disarm, drop the driver with its viewer and exit
//!   (onDestroy)

use std::sync::Arc;

use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    window::Window,
};

use crate::{
    choreographer::WindowRefresh,
    clock::monotonic_nanos,
    config::{ModelFormat, ViewerConfig},
    context::Context,
    driver::{DriverConfig, FrameDriver},
    render::GltfViewer,
    resources,
    viewer::{Asset, ModelViewer},
};

/// Hides the configured entities and, when asked to, zeroes the emissive
/// factor of every renderable entity. Returns how many entities were hidden.
pub fn apply_asset_overrides(asset: &mut dyn Asset, config: &ViewerConfig) -> usize {
    let mut hidden = 0;
    for entity in asset.entities() {
        if !asset.is_renderable(entity) {
            continue;
        }
        if asset.name(entity).is_some_and(|name| config.is_hidden(name)) {
            asset.set_visible(entity, false);
            hidden += 1;
        }
        if config.disable_emissive {
            asset.set_emissive_factor(entity, [0.0; 3]);
        }
    }
    log::debug!("asset overrides: {hidden} entities hidden");
    hidden
}

/// Loads the configured model and environment into `viewer`.
pub async fn load_scene(viewer: &mut GltfViewer, config: &ViewerConfig) -> anyhow::Result<()> {
    if let Some(source) = &config.model {
        let files =
            resources::read_model_files(&config.models_dir(), &source.file_name()).await?;
        match source.format {
            ModelFormat::Glb => viewer.load_model_glb(&files.main)?,
            ModelFormat::Gltf => viewer.load_model_gltf(&files.main, |uri| files.resolve(uri))?,
        }
        log::info!("loaded model {}", source.file_name());
        if let Some(asset) = viewer.asset() {
            apply_asset_overrides(asset, config);
        }
    }
    if let Some(name) = &config.environment {
        let environment = resources::read_environment(
            &config.environment_dir(name),
            name,
            config.indirect_light_intensity,
        )
        .await?;
        viewer.load_environment(&environment)?;
    }
    Ok(())
}

type Driver = FrameDriver<GltfViewer, WindowRefresh>;

pub struct App {
    async_runtime: tokio::runtime::Runtime,
    config: ViewerConfig,
    driver: Option<Driver>,
    error: Option<anyhow::Error>,
}

impl App {
    pub fn new(config: ViewerConfig) -> anyhow::Result<Self> {
        Ok(Self {
            async_runtime: tokio::runtime::Runtime::new()?,
            config,
            driver: None,
            error: None,
        })
    }

    /// The error that stopped the event loop, if any.
    pub fn take_error(&mut self) -> Option<anyhow::Error> {
        self.error.take()
    }

    fn create(&self, event_loop: &ActiveEventLoop) -> anyhow::Result<Driver> {
        let window_attributes = Window::default_attributes().with_title(self.config.title.clone());
        let window = Arc::new(event_loop.create_window(window_attributes)?);

        let config = &self.config;
        let surface_window = window.clone();
        let viewer = self.async_runtime.block_on(async move {
            let ctx = Context::new(surface_window).await?;
            let mut viewer = GltfViewer::new(ctx, config);
            load_scene(&mut viewer, config).await?;
            anyhow::Ok(viewer)
        })?;

        Ok(FrameDriver::new(
            viewer,
            WindowRefresh::new(window),
            monotonic_nanos(),
            DriverConfig::from(config),
        ))
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.driver.is_none() {
            match self.create(event_loop) {
                Ok(driver) => {
                    log::info!("viewer created");
                    self.driver = Some(driver);
                }
                Err(e) => {
                    log::error!("App initialization failed: {e:#}");
                    self.error = Some(e);
                    event_loop.exit();
                    return;
                }
            }
        }
        if let Some(driver) = self.driver.as_mut() {
            driver.arm();
        }
    }

    fn suspended(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(driver) = self.driver.as_mut() {
            driver.disarm();
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        let Some(driver) = self.driver.as_mut() else {
            return;
        };

        match event {
            WindowEvent::CloseRequested => {
                driver.disarm();
                log::info!("closing after {} frames", driver.ticks());
                self.driver = None;
                event_loop.exit();
            }
            WindowEvent::Resized(size) => driver.viewer_mut().resize(size.width, size.height),
            WindowEvent::RedrawRequested => {
                if let Err(e) = driver.on_tick(monotonic_nanos()) {
                    log::error!("Unable to render {e:#}");
                }
            }
            _ => {}
        }
    }
}

/// Opens the viewer window and runs until it is closed.
pub fn run(config: ViewerConfig) -> anyhow::Result<()> {
    crate::init();

    let event_loop = EventLoop::new()?;
    let mut app = App::new(config)?;
    event_loop.run_app(&mut app)?;

    match app.take_error() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
