//! GPU device, queue and the target frames are drawn into.
//!
//! A [`Context`] is created either for a winit window (presenting to its
//! surface) or headless (drawing into an offscreen texture that tests can read
//! back).

use std::sync::Arc;

use anyhow::Context as _;
use winit::window::Window;

use crate::data_structures::texture::Texture;

/// Format of the offscreen target of a headless context.
pub const OFFSCREEN_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

#[derive(Debug)]
pub enum RenderTarget {
    Surface {
        surface: wgpu::Surface<'static>,
        window: Arc<Window>,
    },
    Offscreen {
        texture: wgpu::Texture,
    },
}

/// A frame acquired for drawing.
pub enum Frame {
    Surface(wgpu::SurfaceTexture),
    Offscreen(wgpu::TextureView),
}

impl Frame {
    pub fn view(&self) -> wgpu::TextureView {
        match self {
            Frame::Surface(output) => output
                .texture
                .create_view(&wgpu::TextureViewDescriptor::default()),
            Frame::Offscreen(view) => view.clone(),
        }
    }

    pub fn present(self) {
        if let Frame::Surface(output) = self {
            output.present();
        }
    }
}

#[derive(Debug)]
pub struct Context {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub config: wgpu::SurfaceConfiguration,
    pub(crate) depth_texture: Texture,
    target: RenderTarget,
    is_surface_configured: bool,
}

async fn request_device(adapter: &wgpu::Adapter) -> anyhow::Result<(wgpu::Device, wgpu::Queue)> {
    log::debug!("requesting device from {:?}", adapter.get_info().name);
    adapter
        .request_device(&wgpu::DeviceDescriptor {
            label: Some("arjesus device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            ..Default::default()
        })
        .await
        .context("no suitable GPU device")
}

impl Context {
    /// Context presenting to `window`.
    pub async fn new(window: Arc<Window>) -> anyhow::Result<Self> {
        let size = window.inner_size();

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });
        let surface = instance.create_surface(window.clone())?;
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("no GPU adapter for the window surface")?;
        let (device, queue) = request_device(&adapter).await?;

        let surface_caps = surface.get_capabilities(&adapter);
        // Shaders write linear colour and rely on an sRGB target for the encode.
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first().copied())
            .context("surface reports no texture formats")?;
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: surface_caps
                .present_modes
                .first()
                .copied()
                .unwrap_or(wgpu::PresentMode::Fifo),
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        let depth_texture =
            Texture::create_depth_texture(&device, [config.width, config.height], "depth_texture");
        log::info!(
            "GPU context ready: {} ({:?}), surface {}x{}",
            adapter.get_info().name,
            config.format,
            config.width,
            config.height
        );

        let mut ctx = Self {
            device,
            queue,
            config,
            depth_texture,
            target: RenderTarget::Surface { surface, window },
            is_surface_configured: false,
        };
        ctx.resize(size.width, size.height);
        Ok(ctx)
    }

    /// Context drawing into an offscreen `width` x `height` texture.
    pub async fn headless(width: u32, height: u32) -> anyhow::Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .context("no GPU adapter available")?;
        let (device, queue) = request_device(&adapter).await?;

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            format: OFFSCREEN_FORMAT,
            width: width.max(1),
            height: height.max(1),
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: wgpu::CompositeAlphaMode::Auto,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        let texture = Self::offscreen_texture(&device, &config);
        let depth_texture =
            Texture::create_depth_texture(&device, [config.width, config.height], "depth_texture");

        Ok(Self {
            device,
            queue,
            config,
            depth_texture,
            target: RenderTarget::Offscreen { texture },
            is_surface_configured: true,
        })
    }

    fn offscreen_texture(
        device: &wgpu::Device,
        config: &wgpu::SurfaceConfiguration,
    ) -> wgpu::Texture {
        device.create_texture(&wgpu::TextureDescriptor {
            label: Some("offscreen target"),
            size: wgpu::Extent3d {
                width: config.width,
                height: config.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: config.format,
            usage: config.usage,
            view_formats: &[],
        })
    }

    pub fn window(&self) -> Option<&Arc<Window>> {
        match &self.target {
            RenderTarget::Surface { window, .. } => Some(window),
            RenderTarget::Offscreen { .. } => None,
        }
    }

    pub fn size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    pub fn aspect(&self) -> f32 {
        self.config.width as f32 / self.config.height.max(1) as f32
    }

    /// Resizes the target. Zero-sized requests (minimised windows) are ignored
    /// until a real size arrives.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.config.width = width;
        self.config.height = height;
        match &mut self.target {
            RenderTarget::Surface { surface, .. } => {
                surface.configure(&self.device, &self.config);
                self.is_surface_configured = true;
            }
            RenderTarget::Offscreen { texture } => {
                *texture = Self::offscreen_texture(&self.device, &self.config);
            }
        }
        self.depth_texture = Texture::create_depth_texture(
            &self.device,
            [self.config.width, self.config.height],
            "depth_texture",
        );
    }

    /// Reconfigures the surface at its current window size.
    pub fn reconfigure(&mut self) {
        let size = match &self.target {
            RenderTarget::Surface { window, .. } => window.inner_size(),
            RenderTarget::Offscreen { .. } => return,
        };
        self.resize(size.width, size.height);
    }

    /// Acquires the next frame, `Ok(None)` while the surface is unconfigured.
    pub fn acquire_frame(&self) -> Result<Option<Frame>, wgpu::SurfaceError> {
        if !self.is_surface_configured {
            return Ok(None);
        }
        match &self.target {
            RenderTarget::Surface { surface, .. } => {
                surface.get_current_texture().map(|t| Some(Frame::Surface(t)))
            }
            RenderTarget::Offscreen { texture } => Ok(Some(Frame::Offscreen(
                texture.create_view(&wgpu::TextureViewDescriptor::default()),
            ))),
        }
    }

    /// Reads the offscreen target back into an image.
    #[cfg(feature = "integration-tests")]
    pub async fn read_offscreen(&self) -> anyhow::Result<image::RgbaImage> {
        let RenderTarget::Offscreen { texture } = &self.target else {
            anyhow::bail!("only headless contexts can be read back");
        };
        let (width, height) = self.size();
        let u32_size = std::mem::size_of::<u32>() as u32;
        // rows must be aligned to 256 bytes
        let padded_row = (u32_size * width).div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT)
            * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let output_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("offscreen readback"),
            size: (padded_row * height) as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Readback Encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                aspect: wgpu::TextureAspect::All,
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &output_buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_row),
                    rows_per_image: Some(height),
                },
            },
            texture.size(),
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let (tx, rx) = futures_intrusive::channel::shared::oneshot_channel();
        let buffer_slice = output_buffer.slice(..);
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            tx.send(result).ok();
        });
        self.device.poll(wgpu::PollType::Wait {
            submission_index: None,
            timeout: Some(std::time::Duration::from_secs(3)),
        })?;
        rx.receive()
            .await
            .context("readback channel closed")??;

        let data = buffer_slice.get_mapped_range();
        let mut pixels = Vec::with_capacity((u32_size * width * height) as usize);
        for row in data.chunks(padded_row as usize).take(height as usize) {
            pixels.extend_from_slice(&row[..(u32_size * width) as usize]);
        }
        drop(data);
        output_buffer.unmap();
        image::RgbaImage::from_raw(width, height, pixels).context("readback size mismatch")
    }
}
