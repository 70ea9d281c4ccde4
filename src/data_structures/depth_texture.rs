//! Depth image mirrored into a GPU texture.
//!
//! [`DepthTexture`] owns exactly one texture name in a [`TextureStore`] and
//! keeps its content in sync with a [`DepthImageSource`]. DEPTH16 pixels are
//! uploaded untouched as `Rg8Unorm`: the two 8-bit channels carry the low and
//! high byte of one 16-bit depth value, and shaders recombine them.
//!
//! Lifecycle:
//!
//! ```text
//! Unallocated --create--> Allocated (stale) --update--> Allocated (current)
//!      ^                        |  not yet available: content unchanged
//!      +--------destroy---------+
//! ```

use std::collections::HashMap;

use crate::depth::{AcquireError, DepthImage, DepthImageSource, Plane};

/// Name of a texture inside a [`TextureStore`]. Never zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Wrap {
    ClampToEdge,
    Repeat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Filter {
    Nearest,
    Linear,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SamplerParams {
    pub wrap_u: Wrap,
    pub wrap_v: Wrap,
    pub min_filter: Filter,
    pub mag_filter: Filter,
}

impl SamplerParams {
    /// Clamp-to-edge on both axes, linear minification and magnification.
    pub const DEPTH: SamplerParams = SamplerParams {
        wrap_u: Wrap::ClampToEdge,
        wrap_v: Wrap::ClampToEdge,
        min_filter: Filter::Linear,
        mag_filter: Filter::Linear,
    };
}

/// A texel upload: `height` rows of `width` two-byte texels, rows
/// `bytes_per_row` apart in `bytes`.
#[derive(Clone, Copy, Debug)]
pub struct Rg8Upload<'a> {
    pub width: u32,
    pub height: u32,
    pub bytes_per_row: u32,
    pub bytes: &'a [u8],
}

impl<'a> Rg8Upload<'a> {
    pub const BYTES_PER_TEXEL: u32 = 2;

    fn from_plane(width: u32, height: u32, plane: Plane<'a>) -> anyhow::Result<Self> {
        if plane.pixel_stride != Self::BYTES_PER_TEXEL {
            anyhow::bail!(
                "depth plane has a pixel stride of {} bytes, expected {}",
                plane.pixel_stride,
                Self::BYTES_PER_TEXEL
            );
        }
        Ok(Self {
            width,
            height,
            bytes_per_row: plane.row_stride,
            bytes: plane.bytes,
        })
    }

    fn row_bytes(&self) -> usize {
        self.width as usize * Self::BYTES_PER_TEXEL as usize
    }

    /// Bytes `bytes` must hold for this upload; the last row may omit its padding.
    pub fn required_bytes(&self) -> usize {
        match self.height {
            0 => 0,
            h => (h as usize - 1) * self.bytes_per_row as usize + self.row_bytes(),
        }
    }

    fn check_len(&self) -> anyhow::Result<()> {
        let needed = self.required_bytes();
        if self.bytes.len() < needed {
            anyhow::bail!(
                "depth plane holds {} bytes, upload needs {}",
                self.bytes.len(),
                needed
            );
        }
        Ok(())
    }

    /// The rows without padding, `width * 2` bytes each.
    pub fn tight_rows(&self) -> anyhow::Result<Vec<u8>> {
        self.check_len()?;
        let row = self.row_bytes();
        let mut packed = Vec::with_capacity(row * self.height as usize);
        for y in 0..self.height as usize {
            let start = y * self.bytes_per_row as usize;
            let bytes = self.bytes.get(start..start + row).ok_or_else(|| {
                anyhow::anyhow!("depth plane too short for row {y} of {}", self.height)
            })?;
            packed.extend_from_slice(bytes);
        }
        Ok(packed)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TextureStoreError {
    #[error("no graphics context is current on this thread")]
    NoContext,
    #[error("texture {0:?} does not exist")]
    UnknownTexture(TextureId),
}

/// The graphics-context seam of [`DepthTexture`]: allocate, configure, fill and
/// delete texture names.
pub trait TextureStore {
    fn generate(&mut self) -> anyhow::Result<TextureId>;

    fn configure(&mut self, id: TextureId, params: SamplerParams) -> anyhow::Result<()>;

    fn upload_rg8(&mut self, id: TextureId, upload: Rg8Upload<'_>) -> anyhow::Result<()>;

    fn delete(&mut self, id: TextureId);
}

#[derive(Debug, thiserror::Error)]
pub enum DepthTextureError {
    #[error("depth texture used before create()")]
    Unallocated,
    #[error("depth texture already created as {0:?}")]
    AlreadyCreated(TextureId),
}

/// One GPU texture holding the latest depth image.
#[derive(Debug, Default)]
pub struct DepthTexture {
    texture_id: Option<TextureId>,
    width: Option<u32>,
    height: Option<u32>,
}

impl DepthTexture {
    pub fn new() -> Self {
        Self::default()
    }

    /// The allocated texture, `None` until [`create`](Self::create) succeeds.
    pub fn texture_id(&self) -> Option<TextureId> {
        self.texture_id
    }

    /// Width of the last uploaded image, `None` before the first upload.
    pub fn width(&self) -> Option<u32> {
        self.width
    }

    pub fn height(&self) -> Option<u32> {
        self.height
    }

    /// Allocates and configures the texture. Must run once, with the graphics
    /// context current, before any [`update`](Self::update).
    pub fn create(&mut self, store: &mut impl TextureStore) -> anyhow::Result<()> {
        if let Some(id) = self.texture_id {
            return Err(DepthTextureError::AlreadyCreated(id).into());
        }
        let id = store.generate()?;
        if let Err(e) = store.configure(id, SamplerParams::DEPTH) {
            store.delete(id);
            return Err(e);
        }
        log::debug!("depth texture created as {:?}", id);
        self.texture_id = Some(id);
        Ok(())
    }

    /// Uploads the latest depth image of `source`.
    ///
    /// A source that has nothing yet leaves the texture as it was and is not
    /// an error. Any other failure is returned unchanged and leaves the recorded
    /// size untouched. The acquired image is released on every path.
    pub fn update<S: DepthImageSource>(
        &mut self,
        store: &mut impl TextureStore,
        source: &mut S,
    ) -> anyhow::Result<()> {
        let id = self.texture_id.ok_or(DepthTextureError::Unallocated)?;
        let image = match source.acquire_depth_image() {
            Ok(image) => image,
            Err(AcquireError::NotYetAvailable) => {
                log::trace!("depth image not yet available, keeping {:?}", id);
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        let (width, height) = (image.width(), image.height());
        let upload = Rg8Upload::from_plane(width, height, image.plane())?;
        store.upload_rg8(id, upload)?;
        drop(image);

        self.width = Some(width);
        self.height = Some(height);
        Ok(())
    }

    /// Releases the texture name. The resource can be created again afterwards.
    pub fn destroy(&mut self, store: &mut impl TextureStore) {
        if let Some(id) = self.texture_id.take() {
            store.delete(id);
            log::debug!("depth texture {:?} destroyed", id);
        }
        self.width = None;
        self.height = None;
    }
}

/// CPU-side texture written by [`MemoryTextureStore`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MemoryTexture {
    pub params: Option<SamplerParams>,
    pub width: u32,
    pub height: u32,
    /// Tightly packed RG8 texels.
    pub data: Vec<u8>,
    pub uploads: u32,
}

/// Texture store living in host memory.
///
/// Headless hosts use it to keep the depth texture logic running without a
/// GPU; [`detached`](Self::detached) models a thread with no current context.
#[derive(Debug)]
pub struct MemoryTextureStore {
    has_context: bool,
    next_id: u32,
    textures: HashMap<TextureId, MemoryTexture>,
}

impl Default for MemoryTextureStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTextureStore {
    pub fn new() -> Self {
        Self {
            has_context: true,
            next_id: 1,
            textures: HashMap::new(),
        }
    }

    pub fn detached() -> Self {
        Self {
            has_context: false,
            ..Self::new()
        }
    }

    pub fn texture(&self, id: TextureId) -> Option<&MemoryTexture> {
        self.textures.get(&id)
    }

    pub fn len(&self) -> usize {
        self.textures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }

    fn slot(&mut self, id: TextureId) -> anyhow::Result<&mut MemoryTexture> {
        if !self.has_context {
            return Err(TextureStoreError::NoContext.into());
        }
        self.textures
            .get_mut(&id)
            .ok_or_else(|| TextureStoreError::UnknownTexture(id).into())
    }
}

impl TextureStore for MemoryTextureStore {
    fn generate(&mut self) -> anyhow::Result<TextureId> {
        if !self.has_context {
            return Err(TextureStoreError::NoContext.into());
        }
        let id = TextureId(self.next_id);
        self.next_id += 1;
        self.textures.insert(id, MemoryTexture::default());
        Ok(id)
    }

    fn configure(&mut self, id: TextureId, params: SamplerParams) -> anyhow::Result<()> {
        self.slot(id)?.params = Some(params);
        Ok(())
    }

    fn upload_rg8(&mut self, id: TextureId, upload: Rg8Upload<'_>) -> anyhow::Result<()> {
        let data = upload.tight_rows()?;
        let texture = self.slot(id)?;
        texture.width = upload.width;
        texture.height = upload.height;
        texture.data = data;
        texture.uploads += 1;
        Ok(())
    }

    fn delete(&mut self, id: TextureId) {
        self.textures.remove(&id);
    }
}

#[derive(Debug)]
struct WgpuSlot {
    sampler: Option<wgpu::Sampler>,
    texture: Option<(wgpu::Texture, wgpu::TextureView)>,
    size: (u32, u32),
}

/// Texture store backed by a wgpu device.
///
/// wgpu textures have a fixed size, so a slot's texture is (re)created on the
/// first upload and whenever the image size changes.
#[derive(Debug)]
pub struct WgpuTextureStore {
    device: wgpu::Device,
    queue: wgpu::Queue,
    next_id: u32,
    slots: HashMap<TextureId, WgpuSlot>,
}

impl WgpuTextureStore {
    pub const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rg8Unorm;

    /// Device and queue are cheap handles, cloning them only clones the refs.
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue) -> Self {
        Self {
            device: device.clone(),
            queue: queue.clone(),
            next_id: 1,
            slots: HashMap::new(),
        }
    }

    pub fn texture(&self, id: TextureId) -> Option<&wgpu::Texture> {
        self.slots
            .get(&id)
            .and_then(|slot| slot.texture.as_ref())
            .map(|(texture, _)| texture)
    }

    pub fn view(&self, id: TextureId) -> Option<&wgpu::TextureView> {
        self.slots
            .get(&id)
            .and_then(|slot| slot.texture.as_ref())
            .map(|(_, view)| view)
    }

    pub fn sampler(&self, id: TextureId) -> Option<&wgpu::Sampler> {
        self.slots.get(&id).and_then(|slot| slot.sampler.as_ref())
    }
}

fn to_address_mode(wrap: Wrap) -> wgpu::AddressMode {
    match wrap {
        Wrap::ClampToEdge => wgpu::AddressMode::ClampToEdge,
        Wrap::Repeat => wgpu::AddressMode::Repeat,
    }
}

fn to_filter_mode(filter: Filter) -> wgpu::FilterMode {
    match filter {
        Filter::Nearest => wgpu::FilterMode::Nearest,
        Filter::Linear => wgpu::FilterMode::Linear,
    }
}

impl TextureStore for WgpuTextureStore {
    fn generate(&mut self) -> anyhow::Result<TextureId> {
        let id = TextureId(self.next_id);
        self.next_id += 1;
        self.slots.insert(
            id,
            WgpuSlot {
                sampler: None,
                texture: None,
                size: (0, 0),
            },
        );
        Ok(id)
    }

    fn configure(&mut self, id: TextureId, params: SamplerParams) -> anyhow::Result<()> {
        let slot = self
            .slots
            .get_mut(&id)
            .ok_or(TextureStoreError::UnknownTexture(id))?;
        slot.sampler = Some(self.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("depth texture sampler"),
            address_mode_u: to_address_mode(params.wrap_u),
            address_mode_v: to_address_mode(params.wrap_v),
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: to_filter_mode(params.mag_filter),
            min_filter: to_filter_mode(params.min_filter),
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        }));
        Ok(())
    }

    fn upload_rg8(&mut self, id: TextureId, upload: Rg8Upload<'_>) -> anyhow::Result<()> {
        let slot = self
            .slots
            .get_mut(&id)
            .ok_or(TextureStoreError::UnknownTexture(id))?;
        upload.check_len()?;
        let size = wgpu::Extent3d {
            width: upload.width.max(1),
            height: upload.height.max(1),
            depth_or_array_layers: 1,
        };
        if slot.texture.is_none() || slot.size != (upload.width, upload.height) {
            let texture = self.device.create_texture(&wgpu::TextureDescriptor {
                label: Some("depth texture"),
                size,
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: Self::FORMAT,
                usage: wgpu::TextureUsages::TEXTURE_BINDING
                    | wgpu::TextureUsages::COPY_DST
                    | wgpu::TextureUsages::COPY_SRC,
                view_formats: &[],
            });
            let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
            slot.texture = Some((texture, view));
            slot.size = (upload.width, upload.height);
        }
        if upload.width == 0 || upload.height == 0 {
            return Ok(());
        }
        let Some((texture, _)) = slot.texture.as_ref() else {
            return Err(TextureStoreError::UnknownTexture(id).into());
        };
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                aspect: wgpu::TextureAspect::All,
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
            },
            upload.bytes,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(upload.bytes_per_row),
                rows_per_image: Some(upload.height),
            },
            size,
        );
        Ok(())
    }

    fn delete(&mut self, id: TextureId) {
        if let Some(slot) = self.slots.remove(&id) {
            if let Some((texture, _)) = slot.texture {
                texture.destroy();
            }
        }
    }
}
