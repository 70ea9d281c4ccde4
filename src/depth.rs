//! Depth image sources.
//!
//! A depth source produces DEPTH16 images: one plane, one little-endian `u16`
//! per pixel holding the distance in millimetres. Acquisition never blocks. A
//! source that has not produced a frame yet answers
//! [`AcquireError::NotYetAvailable`], which consumers treat as normal
//! steady-state behaviour during warm-up.
//!
//! Acquired images hold a slot of a bounded pool and give it back when dropped,
//! so every exit path of a consumer releases them.

use std::{
    fmt,
    sync::{Arc, Mutex, MutexGuard},
};

/// Failure to acquire a depth image.
#[derive(Debug, thiserror::Error)]
pub enum AcquireError {
    /// The producer has not generated a frame yet.
    #[error("depth image is not yet available")]
    NotYetAvailable,

    /// Too many images are held at once; release one before acquiring again.
    #[error("depth image pool exhausted ({limit} images already acquired)")]
    ResourceExhausted { limit: usize },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Byte layout of a single image plane.
#[derive(Clone, Copy, Debug)]
pub struct Plane<'a> {
    pub bytes: &'a [u8],
    /// Bytes between the starts of two consecutive rows.
    pub row_stride: u32,
    /// Bytes between two horizontally adjacent pixels.
    pub pixel_stride: u32,
}

/// An acquired depth image. Dropping it releases it back to its source.
pub trait DepthImage {
    fn width(&self) -> u32;

    fn height(&self) -> u32;

    fn plane(&self) -> Plane<'_>;

    /// Explicit release, equivalent to dropping the image.
    fn close(self)
    where
        Self: Sized,
    {
        drop(self);
    }
}

/// A non-blocking producer of depth images.
pub trait DepthImageSource {
    type Image: DepthImage;

    fn acquire_depth_image(&mut self) -> Result<Self::Image, AcquireError>;
}

/// One DEPTH16 frame as published by a producer.
#[derive(Clone, PartialEq, Eq)]
pub struct DepthFrame {
    width: u32,
    height: u32,
    row_stride: u32,
    data: Vec<u8>,
}

impl DepthFrame {
    pub const BYTES_PER_PIXEL: u32 = 2;

    /// Wraps a raw plane. `row_stride` must cover at least `width` pixels and
    /// `data` must hold `height` rows.
    pub fn new(width: u32, height: u32, row_stride: u32, data: Vec<u8>) -> anyhow::Result<Self> {
        let min_stride = Self::row_bytes(width)?;
        if row_stride < min_stride {
            anyhow::bail!("row stride {row_stride} is shorter than a row of {width} depth pixels");
        }
        let needed = match height {
            0 => 0,
            h => (h as usize - 1) * row_stride as usize + min_stride as usize,
        };
        if data.len() < needed {
            anyhow::bail!(
                "depth plane holds {} bytes, {}x{} with stride {} needs {}",
                data.len(),
                width,
                height,
                row_stride,
                needed
            );
        }
        Ok(Self {
            width,
            height,
            row_stride,
            data,
        })
    }

    /// Builds a tightly packed frame from depth values in millimetres.
    pub fn from_millimetres(width: u32, height: u32, depth: &[u16]) -> anyhow::Result<Self> {
        if depth.len() != width as usize * height as usize {
            anyhow::bail!(
                "expected {} depth values for {}x{}, got {}",
                width as usize * height as usize,
                width,
                height,
                depth.len()
            );
        }
        let data = depth.iter().flat_map(|d| d.to_le_bytes()).collect();
        Self::new(width, height, Self::row_bytes(width)?, data)
    }

    fn row_bytes(width: u32) -> anyhow::Result<u32> {
        width
            .checked_mul(Self::BYTES_PER_PIXEL)
            .ok_or_else(|| anyhow::anyhow!("a row of {width} depth pixels does not fit a u32 stride"))
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn plane(&self) -> Plane<'_> {
        Plane {
            bytes: &self.data,
            row_stride: self.row_stride,
            pixel_stride: Self::BYTES_PER_PIXEL,
        }
    }

    /// Depth in millimetres at `(x, y)`.
    pub fn depth_at(&self, x: u32, y: u32) -> Option<u16> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = y as usize * self.row_stride as usize + x as usize * Self::BYTES_PER_PIXEL as usize;
        let bytes = self.data.get(offset..offset + 2)?;
        Some(u16::from_le_bytes([bytes[0], bytes[1]]))
    }
}

impl fmt::Debug for DepthFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DepthFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("row_stride", &self.row_stride)
            .field("bytes", &self.data.len())
            .finish()
    }
}

#[derive(Debug)]
struct PoolState {
    latest: Option<Arc<DepthFrame>>,
    acquired: usize,
    published: u64,
}

/// Bounded pool connecting a depth producer to its consumers.
///
/// The producer publishes frames, consumers always get the latest one. At most
/// `max_acquired` images may be held at once. Clones share the same pool, so
/// the producer side can live on a capture thread.
#[derive(Debug, Clone)]
pub struct DepthImagePool {
    state: Arc<Mutex<PoolState>>,
    max_acquired: usize,
}

impl DepthImagePool {
    pub fn new(max_acquired: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(PoolState {
                latest: None,
                acquired: 0,
                published: 0,
            })),
            max_acquired,
        }
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        // A panicking consumer cannot leave the counters half-written.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Makes `frame` the latest frame. Images acquired earlier keep the frame
    /// they were acquired with.
    pub fn publish(&self, frame: DepthFrame) {
        let mut state = self.lock();
        state.published += 1;
        log::trace!("depth frame #{} published: {:?}", state.published, frame);
        state.latest = Some(Arc::new(frame));
    }

    /// Number of images currently held by consumers.
    pub fn acquired(&self) -> usize {
        self.lock().acquired
    }

    pub fn published(&self) -> u64 {
        self.lock().published
    }

    pub fn max_acquired(&self) -> usize {
        self.max_acquired
    }
}

impl Default for DepthImagePool {
    fn default() -> Self {
        Self::new(2)
    }
}

impl DepthImageSource for DepthImagePool {
    type Image = PooledDepthImage;

    fn acquire_depth_image(&mut self) -> Result<PooledDepthImage, AcquireError> {
        let mut state = self.lock();
        let frame = state.latest.clone().ok_or(AcquireError::NotYetAvailable)?;
        if state.acquired >= self.max_acquired {
            return Err(AcquireError::ResourceExhausted {
                limit: self.max_acquired,
            });
        }
        state.acquired += 1;
        Ok(PooledDepthImage {
            frame,
            pool: Arc::clone(&self.state),
        })
    }
}

/// Image handed out by [`DepthImagePool`]; releases its slot on drop.
#[derive(Debug)]
pub struct PooledDepthImage {
    frame: Arc<DepthFrame>,
    pool: Arc<Mutex<PoolState>>,
}

impl PooledDepthImage {
    pub fn frame(&self) -> &DepthFrame {
        &self.frame
    }
}

impl DepthImage for PooledDepthImage {
    fn width(&self) -> u32 {
        self.frame.width()
    }

    fn height(&self) -> u32 {
        self.frame.height()
    }

    fn plane(&self) -> Plane<'_> {
        self.frame.plane()
    }
}

impl Drop for PooledDepthImage {
    fn drop(&mut self) {
        let mut state = self.pool.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        state.acquired = state.acquired.saturating_sub(1);
    }
}
