use std::sync::Arc;

use image::RgbaImage;
use serde::{Deserialize, Serialize};

use crate::{InspectoError, Result};

pub const BYTES_PER_PIXEL: usize = 4;

/// Byte order of the four channels of each pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ChannelOrder {
    /// Host render targets are B8G8R8A8.
    #[default]
    Bgra,
    Rgba,
}

/// Interleaved 8-bit, 4-channel pixels, row-major, without row padding.
///
/// Either `data.len() == 4 * width * height`, or the buffer is empty
/// (no data, zero width, zero height), which stands for "capture unavailable".
/// The pixel data is shared and never mutated once built, so clones are cheap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    order: ChannelOrder,
    data: Arc<[u8]>,
}

impl PixelBuffer {
    pub fn new(width: u32, height: u32, order: ChannelOrder, data: Vec<u8>) -> Result<Self> {
        let expected = Self::expected_len(width, height);
        if data.len() != expected || (expected == 0 && (width, height) != (0, 0)) {
            return Err(InspectoError::InvalidPixelBuffer {
                width,
                height,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            order,
            data: data.into(),
        })
    }

    pub fn empty() -> Self {
        Self {
            width: 0,
            height: 0,
            order: ChannelOrder::default(),
            data: Arc::from(Vec::new()),
        }
    }

    pub fn expected_len(width: u32, height: u32) -> usize {
        BYTES_PER_PIXEL * width as usize * height as usize
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn order(&self) -> ChannelOrder {
        self.order
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Converts into an RGBA image suitable for texture upload or PNG export.
    /// Returns `None` for the empty buffer.
    pub fn to_rgba_image(&self) -> Option<RgbaImage> {
        if self.is_empty() {
            return None;
        }
        let mut raw = self.data.to_vec();
        if self.order == ChannelOrder::Bgra {
            for px in raw.chunks_exact_mut(BYTES_PER_PIXEL) {
                px.swap(0, 2);
            }
        }
        RgbaImage::from_raw(self.width, self.height, raw)
    }
}

impl Default for PixelBuffer {
    fn default() -> Self {
        Self::empty()
    }
}
