//! Capabilities the render hook needs from the host's graphics stack.

use inspecto_types::{pixels::ChannelOrder, Result};
use serde::{Deserialize, Serialize};

use crate::region::MappedRegion;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    Bgra8Unorm,
    Bgra8UnormSrgb,
    Rgba8Unorm,
    Rgba8UnormSrgb,
    /// Host format code with no CPU-side representation here.
    Unsupported(u32),
}

impl PixelFormat {
    /// Channel order of a 4-byte-per-pixel format, `None` for anything else.
    pub fn channel_order(self) -> Option<ChannelOrder> {
        match self {
            PixelFormat::Bgra8Unorm | PixelFormat::Bgra8UnormSrgb => Some(ChannelOrder::Bgra),
            PixelFormat::Rgba8Unorm | PixelFormat::Rgba8UnormSrgb => Some(ChannelOrder::Rgba),
            PixelFormat::Unsupported(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Usage {
    Default,
    Dynamic,
    Staging,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BindFlags(pub u32);

impl BindFlags {
    pub const NONE: BindFlags = BindFlags(0);
    pub const SHADER_RESOURCE: BindFlags = BindFlags(0x8);
    pub const RENDER_TARGET: BindFlags = BindFlags(0x20);

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for BindFlags {
    type Output = BindFlags;

    fn bitor(self, rhs: Self) -> Self::Output {
        BindFlags(self.0 | rhs.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CpuAccess {
    None,
    Read,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextureDesc {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub mip_levels: u32,
    pub array_size: u32,
    pub sample_count: u32,
    pub sample_quality: u32,
    pub usage: Usage,
    pub bind_flags: BindFlags,
    pub cpu_access: CpuAccess,
    pub option_flags: u32,
}

impl TextureDesc {
    /// Description of a GPU render target as the host creates it.
    pub fn render_target(width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            width,
            height,
            format,
            mip_levels: 1,
            array_size: 1,
            sample_count: 1,
            sample_quality: 0,
            usage: Usage::Default,
            bind_flags: BindFlags::RENDER_TARGET | BindFlags::SHADER_RESOURCE,
            cpu_access: CpuAccess::None,
            option_flags: 0,
        }
    }

    /// CPU-readable twin of this texture: same size, format and option flags,
    /// a single unsampled subresource, no bind flags.
    pub fn staging_copy(&self) -> Self {
        Self {
            width: self.width,
            height: self.height,
            format: self.format,
            mip_levels: 1,
            array_size: 1,
            sample_count: 1,
            sample_quality: 0,
            usage: Usage::Staging,
            bind_flags: BindFlags::NONE,
            cpu_access: CpuAccess::Read,
            option_flags: self.option_flags,
        }
    }
}

/// Result of asking the host for a character-view render target.
#[derive(Debug, Clone)]
pub enum RenderTargetLookup<T> {
    /// The host has no render target in that slot.
    Missing,
    /// The render target exists but has no GPU texture behind it yet.
    NullHandle,
    Ready(T),
}

/// Render-target accessor plus the handful of device calls a capture needs.
///
/// Every call happens on the render context, inside the host's per-frame
/// command processing, so implementations may assume exclusive use of the
/// immediate device context for the duration of a call.
pub trait CaptureBackend: Send + Sync {
    type Texture;
    type Staging;
    type Mapped<'a>: MappedRegion
    where
        Self: 'a;

    fn render_target(&self, slot: u32) -> RenderTargetLookup<Self::Texture>;
    fn describe(&self, texture: &Self::Texture) -> TextureDesc;
    fn create_staging(&self, desc: &TextureDesc) -> Result<Self::Staging>;
    fn copy_resource(&self, source: &Self::Texture, destination: &Self::Staging) -> Result<()>;
    fn map_read<'a>(&'a self, staging: &'a Self::Staging) -> Result<Self::Mapped<'a>>;
    fn unmap(&self, staging: &Self::Staging);
    /// Gives the staging texture back to the device.
    fn release_staging(&self, staging: Self::Staging);
}
