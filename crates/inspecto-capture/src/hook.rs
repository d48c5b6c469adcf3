use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    sync::atomic::{AtomicBool, AtomicU32, Ordering},
};

use inspecto_types::{config::CaptureConfig, pixels::PixelBuffer, Result};
use tracing::{debug, error, info};

use crate::{
    backend::{CaptureBackend, RenderTargetLookup, TextureDesc},
    capture_error,
    handoff::CaptureSlot,
    region::{copy_rows, MappedRegion},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HookSettings {
    pub settle_frames: u32,
    pub inspect_slot: u32,
}

impl Default for HookSettings {
    fn default() -> Self {
        Self::from(&CaptureConfig::default())
    }
}

impl From<&CaptureConfig> for HookSettings {
    fn from(config: &CaptureConfig) -> Self {
        Self {
            settle_frames: config.settle_frames,
            inspect_slot: config.inspect_slot,
        }
    }
}

/// Interception point inside the host's per-frame command processing.
///
/// Any thread may arm a capture; the capture itself runs on the render
/// context the next time the host processes commands after the settle delay.
/// Results are published whether or not the capture succeeded.
pub struct RenderHook<B: CaptureBackend> {
    backend: B,
    settings: HookSettings,
    armed: AtomicBool,
    /// Written by the render context only.
    frames_since_armed: AtomicU32,
    published: CaptureSlot,
}

impl<B: CaptureBackend> RenderHook<B> {
    pub fn new(backend: B, settings: HookSettings) -> Self {
        info!(
            "Render hook ready (slot {}, settle {} frames)",
            settings.inspect_slot, settings.settle_frames
        );
        Self {
            backend,
            settings,
            armed: AtomicBool::new(false),
            frames_since_armed: AtomicU32::new(0),
            published: CaptureSlot::new(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn settings(&self) -> HookSettings {
        self.settings
    }

    /// Arms a capture. Arming an armed hook changes nothing.
    pub fn request_capture(&self) {
        if !self.armed.swap(true, Ordering::AcqRel) {
            debug!("Inspect portrait capture armed");
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Acquire)
    }

    /// Takes the most recent capture result, if one is waiting.
    pub fn take_published(&self) -> Option<PixelBuffer> {
        self.published.take()
    }

    pub fn published_count(&self) -> u64 {
        self.published.published_count()
    }

    /// Detour body for the host's command-processing routine: runs the frame
    /// step, then always hands control to the original routine.
    pub fn process_commands<R>(&self, original: impl FnOnce() -> R) -> R {
        self.on_frame();
        original()
    }

    /// One render-context frame. Returns `true` when a result was published.
    pub fn on_frame(&self) -> bool {
        if !self.armed.load(Ordering::Acquire) {
            return false;
        }
        let seen = self.frames_since_armed.fetch_add(1, Ordering::AcqRel);
        if seen < self.settings.settle_frames {
            return false;
        }

        let buffer = self.capture_guarded();
        debug!(
            "Publishing inspect portrait {}x{} ({} bytes)",
            buffer.width(),
            buffer.height(),
            buffer.data().len()
        );
        self.published.publish(buffer);
        self.frames_since_armed.store(0, Ordering::Release);
        self.armed.store(false, Ordering::Release);
        true
    }

    /// Capture that never fails: errors and backend panics become an empty
    /// buffer after being logged.
    fn capture_guarded(&self) -> PixelBuffer {
        match panic::catch_unwind(AssertUnwindSafe(|| self.capture())) {
            Ok(Ok(buffer)) => buffer,
            Ok(Err(err)) => {
                error!("Inspect portrait capture failed: {err}");
                PixelBuffer::empty()
            }
            Err(payload) => {
                error!(
                    "Inspect portrait capture panicked: {}",
                    panic_message(payload.as_ref())
                );
                PixelBuffer::empty()
            }
        }
    }

    /// Reads the inspection render target through a staging copy.
    ///
    /// A missing target or null texture yields the empty buffer, not an error.
    pub fn capture(&self) -> Result<PixelBuffer> {
        let slot = self.settings.inspect_slot;
        let texture = match self.backend.render_target(slot) {
            RenderTargetLookup::Ready(texture) => texture,
            RenderTargetLookup::Missing => {
                debug!("No character-view render target in slot {slot}");
                return Ok(PixelBuffer::empty());
            }
            RenderTargetLookup::NullHandle => {
                debug!("Character-view render target {slot} has no GPU texture");
                return Ok(PixelBuffer::empty());
            }
        };

        let desc = self.backend.describe(&texture);
        let order = desc.format.channel_order().ok_or_else(|| {
            capture_error(format!("unsupported render target format {:?}", desc.format))
        })?;

        let staging = StagingGuard {
            backend: &self.backend,
            staging: Some(self.backend.create_staging(&desc.staging_copy())?),
        };
        let copied = self.read_back(&texture, staging.get()?, &desc);
        drop(staging);

        PixelBuffer::new(desc.width, desc.height, order, copied?)
    }

    fn read_back(
        &self,
        texture: &B::Texture,
        staging: &B::Staging,
        desc: &TextureDesc,
    ) -> Result<Vec<u8>> {
        self.backend.copy_resource(texture, staging)?;
        let mapping = Mapping {
            mapped: self.backend.map_read(staging)?,
            _unmap: UnmapGuard {
                backend: &self.backend,
                staging,
            },
        };
        check_geometry(&mapping.mapped, desc)?;
        copy_rows(&mapping.mapped)
    }
}

/// Hands the staging texture back to the backend when dropped, unwinding
/// included.
struct StagingGuard<'a, B: CaptureBackend> {
    backend: &'a B,
    staging: Option<B::Staging>,
}

impl<B: CaptureBackend> StagingGuard<'_, B> {
    fn get(&self) -> Result<&B::Staging> {
        self.staging
            .as_ref()
            .ok_or_else(|| capture_error("staging texture already released"))
    }
}

impl<B: CaptureBackend> Drop for StagingGuard<'_, B> {
    fn drop(&mut self) {
        if let Some(staging) = self.staging.take() {
            self.backend.release_staging(staging);
        }
    }
}

/// A live mapping. Fields drop in order, so the mapped view is gone before
/// the backend unmaps.
struct Mapping<'a, B: CaptureBackend + 'a> {
    mapped: B::Mapped<'a>,
    _unmap: UnmapGuard<'a, B>,
}

struct UnmapGuard<'a, B: CaptureBackend> {
    backend: &'a B,
    staging: &'a B::Staging,
}

impl<B: CaptureBackend> Drop for UnmapGuard<'_, B> {
    fn drop(&mut self) {
        self.backend.unmap(self.staging);
    }
}

fn check_geometry<R: MappedRegion>(region: &R, desc: &TextureDesc) -> Result<()> {
    let row_len = desc.width as usize * inspecto_types::pixels::BYTES_PER_PIXEL;
    if region.row_len() != row_len || region.row_count() != desc.height as usize {
        return Err(capture_error(format!(
            "mapping exposes {} rows of {} bytes, texture is {}x{}",
            region.row_count(),
            region.row_len(),
            desc.width,
            desc.height
        )));
    }
    Ok(())
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}
