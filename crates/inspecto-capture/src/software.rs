//! In-memory stand-in for the host's render targets and graphics device.
//!
//! Mirrors the parts of the host that matter to a capture: rows are padded to
//! a 256-byte pitch when mapped, newly drawn content only becomes visible after
//! a configurable number of presented frames, and staging textures must be
//! described as CPU-readable, unbound staging resources.

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use inspecto_types::{pixels::BYTES_PER_PIXEL, Result};
use parking_lot::{Mutex, MutexGuard};
use tracing::debug;

use crate::{
    backend::{CaptureBackend, CpuAccess, PixelFormat, RenderTargetLookup, TextureDesc, Usage},
    capture_error,
    region::MappedRegion,
};

const ROW_PITCH_ALIGNMENT: usize = 256;

/// One-shot failure the next matching device call will report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    CreateStaging,
    Copy,
    Map,
    /// The next copy panics instead of returning an error.
    Panic,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GpuStats {
    pub staging_created: u64,
    pub staging_released: u64,
    pub copies: u64,
    pub maps: u64,
    pub unmaps: u64,
}

#[derive(Debug, Default)]
struct Counters {
    staging_created: AtomicU64,
    staging_released: AtomicU64,
    copies: AtomicU64,
    maps: AtomicU64,
    unmaps: AtomicU64,
}

#[derive(Debug)]
struct Surface {
    desc: TextureDesc,
    visible: Vec<u8>,
    queued: Option<(u32, Vec<u8>)>,
}

/// Handle to a software render target.
#[derive(Debug, Clone)]
pub struct SoftTexture {
    surface: Arc<Mutex<Surface>>,
}

#[derive(Debug)]
enum Target {
    Null,
    Ready(SoftTexture),
}

/// CPU-readable copy; reports its release to the device counters when dropped.
#[derive(Debug)]
pub struct SoftStaging {
    desc: TextureDesc,
    row_pitch: usize,
    memory: Mutex<Vec<u8>>,
    counters: Arc<Counters>,
}

impl Drop for SoftStaging {
    fn drop(&mut self) {
        self.counters.staging_released.fetch_add(1, Ordering::Relaxed);
    }
}

pub struct SoftMapping<'a> {
    memory: MutexGuard<'a, Vec<u8>>,
    row_pitch: usize,
    row_len: usize,
    rows: usize,
}

impl MappedRegion for SoftMapping<'_> {
    fn row_count(&self) -> usize {
        self.rows
    }

    fn row_len(&self) -> usize {
        self.row_len
    }

    fn read_row(&self, y: usize) -> Option<&[u8]> {
        if y >= self.rows {
            return None;
        }
        let start = y * self.row_pitch;
        self.memory.get(start..start + self.row_len)
    }
}

#[derive(Debug, Default)]
pub struct SoftwareGpu {
    targets: Mutex<HashMap<u32, Target>>,
    faults: Mutex<VecDeque<Fault>>,
    counters: Arc<Counters>,
    flush_latency: u32,
}

impl SoftwareGpu {
    /// Device whose drawn content is visible immediately.
    pub fn new() -> Self {
        Self::default()
    }

    /// Device whose drawn content becomes visible after `frames` calls to
    /// [`SoftwareGpu::end_frame`].
    pub fn with_flush_latency(frames: u32) -> Self {
        Self {
            flush_latency: frames,
            ..Self::default()
        }
    }

    /// Creates (or recreates) a cleared render target in `slot`.
    pub fn install_target(&self, slot: u32, width: u32, height: u32, format: PixelFormat) {
        let len = width as usize * height as usize * BYTES_PER_PIXEL;
        let surface = Surface {
            desc: TextureDesc::render_target(width, height, format),
            visible: vec![0; len],
            queued: None,
        };
        self.targets.lock().insert(
            slot,
            Target::Ready(SoftTexture {
                surface: Arc::new(Mutex::new(surface)),
            }),
        );
    }

    /// Registers a render target that has no texture behind it.
    pub fn install_null_target(&self, slot: u32) {
        self.targets.lock().insert(slot, Target::Null);
    }

    pub fn remove_target(&self, slot: u32) {
        self.targets.lock().remove(&slot);
    }

    /// Renders tightly packed pixels into `slot`, subject to the flush latency.
    pub fn draw(&self, slot: u32, pixels: Vec<u8>) -> Result<()> {
        let texture = match self.targets.lock().get(&slot) {
            Some(Target::Ready(texture)) => texture.clone(),
            _ => return Err(capture_error(format!("no drawable render target in slot {slot}"))),
        };
        let mut surface = texture.surface.lock();
        if pixels.len() != surface.visible.len() {
            return Err(capture_error(format!(
                "draw of {} bytes into a {}-byte target",
                pixels.len(),
                surface.visible.len()
            )));
        }
        if self.flush_latency == 0 {
            surface.visible = pixels;
        } else {
            surface.queued = Some((self.flush_latency, pixels));
        }
        Ok(())
    }

    /// Presents a frame, moving queued content closer to visibility.
    pub fn end_frame(&self) {
        for target in self.targets.lock().values() {
            let Target::Ready(texture) = target else {
                continue;
            };
            let mut surface = texture.surface.lock();
            let flushed = match surface.queued.as_mut() {
                Some((frames_left, _)) => {
                    *frames_left = frames_left.saturating_sub(1);
                    *frames_left == 0
                }
                None => false,
            };
            if flushed {
                if let Some((_, pixels)) = surface.queued.take() {
                    surface.visible = pixels;
                }
            }
        }
    }

    pub fn inject_fault(&self, fault: Fault) {
        self.faults.lock().push_back(fault);
    }

    pub fn stats(&self) -> GpuStats {
        GpuStats {
            staging_created: self.counters.staging_created.load(Ordering::Relaxed),
            staging_released: self.counters.staging_released.load(Ordering::Relaxed),
            copies: self.counters.copies.load(Ordering::Relaxed),
            maps: self.counters.maps.load(Ordering::Relaxed),
            unmaps: self.counters.unmaps.load(Ordering::Relaxed),
        }
    }

    fn take_fault(&self, kind: Fault) -> bool {
        let mut faults = self.faults.lock();
        match faults.iter().position(|fault| *fault == kind) {
            Some(index) => {
                faults.remove(index);
                true
            }
            None => false,
        }
    }
}

impl CaptureBackend for SoftwareGpu {
    type Texture = SoftTexture;
    type Staging = SoftStaging;
    type Mapped<'a> = SoftMapping<'a> where Self: 'a;

    fn render_target(&self, slot: u32) -> RenderTargetLookup<SoftTexture> {
        match self.targets.lock().get(&slot) {
            None => RenderTargetLookup::Missing,
            Some(Target::Null) => RenderTargetLookup::NullHandle,
            Some(Target::Ready(texture)) => RenderTargetLookup::Ready(texture.clone()),
        }
    }

    fn describe(&self, texture: &SoftTexture) -> TextureDesc {
        texture.surface.lock().desc
    }

    fn create_staging(&self, desc: &TextureDesc) -> Result<SoftStaging> {
        if self.take_fault(Fault::CreateStaging) {
            return Err(capture_error("injected fault: staging texture creation"));
        }
        if desc.usage != Usage::Staging
            || desc.cpu_access != CpuAccess::Read
            || !desc.bind_flags.is_empty()
        {
            return Err(capture_error(format!("invalid staging description {desc:?}")));
        }
        let row_pitch =
            (desc.width as usize * BYTES_PER_PIXEL).next_multiple_of(ROW_PITCH_ALIGNMENT);
        self.counters.staging_created.fetch_add(1, Ordering::Relaxed);
        debug!(
            "Software staging texture {}x{} (pitch {row_pitch})",
            desc.width, desc.height
        );
        Ok(SoftStaging {
            desc: *desc,
            row_pitch,
            memory: Mutex::new(vec![0; row_pitch * desc.height as usize]),
            counters: Arc::clone(&self.counters),
        })
    }

    fn copy_resource(&self, source: &SoftTexture, destination: &SoftStaging) -> Result<()> {
        if self.take_fault(Fault::Panic) {
            panic!("injected fault: device removed during copy");
        }
        if self.take_fault(Fault::Copy) {
            return Err(capture_error("injected fault: resource copy"));
        }
        let surface = source.surface.lock();
        if (surface.desc.width, surface.desc.height)
            != (destination.desc.width, destination.desc.height)
        {
            return Err(capture_error("copy between textures of different size"));
        }
        let row_len = surface.desc.width as usize * BYTES_PER_PIXEL;
        let mut memory = destination.memory.lock();
        if row_len > 0 {
            for (y, row) in surface.visible.chunks_exact(row_len).enumerate() {
                let start = y * destination.row_pitch;
                memory[start..start + row_len].copy_from_slice(row);
            }
        }
        self.counters.copies.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn map_read<'a>(&'a self, staging: &'a SoftStaging) -> Result<SoftMapping<'a>> {
        if self.take_fault(Fault::Map) {
            return Err(capture_error("injected fault: map for read"));
        }
        self.counters.maps.fetch_add(1, Ordering::Relaxed);
        Ok(SoftMapping {
            memory: staging.memory.lock(),
            row_pitch: staging.row_pitch,
            row_len: staging.desc.width as usize * BYTES_PER_PIXEL,
            rows: staging.desc.height as usize,
        })
    }

    fn unmap(&self, _staging: &SoftStaging) {
        self.counters.unmaps.fetch_add(1, Ordering::Relaxed);
    }

    fn release_staging(&self, staging: SoftStaging) {
        drop(staging);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::copy_rows;

    #[test]
    fn mapped_rows_are_pitch_aligned() {
        let gpu = SoftwareGpu::new();
        gpu.install_target(1, 3, 2, PixelFormat::Bgra8Unorm);
        gpu.draw(1, (0..24).collect()).expect("draw");

        let RenderTargetLookup::Ready(texture) = gpu.render_target(1) else {
            panic!("target should be ready");
        };
        let staging = gpu
            .create_staging(&gpu.describe(&texture).staging_copy())
            .expect("staging");
        assert_eq!(staging.row_pitch, ROW_PITCH_ALIGNMENT);
        gpu.copy_resource(&texture, &staging).expect("copy");

        let mapping = gpu.map_read(&staging).expect("map");
        assert_eq!(mapping.read_row(1), Some(&(12..24).collect::<Vec<u8>>()[..]));
        assert_eq!(copy_rows(&mapping).expect("copy"), (0..24).collect::<Vec<u8>>());
    }

    #[test]
    fn rejects_bindable_staging_description() {
        let gpu = SoftwareGpu::new();
        let live = TextureDesc::render_target(2, 2, PixelFormat::Bgra8Unorm);
        assert!(gpu.create_staging(&live).is_err());
        assert_eq!(gpu.stats().staging_created, 0);
    }

    #[test]
    fn queued_content_waits_for_flush() {
        let gpu = SoftwareGpu::with_flush_latency(2);
        gpu.install_target(1, 1, 1, PixelFormat::Bgra8Unorm);
        gpu.draw(1, vec![7; 4]).expect("draw");

        let RenderTargetLookup::Ready(texture) = gpu.render_target(1) else {
            panic!("target should be ready");
        };
        gpu.end_frame();
        assert_eq!(texture.surface.lock().visible, vec![0; 4]);
        gpu.end_frame();
        assert_eq!(texture.surface.lock().visible, vec![7; 4]);
    }

    #[test]
    fn lookup_distinguishes_missing_and_null() {
        let gpu = SoftwareGpu::new();
        gpu.install_null_target(1);
        assert!(matches!(gpu.render_target(1), RenderTargetLookup::NullHandle));
        assert!(matches!(gpu.render_target(2), RenderTargetLookup::Missing));
        assert!(gpu.draw(1, Vec::new()).is_err());
        gpu.remove_target(1);
        assert!(matches!(gpu.render_target(1), RenderTargetLookup::Missing));
    }
}
