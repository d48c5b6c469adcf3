//! Portrait capture from the host's character-view render target.

pub mod backend;
pub mod handoff;
pub mod hook;
pub mod region;
pub mod software;

use inspecto_types::InspectoError;

pub use backend::{CaptureBackend, PixelFormat, RenderTargetLookup, TextureDesc};
pub use hook::{HookSettings, RenderHook};
pub use software::SoftwareGpu;

pub fn capture_error(message: impl Into<String>) -> InspectoError {
    InspectoError::Capture(message.into())
}
