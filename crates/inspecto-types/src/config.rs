use std::{fs, path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{InspectoError, Result};

pub const MIN_IMAGE_REFRESH_MS: u64 = 100;
pub const MAX_IMAGE_REFRESH_MS: u64 = 5_000;
pub const MAX_SETTLE_FRAMES: u32 = 120;
pub const MAX_CHECK_DELAY_TICKS: u32 = 600;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Frames to wait after arming before reading the render target; the host
    /// flushes new portrait content that many frames late.
    pub settle_frames: u32,
    /// Character-view render target reserved for the examine window.
    pub inspect_slot: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            settle_frames: 2,
            inspect_slot: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    pub image_refresh_ms: u64,
    pub check_delay_ticks: u32,
}

impl RefreshConfig {
    pub fn set_image_refresh_ms(&mut self, ms: u64) {
        self.image_refresh_ms = ms.clamp(MIN_IMAGE_REFRESH_MS, MAX_IMAGE_REFRESH_MS);
    }

    /// Refresh delay after an examination, clamped to the supported range.
    pub fn image_refresh_delay(&self) -> Duration {
        Duration::from_millis(
            self.image_refresh_ms
                .clamp(MIN_IMAGE_REFRESH_MS, MAX_IMAGE_REFRESH_MS),
        )
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            image_refresh_ms: 500,
            check_delay_ticks: 5,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub sort_by_update: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpsConfig {
    pub log_level: String,
}

impl Default for OpsConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InspectoConfig {
    pub capture: CaptureConfig,
    pub refresh: RefreshConfig,
    pub history: HistoryConfig,
    pub ops: OpsConfig,
}

impl InspectoConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref).map_err(|err| {
            InspectoError::Configuration(format!(
                "unable to read config file {}: {err}",
                path_ref.display()
            ))
        })?;
        toml::from_str(&contents).map_err(|err| {
            InspectoError::Configuration(format!(
                "failed to parse config file {}: {err}",
                path_ref.display()
            ))
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.capture.settle_frames > MAX_SETTLE_FRAMES {
            return Err(InspectoError::Configuration(format!(
                "capture.settle_frames must be at most {MAX_SETTLE_FRAMES}"
            )));
        }
        if self.refresh.check_delay_ticks == 0 {
            return Err(InspectoError::Configuration(
                "refresh.check_delay_ticks must be greater than zero".into(),
            ));
        }
        if self.refresh.check_delay_ticks > MAX_CHECK_DELAY_TICKS {
            return Err(InspectoError::Configuration(format!(
                "refresh.check_delay_ticks must be at most {MAX_CHECK_DELAY_TICKS}"
            )));
        }
        if self.ops.log_level.trim().is_empty() {
            return Err(InspectoError::Configuration(
                "ops.log_level must not be empty".into(),
            ));
        }
        Ok(())
    }
}
