use super::decoder::{Symbology, TextExtraction};
use super::error::ScanError;
use super::frame::ScanRegion;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_TARGET_NAME: &str = "XR Origin";
pub const DEFAULT_CALLBACK_METHOD: &str = "OnMLKitResult";

/// 扫描节流：单飞 + 最小间隔
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Throttle {
    /// Drop submissions while a decode is still running.
    pub single_flight: bool,
    /// Minimum time between the end of one decode and the next accepted frame.
    pub min_interval_ms: u64,
}

impl Throttle {
    pub fn min_interval(&self) -> Option<Duration> {
        (self.min_interval_ms > 0).then(|| Duration::from_millis(self.min_interval_ms))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub target_name: String,
    pub callback_method: String,
    pub symbology: Symbology,
    /// 0 = 自动（CPU 核数，最多 4）
    pub worker_threads: usize,
    pub text_extraction: TextExtraction,
    pub region: ScanRegion,
    pub throttle: Throttle,
    pub suppress_repeats: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            target_name: DEFAULT_TARGET_NAME.to_string(),
            callback_method: DEFAULT_CALLBACK_METHOD.to_string(),
            symbology: Symbology::QrCode,
            worker_threads: 0,
            text_extraction: TextExtraction::PreserveSource,
            region: ScanRegion::default(),
            throttle: Throttle::default(),
            suppress_repeats: false,
        }
    }
}

impl ScanConfig {
    /// 近距离对焦模式：中心 40%，不降采样
    pub fn focus() -> Self {
        Self {
            region: ScanRegion {
                crop_factor: 0.4,
                downscale: 1,
            },
            throttle: Throttle {
                single_flight: true,
                min_interval_ms: 500,
            },
            ..Default::default()
        }
    }

    /// 广角模式：整帧，2 倍降采样
    pub fn wide() -> Self {
        Self {
            region: ScanRegion {
                crop_factor: 1.0,
                downscale: 2,
            },
            throttle: Throttle {
                single_flight: true,
                min_interval_ms: 500,
            },
            ..Default::default()
        }
    }

    pub fn from_json5(text: &str) -> Result<Self, ScanError> {
        let config: Self = json5::from_str(text).map_err(|e| ScanError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ScanError> {
        if self.target_name.trim().is_empty() {
            return Err(ScanError::Config("target_name must not be empty".to_string()));
        }
        self.region.validate()
    }

    pub fn resolved_worker_threads(&self) -> usize {
        if self.worker_threads > 0 {
            self.worker_threads
        } else {
            num_cpus::get().clamp(1, 4)
        }
    }
}
