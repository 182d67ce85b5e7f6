// src/config.rs

use std::fs;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::capabilities::TrackerKind;
use crate::error::Error;

/// Root configuration, loaded from a yaml file. Every field defaults, so a
/// partial or empty file works.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// Run a full detector pass every N processed frames
    #[serde(default = "default_redetect_interval")]
    pub redetect_interval: u32,
    /// Minimum IoU for a detection to confirm an existing track
    #[serde(default = "default_iou_threshold")]
    pub iou_threshold: f32,
    /// Native visual-tracker variant seeded per track
    #[serde(default)]
    pub tracker: TrackerKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Process every (skip_frames + 1)-th source frame; 0 processes all
    #[serde(default)]
    pub skip_frames: u32,
}

fn default_redetect_interval() -> u32 {
    30
}

fn default_iou_threshold() -> f32 {
    0.3
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            redetect_interval: default_redetect_interval(),
            iou_threshold: default_iou_threshold(),
            tracker: TrackerKind::default(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { skip_frames: 0 }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path))?;
        let config: Config =
            serde_yaml::from_str(&contents).with_context(|| format!("Failed to parse {}", path))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<(), Error> {
        if self.tracking.redetect_interval == 0 {
            return Err(Error::Config {
                reason: "redetect_interval must be at least 1".into(),
            });
        }
        if !(self.tracking.iou_threshold > 0.0 && self.tracking.iou_threshold < 1.0) {
            return Err(Error::Config {
                reason: format!(
                    "iou_threshold must lie in (0, 1), got {}",
                    self.tracking.iou_threshold
                ),
            });
        }
        Ok(())
    }
}
