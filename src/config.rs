//! Top-level configuration of a detection and tracking pipeline.

use serde::{Deserialize, Serialize};

use crate::detection::DecoderConfig;
use crate::error::ConfigError;
use crate::tracker::TrackerConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub decoder: DecoderConfig,
    pub tracker: TrackerConfig,
    /// Associate detections across frames; plain per-frame detections otherwise
    pub with_tracking: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            decoder: DecoderConfig::default(),
            tracker: TrackerConfig::default(),
            with_tracking: true,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.decoder.validate()?;
        self.tracker.validate()
    }
}
