//! Configuration and report types for the demos.

use std::path::Path;

use anyhow::{ensure, Context, Result};
use mirnet_burn::{ChannelPlan, MultiScaleResidualBlockConfig};
use serde::{Deserialize, Serialize};

/// Settings for a single forward run of the block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Block configuration.
    pub block: MultiScaleResidualBlockConfig,
    /// Batch size of the random input.
    pub batch_size: usize,
    /// Height of the random input; a multiple of 4.
    pub height: usize,
    /// Width of the random input; a multiple of 4.
    pub width: usize,
    /// Feed the block a `[batch, height, width, channels]` tensor instead of
    /// `[batch, channels, height, width]`.
    pub channels_last: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            block: MultiScaleResidualBlockConfig::new(64, 1.25, 1),
            batch_size: 1,
            height: 64,
            width: 64,
            channels_last: false,
        }
    }
}

impl RunConfig {
    /// Reads a JSON configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        serde_json::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Writes the configuration as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write config file: {}", path.display()))
    }

    /// Checks the input geometry; the block configuration is checked when the block
    /// is built.
    pub fn validate(&self) -> Result<()> {
        ensure!(self.batch_size > 0, "Batch size must be greater than 0");
        ensure!(
            self.height > 0 && self.width > 0,
            "Input height and width must be positive"
        );
        Ok(())
    }

    /// Input shape in the layout the block will be fed.
    pub const fn input_shape(&self) -> [usize; 4] {
        if self.channels_last {
            [self.batch_size, self.height, self.width, self.block.channels]
        } else {
            [self.batch_size, self.block.channels, self.height, self.width]
        }
    }
}

/// Outcome of a forward run, printed as JSON by `msrb run`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Backend the block ran on.
    pub backend: String,
    /// Channel counts of the pyramid levels.
    pub plan: ChannelPlan,
    /// Number of learned scalars in the block.
    pub num_params: usize,
    /// Shape of the random input.
    pub input_shape: Vec<usize>,
    /// Shape of the block's output.
    pub output_shape: Vec<usize>,
    /// Wall time of the forward call in milliseconds.
    pub elapsed_ms: f64,
}
