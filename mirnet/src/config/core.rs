//! Core configuration for the multi-scale residual block.

use burn::{nn::Initializer, prelude::*};

use super::{
    channels::ChannelPlan,
    enums::{FusionKind, RefinementKind},
};
use crate::error::{MirNetError, MirNetResult};

/// Configuration for [`MultiScaleResidualBlock`](crate::MultiScaleResidualBlock).
///
/// `channels`, `channel_factor` and `groups` are the construction parameters of the
/// block; the remaining fields choose and tune its collaborators.
#[derive(Config, Debug)]
pub struct MultiScaleResidualBlockConfig {
    /// Channel count of the block's input and output (the `top` level).
    pub channels: usize,
    /// Channel growth ratio from one pyramid level to the next deeper one.
    pub channel_factor: f64,
    /// Convolution groups used inside the residual context blocks.
    pub groups: usize,
    /// Refinement applied to every level in both passes.
    #[config(default = "RefinementKind::ResidualContext")]
    pub refinement: RefinementKind,
    /// Fusion used at the `top` and `middle` levels.
    #[config(default = "FusionKind::SelectiveKernel")]
    pub fusion: FusionKind,
    /// Channel reduction ratio of the selective kernel fusion squeeze.
    #[config(default = "8")]
    pub fusion_reduction: usize,
    /// Negative slope of the leaky ReLUs inside refinement and fusion.
    #[config(default = "0.2")]
    pub negative_slope: f64,
    /// Initializer for every learned projection in the block.
    #[config(default = "Initializer::KaimingUniform{gain:1.0/3.0f64.sqrt(), fan_out_only:false}")]
    pub initializer: Initializer,
}

impl MultiScaleResidualBlockConfig {
    /// Validate the configuration and return the channel plan it implies.
    ///
    /// All channel counts are recomputed here and cross-checked, so a block that
    /// passes validation cannot hit a channel mismatch at its first fusion step.
    ///
    /// # Errors
    ///
    /// Returns `Err(MirNetError::InvalidConfiguration)` if a parameter is out of range.
    /// Returns `Err(MirNetError::InconsistentChannels)` if derived channel counts disagree.
    pub fn validate(&self) -> MirNetResult<ChannelPlan> {
        if self.fusion_reduction == 0 {
            return Err(MirNetError::InvalidConfiguration {
                reason: "fusion_reduction must be positive".to_string(),
            });
        }
        if !self.negative_slope.is_finite() {
            return Err(MirNetError::InvalidConfiguration {
                reason: format!(
                    "negative_slope must be finite, got {}",
                    self.negative_slope
                ),
            });
        }

        let plan = ChannelPlan::new(self.channels, self.channel_factor)?;
        if self.refinement == RefinementKind::ResidualContext {
            plan.ensure_groups(self.groups)?;
        } else if self.groups == 0 {
            return Err(MirNetError::InvalidConfiguration {
                reason: "groups must be positive".to_string(),
            });
        }

        if self.channel_factor <= 1.0 {
            tracing::warn!(
                channel_factor = self.channel_factor,
                "channel_factor <= 1: deeper levels will not carry more channels"
            );
        }

        Ok(plan)
    }
}
