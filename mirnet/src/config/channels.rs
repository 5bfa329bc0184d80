//! Channel bookkeeping for the three pyramid levels.
//!
//! Every channel count in the block is derived from `channels` and `channel_factor`
//! through the two rounding functions below and nowhere else.

use serde::{Deserialize, Serialize};

use crate::error::{MirNetError, MirNetResult};

/// Channel count one level deeper: `floor(channels * channel_factor)`.
pub fn scaled_channels(channels: usize, channel_factor: f64) -> usize {
    (channels as f64 * channel_factor).floor() as usize
}

/// Channel count one level shallower: `floor(channels / channel_factor)`.
pub fn shrunk_channels(channels: usize, channel_factor: f64) -> usize {
    (channels as f64 / channel_factor).floor() as usize
}

/// Channel counts of the `top`, `middle` and `bottom` resolution levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelPlan {
    /// Full resolution, equal to the block's `channels`.
    pub top: usize,
    /// Half resolution.
    pub middle: usize,
    /// Quarter resolution.
    pub bottom: usize,
}

impl ChannelPlan {
    /// Computes the plan by stepping [`scaled_channels`] level by level, then
    /// cross-checks it against every other place a level width is derived.
    ///
    /// # Errors
    ///
    /// Returns `Err(MirNetError::InvalidConfiguration)` for a zero `channels` or a
    /// non-positive or non-finite `channel_factor`.
    /// Returns `Err(MirNetError::InconsistentChannels)` if a level collapses to zero
    /// channels, if the stepped bottom width differs from `floor(channels * f^2)`, or
    /// if an upsampling path would not land on its fusion partner's width.
    pub fn new(channels: usize, channel_factor: f64) -> MirNetResult<Self> {
        if channels == 0 {
            return Err(MirNetError::InvalidConfiguration {
                reason: "channels must be positive".to_string(),
            });
        }
        if !channel_factor.is_finite() || channel_factor <= 0.0 {
            return Err(MirNetError::InvalidConfiguration {
                reason: format!("channel_factor must be finite and positive, got {channel_factor}"),
            });
        }

        let top = channels;
        let middle = scaled_channels(top, channel_factor);
        let bottom = scaled_channels(middle, channel_factor);

        if middle == 0 || bottom == 0 {
            return Err(MirNetError::InconsistentChannels {
                reason: format!(
                    "channel_factor {channel_factor} collapses {channels} channels to \
                     middle={middle}, bottom={bottom}"
                ),
            });
        }

        // Refinement and fusion blocks size themselves with the direct power.
        let direct_middle = scaled_channels(channels, channel_factor.powi(1));
        let direct_bottom = scaled_channels(channels, channel_factor.powi(2));
        if direct_middle != middle {
            return Err(MirNetError::InconsistentChannels {
                reason: format!(
                    "middle level: downsampling yields {middle}, direct formula yields {direct_middle}"
                ),
            });
        }
        if direct_bottom != bottom {
            return Err(MirNetError::InconsistentChannels {
                reason: format!(
                    "bottom level: downsampling yields {bottom}, direct formula yields {direct_bottom}"
                ),
            });
        }

        let up_from_bottom = shrunk_channels(bottom, channel_factor);
        if up_from_bottom != middle {
            return Err(MirNetError::InconsistentChannels {
                reason: format!(
                    "upsampling bottom ({bottom}) yields {up_from_bottom}, middle level has {middle}"
                ),
            });
        }
        let up_from_middle = shrunk_channels(middle, channel_factor);
        if up_from_middle != top {
            return Err(MirNetError::InconsistentChannels {
                reason: format!(
                    "upsampling middle ({middle}) yields {up_from_middle}, top level has {top}"
                ),
            });
        }

        Ok(Self {
            top,
            middle,
            bottom,
        })
    }

    /// Checks that every level can be split into `groups` convolution groups.
    ///
    /// # Errors
    ///
    /// Returns `Err(MirNetError::InvalidConfiguration)` if `groups` is zero or does not
    /// divide a level's channel count.
    pub fn ensure_groups(&self, groups: usize) -> MirNetResult<()> {
        if groups == 0 {
            return Err(MirNetError::InvalidConfiguration {
                reason: "groups must be positive".to_string(),
            });
        }
        for (level, channels) in self.levels() {
            if channels % groups != 0 {
                return Err(MirNetError::InvalidConfiguration {
                    reason: format!(
                        "{level} level has {channels} channels, not divisible by {groups} groups"
                    ),
                });
            }
        }
        Ok(())
    }

    /// Level names paired with their channel counts, shallowest first.
    pub const fn levels(&self) -> [(&'static str, usize); 3] {
        [
            ("top", self.top),
            ("middle", self.middle),
            ("bottom", self.bottom),
        ]
    }
}
