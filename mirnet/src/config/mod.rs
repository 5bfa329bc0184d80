//! Configuration module for the MIRNet multi-scale residual block.
//!
//! - `core`: the top-level block configuration and its validation.
//! - `channels`: the channel plan and the single pair of rounding functions.
//! - `enums`: collaborator selection enums.

mod channels;
mod core;
mod enums;

pub use channels::{scaled_channels, shrunk_channels, ChannelPlan};
pub use self::core::MultiScaleResidualBlockConfig;
pub use enums::{FusionKind, RefinementKind};
