//! # MIRNet-Burn
//!
//! This crate provides the multi-scale residual block of MIRNet, the feature-fusion
//! unit of the MIRNet image restoration network, built using the Burn deep learning
//! framework.
//!
//! ## Modules
//!
//! - `config`: The block configuration, its validation, and the channel plan shared by
//!   every sub-block.
//! - `error`: Defines the custom error types used throughout the crate.
//! - `models`: Implements the block and its stages: the pyramid sampling blocks, the
//!   residual context block, and selective kernel feature fusion.
//!
//! ## Key Components
//!
//! - `MultiScaleResidualBlock`: The main module.
//! - `MultiScaleResidualBlockConfig`: The configuration that drives its construction.
//! - `MirNetError`: The enum for all possible errors.
//!
//! Tensors are channels-first, `[batch, channels, height, width]`;
//! `MultiScaleResidualBlock::forward_channels_last` accepts channels-last input.

mod config;
mod error;
mod models;

#[doc(inline)]
pub use config::{
    scaled_channels, shrunk_channels, ChannelPlan, FusionKind, MultiScaleResidualBlockConfig,
    RefinementKind,
};
#[doc(inline)]
pub use error::{MirNetError, MirNetResult};
#[doc(inline)]
pub use models::{
    modules::{
        ContextBlock, ContextBlockConfig, Fusion, Refinement, ResidualContextBlock,
        ResidualContextBlockConfig, SelectiveKernelFeatureFusion,
        SelectiveKernelFeatureFusionConfig,
    },
    multi_scale::MultiScaleResidualBlock,
    sampling::{
        DownBlock, DownBlockConfig, DownSampleBlock, DownSampleBlockConfig, UpBlock,
        UpBlockConfig, UpSampleBlock, UpSampleBlockConfig,
    },
    FeatureTransform,
};
