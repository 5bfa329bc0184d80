//! # Tensor Layout Permutes
//!
//! Converts between channels-last `[batch, height, width, channels]` tensors, as produced by
//! most image pipelines, and the channels-first layout Burn's `nn` modules expect.

use burn::prelude::*;

/// `[batch, height, width, channels]` -> `[batch, channels, height, width]`.
pub fn to_channels_first<B: Backend>(input: Tensor<B, 4>) -> Tensor<B, 4> {
    input.permute([0, 3, 1, 2])
}

/// `[batch, channels, height, width]` -> `[batch, height, width, channels]`.
pub fn to_channels_last<B: Backend>(input: Tensor<B, 4>) -> Tensor<B, 4> {
    input.permute([0, 2, 3, 1])
}
