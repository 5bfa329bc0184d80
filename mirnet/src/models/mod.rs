//! Model implementations for the MIRNet multi-scale residual block.
//!
//! Every stage of the block implements [`FeatureTransform`]: a single
//! shape-transforming operation plus a shape predictor. Parameter enumeration
//! comes from Burn's [`Module`] supertrait (`num_params`, `visit`).

pub mod modules;
pub mod multi_scale;
pub mod sampling;

use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        Initializer, PaddingConfig2d,
    },
    prelude::*,
};

use crate::error::MirNetResult;

/// A learned stage that maps one `[batch, channels, height, width]` tensor to another.
pub trait FeatureTransform<B: Backend>: Module<B> {
    /// Predicts the output shape for an input shape, rejecting inputs the stage
    /// cannot accept.
    ///
    /// # Errors
    ///
    /// Returns an error when the input's channel count or spatial size violates the
    /// stage's contract.
    fn output_shape(&self, input: [usize; 4]) -> MirNetResult<[usize; 4]>;

    /// Applies the stage without validating the input.
    fn transform(&self, x: Tensor<B, 4>) -> Tensor<B, 4>;

    /// Validates the input against [`output_shape`](Self::output_shape), then applies
    /// the stage.
    ///
    /// # Errors
    ///
    /// Propagates the error from [`output_shape`](Self::output_shape).
    fn try_transform(&self, x: Tensor<B, 4>) -> MirNetResult<Tensor<B, 4>> {
        self.output_shape(x.dims())?;
        Ok(self.transform(x))
    }
}

/// A 1x1 convolution with bias: a per-pixel linear map between channel counts.
pub(crate) fn pointwise_projection<B: Backend>(
    in_channels: usize,
    out_channels: usize,
    initializer: &Initializer,
    device: &Device<B>,
) -> Conv2d<B> {
    Conv2dConfig::new([in_channels, out_channels], [1, 1])
        .with_stride([1, 1])
        .with_padding(PaddingConfig2d::Valid)
        .with_bias(true)
        .with_initializer(initializer.clone())
        .init(device)
}

/// `(in_channels, out_channels)` of a convolution, read from its weight.
pub(crate) fn conv_channels<B: Backend>(conv: &Conv2d<B>) -> (usize, usize) {
    let [out_channels, in_per_group, _, _] = conv.weight.dims();
    (in_per_group * conv.groups, out_channels)
}
