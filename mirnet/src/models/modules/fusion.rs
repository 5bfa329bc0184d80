//! # Selective Kernel Feature Fusion
//!
//! Merges same-shaped feature maps with per-channel attention weights that sum to one
//! across the inputs.

use burn::{
    nn::{
        conv::Conv2d,
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig},
        Initializer, LeakyRelu, LeakyReluConfig,
    },
    prelude::*,
    tensor::activation::softmax,
};
use burn_extra_ops::Identity;

use crate::{
    config::FusionKind,
    error::{ensure_same_shape, MirNetError, MirNetResult},
    models::{conv_channels, pointwise_projection},
};

/// Checks that `inputs` holds `expected` tensors of one shape and returns that shape.
pub(crate) fn ensure_fusion_inputs<B: Backend>(
    inputs: &[Tensor<B, 4>],
    expected: usize,
    step: &str,
) -> MirNetResult<[usize; 4]> {
    if inputs.len() != expected || expected == 0 {
        return Err(MirNetError::FusionArity {
            expected,
            actual: inputs.len(),
        });
    }

    let shape = inputs[0].dims();
    for other in &inputs[1..] {
        ensure_same_shape(step, shape, other.dims())?;
    }
    Ok(shape)
}

/// Configuration for the `SelectiveKernelFeatureFusion` module.
#[derive(Config, Debug)]
pub struct SelectiveKernelFeatureFusionConfig {
    /// Channel count of every input and of the output.
    pub channels: usize,
    /// Number of inputs fused per call.
    #[config(default = "2")]
    pub height: usize,
    /// Reduction ratio of the squeeze projection.
    #[config(default = "8")]
    pub reduction: usize,
    /// Lower bound on the squeezed channel count.
    #[config(default = "4")]
    pub min_hidden: usize,
    /// Negative slope of the leaky ReLU after the squeeze.
    #[config(default = "0.2")]
    pub negative_slope: f64,
    /// Initializer for the squeeze and excitation projections.
    #[config(default = "Initializer::KaimingUniform{gain:1.0/3.0f64.sqrt(), fan_out_only:false}")]
    pub initializer: Initializer,
}

impl SelectiveKernelFeatureFusionConfig {
    /// Channel count after the squeeze projection.
    pub fn hidden_channels(&self) -> usize {
        (self.channels / self.reduction.max(1)).max(self.min_hidden)
    }

    /// Initializes a new `SelectiveKernelFeatureFusion` module.
    ///
    /// # Errors
    ///
    /// Returns `Err(MirNetError::InvalidConfiguration)` if `channels`, `height` or
    /// `reduction` is zero.
    pub fn init<B: Backend>(
        &self,
        device: &Device<B>,
    ) -> MirNetResult<SelectiveKernelFeatureFusion<B>> {
        if self.channels == 0 || self.height == 0 || self.reduction == 0 {
            return Err(MirNetError::InvalidConfiguration {
                reason: format!(
                    "SelectiveKernelFeatureFusion needs positive channels, height and reduction, \
                     got channels={}, height={}, reduction={}",
                    self.channels, self.height, self.reduction
                ),
            });
        }

        let hidden = self.hidden_channels();
        let excitations = (0..self.height)
            .map(|_| pointwise_projection(hidden, self.channels, &self.initializer, device))
            .collect();

        Ok(SelectiveKernelFeatureFusion {
            avg_pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            squeeze: pointwise_projection(self.channels, hidden, &self.initializer, device),
            act: LeakyReluConfig::new()
                .with_negative_slope(self.negative_slope)
                .init(),
            excitations,
        })
    }
}

/// Selective kernel feature fusion.
///
/// # Shapes
///   - inputs: `height` tensors of `[batch_size, channels, height, width]`
///   - output: `[batch_size, channels, height, width]`
#[derive(Module, Debug)]
pub struct SelectiveKernelFeatureFusion<B: Backend> {
    avg_pool: AdaptiveAvgPool2d,
    squeeze: Conv2d<B>,
    act: LeakyRelu,
    excitations: Vec<Conv2d<B>>,
}

impl<B: Backend> SelectiveKernelFeatureFusion<B> {
    /// Number of inputs fused per call.
    pub fn height(&self) -> usize {
        self.excitations.len()
    }

    /// Channel count every input must carry.
    pub fn channels(&self) -> usize {
        conv_channels(&self.squeeze).0
    }

    /// Fuses `inputs` into one tensor.
    ///
    /// # Errors
    ///
    /// Returns `Err(MirNetError::FusionArity)` for the wrong number of inputs,
    /// `Err(MirNetError::ShapeMismatch)` if the inputs differ in shape, and
    /// `Err(MirNetError::InvalidTensorShape)` if their channel count is not `channels`.
    pub fn forward(&self, inputs: Vec<Tensor<B, 4>>) -> MirNetResult<Tensor<B, 4>> {
        let shape = ensure_fusion_inputs(&inputs, self.height(), "selective kernel fusion")?;
        if shape[1] != self.channels() {
            return Err(MirNetError::InvalidTensorShape {
                expected: format!("[batch, {}, height, width]", self.channels()),
                actual: shape.to_vec(),
            });
        }

        let summed = inputs[1..]
            .iter()
            .fold(inputs[0].clone(), |acc, x| acc + x.clone());

        let descriptor = self.avg_pool.forward(summed);
        let descriptor = self.act.forward(self.squeeze.forward(descriptor));

        let attention = self
            .excitations
            .iter()
            .map(|excitation| excitation.forward(descriptor.clone()))
            .collect::<Vec<_>>();
        let attention = softmax(Tensor::stack::<5>(attention, 1), 1);

        let features = Tensor::stack::<5>(inputs, 1);
        Ok((features * attention).sum_dim(1).squeeze::<4>(1))
    }
}

/// The fusion stage used at the `top` and `middle` levels.
#[derive(Module, Debug)]
pub enum Fusion<B: Backend> {
    SelectiveKernel(SelectiveKernelFeatureFusion<B>),
    /// Returns the first input unchanged after validating the rest.
    Passthrough(Identity<B>),
}

impl<B: Backend> Fusion<B> {
    /// Creates the fusion selected by `kind`; `config` is only read for
    /// [`FusionKind::SelectiveKernel`].
    pub fn new(
        kind: &FusionKind,
        config: &SelectiveKernelFeatureFusionConfig,
        device: &Device<B>,
    ) -> MirNetResult<Self> {
        match kind {
            FusionKind::SelectiveKernel => Ok(Self::SelectiveKernel(config.init(device)?)),
            FusionKind::Passthrough => Ok(Self::Passthrough(Identity::new())),
        }
    }

    /// Fuses two same-shaped inputs.
    ///
    /// # Errors
    ///
    /// Same as [`SelectiveKernelFeatureFusion::forward`].
    pub fn forward(&self, mut inputs: Vec<Tensor<B, 4>>) -> MirNetResult<Tensor<B, 4>> {
        match self {
            Self::SelectiveKernel(skff) => skff.forward(inputs),
            Self::Passthrough(identity) => {
                ensure_fusion_inputs(&inputs, 2, "passthrough fusion")?;
                Ok(identity.forward(inputs.swap_remove(0)))
            }
        }
    }
}
