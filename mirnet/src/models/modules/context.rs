//! # Residual Context Block
//!
//! The per-level refinement of the multi-scale residual block: two grouped 3x3
//! convolutions followed by global context attention, wrapped in a residual connection.

use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        Initializer, LeakyRelu, LeakyReluConfig, PaddingConfig2d,
    },
    prelude::*,
    tensor::activation::softmax,
};
use burn_extra_ops::Identity;

use crate::{
    config::RefinementKind,
    error::{MirNetError, MirNetResult},
    models::{conv_channels, FeatureTransform},
};

fn ensure_channels(expected: usize, input: [usize; 4]) -> MirNetResult<()> {
    if input[1] != expected {
        return Err(MirNetError::InvalidTensorShape {
            expected: format!("[batch, {expected}, height, width]"),
            actual: input.to_vec(),
        });
    }
    Ok(())
}

/// Configuration for the `ContextBlock` module.
#[derive(Config, Debug)]
pub struct ContextBlockConfig {
    /// Number of input and output channels.
    pub channels: usize,
    /// Negative slope of the leaky ReLU inside the channel transform.
    #[config(default = "0.2")]
    pub negative_slope: f64,
    /// Whether the 1x1 convolutions carry a bias.
    #[config(default = "false")]
    pub bias: bool,
    /// Initializer for the 1x1 convolutions.
    #[config(default = "Initializer::KaimingUniform{gain:1.0/3.0f64.sqrt(), fan_out_only:false}")]
    pub initializer: Initializer,
}

impl ContextBlockConfig {
    /// Initializes a new `ContextBlock` module.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> ContextBlock<B> {
        let pointwise = |channels: [usize; 2]| {
            Conv2dConfig::new(channels, [1, 1])
                .with_bias(self.bias)
                .with_initializer(self.initializer.clone())
                .init(device)
        };

        ContextBlock {
            conv_mask: pointwise([self.channels, 1]),
            channel_add_in: pointwise([self.channels, self.channels]),
            act: LeakyReluConfig::new()
                .with_negative_slope(self.negative_slope)
                .init(),
            channel_add_out: pointwise([self.channels, self.channels]),
        }
    }
}

/// Global context attention.
///
/// A softmax over all spatial positions pools the input into one context vector per
/// sample; a bottleneck-free channel transform of that vector is then added back to
/// every position.
///
/// # Shapes
///   - input: `[batch_size, channels, height, width]`
///   - output: `[batch_size, channels, height, width]`
#[derive(Module, Debug)]
pub struct ContextBlock<B: Backend> {
    conv_mask: Conv2d<B>,
    channel_add_in: Conv2d<B>,
    act: LeakyRelu,
    channel_add_out: Conv2d<B>,
}

impl<B: Backend> ContextBlock<B> {
    fn spatial_pool(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let [batch, channels, height, width] = x.dims();
        let positions = height * width;

        let mask = self.conv_mask.forward(x.clone()).reshape([batch, 1, positions]);
        let mask = softmax(mask, 2).reshape([batch, positions, 1]);

        x.reshape([batch, channels, positions])
            .matmul(mask)
            .reshape([batch, channels, 1, 1])
    }

    pub fn channels(&self) -> usize {
        conv_channels(&self.conv_mask).0
    }

    /// Checked forward pass.
    ///
    /// # Errors
    ///
    /// Returns `Err(MirNetError::InvalidTensorShape)` if the input does not carry
    /// `channels` channels.
    pub fn forward(&self, x: Tensor<B, 4>) -> MirNetResult<Tensor<B, 4>> {
        self.try_transform(x)
    }
}

impl<B: Backend> FeatureTransform<B> for ContextBlock<B> {
    fn output_shape(&self, input: [usize; 4]) -> MirNetResult<[usize; 4]> {
        ensure_channels(self.channels(), input)?;
        Ok(input)
    }

    fn transform(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let context = self.spatial_pool(x.clone());
        let context = self.channel_add_in.forward(context);
        let context = self.act.forward(context);
        let context = self.channel_add_out.forward(context);

        x + context
    }
}

/// Configuration for the `ResidualContextBlock` module.
#[derive(Config, Debug)]
pub struct ResidualContextBlockConfig {
    /// Number of input and output channels.
    pub channels: usize,
    /// Groups of the two 3x3 convolutions. Must divide `channels`.
    #[config(default = "1")]
    pub groups: usize,
    /// Negative slope of every leaky ReLU in the block.
    #[config(default = "0.2")]
    pub negative_slope: f64,
    /// Whether the convolutions carry a bias.
    #[config(default = "false")]
    pub bias: bool,
    /// Initializer for all convolutions.
    #[config(default = "Initializer::KaimingUniform{gain:1.0/3.0f64.sqrt(), fan_out_only:false}")]
    pub initializer: Initializer,
}

impl ResidualContextBlockConfig {
    /// Initializes a new `ResidualContextBlock` module.
    ///
    /// # Errors
    ///
    /// Returns `Err(MirNetError::InvalidConfiguration)` if `channels` or `groups` is
    /// zero, or `groups` does not divide `channels`.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> MirNetResult<ResidualContextBlock<B>> {
        if self.channels == 0 || self.groups == 0 || self.channels % self.groups != 0 {
            return Err(MirNetError::InvalidConfiguration {
                reason: format!(
                    "ResidualContextBlock needs positive channels divisible by groups, \
                     got channels={}, groups={}",
                    self.channels, self.groups
                ),
            });
        }

        let grouped = || {
            Conv2dConfig::new([self.channels, self.channels], [3, 3])
                .with_stride([1, 1])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .with_groups(self.groups)
                .with_bias(self.bias)
                .with_initializer(self.initializer.clone())
                .init(device)
        };
        let leaky_relu = || {
            LeakyReluConfig::new()
                .with_negative_slope(self.negative_slope)
                .init()
        };

        Ok(ResidualContextBlock {
            conv_in: grouped(),
            act_in: leaky_relu(),
            conv_out: grouped(),
            gcnet: ContextBlockConfig::new(self.channels)
                .with_negative_slope(self.negative_slope)
                .with_bias(self.bias)
                .with_initializer(self.initializer.clone())
                .init(device),
            act_out: leaky_relu(),
        })
    }
}

/// Residual context block.
///
/// # Shapes
///   - input: `[batch_size, channels, height, width]`
///   - output: `[batch_size, channels, height, width]`
#[derive(Module, Debug)]
pub struct ResidualContextBlock<B: Backend> {
    conv_in: Conv2d<B>,
    act_in: LeakyRelu,
    conv_out: Conv2d<B>,
    gcnet: ContextBlock<B>,
    act_out: LeakyRelu,
}

impl<B: Backend> ResidualContextBlock<B> {
    pub fn channels(&self) -> usize {
        conv_channels(&self.conv_in).1
    }

    /// Checked forward pass.
    ///
    /// # Errors
    ///
    /// Returns `Err(MirNetError::InvalidTensorShape)` if the input does not carry
    /// `channels` channels.
    pub fn forward(&self, x: Tensor<B, 4>) -> MirNetResult<Tensor<B, 4>> {
        self.try_transform(x)
    }
}

impl<B: Backend> FeatureTransform<B> for ResidualContextBlock<B> {
    fn output_shape(&self, input: [usize; 4]) -> MirNetResult<[usize; 4]> {
        ensure_channels(self.channels(), input)?;
        Ok(input)
    }

    fn transform(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let res = self.conv_in.forward(x.clone());
        let res = self.act_in.forward(res);
        let res = self.conv_out.forward(res);
        let res = self.gcnet.transform(res);
        let res = self.act_out.forward(res);

        res + x
    }
}

/// The refinement stage held by each pyramid level.
#[derive(Module, Debug)]
pub enum Refinement<B: Backend> {
    ResidualContext(ResidualContextBlock<B>),
    Identity(Identity<B>),
}

impl<B: Backend> Refinement<B> {
    /// Creates the refinement selected by `kind`; `config` is only read for
    /// [`RefinementKind::ResidualContext`].
    pub fn new(
        kind: &RefinementKind,
        config: &ResidualContextBlockConfig,
        device: &Device<B>,
    ) -> MirNetResult<Self> {
        match kind {
            RefinementKind::ResidualContext => Ok(Self::ResidualContext(config.init(device)?)),
            RefinementKind::Identity => Ok(Self::Identity(Identity::new())),
        }
    }
}

impl<B: Backend> FeatureTransform<B> for Refinement<B> {
    fn output_shape(&self, input: [usize; 4]) -> MirNetResult<[usize; 4]> {
        match self {
            Self::ResidualContext(rcb) => rcb.output_shape(input),
            Self::Identity(_) => Ok(input),
        }
    }

    fn transform(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        match self {
            Self::ResidualContext(rcb) => rcb.transform(x),
            Self::Identity(identity) => identity.forward(x),
        }
    }
}
