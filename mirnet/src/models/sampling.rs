//! # Pyramid Sampling Blocks
//!
//! `DownBlock` halves the spatial resolution and grows the channel count by
//! `channel_factor`; `UpBlock` doubles the resolution and shrinks the channel count by
//! the same ratio. `DownSampleBlock` and `UpSampleBlock` chain `log2(scale_factor)` of
//! them, each step independently parameterized, with channel counts truncated at every
//! step.

use burn::{
    nn::{
        conv::Conv2d,
        pool::{AvgPool2d, AvgPool2dConfig},
        Initializer,
    },
    prelude::*,
};
use burn_extra_ops::{BilinearUpsample, BilinearUpsampleConfig};

use super::{conv_channels, pointwise_projection, FeatureTransform};
use crate::{
    config::{scaled_channels, shrunk_channels},
    error::{ensure_divisible, MirNetError, MirNetResult},
};

/// Checks a single step's channel counts before any parameter is allocated.
fn checked_step(
    block: &str,
    in_channels: usize,
    out_channels: usize,
    channel_factor: f64,
) -> MirNetResult<usize> {
    if !channel_factor.is_finite() || channel_factor <= 0.0 {
        return Err(MirNetError::InvalidConfiguration {
            reason: format!("{block}: channel_factor must be finite and positive, got {channel_factor}"),
        });
    }
    if in_channels == 0 || out_channels == 0 {
        return Err(MirNetError::InconsistentChannels {
            reason: format!(
                "{block}: {in_channels} input channels with factor {channel_factor} \
                 gives {out_channels} output channels"
            ),
        });
    }
    Ok(out_channels)
}

/// Number of factor-2 steps for a power-of-two `scale_factor` of at least 2.
fn sampling_steps(scale_factor: usize) -> MirNetResult<usize> {
    if scale_factor < 2 || !scale_factor.is_power_of_two() {
        return Err(MirNetError::InvalidConfiguration {
            reason: format!("scale_factor must be a power of two >= 2, got {scale_factor}"),
        });
    }
    Ok(scale_factor.trailing_zeros() as usize)
}

fn ensure_input_channels(expected: usize, input: [usize; 4]) -> MirNetResult<()> {
    if input[1] != expected {
        return Err(MirNetError::InvalidTensorShape {
            expected: format!("[batch, {expected}, height, width]"),
            actual: input.to_vec(),
        });
    }
    Ok(())
}

/// Configuration for the `DownBlock` module.
#[derive(Config, Debug)]
pub struct DownBlockConfig {
    /// Number of input channels.
    pub in_channels: usize,
    /// Channel growth ratio.
    pub channel_factor: f64,
    /// Initializer for the channel projection.
    #[config(default = "Initializer::KaimingUniform{gain:1.0/3.0f64.sqrt(), fan_out_only:false}")]
    pub initializer: Initializer,
}

impl DownBlockConfig {
    /// `floor(in_channels * channel_factor)`.
    pub fn out_channels(&self) -> usize {
        scaled_channels(self.in_channels, self.channel_factor)
    }

    /// Initializes a new `DownBlock` module.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> MirNetResult<DownBlock<B>> {
        let out_channels = checked_step(
            "DownBlock",
            self.in_channels,
            self.out_channels(),
            self.channel_factor,
        )?;

        Ok(DownBlock {
            avg_pool: AvgPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            projection: pointwise_projection(
                self.in_channels,
                out_channels,
                &self.initializer,
                device,
            ),
        })
    }
}

/// One spatial-halving step: 2x2 mean pooling followed by a 1x1 projection. No activation.
///
/// Odd spatial sizes are floored by the pooling window, e.g. 5x5 becomes 2x2.
///
/// # Shapes
///   - input: `[batch_size, in_channels, height, width]`
///   - output: `[batch_size, floor(in_channels * channel_factor), height / 2, width / 2]`
#[derive(Module, Debug)]
pub struct DownBlock<B: Backend> {
    avg_pool: AvgPool2d,
    projection: Conv2d<B>,
}

impl<B: Backend> DownBlock<B> {
    pub fn in_channels(&self) -> usize {
        conv_channels(&self.projection).0
    }

    pub fn out_channels(&self) -> usize {
        conv_channels(&self.projection).1
    }
}

impl<B: Backend> FeatureTransform<B> for DownBlock<B> {
    fn output_shape(&self, input: [usize; 4]) -> MirNetResult<[usize; 4]> {
        ensure_input_channels(self.in_channels(), input)?;
        let [batch, _, height, width] = input;
        Ok([batch, self.out_channels(), height / 2, width / 2])
    }

    fn transform(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.avg_pool.forward(x);
        self.projection.forward(x)
    }
}

/// Configuration for the `UpBlock` module.
#[derive(Config, Debug)]
pub struct UpBlockConfig {
    /// Number of input channels.
    pub in_channels: usize,
    /// Channel shrink ratio.
    pub channel_factor: f64,
    /// Initializer for the channel projection.
    #[config(default = "Initializer::KaimingUniform{gain:1.0/3.0f64.sqrt(), fan_out_only:false}")]
    pub initializer: Initializer,
}

impl UpBlockConfig {
    /// `floor(in_channels / channel_factor)`.
    pub fn out_channels(&self) -> usize {
        shrunk_channels(self.in_channels, self.channel_factor)
    }

    /// Initializes a new `UpBlock` module.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> MirNetResult<UpBlock<B>> {
        let out_channels = checked_step(
            "UpBlock",
            self.in_channels,
            self.out_channels(),
            self.channel_factor,
        )?;

        Ok(UpBlock {
            projection: pointwise_projection(
                self.in_channels,
                out_channels,
                &self.initializer,
                device,
            ),
            upsample: BilinearUpsampleConfig::new().with_scale_factor(2).init(),
        })
    }
}

/// One spatial-doubling step: 1x1 projection followed by bilinear x2 upsampling.
///
/// # Shapes
///   - input: `[batch_size, in_channels, height, width]`
///   - output: `[batch_size, floor(in_channels / channel_factor), 2 * height, 2 * width]`
#[derive(Module, Debug)]
pub struct UpBlock<B: Backend> {
    projection: Conv2d<B>,
    upsample: BilinearUpsample,
}

impl<B: Backend> UpBlock<B> {
    pub fn in_channels(&self) -> usize {
        conv_channels(&self.projection).0
    }

    pub fn out_channels(&self) -> usize {
        conv_channels(&self.projection).1
    }
}

impl<B: Backend> FeatureTransform<B> for UpBlock<B> {
    fn output_shape(&self, input: [usize; 4]) -> MirNetResult<[usize; 4]> {
        ensure_input_channels(self.in_channels(), input)?;
        let [batch, _, height, width] = input;
        let [height, width] = self.upsample.output_resolution([height, width]);
        Ok([batch, self.out_channels(), height, width])
    }

    fn transform(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.projection.forward(x);
        self.upsample.forward(x)
    }
}

/// Configuration for the `DownSampleBlock` module.
#[derive(Config, Debug)]
pub struct DownSampleBlockConfig {
    /// Number of input channels.
    pub in_channels: usize,
    /// Total spatial reduction; a power of two.
    pub scale_factor: usize,
    /// Channel growth ratio applied at every step.
    pub channel_factor: f64,
    /// Initializer for every step's projection.
    #[config(default = "Initializer::KaimingUniform{gain:1.0/3.0f64.sqrt(), fan_out_only:false}")]
    pub initializer: Initializer,
}

impl DownSampleBlockConfig {
    /// Initializes a new `DownSampleBlock` with `log2(scale_factor)` independent steps.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> MirNetResult<DownSampleBlock<B>> {
        let steps = sampling_steps(self.scale_factor)?;
        let mut blocks = Vec::with_capacity(steps);
        let mut channels = self.in_channels;
        for _ in 0..steps {
            let config = DownBlockConfig::new(channels, self.channel_factor)
                .with_initializer(self.initializer.clone());
            channels = config.out_channels();
            blocks.push(config.init(device)?);
        }

        Ok(DownSampleBlock { blocks })
    }
}

/// Chain of `DownBlock`s reducing the resolution by `scale_factor`.
///
/// Inputs whose height or width is not a multiple of `scale_factor` are rejected by
/// [`forward`](Self::forward) instead of being truncated.
///
/// # Shapes
///   - input: `[batch_size, channels, height, width]`
///   - output: `[batch_size, channels', height / scale_factor, width / scale_factor]`
///     where `channels'` applies the floored growth once per step.
#[derive(Module, Debug)]
pub struct DownSampleBlock<B: Backend> {
    blocks: Vec<DownBlock<B>>,
}

impl<B: Backend> DownSampleBlock<B> {
    pub fn scale_factor(&self) -> usize {
        1 << self.blocks.len()
    }

    pub fn in_channels(&self) -> usize {
        self.blocks.first().map_or(0, DownBlock::in_channels)
    }

    pub fn out_channels(&self) -> usize {
        self.blocks.last().map_or(0, DownBlock::out_channels)
    }

    /// Checked forward pass.
    ///
    /// # Errors
    ///
    /// Returns `Err(MirNetError::IndivisibleSpatialDims)` if the spatial dims are not
    /// multiples of the scale factor, or `Err(MirNetError::InvalidTensorShape)` for a
    /// wrong channel count.
    pub fn forward(&self, x: Tensor<B, 4>) -> MirNetResult<Tensor<B, 4>> {
        self.try_transform(x)
    }

    #[cfg(test)]
    pub(crate) fn param_ids(&self) -> Vec<burn::module::ParamId> {
        self.blocks
            .iter()
            .map(|block| block.projection.weight.id)
            .collect()
    }
}

impl<B: Backend> FeatureTransform<B> for DownSampleBlock<B> {
    fn output_shape(&self, input: [usize; 4]) -> MirNetResult<[usize; 4]> {
        ensure_divisible(input, self.scale_factor())?;
        self.blocks
            .iter()
            .try_fold(input, |shape, block| block.output_shape(shape))
    }

    fn transform(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.blocks
            .iter()
            .fold(x, |x, block| block.transform(x))
    }
}

/// Configuration for the `UpSampleBlock` module.
#[derive(Config, Debug)]
pub struct UpSampleBlockConfig {
    /// Number of input channels.
    pub in_channels: usize,
    /// Total spatial enlargement; a power of two.
    pub scale_factor: usize,
    /// Channel shrink ratio applied at every step.
    pub channel_factor: f64,
    /// Initializer for every step's projection.
    #[config(default = "Initializer::KaimingUniform{gain:1.0/3.0f64.sqrt(), fan_out_only:false}")]
    pub initializer: Initializer,
}

impl UpSampleBlockConfig {
    /// Initializes a new `UpSampleBlock` with `log2(scale_factor)` independent steps.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> MirNetResult<UpSampleBlock<B>> {
        let steps = sampling_steps(self.scale_factor)?;
        let mut blocks = Vec::with_capacity(steps);
        let mut channels = self.in_channels;
        for _ in 0..steps {
            let config = UpBlockConfig::new(channels, self.channel_factor)
                .with_initializer(self.initializer.clone());
            channels = config.out_channels();
            blocks.push(config.init(device)?);
        }

        Ok(UpSampleBlock { blocks })
    }
}

/// Chain of `UpBlock`s enlarging the resolution by `scale_factor`.
///
/// # Shapes
///   - input: `[batch_size, channels, height, width]`
///   - output: `[batch_size, channels', height * scale_factor, width * scale_factor]`
#[derive(Module, Debug)]
pub struct UpSampleBlock<B: Backend> {
    blocks: Vec<UpBlock<B>>,
}

impl<B: Backend> UpSampleBlock<B> {
    pub fn scale_factor(&self) -> usize {
        1 << self.blocks.len()
    }

    pub fn in_channels(&self) -> usize {
        self.blocks.first().map_or(0, UpBlock::in_channels)
    }

    pub fn out_channels(&self) -> usize {
        self.blocks.last().map_or(0, UpBlock::out_channels)
    }

    /// Checked forward pass.
    ///
    /// # Errors
    ///
    /// Returns `Err(MirNetError::InvalidTensorShape)` for a wrong channel count.
    pub fn forward(&self, x: Tensor<B, 4>) -> MirNetResult<Tensor<B, 4>> {
        self.try_transform(x)
    }

    #[cfg(test)]
    pub(crate) fn param_ids(&self) -> Vec<burn::module::ParamId> {
        self.blocks
            .iter()
            .map(|block| block.projection.weight.id)
            .collect()
    }
}

impl<B: Backend> FeatureTransform<B> for UpSampleBlock<B> {
    fn output_shape(&self, input: [usize; 4]) -> MirNetResult<[usize; 4]> {
        self.blocks
            .iter()
            .try_fold(input, |shape, block| block.output_shape(shape))
    }

    fn transform(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.blocks
            .iter()
            .fold(x, |x, block| block.transform(x))
    }
}

#[cfg(test)]
mod tests {
    use burn::tensor::{Distribution, Tolerance};

    use super::*;
    use crate::tests::TestBackend;

    #[test]
    fn down_block_halves_resolution_and_scales_channels() {
        let device = Default::default();
        let block = DownBlockConfig::new(8, 1.25)
            .init::<TestBackend>(&device)
            .unwrap();
        let x =
            Tensor::<TestBackend, 4>::random([2, 8, 16, 12], Distribution::Normal(0.0, 1.0), &device);

        let y = block.try_transform(x).unwrap();

        assert_eq!(y.dims(), [2, 10, 8, 6]);
        assert_eq!((block.in_channels(), block.out_channels()), (8, 10));
    }

    #[test]
    fn down_block_averages_then_projects() {
        let device = Default::default();
        let block = DownBlockConfig::new(2, 1.5)
            .with_initializer(Initializer::Constant { value: 1.0 })
            .init::<TestBackend>(&device)
            .unwrap();
        let x = Tensor::<TestBackend, 4>::from_data(
            [[
                [[1.0, 3.0], [5.0, 7.0]],
                [[2.0, 2.0], [2.0, 2.0]],
            ]],
            &device,
        );

        let y = block.transform(x);

        // mean(1, 3, 5, 7) + mean(2, 2, 2, 2) + bias
        let expected = Tensor::<TestBackend, 4>::full([1, 3, 1, 1], 4.0 + 2.0 + 1.0, &device);
        y.into_data()
            .assert_approx_eq::<f32>(&expected.into_data(), Tolerance::absolute(1e-5));
    }

    #[test]
    fn down_block_floors_odd_resolution() {
        let device = Default::default();
        let block = DownBlockConfig::new(3, 2.0)
            .init::<TestBackend>(&device)
            .unwrap();
        let x = Tensor::<TestBackend, 4>::ones([1, 3, 5, 7], &device);

        let y = block.transform(x);

        assert_eq!(y.dims(), [1, 6, 2, 3]);
        assert_eq!(block.output_shape([1, 3, 5, 7]).unwrap(), [1, 6, 2, 3]);
    }

    #[test]
    fn down_block_rejects_wrong_channels() {
        let device = Default::default();
        let block = DownBlockConfig::new(4, 2.0)
            .init::<TestBackend>(&device)
            .unwrap();

        match block.output_shape([1, 3, 8, 8]) {
            Err(MirNetError::InvalidTensorShape { actual, .. }) => {
                assert_eq!(actual, vec![1, 3, 8, 8]);
            }
            other => panic!("Expected InvalidTensorShape error, got {other:?}"),
        }
    }

    #[test]
    fn up_block_doubles_resolution_and_shrinks_channels() {
        let device = Default::default();
        let block = UpBlockConfig::new(10, 1.25)
            .init::<TestBackend>(&device)
            .unwrap();
        let x =
            Tensor::<TestBackend, 4>::random([1, 10, 4, 6], Distribution::Normal(0.0, 1.0), &device);

        let y = block.try_transform(x).unwrap();

        assert_eq!(y.dims(), [1, 8, 8, 12]);
    }

    #[test]
    fn up_block_projects_before_upsampling() {
        let device = Default::default();
        let block = UpBlockConfig::new(2, 2.0)
            .with_initializer(Initializer::Constant { value: 0.5 })
            .init::<TestBackend>(&device)
            .unwrap();
        let x = Tensor::<TestBackend, 4>::full([1, 2, 3, 3], 2.0, &device);

        let y = block.transform(x);

        // 0.5 * 2 + 0.5 * 2 + 0.5, constant fields stay constant under bilinear resampling
        let expected = Tensor::<TestBackend, 4>::full([1, 1, 6, 6], 2.5, &device);
        y.into_data()
            .assert_approx_eq::<f32>(&expected.into_data(), Tolerance::absolute(1e-5));
    }

    #[test]
    fn up_block_samples_at_half_pixel_centers() {
        let device = Default::default();
        let block = UpBlockConfig::new(1, 1.0)
            .with_initializer(Initializer::Constant { value: 1.0 })
            .init::<TestBackend>(&device)
            .unwrap();
        let x = Tensor::<TestBackend, 4>::from_data([[[[0.0, 1.0]]]], &device);

        let y = block.transform(x);

        // x + 1, then each new sample is a 0.75 / 0.25 blend of its nearest inputs
        let row = [1.0, 1.25, 1.75, 2.0];
        let expected = Tensor::<TestBackend, 4>::from_data([[[row, row]]], &device);
        y.into_data()
            .assert_approx_eq::<f32>(&expected.into_data(), Tolerance::absolute(1e-6));
    }

    #[test]
    fn down_sample_block_scale_four() {
        let device = Default::default();
        let block = DownSampleBlockConfig::new(16, 4, 1.5)
            .init::<TestBackend>(&device)
            .unwrap();
        let x =
            Tensor::<TestBackend, 4>::random([2, 16, 16, 8], Distribution::Normal(0.0, 1.0), &device);

        let y = block.forward(x).unwrap();

        assert_eq!(y.dims(), [2, 36, 4, 2]);
        assert_eq!(block.scale_factor(), 4);
        assert_eq!((block.in_channels(), block.out_channels()), (16, 36));
    }

    #[test]
    fn down_sample_block_truncates_each_step() {
        let device = Default::default();
        let block = DownSampleBlockConfig::new(5, 4, 1.5)
            .init::<TestBackend>(&device)
            .unwrap();

        // floor(floor(5 * 1.5) * 1.5) = 10, not floor(5 * 2.25) = 11.
        assert_eq!(block.out_channels(), 10);
        assert_eq!(block.output_shape([1, 5, 8, 8]).unwrap(), [1, 10, 2, 2]);
    }

    #[test]
    fn down_sample_block_rejects_indivisible_resolution() {
        let device = Default::default();
        let block = DownSampleBlockConfig::new(4, 4, 2.0)
            .init::<TestBackend>(&device)
            .unwrap();
        let x = Tensor::<TestBackend, 4>::ones([1, 4, 6, 8], &device);

        match block.forward(x) {
            Err(MirNetError::IndivisibleSpatialDims {
                height,
                width,
                factor,
            }) => {
                assert_eq!((height, width, factor), (6, 8, 4));
            }
            other => panic!("Expected IndivisibleSpatialDims error, got {other:?}"),
        }
    }

    #[test]
    fn up_sample_block_scale_four() {
        let device = Default::default();
        let block = UpSampleBlockConfig::new(36, 4, 1.5)
            .init::<TestBackend>(&device)
            .unwrap();
        let x =
            Tensor::<TestBackend, 4>::random([2, 36, 3, 2], Distribution::Normal(0.0, 1.0), &device);

        let y = block.forward(x).unwrap();

        assert_eq!(y.dims(), [2, 16, 12, 8]);
        assert_eq!(block.scale_factor(), 4);
    }

    #[test]
    fn sampling_steps_are_independently_parameterized() {
        let device = Default::default();
        let down = DownSampleBlockConfig::new(4, 8, 1.0)
            .init::<TestBackend>(&device)
            .unwrap();

        let ids = down.param_ids();
        assert_eq!(ids.len(), 3);
        assert_ne!(ids[0], ids[1]);
        assert_ne!(ids[1], ids[2]);
    }

    #[test]
    fn sampling_rejects_invalid_scale_factor() {
        let device = Default::default();
        for scale_factor in [0, 1, 3, 6] {
            assert!(matches!(
                DownSampleBlockConfig::new(4, scale_factor, 2.0).init::<TestBackend>(&device),
                Err(MirNetError::InvalidConfiguration { .. })
            ));
            assert!(matches!(
                UpSampleBlockConfig::new(4, scale_factor, 2.0).init::<TestBackend>(&device),
                Err(MirNetError::InvalidConfiguration { .. })
            ));
        }
    }

    #[test]
    fn sampling_rejects_collapsing_channels() {
        let device = Default::default();
        assert!(matches!(
            UpSampleBlockConfig::new(2, 4, 2.0).init::<TestBackend>(&device),
            Err(MirNetError::InconsistentChannels { .. })
        ));
    }
}
