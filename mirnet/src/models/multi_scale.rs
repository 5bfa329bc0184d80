//! # Multi-Scale Residual Block
//!
//! Decomposes a feature map into a three-level pyramid (full, half and quarter
//! resolution), refines every level, fuses the levels bottom-up twice, projects back
//! to the input width and adds the input.

use burn::{nn::conv::Conv2d, prelude::*};
use burn_extra_ops::TensorExtraOps;

use super::{
    modules::{Fusion, Refinement, ResidualContextBlockConfig, SelectiveKernelFeatureFusionConfig},
    pointwise_projection,
    sampling::{DownSampleBlock, DownSampleBlockConfig, UpSampleBlock, UpSampleBlockConfig},
    FeatureTransform,
};
use crate::{
    config::{ChannelPlan, MultiScaleResidualBlockConfig},
    error::{ensure_divisible, ensure_same_shape, MirNetError, MirNetResult},
};

/// Cumulative downsampling between the `top` and `bottom` levels.
const PYRAMID_FACTOR: usize = 4;

impl MultiScaleResidualBlockConfig {
    /// Initializes a new `MultiScaleResidualBlock` module.
    ///
    /// # Errors
    ///
    /// Returns the error from [`validate`](Self::validate), or from a sub-block
    /// constructor.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> MirNetResult<MultiScaleResidualBlock<B>> {
        let plan = self.validate()?;
        tracing::debug!(
            top = plan.top,
            middle = plan.middle,
            bottom = plan.bottom,
            groups = self.groups,
            refinement = ?self.refinement,
            fusion = ?self.fusion,
            "Building multi-scale residual block"
        );

        let refinement = |channels: usize| {
            let config = ResidualContextBlockConfig::new(channels)
                .with_groups(self.groups)
                .with_negative_slope(self.negative_slope)
                .with_initializer(self.initializer.clone());
            Refinement::new(&self.refinement, &config, device)
        };
        let fusion = |channels: usize| {
            let config = SelectiveKernelFeatureFusionConfig::new(channels)
                .with_reduction(self.fusion_reduction)
                .with_negative_slope(self.negative_slope)
                .with_initializer(self.initializer.clone());
            Fusion::new(&self.fusion, &config, device)
        };
        let down = |in_channels: usize| {
            DownSampleBlockConfig::new(in_channels, 2, self.channel_factor)
                .with_initializer(self.initializer.clone())
                .init(device)
        };
        let up = |in_channels: usize| {
            UpSampleBlockConfig::new(in_channels, 2, self.channel_factor)
                .with_initializer(self.initializer.clone())
                .init(device)
        };

        Ok(MultiScaleResidualBlock {
            rcb_top: refinement(plan.top)?,
            rcb_middle: refinement(plan.middle)?,
            rcb_bottom: refinement(plan.bottom)?,
            down_2: down(plan.top)?,
            down_4_1: down(plan.top)?,
            down_4_2: down(plan.middle)?,
            up21_1: up(plan.middle)?,
            up21_2: up(plan.middle)?,
            up32_1: up(plan.bottom)?,
            up32_2: up(plan.bottom)?,
            skff_top: fusion(plan.top)?,
            skff_middle: fusion(plan.middle)?,
            conv_out: pointwise_projection(plan.top, plan.top, &self.initializer, device),
            channels: plan.top,
        })
    }
}

/// Multi-scale residual block.
///
/// The refinement and fusion stages of each level are applied in both passes with
/// the same weights; every sampling path owns its own weights.
///
/// # Shapes
///   - input: `[batch_size, channels, height, width]`, `height` and `width` multiples of 4
///   - output: `[batch_size, channels, height, width]`
#[derive(Module, Debug)]
pub struct MultiScaleResidualBlock<B: Backend> {
    rcb_top: Refinement<B>,
    rcb_middle: Refinement<B>,
    rcb_bottom: Refinement<B>,
    down_2: DownSampleBlock<B>,
    down_4_1: DownSampleBlock<B>,
    down_4_2: DownSampleBlock<B>,
    up21_1: UpSampleBlock<B>,
    up21_2: UpSampleBlock<B>,
    up32_1: UpSampleBlock<B>,
    up32_2: UpSampleBlock<B>,
    skff_top: Fusion<B>,
    skff_middle: Fusion<B>,
    conv_out: Conv2d<B>,
    channels: usize,
}

impl<B: Backend> MultiScaleResidualBlock<B> {
    pub const fn channels(&self) -> usize {
        self.channels
    }

    /// Channel counts of the three pyramid levels, read back from the sampling paths.
    pub fn plan(&self) -> ChannelPlan {
        ChannelPlan {
            top: self.channels,
            middle: self.down_2.out_channels(),
            bottom: self.down_4_2.out_channels(),
        }
    }

    /// Validates an input shape and returns the output shape, which is the same.
    ///
    /// # Errors
    ///
    /// Returns `Err(MirNetError::InvalidTensorShape)` if the channel count differs from
    /// `channels`, or `Err(MirNetError::IndivisibleSpatialDims)` if height or width is
    /// not a multiple of 4.
    pub fn output_shape(&self, input: [usize; 4]) -> MirNetResult<[usize; 4]> {
        if input[1] != self.channels {
            return Err(MirNetError::InvalidTensorShape {
                expected: format!("[batch, {}, height, width]", self.channels),
                actual: input.to_vec(),
            });
        }
        ensure_divisible(input, PYRAMID_FACTOR)?;
        Ok(input)
    }

    /// The unrefined `[top, middle, bottom]` levels of `x`.
    pub(crate) fn pyramid(&self, x: Tensor<B, 4>) -> MirNetResult<[Tensor<B, 4>; 3]> {
        let x_middle = self.down_2.forward(x.clone())?;
        let x_bottom = self.down_4_2.forward(self.down_4_1.forward(x.clone())?)?;
        Ok([x, x_middle, x_bottom])
    }

    fn refine(
        &self,
        [x_top, x_middle, x_bottom]: [Tensor<B, 4>; 3],
    ) -> MirNetResult<[Tensor<B, 4>; 3]> {
        Ok([
            self.rcb_top.try_transform(x_top)?,
            self.rcb_middle.try_transform(x_middle)?,
            self.rcb_bottom.try_transform(x_bottom)?,
        ])
    }

    fn fuse(
        fusion: &Fusion<B>,
        step: &str,
        level: Tensor<B, 4>,
        upsampled: Tensor<B, 4>,
    ) -> MirNetResult<Tensor<B, 4>> {
        ensure_same_shape(step, level.dims(), upsampled.dims())?;
        let fused = fusion.forward(vec![level, upsampled])?;
        tracing::trace!(step, shape = ?fused.dims(), "Fused pyramid levels");
        Ok(fused)
    }

    /// Forward pass on a channels-first tensor.
    ///
    /// # Errors
    ///
    /// Returns the error from [`output_shape`](Self::output_shape) for an unsupported
    /// input, or `Err(MirNetError::ShapeMismatch)` naming the step if two tensors
    /// that must be combined disagree in shape.
    pub fn forward(&self, input: Tensor<B, 4>) -> MirNetResult<Tensor<B, 4>> {
        self.output_shape(input.dims())?;

        let levels = self.pyramid(input.clone())?;
        let [x_top, x_middle, x_bottom] = self.refine(levels)?;

        let x_middle = Self::fuse(
            &self.skff_middle,
            "middle fusion (first pass)",
            x_middle,
            self.up32_1.forward(x_bottom.clone())?,
        )?;
        let x_top = Self::fuse(
            &self.skff_top,
            "top fusion (first pass)",
            x_top,
            self.up21_1.forward(x_middle.clone())?,
        )?;

        let [x_top, x_middle, x_bottom] = self.refine([x_top, x_middle, x_bottom])?;

        let x_middle = Self::fuse(
            &self.skff_middle,
            "middle fusion (second pass)",
            x_middle,
            self.up32_2.forward(x_bottom)?,
        )?;
        let x_top = Self::fuse(
            &self.skff_top,
            "top fusion (second pass)",
            x_top,
            self.up21_2.forward(x_middle)?,
        )?;

        let output = self.conv_out.forward(x_top);
        ensure_same_shape("residual add", output.dims(), input.dims())?;
        tracing::trace!(shape = ?output.dims(), "Adding global residual");

        Ok(output + input)
    }

    /// Forward pass on a `[batch, height, width, channels]` tensor; the output uses the
    /// same layout.
    ///
    /// # Errors
    ///
    /// Same as [`forward`](Self::forward), reported against the channels-first shape.
    pub fn forward_channels_last(&self, input: Tensor<B, 4>) -> MirNetResult<Tensor<B, 4>> {
        let output = self.forward(input.channels_first())?;
        Ok(output.channels_last())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use burn::{
        nn::Initializer,
        tensor::{Distribution, Tolerance},
    };

    use super::*;
    use crate::{
        config::{FusionKind, RefinementKind},
        tests::TestBackend,
    };

    fn random(shape: [usize; 4]) -> Tensor<TestBackend, 4> {
        Tensor::random(shape, Distribution::Normal(0.0, 1.0), &Default::default())
    }

    fn max_abs_diff(a: Tensor<TestBackend, 4>, b: Tensor<TestBackend, 4>) -> f32 {
        (a - b).abs().max().into_scalar()
    }

    #[test]
    fn forward_preserves_shape() {
        let device = Default::default();
        let block = MultiScaleResidualBlockConfig::new(16, 1.5, 4)
            .init::<TestBackend>(&device)
            .unwrap();

        let output = block.forward(random([2, 16, 8, 12])).unwrap();

        assert_eq!(output.dims(), [2, 16, 8, 12]);
        assert_eq!(
            block.plan(),
            ChannelPlan {
                top: 16,
                middle: 24,
                bottom: 36
            }
        );
    }

    #[test]
    fn zero_projection_with_identity_collaborators_returns_input() {
        let device = Default::default();
        let mut block = MultiScaleResidualBlockConfig::new(8, 1.5, 1)
            .with_refinement(RefinementKind::Identity)
            .with_fusion(FusionKind::Passthrough)
            .init::<TestBackend>(&device)
            .unwrap();
        block.conv_out = pointwise_projection(8, 8, &Initializer::Zeros, &device);
        let input = random([1, 8, 8, 8]);

        let output = block.forward(input.clone()).unwrap();

        output
            .into_data()
            .assert_approx_eq::<f32>(&input.into_data(), Tolerance::absolute(1e-6));
    }

    #[test]
    fn zero_projection_with_learned_collaborators_returns_input() {
        let device = Default::default();
        let mut block = MultiScaleResidualBlockConfig::new(8, 1.5, 2)
            .init::<TestBackend>(&device)
            .unwrap();
        block.conv_out = pointwise_projection(8, 8, &Initializer::Zeros, &device);
        let input = random([1, 8, 4, 4]);

        let output = block.forward(input.clone()).unwrap();

        output
            .into_data()
            .assert_approx_eq::<f32>(&input.into_data(), Tolerance::absolute(1e-6));
    }

    #[test]
    fn reinitializing_one_path_leaves_the_others_alone() {
        let device = Default::default();
        let mut block = MultiScaleResidualBlockConfig::new(8, 1.5, 1)
            .init::<TestBackend>(&device)
            .unwrap();
        let input = random([1, 8, 8, 8]);
        let [_, middle_before, bottom_before] = block.pyramid(input.clone()).unwrap();

        block.down_4_1 = DownSampleBlockConfig::new(8, 2, 1.5)
            .with_initializer(Initializer::Constant { value: 0.5 })
            .init(&device)
            .unwrap();
        let [_, middle_after, bottom_after] = block.pyramid(input).unwrap();

        assert!(max_abs_diff(middle_before, middle_after) < 1e-6);
        assert!(max_abs_diff(bottom_before, bottom_after) > 1e-3);
    }

    #[test]
    fn sampling_paths_own_distinct_parameters() {
        let device = Default::default();
        let block = MultiScaleResidualBlockConfig::new(8, 1.5, 1)
            .init::<TestBackend>(&device)
            .unwrap();

        let ids = [
            block.down_2.param_ids(),
            block.down_4_1.param_ids(),
            block.down_4_2.param_ids(),
            block.up21_1.param_ids(),
            block.up21_2.param_ids(),
            block.up32_1.param_ids(),
            block.up32_2.param_ids(),
        ]
        .concat();
        let unique = ids.iter().collect::<HashSet<_>>();

        assert_eq!(ids.len(), 7);
        assert_eq!(unique.len(), ids.len());
    }

    #[test]
    fn up_paths_land_on_fusion_partner_widths() {
        let device = Default::default();
        let block = MultiScaleResidualBlockConfig::new(64, 1.25, 1)
            .init::<TestBackend>(&device)
            .unwrap();

        assert_eq!(block.up32_1.out_channels(), block.down_2.out_channels());
        assert_eq!(block.up21_1.out_channels(), block.channels());
        assert_eq!(block.down_4_2.out_channels(), 100);
    }

    #[test]
    fn wrong_channel_count_is_rejected() {
        let device = Default::default();
        let block = MultiScaleResidualBlockConfig::new(8, 1.5, 1)
            .init::<TestBackend>(&device)
            .unwrap();

        match block.forward(random([1, 6, 8, 8])) {
            Err(MirNetError::InvalidTensorShape { actual, .. }) => {
                assert_eq!(actual, vec![1, 6, 8, 8]);
            }
            other => panic!("Expected InvalidTensorShape error, got {other:?}"),
        }
    }

    #[test]
    fn indivisible_spatial_dims_are_rejected() {
        let device = Default::default();
        let block = MultiScaleResidualBlockConfig::new(8, 1.5, 1)
            .init::<TestBackend>(&device)
            .unwrap();

        assert_eq!(
            block.output_shape([1, 8, 10, 8]),
            Err(MirNetError::IndivisibleSpatialDims {
                height: 10,
                width: 8,
                factor: 4
            })
        );
        assert!(block.forward(random([1, 8, 8, 6])).is_err());
    }

    #[test]
    fn invalid_configuration_fails_at_construction() {
        let device = Default::default();
        let result = MultiScaleResidualBlockConfig::new(5, 1.5, 1).init::<TestBackend>(&device);

        assert!(matches!(
            result,
            Err(MirNetError::InconsistentChannels { .. })
        ));
    }

    #[test]
    fn channels_last_matches_channels_first() {
        let device = Default::default();
        let block = MultiScaleResidualBlockConfig::new(8, 1.5, 1)
            .init::<TestBackend>(&device)
            .unwrap();
        let input = random([1, 8, 4, 8]);

        let expected = block.forward(input.clone()).unwrap();
        let output = block
            .forward_channels_last(input.permute([0, 2, 3, 1]))
            .unwrap();

        assert_eq!(output.dims(), [1, 4, 8, 8]);
        output
            .permute([0, 3, 1, 2])
            .into_data()
            .assert_approx_eq::<f32>(&expected.into_data(), Tolerance::absolute(1e-5));
    }
}
