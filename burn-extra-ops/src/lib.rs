//! Additional operations for the Burn deep learning framework
//!
//! Burn's convolution, pooling and interpolation primitives work on channels-first
//! `[batch, channels, height, width]` tensors. This crate adds the small pieces that
//! feature-pyramid networks keep reaching for: layout permutes for channels-last data,
//! an integer-factor bilinear upsampling module, and a parameter-free identity module.

use burn::prelude::*;

mod identity;
mod layout;
mod upsample;

// Convenient re-exports
pub use identity::Identity;
pub use layout::{to_channels_first, to_channels_last};
pub use upsample::{BilinearUpsample, BilinearUpsampleConfig};

/// Additional operations for rank-4 Burn tensors
pub trait TensorExtraOps<B: Backend> {
    /// Permute `[batch, height, width, channels]` into `[batch, channels, height, width]`.
    fn channels_first(self) -> Self;

    /// Permute `[batch, channels, height, width]` into `[batch, height, width, channels]`.
    fn channels_last(self) -> Self;

    /// Bilinearly resize a channels-first tensor by an integer factor in both spatial dims.
    fn upsample_bilinear(self, scale_factor: usize) -> Self;
}

impl<B: Backend> TensorExtraOps<B> for Tensor<B, 4> {
    fn channels_first(self) -> Self {
        to_channels_first(self)
    }

    fn channels_last(self) -> Self {
        to_channels_last(self)
    }

    fn upsample_bilinear(self, scale_factor: usize) -> Self {
        BilinearUpsampleConfig::new()
            .with_scale_factor(scale_factor)
            .init()
            .forward(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::{backend::NdArray, tensor::Distribution};

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_tensor_extra_ops_layout_round_trip() {
        let device = Default::default();
        let tensor =
            Tensor::<TestBackend, 4>::random([2, 5, 6, 3], Distribution::Normal(0.0, 1.0), &device);

        let first = tensor.clone().channels_first();
        assert_eq!(first.dims(), [2, 3, 5, 6]);

        let back = first.channels_last();
        back.into_data().assert_eq(&tensor.into_data(), true);
    }

    #[test]
    fn test_tensor_extra_ops_upsample() {
        let device = Default::default();
        let tensor = Tensor::<TestBackend, 4>::ones([1, 2, 3, 4], &device);

        let result = tensor.upsample_bilinear(2);
        assert_eq!(result.dims(), [1, 2, 6, 8]);
    }
}
