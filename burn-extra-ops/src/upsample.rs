//! # Bilinear Upsampling
//!
//! An integer-factor, parameter-free upsampling module with half-pixel sample centers:
//! output pixel `o` reads the input at `(o + 0.5) / scale_factor - 0.5`, clamped to the
//! edge. For a factor of 2 every output is a `0.75 / 0.25` blend of its source pixel and
//! the nearer neighbor.
//!
//! Burn's `interpolate` aligns corners instead, so the resampling is built from `narrow`,
//! `cat` and `stack`, one spatial axis at a time.

use burn::prelude::*;

/// Upsamples one spatial axis (`2` or `3`) of a `[batch, channels, height, width]` tensor.
fn upsample_axis<B: Backend>(x: Tensor<B, 4>, dim: usize, factor: usize) -> Tensor<B, 4> {
    let mut shape = x.dims();
    let len = shape[dim];

    // Replicate the edges so every source pixel has a neighbor on both sides.
    let first = x.clone().narrow(dim, 0, 1);
    let last = x.clone().narrow(dim, len - 1, 1);
    let padded = Tensor::cat(vec![first, x, last], dim);

    let phases = (0..factor)
        .map(|phase| {
            let offset = (2 * phase + 1) as f64 / (2 * factor) as f64 - 0.5;
            let center = padded.clone().narrow(dim, 1, len);
            if offset == 0.0 {
                return center;
            }
            let neighbor = if offset < 0.0 {
                padded.clone().narrow(dim, 0, len)
            } else {
                padded.clone().narrow(dim, 2, len)
            };
            let weight = offset.abs();
            center.mul_scalar(1.0 - weight) + neighbor.mul_scalar(weight)
        })
        .collect::<Vec<_>>();

    shape[dim] *= factor;
    Tensor::stack::<5>(phases, dim + 1).reshape(shape)
}

/// Configuration for the `BilinearUpsample` module.
#[derive(Config, Debug)]
pub struct BilinearUpsampleConfig {
    /// Factor applied to both height and width.
    #[config(default = "2")]
    pub scale_factor: usize,
}

impl BilinearUpsampleConfig {
    /// Initializes a new `BilinearUpsample` module.
    ///
    /// # Panics
    ///
    /// If `scale_factor` is zero.
    pub fn init(&self) -> BilinearUpsample {
        assert!(
            self.scale_factor > 0,
            "Scale factor for BilinearUpsample must be positive, got {}",
            self.scale_factor
        );

        BilinearUpsample {
            scale_factor: self.scale_factor,
        }
    }
}

/// Bilinear upsampling by a fixed integer factor.
///
/// # Shapes
/// - input: `[batch_size, channels, height, width]`
/// - output: `[batch_size, channels, height * scale_factor, width * scale_factor]`
#[derive(Module, Clone, Debug)]
pub struct BilinearUpsample {
    scale_factor: usize,
}

impl BilinearUpsample {
    /// The spatial scale factor.
    pub const fn scale_factor(&self) -> usize {
        self.scale_factor
    }

    /// Predicts the output `[height, width]` for an input resolution.
    pub const fn output_resolution(&self, input_resolution: [usize; 2]) -> [usize; 2] {
        let [height, width] = input_resolution;
        [height * self.scale_factor, width * self.scale_factor]
    }

    pub fn forward<B: Backend>(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        if self.scale_factor == 1 {
            return x;
        }
        let x = upsample_axis(x, 2, self.scale_factor);
        upsample_axis(x, 3, self.scale_factor)
    }
}
