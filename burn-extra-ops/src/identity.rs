//! Parameter-free pass-through module.

use burn::prelude::*;

/// A module that hands its input back untouched.
///
/// Useful as a stand-in wherever a learned stage is optional: an enum module can hold
/// `Identity` in one variant and keep the same `forward` call site for every variant.
#[derive(Module, Debug)]
pub struct Identity<B: Backend> {
    _phantom: core::marker::PhantomData<B>,
}

impl<B: Backend> Identity<B> {
    /// Create a new `Identity` module.
    pub const fn new() -> Self {
        Self {
            _phantom: core::marker::PhantomData,
        }
    }

    /// Returns `input` as is, for any rank.
    pub const fn forward<const D: usize>(&self, input: Tensor<B, D>) -> Tensor<B, D> {
        input
    }
}

impl<B: Backend> Default for Identity<B> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::{backend::NdArray, tensor::Distribution};

    type TestBackend = NdArray<f32>;

    #[test]
    fn identity_keeps_values_and_owns_no_parameters() {
        let device = Default::default();
        let identity = Identity::<TestBackend>::default();
        let input =
            Tensor::<TestBackend, 4>::random([2, 3, 4, 4], Distribution::Normal(0.0, 1.0), &device);

        let output = identity.forward(input.clone());

        output.into_data().assert_eq(&input.into_data(), true);
        assert_eq!(identity.num_params(), 0);
    }
}
