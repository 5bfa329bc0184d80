//! Builds a block from a [`RunConfig`] and runs it once on random data.

use std::time::Instant;

use anyhow::{Context, Result};
use burn::{prelude::*, tensor::Distribution};
use mirnet_burn::MultiScaleResidualBlock;

use crate::config::{RunConfig, RunReport};

/// Builds the block described by `config`.
pub fn build_block<B: Backend>(
    config: &RunConfig,
    device: &B::Device,
) -> Result<MultiScaleResidualBlock<B>> {
    config
        .block
        .init(device)
        .context("Failed to build multi-scale residual block")
}

/// Runs one forward pass on a standard-normal input and reports what happened.
pub fn run_block<B: Backend>(
    config: &RunConfig,
    backend_name: &str,
    device: &B::Device,
) -> Result<RunReport> {
    config.validate()?;
    let block = build_block::<B>(config, device)?;
    let input_shape = config.input_shape();
    tracing::info!(?input_shape, plan = ?block.plan(), "Running forward pass");

    let input = Tensor::<B, 4>::random(input_shape, Distribution::Normal(0.0, 1.0), device);
    let start = Instant::now();
    let output = if config.channels_last {
        block.forward_channels_last(input)
    } else {
        block.forward(input)
    }
    .context("Forward pass failed")?;
    let output_shape = output.dims();
    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
    tracing::debug!(?output_shape, elapsed_ms, "Forward pass finished");

    Ok(RunReport {
        backend: backend_name.to_string(),
        plan: block.plan(),
        num_params: block.num_params(),
        input_shape: input_shape.to_vec(),
        output_shape: output_shape.to_vec(),
        elapsed_ms,
    })
}

#[cfg(all(test, feature = "ndarray"))]
mod tests {
    use burn::backend::NdArray;
    use mirnet_burn::MultiScaleResidualBlockConfig;

    use super::*;

    type TestBackend = NdArray<f32>;

    fn small_config() -> RunConfig {
        RunConfig {
            block: MultiScaleResidualBlockConfig::new(8, 1.5, 2),
            batch_size: 1,
            height: 8,
            width: 8,
            channels_last: false,
        }
    }

    #[test]
    fn report_matches_input_shape() {
        let device = Default::default();
        let report = run_block::<TestBackend>(&small_config(), "test", &device).unwrap();

        assert_eq!(report.input_shape, vec![1, 8, 8, 8]);
        assert_eq!(report.output_shape, report.input_shape);
        assert_eq!(report.plan.bottom, 18);
        assert!(report.num_params > 0);
    }

    #[test]
    fn channels_last_run_keeps_layout() {
        let device = Default::default();
        let mut config = small_config();
        config.channels_last = true;
        config.width = 12;

        let report = run_block::<TestBackend>(&config, "test", &device).unwrap();

        assert_eq!(report.output_shape, vec![1, 8, 12, 8]);
    }

    #[test]
    fn indivisible_input_surfaces_as_error() {
        let device = Default::default();
        let mut config = small_config();
        config.height = 6;

        let err = run_block::<TestBackend>(&config, "test", &device).unwrap_err();

        assert!(format!("{err:#}").contains("not divisible by 4"));
    }
}
