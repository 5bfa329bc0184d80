//! Enum types used in block configuration.

use burn::prelude::*;

/// Per-level refinement applied before each fusion pass.
#[derive(Config, Debug, PartialEq, Eq)]
pub enum RefinementKind {
    /// Residual context block (grouped convolutions plus global context attention).
    ResidualContext,
    /// Pass features through unchanged.
    Identity,
}

/// Cross-scale fusion used to merge a level with the upsampled level below it.
#[derive(Config, Debug, PartialEq, Eq)]
pub enum FusionKind {
    /// Selective kernel feature fusion (attention-weighted sum of the inputs).
    SelectiveKernel,
    /// Keep the first input and discard the second, after the usual arity and shape checks.
    Passthrough,
}
