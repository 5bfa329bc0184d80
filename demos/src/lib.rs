//! MIRNet Demos
//!
//! Command-line tooling around the multi-scale residual block.
//!
//! ## Usage
//!
//! ```bash
//! # Run the block once on a random (1, 64, 64, 64) tensor
//! cargo run --bin msrb -- run
//!
//! # Override the block from the command line
//! cargo run --bin msrb -- run --channels 32 --channel-factor 2 --height 32 --width 32
//!
//! # Print the channel plan for a configuration
//! cargo run --bin msrb -- plan --channels 64 --channel-factor 1.25
//!
//! # Write the default configuration
//! cargo run --bin msrb -- config msrb.json
//!
//! # Run on the GPU
//! cargo run --bin msrb --features wgpu --no-default-features -- run
//! ```

pub mod common;
pub mod config;
pub mod runner;

// Re-export commonly used items
pub use common::{create_device, get_backend_name, init_logging, SelectedBackend, SelectedDevice};
pub use config::{RunConfig, RunReport};
pub use runner::{build_block, run_block};
