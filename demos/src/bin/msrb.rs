//! Multi-scale residual block demo.
//!
//! Builds the block on the backend selected by feature flag and exercises it:
//! `run` does one forward pass, `plan` prints the channel plan, `config` writes a
//! starting configuration file.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use mirnet_burn::{ChannelPlan, FusionKind, RefinementKind};
use mirnet_demos::{
    create_device, get_backend_name, init_logging, run_block, RunConfig, SelectedBackend,
};

#[derive(Parser)]
#[command(name = "msrb")]
#[command(about = "MIRNet multi-scale residual block demo")]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one forward pass on a random tensor and print a JSON report
    Run {
        /// Configuration file path
        #[arg(short, long)]
        config: Option<PathBuf>,

        #[command(flatten)]
        overrides: Overrides,

        /// Override batch size
        #[arg(long)]
        batch_size: Option<usize>,

        /// Override input height
        #[arg(long)]
        height: Option<usize>,

        /// Override input width
        #[arg(long)]
        width: Option<usize>,

        /// Feed a [batch, height, width, channels] tensor
        #[arg(long)]
        channels_last: bool,

        /// Replace refinement and fusion with pass-through stages
        #[arg(long)]
        passthrough: bool,
    },

    /// Print the channel plan as JSON
    Plan {
        /// Configuration file path
        #[arg(short, long)]
        config: Option<PathBuf>,

        #[command(flatten)]
        overrides: Overrides,
    },

    /// Write the default configuration to a file
    Config {
        /// Output path
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Args)]
struct Overrides {
    /// Override block channels
    #[arg(long)]
    channels: Option<usize>,

    /// Override channel factor
    #[arg(long)]
    channel_factor: Option<f64>,

    /// Override convolution groups
    #[arg(long)]
    groups: Option<usize>,
}

fn load_config(path: Option<&PathBuf>, overrides: &Overrides) -> Result<RunConfig> {
    let mut config = match path {
        Some(path) => RunConfig::load(path)?,
        None => RunConfig::default(),
    };

    if let Some(channels) = overrides.channels {
        config.block.channels = channels;
    }
    if let Some(channel_factor) = overrides.channel_factor {
        config.block.channel_factor = channel_factor;
    }
    if let Some(groups) = overrides.groups {
        config.block.groups = groups;
    }

    Ok(config)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Run {
            config,
            overrides,
            batch_size,
            height,
            width,
            channels_last,
            passthrough,
        } => {
            let mut config = load_config(config.as_ref(), &overrides)?;
            if let Some(batch_size) = batch_size {
                config.batch_size = batch_size;
            }
            if let Some(height) = height {
                config.height = height;
            }
            if let Some(width) = width {
                config.width = width;
            }
            config.channels_last |= channels_last;
            if passthrough {
                config.block.refinement = RefinementKind::Identity;
                config.block.fusion = FusionKind::Passthrough;
            }

            tracing::info!("Using backend: {}", get_backend_name());
            let device = create_device();
            let report = run_block::<SelectedBackend>(&config, get_backend_name(), &device)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }

        Commands::Plan { config, overrides } => {
            let config = load_config(config.as_ref(), &overrides)?;
            let plan: ChannelPlan = config
                .block
                .validate()
                .context("Configuration does not yield a consistent channel plan")?;
            println!("{}", serde_json::to_string_pretty(&plan)?);
            Ok(())
        }

        Commands::Config { output, force } => {
            if output.exists() && !force {
                bail!(
                    "{} already exists; pass --force to overwrite",
                    output.display()
                );
            }
            RunConfig::default().save(&output)?;
            tracing::info!("Wrote default configuration to {}", output.display());
            Ok(())
        }
    }
}
