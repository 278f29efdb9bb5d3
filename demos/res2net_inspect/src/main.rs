#![recursion_limit = "256"]

use anyhow::{Context, Result};
use burn::backend::NdArray;
use burn::config::Config;
use burn::module::Module;
use burn::prelude::Tensor;
use burn::tensor::Distribution;
use clap::{Parser, arg};
use res2net::models::res2net::naming::PretrainedNaming;
use res2net::models::res2net::prefabs::PREFAB_RES2NET_VD_MAP;
use res2net::models::res2net::{Res2NetVd, Res2NetVdContractConfig, Res2NetVdMeta};
use res2net::utility::record::record_shape_summary;
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Prefab model config.
    /// Use "list" to list all available prefabs.
    #[arg(long, default_value = "res2net50_vd_26w_4s")]
    prefab: String,

    /// Load the model config from a JSON file instead of a prefab.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Save the resolved model config to a JSON file.
    #[arg(long)]
    save_config: Option<PathBuf>,

    /// Number of classification classes.
    #[arg(long, default_value_t = 1000)]
    num_classes: usize,

    /// Print the external checkpoint name of every parameter.
    #[arg(long, default_value = "false")]
    keys: bool,

    /// Print a shape-only JSON view of the model record.
    #[arg(long, default_value = "false")]
    summary: bool,

    /// Run a forward pass on random input.
    #[arg(long, default_value = "false")]
    forward: bool,

    /// Input resolution for the forward pass.
    #[arg(long, default_value_t = 224)]
    resolution: usize,

    /// Batch size for the forward pass.
    #[arg(short, long, default_value_t = 1)]
    batch_size: usize,
}

fn init_tracing() {
    let filter = match std::env::var("RUST_LOG") {
        Ok(_) => EnvFilter::from_default_env(),
        Err(_) => EnvFilter::from_default_env().add_directive(LevelFilter::INFO.into()),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true).compact())
        .init();
}

fn resolve_config(args: &Args) -> Result<Res2NetVdContractConfig> {
    let config = match &args.config {
        Some(path) => Res2NetVdContractConfig::load(path)
            .with_context(|| format!("failed to load config file '{}'", path.display()))?,
        None => PREFAB_RES2NET_VD_MAP
            .try_lookup_prefab(&args.prefab)
            .map_err(anyhow::Error::msg)?
            .new_config(),
    };
    Ok(config.with_num_classes(args.num_classes))
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    if args.prefab == "list" {
        for name in PREFAB_RES2NET_VD_MAP.names() {
            if let Some(prefab) = PREFAB_RES2NET_VD_MAP.lookup_prefab(name) {
                println!("{name}: {}", prefab.description);
            }
        }
        return Ok(());
    }

    let config = resolve_config(&args)?;
    config.try_validate().map_err(anyhow::Error::msg)?;
    tracing::info!(
        layers = config.layers,
        scales = config.scales,
        width = config.width,
        num_classes = config.num_classes,
        "resolved config"
    );

    if let Some(path) = &args.save_config {
        config
            .save(path)
            .with_context(|| format!("failed to save config file '{}'", path.display()))?;
        tracing::info!(path = %path.display(), "saved config");
    }

    if args.keys {
        for key in config
            .parameter_keys(&PretrainedNaming)
            .map_err(anyhow::Error::msg)?
        {
            println!("{key}");
        }
    }

    if !(args.summary || args.forward) {
        return Ok(());
    }

    type B = NdArray<f32>;
    let device = Default::default();

    let start = Instant::now();
    let model: Res2NetVd<B> = config.try_init(&device).map_err(anyhow::Error::msg)?;
    tracing::info!(
        num_blocks = model.num_blocks(),
        num_params = model.num_params(),
        elapsed = ?start.elapsed(),
        "initialized model"
    );

    if args.forward {
        let input: Tensor<B, 4> = Tensor::random(
            [
                args.batch_size,
                model.in_channels(),
                args.resolution,
                args.resolution,
            ],
            Distribution::Default,
            &device,
        );

        let start = Instant::now();
        let output = model.forward(input);
        tracing::info!(
            output_shape = ?output.dims(),
            elapsed = ?start.elapsed(),
            "forward pass"
        );
    }

    if args.summary {
        let summary = record_shape_summary::<B, _>(model.into_record())?;
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }

    Ok(())
}
