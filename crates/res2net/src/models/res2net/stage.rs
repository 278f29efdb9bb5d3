//! # `Res2Net` Stage
//!
//! A [`Res2NetStage`] is a fixed, ordered sequence of [`BottleneckBlock`]s.
//!
//! [`Res2NetStageMeta`] defines a common meta API for [`Res2NetStage`]
//! and [`Res2NetStageConfig`].
//!
//! [`Res2NetStageConfig`] implements [`Config`], and provides
//! [`Res2NetStageConfig::init`] to initialize a [`Res2NetStage`].

use crate::models::res2net::bottleneck::{
    BottleneckBlock, BottleneckBlockConfig, BottleneckBlockMeta,
};
use crate::utility::conv_shape::ceil_div_output_resolution;
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::config::Config;
use burn::nn::activation::ActivationConfig;
use burn::prelude::{Backend, Module, Tensor};

/// [`Res2NetStage`] Meta API.
pub trait Res2NetStageMeta {
    /// The number of blocks.
    fn len(&self) -> usize;

    /// Check if the stage is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The number of input feature planes.
    fn in_channels(&self) -> usize;

    /// The number of output feature planes.
    fn out_channels(&self) -> usize;

    /// Get the effective stride of the stage.
    fn stride(&self) -> usize;

    /// Get the output resolution for a given input resolution.
    ///
    /// # Arguments
    ///
    /// - `input_resolution`: ``[in_height, in_width]``.
    ///
    /// # Returns
    ///
    /// ``[out_height, out_width]``
    fn output_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> [usize; 2] {
        ceil_div_output_resolution(input_resolution, self.stride())
    }
}

/// [`Res2NetStage`] Configuration.
#[derive(Config, Debug)]
pub struct Res2NetStageConfig {
    /// The component blocks.
    pub blocks: Vec<BottleneckBlockConfig>,
}

impl From<Vec<BottleneckBlockConfig>> for Res2NetStageConfig {
    fn from(blocks: Vec<BottleneckBlockConfig>) -> Self {
        Self { blocks }
    }
}

impl Res2NetStageMeta for Res2NetStageConfig {
    fn len(&self) -> usize {
        self.blocks.len()
    }

    fn in_channels(&self) -> usize {
        self.blocks[0].in_channels()
    }

    fn out_channels(&self) -> usize {
        self.blocks[self.blocks.len() - 1].out_channels()
    }

    fn stride(&self) -> usize {
        self.blocks
            .iter()
            .fold(1, |acc, block| acc * block.stride())
    }
}

impl Res2NetStageConfig {
    /// Build a stage config.
    ///
    /// The first block projects the residual path and carries the stage
    /// `stride`; later blocks use identity residuals at stride 1.
    ///
    /// # Arguments
    ///
    /// - `num_blocks`: number of bottleneck blocks.
    /// - `in_channels`: input planes of the first block.
    /// - `out_channels`: output planes of every block.
    /// - `filters`: reduced width of every block.
    /// - `stride`: stride of the first block.
    /// - `scales`: scale groups per block.
    /// - `first_stage`: is this the first stage of the network?
    pub fn build(
        num_blocks: usize,
        in_channels: usize,
        out_channels: usize,
        filters: usize,
        stride: usize,
        scales: usize,
        first_stage: bool,
    ) -> Self {
        let blocks = (0..num_blocks)
            .map(|b| {
                let block = if b == 0 {
                    BottleneckBlockConfig::new(in_channels, out_channels, filters)
                        .with_stride(stride)
                        .with_shortcut(false)
                        .with_is_first(first_stage)
                } else {
                    BottleneckBlockConfig::new(out_channels, out_channels, filters)
                };
                block.with_scales(scales)
            })
            .collect();

        Self { blocks }
    }

    /// Check if the config is valid.
    ///
    /// # Returns
    ///
    /// A `Result<(), String>`
    pub fn try_validate(&self) -> Result<(), String> {
        if self.is_empty() {
            return Err("blocks is empty".to_string());
        }

        for (idx, block) in self.blocks.iter().enumerate() {
            block
                .try_validate()
                .map_err(|err| format!("block[{idx}]: {err}"))?;
        }

        for idx in 1..self.blocks.len() {
            let prev = &self.blocks[idx - 1];
            let curr = &self.blocks[idx];
            if prev.out_channels() != curr.in_channels() {
                return Err(format!(
                    "block[{}].out_channels({}) != block[{}].in_channels({})",
                    idx - 1,
                    prev.out_channels(),
                    idx,
                    curr.in_channels(),
                ));
            }
        }
        Ok(())
    }

    /// Panic if `try_validate` returns an error.
    pub fn expect_valid(&self) {
        if let Err(err) = self.try_validate() {
            panic!("{}", err);
        }
    }

    /// Apply a mapping over the blocks.
    pub fn map_blocks<F>(
        self,
        f: &mut F,
    ) -> Self
    where
        F: FnMut(usize, BottleneckBlockConfig) -> BottleneckBlockConfig,
    {
        Self {
            blocks: self
                .blocks
                .into_iter()
                .enumerate()
                .map(|(idx, block)| f(idx, block))
                .collect(),
        }
    }

    /// Update the activation of every block.
    pub fn with_activation(
        self,
        activation: ActivationConfig,
    ) -> Self {
        self.map_blocks(&mut |_, block| block.with_activation(activation.clone()))
    }

    /// Initialize a new [`Res2NetStage`].
    ///
    /// # Panics
    ///
    /// If the config is invalid.
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> Res2NetStage<B> {
        self.expect_valid();

        Res2NetStage {
            blocks: self
                .blocks
                .iter()
                .map(|block| block.init(device))
                .collect(),
        }
    }
}

/// Res2Net stage.
#[derive(Module, Debug)]
pub struct Res2NetStage<B: Backend> {
    /// Internal blocks.
    pub blocks: Vec<BottleneckBlock<B>>,
}

impl<B: Backend> Res2NetStageMeta for Res2NetStage<B> {
    fn len(&self) -> usize {
        self.blocks.len()
    }

    fn in_channels(&self) -> usize {
        self.blocks[0].in_channels()
    }

    fn out_channels(&self) -> usize {
        self.blocks[self.blocks.len() - 1].out_channels()
    }

    fn stride(&self) -> usize {
        self.blocks
            .iter()
            .fold(1, |acc, block| acc * block.stride())
    }
}

impl<B: Backend> Res2NetStage<B> {
    /// Apply the stage.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_channels, in_height, in_width]``.
    ///
    /// # Returns
    ///
    /// ``[batch, out_channels, out_height, out_width]``
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let [batch, in_height, in_width] = unpack_shape_contract!(
            ["batch", "in_channels", "in_height", "in_width"],
            &input,
            &["batch", "in_height", "in_width"],
            &[("in_channels", self.in_channels())],
        );
        let [out_height, out_width] = self.output_resolution([in_height, in_width]);

        let x = self.blocks.iter().fold(input, |x, block| block.forward(x));

        assert_shape_contract_periodically!(
            ["batch", "out_channels", "out_height", "out_width"],
            &x,
            &[
                ("batch", batch),
                ("out_channels", self.out_channels()),
                ("out_height", out_height),
                ("out_width", out_width)
            ],
        );

        x
    }
}
