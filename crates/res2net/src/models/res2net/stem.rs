//! # Deep Input Stem
//!
//! Three ``3x3`` conv/norm/act layers followed by a ``3x3 / stride 2`` max pool:
//! 1. ``in_channels -> stem_width, stride=2``
//! 2. ``stem_width -> stem_width, stride=1``
//! 3. ``stem_width -> stem_width * 2, stride=1``
//!
//! The stem reduces the input resolution by 4.

use crate::layers::conv_bn::{ConvBnLayer, ConvBnLayerConfig, ConvBnLayerMeta};
use crate::utility::conv_shape::ceil_div_output_resolution;
use burn::config::Config;
use burn::module::Module;
use burn::nn::activation::ActivationConfig;
use burn::nn::pool::{MaxPool2d, MaxPool2dConfig};
use burn::nn::{BatchNormConfig, PaddingConfig2d};
use burn::prelude::{Backend, Tensor};

/// [`Res2NetStem`] Config.
#[derive(Config, Debug)]
pub struct Res2NetStemConfig {
    /// Input image channels.
    #[config(default = 3)]
    pub in_channels: usize,

    /// Width of the first two stem convolutions.
    #[config(default = 32)]
    pub stem_width: usize,

    /// The [`BatchNormConfig`] shared by the stem layers.
    #[config(default = "BatchNormConfig::new(0)")]
    pub norm: BatchNormConfig,

    /// Stem activation.
    #[config(default = "ActivationConfig::Relu")]
    pub activation: ActivationConfig,
}

impl Res2NetStemConfig {
    /// The stem output channels; ``stem_width * 2``.
    pub fn out_channels(&self) -> usize {
        self.stem_width * 2
    }

    /// The stem conv layer configs, in order.
    pub fn conv_configs(&self) -> [ConvBnLayerConfig; 3] {
        let w = self.stem_width;
        let cna = |in_channels: usize, out_channels: usize, stride: usize| {
            ConvBnLayerConfig::new(in_channels, out_channels, 3)
                .with_stride(stride)
                .with_norm(self.norm.clone())
                .with_act(Some(self.activation.clone()))
        };
        [cna(self.in_channels, w, 2), cna(w, w, 1), cna(w, 2 * w, 1)]
    }

    /// Get the output resolution for a given input resolution.
    pub fn output_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> [usize; 2] {
        ceil_div_output_resolution(input_resolution, 4)
    }

    /// Initialize a [`Res2NetStem`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> Res2NetStem<B> {
        let [conv1, conv2, conv3] = self.conv_configs();
        Res2NetStem {
            conv1: conv1.init(device),
            conv2: conv2.init(device),
            conv3: conv3.init(device),
            pool: MaxPool2dConfig::new([3, 3])
                .with_strides([2, 2])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(),
        }
    }
}

/// Deep stem module.
#[derive(Module, Debug)]
pub struct Res2NetStem<B: Backend> {
    /// The first convolution; stride 2.
    pub conv1: ConvBnLayer<B>,
    /// The second convolution.
    pub conv2: ConvBnLayer<B>,
    /// The third convolution.
    pub conv3: ConvBnLayer<B>,
    /// The max pooling.
    pub pool: MaxPool2d,
}

impl<B: Backend> Res2NetStem<B> {
    /// Input channels.
    pub fn in_channels(&self) -> usize {
        self.conv1.in_channels()
    }

    /// Output channels.
    pub fn out_channels(&self) -> usize {
        self.conv3.out_channels()
    }

    /// Forward pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_channels, height, width]``.
    ///
    /// # Returns
    ///
    /// ``[batch, out_channels, ceil(height/4), ceil(width/4)]``
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let x = self.conv1.forward(input);
        let x = self.conv2.forward(x);
        let x = self.conv3.forward(x);
        self.pool.forward(x)
    }
}
