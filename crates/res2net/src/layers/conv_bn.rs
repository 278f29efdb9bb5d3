//! # `ConvBn` - conv/batch-norm/activation block.
//!
//! A [`ConvBnLayer`] module is:
//! * an optional "vd" [`AvgPool2dCeil`] downsampling step (``2x2``, stride 2, ceil rounding),
//! * a [`Conv2d`] layer with "same"-style padding ``(kernel_size - 1) / 2`` and no bias,
//! * a [`BatchNorm`] layer,
//! * an optional [`Activation`] layer; identity when absent.
//!
//! [`ConvBnLayerMeta`] defines a common meta API for [`ConvBnLayer`]
//! and [`ConvBnLayerConfig`].

use crate::layers::pool::{AvgPool2dCeil, AvgPool2dCeilConfig};
use crate::utility::conv_shape::{expect_conv_output_resolution, maybe_pool1d_ceil_output_size};
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::config::Config;
use burn::module::Module;
use burn::nn::activation::{Activation, ActivationConfig};
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::{BatchNorm, BatchNormConfig, Initializer, PaddingConfig2d};
use burn::prelude::{Backend, Tensor};

/// Kaiming-normal, fan-in, ``gain = sqrt(2)`` conv initializer.
///
/// ``std = sqrt(2 / fan_in)``
pub const CONV_KAIMING_INITIALIZER: Initializer = Initializer::KaimingNormal {
    gain: std::f64::consts::SQRT_2,
    fan_out_only: false,
};

/// The "vd" downsampling window, and stride.
pub const VD_POOL_SIZE: usize = 2;

/// [`ConvBnLayer`] Meta.
pub trait ConvBnLayerMeta {
    /// Number of input channels.
    fn in_channels(&self) -> usize;

    /// Number of output channels.
    fn out_channels(&self) -> usize;

    /// Square conv kernel size.
    fn kernel_size(&self) -> usize;

    /// Conv stride.
    fn stride(&self) -> usize;

    /// Number of conv groups.
    fn groups(&self) -> usize;

    /// Is the "vd" average-pool downsampling step applied before the conv?
    fn is_vd_mode(&self) -> bool;

    /// The symmetric conv padding.
    fn padding(&self) -> usize {
        (self.kernel_size() - 1) / 2
    }

    /// Get the output resolution for a given input resolution.
    ///
    /// # Arguments
    ///
    /// - `input_resolution`: ``[in_height, in_width]``.
    ///
    /// # Returns
    ///
    /// ``[out_height, out_width]``
    ///
    /// # Panics
    ///
    /// If the input resolution is too small for the layer.
    fn output_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> [usize; 2] {
        let resolution = if self.is_vd_mode() {
            input_resolution.map(|size| {
                maybe_pool1d_ceil_output_size(size, VD_POOL_SIZE, VD_POOL_SIZE)
                    .unwrap_or_else(|| panic!("input {input_resolution:?} too small for vd pool"))
            })
        } else {
            input_resolution
        };

        expect_conv_output_resolution(resolution, self.kernel_size(), self.stride(), self.padding())
    }
}

/// [`ConvBnLayer`] Config.
///
/// Implements [`ConvBnLayerMeta`].
#[derive(Config, Debug)]
pub struct ConvBnLayerConfig {
    /// Number of input channels.
    pub in_channels: usize,

    /// Number of output channels (conv filters).
    pub out_channels: usize,

    /// Square conv kernel size; must be odd.
    pub kernel_size: usize,

    /// Conv stride.
    #[config(default = 1)]
    pub stride: usize,

    /// Conv groups.
    #[config(default = 1)]
    pub groups: usize,

    /// Apply the "vd" ``2x2`` ceil-mode average pool before the conv.
    #[config(default = false)]
    pub vd_mode: bool,

    /// Optional activation; identity when `None`.
    #[config(default = "None")]
    pub act: Option<ActivationConfig>,

    /// The [`BatchNorm`] config.
    ///
    /// The feature size of this config will be replaced with `out_channels`.
    #[config(default = "BatchNormConfig::new(0)")]
    pub norm: BatchNormConfig,

    /// The [`Conv2d`] initializer.
    #[config(default = "CONV_KAIMING_INITIALIZER")]
    pub initializer: Initializer,
}

impl ConvBnLayerMeta for ConvBnLayerConfig {
    fn in_channels(&self) -> usize {
        self.in_channels
    }

    fn out_channels(&self) -> usize {
        self.out_channels
    }

    fn kernel_size(&self) -> usize {
        self.kernel_size
    }

    fn stride(&self) -> usize {
        self.stride
    }

    fn groups(&self) -> usize {
        self.groups
    }

    fn is_vd_mode(&self) -> bool {
        self.vd_mode
    }
}

impl ConvBnLayerConfig {
    /// Check if the config is valid.
    ///
    /// # Returns
    ///
    /// A `Result<(), String>`
    pub fn try_validate(&self) -> Result<(), String> {
        if self.in_channels == 0 || self.out_channels == 0 {
            return Err(format!(
                "channels must be > 0: in_channels={}, out_channels={}",
                self.in_channels, self.out_channels
            ));
        }
        if self.kernel_size == 0 || self.kernel_size % 2 == 0 {
            return Err(format!(
                "kernel_size must be odd and > 0: {}",
                self.kernel_size
            ));
        }
        if self.stride == 0 {
            return Err("stride must be > 0".to_string());
        }
        if self.groups == 0
            || self.in_channels % self.groups != 0
            || self.out_channels % self.groups != 0
        {
            return Err(format!(
                "groups({}) must divide in_channels({}) and out_channels({})",
                self.groups, self.in_channels, self.out_channels
            ));
        }
        Ok(())
    }

    /// Panic if `try_validate` returns an error.
    pub fn expect_valid(&self) {
        if let Err(err) = self.try_validate() {
            panic!("{}", err);
        }
    }

    /// Build the inner [`Conv2dConfig`].
    pub fn conv_config(&self) -> Conv2dConfig {
        let p = self.padding();
        Conv2dConfig::new(
            [self.in_channels, self.out_channels],
            [self.kernel_size, self.kernel_size],
        )
        .with_stride([self.stride, self.stride])
        .with_padding(PaddingConfig2d::Explicit(p, p))
        .with_groups(self.groups)
        .with_initializer(self.initializer.clone())
        .with_bias(false)
    }

    /// Initialize a [`ConvBnLayer`].
    ///
    /// Auto-matches the norm layer features to the conv layer's output channels.
    ///
    /// # Panics
    ///
    /// If the config is invalid.
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> ConvBnLayer<B> {
        self.expect_valid();

        ConvBnLayer {
            pool: self.vd_mode.then(|| {
                AvgPool2dCeilConfig::new([VD_POOL_SIZE, VD_POOL_SIZE])
                    .with_strides([VD_POOL_SIZE, VD_POOL_SIZE])
                    .init()
            }),
            conv: self.conv_config().init(device),
            norm: BatchNormConfig {
                num_features: self.out_channels,
                ..self.norm.clone()
            }
            .init(device),
            act: self.act.as_ref().map(|act| act.init(device)),
        }
    }
}

/// Sequenced [vd-pool]/conv/norm/[activation] block.
///
/// Implements [`ConvBnLayerMeta`].
#[derive(Module, Debug)]
pub struct ConvBnLayer<B: Backend> {
    /// Optional "vd" downsampling pool.
    pub pool: Option<AvgPool2dCeil>,

    /// Internal Conv2d layer.
    pub conv: Conv2d<B>,

    /// Internal Norm Layer.
    pub norm: BatchNorm<B>,

    /// Optional activation layer.
    pub act: Option<Activation<B>>,
}

impl<B: Backend> ConvBnLayerMeta for ConvBnLayer<B> {
    fn in_channels(&self) -> usize {
        self.conv.weight.shape().dims[1] * self.groups()
    }

    fn out_channels(&self) -> usize {
        self.conv.weight.shape().dims[0]
    }

    fn kernel_size(&self) -> usize {
        self.conv.kernel_size[0]
    }

    fn stride(&self) -> usize {
        self.conv.stride[0]
    }

    fn groups(&self) -> usize {
        self.conv.groups
    }

    fn is_vd_mode(&self) -> bool {
        self.pool.is_some()
    }
}

impl<B: Backend> ConvBnLayer<B> {
    /// Forward Pass.
    ///
    /// ```rust,ignore
    /// let x = if vd_mode { vd_pool(input) } else { input };
    /// let x = self.conv.forward(x);
    /// let x = self.norm.forward(x);
    /// let x = self.act.forward(x); // when present
    /// return x
    /// ```
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
            &[("in_channels", self.in_channels())]
        );
        let [out_height, out_width] = self.output_resolution([in_height, in_width]);

        let x = match &self.pool {
            Some(pool) => pool.forward(input),
            None => input,
        };

        let x = self.conv.forward(x);
        let x = self.norm.forward(x);

        let x = match &self.act {
            Some(act) => act.forward(x),
            None => x,
        };

        assert_shape_contract_periodically!(
            ["batch", "out_channels", "out_height", "out_width"],
            &x,
            &[
                ("batch", batch),
                ("out_channels", self.out_channels()),
                ("out_height", out_height),
                ("out_width", out_width)
            ]
        );

        x
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bimm_contracts::assert_shape_contract;
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    #[test]
    fn test_config_meta() {
        let config = ConvBnLayerConfig::new(3, 32, 3).with_stride(2);
        assert_eq!(config.in_channels(), 3);
        assert_eq!(config.out_channels(), 32);
        assert_eq!(config.kernel_size(), 3);
        assert_eq!(config.padding(), 1);
        assert_eq!(config.stride(), 2);
        assert_eq!(config.groups(), 1);
        assert!(!config.is_vd_mode());
        assert!(config.act.is_none());
        assert_eq!(config.output_resolution([224, 224]), [112, 112]);
        assert_eq!(config.output_resolution([7, 7]), [4, 4]);

        let config = ConvBnLayerConfig::new(64, 256, 1).with_vd_mode(true);
        assert_eq!(config.padding(), 0);
        assert_eq!(config.output_resolution([56, 56]), [28, 28]);
        assert_eq!(config.output_resolution([7, 9]), [4, 5]);

        let conv = config.conv_config();
        assert_eq!(conv.channels, [64, 256]);
        assert_eq!(conv.kernel_size, [1, 1]);
        assert!(!conv.bias);
    }

    #[test]
    fn test_try_validate() {
        assert!(ConvBnLayerConfig::new(4, 8, 3).try_validate().is_ok());

        let err = ConvBnLayerConfig::new(4, 8, 2).try_validate().unwrap_err();
        assert!(err.contains("kernel_size"), "{err}");

        let err = ConvBnLayerConfig::new(4, 6, 3)
            .with_groups(4)
            .try_validate()
            .unwrap_err();
        assert!(err.contains("groups(4)"), "{err}");

        assert!(
            ConvBnLayerConfig::new(0, 8, 1).try_validate().is_err(),
            "zero channels"
        );
    }

    #[test]
    #[should_panic(expected = "groups(3) must divide")]
    fn test_init_invalid_panics() {
        type B = NdArray<f32>;
        let device = Default::default();
        let _layer: ConvBnLayer<B> = ConvBnLayerConfig::new(4, 8, 3)
            .with_groups(3)
            .init(&device);
    }

    #[test]
    fn test_module_meta() {
        type B = NdArray<f32>;
        let device = Default::default();

        let layer: ConvBnLayer<B> = ConvBnLayerConfig::new(8, 16, 3)
            .with_stride(2)
            .with_groups(4)
            .with_vd_mode(true)
            .with_act(Some(ActivationConfig::Relu))
            .init(&device);

        assert_eq!(layer.in_channels(), 8);
        assert_eq!(layer.out_channels(), 16);
        assert_eq!(layer.kernel_size(), 3);
        assert_eq!(layer.stride(), 2);
        assert_eq!(layer.groups(), 4);
        assert!(layer.is_vd_mode());
        assert!(layer.act.is_some());
        assert_eq!(layer.norm.gamma.shape().dims, [16]);
    }

    #[test]
    fn test_forward_matches_sequence() {
        type B = NdArray<f32>;
        let device = Default::default();

        let layer: ConvBnLayer<B> = ConvBnLayerConfig::new(2, 4, 3)
            .with_act(Some(ActivationConfig::Relu))
            .init(&device);

        let input: Tensor<B, 4> = Tensor::random([2, 2, 10, 10], Distribution::Default, &device);

        let output = layer.forward(input.clone());
        let expected = {
            let x = layer.conv.forward(input);
            let x = layer.norm.forward(x);
            burn::tensor::activation::relu(x)
        };
        output.to_data().assert_eq(&expected.to_data(), true);
    }

    #[test]
    fn test_forward_vd_mode_odd_input() {
        type B = NdArray<f32>;
        let device = Default::default();

        let layer: ConvBnLayer<B> = ConvBnLayerConfig::new(4, 6, 1)
            .with_vd_mode(true)
            .init(&device);

        let input: Tensor<B, 4> = Tensor::random([3, 4, 7, 7], Distribution::Default, &device);
        let output = layer.forward(input.clone());

        assert_shape_contract!(
            ["batch", "channels", "height", "width"],
            &output,
            &[("batch", 3), ("channels", 6), ("height", 4), ("width", 4)]
        );

        let expected = {
            let x = layer.pool.as_ref().unwrap().forward(input);
            let x = layer.conv.forward(x);
            layer.norm.forward(x)
        };
        output.to_data().assert_eq(&expected.to_data(), true);
    }
}
