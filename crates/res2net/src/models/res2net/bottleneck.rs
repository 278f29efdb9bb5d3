//! # [`BottleneckBlock`] Block for `Res2Net`
//!
//! [`BottleneckBlock`] is the multi-scale bottleneck unit of `Res2Net`.
//!
//! The reduced feature map is split channel-wise into `scales` groups;
//! all but the last group pass through a dedicated ``3x3`` conv, and
//! (at stride 1) each group after the first consumes the sum of its raw
//! input and the previous group's output. This hierarchical residual
//! connectivity is what distinguishes `Res2Net` from `ResNet`.
//!
//! [`BottleneckBlockMeta`] defines a common meta API for [`BottleneckBlock`]
//! and [`BottleneckBlockConfig`].
//!
//! [`BottleneckBlockConfig`] implements [`Config`], and provides
//! [`BottleneckBlockConfig::init`] to initialize a [`BottleneckBlock`].
//!
//! [`BottleneckBlock`] implements [`Module`], and provides
//! [`BottleneckBlock::forward`].

use crate::layers::conv_bn::{ConvBnLayer, ConvBnLayerConfig, ConvBnLayerMeta};
use crate::utility::conv_shape::ceil_div_output_resolution;
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::nn::activation::{Activation, ActivationConfig};
use burn::nn::pool::{AvgPool2d, AvgPool2dConfig};
use burn::nn::{BatchNormConfig, PaddingConfig2d};
use burn::prelude::{Backend, Config, Module, Tensor};

/// [`BottleneckBlock`] Meta trait.
pub trait BottleneckBlockMeta {
    /// The number of input feature planes.
    fn in_channels(&self) -> usize;

    /// The number of output feature planes.
    fn out_channels(&self) -> usize;

    /// The width of the reduced (multi-scale) feature map.
    fn filters(&self) -> usize;

    /// The number of channel groups the reduced feature map is split into.
    fn scales(&self) -> usize;

    /// The stride of the block.
    fn stride(&self) -> usize;

    /// Does the residual path use a projection (conv/norm) instead of identity?
    fn has_projection(&self) -> bool;

    /// The channel width of each scale group.
    ///
    /// ``scale_width = filters / scales``
    fn scale_width(&self) -> usize {
        self.filters() / self.scales()
    }

    /// Get the output resolution for a given input resolution.
    ///
    /// # Arguments
    ///
    /// - `input_resolution`: ``[in_height, in_width]``.
    ///
    /// # Returns
    ///
    /// ``[ceil(in_height / stride), ceil(in_width / stride)]``
    fn output_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> [usize; 2] {
        ceil_div_output_resolution(input_resolution, self.stride())
    }
}

/// [`BottleneckBlock`] Config.
///
/// Implements [`BottleneckBlockMeta`].
#[derive(Config, Debug)]
pub struct BottleneckBlockConfig {
    /// The size of the in channels dimension.
    pub in_channels: usize,

    /// The size of the out channels dimension.
    pub out_channels: usize,

    /// The width of the reduced feature map; split into `scales` groups.
    pub filters: usize,

    /// The stride of the block; 1 or 2.
    #[config(default = 1)]
    pub stride: usize,

    /// The number of scale groups; at least 2.
    #[config(default = 4)]
    pub scales: usize,

    /// Use an identity residual path.
    ///
    /// When false, the residual path is a ``1x1`` conv/norm projection.
    #[config(default = true)]
    pub shortcut: bool,

    /// Is this the first block of the first stage?
    ///
    /// The first block's projection skips the "vd" average-pool step.
    #[config(default = false)]
    pub is_first: bool,

    /// The [`BatchNormConfig`] shared by the inner layers.
    ///
    /// The feature size is auto-matched per layer.
    #[config(default = "BatchNormConfig::new(0)")]
    pub norm: BatchNormConfig,

    /// [`Activation`] config; applied inside the branch and after the residual add.
    #[config(default = "ActivationConfig::Relu")]
    pub activation: ActivationConfig,
}

impl BottleneckBlockMeta for BottleneckBlockConfig {
    fn in_channels(&self) -> usize {
        self.in_channels
    }

    fn out_channels(&self) -> usize {
        self.out_channels
    }

    fn filters(&self) -> usize {
        self.filters
    }

    fn scales(&self) -> usize {
        self.scales
    }

    fn stride(&self) -> usize {
        self.stride
    }

    fn has_projection(&self) -> bool {
        !self.shortcut
    }
}

impl BottleneckBlockConfig {
    /// Check if the config is valid.
    ///
    /// # Returns
    ///
    /// A `Result<(), String>`
    pub fn try_validate(&self) -> Result<(), String> {
        if self.scales < 2 {
            return Err(format!("scales must be >= 2: {}", self.scales));
        }
        if self.filters == 0 || self.filters % self.scales != 0 {
            return Err(format!(
                "filters({}) must be a non-zero multiple of scales({})",
                self.filters, self.scales
            ));
        }
        if self.stride != 1 && self.stride != 2 {
            return Err(format!("stride must be 1 or 2: {}", self.stride));
        }
        if self.shortcut {
            if self.in_channels != self.out_channels || self.stride != 1 {
                return Err(format!(
                    "identity shortcut requires in_channels({}) == out_channels({}) and stride({}) == 1",
                    self.in_channels, self.out_channels, self.stride
                ));
            }
        } else if self.is_first == (self.stride == 2) {
            return Err(format!(
                "projection shortcut (is_first={}) does not match stride({}); \
                 the vd pool is applied exactly when the block downsamples",
                self.is_first, self.stride
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

    /// Build a [`ConvBnLayerConfig`] sharing this block's norm config.
    fn conv_bn(
        &self,
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
    ) -> ConvBnLayerConfig {
        ConvBnLayerConfig::new(in_channels, out_channels, kernel_size).with_norm(self.norm.clone())
    }

    /// Initialize a [`BottleneckBlock`].
    ///
    /// # Panics
    ///
    /// If the config is invalid.
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> BottleneckBlock<B> {
        self.expect_valid();

        let scale_width = self.scale_width();
        let act = Some(self.activation.clone());

        let conv0 = self
            .conv_bn(self.in_channels, self.filters, 1)
            .with_act(act.clone());

        let convs1 = (0..self.scales - 1)
            .map(|_| {
                self.conv_bn(scale_width, scale_width, 3)
                    .with_stride(self.stride)
                    .with_act(act.clone())
                    .init(device)
            })
            .collect();

        let pool = (self.stride != 1).then(|| {
            AvgPool2dConfig::new([3, 3])
                .with_strides([self.stride, self.stride])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .with_count_include_pad(false)
                .init()
        });

        let conv2 = self.conv_bn(self.filters, self.out_channels, 1);

        let short = self.has_projection().then(|| {
            self.conv_bn(self.in_channels, self.out_channels, 1)
                .with_vd_mode(!self.is_first)
                .init(device)
        });

        BottleneckBlock {
            conv0: conv0.init(device),
            convs1,
            pool,
            conv2: conv2.init(device),
            short,
            act: self.activation.init(device),
        }
    }
}

/// Multi-scale Bottleneck Block for `Res2Net`.
///
/// Implements [`BottleneckBlockMeta`].
#[derive(Module, Debug)]
pub struct BottleneckBlock<B: Backend> {
    /// ``1x1`` reducing conv/norm/act layer.
    pub conv0: ConvBnLayer<B>,

    /// Per-scale ``3x3`` conv/norm/act layers; ``scales - 1`` of them.
    pub convs1: Vec<ConvBnLayer<B>>,

    /// Last-group ``3x3`` average pool; present when the block downsamples.
    pub pool: Option<AvgPool2d>,

    /// ``1x1`` expanding conv/norm layer.
    pub conv2: ConvBnLayer<B>,

    /// Optional residual projection.
    pub short: Option<ConvBnLayer<B>>,

    /// Post-residual activation.
    pub act: Activation<B>,
}

impl<B: Backend> BottleneckBlockMeta for BottleneckBlock<B> {
    fn in_channels(&self) -> usize {
        self.conv0.in_channels()
    }

    fn out_channels(&self) -> usize {
        self.conv2.out_channels()
    }

    fn filters(&self) -> usize {
        self.conv0.out_channels()
    }

    fn scales(&self) -> usize {
        self.convs1.len() + 1
    }

    fn stride(&self) -> usize {
        self.convs1[0].stride()
    }

    fn has_projection(&self) -> bool {
        self.short.is_some()
    }
}

impl<B: Backend> BottleneckBlock<B> {
    /// Multi-scale stage of the block.
    ///
    /// Splits the reduced feature map into `scales` groups, applies the
    /// per-scale convs (with hierarchical sums at stride 1), passes or pools
    /// the last group, and concatenates the results.
    ///
    /// # Arguments
    ///
    /// - `x`: ``[batch, filters, in_height, in_width]``.
    ///
    /// # Returns
    ///
    /// ``[batch, filters, out_height, out_width]``
    pub fn multi_scale_forward(
        &self,
        x: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let downsample = self.stride() != 1;

        let mut ys: Vec<Tensor<B, 4>> = Vec::with_capacity(self.scales());
        for (s, xs_s) in x.chunk(self.scales(), 1).into_iter().enumerate() {
            let y = match self.convs1.get(s) {
                Some(conv) => match ys.last() {
                    Some(prev) if !downsample => conv.forward(xs_s + prev.clone()),
                    _ => conv.forward(xs_s),
                },
                // The last group has no conv.
                None => match &self.pool {
                    Some(pool) => pool.forward(xs_s),
                    None => xs_s,
                },
            };
            ys.push(y);
        }

        Tensor::cat(ys, 1)
    }

    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_channels, in_height, in_width]``.
    ///
    /// # Returns
    ///
    /// A ``[batch, out_channels, ceil(in_height/stride), ceil(in_width/stride)]`` tensor.
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

        let x = self.conv0.forward(input.clone());
        let x = self.multi_scale_forward(x);

        assert_shape_contract_periodically!(
            ["batch", "filters", "out_height", "out_width"],
            &x,
            &[
                ("batch", batch),
                ("filters", self.filters()),
                ("out_height", out_height),
                ("out_width", out_width)
            ]
        );

        let x = self.conv2.forward(x);

        let identity = match &self.short {
            Some(short) => short.forward(input),
            None => input,
        };

        let x = self.act.forward(identity + x);

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
    use burn::tensor::activation::relu;

    type B = NdArray<f32>;

    #[test]
    fn test_config_meta() {
        let config = BottleneckBlockConfig::new(256, 256, 104);
        config.expect_valid();
        assert_eq!(config.in_channels(), 256);
        assert_eq!(config.out_channels(), 256);
        assert_eq!(config.filters(), 104);
        assert_eq!(config.scales(), 4);
        assert_eq!(config.scale_width(), 26);
        assert_eq!(config.stride(), 1);
        assert!(!config.has_projection());
        assert_eq!(config.output_resolution([56, 56]), [56, 56]);

        let config = BottleneckBlockConfig::new(256, 512, 208)
            .with_stride(2)
            .with_shortcut(false);
        config.expect_valid();
        assert!(config.has_projection());
        assert_eq!(config.output_resolution([56, 56]), [28, 28]);
        assert_eq!(config.output_resolution([7, 7]), [4, 4]);
    }

    #[test]
    fn test_try_validate() {
        let err = BottleneckBlockConfig::new(8, 8, 8)
            .with_scales(1)
            .try_validate()
            .unwrap_err();
        assert!(err.contains("scales must be >= 2"), "{err}");

        let err = BottleneckBlockConfig::new(8, 8, 10)
            .with_scales(4)
            .try_validate()
            .unwrap_err();
        assert!(err.contains("filters(10)"), "{err}");

        let err = BottleneckBlockConfig::new(8, 8, 8)
            .with_stride(3)
            .with_shortcut(false)
            .try_validate()
            .unwrap_err();
        assert!(err.contains("stride must be 1 or 2"), "{err}");

        let err = BottleneckBlockConfig::new(8, 16, 8)
            .try_validate()
            .unwrap_err();
        assert!(err.contains("identity shortcut"), "{err}");

        let err = BottleneckBlockConfig::new(8, 16, 8)
            .with_shortcut(false)
            .try_validate()
            .unwrap_err();
        assert!(err.contains("projection shortcut"), "{err}");

        assert!(BottleneckBlockConfig::new(8, 16, 8)
            .with_shortcut(false)
            .with_is_first(true)
            .try_validate()
            .is_ok());
    }

    #[test]
    #[should_panic(expected = "must be a non-zero multiple of scales")]
    fn test_init_indivisible_panics() {
        let device = Default::default();
        let _block: BottleneckBlock<B> = BottleneckBlockConfig::new(12, 12, 12)
            .with_scales(5)
            .init(&device);
    }

    #[test]
    fn test_block_meta() {
        let device = Default::default();

        let block: BottleneckBlock<B> = BottleneckBlockConfig::new(8, 16, 12)
            .with_scales(3)
            .with_stride(2)
            .with_shortcut(false)
            .init(&device);

        assert_eq!(block.in_channels(), 8);
        assert_eq!(block.out_channels(), 16);
        assert_eq!(block.filters(), 12);
        assert_eq!(block.scales(), 3);
        assert_eq!(block.scale_width(), 4);
        assert_eq!(block.stride(), 2);
        assert!(block.has_projection());
        assert!(block.pool.is_some());
        assert_eq!(block.convs1.len(), 2);

        let short = block.short.as_ref().unwrap();
        assert!(short.is_vd_mode());
        assert_eq!(short.stride(), 1);

        let first: BottleneckBlock<B> = BottleneckBlockConfig::new(8, 16, 12)
            .with_scales(3)
            .with_shortcut(false)
            .with_is_first(true)
            .init(&device);
        assert!(first.pool.is_none());
        assert!(!first.short.as_ref().unwrap().is_vd_mode());
    }

    #[test]
    fn test_stride_1_hierarchical_forward() {
        let device = Default::default();

        let block: BottleneckBlock<B> = BottleneckBlockConfig::new(16, 16, 12)
            .with_scales(4)
            .init(&device);
        assert_eq!(block.convs1.len(), 3);

        let input: Tensor<B, 4> = Tensor::random([2, 16, 6, 6], Distribution::Default, &device);
        let output = block.forward(input.clone());

        assert_shape_contract!(
            ["batch", "channels", "height", "width"],
            &output,
            &[("batch", 2), ("channels", 16), ("height", 6), ("width", 6)]
        );

        let reduced = block.conv0.forward(input.clone());
        let xs = reduced.clone().chunk(4, 1);

        let y0 = block.convs1[0].forward(xs[0].clone());
        let y1 = block.convs1[1].forward(xs[1].clone() + y0.clone());
        let y2 = block.convs1[2].forward(xs[2].clone() + y1.clone());
        let expected_branches =
            Tensor::cat(vec![y0.clone(), y1, y2, xs[3].clone()], 1);

        let branches = block.multi_scale_forward(reduced);
        branches
            .clone()
            .to_data()
            .assert_eq(&expected_branches.to_data(), true);

        // The last group passes through unchanged.
        branches
            .clone()
            .narrow(1, 9, 3)
            .to_data()
            .assert_eq(&xs[3].clone().to_data(), true);

        // The third group sums its immediate predecessor, not the first output.
        let from_first = block.convs1[2].forward(xs[2].clone() + y0);
        let same: bool = branches
            .narrow(1, 6, 3)
            .equal(from_first)
            .all()
            .into_scalar();
        assert!(!same);

        let expected = relu(input + block.conv2.forward(expected_branches));
        output.to_data().assert_eq(&expected.to_data(), true);
    }

    #[test]
    fn test_stride_2_skips_hierarchical_sum() {
        let device = Default::default();

        let block: BottleneckBlock<B> = BottleneckBlockConfig::new(8, 16, 12)
            .with_scales(3)
            .with_stride(2)
            .with_shortcut(false)
            .init(&device);

        let input: Tensor<B, 4> = Tensor::random([2, 8, 7, 7], Distribution::Default, &device);
        let output = block.forward(input.clone());

        assert_shape_contract!(
            ["batch", "channels", "height", "width"],
            &output,
            &[("batch", 2), ("channels", 16), ("height", 4), ("width", 4)]
        );

        let reduced = block.conv0.forward(input.clone());
        let xs = reduced.clone().chunk(3, 1);

        let expected_branches = Tensor::cat(
            vec![
                block.convs1[0].forward(xs[0].clone()),
                block.convs1[1].forward(xs[1].clone()),
                block.pool.as_ref().unwrap().forward(xs[2].clone()),
            ],
            1,
        );

        block
            .multi_scale_forward(reduced)
            .to_data()
            .assert_eq(&expected_branches.to_data(), true);

        let identity = block.short.as_ref().unwrap().forward(input);
        let expected = relu(identity + block.conv2.forward(expected_branches));
        output.to_data().assert_eq(&expected.to_data(), true);
    }
}
