//! # `Res2Net-vd` Core Model
//!
//! [`Res2NetVd`] is the core `Res2Net-vd` module.
//!
//! [`Res2NetVdContractConfig`] implements [`Config`], and provides
//! a high-level configuration interface: depth, scales, width, classes.
//! It provides [`Res2NetVdContractConfig::to_structure`] to convert
//! to a [`Res2NetVdStructureConfig`].
//!
//! [`Res2NetVdStructureConfig`] implements [`Config`], and provides
//! [`Res2NetVdStructureConfig::init`] to initialize a [`Res2NetVd`].
//!
//! [`Res2NetVd`] implements [`Module`], and provides
//! [`Res2NetVd::forward`].

use crate::models::res2net::depth::{
    Res2NetDepth, STAGE_FILTER_FACTORS, STAGE_IN_CHANNELS, STAGE_OUT_CHANNELS,
};
use crate::models::res2net::naming::{ParameterKey, ParameterNaming, parameter_keys};
use crate::models::res2net::stage::{Res2NetStage, Res2NetStageConfig, Res2NetStageMeta};
use crate::models::res2net::stem::{Res2NetStem, Res2NetStemConfig};
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::module::{Module, Param};
use burn::nn::activation::ActivationConfig;
use burn::nn::pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig};
use burn::nn::{Initializer, Linear, LinearConfig};
use burn::prelude::{Backend, Config, Tensor};

/// [`Res2NetVd`] Meta API.
///
/// Implemented by [`Res2NetVdStructureConfig`] and [`Res2NetVd`].
pub trait Res2NetVdMeta {
    /// Number of input image channels.
    fn in_channels(&self) -> usize;

    /// The total number of bottleneck blocks.
    fn num_blocks(&self) -> usize;

    /// The number of features entering the classifier.
    fn head_features(&self) -> usize;

    /// The number of output classes.
    fn num_classes(&self) -> usize;
}

/// High-level `Res2Net-vd` model configuration.
#[derive(Config, Debug)]
pub struct Res2NetVdContractConfig {
    /// Network depth; one of ``[50, 101, 152, 200]``.
    pub layers: usize,

    /// Number of channel groups in each bottleneck block.
    #[config(default = 4)]
    pub scales: usize,

    /// Channel width of each scale group in the first stage.
    #[config(default = 26)]
    pub width: usize,

    /// Number of classification classes.
    #[config(default = 1000)]
    pub num_classes: usize,

    /// Number of input image channels.
    #[config(default = 3)]
    pub in_channels: usize,

    /// Activation used throughout the network.
    #[config(default = "ActivationConfig::Relu")]
    pub activation: ActivationConfig,
}

impl Res2NetVdContractConfig {
    /// Resolve the depth table entry.
    pub fn depth(&self) -> Result<Res2NetDepth, String> {
        Res2NetDepth::try_from(self.layers)
    }

    /// The reduced width of the first stage; ``width * scales``.
    pub fn basic_width(&self) -> usize {
        self.width * self.scales
    }

    /// The reduced width of each stage.
    pub fn stage_filters(&self) -> [usize; 4] {
        STAGE_FILTER_FACTORS.map(|factor| self.basic_width() * factor)
    }

    /// The total number of bottleneck blocks.
    pub fn num_blocks(&self) -> Result<usize, String> {
        Ok(self.depth()?.num_blocks())
    }

    /// List the external checkpoint names of every parameter.
    ///
    /// # Returns
    ///
    /// A `Result<Vec<ParameterKey>, String>`; in forward order.
    pub fn parameter_keys<N: ParameterNaming + ?Sized>(
        &self,
        naming: &N,
    ) -> Result<Vec<ParameterKey>, String> {
        let structure = self.try_to_structure()?;
        Ok(parameter_keys(&structure, self.layers, naming))
    }

    /// Check if the config is valid.
    ///
    /// # Returns
    ///
    /// A `Result<(), String>`
    pub fn try_validate(&self) -> Result<(), String> {
        self.depth()?;
        if self.scales < 2 {
            return Err(format!("scales must be >= 2: {}", self.scales));
        }
        if self.width == 0 {
            return Err("width must be > 0".to_string());
        }
        if self.num_classes == 0 {
            return Err("num_classes must be > 0".to_string());
        }
        if self.in_channels == 0 {
            return Err("in_channels must be > 0".to_string());
        }
        Ok(())
    }

    /// Convert to a [`Res2NetVdStructureConfig`].
    ///
    /// # Returns
    ///
    /// A `Result<Res2NetVdStructureConfig, String>`; describing unsupported configs.
    pub fn try_to_structure(&self) -> Result<Res2NetVdStructureConfig, String> {
        self.try_validate()?;
        let depth = self.depth()?;
        let filters = self.stage_filters();

        let stages = depth
            .blocks()
            .iter()
            .enumerate()
            .map(|(idx, &num_blocks)| {
                Res2NetStageConfig::build(
                    num_blocks,
                    STAGE_IN_CHANNELS[idx],
                    STAGE_OUT_CHANNELS[idx],
                    filters[idx],
                    if idx == 0 { 1 } else { 2 },
                    self.scales,
                    idx == 0,
                )
                .with_activation(self.activation.clone())
            })
            .collect();

        let stem = Res2NetStemConfig::new()
            .with_in_channels(self.in_channels)
            .with_activation(self.activation.clone());

        let structure = Res2NetVdStructureConfig::new(stem, stages, self.num_classes);
        structure.try_validate()?;
        Ok(structure)
    }

    /// Convert to a [`Res2NetVdStructureConfig`].
    ///
    /// # Panics
    ///
    /// If the config is invalid; e.g. an unsupported `layers` value.
    pub fn to_structure(&self) -> Res2NetVdStructureConfig {
        match self.try_to_structure() {
            Ok(structure) => structure,
            Err(err) => panic!("{}", err),
        }
    }

    /// Initialize a [`Res2NetVd`] model.
    ///
    /// # Returns
    ///
    /// A `Result<Res2NetVd<B>, String>`; describing unsupported configs.
    pub fn try_init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> Result<Res2NetVd<B>, String> {
        Ok(self.try_to_structure()?.init(device))
    }

    /// Initialize a [`Res2NetVd`] model.
    ///
    /// # Panics
    ///
    /// If the config is invalid.
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> Res2NetVd<B> {
        self.to_structure().init(device)
    }
}

/// [`Res2NetVd`] Structure Config.
///
/// This config defines the explicit structure of a `Res2Net-vd` model;
/// every stage and block is listed.
#[derive(Config, Debug)]
pub struct Res2NetVdStructureConfig {
    /// The input stem.
    pub stem: Res2NetStemConfig,

    /// The stages, in order.
    pub stages: Vec<Res2NetStageConfig>,

    /// The number of classes.
    pub num_classes: usize,
}

impl Res2NetVdMeta for Res2NetVdStructureConfig {
    fn in_channels(&self) -> usize {
        self.stem.in_channels
    }

    fn num_blocks(&self) -> usize {
        self.stages.iter().map(|stage| stage.len()).sum()
    }

    fn head_features(&self) -> usize {
        self.stages
            .last()
            .map(|stage| stage.out_channels())
            .unwrap_or_else(|| self.stem.out_channels())
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }
}

impl Res2NetVdStructureConfig {
    /// Check if the config is valid.
    ///
    /// # Returns
    ///
    /// A `Result<(), String>`
    pub fn try_validate(&self) -> Result<(), String> {
        if self.stages.is_empty() {
            return Err("stages is empty".to_string());
        }
        if self.num_classes == 0 {
            return Err("num_classes must be > 0".to_string());
        }

        let mut planes = self.stem.out_channels();
        for (idx, stage) in self.stages.iter().enumerate() {
            stage
                .try_validate()
                .map_err(|err| format!("stage[{idx}]: {err}"))?;
            if stage.in_channels() != planes {
                return Err(format!(
                    "stage[{idx}].in_channels({}) != previous out_channels({planes})",
                    stage.in_channels()
                ));
            }
            planes = stage.out_channels();
        }
        Ok(())
    }

    /// Panic if `try_validate` returns an error.
    pub fn expect_valid(&self) {
        if let Err(err) = self.try_validate() {
            panic!("{}", err);
        }
    }

    /// Initialize a [`Res2NetVd`] model.
    ///
    /// # Panics
    ///
    /// If the config is invalid.
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> Res2NetVd<B> {
        self.expect_valid();

        tracing::debug!(
            stages = ?self.stages.iter().map(|s| s.len()).collect::<Vec<_>>(),
            head_features = self.head_features(),
            num_classes = self.num_classes,
            "initializing Res2NetVd",
        );

        Res2NetVd {
            stem: self.stem.init(device),
            stages: self.stages.iter().map(|s| s.init(device)).collect(),
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            fc: init_head(self.head_features(), self.num_classes, device),
        }
    }
}

/// Build the classifier head.
///
/// Weights are drawn from ``Uniform(-1/sqrt(fan_in), 1/sqrt(fan_in))``;
/// the bias starts at zero.
fn init_head<B: Backend>(
    features: usize,
    num_classes: usize,
    device: &B::Device,
) -> Linear<B> {
    let stdv = 1.0 / (features as f64).sqrt();
    let mut fc = LinearConfig::new(features, num_classes)
        .with_initializer(Initializer::Uniform {
            min: -stdv,
            max: stdv,
        })
        .init(device);
    fc.bias = Some(Param::from_tensor(Tensor::zeros([num_classes], device)));
    fc
}

/// `Res2Net-vd` model.
#[derive(Module, Debug)]
pub struct Res2NetVd<B: Backend> {
    /// Input stem.
    pub stem: Res2NetStem<B>,

    /// Bottleneck stages.
    pub stages: Vec<Res2NetStage<B>>,

    /// Global average pool.
    pub pool: AdaptiveAvgPool2d,

    /// Classifier.
    pub fc: Linear<B>,
}

impl<B: Backend> Res2NetVdMeta for Res2NetVd<B> {
    fn in_channels(&self) -> usize {
        self.stem.in_channels()
    }

    fn num_blocks(&self) -> usize {
        self.stages.iter().map(|stage| stage.len()).sum()
    }

    fn head_features(&self) -> usize {
        self.fc.weight.dims()[0]
    }

    fn num_classes(&self) -> usize {
        self.fc.weight.dims()[1]
    }
}

impl<B: Backend> Res2NetVd<B> {
    /// Replace the classifier head with a freshly initialized one.
    pub fn with_classes(
        self,
        num_classes: usize,
    ) -> Self {
        let device = &self.devices()[0];
        let fc = init_head(self.head_features(), num_classes, device);
        Self { fc, ..self }
    }

    /// Feature extraction; the stem and all stages.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_channels, height, width]``.
    ///
    /// # Returns
    ///
    /// ``[batch, head_features, ceil(height/32), ceil(width/32)]``
    #[tracing::instrument(level = "trace", skip_all)]
    pub fn forward_features(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let x = self.stem.forward(input);
        self.stages.iter().fold(x, |x, stage| stage.forward(x))
    }

    /// `Res2Net-vd` forward pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_channels, height, width]``.
    ///
    /// # Returns
    ///
    /// ``[batch, num_classes]`` logits.
    #[tracing::instrument(level = "trace", skip_all)]
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 2> {
        let [batch] = unpack_shape_contract!(
            ["batch", "in_channels", "height", "width"],
            &input,
            &["batch"],
            &[("in_channels", self.in_channels())]
        );

        let x = self.forward_features(input);

        // [B, C, H, W] -> [B, C, 1, 1] -> [B, C]
        let x = self.pool.forward(x);
        let x: Tensor<B, 2> = x.flatten(1, 3);

        let x = self.fc.forward(x);

        assert_shape_contract_periodically!(
            ["batch", "num_classes"],
            &x,
            &[("batch", batch), ("num_classes", self.num_classes())]
        );

        x
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::res2net::bottleneck::BottleneckBlockMeta;
    use crate::models::res2net::depth::SUPPORTED_LAYERS;
    use bimm_contracts::assert_shape_contract;
    use burn::backend::NdArray;
    use burn::tensor::Distribution;
    use hamcrest::prelude::*;

    type B = NdArray<f32>;

    #[test]
    fn test_contract_config_defaults() {
        let config = Res2NetVdContractConfig::new(50);
        assert_eq!(config.scales, 4);
        assert_eq!(config.width, 26);
        assert_eq!(config.num_classes, 1000);
        assert_that!(config.basic_width(), equal_to(104));
        assert_that!(config.stage_filters(), equal_to([104, 208, 416, 832]));
        assert_eq!(config.num_blocks(), Ok(16));
    }

    #[test]
    fn test_supported_depths_to_structure() {
        for layers in SUPPORTED_LAYERS {
            let contract = Res2NetVdContractConfig::new(layers);
            let structure = contract.try_to_structure().unwrap();
            let expected: usize = Res2NetDepth::try_from(layers).unwrap().blocks().iter().sum();
            assert_eq!(structure.num_blocks(), expected);
            assert_eq!(structure.stages.len(), 4);
            assert_eq!(structure.head_features(), 2048);
        }
        assert_eq!(
            Res2NetVdContractConfig::new(50).to_structure().num_blocks(),
            3 + 4 + 6 + 3
        );
    }

    #[test]
    fn test_structure_topology() {
        let structure = Res2NetVdContractConfig::new(101)
            .with_scales(8)
            .with_width(14)
            .to_structure();

        let strides: Vec<usize> = structure.stages.iter().map(|s| s.stride()).collect();
        assert_eq!(strides, vec![1, 2, 2, 2]);

        for (idx, stage) in structure.stages.iter().enumerate() {
            assert_eq!(stage.in_channels(), STAGE_IN_CHANNELS[idx]);
            assert_eq!(stage.out_channels(), STAGE_OUT_CHANNELS[idx]);

            let first = &stage.blocks[0];
            assert!(first.has_projection());
            assert_eq!(first.is_first, idx == 0);
            assert_eq!(first.filters(), 112 * STAGE_FILTER_FACTORS[idx]);

            for block in &stage.blocks[1..] {
                assert!(!block.has_projection());
                assert_eq!(block.stride(), 1);
                assert_eq!(block.scales(), 8);
                assert_eq!(block.scale_width(), 14 * STAGE_FILTER_FACTORS[idx]);
            }
        }
    }

    #[test]
    fn test_unsupported_depth() {
        let config = Res2NetVdContractConfig::new(34);
        let err = config.try_to_structure().unwrap_err();
        assert_eq!(
            err,
            "supported layers are [50, 101, 152, 200] but input layer is 34"
        );
        assert!(config.try_init::<B>(&Default::default()).is_err());
    }

    #[test]
    #[should_panic(expected = "supported layers are [50, 101, 152, 200] but input layer is 34")]
    fn test_unsupported_depth_panics() {
        Res2NetVdContractConfig::new(34).to_structure();
    }

    #[test]
    fn test_contract_validation() {
        let err = Res2NetVdContractConfig::new(50)
            .with_scales(1)
            .try_validate()
            .unwrap_err();
        assert!(err.contains("scales must be >= 2"), "{err}");

        let err = Res2NetVdContractConfig::new(50)
            .with_num_classes(0)
            .try_validate()
            .unwrap_err();
        assert!(err.contains("num_classes"), "{err}");
    }

    #[test]
    fn test_structure_validation() {
        let mut structure = Res2NetVdContractConfig::new(50).to_structure();
        structure.stages.swap(1, 2);
        let err = structure.try_validate().unwrap_err();
        assert_that!(
            err,
            equal_to("stage[1].in_channels(512) != previous out_channels(256)".to_string())
        );
    }

    #[test]
    fn test_config_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("res2net.json");

        let config = Res2NetVdContractConfig::new(152).with_num_classes(10);
        config.save(&path).unwrap();

        let loaded = Res2NetVdContractConfig::load(&path).unwrap();
        assert_eq!(loaded.layers, 152);
        assert_eq!(loaded.num_classes, 10);
        assert_eq!(
            loaded.to_structure().to_string(),
            config.to_structure().to_string()
        );
    }

    #[test]
    fn test_res2net50_forward_small_input() {
        let device = Default::default();

        let model: Res2NetVd<B> = Res2NetVdContractConfig::new(50)
            .with_scales(2)
            .with_width(8)
            .with_num_classes(10)
            .init(&device);

        assert_eq!(model.num_blocks(), 16);
        assert_eq!(model.in_channels(), 3);
        assert_eq!(model.head_features(), 2048);
        assert_eq!(model.num_classes(), 10);

        let input = Tensor::random([2, 3, 32, 32], Distribution::Default, &device);

        let features = model.forward_features(input.clone());
        assert_shape_contract!(
            ["batch", "channels", "height", "width"],
            &features,
            &[("batch", 2), ("channels", 2048), ("height", 1), ("width", 1)]
        );

        let output = model.forward(input);
        assert_shape_contract!(
            ["batch", "num_classes"],
            &output,
            &[("batch", 2), ("num_classes", 10)]
        );
    }

    #[test]
    fn test_head_init() {
        let device = Default::default();
        let fc: Linear<B> = init_head(2048, 7, &device);

        let stdv = 1.0 / (2048f32).sqrt();
        assert_eq!(fc.weight.dims(), [2048, 7]);
        let max: f32 = fc.weight.val().abs().max().into_scalar();
        assert!(max <= stdv + 1e-6, "{max} > {stdv}");

        let bias = fc.bias.as_ref().unwrap().val();
        let total: f32 = bias.abs().sum().into_scalar();
        assert_eq!(total, 0.0);
    }

    #[test]
    fn test_with_classes() {
        let device = Default::default();
        let model: Res2NetVd<B> = Res2NetVdContractConfig::new(50)
            .with_scales(2)
            .with_width(4)
            .init(&device);
        assert_eq!(model.num_classes(), 1000);

        let model = model.with_classes(5);
        assert_eq!(model.num_classes(), 5);
        assert_eq!(model.head_features(), 2048);
    }

    #[test]
    fn test_res2net50_forward_224_narrow() {
        let device = Default::default();
        let model: Res2NetVd<B> = Res2NetVdContractConfig::new(50)
            .with_scales(2)
            .with_width(4)
            .with_num_classes(7)
            .init(&device);

        let input = Tensor::random([2, 3, 224, 224], Distribution::Default, &device);

        let features = model.forward_features(input.clone());
        assert_shape_contract!(
            ["batch", "channels", "height", "width"],
            &features,
            &[("batch", 2), ("channels", 2048), ("height", 1), ("width", 1)]
        );

        let output = model.forward(input);
        assert_shape_contract!(
            ["batch", "num_classes"],
            &output,
            &[("batch", 2), ("num_classes", 7)]
        );
    }

    #[test]
    #[ignore = "full-width 224x224 forward is slow on the ndarray backend"]
    fn test_res2net50_vd_26w_4s_forward_224() {
        let device = Default::default();
        let model: Res2NetVd<B> = Res2NetVdContractConfig::new(50)
            .with_num_classes(1000)
            .init(&device);

        let input = Tensor::random([1, 3, 224, 224], Distribution::Default, &device);
        let output = model.forward(input);
        assert_eq!(output.dims(), [1, 1000]);
    }

    #[test]
    fn test_init_all_depths() {
        let device = Default::default();
        for layers in SUPPORTED_LAYERS {
            let model: Res2NetVd<B> = Res2NetVdContractConfig::new(layers)
                .with_scales(2)
                .with_width(4)
                .init(&device);
            let expected = Res2NetDepth::try_from(layers).unwrap().num_blocks();
            assert_eq!(model.num_blocks(), expected, "layers={layers}");
            assert_eq!(
                model.stages.iter().map(|s| s.blocks.len()).sum::<usize>(),
                expected
            );
            assert_eq!(model.head_features(), 2048);
        }
    }
}
