//! # Checkpoint Parameter Naming
//!
//! Pretrained `Res2Net-vd` checkpoints name their tensors by position in
//! the network (``res4b3_branch2b_2_weights``, ``bn4b3_branch2b_2_scale``).
//! [`ParameterNaming`] isolates that scheme, and [`ParameterKey`] pairs each
//! external name with the module path of the matching [`Res2NetVd`] field.
//!
//! Tensor layouts agree for both conv and linear weights:
//! conv weights are ``[out, in, k, k]`` and linear weights are ``[in, out]``.
//!
//! [`Res2NetVd`]: crate::models::res2net::model::Res2NetVd

use crate::models::res2net::bottleneck::BottleneckBlockMeta;
use crate::models::res2net::model::Res2NetVdStructureConfig;
use std::fmt::{Display, Formatter};

/// The branches of a bottleneck block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockBranch {
    /// The ``1x1`` reducing conv.
    Reduce,

    /// The ``3x3`` conv of scale group ``s``.
    Scale(usize),

    /// The ``1x1`` expanding conv.
    Expand,

    /// The residual projection.
    Shortcut,
}

/// The external names of a norm layer's tensors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormNames {
    /// Scale; ``gamma``.
    pub scale: String,
    /// Offset; ``beta``.
    pub offset: String,
    /// Running mean.
    pub mean: String,
    /// Running variance.
    pub variance: String,
}

/// A naming scheme for external checkpoint tensors.
pub trait ParameterNaming {
    /// Name of stem conv ``index`` (0-based).
    fn stem_conv_name(
        &self,
        index: usize,
    ) -> String;

    /// Name of a block, by network depth, stage and position in stage.
    fn block_name(
        &self,
        layers: usize,
        stage: usize,
        index: usize,
    ) -> String;

    /// Name of a conv layer inside a block.
    fn branch_name(
        &self,
        block: &str,
        branch: BlockBranch,
    ) -> String;

    /// Name of a conv weight tensor.
    fn conv_weights_name(
        &self,
        conv: &str,
    ) -> String;

    /// Names of the norm tensors following a conv.
    fn norm_names(
        &self,
        conv: &str,
    ) -> NormNames;

    /// Names of the classifier ``(weight, bias)``.
    fn head_names(&self) -> (String, String);
}

/// The naming scheme of the reference `Res2Net-vd` checkpoints.
#[derive(Debug, Clone, Copy, Default)]
pub struct PretrainedNaming;

impl ParameterNaming for PretrainedNaming {
    fn stem_conv_name(
        &self,
        index: usize,
    ) -> String {
        format!("conv1_{}", index + 1)
    }

    fn block_name(
        &self,
        layers: usize,
        stage: usize,
        index: usize,
    ) -> String {
        let prefix = format!("res{}", stage + 2);
        if layers >= 101 && stage == 2 {
            if index == 0 {
                format!("{prefix}a")
            } else {
                format!("{prefix}b{index}")
            }
        } else {
            // Letters run out after 26 blocks; continue with numbers.
            match u8::try_from(index).ok().filter(|&i| i < 26) {
                Some(i) => format!("{prefix}{}", char::from(b'a' + i)),
                None => format!("{prefix}b{index}"),
            }
        }
    }

    fn branch_name(
        &self,
        block: &str,
        branch: BlockBranch,
    ) -> String {
        match branch {
            BlockBranch::Reduce => format!("{block}_branch2a"),
            BlockBranch::Scale(s) => format!("{block}_branch2b_{}", s + 1),
            BlockBranch::Expand => format!("{block}_branch2c"),
            BlockBranch::Shortcut => format!("{block}_branch1"),
        }
    }

    fn conv_weights_name(
        &self,
        conv: &str,
    ) -> String {
        format!("{conv}_weights")
    }

    fn norm_names(
        &self,
        conv: &str,
    ) -> NormNames {
        let bn = if conv == "conv1" {
            format!("bn_{conv}")
        } else {
            format!("bn{}", conv.get(3..).unwrap_or_default())
        };
        NormNames {
            scale: format!("{bn}_scale"),
            offset: format!("{bn}_offset"),
            mean: format!("{bn}_mean"),
            variance: format!("{bn}_variance"),
        }
    }

    fn head_names(&self) -> (String, String) {
        ("fc_weights".to_string(), "fc_offset".to_string())
    }
}

/// A mapping from an external tensor name to a module path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterKey {
    /// The external checkpoint name.
    pub external: String,

    /// The ``.``-separated module path; e.g. ``stem.conv1.conv.weight``.
    pub module_path: String,
}

impl ParameterKey {
    /// Create a new key.
    pub fn new(
        external: impl Into<String>,
        module_path: impl Into<String>,
    ) -> Self {
        Self {
            external: external.into(),
            module_path: module_path.into(),
        }
    }
}

impl Display for ParameterKey {
    fn fmt(
        &self,
        f: &mut Formatter<'_>,
    ) -> std::fmt::Result {
        write!(f, "{} -> {}", self.external, self.module_path)
    }
}

fn conv_bn_keys<N: ParameterNaming + ?Sized>(
    naming: &N,
    conv: &str,
    path: &str,
    keys: &mut Vec<ParameterKey>,
) {
    let norm = naming.norm_names(conv);
    keys.push(ParameterKey::new(
        naming.conv_weights_name(conv),
        format!("{path}.conv.weight"),
    ));
    keys.push(ParameterKey::new(norm.scale, format!("{path}.norm.gamma")));
    keys.push(ParameterKey::new(norm.offset, format!("{path}.norm.beta")));
    keys.push(ParameterKey::new(
        norm.mean,
        format!("{path}.norm.running_mean"),
    ));
    keys.push(ParameterKey::new(
        norm.variance,
        format!("{path}.norm.running_var"),
    ));
}

/// List the parameter keys of a model structure.
///
/// # Arguments
///
/// - `structure`: the model structure.
/// - `layers`: the nominal depth; some schemes name blocks by depth.
/// - `naming`: the external naming scheme.
pub fn parameter_keys<N: ParameterNaming + ?Sized>(
    structure: &Res2NetVdStructureConfig,
    layers: usize,
    naming: &N,
) -> Vec<ParameterKey> {
    let mut keys = Vec::new();

    for index in 0..3 {
        conv_bn_keys(
            naming,
            &naming.stem_conv_name(index),
            &format!("stem.conv{}", index + 1),
            &mut keys,
        );
    }

    for (stage_idx, stage) in structure.stages.iter().enumerate() {
        for (block_idx, block) in stage.blocks.iter().enumerate() {
            let name = naming.block_name(layers, stage_idx, block_idx);
            let path = format!("stages.{stage_idx}.blocks.{block_idx}");

            conv_bn_keys(
                naming,
                &naming.branch_name(&name, BlockBranch::Reduce),
                &format!("{path}.conv0"),
                &mut keys,
            );
            for s in 0..block.scales() - 1 {
                conv_bn_keys(
                    naming,
                    &naming.branch_name(&name, BlockBranch::Scale(s)),
                    &format!("{path}.convs1.{s}"),
                    &mut keys,
                );
            }
            conv_bn_keys(
                naming,
                &naming.branch_name(&name, BlockBranch::Expand),
                &format!("{path}.conv2"),
                &mut keys,
            );
            if block.has_projection() {
                conv_bn_keys(
                    naming,
                    &naming.branch_name(&name, BlockBranch::Shortcut),
                    &format!("{path}.short"),
                    &mut keys,
                );
            }
        }
    }

    let (weight, bias) = naming.head_names();
    keys.push(ParameterKey::new(weight, "fc.weight"));
    keys.push(ParameterKey::new(bias, "fc.bias"));

    keys
}
