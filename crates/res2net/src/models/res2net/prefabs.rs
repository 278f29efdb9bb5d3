//! # `Res2Net-vd` Prefabs
//!
//! Named ``(layers, scales, width)`` configurations;
//! every prefab defaults to 1000 classes.

use crate::models::res2net::model::{Res2NetVdContractConfig, Res2NetVdStructureConfig};
use crate::prefabs::{PreFabConfig, StaticPreFabConfig, StaticPreFabMap};

/// Static builder for [`Res2NetVdPreFabContractConfig`].
pub type StaticRes2NetVdPreFabContractConfig = StaticPreFabConfig<Res2NetVdContractConfig>;

/// A [`Res2NetVdContractConfig`] Well-Known Prefab.
pub type Res2NetVdPreFabContractConfig = PreFabConfig<Res2NetVdContractConfig>;

/// A [`Res2NetVdStructureConfig`] Well-Known Prefab.
pub type Res2NetVdPreFabStructureConfig = PreFabConfig<Res2NetVdStructureConfig>;

impl Res2NetVdPreFabContractConfig {
    /// Convert to a [`Res2NetVdPreFabStructureConfig`].
    ///
    /// Every prefab is a supported depth, so the structure builder cannot fail.
    pub fn to_structure_prefab(&self) -> Res2NetVdPreFabStructureConfig {
        self.map(|config| config.to_structure())
    }
}

impl From<&StaticRes2NetVdPreFabContractConfig> for Res2NetVdPreFabStructureConfig {
    fn from(config: &StaticRes2NetVdPreFabContractConfig) -> Self {
        config.to_prefab().to_structure_prefab()
    }
}

/// `Res2Net50-vd`, 2 scales of width 48.
pub fn res2net50_vd_48w_2s() -> Res2NetVdContractConfig {
    Res2NetVdContractConfig::new(50)
        .with_scales(2)
        .with_width(48)
}

/// `Res2Net50-vd`, 4 scales of width 26.
pub fn res2net50_vd_26w_4s() -> Res2NetVdContractConfig {
    Res2NetVdContractConfig::new(50)
        .with_scales(4)
        .with_width(26)
}

/// `Res2Net50-vd`, 8 scales of width 14.
pub fn res2net50_vd_14w_8s() -> Res2NetVdContractConfig {
    Res2NetVdContractConfig::new(50)
        .with_scales(8)
        .with_width(14)
}

/// `Res2Net50-vd`, 6 scales of width 26.
pub fn res2net50_vd_26w_6s() -> Res2NetVdContractConfig {
    Res2NetVdContractConfig::new(50)
        .with_scales(6)
        .with_width(26)
}

/// `Res2Net50-vd`, 8 scales of width 26.
pub fn res2net50_vd_26w_8s() -> Res2NetVdContractConfig {
    Res2NetVdContractConfig::new(50)
        .with_scales(8)
        .with_width(26)
}

/// `Res2Net101-vd`, 4 scales of width 26.
pub fn res2net101_vd_26w_4s() -> Res2NetVdContractConfig {
    Res2NetVdContractConfig::new(101)
        .with_scales(4)
        .with_width(26)
}

/// `Res2Net152-vd`, 4 scales of width 26.
pub fn res2net152_vd_26w_4s() -> Res2NetVdContractConfig {
    Res2NetVdContractConfig::new(152)
        .with_scales(4)
        .with_width(26)
}

/// `Res2Net200-vd`, 4 scales of width 26.
pub fn res2net200_vd_26w_4s() -> Res2NetVdContractConfig {
    Res2NetVdContractConfig::new(200)
        .with_scales(4)
        .with_width(26)
}

/// `Res2Net50-vd 48w 2s` prefab.
pub static RES2NET50_VD_48W_2S: StaticRes2NetVdPreFabContractConfig = StaticPreFabConfig {
    name: "res2net50_vd_48w_2s",
    description: "Res2Net50-vd; 2 scales of width 48",
    builder: res2net50_vd_48w_2s,
};

/// `Res2Net50-vd 26w 4s` prefab.
pub static RES2NET50_VD_26W_4S: StaticRes2NetVdPreFabContractConfig = StaticPreFabConfig {
    name: "res2net50_vd_26w_4s",
    description: "Res2Net50-vd; 4 scales of width 26",
    builder: res2net50_vd_26w_4s,
};

/// `Res2Net50-vd 14w 8s` prefab.
pub static RES2NET50_VD_14W_8S: StaticRes2NetVdPreFabContractConfig = StaticPreFabConfig {
    name: "res2net50_vd_14w_8s",
    description: "Res2Net50-vd; 8 scales of width 14",
    builder: res2net50_vd_14w_8s,
};

/// `Res2Net50-vd 26w 6s` prefab.
pub static RES2NET50_VD_26W_6S: StaticRes2NetVdPreFabContractConfig = StaticPreFabConfig {
    name: "res2net50_vd_26w_6s",
    description: "Res2Net50-vd; 6 scales of width 26",
    builder: res2net50_vd_26w_6s,
};

/// `Res2Net50-vd 26w 8s` prefab.
pub static RES2NET50_VD_26W_8S: StaticRes2NetVdPreFabContractConfig = StaticPreFabConfig {
    name: "res2net50_vd_26w_8s",
    description: "Res2Net50-vd; 8 scales of width 26",
    builder: res2net50_vd_26w_8s,
};

/// `Res2Net101-vd 26w 4s` prefab.
pub static RES2NET101_VD_26W_4S: StaticRes2NetVdPreFabContractConfig = StaticPreFabConfig {
    name: "res2net101_vd_26w_4s",
    description: "Res2Net101-vd; 4 scales of width 26",
    builder: res2net101_vd_26w_4s,
};

/// `Res2Net152-vd 26w 4s` prefab.
pub static RES2NET152_VD_26W_4S: StaticRes2NetVdPreFabContractConfig = StaticPreFabConfig {
    name: "res2net152_vd_26w_4s",
    description: "Res2Net152-vd; 4 scales of width 26",
    builder: res2net152_vd_26w_4s,
};

/// `Res2Net200-vd 26w 4s` prefab.
pub static RES2NET200_VD_26W_4S: StaticRes2NetVdPreFabContractConfig = StaticPreFabConfig {
    name: "res2net200_vd_26w_4s",
    description: "Res2Net200-vd; 4 scales of width 26",
    builder: res2net200_vd_26w_4s,
};

/// All `Res2Net-vd` prefabs.
pub static PREFAB_RES2NET_VD_MAP: StaticPreFabMap<Res2NetVdContractConfig> = StaticPreFabMap {
    name: "res2net_vd",
    description: "Res2Net-vd image classification models",
    items: &[
        &RES2NET50_VD_48W_2S,
        &RES2NET50_VD_26W_4S,
        &RES2NET50_VD_14W_8S,
        &RES2NET50_VD_26W_6S,
        &RES2NET50_VD_26W_8S,
        &RES2NET101_VD_26W_4S,
        &RES2NET152_VD_26W_4S,
        &RES2NET200_VD_26W_4S,
    ],
};
