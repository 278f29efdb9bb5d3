//! # Res2Net-vd Topology Table
//!
//! Maps a supported network depth to per-stage block counts.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Res2Net-50 block depths.
pub const RES2NET50_BLOCKS: [usize; 4] = [3, 4, 6, 3];
/// Res2Net-101 block depths.
pub const RES2NET101_BLOCKS: [usize; 4] = [3, 4, 23, 3];
/// Res2Net-152 block depths.
pub const RES2NET152_BLOCKS: [usize; 4] = [3, 8, 36, 3];
/// Res2Net-200 block depths.
pub const RES2NET200_BLOCKS: [usize; 4] = [3, 12, 48, 3];

/// Input channels of the first block of each stage.
pub const STAGE_IN_CHANNELS: [usize; 4] = [64, 256, 512, 1024];

/// Output channels of every block of each stage.
pub const STAGE_OUT_CHANNELS: [usize; 4] = [256, 512, 1024, 2048];

/// Per-stage multipliers of the base width (``width * scales``).
pub const STAGE_FILTER_FACTORS: [usize; 4] = [1, 2, 4, 8];

/// The supported layer counts.
pub const SUPPORTED_LAYERS: [usize; 4] = [50, 101, 152, 200];

/// A supported Res2Net-vd depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Res2NetDepth {
    /// 50 layers; ``[3, 4, 6, 3]`` blocks.
    Layers50,

    /// 101 layers; ``[3, 4, 23, 3]`` blocks.
    Layers101,

    /// 152 layers; ``[3, 8, 36, 3]`` blocks.
    Layers152,

    /// 200 layers; ``[3, 12, 48, 3]`` blocks.
    Layers200,
}

impl Res2NetDepth {
    /// The nominal layer count.
    pub fn layers(&self) -> usize {
        match self {
            Res2NetDepth::Layers50 => 50,
            Res2NetDepth::Layers101 => 101,
            Res2NetDepth::Layers152 => 152,
            Res2NetDepth::Layers200 => 200,
        }
    }

    /// The per-stage block counts.
    pub fn blocks(&self) -> [usize; 4] {
        match self {
            Res2NetDepth::Layers50 => RES2NET50_BLOCKS,
            Res2NetDepth::Layers101 => RES2NET101_BLOCKS,
            Res2NetDepth::Layers152 => RES2NET152_BLOCKS,
            Res2NetDepth::Layers200 => RES2NET200_BLOCKS,
        }
    }

    /// The total number of bottleneck blocks.
    pub fn num_blocks(&self) -> usize {
        self.blocks().iter().sum()
    }
}

impl TryFrom<usize> for Res2NetDepth {
    type Error = String;

    fn try_from(layers: usize) -> Result<Self, Self::Error> {
        match layers {
            50 => Ok(Res2NetDepth::Layers50),
            101 => Ok(Res2NetDepth::Layers101),
            152 => Ok(Res2NetDepth::Layers152),
            200 => Ok(Res2NetDepth::Layers200),
            _ => Err(format!(
                "supported layers are {SUPPORTED_LAYERS:?} but input layer is {layers}"
            )),
        }
    }
}

impl From<Res2NetDepth> for usize {
    fn from(depth: Res2NetDepth) -> Self {
        depth.layers()
    }
}

impl Display for Res2NetDepth {
    fn fmt(
        &self,
        f: &mut Formatter<'_>,
    ) -> std::fmt::Result {
        write!(f, "Res2Net{}", self.layers())
    }
}
