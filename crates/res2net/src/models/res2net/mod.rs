//! # `Res2Net-vd`
//!
//! `Res2Net` replaces the ``3x3`` conv of a `ResNet` bottleneck with a set of
//! smaller convs over channel groups, joined by hierarchical residual sums.
//! The "vd" variant adds a deep three-conv stem and average-pool downsampling
//! on the residual projections.
//!
//! * [`model::Res2NetVdContractConfig`] - high-level config.
//! * [`model::Res2NetVd`] - the model.
//! * [`prefabs`] - the named configurations.

pub mod bottleneck;
pub mod depth;
pub mod model;
pub mod naming;
pub mod prefabs;
pub mod stage;
pub mod stem;

pub use model::{Res2NetVd, Res2NetVdContractConfig, Res2NetVdMeta, Res2NetVdStructureConfig};
