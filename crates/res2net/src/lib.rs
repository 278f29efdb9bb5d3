#![warn(missing_docs)]
//!# res2net - `Res2Net-vd` Image Models for Burn
//!
//! ## Notable Components
//!
//! * [`layers`] - reusable neural network modules.
//!   * [`layers::conv_bn`] - ``[AvgPool2d] + Conv2d + BatchNorm2d + [Act]`` block.
//!   * [`layers::pool`] - ceil-mode average pooling.
//! * [`models`] - complete model families.
//!   * [`models::res2net`] - `Res2Net-vd`.
//!     * [`models::res2net::prefabs`] - `res2net50_vd_26w_4s` and friends.
//! * [`prefabs`] - named config builders.
//! * [`utility`] - shape arithmetic and record inspection.

/// Test-only macro import.
#[cfg(test)]
#[allow(unused_imports)]
#[macro_use]
extern crate hamcrest;

pub mod layers;
pub mod models;
pub mod prefabs;
pub mod utility;
