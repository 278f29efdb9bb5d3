//! Pooling layers.
pub mod avg_pool_2d_ceil;

pub use avg_pool_2d_ceil::{AvgPool2dCeil, AvgPool2dCeilConfig};
