//! # Common Layers
pub mod conv_bn;
pub mod pool;
