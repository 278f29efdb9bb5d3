//! # Utilities
pub mod conv_shape;
pub mod record;
