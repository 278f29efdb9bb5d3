//! # Complete Model Families

pub mod res2net;
