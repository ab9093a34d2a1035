//! # Composite Blocks

pub mod conv_norm;
pub mod nac;
