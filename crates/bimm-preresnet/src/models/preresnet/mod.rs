//! # Pre-Activation `ResNet` Blocks
//!
//! Residual units in the pre-activation (norm, act, conv) ordering,
//! with Monte-Carlo dropout ahead of the final convolution:
//!
//! * [`basic_block::BasicBlock`] - two 3x3 convolutions; expansion 1.
//! * [`bottleneck::Bottleneck`] - 1x1, grouped 3x3, 1x1 convolutions; expansion 4.
//! * [`residual_block::ResidualBlock`] - either of the above.

pub mod basic_block;
pub mod bottleneck;
pub mod residual_block;
pub mod shortcut;
pub mod util;
