//! # Convolution Factory
//!
//! Standard `ResNet` convolution configs.
//!
//! Residual blocks never use a conv bias; every conv is
//! either followed by a norm layer, or feeds a residual sum
//! which is normalized by the next block.

use burn::nn::conv::Conv2dConfig;
use burn::nn::{Initializer, PaddingConfig2d};

/// Fan-out Kaiming normal init, for convolutions feeding into a `ReLU`.
pub const CONV_INTO_RELU_INITIALIZER: Initializer = Initializer::KaimingNormal {
    gain: std::f64::consts::SQRT_2,
    fan_out_only: true,
};

/// Build a 1x1 conv config.
///
/// # Arguments
///
/// - `in_channels`: input channels.
/// - `out_channels`: output channels.
/// - `stride`: stride in both spatial dims.
pub fn conv1x1(
    in_channels: usize,
    out_channels: usize,
    stride: usize,
) -> Conv2dConfig {
    Conv2dConfig::new([in_channels, out_channels], [1, 1])
        .with_stride([stride, stride])
        .with_padding(PaddingConfig2d::Explicit(0, 0))
        .with_initializer(CONV_INTO_RELU_INITIALIZER.clone())
        .with_bias(false)
}

/// Build a 3x3 conv config, with padding 1.
///
/// # Arguments
///
/// - `in_channels`: input channels; must be divisible by `groups`.
/// - `out_channels`: output channels; must be divisible by `groups`.
/// - `stride`: stride in both spatial dims.
/// - `groups`: conv groups.
pub fn conv3x3(
    in_channels: usize,
    out_channels: usize,
    stride: usize,
    groups: usize,
) -> Conv2dConfig {
    Conv2dConfig::new([in_channels, out_channels], [3, 3])
        .with_stride([stride, stride])
        .with_padding(PaddingConfig2d::Explicit(1, 1))
        .with_groups(groups)
        .with_initializer(CONV_INTO_RELU_INITIALIZER.clone())
        .with_bias(false)
}

/// Output size of a [`conv1x1`] or [`conv3x3`] along one spatial dim.
///
/// Both pad to "same", so ``out = floor((in - 1) / stride) + 1 = ceil(in / stride)``.
pub fn strided_output_size(
    size: usize,
    stride: usize,
) -> usize {
    size.div_ceil(stride)
}
