//! # Pre-Activation `ResNet` Utilities
use crate::layers::factory::strided_output_size;
use crate::models::preresnet::shortcut::ShortcutKind;

/// Get the output resolution for a given input resolution.
///
/// ``out = ceil(in / stride)``; the resolution of the block's
/// "same"-padded 1x1 and 3x3 convolutions at `stride`.
///
/// # Arguments
///
/// - `input_resolution`: ``[in_height, in_width]``.
///
/// # Returns
///
/// ``[out_height, out_width]``
#[inline(always)]
pub fn strided_output_resolution(
    input_resolution: [usize; 2],
    stride: usize,
) -> [usize; 2] {
    let [in_height, in_width] = input_resolution;
    [
        strided_output_size(in_height, stride),
        strided_output_size(in_width, stride),
    ]
}

/// Bottleneck width of a block.
///
/// ``width = floor(channels * width_per_group / 64) * groups``
pub fn block_width(
    channels: usize,
    width_per_group: usize,
    groups: usize,
) -> usize {
    (channels * width_per_group / 64) * groups
}

/// Select the shortcut kind for a block.
///
/// A projection is required when the main path changes
/// the resolution or the channel count.
pub fn select_shortcut(
    in_channels: usize,
    out_channels: usize,
    stride: usize,
) -> ShortcutKind {
    if stride != 1 || in_channels != out_channels {
        ShortcutKind::Projection
    } else {
        ShortcutKind::Identity
    }
}
