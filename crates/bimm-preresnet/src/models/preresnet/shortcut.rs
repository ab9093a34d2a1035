//! # Residual Shortcut
//!
//! The shortcut of a residual block is either the identity,
//! or a [`ProjectionShortcut`] (1x1 conv + norm) when the main path
//! changes the resolution or the channel count.
//!
//! Blocks hold an ``Option<ProjectionShortcut<B>>``; [`ShortcutKind`]
//! names the two cases for the meta APIs.

use crate::compat::normalization_wrapper::NormalizationConfig;
use crate::layers::blocks::conv_norm::{ConvNorm2d, ConvNorm2dConfig, ConvNorm2dMeta};
use crate::layers::factory::conv1x1;
use crate::models::preresnet::util::strided_output_resolution;
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::prelude::{Backend, Config, Module, Tensor};

/// The kind of shortcut held by a residual block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShortcutKind {
    /// The input passes through unchanged.
    Identity,

    /// The input is projected by a strided 1x1 conv + norm.
    Projection,
}

impl<B: Backend> From<&Option<ProjectionShortcut<B>>> for ShortcutKind {
    fn from(shortcut: &Option<ProjectionShortcut<B>>) -> Self {
        match shortcut {
            Some(_) => ShortcutKind::Projection,
            None => ShortcutKind::Identity,
        }
    }
}

/// [`ProjectionShortcut`] Meta trait.
pub trait ProjectionShortcutMeta {
    /// The size of the in channels dimension.
    fn in_channels(&self) -> usize;

    /// The size of the out channels dimension.
    fn out_channels(&self) -> usize;

    /// The stride of the projection.
    fn stride(&self) -> usize;

    /// Get the output resolution for a given input resolution.
    ///
    /// ``out = ceil(in / stride)``, as for the padded convolutions of the block.
    ///
    /// # Arguments
    ///
    /// - `input_resolution`: ``[in_height, in_width]``.
    ///
    /// # Returns
    ///
    /// ``[out_height, out_width]``
    fn output_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> [usize; 2] {
        strided_output_resolution(input_resolution, self.stride())
    }
}

/// [`ProjectionShortcut`] configuration.
#[derive(Config, Debug)]
pub struct ProjectionShortcutConfig {
    /// The size of the in channels dimension.
    pub in_channels: usize,

    /// The size of the out channels dimension.
    pub out_channels: usize,

    /// The stride of the projection.
    #[config(default = 1)]
    pub stride: usize,

    /// The norm applied after the projection conv.
    #[config(default = "NormalizationConfig::default()")]
    pub norm: NormalizationConfig,
}

impl ProjectionShortcutMeta for ProjectionShortcutConfig {
    fn in_channels(&self) -> usize {
        self.in_channels
    }

    fn out_channels(&self) -> usize {
        self.out_channels
    }

    fn stride(&self) -> usize {
        self.stride
    }
}

impl ProjectionShortcutConfig {
    /// Initialize a [`ProjectionShortcut`] `Module`.
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> ProjectionShortcut<B> {
        let config = ConvNorm2dConfig::new(conv1x1(self.in_channels, self.out_channels, self.stride))
            .with_norm(self.norm.clone());

        ProjectionShortcut {
            conv_norm: config.init(device),
        }
    }
}

/// Projection shortcut; a strided 1x1 conv followed by a norm.
///
/// Maps ``[batch, in_channels, in_height, in_width]`` to
/// ``[batch, out_channels, out_height, out_width]`` tensors.
#[derive(Module, Debug)]
pub struct ProjectionShortcut<B: Backend> {
    /// Embedded conv/norm.
    pub conv_norm: ConvNorm2d<B>,
}

impl<B: Backend> ProjectionShortcutMeta for ProjectionShortcut<B> {
    fn in_channels(&self) -> usize {
        self.conv_norm.in_channels()
    }

    fn out_channels(&self) -> usize {
        self.conv_norm.out_channels()
    }

    fn stride(&self) -> usize {
        self.conv_norm.stride()[0]
    }
}

impl<B: Backend> ProjectionShortcut<B> {
    /// Forward pass.
    ///
    /// # Arguments
    ///
    /// - `input`: a ``[batch, in_channels, in_height, in_width]`` tensor.
    ///
    /// # Returns
    ///
    /// A ``[batch, out_channels, out_height, out_width]`` tensor.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let [batch, in_height, in_width] = unpack_shape_contract!(
            ["batch", "in_channels", "in_height", "in_width"],
            &input,
            &["batch", "in_height", "in_width"],
            &[("in_channels", self.in_channels())],
        );
        let [out_height, out_width] = self.output_resolution([in_height, in_width]);

        let out = self.conv_norm.forward(input);

        assert_shape_contract_periodically!(
            ["batch", "out_channels", "out_height", "out_width"],
            &out,
            &[
                ("batch", batch),
                ("out_channels", self.out_channels()),
                ("out_height", out_height),
                ("out_width", out_width)
            ]
        );

        out
    }

    /// Build a [`ProjectionShortcutConfig`] for this module.
    pub fn to_config(&self) -> ProjectionShortcutConfig {
        ProjectionShortcutConfig::new(self.in_channels(), self.out_channels())
            .with_stride(self.stride())
            .with_norm(self.conv_norm.norm.to_config())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bimm_contracts::assert_shape_contract;
    use burn::backend::NdArray;
    use burn::nn::GroupNormConfig;

    #[test]
    fn test_projection_config() {
        let config = ProjectionShortcutConfig::new(16, 32).with_stride(2);
        assert_eq!(config.in_channels(), 16);
        assert_eq!(config.out_channels(), 32);
        assert_eq!(config.stride(), 2);
        assert_eq!(config.output_resolution([16, 16]), [8, 8]);
    }

    #[test]
    fn test_shortcut_kind() {
        type B = NdArray<f32>;
        let device = Default::default();

        let none: Option<ProjectionShortcut<B>> = None;
        assert_eq!(ShortcutKind::from(&none), ShortcutKind::Identity);

        let some: Option<ProjectionShortcut<B>> =
            Some(ProjectionShortcutConfig::new(2, 4).init(&device));
        assert_eq!(ShortcutKind::from(&some), ShortcutKind::Projection);
    }

    #[test]
    fn test_projection_forward() {
        type B = NdArray<f32>;
        let device = Default::default();

        let batch_size = 2;
        let in_channels = 4;
        let out_channels = 8;

        let shortcut: ProjectionShortcut<B> = ProjectionShortcutConfig::new(in_channels, out_channels)
            .with_stride(2)
            .with_norm(GroupNormConfig::new(2, 0).into())
            .init(&device);

        assert_eq!(shortcut.in_channels(), in_channels);
        assert_eq!(shortcut.out_channels(), out_channels);
        assert_eq!(shortcut.stride(), 2);

        let config = shortcut.to_config();
        assert_eq!(config.out_channels(), out_channels);
        assert_eq!(config.norm.num_features(), out_channels);
        assert!(matches!(config.norm, NormalizationConfig::Group(_)));

        let input = Tensor::ones([batch_size, in_channels, 8, 8], &device);
        let output = shortcut.forward(input);

        assert_shape_contract!(
            ["batch", "out_channels", "out_height", "out_width"],
            &output,
            &[
                ("batch", batch_size),
                ("out_channels", out_channels),
                ("out_height", 4),
                ("out_width", 4)
            ],
        );
    }

    #[test]
    fn test_projection_odd_resolution() {
        type B = NdArray<f32>;
        let device = Default::default();

        let shortcut: ProjectionShortcut<B> =
            ProjectionShortcutConfig::new(4, 8).with_stride(2).init(&device);
        assert_eq!(shortcut.output_resolution([7, 5]), [4, 3]);

        let output = shortcut.forward(Tensor::ones([1, 4, 7, 5], &device));
        assert_eq!(output.dims(), [1, 8, 4, 3]);
    }
}
