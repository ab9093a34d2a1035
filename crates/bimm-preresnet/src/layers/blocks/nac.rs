//! # `NAC2d` - pre-activation norm/activation/conv block.
//!
//! A [`NAC2d`] module is:
//! * a [`Normalization`] layer, over the conv input channels,
//! * a [`Activation`] layer,
//! * a [`Conv2d`] layer.
//!
//! The stages are exposed separately ([`NAC2d::activate`], [`NAC2d::convolve`])
//! so residual blocks can tap the activated input; and [`NAC2d::hook_forward`]
//! runs code between the activation and the conv.

use crate::compat::activation_wrapper::{Activation, ActivationConfig};
use crate::compat::normalization_wrapper::{Normalization, NormalizationConfig};
use crate::layers::factory::strided_output_size;
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::config::Config;
use burn::module::Module;
use burn::nn::PaddingConfig2d;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::prelude::{Backend, Tensor};

/// Abstract policy for [`NAC2d`] Config.
///
/// Defines a [`NormalizationConfig`] and [`ActivationConfig`],
/// and can be lifted to a [`NAC2dConfig`] to match a [`Conv2dConfig`].
///
/// The abstract [`NormalizationConfig`] will be feature matched
/// with the *input* channels of the target [`Conv2dConfig`].
#[derive(Config, Debug)]
pub struct AbstractNAC2dConfig {
    /// The [`Normalization`] config.
    #[config(default = "NormalizationConfig::default()")]
    pub norm: NormalizationConfig,

    /// Activation Config.
    #[config(default = "ActivationConfig::Relu")]
    pub act: ActivationConfig,
}

impl AbstractNAC2dConfig {
    /// Merge with a [`Conv2dConfig`] to construct a [`NAC2dConfig`].
    pub fn build_config(
        &self,
        conv: Conv2dConfig,
    ) -> NAC2dConfig {
        NAC2dConfig {
            norm: self.norm.clone(),
            act: self.act.clone(),
            conv,
        }
        .match_norm_features()
    }
}

/// [`NAC2d`] Meta.
pub trait NAC2dMeta {
    /// Number of input channels.
    fn in_channels(&self) -> usize;

    /// Number of groups.
    fn groups(&self) -> usize;

    /// Number of output channels.
    fn out_channels(&self) -> usize;

    /// Get the stride.
    fn stride(&self) -> [usize; 2];
}

/// [`NAC2d`] Config.
///
/// Implements [`NAC2dMeta`].
#[derive(Config, Debug)]
pub struct NAC2dConfig {
    /// The [`Normalization`] config.
    pub norm: NormalizationConfig,

    /// The [`Activation`] config.
    #[config(default = "ActivationConfig::Relu")]
    pub act: ActivationConfig,

    /// The [`Conv2d`] config.
    pub conv: Conv2dConfig,
}

impl NAC2dMeta for NAC2dConfig {
    fn in_channels(&self) -> usize {
        self.conv.channels[0]
    }

    fn groups(&self) -> usize {
        self.conv.groups
    }

    fn out_channels(&self) -> usize {
        self.conv.channels[1]
    }

    fn stride(&self) -> [usize; 2] {
        self.conv.stride
    }
}

impl NAC2dConfig {
    /// Initialize a [`NAC2d`].
    ///
    /// Auto-matches the norm layer features
    /// to the conv layer's input channels.
    pub fn init<B: Backend>(
        self,
        device: &B::Device,
    ) -> NAC2d<B> {
        let cfg = self.match_norm_features();
        NAC2d {
            norm: cfg.norm.init(device),
            act: cfg.act.init(device),
            conv: cfg.conv.init(device),
        }
    }

    /// Adjust the norm features to match the conv input size.
    ///
    /// [`NAC2dConfig::init`] does this automatically.
    pub fn match_norm_features(self) -> Self {
        let features = self.in_channels();
        let norm = self.norm.with_num_features(features);
        Self { norm, ..self }
    }
}

/// Sequenced pre-activation norm/activation/conv block.
///
/// Implements [`NAC2dMeta`].
#[derive(Module, Debug)]
pub struct NAC2d<B: Backend> {
    /// Norm Layer, over the conv input channels.
    pub norm: Normalization<B>,

    /// Activation layer.
    pub act: Activation<B>,

    /// Conv2d layer.
    pub conv: Conv2d<B>,
}

impl<B: Backend> NAC2dMeta for NAC2d<B> {
    fn in_channels(&self) -> usize {
        self.conv.weight.shape().dims[1] * self.groups()
    }

    fn groups(&self) -> usize {
        self.conv.groups
    }

    fn out_channels(&self) -> usize {
        self.conv.weight.shape().dims[0]
    }

    fn stride(&self) -> [usize; 2] {
        self.conv.stride
    }
}

impl<B: Backend> NAC2d<B> {
    /// Pre-activation.
    ///
    /// Applies the norm and act layers; but not the conv.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_channels, height, width]``.
    ///
    /// # Returns
    ///
    /// ``[batch, in_channels, height, width]``
    pub fn activate(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        unpack_shape_contract!(
            ["batch", "in_channels", "height", "width"],
            &input,
            &["batch"],
            &[("in_channels", self.in_channels())]
        );

        let x = self.norm.forward(input);
        self.act.forward(x)
    }

    /// Conv stage alone.
    ///
    /// # Arguments
    ///
    /// - `input`: an activated \
    ///   ``[batch, in_channels, in_height, in_width]`` tensor.
    ///
    /// # Returns
    ///
    /// ``[batch, out_channels, out_height, out_width]``
    pub fn convolve(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let [batch, in_height, in_width] = unpack_shape_contract!(
            ["batch", "in_channels", "in_height", "in_width"],
            &input,
            &["batch", "in_height", "in_width"],
            &[("in_channels", self.in_channels())]
        );
        let [height_stride, width_stride] = self.stride();
        let out_height = strided_output_size(in_height, height_stride);
        let out_width = strided_output_size(in_width, width_stride);

        let x = self.conv.forward(input);

        assert_shape_contract_periodically!(
            ["batch", "out_channels", "out_height", "out_width"],
            &x,
            &[
                ("batch", batch),
                ("out_channels", self.out_channels()),
                ("out_height", out_height),
                ("out_width", out_width)
            ]
        );

        x
    }

    /// Forward Pass.
    ///
    /// ```rust,ignore
    /// let x = self.norm.forward(input);
    /// let x = self.act.forward(x);
    /// let x = self.conv.forward(x);
    /// return x
    /// ```
    ///
    /// # Arguments
    ///
    /// - `input`: \
    ///   ``[batch, in_channels, in_height, in_width]``.
    ///
    /// # Returns
    ///
    /// ``[batch, out_channels, out_height, out_width]``
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        self.hook_forward(input, |x| x)
    }

    /// Hooked Forward Pass.
    ///
    /// Applies the hook after activation but before the conv.
    ///
    /// ```rust,ignore
    /// let x = self.norm.forward(input);
    /// let x = self.act.forward(x);
    /// let x = hook(x);
    /// let x = self.conv.forward(x);
    /// return x
    /// ```
    pub fn hook_forward<F>(
        &self,
        input: Tensor<B, 4>,
        hook: F,
    ) -> Tensor<B, 4>
    where
        F: FnOnce(Tensor<B, 4>) -> Tensor<B, 4>,
    {
        let x = self.activate(input);
        let x = hook(x);
        self.convolve(x)
    }

    /// Build a [`NAC2dConfig`] for this module.
    ///
    /// Assumes "same" padding for odd kernels, as built by [`crate::layers::factory`].
    pub fn to_config(&self) -> NAC2dConfig {
        let [out_channels, in_per_group, kh, kw] = self.conv.weight.shape().dims();
        let conv = Conv2dConfig::new([in_per_group * self.groups(), out_channels], [kh, kw])
            .with_stride(self.conv.stride)
            .with_dilation(self.conv.dilation)
            .with_groups(self.conv.groups)
            .with_padding(PaddingConfig2d::Explicit(kh / 2, kw / 2))
            .with_bias(self.conv.bias.is_some());

        NAC2dConfig::new(self.norm.to_config(), conv).with_act(self.act.to_config())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::factory::{conv1x1, conv3x3};
    use burn::backend::{Autodiff, NdArray};
    use burn::nn::{BatchNormConfig, GroupNormConfig};
    use burn::tensor::Distribution;

    #[test]
    fn test_nac_config() {
        let abstract_config = AbstractNAC2dConfig::new();

        let config: NAC2dConfig = abstract_config.build_config(conv3x3(2, 4, 2, 1));

        assert_eq!(config.in_channels(), 2);
        assert_eq!(config.out_channels(), 4);
        assert_eq!(config.groups(), 1);
        assert_eq!(config.stride(), [2, 2]);

        // Pre-activation norms see the conv input.
        assert_eq!(config.norm.num_features(), 2);
    }

    #[test]
    fn test_nac() {
        type B = Autodiff<NdArray<f32>>;
        let device = Default::default();

        let config = NAC2dConfig::new(
            NormalizationConfig::Batch(BatchNormConfig::new(0)),
            conv3x3(2, 4, 2, 1),
        )
        .with_act(ActivationConfig::Relu);

        let layer: NAC2d<B> = config.init(&device);
        assert_eq!(layer.in_channels(), 2);
        assert_eq!(layer.out_channels(), 4);
        assert_eq!(layer.groups(), 1);
        assert_eq!(layer.stride(), [2, 2]);
        assert_eq!(layer.norm.num_features(), 2);

        let input = Tensor::random([2, 2, 10, 10], Distribution::Default, &device);

        {
            let output = layer.forward(input.clone());
            let expected = {
                let x = layer.norm.forward(input.clone());
                let x = layer.act.forward(x);
                layer.conv.forward(x)
            };
            output.to_data().assert_eq(&expected.to_data(), true);
        }

        {
            let hook = |x| x * 2.0;

            let output = layer.hook_forward(input.clone(), hook);
            let expected = {
                let x = layer.activate(input.clone());
                let x = hook(x);
                layer.convolve(x)
            };
            output.to_data().assert_eq(&expected.to_data(), true);
        }
    }

    #[test]
    #[should_panic]
    fn test_activate_wrong_channels() {
        type B = NdArray<f32>;
        let device = Default::default();

        let layer: NAC2d<B> = AbstractNAC2dConfig::new()
            .build_config(conv1x1(4, 8, 1))
            .init(&device);

        layer.activate(Tensor::ones([1, 3, 4, 4], &device));
    }

    #[test]
    fn test_to_config() {
        type B = NdArray<f32>;
        let device = Default::default();

        let layer: NAC2d<B> = AbstractNAC2dConfig::new()
            .with_norm(GroupNormConfig::new(2, 0).into())
            .build_config(conv3x3(8, 16, 2, 4))
            .init(&device);

        let config = layer.to_config();
        assert_eq!(config.in_channels(), 8);
        assert_eq!(config.out_channels(), 16);
        assert_eq!(config.groups(), 4);
        assert_eq!(config.stride(), [2, 2]);
        assert_eq!(config.norm.num_features(), 8);
        assert!(matches!(config.norm, NormalizationConfig::Group(_)));
    }

    #[test]
    fn test_convolve_odd_resolution() {
        type B = NdArray<f32>;
        let device = Default::default();

        let layer: NAC2d<B> = AbstractNAC2dConfig::new()
            .build_config(conv3x3(2, 4, 2, 1))
            .init(&device);

        let output = layer.forward(Tensor::ones([1, 2, 7, 9], &device));
        assert_eq!(output.dims(), [1, 4, 4, 5]);
    }
}
