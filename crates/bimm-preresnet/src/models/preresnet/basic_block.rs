//! # Pre-Activation Basic Block
//!
//! [`BasicBlock`] is the two-conv pre-activation residual unit.
//!
//! [`BasicBlockMeta`] defines a common meta API for [`BasicBlock`]
//! and [`BasicBlockConfig`].
//!
//! [`BasicBlockConfig`] implements [`Config`], and provides
//! [`BasicBlockConfig::try_init`] / [`BasicBlockConfig::init`]
//! to initialize a [`BasicBlock`].
//!
//! [`BasicBlock`] implements [`Module`], and provides
//! [`BasicBlock::forward`] and [`BasicBlock::forward_with_mode`].
//!
//! ## Shortcut ordering
//!
//! With a projection shortcut, the shortcut consumes the *pre-activated*
//! input. With an identity shortcut, the shortcut carries the *raw* input,
//! and the pre-activation only feeds the main path.

use crate::compat::activation_wrapper::ActivationConfig;
use crate::compat::normalization_wrapper::NormalizationConfig;
use crate::layers::blocks::nac::{AbstractNAC2dConfig, NAC2d, NAC2dMeta};
use crate::layers::drop::mc_dropout::{DropoutMode, McDropout, McDropoutConfig};
use crate::layers::factory::conv3x3;
use crate::models::preresnet::shortcut::{
    ProjectionShortcut, ProjectionShortcutConfig, ShortcutKind,
};
use crate::models::preresnet::util::{block_width, select_shortcut, strided_output_resolution};
use crate::utility::probability::try_probability;
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::prelude::{Backend, Config, Module, Tensor};

/// Ratio of [`BasicBlock`] output channels to `channels`.
pub const BASIC_BLOCK_EXPANSION: usize = 1;

/// [`BasicBlock`] Meta trait.
pub trait BasicBlockMeta {
    /// Ratio of `out_channels` to `channels`.
    const EXPANSION: usize = BASIC_BLOCK_EXPANSION;

    /// The size of the in channels dimension.
    fn in_channels(&self) -> usize;

    /// Configures `width` and `out_channels`.
    fn channels(&self) -> usize;

    /// The stride of the first conv, and of the projection shortcut.
    fn stride(&self) -> usize;

    /// Groups of the conv filters; always 1.
    fn groups(&self) -> usize;

    /// Channels per group; always 64.
    fn width_per_group(&self) -> usize;

    /// Dropout probability ahead of the final conv.
    fn drop_rate(&self) -> f64;

    /// First conv output channels.
    ///
    /// ``width = floor(channels * width_per_group / 64) * groups``
    fn width(&self) -> usize {
        block_width(self.channels(), self.width_per_group(), self.groups())
    }

    /// The size of the out channels dimension.
    ///
    /// ``out_channels = channels * EXPANSION``
    fn out_channels(&self) -> usize {
        self.channels() * Self::EXPANSION
    }

    /// The kind of shortcut used by the block.
    fn shortcut_kind(&self) -> ShortcutKind {
        select_shortcut(self.in_channels(), self.out_channels(), self.stride())
    }

    /// Get the output resolution for a given input resolution.
    ///
    /// ``out = ceil(in / stride)``, as for the padded convolutions of the block.
    ///
    /// # Arguments
    ///
    /// - `input_resolution`: \
    ///   ``[in_height, in_width]``.
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

/// [`BasicBlock`] Config.
///
/// Implements [`BasicBlockMeta`].
#[derive(Config, Debug)]
pub struct BasicBlockConfig {
    /// The size of the in channels dimension.
    pub in_channels: usize,

    /// Configures `width` and `out_channels`.
    pub channels: usize,

    /// The stride of the first conv, and of the projection shortcut.
    #[config(default = 1)]
    pub stride: usize,

    /// Groups of the conv filters; must be 1.
    #[config(default = 1)]
    pub groups: usize,

    /// Channels per group; must be 64.
    #[config(default = 64)]
    pub width_per_group: usize,

    /// Dropout probability ahead of the final conv.
    #[config(default = "0.3")]
    pub drop_rate: f64,

    /// [`crate::compat::normalization_wrapper::Normalization`] config.
    ///
    /// The feature size of this config will be replaced
    /// with the appropriate feature size for each layer.
    #[config(default = "NormalizationConfig::default()")]
    pub normalization: NormalizationConfig,

    /// [`crate::compat::activation_wrapper::Activation`] config.
    #[config(default = "ActivationConfig::Relu")]
    pub activation: ActivationConfig,
}

impl BasicBlockMeta for BasicBlockConfig {
    fn in_channels(&self) -> usize {
        self.in_channels
    }

    fn channels(&self) -> usize {
        self.channels
    }

    fn stride(&self) -> usize {
        self.stride
    }

    fn groups(&self) -> usize {
        self.groups
    }

    fn width_per_group(&self) -> usize {
        self.width_per_group
    }

    fn drop_rate(&self) -> f64 {
        self.drop_rate
    }
}

impl BasicBlockConfig {
    /// Check if the config is valid.
    ///
    /// # Returns
    ///
    /// A `Result<(), String>`
    pub fn try_validate(&self) -> Result<(), String> {
        if self.groups != 1 || self.width_per_group != 64 {
            return Err(format!(
                "BasicBlock only supports groups=1 and width_per_group=64; got groups={}, width_per_group={}",
                self.groups, self.width_per_group,
            ));
        }
        if self.in_channels == 0 || self.channels == 0 {
            return Err(format!(
                "BasicBlock channels must be non-zero: in_channels={}, channels={}",
                self.in_channels, self.channels,
            ));
        }
        if self.stride == 0 {
            return Err("BasicBlock stride must be non-zero".to_string());
        }
        try_probability(self.drop_rate).map(|_| ())
    }

    /// Panic if `try_validate` returns an error.
    pub fn expect_valid(&self) {
        if let Err(err) = self.try_validate() {
            panic!("{}", err);
        }
    }

    /// Initialize a [`BasicBlock`].
    ///
    /// # Returns
    ///
    /// The block; or the validation error.
    pub fn try_init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> anyhow::Result<BasicBlock<B>> {
        self.try_validate().map_err(anyhow::Error::msg)?;
        Ok(self.build(device))
    }

    /// Initialize a [`BasicBlock`].
    ///
    /// # Panics
    ///
    /// If the config is invalid.
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> BasicBlock<B> {
        self.expect_valid();
        self.build(device)
    }

    fn build<B: Backend>(
        &self,
        device: &B::Device,
    ) -> BasicBlock<B> {
        let in_channels = self.in_channels();
        let width = self.width();
        let out_channels = self.out_channels();
        let stride = self.stride();
        let shortcut_kind = self.shortcut_kind();

        tracing::debug!(
            in_channels,
            width,
            out_channels,
            stride,
            drop_rate = self.drop_rate,
            shortcut = ?shortcut_kind,
            "init BasicBlock"
        );

        let shortcut = match shortcut_kind {
            ShortcutKind::Projection => Some(
                ProjectionShortcutConfig::new(in_channels, out_channels)
                    .with_stride(stride)
                    .with_norm(self.normalization.clone())
                    .init(device),
            ),
            ShortcutKind::Identity => None,
        };

        let nac_builder = AbstractNAC2dConfig::new()
            .with_norm(self.normalization.clone())
            .with_act(self.activation.clone());

        BasicBlock {
            width_per_group: self.width_per_group,
            shortcut,
            nac1: nac_builder
                .build_config(conv3x3(in_channels, width, stride, 1))
                .init(device),
            nac2: nac_builder
                .build_config(conv3x3(width, out_channels, 1, 1))
                .init(device),
            dropout: McDropoutConfig::new().with_prob(self.drop_rate).init(),
        }
    }
}

/// Pre-Activation Basic Block.
///
/// Implements [`BasicBlockMeta`].
#[derive(Module, Debug)]
pub struct BasicBlock<B: Backend> {
    /// Channels per group.
    pub width_per_group: usize,

    /// Optional projection; for the residual connection.
    pub shortcut: Option<ProjectionShortcut<B>>,

    /// Pre-activation and first 3x3 conv.
    pub nac1: NAC2d<B>,

    /// Second norm/act and 3x3 conv; dropout is hooked ahead of the conv.
    pub nac2: NAC2d<B>,

    /// Dropout ahead of the final conv.
    pub dropout: McDropout,
}

impl<B: Backend> BasicBlockMeta for BasicBlock<B> {
    fn in_channels(&self) -> usize {
        self.nac1.in_channels()
    }

    fn channels(&self) -> usize {
        self.out_channels() / Self::EXPANSION
    }

    fn stride(&self) -> usize {
        self.nac1.stride()[0]
    }

    fn groups(&self) -> usize {
        self.nac1.groups()
    }

    fn width_per_group(&self) -> usize {
        self.width_per_group
    }

    fn drop_rate(&self) -> f64 {
        self.dropout.prob
    }

    fn width(&self) -> usize {
        self.nac1.out_channels()
    }

    fn out_channels(&self) -> usize {
        self.nac2.out_channels()
    }

    fn shortcut_kind(&self) -> ShortcutKind {
        ShortcutKind::from(&self.shortcut)
    }
}

impl<B: Backend> BasicBlock<B> {
    /// Forward Pass.
    ///
    /// Dropout follows the backend convention; see [`DropoutMode::from_backend`].
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_channels, in_height, in_width]``.
    ///
    /// # Returns
    ///
    /// A ``[batch, out_channels=channels*EXPANSION, out_height, out_width]`` tensor.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        self.forward_with_mode(input, DropoutMode::from_backend::<B>())
    }

    /// Forward Pass, with an explicit dropout mode.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_channels, in_height, in_width]``.
    /// - `mode`: the dropout mode.
    ///
    /// # Returns
    ///
    /// A ``[batch, out_channels=channels*EXPANSION, out_height, out_width]`` tensor.
    #[tracing::instrument(level = "trace", skip_all)]
    pub fn forward_with_mode(
        &self,
        input: Tensor<B, 4>,
        mode: DropoutMode,
    ) -> Tensor<B, 4> {
        let [batch, in_height, in_width] = unpack_shape_contract!(
            ["batch", "in_channels", "in_height", "in_width"],
            &input,
            &["batch", "in_height", "in_width"],
            &[("in_channels", self.in_channels())],
        );
        let [out_height, out_width] = self.output_resolution([in_height, in_width]);

        let (skip, x) = match &self.shortcut {
            Some(shortcut) => {
                let x = self.nac1.activate(input);
                (shortcut.forward(x.clone()), x)
            }
            // The identity skip is taken before pre-activation.
            None => (input.clone(), self.nac1.activate(input)),
        };

        let x = self.nac1.convolve(x);

        let x = self
            .nac2
            .hook_forward(x, |x| self.dropout.forward(x, mode));

        let x = skip + x;

        assert_shape_contract_periodically!(
            ["batch", "out_channels", "out_height", "out_width"],
            &x,
            &[
                ("batch", batch),
                ("out_channels", self.out_channels()),
                ("out_height", out_height),
                ("out_width", out_width),
            ]
        );

        x
    }

    /// Create a config from this module.
    pub fn to_config(&self) -> BasicBlockConfig {
        BasicBlockConfig::new(self.in_channels(), self.channels())
            .with_stride(self.stride())
            .with_groups(self.groups())
            .with_width_per_group(self.width_per_group())
            .with_drop_rate(self.drop_rate())
            .with_normalization(self.nac1.norm.to_config())
            .with_activation(self.nac1.act.to_config())
    }
}
