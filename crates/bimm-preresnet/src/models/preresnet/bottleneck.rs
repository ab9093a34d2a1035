//! # Pre-Activation Bottleneck Block
//!
//! [`Bottleneck`] is the 1x1 / grouped 3x3 / 1x1 pre-activation residual unit.
//!
//! [`BottleneckMeta`] defines a common meta API for [`Bottleneck`]
//! and [`BottleneckConfig`].
//!
//! [`BottleneckConfig`] implements [`Config`], and provides
//! [`BottleneckConfig::try_init`] / [`BottleneckConfig::init`]
//! to initialize a [`Bottleneck`].
//!
//! [`Bottleneck`] implements [`Module`], and provides
//! [`Bottleneck::forward`] and [`Bottleneck::forward_with_mode`].
//!
//! The shortcut ordering matches [`crate::models::preresnet::basic_block`].

use crate::compat::activation_wrapper::ActivationConfig;
use crate::compat::normalization_wrapper::NormalizationConfig;
use crate::layers::blocks::nac::{AbstractNAC2dConfig, NAC2d, NAC2dMeta};
use crate::layers::drop::mc_dropout::{DropoutMode, McDropout, McDropoutConfig};
use crate::layers::factory::{conv1x1, conv3x3};
use crate::models::preresnet::shortcut::{
    ProjectionShortcut, ProjectionShortcutConfig, ShortcutKind,
};
use crate::models::preresnet::util::{block_width, select_shortcut, strided_output_resolution};
use crate::utility::probability::try_probability;
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::prelude::{Backend, Config, Module, Tensor};

/// Ratio of [`Bottleneck`] output channels to `channels`.
pub const BOTTLENECK_EXPANSION: usize = 4;

/// [`Bottleneck`] Meta trait.
pub trait BottleneckMeta {
    /// Ratio of `out_channels` to `channels`.
    const EXPANSION: usize = BOTTLENECK_EXPANSION;

    /// The number of input feature planes.
    fn in_channels(&self) -> usize;

    /// Configures `width` and `out_channels`.
    fn channels(&self) -> usize;

    /// The stride of the 3x3 conv, and of the projection shortcut.
    fn stride(&self) -> usize;

    /// Groups of the 3x3 conv filters.
    fn groups(&self) -> usize;

    /// Control factor for `width()`.
    fn width_per_group(&self) -> usize;

    /// Dropout probability ahead of the final conv.
    fn drop_rate(&self) -> f64;

    /// Inner (bottleneck) channels.
    ///
    /// ``width = floor(channels * width_per_group / 64) * groups``
    fn width(&self) -> usize {
        block_width(self.channels(), self.width_per_group(), self.groups())
    }

    /// The number of output feature planes.
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

/// [`Bottleneck`] Config.
///
/// Implements [`BottleneckMeta`].
#[derive(Config, Debug)]
pub struct BottleneckConfig {
    /// The size of the in channels dimension.
    pub in_channels: usize,

    /// Configures `width` and `out_channels`.
    pub channels: usize,

    /// The stride of the 3x3 conv, and of the projection shortcut.
    #[config(default = 1)]
    pub stride: usize,

    /// Groups of the 3x3 conv filters.
    #[config(default = 1)]
    pub groups: usize,

    /// Control factor for `width()`.
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

impl BottleneckMeta for BottleneckConfig {
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

impl BottleneckConfig {
    /// Check if the config is valid.
    ///
    /// # Returns
    ///
    /// A `Result<(), String>`
    pub fn try_validate(&self) -> Result<(), String> {
        if self.in_channels == 0 || self.channels == 0 {
            return Err(format!(
                "Bottleneck channels must be non-zero: in_channels={}, channels={}",
                self.in_channels, self.channels,
            ));
        }
        if self.stride == 0 {
            return Err("Bottleneck stride must be non-zero".to_string());
        }
        if self.groups == 0 {
            return Err("Bottleneck groups must be non-zero".to_string());
        }
        if self.width() == 0 {
            return Err(format!(
                "Bottleneck width is zero: channels={}, width_per_group={}, groups={}",
                self.channels, self.width_per_group, self.groups,
            ));
        }
        try_probability(self.drop_rate).map(|_| ())
    }

    /// Panic if `try_validate` returns an error.
    pub fn expect_valid(&self) {
        if let Err(err) = self.try_validate() {
            panic!("{}", err);
        }
    }

    /// Initialize a [`Bottleneck`].
    ///
    /// # Returns
    ///
    /// The block; or the validation error.
    pub fn try_init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> anyhow::Result<Bottleneck<B>> {
        self.try_validate().map_err(anyhow::Error::msg)?;
        Ok(self.build(device))
    }

    /// Initialize a [`Bottleneck`].
    ///
    /// # Panics
    ///
    /// If the config is invalid.
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> Bottleneck<B> {
        self.expect_valid();
        self.build(device)
    }

    fn build<B: Backend>(
        &self,
        device: &B::Device,
    ) -> Bottleneck<B> {
        let in_channels = self.in_channels();
        let width = self.width();
        let out_channels = self.out_channels();
        let stride = self.stride();
        let groups = self.groups();
        let shortcut_kind = self.shortcut_kind();

        tracing::debug!(
            in_channels,
            width,
            out_channels,
            stride,
            groups,
            drop_rate = self.drop_rate,
            shortcut = ?shortcut_kind,
            "init Bottleneck"
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

        Bottleneck {
            width_per_group: self.width_per_group,
            shortcut,
            nac1: nac_builder
                .build_config(conv1x1(in_channels, width, 1))
                .init(device),
            nac2: nac_builder
                .build_config(conv3x3(width, width, stride, groups))
                .init(device),
            nac3: nac_builder
                .build_config(conv1x1(width, out_channels, 1))
                .init(device),
            dropout: McDropoutConfig::new().with_prob(self.drop_rate).init(),
        }
    }
}

/// Pre-Activation Bottleneck Block.
///
/// Implements [`BottleneckMeta`].
#[derive(Module, Debug)]
pub struct Bottleneck<B: Backend> {
    /// Channels per group.
    pub width_per_group: usize,

    /// Optional projection; for the residual connection.
    pub shortcut: Option<ProjectionShortcut<B>>,

    /// Pre-activation and 1x1 reduction conv.
    pub nac1: NAC2d<B>,

    /// Norm/act and strided, grouped 3x3 conv.
    pub nac2: NAC2d<B>,

    /// Norm/act and 1x1 expansion conv; dropout is hooked ahead of the conv.
    pub nac3: NAC2d<B>,

    /// Dropout ahead of the final conv.
    pub dropout: McDropout,
}

impl<B: Backend> BottleneckMeta for Bottleneck<B> {
    fn in_channels(&self) -> usize {
        self.nac1.in_channels()
    }

    fn channels(&self) -> usize {
        self.out_channels() / Self::EXPANSION
    }

    fn stride(&self) -> usize {
        self.nac2.stride()[0]
    }

    fn groups(&self) -> usize {
        self.nac2.groups()
    }

    fn width_per_group(&self) -> usize {
        self.width_per_group
    }

    fn drop_rate(&self) -> f64 {
        self.dropout.prob
    }

    fn width(&self) -> usize {
        self.nac2.out_channels()
    }

    fn out_channels(&self) -> usize {
        self.nac3.out_channels()
    }

    fn shortcut_kind(&self) -> ShortcutKind {
        ShortcutKind::from(&self.shortcut)
    }
}

impl<B: Backend> Bottleneck<B> {
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

        let x = self.nac2.forward(x);

        assert_shape_contract_periodically!(
            ["batch", "width", "out_height", "out_width"],
            &x,
            &[
                ("batch", batch),
                ("width", self.width()),
                ("out_height", out_height),
                ("out_width", out_width),
            ]
        );

        let x = self
            .nac3
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
    pub fn to_config(&self) -> BottleneckConfig {
        BottleneckConfig::new(self.in_channels(), self.channels())
            .with_stride(self.stride())
            .with_groups(self.groups())
            .with_width_per_group(self.width_per_group())
            .with_drop_rate(self.drop_rate())
            .with_normalization(self.nac1.norm.to_config())
            .with_activation(self.nac1.act.to_config())
    }
}
