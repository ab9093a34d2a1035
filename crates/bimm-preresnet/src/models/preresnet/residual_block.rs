//! # Residual Block Wrapper

use crate::layers::drop::mc_dropout::DropoutMode;
use crate::models::preresnet::basic_block::{BasicBlock, BasicBlockConfig, BasicBlockMeta};
use crate::models::preresnet::bottleneck::{Bottleneck, BottleneckConfig, BottleneckMeta};
use crate::models::preresnet::shortcut::ShortcutKind;
use crate::models::preresnet::util::strided_output_resolution;
use burn::prelude::{Backend, Config, Module, Tensor};

/// [`ResidualBlock`] Meta API.
pub trait ResidualBlockMeta {
    /// The number of input feature planes.
    fn in_channels(&self) -> usize;

    /// The number of output feature planes.
    fn out_channels(&self) -> usize;

    /// Ratio of `out_channels` to `channels` for the block kind.
    fn expansion(&self) -> usize;

    /// The stride of the block.
    fn stride(&self) -> usize;

    /// The kind of shortcut used by the block.
    fn shortcut_kind(&self) -> ShortcutKind;

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

/// [`ResidualBlock`] Config.
#[derive(Config, Debug)]
pub enum ResidualBlockConfig {
    /// A [`BasicBlock`].
    Basic(BasicBlockConfig),

    /// A [`Bottleneck`].
    Bottleneck(BottleneckConfig),
}

impl ResidualBlockMeta for ResidualBlockConfig {
    fn in_channels(&self) -> usize {
        match self {
            Self::Basic(config) => config.in_channels(),
            Self::Bottleneck(config) => config.in_channels(),
        }
    }

    fn out_channels(&self) -> usize {
        match self {
            Self::Basic(config) => config.out_channels(),
            Self::Bottleneck(config) => config.out_channels(),
        }
    }

    fn expansion(&self) -> usize {
        match self {
            Self::Basic(_) => BasicBlockConfig::EXPANSION,
            Self::Bottleneck(_) => BottleneckConfig::EXPANSION,
        }
    }

    fn stride(&self) -> usize {
        match self {
            Self::Basic(config) => config.stride(),
            Self::Bottleneck(config) => config.stride(),
        }
    }

    fn shortcut_kind(&self) -> ShortcutKind {
        match self {
            Self::Basic(config) => config.shortcut_kind(),
            Self::Bottleneck(config) => config.shortcut_kind(),
        }
    }
}

impl From<BasicBlockConfig> for ResidualBlockConfig {
    fn from(config: BasicBlockConfig) -> Self {
        Self::Basic(config)
    }
}

impl From<BottleneckConfig> for ResidualBlockConfig {
    fn from(config: BottleneckConfig) -> Self {
        Self::Bottleneck(config)
    }
}

impl ResidualBlockConfig {
    /// Build a config.
    ///
    /// # Arguments
    ///
    /// - `in_channels`: the input channels.
    /// - `channels`: the block channels; output is ``channels * expansion``.
    /// - `stride`: the block stride.
    /// - `bottleneck`: select [`Bottleneck`] over [`BasicBlock`].
    pub fn build(
        in_channels: usize,
        channels: usize,
        stride: usize,
        bottleneck: bool,
    ) -> Self {
        if bottleneck {
            BottleneckConfig::new(in_channels, channels)
                .with_stride(stride)
                .into()
        } else {
            BasicBlockConfig::new(in_channels, channels)
                .with_stride(stride)
                .into()
        }
    }

    /// Check if the config is valid.
    pub fn try_validate(&self) -> Result<(), String> {
        match self {
            Self::Basic(config) => config.try_validate(),
            Self::Bottleneck(config) => config.try_validate(),
        }
    }

    /// Set the dropout probability.
    pub fn with_drop_rate(
        self,
        drop_rate: f64,
    ) -> Self {
        match self {
            Self::Basic(config) => config.with_drop_rate(drop_rate).into(),
            Self::Bottleneck(config) => config.with_drop_rate(drop_rate).into(),
        }
    }

    /// Initialize a [`ResidualBlock`].
    ///
    /// # Returns
    ///
    /// The block; or the validation error.
    pub fn try_init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> anyhow::Result<ResidualBlock<B>> {
        Ok(match self {
            Self::Basic(config) => config.try_init(device)?.into(),
            Self::Bottleneck(config) => config.try_init(device)?.into(),
        })
    }

    /// Initialize a [`ResidualBlock`].
    ///
    /// # Panics
    ///
    /// If the config is invalid.
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> ResidualBlock<B> {
        match self {
            Self::Basic(config) => config.init(device).into(),
            Self::Bottleneck(config) => config.init(device).into(),
        }
    }
}

/// A [`BasicBlock`] or [`Bottleneck`] wrapper.
#[derive(Module, Debug)]
#[allow(clippy::large_enum_variant)]
pub enum ResidualBlock<B: Backend> {
    /// A [`BasicBlock`].
    Basic(BasicBlock<B>),

    /// A [`Bottleneck`].
    Bottleneck(Bottleneck<B>),
}

impl<B: Backend> From<BasicBlock<B>> for ResidualBlock<B> {
    fn from(block: BasicBlock<B>) -> Self {
        Self::Basic(block)
    }
}

impl<B: Backend> From<Bottleneck<B>> for ResidualBlock<B> {
    fn from(block: Bottleneck<B>) -> Self {
        Self::Bottleneck(block)
    }
}

impl<B: Backend> ResidualBlockMeta for ResidualBlock<B> {
    fn in_channels(&self) -> usize {
        match self {
            Self::Basic(block) => block.in_channels(),
            Self::Bottleneck(block) => block.in_channels(),
        }
    }

    fn out_channels(&self) -> usize {
        match self {
            Self::Basic(block) => block.out_channels(),
            Self::Bottleneck(block) => block.out_channels(),
        }
    }

    fn expansion(&self) -> usize {
        match self {
            Self::Basic(_) => BasicBlock::<B>::EXPANSION,
            Self::Bottleneck(_) => Bottleneck::<B>::EXPANSION,
        }
    }

    fn stride(&self) -> usize {
        match self {
            Self::Basic(block) => block.stride(),
            Self::Bottleneck(block) => block.stride(),
        }
    }

    fn shortcut_kind(&self) -> ShortcutKind {
        match self {
            Self::Basic(block) => block.shortcut_kind(),
            Self::Bottleneck(block) => block.shortcut_kind(),
        }
    }
}

impl<B: Backend> ResidualBlock<B> {
    /// Apply the wrapped block to the input.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_channels, in_height, in_width]``.
    ///
    /// # Returns
    ///
    /// A ``[batch, out_channels, out_height, out_width]`` tensor.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        match self {
            Self::Basic(block) => block.forward(input),
            Self::Bottleneck(block) => block.forward(input),
        }
    }

    /// Apply the wrapped block to the input, with an explicit dropout mode.
    pub fn forward_with_mode(
        &self,
        input: Tensor<B, 4>,
        mode: DropoutMode,
    ) -> Tensor<B, 4> {
        match self {
            Self::Basic(block) => block.forward_with_mode(input, mode),
            Self::Bottleneck(block) => block.forward_with_mode(input, mode),
        }
    }

    /// Create a config from this module.
    pub fn to_config(&self) -> ResidualBlockConfig {
        match self {
            Self::Basic(block) => block.to_config().into(),
            Self::Bottleneck(block) => block.to_config().into(),
        }
    }
}
