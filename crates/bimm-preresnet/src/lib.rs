#![warn(missing_docs)]
//!# bimm-preresnet - Pre-Activation `ResNet` Blocks
//!
//! ## Notable Components
//!
//! * [`compat`] - compat code, ported or planned for an upcoming release of ``burn``.
//!   * [`compat::activation_wrapper::Activation`] - activation layer abstraction wrapper.
//!   * [`compat::normalization_wrapper::Normalization`] - norm layer abstraction wrapper.
//! * [`layers`] - reusable neural network modules.
//!   * [`layers::factory`] - ``conv1x1`` / ``conv3x3`` config constructors.
//!   * [`layers::blocks`] - miscellaneous blocks.
//!     * [`layers::blocks::nac`] - pre-activation ``Norm + Act + Conv2d`` block.
//!     * [`layers::blocks::conv_norm`] - ``Conv2d + Norm`` block.
//!   * [`layers::drop`] - dropout layers.
//!     * [`layers::drop::mc_dropout`] - Monte-Carlo dropout, with explicit mode.
//! * [`models`] - model components.
//!   * [`models::preresnet`] - pre-activation `ResNet` residual blocks.

/// Test-only macro import.
#[cfg(test)]
#[allow(unused_imports)]
#[macro_use]
extern crate hamcrest;

pub mod compat;
pub mod layers;
pub mod models;
pub mod utility;
