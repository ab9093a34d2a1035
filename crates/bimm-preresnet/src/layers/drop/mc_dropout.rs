//! # Monte-Carlo Dropout
//!
//! [`McDropout`] is elementwise dropout whose activity is selected
//! per call by a [`DropoutMode`], rather than by the backend.
//!
//! ``burn::nn::Dropout`` is only active on autodiff backends;
//! Monte-Carlo sampling needs the stochastic mask at inference time too.

use crate::utility::probability::{expect_probability, try_probability};
use burn::prelude::{Backend, Config, Module, Tensor};
use burn::tensor::Distribution;
use serde::{Deserialize, Serialize};

/// When dropout should be applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DropoutMode {
    /// Parameter-fitting pass; dropout is active.
    Train,

    /// Deterministic inference; dropout is a no-op.
    #[default]
    Eval,

    /// Stochastic inference for uncertainty estimates; dropout is active.
    MonteCarlo,
}

impl DropoutMode {
    /// Is the dropout mask applied in this mode?
    pub fn is_active(&self) -> bool {
        match self {
            DropoutMode::Train | DropoutMode::MonteCarlo => true,
            DropoutMode::Eval => false,
        }
    }

    /// The mode implied by the backend.
    ///
    /// Follows the ``burn`` convention: autodiff backends train,
    /// and inner (``.valid()``) backends evaluate.
    pub fn from_backend<B: Backend>() -> Self {
        if B::ad_enabled() {
            DropoutMode::Train
        } else {
            DropoutMode::Eval
        }
    }
}

/// [`McDropout`] Config.
#[derive(Config, Debug)]
pub struct McDropoutConfig {
    /// The probability of zeroing an element.
    #[config(default = "0.3")]
    pub prob: f64,
}

impl McDropoutConfig {
    /// Check if the config is valid.
    pub fn try_validate(&self) -> Result<(), String> {
        try_probability(self.prob).map(|_| ())
    }

    /// Initialize a [`McDropout`].
    ///
    /// # Panics
    ///
    /// If `prob` is not in ``[0, 1]``.
    pub fn init(&self) -> McDropout {
        McDropout {
            prob: expect_probability(self.prob),
        }
    }
}

/// Elementwise dropout with an explicit [`DropoutMode`].
///
/// When active, each element is zeroed with probability `prob`,
/// and the survivors are scaled by ``1 / (1 - prob)``.
#[derive(Module, Clone, Debug)]
pub struct McDropout {
    /// The probability of zeroing an element.
    pub prob: f64,
}

impl McDropout {
    /// Forward pass.
    ///
    /// # Arguments
    ///
    /// - `input`: a tensor of any shape.
    /// - `mode`: selects whether the mask is applied.
    ///
    /// # Returns
    ///
    /// A tensor of the same shape.
    pub fn forward<B: Backend, const D: usize>(
        &self,
        input: Tensor<B, D>,
        mode: DropoutMode,
    ) -> Tensor<B, D> {
        if !mode.is_active() || self.prob == 0.0 {
            return input;
        }
        if self.prob >= 1.0 {
            return input.zeros_like();
        }

        let keep_prob = 1.0 - self.prob;
        let mask = input.random_like(Distribution::Bernoulli(keep_prob));

        input * mask / keep_prob
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};
    use hamcrest::prelude::*;

    #[test]
    fn test_mode() {
        assert_eq!(DropoutMode::default(), DropoutMode::Eval);
        assert!(DropoutMode::Train.is_active());
        assert!(DropoutMode::MonteCarlo.is_active());
        assert!(!DropoutMode::Eval.is_active());

        assert_eq!(DropoutMode::from_backend::<NdArray<f32>>(), DropoutMode::Eval);
        assert_eq!(
            DropoutMode::from_backend::<Autodiff<NdArray<f32>>>(),
            DropoutMode::Train
        );
    }

    #[test]
    fn test_config() {
        let config = McDropoutConfig::new();
        assert_eq!(config.prob, 0.3);
        assert!(config.try_validate().is_ok());
        assert_eq!(config.init().prob, 0.3);

        assert!(McDropoutConfig::new().with_prob(1.2).try_validate().is_err());
    }

    #[test]
    #[should_panic(expected = "Probability must be in [0, 1]")]
    fn test_config_panic() {
        McDropoutConfig::new().with_prob(-0.5).init();
    }

    #[test]
    fn test_eval_is_identity() {
        type B = NdArray<f32>;
        let device = Default::default();

        let layer = McDropoutConfig::new().with_prob(0.5).init();
        let input: Tensor<B, 4> = Tensor::random([2, 3, 4, 4], Distribution::Default, &device);

        let output = layer.forward(input.clone(), DropoutMode::Eval);
        output.to_data().assert_eq(&input.to_data(), true);
    }

    #[test]
    fn test_zero_prob_is_identity() {
        type B = NdArray<f32>;
        let device = Default::default();

        let layer = McDropoutConfig::new().with_prob(0.0).init();
        let input: Tensor<B, 4> = Tensor::random([2, 3, 4, 4], Distribution::Default, &device);

        let output = layer.forward(input.clone(), DropoutMode::MonteCarlo);
        output.to_data().assert_eq(&input.to_data(), true);
    }

    #[test]
    fn test_full_prob_is_zeros() {
        type B = NdArray<f32>;
        let device = Default::default();

        let layer = McDropoutConfig::new().with_prob(1.0).init();
        let input: Tensor<B, 2> = Tensor::ones([4, 8], &device);

        let output = layer.forward(input, DropoutMode::Train);
        let total: f32 = output.abs().sum().into_scalar();
        assert_that!(total, is(equal_to(0.0)));
    }

    #[test]
    fn test_active_mask_values() {
        type B = NdArray<f32>;
        let device = Default::default();

        let prob = 0.5;
        let layer = McDropoutConfig::new().with_prob(prob).init();
        let input: Tensor<B, 2> = Tensor::ones([64, 64], &device);

        let output = layer.forward(input, DropoutMode::MonteCarlo);
        let values = output.to_data().to_vec::<f32>().unwrap();

        let scale = (1.0 / (1.0 - prob)) as f32;
        let mut zeros = 0;
        for v in &values {
            if *v == 0.0 {
                zeros += 1;
            } else {
                assert_that!(*v, is(close_to(scale, 1e-6)));
            }
        }

        // 4096 draws at p=0.5; far outside any plausible deviation.
        let frac = zeros as f64 / values.len() as f64;
        assert_that!(frac, is(close_to(prob, 0.1)));
    }
}
