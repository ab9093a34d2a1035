//! # Probability Utilities

/// Check that a value is a probability.
///
/// # Arguments
///
/// - `prob`: the value to check.
///
/// # Returns
///
/// `Ok(prob)` if `0.0 <= prob <= 1.0`; an error message otherwise.
pub fn try_probability(prob: f64) -> Result<f64, String> {
    if (0.0..=1.0).contains(&prob) {
        Ok(prob)
    } else {
        Err(format!("Probability must be in [0, 1]: {prob}"))
    }
}

/// Expect that a value is a probability.
///
/// # Panics
///
/// If `prob` is not in ``[0, 1]``.
pub fn expect_probability(prob: f64) -> f64 {
    match try_probability(prob) {
        Ok(prob) => prob,
        Err(err) => panic!("{}", err),
    }
}
