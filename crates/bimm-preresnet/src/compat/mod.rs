//! # Compat
//!
//! Layer wrappers over ``burn::nn`` which are (or are planned to be)
//! provided upstream by ``burn``.

pub mod activation_wrapper;
pub mod normalization_wrapper;
