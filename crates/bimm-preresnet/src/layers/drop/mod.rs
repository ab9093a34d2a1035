//! # Dropout Layers

pub mod mc_dropout;
