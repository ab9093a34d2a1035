//! # Model Components

pub mod preresnet;
