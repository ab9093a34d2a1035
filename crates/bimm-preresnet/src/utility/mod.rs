//! # Utility Functions

pub mod probability;
