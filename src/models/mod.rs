//! Request/response models

pub mod prediction;
pub mod training;

pub use prediction::*;
pub use training::*;
