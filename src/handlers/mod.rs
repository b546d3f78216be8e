//! HTTP handlers

pub mod health;
pub mod predict;
pub mod train;
pub mod model;

#[cfg(test)]
mod tests;
