//! Basic numerical concepts used throughout the crate

#![allow(missing_docs)]

// Floating-point precision is configured here
#[cfg(feature = "f32")]
pub type Float = f32;
#[cfg(feature = "f32")]
pub use std::f32 as reals;
#[cfg(not(feature = "f32"))]
pub type Float = f64;
#[cfg(not(feature = "f32"))]
pub use std::f64 as reals;

/// Tolerance used when comparing floating-point results in tests
#[cfg(test)]
pub const TEST_EPSILON: Float = if cfg!(feature = "f32") { 1e-3 } else { 1e-9 };
