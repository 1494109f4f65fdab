//! Animation error types

use thiserror::Error;

use crate::descriptor::AnimationKey;

/// Errors raised by the curve solver and the animation model
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnimationError {
    /// Curve parameters make the curve meaningless (zero response, NaN, ...)
    #[error("degenerate timing curve: {0}")]
    DegenerateCurve(String),

    /// Cubic-Bézier x control points outside [0, 1] break monotonicity
    #[error("cubic-bezier control points x1={x1}, x2={x2} must lie in [0, 1]")]
    InvalidControlPoints { x1: f64, x2: f64 },

    /// An undamped spring oscillates forever
    #[error("spring with damping ratio {damping_ratio} never settles")]
    NeverSettles { damping_ratio: f64 },

    /// Settling tolerance must be positive and finite
    #[error("invalid settling epsilon: {0}")]
    InvalidEpsilon(f64),

    /// Solver input was NaN or infinite
    #[error("invalid solver input: {0}")]
    InvalidInput(f64),

    /// A value of the wrong shape was supplied for a key
    #[error("`{key}` expects a {expected} value, got {found}")]
    ValueMismatch {
        key: AnimationKey,
        expected: &'static str,
        found: &'static str,
    },

    /// A key path outside the tracked geometric set
    #[error("unknown key path `{0}`")]
    UnknownKeyPath(String),
}

/// Result type for animation operations
pub type Result<T> = std::result::Result<T, AnimationError>;
