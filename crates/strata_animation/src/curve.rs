//! Timing curves and their solver
//!
//! A timing curve maps normalized elapsed time to normalized progress.
//! Two shapes are supported:
//!
//! - **Cubic Bézier** with fixed endpoints (0,0) and (1,1). The x control
//!   coordinates must lie in [0, 1] so x(t) is monotonic and invertible.
//! - **Spring**, see [`crate::spring`].
//!
//! # Example
//!
//! ```rust
//! use strata_animation::TimingCurve;
//!
//! let curve = TimingCurve::ease_in_ease_out();
//! let half = curve.solve_for_input(0.5).unwrap();
//! assert!((half - 0.5).abs() < 1e-6);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{AnimationError, Result};
use crate::spring::{SpringConfig, SpringCurve, DEFAULT_SPRING_EPSILON};

/// Convergence tolerance on x when inverting a cubic curve
const BEZIER_EPSILON: f64 = 1e-7;
const NEWTON_ITERATIONS: usize = 8;
const BISECTION_ITERATIONS: usize = 64;

/// Tagged union of supported timing curves
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TimingCurve {
    /// Cubic Bézier through (0,0), p1, p2, (1,1)
    CubicBezier { p1: (f64, f64), p2: (f64, f64) },
    /// Damped spring
    Spring(SpringCurve),
}

impl TimingCurve {
    pub fn cubic_bezier(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        TimingCurve::CubicBezier {
            p1: (x1, y1),
            p2: (x2, y2),
        }
    }

    pub fn spring(damping_ratio: f64, response: f64) -> Self {
        TimingCurve::Spring(SpringCurve::new(damping_ratio, response))
    }

    /// Spring curve from physical parameters
    pub fn from_spring_config(config: SpringConfig) -> Result<Self> {
        SpringCurve::from_config(config).map(TimingCurve::Spring)
    }

    pub fn linear() -> Self {
        Self::cubic_bezier(0.0, 0.0, 1.0, 1.0)
    }

    pub fn ease_in() -> Self {
        Self::cubic_bezier(0.42, 0.0, 1.0, 1.0)
    }

    pub fn ease_out() -> Self {
        Self::cubic_bezier(0.0, 0.0, 0.58, 1.0)
    }

    pub fn ease_in_ease_out() -> Self {
        Self::cubic_bezier(0.42, 0.0, 0.58, 1.0)
    }

    /// The platform's default curve for implicit animations
    pub fn standard() -> Self {
        Self::cubic_bezier(0.25, 0.1, 0.25, 1.0)
    }

    /// Check the curve parameters
    pub fn validate(&self) -> Result<()> {
        match self {
            TimingCurve::CubicBezier { p1, p2 } => {
                let all = [p1.0, p1.1, p2.0, p2.1];
                if all.iter().any(|c| !c.is_finite()) {
                    return Err(AnimationError::DegenerateCurve(format!(
                        "cubic-bezier control points must be finite, got {p1:?} {p2:?}"
                    )));
                }
                if !(0.0..=1.0).contains(&p1.0) || !(0.0..=1.0).contains(&p2.0) {
                    return Err(AnimationError::InvalidControlPoints { x1: p1.0, x2: p2.0 });
                }
                Ok(())
            }
            TimingCurve::Spring(spring) => spring.validate(),
        }
    }

    /// Eased progress for normalized `input`
    ///
    /// Cubic curves clamp `input` to [0, 1] and hit both endpoints exactly.
    /// Springs are evaluated at `input` times their settling duration and
    /// may overshoot 1.
    pub fn solve_for_input(&self, input: f64) -> Result<f64> {
        if !input.is_finite() {
            return Err(AnimationError::InvalidInput(input));
        }
        match self {
            TimingCurve::CubicBezier { p1, p2 } => {
                self.validate()?;
                Ok(CubicBezier::new(*p1, *p2).solve(input))
            }
            TimingCurve::Spring(spring) => spring.solve(input),
        }
    }

    /// Duration after which the curve stays within `epsilon` of its end
    ///
    /// Springs answer in seconds. Cubic curves reach their end exactly at
    /// normalized time 1.
    pub fn settling_duration(&self, epsilon: f64) -> Result<f64> {
        match self {
            TimingCurve::CubicBezier { .. } => {
                self.validate()?;
                if !epsilon.is_finite() || epsilon <= 0.0 {
                    return Err(AnimationError::InvalidEpsilon(epsilon));
                }
                Ok(1.0)
            }
            TimingCurve::Spring(spring) => spring.settling_duration(epsilon),
        }
    }

    /// Natural duration for an animation driven by this curve, if it has one
    pub fn natural_duration(&self) -> Option<f64> {
        match self {
            TimingCurve::CubicBezier { .. } => None,
            TimingCurve::Spring(spring) => spring.settling_duration(DEFAULT_SPRING_EPSILON).ok(),
        }
    }
}

impl Default for TimingCurve {
    fn default() -> Self {
        Self::standard()
    }
}

/// Polynomial form of a cubic timing curve
#[derive(Clone, Copy, Debug)]
struct CubicBezier {
    ax: f64,
    bx: f64,
    cx: f64,
    ay: f64,
    by: f64,
    cy: f64,
}

impl CubicBezier {
    fn new(p1: (f64, f64), p2: (f64, f64)) -> Self {
        let cx = 3.0 * p1.0;
        let bx = 3.0 * (p2.0 - p1.0) - cx;
        let ax = 1.0 - cx - bx;
        let cy = 3.0 * p1.1;
        let by = 3.0 * (p2.1 - p1.1) - cy;
        let ay = 1.0 - cy - by;
        Self {
            ax,
            bx,
            cx,
            ay,
            by,
            cy,
        }
    }

    fn x(&self, t: f64) -> f64 {
        ((self.ax * t + self.bx) * t + self.cx) * t
    }

    fn y(&self, t: f64) -> f64 {
        ((self.ay * t + self.by) * t + self.cy) * t
    }

    fn dx(&self, t: f64) -> f64 {
        (3.0 * self.ax * t + 2.0 * self.bx) * t + self.cx
    }

    /// Parameter t with x(t) == x, by Newton iteration with a bisection fallback
    fn parameter_for(&self, x: f64) -> f64 {
        let mut t = x;
        for _ in 0..NEWTON_ITERATIONS {
            let error = self.x(t) - x;
            if error.abs() < BEZIER_EPSILON {
                return t;
            }
            let slope = self.dx(t);
            if slope.abs() < 1e-6 {
                break;
            }
            t -= error / slope;
        }

        let mut lo = 0.0;
        let mut hi = 1.0;
        t = x;
        for _ in 0..BISECTION_ITERATIONS {
            let value = self.x(t);
            if (value - x).abs() < BEZIER_EPSILON {
                break;
            }
            if value < x {
                lo = t;
            } else {
                hi = t;
            }
            t = 0.5 * (lo + hi);
        }
        t
    }

    fn solve(&self, input: f64) -> f64 {
        if input <= 0.0 {
            return 0.0;
        }
        if input >= 1.0 {
            return 1.0;
        }
        self.y(self.parameter_for(input))
    }
}
