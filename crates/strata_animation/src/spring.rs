//! Spring timing curves
//!
//! A spring curve is the unit-step response of a damped harmonic oscillator
//! released from 0 with no initial velocity and resting at 1. It is
//! described by a damping ratio and a response (the undamped period, in
//! seconds), and evaluated in closed form so results are reproducible
//! without any platform solver.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::error::{AnimationError, Result};

/// Tolerance used when a spring curve is solved for normalized input
pub const DEFAULT_SPRING_EPSILON: f64 = 0.005;

/// Ratios this close to 1 are treated as critically damped
const CRITICAL_TOLERANCE: f64 = 1e-9;

/// Upper bound on the number of excursions searched before giving up
const MAX_PEAKS: f64 = 1.0e7;

/// Physical spring parameters (unit-less stiffness, damping and mass)
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpringConfig {
    pub stiffness: f32,
    pub damping: f32,
    pub mass: f32,
}

impl SpringConfig {
    /// Create a new spring configuration
    pub fn new(stiffness: f32, damping: f32, mass: f32) -> Self {
        Self {
            stiffness,
            damping,
            mass,
        }
    }

    /// A gentle, slow spring (good for page transitions)
    pub fn gentle() -> Self {
        Self::new(120.0, 14.0, 1.0)
    }

    /// A wobbly spring with overshoot
    pub fn wobbly() -> Self {
        Self::new(180.0, 12.0, 1.0)
    }

    /// A stiff, snappy spring
    pub fn stiff() -> Self {
        Self::new(400.0, 30.0, 1.0)
    }

    /// A very stiff spring with minimal oscillation
    pub fn snappy() -> Self {
        Self::new(600.0, 40.0, 1.0)
    }

    /// A slow spring with no overshoot (critically damped)
    pub fn molasses() -> Self {
        Self::new(100.0, 20.0, 1.0)
    }

    /// Calculate critical damping for this spring's stiffness and mass
    pub fn critical_damping(&self) -> f32 {
        2.0 * (self.stiffness * self.mass).sqrt()
    }

    /// Check if the spring is underdamped (will oscillate)
    pub fn is_underdamped(&self) -> bool {
        self.damping < self.critical_damping()
    }

    /// Check if the spring is critically damped (no oscillation, fastest settling)
    pub fn is_critically_damped(&self) -> bool {
        (self.damping - self.critical_damping()).abs() < 0.01
    }

    /// Check if the spring is overdamped (slow settling, no oscillation)
    pub fn is_overdamped(&self) -> bool {
        self.damping > self.critical_damping()
    }
}

impl Default for SpringConfig {
    fn default() -> Self {
        Self::stiff()
    }
}

/// Spring curve described by damping ratio and response
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpringCurve {
    pub damping_ratio: f64,
    /// Undamped period in seconds
    pub response: f64,
}

impl SpringCurve {
    pub fn new(damping_ratio: f64, response: f64) -> Self {
        Self {
            damping_ratio,
            response,
        }
    }

    /// Critically damped spring with the given response
    pub fn critical(response: f64) -> Self {
        Self::new(1.0, response)
    }

    /// Convert physical parameters into ratio/response form
    pub fn from_config(config: SpringConfig) -> Result<Self> {
        let stiffness = f64::from(config.stiffness);
        let damping = f64::from(config.damping);
        let mass = f64::from(config.mass);
        if !(stiffness > 0.0 && mass > 0.0) || !damping.is_finite() || damping < 0.0 {
            return Err(AnimationError::DegenerateCurve(format!(
                "spring needs positive stiffness and mass and non-negative damping, got {config:?}"
            )));
        }

        let omega = (stiffness / mass).sqrt();
        Ok(Self {
            damping_ratio: damping / (2.0 * (stiffness * mass).sqrt()),
            response: 2.0 * PI / omega,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if !self.response.is_finite() || self.response <= 0.0 {
            return Err(AnimationError::DegenerateCurve(format!(
                "spring response must be positive, got {}",
                self.response
            )));
        }
        if !self.damping_ratio.is_finite() || self.damping_ratio < 0.0 {
            return Err(AnimationError::DegenerateCurve(format!(
                "spring damping ratio must be non-negative, got {}",
                self.damping_ratio
            )));
        }
        Ok(())
    }

    fn natural_frequency(&self) -> f64 {
        2.0 * PI / self.response
    }

    fn is_critical(&self) -> bool {
        (self.damping_ratio - 1.0).abs() <= CRITICAL_TOLERANCE
    }

    /// Whether the curve overshoots its resting value
    pub fn is_oscillatory(&self) -> bool {
        self.damping_ratio < 1.0 - CRITICAL_TOLERANCE
    }

    /// Position at `t` seconds, travelling from 0 to a rest at 1
    ///
    /// Parameters are assumed valid; see [`SpringCurve::validate`].
    pub fn value_at(&self, t: f64) -> f64 {
        if t <= 0.0 {
            return 0.0;
        }
        let omega = self.natural_frequency();
        let zeta = self.damping_ratio;

        if self.is_critical() {
            1.0 - (-omega * t).exp() * (1.0 + omega * t)
        } else if zeta < 1.0 {
            let damped = omega * (1.0 - zeta * zeta).sqrt();
            let decay = (-zeta * omega * t).exp();
            1.0 - decay * ((damped * t).cos() + (zeta * omega / damped) * (damped * t).sin())
        } else {
            let (r1, r2) = self.overdamped_roots();
            1.0 - (r2 * (r1 * t).exp() - r1 * (r2 * t).exp()) / (r2 - r1)
        }
    }

    /// Slow and fast decay rates of an overdamped spring
    ///
    /// The slow root is the cancellation-free form
    /// `-omega / (zeta + sqrt(zeta^2 - 1))`.
    fn overdamped_roots(&self) -> (f64, f64) {
        let omega = self.natural_frequency();
        let zeta = self.damping_ratio;
        let spread = zeta * (1.0 - (1.0 / zeta).powi(2)).sqrt();
        let sum = zeta + spread;
        (-omega / sum, -omega * sum)
    }

    fn displacement(&self, t: f64) -> f64 {
        (1.0 - self.value_at(t)).abs()
    }

    /// Time after which the displacement from rest stays within `epsilon`
    ///
    /// Non-increasing in `epsilon`. Fails for degenerate parameters, a
    /// non-positive epsilon, or an undamped spring.
    pub fn settling_duration(&self, epsilon: f64) -> Result<f64> {
        self.validate()?;
        if !epsilon.is_finite() || epsilon <= 0.0 {
            return Err(AnimationError::InvalidEpsilon(epsilon));
        }
        if epsilon >= 1.0 {
            // |1 - x(t)| never exceeds its initial value of 1
            return Ok(0.0);
        }
        if self.damping_ratio == 0.0 {
            return Err(AnimationError::NeverSettles {
                damping_ratio: self.damping_ratio,
            });
        }

        if self.is_oscillatory() {
            self.oscillatory_settling(epsilon)
        } else {
            self.monotonic_settling(epsilon)
        }
    }

    fn monotonic_settling(&self, epsilon: f64) -> Result<f64> {
        let degenerate = || {
            AnimationError::DegenerateCurve(format!(
                "spring with damping ratio {} settles too slowly to resolve",
                self.damping_ratio
            ))
        };
        if !self.is_critical() {
            let (r1, r2) = self.overdamped_roots();
            if r1 == 0.0 || !r1.is_finite() || !r2.is_finite() {
                return Err(degenerate());
            }
        }

        let mut lo = 0.0;
        let mut hi = self.response;
        loop {
            let displacement = self.displacement(hi);
            if !displacement.is_finite() || !hi.is_finite() {
                return Err(degenerate());
            }
            if displacement <= epsilon {
                break;
            }
            lo = hi;
            hi *= 2.0;
        }
        Ok(self.bisect(lo, hi, epsilon))
    }

    fn oscillatory_settling(&self, epsilon: f64) -> Result<f64> {
        let omega = self.natural_frequency();
        let zeta = self.damping_ratio;
        let damped = omega * (1.0 - zeta * zeta).sqrt();
        let half_period = PI / damped;

        // Extremes of the displacement sit at t_n = n * PI / damped with
        // magnitude e^(-zeta * omega * t_n), strictly decreasing in n.
        let peaks = (1.0 / epsilon).ln() * damped / (zeta * omega * PI);
        if !peaks.is_finite() || peaks > MAX_PEAKS {
            return Err(AnimationError::DegenerateCurve(format!(
                "spring with damping ratio {zeta} settles too slowly to resolve"
            )));
        }

        let mut last = (peaks.ceil() as u64).saturating_sub(1);
        while self.displacement((last + 1) as f64 * half_period) > epsilon {
            last += 1;
        }

        // Between the last excursion and the next (in-tolerance) one the
        // displacement crosses epsilon exactly once.
        let lo = last as f64 * half_period;
        Ok(self.bisect(lo, lo + half_period, epsilon))
    }

    /// Crossing in `[lo, hi]` where displacement drops to `epsilon`
    fn bisect(&self, mut lo: f64, mut hi: f64, epsilon: f64) -> f64 {
        for _ in 0..64 {
            let mid = 0.5 * (lo + hi);
            if self.displacement(mid) > epsilon {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        hi
    }

    /// Eased output at normalized `input`, over the settling duration
    pub fn solve(&self, input: f64) -> Result<f64> {
        if !input.is_finite() {
            return Err(AnimationError::InvalidInput(input));
        }
        let duration = self.settling_duration(DEFAULT_SPRING_EPSILON)?;
        let value = self.value_at(input * duration);
        if !value.is_finite() {
            return Err(AnimationError::DegenerateCurve(format!(
                "spring with damping ratio {} produced {value}",
                self.damping_ratio
            )));
        }
        Ok(value)
    }
}
