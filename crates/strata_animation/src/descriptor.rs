//! In-flight animation model
//!
//! An [`AnimationDescriptor`] is an immutable snapshot of one property
//! animation running on a node: which geometric component it drives, its
//! timing, its endpoints and whether it is additive. Node adapters hand
//! animations to the sampler as a closed [`NodeAnimation`] variant, so the
//! sampler never inspects concrete animation types itself.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strata_core::{Point, Rect, Size};

use crate::curve::TimingCurve;
use crate::error::{AnimationError, Result};

// =============================================================================
// Keys
// =============================================================================

/// Geometric key paths the sampler tracks
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnimationKey {
    Position,
    PositionX,
    PositionY,
    Extent,
    ExtentSize,
    ExtentWidth,
    ExtentHeight,
}

/// Shape of the value a key accepts
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueKind {
    Scalar,
    Point,
    Size,
    Rect,
}

impl ValueKind {
    pub fn name(self) -> &'static str {
        match self {
            ValueKind::Scalar => "scalar",
            ValueKind::Point => "point",
            ValueKind::Size => "size",
            ValueKind::Rect => "rect",
        }
    }
}

impl AnimationKey {
    pub const ALL: [AnimationKey; 7] = [
        AnimationKey::Position,
        AnimationKey::PositionX,
        AnimationKey::PositionY,
        AnimationKey::Extent,
        AnimationKey::ExtentSize,
        AnimationKey::ExtentWidth,
        AnimationKey::ExtentHeight,
    ];

    pub fn key_path(self) -> &'static str {
        match self {
            AnimationKey::Position => "position",
            AnimationKey::PositionX => "position.x",
            AnimationKey::PositionY => "position.y",
            AnimationKey::Extent => "extent",
            AnimationKey::ExtentSize => "extent.size",
            AnimationKey::ExtentWidth => "extent.size.width",
            AnimationKey::ExtentHeight => "extent.size.height",
        }
    }

    /// The one value shape valid for this key
    pub fn value_kind(self) -> ValueKind {
        match self {
            AnimationKey::Position => ValueKind::Point,
            AnimationKey::PositionX | AnimationKey::PositionY => ValueKind::Scalar,
            AnimationKey::Extent => ValueKind::Rect,
            AnimationKey::ExtentSize => ValueKind::Size,
            AnimationKey::ExtentWidth | AnimationKey::ExtentHeight => ValueKind::Scalar,
        }
    }

    pub fn is_position(self) -> bool {
        matches!(
            self,
            AnimationKey::Position | AnimationKey::PositionX | AnimationKey::PositionY
        )
    }

    pub fn is_extent(self) -> bool {
        !self.is_position()
    }
}

impl fmt::Display for AnimationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key_path())
    }
}

impl FromStr for AnimationKey {
    type Err = AnimationError;

    fn from_str(s: &str) -> Result<Self> {
        AnimationKey::ALL
            .into_iter()
            .find(|key| key.key_path() == s)
            .ok_or_else(|| AnimationError::UnknownKeyPath(s.to_string()))
    }
}

// =============================================================================
// Values
// =============================================================================

/// Endpoint value of a property animation
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum AnimatedValue {
    Scalar(f32),
    Point(Point),
    Size(Size),
    Rect(Rect),
}

impl AnimatedValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            AnimatedValue::Scalar(_) => ValueKind::Scalar,
            AnimatedValue::Point(_) => ValueKind::Point,
            AnimatedValue::Size(_) => ValueKind::Size,
            AnimatedValue::Rect(_) => ValueKind::Rect,
        }
    }

    /// The additive identity of the given shape
    pub fn zero(kind: ValueKind) -> Self {
        match kind {
            ValueKind::Scalar => AnimatedValue::Scalar(0.0),
            ValueKind::Point => AnimatedValue::Point(Point::ZERO),
            ValueKind::Size => AnimatedValue::Size(Size::ZERO),
            ValueKind::Rect => AnimatedValue::Rect(Rect::ZERO),
        }
    }
}

/// When an animation started, relative to the running clock
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum BeginTime {
    /// Added but not yet attached to the clock
    Pending,
    /// Absolute clock time in seconds
    Attached(f64),
}

impl BeginTime {
    pub fn is_pending(&self) -> bool {
        matches!(self, BeginTime::Pending)
    }

    pub fn attached(&self) -> Option<f64> {
        match self {
            BeginTime::Pending => None,
            BeginTime::Attached(t) => Some(*t),
        }
    }
}

// =============================================================================
// Descriptor
// =============================================================================

/// Snapshot of one in-flight property animation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnimationDescriptor {
    key: AnimationKey,
    curve: TimingCurve,
    begin_time: BeginTime,
    /// Seconds
    duration: f64,
    from: Option<AnimatedValue>,
    to: Option<AnimatedValue>,
    additive: bool,
}

impl AnimationDescriptor {
    /// Absolute, pending animation without explicit endpoints
    pub fn new(key: AnimationKey, curve: TimingCurve, duration: f64) -> Self {
        Self {
            key,
            curve,
            begin_time: BeginTime::Pending,
            duration,
            from: None,
            to: None,
            additive: false,
        }
    }

    fn check(&self, value: &AnimatedValue) -> Result<()> {
        let expected = self.key.value_kind();
        if value.kind() != expected {
            return Err(AnimationError::ValueMismatch {
                key: self.key,
                expected: expected.name(),
                found: value.kind().name(),
            });
        }
        Ok(())
    }

    /// Set the start value; fails if its shape does not match the key
    pub fn with_from(mut self, value: AnimatedValue) -> Result<Self> {
        self.check(&value)?;
        self.from = Some(value);
        Ok(self)
    }

    /// Set the end value; fails if its shape does not match the key
    pub fn with_to(mut self, value: AnimatedValue) -> Result<Self> {
        self.check(&value)?;
        self.to = Some(value);
        Ok(self)
    }

    pub fn additive(mut self, additive: bool) -> Self {
        self.additive = additive;
        self
    }

    pub fn begin_at(mut self, begin_time: BeginTime) -> Self {
        self.begin_time = begin_time;
        self
    }

    pub fn with_curve(mut self, curve: TimingCurve) -> Self {
        self.curve = curve;
        self
    }

    pub fn with_duration(mut self, duration: f64) -> Self {
        self.duration = duration;
        self
    }

    pub fn key(&self) -> AnimationKey {
        self.key
    }

    pub fn curve(&self) -> &TimingCurve {
        &self.curve
    }

    pub fn begin_time(&self) -> BeginTime {
        self.begin_time
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn from_value(&self) -> Option<AnimatedValue> {
        self.from
    }

    pub fn to_value(&self) -> Option<AnimatedValue> {
        self.to
    }

    pub fn is_additive(&self) -> bool {
        self.additive
    }

    /// Attach a pending animation to the clock at `now`
    pub fn attach(&mut self, now: f64) {
        if self.begin_time.is_pending() {
            self.begin_time = BeginTime::Attached(now);
        }
    }

    /// Normalized elapsed time at `now`, shifted forward by `lead` seconds
    ///
    /// `None` while the animation is pending. Clamped to [0, 1]; a
    /// non-positive duration counts as complete.
    pub fn elapsed_fraction(&self, now: f64, lead: f64) -> Option<f64> {
        let begin = self.begin_time.attached()?;
        if self.duration <= 0.0 {
            return Some(1.0);
        }
        Some(((now - begin + lead) / self.duration).clamp(0.0, 1.0))
    }

    /// Clock time at which the animation completes, if attached
    pub fn end_time(&self) -> Option<f64> {
        self.begin_time.attached().map(|begin| begin + self.duration.max(0.0))
    }
}

/// An animation as reported by a node adapter
#[derive(Clone, Debug, PartialEq)]
pub enum NodeAnimation {
    /// A property animation on one of the tracked geometric keys
    Property(AnimationDescriptor),
    /// A transition; it keeps the node animating but drives no geometry
    Transition { begin_time: BeginTime, duration: f64 },
    /// Anything the adapter could not classify
    Opaque { description: String },
}

impl NodeAnimation {
    pub fn duration(&self) -> Option<f64> {
        match self {
            NodeAnimation::Property(descriptor) => Some(descriptor.duration()),
            NodeAnimation::Transition { duration, .. } => Some(*duration),
            NodeAnimation::Opaque { .. } => None,
        }
    }

    pub fn as_property(&self) -> Option<&AnimationDescriptor> {
        match self {
            NodeAnimation::Property(descriptor) => Some(descriptor),
            _ => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        match self {
            NodeAnimation::Property(descriptor) => descriptor.begin_time().is_pending(),
            NodeAnimation::Transition { begin_time, .. } => begin_time.is_pending(),
            NodeAnimation::Opaque { .. } => false,
        }
    }

    pub fn attach(&mut self, now: f64) {
        match self {
            NodeAnimation::Property(descriptor) => descriptor.attach(now),
            NodeAnimation::Transition { begin_time, .. } => {
                if begin_time.is_pending() {
                    *begin_time = BeginTime::Attached(now);
                }
            }
            NodeAnimation::Opaque { .. } => {}
        }
    }

    /// Whether the animation has run to completion at `now`
    pub fn is_finished(&self, now: f64) -> bool {
        match self {
            NodeAnimation::Property(descriptor) => {
                descriptor.end_time().is_some_and(|end| now >= end)
            }
            NodeAnimation::Transition {
                begin_time,
                duration,
            } => begin_time
                .attached()
                .is_some_and(|begin| now >= begin + duration.max(0.0)),
            NodeAnimation::Opaque { .. } => false,
        }
    }

    /// Short human description for diagnostics
    pub fn describe(&self) -> String {
        match self {
            NodeAnimation::Property(descriptor) => format!(
                "{} animation on `{}`",
                if descriptor.is_additive() {
                    "additive"
                } else {
                    "absolute"
                },
                descriptor.key()
            ),
            NodeAnimation::Transition { duration, .. } => format!("transition ({duration}s)"),
            NodeAnimation::Opaque { description } => description.clone(),
        }
    }
}

impl From<AnimationDescriptor> for NodeAnimation {
    fn from(descriptor: AnimationDescriptor) -> Self {
        NodeAnimation::Property(descriptor)
    }
}
