//! Animation retargeting
//!
//! Mirrors a reference animation's timing onto a dependent node so the
//! dependent stays visually locked to a host while the host animates.
//!
//! - An **additive** reference yields additive animations from
//!   `old - new` to zero under fresh, suffixed names. Repeated calls stack.
//! - An **absolute** reference yields absolute animations from the
//!   dependent's rendered value (or `old`) to `new` under canonical names.
//!   A later call replaces an earlier one still in flight.

use std::cell::Cell;
use std::rc::Rc;

use smallvec::SmallVec;
use strata_core::{Diagnostic, Diagnostics, Rect};

use crate::descriptor::{AnimatedValue, AnimationDescriptor, AnimationKey, NodeAnimation, ValueKind};
use crate::error::Result;
use crate::node::AnimatableNode;

/// Canonical names of animations synthesized on dependents
pub const RETARGET_POSITION_KEY: &str = "strata.retarget.position";
pub const RETARGET_EXTENT_KEY: &str = "strata.retarget.extent";

/// One synthesized animation, ready to add under `name`
#[derive(Clone, Debug, PartialEq)]
pub struct RetargetedAnimation {
    pub name: String,
    pub animation: AnimationDescriptor,
}

/// Synthesizes dependent-node animations from a reference animation
///
/// Clones share the suffix counter, so names stay unique across them.
#[derive(Clone, Debug, Default)]
pub struct AnimationRetargeter {
    diagnostics: Diagnostics,
    serial: Rc<Cell<u64>>,
}

impl AnimationRetargeter {
    pub fn new(diagnostics: Diagnostics) -> Self {
        Self {
            diagnostics,
            serial: Rc::new(Cell::new(0)),
        }
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Animations moving `dependent` from frame `old` to frame `new`
    ///
    /// Always a position animation followed by an extent animation. Returns
    /// nothing, after reporting a diagnostic, when `reference` is not a
    /// property animation.
    pub fn retarget(
        &self,
        name: &str,
        reference: &NodeAnimation,
        dependent: &dyn AnimatableNode,
        old: Rect,
        new: Rect,
    ) -> SmallVec<[RetargetedAnimation; 2]> {
        let NodeAnimation::Property(reference) = reference else {
            self.diagnostics.report(Diagnostic::UnretargetableReference {
                node: dependent.id(),
                name: name.to_string(),
                description: reference.describe(),
            });
            return SmallVec::new();
        };

        let built = if reference.is_additive() {
            self.additive(reference, dependent, old, new)
        } else {
            self.absolute(reference, dependent, old, new)
        };

        match built {
            Ok(animations) => animations,
            Err(err) => {
                self.diagnostics.report(Diagnostic::UnretargetableReference {
                    node: dependent.id(),
                    name: name.to_string(),
                    description: err.to_string(),
                });
                SmallVec::new()
            }
        }
    }

    /// Retarget and add the result to `dependent`
    ///
    /// Returns the number of animations added.
    pub fn apply(
        &self,
        name: &str,
        reference: &NodeAnimation,
        dependent: &mut dyn AnimatableNode,
        old: Rect,
        new: Rect,
    ) -> usize {
        let animations = self.retarget(name, reference, &*dependent, old, new);
        for retargeted in &animations {
            dependent.add_animation(&retargeted.name, retargeted.animation.clone().into());
        }
        tracing::trace!(
            node = %dependent.id(),
            reference = name,
            added = animations.len(),
            "retargeted animation onto dependent"
        );
        animations.len()
    }

    fn additive(
        &self,
        reference: &AnimationDescriptor,
        dependent: &dyn AnimatableNode,
        old: Rect,
        new: Rect,
    ) -> Result<SmallVec<[RetargetedAnimation; 2]>> {
        let anchor = dependent.anchor_point();
        let position_delta = old.anchor_position(anchor) - new.anchor_position(anchor);
        let extent_delta = old.size - new.size;

        let position = mirror(reference, AnimationKey::Position)
            .with_from(AnimatedValue::Point(position_delta))?
            .with_to(AnimatedValue::zero(ValueKind::Point))?;
        let extent = mirror(reference, AnimationKey::ExtentSize)
            .with_from(AnimatedValue::Size(extent_delta))?
            .with_to(AnimatedValue::zero(ValueKind::Size))?;

        Ok(SmallVec::from_buf([
            RetargetedAnimation {
                name: self.unique_name(dependent, RETARGET_POSITION_KEY),
                animation: position,
            },
            RetargetedAnimation {
                name: self.unique_name(dependent, RETARGET_EXTENT_KEY),
                animation: extent,
            },
        ]))
    }

    fn absolute(
        &self,
        reference: &AnimationDescriptor,
        dependent: &dyn AnimatableNode,
        old: Rect,
        new: Rect,
    ) -> Result<SmallVec<[RetargetedAnimation; 2]>> {
        let anchor = dependent.anchor_point();
        let current = dependent.presentation_frame().unwrap_or(old);

        let position = mirror(reference, AnimationKey::Position)
            .with_from(AnimatedValue::Point(current.anchor_position(anchor)))?
            .with_to(AnimatedValue::Point(new.anchor_position(anchor)))?;
        let extent = mirror(reference, AnimationKey::ExtentSize)
            .with_from(AnimatedValue::Size(current.size))?
            .with_to(AnimatedValue::Size(new.size))?;

        Ok(SmallVec::from_buf([
            RetargetedAnimation {
                name: RETARGET_POSITION_KEY.to_string(),
                animation: position,
            },
            RetargetedAnimation {
                name: RETARGET_EXTENT_KEY.to_string(),
                animation: extent,
            },
        ]))
    }

    /// `base.N`, skipping names already present on the node
    fn unique_name(&self, dependent: &dyn AnimatableNode, base: &str) -> String {
        loop {
            let serial = self.serial.get();
            self.serial.set(serial + 1);
            let name = format!("{base}.{serial}");
            if dependent.animation(&name).is_none() {
                return name;
            }
        }
    }
}

/// Descriptor on `key` with the reference's timing and additivity
fn mirror(reference: &AnimationDescriptor, key: AnimationKey) -> AnimationDescriptor {
    AnimationDescriptor::new(key, *reference.curve(), reference.duration())
        .begin_at(reference.begin_time())
        .additive(reference.is_additive())
}
