//! Geometry tracking between nodes
//!
//! Convenience wiring on top of [`LiveFrameSampler`] and
//! [`AnimationRetargeter`] that keeps a dependent node (a mask, a tracking
//! overlay) locked to a host, including while the host animates.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use strata_core::{Diagnostic, NodeId, Rect, Subscription};

use crate::descriptor::NodeAnimation;
use crate::node::{AnimatableNode, SharedNode};
use crate::retarget::AnimationRetargeter;
use crate::sampler::{GeometryChange, LiveFrameSampler};

/// Callback told about every new host bounds
pub type BoundsCallback = Box<dyn FnMut(Rect)>;

/// Move `dependent` to frame `to`, animating from `from` like `reference`
///
/// Without a reference the dependent snaps. Returns the number of
/// animations added.
pub fn add_frame_animation(
    retargeter: &AnimationRetargeter,
    dependent: &SharedNode,
    from: Rect,
    to: Rect,
    reference: Option<(&str, &NodeAnimation)>,
) -> usize {
    let mut node = dependent.borrow_mut();
    node.set_frame(to);
    match reference {
        Some((name, animation)) => retargeter.apply(name, animation, &mut *node, from, to),
        None => 0,
    }
}

struct TrackingState {
    host: Weak<RefCell<dyn AnimatableNode>>,
    dependent: Weak<RefCell<dyn AnimatableNode>>,
    dependent_id: NodeId,
    retargeter: AnimationRetargeter,
    active: Cell<bool>,
}

/// Keeps a dependent's frame equal to a host's bounds
///
/// Tracking stops when the guard is cancelled or dropped.
pub struct FullSizeTracking {
    subscription: Subscription,
    state: Rc<TrackingState>,
}

impl FullSizeTracking {
    pub fn cancel(&self) {
        self.state.active.set(false);
        self.subscription.cancel();
    }

    pub fn is_active(&self) -> bool {
        self.state.active.get()
    }

    /// Snap the dependent to the host's current bounds
    ///
    /// Reports a diagnostic and does nothing once tracking was cancelled
    /// or either node is gone.
    pub fn resync(&self) -> bool {
        let state = &self.state;
        if !state.active.get() {
            state.retargeter.diagnostics().report(Diagnostic::MissingTracking {
                node: state.dependent_id,
            });
            return false;
        }

        let (Some(host), Some(dependent)) = (state.host.upgrade(), state.dependent.upgrade())
        else {
            state.retargeter.diagnostics().report(Diagnostic::NodeReleased {
                node: state.dependent_id,
            });
            return false;
        };

        let bounds = host.borrow().bounds();
        dependent.borrow_mut().set_frame(bounds);
        true
    }
}

impl fmt::Debug for FullSizeTracking {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FullSizeTracking")
            .field("dependent", &self.state.dependent_id)
            .field("active", &self.state.active.get())
            .finish()
    }
}

/// Keep `dependent`'s frame equal to `host`'s bounds
///
/// The dependent snaps to the host's bounds immediately. Every later bounds
/// change is mirrored on the turn after it happens, retargeting the host's
/// in-flight animation so both move together.
pub fn add_full_size_tracking(
    sampler: &LiveFrameSampler,
    retargeter: &AnimationRetargeter,
    host: &SharedNode,
    dependent: &SharedNode,
    mut on_bounds_change: Option<BoundsCallback>,
) -> FullSizeTracking {
    let bounds = host.borrow().bounds();
    let dependent_id = {
        let mut node = dependent.borrow_mut();
        node.set_frame(bounds);
        node.id()
    };

    let state = Rc::new(TrackingState {
        host: Rc::downgrade(host),
        dependent: Rc::downgrade(dependent),
        dependent_id,
        retargeter: retargeter.clone(),
        active: Cell::new(true),
    });

    let weak_state = Rc::downgrade(&state);
    let subscription = sampler.on_geometry_change(host, move |change: &GeometryChange| {
        if change.old.bounds == change.new.bounds {
            return;
        }
        let Some(state) = weak_state.upgrade() else {
            return;
        };
        let Some(dependent) = state.dependent.upgrade() else {
            state.retargeter.diagnostics().report(Diagnostic::NodeReleased {
                node: state.dependent_id,
            });
            return;
        };

        let reference = change
            .reference
            .as_ref()
            .map(|(name, animation)| (name.as_str(), animation));
        add_frame_animation(
            &state.retargeter,
            &dependent,
            change.old.bounds,
            change.new.bounds,
            reference,
        );
        if let Some(callback) = on_bounds_change.as_mut() {
            callback(change.new.bounds);
        }
    });

    tracing::debug!(host = %host.borrow().id(), dependent = %dependent_id, "full-size tracking installed");
    FullSizeTracking {
        subscription,
        state,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve::TimingCurve;
    use crate::descriptor::{AnimationDescriptor, AnimationKey, BeginTime};
    use crate::node::HeadlessNode;
    use crate::retarget::{RETARGET_EXTENT_KEY, RETARGET_POSITION_KEY};
    use crate::sampler::SamplerConfig;
    use strata_core::{Diagnostics, RecordingSink, RunLoop};

    struct Scene {
        run_loop: RunLoop,
        sampler: LiveFrameSampler,
        retargeter: AnimationRetargeter,
        sink: RecordingSink,
        host: Rc<RefCell<HeadlessNode>>,
        dependent: Rc<RefCell<HeadlessNode>>,
    }

    fn scene() -> Scene {
        let run_loop = RunLoop::new();
        let sink = RecordingSink::new();
        let diagnostics = Diagnostics::new(sink.clone());
        let sampler = LiveFrameSampler::with_config(
            run_loop.clone(),
            SamplerConfig::default().with_nominal_refresh_interval(0.0),
            diagnostics.clone(),
        );
        Scene {
            run_loop,
            sampler,
            retargeter: AnimationRetargeter::new(diagnostics),
            sink,
            host: HeadlessNode::shared(NodeId(1), Rect::new(40.0, 40.0, 100.0, 200.0)),
            dependent: HeadlessNode::shared(NodeId(2), Rect::ZERO),
        }
    }

    fn resize_reference(additive: bool) -> NodeAnimation {
        AnimationDescriptor::new(AnimationKey::Extent, TimingCurve::linear(), 0.6)
            .additive(additive)
            .begin_at(BeginTime::Attached(0.0))
            .into()
    }

    fn track(s: &Scene, on_bounds_change: Option<BoundsCallback>) -> FullSizeTracking {
        let host: SharedNode = s.host.clone();
        let dependent: SharedNode = s.dependent.clone();
        add_full_size_tracking(&s.sampler, &s.retargeter, &host, &dependent, on_bounds_change)
    }

    #[test]
    fn test_snap_without_reference() {
        let s = scene();
        let dependent: SharedNode = s.dependent.clone();
        let added = add_frame_animation(
            &s.retargeter,
            &dependent,
            Rect::ZERO,
            Rect::new(1.0, 2.0, 3.0, 4.0),
            None,
        );
        assert_eq!(added, 0);
        assert_eq!(dependent.borrow().frame(), Rect::new(1.0, 2.0, 3.0, 4.0));
        assert!(!dependent.borrow().has_animations());
    }

    #[test]
    fn test_tracks_host_bounds() {
        let s = scene();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&seen);
        let _tracking = track(&s, Some(Box::new(move |bounds| log.borrow_mut().push(bounds))));
        assert_eq!(s.dependent.borrow().frame(), Rect::new(0.0, 0.0, 100.0, 200.0));

        s.host
            .borrow_mut()
            .set_bounds(Rect::new(0.0, 0.0, 200.0, 300.0));
        s.host
            .borrow_mut()
            .add_animation("bounds", resize_reference(false));
        s.run_loop.run_turn();

        let dependent = s.dependent.borrow();
        assert_eq!(dependent.frame(), Rect::new(0.0, 0.0, 200.0, 300.0));
        assert!(dependent.animation(RETARGET_POSITION_KEY).is_some());
        assert!(dependent.animation(RETARGET_EXTENT_KEY).is_some());
        assert_eq!(*seen.borrow(), vec![Rect::new(0.0, 0.0, 200.0, 300.0)]);
    }

    #[test]
    fn test_position_only_change_is_ignored() {
        let s = scene();
        let _tracking = track(&s, None);

        s.host.borrow_mut().set_position(strata_core::Point::new(0.0, 0.0));
        s.run_loop.run_turn();
        assert!(!s.dependent.borrow().has_animations());
    }

    #[test]
    fn test_additive_host_animation_stacks() {
        let s = scene();
        let _tracking = track(&s, None);

        s.host
            .borrow_mut()
            .set_bounds(Rect::new(0.0, 0.0, 150.0, 200.0));
        s.host
            .borrow_mut()
            .add_animation("bounds.0", resize_reference(true));
        s.run_loop.run_turn();
        s.host
            .borrow_mut()
            .set_bounds(Rect::new(0.0, 0.0, 200.0, 200.0));
        s.host
            .borrow_mut()
            .add_animation("bounds.1", resize_reference(true));
        s.run_loop.run_turn();

        assert_eq!(s.dependent.borrow().animations().len(), 4);
    }

    #[test]
    fn test_dependent_live_frame_follows_host() {
        let s = scene();
        let _tracking = track(&s, None);

        let frames = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&frames);
        let dependent: SharedNode = s.dependent.clone();
        let _live = s
            .sampler
            .on_live_frame_change(&dependent, move |frame| log.borrow_mut().push(*frame));

        s.host
            .borrow_mut()
            .set_bounds(Rect::new(0.0, 0.0, 200.0, 300.0));
        s.host
            .borrow_mut()
            .add_animation("bounds", resize_reference(true));

        // Host change, then the dependent's own change one turn later
        s.run_loop.run_turn();
        s.run_loop.run_turn();
        assert!(frames.borrow().is_empty());

        s.run_loop.display_refresh(0.3);
        assert_eq!(*frames.borrow(), vec![Rect::new(0.0, 0.0, 150.0, 250.0)]);
    }

    #[test]
    fn test_resync_after_cancel_is_reported() {
        let s = scene();
        let tracking = track(&s, None);
        assert!(tracking.resync());

        tracking.cancel();
        assert!(!tracking.is_active());
        assert!(!tracking.resync());
        assert_eq!(
            s.sink.records(),
            vec![Diagnostic::MissingTracking { node: NodeId(2) }]
        );
    }
}
