//! Live frame sampler
//!
//! Reconstructs the frame a node is currently showing while animations are
//! in flight, without asking the render engine for its interpolated
//! snapshot. Per observed node the sampler moves through three phases:
//!
//! ```text
//!   Idle ──subscribe──▶ ObservingIdle ──change + animations──▶ Ticking
//!    ▲                      │    ▲                               │
//!    └──last cancel─────────┘    └───────animations done─────────┘
//! ```
//!
//! Model-geometry changes reach the sampler through the node's geometry
//! hook. The hook only queues work for the next run-loop turn: animations
//! are often added right after the property mutation that triggered the
//! hook, so the composed frame is guaranteed correct one turn after the
//! mutation, not before.
//!
//! While ticking, every display refresh composes all in-flight animations
//! (see [`crate::compose`]) and notifies subscribers whose last delivered
//! frame differs. When the node reports no animations any more, one final
//! notification carries the model frame and the tick scheduler stops.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use strata_core::{
    Diagnostic, Diagnostics, NodeId, ObservationRegistry, Rect, RunLoop, Subscription,
};

use crate::compose::{compose, ComposeFault};
use crate::descriptor::NodeAnimation;
use crate::node::{AnimatableNode, GeometryHook, ModelGeometry, SharedNode};
use crate::scheduler::TickScheduler;

// =============================================================================
// Configuration
// =============================================================================

/// Sampler tuning
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Assumed seconds between display refreshes until ticks are measured
    pub nominal_refresh_interval: f64,
    /// Multiplier on the longest animation duration bounding a tick run
    pub duration_margin: f64,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            nominal_refresh_interval: 1.0 / 60.0,
            duration_margin: 1.5,
        }
    }
}

impl SamplerConfig {
    pub fn with_nominal_refresh_interval(mut self, interval: f64) -> Self {
        self.nominal_refresh_interval = interval.max(0.0);
        self
    }

    pub fn with_duration_margin(mut self, margin: f64) -> Self {
        self.duration_margin = margin.max(1.0);
        self
    }
}

// =============================================================================
// Public types
// =============================================================================

/// Lifecycle phase of one observed node
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SamplerPhase {
    /// Nobody observes the node
    Idle,
    /// Observed, no tick run in progress
    ObservingIdle,
    /// Observed, sampling on every display refresh
    Ticking,
}

/// A committed change of a node's model geometry
#[derive(Clone, Debug, PartialEq)]
pub struct GeometryChange {
    pub node: NodeId,
    pub old: ModelGeometry,
    pub new: ModelGeometry,
    /// The in-flight animation driving the change, if any
    ///
    /// The latest extent animation, else the latest position animation,
    /// else the latest transition.
    pub reference: Option<(String, NodeAnimation)>,
}

// =============================================================================
// Per-node state
// =============================================================================

struct NodeState {
    node: Weak<RefCell<dyn AnimatableNode>>,
    frames: ObservationRegistry<Rect>,
    changes: ObservationRegistry<GeometryChange>,
    /// Model geometry as of the last processed change
    model: ModelGeometry,
    /// Last composed frame; fallback while an animation is pending
    last_frame: Rect,
    change_pending: bool,
    ticker: TickScheduler,
    tick_count: u32,
    first_tick_time: Option<f64>,
    /// Animations already reported during the current tick run
    reported: FxHashSet<String>,
    non_finite_reported: bool,
}

impl NodeState {
    /// Record a tick at `now` and return the average tick duration
    fn record_tick(&mut self, now: f64, nominal: f64) -> f64 {
        match self.first_tick_time {
            None => {
                self.first_tick_time = Some(now);
                self.tick_count = 0;
                nominal
            }
            Some(first) => {
                self.tick_count += 1;
                (now - first) / self.tick_count as f64
            }
        }
    }

    fn reset_run(&mut self) {
        self.tick_count = 0;
        self.first_tick_time = None;
        self.reported.clear();
        self.non_finite_reported = false;
    }
}

struct SamplerInner {
    run_loop: RunLoop,
    config: SamplerConfig,
    diagnostics: Diagnostics,
    states: RefCell<FxHashMap<NodeId, NodeState>>,
}

// =============================================================================
// Sampler
// =============================================================================

/// Composes in-flight animations into live frames for subscribers
///
/// Cheap to clone; clones share the same side table of observed nodes.
#[derive(Clone)]
pub struct LiveFrameSampler {
    inner: Rc<SamplerInner>,
}

impl LiveFrameSampler {
    pub fn new(run_loop: RunLoop) -> Self {
        Self::with_config(run_loop, SamplerConfig::default(), Diagnostics::default())
    }

    pub fn with_config(run_loop: RunLoop, config: SamplerConfig, diagnostics: Diagnostics) -> Self {
        Self {
            inner: Rc::new(SamplerInner {
                run_loop,
                config,
                diagnostics,
                states: RefCell::new(FxHashMap::default()),
            }),
        }
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.inner.config
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.inner.diagnostics
    }

    pub fn run_loop(&self) -> &RunLoop {
        &self.inner.run_loop
    }

    /// Observe the live frame of `node`
    ///
    /// The current model frame is recorded as already delivered; the
    /// callback first fires when the frame differs from it.
    pub fn on_live_frame_change<F>(&self, node: &SharedNode, callback: F) -> Subscription
    where
        F: FnMut(&Rect) + 'static,
    {
        let observed = self.inner.observe(node);
        let weak = Rc::downgrade(&self.inner);
        let id = observed.id;
        observed.frames.set_teardown(move || {
            if let Some(inner) = weak.upgrade() {
                inner.release_if_unobserved(id);
            }
        });

        let token = observed
            .frames
            .subscribe_seeded(observed.model.frame(), callback);
        if observed.animating {
            self.inner.schedule_change(id);
        }
        token
    }

    /// Observe committed model-geometry changes of `node`
    ///
    /// Changes are delivered on the turn after the mutation, together with
    /// the animation driving them.
    pub fn on_geometry_change<F>(&self, node: &SharedNode, callback: F) -> Subscription
    where
        F: FnMut(&GeometryChange) + 'static,
    {
        let observed = self.inner.observe(node);
        let weak = Rc::downgrade(&self.inner);
        let id = observed.id;
        observed.changes.set_teardown(move || {
            if let Some(inner) = weak.upgrade() {
                inner.release_if_unobserved(id);
            }
        });
        observed.changes.subscribe(callback)
    }

    /// Re-examine an observed node on the next turn
    ///
    /// For hosts that learn about added animations without a geometry
    /// change.
    pub fn invalidate(&self, node: NodeId) {
        self.inner.schedule_change(node);
    }

    pub fn phase(&self, node: NodeId) -> SamplerPhase {
        match self.inner.states.borrow().get(&node) {
            None => SamplerPhase::Idle,
            Some(state) if state.ticker.is_running() => SamplerPhase::Ticking,
            Some(_) => SamplerPhase::ObservingIdle,
        }
    }

    /// Last composed frame of an observed node
    pub fn last_frame(&self, node: NodeId) -> Option<Rect> {
        self.inner.states.borrow().get(&node).map(|s| s.last_frame)
    }

    pub fn observed_count(&self) -> usize {
        self.inner.states.borrow().len()
    }
}

impl fmt::Debug for LiveFrameSampler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveFrameSampler")
            .field("config", &self.inner.config)
            .field("observed", &self.inner.states.borrow().len())
            .finish()
    }
}

struct Observed {
    id: NodeId,
    model: ModelGeometry,
    animating: bool,
    frames: ObservationRegistry<Rect>,
    changes: ObservationRegistry<GeometryChange>,
}

impl SamplerInner {
    /// Create the node's state on first observation and install its hook
    fn observe(self: &Rc<Self>, node: &SharedNode) -> Observed {
        let (id, model, animating) = {
            let node = node.borrow();
            (node.id(), node.geometry(), node.has_animations())
        };

        let mut created = false;
        let (frames, changes) = {
            let mut states = self.states.borrow_mut();
            let state = states.entry(id).or_insert_with(|| {
                created = true;
                NodeState {
                    node: Rc::downgrade(node),
                    frames: ObservationRegistry::new(),
                    changes: ObservationRegistry::new(),
                    model,
                    last_frame: model.frame(),
                    change_pending: false,
                    ticker: TickScheduler::new(self.run_loop.clone()),
                    tick_count: 0,
                    first_tick_time: None,
                    reported: FxHashSet::default(),
                    non_finite_reported: false,
                }
            });
            (state.frames.clone(), state.changes.clone())
        };

        if created {
            let weak = Rc::downgrade(self);
            let hook: GeometryHook = Rc::new(move |id: NodeId| {
                if let Some(inner) = weak.upgrade() {
                    inner.schedule_change(id);
                }
            });
            node.borrow_mut().set_geometry_hook(Some(hook));
            tracing::debug!(node = %id, "sampler observing node");
        }

        Observed {
            id,
            model,
            animating,
            frames,
            changes,
        }
    }

    /// Coalesce changes into one deferred pass per turn
    fn schedule_change(self: &Rc<Self>, id: NodeId) {
        let first = match self.states.try_borrow_mut() {
            Ok(mut states) => match states.get_mut(&id) {
                Some(state) => !std::mem::replace(&mut state.change_pending, true),
                None => return,
            },
            Err(_) => true,
        };

        if first {
            let weak = Rc::downgrade(self);
            self.run_loop.defer(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.process_change(id);
                }
            });
        }
    }

    fn process_change(self: &Rc<Self>, id: NodeId) {
        let (node, old_model) = {
            let mut states = self.states.borrow_mut();
            let Some(state) = states.get_mut(&id) else {
                return;
            };
            state.change_pending = false;
            (state.node.upgrade(), state.model)
        };
        let Some(node) = node else {
            self.node_released(id);
            return;
        };

        let (new_model, animations) = match node.try_borrow() {
            Ok(node) => (node.geometry(), node.animations()),
            Err(_) => {
                tracing::trace!(node = %id, "node busy, retrying change next turn");
                self.schedule_change(id);
                return;
            }
        };

        let (frames, changes, settled) = {
            let mut states = self.states.borrow_mut();
            let Some(state) = states.get_mut(&id) else {
                return;
            };
            state.model = new_model;

            if animations.is_empty() {
                state.ticker.stop();
                state.reset_run();
                state.last_frame = new_model.frame();
                (state.frames.clone(), state.changes.clone(), true)
            } else {
                let longest = animations
                    .iter()
                    .filter_map(|(_, animation)| animation.duration())
                    .fold(self.config.nominal_refresh_interval, f64::max);
                let bound = longest * self.config.duration_margin;
                let weak = Rc::downgrade(self);
                state.ticker.run(bound, move |now| {
                    if let Some(inner) = weak.upgrade() {
                        inner.tick(id, now);
                    }
                });
                tracing::debug!(node = %id, bound, count = animations.len(), "sampler ticking");
                (state.frames.clone(), state.changes.clone(), false)
            }
        };

        if old_model != new_model {
            changes.notify(&GeometryChange {
                node: id,
                old: old_model,
                new: new_model,
                reference: reference_animation(&animations),
            });
        }
        if settled {
            frames.notify_distinct(&new_model.frame());
        }
    }

    fn tick(self: &Rc<Self>, id: NodeId, now: f64) {
        let node = match self.states.borrow().get(&id) {
            Some(state) => state.node.upgrade(),
            None => return,
        };
        let Some(node) = node else {
            self.node_released(id);
            return;
        };

        let (model, animations) = match node.try_borrow() {
            Ok(node) => (node.geometry(), node.animations()),
            Err(_) => {
                tracing::trace!(node = %id, "node busy, skipping tick");
                return;
            }
        };

        if animations.is_empty() {
            self.finish(id, model);
            return;
        }

        let mut diagnostics: SmallVec<[Diagnostic; 2]> = SmallVec::new();
        let (frames, frame) = {
            let mut states = self.states.borrow_mut();
            let Some(state) = states.get_mut(&id) else {
                return;
            };
            let lead = state.record_tick(now, self.config.nominal_refresh_interval);
            let composition = compose(&model, &animations, now, lead);

            for fault in composition.faults {
                if !state.reported.insert(fault.name().to_string()) {
                    continue;
                }
                diagnostics.push(match fault {
                    ComposeFault::Unrecognized { name, description } => {
                        Diagnostic::UnrecognizedAnimation {
                            node: id,
                            name,
                            description,
                        }
                    }
                    ComposeFault::Unsolvable { name, reason } => Diagnostic::UnsolvableCurve {
                        node: id,
                        name,
                        reason: reason.to_string(),
                    },
                });
            }

            let frame = match composition.frame {
                Some(frame) if frame.is_finite() => {
                    state.last_frame = frame;
                    frame
                }
                Some(frame) => {
                    if !state.non_finite_reported {
                        state.non_finite_reported = true;
                        diagnostics.push(Diagnostic::NonFiniteFrame { node: id, frame });
                    }
                    state.last_frame
                }
                // An animation has no begin time yet
                None => state.last_frame,
            };
            (state.frames.clone(), frame)
        };

        for diagnostic in diagnostics {
            self.diagnostics.report(diagnostic);
        }
        frames.notify_distinct(&frame);
    }

    /// Deliver the authoritative model frame and stop ticking
    fn finish(&self, id: NodeId, model: ModelGeometry) {
        let frames = {
            let mut states = self.states.borrow_mut();
            let Some(state) = states.get_mut(&id) else {
                return;
            };
            state.ticker.stop();
            state.reset_run();
            state.last_frame = model.frame();
            state.frames.clone()
        };
        tracing::debug!(node = %id, "animations finished, delivering model frame");
        frames.notify_distinct(&model.frame());
    }

    fn node_released(&self, id: NodeId) {
        let removed = self.states.borrow_mut().remove(&id);
        if removed.is_some() {
            self.diagnostics.report(Diagnostic::NodeReleased { node: id });
        }
        drop(removed);
    }

    /// Tear down the node's state once neither registry has subscribers
    fn release_if_unobserved(self: &Rc<Self>, id: NodeId) {
        let removed = match self.states.try_borrow_mut() {
            Ok(mut states) => {
                let unobserved = states
                    .get(&id)
                    .is_some_and(|state| state.frames.is_empty() && state.changes.is_empty());
                if unobserved {
                    states.remove(&id)
                } else {
                    None
                }
            }
            Err(_) => {
                let weak = Rc::downgrade(self);
                self.run_loop.defer(move || {
                    if let Some(inner) = weak.upgrade() {
                        inner.release_if_unobserved(id);
                    }
                });
                return;
            }
        };
        let Some(state) = removed else {
            return;
        };

        state.ticker.stop();
        if let Some(node) = state.node.upgrade() {
            self.remove_hook(id, node);
        }
        tracing::debug!(node = %id, "sampler released node");
        drop(state);
    }

    fn remove_hook(self: &Rc<Self>, id: NodeId, node: SharedNode) {
        if let Ok(mut node) = node.try_borrow_mut() {
            node.set_geometry_hook(None);
            return;
        }

        // The node is mid-mutation; unhook next turn unless re-observed
        let weak_self = Rc::downgrade(self);
        let weak_node = Rc::downgrade(&node);
        self.run_loop.defer(move || {
            let (Some(inner), Some(node)) = (weak_self.upgrade(), weak_node.upgrade()) else {
                return;
            };
            if !inner.states.borrow().contains_key(&id) {
                inner.remove_hook(id, node);
            }
        });
    }
}

fn reference_animation(animations: &[(String, NodeAnimation)]) -> Option<(String, NodeAnimation)> {
    let latest_property = |extent: bool| {
        animations.iter().rev().find(|(_, animation)| {
            animation
                .as_property()
                .is_some_and(|d| d.key().is_extent() == extent)
        })
    };

    latest_property(true)
        .or_else(|| latest_property(false))
        .or_else(|| {
            animations
                .iter()
                .rev()
                .find(|(_, animation)| matches!(animation, NodeAnimation::Transition { .. }))
        })
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve::TimingCurve;
    use crate::descriptor::{AnimatedValue, AnimationDescriptor, AnimationKey, BeginTime};
    use crate::node::HeadlessNode;
    use std::cell::Cell;
    use strata_core::{Point, RecordingSink};

    struct Harness {
        run_loop: RunLoop,
        sampler: LiveFrameSampler,
        sink: RecordingSink,
        headless: Rc<RefCell<HeadlessNode>>,
        node: SharedNode,
    }

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    /// Node at position (60, 120) with extent 100 x 200
    fn harness(config: SamplerConfig) -> Harness {
        init_tracing();
        let run_loop = RunLoop::new();
        let sink = RecordingSink::new();
        let sampler =
            LiveFrameSampler::with_config(run_loop.clone(), config, Diagnostics::new(sink.clone()));
        let headless = HeadlessNode::shared(NodeId(1), Rect::new(10.0, 20.0, 100.0, 200.0));
        let node: SharedNode = headless.clone();
        Harness {
            run_loop,
            sampler,
            sink,
            headless,
            node,
        }
    }

    fn recorder() -> (Rc<RefCell<Vec<Rect>>>, impl FnMut(&Rect) + 'static) {
        let frames = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&frames);
        (frames, move |frame: &Rect| log.borrow_mut().push(*frame))
    }

    fn additive_position(dx: f32, dy: f32, duration: f64) -> NodeAnimation {
        AnimationDescriptor::new(AnimationKey::Position, TimingCurve::linear(), duration)
            .with_from(AnimatedValue::Point(Point::new(dx, dy)))
            .and_then(|d| d.with_to(AnimatedValue::Point(Point::ZERO)))
            .unwrap()
            .additive(true)
            .into()
    }

    #[test]
    fn test_additive_scenario_halfway() {
        let h = harness(SamplerConfig::default().with_nominal_refresh_interval(0.0));
        h.headless
            .borrow_mut()
            .add_animation("slide", additive_position(-50.0, -90.0, 0.25));

        let (frames, record) = recorder();
        let _token = h.sampler.on_live_frame_change(&h.node, record);

        h.run_loop.run_turn();
        assert_eq!(h.sampler.phase(NodeId(1)), SamplerPhase::Ticking);
        h.headless.borrow_mut().attach_pending(0.0);

        h.run_loop.display_refresh(0.125);
        let last = *frames.borrow().last().unwrap();
        assert_eq!(last.anchor_position(Point::new(0.5, 0.5)), Point::new(35.0, 75.0));
        assert_eq!(last.size, h.node.borrow().bounds().size);
    }

    #[test]
    fn test_pending_animation_falls_back_to_last_frame() {
        let h = harness(SamplerConfig::default());
        h.headless
            .borrow_mut()
            .add_animation("slide", additive_position(-50.0, -90.0, 0.25));

        let (frames, record) = recorder();
        let _token = h.sampler.on_live_frame_change(&h.node, record);
        h.run_loop.run_turn();

        h.run_loop.display_refresh(0.016);
        h.run_loop.display_refresh(0.033);
        assert!(frames.borrow().is_empty());
        assert_eq!(h.sampler.last_frame(NodeId(1)), Some(h.node.borrow().frame()));
    }

    #[test]
    fn test_model_change_without_animation_is_immediate() {
        let h = harness(SamplerConfig::default());
        let (frames, record) = recorder();
        let _token = h.sampler.on_live_frame_change(&h.node, record);
        assert_eq!(h.sampler.phase(NodeId(1)), SamplerPhase::ObservingIdle);

        let target = Rect::new(0.0, 0.0, 50.0, 50.0);
        h.node.borrow_mut().set_frame(target);
        assert!(frames.borrow().is_empty());

        h.run_loop.run_turn();
        assert_eq!(*frames.borrow(), vec![target]);
        assert_eq!(h.sampler.phase(NodeId(1)), SamplerPhase::ObservingIdle);
    }

    #[test]
    fn test_identical_output_fires_once() {
        let h = harness(SamplerConfig::default());
        let (frames, record) = recorder();
        let _token = h.sampler.on_live_frame_change(&h.node, record);

        h.node.borrow_mut().set_frame(Rect::new(0.0, 0.0, 50.0, 50.0));
        h.run_loop.run_turn();
        h.sampler.invalidate(NodeId(1));
        h.run_loop.run_turn();

        assert_eq!(frames.borrow().len(), 1);
    }

    #[test]
    fn test_two_changes_in_one_turn() {
        let h = harness(SamplerConfig::default());
        let (frames, record) = recorder();
        let _token = h.sampler.on_live_frame_change(&h.node, record);

        h.node.borrow_mut().set_frame(Rect::new(0.0, 0.0, 50.0, 50.0));
        h.node.borrow_mut().set_frame(Rect::new(5.0, 5.0, 60.0, 60.0));
        assert_eq!(h.run_loop.pending_turn_callbacks(), 1);

        h.run_loop.run_turn();
        assert_eq!(*frames.borrow(), vec![Rect::new(5.0, 5.0, 60.0, 60.0)]);
    }

    #[test]
    fn test_finishing_delivers_model_frame_and_stops() {
        let h = harness(SamplerConfig::default());
        let (frames, record) = recorder();
        let _token = h.sampler.on_live_frame_change(&h.node, record);

        h.headless
            .borrow_mut()
            .add_animation("slide", additive_position(-50.0, -90.0, 0.25));
        h.node.borrow_mut().set_frame(Rect::new(0.0, 0.0, 100.0, 200.0));
        h.run_loop.run_turn();
        h.headless.borrow_mut().attach_pending(0.0);

        h.run_loop.display_refresh(0.05);
        h.run_loop.display_refresh(0.1);
        assert!(frames.borrow().len() >= 2);

        h.headless.borrow_mut().remove_finished(0.3);
        h.headless.borrow_mut().remove_animation("slide");
        h.run_loop.display_refresh(0.3);

        assert_eq!(*frames.borrow().last().unwrap(), Rect::new(0.0, 0.0, 100.0, 200.0));
        assert_eq!(h.sampler.phase(NodeId(1)), SamplerPhase::ObservingIdle);
        assert!(!h.run_loop.has_frame_callbacks());
    }

    #[test]
    fn test_ticking_stops_after_margin() {
        let h = harness(SamplerConfig::default());
        let (_frames, record) = recorder();
        let _token = h.sampler.on_live_frame_change(&h.node, record);

        h.headless
            .borrow_mut()
            .add_animation("slide", additive_position(-50.0, -90.0, 0.2));
        h.sampler.invalidate(NodeId(1));
        h.run_loop.run_turn();
        h.headless.borrow_mut().attach_pending(0.0);

        h.run_loop.display_refresh(0.29);
        assert_eq!(h.sampler.phase(NodeId(1)), SamplerPhase::Ticking);
        h.run_loop.display_refresh(0.31);
        assert_eq!(h.sampler.phase(NodeId(1)), SamplerPhase::ObservingIdle);
    }

    #[test]
    fn test_unrecognized_animation_reported_once() {
        let h = harness(SamplerConfig::default());
        h.headless.borrow_mut().add_animation(
            "path",
            NodeAnimation::Opaque {
                description: "keyframe path".into(),
            },
        );
        let mut slide = additive_position(-50.0, -90.0, 1.0);
        slide.attach(0.0);
        h.headless.borrow_mut().add_animation("slide", slide);

        let (frames, record) = recorder();
        let _token = h.sampler.on_live_frame_change(&h.node, record);
        h.run_loop.run_turn();

        for frame in 1..=4 {
            h.run_loop.display_refresh(frame as f64 * 0.1);
        }

        assert_eq!(h.sink.len(), 1);
        assert!(matches!(
            h.sink.records()[0],
            Diagnostic::UnrecognizedAnimation { ref name, .. } if name == "path"
        ));
        // The well-formed animation still drives delivery
        assert_eq!(frames.borrow().len(), 4);
    }

    #[test]
    fn test_last_cancel_tears_down() {
        let h = harness(SamplerConfig::default());
        let a = h.sampler.on_live_frame_change(&h.node, |_| {});
        let b = h.sampler.on_geometry_change(&h.node, |_| {});
        assert!(h.headless.borrow().has_geometry_hook());
        assert_eq!(h.sampler.observed_count(), 1);

        a.cancel();
        assert_eq!(h.sampler.phase(NodeId(1)), SamplerPhase::ObservingIdle);
        b.cancel();
        b.cancel();
        assert_eq!(h.sampler.phase(NodeId(1)), SamplerPhase::Idle);
        assert!(!h.headless.borrow().has_geometry_hook());

        // Observing again re-arms everything
        let _c = h.sampler.on_live_frame_change(&h.node, |_| {});
        assert!(h.headless.borrow().has_geometry_hook());
        drop(_c);
        assert_eq!(h.sampler.observed_count(), 0);
    }

    #[test]
    fn test_cancel_inside_callback_keeps_others() {
        let h = harness(SamplerConfig::default());
        let slot: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));
        let slot_in_cb = Rc::clone(&slot);
        let first = h.sampler.on_live_frame_change(&h.node, move |_| {
            if let Some(token) = slot_in_cb.borrow_mut().take() {
                token.cancel();
            }
        });
        *slot.borrow_mut() = Some(first);
        let second_calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&second_calls);
        let _second = h
            .sampler
            .on_live_frame_change(&h.node, move |_| counter.set(counter.get() + 1));

        h.node.borrow_mut().set_frame(Rect::new(0.0, 0.0, 1.0, 1.0));
        h.run_loop.run_turn();
        h.node.borrow_mut().set_frame(Rect::new(0.0, 0.0, 2.0, 2.0));
        h.run_loop.run_turn();

        assert_eq!(second_calls.get(), 2);
        assert_eq!(h.sampler.phase(NodeId(1)), SamplerPhase::ObservingIdle);
    }

    #[test]
    fn test_geometry_change_carries_reference() {
        let h = harness(SamplerConfig::default());
        let changes = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&changes);
        let _token = h
            .sampler
            .on_geometry_change(&h.node, move |change| log.borrow_mut().push(change.clone()));

        let old = h.node.borrow().geometry();
        h.node.borrow_mut().set_bounds(Rect::new(0.0, 0.0, 300.0, 200.0));
        let resize: NodeAnimation =
            AnimationDescriptor::new(AnimationKey::Extent, TimingCurve::ease_in_ease_out(), 0.3)
                .with_from(AnimatedValue::Rect(Rect::new(0.0, 0.0, 100.0, 200.0)))
                .unwrap()
                .begin_at(BeginTime::Attached(0.0))
                .into();
        h.headless.borrow_mut().add_animation("bounds", resize.clone());
        h.run_loop.run_turn();

        let changes = changes.borrow();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].old, old);
        assert_eq!(changes[0].new.bounds, Rect::new(0.0, 0.0, 300.0, 200.0));
        assert_eq!(changes[0].reference, Some(("bounds".to_string(), resize)));
    }

    #[test]
    fn test_released_node_is_reported() {
        let run_loop = RunLoop::new();
        let sink = RecordingSink::new();
        let sampler = LiveFrameSampler::with_config(
            run_loop.clone(),
            SamplerConfig::default(),
            Diagnostics::new(sink.clone()),
        );
        let node: SharedNode = HeadlessNode::shared(NodeId(9), Rect::new(0.0, 0.0, 10.0, 10.0));
        let _token = sampler.on_live_frame_change(&node, |_| {});

        sampler.invalidate(NodeId(9));
        drop(node);
        run_loop.run_turn();

        assert_eq!(sink.records(), vec![Diagnostic::NodeReleased { node: NodeId(9) }]);
        assert_eq!(sampler.phase(NodeId(9)), SamplerPhase::Idle);
    }

    #[test]
    fn test_lead_uses_average_tick_duration() {
        let h = harness(SamplerConfig::default().with_nominal_refresh_interval(0.0));
        h.headless
            .borrow_mut()
            .add_animation("slide", additive_position(-100.0, 0.0, 1.0));

        let (frames, record) = recorder();
        let _token = h.sampler.on_live_frame_change(&h.node, record);
        h.run_loop.run_turn();
        h.headless.borrow_mut().attach_pending(0.0);

        // Uneven refreshes: averages are 0.1 after the second and 0.2 after the third
        let center_x = |frame: &Rect| frame.anchor_position(Point::new(0.5, 0.5)).x;
        h.run_loop.display_refresh(0.1);
        h.run_loop.display_refresh(0.2);
        h.run_loop.display_refresh(0.5);

        let frames = frames.borrow();
        assert_eq!(frames.len(), 3);
        // 60 - 100 * (1 - p) with p = 0.1, 0.3 and 0.7
        for (frame, expected) in frames.iter().zip([-30.0, -10.0, 30.0]) {
            let x = center_x(frame);
            assert!((x - expected).abs() < 1e-3, "expected {expected}, got {x}");
        }
    }

    #[test]
    fn test_non_finite_frame_falls_back_to_last_frame() {
        let h = harness(SamplerConfig::default().with_nominal_refresh_interval(0.0));
        h.headless
            .borrow_mut()
            .add_animation("slide", additive_position(-100.0, 0.0, 1.0));

        let (frames, record) = recorder();
        let _token = h.sampler.on_live_frame_change(&h.node, record);
        h.run_loop.run_turn();
        h.headless.borrow_mut().attach_pending(0.0);

        h.run_loop.display_refresh(0.5);
        let good = *frames.borrow().last().unwrap();

        let runaway: NodeAnimation =
            AnimationDescriptor::new(AnimationKey::PositionX, TimingCurve::linear(), 1.0)
                .with_from(AnimatedValue::Scalar(60.0))
                .and_then(|d| d.with_to(AnimatedValue::Scalar(f32::INFINITY)))
                .unwrap()
                .begin_at(BeginTime::Attached(0.0))
                .into();
        h.headless.borrow_mut().add_animation("slide", runaway);

        h.run_loop.display_refresh(0.6);
        h.run_loop.display_refresh(0.7);

        assert_eq!(*frames.borrow(), vec![good]);
        assert_eq!(h.sampler.last_frame(NodeId(1)), Some(good));
        assert_eq!(h.sink.len(), 1);
        assert!(matches!(
            h.sink.records()[0],
            Diagnostic::NonFiniteFrame { node: NodeId(1), .. }
        ));
    }

    #[test]
    fn test_config_serde() {
        let config: SamplerConfig = serde_json::from_str(r#"{"duration_margin": 2.0}"#).unwrap();
        assert_eq!(config.duration_margin, 2.0);
        assert_eq!(config.nominal_refresh_interval, 1.0 / 60.0);

        let json = serde_json::to_string(&SamplerConfig::default()).unwrap();
        let back: SamplerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, SamplerConfig::default());
    }
}
