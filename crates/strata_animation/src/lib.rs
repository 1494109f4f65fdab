//! Strata Animation
//!
//! Animation sampling and retargeting for scene-graph nodes.
//!
//! # Features
//!
//! - **Timing Curves**: cubic-Bézier and closed-form damped springs, with
//!   `solve_for_input` and spring `settling_duration`
//! - **Animation Model**: closed set of geometric key paths, additive and
//!   absolute property animations, pending vs. attached begin times
//! - **Live Frame Sampling**: per-refresh composition of every in-flight
//!   animation on a node, delivered only when the frame changes
//! - **Retargeting**: mirror a host's animation onto dependent nodes
//! - **Tracking**: keep a dependent's frame locked to a host's bounds
//!
//! # Example
//!
//! ```rust
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! use strata_animation::{AnimatableNode, HeadlessNode, LiveFrameSampler, SharedNode};
//! use strata_core::{NodeId, Rect, RunLoop};
//!
//! let run_loop = RunLoop::new();
//! let sampler = LiveFrameSampler::new(run_loop.clone());
//! let node: SharedNode = HeadlessNode::shared(NodeId(1), Rect::new(0.0, 0.0, 100.0, 100.0));
//!
//! let frames = Rc::new(RefCell::new(Vec::new()));
//! let log = Rc::clone(&frames);
//! let _token = sampler.on_live_frame_change(&node, move |frame| log.borrow_mut().push(*frame));
//!
//! node.borrow_mut().set_frame(Rect::new(10.0, 10.0, 50.0, 50.0));
//! run_loop.run_turn();
//! assert_eq!(*frames.borrow(), vec![Rect::new(10.0, 10.0, 50.0, 50.0)]);
//! ```

pub mod compose;
pub mod curve;
pub mod descriptor;
pub mod error;
pub mod node;
pub mod retarget;
pub mod sampler;
pub mod scheduler;
pub mod spring;
pub mod tracking;

pub use compose::{compose, ComposeFault, Composition};
pub use curve::TimingCurve;
pub use descriptor::{
    AnimatedValue, AnimationDescriptor, AnimationKey, BeginTime, NodeAnimation, ValueKind,
};
pub use error::{AnimationError, Result};
pub use node::{AnimatableNode, GeometryHook, HeadlessNode, ModelGeometry, SharedNode};
pub use retarget::{
    AnimationRetargeter, RetargetedAnimation, RETARGET_EXTENT_KEY, RETARGET_POSITION_KEY,
};
pub use sampler::{GeometryChange, LiveFrameSampler, SamplerConfig, SamplerPhase};
pub use scheduler::TickScheduler;
pub use spring::{SpringConfig, SpringCurve, DEFAULT_SPRING_EPSILON};
pub use tracking::{add_frame_animation, add_full_size_tracking, BoundsCallback, FullSizeTracking};

/// Eased progress of `curve` at normalized `input`
pub fn solve_for_input(curve: &TimingCurve, input: f64) -> Result<f64> {
    curve.solve_for_input(input)
}

/// Time after which `curve` stays within `epsilon` of its end value
pub fn settling_duration(curve: &TimingCurve, epsilon: f64) -> Result<f64> {
    curve.settling_duration(epsilon)
}
