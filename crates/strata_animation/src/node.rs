//! Node abstraction
//!
//! The sampler and the retargeter never talk to a scene graph directly.
//! They go through [`AnimatableNode`], which a host implements over its own
//! layer type. [`HeadlessNode`] is an in-memory implementation used by
//! headless hosts and by the tests in this crate.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use strata_core::{NodeId, Point, Rect, Size};

use crate::descriptor::NodeAnimation;

/// Callback a node invokes after its model geometry changes
pub type GeometryHook = Rc<dyn Fn(NodeId)>;

/// Shared, single-threaded handle to a node
pub type SharedNode = Rc<RefCell<dyn AnimatableNode>>;

/// Committed (model) geometry of a node
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelGeometry {
    /// Anchor point position in the parent's coordinate space
    pub position: Point,
    /// Anchor point in unit coordinates of the bounds
    pub anchor_point: Point,
    pub bounds: Rect,
}

impl ModelGeometry {
    pub fn size(&self) -> Size {
        self.bounds.size
    }

    /// Frame in the parent's coordinate space
    pub fn frame(&self) -> Rect {
        Rect::from_anchor(self.position, self.anchor_point, self.bounds.size)
    }
}

/// A positioned, sized scene-graph element carrying in-flight animations
///
/// Animations are keyed by name. Adding under an existing name replaces
/// the previous animation. `animations()` reports them in the order they
/// were added, which is also the order they apply in.
pub trait AnimatableNode {
    fn id(&self) -> NodeId;

    fn position(&self) -> Point;

    fn bounds(&self) -> Rect;

    fn anchor_point(&self) -> Point;

    fn set_position(&mut self, position: Point);

    fn set_bounds(&mut self, bounds: Rect);

    fn geometry(&self) -> ModelGeometry {
        ModelGeometry {
            position: self.position(),
            anchor_point: self.anchor_point(),
            bounds: self.bounds(),
        }
    }

    fn frame(&self) -> Rect {
        self.geometry().frame()
    }

    /// Move and resize so that `frame()` equals `frame`
    fn set_frame(&mut self, frame: Rect) {
        let bounds = Rect::from_origin_size(self.bounds().origin, frame.size);
        self.set_bounds(bounds);
        self.set_position(frame.anchor_position(self.anchor_point()));
    }

    fn animations(&self) -> Vec<(String, NodeAnimation)>;

    fn animation(&self, name: &str) -> Option<NodeAnimation>;

    fn add_animation(&mut self, name: &str, animation: NodeAnimation);

    fn remove_animation(&mut self, name: &str) -> Option<NodeAnimation>;

    fn has_animations(&self) -> bool {
        !self.animations().is_empty()
    }

    /// Best-effort snapshot of what is currently rendered
    ///
    /// May be `None` or stale right after an animation was scheduled.
    fn presentation_frame(&self) -> Option<Rect>;

    /// Install (or with `None`, remove) the model-geometry change hook
    fn set_geometry_hook(&mut self, hook: Option<GeometryHook>);
}

/// In-memory node
pub struct HeadlessNode {
    id: NodeId,
    position: Point,
    bounds: Rect,
    anchor_point: Point,
    animations: IndexMap<String, NodeAnimation>,
    presentation: Option<Rect>,
    hook: Option<GeometryHook>,
}

impl HeadlessNode {
    /// Node with a centered anchor whose frame is `frame`
    pub fn new(id: NodeId, frame: Rect) -> Self {
        let anchor_point = Point::new(0.5, 0.5);
        Self {
            id,
            position: frame.anchor_position(anchor_point),
            bounds: Rect::from_origin_size(Point::ZERO, frame.size),
            anchor_point,
            animations: IndexMap::new(),
            presentation: None,
            hook: None,
        }
    }

    /// Wrap in a shared handle; coerce a clone to [`SharedNode`] as needed
    pub fn shared(id: NodeId, frame: Rect) -> Rc<RefCell<HeadlessNode>> {
        Rc::new(RefCell::new(Self::new(id, frame)))
    }

    pub fn set_anchor_point(&mut self, anchor_point: Point) {
        if self.anchor_point != anchor_point {
            self.anchor_point = anchor_point;
            self.fire_hook();
        }
    }

    /// Record what the render engine currently shows
    pub fn set_presentation_frame(&mut self, frame: Option<Rect>) {
        self.presentation = frame;
    }

    pub fn has_geometry_hook(&self) -> bool {
        self.hook.is_some()
    }

    /// Attach every pending animation to the clock at `now`
    pub fn attach_pending(&mut self, now: f64) -> usize {
        let mut attached = 0;
        for animation in self.animations.values_mut() {
            if animation.is_pending() {
                animation.attach(now);
                attached += 1;
            }
        }
        attached
    }

    /// Drop every animation that has completed at `now`
    pub fn remove_finished(&mut self, now: f64) -> usize {
        let before = self.animations.len();
        self.animations.retain(|_, animation| !animation.is_finished(now));
        before - self.animations.len()
    }

    fn fire_hook(&self) {
        if let Some(hook) = &self.hook {
            hook(self.id);
        }
    }
}

impl AnimatableNode for HeadlessNode {
    fn id(&self) -> NodeId {
        self.id
    }

    fn position(&self) -> Point {
        self.position
    }

    fn bounds(&self) -> Rect {
        self.bounds
    }

    fn anchor_point(&self) -> Point {
        self.anchor_point
    }

    fn set_position(&mut self, position: Point) {
        if self.position != position {
            self.position = position;
            self.fire_hook();
        }
    }

    fn set_bounds(&mut self, bounds: Rect) {
        if self.bounds != bounds {
            self.bounds = bounds;
            self.fire_hook();
        }
    }

    fn animations(&self) -> Vec<(String, NodeAnimation)> {
        self.animations
            .iter()
            .map(|(name, animation)| (name.clone(), animation.clone()))
            .collect()
    }

    fn animation(&self, name: &str) -> Option<NodeAnimation> {
        self.animations.get(name).cloned()
    }

    fn add_animation(&mut self, name: &str, animation: NodeAnimation) {
        // Replacing moves the animation to the end of the apply order
        self.animations.shift_remove(name);
        self.animations.insert(name.to_string(), animation);
    }

    fn remove_animation(&mut self, name: &str) -> Option<NodeAnimation> {
        self.animations.shift_remove(name)
    }

    fn has_animations(&self) -> bool {
        !self.animations.is_empty()
    }

    fn presentation_frame(&self) -> Option<Rect> {
        self.presentation
    }

    fn set_geometry_hook(&mut self, hook: Option<GeometryHook>) {
        self.hook = hook;
    }
}

impl fmt::Debug for HeadlessNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeadlessNode")
            .field("id", &self.id)
            .field("position", &self.position)
            .field("bounds", &self.bounds)
            .field("anchor_point", &self.anchor_point)
            .field("animations", &self.animations.keys().collect::<Vec<_>>())
            .field("hooked", &self.hook.is_some())
            .finish()
    }
}
