//! Frame composition
//!
//! Folds every in-flight animation on a node into one frame. Each of the
//! four geometric components (x, y, width, height) is composed on its own:
//!
//! 1. The base starts at the model value.
//! 2. Absolute animations replace the base, in apply order, so the last
//!    one on a component owns it. Missing endpoints fall back to the model
//!    value.
//! 3. Additive animations then add `(from - to) * (1 - progress)`. Missing
//!    endpoints count as zero.
//!
//! The composed position and size are turned into a frame through the
//! node's anchor point.

use smallvec::SmallVec;
use strata_core::{Point, Rect, Size};

use crate::descriptor::{AnimatedValue, AnimationDescriptor, AnimationKey, NodeAnimation};
use crate::error::AnimationError;
use crate::node::ModelGeometry;

/// A fault found while composing; the offending animation was skipped
#[derive(Clone, Debug, PartialEq)]
pub enum ComposeFault {
    Unrecognized { name: String, description: String },
    Unsolvable { name: String, reason: AnimationError },
}

impl ComposeFault {
    pub fn name(&self) -> &str {
        match self {
            ComposeFault::Unrecognized { name, .. } | ComposeFault::Unsolvable { name, .. } => name,
        }
    }
}

/// Result of one composition pass
#[derive(Clone, Debug, PartialEq)]
pub struct Composition {
    /// `None` when a tracked animation has no begin time yet
    pub frame: Option<Rect>,
    pub faults: SmallVec<[ComposeFault; 2]>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct Components {
    x: f64,
    y: f64,
    width: f64,
    height: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Component {
    X,
    Y,
    Width,
    Height,
}

impl Components {
    fn from_model(model: &ModelGeometry) -> Self {
        Self {
            x: model.position.x as f64,
            y: model.position.y as f64,
            width: model.bounds.size.width as f64,
            height: model.bounds.size.height as f64,
        }
    }

    fn get(&self, component: Component) -> f64 {
        match component {
            Component::X => self.x,
            Component::Y => self.y,
            Component::Width => self.width,
            Component::Height => self.height,
        }
    }

    fn get_mut(&mut self, component: Component) -> &mut f64 {
        match component {
            Component::X => &mut self.x,
            Component::Y => &mut self.y,
            Component::Width => &mut self.width,
            Component::Height => &mut self.height,
        }
    }
}

fn components_of(key: AnimationKey) -> &'static [Component] {
    match key {
        AnimationKey::Position => &[Component::X, Component::Y],
        AnimationKey::PositionX => &[Component::X],
        AnimationKey::PositionY => &[Component::Y],
        AnimationKey::Extent | AnimationKey::ExtentSize => &[Component::Width, Component::Height],
        AnimationKey::ExtentWidth => &[Component::Width],
        AnimationKey::ExtentHeight => &[Component::Height],
    }
}

/// One component of `value`
///
/// Rect-valued extent animations only contribute their size.
fn component_value(value: &AnimatedValue, component: Component) -> f64 {
    let v = match (value, component) {
        (AnimatedValue::Scalar(s), _) => *s,
        (AnimatedValue::Point(p), Component::X) => p.x,
        (AnimatedValue::Point(p), Component::Y) => p.y,
        (AnimatedValue::Point(_), _) => 0.0,
        (AnimatedValue::Size(s), Component::Width) => s.width,
        (AnimatedValue::Size(s), Component::Height) => s.height,
        (AnimatedValue::Size(_), _) => 0.0,
        (AnimatedValue::Rect(r), Component::Width) => r.size.width,
        (AnimatedValue::Rect(r), Component::Height) => r.size.height,
        (AnimatedValue::Rect(r), Component::X) => r.origin.x,
        (AnimatedValue::Rect(r), Component::Y) => r.origin.y,
    };
    v as f64
}

struct Sample<'a> {
    descriptor: &'a AnimationDescriptor,
    progress: f64,
}

/// Compose `animations` over `model` at clock time `now`
///
/// `lead` shifts every animation's elapsed time forward to compensate for
/// the delay between sampling and display.
pub fn compose(
    model: &ModelGeometry,
    animations: &[(String, NodeAnimation)],
    now: f64,
    lead: f64,
) -> Composition {
    let mut faults = SmallVec::new();
    let mut samples: SmallVec<[Sample<'_>; 4]> = SmallVec::new();

    for (name, animation) in animations {
        let descriptor = match animation {
            NodeAnimation::Property(descriptor) => descriptor,
            NodeAnimation::Transition { .. } => continue,
            NodeAnimation::Opaque { description } => {
                faults.push(ComposeFault::Unrecognized {
                    name: name.clone(),
                    description: description.clone(),
                });
                continue;
            }
        };

        let Some(elapsed) = descriptor.elapsed_fraction(now, lead) else {
            return Composition {
                frame: None,
                faults,
            };
        };

        match descriptor.curve().solve_for_input(elapsed) {
            Ok(progress) => samples.push(Sample {
                descriptor,
                progress,
            }),
            Err(reason) => faults.push(ComposeFault::Unsolvable {
                name: name.clone(),
                reason,
            }),
        }
    }

    let model_components = Components::from_model(model);
    let mut composed = model_components;

    for sample in samples.iter().filter(|s| !s.descriptor.is_additive()) {
        let descriptor = sample.descriptor;
        for &component in components_of(descriptor.key()) {
            let model_value = model_components.get(component);
            let from = descriptor
                .from_value()
                .map(|v| component_value(&v, component))
                .unwrap_or(model_value);
            let to = descriptor
                .to_value()
                .map(|v| component_value(&v, component))
                .unwrap_or(model_value);
            *composed.get_mut(component) = from + (to - from) * sample.progress;
        }
    }

    for sample in samples.iter().filter(|s| s.descriptor.is_additive()) {
        let descriptor = sample.descriptor;
        for &component in components_of(descriptor.key()) {
            let from = descriptor
                .from_value()
                .map(|v| component_value(&v, component))
                .unwrap_or(0.0);
            let to = descriptor
                .to_value()
                .map(|v| component_value(&v, component))
                .unwrap_or(0.0);
            *composed.get_mut(component) += (from - to) * (1.0 - sample.progress);
        }
    }

    let position = Point::new(composed.x as f32, composed.y as f32);
    let size = Size::new(composed.width as f32, composed.height as f32);
    Composition {
        frame: Some(Rect::from_anchor(position, model.anchor_point, size)),
        faults,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve::TimingCurve;
    use crate::descriptor::BeginTime;

    fn model() -> ModelGeometry {
        ModelGeometry {
            position: Point::new(60.0, 120.0),
            anchor_point: Point::new(0.5, 0.5),
            bounds: Rect::new(0.0, 0.0, 100.0, 200.0),
        }
    }

    fn additive_position(dx: f32, dy: f32, duration: f64) -> NodeAnimation {
        AnimationDescriptor::new(AnimationKey::Position, TimingCurve::linear(), duration)
            .with_from(AnimatedValue::Point(Point::new(dx, dy)))
            .and_then(|d| d.with_to(AnimatedValue::Point(Point::ZERO)))
            .unwrap()
            .additive(true)
            .begin_at(BeginTime::Attached(0.0))
            .into()
    }

    fn named(animations: Vec<NodeAnimation>) -> Vec<(String, NodeAnimation)> {
        animations
            .into_iter()
            .enumerate()
            .map(|(i, a)| (format!("anim{i}"), a))
            .collect()
    }

    fn position_of(frame: Rect) -> Point {
        frame.anchor_position(Point::new(0.5, 0.5))
    }

    #[test]
    fn test_additive_halfway() {
        let animations = named(vec![additive_position(-50.0, -90.0, 0.25)]);
        let composition = compose(&model(), &animations, 0.125, 0.0);
        let frame = composition.frame.unwrap();

        assert_eq!(position_of(frame), Point::new(35.0, 75.0));
        assert_eq!(frame.size, Size::new(100.0, 200.0));
        assert!(composition.faults.is_empty());
    }

    #[test]
    fn test_no_animations_is_model_frame() {
        let composition = compose(&model(), &[], 3.0, 0.0);
        assert_eq!(composition.frame, Some(model().frame()));
    }

    #[test]
    fn test_additive_animations_sum() {
        let stacked = named(vec![
            additive_position(-20.0, 10.0, 1.0),
            additive_position(-30.0, -40.0, 1.0),
        ]);
        let single = named(vec![additive_position(-50.0, -30.0, 1.0)]);

        for step in 0..=8 {
            let now = step as f64 / 8.0;
            let a = compose(&model(), &stacked, now, 0.0).frame.unwrap();
            let b = compose(&model(), &single, now, 0.0).frame.unwrap();
            assert!((a.origin.x - b.origin.x).abs() < 1e-4, "x at {now}");
            assert!((a.origin.y - b.origin.y).abs() < 1e-4, "y at {now}");
        }
    }

    #[test]
    fn test_absolute_overrides_base_and_additive_still_applies() {
        let absolute: NodeAnimation =
            AnimationDescriptor::new(AnimationKey::PositionX, TimingCurve::linear(), 1.0)
                .with_from(AnimatedValue::Scalar(0.0))
                .and_then(|d| d.with_to(AnimatedValue::Scalar(200.0)))
                .unwrap()
                .begin_at(BeginTime::Attached(0.0))
                .into();
        let animations = named(vec![additive_position(-40.0, 0.0, 1.0), absolute]);

        let frame = compose(&model(), &animations, 0.5, 0.0).frame.unwrap();
        // base x = 100 from the absolute animation, plus -40 * 0.5
        assert_eq!(position_of(frame), Point::new(80.0, 120.0));
    }

    #[test]
    fn test_later_absolute_wins() {
        let absolute = |to: f32| -> NodeAnimation {
            AnimationDescriptor::new(AnimationKey::ExtentWidth, TimingCurve::linear(), 1.0)
                .with_to(AnimatedValue::Scalar(to))
                .unwrap()
                .begin_at(BeginTime::Attached(0.0))
                .into()
        };
        let animations = named(vec![absolute(300.0), absolute(500.0)]);
        let frame = compose(&model(), &animations, 1.0, 0.0).frame.unwrap();
        assert_eq!(frame.size.width, 500.0);
    }

    #[test]
    fn test_pending_begin_time_yields_no_frame() {
        let pending: NodeAnimation =
            AnimationDescriptor::new(AnimationKey::Position, TimingCurve::linear(), 1.0).into();
        let animations = named(vec![additive_position(-10.0, 0.0, 1.0), pending]);
        assert_eq!(compose(&model(), &animations, 0.5, 0.0).frame, None);
    }

    #[test]
    fn test_faulty_animation_is_skipped() {
        let broken: NodeAnimation = AnimationDescriptor::new(
            AnimationKey::Position,
            TimingCurve::cubic_bezier(2.0, 0.0, 0.5, 1.0),
            1.0,
        )
        .with_to(AnimatedValue::Point(Point::ZERO))
        .unwrap()
        .begin_at(BeginTime::Attached(0.0))
        .into();
        let opaque = NodeAnimation::Opaque {
            description: "keyframe path".into(),
        };
        let animations = named(vec![broken, opaque, additive_position(-50.0, -90.0, 0.25)]);

        let composition = compose(&model(), &animations, 0.125, 0.0);
        assert_eq!(position_of(composition.frame.unwrap()), Point::new(35.0, 75.0));
        assert_eq!(composition.faults.len(), 2);
        assert_eq!(composition.faults[0].name(), "anim0");
        assert!(matches!(composition.faults[1], ComposeFault::Unrecognized { .. }));
    }

    #[test]
    fn test_lead_projects_ahead() {
        let animations = named(vec![additive_position(-50.0, -90.0, 0.25)]);
        let position = position_of(compose(&model(), &animations, 0.1, 0.025).frame.unwrap());
        assert!((position.x - 35.0).abs() < 1e-3, "got {position:?}");
        assert!((position.y - 75.0).abs() < 1e-3, "got {position:?}");
    }
}
