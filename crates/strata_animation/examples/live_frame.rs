//! Live frame demo
//!
//! A host node grows with a spring animation while an overlay tracks its
//! bounds. Both live frames are printed for every simulated refresh.
//!
//! Run with: cargo run -p strata_animation --example live_frame

use strata_animation::{
    add_full_size_tracking, AnimationDescriptor, AnimationKey, AnimationRetargeter, HeadlessNode,
    LiveFrameSampler, SharedNode, SpringConfig, TimingCurve,
};
use strata_core::{NodeId, Rect, RunLoop};

const REFRESH_INTERVAL: f64 = 1.0 / 60.0;

fn main() -> strata_animation::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let run_loop = RunLoop::new();
    let sampler = LiveFrameSampler::new(run_loop.clone());
    let retargeter = AnimationRetargeter::default();

    let host_node = HeadlessNode::shared(NodeId(1), Rect::new(20.0, 20.0, 120.0, 80.0));
    let overlay_node = HeadlessNode::shared(NodeId(2), Rect::ZERO);
    let host: SharedNode = host_node.clone();
    let overlay: SharedNode = overlay_node.clone();

    let _tracking = add_full_size_tracking(&sampler, &retargeter, &host, &overlay, None);
    let _host_frames = sampler.on_live_frame_change(&host, |frame| {
        println!("host    {frame:?}");
    });
    let _overlay_frames = sampler.on_live_frame_change(&overlay, |frame| {
        println!("overlay {frame:?}");
    });

    // Resize the host and attach an additive spring animation on its extent
    let curve = TimingCurve::from_spring_config(SpringConfig::gentle())?;
    let duration = curve.settling_duration(0.001)?;
    let old = host.borrow().bounds();
    let new = Rect::new(0.0, 0.0, 240.0, 160.0);
    host.borrow_mut().set_bounds(new);
    let resize = AnimationDescriptor::new(AnimationKey::Extent, curve, duration)
        .with_from(strata_animation::AnimatedValue::Rect(Rect::from_origin_size(
            old.origin,
            old.size - new.size,
        )))?
        .with_to(strata_animation::AnimatedValue::Rect(Rect::ZERO))?
        .additive(true);
    host.borrow_mut().add_animation("bounds", resize.into());

    // Two turns: the host's change, then the overlay's
    run_loop.run_turn();
    run_loop.run_turn();
    host_node.borrow_mut().attach_pending(run_loop.now());
    overlay_node.borrow_mut().attach_pending(run_loop.now());

    let mut now = run_loop.now();
    while run_loop.has_frame_callbacks() {
        now += REFRESH_INTERVAL;
        if now > duration {
            host_node.borrow_mut().remove_finished(now);
            overlay_node.borrow_mut().remove_finished(now);
        }
        run_loop.display_refresh(now);
    }

    tracing::info!(duration, "animation settled");
    Ok(())
}
