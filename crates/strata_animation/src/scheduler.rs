//! Bounded tick scheduler
//!
//! Drives a callback on every display refresh for a limited span, then
//! stops itself. Restarting a running scheduler replaces its bound and its
//! callback; there is never more than one display-refresh registration per
//! scheduler.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use strata_core::{FrameCallbackId, RunLoop};

type TickCallback = Rc<dyn Fn(f64)>;

struct TickInner {
    run_loop: RunLoop,
    registration: Option<FrameCallbackId>,
    /// Clock time after which no further tick is delivered
    deadline: f64,
    on_tick: Option<TickCallback>,
}

/// Self-terminating per-refresh driver
pub struct TickScheduler {
    inner: Rc<RefCell<TickInner>>,
}

impl TickScheduler {
    pub fn new(run_loop: RunLoop) -> Self {
        Self {
            inner: Rc::new(RefCell::new(TickInner {
                run_loop,
                registration: None,
                deadline: f64::NEG_INFINITY,
                on_tick: None,
            })),
        }
    }

    /// (Re)start ticking for `duration` seconds from now
    pub fn run<F>(&self, duration: f64, on_tick: F)
    where
        F: Fn(f64) + 'static,
    {
        let (run_loop, needs_registration) = {
            let mut inner = self.inner.borrow_mut();
            inner.deadline = inner.run_loop.now() + duration.max(0.0);
            inner.on_tick = Some(Rc::new(on_tick));
            (inner.run_loop.clone(), inner.registration.is_none())
        };

        if needs_registration {
            let weak = Rc::downgrade(&self.inner);
            let id = run_loop.add_frame_callback(move |now| refresh(&weak, now));
            self.inner.borrow_mut().registration = Some(id);
            tracing::trace!(duration, "tick scheduler started");
        } else {
            tracing::trace!(duration, "tick scheduler bound refreshed");
        }
    }

    pub fn stop(&self) {
        stop(&self.inner);
    }

    pub fn is_running(&self) -> bool {
        self.inner.borrow().registration.is_some()
    }

    /// Clock time at which the current run ends
    pub fn deadline(&self) -> Option<f64> {
        let inner = self.inner.borrow();
        inner.registration.map(|_| inner.deadline)
    }
}

fn refresh(weak: &Weak<RefCell<TickInner>>, now: f64) {
    let Some(inner) = weak.upgrade() else {
        return;
    };

    let on_tick = {
        let state = inner.borrow();
        if now > state.deadline {
            None
        } else {
            state.on_tick.clone()
        }
    };

    match on_tick {
        Some(on_tick) => on_tick(now),
        None => {
            tracing::trace!(now, "tick scheduler bound elapsed");
            stop(&inner);
        }
    }
}

fn stop(inner: &Rc<RefCell<TickInner>>) {
    let (run_loop, registration, on_tick) = {
        let mut state = inner.borrow_mut();
        (
            state.run_loop.clone(),
            state.registration.take(),
            state.on_tick.take(),
        )
    };
    if let Some(id) = registration {
        run_loop.remove_frame_callback(id);
    }
    // Dropped outside the borrow; the callback may own other schedulers
    drop(on_tick);
}

impl Drop for TickScheduler {
    fn drop(&mut self) {
        stop(&self.inner);
    }
}

impl fmt::Debug for TickScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("TickScheduler")
            .field("running", &inner.registration.is_some())
            .field("deadline", &inner.deadline)
            .finish()
    }
}
