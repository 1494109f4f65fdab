//! Cooperative run loop
//!
//! Everything in Strata runs on one thread: the host UI thread. This type
//! models the two ways work gets scheduled there:
//!
//! - **Turns**: `defer()` queues a callback for the next turn. A turn only
//!   drains what was queued before it started, so a callback that defers
//!   again runs one turn later.
//! - **Display refresh**: frame callbacks run once per `display_refresh()`,
//!   in registration order, with the refresh timestamp.
//!
//! The handle is cheap to clone. Callbacks may schedule or remove work
//! re-entrantly; no borrow is held while they run.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use slotmap::{new_key_type, SlotMap};

new_key_type! {
    /// Handle to a registered display-refresh callback
    pub struct FrameCallbackId;
}

type FrameCallback = Rc<dyn Fn(f64)>;

struct RunLoopInner {
    deferred: VecDeque<Box<dyn FnOnce()>>,
    frame_callbacks: SlotMap<FrameCallbackId, FrameCallback>,
    /// Registration order; slotmap iteration order is slot order
    frame_order: Vec<FrameCallbackId>,
    now: f64,
    turns: u64,
}

/// Single-threaded turn and display-refresh scheduler
#[derive(Clone)]
pub struct RunLoop {
    inner: Rc<RefCell<RunLoopInner>>,
}

impl RunLoop {
    pub fn new() -> Self {
        Self::starting_at(0.0)
    }

    /// Create a run loop whose clock starts at `now` (seconds)
    pub fn starting_at(now: f64) -> Self {
        Self {
            inner: Rc::new(RefCell::new(RunLoopInner {
                deferred: VecDeque::new(),
                frame_callbacks: SlotMap::with_key(),
                frame_order: Vec::new(),
                now,
                turns: 0,
            })),
        }
    }

    /// Current clock time in seconds
    pub fn now(&self) -> f64 {
        self.inner.borrow().now
    }

    /// Advance the clock without running anything
    ///
    /// The clock never moves backwards.
    pub fn advance_to(&self, now: f64) {
        let mut inner = self.inner.borrow_mut();
        if now > inner.now {
            inner.now = now;
        }
    }

    /// Number of turns run so far
    pub fn turns(&self) -> u64 {
        self.inner.borrow().turns
    }

    // =========================================================================
    // Turns
    // =========================================================================

    /// Queue `f` to run on the next turn
    pub fn defer<F>(&self, f: F)
    where
        F: FnOnce() + 'static,
    {
        self.inner.borrow_mut().deferred.push_back(Box::new(f));
    }

    pub fn pending_turn_callbacks(&self) -> usize {
        self.inner.borrow().deferred.len()
    }

    /// Run one turn
    ///
    /// Returns the number of deferred callbacks executed.
    pub fn run_turn(&self) -> usize {
        let batch: Vec<Box<dyn FnOnce()>> = {
            let mut inner = self.inner.borrow_mut();
            inner.turns += 1;
            inner.deferred.drain(..).collect()
        };

        let count = batch.len();
        for callback in batch {
            callback();
        }
        if count > 0 {
            tracing::trace!(count, "run loop turn drained deferred callbacks");
        }
        count
    }

    // =========================================================================
    // Display refresh
    // =========================================================================

    /// Register a callback invoked on every display refresh
    pub fn add_frame_callback<F>(&self, f: F) -> FrameCallbackId
    where
        F: Fn(f64) + 'static,
    {
        let mut inner = self.inner.borrow_mut();
        let id = inner.frame_callbacks.insert(Rc::new(f));
        inner.frame_order.push(id);
        id
    }

    /// Unregister a frame callback; unknown ids are ignored
    pub fn remove_frame_callback(&self, id: FrameCallbackId) -> bool {
        let mut inner = self.inner.borrow_mut();
        inner.frame_order.retain(|other| *other != id);
        inner.frame_callbacks.remove(id).is_some()
    }

    pub fn has_frame_callbacks(&self) -> bool {
        !self.inner.borrow().frame_callbacks.is_empty()
    }

    pub fn frame_callback_count(&self) -> usize {
        self.inner.borrow().frame_callbacks.len()
    }

    /// Deliver one display refresh at `timestamp`, then run a turn
    pub fn display_refresh(&self, timestamp: f64) {
        self.advance_to(timestamp);

        let snapshot: Vec<(FrameCallbackId, FrameCallback)> = {
            let inner = self.inner.borrow();
            inner
                .frame_order
                .iter()
                .filter_map(|id| inner.frame_callbacks.get(*id).map(|cb| (*id, Rc::clone(cb))))
                .collect()
        };

        let now = self.now();
        for (id, callback) in snapshot {
            // Removed by an earlier callback in this refresh
            if !self.inner.borrow().frame_callbacks.contains_key(id) {
                continue;
            }
            callback(now);
        }

        self.run_turn();
    }
}

impl Default for RunLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RunLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("RunLoop")
            .field("now", &inner.now)
            .field("turns", &inner.turns)
            .field("deferred", &inner.deferred.len())
            .field("frame_callbacks", &inner.frame_callbacks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_deferred_runs_on_next_turn_only() {
        let run_loop = RunLoop::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        let rl = run_loop.clone();
        let log2 = Rc::clone(&log);
        run_loop.defer(move || {
            log2.borrow_mut().push("first");
            let log3 = Rc::clone(&log2);
            rl.defer(move || log3.borrow_mut().push("second"));
        });

        assert_eq!(run_loop.run_turn(), 1);
        assert_eq!(*log.borrow(), vec!["first"]);
        assert_eq!(run_loop.pending_turn_callbacks(), 1);

        assert_eq!(run_loop.run_turn(), 1);
        assert_eq!(*log.borrow(), vec!["first", "second"]);
    }

    #[test]
    fn test_frame_callbacks_in_registration_order() {
        let run_loop = RunLoop::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        for name in ["a", "b", "c"] {
            let log = Rc::clone(&log);
            run_loop.add_frame_callback(move |t| log.borrow_mut().push(format!("{name}@{t}")));
        }

        run_loop.display_refresh(0.5);
        assert_eq!(*log.borrow(), vec!["a@0.5", "b@0.5", "c@0.5"]);
    }

    #[test]
    fn test_frame_callback_can_remove_itself() {
        let run_loop = RunLoop::new();
        let calls = Rc::new(Cell::new(0));
        let id_slot: Rc<Cell<Option<FrameCallbackId>>> = Rc::new(Cell::new(None));

        let rl = run_loop.clone();
        let slot = Rc::clone(&id_slot);
        let counter = Rc::clone(&calls);
        let id = run_loop.add_frame_callback(move |_| {
            counter.set(counter.get() + 1);
            if let Some(id) = slot.get() {
                rl.remove_frame_callback(id);
            }
        });
        id_slot.set(Some(id));

        run_loop.display_refresh(1.0);
        run_loop.display_refresh(2.0);
        assert_eq!(calls.get(), 1);
        assert!(!run_loop.has_frame_callbacks());
    }

    #[test]
    fn test_clock_is_monotonic() {
        let run_loop = RunLoop::starting_at(10.0);
        run_loop.advance_to(5.0);
        assert_eq!(run_loop.now(), 10.0);
        run_loop.display_refresh(10.25);
        assert_eq!(run_loop.now(), 10.25);
    }
}
