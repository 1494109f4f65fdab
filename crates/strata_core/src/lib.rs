//! Strata Core
//!
//! Foundational pieces shared by the Strata animation subsystem:
//!
//! - **Geometry**: `Point`, `Size` and `Rect` value types
//! - **Diagnostics**: a non-fatal channel for invariant violations
//! - **Observation registry**: ordered, cancellable subscriptions with
//!   teardown of the owning resource when the last subscriber leaves
//! - **Run loop**: the single-threaded, cooperative turn/display-refresh
//!   model every entry point runs on
//!
//! # Example
//!
//! ```rust
//! use strata_core::registry::ObservationRegistry;
//!
//! let registry = ObservationRegistry::<i32>::new();
//! let token = registry.subscribe_seeded(0, |value| println!("now {value}"));
//!
//! registry.notify_distinct(&0); // same as the seed, nothing fires
//! registry.notify_distinct(&1); // prints "now 1"
//! token.cancel();
//! assert!(registry.is_empty());
//! ```

use std::fmt;

pub mod diagnostics;
pub mod geometry;
pub mod registry;
pub mod run_loop;

pub use diagnostics::{Diagnostic, DiagnosticSink, Diagnostics, RecordingSink, TracingSink};
pub use geometry::{Point, Rect, Size};
pub use registry::{ObservationRegistry, Subscription};
pub use run_loop::{FrameCallbackId, RunLoop};

/// Identity of a node in the host scene graph
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
