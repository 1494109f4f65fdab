//! Diagnostics channel
//!
//! Invariant violations detected while sampling or retargeting are never
//! fatal. They are reported here exactly once per occurrence, with enough
//! structured context to identify the node and the offending value, and the
//! caller then degrades to its last known-good value.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use thiserror::Error;

use crate::geometry::Rect;
use crate::NodeId;

/// A recoverable fault surfaced to the host
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Diagnostic {
    /// An in-flight animation is neither a property animation nor a transition
    #[error("node {node}: animation `{name}` has an unrecognized shape ({description})")]
    UnrecognizedAnimation {
        node: NodeId,
        name: String,
        description: String,
    },

    /// A timing curve failed to produce a progress value
    #[error("node {node}: timing curve of `{name}` could not be solved: {reason}")]
    UnsolvableCurve {
        node: NodeId,
        name: String,
        reason: String,
    },

    /// Composition produced NaN or infinite components
    #[error("node {node}: composed frame is not finite: {frame:?}")]
    NonFiniteFrame { node: NodeId, frame: Rect },

    /// The reference animation handed to the retargeter cannot be duplicated
    #[error("node {node}: animation `{name}` cannot be retargeted ({description})")]
    UnretargetableReference {
        node: NodeId,
        name: String,
        description: String,
    },

    /// A tracking operation targeted a dependent without tracking state
    #[error("node {node}: dependent has no tracking state")]
    MissingTracking { node: NodeId },

    /// An observed node was dropped by its owner while still observed
    #[error("node {node}: node was released while observed")]
    NodeReleased { node: NodeId },
}

impl Diagnostic {
    /// The node the diagnostic refers to
    pub fn node(&self) -> NodeId {
        match self {
            Diagnostic::UnrecognizedAnimation { node, .. }
            | Diagnostic::UnsolvableCurve { node, .. }
            | Diagnostic::NonFiniteFrame { node, .. }
            | Diagnostic::UnretargetableReference { node, .. }
            | Diagnostic::MissingTracking { node }
            | Diagnostic::NodeReleased { node } => *node,
        }
    }
}

/// Destination for diagnostics
pub trait DiagnosticSink {
    fn report(&self, diagnostic: &Diagnostic);
}

/// Logs every diagnostic through `tracing`
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn report(&self, diagnostic: &Diagnostic) {
        tracing::error!(target: "strata::diagnostics", node = %diagnostic.node(), "{}", diagnostic);
    }
}

/// Collects diagnostics in memory
///
/// Useful for host test harnesses that want to assert on reported faults.
#[derive(Clone, Debug, Default)]
pub struct RecordingSink {
    records: Rc<RefCell<Vec<Diagnostic>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything reported so far
    pub fn records(&self) -> Vec<Diagnostic> {
        self.records.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.records.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.records.borrow_mut().clear();
    }
}

impl DiagnosticSink for RecordingSink {
    fn report(&self, diagnostic: &Diagnostic) {
        tracing::debug!(target: "strata::diagnostics", "recorded: {}", diagnostic);
        self.records.borrow_mut().push(diagnostic.clone());
    }
}

/// Cheap-to-clone handle to the host's diagnostics channel
#[derive(Clone)]
pub struct Diagnostics {
    sink: Rc<dyn DiagnosticSink>,
    reported: Rc<Cell<usize>>,
}

impl Diagnostics {
    pub fn new(sink: impl DiagnosticSink + 'static) -> Self {
        Self {
            sink: Rc::new(sink),
            reported: Rc::new(Cell::new(0)),
        }
    }

    /// Report one occurrence of a fault
    pub fn report(&self, diagnostic: Diagnostic) {
        self.reported.set(self.reported.get() + 1);
        self.sink.report(&diagnostic);
    }

    /// Total number of diagnostics reported through this handle and its clones
    pub fn reported(&self) -> usize {
        self.reported.get()
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new(TracingSink)
    }
}

impl fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Diagnostics")
            .field("reported", &self.reported.get())
            .finish()
    }
}
