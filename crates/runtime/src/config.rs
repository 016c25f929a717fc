//! Runtime settings shared by the control layers of one program graph.

use serde::{Deserialize, Serialize};

use crate::data::DataPointer;
use crate::layers::{
    Case, GuardedLayer, RecursiveLayer, DEFAULT_GUARD_THRESHOLD, DEFAULT_RECURSION_DEPTH,
    DEFAULT_TAIL_RECURSION_DEPTH,
};
use crate::network::NetRef;
use crate::pattern::Pattern;

// ============================================================================
// Runtime Configuration
// ============================================================================

/// Configuration for guarded dispatch and recursion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Confidence a case needs in at least one row to run
    pub guard_threshold: f32,
    /// Run cases only on the rows that clear the threshold
    pub select_rows: bool,
    /// Bound for general recursion
    pub recursion_depth: usize,
    /// Bound for tail recursion
    pub tail_recursion_depth: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            guard_threshold: DEFAULT_GUARD_THRESHOLD,
            select_rows: false,
            recursion_depth: DEFAULT_RECURSION_DEPTH,
            tail_recursion_depth: DEFAULT_TAIL_RECURSION_DEPTH,
        }
    }
}

impl RuntimeConfig {
    /// Set the guard threshold.
    pub fn with_guard_threshold(mut self, threshold: f32) -> Self {
        self.guard_threshold = threshold;
        self
    }

    /// Set row selection for cases.
    pub fn with_select_rows(mut self, select_rows: bool) -> Self {
        self.select_rows = select_rows;
        self
    }

    /// Set the general recursion bound.
    pub fn with_recursion_depth(mut self, depth: usize) -> Self {
        self.recursion_depth = depth;
        self
    }

    /// Set the tail recursion bound.
    pub fn with_tail_recursion_depth(mut self, depth: usize) -> Self {
        self.tail_recursion_depth = depth;
        self
    }

    // ========================================================================
    // Factories
    // ========================================================================

    pub fn case(&self, pattern: Pattern, net: NetRef) -> Case {
        Case::new(pattern, net)
            .with_threshold(self.guard_threshold)
            .with_select_rows(self.select_rows)
    }

    /// A guarded layer over `(pattern, net)` pairs.
    pub fn guarded(
        &self,
        cases: Vec<(Pattern, NetRef)>,
        mismatch_handler: NetRef,
        pointer: DataPointer,
    ) -> GuardedLayer {
        let cases = cases
            .into_iter()
            .map(|(pattern, net)| self.case(pattern, net))
            .collect();
        GuardedLayer::new(cases, mismatch_handler, pointer)
    }

    pub fn recursive(&self, net: NetRef, depth_handler: NetRef, pointer: DataPointer) -> RecursiveLayer {
        RecursiveLayer::new(net, depth_handler, pointer).with_max_depth(self.recursion_depth)
    }

    pub fn tail_recursive(
        &self,
        net: NetRef,
        depth_handler: NetRef,
        pointer: DataPointer,
    ) -> RecursiveLayer {
        RecursiveLayer::tail(net, depth_handler, pointer).with_max_depth(self.tail_recursion_depth)
    }
}
