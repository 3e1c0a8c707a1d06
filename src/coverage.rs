//! Session-wide coverage of statements and arcs.
//!
//! Both sets only ever grow. The search driver is the single writer; the
//! divergence selector reads it between runs.

use std::collections::HashSet;
use std::fmt;

use crate::location::{Arc, Location};
use crate::trace::Trace;

/// Every statement and arc observed so far.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Coverage {
    lines: HashSet<Location>,
    arcs: HashSet<Arc>,
}

/// What one [`Coverage::accumulate`] added, in trace order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoverageDelta {
    pub new_lines: Vec<Location>,
    pub new_arcs: Vec<Arc>,
}

impl CoverageDelta {
    pub fn is_empty(&self) -> bool {
        self.new_lines.is_empty() && self.new_arcs.is_empty()
    }
}

impl Coverage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds a trace into the coverage.
    pub fn accumulate(&mut self, trace: &Trace) -> CoverageDelta {
        let mut delta = CoverageDelta::default();
        for location in trace.iter() {
            if self.lines.insert(location.clone()) {
                delta.new_lines.push(location.clone());
            }
        }
        for arc in trace.arcs() {
            if !self.arcs.contains(&arc) {
                self.arcs.insert(arc.clone());
                delta.new_arcs.push(arc);
            }
        }
        delta
    }

    pub fn has_line(&self, location: &Location) -> bool {
        self.lines.contains(location)
    }

    pub fn has_arc(&self, arc: &Arc) -> bool {
        self.arcs.contains(arc)
    }

    pub fn lines(&self) -> &HashSet<Location> {
        &self.lines
    }

    pub fn arcs(&self) -> &HashSet<Arc> {
        &self.arcs
    }

    pub fn num_lines(&self) -> usize {
        self.lines.len()
    }

    pub fn num_arcs(&self) -> usize {
        self.arcs.len()
    }

    /// Whether everything in `other` is covered here as well.
    pub fn includes(&self, other: &Coverage) -> bool {
        self.lines.is_superset(&other.lines) && self.arcs.is_superset(&other.arcs)
    }

    /// Covered lines in a stable order.
    pub fn sorted_lines(&self) -> Vec<&Location> {
        let mut lines: Vec<_> = self.lines.iter().collect();
        lines.sort();
        lines
    }
}

impl fmt::Display for Coverage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} lines, {} arcs", self.lines.len(), self.arcs.len())
    }
}
