//! Statement traces of single runs.

use std::collections::HashSet;

use crate::location::{Arc, FunctionId, Location};
use crate::path::BranchSite;
use crate::probe::EventSource;
use crate::value::SymbolicValue;

/// Executed statements of one run, in execution order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Trace {
    locations: Vec<Location>,
}

impl Trace {
    pub fn new(locations: Vec<Location>) -> Self {
        Self { locations }
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    pub fn locations(&self) -> &[Location] {
        &self.locations
    }

    pub fn iter(&self) -> impl Iterator<Item = &Location> + '_ {
        self.locations.iter()
    }

    /// Arcs between consecutive entries.
    pub fn arcs(&self) -> impl Iterator<Item = Arc> + '_ {
        self.locations.windows(2).map(|w| Arc::new(w[0].clone(), w[1].clone()))
    }
}

impl FromIterator<Location> for Trace {
    fn from_iter<T: IntoIterator<Item = Location>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Collects the statements of one run.
///
/// The recorder has an identity of its own and drops every event attributed to
/// it or to any other function it was told to ignore. Filtering compares
/// identities, so a target that shares a name with an ignored function is
/// still recorded.
#[derive(Debug)]
pub struct TraceRecorder {
    identity: FunctionId,
    ignored: HashSet<FunctionId>,
    locations: Vec<Location>,
}

impl TraceRecorder {
    pub fn new() -> Self {
        let identity = FunctionId::fresh("trace_recorder");
        let ignored = HashSet::from([identity.clone()]);
        Self {
            identity,
            ignored,
            locations: Vec::new(),
        }
    }

    pub fn identity(&self) -> &FunctionId {
        &self.identity
    }

    /// Excludes the events of `function` from the trace.
    pub fn ignore(&mut self, function: FunctionId) {
        self.ignored.insert(function);
    }

    pub fn accepts(&self, function: &FunctionId) -> bool {
        !self.ignored.contains(function)
    }

    pub fn record(&mut self, location: &Location) {
        if self.accepts(&location.function) {
            self.locations.push(location.clone());
        }
    }

    pub fn finish(self) -> Trace {
        Trace::new(self.locations)
    }
}

impl Default for TraceRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSource for TraceRecorder {
    fn on_statement(&mut self, location: &Location) {
        self.record(location);
    }

    fn on_branch(&mut self, _site: &BranchSite, _predicate: &SymbolicValue, _outcome: bool) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arcs_of_three() {
        let f = FunctionId::fresh("f");
        let trace: Trace = [f.at(1), f.at(2), f.at(3)].into_iter().collect();
        let arcs: HashSet<Arc> = trace.arcs().collect();
        assert_eq!(arcs, HashSet::from([Arc::new(f.at(1), f.at(2)), Arc::new(f.at(2), f.at(3))]));
    }

    #[test]
    fn test_short_traces_have_no_arcs() {
        let f = FunctionId::fresh("f");
        assert_eq!(Trace::default().arcs().count(), 0);
        assert_eq!(Trace::new(vec![f.at(1)]).arcs().count(), 0);
    }

    #[test]
    fn test_recorder_filters_by_identity() {
        let mut recorder = TraceRecorder::new();
        let own = recorder.identity().clone();
        let impostor = FunctionId::fresh(own.name());
        let helper = FunctionId::fresh("helper");
        recorder.ignore(helper.clone());

        recorder.on_statement(&own.at(1));
        recorder.on_statement(&impostor.at(1));
        recorder.on_statement(&helper.at(7));
        recorder.on_statement(&impostor.at(2));

        assert_eq!(recorder.finish().locations(), &[impostor.at(1), impostor.at(2)]);
    }

    #[test]
    fn test_recorders_are_independent() {
        let f = FunctionId::fresh("f");
        let mut first = TraceRecorder::new();
        let second = TraceRecorder::new();
        first.record(&f.at(1));
        assert_ne!(first.identity(), second.identity());
        assert_eq!(first.finish().len(), 1);
        assert!(second.finish().is_empty());
    }
}
