//! Choice of the next branch to flip.
//!
//! A branch outcome is *novel* while its successor has not been observed. The
//! arc policy asks whether the arc from the branch to the un-taken successor
//! was ever traversed, the line policy only whether the successor line ran.
//! The arc policy is strictly finer: a successor reachable from elsewhere
//! still counts as unexplored from this branch.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use log::trace;

use crate::coverage::Coverage;
use crate::path::{BranchOutcome, PathCondition, PathConstraint};
use crate::solver::Formula;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum Policy {
    Line,
    #[default]
    Arc,
}

/// A branch to flip and the formula whose models flip it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Divergence {
    /// Position of the flipped constraint in the path condition.
    pub index: usize,
    /// The outcome the new input must take.
    pub target: BranchOutcome,
    /// Prefix of the path condition and the negated predicate.
    pub formula: Formula,
}

/// Exclusion bookkeeping for branch outcomes.
///
/// Unsat outcomes are unreachable for good. Unknown outcomes get a retry
/// counter and are held back until another run has been absorbed; reaching
/// the cap makes them permanently unresolved. Outcomes with a queued, not yet
/// executed input are pending.
#[derive(Debug, Clone)]
pub struct Ledger {
    max_retries: u32,
    unreachable: BTreeSet<BranchOutcome>,
    unresolved: BTreeMap<BranchOutcome, String>,
    /// Undecided attempts so far and the last reason.
    retries: HashMap<BranchOutcome, (u32, String)>,
    deferred: HashSet<BranchOutcome>,
    pending: HashSet<BranchOutcome>,
}

impl Ledger {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries: max_retries.max(1),
            unreachable: BTreeSet::new(),
            unresolved: BTreeMap::new(),
            retries: HashMap::new(),
            deferred: HashSet::new(),
            pending: HashSet::new(),
        }
    }

    pub fn is_excluded(&self, outcome: &BranchOutcome) -> bool {
        self.unreachable.contains(outcome)
            || self.unresolved.contains_key(outcome)
            || self.deferred.contains(outcome)
            || self.pending.contains(outcome)
    }

    pub fn retries(&self, outcome: &BranchOutcome) -> u32 {
        self.retries.get(outcome).map_or(0, |(count, _)| *count)
    }

    pub fn mark_unreachable(&mut self, outcome: BranchOutcome) {
        self.retries.remove(&outcome);
        self.deferred.remove(&outcome);
        self.unreachable.insert(outcome);
    }

    /// Counts one undecided attempt. Returns `true` once the outcome is given up.
    ///
    /// An outcome that is not given up stays excluded until [`Ledger::reopen`].
    pub fn record_unknown(&mut self, outcome: BranchOutcome, reason: &str) -> bool {
        let entry = self.retries.entry(outcome.clone()).or_insert((0, String::new()));
        entry.0 += 1;
        entry.1 = reason.to_string();
        if entry.0 >= self.max_retries {
            self.retries.remove(&outcome);
            self.deferred.remove(&outcome);
            self.unresolved.insert(outcome, reason.to_string());
            true
        } else {
            self.deferred.insert(outcome);
            false
        }
    }

    /// Makes held-back outcomes eligible again; called after each absorbed run.
    pub fn reopen(&mut self) {
        self.deferred.clear();
    }

    /// Gives up every outcome that still has retries left, keeping its last reason.
    pub fn give_up(&mut self) {
        self.deferred.clear();
        for (outcome, (_, reason)) in self.retries.drain() {
            self.unresolved.insert(outcome, reason);
        }
    }

    pub fn mark_pending(&mut self, outcome: BranchOutcome) {
        self.pending.insert(outcome);
    }

    pub fn settle(&mut self, outcome: &BranchOutcome) {
        self.pending.remove(outcome);
    }

    pub fn unreachable(&self) -> &BTreeSet<BranchOutcome> {
        &self.unreachable
    }

    /// Permanently unresolved outcomes with the last reason.
    pub fn unresolved(&self) -> &BTreeMap<BranchOutcome, String> {
        &self.unresolved
    }
}

impl Default for Ledger {
    fn default() -> Self {
        Ledger::new(3)
    }
}

#[derive(Debug, Copy, Clone, Default)]
pub struct DivergenceSelector {
    policy: Policy,
}

impl DivergenceSelector {
    pub fn new(policy: Policy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> Policy {
        self.policy
    }

    /// Whether the un-taken side of `constraint` is unexplored.
    pub fn is_novel(&self, constraint: &PathConstraint, coverage: &Coverage) -> bool {
        let untaken = !constraint.taken;
        match self.policy {
            Policy::Line => !coverage.has_line(constraint.site.successor(untaken)),
            Policy::Arc => !coverage.has_arc(&constraint.site.arc(untaken)),
        }
    }

    /// The earliest eligible divergence of `path`.
    pub fn select(&self, path: &PathCondition, coverage: &Coverage, ledger: &Ledger) -> Option<Divergence> {
        self.candidates(path, coverage, ledger).into_iter().next()
    }

    /// All eligible divergences of `path`.
    ///
    /// One per branch outcome (its earliest occurrence), in execution order,
    /// except that outcomes which already came back undecided go last.
    pub fn candidates(&self, path: &PathCondition, coverage: &Coverage, ledger: &Ledger) -> Vec<Divergence> {
        let mut seen = HashSet::new();
        let mut candidates = Vec::new();
        for (index, constraint) in path.iter().enumerate() {
            let target = constraint.site.outcome(!constraint.taken);
            if seen.contains(&target) || ledger.is_excluded(&target) || !self.is_novel(constraint, coverage) {
                continue;
            }
            let Some(flipped) = constraint.flipped() else {
                trace!("skip {}: predicate does not depend on inputs", target);
                continue;
            };
            let mut formula = path.prefix(index);
            formula.push(flipped);
            seen.insert(target.clone());
            candidates.push(Divergence { index, target, formula });
        }
        candidates.sort_by_key(|d| ledger.retries(&d.target) > 0);
        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::FunctionId;
    use crate::path::BranchSite;
    use crate::state::{Input, SymbolicState};
    use crate::trace::Trace;
    use crate::value::SymbolicValue;

    struct Fixture {
        f: FunctionId,
        path: PathCondition,
    }

    /// `if n < 0` at 1 (-> 2 | 3), `if n == 0` at 3 (-> 4 | 5), on `n = 5`.
    fn fixture() -> Fixture {
        let f = FunctionId::fresh("f");
        let state = SymbolicState::new(&Input::new().with("n", 5));
        let n = state.get("n").unwrap().clone();
        let mut path = PathCondition::new();
        path.push(PathConstraint {
            site: BranchSite::new(f.at(1), f.at(2), f.at(3)),
            predicate: n.lt(0),
            taken: false,
        });
        path.push(PathConstraint {
            site: BranchSite::new(f.at(3), f.at(4), f.at(5)),
            predicate: n.eq(0),
            taken: false,
        });
        Fixture { f, path }
    }

    #[test]
    fn test_first_novel_branch_wins() {
        let Fixture { f, path } = fixture();
        let mut coverage = Coverage::new();
        coverage.accumulate(&Trace::new(vec![f.at(1), f.at(3), f.at(5)]));

        let selector = DivergenceSelector::default();
        let d = selector.select(&path, &coverage, &Ledger::default()).unwrap();
        assert_eq!(d.index, 0);
        assert_eq!(d.target, BranchOutcome { at: f.at(1), outcome: true });
        assert_eq!(d.formula.to_string(), "(n < 0)");

        coverage.accumulate(&Trace::new(vec![f.at(1), f.at(2)]));
        let d = selector.select(&path, &coverage, &Ledger::default()).unwrap();
        assert_eq!(d.index, 1);
        assert_eq!(d.formula.to_string(), "(n >= 0) && (n == 0)");
    }

    #[test]
    fn test_arc_policy_is_finer_than_line_policy() {
        let Fixture { f, path } = fixture();
        let mut coverage = Coverage::new();
        // Line 2 ran, but never right after line 1.
        coverage.accumulate(&Trace::new(vec![f.at(1), f.at(3), f.at(5), f.at(2)]));

        let line = DivergenceSelector::new(Policy::Line);
        let arc = DivergenceSelector::new(Policy::Arc);
        let ledger = Ledger::default();
        assert_eq!(line.select(&path, &coverage, &ledger).unwrap().index, 1);
        assert_eq!(arc.select(&path, &coverage, &ledger).unwrap().index, 0);
    }

    #[test]
    fn test_ledger_exclusion_and_deprioritization() {
        let Fixture { f, path } = fixture();
        let coverage = Coverage::new();
        let selector = DivergenceSelector::default();
        let first = BranchOutcome { at: f.at(1), outcome: true };
        let second = BranchOutcome { at: f.at(3), outcome: true };

        let mut ledger = Ledger::new(2);
        assert!(!ledger.record_unknown(first.clone(), "timeout"));
        let order: Vec<usize> = selector.candidates(&path, &coverage, &ledger).iter().map(|d| d.index).collect();
        assert_eq!(order, vec![1]);
        ledger.reopen();
        let order: Vec<usize> = selector.candidates(&path, &coverage, &ledger).iter().map(|d| d.index).collect();
        assert_eq!(order, vec![1, 0]);

        assert!(ledger.record_unknown(first.clone(), "timeout"));
        assert_eq!(ledger.unresolved().get(&first).map(String::as_str), Some("timeout"));
        assert_eq!(ledger.retries(&first), 0);

        ledger.mark_unreachable(second.clone());
        assert!(selector.select(&path, &coverage, &ledger).is_none());
        assert!(ledger.unreachable().contains(&second));
    }

    #[test]
    fn test_leftover_retries_are_given_up() {
        let Fixture { f, .. } = fixture();
        let outcome = BranchOutcome { at: f.at(3), outcome: true };
        let mut ledger = Ledger::new(3);
        ledger.record_unknown(outcome.clone(), "timeout");
        ledger.reopen();
        ledger.record_unknown(outcome.clone(), "node limit");
        assert!(ledger.unresolved().is_empty());

        ledger.give_up();
        assert_eq!(ledger.unresolved().get(&outcome).map(String::as_str), Some("node limit"));
        assert!(ledger.is_excluded(&outcome));
    }

    #[test]
    fn test_pending_and_duplicates() {
        let f = FunctionId::fresh("loop");
        let state = SymbolicState::new(&Input::new().with("n", 2));
        let n = state.get("n").unwrap().clone();
        let site = BranchSite::new(f.at(1), f.at(2), f.at(3));
        let mut path = PathCondition::new();
        path.push(PathConstraint {
            site: site.clone(),
            predicate: n.gt(0),
            taken: true,
        });
        path.push(PathConstraint {
            site: site.clone(),
            predicate: (&n - 1).gt(0),
            taken: true,
        });
        path.push(PathConstraint {
            site,
            predicate: SymbolicValue::from(true),
            taken: true,
        });

        let selector = DivergenceSelector::default();
        let mut ledger = Ledger::default();
        let candidates = selector.candidates(&path, &Coverage::new(), &ledger);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].index, 0);

        ledger.mark_pending(candidates[0].target.clone());
        assert!(selector.select(&path, &Coverage::new(), &ledger).is_none());
        ledger.settle(&candidates[0].target);
        assert!(selector.select(&path, &Coverage::new(), &ledger).is_some());
    }
}
