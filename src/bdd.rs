//! Resource-bounded BDD manager.
//!
//! Reduced ordered BDDs with complement edges: a [`Ref`] with the sign bit set
//! denotes the negation of the node it points to, and the high edge of a stored
//! node is never complemented, which keeps the representation canonical.
//!
//! Every operation that may allocate returns a `Result`: the manager refuses to
//! grow beyond [`BddConfig::node_limit`] nodes and gives up once the optional
//! deadline has passed. The solver maps both to an `Unknown` verdict.
//!
//! Variables are 1-indexed and ordered by index: smaller indices are closer to
//! the root.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt::Debug;
use std::time::Instant;

use log::debug;
use num_bigint::BigUint;

use crate::error::SolverError;
use crate::reference::Ref;

/// Number of ITE steps between two deadline checks.
const DEADLINE_CHECK_PERIOD: usize = 1 << 10;

#[derive(Debug, Clone)]
pub struct BddConfig {
    /// Maximum number of stored nodes (terminal included).
    pub node_limit: usize,
    /// Wall-clock instant after which operations fail with [`SolverError::Timeout`].
    pub deadline: Option<Instant>,
}

impl Default for BddConfig {
    fn default() -> Self {
        Self {
            node_limit: 1 << 20,
            deadline: None,
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
struct Node {
    variable: u32,
    low: Ref,
    high: Ref,
}

pub struct Bdd {
    nodes: RefCell<Vec<Node>>,
    unique: RefCell<HashMap<Node, u32>>,
    cache: RefCell<HashMap<(Ref, Ref, Ref), Ref>>,
    steps: Cell<usize>,
    config: BddConfig,
    pub zero: Ref,
    pub one: Ref,
}

impl Bdd {
    pub fn new(config: BddConfig) -> Self {
        let one = Ref::positive(1);
        // Index 0 is a sentinel, index 1 is the terminal.
        let terminal = Node {
            variable: 0,
            low: one,
            high: one,
        };
        Self {
            nodes: RefCell::new(vec![terminal, terminal]),
            unique: RefCell::new(HashMap::new()),
            cache: RefCell::new(HashMap::new()),
            steps: Cell::new(0),
            config,
            zero: -one,
            one,
        }
    }
}

impl Default for Bdd {
    fn default() -> Self {
        Bdd::new(BddConfig::default())
    }
}

impl Debug for Bdd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bdd")
            .field("nodes", &self.num_nodes())
            .field("node_limit", &self.config.node_limit)
            .field("cache", &self.cache.borrow().len())
            .finish()
    }
}

impl Bdd {
    pub fn config(&self) -> &BddConfig {
        &self.config
    }

    /// Number of allocated decision nodes.
    pub fn num_nodes(&self) -> usize {
        self.nodes.borrow().len() - 2
    }

    pub fn is_zero(&self, node: Ref) -> bool {
        node == self.zero
    }
    pub fn is_one(&self, node: Ref) -> bool {
        node == self.one
    }
    pub fn is_terminal(&self, node: Ref) -> bool {
        node.index() == 1
    }

    /// Decision variable of the node, `0` for the terminal.
    pub fn variable(&self, node: Ref) -> u32 {
        self.nodes.borrow()[node.index()].variable
    }

    fn level(&self, node: Ref) -> u32 {
        if self.is_terminal(node) {
            u32::MAX
        } else {
            self.variable(node)
        }
    }

    pub fn low_node(&self, node: Ref) -> Ref {
        let low = self.nodes.borrow()[node.index()].low;
        if node.is_negated() {
            -low
        } else {
            low
        }
    }
    pub fn high_node(&self, node: Ref) -> Ref {
        let high = self.nodes.borrow()[node.index()].high;
        if node.is_negated() {
            -high
        } else {
            high
        }
    }

    pub fn mk_node(&self, v: u32, low: Ref, high: Ref) -> Result<Ref, SolverError> {
        assert_ne!(v, 0, "Variable index should not be zero");

        if low == high {
            return Ok(low);
        }

        // Canonicity: the high edge is always regular.
        if high.is_negated() {
            return Ok(-self.mk_node(v, -low, -high)?);
        }

        let node = Node { variable: v, low, high };
        if let Some(&i) = self.unique.borrow().get(&node) {
            return Ok(Ref::positive(i));
        }

        let mut nodes = self.nodes.borrow_mut();
        if nodes.len() >= self.config.node_limit {
            debug!("mk_node: node limit {} reached", self.config.node_limit);
            return Err(SolverError::NodeLimit(self.config.node_limit));
        }
        let i = nodes.len() as u32;
        nodes.push(node);
        self.unique.borrow_mut().insert(node, i);
        Ok(Ref::positive(i))
    }

    pub fn mk_var(&self, v: u32) -> Result<Ref, SolverError> {
        self.mk_node(v, self.zero, self.one)
    }

    /// Constant node for a boolean.
    pub fn constant(&self, b: bool) -> Ref {
        if b {
            self.one
        } else {
            self.zero
        }
    }

    fn cofactors(&self, node: Ref, v: u32) -> (Ref, Ref) {
        if self.is_terminal(node) || self.variable(node) != v {
            (node, node)
        } else {
            (self.low_node(node), self.high_node(node))
        }
    }

    fn tick(&self) -> Result<(), SolverError> {
        let steps = self.steps.get() + 1;
        self.steps.set(steps);
        if steps % DEADLINE_CHECK_PERIOD == 0 {
            if let Some(deadline) = self.config.deadline {
                if Instant::now() >= deadline {
                    debug!("tick: deadline expired after {} steps", steps);
                    return Err(SolverError::Timeout);
                }
            }
        }
        Ok(())
    }

    /// Apply the ITE operation to the arguments.
    ///
    /// ```text
    /// ITE(x, y, z) = (x ∧ y) ∨ (¬x ∧ z)
    /// ```
    pub fn apply_ite(&self, f: Ref, g: Ref, h: Ref) -> Result<Ref, SolverError> {
        // ite(1,G,H) => G
        // ite(0,G,H) => H
        if self.is_one(f) {
            return Ok(g);
        }
        if self.is_zero(f) {
            return Ok(h);
        }

        // ite(F,F,H) => ite(F,1,H)
        // ite(F,~F,H) => ite(F,0,H)
        // ite(F,G,F) => ite(F,G,0)
        // ite(F,G,~F) => ite(F,G,1)
        let g = if g == f {
            self.one
        } else if g == -f {
            self.zero
        } else {
            g
        };
        let h = if h == f {
            self.zero
        } else if h == -f {
            self.one
        } else {
            h
        };

        // ite(F,G,G) => G
        // ite(F,1,0) => F
        // ite(F,0,1) => ~F
        if g == h {
            return Ok(g);
        }
        if self.is_one(g) && self.is_zero(h) {
            return Ok(f);
        }
        if self.is_zero(g) && self.is_one(h) {
            return Ok(-f);
        }

        // ite(~F,G,H) => ite(F,H,G)
        let (f, g, h) = if f.is_negated() { (-f, h, g) } else { (f, g, h) };
        // ite(F,~G,H) => ~ite(F,G,~H)
        let (g, h, complement) = if g.is_negated() { (-g, -h, true) } else { (g, h, false) };

        let key = (f, g, h);
        if let Some(&res) = self.cache.borrow().get(&key) {
            return Ok(if complement { -res } else { res });
        }
        self.tick()?;

        let m = self.level(f).min(self.level(g)).min(self.level(h));
        let (f0, f1) = self.cofactors(f, m);
        let (g0, g1) = self.cofactors(g, m);
        let (h0, h1) = self.cofactors(h, m);

        let e = self.apply_ite(f0, g0, h0)?;
        let t = self.apply_ite(f1, g1, h1)?;
        let res = self.mk_node(m, e, t)?;
        self.cache.borrow_mut().insert(key, res);

        Ok(if complement { -res } else { res })
    }

    pub fn apply_not(&self, f: Ref) -> Ref {
        -f
    }

    pub fn apply_and(&self, u: Ref, v: Ref) -> Result<Ref, SolverError> {
        self.apply_ite(u, v, self.zero)
    }

    pub fn apply_or(&self, u: Ref, v: Ref) -> Result<Ref, SolverError> {
        self.apply_ite(u, self.one, v)
    }

    pub fn apply_xor(&self, u: Ref, v: Ref) -> Result<Ref, SolverError> {
        self.apply_ite(u, -v, v)
    }

    pub fn apply_eq(&self, u: Ref, v: Ref) -> Result<Ref, SolverError> {
        self.apply_ite(u, v, -v)
    }

    /// Evaluates the function under a total assignment.
    pub fn evaluate(&self, f: Ref, assignment: impl Fn(u32) -> bool) -> bool {
        let mut current = f;
        while !self.is_terminal(current) {
            current = if assignment(self.variable(current)) {
                self.high_node(current)
            } else {
                self.low_node(current)
            };
        }
        self.is_one(current)
    }

    /// Number of satisfying assignments over `num_vars` variables.
    pub fn sat_count(&self, f: Ref, num_vars: usize) -> BigUint {
        let max = BigUint::from(1u8) << num_vars;
        let mut cache = HashMap::new();
        self.sat_count_rec(f, &max, &mut cache)
    }

    fn sat_count_rec(&self, f: Ref, max: &BigUint, cache: &mut HashMap<Ref, BigUint>) -> BigUint {
        if self.is_zero(f) {
            return BigUint::ZERO;
        }
        if self.is_one(f) {
            return max.clone();
        }

        let node = f.regular();
        let count = match cache.get(&node) {
            Some(count) => count.clone(),
            None => {
                let low = self.sat_count_rec(self.low_node(node), max, cache);
                let high = self.sat_count_rec(self.high_node(node), max, cache);
                let count: BigUint = (low + high) >> 1;
                cache.insert(node, count.clone());
                count
            }
        };

        if f.is_negated() {
            max - count
        } else {
            count
        }
    }
}
