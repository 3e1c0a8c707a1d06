//! # concolic-bdd: Concolic test input generation
//!
//! **`concolic-bdd`** generates inputs that drive an instrumented function down
//! branches it has not taken yet. Each run executes the function on a concrete
//! input while every value derived from the inputs carries a symbolic shadow.
//! The branch decisions of the run form a *path condition*; negating one of its
//! constraints and handing the result to a decision procedure yields the next
//! input.
//!
//! ## How a search proceeds
//!
//! 1. The [`executor`] runs the target on a seed and records the executed
//!    statements and the path condition in lockstep.
//! 2. The [`coverage`] accumulator folds the statements and arcs of the run
//!    into the session-wide coverage.
//! 3. The [`selector`] picks the earliest branch whose other side has not been
//!    seen and builds the divergence formula.
//! 4. The [`gateway`] hands the formula to a [`solver`] and turns the answer
//!    into a new input, an unreachable branch, or an undecided one.
//! 5. The [`search`] driver repeats until nothing is left to flip or a budget
//!    runs out.
//!
//! The default decision procedure bit-blasts 64-bit integer constraints into a
//! [`Bdd`][crate::bdd::Bdd] with complement edges. An external SMT solver can
//! be plugged in through [`smtlib::ProcessSolver`].
//!
//! ## Example
//!
//! ```rust
//! use std::time::Duration;
//!
//! use concolic_bdd::executor::Target;
//! use concolic_bdd::probe::Site;
//! use concolic_bdd::search::search;
//! use concolic_bdd::state::Input;
//!
//! // fn sign(x) { if x < 0 { -1 } else if x == 0 { 0 } else { 1 } }
//! let target = Target::new("sign", |p| {
//!     let x = p.input("x")?;
//!     if p.branch(Site::new(1, 2, 3), &x.lt(0))? {
//!         p.stmt(2)?;
//!         return Ok(Some((-1).into()));
//!     }
//!     if p.branch(Site::new(3, 4, 5), &x.eq(0))? {
//!         p.stmt(4)?;
//!         return Ok(Some(0.into()));
//!     }
//!     p.stmt(5)?;
//!     Ok(Some(1.into()))
//! });
//!
//! let report = search(&target, Input::new().with("x", 7), 10, Duration::from_secs(5));
//! assert_eq!(report.runs.len(), 3);
//! assert_eq!(report.generated_inputs, vec![Input::new().with("x", -1), Input::new().with("x", 0)]);
//! ```

pub mod bdd;
pub mod bitvec;
pub mod coverage;
pub mod error;
pub mod executor;
pub mod expr;
pub mod gateway;
pub mod location;
pub mod path;
pub mod probe;
pub mod reference;
pub mod search;
pub mod selector;
pub mod smtlib;
pub mod solver;
pub mod state;
pub mod trace;
pub mod value;
