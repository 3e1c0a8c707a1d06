//! SMT-LIB2 rendering and an external solver process.
//!
//! Formulas are rendered in `QF_BV`: every integer input is a 64-bit
//! bit-vector and comparisons are signed, matching the wrapping `i64`
//! semantics of concrete execution.

use std::fmt::Write as _;
use std::io::{Read, Write};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::error::SolverError;
use crate::expr::{BinaryOp, CompareOp, Expr, LogicOp};
use crate::solver::{Model, Query, Solver, Verdict};
use crate::value::{Value, ValueType};

fn symbol(name: &str) -> Result<String, SolverError> {
    if name.contains(['|', '\\']) {
        return Err(SolverError::IllTyped(format!("input name `{}` cannot be quoted", name)));
    }
    Ok(format!("|{}|", name))
}

fn sort(ty: ValueType) -> &'static str {
    match ty {
        ValueType::Int => "(_ BitVec 64)",
        ValueType::Bool => "Bool",
    }
}

fn term(expr: &Expr, out: &mut String) -> Result<(), SolverError> {
    let apply = |op: &str, args: &[&Expr], out: &mut String| -> Result<(), SolverError> {
        out.push('(');
        out.push_str(op);
        for arg in args {
            out.push(' ');
            term(arg, out)?;
        }
        out.push(')');
        Ok(())
    };
    match expr {
        Expr::Const(Value::Int(x)) => {
            let _ = write!(out, "(_ bv{} 64)", *x as u64);
        }
        Expr::Const(Value::Bool(b)) => {
            let _ = write!(out, "{}", b);
        }
        Expr::Input(name, _) => out.push_str(&symbol(name)?),
        Expr::Neg(e) => apply("bvneg", &[&**e], out)?,
        Expr::Not(e) => apply("not", &[&**e], out)?,
        Expr::Binary(op, l, r) => {
            let op = match op {
                BinaryOp::Add => "bvadd",
                BinaryOp::Sub => "bvsub",
                BinaryOp::Mul => "bvmul",
            };
            apply(op, &[&**l, &**r], out)?
        }
        Expr::Compare(CompareOp::Ne, l, r) => {
            out.push_str("(not ");
            apply("=", &[&**l, &**r], out)?;
            out.push(')');
        }
        Expr::Compare(op, l, r) => {
            let op = match op {
                CompareOp::Lt => "bvslt",
                CompareOp::Le => "bvsle",
                CompareOp::Gt => "bvsgt",
                CompareOp::Ge => "bvsge",
                CompareOp::Eq | CompareOp::Ne => "=",
            };
            apply(op, &[&**l, &**r], out)?
        }
        Expr::Logic(op, l, r) => {
            let op = match op {
                LogicOp::And => "and",
                LogicOp::Or => "or",
            };
            apply(op, &[&**l, &**r], out)?
        }
    }
    Ok(())
}

/// Renders the query as a self-contained SMT-LIB2 script.
pub fn render(query: &Query<'_>) -> Result<String, SolverError> {
    let mut script = String::new();
    script.push_str("(set-logic QF_BV)\n(set-option :produce-models true)\n");
    let mut names = Vec::with_capacity(query.signature.len());
    for (name, ty) in query.signature {
        let name = symbol(name)?;
        let _ = writeln!(script, "(declare-const {} {})", name, sort(*ty));
        names.push(name);
    }
    for clause in query.formula.clauses() {
        script.push_str("(assert ");
        term(clause, &mut script)?;
        script.push_str(")\n");
    }
    script.push_str("(check-sat)\n");
    if !names.is_empty() {
        let _ = writeln!(script, "(get-value ({}))", names.join(" "));
    }
    Ok(script)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Sexp {
    Atom(String),
    List(Vec<Sexp>),
}

fn parse_sexps(text: &str) -> Result<Vec<Sexp>, String> {
    let mut stack: Vec<Vec<Sexp>> = vec![Vec::new()];
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '(' => stack.push(Vec::new()),
            ')' => {
                let list = stack.pop().ok_or("unbalanced `)`")?;
                stack.last_mut().ok_or("unbalanced `)`")?.push(Sexp::List(list));
            }
            c if c.is_whitespace() => {}
            '|' | '"' => {
                let mut atom = String::new();
                loop {
                    match chars.next() {
                        Some(d) if d == c => break,
                        Some(d) => atom.push(d),
                        None => return Err(format!("unterminated `{}`", c)),
                    }
                }
                stack.last_mut().ok_or("unbalanced `)`")?.push(Sexp::Atom(atom));
            }
            c => {
                let mut atom = String::from(c);
                while let Some(&d) = chars.peek() {
                    if d.is_whitespace() || d == '(' || d == ')' {
                        break;
                    }
                    atom.push(d);
                    chars.next();
                }
                stack.last_mut().ok_or("unbalanced `)`")?.push(Sexp::Atom(atom));
            }
        }
    }
    match stack.pop() {
        Some(top) if stack.is_empty() => Ok(top),
        _ => Err("unbalanced `(`".to_string()),
    }
}

fn parse_value(sexp: &Sexp) -> Result<Value, String> {
    let bits = match sexp {
        Sexp::Atom(a) if a == "true" => return Ok(Value::Bool(true)),
        Sexp::Atom(a) if a == "false" => return Ok(Value::Bool(false)),
        Sexp::Atom(a) if a.starts_with("#x") => u64::from_str_radix(&a[2..], 16),
        Sexp::Atom(a) if a.starts_with("#b") => u64::from_str_radix(&a[2..], 2),
        Sexp::List(items) => match items.as_slice() {
            [Sexp::Atom(u), Sexp::Atom(bv), Sexp::Atom(_)] if u == "_" && bv.starts_with("bv") => bv[2..].parse::<u64>(),
            _ => return Err(format!("unsupported value {:?}", sexp)),
        },
        _ => return Err(format!("unsupported value {:?}", sexp)),
    };
    bits.map(|b| Value::Int(b as i64)).map_err(|e| format!("bad bit-vector literal: {}", e))
}

/// Parses the solver's answer to a script produced by [`render`].
fn parse_response(text: &str) -> Result<Verdict, SolverError> {
    let sexps = parse_sexps(text).map_err(SolverError::External)?;
    let mut items = sexps.iter();
    match items.next() {
        Some(Sexp::Atom(a)) if a == "unsat" => Ok(Verdict::Unsat),
        Some(Sexp::Atom(a)) if a == "unknown" => Ok(Verdict::Unknown("solver returned unknown".to_string())),
        Some(Sexp::Atom(a)) if a == "sat" => {
            let mut model = Model::new();
            if let Some(Sexp::List(pairs)) = items.next() {
                for pair in pairs {
                    match pair {
                        Sexp::List(kv) if kv.len() == 2 => {
                            let Sexp::Atom(name) = &kv[0] else {
                                return Err(SolverError::External(format!("bad model entry {:?}", pair)));
                            };
                            let value = parse_value(&kv[1]).map_err(SolverError::External)?;
                            model.insert(name.clone(), value);
                        }
                        _ => return Err(SolverError::External(format!("bad model entry {:?}", pair))),
                    }
                }
            }
            Ok(Verdict::Sat { model, solutions: None })
        }
        Some(Sexp::List(items)) if matches!(items.first(), Some(Sexp::Atom(a)) if a == "error") => {
            Err(SolverError::External(format!("{:?}", items.get(1))))
        }
        other => Err(SolverError::External(format!("unexpected response {:?}", other))),
    }
}

#[derive(Debug, Clone)]
pub struct ProcessSolverConfig {
    pub program: String,
    pub args: Vec<String>,
    /// Interval between two checks for the child's exit.
    pub poll_interval: Duration,
}

impl Default for ProcessSolverConfig {
    fn default() -> Self {
        Self {
            program: "z3".to_string(),
            args: vec!["-in".to_string(), "-smt2".to_string()],
            poll_interval: Duration::from_millis(5),
        }
    }
}

/// An SMT solver binary reading SMT-LIB2 on stdin, one process per query.
///
/// The child is killed once the query timeout expires.
#[derive(Debug, Clone, Default)]
pub struct ProcessSolver {
    config: ProcessSolverConfig,
}

impl ProcessSolver {
    pub fn new(config: ProcessSolverConfig) -> Self {
        Self { config }
    }

    fn solve(&self, query: &Query<'_>) -> Result<Verdict, SolverError> {
        let external = |what: &str, e: std::io::Error| SolverError::External(format!("{} `{}`: {}", what, self.config.program, e));

        let script = render(query)?;
        let mut child = Command::new(&self.config.program)
            .args(&self.config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| external("cannot spawn", e))?;
        let deadline = Instant::now() + query.timeout;

        let mut stdin = child.stdin.take().ok_or_else(|| SolverError::External("no stdin".to_string()))?;
        let mut stdout = child.stdout.take().ok_or_else(|| SolverError::External("no stdout".to_string()))?;
        let reader = thread::spawn(move || {
            let mut output = String::new();
            stdout.read_to_string(&mut output).map(|_| output)
        });
        let written = stdin.write_all(script.as_bytes());
        drop(stdin);
        if let Err(e) = written {
            let _ = child.kill();
            let _ = child.wait();
            return Err(external("cannot write to", e));
        }

        loop {
            match child.try_wait() {
                Ok(Some(_)) => break,
                Ok(None) if Instant::now() >= deadline => {
                    debug!("killing `{}` after {:?}", self.config.program, query.timeout);
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(SolverError::Timeout);
                }
                Ok(None) => thread::sleep(self.config.poll_interval),
                Err(e) => return Err(external("cannot wait for", e)),
            }
        }

        let output = reader
            .join()
            .map_err(|_| SolverError::External("reader thread panicked".to_string()))?
            .map_err(|e| external("cannot read from", e))?;
        parse_response(&output)
    }
}

impl Solver for ProcessSolver {
    fn name(&self) -> &str {
        &self.config.program
    }

    fn check(&self, query: &Query<'_>) -> Verdict {
        match self.solve(query) {
            Ok(verdict) => verdict,
            Err(e) => {
                warn!("{}: {}", self.config.program, e);
                Verdict::Unknown(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::solver::Formula;
    use crate::state::Input;

    fn query_text(formula: &Formula, hint: &Input) -> Result<String, SolverError> {
        let signature = hint.signature();
        render(&Query {
            formula,
            signature: &signature,
            hint,
            timeout: Duration::from_secs(1),
        })
    }

    #[test]
    fn test_render() {
        let n = Expr::input("n", ValueType::Int);
        let flag = Expr::input("flag", ValueType::Bool);
        let formula = Formula::from_iter([
            Expr::compare(CompareOp::Ge, n.clone(), Expr::int(0)),
            Expr::logic(LogicOp::Or, flag, Expr::compare(CompareOp::Ne, Expr::binary(BinaryOp::Sub, n, Expr::int(1)), Expr::int(-1))),
        ]);
        let script = query_text(&formula, &Input::new().with("n", 5).with("flag", false)).unwrap();
        let expected = "\
(set-logic QF_BV)
(set-option :produce-models true)
(declare-const |flag| Bool)
(declare-const |n| (_ BitVec 64))
(assert (bvsge |n| (_ bv0 64)))
(assert (or |flag| (not (= (bvsub |n| (_ bv1 64)) (_ bv18446744073709551615 64)))))
(check-sat)
(get-value (|flag| |n|))
";
        assert_eq!(script, expected);
    }

    #[test]
    fn test_render_rejects_unquotable_names() {
        let formula = Formula::from_iter([Expr::input("a|b", ValueType::Bool)]);
        assert!(query_text(&formula, &Input::new().with("a|b", true)).is_err());
    }

    #[test]
    fn test_parse_response() {
        let text = "sat\n((|n| #xffffffffffffffff)\n (flag true)\n (m (_ bv7 64)) (k #b101))\n";
        let expected: Model = [
            ("n".to_string(), Value::Int(-1)),
            ("flag".to_string(), Value::Bool(true)),
            ("m".to_string(), Value::Int(7)),
            ("k".to_string(), Value::Int(5)),
        ]
        .into_iter()
        .collect();
        assert_eq!(parse_response(text), Ok(Verdict::Sat { model: expected, solutions: None }));
        assert_eq!(parse_response("unsat\n(error \"model is not available\")\n"), Ok(Verdict::Unsat));
        assert!(matches!(parse_response("unknown\n"), Ok(Verdict::Unknown(_))));
        assert!(parse_response("(error \"line 1: invalid command\")").is_err());
        assert!(parse_response("sat\n((n #xzz))").is_err());
        assert!(parse_response("").is_err());
    }

    #[test]
    fn test_missing_binary_is_unknown() {
        let solver = ProcessSolver::new(ProcessSolverConfig {
            program: "definitely-not-an-smt-solver".to_string(),
            ..ProcessSolverConfig::default()
        });
        let formula = Formula::new();
        let hint = Input::new().with("n", 0);
        let signature = hint.signature();
        let verdict = solver.check(&Query {
            formula: &formula,
            signature: &signature,
            hint: &hint,
            timeout: Duration::from_secs(1),
        });
        assert!(matches!(verdict, Verdict::Unknown(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_hanging_solver_is_killed() {
        let solver = ProcessSolver::new(ProcessSolverConfig {
            program: "sleep".to_string(),
            args: vec!["10".to_string()],
            ..ProcessSolverConfig::default()
        });
        let formula = Formula::new();
        let hint = Input::new();
        let started = Instant::now();
        let verdict = solver.check(&Query {
            formula: &formula,
            signature: &[],
            hint: &hint,
            timeout: Duration::from_millis(100),
        });
        assert_eq!(verdict, Verdict::Unknown(SolverError::Timeout.to_string()));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
