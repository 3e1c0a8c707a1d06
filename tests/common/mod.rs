//! Targets shared by the integration tests.

use concolic_bdd::executor::Target;
use concolic_bdd::probe::Site;
use concolic_bdd::value::SymbolicValue;

/// Iterative factorial, `None` for negative arguments.
///
/// ```text
///  1  fn factorial(n):
///  2      if n < 0:
///  3          return None
///  4      if n == 0:
///  5          return 1
///  6      if n == 1:
///  7          return 1
///  8      result = 1
///  9      while n != 0:
/// 10          result *= n
/// 11          n -= 1
/// 12      return result
/// ```
pub fn factorial() -> Target {
    Target::new("factorial", |p| {
        let mut n = p.input("n")?;
        if p.branch(Site::new(2, 3, 4), &n.lt(0))? {
            p.stmt(3)?;
            return Ok(None);
        }
        if p.branch(Site::new(4, 5, 6), &n.eq(0))? {
            p.stmt(5)?;
            return Ok(Some(1.into()));
        }
        if p.branch(Site::new(6, 7, 8), &n.eq(1))? {
            p.stmt(7)?;
            return Ok(Some(1.into()));
        }
        p.stmt(8)?;
        let mut result = SymbolicValue::from(1);
        while p.branch(Site::new(9, 10, 12), &n.ne(0))? {
            p.stmt(10)?;
            result = &result * &n;
            p.stmt(11)?;
            n = &n - 1;
        }
        p.stmt(12)?;
        Ok(Some(result))
    })
}
