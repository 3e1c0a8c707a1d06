//! Bit-blasting of 64-bit integer terms into BDDs.
//!
//! A [`Word`] is a vector of 64 BDDs, least significant bit first. Arithmetic
//! is two's-complement and wraps, matching `i64::wrapping_*`.

use crate::bdd::Bdd;
use crate::error::SolverError;
use crate::reference::Ref;

pub const WIDTH: usize = 64;

/// A 64-bit vector of BDD functions, bit 0 is the least significant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Word {
    bits: Vec<Ref>,
}

impl Word {
    pub fn from_bits(bits: Vec<Ref>) -> Self {
        assert_eq!(bits.len(), WIDTH, "Word must have exactly {} bits", WIDTH);
        Self { bits }
    }

    pub fn bits(&self) -> &[Ref] {
        &self.bits
    }

    pub fn bit(&self, i: usize) -> Ref {
        self.bits[i]
    }

    pub fn msb(&self) -> Ref {
        self.bits[WIDTH - 1]
    }

    /// The concrete value, if every bit is a terminal.
    pub fn as_constant(&self, bdd: &Bdd) -> Option<i64> {
        let mut value: u64 = 0;
        for (i, &b) in self.bits.iter().enumerate() {
            if bdd.is_one(b) {
                value |= 1 << i;
            } else if !bdd.is_zero(b) {
                return None;
            }
        }
        Some(value as i64)
    }
}

/// Word-level operations over a BDD manager.
pub struct Blaster<'a> {
    bdd: &'a Bdd,
}

impl<'a> Blaster<'a> {
    pub fn new(bdd: &'a Bdd) -> Self {
        Self { bdd }
    }

    pub fn constant(&self, x: i64) -> Word {
        let x = x as u64;
        Word::from_bits((0..WIDTH).map(|i| self.bdd.constant((x >> i) & 1 == 1)).collect())
    }

    /// Word whose bit `i` is the BDD variable `var_of_bit(i)`.
    pub fn variable(&self, var_of_bit: impl Fn(usize) -> u32) -> Result<Word, SolverError> {
        let bits = (0..WIDTH).map(|i| self.bdd.mk_var(var_of_bit(i))).collect::<Result<Vec<_>, _>>()?;
        Ok(Word::from_bits(bits))
    }

    /// Ripple-carry addition with an initial carry.
    fn add_with_carry(&self, a: &Word, b: &Word, carry: Ref) -> Result<Word, SolverError> {
        let bdd = self.bdd;
        let mut carry = carry;
        let mut bits = Vec::with_capacity(WIDTH);
        for i in 0..WIDTH {
            let (x, y) = (a.bit(i), b.bit(i));
            let sum = bdd.apply_xor(bdd.apply_xor(x, y)?, carry)?;
            // Majority: carry' = x ? (y | c) : (y & c)
            let y_or_c = bdd.apply_or(y, carry)?;
            let y_and_c = bdd.apply_and(y, carry)?;
            carry = bdd.apply_ite(x, y_or_c, y_and_c)?;
            bits.push(sum);
        }
        Ok(Word::from_bits(bits))
    }

    pub fn add(&self, a: &Word, b: &Word) -> Result<Word, SolverError> {
        self.add_with_carry(a, b, self.bdd.zero)
    }

    fn complement(&self, a: &Word) -> Word {
        Word::from_bits(a.bits.iter().map(|&b| self.bdd.apply_not(b)).collect())
    }

    /// `a - b` as `a + !b + 1`.
    pub fn sub(&self, a: &Word, b: &Word) -> Result<Word, SolverError> {
        self.add_with_carry(a, &self.complement(b), self.bdd.one)
    }

    pub fn neg(&self, a: &Word) -> Result<Word, SolverError> {
        self.sub(&self.constant(0), a)
    }

    /// Shift-and-add multiplication, truncated to the word width.
    ///
    /// Cheap when one operand is constant; the product of two symbolic words is
    /// exponential in BDD size and usually runs into the node limit.
    pub fn mul(&self, a: &Word, b: &Word) -> Result<Word, SolverError> {
        let bdd = self.bdd;
        // Iterate over the constant operand, if there is one.
        let (a, b) = if a.as_constant(bdd).is_some() { (b, a) } else { (a, b) };

        let mut acc = self.constant(0);
        for i in 0..WIDTH {
            let select = b.bit(i);
            if bdd.is_zero(select) {
                continue;
            }
            let partial = (0..WIDTH)
                .map(|j| if j < i { Ok(bdd.zero) } else { bdd.apply_and(select, a.bit(j - i)) })
                .collect::<Result<Vec<_>, _>>()?;
            acc = self.add(&acc, &Word::from_bits(partial))?;
        }
        Ok(acc)
    }

    pub fn eq(&self, a: &Word, b: &Word) -> Result<Ref, SolverError> {
        let bdd = self.bdd;
        let mut res = bdd.one;
        for i in 0..WIDTH {
            let same = bdd.apply_eq(a.bit(i), b.bit(i))?;
            res = bdd.apply_and(res, same)?;
            if bdd.is_zero(res) {
                break;
            }
        }
        Ok(res)
    }

    /// Signed `a < b`.
    ///
    /// Scans from the least significant bit: a higher differing bit overrides
    /// the verdict of the lower ones. At the sign bit the roles flip.
    pub fn slt(&self, a: &Word, b: &Word) -> Result<Ref, SolverError> {
        let bdd = self.bdd;
        let mut lt = bdd.zero;
        for i in 0..WIDTH {
            let (x, y) = (a.bit(i), b.bit(i));
            let differ = bdd.apply_xor(x, y)?;
            let decided = if i == WIDTH - 1 { x } else { y };
            lt = bdd.apply_ite(differ, decided, lt)?;
        }
        Ok(lt)
    }

    pub fn sle(&self, a: &Word, b: &Word) -> Result<Ref, SolverError> {
        Ok(-self.slt(b, a)?)
    }
}
