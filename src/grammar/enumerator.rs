use polytype::Type;
use std::{error, fmt};

use super::{Grammar, Node};

/// An enumeration code could not be converted.
#[derive(Debug, Clone, PartialEq)]
pub enum EnumerationError {
    /// The nonterminal has no trees with this code: it has no expanding rules and the code is
    /// past its terminals.
    OutOfRange(Type, u64),
    /// The code of a tree does not fit in 64 bits.
    Overflow,
    /// Null nodes have no code.
    Incomplete,
}
impl fmt::Display for EnumerationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            EnumerationError::OutOfRange(ref nt, z) => {
                write!(f, "no tree of nonterminal {} has code {}", nt, z)
            }
            EnumerationError::Overflow => write!(f, "enumeration code overflowed"),
            EnumerationError::Incomplete => write!(f, "cannot enumerate an incomplete tree"),
        }
    }
}
impl error::Error for EnumerationError {}

/// A natural number treated as a stack of naturals.
///
/// `push`/`pop` use the Rosenberg–Strong pairing function, which maps `(x, y)` with
/// `m = max(x, y)` to `m² + m + x - y`. The `_mod` variants use the modular pairing
/// `x + y·k` for `x < k`. Both are bijections, so a stack value is exactly as informative as
/// the values pushed onto it.
///
/// ```
/// use lotinduction::grammar::IntegerizedStack;
///
/// let mut is = IntegerizedStack::new(0);
/// is.push(7).unwrap();
/// is.push_mod(2, 5).unwrap();
/// is.push(3).unwrap();
/// assert_eq!(is.pop(), 3);
/// assert_eq!(is.pop_mod(5), 2);
/// assert_eq!(is.pop(), 7);
/// assert_eq!(is.value(), 0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntegerizedStack {
    value: u64,
}
impl IntegerizedStack {
    pub fn new(value: u64) -> Self {
        IntegerizedStack { value }
    }
    pub fn value(&self) -> u64 {
        self.value
    }
    pub fn pop(&mut self) -> u64 {
        let (x, y) = rosenberg_strong_decode(self.value);
        self.value = y;
        x
    }
    pub fn push(&mut self, x: u64) -> Result<(), EnumerationError> {
        self.value = rosenberg_strong_encode(x, self.value).ok_or(EnumerationError::Overflow)?;
        Ok(())
    }
    pub fn pop_mod(&mut self, modulus: u64) -> u64 {
        let x = self.value % modulus;
        self.value /= modulus;
        x
    }
    pub fn push_mod(&mut self, x: u64, modulus: u64) -> Result<(), EnumerationError> {
        debug_assert!(x < modulus);
        self.value = self
            .value
            .checked_mul(modulus)
            .and_then(|v| v.checked_add(x))
            .ok_or(EnumerationError::Overflow)?;
        Ok(())
    }
    /// Pop `n` values, the last of which is everything that remains.
    pub fn split(&mut self, n: usize) -> Vec<u64> {
        let mut out = Vec::with_capacity(n);
        for i in 0..n {
            if i + 1 == n {
                out.push(self.value);
                self.value = 0;
            } else {
                out.push(self.pop())
            }
        }
        out
    }
}

fn isqrt(z: u64) -> u64 {
    let mut m = (z as f64).sqrt() as u64;
    while m.checked_mul(m).map_or(true, |mm| mm > z) {
        m -= 1;
    }
    while (m + 1).checked_mul(m + 1).map_or(false, |mm| mm <= z) {
        m += 1;
    }
    m
}

fn rosenberg_strong_encode(x: u64, y: u64) -> Option<u64> {
    let m = x.max(y);
    m.checked_mul(m.checked_add(1)?)?.checked_add(x)?.checked_sub(y)
}

fn rosenberg_strong_decode(z: u64) -> (u64, u64) {
    let m = isqrt(z);
    if z - m * m < m {
        (z - m * m, m)
    } else {
        (m, m * (m + 2) - z)
    }
}

pub fn to_node(g: &Grammar, nt: usize, z: u64) -> Result<Node, EnumerationError> {
    let terminals = g.count_terminals(nt) as u64;
    if z < terminals {
        return Ok(Node::new(nt, z as usize, vec![]));
    }
    let expansions = g.count_expansions(nt) as u64;
    if expansions == 0 {
        return Err(EnumerationError::OutOfRange(
            g.nonterminal_type(nt).clone(),
            z,
        ));
    }
    let mut is = IntegerizedStack::new(z - terminals);
    let idx = (is.pop_mod(expansions) + terminals) as usize;
    let child_nts = g.rule(nt, idx).children();
    let codes = is.split(child_nts.len());
    let children = child_nts
        .iter()
        .zip(codes)
        .map(|(&child, code)| to_node(g, child, code))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Node::new(nt, idx, children))
}

pub fn to_integer(g: &Grammar, node: &Node) -> Result<u64, EnumerationError> {
    let idx = node.rule.ok_or(EnumerationError::Incomplete)? as u64;
    let terminals = g.count_terminals(node.nt) as u64;
    if idx < terminals {
        return Ok(idx);
    }
    let (last, rest) = match node.children.split_last() {
        Some(split) => split,
        None => return Err(EnumerationError::Incomplete),
    };
    let mut is = IntegerizedStack::new(to_integer(g, last)?);
    for child in rest.iter().rev() {
        is.push(to_integer(g, child)?)?;
    }
    is.push_mod(idx - terminals, g.count_expansions(node.nt) as u64)?;
    is.value()
        .checked_add(terminals)
        .ok_or(EnumerationError::Overflow)
}

/// Trees of one nonterminal in order of their enumeration code. Created by
/// [`Grammar::enumerate_nonterminal`].
///
/// Codes which no tree has (because some child nonterminal is finite) are skipped. The iterator
/// ends only when the nonterminal itself is finite.
///
/// [`Grammar::enumerate_nonterminal`]: struct.Grammar.html#method.enumerate_nonterminal
pub struct Enumeration<'a> {
    grammar: &'a Grammar,
    nt: usize,
    next: u64,
}
impl<'a> Enumeration<'a> {
    pub(super) fn new(grammar: &'a Grammar, nt: usize) -> Self {
        Enumeration {
            grammar,
            nt,
            next: 0,
        }
    }
}
impl<'a> Iterator for Enumeration<'a> {
    type Item = (u64, Node);
    fn next(&mut self) -> Option<(u64, Node)> {
        let finite = self.grammar.count_expansions(self.nt) == 0;
        loop {
            let z = self.next;
            if finite && z >= self.grammar.count_terminals(self.nt) as u64 {
                return None;
            }
            self.next = z.checked_add(1)?;
            if let Ok(node) = to_node(self.grammar, self.nt, z) {
                return Some((z, node));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rosenberg_strong_is_a_bijection_on_a_square() {
        let mut seen = vec![false; 400];
        for x in 0..20 {
            for y in 0..20 {
                let z = rosenberg_strong_encode(x, y).unwrap();
                assert!(z < 400);
                assert!(!seen[z as usize]);
                seen[z as usize] = true;
                assert_eq!(rosenberg_strong_decode(z), (x, y));
            }
        }
    }

    #[test]
    fn isqrt_is_exact_near_squares() {
        for m in [0u64, 1, 2, 1000, 4_294_967_295] {
            assert_eq!(isqrt(m * m), m);
            if m > 0 {
                assert_eq!(isqrt(m * m - 1), m - 1);
            }
        }
        assert_eq!(isqrt(u64::MAX), 4_294_967_295);
    }

    #[test]
    fn split_leaves_remainder_last() {
        let mut is = IntegerizedStack::new(0);
        is.push(4).unwrap();
        is.push(9).unwrap();
        let v = is.value();
        assert_eq!(IntegerizedStack::new(v).split(3), vec![9, 4, 0]);
        assert_eq!(IntegerizedStack::new(v).split(1), vec![v]);
    }
}
