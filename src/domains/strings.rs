//! A string-building domain: programs that concatenate characters and their input.
//!
//! A hypothesis maps an input string to a distribution over output strings. Observed outputs
//! are noisy: with probability `1 - alpha` an output was corrupted by deleting characters from
//! its end and appending random ones.
//!
//! # Examples
//!
//! ```
//! use lotinduction::domains::strings;
//! use lotinduction::inference::{Control, MCMCChain};
//! use lotinduction::{Hypothesis, LotHypothesis, TopN};
//! use rand::{rngs::SmallRng, SeedableRng};
//!
//! let domain = strings::domain(&["a", "b"]).unwrap();
//! let data = vec![strings::datum("", "ab", 0.9); 3];
//!
//! let mut rng = SmallRng::seed_from_u64(0);
//! let h0 = LotHypothesis::from_prior(domain.clone(), &mut rng);
//! let chain = MCMCChain::new(h0, data, 0);
//! let top = TopN::new(5);
//! for h in chain.run(Control::new(2000, 0, 1)) {
//!     top.add(h);
//! }
//! let best = top.best().unwrap();
//! assert!(best.posterior().is_finite());
//! ```

use polytype::tp;
use std::f64;
use std::sync::Arc;

use crate::grammar::{BuiltinOp, Grammar, GrammarError, Rule};
use crate::utils::logsumexp;
use crate::vm::{Primitive, PrimitiveError, Runtime, Value};
use crate::{Domain, LotHypothesis};

/// Outputs longer than this abort evaluation.
pub const MAX_LENGTH: usize = 256;

/// All values in the strings domain.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Space {
    Str(String),
    Bool(bool),
}
impl Value for Space {
    fn from_bool(b: bool) -> Self {
        Space::Bool(b)
    }
    fn to_bool(&self) -> Option<bool> {
        match *self {
            Space::Bool(b) => Some(b),
            Space::Str(_) => None,
        }
    }
    fn is_empty(&self) -> bool {
        matches!(*self, Space::Str(ref s) if s.is_empty())
    }
    fn empty() -> Option<Self> {
        Some(Space::Str(String::new()))
    }
}
impl From<&str> for Space {
    fn from(s: &str) -> Self {
        Space::Str(s.to_string())
    }
}

/// An input and the output observed for it, trusted with probability `alpha`.
#[derive(Debug, Clone, PartialEq)]
pub struct Datum {
    pub input: String,
    pub output: String,
    pub alpha: f64,
}
pub fn datum(input: &str, output: &str, alpha: f64) -> Datum {
    Datum {
        input: input.to_string(),
        output: output.to_string(),
        alpha,
    }
}

pub type StringHypothesis = LotHypothesis<StringDomain>;

/// The runtime and the noise model for the strings domain.
pub struct StringDomain {
    runtime: Runtime<Space>,
    alphabet: usize,
    /// Probability of deleting one more character from the end of a corrupted output.
    pub p_delete: f64,
    /// Probability of appending one more character to a corrupted output.
    pub p_append: f64,
}

/// The strings grammar over `alphabet`, whose symbols become terminal rules named by the
/// symbol itself:
///
/// ```ignore
/// "x":    S               the input
/// "<c>":  S               for each symbol c of the alphabet
/// "cons": S -> S -> S     concatenation
/// "if":   B -> S -> S -> S
/// "flip": B               a fair coin
/// ```
///
/// Symbols must not be `x`, `cons`, `if`, or `flip`.
pub fn grammar(alphabet: &[&'static str]) -> Grammar {
    let mut rules = vec![Rule::builtin("x", tp!(S), 1.0, BuiltinOp::X)];
    let weight = 1.0 / alphabet.len().max(1) as f64;
    rules.extend(alphabet.iter().map(|&c| Rule::new(c, tp!(S), weight)));
    rules.push(Rule::new("cons", tp!(@arrow[tp!(S), tp!(S), tp!(S)]), 1.0));
    rules.push(Rule::builtin(
        "if",
        tp!(@arrow[tp!(B), tp!(S), tp!(S), tp!(S)]),
        0.2,
        BuiltinOp::If,
    ));
    rules.push(Rule::builtin("flip", tp!(B), 1.0, BuiltinOp::Flip));
    Grammar::new(tp!(S), rules)
}

/// The strings domain over `alphabet`. See [`grammar`] for its rules.
///
/// [`grammar`]: fn.grammar.html
pub fn domain(alphabet: &[&'static str]) -> Result<Arc<StringDomain>, GrammarError> {
    let g = Arc::new(grammar(alphabet));
    let mut primitives: Vec<(&'static str, Primitive<Space>)> = alphabet
        .iter()
        .map(|&c| (c, Primitive::new(0, move |_: &[Space]| Ok(Space::from(c)))))
        .collect();
    primitives.push(("cons", Primitive::new(2, cons)));
    let runtime = Runtime::new(g, primitives)?;
    Ok(Arc::new(StringDomain {
        runtime,
        alphabet: alphabet.len(),
        p_delete: 0.5,
        p_append: 0.5,
    }))
}

fn cons(args: &[Space]) -> Result<Space, PrimitiveError> {
    match (&args[0], &args[1]) {
        (Space::Str(a), Space::Str(b)) => {
            if a.len() + b.len() > MAX_LENGTH {
                Err(PrimitiveError::Size)
            } else {
                Ok(Space::Str(format!("{}{}", a, b)))
            }
        }
        _ => Err(PrimitiveError::Runtime("cons expects strings".to_string())),
    }
}

impl StringDomain {
    /// `log P(observed | produced)` when the output was corrupted: some characters were deleted
    /// from the end of `produced` and random ones appended.
    pub fn log_noise(&self, produced: &str, observed: &str) -> f64 {
        let produced: Vec<char> = produced.chars().collect();
        let observed: Vec<char> = observed.chars().collect();
        let shared = produced
            .iter()
            .zip(&observed)
            .take_while(|(a, b)| a == b)
            .count();
        let lp_append_char = (self.p_append / self.alphabet.max(1) as f64).ln();
        let terms: Vec<f64> = (0..=shared)
            .map(|kept| {
                let deleted = (produced.len() - kept) as f64;
                let appended = (observed.len() - kept) as f64;
                (1f64 - self.p_delete).ln()
                    + deleted * self.p_delete.ln()
                    + (1f64 - self.p_append).ln()
                    + appended * lp_append_char
            })
            .collect();
        logsumexp(&terms)
    }
}
impl Domain for StringDomain {
    type Value = Space;
    type Datum = Datum;

    fn runtime(&self) -> &Runtime<Space> {
        &self.runtime
    }
    fn log_likelihood(&self, h: &StringHypothesis, datum: &Datum) -> f64 {
        let outputs = h.call(Space::from(datum.input.as_str()));
        let terms: Vec<f64> = outputs
            .iter()
            .filter_map(|(v, lp)| match v {
                Space::Str(s) => {
                    let noisy = (1f64 - datum.alpha).ln() + self.log_noise(s, &datum.output);
                    let exact = if *s == datum.output {
                        datum.alpha.ln()
                    } else {
                        f64::NEG_INFINITY
                    };
                    Some(lp + logsumexp(&[exact, noisy]))
                }
                Space::Bool(_) => None,
            })
            .collect();
        logsumexp(&terms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Hypothesis;

    #[test]
    fn noise_rewards_shared_prefixes() {
        let d = domain(&["0", "1"]).unwrap();
        assert!(d.log_noise("0101", "01011") > d.log_noise("1", "01011"));
        // the only way: delete nothing, append "01" at 1/4 each
        let expected = 0.5f64.ln() + 0.5f64.ln() + 2.0 * 0.25f64.ln();
        assert!((d.log_noise("", "01") - expected).abs() < 1e-12);
    }

    #[test]
    fn exact_outputs_dominate() {
        let d = domain(&["0", "1"]).unwrap();
        let data = vec![datum("1", "10", 0.99)];
        let g = d.runtime().grammar();
        let mut right = LotHypothesis::new(d.clone(), g.parse("cons(x,0)").unwrap());
        let mut wrong = LotHypothesis::new(d.clone(), g.parse("cons(0,x)").unwrap());
        right.compute_posterior(&data);
        wrong.compute_posterior(&data);
        assert!(right.bayes().likelihood > 0.99f64.ln() - 1e-9);
        assert!(right.posterior() > wrong.posterior());
    }

    #[test]
    fn random_programs_split_mass() {
        let d = domain(&["0", "1"]).unwrap();
        let tree = d.runtime().grammar().parse("if(flip,0,1)").unwrap();
        let h = LotHypothesis::new(d.clone(), tree);
        let outputs = h.call(Space::from(""));
        assert_eq!(outputs.len(), 2);
        assert!((outputs.lp(&Space::from("0")) - 0.5f64.ln()).abs() < 1e-12);
    }
}
