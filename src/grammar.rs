//! (representation) Typed probabilistic context-free grammars over program trees.
//!
//! Each nonterminal corresponds to a non-polymorphic [`Type`]. A [`Rule`] whose production is an
//! arrow expands the arrow's return type into children of the argument types; any other rule is a
//! terminal. Trees are [`Node`]s.
//!
//! # Examples
//!
//! ```
//! use lotinduction::grammar::{BuiltinOp, Grammar, Rule};
//! use polytype::tp;
//! use rand::{rngs::SmallRng, SeedableRng};
//!
//! let g = Grammar::new(
//!     tp!(S),
//!     vec![
//!         Rule::builtin("x", tp!(S), 1.0, BuiltinOp::X),
//!         Rule::new("'0'", tp!(S), 1.0),
//!         Rule::new("'1'", tp!(S), 1.0),
//!         Rule::new("cons", tp!(@arrow[tp!(S), tp!(S), tp!(S)]), 1.0),
//!     ],
//! );
//! assert!(g.check().is_ok());
//!
//! let tree = g.parse("cons('0', cons(x, '1'))").unwrap();
//! assert_eq!(g.display(&tree), "cons('0',cons(x,'1'))");
//! assert!((g.log_probability(&tree) - 5.0 * (0.25f64).ln()).abs() < 1e-12);
//!
//! let mut rng = SmallRng::seed_from_u64(0);
//! let sampled = g.generate(g.start(), &mut rng).unwrap();
//! assert!(sampled.is_complete());
//! ```
//!
//! [`Type`]: https://docs.rs/polytype/~7/polytype/enum.Type.html
//! [`Rule`]: struct.Rule.html
//! [`Node`]: struct.Node.html

mod enumerator;
mod node;
mod parser;
pub use self::enumerator::{EnumerationError, Enumeration, IntegerizedStack};
pub use self::node::{Node, Preorder};
pub use self::parser::ParseError;

use itertools::Itertools;
use polytype::Type;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::{error, f64, fmt};

/// Trees deeper than this fail to generate.
pub const MAX_DEPTH: usize = 64;
/// How many times [`Grammar::generate`] retries after exceeding [`MAX_DEPTH`].
///
/// [`Grammar::generate`]: struct.Grammar.html#method.generate
/// [`MAX_DEPTH`]: constant.MAX_DEPTH.html
pub const GENERATE_ATTEMPTS: usize = 1000;
/// How null nodes are written by [`Grammar::display`].
///
/// [`Grammar::display`]: struct.Grammar.html#method.display
pub const NULL_TOKEN: &str = "■";

/// Operations the virtual machine implements itself, rather than through a primitive table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuiltinOp {
    /// `if(bool, a, a)`, evaluating only the taken branch.
    If,
    /// Short-circuiting conjunction of two booleans.
    And,
    /// Short-circuiting disjunction of two booleans.
    Or,
    Not,
    /// The argument of the innermost call.
    X,
    /// A fair coin.
    Flip,
    /// A coin whose weight is the child's value.
    FlipP,
    Recurse,
    MemRecurse,
    /// Recursion which returns the empty value immediately on an empty argument.
    SafeRecurse,
    SafeMemRecurse,
}
impl BuiltinOp {
    /// The number of children a rule implementing this builtin must have.
    pub fn arity(self) -> usize {
        match self {
            BuiltinOp::X | BuiltinOp::Flip => 0,
            BuiltinOp::Not
            | BuiltinOp::FlipP
            | BuiltinOp::Recurse
            | BuiltinOp::MemRecurse
            | BuiltinOp::SafeRecurse
            | BuiltinOp::SafeMemRecurse => 1,
            BuiltinOp::And | BuiltinOp::Or => 2,
            BuiltinOp::If => 3,
        }
    }
    pub fn is_recursion(self) -> bool {
        matches!(
            self,
            BuiltinOp::Recurse
                | BuiltinOp::MemRecurse
                | BuiltinOp::SafeRecurse
                | BuiltinOp::SafeMemRecurse
        )
    }
    pub fn is_random(self) -> bool {
        matches!(self, BuiltinOp::Flip | BuiltinOp::FlipP)
    }
}

/// What executing a rule does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    /// Looked up by rule name in the [`Runtime`]'s primitive table.
    ///
    /// [`Runtime`]: ../vm/struct.Runtime.html
    Primitive,
    Builtin(BuiltinOp),
}

/// A rule specifies a production that can happen for a particular nonterminal.
///
/// A rule associates a production name with a production type. Rules that are not arrows are
/// terminals for the supplied nonterminal type. Rules that _are_ arrows expand nonterminals that
/// correspond to the arrow's return type.
///
/// The name is how the rule is displayed and parsed, so it must be unique within its
/// nonterminal and may not contain whitespace, parentheses, or commas.
///
/// Weights are normalized into log-probabilities when initializing a [`Grammar`].
///
/// [`Grammar`]: struct.Grammar.html
#[derive(Debug, Clone)]
pub struct Rule {
    pub name: &'static str,
    pub production: Type,
    pub logprob: f64,
    pub op: Op,
    /// Which program a recursive builtin calls.
    pub arg: i64,
    nt: usize,
    children: Vec<usize>,
}
impl Rule {
    pub fn new(name: &'static str, production: Type, weight: f64) -> Self {
        Rule {
            name,
            production,
            logprob: weight,
            op: Op::Primitive,
            arg: 0,
            nt: 0,
            children: vec![],
        }
    }
    pub fn builtin(name: &'static str, production: Type, weight: f64, op: BuiltinOp) -> Self {
        Rule {
            op: Op::Builtin(op),
            ..Rule::new(name, production, weight)
        }
    }
    pub fn with_arg(self, arg: i64) -> Self {
        Rule { arg, ..self }
    }
    /// The nonterminal this rule expands.
    pub fn nonterminal(&self) -> usize {
        self.nt
    }
    /// The nonterminals of this rule's children.
    pub fn children(&self) -> &[usize] {
        &self.children
    }
    pub fn is_terminal(&self) -> bool {
        self.children.is_empty()
    }
}
impl PartialEq for Rule {
    fn eq(&self, other: &Rule) -> bool {
        self.name == other.name && self.production == other.production
    }
}
impl Eq for Rule {}

/// A grammar whose configuration is not usable.
#[derive(Debug, Clone, PartialEq)]
pub enum GrammarError {
    /// A nonterminal is used as a child but has no rules.
    NoRules(Type),
    /// A rule's weight is not positive and finite.
    InvalidWeight(&'static str),
    DuplicateName(Type, &'static str),
    /// A primitive rule has no implementation.
    MissingPrimitive(&'static str),
    /// The rule's number of children disagrees with its implementation.
    ArityMismatch {
        name: &'static str,
        expected: usize,
        found: usize,
    },
    /// A builtin rule's children or nonterminal are not of the shape the builtin needs.
    BadBuiltin(&'static str, String),
}
impl fmt::Display for GrammarError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            GrammarError::NoRules(ref nt) => write!(f, "nonterminal {} has no rules", nt),
            GrammarError::InvalidWeight(name) => {
                write!(f, "rule {} must have a positive finite weight", name)
            }
            GrammarError::DuplicateName(ref nt, name) => {
                write!(f, "rule name {} is used twice for nonterminal {}", name, nt)
            }
            GrammarError::MissingPrimitive(name) => {
                write!(f, "no implementation for primitive {}", name)
            }
            GrammarError::ArityMismatch {
                name,
                expected,
                found,
            } => write!(
                f,
                "rule {} has {} children but its implementation takes {}",
                name, expected, found
            ),
            GrammarError::BadBuiltin(name, ref why) => {
                write!(f, "builtin rule {} is malformed: {}", name, why)
            }
        }
    }
}
impl error::Error for GrammarError {}

/// A tree could not be sampled.
#[derive(Debug, Clone, PartialEq)]
pub enum SampleError {
    NoRules(Type),
    /// Every attempt exceeded [`MAX_DEPTH`].
    ///
    /// [`MAX_DEPTH`]: constant.MAX_DEPTH.html
    DepthExceeded(Type),
}
impl fmt::Display for SampleError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            SampleError::NoRules(ref nt) => write!(f, "nonterminal {} has no rules", nt),
            SampleError::DepthExceeded(ref nt) => write!(
                f,
                "could not sample from {} within depth {} after {} attempts",
                nt, MAX_DEPTH, GENERATE_ATTEMPTS
            ),
        }
    }
}
impl error::Error for SampleError {}

/// (representation) Probabilistic context-free grammar over typed program trees.
///
/// Nonterminals are interned as indices in order of first appearance, the start type first.
/// Within a nonterminal, rules are ordered terminals first, then by decreasing probability, ties
/// kept in the order given. Every rule also has a flat id across all nonterminals.
#[derive(Debug, Clone)]
pub struct Grammar {
    nonterminals: Vec<Type>,
    rules: Vec<Vec<Rule>>,
    offsets: Vec<usize>,
    reach: Vec<Vec<bool>>,
}
impl Grammar {
    /// Rules are normalized according to their associated nonterminal proportional to the supplied
    /// weights.
    ///
    /// So each rules' `logprob` is _not_ treated as log-probability in this constructor, they are
    /// treated like un-normalized probabilities.
    pub fn new(start: Type, all_rules: Vec<Rule>) -> Self {
        let mut nonterminals = vec![start];
        let mut rules: Vec<Vec<Rule>> = vec![vec![]];
        for mut rule in all_rules {
            let nt = rule
                .production
                .returns()
                .unwrap_or(&rule.production)
                .clone();
            rule.nt = intern(&mut nonterminals, &mut rules, nt);
            rule.children = rule
                .production
                .args()
                .map(|args| {
                    args.into_iter()
                        .map(|tp| intern(&mut nonterminals, &mut rules, tp.clone()))
                        .collect()
                })
                .unwrap_or_default();
            rule.logprob = rule.logprob.ln();
            rules[rule.nt].push(rule)
        }
        let mut offsets = Vec::with_capacity(rules.len());
        let mut total = 0;
        for rs in &rules {
            offsets.push(total);
            total += rs.len();
        }
        let mut g = Grammar {
            nonterminals,
            rules,
            offsets,
            reach: vec![],
        };
        g.normalize();
        for rs in &mut g.rules {
            rs.sort_by(|a, b| {
                b.is_terminal()
                    .cmp(&a.is_terminal())
                    .then(b.logprob.total_cmp(&a.logprob))
            })
        }
        g.reach = reachability(&g.rules);
        g
    }
    /// Verify that every nonterminal can be expanded, weights are positive and finite, and rule
    /// names are unambiguous.
    pub fn check(&self) -> Result<(), GrammarError> {
        for (nt, rs) in self.rules.iter().enumerate() {
            if rs.is_empty() {
                return Err(GrammarError::NoRules(self.nonterminals[nt].clone()));
            }
            let mut names = HashSet::new();
            for r in rs {
                if !r.logprob.is_finite() {
                    return Err(GrammarError::InvalidWeight(r.name));
                }
                if !names.insert(r.name) {
                    return Err(GrammarError::DuplicateName(
                        self.nonterminals[nt].clone(),
                        r.name,
                    ));
                }
            }
        }
        Ok(())
    }
    /// The start nonterminal.
    pub fn start(&self) -> usize {
        0
    }
    /// The index of the nonterminal for a type, if the grammar uses it.
    pub fn nonterminal(&self, tp: &Type) -> Option<usize> {
        self.nonterminals.iter().position(|nt| nt == tp)
    }
    pub fn nonterminal_type(&self, nt: usize) -> &Type {
        &self.nonterminals[nt]
    }
    pub fn count_nonterminals(&self) -> usize {
        self.nonterminals.len()
    }
    pub fn rules(&self, nt: usize) -> &[Rule] {
        &self.rules[nt]
    }
    pub fn rule(&self, nt: usize, idx: usize) -> &Rule {
        &self.rules[nt][idx]
    }
    /// The rule a non-null node applies.
    pub fn rule_of(&self, node: &Node) -> Option<&Rule> {
        node.rule.map(|idx| &self.rules[node.nt][idx])
    }
    pub fn count_terminals(&self, nt: usize) -> usize {
        self.rules[nt].iter().filter(|r| r.is_terminal()).count()
    }
    /// The number of rules of a nonterminal that have children.
    pub fn count_expansions(&self, nt: usize) -> usize {
        self.rules[nt].len() - self.count_terminals(nt)
    }
    pub fn count_rules(&self) -> usize {
        self.rules.iter().map(Vec::len).sum()
    }
    /// The flat id of a rule.
    pub fn rule_id(&self, nt: usize, idx: usize) -> usize {
        self.offsets[nt] + idx
    }
    pub fn rule_by_id(&self, id: usize) -> &Rule {
        // nonterminals without rules share an offset with their successor, so take the last
        let nt = self.offsets.partition_point(|&offset| offset <= id) - 1;
        &self.rules[nt][id - self.offsets[nt]]
    }
    pub fn find_rule(&self, nt: usize, name: &str) -> Option<usize> {
        self.rules[nt].iter().position(|r| r.name == name)
    }
    /// Whether a tree of nonterminal `from` can contain a node of nonterminal `to`.
    pub fn reaches(&self, from: usize, to: usize) -> bool {
        self.reach[from][to]
    }
    /// Sample a tree for the nonterminal, choosing rules in proportion to their weight.
    ///
    /// Attempts which grow deeper than [`MAX_DEPTH`] are abandoned and retried, up to
    /// [`GENERATE_ATTEMPTS`] times.
    ///
    /// ```
    /// use lotinduction::grammar::{Grammar, Rule};
    /// use polytype::tp;
    ///
    /// let g = Grammar::new(
    ///     tp!(EXPR),
    ///     vec![
    ///         Rule::new("0", tp!(EXPR), 1.0),
    ///         Rule::new("1", tp!(EXPR), 1.0),
    ///         Rule::new("plus", tp!(@arrow[tp!(EXPR), tp!(EXPR), tp!(EXPR)]), 1.0),
    ///     ],
    /// );
    /// let tree = g.generate(g.start(), &mut rand::thread_rng()).unwrap();
    /// assert_eq!(tree.nt, g.start());
    /// println!("{}", g.display(&tree));
    /// ```
    ///
    /// [`MAX_DEPTH`]: constant.MAX_DEPTH.html
    /// [`GENERATE_ATTEMPTS`]: constant.GENERATE_ATTEMPTS.html
    pub fn generate<R: Rng>(&self, nt: usize, rng: &mut R) -> Result<Node, SampleError> {
        for attempt in 0..GENERATE_ATTEMPTS {
            match self.generate_bounded(nt, 0, rng) {
                Err(SampleError::DepthExceeded(_)) => log::trace!(
                    "sampling {} exceeded depth {} on attempt {}",
                    self.nonterminals[nt],
                    MAX_DEPTH,
                    attempt
                ),
                result => return result,
            }
        }
        Err(SampleError::DepthExceeded(self.nonterminals[nt].clone()))
    }
    fn generate_bounded<R: Rng>(
        &self,
        nt: usize,
        depth: usize,
        rng: &mut R,
    ) -> Result<Node, SampleError> {
        if depth >= MAX_DEPTH {
            return Err(SampleError::DepthExceeded(self.nonterminals[nt].clone()));
        }
        let idx = self.sample_rule(nt, rng)?;
        let children = self.rules[nt][idx]
            .children
            .iter()
            .map(|&child| self.generate_bounded(child, depth + 1, rng))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Node::new(nt, idx, children))
    }
    fn sample_rule<R: Rng>(&self, nt: usize, rng: &mut R) -> Result<usize, SampleError> {
        let rules = &self.rules[nt];
        if rules.is_empty() {
            return Err(SampleError::NoRules(self.nonterminals[nt].clone()));
        }
        let mut t: f64 = rng.gen();
        for (i, r) in rules.iter().enumerate() {
            t -= r.logprob.exp();
            if t < 0f64 {
                return Ok(i);
            }
        }
        // rounding left a sliver of mass past the last rule
        Ok(rules.len() - 1)
    }
    /// Sample a rule among those of `node`'s nonterminal with the same child nonterminals,
    /// proportional to weight. The node's own rule is a candidate.
    pub(crate) fn sample_alternative<R: Rng>(&self, node: &Node, rng: &mut R) -> Option<usize> {
        let current = self.rule_of(node)?;
        let candidates = self.alternatives(node.nt, current);
        let z = candidates
            .iter()
            .map(|&i| self.rules[node.nt][i].logprob.exp())
            .sum::<f64>();
        let mut t = rng.gen::<f64>() * z;
        for &i in &candidates {
            t -= self.rules[node.nt][i].logprob.exp();
            if t < 0f64 {
                return Some(i);
            }
        }
        candidates.last().copied()
    }
    /// Indices of the rules of `nt` with the same children as `rule`, `rule` included.
    pub(crate) fn alternatives(&self, nt: usize, rule: &Rule) -> Vec<usize> {
        self.rules[nt]
            .iter()
            .enumerate()
            .filter(|(_, r)| r.children == rule.children)
            .map(|(i, _)| i)
            .collect()
    }
    /// The log-probability of a tree: the sum of the log-probabilities of its rules.
    ///
    /// Null nodes contribute nothing, so for a partial tree this is the probability of the part
    /// that has been filled in.
    ///
    /// # Examples
    ///
    /// ```
    /// use lotinduction::grammar::{Grammar, Rule};
    /// use polytype::tp;
    ///
    /// let g = Grammar::new(
    ///     tp!(EXPR),
    ///     vec![
    ///         Rule::new("0", tp!(EXPR), 1.0),
    ///         Rule::new("1", tp!(EXPR), 1.0),
    ///         Rule::new("plus", tp!(@arrow[tp!(EXPR), tp!(EXPR), tp!(EXPR)]), 1.0),
    ///         Rule::new("zero?", tp!(@arrow[tp!(EXPR), tp!(BOOL)]), 1.0),
    ///         Rule::new("if", tp!(@arrow[tp!(BOOL), tp!(EXPR), tp!(EXPR), tp!(EXPR)]), 1.0),
    ///         Rule::new("nand", tp!(@arrow[tp!(BOOL), tp!(BOOL), tp!(BOOL)]), 1.0),
    ///     ],
    /// );
    ///
    /// let expr = g.parse("plus(0,0)").unwrap();
    /// assert_eq!(g.log_probability(&expr), -4.1588830833596715);
    ///
    /// // four EXPR rules and two BOOL rules, all equally weighted
    /// let expr = g.parse("if( zero?(plus(0 , 0)), 1, 0)").unwrap();
    /// let expected = 6.0 * 0.25f64.ln() + 0.5f64.ln();
    /// assert!((g.log_probability(&expr) - expected).abs() < 1e-12);
    /// ```
    pub fn log_probability(&self, node: &Node) -> f64 {
        match node.rule {
            None => 0f64,
            Some(idx) => {
                self.rules[node.nt][idx].logprob
                    + node
                        .children
                        .iter()
                        .map(|child| self.log_probability(child))
                        .sum::<f64>()
            }
        }
    }
    /// Fill every null subtree by sampling.
    pub fn complete<R: Rng>(&self, node: &mut Node, rng: &mut R) -> Result<(), SampleError> {
        if node.is_null() {
            *node = self.generate(node.nt, rng)?;
            Ok(())
        } else {
            node.children
                .iter_mut()
                .try_for_each(|child| self.complete(child, rng))
        }
    }
    /// Copy a tree, regenerating every maximal resamplable subtree whose root satisfies
    /// `predicate`. Pinned nodes, and subtrees containing them, are kept as they are.
    pub fn copy_resample<R, F>(
        &self,
        node: &Node,
        rng: &mut R,
        predicate: &F,
    ) -> Result<Node, SampleError>
    where
        R: Rng,
        F: Fn(&Node) -> bool,
    {
        if !node.is_null() && node.is_pin_free() && predicate(node) {
            return self.generate(node.nt, rng);
        }
        let children = node
            .children
            .iter()
            .map(|child| self.copy_resample(child, rng, predicate))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Node {
            nt: node.nt,
            rule: node.rule,
            children,
            can_resample: node.can_resample,
        })
    }
    /// The number of ways the first null node (in pre-order) can be expanded; zero for a
    /// complete tree.
    pub fn neighbors(&self, node: &Node) -> usize {
        node.first_null()
            .map_or(0, |null| self.rules[null.nt].len())
    }
    /// Expand the first null node with the `which`'th rule of its nonterminal, giving it null
    /// children.
    pub fn expand_to_neighbor(&self, node: &mut Node, which: usize) {
        if let Some(null) = node.first_null_mut() {
            let rule = &self.rules[null.nt][which];
            null.rule = Some(which);
            null.children = rule.children.iter().map(|&c| Node::null(c)).collect();
        }
    }
    /// The log-probability of the rule [`expand_to_neighbor`] would add.
    ///
    /// [`expand_to_neighbor`]: #method.expand_to_neighbor
    pub fn neighbor_log_probability(&self, node: &Node, which: usize) -> f64 {
        node.first_null()
            .map_or(f64::NEG_INFINITY, |null| self.rules[null.nt][which].logprob)
    }
    /// Parse a valid sentence in the Grammar. The inverse of [`display`].
    ///
    /// Non-terminating production rules are followed by parentheses containing comma-separated
    /// productions `plus(0, 1)`. A null node is written `■`. Extraneous white space is ignored.
    ///
    /// [`display`]: #method.display
    pub fn parse(&self, inp: &str) -> Result<Node, ParseError> {
        self.parse_nonterminal(inp, self.start())
    }
    /// Parse a valid subsentence in the Grammar which is producible from the given nonterminal.
    pub fn parse_nonterminal(&self, inp: &str, nt: usize) -> Result<Node, ParseError> {
        parser::parse(self, inp, nt)
    }
    /// The inverse of [`parse`].
    ///
    /// [`parse`]: #method.parse
    pub fn display(&self, node: &Node) -> String {
        match self.rule_of(node) {
            None => NULL_TOKEN.to_string(),
            Some(r) if r.is_terminal() => r.name.to_string(),
            Some(r) => {
                let args = node.children.iter().map(|c| self.display(c)).join(",");
                format!("{}({})", r.name, args)
            }
        }
    }
    /// The tree for an enumeration code. See [`IntegerizedStack`] for the encoding.
    ///
    /// [`IntegerizedStack`]: struct.IntegerizedStack.html
    pub fn to_node(&self, nt: usize, z: u64) -> Result<Node, EnumerationError> {
        enumerator::to_node(self, nt, z)
    }
    /// The enumeration code of a complete tree; the inverse of [`to_node`].
    ///
    /// [`to_node`]: #method.to_node
    pub fn to_integer(&self, node: &Node) -> Result<u64, EnumerationError> {
        enumerator::to_integer(self, node)
    }
    /// Enumerate trees of the start nonterminal in code order.
    ///
    /// # Examples
    ///
    /// ```
    /// use lotinduction::grammar::{Grammar, Rule};
    /// use polytype::tp;
    ///
    /// let g = Grammar::new(
    ///     tp!(EXPR),
    ///     vec![
    ///         Rule::new("0", tp!(EXPR), 1.0),
    ///         Rule::new("1", tp!(EXPR), 1.0),
    ///         Rule::new("plus", tp!(@arrow[tp!(EXPR), tp!(EXPR), tp!(EXPR)]), 1.0),
    ///     ],
    /// );
    /// let exprs: Vec<String> = g.enumerate().take(6).map(|(_, t)| g.display(&t)).collect();
    /// assert_eq!(
    ///     exprs,
    ///     vec!["0", "1", "plus(0,0)", "plus(0,1)", "plus(1,1)", "plus(1,0)"]
    /// );
    /// ```
    pub fn enumerate(&self) -> Enumeration {
        self.enumerate_nonterminal(self.start())
    }
    /// Enumerate subsentences for the given nonterminal in code order, skipping codes which do
    /// not correspond to a tree.
    pub fn enumerate_nonterminal(&self, nt: usize) -> Enumeration {
        Enumeration::new(self, nt)
    }

    fn normalize(&mut self) {
        for rs in &mut self.rules {
            let lp_largest = rs
                .iter()
                .fold(f64::NEG_INFINITY, |acc, r| acc.max(r.logprob));
            let z = lp_largest
                + rs.iter()
                    .map(|r| (r.logprob - lp_largest).exp())
                    .sum::<f64>()
                    .ln();
            for r in rs {
                r.logprob -= z;
            }
        }
    }
}

fn intern(nonterminals: &mut Vec<Type>, rules: &mut Vec<Vec<Rule>>, tp: Type) -> usize {
    if let Some(idx) = nonterminals.iter().position(|nt| *nt == tp) {
        idx
    } else {
        nonterminals.push(tp);
        rules.push(vec![]);
        nonterminals.len() - 1
    }
}

fn reachability(rules: &[Vec<Rule>]) -> Vec<Vec<bool>> {
    let n = rules.len();
    let mut reach: Vec<Vec<bool>> = (0..n).map(|i| (0..n).map(|j| i == j).collect()).collect();
    let mut changed = true;
    while changed {
        changed = false;
        for from in 0..n {
            for rule in &rules[from] {
                for &child in &rule.children {
                    for to in 0..n {
                        if reach[child][to] && !reach[from][to] {
                            reach[from][to] = true;
                            changed = true;
                        }
                    }
                }
            }
        }
    }
    reach
}
