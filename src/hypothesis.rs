//! Hypotheses scored by Bayes' rule, and the program-tree hypothesis.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::f64;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::grammar::{Grammar, Node, ParseError};
use crate::proposals::ProposalMix;
use crate::vm::{Abort, CompileError, Program, Runtime, Value};
use crate::DiscreteDistribution;

static BORN: AtomicU64 = AtomicU64::new(0);

/// The scores of a hypothesis.
///
/// `born` numbers hypotheses in order of creation across the whole process. Scores start as
/// NaN until computed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bayes {
    pub prior: f64,
    pub likelihood: f64,
    pub posterior: f64,
    pub born: u64,
}
impl Bayes {
    pub fn new() -> Self {
        Bayes {
            prior: f64::NAN,
            likelihood: f64::NAN,
            posterior: f64::NAN,
            born: BORN.fetch_add(1, Ordering::Relaxed),
        }
    }
    /// The tempered posterior `prior + likelihood / temperature`. Hypotheses without a finite
    /// posterior score `-inf` at every temperature.
    pub fn at_temperature(&self, temperature: f64) -> f64 {
        if self.posterior.is_nan() || self.posterior == f64::NEG_INFINITY {
            f64::NEG_INFINITY
        } else {
            self.prior + self.likelihood / temperature
        }
    }
}
impl Default for Bayes {
    fn default() -> Self {
        Self::new()
    }
}

/// Something the samplers can search over.
///
/// Implementors say how to score a hypothesis ([`compute_prior`], [`compute_likelihood`]) and
/// how to move between hypotheses ([`propose`], [`restart`]). Equality and hashing identify
/// hypotheses for deduplication and must ignore the scores.
///
/// [`compute_prior`]: #tymethod.compute_prior
/// [`compute_likelihood`]: #tymethod.compute_likelihood
/// [`propose`]: #tymethod.propose
/// [`restart`]: #tymethod.restart
pub trait Hypothesis: Clone + Eq + Hash + Send + Sync {
    type Data: Send + Sync;

    fn bayes(&self) -> &Bayes;
    fn bayes_mut(&mut self) -> &mut Bayes;
    /// A fresh, independent hypothesis from the prior.
    fn sample<R: Rng>(&self, rng: &mut R) -> Self;
    /// A fresh hypothesis that keeps whatever this one holds fixed.
    fn restart<R: Rng>(&self, rng: &mut R) -> Self;
    /// A neighbor and the forward-backward correction `log q(self → new) - log q(new → self)`.
    fn propose<R: Rng>(&self, rng: &mut R) -> (Self, f64);
    fn compute_prior(&mut self) -> f64;
    /// Implementations may stop summing and return early once the likelihood falls below
    /// `breakout`.
    fn compute_likelihood(&mut self, data: &Self::Data, breakout: f64) -> f64;

    /// Score the hypothesis and store the results. The likelihood is skipped (left NaN) when
    /// the prior rules the hypothesis out; a NaN likelihood makes the posterior `-inf`.
    fn compute_posterior(&mut self, data: &Self::Data) -> f64 {
        let prior = self.compute_prior();
        let (likelihood, posterior) = if prior.is_nan() || prior == f64::NEG_INFINITY {
            (f64::NAN, f64::NEG_INFINITY)
        } else {
            let likelihood = self.compute_likelihood(data, f64::NEG_INFINITY);
            if likelihood.is_nan() {
                (likelihood, f64::NEG_INFINITY)
            } else {
                (likelihood, prior + likelihood)
            }
        };
        let bayes = self.bayes_mut();
        bayes.prior = prior;
        bayes.likelihood = likelihood;
        bayes.posterior = posterior;
        posterior
    }
    fn posterior(&self) -> f64 {
        self.bayes().posterior
    }
    fn at_temperature(&self, temperature: f64) -> f64 {
        self.bayes().at_temperature(temperature)
    }
}

/// A problem to learn programs for: the runtime that gives trees meaning, and how well a tree
/// explains one datum.
pub trait Domain: Send + Sync + Sized + 'static {
    type Value: Value;
    type Datum: Send + Sync;

    fn runtime(&self) -> &Runtime<Self::Value>;
    fn log_likelihood(&self, h: &LotHypothesis<Self>, datum: &Self::Datum) -> f64;
    /// Defaults to the grammar's probability of the tree, `-inf` for partial trees.
    fn log_prior(&self, h: &LotHypothesis<Self>) -> f64 {
        if h.value.is_complete() {
            self.runtime().grammar().log_probability(&h.value)
        } else {
            f64::NEG_INFINITY
        }
    }
    fn proposal_mix(&self) -> ProposalMix {
        ProposalMix::default()
    }
    /// The nonterminal hypotheses produce.
    fn start(&self) -> usize {
        self.runtime().grammar().start()
    }
}

/// A program tree, as a hypothesis in a [`Domain`].
///
/// Trees that cannot be sampled (generation ran too deep) are represented by a null tree,
/// whose prior is `-inf`.
///
/// [`Domain`]: trait.Domain.html
pub struct LotHypothesis<D: Domain> {
    domain: Arc<D>,
    pub value: Node,
    bayes: Bayes,
}
impl<D: Domain> LotHypothesis<D> {
    pub fn new(domain: Arc<D>, value: Node) -> Self {
        LotHypothesis {
            domain,
            value,
            bayes: Bayes::new(),
        }
    }
    /// The hypothesis whose tree is a single null node: the root of every search.
    pub fn null(domain: Arc<D>) -> Self {
        let start = domain.start();
        Self::new(domain, Node::null(start))
    }
    /// A tree sampled from the grammar.
    pub fn from_prior<R: Rng>(domain: Arc<D>, rng: &mut R) -> Self {
        let start = domain.start();
        let value = match domain.runtime().grammar().generate(start, rng) {
            Ok(value) => value,
            Err(err) => {
                log::debug!("could not sample a hypothesis: {}", err);
                Node::null(start)
            }
        };
        Self::new(domain, value)
    }
    pub fn domain(&self) -> &Arc<D> {
        &self.domain
    }
    pub fn grammar(&self) -> &Grammar {
        self.domain.runtime().grammar()
    }
    pub fn program(&self) -> Result<Program, CompileError> {
        self.domain.runtime().compile(&self.value)
    }
    /// The distribution over outputs on input `x`. Recursive calls call this same program.
    /// Trees that do not compile produce nothing.
    pub fn call(&self, x: D::Value) -> DiscreteDistribution<D::Value> {
        match self.program() {
            Ok(program) => self.domain.runtime().call(&program, &program, x),
            Err(err) => {
                log::trace!("{} does not compile: {}", self, err);
                DiscreteDistribution::new()
            }
        }
    }
    /// Run once without exploring random choices, for deterministic programs.
    pub fn call_one(&self, x: D::Value) -> Result<D::Value, Abort> {
        let program = self
            .program()
            .map_err(|err| Abort::Error(err.to_string()))?;
        self.domain.runtime().call_one(&program, &program, x)
    }
    /// The tree in the grammar's concrete syntax.
    pub fn string(&self) -> String {
        self.grammar().display(&self.value)
    }
    /// `prior`, `likelihood`, `posterior`, and the tree, separated by tabs.
    ///
    /// Pins and the `born` counter are not recorded: see [`deserialize`].
    ///
    /// [`deserialize`]: #method.deserialize
    pub fn serialize(&self) -> String {
        format!(
            "{}\t{}\t{}\t{}",
            self.bayes.prior,
            self.bayes.likelihood,
            self.bayes.posterior,
            self.string()
        )
    }
    /// The inverse of [`serialize`], up to what a record leaves out. Every node of the restored
    /// tree is unpinned, so proposals may rewrite parts that were pinned when it was saved; pin
    /// them again with [`Node::pin`] if they must stay fixed. The restored hypothesis is
    /// numbered as newly born.
    ///
    /// [`serialize`]: #method.serialize
    /// [`Node::pin`]: grammar/struct.Node.html#method.pin
    pub fn deserialize(domain: &Arc<D>, record: &str) -> Result<Self, ParseError> {
        let mut fields = record.splitn(4, '\t');
        let mut score = || -> Result<f64, ParseError> {
            fields
                .next()
                .ok_or_else(|| ParseError::Other(format!("truncated record {:?}", record)))?
                .trim()
                .parse::<f64>()
                .map_err(|err| ParseError::Other(err.to_string()))
        };
        let prior = score()?;
        let likelihood = score()?;
        let posterior = score()?;
        let tree = fields
            .next()
            .ok_or_else(|| ParseError::Other(format!("record {:?} has no tree", record)))?;
        let grammar = domain.runtime().grammar();
        let value = grammar.parse_nonterminal(tree.trim_end_matches('\n'), domain.start())?;
        let mut h = Self::new(Arc::clone(domain), value);
        h.bayes.prior = prior;
        h.bayes.likelihood = likelihood;
        h.bayes.posterior = posterior;
        Ok(h)
    }
    /// How many ways the first null node can be expanded.
    pub fn neighbors(&self) -> usize {
        self.grammar().neighbors(&self.value)
    }
    /// Expand the first null node with its `which`'th rule.
    pub fn make_neighbor(&self, which: usize) -> Self {
        let mut value = self.value.clone();
        self.grammar().expand_to_neighbor(&mut value, which);
        Self::new(Arc::clone(&self.domain), value)
    }
    /// A copy with every existing node pinned and every null node filled by sampling.
    pub fn completed<R: Rng>(&self, rng: &mut R) -> Self {
        let mut value = self.value.clone();
        value.pin();
        if let Err(err) = self.grammar().complete(&mut value, rng) {
            log::debug!("could not complete {}: {}", self, err);
        }
        Self::new(Arc::clone(&self.domain), value)
    }
}
impl<D: Domain> Hypothesis for LotHypothesis<D> {
    type Data = Vec<D::Datum>;

    fn bayes(&self) -> &Bayes {
        &self.bayes
    }
    fn bayes_mut(&mut self) -> &mut Bayes {
        &mut self.bayes
    }
    fn sample<R: Rng>(&self, rng: &mut R) -> Self {
        Self::from_prior(Arc::clone(&self.domain), rng)
    }
    fn restart<R: Rng>(&self, rng: &mut R) -> Self {
        if self.value.is_null() {
            return self.sample(rng);
        }
        let value = self
            .grammar()
            .copy_resample(&self.value, rng, &|node: &Node| node.can_resample)
            .unwrap_or_else(|err| {
                log::debug!("could not restart {}: {}", self, err);
                Node::null(self.value.nt)
            });
        Self::new(Arc::clone(&self.domain), value)
    }
    fn propose<R: Rng>(&self, rng: &mut R) -> (Self, f64) {
        let mix = self.domain.proposal_mix();
        match mix.propose(self.grammar(), &self.value, rng) {
            Ok((value, fb)) => (Self::new(Arc::clone(&self.domain), value), fb),
            Err(err) => {
                log::debug!("proposal from {} failed: {}", self, err);
                (
                    Self::new(Arc::clone(&self.domain), Node::null(self.value.nt)),
                    0f64,
                )
            }
        }
    }
    fn compute_prior(&mut self) -> f64 {
        let prior = self.domain.log_prior(self);
        self.bayes.prior = prior;
        prior
    }
    fn compute_likelihood(&mut self, data: &Self::Data, breakout: f64) -> f64 {
        let mut likelihood = 0f64;
        for datum in data {
            likelihood += self.domain.log_likelihood(self, datum);
            if likelihood.is_nan() || likelihood == f64::NEG_INFINITY || likelihood < breakout {
                break;
            }
        }
        self.bayes.likelihood = likelihood;
        likelihood
    }
}
impl<D: Domain> Clone for LotHypothesis<D> {
    fn clone(&self) -> Self {
        LotHypothesis {
            domain: Arc::clone(&self.domain),
            value: self.value.clone(),
            bayes: self.bayes,
        }
    }
}
impl<D: Domain> PartialEq for LotHypothesis<D> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}
impl<D: Domain> Eq for LotHypothesis<D> {}
impl<D: Domain> Hash for LotHypothesis<D> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state)
    }
}
impl<D: Domain> fmt::Display for LotHypothesis<D> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.string())
    }
}
impl<D: Domain> fmt::Debug for LotHypothesis<D> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("LotHypothesis")
            .field("value", &self.string())
            .field("bayes", &self.bayes)
            .finish()
    }
}
