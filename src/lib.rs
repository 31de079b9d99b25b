//! Bayesian program induction in a language of thought.
//!
//! Hypotheses are trees of a probabilistic context-free [`Grammar`]. A tree's prior is its
//! probability under the grammar; its likelihood comes from running it on a nondeterministic
//! stack machine ([`vm`]) and comparing the distribution of outputs to data. The samplers in
//! [`inference`] search the space of trees with Metropolis-Hastings moves from [`proposals`],
//! optionally across many threads and temperatures, and [`TopN`] keeps the best hypotheses
//! found.
//!
//! To learn programs for a new problem, implement [`Domain`] and search over
//! [`LotHypothesis`]es of it. [`domains::strings`] is a small worked example.
//!
//! [`Grammar`]: grammar/struct.Grammar.html
//! [`vm`]: vm/index.html
//! [`inference`]: inference/index.html
//! [`proposals`]: proposals/index.html
//! [`TopN`]: struct.TopN.html
//! [`Domain`]: trait.Domain.html
//! [`LotHypothesis`]: struct.LotHypothesis.html
//! [`domains::strings`]: domains/strings/index.html

mod distribution;
pub mod domains;
pub mod grammar;
mod hypothesis;
pub mod inference;
pub mod proposals;
pub mod sync;
mod top;
pub mod utils;
pub mod vm;

pub use distribution::DiscreteDistribution;
pub use hypothesis::{Bayes, Domain, Hypothesis, LotHypothesis};
pub use top::TopN;
