use rand::{rngs::SmallRng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::f64;
use std::sync::Arc;

use super::{Budget, Control};
use crate::{Domain, Hypothesis, LotHypothesis, TopN};

/// Parameters for beam search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BeamParams {
    /// How many partial trees the beam holds.
    pub width: usize,
    /// How many random completions estimate the likelihood of a partial tree.
    pub n_reps: usize,
    /// A partial tree whose completions all fail inherits its parent's likelihood, multiplied
    /// by this.
    pub parent_penalty: f64,
    /// Likelihoods of completions are divided by this when scoring partial trees.
    pub temperature: f64,
}
impl Default for BeamParams {
    /// | field            | default value |
    /// | ---------------- | ------------- |
    /// | `width`          | `1000`        |
    /// | `n_reps`         | `10`          |
    /// | `parent_penalty` | `1.1`         |
    /// | `temperature`    | `1.0`         |
    fn default() -> Self {
        BeamParams {
            width: 1000,
            n_reps: 10,
            parent_penalty: 1.1,
            temperature: 1.0,
        }
    }
}

/// Best-first search over partial trees.
///
/// The beam holds partial trees scored by their prior plus the best tempered likelihood among
/// a few random completions. Each step pops the best partial tree and expands its first null
/// node in every possible way. Complete expansions, and every completion tried along the way,
/// are handed to the caller.
pub struct BeamSearch<D: Domain> {
    domain: Arc<D>,
    data: Vec<D::Datum>,
    params: BeamParams,
    beam: TopN<LotHypothesis<D>>,
    rng: SmallRng,
}
impl<D: Domain> BeamSearch<D> {
    /// Search from the partial tree `h0`, usually [`LotHypothesis::null`].
    ///
    /// [`LotHypothesis::null`]: ../struct.LotHypothesis.html#method.null
    pub fn new(h0: LotHypothesis<D>, data: Vec<D::Datum>, params: BeamParams, seed: u64) -> Self {
        let mut search = BeamSearch {
            domain: Arc::clone(h0.domain()),
            data,
            params,
            beam: TopN::new(params.width),
            rng: SmallRng::seed_from_u64(seed),
        };
        let mut root = h0;
        let mut likelihood = search.estimate(&root, &mut |_| {});
        if likelihood == f64::NEG_INFINITY {
            log::warn!("no completion of the root scored; starting from likelihood zero");
            likelihood = 0f64;
        }
        search.score_partial(&mut root, likelihood);
        search.beam.add(root);
        search
    }
    /// Partial trees waiting to be expanded.
    pub fn len(&self) -> usize {
        self.beam.len()
    }
    pub fn is_empty(&self) -> bool {
        self.beam.is_empty()
    }
    /// Expand partial trees until the beam empties or `ctl`'s budget is spent, passing every
    /// complete, scored tree to `found`. Each expansion is one step of the budget.
    pub fn run<F>(&mut self, ctl: &Control, mut found: F)
    where
        F: FnMut(LotHypothesis<D>),
    {
        let budget = Budget::new(*ctl);
        while budget.running() {
            let parent = match self.beam.pop_best() {
                Some(parent) => parent,
                None => {
                    log::info!("beam exhausted after {} expansions", budget.done());
                    break;
                }
            };
            for which in 0..parent.neighbors() {
                let mut child = parent.make_neighbor(which);
                if child.value.is_complete() {
                    child.compute_posterior(&self.data);
                    found(child);
                    continue;
                }
                let estimate = self.estimate(&child, &mut found);
                let likelihood = if estimate == f64::NEG_INFINITY {
                    parent.bayes().likelihood * self.params.parent_penalty
                } else {
                    estimate
                };
                self.score_partial(&mut child, likelihood);
                self.beam.add(child);
            }
        }
    }

    /// The best tempered likelihood among random completions of `h`, each of which is also
    /// passed to `found`.
    fn estimate<F>(&mut self, h: &LotHypothesis<D>, found: &mut F) -> f64
    where
        F: FnMut(LotHypothesis<D>),
    {
        let mut best = f64::NEG_INFINITY;
        for _ in 0..self.params.n_reps {
            let mut completion = h.completed(&mut self.rng);
            completion.compute_posterior(&self.data);
            let likelihood = completion.bayes().likelihood;
            if !likelihood.is_nan() {
                best = best.max(likelihood / self.params.temperature);
            }
            found(completion);
        }
        best
    }
    fn score_partial(&self, h: &mut LotHypothesis<D>, likelihood: f64) {
        let prior = self.domain.runtime().grammar().log_probability(&h.value);
        let bayes = h.bayes_mut();
        bayes.prior = prior;
        bayes.likelihood = likelihood;
        bayes.posterior = prior + likelihood;
    }
}
