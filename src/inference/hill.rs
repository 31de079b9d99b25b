use rand::{rngs::SmallRng, SeedableRng};
use std::f64;

use super::{Budget, Control};
use crate::{Hypothesis, TopN};

/// Greedy search that keeps the `n` best hypotheses and proposes to each of them in turn.
///
/// Each round splits `inner_samples` proposals evenly across the kept hypotheses; the best
/// `n` of the old and the proposed become the next round's. After more than `ctl.restart`
/// proposals without beating the best posterior, the kept set is replaced by a restart of the
/// best. Without restarts the search climbs a single hill.
pub struct HillClimbing<H: Hypothesis> {
    h0: H,
    top: TopN<H>,
    n: usize,
    inner_samples: usize,
    data: H::Data,
    rng: SmallRng,
}
impl<H: Hypothesis> HillClimbing<H> {
    /// Climb from `h0`, which is scored here.
    pub fn new(mut h0: H, data: H::Data, n: usize, inner_samples: usize, seed: u64) -> Self {
        let n = n.max(1);
        h0.compute_posterior(&data);
        let top = TopN::new(n);
        top.add(h0.clone());
        HillClimbing {
            h0,
            top,
            n,
            inner_samples: inner_samples.max(1),
            data,
            rng: SmallRng::seed_from_u64(seed),
        }
    }
    /// The hypotheses currently kept.
    pub fn top(&self) -> &TopN<H> {
        &self.top
    }
    /// Climb until `ctl`'s budget is spent, passing every scored proposal and restart to
    /// `found`. Each proposal or restart is one step of the budget.
    pub fn run<F>(&mut self, ctl: &Control, mut found: F)
    where
        F: FnMut(H),
    {
        if ctl.restart == 0 {
            log::warn!("hill climbing without restarts climbs only once");
        }
        let budget = Budget::new(*ctl);
        let per_hypothesis = (self.inner_samples + self.n - 1) / self.n;
        let mut since_improvement = 0u64;
        let mut running = true;
        while running {
            if self.top.is_empty() || (ctl.restart > 0 && since_improvement > ctl.restart) {
                since_improvement = 0;
                running = self.restart(&budget, &mut found);
                continue;
            }
            let best = self.top.best().map_or(f64::NEG_INFINITY, |h| h.posterior());
            let kept = self.top.to_vec();
            let next = TopN::new(self.n);
            for h in &kept {
                next.add(h.clone());
            }
            'kept: for h in kept {
                for _ in 0..per_hypothesis {
                    if !budget.running() {
                        running = false;
                        break 'kept;
                    }
                    let (mut proposal, _) = h.propose(&mut self.rng);
                    if proposal == h {
                        since_improvement += 1;
                        continue;
                    }
                    proposal.compute_posterior(&self.data);
                    if proposal.posterior() > best {
                        since_improvement = 0;
                    } else {
                        since_improvement += 1;
                    }
                    next.add(proposal.clone());
                    found(proposal);
                }
            }
            self.top = next;
        }
    }
    /// Replace the kept set with the first restart of the best that scores above `-inf`.
    /// Returns false if the budget ran out first.
    fn restart<F>(&mut self, budget: &Budget, found: &mut F) -> bool
    where
        F: FnMut(H),
    {
        let base = self.top.best().unwrap_or_else(|| self.h0.clone());
        loop {
            if !budget.running() {
                return false;
            }
            let mut h = base.restart(&mut self.rng);
            h.compute_posterior(&self.data);
            if h.posterior() == f64::NEG_INFINITY {
                continue;
            }
            log::debug!("hill climbing restarted at {}", h.posterior());
            let top = TopN::new(self.n);
            top.add(h.clone());
            self.top = top;
            found(h);
            return true;
        }
    }
}
