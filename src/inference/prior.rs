use crossbeam_channel::bounded;
use rand::{rngs::SmallRng, Rng, SeedableRng};
use std::sync::Arc;
use std::thread;

use super::chain_pool::CHANNEL_BOUND;
use super::{Budget, Control, Sample, Samples};
use crate::Hypothesis;

/// Independent draws from the prior, each scored against the data.
///
/// Every step is a fresh [`Hypothesis::sample`]; nothing is learned from earlier draws. It is
/// a baseline for the other samplers rather than a way to find good hypotheses. Burn-in,
/// thinning, and restarts in the [`Control`] do not apply.
///
/// # Examples
///
/// ```
/// use lotinduction::domains::strings;
/// use lotinduction::inference::{Control, PriorSampler};
/// use lotinduction::{Hypothesis, LotHypothesis};
/// use std::sync::Arc;
///
/// let domain = strings::domain(&["0", "1"]).unwrap();
/// let data = vec![strings::datum("", "1", 0.9)];
/// let sampler = Arc::new(PriorSampler::new(LotHypothesis::null(domain), data, 0));
/// let samples: Vec<_> = sampler.run(Control::new(100, 0, 2)).collect();
/// assert_eq!(samples.len(), 100);
/// assert!(samples.iter().all(|s| !s.hypothesis.posterior().is_nan()));
/// ```
///
/// [`Hypothesis::sample`]: ../trait.Hypothesis.html#tymethod.sample
/// [`Control`]: struct.Control.html
pub struct PriorSampler<H: Hypothesis> {
    h0: H,
    data: Arc<H::Data>,
    seed: u64,
}
impl<H: Hypothesis> PriorSampler<H> {
    /// `h0` only supplies [`Hypothesis::sample`]; it is never yielded itself.
    ///
    /// [`Hypothesis::sample`]: ../trait.Hypothesis.html#tymethod.sample
    pub fn new(h0: H, data: H::Data, seed: u64) -> Self {
        PriorSampler {
            h0,
            data: Arc::new(data),
            seed,
        }
    }
    pub fn data(&self) -> &Arc<H::Data> {
        &self.data
    }
    /// Draw and score one hypothesis.
    pub fn draw<R: Rng>(&self, rng: &mut R) -> H {
        let mut h = self.h0.sample(rng);
        h.compute_posterior(&self.data);
        h
    }
}
impl<H: Hypothesis + 'static> PriorSampler<H> {
    /// Draw on `ctl.threads` threads and stream the draws, tagged with the drawing thread.
    pub fn run(self: &Arc<Self>, ctl: Control) -> Samples<H> {
        let (tx, rx) = bounded(CHANNEL_BOUND);
        let sampler = Arc::clone(self);
        let handle = thread::spawn(move || {
            let budget = Budget::new(ctl);
            thread::scope(|scope| {
                for worker in 0..ctl.threads.max(1) {
                    let tx = tx.clone();
                    let (sampler, budget) = (&sampler, &budget);
                    scope.spawn(move || {
                        let seed = sampler.seed.wrapping_add(worker as u64);
                        let mut rng = SmallRng::seed_from_u64(seed);
                        while budget.running() {
                            let hypothesis = sampler.draw(&mut rng);
                            if tx.send(Sample { chain: worker, hypothesis }).is_err() {
                                break;
                            }
                        }
                    });
                }
            });
            log::info!("drew {} hypotheses from the prior", budget.done());
        });
        Samples::new(rx, handle)
    }
}
