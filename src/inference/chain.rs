use rand::{rngs::SmallRng, Rng, SeedableRng};
use std::f64;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use super::{Budget, Control};
use crate::sync::{FiniteHistory, OrderedLock};
use crate::Hypothesis;

/// How many recent acceptance decisions a chain remembers.
const ACCEPTANCE_WINDOW: usize = 100;

/// The state a chain owns that other threads may exchange.
#[derive(Debug, Clone)]
pub(crate) struct Current<H> {
    pub(crate) h: H,
    pub(crate) steps_since_improvement: u64,
}

#[derive(Debug)]
struct Stats {
    rng: SmallRng,
    proposals: u64,
    acceptances: u64,
    maxval: f64,
    history: FiniteHistory<bool>,
}

/// A Metropolis-Hastings chain over hypotheses, at a temperature.
///
/// The acceptance ratio is `h'.at_temperature(T) - h.at_temperature(T) - fb`, so the
/// temperature divides only the likelihood. A chain whose current hypothesis has a NaN or
/// `-inf` posterior accepts anything, and draws its proposals from [`Hypothesis::restart`].
///
/// The current hypothesis sits behind an [`OrderedLock`], so a [`ParallelTempering`] swapper can
/// exchange it between steps. A chain may be stepped from many threads; steps are serialized.
///
/// # Examples
///
/// ```no_run
/// # use lotinduction::{Hypothesis, inference::{Control, MCMCChain}};
/// # fn run<H: Hypothesis>(h0: H, data: H::Data) {
/// let chain = MCMCChain::new(h0, data, 42);
/// for h in chain.run(Control::new(1000, 0, 1)) {
///     println!("{}", h.posterior());
/// }
/// # }
/// ```
///
/// [`Hypothesis::restart`]: ../trait.Hypothesis.html#tymethod.restart
/// [`OrderedLock`]: ../sync/struct.OrderedLock.html
/// [`ParallelTempering`]: struct.ParallelTempering.html
pub struct MCMCChain<H: Hypothesis> {
    pub(crate) current: OrderedLock<Current<H>>,
    data: Arc<H::Data>,
    temperature: AtomicU64,
    samples: AtomicU64,
    stats: Mutex<Stats>,
}
impl<H: Hypothesis> MCMCChain<H> {
    /// Start a chain at `h0`, which is scored against `data` here.
    pub fn new(h0: H, data: H::Data, seed: u64) -> Self {
        Self::with_shared_data(h0, Arc::new(data), seed)
    }
    pub fn with_shared_data(mut h0: H, data: Arc<H::Data>, seed: u64) -> Self {
        h0.compute_posterior(&data);
        let maxval = h0.posterior();
        MCMCChain {
            current: OrderedLock::new(Current {
                h: h0,
                steps_since_improvement: 0,
            }),
            data,
            temperature: AtomicU64::new(1f64.to_bits()),
            samples: AtomicU64::new(0),
            stats: Mutex::new(Stats {
                rng: SmallRng::seed_from_u64(seed),
                proposals: 0,
                acceptances: 0,
                maxval,
                history: FiniteHistory::new(ACCEPTANCE_WINDOW),
            }),
        }
    }
    pub fn data(&self) -> &Arc<H::Data> {
        &self.data
    }
    pub fn temperature(&self) -> f64 {
        f64::from_bits(self.temperature.load(Ordering::SeqCst))
    }
    pub fn set_temperature(&self, temperature: f64) {
        self.temperature
            .store(temperature.to_bits(), Ordering::SeqCst)
    }
    /// A copy of the current hypothesis.
    pub fn current(&self) -> H {
        self.current.lock().h.clone()
    }
    /// Steps taken.
    pub fn samples(&self) -> u64 {
        self.samples.load(Ordering::SeqCst)
    }
    pub fn proposals(&self) -> u64 {
        self.stats().proposals
    }
    pub fn acceptances(&self) -> u64 {
        self.stats().acceptances
    }
    /// The fraction of recent proposals accepted.
    pub fn acceptance_rate(&self) -> Option<f64> {
        self.stats().history.mean()
    }
    /// The best posterior this chain has held since it last restarted.
    pub fn maxval(&self) -> f64 {
        self.stats().maxval
    }
    fn stats(&self) -> std::sync::MutexGuard<'_, Stats> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take one step and return the resulting current hypothesis.
    ///
    /// A chain that has gone more than `restart` steps without improving its best posterior is
    /// restarted instead; a `restart` of zero never restarts.
    pub fn step(&self, restart: u64) -> H {
        let mut stats = self.stats();
        let temperature = self.temperature();
        let mut cur = self.current.lock();
        self.samples.fetch_add(1, Ordering::SeqCst);

        if cur.h.posterior() > stats.maxval {
            stats.maxval = cur.h.posterior();
            cur.steps_since_improvement = 0;
        } else {
            cur.steps_since_improvement += 1;
        }
        if restart > 0 && cur.steps_since_improvement > restart {
            log::debug!(
                "restarting after {} steps without improvement on {}",
                cur.steps_since_improvement,
                stats.maxval
            );
            let mut h = cur.h.restart(&mut stats.rng);
            h.compute_posterior(&self.data);
            stats.maxval = h.posterior();
            cur.h = h;
            cur.steps_since_improvement = 0;
            return cur.h.clone();
        }

        let cur_posterior = cur.h.posterior();
        let stuck = cur_posterior.is_nan() || cur_posterior == f64::NEG_INFINITY;
        let (mut proposal, fb) = if stuck {
            (cur.h.restart(&mut stats.rng), 0f64)
        } else {
            cur.h.propose(&mut stats.rng)
        };
        stats.proposals += 1;
        if proposal == cur.h {
            *proposal.bayes_mut() = *cur.h.bayes();
        } else {
            proposal.compute_posterior(&self.data);
        }
        let ratio = proposal.at_temperature(temperature) - cur.h.at_temperature(temperature) - fb;
        let accept = stuck
            || (!proposal.posterior().is_nan()
                && (ratio >= 0f64 || stats.rng.gen::<f64>() < ratio.exp()));
        stats.history.add(accept);
        if accept {
            stats.acceptances += 1;
            cur.h = proposal;
        }
        cur.h.clone()
    }

    /// Step, and return the current hypothesis if `ctl`'s burn-in and thinning say this step
    /// is yielded.
    pub fn sample_step(&self, ctl: &Control) -> Option<H> {
        let h = self.step(ctl.restart);
        if ctl.yields(self.samples()) {
            Some(h)
        } else {
            None
        }
    }

    /// Stream samples until `ctl`'s budget runs out. Steps are taken as the iterator is pulled.
    pub fn run(&self, ctl: Control) -> ChainSamples<'_, H> {
        ChainSamples {
            chain: self,
            budget: Budget::new(ctl),
        }
    }
}

/// The samples of an [`MCMCChain`] run.
///
/// [`MCMCChain`]: struct.MCMCChain.html
pub struct ChainSamples<'a, H: Hypothesis> {
    chain: &'a MCMCChain<H>,
    budget: Budget,
}
impl<'a, H: Hypothesis> Iterator for ChainSamples<'a, H> {
    type Item = H;
    fn next(&mut self) -> Option<H> {
        while self.budget.running() {
            if let Some(h) = self.chain.sample_step(self.budget.control()) {
                return Some(h);
            }
        }
        None
    }
}
