use crossbeam_channel::{bounded, Receiver, Sender};
use rand::{rngs::SmallRng, SeedableRng};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use super::{Budget, Control, MCMCChain, Sample};
use crate::Hypothesis;

/// How many samples may wait in the channel before workers block.
pub(crate) const CHANNEL_BOUND: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Ready,
    Running,
}

/// Independent chains, stepped by a fixed number of worker threads.
///
/// A worker claims a ready chain, runs it for [`steps_before_change`] steps, then releases it
/// and claims the next ready chain in round-robin order, so every chain makes progress even
/// with fewer threads than chains.
///
/// [`steps_before_change`]: #method.steps_before_change
pub struct ChainPool<H: Hypothesis> {
    chains: Vec<MCMCChain<H>>,
    state: Mutex<Claims>,
    steps_before_change: u64,
}
struct Claims {
    states: Vec<RunState>,
    next: usize,
}
impl<H: Hypothesis> ChainPool<H> {
    /// `n` chains over `data`. The first starts at `h0`; the others start from restarts of
    /// it. Chain `i` is seeded with `seed + i`.
    pub fn new(h0: H, data: H::Data, n: usize, seed: u64) -> Self {
        let data = Arc::new(data);
        let mut rng = SmallRng::seed_from_u64(seed);
        let chains = (0..n.max(1) as u64)
            .map(|i| {
                let h = if i == 0 {
                    h0.clone()
                } else {
                    h0.restart(&mut rng)
                };
                MCMCChain::with_shared_data(h, Arc::clone(&data), seed.wrapping_add(i))
            })
            .collect();
        Self::from_chains(chains)
    }
    pub fn from_chains(chains: Vec<MCMCChain<H>>) -> Self {
        ChainPool {
            state: Mutex::new(Claims {
                states: vec![RunState::Ready; chains.len()],
                next: 0,
            }),
            chains,
            steps_before_change: 100,
        }
    }
    /// Set how many steps a worker takes on one chain before moving on.
    pub fn with_steps_before_change(self, steps: u64) -> Self {
        ChainPool {
            steps_before_change: steps.max(1),
            ..self
        }
    }
    pub fn steps_before_change(&self) -> u64 {
        self.steps_before_change
    }
    pub fn chains(&self) -> &[MCMCChain<H>] {
        &self.chains
    }
    pub fn len(&self) -> usize {
        self.chains.len()
    }
    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }

    fn claim(&self) -> Option<usize> {
        let mut claims = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let n = claims.states.len();
        let found = (0..n)
            .map(|offset| (claims.next + offset) % n)
            .find(|&i| claims.states[i] == RunState::Ready)?;
        claims.states[found] = RunState::Running;
        claims.next = (found + 1) % n;
        Some(found)
    }
    fn release(&self, idx: usize) {
        let mut claims = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        claims.states[idx] = RunState::Ready;
    }

    /// Claim and step chains until the budget is spent or the receiving end hangs up.
    pub(crate) fn work(&self, budget: &Budget, tx: &Sender<Sample<H>>) {
        if self.chains.is_empty() {
            return;
        }
        while !budget.exhausted() {
            let idx = match self.claim() {
                Some(idx) => idx,
                None => {
                    thread::yield_now();
                    continue;
                }
            };
            let chain = &self.chains[idx];
            let mut hung_up = false;
            for _ in 0..self.steps_before_change {
                if !budget.running() {
                    break;
                }
                if let Some(hypothesis) = chain.sample_step(budget.control()) {
                    if tx.send(Sample { chain: idx, hypothesis }).is_err() {
                        hung_up = true;
                        break;
                    }
                }
            }
            self.release(idx);
            if hung_up {
                break;
            }
        }
    }
    pub(crate) fn threads_for(&self, ctl: &Control) -> usize {
        ctl.threads.max(1).min(self.chains.len().max(1))
    }
}
impl<H: Hypothesis + 'static> ChainPool<H> {
    /// Run the chains on `ctl.threads` worker threads and stream their samples.
    ///
    /// Dropping the returned [`Samples`] stops the workers and waits for them.
    ///
    /// [`Samples`]: struct.Samples.html
    pub fn run(self: &Arc<Self>, ctl: Control) -> Samples<H> {
        let (tx, rx) = bounded(CHANNEL_BOUND);
        let pool = Arc::clone(self);
        let handle = thread::spawn(move || {
            let budget = Budget::new(ctl);
            let threads = pool.threads_for(&ctl);
            log::info!(
                "running {} chains on {} threads",
                pool.chains.len(),
                threads
            );
            thread::scope(|scope| {
                for _ in 0..threads {
                    let tx = tx.clone();
                    let (pool, budget) = (&pool, &budget);
                    scope.spawn(move || pool.work(budget, &tx));
                }
            });
            log::info!("chain pool finished after {} steps", budget.done());
        });
        Samples::new(rx, handle)
    }
}

/// A stream of samples from worker threads.
///
/// Iteration blocks until a sample arrives, and ends once the workers have finished. Dropping
/// the stream early makes workers stop at their next sample, and waits for them to exit.
pub struct Samples<H> {
    rx: Option<Receiver<Sample<H>>>,
    handle: Option<JoinHandle<()>>,
}
impl<H> Samples<H> {
    pub(crate) fn new(rx: Receiver<Sample<H>>, handle: JoinHandle<()>) -> Self {
        Samples {
            rx: Some(rx),
            handle: Some(handle),
        }
    }
}
impl<H> Iterator for Samples<H> {
    type Item = Sample<H>;
    fn next(&mut self) -> Option<Sample<H>> {
        self.rx.as_ref()?.recv().ok()
    }
}
impl<H> Drop for Samples<H> {
    fn drop(&mut self) {
        drop(self.rx.take());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::warn!("a sampler thread panicked");
            }
        }
    }
}
