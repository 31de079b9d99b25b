use crossbeam_channel::bounded;
use rand::{rngs::SmallRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use super::chain_pool::CHANNEL_BOUND;
use super::{interrupted, Budget, ChainPool, Control, MCMCChain, Samples};
use crate::sync::FiniteHistory;
use crate::Hypothesis;

/// Parameters for parallel tempering.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemperingParams {
    /// Milliseconds between rounds of swaps.
    pub swap_every_ms: u64,
    /// Milliseconds between adaptations of the ladder.
    pub adapt_every_ms: u64,
    /// Whether to adapt the ladder at all.
    pub adapt: bool,
    /// How often the background threads check whether to stop, in milliseconds.
    pub time_resolution_ms: u64,
    /// How many recent swap decisions each rung remembers.
    pub history: usize,
    /// The adaptation step is `(1 / v) * t0 / (t + t0)` after `t` samples.
    pub v: f64,
    pub t0: f64,
}
impl Default for TemperingParams {
    /// | field                | default value |
    /// | -------------------- | ------------- |
    /// | `swap_every_ms`      | `250`         |
    /// | `adapt_every_ms`     | `5000`        |
    /// | `adapt`              | `true`        |
    /// | `time_resolution_ms` | `25`          |
    /// | `history`            | `100`         |
    /// | `v`                  | `3.0`         |
    /// | `t0`                 | `1000000.0`   |
    fn default() -> Self {
        TemperingParams {
            swap_every_ms: 250,
            adapt_every_ms: 5000,
            adapt: true,
            time_resolution_ms: 25,
            history: 100,
            v: 3.0,
            t0: 1_000_000.0,
        }
    }
}

/// `n` temperatures from 1 to `max_temperature`. Above the first rung they are
/// `1 + (max_temperature - 1) * 2^(i - (n - 1))`, so each gap is double the one below it and
/// rungs crowd toward the hot end.
///
/// ```
/// use lotinduction::inference::geometric_ladder;
///
/// let ladder = geometric_ladder(4, 1000.0);
/// assert_eq!(ladder, vec![1.0, 250.75, 500.5, 1000.0]);
/// assert_eq!(geometric_ladder(1, 1000.0), vec![1.0]);
/// ```
pub fn geometric_ladder(n: usize, max_temperature: f64) -> Vec<f64> {
    if n <= 1 {
        return vec![1f64; n];
    }
    let top = (n - 1) as i32;
    (0..n as i32)
        .map(|i| {
            if i == 0 {
                1f64
            } else {
                1f64 + (max_temperature - 1f64) * 2f64.powi(i - top)
            }
        })
        .collect()
}

/// Chains at a ladder of temperatures that periodically exchange their states.
///
/// Rung 0 runs at temperature 1 and samples the posterior; hotter rungs flatten the likelihood
/// and cross between modes more easily. A swapper thread proposes exchanging the states of
/// each adjacent pair of rungs, coldest pair first. An adapter thread adjusts the interior
/// temperatures so adjacent pairs swap at similar rates; the coldest and hottest temperatures
/// never change.
///
/// Samples stream from every rung, tagged with the rung's index.
pub struct ParallelTempering<H: Hypothesis> {
    pool: ChainPool<H>,
    swap_history: Vec<Mutex<FiniteHistory<bool>>>,
    overall: Mutex<()>,
    terminate: AtomicBool,
    params: TemperingParams,
    seed: u64,
}
impl<H: Hypothesis> ParallelTempering<H> {
    /// One chain per temperature, in increasing order; the first should be 1.
    pub fn new(
        h0: H,
        data: H::Data,
        temperatures: &[f64],
        seed: u64,
        params: TemperingParams,
    ) -> Self {
        let pool = ChainPool::new(h0, data, temperatures.len(), seed);
        for (chain, &t) in pool.chains().iter().zip(temperatures) {
            chain.set_temperature(t);
        }
        let swap_history = (0..pool.len())
            .map(|_| Mutex::new(FiniteHistory::new(params.history)))
            .collect();
        ParallelTempering {
            pool,
            swap_history,
            overall: Mutex::new(()),
            terminate: AtomicBool::new(false),
            params,
            seed,
        }
    }
    pub fn with_geometric_ladder(
        h0: H,
        data: H::Data,
        n: usize,
        max_temperature: f64,
        seed: u64,
        params: TemperingParams,
    ) -> Self {
        let ladder = geometric_ladder(n, max_temperature);
        Self::new(h0, data, &ladder, seed, params)
    }
    pub fn chains(&self) -> &[MCMCChain<H>] {
        self.pool.chains()
    }
    pub fn temperatures(&self) -> Vec<f64> {
        self.chains().iter().map(MCMCChain::temperature).collect()
    }
    /// The recent swap acceptance rate between rung `k - 1` and rung `k`, for `k >= 1`.
    pub fn swap_rate(&self, k: usize) -> Option<f64> {
        self.swap_history
            .get(k)
            .and_then(|h| h.lock().unwrap_or_else(PoisonError::into_inner).mean())
    }

    /// Propose exchanging the states of every adjacent pair of rungs, coldest pair first.
    pub fn swap_once<R: Rng>(&self, rng: &mut R) {
        let _overall = self.overall.lock().unwrap_or_else(PoisonError::into_inner);
        let chains = self.chains();
        for k in 1..chains.len() {
            let (lower, upper) = (&chains[k - 1], &chains[k]);
            let mut lo = lower.current.lock();
            let mut hi = upper.current.lock();
            let (t_lo, t_hi) = (lower.temperature(), upper.temperature());
            let r = (hi.h.at_temperature(t_lo) + lo.h.at_temperature(t_hi))
                - (lo.h.at_temperature(t_lo) + hi.h.at_temperature(t_hi));
            let accept = !r.is_nan() && (r >= 0f64 || rng.gen::<f64>() < r.exp());
            if accept {
                std::mem::swap(&mut *lo, &mut *hi);
            }
            log::trace!("swap between rungs {} and {}: {}", k - 1, k, accept);
            self.swap_history[k]
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .add(accept);
        }
    }

    /// Move the interior temperatures so that adjacent pairs swap at more even rates.
    ///
    /// The log-gap between rungs `i - 1` and `i` grows when that pair swaps more often than the
    /// pair above it. Gaps are then rescaled so the hottest temperature stays where it was.
    pub fn adapt_once(&self) {
        let _overall = self.overall.lock().unwrap_or_else(PoisonError::into_inner);
        let chains = self.chains();
        let n = chains.len();
        if n < 3 {
            return;
        }
        let temps = self.temperatures();
        let rates: Vec<Option<f64>> = (0..n).map(|k| self.swap_rate(k)).collect();
        let mut log_gaps: Vec<f64> = (1..n).map(|i| (temps[i] - temps[i - 1]).ln()).collect();
        for i in 1..n - 1 {
            if let (Some(below), Some(above)) = (rates[i], rates[i + 1]) {
                let k = self.adaptation_step(chains[i].samples());
                log_gaps[i - 1] += k * (below - above);
            }
        }
        let span = temps[n - 1] - temps[0];
        let total: f64 = log_gaps.iter().map(|g| g.exp()).sum();
        if !(total.is_finite() && total > 0f64) {
            log::warn!("not adapting degenerate ladder {:?}", temps);
            return;
        }
        let mut t = temps[0];
        for i in 1..n - 1 {
            t += log_gaps[i - 1].exp() * span / total;
            chains[i].set_temperature(t);
        }
        log::debug!("adapted temperatures to {:?}", self.temperatures());
    }
    fn adaptation_step(&self, t: u64) -> f64 {
        (1f64 / self.params.v) * self.params.t0 / (t as f64 + self.params.t0)
    }

    /// Sleep for `ms`, waking every `time_resolution_ms` to check for termination. Returns
    /// false if the run is over.
    fn pause(&self, ms: u64) -> bool {
        let deadline = Instant::now() + Duration::from_millis(ms);
        let resolution = Duration::from_millis(self.params.time_resolution_ms.max(1));
        loop {
            if self.terminate.load(Ordering::SeqCst) || interrupted() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep(resolution.min(deadline - now));
        }
    }
    fn swapper(&self) {
        let mut rng = SmallRng::seed_from_u64(self.seed.wrapping_add(self.chains().len() as u64));
        while self.pause(self.params.swap_every_ms) {
            self.swap_once(&mut rng)
        }
    }
    fn adapter(&self) {
        while self.pause(self.params.adapt_every_ms) {
            self.adapt_once()
        }
    }
}
impl<H: Hypothesis + 'static> ParallelTempering<H> {
    /// Run every rung on `ctl.threads` workers, with the swapper and adapter in the
    /// background, and stream samples from all rungs.
    pub fn run(self: &Arc<Self>, ctl: Control) -> Samples<H> {
        let (tx, rx) = bounded(CHANNEL_BOUND);
        let pt = Arc::clone(self);
        let handle = thread::spawn(move || {
            let budget = Budget::new(ctl);
            let threads = pt.pool.threads_for(&ctl);
            pt.terminate.store(false, Ordering::SeqCst);
            log::info!(
                "tempering over {:?} on {} threads",
                pt.temperatures(),
                threads
            );
            thread::scope(|scope| {
                let workers: Vec<_> = (0..threads)
                    .map(|_| {
                        let tx = tx.clone();
                        let (pt, budget) = (&pt, &budget);
                        scope.spawn(move || pt.pool.work(budget, &tx))
                    })
                    .collect();
                scope.spawn(|| pt.swapper());
                if pt.params.adapt {
                    scope.spawn(|| pt.adapter());
                }
                for worker in workers {
                    if worker.join().is_err() {
                        log::warn!("a tempering worker panicked");
                    }
                }
                pt.terminate.store(true, Ordering::SeqCst);
            });
            log::info!(
                "tempering finished after {} steps at {:?}",
                budget.done(),
                pt.temperatures()
            );
        });
        Samples::new(rx, handle)
    }
}
