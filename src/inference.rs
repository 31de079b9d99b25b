//! Search and sampling over hypotheses.
//!
//! - [`MCMCChain`]: a single Metropolis-Hastings chain.
//! - [`ChainPool`]: independent chains shared among worker threads.
//! - [`ParallelTempering`]: a pool of chains at a ladder of temperatures that exchange states.
//! - [`enumerate`]: exhaustive scoring of the grammar's trees by enumeration code.
//! - [`BeamSearch`]: best-first expansion of partial trees.
//! - [`Partition`]: a pool with one chain per region of the tree space, each pinned to a
//!   shared prefix.
//! - [`HillClimbing`]: greedy improvement of the best few hypotheses, with restarts.
//! - [`PriorSampler`]: independent draws from the prior, as a baseline.
//!
//! Every sampler runs under a [`Control`], a budget of steps and wall-clock time. Calling
//! [`interrupt`] stops every running sampler in the process at its next step.
//!
//! [`MCMCChain`]: struct.MCMCChain.html
//! [`ChainPool`]: struct.ChainPool.html
//! [`ParallelTempering`]: struct.ParallelTempering.html
//! [`enumerate`]: fn.enumerate.html
//! [`BeamSearch`]: struct.BeamSearch.html
//! [`Partition`]: struct.Partition.html
//! [`HillClimbing`]: struct.HillClimbing.html
//! [`PriorSampler`]: struct.PriorSampler.html
//! [`Control`]: struct.Control.html
//! [`interrupt`]: fn.interrupt.html

mod beam;
mod chain;
mod chain_pool;
mod enumeration;
mod hill;
mod partition;
mod prior;
mod tempering;
pub use self::beam::{BeamParams, BeamSearch};
pub use self::chain::{ChainSamples, MCMCChain};
pub use self::chain_pool::{ChainPool, Samples};
pub use self::enumeration::enumerate;
pub use self::hill::HillClimbing;
pub use self::partition::Partition;
pub use self::prior::PriorSampler;
pub use self::tempering::{geometric_ladder, ParallelTempering, TemperingParams};

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Ask every running sampler to stop. Samplers notice at their next step; none is forcibly
/// killed.
pub fn interrupt() {
    log::info!("interrupt requested");
    INTERRUPTED.store(true, Ordering::SeqCst)
}
/// Allow samplers to run again after an [`interrupt`].
///
/// [`interrupt`]: fn.interrupt.html
pub fn clear_interrupt() {
    INTERRUPTED.store(false, Ordering::SeqCst)
}
pub fn interrupted() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

/// Limits on a run of a sampler.
///
/// # Examples
///
/// ```
/// use lotinduction::inference::Control;
///
/// let ctl: Control = serde_json::from_str(r#"{"steps": 500, "threads": 2}"#).unwrap();
/// assert_eq!(ctl.steps, 500);
/// assert_eq!(ctl.threads, 2);
/// assert_eq!(ctl.burn, Control::default().burn);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Control {
    /// Total steps across all threads; zero for no limit.
    pub steps: u64,
    /// Wall-clock limit in milliseconds; zero for no limit.
    pub time_ms: u64,
    pub threads: usize,
    /// Steps of each chain discarded before any sample is yielded.
    pub burn: u64,
    /// Yield only every `thin`'th step of each chain; zero or one yields every step.
    pub thin: u64,
    /// Restart a chain that has gone this many steps without improving on its best posterior;
    /// zero never restarts.
    pub restart: u64,
}
impl Default for Control {
    /// | field     | default value |
    /// | --------- | ------------- |
    /// | `steps`   | `10000`       |
    /// | `time_ms` | `0`           |
    /// | `threads` | `1`           |
    /// | `burn`    | `0`           |
    /// | `thin`    | `0`           |
    /// | `restart` | `0`           |
    fn default() -> Self {
        Control {
            steps: 10_000,
            time_ms: 0,
            threads: 1,
            burn: 0,
            thin: 0,
            restart: 0,
        }
    }
}
impl Control {
    pub fn new(steps: u64, time_ms: u64, threads: usize) -> Self {
        Control {
            steps,
            time_ms,
            threads,
            ..Control::default()
        }
    }
    /// Whether the `n`'th step of a chain (counting from one) is yielded.
    pub fn yields(&self, n: u64) -> bool {
        n > self.burn && (self.thin <= 1 || (n - self.burn) % self.thin == 0)
    }
}

/// A [`Control`] being spent. Shared by every thread of a run.
///
/// [`Control`]: struct.Control.html
#[derive(Debug)]
pub struct Budget {
    control: Control,
    start: Instant,
    done: AtomicU64,
}
impl Budget {
    pub fn new(control: Control) -> Self {
        Budget {
            control,
            start: Instant::now(),
            done: AtomicU64::new(0),
        }
    }
    pub fn control(&self) -> &Control {
        &self.control
    }
    /// Steps taken so far.
    pub fn done(&self) -> u64 {
        self.done.load(Ordering::SeqCst)
    }
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
    /// Claim one step, returning false once the budget is spent or an interrupt arrives.
    pub fn running(&self) -> bool {
        if self.out_of_time() {
            return false;
        }
        let n = self.done.fetch_add(1, Ordering::SeqCst) + 1;
        self.control.steps == 0 || n <= self.control.steps
    }
    /// Whether the budget is spent, without claiming a step.
    pub fn exhausted(&self) -> bool {
        self.out_of_time() || (self.control.steps > 0 && self.done() >= self.control.steps)
    }
    fn out_of_time(&self) -> bool {
        interrupted()
            || (self.control.time_ms > 0
                && self.elapsed() >= Duration::from_millis(self.control.time_ms))
    }
}

/// A hypothesis yielded by a multi-chain sampler, with the index of the chain (or, for
/// tempering, the rung) it came from.
#[derive(Debug, Clone)]
pub struct Sample<H> {
    pub chain: usize,
    pub hypothesis: H,
}
