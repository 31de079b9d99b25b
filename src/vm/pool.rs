use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::f64;

use super::{Outcome, ProgramLoader, Runtime, Value, VirtualMachineState, VmControl};
use crate::DiscreteDistribution;

/// Best-first marginalization over the random choices of a program.
///
/// States wait in a priority queue ordered by their log-probability. [`run`] repeatedly resumes
/// the most probable state, records finished outputs into a [`DiscreteDistribution`], and queues
/// the branches random choices create. Branches that are too improbable, or that could never be
/// reached within the remaining step budget, are dropped when pushed.
///
/// Each evaluation owns its pool; pools are never shared between threads.
///
/// [`run`]: #method.run
/// [`DiscreteDistribution`]: ../struct.DiscreteDistribution.html
pub struct VirtualMachinePool<V> {
    queue: BinaryHeap<Queued<V>>,
    control: VmControl,
    steps: usize,
    worst_lp: f64,
}
impl<V: Value> VirtualMachinePool<V> {
    pub fn new(control: VmControl) -> Self {
        VirtualMachinePool {
            queue: BinaryHeap::new(),
            control,
            steps: 0,
            worst_lp: f64::INFINITY,
        }
    }
    /// Whether a state of this log-probability would be kept. It must clear the probability
    /// floor, and either fit in the remaining steps or beat the worst state queued so far.
    pub fn would_add(&self, lp: f64) -> bool {
        lp >= self.control.min_lp
            && (self.queue.len() <= self.control.max_steps.saturating_sub(self.steps)
                || lp > self.worst_lp)
    }
    /// Queue a state, returning whether it was kept.
    pub fn push(&mut self, state: VirtualMachineState<V>) -> bool {
        if self.would_add(state.lp) {
            self.worst_lp = self.worst_lp.min(state.lp);
            self.queue.push(Queued(state));
            true
        } else {
            false
        }
    }
    /// The log-probability of the most probable queued state.
    pub fn best_lp(&self) -> Option<f64> {
        self.queue.peek().map(|q| q.0.lp)
    }
    pub fn len(&self) -> usize {
        self.queue.len()
    }
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
    /// How many times a state has been resumed.
    pub fn steps(&self) -> usize {
        self.steps
    }
    /// Run queued states until the queue empties or the step or output budget runs out.
    ///
    /// The returned mass is at most one; it is exactly one when nothing was pruned, aborted, or
    /// left unfinished.
    pub fn run(
        &mut self,
        runtime: &Runtime<V>,
        loader: &dyn ProgramLoader,
    ) -> DiscreteDistribution<V> {
        let mut out = DiscreteDistribution::new();
        while self.steps < self.control.max_steps && out.len() < self.control.max_outputs {
            let Queued(mut state) = match self.queue.pop() {
                Some(queued) => queued,
                None => break,
            };
            self.steps += 1;
            match state.run(runtime, loader, Some(self)) {
                Outcome::Complete(v) => out.add(v, state.lp),
                Outcome::Suspended => {
                    self.push(state);
                }
                Outcome::Aborted(abort) => {
                    log::trace!("branch with lp {} aborted: {:?}", state.lp, abort)
                }
            }
        }
        if !self.queue.is_empty() {
            log::trace!(
                "pool stopped after {} steps with {} states left",
                self.steps,
                self.queue.len()
            );
        }
        out
    }
}

struct Queued<V>(VirtualMachineState<V>);
impl<V> PartialEq for Queued<V> {
    fn eq(&self, other: &Self) -> bool {
        self.0.lp.total_cmp(&other.0.lp) == Ordering::Equal
    }
}
impl<V> Eq for Queued<V> {}
impl<V> PartialOrd for Queued<V> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl<V> Ord for Queued<V> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.lp.total_cmp(&other.0.lp)
    }
}
