//! Discrete distributions over program outputs, kept in log space.

use std::collections::HashMap;
use std::f64;
use std::hash::Hash;

use crate::utils::{accumulate, logsumexp};

/// A map from outcomes to log-probability mass.
///
/// Adding an outcome twice accumulates its mass with logsumexp. Outcomes iterate in the order
/// they were first added, so results built by a deterministic process are themselves
/// deterministic.
///
/// ```
/// use lotinduction::DiscreteDistribution;
///
/// let mut d = DiscreteDistribution::new();
/// d.add("ab", (0.25f64).ln());
/// d.add("b", (0.5f64).ln());
/// d.add("ab", (0.25f64).ln());
/// assert_eq!(d.len(), 2);
/// assert!((d.lp(&"ab") - (0.5f64).ln()).abs() < 1e-12);
/// assert!(d.z().abs() < 1e-12);
/// assert_eq!(d.lp(&"c"), f64::NEG_INFINITY);
/// ```
#[derive(Debug, Clone)]
pub struct DiscreteDistribution<T: Eq + Hash> {
    entries: Vec<(T, f64)>,
    index: HashMap<T, usize>,
}
impl<T: Eq + Hash + Clone> DiscreteDistribution<T> {
    pub fn new() -> Self {
        DiscreteDistribution {
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }
    pub fn add(&mut self, x: T, lp: f64) {
        match self.index.get(&x) {
            Some(&i) => accumulate(&mut self.entries[i].1, lp),
            None => {
                self.index.insert(x.clone(), self.entries.len());
                self.entries.push((x, lp));
            }
        }
    }
    /// The log-probability mass of `x`, `-inf` if it was never added.
    pub fn lp(&self, x: &T) -> f64 {
        self.index
            .get(x)
            .map_or(f64::NEG_INFINITY, |&i| self.entries[i].1)
    }
    pub fn contains(&self, x: &T) -> bool {
        self.index.contains_key(x)
    }
    /// The log of the total mass.
    pub fn z(&self) -> f64 {
        let lps: Vec<f64> = self.entries.iter().map(|&(_, lp)| lp).collect();
        logsumexp(&lps)
    }
    pub fn len(&self) -> usize {
        self.entries.len()
    }
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
    /// The most probable outcome; the earliest added wins ties.
    pub fn best(&self) -> Option<(&T, f64)> {
        self.entries
            .iter()
            .fold(None, |best: Option<&(T, f64)>, entry| match best {
                Some(b) if b.1 >= entry.1 => Some(b),
                _ => Some(entry),
            })
            .map(|(x, lp)| (x, *lp))
    }
    /// Outcomes in the order they were first added.
    pub fn iter(&self) -> impl Iterator<Item = (&T, f64)> {
        self.entries.iter().map(|(x, lp)| (x, *lp))
    }
    /// Outcomes from most to least probable.
    pub fn sorted(&self) -> Vec<(&T, f64)> {
        let mut v: Vec<_> = self.iter().collect();
        v.sort_by(|a, b| b.1.total_cmp(&a.1));
        v
    }
    /// Add all of another distribution's mass into this one.
    pub fn merge(&mut self, other: &DiscreteDistribution<T>) {
        for (x, lp) in other.iter() {
            self.add(x.clone(), lp)
        }
    }
}
impl<T: Eq + Hash + Clone> Default for DiscreteDistribution<T> {
    fn default() -> Self {
        Self::new()
    }
}
