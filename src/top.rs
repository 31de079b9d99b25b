use std::cmp::Ordering;
use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::f64;
use std::hash::{Hash, Hasher};

use crate::sync::OrderedLock;
use crate::utils::logsumexp;
use crate::Hypothesis;

/// The `N` best distinct hypotheses seen so far, by posterior.
///
/// Ties on posterior are broken by prior, then by a hash of the hypothesis, so the set is
/// deterministic. Hypotheses with a NaN or `-inf` posterior are never kept. All methods take
/// `&self` and may be called from many threads at once.
///
/// # Examples
///
/// ```
/// use lotinduction::{Bayes, Hypothesis, TopN};
/// use rand::Rng;
///
/// #[derive(Debug, Clone, PartialEq, Eq, Hash)]
/// struct Guess(i64);
/// # #[derive(Debug, Clone)]
/// # struct Scored(Guess, Bayes);
/// # impl PartialEq for Scored { fn eq(&self, o: &Self) -> bool { self.0 == o.0 } }
/// # impl Eq for Scored {}
/// # impl std::hash::Hash for Scored {
/// #     fn hash<H: std::hash::Hasher>(&self, h: &mut H) { self.0.hash(h) }
/// # }
/// # impl Hypothesis for Scored {
/// #     type Data = ();
/// #     fn bayes(&self) -> &Bayes { &self.1 }
/// #     fn bayes_mut(&mut self) -> &mut Bayes { &mut self.1 }
/// #     fn sample<R: Rng>(&self, _: &mut R) -> Self { self.clone() }
/// #     fn restart<R: Rng>(&self, _: &mut R) -> Self { self.clone() }
/// #     fn propose<R: Rng>(&self, _: &mut R) -> (Self, f64) { (self.clone(), 0.0) }
/// #     fn compute_prior(&mut self) -> f64 { 0.0 }
/// #     fn compute_likelihood(&mut self, _: &(), _: f64) -> f64 { -(self.0).0.abs() as f64 }
/// # }
///
/// let top = TopN::new(2);
/// for i in -3..=3 {
///     let mut h = Scored(Guess(i), Bayes::new());
///     h.compute_posterior(&());
///     top.add(h);
/// }
/// assert_eq!(top.len(), 2);
/// assert_eq!(top.best().unwrap().0, Guess(0));
/// ```
pub struct TopN<H: Hypothesis> {
    n: usize,
    set: OrderedLock<BTreeMap<Key, H>>,
}
impl<H: Hypothesis> TopN<H> {
    pub fn new(n: usize) -> Self {
        TopN {
            n,
            set: OrderedLock::new(BTreeMap::new()),
        }
    }
    pub fn capacity(&self) -> usize {
        self.n
    }
    /// Keep `h` if it is among the best `N`, evicting the worst. Returns whether it was kept.
    pub fn add(&self, h: H) -> bool {
        let posterior = h.posterior();
        if self.n == 0 || posterior.is_nan() || posterior == f64::NEG_INFINITY {
            return false;
        }
        let key = Key::of(&h);
        let mut set = self.set.lock();
        if set.contains_key(&key) {
            return false;
        }
        if set.len() >= self.n {
            match set.keys().next() {
                Some(worst) if *worst < key => {}
                _ => return false,
            }
        }
        set.insert(key, h);
        while set.len() > self.n {
            set.pop_first();
        }
        true
    }
    pub fn contains(&self, h: &H) -> bool {
        let key = Key::of(h);
        self.set.lock().get(&key).map_or(false, |kept| kept == h)
    }
    pub fn best(&self) -> Option<H> {
        self.set.lock().values().next_back().cloned()
    }
    pub fn worst(&self) -> Option<H> {
        self.set.lock().values().next().cloned()
    }
    pub fn pop_best(&self) -> Option<H> {
        self.set.lock().pop_last().map(|(_, h)| h)
    }
    pub fn len(&self) -> usize {
        self.set.lock().len()
    }
    pub fn is_empty(&self) -> bool {
        self.set.lock().is_empty()
    }
    pub fn clear(&self) {
        self.set.lock().clear()
    }
    /// Add everything kept by `other`.
    pub fn merge(&self, other: &TopN<H>) {
        for h in other.to_vec() {
            self.add(h);
        }
    }
    /// `log Σ exp(posterior / temperature)` over the kept hypotheses.
    pub fn z(&self, temperature: f64) -> f64 {
        let lps: Vec<f64> = self
            .set
            .lock()
            .values()
            .map(|h| h.posterior() / temperature)
            .collect();
        logsumexp(&lps)
    }
    /// The kept hypotheses, best first.
    pub fn to_vec(&self) -> Vec<H> {
        self.set.lock().values().rev().cloned().collect()
    }
}

/// Orders by posterior, then prior, then hash.
#[derive(Debug, Clone, Copy)]
struct Key {
    posterior: f64,
    prior: f64,
    hash: u64,
}
impl Key {
    fn of<H: Hypothesis>(h: &H) -> Self {
        let mut hasher = DefaultHasher::new();
        h.hash(&mut hasher);
        Key {
            posterior: h.posterior(),
            prior: h.bayes().prior,
            hash: hasher.finish(),
        }
    }
}
impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for Key {}
impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        self.posterior
            .total_cmp(&other.posterior)
            .then(self.prior.total_cmp(&other.prior))
            .then(self.hash.cmp(&other.hash))
    }
}
