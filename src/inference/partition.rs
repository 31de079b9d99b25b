use rand::{rngs::SmallRng, SeedableRng};
use std::sync::Arc;

use super::{ChainPool, MCMCChain};
use crate::{Domain, LotHypothesis};

/// The space of trees below a partial tree, split into disjoint regions.
///
/// Starting from `h0`, the first null node is expanded in every possible way, `depth` times
/// over. Each partial tree left at the end is the _prefix_ of one region: every tree in the
/// region agrees with the prefix wherever the prefix is filled in. Trees that became complete
/// along the way belong to no region and are kept separately.
///
/// [`chain_pool`] runs one chain per region, with the prefix pinned so the chain never leaves
/// it.
///
/// # Examples
///
/// ```
/// use lotinduction::domains::strings;
/// use lotinduction::inference::{Control, Partition};
/// use lotinduction::LotHypothesis;
/// use std::sync::Arc;
///
/// let domain = strings::domain(&["0", "1"]).unwrap();
/// let partition = Partition::new(&LotHypothesis::null(domain), 1);
/// // x, 0 and 1 are complete; cons(■,■) and if(■,■,■) are regions
/// assert_eq!(partition.complete.len(), 3);
/// assert_eq!(partition.prefixes.len(), 2);
///
/// let data = vec![strings::datum("", "10", 0.9)];
/// let pool = Arc::new(partition.chain_pool(data, 0));
/// assert_eq!(pool.run(Control::new(200, 0, 2)).count(), 200);
/// ```
///
/// [`chain_pool`]: #method.chain_pool
pub struct Partition<D: Domain> {
    pub prefixes: Vec<LotHypothesis<D>>,
    /// Unscored complete trees found while expanding.
    pub complete: Vec<LotHypothesis<D>>,
}
impl<D: Domain> Partition<D> {
    pub fn new(h0: &LotHypothesis<D>, depth: usize) -> Self {
        let mut complete = Vec::new();
        let mut frontier = vec![h0.clone()];
        for _ in 0..depth {
            let mut next = Vec::new();
            for h in frontier {
                if h.value.is_complete() {
                    complete.push(h);
                    continue;
                }
                for which in 0..h.neighbors() {
                    let child = h.make_neighbor(which);
                    if child.value.is_complete() {
                        complete.push(child);
                    } else {
                        next.push(child);
                    }
                }
            }
            frontier = next;
        }
        let (done, prefixes): (Vec<_>, Vec<_>) = frontier
            .into_iter()
            .partition(|h| h.value.is_complete());
        complete.extend(done);
        log::info!(
            "partitioned to depth {} into {} regions and {} complete trees",
            depth,
            prefixes.len(),
            complete.len()
        );
        Partition { prefixes, complete }
    }
    pub fn len(&self) -> usize {
        self.prefixes.len()
    }
    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }
    /// One chain per region, in the order of [`prefixes`]. Chain `i` starts from a random
    /// completion of prefix `i` with the prefix pinned, and is seeded with `seed + i`.
    ///
    /// [`prefixes`]: #structfield.prefixes
    pub fn chain_pool(&self, data: Vec<D::Datum>, seed: u64) -> ChainPool<LotHypothesis<D>> {
        let data = Arc::new(data);
        let mut rng = SmallRng::seed_from_u64(seed);
        let chains = self
            .prefixes
            .iter()
            .zip(0u64..)
            .map(|(prefix, i)| {
                let h = prefix.completed(&mut rng);
                log::debug!("region {} starts at {}", i, h);
                MCMCChain::with_shared_data(h, Arc::clone(&data), seed.wrapping_add(i))
            })
            .collect();
        ChainPool::from_chains(chains)
    }
}
