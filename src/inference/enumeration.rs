use rayon::prelude::*;
use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::interrupted;
use crate::{Domain, Hypothesis, LotHypothesis, TopN};

/// Score the tree of every enumeration code in `codes` and keep the best in `top`, in
/// parallel. Codes that do not correspond to a tree are skipped. Returns how many trees were
/// scored.
///
/// Stops early, with whatever was scored so far, on [`interrupt`].
///
/// # Examples
///
/// ```
/// use lotinduction::domains::strings;
/// use lotinduction::{inference, TopN};
///
/// let domain = strings::domain(&["0", "1"]).unwrap();
/// let data = vec![strings::datum("", "01", 0.99)];
/// let top = TopN::new(5);
/// let scored = inference::enumerate(&domain, &data, 0..2000, &top);
/// assert!(scored > 0);
/// assert_eq!(top.best().unwrap().string(), "cons(0,1)");
/// ```
///
/// [`interrupt`]: fn.interrupt.html
pub fn enumerate<D: Domain>(
    domain: &Arc<D>,
    data: &<LotHypothesis<D> as Hypothesis>::Data,
    codes: Range<u64>,
    top: &TopN<LotHypothesis<D>>,
) -> usize {
    let grammar = domain.runtime().grammar();
    let start = domain.start();
    let scored = AtomicUsize::new(0);
    let (first, end) = (codes.start, codes.end);
    codes.into_par_iter().for_each(|z| {
        if interrupted() {
            return;
        }
        if let Ok(value) = grammar.to_node(start, z) {
            let mut h = LotHypothesis::new(Arc::clone(domain), value);
            h.compute_posterior(data);
            scored.fetch_add(1, Ordering::Relaxed);
            top.add(h);
        }
    });
    let scored = scored.into_inner();
    log::info!("scored {} trees from codes {}..{}", scored, first, end);
    scored
}
