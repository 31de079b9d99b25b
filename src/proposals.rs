//! Proposal kernels over program trees, for Metropolis-Hastings.
//!
//! Every kernel returns the proposed tree with its _forward-backward_ correction
//! `log q(from → to) - log q(to → from)`, which the sampler subtracts from the acceptance ratio.
//! The corrections are exact: each kernel can compute the probability of any move it can make,
//! so [`ProposalMix`] can sum over every kernel that could have produced a given move.
//!
//! Kernels only rewrite _resamplable_ nodes, complete nodes whose subtree holds no pinned node
//! (see [`Node::is_resamplable`]). Resamplable nodes are counted in pre-order.
//!
//! A kernel that finds nothing to do returns the tree unchanged with a correction of zero.
//!
//! [`ProposalMix`]: struct.ProposalMix.html
//! [`Node::is_resamplable`]: ../grammar/struct.Node.html#method.is_resamplable

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::f64;

use crate::grammar::{Grammar, Node, SampleError};
use crate::utils::logsumexp;

/// The kinds of move a [`ProposalMix`] draws from.
///
/// [`ProposalMix`]: struct.ProposalMix.html
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Kernel {
    /// Replace a resamplable subtree with a fresh sample from the grammar.
    Regenerate,
    /// Wrap a resamplable subtree in new structure of the same nonterminal.
    InsertTree,
    /// Replace a resamplable subtree with one of its own descendants of the same nonterminal.
    DeleteTree,
    /// Exchange two same-typed children of a node.
    SwapArgs,
    /// Change a node's rule to another with the same children.
    ResampleFunction,
}
impl Kernel {
    /// Propose a move from `from`, with its forward-backward correction under this kernel
    /// alone.
    pub fn propose<R: Rng>(
        self,
        grammar: &Grammar,
        from: &Node,
        rng: &mut R,
    ) -> Result<(Node, f64), SampleError> {
        match self {
            Kernel::Regenerate => regenerate(grammar, from, rng),
            Kernel::InsertTree => insert_tree(grammar, from, rng),
            Kernel::DeleteTree => Ok(delete_tree(grammar, from, rng)),
            Kernel::SwapArgs => Ok(swap_args(from, rng)),
            Kernel::ResampleFunction => Ok(resample_function(grammar, from, rng)),
        }
    }
    /// The log-probability that this kernel moves `a` to `b`, for `a != b`.
    pub fn log_probability(self, grammar: &Grammar, a: &Node, b: &Node) -> f64 {
        let path = match divergence(a, b) {
            Some(path) => path,
            None => return f64::NEG_INFINITY,
        };
        match self {
            Kernel::Regenerate => lq_regenerate(grammar, a, b, &path),
            Kernel::InsertTree => lq_insert(grammar, a, b, &path),
            Kernel::DeleteTree => lq_delete(grammar, a, b, &path),
            Kernel::SwapArgs => lq_swap(a, b, &path),
            Kernel::ResampleFunction => lq_resample_function(grammar, a, b, &path),
        }
    }
}

/// Weights over the proposal kernels.
///
/// Insert and delete always share one weight, split evenly, since each is the other's reverse.
/// A kernel with zero weight is never used. Weights need not sum to one.
///
/// # Examples
///
/// ```
/// use lotinduction::proposals::ProposalMix;
///
/// let mix: ProposalMix = serde_json::from_str(r#"{"swap_args": 0.0}"#).unwrap();
/// assert_eq!(mix.regenerate, ProposalMix::default().regenerate);
/// assert_eq!(mix.swap_args, 0.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProposalMix {
    pub regenerate: f64,
    /// Shared by [`Kernel::InsertTree`] and [`Kernel::DeleteTree`].
    ///
    /// [`Kernel::InsertTree`]: enum.Kernel.html#variant.InsertTree
    /// [`Kernel::DeleteTree`]: enum.Kernel.html#variant.DeleteTree
    pub insert_delete: f64,
    pub swap_args: f64,
    pub resample_function: f64,
}
impl Default for ProposalMix {
    /// | field               | default value |
    /// | ------------------- | ------------- |
    /// | `regenerate`        | `0.6`         |
    /// | `insert_delete`     | `0.2`         |
    /// | `swap_args`         | `0.1`         |
    /// | `resample_function` | `0.1`         |
    fn default() -> Self {
        ProposalMix {
            regenerate: 0.6,
            insert_delete: 0.2,
            swap_args: 0.1,
            resample_function: 0.1,
        }
    }
}
impl ProposalMix {
    /// Only regeneration.
    pub fn regenerate_only() -> Self {
        ProposalMix {
            regenerate: 1.0,
            insert_delete: 0.0,
            swap_args: 0.0,
            resample_function: 0.0,
        }
    }
    /// Each kernel with its selection probability. Unusable weights (all zero, or negative or
    /// NaN totals) fall back to regeneration.
    pub fn kernels(&self) -> Vec<(Kernel, f64)> {
        let clean = |w: f64| if w.is_finite() && w > 0f64 { w } else { 0f64 };
        let weighted = [
            (Kernel::Regenerate, clean(self.regenerate)),
            (Kernel::InsertTree, clean(self.insert_delete) / 2f64),
            (Kernel::DeleteTree, clean(self.insert_delete) / 2f64),
            (Kernel::SwapArgs, clean(self.swap_args)),
            (Kernel::ResampleFunction, clean(self.resample_function)),
        ];
        let total: f64 = weighted.iter().map(|&(_, w)| w).sum();
        if total <= 0f64 {
            return vec![(Kernel::Regenerate, 1f64)];
        }
        weighted
            .iter()
            .filter(|&&(_, w)| w > 0f64)
            .map(|&(k, w)| (k, w / total))
            .collect()
    }
    /// Draw a kernel and propose with it. The correction accounts for every kernel in the mix
    /// that could have made the same move.
    pub fn propose<R: Rng>(
        &self,
        grammar: &Grammar,
        from: &Node,
        rng: &mut R,
    ) -> Result<(Node, f64), SampleError> {
        let kernels = self.kernels();
        let mut t: f64 = rng.gen();
        let mut chosen = kernels[kernels.len() - 1].0;
        for &(k, p) in &kernels {
            t -= p;
            if t < 0f64 {
                chosen = k;
                break;
            }
        }
        let (to, fb) = chosen.propose(grammar, from, rng)?;
        if to == *from {
            return Ok((to, 0f64));
        }
        if kernels.len() == 1 {
            return Ok((to, fb));
        }
        let fb = self.log_probability(grammar, from, &to) - self.log_probability(grammar, &to, from);
        Ok((to, fb))
    }
    /// The log-probability that the mix moves `a` to `b`, for `a != b`.
    pub fn log_probability(&self, grammar: &Grammar, a: &Node, b: &Node) -> f64 {
        let path = match divergence(a, b) {
            Some(path) => path,
            None => return f64::NEG_INFINITY,
        };
        let terms: Vec<f64> = self
            .kernels()
            .into_iter()
            .map(|(k, p)| {
                p.ln()
                    + match k {
                        Kernel::Regenerate => lq_regenerate(grammar, a, b, &path),
                        Kernel::InsertTree => lq_insert(grammar, a, b, &path),
                        Kernel::DeleteTree => lq_delete(grammar, a, b, &path),
                        Kernel::SwapArgs => lq_swap(a, b, &path),
                        Kernel::ResampleFunction => lq_resample_function(grammar, a, b, &path),
                    }
            })
            .collect();
        logsumexp(&terms)
    }
}

/// Pick a resamplable node uniformly and replace its subtree with a fresh sample from the
/// grammar.
///
/// # Examples
///
/// ```
/// use lotinduction::grammar::{Grammar, Rule};
/// use lotinduction::proposals;
/// use polytype::tp;
/// use rand::{rngs::SmallRng, SeedableRng};
///
/// let g = Grammar::new(
///     tp!(S),
///     vec![
///         Rule::new("a", tp!(S), 1.0),
///         Rule::new("f", tp!(@arrow[tp!(S), tp!(S)]), 1.0),
///     ],
/// );
/// let from = g.parse("f(a)").unwrap();
/// let mut rng = SmallRng::seed_from_u64(0);
/// let (to, fb) = proposals::regenerate(&g, &from, &mut rng).unwrap();
/// assert_eq!(to.nt, from.nt);
/// assert!(fb.is_finite());
/// ```
pub fn regenerate<R: Rng>(
    grammar: &Grammar,
    from: &Node,
    rng: &mut R,
) -> Result<(Node, f64), SampleError> {
    let paths = from.resamplable_paths();
    if paths.is_empty() {
        return Ok((from.clone(), 0f64));
    }
    let path = &paths[rng.gen_range(0..paths.len())];
    let nt = from.get(path).map_or(from.nt, |node| node.nt);
    let subtree = grammar.generate(nt, rng)?;
    let mut to = from.clone();
    to.replace(path, subtree);
    let fb = match divergence(from, &to) {
        None => 0f64,
        Some(div) => lq_regenerate(grammar, from, &to, &div) - lq_regenerate(grammar, &to, from, &div),
    };
    Ok((to, fb))
}

/// Pick a resamplable node `s` uniformly, sample a new tree `t` of its nonterminal, and walk
/// down `t` to a strict descendant `q` of the same nonterminal; `q` is replaced by the old `s`,
/// and `s` by the result. The walk picks uniformly among children that can reach the
/// nonterminal, and stops with probability one half at each node of the nonterminal.
///
/// The reverse move is [`delete_tree`].
///
/// [`delete_tree`]: fn.delete_tree.html
pub fn insert_tree<R: Rng>(
    grammar: &Grammar,
    from: &Node,
    rng: &mut R,
) -> Result<(Node, f64), SampleError> {
    let paths = from.resamplable_paths();
    if paths.is_empty() {
        return Ok((from.clone(), 0f64));
    }
    let path = &paths[rng.gen_range(0..paths.len())];
    let old = match from.get(path) {
        Some(node) => node.clone(),
        None => return Ok((from.clone(), 0f64)),
    };
    let mut wrapper = grammar.generate(old.nt, rng)?;
    let hole = match walk(grammar, &wrapper, old.nt, rng) {
        Some(hole) => hole,
        None => return Ok((from.clone(), 0f64)),
    };
    wrapper.replace(&hole, old);
    let mut to = from.clone();
    to.replace(path, wrapper);
    let fb = insert_delete_correction(grammar, from, &to, paths.len());
    Ok((to, fb))
}

/// Pick a resamplable node `s` uniformly and walk down it, as in [`insert_tree`], to a strict
/// descendant `q` of the same nonterminal; `q` takes the place of `s`.
///
/// [`insert_tree`]: fn.insert_tree.html
pub fn delete_tree<R: Rng>(grammar: &Grammar, from: &Node, rng: &mut R) -> (Node, f64) {
    let paths = from.resamplable_paths();
    if paths.is_empty() {
        return (from.clone(), 0f64);
    }
    let path = &paths[rng.gen_range(0..paths.len())];
    let promoted = from
        .get(path)
        .and_then(|node| walk(grammar, node, node.nt, rng).and_then(|q| node.get(&q)))
        .cloned();
    match promoted {
        Some(promoted) => {
            let mut to = from.clone();
            to.replace(path, promoted);
            let fb = insert_delete_correction(grammar, from, &to, paths.len());
            (to, fb)
        }
        None => (from.clone(), 0f64),
    }
}

/// Pick uniformly a resamplable node with at least two children of the same nonterminal, and
/// exchange a uniformly chosen pair of them. The move is its own reverse.
pub fn swap_args<R: Rng>(from: &Node, rng: &mut R) -> (Node, f64) {
    let candidates: Vec<Vec<usize>> = from
        .resamplable_paths()
        .into_iter()
        .filter(|path| from.get(path).map_or(false, |n| !swappable_pairs(n).is_empty()))
        .collect();
    if candidates.is_empty() {
        return (from.clone(), 0f64);
    }
    let path = &candidates[rng.gen_range(0..candidates.len())];
    let mut to = from.clone();
    if let Some(node) = to.get_mut(path) {
        let pairs = swappable_pairs(node);
        let (i, j) = pairs[rng.gen_range(0..pairs.len())];
        node.children.swap(i, j);
    }
    (to, 0f64)
}

/// Pick uniformly an unpinned non-null node and resample its rule among the rules with the
/// same children, in proportion to their probability. Children are kept, pinned or not.
pub fn resample_function<R: Rng>(grammar: &Grammar, from: &Node, rng: &mut R) -> (Node, f64) {
    let candidates = function_paths(from);
    if candidates.is_empty() {
        return (from.clone(), 0f64);
    }
    let path = &candidates[rng.gen_range(0..candidates.len())];
    let mut to = from.clone();
    let mut fb = 0f64;
    if let Some(node) = to.get_mut(path) {
        if let (Some(old), Some(new)) = (node.rule, grammar.sample_alternative(node, rng)) {
            fb = grammar.rule(node.nt, new).logprob - grammar.rule(node.nt, old).logprob;
            node.rule = Some(new);
        }
    }
    (to, fb)
}

fn insert_delete_correction(grammar: &Grammar, from: &Node, to: &Node, n_from: usize) -> f64 {
    grammar.log_probability(to) - grammar.log_probability(from)
        + (to.count_resamplable() as f64).ln()
        - (n_from as f64).ln()
}

/// The path to the deepest node whose subtree holds every difference between `a` and `b`, or
/// `None` if the trees are equal.
fn divergence(a: &Node, b: &Node) -> Option<Vec<usize>> {
    if a == b {
        return None;
    }
    let mut path = Vec::new();
    let (mut x, mut y) = (a, b);
    loop {
        if x.nt != y.nt || x.rule != y.rule || x.children.len() != y.children.len() {
            return Some(path);
        }
        let mut differing = x
            .children
            .iter()
            .zip(&y.children)
            .enumerate()
            .filter(|(_, (cx, cy))| cx != cy);
        match (differing.next(), differing.next()) {
            (Some((i, (cx, cy))), None) => {
                path.push(i);
                x = cx;
                y = cy;
            }
            _ => return Some(path),
        }
    }
}

/// A random descent from `root` to a strict descendant of nonterminal `target`.
fn walk<R: Rng>(grammar: &Grammar, root: &Node, target: usize, rng: &mut R) -> Option<Vec<usize>> {
    let mut path = Vec::new();
    let mut node = root;
    loop {
        let candidates: Vec<usize> = node
            .children
            .iter()
            .enumerate()
            .filter(|(_, c)| grammar.reaches(c.nt, target))
            .map(|(i, _)| i)
            .collect();
        if candidates.is_empty() {
            return None;
        }
        let i = candidates[rng.gen_range(0..candidates.len())];
        path.push(i);
        node = &node.children[i];
        if node.nt == target && rng.gen_bool(0.5) {
            return Some(path);
        }
    }
}

/// The log-probability that [`walk`] from `root` ends at `path`.
fn walk_log_probability(grammar: &Grammar, root: &Node, path: &[usize], target: usize) -> f64 {
    let mut lp = 0f64;
    let mut node = root;
    for &i in path {
        let candidates = node
            .children
            .iter()
            .filter(|c| grammar.reaches(c.nt, target))
            .count();
        lp -= (candidates as f64).ln();
        node = &node.children[i];
        if node.nt == target {
            lp += 0.5f64.ln();
        }
    }
    lp
}

/// Each prefix of the divergence path, as the pair of subtrees there.
fn prefixes<'a>(
    a: &'a Node,
    b: &'a Node,
    path: &'a [usize],
) -> impl Iterator<Item = (&'a Node, &'a Node)> + 'a {
    (0..=path.len()).filter_map(move |k| Some((a.get(&path[..k])?, b.get(&path[..k])?)))
}

fn lq_regenerate(grammar: &Grammar, a: &Node, b: &Node, path: &[usize]) -> f64 {
    let n = a.count_resamplable();
    if n == 0 {
        return f64::NEG_INFINITY;
    }
    let terms: Vec<f64> = prefixes(a, b, path)
        .filter(|(x, y)| x.is_resamplable() && y.is_resamplable())
        .map(|(_, y)| grammar.log_probability(y) - (n as f64).ln())
        .collect();
    logsumexp(&terms)
}

fn lq_insert(grammar: &Grammar, a: &Node, b: &Node, path: &[usize]) -> f64 {
    let n = a.count_resamplable();
    if n == 0 {
        return f64::NEG_INFINITY;
    }
    let lp_diff = grammar.log_probability(b) - grammar.log_probability(a);
    let mut terms = Vec::new();
    for (x, y) in prefixes(a, b, path) {
        if !(x.is_resamplable() && y.is_resamplable()) {
            continue;
        }
        for q in y.paths_with_nonterminal(x.nt) {
            if !q.is_empty() && y.get(&q) == Some(x) {
                terms.push(walk_log_probability(grammar, y, &q, x.nt) + lp_diff - (n as f64).ln())
            }
        }
    }
    logsumexp(&terms)
}

fn lq_delete(grammar: &Grammar, a: &Node, b: &Node, path: &[usize]) -> f64 {
    let n = a.count_resamplable();
    if n == 0 {
        return f64::NEG_INFINITY;
    }
    let mut terms = Vec::new();
    for (x, y) in prefixes(a, b, path) {
        if !x.is_resamplable() {
            continue;
        }
        for q in x.paths_with_nonterminal(x.nt) {
            if !q.is_empty() && x.get(&q) == Some(y) {
                terms.push(walk_log_probability(grammar, x, &q, x.nt) - (n as f64).ln())
            }
        }
    }
    logsumexp(&terms)
}

fn lq_swap(a: &Node, b: &Node, path: &[usize]) -> f64 {
    let (x, y) = match (a.get(path), b.get(path)) {
        (Some(x), Some(y)) => (x, y),
        _ => return f64::NEG_INFINITY,
    };
    if !x.is_resamplable() || x.rule != y.rule || x.children.len() != y.children.len() {
        return f64::NEG_INFINITY;
    }
    let differing: Vec<usize> = (0..x.children.len())
        .filter(|&i| x.children[i] != y.children[i])
        .collect();
    if differing.len() != 2 {
        return f64::NEG_INFINITY;
    }
    let (i, j) = (differing[0], differing[1]);
    let swapped = x.children[i].nt == x.children[j].nt
        && x.children[i] == y.children[j]
        && x.children[j] == y.children[i];
    if !swapped {
        return f64::NEG_INFINITY;
    }
    let candidates = a
        .resamplable_paths()
        .into_iter()
        .filter(|p| a.get(p).map_or(false, |n| !swappable_pairs(n).is_empty()))
        .count();
    -(candidates as f64).ln() - (swappable_pairs(x).len() as f64).ln()
}

fn lq_resample_function(grammar: &Grammar, a: &Node, b: &Node, path: &[usize]) -> f64 {
    let (x, y) = match (a.get(path), b.get(path)) {
        (Some(x), Some(y)) => (x, y),
        _ => return f64::NEG_INFINITY,
    };
    let (old, new) = match (x.rule, y.rule) {
        (Some(old), Some(new)) if old != new && x.children == y.children => (old, new),
        _ => return f64::NEG_INFINITY,
    };
    if !x.can_resample {
        return f64::NEG_INFINITY;
    }
    let alternatives = grammar.alternatives(x.nt, grammar.rule(x.nt, old));
    if !alternatives.contains(&new) {
        return f64::NEG_INFINITY;
    }
    let z: Vec<f64> = alternatives
        .iter()
        .map(|&i| grammar.rule(x.nt, i).logprob)
        .collect();
    let n = function_paths(a).len();
    grammar.rule(x.nt, new).logprob - logsumexp(&z) - (n as f64).ln()
}

fn swappable_pairs(node: &Node) -> Vec<(usize, usize)> {
    let k = node.children.len();
    (0..k)
        .flat_map(|i| (i + 1..k).map(move |j| (i, j)))
        .filter(|&(i, j)| node.children[i].nt == node.children[j].nt)
        .collect()
}

/// Paths to unpinned non-null nodes, in pre-order.
fn function_paths(root: &Node) -> Vec<Vec<usize>> {
    fn visit(node: &Node, path: &mut Vec<usize>, found: &mut Vec<Vec<usize>>) {
        if node.can_resample && !node.is_null() {
            found.push(path.clone());
        }
        for (i, child) in node.children.iter().enumerate() {
            path.push(i);
            visit(child, path, found);
            path.pop();
        }
    }
    let mut found = Vec::new();
    visit(root, &mut Vec::new(), &mut found);
    found
}
