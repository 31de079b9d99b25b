use lotinduction::grammar::{Grammar, Node, Rule};
use lotinduction::proposals::{self, Kernel, ProposalMix};
use polytype::tp;
use rand::{rngs::SmallRng, SeedableRng};

fn grammar() -> Grammar {
    Grammar::new(
        tp!(S),
        vec![
            Rule::new("a", tp!(S), 2.0),
            Rule::new("b", tp!(S), 1.0),
            Rule::new("f", tp!(@arrow[tp!(S), tp!(S)]), 1.0),
            Rule::new("g", tp!(@arrow[tp!(S), tp!(S), tp!(S)]), 1.0),
        ],
    )
}

/// How often `mix` moves `from` to `to` in `trials` proposals, and the correction it reported
/// when it did.
fn frequency(g: &Grammar, mix: &ProposalMix, from: &Node, to: &Node, trials: usize) -> (f64, f64) {
    let mut rng = SmallRng::seed_from_u64(trials as u64);
    let mut hits = 0;
    let mut fb = f64::NAN;
    for _ in 0..trials {
        let (proposed, correction) = mix.propose(g, from, &mut rng).unwrap();
        if proposed == *to {
            hits += 1;
            fb = correction;
        }
    }
    (hits as f64 / trials as f64, fb)
}

/// The empirical `log q(a → b) - log q(b → a)` against the correction the mix reports.
fn assert_balanced(g: &Grammar, mix: &ProposalMix, a: &str, b: &str) {
    let (a, b) = (g.parse(a).unwrap(), g.parse(b).unwrap());
    let (forward, fb) = frequency(g, mix, &a, &b, 200_000);
    let (backward, bf) = frequency(g, mix, &b, &a, 200_000);
    assert!(forward > 0.0 && backward > 0.0);
    assert!((fb + bf).abs() < 1e-9, "corrections {} and {} disagree", fb, bf);
    let empirical = (forward / backward).ln();
    assert!(
        (empirical - fb).abs() < 0.05,
        "empirical {} vs reported {}",
        empirical,
        fb
    );
    assert!((mix.log_probability(g, &a, &b) - forward.ln()).abs() < 0.05);
}

#[test]
fn proposals_regenerate_probabilities() {
    let g = grammar();
    let a = g.parse("f(a)").unwrap();
    let b = g.parse("f(b)").unwrap();
    // root: 1/2 * P(f(b)); child: 1/2 * P(b)
    let forward = 0.5 * 0.2 * 0.2 + 0.5 * 0.2;
    let backward = 0.5 * 0.2 * 0.4 + 0.5 * 0.4;
    let mix = ProposalMix::regenerate_only();
    assert!((mix.log_probability(&g, &a, &b) - f64::ln(forward)).abs() < 1e-9);
    assert!((mix.log_probability(&g, &b, &a) - f64::ln(backward)).abs() < 1e-9);
    let (freq, fb) = frequency(&g, &mix, &a, &b, 200_000);
    assert!((freq - forward).abs() < 0.005);
    assert!((fb - 0.5f64.ln()).abs() < 1e-9);
}

#[test]
fn proposals_regenerate_is_balanced() {
    let g = grammar();
    let mix = ProposalMix::regenerate_only();
    assert_balanced(&g, &mix, "f(a)", "f(b)");
    assert_balanced(&g, &mix, "g(a,b)", "g(a,a)");
}

#[test]
fn proposals_insert_delete_probabilities() {
    let g = grammar();
    let a = g.parse("f(a)").unwrap();
    let b = g.parse("f(f(a))").unwrap();
    let mix = ProposalMix {
        regenerate: 0.0,
        insert_delete: 1.0,
        swap_args: 0.0,
        resample_function: 0.0,
    };
    // insert at either of 2 nodes, a wrapper f(_) with P 1/5, a walk stopping at once
    let insert = 0.5 * (2.0 * 0.5 * 0.2 * 0.5);
    // delete at the root or its child, of 3 nodes, with a walk stopping at once
    let delete = 0.5 * (2.0 * 0.5 / 3.0);
    assert!((mix.log_probability(&g, &a, &b) - f64::ln(insert)).abs() < 1e-9);
    assert!((mix.log_probability(&g, &b, &a) - f64::ln(delete)).abs() < 1e-9);
    assert!((Kernel::InsertTree.log_probability(&g, &a, &b) - f64::ln(0.1)).abs() < 1e-9);
    assert_eq!(Kernel::InsertTree.log_probability(&g, &b, &a), f64::NEG_INFINITY);
    assert_balanced(&g, &mix, "f(a)", "f(f(a))");
}

#[test]
fn proposals_insert_and_delete_are_inverse() {
    let g = grammar();
    let from = g.parse("g(f(a),b)").unwrap();
    let mut rng = SmallRng::seed_from_u64(3);
    for _ in 0..500 {
        let (to, fb) = proposals::insert_tree(&g, &from, &mut rng).unwrap();
        if to == from {
            continue;
        }
        assert!(to.count() > from.count());
        let forward = Kernel::InsertTree.log_probability(&g, &from, &to);
        let backward = Kernel::DeleteTree.log_probability(&g, &to, &from);
        assert!((forward - backward - fb).abs() < 1e-9);
    }
}

#[test]
fn proposals_default_mix_is_balanced() {
    let g = grammar();
    let mix = ProposalMix::default();
    assert_balanced(&g, &mix, "f(a)", "f(b)");
    assert_balanced(&g, &mix, "g(a,b)", "g(b,a)");
    assert_balanced(&g, &mix, "f(a)", "f(f(a))");
}

#[test]
fn proposals_resample_function_keeps_children() {
    let g = grammar();
    let from = g.parse("g(f(a),b)").unwrap();
    let mut rng = SmallRng::seed_from_u64(5);
    for _ in 0..200 {
        let (to, fb) = proposals::resample_function(&g, &from, &mut rng);
        assert_eq!(to.count(), from.count());
        if to == from {
            assert_eq!(fb, 0.0);
        } else {
            assert!(fb.is_finite());
        }
    }
}

#[test]
fn proposals_mix_weights() {
    let mix = ProposalMix {
        regenerate: 0.0,
        insert_delete: 0.0,
        swap_args: 0.0,
        resample_function: 0.0,
    };
    assert_eq!(mix.kernels(), vec![(Kernel::Regenerate, 1.0)]);
    let kernels = ProposalMix::default().kernels();
    assert_eq!(kernels.len(), 5);
    let total: f64 = kernels.iter().map(|&(_, p)| p).sum();
    assert!((total - 1.0).abs() < 1e-12);
    let insert = kernels.iter().find(|&&(k, _)| k == Kernel::InsertTree).unwrap();
    assert!((insert.1 - 0.1).abs() < 1e-12);
}
