use lotinduction::domains::strings::{self, Space, StringHypothesis};
use lotinduction::grammar::Node;
use lotinduction::inference::{self, BeamParams, BeamSearch, ChainPool, Control, Partition};
use lotinduction::{Domain, Hypothesis, LotHypothesis, TopN};
use rand::{rngs::SmallRng, SeedableRng};
use std::sync::Arc;

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn strings_records_round_trip() {
    let d = strings::domain(&["0", "1"]).unwrap();
    let data = vec![strings::datum("1", "10", 0.9)];
    let tree = d.runtime().grammar().parse("cons(x,0)").unwrap();
    let mut h = LotHypothesis::new(d.clone(), tree);
    h.compute_posterior(&data);
    let record = h.serialize();
    assert!(record.ends_with("\tcons(x,0)"));
    let back: StringHypothesis = LotHypothesis::deserialize(&d, &record).unwrap();
    assert_eq!(back, h);
    assert_eq!(back.bayes().prior, h.bayes().prior);
    assert_eq!(back.bayes().posterior, h.bayes().posterior);
    assert!(LotHypothesis::deserialize(&d, "0.5\tcons(x,0)").is_err());
    assert!(LotHypothesis::deserialize(&d, "1\t2\t3\tcons(x)").is_err());
}

#[test]
fn strings_records_drop_pins() {
    let d = strings::domain(&["0", "1"]).unwrap();
    let mut value = d.runtime().grammar().parse("cons(cons(1,1),x)").unwrap();
    value.children[0].pin();
    let mut h = LotHypothesis::new(d.clone(), value);
    h.compute_posterior(&vec![strings::datum("0", "110", 0.9)]);
    let back: StringHypothesis = LotHypothesis::deserialize(&d, &h.serialize()).unwrap();
    assert_eq!(back, h);
    assert!(back.value.iter().all(|n| n.can_resample));
    assert!(back.bayes().born > h.bayes().born);
}

#[test]
fn strings_partial_trees_are_ruled_out() {
    let d = strings::domain(&["0", "1"]).unwrap();
    let mut h = LotHypothesis::null(d);
    let posterior = h.compute_posterior(&vec![strings::datum("", "0", 0.9)]);
    assert_eq!(posterior, f64::NEG_INFINITY);
    assert!(h.bayes().likelihood.is_nan());
    assert!(!TopN::new(3).add(h));
}

#[test]
fn strings_restart_keeps_pinned_subtrees() {
    let d = strings::domain(&["0", "1"]).unwrap();
    let mut value = d.runtime().grammar().parse("cons(cons(1,1),0)").unwrap();
    value.children[0].pin();
    let h = LotHypothesis::new(d, value);
    let mut rng = SmallRng::seed_from_u64(2);
    for _ in 0..50 {
        let restarted = h.restart(&mut rng);
        if restarted.value.is_null() {
            continue;
        }
        assert_eq!(h.grammar().display(&restarted.value.children[0]), "cons(1,1)");
    }
}

#[test]
fn strings_completions_extend_partial_trees() {
    let d = strings::domain(&["0", "1"]).unwrap();
    let h = LotHypothesis::null(d);
    assert_eq!(h.neighbors(), 5);
    let cons = (0..h.neighbors())
        .map(|i| h.make_neighbor(i))
        .find(|n| !n.value.is_complete())
        .unwrap();
    let mut rng = SmallRng::seed_from_u64(4);
    for _ in 0..20 {
        let done = cons.completed(&mut rng);
        if done.value.is_complete() {
            assert_eq!(done.value.rule, cons.value.rule);
            assert!(!done.value.can_resample);
        }
    }
}

#[test]
fn strings_beam_search_finds_the_output() {
    init();
    let d = strings::domain(&["0", "1"]).unwrap();
    let data = vec![strings::datum("", "01", 0.999); 5];
    let params = BeamParams {
        width: 100,
        n_reps: 5,
        ..BeamParams::default()
    };
    let mut search = BeamSearch::new(LotHypothesis::null(d), data, params, 0);
    let top = TopN::new(10);
    search.run(&Control::new(200, 0, 1), |h| {
        top.add(h);
    });
    let best = top.best().unwrap();
    assert!(best.call(Space::from("")).contains(&Space::from("01")));
}

#[test]
fn strings_enumeration_agrees_with_scoring() {
    let d = strings::domain(&["0", "1"]).unwrap();
    let data = vec![strings::datum("1", "11", 0.99); 3];
    let top = TopN::new(3);
    let scored = inference::enumerate(&d, &data, 0..5000, &top);
    assert!(scored > 1000);
    let best = top.best().unwrap();
    let mut rescored = LotHypothesis::new(d.clone(), best.value.clone());
    rescored.compute_posterior(&data);
    assert_eq!(rescored.posterior(), best.posterior());
    assert_eq!(best.call_one(Space::from("1")), Ok(Space::from("11")));
}

#[test]
fn strings_chains_learn_a_constant() {
    init();
    let d = strings::domain(&["0", "1"]).unwrap();
    let data = vec![strings::datum("", "01011", 0.99); 5];
    let mut rng = SmallRng::seed_from_u64(0);
    let h0 = LotHypothesis::from_prior(Arc::clone(&d), &mut rng);
    let pool = Arc::new(ChainPool::new(h0, data, 4, 0));
    let top = TopN::new(10);
    let ctl = Control {
        restart: 5000,
        ..Control::new(80_000, 0, 4)
    };
    for sample in pool.run(ctl) {
        top.add(sample.hypothesis);
    }
    let best = top.best().unwrap();
    let outputs = best.call(Space::from(""));
    assert!(
        outputs.lp(&Space::from("01011")) > f64::NEG_INFINITY,
        "learned {}",
        best
    );
}

/// Whether `tree` agrees with `prefix` wherever `prefix` is filled in, with those nodes pinned.
fn extends(prefix: &Node, tree: &Node) -> bool {
    prefix.is_null()
        || (prefix.rule == tree.rule
            && !tree.can_resample
            && prefix.children.len() == tree.children.len()
            && prefix
                .children
                .iter()
                .zip(&tree.children)
                .all(|(p, t)| extends(p, t)))
}

#[test]
fn strings_partitioned_chains_keep_their_prefixes() {
    init();
    let d = strings::domain(&["0", "1"]).unwrap();
    let partition = Partition::new(&LotHypothesis::null(d), 2);
    // cons(■,■) and if(■,■,■) each expand once more
    assert_eq!(partition.complete.len(), 3);
    assert_eq!(partition.len(), 6);
    for prefix in &partition.prefixes {
        assert!(!prefix.value.is_complete());
    }

    let data = vec![strings::datum("1", "101", 0.9); 3];
    let pool = Arc::new(partition.chain_pool(data, 3));
    assert_eq!(pool.len(), partition.len());
    let ctl = Control {
        restart: 50,
        ..Control::new(6000, 0, 3)
    };
    let mut seen = vec![0usize; pool.len()];
    for sample in pool.run(ctl) {
        let prefix = &partition.prefixes[sample.chain].value;
        assert!(
            extends(prefix, &sample.hypothesis.value),
            "{} left {}",
            sample.hypothesis,
            partition.prefixes[sample.chain]
        );
        seen[sample.chain] += 1;
    }
    assert!(seen.iter().all(|&c| c > 0), "regions starved: {:?}", seen);
}

#[test]
fn strings_partition_of_a_complete_tree_is_empty() {
    let d = strings::domain(&["0", "1"]).unwrap();
    let tree = d.runtime().grammar().parse("cons(x,1)").unwrap();
    let partition = Partition::new(&LotHypothesis::new(d, tree), 3);
    assert!(partition.is_empty());
    assert_eq!(partition.complete.len(), 1);
    let pool = Arc::new(partition.chain_pool(vec![], 0));
    assert_eq!(pool.run(Control::new(10, 0, 2)).count(), 0);
}
