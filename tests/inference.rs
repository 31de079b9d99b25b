use lotinduction::inference::{
    geometric_ladder, ChainPool, Control, HillClimbing, MCMCChain, ParallelTempering,
    PriorSampler, TemperingParams,
};
use lotinduction::{Bayes, Hypothesis, TopN};
use rand::{rngs::SmallRng, Rng, SeedableRng};
use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// A walk on five states arranged in a cycle; the data holds each state's log-likelihood.
#[derive(Debug, Clone)]
struct Cycle {
    state: usize,
    bayes: Bayes,
}
impl Cycle {
    fn new(state: usize) -> Self {
        Cycle {
            state,
            bayes: Bayes::new(),
        }
    }
}
impl PartialEq for Cycle {
    fn eq(&self, other: &Self) -> bool {
        self.state == other.state
    }
}
impl Eq for Cycle {}
impl Hash for Cycle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.state.hash(state)
    }
}
impl Hypothesis for Cycle {
    type Data = Vec<f64>;
    fn bayes(&self) -> &Bayes {
        &self.bayes
    }
    fn bayes_mut(&mut self) -> &mut Bayes {
        &mut self.bayes
    }
    fn sample<R: Rng>(&self, rng: &mut R) -> Self {
        Cycle::new(rng.gen_range(0..5))
    }
    fn restart<R: Rng>(&self, rng: &mut R) -> Self {
        self.sample(rng)
    }
    fn propose<R: Rng>(&self, rng: &mut R) -> (Self, f64) {
        let step = if rng.gen_bool(0.5) { 1 } else { 4 };
        (Cycle::new((self.state + step) % 5), 0.0)
    }
    fn compute_prior(&mut self) -> f64 {
        0.0
    }
    fn compute_likelihood(&mut self, data: &Vec<f64>, _breakout: f64) -> f64 {
        data[self.state]
    }
}

/// State `i` has probability `(i + 1) / 15`.
fn weights() -> Vec<f64> {
    (1..=5).map(|w| (w as f64 / 15.0).ln()).collect()
}

fn scored(state: usize) -> Cycle {
    let mut h = Cycle::new(state);
    h.compute_posterior(&weights());
    h
}

#[test]
fn inference_chain_samples_the_posterior() {
    let chain = MCMCChain::new(Cycle::new(0), weights(), 7);
    let ctl = Control {
        burn: 1000,
        ..Control::new(101_000, 0, 1)
    };
    let mut counts = [0usize; 5];
    for h in chain.run(ctl) {
        counts[h.state] += 1;
    }
    let total: usize = counts.iter().sum();
    assert_eq!(total, 100_000);
    for (i, &c) in counts.iter().enumerate() {
        let expected = (i + 1) as f64 / 15.0;
        let observed = c as f64 / total as f64;
        assert!(
            (observed - expected).abs() < 0.02,
            "state {}: {} vs {}",
            i,
            observed,
            expected
        );
    }
    assert_eq!(chain.samples(), 101_000);
    assert_eq!(chain.proposals(), 101_000);
    let rate = chain.acceptance_rate().unwrap();
    assert!(rate > 0.0 && rate < 1.0);
}

#[test]
fn inference_burn_and_thin() {
    let chain = MCMCChain::new(Cycle::new(2), weights(), 0);
    let ctl = Control {
        burn: 100,
        thin: 10,
        ..Control::new(1000, 0, 1)
    };
    assert_eq!(chain.run(ctl).count(), 90);
    assert!(ctl.yields(110));
    assert!(!ctl.yields(100));
    assert!(!ctl.yields(115));
}

#[test]
fn inference_unscored_start_is_always_left() {
    // state 0 is ruled out entirely; the chain restarts until it escapes
    let mut data = weights();
    data[0] = f64::NEG_INFINITY;
    let chain = MCMCChain::new(Cycle::new(0), data, 1);
    assert_eq!(chain.current().posterior(), f64::NEG_INFINITY);
    let mut h = chain.step(0);
    for _ in 0..50 {
        if h.state != 0 {
            break;
        }
        h = chain.step(0);
    }
    assert_ne!(h.state, 0);
    assert!(h.posterior().is_finite());
}

#[test]
fn inference_control_from_json() {
    let ctl: Control =
        serde_json::from_str(r#"{"steps": 20, "time_ms": 5, "burn": 2, "thin": 3}"#).unwrap();
    assert_eq!(ctl.steps, 20);
    assert_eq!(ctl.time_ms, 5);
    assert_eq!(ctl.threads, 1);
    assert_eq!(ctl.restart, 0);
    let back: Control = serde_json::from_str(&serde_json::to_string(&ctl).unwrap()).unwrap();
    assert_eq!(back, ctl);
}

#[test]
fn inference_pool_streams_every_step() {
    let pool = Arc::new(ChainPool::new(Cycle::new(0), weights(), 4, 11));
    assert_eq!(pool.len(), 4);
    let mut seen = [0usize; 4];
    let mut n = 0;
    for sample in pool.run(Control::new(4000, 0, 2)) {
        assert!(sample.hypothesis.posterior().is_finite());
        seen[sample.chain] += 1;
        n += 1;
    }
    assert_eq!(n, 4000);
    assert!(seen.iter().all(|&c| c > 0), "chains starved: {:?}", seen);
    let stepped: u64 = pool.chains().iter().map(MCMCChain::samples).sum();
    assert_eq!(stepped, 4000);
}

#[test]
fn inference_pool_stops_when_dropped() {
    let pool = Arc::new(ChainPool::new(Cycle::new(0), weights(), 3, 5));
    let taken = pool.run(Control::new(0, 0, 2)).take(10).count();
    assert_eq!(taken, 10);
    // the stream was dropped, so the workers have exited and stepping has stopped
    let stepped: u64 = pool.chains().iter().map(MCMCChain::samples).sum();
    assert!(stepped >= 10);
    let later: u64 = pool.chains().iter().map(MCMCChain::samples).sum();
    assert_eq!(stepped, later);
}

#[test]
fn inference_swaps_exchange_states() {
    let pt = ParallelTempering::new(
        Cycle::new(4),
        weights(),
        &[1.0, 2.0, 4.0, 8.0],
        3,
        TemperingParams::default(),
    );
    let states = |pt: &ParallelTempering<Cycle>| {
        let mut v: Vec<usize> = pt.chains().iter().map(|c| c.current().state).collect();
        v.sort();
        v
    };
    let before = states(&pt);
    let mut rng = SmallRng::seed_from_u64(0);
    for _ in 0..100 {
        pt.swap_once(&mut rng);
        assert_eq!(states(&pt), before);
    }
    for k in 1..4 {
        let rate = pt.swap_rate(k).unwrap();
        assert!((0.0..=1.0).contains(&rate));
    }
    assert_eq!(pt.swap_rate(0), None);
}

#[test]
fn inference_adaptation_keeps_the_ends_of_the_ladder() {
    let pt = ParallelTempering::new(
        Cycle::new(0),
        weights(),
        &[1.0, 2.0, 4.0, 8.0],
        9,
        TemperingParams::default(),
    );
    let mut rng = SmallRng::seed_from_u64(1);
    for _ in 0..20 {
        pt.swap_once(&mut rng);
        pt.adapt_once();
    }
    let temps = pt.temperatures();
    assert_eq!(temps[0], 1.0);
    assert_eq!(temps[3], 8.0);
    assert!(temps.windows(2).all(|w| w[0] < w[1]), "{:?}", temps);
}

#[test]
fn inference_tempering_run() {
    let params = TemperingParams {
        swap_every_ms: 1,
        adapt_every_ms: 3,
        time_resolution_ms: 1,
        ..TemperingParams::default()
    };
    let pt = Arc::new(ParallelTempering::with_geometric_ladder(
        Cycle::new(0),
        weights(),
        4,
        100.0,
        17,
        params,
    ));
    let mut n = 0;
    for sample in pt.run(Control::new(5000, 0, 2)) {
        assert!(sample.chain < 4);
        n += 1;
    }
    assert_eq!(n, 5000);
    let temps = pt.temperatures();
    assert!((temps[0] - 1.0).abs() < 1e-12);
    assert!((temps[3] - 100.0).abs() < 1e-9);
}

#[test]
fn inference_top_keeps_the_best() {
    let top = TopN::new(3);
    for state in 0..5 {
        assert!(top.add(scored(state)));
    }
    assert_eq!(top.len(), 3);
    assert!(!top.add(scored(4)));
    assert!(!top.add(scored(0)));
    assert!(!top.add(Cycle::new(1)));
    let states: Vec<usize> = top.to_vec().iter().map(|h| h.state).collect();
    assert_eq!(states, vec![4, 3, 2]);
    assert_eq!(top.worst().unwrap().state, 2);
    assert!(top.contains(&scored(3)));

    let other = TopN::new(2);
    other.merge(&top);
    assert_eq!(other.len(), 2);
    assert_eq!(other.best().unwrap().state, 4);
    let z = other.z(1.0);
    assert!((z - (9.0f64 / 15.0).ln()).abs() < 1e-12);
    assert_eq!(other.pop_best().unwrap().state, 4);
    assert_eq!(other.len(), 1);
    other.clear();
    assert!(other.is_empty());
}

#[test]
fn inference_ladder_gaps_double() {
    let ladder = geometric_ladder(5, 17.0);
    assert_eq!(ladder, vec![1.0, 3.0, 5.0, 9.0, 17.0]);
    let gaps: Vec<f64> = ladder.windows(2).map(|w| w[1] - w[0]).collect();
    assert_eq!(gaps, vec![2.0, 2.0, 4.0, 8.0]);
    assert_eq!(geometric_ladder(2, 5.0), vec![1.0, 5.0]);
}

#[test]
fn inference_top_is_shared_between_threads() {
    let top = TopN::new(3);
    std::thread::scope(|scope| {
        for offset in 0..4 {
            let top = &top;
            scope.spawn(move || {
                for i in 0..50 {
                    top.add(scored((i + offset) % 5));
                }
            });
        }
    });
    let sequential = TopN::new(3);
    for state in 0..5 {
        sequential.add(scored(state));
    }
    let kept: Vec<usize> = top.to_vec().iter().map(|h| h.state).collect();
    let distinct: HashSet<usize> = kept.iter().cloned().collect();
    assert!(kept.len() <= 3);
    assert_eq!(distinct.len(), kept.len());
    let expected: Vec<usize> = sequential.to_vec().iter().map(|h| h.state).collect();
    assert_eq!(kept, expected);
}

#[test]
fn inference_hill_climbing_finds_the_peak() {
    let mut climber = HillClimbing::new(Cycle::new(1), weights(), 2, 10, 3);
    let mut found = 0;
    climber.run(&Control::new(200, 0, 1), |h| {
        assert!(h.posterior().is_finite());
        found += 1;
    });
    assert!(found > 0 && found <= 200);
    let kept = climber.top();
    assert!(kept.len() <= 2);
    assert_eq!(kept.best().unwrap().state, 4);
}

#[test]
fn inference_hill_climbing_restarts() {
    let mut climber = HillClimbing::new(Cycle::new(4), weights(), 1, 4, 8);
    let ctl = Control {
        restart: 10,
        ..Control::new(2000, 0, 1)
    };
    let mut states = HashSet::new();
    climber.run(&ctl, |h| {
        states.insert(h.state);
    });
    // stuck on the peak, so every state is eventually visited again through restarts
    assert_eq!(states.len(), 5);
}

#[test]
fn inference_prior_sampler_draws_independently() {
    let sampler = Arc::new(PriorSampler::new(Cycle::new(0), weights(), 21));
    let mut counts = [0usize; 5];
    let mut workers = HashSet::new();
    for sample in sampler.run(Control::new(10_000, 0, 3)) {
        assert!(sample.hypothesis.posterior().is_finite());
        counts[sample.hypothesis.state] += 1;
        workers.insert(sample.chain);
    }
    assert_eq!(counts.iter().sum::<usize>(), 10_000);
    assert!(workers.iter().all(|&w| w < 3));
    for &c in &counts {
        assert!((c as f64 / 10_000.0 - 0.2).abs() < 0.03, "{:?}", counts);
    }
}
