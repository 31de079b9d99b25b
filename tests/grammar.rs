use lotinduction::grammar::{
    BuiltinOp, EnumerationError, Grammar, GrammarError, Node, ParseError, Rule,
};
use polytype::tp;
use rand::{rngs::SmallRng, SeedableRng};
use std::collections::HashSet;

fn strings_grammar() -> Grammar {
    Grammar::new(
        tp!(S),
        vec![
            Rule::builtin("x", tp!(S), 1.0, BuiltinOp::X),
            Rule::new("0", tp!(S), 1.0),
            Rule::new("1", tp!(S), 1.0),
            Rule::new("cons", tp!(@arrow[tp!(S), tp!(S), tp!(S)]), 1.0),
        ],
    )
}

#[test]
fn grammar_rules_are_normalized_and_ordered() {
    let g = Grammar::new(
        tp!(S),
        vec![
            Rule::new("f", tp!(@arrow[tp!(S), tp!(S)]), 1.0),
            Rule::new("a", tp!(S), 1.0),
            Rule::new("g", tp!(@arrow[tp!(S), tp!(S)]), 2.0),
            Rule::new("b", tp!(S), 4.0),
        ],
    );
    let names: Vec<_> = g.rules(g.start()).iter().map(|r| r.name).collect();
    // terminals first, then by descending probability
    assert_eq!(names, vec!["b", "a", "g", "f"]);
    let total: f64 = g.rules(g.start()).iter().map(|r| r.logprob.exp()).sum();
    assert!((total - 1.0).abs() < 1e-12);
    assert_eq!(g.count_terminals(g.start()), 2);
    assert_eq!(g.count_expansions(g.start()), 2);
}

#[test]
fn grammar_parse_display_round_trip() {
    let g = strings_grammar();
    for s in &["x", "cons(0,1)", "cons(cons(x,1),■)"] {
        let t = g.parse(s).unwrap();
        assert_eq!(&g.display(&t), s);
    }
    assert_eq!(
        g.display(&g.parse("  cons( x ,  cons(0, 1) ) ").unwrap()),
        "cons(x,cons(0,1))"
    );
    assert!(g.parse("cons(0)").is_err());
    assert!(g.parse("nope").is_err());
}

#[test]
fn grammar_parse_checks_arity() {
    let g = strings_grammar();
    assert_eq!(
        g.parse("cons(0)"),
        Err(ParseError::WrongArity("cons".to_owned(), 2, 1))
    );
    assert_eq!(
        g.parse("cons(0,1,x)"),
        Err(ParseError::WrongArity("cons".to_owned(), 2, 3))
    );
    assert!(matches!(
        g.parse("cons(x(0),1)"),
        Err(ParseError::WrongArity(ref name, 0, 1)) if name == "x"
    ));
    assert!(matches!(
        g.parse("cons(0,2)"),
        Err(ParseError::InapplicableRule(_, ref name)) if name == "2"
    ));
}

#[test]
fn grammar_one_node_probability() {
    let g = Grammar::new(
        tp!(S),
        vec![
            Rule::new("a", tp!(S), 1.0),
            Rule::new("b", tp!(S), 1.0),
            Rule::new("c", tp!(S), 1.0),
        ],
    );
    let t = g.parse("b").unwrap();
    assert!((g.log_probability(&t) - (1.0f64 / 3.0).ln()).abs() < 1e-12);
}

#[test]
fn grammar_partial_trees_count_filled_rules_only() {
    let g = strings_grammar();
    let partial = g.parse("cons(■,0)").unwrap();
    assert!(!partial.is_complete());
    assert!((g.log_probability(&partial) - 2.0 * 0.25f64.ln()).abs() < 1e-12);
    assert_eq!(g.neighbors(&partial), 4);
    let mut t = partial.clone();
    g.expand_to_neighbor(&mut t, 0);
    assert_eq!(g.display(&t), "cons(x,0)");
}

#[test]
fn grammar_enumeration_is_a_bijection() {
    let g = strings_grammar();
    let mut seen = HashSet::new();
    for z in 0..2000u64 {
        let t = g.to_node(g.start(), z).unwrap();
        assert_eq!(g.to_integer(&t).unwrap(), z);
        assert!(seen.insert(t), "code {} repeats a tree", z);
    }
}

#[test]
fn grammar_sampled_trees_have_codes() {
    let g = strings_grammar();
    let mut rng = SmallRng::seed_from_u64(7);
    for _ in 0..200 {
        let t = g.generate(g.start(), &mut rng).unwrap();
        match g.to_integer(&t) {
            Ok(z) => assert_eq!(g.to_node(g.start(), z).unwrap(), t),
            Err(EnumerationError::Overflow) => {}
            Err(err) => panic!("unexpected error {}", err),
        }
    }
}

#[test]
fn grammar_finite_nonterminals_run_out() {
    let g = Grammar::new(
        tp!(S),
        vec![
            Rule::new("a", tp!(S), 1.0),
            Rule::new("f", tp!(@arrow[tp!(B), tp!(S)]), 1.0),
            Rule::new("yes", tp!(B), 1.0),
            Rule::new("no", tp!(B), 1.0),
        ],
    );
    let b = g.nonterminal(&tp!(B)).unwrap();
    assert_eq!(g.enumerate_nonterminal(b).count(), 2);
    match g.to_node(b, 2) {
        Err(EnumerationError::OutOfRange(_, 2)) => {}
        other => panic!("expected out of range, got {:?}", other),
    }
    let trees: Vec<String> = g.enumerate().take(3).map(|(_, t)| g.display(&t)).collect();
    assert_eq!(trees, vec!["a", "f(yes)", "f(no)"]);
}

#[test]
fn grammar_check_rejects_empty_nonterminals() {
    let g = Grammar::new(
        tp!(S),
        vec![Rule::new("f", tp!(@arrow[tp!(T), tp!(S)]), 1.0)],
    );
    match g.check() {
        Err(GrammarError::NoRules(tp)) => assert_eq!(tp, tp!(T)),
        other => panic!("expected missing rules, got {:?}", other),
    }
}

#[test]
fn grammar_copy_resample_keeps_pins() {
    let g = strings_grammar();
    let mut t = g.parse("cons(cons(0,1),x)").unwrap();
    t.children[0].pin();
    let mut rng = SmallRng::seed_from_u64(1);
    for _ in 0..50 {
        let u = g
            .copy_resample(&t, &mut rng, &|n: &Node| n.can_resample)
            .unwrap();
        assert_eq!(g.display(&u.children[0]), "cons(0,1)");
    }
}
