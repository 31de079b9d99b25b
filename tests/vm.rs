use lotinduction::grammar::{BuiltinOp, Grammar, GrammarError, Rule};
use lotinduction::vm::{Abort, Primitive, PrimitiveError, Runtime, Value, VmControl};
use polytype::tp;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum V {
    Int(i64),
    Bool(bool),
}
impl Value for V {
    fn from_bool(b: bool) -> Self {
        V::Bool(b)
    }
    fn to_bool(&self) -> Option<bool> {
        match *self {
            V::Bool(b) => Some(b),
            V::Int(_) => None,
        }
    }
    fn is_empty(&self) -> bool {
        *self == V::Int(0)
    }
    fn empty() -> Option<Self> {
        Some(V::Int(0))
    }
}

fn int(v: &V) -> Result<i64, PrimitiveError> {
    match *v {
        V::Int(n) => Ok(n),
        V::Bool(_) => Err(PrimitiveError::Runtime("expected an integer".to_string())),
    }
}

fn grammar() -> Grammar {
    Grammar::new(
        tp!(N),
        vec![
            Rule::builtin("x", tp!(N), 1.0, BuiltinOp::X),
            Rule::new("0", tp!(N), 1.0),
            Rule::new("1", tp!(N), 1.0),
            Rule::new("plus", tp!(@arrow[tp!(N), tp!(N), tp!(N)]), 1.0),
            Rule::new("double", tp!(@arrow[tp!(N), tp!(N)]), 1.0),
            Rule::new("dec", tp!(@arrow[tp!(N), tp!(N)]), 1.0),
            Rule::builtin("if", tp!(@arrow[tp!(B), tp!(N), tp!(N), tp!(N)]), 1.0, BuiltinOp::If),
            Rule::builtin("recurse", tp!(@arrow[tp!(N), tp!(N)]), 1.0, BuiltinOp::Recurse),
            Rule::builtin(
                "memrecurse",
                tp!(@arrow[tp!(N), tp!(N)]),
                1.0,
                BuiltinOp::MemRecurse,
            ),
            Rule::builtin(
                "saferecurse",
                tp!(@arrow[tp!(N), tp!(N)]),
                1.0,
                BuiltinOp::SafeRecurse,
            ),
            Rule::new("zero?", tp!(@arrow[tp!(N), tp!(B)]), 1.0),
            Rule::builtin("flip", tp!(B), 1.0, BuiltinOp::Flip),
            Rule::builtin("and", tp!(@arrow[tp!(B), tp!(B), tp!(B)]), 1.0, BuiltinOp::And),
        ],
    )
}

fn primitives() -> Vec<(&'static str, Primitive<V>)> {
    vec![
        ("0", Primitive::new(0, |_: &[V]| Ok(V::Int(0)))),
        ("1", Primitive::new(0, |_: &[V]| Ok(V::Int(1)))),
        (
            "plus",
            Primitive::new(2, |args: &[V]| Ok(V::Int(int(&args[0])? + int(&args[1])?))),
        ),
        (
            "double",
            Primitive::new(1, |args: &[V]| {
                let n = int(&args[0])? * 2;
                if n.abs() > 1_000_000 {
                    Err(PrimitiveError::Size)
                } else {
                    Ok(V::Int(n))
                }
            }),
        ),
        (
            "dec",
            Primitive::new(1, |args: &[V]| Ok(V::Int(int(&args[0])? - 1))),
        ),
        (
            "zero?",
            Primitive::new(1, |args: &[V]| Ok(V::Bool(int(&args[0])? == 0))),
        ),
    ]
}

fn runtime() -> Runtime<V> {
    Runtime::new(Arc::new(grammar()), primitives()).unwrap()
}

fn run_one(rt: &Runtime<V>, src: &str, x: i64) -> Result<V, Abort> {
    let tree = rt.grammar().parse(src).unwrap();
    let program = rt.compile(&tree).unwrap();
    rt.call_one(&program, &program, V::Int(x))
}

/// `k` fair flips read as the bits of a number.
fn bits(k: usize) -> String {
    if k == 1 {
        "if(flip,1,0)".to_string()
    } else {
        format!("plus(if(flip,1,0),double({}))", bits(k - 1))
    }
}

#[test]
fn vm_flips_split_mass_evenly() {
    let rt = runtime();
    for k in 1..=5 {
        let tree = rt.grammar().parse(&bits(k)).unwrap();
        let program = rt.compile(&tree).unwrap();
        let out = rt.call(&program, &program, V::Int(0));
        assert_eq!(out.len(), 1 << k);
        for (_, lp) in out.iter() {
            assert!((lp - (k as f64) * 0.5f64.ln()).abs() < 1e-9);
        }
        assert!(out.z().abs() < 1e-9);
    }
}

#[test]
fn vm_and_short_circuits() {
    let rt = runtime();
    let g = rt.grammar();
    let b = g.nonterminal(&tp!(B)).unwrap();
    let tree = g.parse_nonterminal("and(flip,flip)", b).unwrap();
    let program = rt.compile(&tree).unwrap();
    let out = rt.call(&program, &program, V::Int(0));
    assert_eq!(out.len(), 2);
    assert!((out.lp(&V::Bool(true)) - 0.25f64.ln()).abs() < 1e-9);
    assert!((out.lp(&V::Bool(false)) - 0.75f64.ln()).abs() < 1e-9);
}

#[test]
fn vm_deterministic_programs_run_without_a_pool() {
    let rt = runtime();
    assert_eq!(run_one(&rt, "plus(x,double(1))", 3), Ok(V::Int(5)));
    assert_eq!(
        run_one(&rt, "if(flip,0,1)", 0),
        Err(Abort::RandomChoiceWithoutPool)
    );
}

#[test]
fn vm_recursion() {
    let rt = runtime();
    let pow2 = "if(zero?(x),1,double(recurse(dec(x))))";
    assert_eq!(run_one(&rt, pow2, 5), Ok(V::Int(32)));
    assert_eq!(run_one(&rt, pow2, 0), Ok(V::Int(1)));
}

#[test]
fn vm_memoized_recursion() {
    let rt = runtime();
    let fib = |call: &str| {
        format!(
            "if(zero?(x),0,if(zero?(dec(x)),1,plus({0}(dec(x)),{0}(dec(dec(x))))))",
            call
        )
    };
    assert_eq!(run_one(&rt, &fib("memrecurse"), 20), Ok(V::Int(6765)));
    assert_eq!(run_one(&rt, &fib("recurse"), 10), Ok(V::Int(55)));
    // without memoization, the calls blow the instruction budget
    assert_eq!(run_one(&rt, &fib("recurse"), 20), Err(Abort::OpLimit));
}

#[test]
fn vm_safe_recursion_stops_at_empty() {
    let rt = runtime();
    assert_eq!(
        run_one(&rt, "plus(1,saferecurse(dec(x)))", 3),
        Ok(V::Int(3))
    );
    assert_eq!(
        run_one(&rt, "plus(1,recurse(dec(x)))", 3),
        Err(Abort::RecursionDepth)
    );
}

#[test]
fn vm_size_aborts() {
    let rt = runtime();
    let mut src = "1".to_string();
    for _ in 0..25 {
        src = format!("double({})", src);
    }
    assert_eq!(run_one(&rt, &src, 0), Err(Abort::Size));
}

#[test]
fn vm_improbable_branches_are_pruned() {
    let rt = runtime().with_control(VmControl {
        min_lp: -10.0,
        ..VmControl::default()
    });
    let tree = rt
        .grammar()
        .parse("if(flip,0,plus(1,recurse(x)))")
        .unwrap();
    let program = rt.compile(&tree).unwrap();
    let out = rt.call(&program, &program, V::Int(0));
    // outcome n needs n + 1 flips, and 2^-15 is below the floor
    assert_eq!(out.len(), 14);
    assert!(out.z() < 0.0);
    assert!((out.z() - (1.0 - 0.5f64.powi(14)).ln()).abs() < 1e-9);
    assert_eq!(out.best().unwrap().0, &V::Int(0));
}

#[test]
fn vm_runtime_checks_primitives() {
    let mut missing = primitives();
    missing.retain(|(name, _)| *name != "dec");
    match Runtime::new(Arc::new(grammar()), missing) {
        Err(GrammarError::MissingPrimitive("dec")) => {}
        other => panic!("expected a missing primitive, got {:?}", other.err()),
    }
    let wrong = primitives().into_iter().map(|(name, p)| {
        if name == "dec" {
            (name, Primitive::new(2, |_: &[V]| Ok(V::Int(0))))
        } else {
            (name, p)
        }
    });
    assert!(matches!(
        Runtime::new(Arc::new(grammar()), wrong),
        Err(GrammarError::ArityMismatch { name: "dec", .. })
    ));
}
