//! (execution) A nondeterministic stack machine for program trees.
//!
//! A tree is compiled by [`Program::compile`] into postfix [`Instruction`]s. A
//! [`VirtualMachineState`] runs a program with one value stack per nonterminal. Random choices
//! (`flip`) split a state in two, and a [`VirtualMachinePool`] explores the resulting branches
//! best-first, collecting a [`DiscreteDistribution`] over outputs.
//!
//! Primitive operations are supplied to a [`Runtime`] by rule name, and the runtime checks them
//! against the grammar once, up front.
//!
//! # Examples
//!
//! ```
//! use lotinduction::grammar::{BuiltinOp, Grammar, Rule};
//! use lotinduction::vm::{Primitive, PrimitiveError, Runtime, Value};
//! use polytype::tp;
//! use std::sync::Arc;
//!
//! #[derive(Debug, Clone, PartialEq, Eq, Hash)]
//! enum V {
//!     Str(String),
//!     Bool(bool),
//! }
//! impl Value for V {
//!     fn from_bool(b: bool) -> Self {
//!         V::Bool(b)
//!     }
//!     fn to_bool(&self) -> Option<bool> {
//!         match *self {
//!             V::Bool(b) => Some(b),
//!             _ => None,
//!         }
//!     }
//! }
//! fn string(v: &V) -> Result<&str, PrimitiveError> {
//!     match v {
//!         V::Str(s) => Ok(s),
//!         _ => Err(PrimitiveError::Runtime("expected a string".to_string())),
//!     }
//! }
//!
//! let g = Arc::new(Grammar::new(
//!     tp!(S),
//!     vec![
//!         Rule::new("'a'", tp!(S), 1.0),
//!         Rule::new("'b'", tp!(S), 1.0),
//!         Rule::new("cat", tp!(@arrow[tp!(S), tp!(S), tp!(S)]), 1.0),
//!         Rule::builtin("if", tp!(@arrow[tp!(B), tp!(S), tp!(S), tp!(S)]), 1.0, BuiltinOp::If),
//!         Rule::builtin("flip", tp!(B), 1.0, BuiltinOp::Flip),
//!     ],
//! ));
//! let runtime = Runtime::new(
//!     g.clone(),
//!     vec![
//!         ("'a'", Primitive::new(0, |_: &[V]| Ok(V::Str("a".to_string())))),
//!         ("'b'", Primitive::new(0, |_: &[V]| Ok(V::Str("b".to_string())))),
//!         ("cat", Primitive::new(2, |args: &[V]| {
//!             Ok(V::Str(format!("{}{}", string(&args[0])?, string(&args[1])?)))
//!         })),
//!     ],
//! )
//! .unwrap();
//!
//! let tree = g.parse("cat('a', if(flip, 'a', 'b'))").unwrap();
//! let program = runtime.compile(&tree).unwrap();
//! let outputs = runtime.call(&program, &program, V::Str(String::new()));
//! assert_eq!(outputs.len(), 2);
//! assert!((outputs.lp(&V::Str("ab".to_string())) - (0.5f64).ln()).abs() < 1e-12);
//! ```
//!
//! [`Program::compile`]: struct.Program.html#method.compile
//! [`Instruction`]: enum.Instruction.html
//! [`VirtualMachineState`]: struct.VirtualMachineState.html
//! [`VirtualMachinePool`]: struct.VirtualMachinePool.html
//! [`DiscreteDistribution`]: ../struct.DiscreteDistribution.html
//! [`Runtime`]: struct.Runtime.html

mod pool;
mod state;
pub use self::pool::VirtualMachinePool;
pub use self::state::{Abort, Outcome, VirtualMachineState};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use std::{error, fmt};

use crate::grammar::{BuiltinOp, Grammar, GrammarError, Node, Op};
use crate::DiscreteDistribution;

/// The values a program computes with. One type covers every nonterminal, usually an enum.
pub trait Value: Clone + Debug + Eq + Hash + Send + Sync {
    fn from_bool(b: bool) -> Self;
    /// The boolean this value holds, if any. Conditions of `if`, `and`, `or`, and `not` must
    /// hold booleans.
    fn to_bool(&self) -> Option<bool>;
    /// The probability this value holds, if any; read by weighted flips.
    fn to_probability(&self) -> Option<f64> {
        None
    }
    /// Whether safe recursion should stop at this argument.
    fn is_empty(&self) -> bool {
        false
    }
    /// What safe recursion returns on an empty argument. Without one, safe recursion recurses.
    fn empty() -> Option<Self> {
        None
    }
}
impl Value for bool {
    fn from_bool(b: bool) -> Self {
        b
    }
    fn to_bool(&self) -> Option<bool> {
        Some(*self)
    }
}

/// Why a primitive could not produce a value. Either aborts only the branch that called it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrimitiveError {
    /// The result would exceed a declared bound.
    Size,
    Runtime(String),
}
impl fmt::Display for PrimitiveError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            PrimitiveError::Size => write!(f, "result exceeds its size bound"),
            PrimitiveError::Runtime(ref msg) => write!(f, "primitive failed: {}", msg),
        }
    }
}
impl error::Error for PrimitiveError {}

type PrimitiveFn<V> = dyn Fn(&[V]) -> Result<V, PrimitiveError> + Send + Sync;

/// The native implementation of a primitive rule.
pub struct Primitive<V> {
    arity: usize,
    f: Box<PrimitiveFn<V>>,
}
impl<V> Primitive<V> {
    /// `f` receives exactly `arity` arguments, in the order of the rule's children.
    pub fn new<F>(arity: usize, f: F) -> Self
    where
        F: Fn(&[V]) -> Result<V, PrimitiveError> + Send + Sync + 'static,
    {
        Primitive {
            arity,
            f: Box::new(f),
        }
    }
    pub fn arity(&self) -> usize {
        self.arity
    }
    pub fn call(&self, args: &[V]) -> Result<V, PrimitiveError> {
        (self.f)(args)
    }
}
impl<V> fmt::Debug for Primitive<V> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Primitive")
            .field("arity", &self.arity)
            .finish()
    }
}

/// Budgets for evaluating a program.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmControl {
    /// How many times a [`VirtualMachinePool`] may resume a state.
    ///
    /// [`VirtualMachinePool`]: struct.VirtualMachinePool.html
    pub max_steps: usize,
    /// How many distinct outputs a pool collects before stopping.
    pub max_outputs: usize,
    /// Branches less probable than this are dropped without being run.
    pub min_lp: f64,
    pub max_recursion: usize,
    /// How many instructions one state may execute.
    pub max_ops: usize,
}
impl Default for VmControl {
    /// ```
    /// # use lotinduction::vm::VmControl;
    /// VmControl {
    ///     max_steps: 2048,
    ///     max_outputs: 256,
    ///     min_lp: -10.0,
    ///     max_recursion: 64,
    ///     max_ops: 10000,
    /// }
    /// # ;
    /// ```
    fn default() -> Self {
        VmControl {
            max_steps: 2048,
            max_outputs: 256,
            min_lp: -10.0,
            max_recursion: 64,
            max_ops: 10000,
        }
    }
}

/// One step of a compiled program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Instruction {
    /// Apply the primitive for a rule, identified by its flat id.
    Primitive { rule: usize },
    /// Run a builtin for a rule. For `if`, `and`, and `or`, `arg` counts the instructions to
    /// skip; for recursion it selects the program to call.
    Builtin { op: BuiltinOp, rule: usize, arg: i64 },
    /// Skip the next instructions.
    Jump(usize),
    /// Return from a recursive call.
    PopX,
    /// Record the result of a memoized call, found on the nonterminal's stack.
    Memoize { nt: usize },
}

/// A tree that could not be compiled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    Incomplete,
    /// A node's children do not match its rule.
    TypeMismatch(&'static str),
}
impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            CompileError::Incomplete => write!(f, "cannot compile a tree with null nodes"),
            CompileError::TypeMismatch(name) => {
                write!(f, "children of {} do not match its rule", name)
            }
        }
    }
}
impl error::Error for CompileError {}

/// A linearized tree: instructions in execution order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    instructions: Vec<Instruction>,
    output: usize,
}
impl Program {
    /// Compile a complete tree. Children are compiled before their parent, except that `if`,
    /// `and`, and `or` skip over branches they do not take.
    ///
    /// `if(c, a, b)` becomes `c If(|a|+1) a Jump(|b|) b`.
    pub fn compile(grammar: &Grammar, node: &Node) -> Result<Self, CompileError> {
        let mut instructions = Vec::new();
        linearize(grammar, node, &mut instructions)?;
        Ok(Program {
            instructions,
            output: node.nt,
        })
    }
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }
    /// The nonterminal whose stack holds the result.
    pub fn output(&self) -> usize {
        self.output
    }
    pub fn len(&self) -> usize {
        self.instructions.len()
    }
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}

fn linearize(g: &Grammar, node: &Node, out: &mut Vec<Instruction>) -> Result<(), CompileError> {
    let idx = node.rule.ok_or(CompileError::Incomplete)?;
    let rule = g.rule(node.nt, idx);
    if rule.children().len() != node.children.len()
        || rule
            .children()
            .iter()
            .zip(&node.children)
            .any(|(&nt, child)| child.nt != nt)
    {
        return Err(CompileError::TypeMismatch(rule.name));
    }
    let id = g.rule_id(node.nt, idx);
    match rule.op {
        Op::Primitive => {
            for child in &node.children {
                linearize(g, child, out)?
            }
            out.push(Instruction::Primitive { rule: id })
        }
        Op::Builtin(BuiltinOp::If) => {
            linearize(g, &node.children[0], out)?;
            let at = out.len();
            out.push(Instruction::Jump(0));
            linearize(g, &node.children[1], out)?;
            let jump_at = out.len();
            out.push(Instruction::Jump(0));
            linearize(g, &node.children[2], out)?;
            out[at] = Instruction::Builtin {
                op: BuiltinOp::If,
                rule: id,
                arg: (jump_at - at) as i64,
            };
            out[jump_at] = Instruction::Jump(out.len() - jump_at - 1);
        }
        Op::Builtin(op @ BuiltinOp::And) | Op::Builtin(op @ BuiltinOp::Or) => {
            linearize(g, &node.children[0], out)?;
            let at = out.len();
            out.push(Instruction::Jump(0));
            linearize(g, &node.children[1], out)?;
            out[at] = Instruction::Builtin {
                op,
                rule: id,
                arg: (out.len() - at - 1) as i64,
            };
        }
        Op::Builtin(op) => {
            for child in &node.children {
                linearize(g, child, out)?
            }
            out.push(Instruction::Builtin {
                op,
                rule: id,
                arg: rule.arg,
            })
        }
    }
    Ok(())
}

/// Where recursive calls find the program they call.
pub trait ProgramLoader {
    fn program(&self, slot: i64) -> Option<&Program>;
}
/// A lone program calls itself, whatever the slot.
impl ProgramLoader for Program {
    fn program(&self, _slot: i64) -> Option<&Program> {
        Some(self)
    }
}
/// A lexicon of programs, called by index.
impl ProgramLoader for Vec<Program> {
    fn program(&self, slot: i64) -> Option<&Program> {
        usize::try_from(slot).ok().and_then(|i| self.get(i))
    }
}

/// A grammar together with implementations of its primitives and evaluation budgets.
///
/// Construction fails if a primitive rule has no implementation, an implementation's arity
/// disagrees with its rule, or a builtin rule has the wrong shape.
#[derive(Debug)]
pub struct Runtime<V> {
    grammar: Arc<Grammar>,
    implementations: Vec<Primitive<V>>,
    by_rule: Vec<Option<usize>>,
    control: VmControl,
}
impl<V: Value> Runtime<V> {
    pub fn new<I>(grammar: Arc<Grammar>, primitives: I) -> Result<Self, GrammarError>
    where
        I: IntoIterator<Item = (&'static str, Primitive<V>)>,
    {
        grammar.check()?;
        let mut names = HashMap::new();
        let mut implementations = Vec::new();
        for (name, primitive) in primitives {
            names.insert(name, implementations.len());
            implementations.push(primitive);
        }
        let mut used = vec![false; implementations.len()];
        let mut by_rule = vec![None; grammar.count_rules()];
        for nt in 0..grammar.count_nonterminals() {
            for (idx, rule) in grammar.rules(nt).iter().enumerate() {
                let found = rule.children().len();
                match rule.op {
                    Op::Primitive => {
                        let &i = names
                            .get(rule.name)
                            .ok_or(GrammarError::MissingPrimitive(rule.name))?;
                        let expected = implementations[i].arity();
                        if expected != found {
                            return Err(GrammarError::ArityMismatch {
                                name: rule.name,
                                expected,
                                found,
                            });
                        }
                        used[i] = true;
                        by_rule[grammar.rule_id(nt, idx)] = Some(i);
                    }
                    Op::Builtin(op) => {
                        if op.arity() != found {
                            return Err(GrammarError::ArityMismatch {
                                name: rule.name,
                                expected: op.arity(),
                                found,
                            });
                        }
                        check_builtin_shape(rule.name, op, nt, rule.children())?;
                    }
                }
            }
        }
        for (name, &i) in &names {
            if !used[i] {
                log::warn!("primitive {} is not used by any rule", name)
            }
        }
        Ok(Runtime {
            grammar,
            implementations,
            by_rule,
            control: VmControl::default(),
        })
    }
    pub fn with_control(self, control: VmControl) -> Self {
        Runtime { control, ..self }
    }
    pub fn grammar(&self) -> &Grammar {
        &self.grammar
    }
    pub fn shared_grammar(&self) -> &Arc<Grammar> {
        &self.grammar
    }
    pub fn control(&self) -> &VmControl {
        &self.control
    }
    pub(crate) fn primitive(&self, rule: usize) -> Option<&Primitive<V>> {
        self.by_rule[rule].map(|i| &self.implementations[i])
    }
    pub fn compile(&self, node: &Node) -> Result<Program, CompileError> {
        Program::compile(&self.grammar, node)
    }
    /// The distribution over outputs of running `program` on `x`, marginalizing random choices
    /// within this runtime's budgets.
    pub fn call(
        &self,
        program: &Program,
        loader: &dyn ProgramLoader,
        x: V,
    ) -> DiscreteDistribution<V> {
        let mut pool = VirtualMachinePool::new(self.control);
        pool.push(VirtualMachineState::new(
            program,
            x,
            self.grammar.count_nonterminals(),
        ));
        pool.run(self, loader)
    }
    /// Run a program without a pool. Random choices abort with
    /// [`Abort::RandomChoiceWithoutPool`].
    ///
    /// [`Abort::RandomChoiceWithoutPool`]: enum.Abort.html#variant.RandomChoiceWithoutPool
    pub fn call_one(&self, program: &Program, loader: &dyn ProgramLoader, x: V) -> Result<V, Abort> {
        let mut state = VirtualMachineState::new(program, x, self.grammar.count_nonterminals());
        match state.run(self, loader, None) {
            Outcome::Complete(v) => Ok(v),
            Outcome::Aborted(abort) => Err(abort),
            Outcome::Suspended => Err(Abort::RandomChoiceWithoutPool),
        }
    }
}

fn check_builtin_shape(
    name: &'static str,
    op: BuiltinOp,
    nt: usize,
    children: &[usize],
) -> Result<(), GrammarError> {
    let bad = |why: &str| Err(GrammarError::BadBuiltin(name, why.to_string()));
    match op {
        BuiltinOp::If if children[1] != nt || children[2] != nt => {
            bad("both branches must have the rule's nonterminal")
        }
        BuiltinOp::And | BuiltinOp::Or if children.iter().any(|&c| c != nt) => {
            bad("arguments must have the rule's nonterminal")
        }
        BuiltinOp::Not if children[0] != nt => bad("argument must have the rule's nonterminal"),
        _ => Ok(()),
    }
}
