use std::collections::HashMap;

use super::{
    Instruction, PrimitiveError, Program, ProgramLoader, Runtime, Value, VirtualMachinePool,
};
use crate::grammar::BuiltinOp;

/// Why a state stopped without an output. Aborts are local: the branch produces no mass and
/// its siblings carry on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Abort {
    /// A primitive's result would exceed its bound.
    Size,
    RecursionDepth,
    /// The state executed more instructions than allowed.
    OpLimit,
    /// A random choice was made without a pool to hold the other branch.
    RandomChoiceWithoutPool,
    Error(String),
}
impl From<PrimitiveError> for Abort {
    fn from(err: PrimitiveError) -> Self {
        match err {
            PrimitiveError::Size => Abort::Size,
            PrimitiveError::Runtime(msg) => Abort::Error(msg),
        }
    }
}

/// What running a state came to.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<V> {
    Complete(V),
    /// The state made a random choice and is no longer the most probable branch; it belongs back
    /// in the pool.
    Suspended,
    Aborted(Abort),
}

enum Flow {
    Continue,
    Suspend,
}

/// A single thread of execution of a [`Program`].
///
/// Instructions wait on a stack with the next one on top, so control flow is truncation and
/// calls are splices. Values live on one stack per nonterminal. Recursion is data here: a call
/// pushes its argument and the callee's instructions, so deep recursion never deepens the
/// native stack.
///
/// [`Program`]: struct.Program.html
#[derive(Debug, Clone)]
pub struct VirtualMachineState<V> {
    opstack: Vec<Instruction>,
    stacks: Vec<Vec<V>>,
    xstack: Vec<V>,
    memstack: Vec<(i64, V)>,
    mem: HashMap<(i64, V), V>,
    depth: usize,
    ops: usize,
    output: usize,
    /// The log-probability of the random choices made so far.
    pub lp: f64,
}
impl<V: Value> VirtualMachineState<V> {
    pub fn new(program: &Program, x: V, nonterminals: usize) -> Self {
        VirtualMachineState {
            opstack: program.instructions().iter().rev().copied().collect(),
            stacks: vec![Vec::new(); nonterminals],
            xstack: vec![x],
            memstack: Vec::new(),
            mem: HashMap::new(),
            depth: 0,
            ops: 0,
            output: program.output(),
            lp: 0f64,
        }
    }
    pub fn recursion_depth(&self) -> usize {
        self.depth
    }
    /// Execute until the program finishes, aborts, or suspends at a random choice.
    ///
    /// Without a pool, a random choice aborts.
    pub fn run(
        &mut self,
        runtime: &Runtime<V>,
        loader: &dyn ProgramLoader,
        mut pool: Option<&mut VirtualMachinePool<V>>,
    ) -> Outcome<V> {
        while let Some(instruction) = self.opstack.pop() {
            match self.execute(instruction, runtime, loader, pool.as_deref_mut()) {
                Ok(Flow::Continue) => {}
                Ok(Flow::Suspend) => return Outcome::Suspended,
                Err(abort) => return Outcome::Aborted(abort),
            }
        }
        match self.stacks[self.output].pop() {
            Some(v) => Outcome::Complete(v),
            None => Outcome::Aborted(Abort::Error("program left no output".to_string())),
        }
    }

    fn execute(
        &mut self,
        instruction: Instruction,
        runtime: &Runtime<V>,
        loader: &dyn ProgramLoader,
        pool: Option<&mut VirtualMachinePool<V>>,
    ) -> Result<Flow, Abort> {
        self.ops += 1;
        if self.ops > runtime.control().max_ops {
            return Err(Abort::OpLimit);
        }
        match instruction {
            Instruction::Primitive { rule } => {
                let r = runtime.grammar().rule_by_id(rule);
                let primitive = runtime
                    .primitive(rule)
                    .ok_or_else(|| Abort::Error(format!("no implementation for {}", r.name)))?;
                let args = self.pop_args(r.children())?;
                let value = primitive.call(&args)?;
                self.stacks[r.nonterminal()].push(value);
            }
            Instruction::Jump(n) => self.skip(n),
            Instruction::PopX => {
                self.xstack.pop();
                self.depth = self.depth.saturating_sub(1);
            }
            Instruction::Memoize { nt } => {
                if let (Some(key), Some(v)) = (self.memstack.pop(), self.stacks[nt].last()) {
                    self.mem.entry(key).or_insert_with(|| v.clone());
                }
            }
            Instruction::Builtin { op, rule, arg } => {
                let r = runtime.grammar().rule_by_id(rule);
                let out = r.nonterminal();
                let children = r.children();
                match op {
                    BuiltinOp::If => {
                        if !self.pop_bool(children[0])? {
                            self.skip(arg as usize)
                        }
                    }
                    BuiltinOp::And => {
                        if !self.pop_bool(children[0])? {
                            self.skip(arg as usize);
                            self.stacks[out].push(V::from_bool(false));
                        }
                    }
                    BuiltinOp::Or => {
                        if self.pop_bool(children[0])? {
                            self.skip(arg as usize);
                            self.stacks[out].push(V::from_bool(true));
                        }
                    }
                    BuiltinOp::Not => {
                        let b = self.pop_bool(children[0])?;
                        self.stacks[out].push(V::from_bool(!b));
                    }
                    BuiltinOp::X => {
                        let x = self
                            .xstack
                            .last()
                            .cloned()
                            .ok_or_else(|| Abort::Error("no argument".to_string()))?;
                        self.stacks[out].push(x);
                    }
                    BuiltinOp::Flip => return self.flip(0.5, out, runtime, pool),
                    BuiltinOp::FlipP => {
                        let v = self.pop(children[0])?;
                        let p = v
                            .to_probability()
                            .ok_or_else(|| Abort::Error("flip weight is not a probability".to_string()))?;
                        let p = if p.is_nan() { 0f64 } else { p };
                        if !(0f64..=1f64).contains(&p) {
                            return Err(Abort::Error(format!("flip weight {} out of range", p)));
                        }
                        return self.flip(p, out, runtime, pool);
                    }
                    BuiltinOp::Recurse
                    | BuiltinOp::MemRecurse
                    | BuiltinOp::SafeRecurse
                    | BuiltinOp::SafeMemRecurse => {
                        self.recurse(op, children[0], out, arg, runtime, loader)?
                    }
                }
            }
        }
        Ok(Flow::Continue)
    }

    /// Take the more probable branch here and hand the other to the pool.
    fn flip(
        &mut self,
        p: f64,
        out: usize,
        runtime: &Runtime<V>,
        pool: Option<&mut VirtualMachinePool<V>>,
    ) -> Result<Flow, Abort> {
        let pool = pool.ok_or(Abort::RandomChoiceWithoutPool)?;
        let taken = p >= 0.5;
        let (p_taken, p_other) = if taken { (p, 1f64 - p) } else { (1f64 - p, p) };
        let mut other = self.clone();
        other.lp += p_other.ln();
        other.stacks[out].push(V::from_bool(!taken));
        pool.push(other);
        self.lp += p_taken.ln();
        self.stacks[out].push(V::from_bool(taken));
        if self.lp < runtime.control().min_lp || pool.best_lp().map_or(false, |lp| lp > self.lp) {
            Ok(Flow::Suspend)
        } else {
            Ok(Flow::Continue)
        }
    }

    fn recurse(
        &mut self,
        op: BuiltinOp,
        child: usize,
        out: usize,
        slot: i64,
        runtime: &Runtime<V>,
        loader: &dyn ProgramLoader,
    ) -> Result<(), Abort> {
        let x = self.pop(child)?;
        let safe = matches!(op, BuiltinOp::SafeRecurse | BuiltinOp::SafeMemRecurse);
        if safe && x.is_empty() {
            if let Some(empty) = V::empty() {
                self.stacks[out].push(empty);
                return Ok(());
            }
        }
        let memoized = matches!(op, BuiltinOp::MemRecurse | BuiltinOp::SafeMemRecurse);
        if memoized {
            if let Some(v) = self.mem.get(&(slot, x.clone())) {
                self.stacks[out].push(v.clone());
                return Ok(());
            }
        }
        if self.depth >= runtime.control().max_recursion {
            return Err(Abort::RecursionDepth);
        }
        let program = loader
            .program(slot)
            .ok_or_else(|| Abort::Error(format!("no program in slot {}", slot)))?;
        if program.output() != out {
            return Err(Abort::Error(format!(
                "program in slot {} does not return the caller's nonterminal",
                slot
            )));
        }
        self.depth += 1;
        if memoized {
            self.memstack.push((slot, x.clone()));
            self.opstack.push(Instruction::Memoize { nt: out });
        }
        self.opstack.push(Instruction::PopX);
        self.xstack.push(x);
        self.opstack
            .extend(program.instructions().iter().rev().copied());
        Ok(())
    }

    fn skip(&mut self, n: usize) {
        let len = self.opstack.len();
        self.opstack.truncate(len.saturating_sub(n))
    }

    fn pop(&mut self, nt: usize) -> Result<V, Abort> {
        self.stacks[nt]
            .pop()
            .ok_or_else(|| Abort::Error("stack underflow".to_string()))
    }

    fn pop_bool(&mut self, nt: usize) -> Result<bool, Abort> {
        self.pop(nt)?
            .to_bool()
            .ok_or_else(|| Abort::Error("condition is not a boolean".to_string()))
    }

    /// Arguments in child order; the last child's value is on top.
    fn pop_args(&mut self, children: &[usize]) -> Result<Vec<V>, Abort> {
        let mut args = Vec::with_capacity(children.len());
        for &nt in children.iter().rev() {
            args.push(self.pop(nt)?)
        }
        args.reverse();
        Ok(args)
    }
}
