//! Straight-line code generation for transition vectors
//!
//! The interpreted driver re-walks polynomial DAGs every step. For long
//! streams the transitions are lowered once into flat three-address programs
//! (`Add`/`Mul`/`Neg` over a slot file) and replayed by a tight loop; shared
//! subtrees are emitted exactly once, so the program is the DAG in execution
//! order. The code-generator backend is deliberately simple — the contract
//! is the lifecycle and the semantics, not the lowering strategy:
//!
//! - a [`Module`] collects named programs
//!   (`Automaton::compile` registers `<name>_ot` and `<name>_st`);
//! - [`Module::finish`] seals it into an [`Engine`];
//! - `Automaton::wrap_compiled` binds a [`CompiledAutomaton`] that
//!   **borrows** the engine — the borrow checker keeps the engine live for
//!   the duration of every pull sequence, on all exit paths;
//! - compiled evaluation is observably identical to the interpreted driver
//!   on scalar streams, and operates on scalar histories only.
//!
//! Programs can only bind input and state variables. Polynomials that still
//! reference auxiliary variables are rejected at registration with
//! [`CompileError::StillSymbolic`].

#![forbid(unsafe_code)]
#![allow(missing_docs)]

use std::collections::{BTreeMap, HashMap, VecDeque};
use tracing::debug;

use crate::poly::{Expr, PolyVec};
use crate::ring::Ring;
use crate::symbol::Var;
use std::sync::Arc;

/// Errors surfaced by compilation and program lookup.
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("cannot compile a polynomial that still references {var}")]
    StillSymbolic { var: Var },
    #[error("no compiled program named {0:?} in this engine")]
    UnknownProgram(String),
    #[error("a program named {0:?} is already registered")]
    DuplicateProgram(String),
}

/// One three-address instruction over the slot file.
#[derive(Copy, Clone, Debug)]
enum Inst {
    Add { dst: usize, a: usize, b: usize },
    Mul { dst: usize, a: usize, b: usize },
    Neg { dst: usize, a: usize },
}

/// A lowered polynomial vector: variable bindings, constant pool, code and
/// output slots. Slot layout is `[variables | constants | temporaries]`.
#[derive(Clone, Debug)]
pub struct Program<R: Ring> {
    vars: Vec<Var>,
    consts: Vec<R>,
    code: Vec<Inst>,
    outputs: Vec<usize>,
    slots: usize,
}

impl<R: Ring> Program<R> {
    /// Number of instructions.
    pub fn len(&self) -> usize {
        self.code.len()
    }

    /// True for a constant-only program.
    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// Execute with a fresh slot file; `bind` supplies variable values.
    pub fn eval_with(&self, bind: impl FnMut(Var) -> R) -> Vec<R> {
        let mut slots = Vec::with_capacity(self.slots);
        self.eval_into(&mut slots, bind)
    }

    fn eval_into(&self, slots: &mut Vec<R>, mut bind: impl FnMut(Var) -> R) -> Vec<R> {
        slots.clear();
        slots.reserve(self.slots);
        for v in &self.vars {
            slots.push(bind(*v));
        }
        slots.extend(self.consts.iter().cloned());
        slots.resize(self.slots, R::zero());
        for inst in &self.code {
            match *inst {
                Inst::Add { dst, a, b } => {
                    let v = slots[a].add(&slots[b]);
                    slots[dst] = v;
                }
                Inst::Mul { dst, a, b } => {
                    let v = slots[a].mul(&slots[b]);
                    slots[dst] = v;
                }
                Inst::Neg { dst, a } => {
                    let v = slots[a].neg();
                    slots[dst] = v;
                }
            }
        }
        self.outputs.iter().map(|&s| slots[s].clone()).collect()
    }
}

// ---------------------------------------------------------------------------
// Lowering
// ---------------------------------------------------------------------------

/// Abstract slot reference used during lowering, resolved to a flat index
/// once the variable and constant pools are complete.
#[derive(Copy, Clone)]
enum SlotRef {
    Var(usize),
    Const(usize),
    Temp(usize),
}

struct Lowering<R: Ring> {
    vars: Vec<Var>,
    var_index: HashMap<Var, usize>,
    consts: Vec<R>,
    code: Vec<(u8, usize, SlotRef, SlotRef)>, // (op, dst temp, a, b) — b ignored for neg
}

impl<R: Ring> Lowering<R> {
    const OP_ADD: u8 = 0;
    const OP_MUL: u8 = 1;
    const OP_NEG: u8 = 2;

    fn new() -> Self {
        Lowering {
            vars: Vec::new(),
            var_index: HashMap::new(),
            consts: Vec::new(),
            code: Vec::new(),
        }
    }

    fn var_slot(&mut self, v: Var) -> Result<SlotRef, CompileError> {
        if v.is_aux() {
            return Err(CompileError::StillSymbolic { var: v });
        }
        let idx = *self.var_index.entry(v).or_insert_with(|| {
            self.vars.push(v);
            self.vars.len() - 1
        });
        Ok(SlotRef::Var(idx))
    }

    fn const_slot(&mut self, c: &R) -> SlotRef {
        // The pool stays small (ring constants), so a linear scan suffices
        // and avoids demanding Hash/Ord from the ring.
        if let Some(idx) = self.consts.iter().position(|k| k == c) {
            return SlotRef::Const(idx);
        }
        self.consts.push(c.clone());
        SlotRef::Const(self.consts.len() - 1)
    }

    fn lower_node(
        &mut self,
        node: &Arc<Expr<R>>,
        cache: &mut HashMap<*const Expr<R>, SlotRef>,
    ) -> Result<SlotRef, CompileError> {
        let key = Arc::as_ptr(node);
        if let Some(&slot) = cache.get(&key) {
            return Ok(slot);
        }
        let slot = match &**node {
            Expr::Const(c) => self.const_slot(c),
            Expr::Var(v) => self.var_slot(*v)?,
            Expr::Add(a, b) => {
                let sa = self.lower_node(a, cache)?;
                let sb = self.lower_node(b, cache)?;
                let dst = self.code.len();
                self.code.push((Self::OP_ADD, dst, sa, sb));
                SlotRef::Temp(dst)
            }
            Expr::Mul(a, b) => {
                let sa = self.lower_node(a, cache)?;
                let sb = self.lower_node(b, cache)?;
                let dst = self.code.len();
                self.code.push((Self::OP_MUL, dst, sa, sb));
                SlotRef::Temp(dst)
            }
            Expr::Neg(a) => {
                let sa = self.lower_node(a, cache)?;
                let dst = self.code.len();
                self.code.push((Self::OP_NEG, dst, sa, sa));
                SlotRef::Temp(dst)
            }
        };
        cache.insert(key, slot);
        Ok(slot)
    }

    fn finish(self, output_refs: Vec<SlotRef>) -> Program<R> {
        let var_base = 0usize;
        let const_base = self.vars.len();
        let temp_base = const_base + self.consts.len();
        let resolve = |s: SlotRef| -> usize {
            match s {
                SlotRef::Var(i) => var_base + i,
                SlotRef::Const(i) => const_base + i,
                SlotRef::Temp(i) => temp_base + i,
            }
        };
        let code = self
            .code
            .iter()
            .map(|&(op, dst, a, b)| match op {
                Self::OP_ADD => Inst::Add { dst: temp_base + dst, a: resolve(a), b: resolve(b) },
                Self::OP_MUL => Inst::Mul { dst: temp_base + dst, a: resolve(a), b: resolve(b) },
                _ => Inst::Neg { dst: temp_base + dst, a: resolve(a) },
            })
            .collect();
        Program {
            slots: temp_base + self.code.len(),
            vars: self.vars,
            consts: self.consts,
            code,
            outputs: output_refs.into_iter().map(resolve).collect(),
        }
    }
}

fn lower<R: Ring>(vec: &PolyVec<R>) -> Result<Program<R>, CompileError> {
    let mut lowering = Lowering::new();
    let mut cache = HashMap::new();
    let mut outputs = Vec::with_capacity(vec.dimension());
    for p in vec.iter() {
        outputs.push(lowering.lower_node(p.root(), &mut cache)?);
    }
    Ok(lowering.finish(outputs))
}

// ---------------------------------------------------------------------------
// Module / Engine lifecycle
// ---------------------------------------------------------------------------

/// A collection of named programs under construction.
pub struct Module<R: Ring> {
    programs: BTreeMap<String, Program<R>>,
}

impl<R: Ring> Module<R> {
    /// Empty module.
    pub fn new() -> Self {
        Module { programs: BTreeMap::new() }
    }

    /// Lower a polynomial vector and register it under `name`.
    pub fn register(&mut self, name: String, vec: &PolyVec<R>) -> Result<(), CompileError> {
        if self.programs.contains_key(&name) {
            return Err(CompileError::DuplicateProgram(name));
        }
        let program = lower(vec)?;
        debug!(
            name = %name,
            instructions = program.len(),
            lanes = vec.dimension(),
            "lowered transition vector"
        );
        self.programs.insert(name, program);
        Ok(())
    }

    /// Seal the module. No further registration; programs become executable.
    pub fn finish(self) -> Engine<R> {
        Engine { programs: self.programs }
    }
}

impl<R: Ring> Default for Module<R> {
    fn default() -> Self {
        Self::new()
    }
}

/// A sealed set of compiled programs. Drivers borrow it, so it outlives
/// every pull sequence bound to it.
pub struct Engine<R: Ring> {
    programs: BTreeMap<String, Program<R>>,
}

impl<R: Ring> Engine<R> {
    /// Look up a program by name.
    pub fn program(&self, name: &str) -> Option<&Program<R>> {
        self.programs.get(name)
    }
}

// ---------------------------------------------------------------------------
// Compiled evaluation driver
// ---------------------------------------------------------------------------

/// A compiled automaton: the two lowered transitions plus the memory shape.
/// Created by `Automaton::wrap_compiled`.
pub struct CompiledAutomaton<'e, R: Ring> {
    output: &'e Program<R>,
    state: &'e Program<R>,
    memory_length: usize,
    memory_width: usize,
}

impl<'e, R: Ring> CompiledAutomaton<'e, R> {
    pub(crate) fn bind(
        engine: &'e Engine<R>,
        name: &str,
        memory_length: usize,
        memory_width: usize,
    ) -> Result<Self, CompileError> {
        let ot = format!("{name}_ot");
        let st = format!("{name}_st");
        let output = engine.program(&ot).ok_or(CompileError::UnknownProgram(ot))?;
        let state = engine.program(&st).ok_or(CompileError::UnknownProgram(st))?;
        Ok(CompiledAutomaton { output, state, memory_length, memory_width })
    }

    /// Lazily evaluate a scalar input stream from the zero history. Inputs
    /// must be at least as wide as the compiled transitions expect.
    pub fn run<I>(&self, inputs: I) -> CompiledRun<'_, 'e, R, I::IntoIter>
    where
        I: IntoIterator<Item = Vec<R>>,
    {
        let history =
            VecDeque::from(vec![vec![R::zero(); self.memory_width]; self.memory_length]);
        CompiledRun {
            automaton: self,
            inputs: inputs.into_iter(),
            history,
            scratch: Vec::new(),
        }
    }
}

fn lookup<R: Ring>(v: Var, input: &[R], history: &VecDeque<Vec<R>>) -> R {
    match v {
        Var::In { lane } => input
            .get(lane)
            .cloned()
            .expect("input vector narrower than the compiled transition"),
        Var::St { age, lane } => history
            .get(age - 1)
            .and_then(|row| row.get(lane))
            .cloned()
            .expect("history narrower than the compiled transition"),
        Var::Aux { .. } => unreachable!("auxiliary variables are rejected at registration"),
    }
}

/// Pull-based driver over compiled programs; owns its scalar history.
pub struct CompiledRun<'c, 'e, R: Ring, I> {
    automaton: &'c CompiledAutomaton<'e, R>,
    inputs: I,
    history: VecDeque<Vec<R>>,
    scratch: Vec<R>,
}

impl<'c, 'e, R: Ring, I: Iterator<Item = Vec<R>>> Iterator for CompiledRun<'c, 'e, R, I> {
    type Item = Vec<R>;

    fn next(&mut self) -> Option<Vec<R>> {
        let input = self.inputs.next()?;
        let auto = self.automaton;
        let history = &self.history;
        let scratch = &mut self.scratch;
        let output = auto.output.eval_into(scratch, |v| lookup(v, &input, history));
        let state = auto.state.eval_into(scratch, |v| lookup(v, &input, history));
        self.history.push_front(state);
        while self.history.len() > auto.memory_length {
            self.history.pop_back();
        }
        Some(output)
    }
}

// ============================================================================
// Tests — compiled semantics and the byte-stream scenarios
// ============================================================================
