//! Symbolic finite automata and weakly-invertible pairs
//!
//! The central artifact of this crate: an [`Automaton`] is a pair of
//! polynomial vectors — `output_transition` and `state_transition` — over the
//! shared variable families `x_i` (current input) and `s_t_j` (state from `t`
//! steps ago). Everything observable about an automaton follows from those
//! two vectors:
//!
//! - **Evaluation** ([`Automaton::run`]) is a pull-based lazy sequence: each
//!   step substitutes the input and a bounded history of past state vectors
//!   into both transitions, emits the output vector and prepends the new
//!   state. Outputs that cannot collapse to constants are emitted symbolic.
//! - **Composition** ([`Automaton::compose`], read `A ∘ C` — "A after C")
//!   rewrites `A`'s inputs to `C`'s output polynomials and shifts `A`'s state
//!   block past `C`'s; the result pipes `C` into `A` without ever running
//!   either.
//! - **State mixing** ([`Automaton::mix_states`]) conjugates the state basis
//!   by a random invertible matrix; behavior from the zero history is
//!   unchanged while the state polynomials are randomized.
//!
//! On top of the primitive sit the invertible-pair constructors: linear with
//! no delay, linear with delay `M` (the Bao–Igarashi block row-reduction,
//! which also *derives* the inverse), nonlinear with no delay, and their
//! FAPKC0 composition. FAPKC0 is a broken cryptosystem — see Bao & Igarashi,
//! "Break Finite Automata Public Key Cryptosystem" — and is provided as an
//! object of study, not as a cipher.
//!
//! ## Invariants
//!
//! - `memory_width` is the dimension of `state_transition`; every history
//!   entry has exactly that width and the history holds exactly
//!   `memory_length` entries at rest.
//! - `A ∘ C` requires `A.input_size() ≤ C.output_size()`; the result has
//!   width `A.W + C.W` and length `max(A.L, C.L)`. Ill-formed compositions
//!   are not rejected eagerly — they surface symbolically at first use.
//! - For every generated pair, `inverse(forward(x)) = x` (no delay) or
//!   `= x` after discarding the first `memory_size` outputs (delayed).
//! - Each evaluation driver owns its history; independent drivers over the
//!   same automaton never interact.

#![forbid(unsafe_code)]
#![allow(missing_docs)]

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use tracing::{debug, trace};

use crate::codegen::{CompileError, CompiledAutomaton, Engine, Module};
use crate::linear::Matrix;
use crate::poly::{Poly, PolyVec, Subst};
use crate::ring::Ring;
use crate::symbol::Var;

/// Errors surfaced by the automaton layer.
#[derive(Debug, thiserror::Error)]
pub enum AutomatonError {
    #[error("initial state must be {expected_len} vectors of width {expected_width}")]
    InvalidInitialState { expected_len: usize, expected_width: usize },
    #[error("{0} is reserved and not implemented")]
    NotImplemented(&'static str),
    #[error("delayed pair generation did not succeed within {attempts} attempts")]
    RetriesExhausted { attempts: usize },
}

/// Internal retry signal for the delayed-pair constructor: the random
/// coefficients produced a singular leading block. Never leaves this module;
/// the public constructors redraw all randomness and try again.
struct BadLuck;

/// A symbolic finite automaton over the ring `R`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(bound(serialize = "R: Serialize", deserialize = "R: Deserialize<'de>"))]
pub struct Automaton<R: Ring> {
    output_transition: PolyVec<R>,
    state_transition: PolyVec<R>,
}

impl<R: Ring> Automaton<R> {
    // ============================================================
    // Construction & derived attributes
    // ============================================================

    /// Build from explicit transition vectors. No validation happens here;
    /// dimension mismatches surface at first use.
    pub fn new(output_transition: PolyVec<R>, state_transition: PolyVec<R>) -> Self {
        Automaton { output_transition, state_transition }
    }

    /// A stateless (purely combinational) automaton: `L = 0`, `W = 0`.
    pub fn combinational(output_transition: PolyVec<R>) -> Self {
        Self::new(output_transition, PolyVec::zero(0))
    }

    /// Output polynomial vector.
    pub fn output_transition(&self) -> &PolyVec<R> {
        &self.output_transition
    }

    /// State polynomial vector.
    pub fn state_transition(&self) -> &PolyVec<R> {
        &self.state_transition
    }

    /// Output block size `B`.
    pub fn output_size(&self) -> usize {
        self.output_transition.dimension()
    }

    /// State vector width `W`.
    pub fn memory_width(&self) -> usize {
        self.state_transition.dimension()
    }

    /// Number of past state vectors referenced by either transition
    /// (the largest `t` over all `s_t_j`; 0 when stateless).
    pub fn memory_length(&self) -> usize {
        self.output_transition
            .variables()
            .into_iter()
            .chain(self.state_transition.variables())
            .filter_map(|v| v.age())
            .max()
            .unwrap_or(0)
    }

    /// Number of input lanes consumed: one past the largest referenced `x_i`
    /// (0 when no input variable occurs).
    pub fn input_size(&self) -> usize {
        self.output_transition
            .variables()
            .into_iter()
            .chain(self.state_transition.variables())
            .filter_map(|v| match v {
                Var::In { lane } => Some(lane + 1),
                _ => None,
            })
            .max()
            .unwrap_or(0)
    }

    // ============================================================
    // Evaluation
    // ============================================================

    /// One evaluation step: substitute `input` and `history` into both
    /// transitions, prepend the new state to `history` (truncating to the
    /// memory length), and return the output vector.
    ///
    /// Fully bound components collapse to constants; components referencing
    /// lanes the input or history do not cover stay symbolic and are
    /// returned as such.
    pub fn transition(&self, input: &PolyVec<R>, history: &mut VecDeque<PolyVec<R>>) -> PolyVec<R> {
        self.step(input, history, self.memory_length())
    }

    fn step(
        &self,
        input: &PolyVec<R>,
        history: &mut VecDeque<PolyVec<R>>,
        memory_length: usize,
    ) -> PolyVec<R> {
        let mut subst = Subst::new();
        for (t, entry) in history.iter().enumerate() {
            for j in 0..entry.dimension() {
                subst
                    .bind_state(t + 1, j, entry[j].clone())
                    .expect("history ages start at 1");
            }
        }
        for i in 0..input.dimension() {
            subst.bind_input(i, input[i].clone());
        }

        let output = self.output_transition.bind(&subst);
        let state = self.state_transition.bind(&subst);

        history.push_front(state);
        while history.len() > memory_length {
            history.pop_back();
        }
        output
    }

    /// Lazily evaluate an input stream from the zero history. One output
    /// vector is produced per input vector, strictly after that input has
    /// been consumed and before the next is touched.
    pub fn run<I>(&self, inputs: I) -> Run<'_, R, I::IntoIter>
    where
        I: IntoIterator<Item = PolyVec<R>>,
    {
        let memory_length = self.memory_length();
        let width = self.memory_width();
        let history = VecDeque::from(vec![PolyVec::zero(width); memory_length]);
        Run { automaton: self, inputs: inputs.into_iter(), history, memory_length }
    }

    /// Like [`Automaton::run`], from an explicit initial history (front =
    /// most recent). The history must contain exactly `memory_length`
    /// vectors of width `memory_width`.
    pub fn run_from<I>(
        &self,
        inputs: I,
        initial_state: Vec<PolyVec<R>>,
    ) -> Result<Run<'_, R, I::IntoIter>, AutomatonError>
    where
        I: IntoIterator<Item = PolyVec<R>>,
    {
        let memory_length = self.memory_length();
        let width = self.memory_width();
        if initial_state.len() != memory_length
            || initial_state.iter().any(|v| v.dimension() != width)
        {
            return Err(AutomatonError::InvalidInitialState {
                expected_len: memory_length,
                expected_width: width,
            });
        }
        Ok(Run {
            automaton: self,
            inputs: inputs.into_iter(),
            history: VecDeque::from(initial_state),
            memory_length,
        })
    }

    // ============================================================
    // Symbolic operators
    // ============================================================

    /// Composition `self ∘ inner` ("self after inner"): the resulting
    /// automaton feeds every input vector to `inner` and pipes `inner`'s
    /// outputs into `self`.
    ///
    /// `self`'s input variables are substituted by `inner`'s output
    /// polynomials, and `self`'s state block is shifted past `inner`'s, so
    /// the composed state vector is `inner`'s state in the low lanes and
    /// `self`'s (shifted) state above it. Associative, not commutative.
    pub fn compose(&self, inner: &Self) -> Self {
        let shift = inner.memory_width();
        let mut subst = Subst::new();
        for (i, y) in inner.output_transition.iter().enumerate() {
            subst.bind_input(i, y.clone());
        }
        for t in 1..=self.memory_length() {
            for j in 0..self.memory_width() {
                subst
                    .bind_state(t, j, Poly::state(t, j + shift).expect("ages start at 1"))
                    .expect("ages start at 1");
            }
        }

        Automaton::new(
            self.output_transition.bind(&subst),
            inner.state_transition.concat(&self.state_transition.bind(&subst)),
        )
    }

    /// Conjugate the state basis by a random invertible `W × W` matrix:
    /// every `s_t_j` is replaced by the `j`-th lane of `M⁻¹ · s_t` in both
    /// transitions, and the state transition is premultiplied by `M`.
    /// Behavior over any input stream from the zero history is unchanged;
    /// the state polynomials are in a randomized basis afterwards.
    pub fn mix_states<G: Rng + ?Sized>(&mut self, rng: &mut G) {
        let width = self.memory_width();
        let (mix, unmix) = Matrix::random_inverse_pair(width, rng);

        let mut subst = Subst::new();
        for t in 1..=self.memory_length() {
            let lanes = PolyVec::states(t, 0, width).expect("ages start at 1");
            let unmixed = unmix.apply(&lanes);
            for j in 0..width {
                subst
                    .bind_state(t, j, unmixed[j].clone())
                    .expect("ages start at 1");
            }
        }

        self.state_transition = mix.apply(&self.state_transition.bind(&subst));
        self.output_transition = self.output_transition.bind(&subst);
    }

    /// Simplify both transition vectors in place. Semantically a no-op on
    /// input/output behavior.
    pub fn optimize(&mut self) {
        let before = (self.output_transition.circuit_size(), self.state_transition.circuit_size());
        self.output_transition = self.output_transition.optimized();
        self.state_transition = self.state_transition.optimized();
        debug!(
            ot_before = before.0,
            ot_after = self.output_transition.circuit_size(),
            st_before = before.1,
            st_after = self.state_transition.circuit_size(),
            "simplified transition vectors"
        );
    }

    /// Reserved: two automata running side by side (input and output sizes
    /// add).
    pub fn parallel(&self, _other: &Self) -> Result<Self, AutomatonError> {
        Err(AutomatonError::NotImplemented("parallel composition"))
    }

    /// Reserved: tagged-union choice between two automata of equal input and
    /// output sizes, selected by a one-lane prefix on the input.
    pub fn choice(&self, _other: &Self) -> Result<Self, AutomatonError> {
        Err(AutomatonError::NotImplemented("choice composition"))
    }

    /// Reserved: narrow the output to the lane range `begin..end`.
    pub fn cast(&self, _begin: usize, _end: usize) -> Result<Self, AutomatonError> {
        Err(AutomatonError::NotImplemented("output narrowing"))
    }

    // ============================================================
    // Gadget constructors
    // ============================================================

    /// Echo the input back, after `delay` steps (immediately for 0).
    pub fn repeater(block_size: usize, delay: usize) -> Self {
        if delay == 0 {
            Self::new(PolyVec::inputs(block_size), PolyVec::zero(block_size))
        } else {
            Self::new(
                PolyVec::states(delay, 0, block_size).expect("delay is at least 1"),
                PolyVec::inputs(block_size),
            )
        }
    }

    /// Counting gate: passes the input through while an internal
    /// ripple-carry counter has not yet reached `period` (LSB-first binary
    /// in `block_size` lanes), then outputs zero vectors forever.
    pub fn countdown(block_size: usize, period: u64) -> Self {
        let input = PolyVec::inputs(block_size);
        let state = PolyVec::states(1, 0, block_size).expect("age 1");
        let set_point: Vec<Poly<R>> = (0..block_size)
            .map(|i| if i < 64 && period >> i & 1 == 1 { Poly::one() } else { Poly::zero() })
            .collect();

        // Nonzero while the counter differs from the set point.
        let mut switch = Poly::zero();
        for i in 0..block_size {
            switch = switch.or(&(&state[i] - &set_point[i]));
        }

        fn full_adder<R: Ring>(a: &Poly<R>, b: &Poly<R>, c: &Poly<R>) -> (Poly<R>, Poly<R>) {
            (a.add_poly(b).add_poly(c), (a * b).or(&(b * c)).or(&(c * a)))
        }

        let mut carry = Poly::zero();
        let mut next_state = Vec::with_capacity(block_size);
        for i in 0..block_size {
            let addend = if i == 0 { switch.clone() } else { Poly::zero() };
            let (sum, c) = full_adder(&state[i], &addend, &carry);
            next_state.push(sum);
            carry = c;
        }

        let output: PolyVec<R> = input.iter().map(|x| x * &switch).collect();
        Self::new(output, PolyVec::new(next_state))
    }

    // ============================================================
    // Invertible pairs
    // ============================================================

    /// A pair `(F, G)` of linear automata with zero delay, mutual inverses
    /// over any input stream from the zero history: `G(F(x)) = x`.
    ///
    /// `F` outputs `Ms·x + Σ_n R_n·s_n` and remembers the raw input; `G`
    /// undoes it with `Ms⁻¹` and remembers its own (recovered) output.
    pub fn linear_nodelay_wifa_pair<G: Rng + ?Sized>(
        block_size: usize,
        memory_size: usize,
        rng: &mut G,
    ) -> (Self, Self) {
        let input = PolyVec::inputs(block_size);
        let (ms, mi) = Matrix::random_inverse_pair(block_size, rng);

        let mut forward_out = ms.apply(&input);
        let mut inverse_out = mi.apply(&input);
        for n in 1..=memory_size {
            let lag = PolyVec::states(n, 0, block_size).expect("ages start at 1");
            let coeff = Matrix::random(block_size, block_size, rng);
            forward_out = forward_out.add(&coeff.apply(&lag));
            inverse_out = inverse_out.sub(&mi.mul(&coeff).apply(&lag));
        }

        let forward = Self::new(forward_out, input);
        let inverse = Self::new(inverse_out.clone(), inverse_out);
        (forward, inverse)
    }

    /// A pair `(F, G)` of linear automata where `F` has delay `memory_size`
    /// and `G` recovers the input after discarding the first `memory_size`
    /// outputs. The inverse is *derived*, not drawn: a block row-reduction
    /// over the coefficient matrices (Bao–Igarashi) produces the recovery
    /// coefficients, and unlucky coefficient draws are retried with fresh
    /// randomness until the reduction succeeds.
    ///
    /// Loops until success; for a bounded/cancellable variant see
    /// [`Automaton::linear_delay_wifa_pair_bounded`].
    pub fn linear_delay_wifa_pair<G: Rng + ?Sized>(
        block_size: usize,
        memory_size: usize,
        rng: &mut G,
    ) -> (Self, Self) {
        let mut attempt = 0usize;
        loop {
            attempt += 1;
            // Fresh, independent entropy per attempt.
            let mut attempt_rng = StdRng::seed_from_u64(rng.gen());
            match Self::delayed_pair_attempt(block_size, memory_size, &mut attempt_rng) {
                Ok(pair) => {
                    debug!(attempts = attempt, block_size, memory_size, "delayed pair generated");
                    return pair;
                }
                Err(BadLuck) => trace!(attempt, "singular leading block, redrawing"),
            }
        }
    }

    /// Bounded variant of [`Automaton::linear_delay_wifa_pair`]: gives up
    /// with [`AutomatonError::RetriesExhausted`] after `max_attempts`
    /// redraws. Callers that need cooperative cancellation check their
    /// channel between calls to this.
    pub fn linear_delay_wifa_pair_bounded<G: Rng + ?Sized>(
        block_size: usize,
        memory_size: usize,
        max_attempts: usize,
        rng: &mut G,
    ) -> Result<(Self, Self), AutomatonError> {
        for attempt in 1..=max_attempts {
            let mut attempt_rng = StdRng::seed_from_u64(rng.gen());
            match Self::delayed_pair_attempt(block_size, memory_size, &mut attempt_rng) {
                Ok(pair) => {
                    debug!(attempts = attempt, block_size, memory_size, "delayed pair generated");
                    return Ok(pair);
                }
                Err(BadLuck) => trace!(attempt, "singular leading block, redrawing"),
            }
        }
        Err(AutomatonError::RetriesExhausted { attempts: max_attempts })
    }

    /// One generation attempt with fixed randomness.
    fn delayed_pair_attempt(
        block_size: usize,
        memory_size: usize,
        rng: &mut StdRng,
    ) -> Result<(Self, Self), BadLuck> {
        let (b, m) = (block_size, memory_size);
        // Rank-(B−1) coefficients carry exactly one linear dependency each;
        // at B = 1 they are all zero and no draw can ever succeed.
        assert!(b >= 2, "delayed pairs need a block size of at least 2");
        assert!(m >= 1, "delayed pairs need a delay of at least 1");

        // Forward: y = Σ_{n=0..M} A_n · x_{−n}, with x_0 the current input
        // and x_{−n} = s_n. State remembers input and output side by side.
        let coeff: Vec<Matrix<R>> =
            (0..=m).map(|_| Matrix::random_rank(b, b - 1, rng)).collect();

        let mut lag: Vec<PolyVec<R>> = Vec::with_capacity(m + 1);
        lag.push(PolyVec::inputs(b));
        for n in 1..=m {
            lag.push(PolyVec::states(n, 0, b).expect("ages start at 1"));
        }
        let mut out = PolyVec::zero(b);
        for n in 0..=m {
            out = out.add(&coeff[n].apply(&lag[n]));
        }
        let out = out.optimized();
        let forward = Self::new(out.clone(), lag[0].concat(&out));

        // Block system: A[i,j] = A_{i−j} (lower triangular), and the
        // "remainder" grid A_r[i,j] = A_{i+j+1} used for the Q coefficients.
        let zero_block = Matrix::<R>::zero(b, b);
        let mut grid_a: BTreeMap<(usize, usize), Matrix<R>> = BTreeMap::new();
        for i in 0..=m {
            for j in 0..=m {
                let cell = if i >= j { coeff[i - j].clone() } else { zero_block.clone() };
                grid_a.insert((i, j), cell);
            }
        }
        let mut grid_ar: BTreeMap<(usize, usize), Matrix<R>> = BTreeMap::new();
        for i in 0..=m {
            for j in 0..m {
                let cell =
                    if i + j + 1 <= m { coeff[i + j + 1].clone() } else { zero_block.clone() };
                grid_ar.insert((i, j), cell);
            }
        }

        // P starts as the block identity; PA is the working copy of A.
        let mut grid_p: BTreeMap<(usize, usize), Matrix<R>> = BTreeMap::new();
        for i in 0..=m {
            for j in 0..=m {
                let cell = if i == j { Matrix::unit(b) } else { zero_block.clone() };
                grid_p.insert((i, j), cell);
            }
        }
        let mut grid_pa = grid_a;

        for i in (0..=m).rev() {
            // Jointly reduce PA[i,i]; the same row operations hit the whole
            // lower-triangular row group {PA[p,q] : p ≤ i, q ≤ p}.
            let mut driver = grid_pa.remove(&(i, i)).expect("grid cell (i,i)");
            let mut companions: Vec<&mut Matrix<R>> = grid_pa
                .iter_mut()
                .filter(|((p, q), _)| *p <= i && *q <= *p)
                .map(|(_, cell)| cell)
                .collect();
            let pu = driver.echelon_with(&mut companions);
            drop(companions);
            grid_pa.insert((i, i), driver);

            for p in 0..=i {
                for q in 0..=m {
                    let cell = grid_p.get_mut(&(p, q)).expect("grid cell");
                    *cell = pu.mul(cell);
                }
            }

            // Kill-row boundary: first zero row of PA[0,0].
            let pa00 = grid_pa.get(&(0, 0)).expect("grid cell (0,0)");
            let ll = (0..b).find(|&j| pa00.row_is_zero(j)).unwrap_or(b);

            let keep = Matrix::diagonal(
                (0..b).map(|j| if j < ll { R::one() } else { R::zero() }).collect(),
            );
            let spill = Matrix::diagonal(
                (0..b).map(|j| if j < ll { R::zero() } else { R::one() }).collect(),
            );

            // Shift the dead rows down a block row; blend P accordingly.
            let mut next_p: BTreeMap<(usize, usize), Matrix<R>> = BTreeMap::new();
            for p in 0..i {
                for q in 0..=p {
                    for j in ll..b {
                        let row: Vec<R> = grid_pa[&(p + 1, q)].row(j).to_vec();
                        grid_pa.get_mut(&(p, q)).expect("grid cell").set_row(j, &row);
                    }
                }
                for q in 0..=m {
                    next_p.insert(
                        (p, q),
                        keep.mul(&grid_p[&(p, q)]).add(&spill.mul(&grid_p[&(p + 1, q)])),
                    );
                }
            }
            for q in 0..=i {
                let cell = grid_pa.get_mut(&(i, q)).expect("grid cell");
                for j in ll..b {
                    cell.zero_row(j);
                }
            }
            for q in 0..=m {
                next_p.insert(
                    (i, q),
                    keep.mul(&grid_p[&(i, q)]).add(&spill.mul(&grid_p[&(0, q)])),
                );
            }
            for (key, cell) in next_p {
                grid_p.insert(key, cell);
            }
        }

        // The reduction must leave a full-rank leading block; otherwise the
        // coefficient draw was unlucky and the caller redraws everything.
        let pa00 = grid_pa.get(&(0, 0)).expect("grid cell (0,0)");
        if (0..b).any(|j| pa00.row_is_zero(j)) {
            return Err(BadLuck);
        }
        let lead_inv = pa00.inverse().ok_or(BadLuck)?;

        let coeff_p: Vec<Matrix<R>> =
            (0..=m).map(|n| lead_inv.mul(&grid_p[&(0, n)])).collect();
        let mut coeff_q: Vec<Matrix<R>> = vec![Matrix::zero(b, b)];
        for q in 0..m {
            let mut acc = Matrix::zero(b, b);
            for k in 0..=m {
                acc = acc.add(&grid_p[&(0, k)].mul(&grid_ar[&(k, q)]));
            }
            coeff_q.push(lead_inv.mul(&acc));
        }

        #[cfg(debug_assertions)]
        Self::assert_recovery_identity(&coeff, &coeff_p, &coeff_q, b, m);

        // Inverse automaton: x_0 = Σ_n P_n·y_n − Σ_n Q_n·x_{−n}, with the
        // current input of G being the latest F-output (y_M) and its state
        // remembering (recovered input | latest output).
        let mut recovered = PolyVec::zero(b);
        for n in 0..=m {
            let lag_n = if n == 0 {
                PolyVec::zero(b)
            } else {
                PolyVec::states(n, 0, b).expect("ages start at 1")
            };
            let out_n = if n == m {
                PolyVec::inputs(b)
            } else {
                PolyVec::states(m - n, b, b).expect("ages start at 1")
            };
            recovered = recovered.add(&coeff_p[n].apply(&out_n));
            recovered = recovered.sub(&coeff_q[n].apply(&lag_n));
        }
        let recovered = recovered.optimized();
        let inverse = Self::new(recovered.clone(), recovered.concat(&PolyVec::inputs(b)));

        Ok((forward, inverse))
    }

    /// Debug-build check that the derived coefficient sequences satisfy
    /// `Σ_n P_n·y_n − Σ_n Q_n·x_{−n} ≡ x_0` identically as polynomials,
    /// over free auxiliary arguments.
    #[cfg(debug_assertions)]
    fn assert_recovery_identity(
        coeff: &[Matrix<R>],
        coeff_p: &[Matrix<R>],
        coeff_q: &[Matrix<R>],
        b: usize,
        m: usize,
    ) {
        // Free arguments x_{−m}..x_{m}, one auxiliary block each.
        let args: Vec<PolyVec<R>> = (0..=2 * m).map(|k| PolyVec::auxs(k * b, b)).collect();
        let arg = |k: isize| &args[(k + m as isize) as usize];

        let mut outputs = Vec::with_capacity(m + 1);
        for k in 0..=m as isize {
            let mut y = PolyVec::zero(b);
            for n in 0..=m {
                y = y.add(&coeff[n].apply(arg(k - n as isize)));
            }
            outputs.push(y.optimized());
        }

        let mut recovered = PolyVec::zero(b);
        for n in 0..=m {
            recovered = recovered.add(&coeff_p[n].apply(&outputs[n]));
            recovered = recovered.sub(&coeff_q[n].apply(arg(-(n as isize))));
        }
        assert!(
            recovered.optimized().equivalent(arg(0)),
            "recovery coefficients do not reproduce x_0"
        );
    }

    /// A pair `(F, G)` of nonlinear automata with zero delay, mutual
    /// inverses over any input stream from the zero history.
    ///
    /// `F` adds, on top of an invertible linear image of the input, terms in
    /// its past inputs `x_n`, past outputs `y_n`, and the componentwise
    /// products `x_n ⊗ x_{n+1}` (with `x_{M+1} = R·s_M` for an extra random
    /// `R` shared by both directions). `G` subtracts the same terms after
    /// undoing the linear image. This construction carries the severe
    /// weakness described by Bao & Igarashi.
    pub fn nonlinear_nodelay_wifa_pair<G: Rng + ?Sized>(
        block_size: usize,
        memory_size: usize,
        rng: &mut G,
    ) -> (Self, Self) {
        let (b, m) = (block_size, memory_size);
        let (mix, unmix) = Matrix::random_inverse_pair(b, rng);
        let coeff_a: Vec<Matrix<R>> = (1..=m).map(|_| Matrix::random(b, b, rng)).collect();
        let coeff_b: Vec<Matrix<R>> = (1..=m).map(|_| Matrix::random(b, b, rng)).collect();
        let coeff_c: Vec<Matrix<R>> = (1..=m).map(|_| Matrix::random(b, b, rng)).collect();

        let input = PolyVec::inputs(b);

        // lag[n−1] = x_n for n = 1..=M, plus the extra x_{M+1} = R·s_M.
        let mut lag: Vec<PolyVec<R>> = Vec::with_capacity(m + 1);
        for n in 1..=m {
            lag.push(PolyVec::states(n, 0, b).expect("ages start at 1"));
        }
        if m >= 1 {
            let extra = Matrix::random(b, b, rng);
            lag.push(extra.apply(&PolyVec::states(m, 0, b).expect("ages start at 1")));
        }
        let outs: Vec<PolyVec<R>> =
            (1..=m).map(|n| PolyVec::states(n, b, b).expect("ages start at 1")).collect();

        let mut forward_out = mix.apply(&input);
        for n in 1..=m {
            let pair = lag[n - 1].hadamard(&lag[n]);
            forward_out = forward_out.add(&coeff_a[n - 1].apply(&lag[n - 1]));
            forward_out = forward_out.add(&coeff_b[n - 1].apply(&pair));
            forward_out = forward_out.add(&coeff_c[n - 1].apply(&outs[n - 1]));
        }
        let forward_out = forward_out.optimized();
        let forward = Self::new(forward_out.clone(), input.concat(&forward_out));

        let mut inverse_out = unmix.apply(&input);
        for n in 1..=m {
            let pair = lag[n - 1].hadamard(&lag[n]);
            inverse_out = inverse_out.sub(&unmix.mul(&coeff_a[n - 1]).apply(&lag[n - 1]));
            inverse_out = inverse_out.sub(&unmix.mul(&coeff_b[n - 1]).apply(&pair));
            inverse_out = inverse_out.sub(&unmix.mul(&coeff_c[n - 1]).apply(&outs[n - 1]));
        }
        let inverse_out = inverse_out.optimized();
        let inverse = Self::new(inverse_out.clone(), inverse_out.concat(&input));

        (forward, inverse)
    }

    /// A random FAPKC0 key pair `(public, private)`:
    /// `public = N ∘ L` and `private = L⁻¹ ∘ N⁻¹` for a linear delayed pair
    /// `(L, L⁻¹)` and a nonlinear no-delay pair `(N, N⁻¹)`. Decryption lags
    /// by `memory_size` blocks: extend the ciphertext with that many
    /// arbitrary flush blocks and discard the first `memory_size` decrypted
    /// outputs.
    ///
    /// FAPKC0 is **broken** (Bao–Igarashi); generate pairs for study only.
    pub fn fapkc0<G: Rng + ?Sized>(
        block_size: usize,
        memory_size: usize,
        rng: &mut G,
    ) -> (Self, Self) {
        let (lin_fwd, lin_inv) = Self::linear_delay_wifa_pair(block_size, memory_size, rng);
        let (non_fwd, non_inv) = Self::nonlinear_nodelay_wifa_pair(block_size, memory_size, rng);

        let mut public = non_fwd.compose(&lin_fwd);
        let mut private = lin_inv.compose(&non_inv);
        public.optimize();
        private.optimize();
        (public, private)
    }

    // ============================================================
    // Compilation hooks
    // ============================================================

    /// Register both transition vectors with a code-generation module, as
    /// `<name>_ot` and `<name>_st`.
    pub fn compile(&self, name: &str, module: &mut Module<R>) -> Result<(), CompileError> {
        module.register(format!("{name}_ot"), &self.output_transition)?;
        module.register(format!("{name}_st"), &self.state_transition)?;
        Ok(())
    }

    /// Bind an evaluation driver to the compiled programs registered under
    /// `name`. The driver borrows the engine, which therefore stays live for
    /// the whole pull sequence. Observable semantics match [`Automaton::run`]
    /// on scalar streams.
    pub fn wrap_compiled<'e>(
        &self,
        name: &str,
        engine: &'e Engine<R>,
    ) -> Result<CompiledAutomaton<'e, R>, CompileError> {
        CompiledAutomaton::bind(engine, name, self.memory_length(), self.memory_width())
    }
}

/// Pull-based evaluation driver returned by [`Automaton::run`]. Owns its
/// history; independent drivers never interact.
pub struct Run<'a, R: Ring, I> {
    automaton: &'a Automaton<R>,
    inputs: I,
    history: VecDeque<PolyVec<R>>,
    memory_length: usize,
}

impl<'a, R: Ring, I: Iterator<Item = PolyVec<R>>> Iterator for Run<'a, R, I> {
    type Item = PolyVec<R>;

    fn next(&mut self) -> Option<PolyVec<R>> {
        let input = self.inputs.next()?;
        Some(self.automaton.step(&input, &mut self.history, self.memory_length))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ring::{Bit, Gf256};

    fn rng(seed: u64) -> StdRng {
        StdRng::seed_from_u64(seed)
    }

    /// Random polynomial over the given variables: a handful of random
    /// monomials of degree up to `degree`, plus a random constant.
    fn random_poly<R: Ring>(vars: &[Var], degree: usize, rng: &mut StdRng) -> Poly<R> {
        let mut acc = Poly::constant(R::random(rng));
        for _ in 0..(2 + 2 * degree) {
            let mut term = Poly::constant(R::random(rng));
            for _ in 0..rng.gen_range(0..=degree) {
                let v = vars[rng.gen_range(0..vars.len())];
                term = &term * &Poly::var(v);
            }
            acc = &acc + &term;
        }
        acc
    }

    fn random_automaton<R: Ring>(
        block_size: usize,
        width: usize,
        length: usize,
        degree: usize,
        rng: &mut StdRng,
    ) -> Automaton<R> {
        let mut vars: Vec<Var> = (0..block_size).map(Var::input).collect();
        for t in 1..=length {
            for j in 0..width {
                vars.push(Var::state(t, j).unwrap());
            }
        }
        let output = (0..block_size).map(|_| random_poly(&vars, degree, rng)).collect();
        let state = (0..width).map(|_| random_poly(&vars, degree, rng)).collect();
        Automaton::new(output, state)
    }

    fn random_stream<R: Ring>(block_size: usize, len: usize, rng: &mut StdRng) -> Vec<PolyVec<R>> {
        (0..len)
            .map(|_| {
                let scalars: Vec<R> = (0..block_size).map(|_| R::random(rng)).collect();
                PolyVec::from_scalars(&scalars)
            })
            .collect()
    }

    fn collect_scalars<R: Ring>(outputs: impl Iterator<Item = PolyVec<R>>) -> Vec<Vec<R>> {
        outputs
            .map(|v| v.to_scalars().expect("fully bound output"))
            .collect()
    }

    // ------------------------------ attributes ------------------------------

    #[test]
    fn derived_attributes() {
        let out = PolyVec::<Bit>::new(vec![
            &Poly::input(2) + &Poly::state(3, 1).unwrap(),
            Poly::zero(),
        ]);
        let state = PolyVec::new(vec![Poly::state(1, 0).unwrap()]);
        let a = Automaton::new(out, state);
        assert_eq!(a.output_size(), 2);
        assert_eq!(a.memory_width(), 1);
        assert_eq!(a.memory_length(), 3);
        assert_eq!(a.input_size(), 3);

        let stateless = Automaton::<Bit>::combinational(PolyVec::inputs(4));
        assert_eq!(stateless.memory_length(), 0);
        assert_eq!(stateless.memory_width(), 0);
        assert_eq!(stateless.input_size(), 4);
    }

    #[test]
    fn initial_state_is_validated() {
        let mut r = rng(1);
        // delay-2 repeater: memory length 2, width 4.
        let a = Automaton::<Bit>::repeater(4, 2);
        let stream = random_stream::<Bit>(4, 4, &mut r);

        // Wrong length.
        let err = a
            .run_from(stream.clone(), vec![PolyVec::zero(4)])
            .err()
            .expect("short history must be rejected");
        assert!(matches!(
            err,
            AutomatonError::InvalidInitialState { expected_len: 2, expected_width: 4 }
        ));
        // Wrong width.
        assert!(a
            .run_from(stream.clone(), vec![PolyVec::zero(4), PolyVec::zero(2)])
            .is_err());
        // Exact history is accepted and equals the zero-history run when the
        // supplied history is zero.
        let from_zero: Vec<_> = a
            .run_from(stream.clone(), vec![PolyVec::zero(4), PolyVec::zero(4)])
            .unwrap()
            .collect();
        let fresh: Vec<_> = a.run(stream).collect();
        assert_eq!(from_zero, fresh);
    }

    #[test]
    fn reserved_operators_refuse() {
        let a = Automaton::<Bit>::repeater(4, 0);
        assert!(matches!(a.parallel(&a), Err(AutomatonError::NotImplemented(_))));
        assert!(matches!(a.choice(&a), Err(AutomatonError::NotImplemented(_))));
        assert!(matches!(a.cast(0, 2), Err(AutomatonError::NotImplemented(_))));
    }

    // ------------------------------ evaluation ------------------------------

    #[test]
    fn repeater_echoes_with_delay() {
        let mut r = rng(2);
        let stream = random_stream::<Gf256>(3, 10, &mut r);
        let plain: Vec<Vec<Gf256>> = stream.iter().map(|v| v.to_scalars().unwrap()).collect();

        let echo = Automaton::<Gf256>::repeater(3, 0);
        let got = collect_scalars(echo.run(stream.clone()));
        assert_eq!(got, plain);

        let delayed = Automaton::<Gf256>::repeater(3, 2);
        let got = collect_scalars(delayed.run(stream.clone()));
        assert_eq!(got[2..], plain[..8]);
        assert!(got[0].iter().all(Ring::is_zero));
    }

    #[test]
    fn countdown_gates_the_input() {
        let mut r = rng(3);
        let stream = random_stream::<Bit>(4, 8, &mut r);
        let plain: Vec<Vec<Bit>> = stream.iter().map(|v| v.to_scalars().unwrap()).collect();

        let gate = Automaton::<Bit>::countdown(4, 3);
        let got = collect_scalars(gate.run(stream));
        // Counter runs 0, 1, 2 then parks at 3: three passes, zeros after.
        assert_eq!(got[..3], plain[..3]);
        for step in &got[3..] {
            assert!(step.iter().all(Ring::is_zero));
        }
    }

    #[test]
    fn unresolved_lanes_stay_symbolic() {
        // Output reads x_1 but the stream only carries one lane.
        let a = Automaton::<Bit>::combinational(PolyVec::inputs(2));
        let narrow = vec![PolyVec::from_scalars(&[Bit(true)])];
        let out = a.run(narrow).next().unwrap();
        assert_eq!(out[0].evaluate().unwrap(), Bit(true));
        assert!(out[1].evaluate().is_err());
    }

    // ------------------------------ operators ------------------------------

    #[test]
    fn composition_matches_piped_evaluation() {
        let mut r = rng(4);
        for degree in 0..3usize {
            let outer = random_automaton::<Bit>(4, 3, 3, degree, &mut r);
            let inner = random_automaton::<Bit>(4, 2, 2, degree, &mut r);
            let composed = outer.compose(&inner);
            assert_eq!(composed.memory_width(), 5);

            let stream = random_stream::<Bit>(4, 24, &mut r);
            let direct = collect_scalars(composed.run(stream.clone()));
            let piped = collect_scalars(outer.run(inner.run(stream)));
            assert_eq!(direct, piped, "degree {degree}");
        }
    }

    #[test]
    fn composition_is_associative_on_streams() {
        let mut r = rng(5);
        let a = random_automaton::<Gf256>(2, 2, 2, 1, &mut r);
        let b = random_automaton::<Gf256>(2, 1, 1, 1, &mut r);
        let c = random_automaton::<Gf256>(2, 2, 2, 1, &mut r);

        let left = a.compose(&b).compose(&c);
        let right = a.compose(&b.compose(&c));
        let stream = random_stream::<Gf256>(2, 16, &mut r);
        assert_eq!(
            collect_scalars(left.run(stream.clone())),
            collect_scalars(right.run(stream))
        );
    }

    #[test]
    fn state_mixing_preserves_behavior() {
        let mut r = rng(6);
        for degree in 0..3usize {
            let original = random_automaton::<Bit>(4, 3, 3, degree, &mut r);
            let mut mixed = original.clone();
            mixed.mix_states(&mut r);
            let stream = random_stream::<Bit>(4, 24, &mut r);
            assert_eq!(
                collect_scalars(original.run(stream.clone())),
                collect_scalars(mixed.run(stream)),
                "degree {degree}"
            );
        }
        // Also fine over a field ring.
        let original = random_automaton::<Gf256>(2, 2, 2, 2, &mut r);
        let mut mixed = original.clone();
        mixed.mix_states(&mut r);
        let stream = random_stream::<Gf256>(2, 16, &mut r);
        assert_eq!(
            collect_scalars(original.run(stream.clone())),
            collect_scalars(mixed.run(stream))
        );
    }

    #[test]
    fn optimize_preserves_behavior() {
        let mut r = rng(7);
        let original = random_automaton::<Gf256>(3, 2, 2, 2, &mut r);
        let mut optimized = original.clone();
        optimized.optimize();
        let stream = random_stream::<Gf256>(3, 24, &mut r);
        assert_eq!(
            collect_scalars(original.run(stream.clone())),
            collect_scalars(optimized.run(stream))
        );
    }

    // ------------------------------ invertible pairs ------------------------------

    #[test]
    fn nodelay_linear_pair_inverts() {
        let mut r = rng(8);
        for memory_size in 0..4usize {
            let (forward, inverse) =
                Automaton::<Bit>::linear_nodelay_wifa_pair(8, memory_size, &mut r);
            let stream = random_stream::<Bit>(8, 64, &mut r);
            let plain: Vec<Vec<Bit>> = stream.iter().map(|v| v.to_scalars().unwrap()).collect();
            let recovered = collect_scalars(inverse.run(forward.run(stream)));
            assert_eq!(recovered, plain, "memory {memory_size}");
        }
    }

    #[test]
    fn nodelay_linear_pair_inverts_width_one() {
        let mut r = rng(9);
        for memory_size in 1..=4usize {
            let (forward, inverse) =
                Automaton::<Gf256>::linear_nodelay_wifa_pair(1, memory_size, &mut r);
            let stream = random_stream::<Gf256>(1, 64, &mut r);
            let plain: Vec<Vec<Gf256>> = stream.iter().map(|v| v.to_scalars().unwrap()).collect();
            let recovered = collect_scalars(inverse.run(forward.run(stream)));
            assert_eq!(recovered, plain, "memory {memory_size}");
        }
    }

    #[test]
    fn delayed_linear_pair_recovers_after_the_delay() {
        let mut r = rng(10);
        for memory_size in 1..=3usize {
            let (forward, inverse) =
                Automaton::<Bit>::linear_delay_wifa_pair(8, memory_size, &mut r);
            assert_eq!(forward.memory_width(), 16);

            let stream = random_stream::<Bit>(8, 96, &mut r);
            let flush = random_stream::<Bit>(8, memory_size, &mut r);
            let plain: Vec<Vec<Bit>> = stream.iter().map(|v| v.to_scalars().unwrap()).collect();

            let mut padded = stream;
            padded.extend(flush);
            let recovered = collect_scalars(inverse.run(forward.run(padded)));
            assert_eq!(recovered[memory_size..], plain, "memory {memory_size}");
        }
    }

    #[test]
    fn delayed_linear_pair_over_a_field() {
        let mut r = rng(11);
        for memory_size in 1..=2usize {
            let (forward, inverse) =
                Automaton::<Gf256>::linear_delay_wifa_pair(2, memory_size, &mut r);
            let stream = random_stream::<Gf256>(2, 64, &mut r);
            let flush = random_stream::<Gf256>(2, memory_size, &mut r);
            let plain: Vec<Vec<Gf256>> = stream.iter().map(|v| v.to_scalars().unwrap()).collect();

            let mut padded = stream;
            padded.extend(flush);
            let recovered = collect_scalars(inverse.run(forward.run(padded)));
            assert_eq!(recovered[memory_size..], plain, "memory {memory_size}");
        }
    }

    #[test]
    fn delayed_pair_generation_terminates_quickly() {
        let mut r = rng(12);
        // A singular draw is possible but rare; 32 attempts is far beyond
        // what an honest run needs.
        let generated =
            Automaton::<Bit>::linear_delay_wifa_pair_bounded(8, 2, 32, &mut r);
        assert!(generated.is_ok());
    }

    #[test]
    fn nonlinear_nodelay_pair_inverts() {
        let mut r = rng(13);
        for memory_size in 0..3usize {
            let (forward, inverse) =
                Automaton::<Bit>::nonlinear_nodelay_wifa_pair(8, memory_size, &mut r);
            let stream = random_stream::<Bit>(8, 64, &mut r);
            let plain: Vec<Vec<Bit>> = stream.iter().map(|v| v.to_scalars().unwrap()).collect();
            let recovered = collect_scalars(inverse.run(forward.run(stream)));
            assert_eq!(recovered, plain, "memory {memory_size}");
        }
    }

    #[test]
    fn fapkc0_round_trips_interpreted() {
        let mut r = rng(14);
        let (public, private) = Automaton::<Bit>::fapkc0(4, 1, &mut r);

        let stream = random_stream::<Bit>(4, 32, &mut r);
        let flush = random_stream::<Bit>(4, 1, &mut r);
        let plain: Vec<Vec<Bit>> = stream.iter().map(|v| v.to_scalars().unwrap()).collect();

        let mut padded = stream;
        padded.extend(flush);
        let recovered = collect_scalars(private.run(public.run(padded)));
        assert_eq!(recovered[1..], plain);
    }

    #[test]
    fn fapkc0_mixed_keys_still_round_trip() {
        let mut r = rng(15);
        let (mut public, private) = Automaton::<Bit>::fapkc0(4, 1, &mut r);
        public.mix_states(&mut r);

        let stream = random_stream::<Bit>(4, 24, &mut r);
        let flush = random_stream::<Bit>(4, 1, &mut r);
        let plain: Vec<Vec<Bit>> = stream.iter().map(|v| v.to_scalars().unwrap()).collect();

        let mut padded = stream;
        padded.extend(flush);
        let recovered = collect_scalars(private.run(public.run(padded)));
        assert_eq!(recovered[1..], plain);
    }

    #[cfg(feature = "prime-rings")]
    #[test]
    fn prime_ring_composition_and_mixing() {
        use crate::ring::Fp;
        type R = Fp<ark_bn254::Fr>;

        let mut r = rng(16);
        let outer = random_automaton::<R>(2, 2, 2, 1, &mut r);
        let inner = random_automaton::<R>(2, 1, 1, 1, &mut r);
        let composed = outer.compose(&inner);

        let stream = random_stream::<R>(2, 12, &mut r);
        assert_eq!(
            collect_scalars(composed.run(stream.clone())),
            collect_scalars(outer.run(inner.run(stream.clone())))
        );

        let mut mixed = composed.clone();
        mixed.mix_states(&mut r);
        assert_eq!(
            collect_scalars(composed.run(stream.clone())),
            collect_scalars(mixed.run(stream))
        );
    }
}
