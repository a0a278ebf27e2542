//! Crate root: public surface and crate-wide invariants
//!
//! Finite Automata Public-Key Cryptography (FAPKC0) and related
//! constructions over **symbolic finite automata**: pairs of multivariate
//! polynomial vectors (output transition, state transition) evaluated over a
//! base ring, driven by an input stream and a bounded history of past state
//! vectors. From that primitive the crate derives weakly-invertible automaton
//! pairs — linear with delay, linear and nonlinear without delay — their
//! FAPKC0 composition, homomorphic conjugation of arbitrary automata by a
//! key pair, and a state-mixing obfuscator.
//!
//! **FAPKC0 is a broken cryptosystem.** Bao and Igarashi's attack ("Break
//! Finite Automata Public Key Cryptosystem") recovers plaintext from the
//! public key alone; the same paper's constructive inversion is what the
//! delayed-pair generator in this crate implements. Treat every key pair
//! produced here as an object of study.
//!
//! ## Invariants (crate-wide)
//!
//! - **Ring genericity.** All algebra is generic over [`ring::Ring`]; each
//!   ring choice yields its own type family (`Poly<R>`, `Matrix<R>`,
//!   `Automaton<R>`). Shipped rings: GF(2), the Rijndael field GF(2⁸), and
//!   any arkworks field through the `prime-rings` adapter.
//! - **Structural variables.** The reserved families `x_i` / `s_t_j` are
//!   small structural values; substitution maps are keyed by structure,
//!   never by rendered names, and the textual codec is exact.
//! - **Bounded histories.** An evaluation driver holds exactly
//!   `memory_length` state vectors of width `memory_width` and owns them;
//!   independent drivers over one automaton never interact.
//! - **Symbolic operators do not run automata.** Composition and state
//!   mixing rewrite transition polynomials; only the drivers consume
//!   streams.
//! - **Compiled = interpreted.** Lowered programs replay the expression DAG
//!   and are observably equivalent to the interpreted driver; compiled
//!   drivers borrow their [`codegen::Engine`], which pins its lifetime
//!   across the pull sequence.
//! - Failure modes are precise errors (`thiserror` enums per module); no
//!   `unsafe` anywhere in the crate.

#![forbid(unsafe_code)]
#![deny(missing_docs, rust_2018_idioms)]

/// Symbolic finite automata, WIFA pairs, FAPKC0 key generation.
pub mod automaton;
/// Straight-line lowering of transition vectors (module → engine → driver).
pub mod codegen;
/// Matrices over ring scalars; joint row echelon with companions.
pub mod linear;
/// Opaque key blobs and BLAKE3 fingerprints.
pub mod persist;
/// Polynomial expression DAGs, substitution, canonical normal form.
pub mod poly;
/// Base-ring capability trait and the shipped rings.
pub mod ring;
/// The reserved symbolic variable families.
pub mod symbol;

// ============================================================================
// Canonical re-exports (single definition site, imported from the root)
// ============================================================================

pub use crate::automaton::{Automaton, AutomatonError, Run};
pub use crate::codegen::{CompileError, CompiledAutomaton, CompiledRun, Engine, Module};
pub use crate::linear::Matrix;
pub use crate::persist::PersistError;
pub use crate::poly::{Poly, PolyError, PolyVec, Subst};
#[cfg(feature = "prime-rings")]
pub use crate::ring::Fp;
pub use crate::ring::{Bit, Gf256, Ring};
pub use crate::symbol::{Var, VarError};
