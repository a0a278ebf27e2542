//! Symbolic variable families
//!
//! Every transition polynomial in this crate is written over two reserved
//! variable families shared by all automata over the same ring:
//!
//! - `x_i` — lane `i` of the **current input** vector (`i ≥ 0`);
//! - `s_t_j` — lane `j` of the **state vector from `t` steps ago**
//!   (`t ≥ 1`, `j ≥ 0`).
//!
//! A third family, `a_k`, exists only for algebraic self-checks (the delayed
//! inverse construction proves its own identity symbolically); it never
//! appears in a runnable automaton and the code generator rejects it.
//!
//! Variables are small `Copy` values compared, ordered and hashed by
//! structure. Substitution maps are therefore keyed by `(family, indices)`
//! directly — never by rendered names. The textual encoding below is a codec
//! for logs and persisted blobs, and the decoder is exact: `s_2_17` parses
//! back to precisely `(t = 2, j = 17)` or not at all.

#![forbid(unsafe_code)]
#![allow(missing_docs)]

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A symbolic variable: an input lane, a state lane at a fixed age, or an
/// auxiliary check variable.
///
/// The derived `Ord` (family, then indices) gives every variable set and
/// monomial in the crate a deterministic order.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Var {
    /// `x_i` — lane `i` of the current input vector.
    In {
        /// Input lane index `i`.
        lane: usize,
    },
    /// `s_t_j` — lane `j` of the state vector from `t` steps ago (`t ≥ 1`).
    St {
        /// History age `t ≥ 1` (1 = previous step).
        age: usize,
        /// State lane index `j`.
        lane: usize,
    },
    /// `a_k` — auxiliary variable for symbolic identity checks.
    Aux {
        /// Auxiliary index `k`.
        id: usize,
    },
}

/// Errors surfaced by the variable constructors and the name decoder.
#[derive(Debug, thiserror::Error)]
pub enum VarError {
    #[error("state variable age must be at least 1 (got {age})")]
    OutOfRange { age: usize },
    #[error("unrecognized variable name {0:?}")]
    Parse(String),
}

impl Var {
    /// The input variable `x_i`.
    #[inline]
    pub fn input(lane: usize) -> Self {
        Var::In { lane }
    }

    /// The state variable `s_t_j`, rejecting `t = 0` (there is no state for
    /// the current step; age 1 is the previous step).
    #[inline]
    pub fn state(age: usize, lane: usize) -> Result<Self, VarError> {
        if age < 1 {
            return Err(VarError::OutOfRange { age });
        }
        Ok(Var::St { age, lane })
    }

    /// The auxiliary check variable `a_k`.
    #[inline]
    pub fn aux(id: usize) -> Self {
        Var::Aux { id }
    }

    /// History age for state variables, `None` otherwise.
    #[inline]
    pub fn age(&self) -> Option<usize> {
        match self {
            Var::St { age, .. } => Some(*age),
            _ => None,
        }
    }

    /// True for the auxiliary family (not bindable by the evaluation driver).
    #[inline]
    pub fn is_aux(&self) -> bool {
        matches!(self, Var::Aux { .. })
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Var::In { lane } => write!(f, "x_{lane}"),
            Var::St { age, lane } => write!(f, "s_{age}_{lane}"),
            Var::Aux { id } => write!(f, "a_{id}"),
        }
    }
}

// Strict decimal with no sign, no leading '+', no empty string. `usize::from_str`
// already rejects everything but ASCII digits (a leading '+' aside), so only
// that case needs to be ruled out here.
fn parse_index(s: &str) -> Option<usize> {
    if s.is_empty() || s.starts_with('+') {
        return None;
    }
    usize::from_str(s).ok()
}

impl FromStr for Var {
    type Err = VarError;

    /// Exact inverse of `Display`: `x_3`, `s_2_17`, `a_9`. Anything else —
    /// extra fields, signs, aliases, `s_0_j` — is rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || VarError::Parse(s.to_owned());
        let mut parts = s.split('_');
        let family = parts.next().ok_or_else(bad)?;
        match family {
            "x" => match (parts.next(), parts.next()) {
                (Some(i), None) => Ok(Var::input(parse_index(i).ok_or_else(bad)?)),
                _ => Err(bad()),
            },
            "s" => match (parts.next(), parts.next(), parts.next()) {
                (Some(t), Some(j), None) => {
                    let age = parse_index(t).ok_or_else(bad)?;
                    let lane = parse_index(j).ok_or_else(bad)?;
                    Var::state(age, lane)
                }
                _ => Err(bad()),
            },
            "a" => match (parts.next(), parts.next()) {
                (Some(k), None) => Ok(Var::aux(parse_index(k).ok_or_else(bad)?)),
                _ => Err(bad()),
            },
            _ => Err(bad()),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_parse_round_trip() {
        let vars = [
            Var::input(0),
            Var::input(31),
            Var::state(1, 0).unwrap(),
            Var::state(7, 15).unwrap(),
            Var::aux(9),
        ];
        for v in vars {
            let name = v.to_string();
            let back: Var = name.parse().unwrap();
            assert_eq!(back, v, "round-trip through {name:?}");
        }
    }

    #[test]
    fn state_age_zero_rejected() {
        assert!(matches!(Var::state(0, 3), Err(VarError::OutOfRange { age: 0 })));
        assert!("s_0_3".parse::<Var>().is_err());
    }

    #[test]
    fn decoder_is_exact() {
        for bad in ["", "x", "x_", "x_+1", "x_-1", "x_1_2", "s_1", "s_1_2_3", "y_0", "s_a_b", "a_"] {
            assert!(bad.parse::<Var>().is_err(), "{bad:?} must not parse");
        }
    }

    #[test]
    fn ordering_is_family_major() {
        let x9 = Var::input(9);
        let s11 = Var::state(1, 1).unwrap();
        let s20 = Var::state(2, 0).unwrap();
        assert!(x9 < s11);
        assert!(s11 < s20);
        assert!(s20 < Var::aux(0));
    }
}
