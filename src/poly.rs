//! Multivariate polynomials over a base ring
//!
//! Transition functions are vectors of multivariate polynomials over the
//! symbolic variable families of [`crate::symbol`]. The representation is an
//! immutable expression DAG behind `Arc`: composition and state mixing
//! substitute whole polynomials for variables, and shared subtrees keep the
//! result compact instead of expanding it term-by-term.
//!
//! Invariants and design points:
//!
//! - **Construction folds constants.** The smart constructors apply `0`/`1`
//!   identities and constant arithmetic, so a fully-substituted polynomial
//!   collapses to a constant without a separate evaluation pass.
//! - **Substitution is structural.** [`Subst`] is a dense map keyed by
//!   variable structure (input lane, `(age, lane)` state coordinates); no
//!   name rendering is involved. Every `bind` memoizes per shared subtree.
//! - **Simplification is canonical.** [`Poly::normal`] expands to a sum of
//!   monomials with coefficients in the ring (exponents capped at 1 for
//!   multiplicatively idempotent rings, where polynomials are read as
//!   functions); [`Poly::optimized`] rebuilds a minimal balanced expression
//!   from it and [`Poly::equivalent`] compares normal forms. Identity checks
//!   elsewhere in the crate are stated in terms of `equivalent`.

#![forbid(unsafe_code)]
#![allow(missing_docs)] // heavily documented, but internal items stay permissive

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::ops::{Add, Index, Mul, Neg, Sub};
use std::sync::Arc;

use crate::ring::Ring;
use crate::symbol::{Var, VarError};

/// Errors surfaced by polynomial evaluation.
#[derive(Debug, thiserror::Error)]
pub enum PolyError {
    #[error("polynomial still references {var} after substitution")]
    StillSymbolic { var: Var },
}

// ============================================================================
// Expression nodes
// ============================================================================

/// One node of the expression DAG. `Arc` children are shared freely across
/// polynomials; nodes are never mutated after construction.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
#[serde(bound(serialize = "R: Serialize", deserialize = "R: Deserialize<'de>"))]
pub enum Expr<R: Ring> {
    /// A ring constant.
    Const(R),
    /// A symbolic variable.
    Var(Var),
    /// Sum of two subexpressions.
    Add(Arc<Expr<R>>, Arc<Expr<R>>),
    /// Product of two subexpressions.
    Mul(Arc<Expr<R>>, Arc<Expr<R>>),
    /// Additive inverse of a subexpression.
    Neg(Arc<Expr<R>>),
}

/// A multivariate polynomial over the ring `R`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(bound(serialize = "R: Serialize", deserialize = "R: Deserialize<'de>"))]
pub struct Poly<R: Ring> {
    node: Arc<Expr<R>>,
}

impl<R: Ring> Poly<R> {
    #[inline]
    fn wrap(e: Expr<R>) -> Self {
        Poly { node: Arc::new(e) }
    }

    /// The zero polynomial.
    pub fn zero() -> Self {
        Self::constant(R::zero())
    }

    /// The unit polynomial.
    pub fn one() -> Self {
        Self::constant(R::one())
    }

    /// A constant polynomial.
    pub fn constant(c: R) -> Self {
        Self::wrap(Expr::Const(c))
    }

    /// The polynomial consisting of a single variable.
    pub fn var(v: Var) -> Self {
        Self::wrap(Expr::Var(v))
    }

    /// The input variable `x_i` as a polynomial.
    pub fn input(lane: usize) -> Self {
        Self::var(Var::input(lane))
    }

    /// The state variable `s_t_j` as a polynomial.
    pub fn state(age: usize, lane: usize) -> Result<Self, VarError> {
        Ok(Self::var(Var::state(age, lane)?))
    }

    /// The auxiliary variable `a_k` as a polynomial.
    pub fn aux(id: usize) -> Self {
        Self::var(Var::aux(id))
    }

    /// The constant value, when this polynomial is a bare constant node.
    #[inline]
    pub fn as_constant(&self) -> Option<&R> {
        match &*self.node {
            Expr::Const(c) => Some(c),
            _ => None,
        }
    }

    #[inline]
    fn is_const_zero(&self) -> bool {
        self.as_constant().is_some_and(|c| c.is_zero())
    }

    #[inline]
    fn is_const_one(&self) -> bool {
        self.as_constant().is_some_and(|c| c.is_one())
    }

    // ------------------------------ Arithmetic ------------------------------

    /// Sum, with constant folding and `0 + p = p`.
    pub fn add_poly(&self, rhs: &Self) -> Self {
        if let (Some(a), Some(b)) = (self.as_constant(), rhs.as_constant()) {
            return Self::constant(a.add(b));
        }
        if self.is_const_zero() {
            return rhs.clone();
        }
        if rhs.is_const_zero() {
            return self.clone();
        }
        Self::wrap(Expr::Add(self.node.clone(), rhs.node.clone()))
    }

    /// Product, with constant folding, `0 · p = 0` and `1 · p = p`.
    pub fn mul_poly(&self, rhs: &Self) -> Self {
        if let (Some(a), Some(b)) = (self.as_constant(), rhs.as_constant()) {
            return Self::constant(a.mul(b));
        }
        if self.is_const_zero() || rhs.is_const_zero() {
            return Self::zero();
        }
        if self.is_const_one() {
            return rhs.clone();
        }
        if rhs.is_const_one() {
            return self.clone();
        }
        Self::wrap(Expr::Mul(self.node.clone(), rhs.node.clone()))
    }

    /// Additive inverse, folding constants and double negation.
    pub fn neg_poly(&self) -> Self {
        match &*self.node {
            Expr::Const(c) => Self::constant(c.neg()),
            Expr::Neg(inner) => Poly { node: inner.clone() },
            _ => Self::wrap(Expr::Neg(self.node.clone())),
        }
    }

    /// Difference.
    pub fn sub_poly(&self, rhs: &Self) -> Self {
        self.add_poly(&rhs.neg_poly())
    }

    /// Union operator `a + b − a·b` (evaluates to logical OR on `{0, 1}`
    /// valued arguments in any ring). The counter and case-folding gadgets
    /// are written with it.
    pub fn or(&self, rhs: &Self) -> Self {
        self.add_poly(rhs).sub_poly(&self.mul_poly(rhs))
    }

    /// Balanced sum of a sequence of polynomials. Keeps expression depth
    /// logarithmic in the term count, which matters for the wide sums the
    /// simplifier emits.
    pub fn balanced_sum(mut terms: Vec<Self>) -> Self {
        if terms.is_empty() {
            return Self::zero();
        }
        while terms.len() > 1 {
            let mut next = Vec::with_capacity(terms.len() / 2 + 1);
            let mut it = terms.drain(..);
            while let Some(a) = it.next() {
                match it.next() {
                    Some(b) => next.push(a.add_poly(&b)),
                    None => next.push(a),
                }
            }
            drop(it);
            terms = next;
        }
        terms.pop().expect("non-empty after reduction")
    }

    // ------------------------- Structure inspection -------------------------

    /// The set of variables referenced anywhere in the expression.
    pub fn variables(&self) -> BTreeSet<Var> {
        let mut out = BTreeSet::new();
        let mut seen: HashSet<*const Expr<R>> = HashSet::new();
        let mut stack: Vec<&Arc<Expr<R>>> = vec![&self.node];
        while let Some(node) = stack.pop() {
            if !seen.insert(Arc::as_ptr(node)) {
                continue;
            }
            match &**node {
                Expr::Const(_) => {}
                Expr::Var(v) => {
                    out.insert(*v);
                }
                Expr::Add(a, b) | Expr::Mul(a, b) => {
                    stack.push(a);
                    stack.push(b);
                }
                Expr::Neg(a) => stack.push(a),
            }
        }
        out
    }

    /// Number of distinct nodes in the expression DAG (shared subtrees are
    /// counted once — this is what an evaluator actually visits).
    pub fn circuit_size(&self) -> usize {
        let mut seen: HashSet<*const Expr<R>> = HashSet::new();
        let mut stack: Vec<&Arc<Expr<R>>> = vec![&self.node];
        while let Some(node) = stack.pop() {
            if !seen.insert(Arc::as_ptr(node)) {
                continue;
            }
            match &**node {
                Expr::Add(a, b) | Expr::Mul(a, b) => {
                    stack.push(a);
                    stack.push(b);
                }
                Expr::Neg(a) => stack.push(a),
                _ => {}
            }
        }
        seen.len()
    }

    /// Root node handle for lowering (`crate::codegen`).
    #[inline]
    pub(crate) fn root(&self) -> &Arc<Expr<R>> {
        &self.node
    }

    // ------------------------ Substitution / evaluation ------------------------

    /// Apply a substitution. Unbound variables are left in place; a fully
    /// bound polynomial collapses to a constant node through the smart
    /// constructors.
    pub fn bind(&self, subst: &Subst<R>) -> Self {
        let mut cache: HashMap<*const Expr<R>, Poly<R>> = HashMap::new();
        Self::bind_rec(&self.node, subst, &mut cache)
    }

    fn bind_rec(
        node: &Arc<Expr<R>>,
        subst: &Subst<R>,
        cache: &mut HashMap<*const Expr<R>, Poly<R>>,
    ) -> Poly<R> {
        let key = Arc::as_ptr(node);
        if let Some(hit) = cache.get(&key) {
            return hit.clone();
        }
        let out = match &**node {
            Expr::Const(_) => Poly { node: node.clone() },
            Expr::Var(v) => match subst.get(*v) {
                Some(p) => p.clone(),
                None => Poly { node: node.clone() },
            },
            Expr::Add(a, b) => {
                Self::bind_rec(a, subst, cache).add_poly(&Self::bind_rec(b, subst, cache))
            }
            Expr::Mul(a, b) => {
                Self::bind_rec(a, subst, cache).mul_poly(&Self::bind_rec(b, subst, cache))
            }
            Expr::Neg(a) => Self::bind_rec(a, subst, cache).neg_poly(),
        };
        cache.insert(key, out.clone());
        out
    }

    /// Collapse to a ring constant, or report the first free variable.
    ///
    /// Persisted expressions may arrive un-folded, so this re-folds through
    /// an empty substitution before deciding.
    pub fn evaluate(&self) -> Result<R, PolyError> {
        let folded = self.bind(&Subst::new());
        match folded.as_constant() {
            Some(c) => Ok(c.clone()),
            None => {
                let var = *folded
                    .variables()
                    .iter()
                    .next()
                    .expect("non-constant folded polynomial references a variable");
                Err(PolyError::StillSymbolic { var })
            }
        }
    }

    // ------------------------------ Simplification ------------------------------

    /// Expand into the canonical sum-of-monomials form.
    pub fn normal(&self) -> Normal<R> {
        let mut cache: HashMap<*const Expr<R>, Normal<R>> = HashMap::new();
        Self::normal_rec(&self.node, &mut cache)
    }

    fn normal_rec(
        node: &Arc<Expr<R>>,
        cache: &mut HashMap<*const Expr<R>, Normal<R>>,
    ) -> Normal<R> {
        let key = Arc::as_ptr(node);
        if let Some(hit) = cache.get(&key) {
            return hit.clone();
        }
        let out = match &**node {
            Expr::Const(c) => Normal::constant(c.clone()),
            Expr::Var(v) => Normal::var(*v),
            Expr::Add(a, b) => {
                let mut n = Self::normal_rec(a, cache);
                n.add_assign(&Self::normal_rec(b, cache));
                n
            }
            Expr::Mul(a, b) => Self::normal_rec(a, cache).mul(&Self::normal_rec(b, cache)),
            Expr::Neg(a) => Self::normal_rec(a, cache).neg(),
        };
        cache.insert(key, out.clone());
        out
    }

    /// A semantically equal polynomial rebuilt from the normal form:
    /// deduplicated monomials, dropped zero terms, balanced sum shape.
    pub fn optimized(&self) -> Self {
        let normal = self.normal();
        let mut terms = Vec::with_capacity(normal.terms.len());
        for (mono, coeff) in &normal.terms {
            let mut factors: Vec<Poly<R>> = Vec::new();
            if !coeff.is_one() || mono.0.is_empty() {
                factors.push(Self::constant(coeff.clone()));
            }
            for (v, e) in &mono.0 {
                for _ in 0..*e {
                    factors.push(Self::var(*v));
                }
            }
            let term = factors
                .into_iter()
                .reduce(|a, b| a.mul_poly(&b))
                .expect("every monomial yields at least one factor");
            terms.push(term);
        }
        Self::balanced_sum(terms)
    }

    /// Semantic equality via normal forms.
    pub fn equivalent(&self, other: &Self) -> bool {
        self.normal() == other.normal()
    }
}

impl<R: Ring> Add for &Poly<R> {
    type Output = Poly<R>;
    fn add(self, rhs: Self) -> Poly<R> {
        self.add_poly(rhs)
    }
}
impl<R: Ring> Sub for &Poly<R> {
    type Output = Poly<R>;
    fn sub(self, rhs: Self) -> Poly<R> {
        self.sub_poly(rhs)
    }
}
impl<R: Ring> Mul for &Poly<R> {
    type Output = Poly<R>;
    fn mul(self, rhs: Self) -> Poly<R> {
        self.mul_poly(rhs)
    }
}
impl<R: Ring> Neg for &Poly<R> {
    type Output = Poly<R>;
    fn neg(self) -> Poly<R> {
        self.neg_poly()
    }
}

impl<R: Ring> fmt::Display for Poly<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn go<R: Ring>(e: &Expr<R>, f: &mut fmt::Formatter<'_>, in_product: bool) -> fmt::Result {
            match e {
                Expr::Const(c) => write!(f, "{c}"),
                Expr::Var(v) => write!(f, "{v}"),
                Expr::Add(a, b) => {
                    if in_product {
                        write!(f, "(")?;
                    }
                    go(a, f, false)?;
                    write!(f, " + ")?;
                    go(b, f, false)?;
                    if in_product {
                        write!(f, ")")?;
                    }
                    Ok(())
                }
                Expr::Mul(a, b) => {
                    go(a, f, true)?;
                    write!(f, "*")?;
                    go(b, f, true)
                }
                Expr::Neg(a) => {
                    write!(f, "-")?;
                    go(a, f, true)
                }
            }
        }
        go(&self.node, f, false)
    }
}

// ============================================================================
// Canonical normal form
// ============================================================================

/// A monomial: variables with positive exponents, sorted by variable.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Monomial(Vec<(Var, u32)>);

impl Monomial {
    fn unit() -> Self {
        Monomial(Vec::new())
    }

    fn var(v: Var) -> Self {
        Monomial(vec![(v, 1)])
    }

    /// Merge-multiply two sorted exponent lists; `cap` limits exponents to 1
    /// (multiplicatively idempotent rings).
    fn mul(&self, rhs: &Self, cap: bool) -> Self {
        let mut out = Vec::with_capacity(self.0.len() + rhs.0.len());
        let (mut i, mut j) = (0, 0);
        while i < self.0.len() && j < rhs.0.len() {
            match self.0[i].0.cmp(&rhs.0[j].0) {
                std::cmp::Ordering::Less => {
                    out.push(self.0[i]);
                    i += 1;
                }
                std::cmp::Ordering::Greater => {
                    out.push(rhs.0[j]);
                    j += 1;
                }
                std::cmp::Ordering::Equal => {
                    let e = self.0[i].1 + rhs.0[j].1;
                    out.push((self.0[i].0, if cap { 1 } else { e }));
                    i += 1;
                    j += 1;
                }
            }
        }
        out.extend_from_slice(&self.0[i..]);
        out.extend_from_slice(&rhs.0[j..]);
        Monomial(out)
    }
}

/// Canonical sum of monomials with nonzero ring coefficients.
#[derive(Clone, Debug, PartialEq)]
pub struct Normal<R: Ring> {
    terms: BTreeMap<Monomial, R>,
}

impl<R: Ring> Normal<R> {
    fn constant(c: R) -> Self {
        let mut terms = BTreeMap::new();
        if !c.is_zero() {
            terms.insert(Monomial::unit(), c);
        }
        Normal { terms }
    }

    fn var(v: Var) -> Self {
        let mut terms = BTreeMap::new();
        terms.insert(Monomial::var(v), R::one());
        Normal { terms }
    }

    fn add_term(&mut self, mono: Monomial, coeff: R) {
        if coeff.is_zero() {
            return;
        }
        match self.terms.entry(mono) {
            std::collections::btree_map::Entry::Vacant(e) => {
                e.insert(coeff);
            }
            std::collections::btree_map::Entry::Occupied(mut e) => {
                let sum = e.get().add(&coeff);
                if sum.is_zero() {
                    e.remove();
                } else {
                    e.insert(sum);
                }
            }
        }
    }

    fn add_assign(&mut self, rhs: &Self) {
        for (mono, coeff) in &rhs.terms {
            self.add_term(mono.clone(), coeff.clone());
        }
    }

    fn neg(&self) -> Self {
        let terms = self
            .terms
            .iter()
            .map(|(m, c)| (m.clone(), c.neg()))
            .collect();
        Normal { terms }
    }

    fn mul(&self, rhs: &Self) -> Self {
        let mut out = Normal { terms: BTreeMap::new() };
        for (ma, ca) in &self.terms {
            for (mb, cb) in &rhs.terms {
                out.add_term(ma.mul(mb, R::MUL_IDEMPOTENT), ca.mul(cb));
            }
        }
        out
    }

    /// Number of monomials.
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    /// True for the zero polynomial.
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

// ============================================================================
// Substitution maps
// ============================================================================

/// Dense substitution map, keyed by variable structure.
///
/// Inputs index by lane, states by `(age, lane)`; auxiliary variables use a
/// side table (they only occur in self-checks). Built once per transition
/// step or per symbolic rewrite.
#[derive(Clone, Debug)]
pub struct Subst<R: Ring> {
    inputs: Vec<Option<Poly<R>>>,
    states: Vec<Vec<Option<Poly<R>>>>,
    aux: BTreeMap<usize, Poly<R>>,
}

impl<R: Ring> Subst<R> {
    /// Empty substitution.
    pub fn new() -> Self {
        Subst { inputs: Vec::new(), states: Vec::new(), aux: BTreeMap::new() }
    }

    /// Bind `x_lane` to a polynomial.
    pub fn bind_input(&mut self, lane: usize, value: Poly<R>) {
        if self.inputs.len() <= lane {
            self.inputs.resize(lane + 1, None);
        }
        self.inputs[lane] = Some(value);
    }

    /// Bind `s_age_lane` to a polynomial (`age ≥ 1`).
    pub fn bind_state(&mut self, age: usize, lane: usize, value: Poly<R>) -> Result<(), VarError> {
        if age < 1 {
            return Err(VarError::OutOfRange { age });
        }
        let row = age - 1;
        if self.states.len() <= row {
            self.states.resize(row + 1, Vec::new());
        }
        if self.states[row].len() <= lane {
            self.states[row].resize(lane + 1, None);
        }
        self.states[row][lane] = Some(value);
        Ok(())
    }

    /// Bind the auxiliary variable `a_id`.
    pub fn bind_aux(&mut self, id: usize, value: Poly<R>) {
        self.aux.insert(id, value);
    }

    /// Look up the binding for a variable.
    pub fn get(&self, v: Var) -> Option<&Poly<R>> {
        match v {
            Var::In { lane } => self.inputs.get(lane)?.as_ref(),
            Var::St { age, lane } => self.states.get(age - 1)?.get(lane)?.as_ref(),
            Var::Aux { id } => self.aux.get(&id),
        }
    }
}

impl<R: Ring> Default for Subst<R> {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Polynomial vectors
// ============================================================================

/// A fixed-dimension vector of polynomials — the type of transition
/// functions, evaluation-driver outputs and history entries.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(bound(serialize = "R: Serialize", deserialize = "R: Deserialize<'de>"))]
pub struct PolyVec<R: Ring> {
    components: Vec<Poly<R>>,
}

impl<R: Ring> PolyVec<R> {
    /// Wrap a component list.
    pub fn new(components: Vec<Poly<R>>) -> Self {
        PolyVec { components }
    }

    /// The zero vector of the given dimension.
    pub fn zero(dim: usize) -> Self {
        PolyVec { components: vec![Poly::zero(); dim] }
    }

    /// The input-variable block `(x_0, …, x_{dim−1})`.
    pub fn inputs(dim: usize) -> Self {
        (0..dim).map(Poly::input).collect()
    }

    /// The state-variable block `(s_age_offset, …, s_age_{offset+dim−1})`.
    pub fn states(age: usize, offset: usize, dim: usize) -> Result<Self, VarError> {
        (0..dim).map(|j| Poly::state(age, offset + j)).collect()
    }

    /// The auxiliary block `(a_base, …, a_{base+dim−1})`.
    pub fn auxs(base: usize, dim: usize) -> Self {
        (0..dim).map(|k| Poly::aux(base + k)).collect()
    }

    /// Lift ring scalars into constant polynomials.
    pub fn from_scalars(values: &[R]) -> Self {
        values.iter().cloned().map(Poly::constant).collect()
    }

    /// Vector dimension.
    #[inline]
    pub fn dimension(&self) -> usize {
        self.components.len()
    }

    /// Component iterator.
    pub fn iter(&self) -> std::slice::Iter<'_, Poly<R>> {
        self.components.iter()
    }

    /// Concatenation (`self` in the low lanes, `rhs` above it).
    pub fn concat(&self, rhs: &Self) -> Self {
        let mut components = self.components.clone();
        components.extend(rhs.components.iter().cloned());
        PolyVec { components }
    }

    /// Componentwise product (the pairing the nonlinear constructions use).
    pub fn hadamard(&self, rhs: &Self) -> Self {
        assert_eq!(
            self.dimension(),
            rhs.dimension(),
            "componentwise product requires equal dimensions"
        );
        self.iter().zip(rhs.iter()).map(|(a, b)| a * b).collect()
    }

    /// Lane-wise sum.
    pub fn add(&self, rhs: &Self) -> Self {
        assert_eq!(self.dimension(), rhs.dimension(), "vector sum requires equal dimensions");
        self.iter().zip(rhs.iter()).map(|(a, b)| a + b).collect()
    }

    /// Lane-wise difference.
    pub fn sub(&self, rhs: &Self) -> Self {
        assert_eq!(
            self.dimension(),
            rhs.dimension(),
            "vector difference requires equal dimensions"
        );
        self.iter().zip(rhs.iter()).map(|(a, b)| a - b).collect()
    }

    /// Apply a substitution to every component.
    pub fn bind(&self, subst: &Subst<R>) -> Self {
        self.iter().map(|p| p.bind(subst)).collect()
    }

    /// Simplify every component.
    pub fn optimized(&self) -> Self {
        self.iter().map(Poly::optimized).collect()
    }

    /// Union of the variables of all components.
    pub fn variables(&self) -> BTreeSet<Var> {
        let mut out = BTreeSet::new();
        for p in self.iter() {
            out.extend(p.variables());
        }
        out
    }

    /// Total DAG node count across components.
    pub fn circuit_size(&self) -> usize {
        self.iter().map(Poly::circuit_size).sum()
    }

    /// Collapse every component to a ring constant.
    pub fn to_scalars(&self) -> Result<Vec<R>, PolyError> {
        self.iter().map(Poly::evaluate).collect()
    }

    /// Componentwise semantic equality.
    pub fn equivalent(&self, rhs: &Self) -> bool {
        self.dimension() == rhs.dimension()
            && self.iter().zip(rhs.iter()).all(|(a, b)| a.equivalent(b))
    }
}

impl<R: Ring> Index<usize> for PolyVec<R> {
    type Output = Poly<R>;
    fn index(&self, i: usize) -> &Poly<R> {
        &self.components[i]
    }
}

impl<R: Ring> FromIterator<Poly<R>> for PolyVec<R> {
    fn from_iter<I: IntoIterator<Item = Poly<R>>>(iter: I) -> Self {
        PolyVec { components: iter.into_iter().collect() }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ring::{Bit, Gf256};

    fn x(i: usize) -> Poly<Bit> {
        Poly::input(i)
    }

    #[test]
    fn construction_folds_constants() {
        let p = Poly::<Gf256>::constant(Gf256(3)).add_poly(&Poly::constant(Gf256(5)));
        assert_eq!(p.as_constant(), Some(&Gf256(6)));

        let q = &Poly::<Gf256>::zero() + &Poly::input(0);
        assert_eq!(q, Poly::input(0));
        let r = &Poly::<Gf256>::one() * &Poly::input(1);
        assert_eq!(r, Poly::input(1));
        let z = &Poly::<Gf256>::zero() * &Poly::input(2);
        assert!(z.is_const_zero());
    }

    #[test]
    fn bind_collapses_to_constant() {
        let p = &(&x(0) * &x(1)) + &Poly::state(1, 0).unwrap();
        let mut s = Subst::new();
        s.bind_input(0, Poly::constant(Bit(true)));
        s.bind_input(1, Poly::constant(Bit(true)));
        s.bind_state(1, 0, Poly::constant(Bit(true))).unwrap();
        assert_eq!(p.bind(&s).evaluate().unwrap(), Bit(false)); // 1·1 + 1 = 0

        // Partially bound stays symbolic and reports the free variable.
        let mut partial = Subst::new();
        partial.bind_input(0, Poly::constant(Bit(true)));
        let err = p.bind(&partial).evaluate().unwrap_err();
        let PolyError::StillSymbolic { var } = err;
        assert_eq!(var, Var::input(1));
    }

    #[test]
    fn idempotent_square_collapses() {
        // (x0 + x1)^2 = x0 + x1 over GF(2): cross terms cancel, squares cap.
        let sum = &x(0) + &x(1);
        let square = &sum * &sum;
        assert!(square.equivalent(&sum));
        assert_eq!(square.optimized(), sum.optimized());
    }

    #[test]
    fn optimized_preserves_meaning_and_shrinks() {
        // x0·x1 + x0·x1 + x2 = x2 over GF(2).
        let t = &x(0) * &x(1);
        let p = &(&t + &t) + &x(2);
        let o = p.optimized();
        assert!(o.equivalent(&x(2)));
        assert!(o.circuit_size() <= p.circuit_size());
    }

    #[test]
    fn or_truth_table() {
        let (zero, one) = (Poly::<Bit>::zero(), Poly::<Bit>::one());
        assert_eq!(zero.or(&zero).evaluate().unwrap(), Bit(false));
        assert_eq!(zero.or(&one).evaluate().unwrap(), Bit(true));
        assert_eq!(one.or(&zero).evaluate().unwrap(), Bit(true));
        assert_eq!(one.or(&one).evaluate().unwrap(), Bit(true));
    }

    #[test]
    fn nonidempotent_ring_keeps_exponents() {
        let p: Poly<Gf256> = Poly::input(0);
        let square = &p * &p;
        assert!(!square.equivalent(&p));
    }

    #[test]
    fn vector_concat_and_hadamard() {
        let a: PolyVec<Bit> = PolyVec::inputs(2);
        let b = PolyVec::states(1, 0, 2).unwrap();
        let c = a.concat(&b);
        assert_eq!(c.dimension(), 4);
        assert_eq!(c[2], Poly::state(1, 0).unwrap());

        let h = a.hadamard(&b);
        assert_eq!(h[0], &Poly::input(0) * &Poly::state(1, 0).unwrap());
    }

    #[test]
    fn serde_round_trip() {
        let p = &(&x(0) * &Poly::state(2, 1).unwrap()) + &Poly::constant(Bit(true));
        let blob = serde_json::to_vec(&p).unwrap();
        let back: Poly<Bit> = serde_json::from_slice(&blob).unwrap();
        assert!(back.equivalent(&p));
    }

    #[test]
    fn display_renders_names() {
        let p = &(&x(0) + &x(1)) * &Poly::state(1, 2).unwrap();
        assert_eq!(p.to_string(), "(x_0 + x_1)*s_1_2");
    }
}
