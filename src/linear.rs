//! Matrices over ring scalars
//!
//! Dense row-major matrices over a [`Ring`], sized for the block dimensions
//! this crate works at (tens of lanes, not thousands). Everything the
//! automaton layer needs from linear algebra lives here:
//!
//! - random generation, exact-rank generation, inverse-pair generation;
//! - row-slice reads and writes (the delayed-inverse construction rewrites
//!   individual block rows);
//! - [`Matrix::echelon_with`] — the key primitive: in-place reduced row
//!   echelon on `self` while the **same** elementary row operations are
//!   applied to a set of companion matrices, with the accumulated transform
//!   returned (left-multiplying the original matrix by the transform yields
//!   the echelon form);
//! - inversion, expressed as "echelon to the identity, keep the transform".
//!
//! Polynomial-entry matrices are deliberately absent: every matrix-by-
//! polynomial product in the system is a scalar matrix applied to a
//! polynomial vector, which [`Matrix::apply`] covers.
//!
//! Dimension mismatches are programming errors and assert; only unit-ness is
//! data-dependent, so [`Matrix::inverse`] returns an `Option`.

#![forbid(unsafe_code)]
#![allow(missing_docs)]

use rand::Rng;

use crate::poly::{Poly, PolyVec};
use crate::ring::Ring;

/// Dense row-major matrix over ring scalars.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Matrix<R: Ring> {
    rows: usize,
    cols: usize,
    data: Vec<R>,
}

impl<R: Ring> Matrix<R> {
    // ------------------------------ Constructors ------------------------------

    /// The zero matrix.
    pub fn zero(rows: usize, cols: usize) -> Self {
        Matrix { rows, cols, data: vec![R::zero(); rows * cols] }
    }

    /// The `n × n` identity.
    pub fn unit(n: usize) -> Self {
        let mut m = Self::zero(n, n);
        for i in 0..n {
            m.set(i, i, R::one());
        }
        m
    }

    /// Square matrix with the given diagonal.
    pub fn diagonal(entries: Vec<R>) -> Self {
        let n = entries.len();
        let mut m = Self::zero(n, n);
        for (i, e) in entries.into_iter().enumerate() {
            m.set(i, i, e);
        }
        m
    }

    /// Build from explicit rows (all rows must share a length).
    pub fn from_rows(rows: Vec<Vec<R>>) -> Self {
        let n_rows = rows.len();
        let n_cols = rows.first().map_or(0, Vec::len);
        let mut data = Vec::with_capacity(n_rows * n_cols);
        for row in rows {
            assert_eq!(row.len(), n_cols, "ragged rows");
            data.extend(row);
        }
        Matrix { rows: n_rows, cols: n_cols, data }
    }

    /// Uniformly random matrix.
    pub fn random<G: Rng + ?Sized>(rows: usize, cols: usize, rng: &mut G) -> Self {
        Matrix {
            rows,
            cols,
            data: (0..rows * cols).map(|_| R::random(rng)).collect(),
        }
    }

    /// Random invertible square matrix, by rejection. Intended for rings
    /// where most nonzero elements are units (fields); over GF(2) roughly a
    /// third of all square matrices qualify, independent of size.
    pub fn random_invertible<G: Rng + ?Sized>(n: usize, rng: &mut G) -> Self {
        loop {
            let m = Self::random(n, n, rng);
            if m.inverse().is_some() {
                return m;
            }
        }
    }

    /// A random invertible matrix together with its inverse.
    pub fn random_inverse_pair<G: Rng + ?Sized>(n: usize, rng: &mut G) -> (Self, Self) {
        loop {
            let m = Self::random(n, n, rng);
            if let Some(inv) = m.inverse() {
                return (m, inv);
            }
        }
    }

    /// Random `n × n` matrix of rank **exactly** `rank`: `P · (I_r ⊕ 0) · Q`
    /// with `P`, `Q` random invertible.
    pub fn random_rank<G: Rng + ?Sized>(n: usize, rank: usize, rng: &mut G) -> Self {
        assert!(rank <= n, "rank cannot exceed dimension");
        let p = Self::random_invertible(n, rng);
        let q = Self::random_invertible(n, rng);
        let mut d = Self::zero(n, n);
        for i in 0..rank {
            d.set(i, i, R::one());
        }
        p.mul(&d).mul(&q)
    }

    // ------------------------------ Element access ------------------------------

    /// Row count.
    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Column count.
    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Entry at `(r, c)`.
    #[inline]
    pub fn get(&self, r: usize, c: usize) -> &R {
        &self.data[r * self.cols + c]
    }

    /// Overwrite the entry at `(r, c)`.
    #[inline]
    pub fn set(&mut self, r: usize, c: usize, v: R) {
        self.data[r * self.cols + c] = v;
    }

    /// Read row `r` as a slice.
    #[inline]
    pub fn row(&self, r: usize) -> &[R] {
        &self.data[r * self.cols..(r + 1) * self.cols]
    }

    /// Overwrite row `r`.
    pub fn set_row(&mut self, r: usize, values: &[R]) {
        assert_eq!(values.len(), self.cols, "row width mismatch");
        self.data[r * self.cols..(r + 1) * self.cols].clone_from_slice(values);
    }

    /// True when row `r` is all zeros.
    pub fn row_is_zero(&self, r: usize) -> bool {
        self.row(r).iter().all(R::is_zero)
    }

    /// Replace row `r` of `self` with row `r` of `other`.
    pub fn copy_row_from(&mut self, r: usize, other: &Self) {
        assert_eq!(self.cols, other.cols, "row width mismatch");
        let row: Vec<R> = other.row(r).to_vec();
        self.set_row(r, &row);
    }

    /// Zero out row `r`.
    pub fn zero_row(&mut self, r: usize) {
        for c in 0..self.cols {
            self.set(r, c, R::zero());
        }
    }

    // ------------------------------ Predicates ------------------------------

    /// All entries zero.
    pub fn is_zero(&self) -> bool {
        self.data.iter().all(R::is_zero)
    }

    /// Square identity check.
    pub fn is_unit(&self) -> bool {
        self.rows == self.cols
            && (0..self.rows).all(|r| {
                (0..self.cols).all(|c| {
                    let e = self.get(r, c);
                    if r == c {
                        e.is_one()
                    } else {
                        e.is_zero()
                    }
                })
            })
    }

    // ------------------------------ Arithmetic ------------------------------

    /// Matrix sum.
    pub fn add(&self, rhs: &Self) -> Self {
        assert_eq!((self.rows, self.cols), (rhs.rows, rhs.cols), "sum shape mismatch");
        Matrix {
            rows: self.rows,
            cols: self.cols,
            data: self
                .data
                .iter()
                .zip(rhs.data.iter())
                .map(|(a, b)| a.add(b))
                .collect(),
        }
    }

    /// Matrix product.
    pub fn mul(&self, rhs: &Self) -> Self {
        assert_eq!(self.cols, rhs.rows, "product shape mismatch");
        let mut out = Self::zero(self.rows, rhs.cols);
        for r in 0..self.rows {
            for k in 0..self.cols {
                let a = self.get(r, k);
                if a.is_zero() {
                    continue;
                }
                for c in 0..rhs.cols {
                    let prod = a.mul(rhs.get(k, c));
                    out.set(r, c, out.get(r, c).add(&prod));
                }
            }
        }
        out
    }

    /// Matrix–vector product over scalars.
    pub fn mul_vec(&self, v: &[R]) -> Vec<R> {
        assert_eq!(self.cols, v.len(), "vector length mismatch");
        (0..self.rows)
            .map(|r| {
                let mut acc = R::zero();
                for c in 0..self.cols {
                    acc = acc.add(&self.get(r, c).mul(&v[c]));
                }
                acc
            })
            .collect()
    }

    /// Apply to a polynomial vector: `(self · v)[r] = Σ_c self[r,c] · v[c]`.
    pub fn apply(&self, v: &PolyVec<R>) -> PolyVec<R> {
        assert_eq!(self.cols, v.dimension(), "vector dimension mismatch");
        (0..self.rows)
            .map(|r| {
                let mut acc = Poly::zero();
                for c in 0..self.cols {
                    let coeff = self.get(r, c);
                    if coeff.is_zero() {
                        continue;
                    }
                    let term = if coeff.is_one() {
                        v[c].clone()
                    } else {
                        &Poly::constant(coeff.clone()) * &v[c]
                    };
                    acc = &acc + &term;
                }
                acc
            })
            .collect()
    }

    // ------------------------------ Row reduction ------------------------------

    /// Reduce `self` to reduced row echelon form in place, applying the same
    /// elementary row operations (swap, unit scaling, row subtraction) to
    /// every companion, and return the accumulated transform `pu` with
    /// `pu · self_before = self_after`.
    ///
    /// Pivots are the first rows carrying a *unit* entry in the current
    /// column; rows without pivots end up zero at the bottom (over fields).
    /// Companions must have the same row count as `self`.
    pub fn echelon_with(&mut self, companions: &mut [&mut Matrix<R>]) -> Matrix<R> {
        for c in companions.iter() {
            assert_eq!(c.rows, self.rows, "companion row count mismatch");
        }
        let mut pu = Self::unit(self.rows);
        let mut lead = 0usize;
        for col in 0..self.cols {
            if lead >= self.rows {
                break;
            }
            let Some(pivot) =
                (lead..self.rows).find(|&r| self.get(r, col).inverse().is_some())
            else {
                continue;
            };
            if pivot != lead {
                self.swap_rows(pivot, lead);
                for c in companions.iter_mut() {
                    c.swap_rows(pivot, lead);
                }
                pu.swap_rows(pivot, lead);
            }
            let inv = self.get(lead, col).inverse().expect("pivot entry is a unit");
            if !inv.is_one() {
                self.scale_row(lead, &inv);
                for c in companions.iter_mut() {
                    c.scale_row(lead, &inv);
                }
                pu.scale_row(lead, &inv);
            }
            for r in 0..self.rows {
                if r == lead {
                    continue;
                }
                let factor = self.get(r, col).clone();
                if factor.is_zero() {
                    continue;
                }
                let neg = factor.neg();
                self.add_scaled_row(r, lead, &neg);
                for c in companions.iter_mut() {
                    c.add_scaled_row(r, lead, &neg);
                }
                pu.add_scaled_row(r, lead, &neg);
            }
            lead += 1;
        }
        pu
    }

    /// Inverse, via echelon-to-identity. `None` when `self` is singular.
    pub fn inverse(&self) -> Option<Self> {
        assert_eq!(self.rows, self.cols, "inverse of a non-square matrix");
        let mut work = self.clone();
        let pu = work.echelon_with(&mut []);
        work.is_unit().then_some(pu)
    }

    /// Rank (number of pivot rows after reduction).
    pub fn rank(&self) -> usize {
        let mut work = self.clone();
        let _ = work.echelon_with(&mut []);
        (0..work.rows).filter(|&r| !work.row_is_zero(r)).count()
    }

    // ------------------------------ Row operations ------------------------------

    fn swap_rows(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        for c in 0..self.cols {
            self.data.swap(a * self.cols + c, b * self.cols + c);
        }
    }

    fn scale_row(&mut self, r: usize, factor: &R) {
        for c in 0..self.cols {
            let v = self.get(r, c).mul(factor);
            self.set(r, c, v);
        }
    }

    /// `row[dst] += factor · row[src]`.
    fn add_scaled_row(&mut self, dst: usize, src: usize, factor: &R) {
        let src_row: Vec<R> = self.row(src).to_vec();
        for c in 0..self.cols {
            let v = self.get(dst, c).add(&src_row[c].mul(factor));
            self.set(dst, c, v);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ring::{Bit, Gf256};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn inverse_law_gf256() {
        let mut rng = StdRng::seed_from_u64(3);
        for n in 1..=5 {
            let (m, inv) = Matrix::<Gf256>::random_inverse_pair(n, &mut rng);
            assert!(m.mul(&inv).is_unit());
            assert!(inv.mul(&m).is_unit());
        }
    }

    #[test]
    fn inverse_law_gf2() {
        let mut rng = StdRng::seed_from_u64(4);
        let (m, inv) = Matrix::<Bit>::random_inverse_pair(8, &mut rng);
        assert!(m.mul(&inv).is_unit());
    }

    #[test]
    fn echelon_transform_is_consistent() {
        let mut rng = StdRng::seed_from_u64(5);
        let original = Matrix::<Gf256>::random(6, 6, &mut rng);
        let mut reduced = original.clone();
        let pu = reduced.echelon_with(&mut []);
        assert_eq!(pu.mul(&original), reduced);
    }

    #[test]
    fn companions_follow_the_same_row_ops() {
        let mut rng = StdRng::seed_from_u64(6);
        let original = Matrix::<Bit>::random(8, 8, &mut rng);
        let side_a = Matrix::<Bit>::random(8, 8, &mut rng);
        let side_b = Matrix::<Bit>::random(8, 5, &mut rng);

        let mut reduced = original.clone();
        let mut ca = side_a.clone();
        let mut cb = side_b.clone();
        let pu = reduced.echelon_with(&mut [&mut ca, &mut cb]);

        // Same ops ⇔ left multiplication by the accumulated transform.
        assert_eq!(pu.mul(&side_a), ca);
        assert_eq!(pu.mul(&side_b), cb);
        assert_eq!(pu.mul(&original), reduced);
    }

    #[test]
    fn rank_exact_generation() {
        let mut rng = StdRng::seed_from_u64(7);
        for rank in 0..=8usize {
            let m = Matrix::<Bit>::random_rank(8, rank, &mut rng);
            assert_eq!(m.rank(), rank, "requested rank {rank}");
        }
        let m = Matrix::<Gf256>::random_rank(4, 3, &mut rng);
        assert_eq!(m.rank(), 3);
    }

    #[test]
    fn singular_matrix_has_no_inverse() {
        let m = Matrix::<Gf256>::zero(3, 3);
        assert!(m.inverse().is_none());
        let mut rng = StdRng::seed_from_u64(8);
        let m = Matrix::<Gf256>::random_rank(4, 2, &mut rng);
        assert!(m.inverse().is_none());
    }

    #[test]
    fn apply_matches_scalar_product() {
        let mut rng = StdRng::seed_from_u64(9);
        let m = Matrix::<Gf256>::random(3, 4, &mut rng);
        let scalars: Vec<Gf256> = (0..4).map(|_| crate::ring::Ring::random(&mut rng)).collect();
        let v = PolyVec::from_scalars(&scalars);
        let applied = m.apply(&v).to_scalars().unwrap();
        assert_eq!(applied, m.mul_vec(&scalars));
    }

    #[test]
    fn row_slice_ops() {
        let mut m = Matrix::<Gf256>::unit(3);
        assert!(!m.row_is_zero(1));
        m.zero_row(1);
        assert!(m.row_is_zero(1));
        let other = Matrix::<Gf256>::diagonal(vec![Gf256(5), Gf256(6), Gf256(7)]);
        m.copy_row_from(1, &other);
        assert_eq!(m.get(1, 1), &Gf256(6));
    }
}
