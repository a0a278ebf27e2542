//! Base-ring algebra
//!
//! Scalar arithmetic for everything in this crate is abstracted behind the
//! [`Ring`] capability trait: zero/one, ring operations, unit inversion and
//! random sampling. Polynomials, matrices and automata are generic over it,
//! so each ring choice yields its own type family (`Poly<R>`, `Matrix<R>`,
//! `Automaton<R>`).
//!
//! Shipped rings:
//!
//! - [`Bit`] — the two-element Boolean ring GF(2). Addition is XOR,
//!   multiplication is AND; the byte-stream scenarios run here.
//! - [`Gf256`] — the Rijndael field GF(2⁸) with reduction polynomial
//!   `x⁸ + x⁴ + x³ + x + 1` (0x11b).
//! - [`Fp`] — an adapter making any `ark_ff::Field` usable as a base ring
//!   (feature `prime-rings`, on by default).
//!
//! Symbolic variables are **not** a ring capability here: they belong to the
//! polynomial layer (`crate::poly`), which keeps scalar rings plain data.

#![forbid(unsafe_code)]
#![allow(missing_docs)]

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Capability set required of a base ring.
///
/// `Eq` gives `is_zero`/`is_one` sane defaults; rings with cheaper checks
/// may override them. `inverse` returns `None` on non-units, which is how
/// row reduction discovers unusable pivots.
pub trait Ring: Clone + Eq + fmt::Debug + fmt::Display + 'static {
    /// True when `x · x = x` holds for every element (GF(2)). The polynomial
    /// normal form caps exponents at 1 for such rings, because polynomials
    /// are interpreted as functions on the ring.
    const MUL_IDEMPOTENT: bool = false;

    /// Additive identity.
    fn zero() -> Self;
    /// Multiplicative identity.
    fn one() -> Self;

    /// Ring addition.
    fn add(&self, rhs: &Self) -> Self;
    /// Additive inverse.
    fn neg(&self) -> Self;
    /// Ring multiplication.
    fn mul(&self, rhs: &Self) -> Self;
    /// Multiplicative inverse, `None` for non-units (always `None` at zero).
    fn inverse(&self) -> Option<Self>;

    /// Uniformly random element.
    fn random<G: Rng + ?Sized>(rng: &mut G) -> Self;

    /// Ring subtraction.
    #[inline]
    fn sub(&self, rhs: &Self) -> Self {
        self.add(&rhs.neg())
    }

    /// `self == 0`.
    #[inline]
    fn is_zero(&self) -> bool {
        *self == Self::zero()
    }

    /// `self == 1`.
    #[inline]
    fn is_one(&self) -> bool {
        *self == Self::one()
    }
}

// ============================================================================
// GF(2) — the two-element Boolean ring
// ============================================================================

/// An element of GF(2). Addition is XOR, multiplication is AND, negation is
/// the identity (characteristic 2).
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Bit(pub bool);

impl Bit {
    /// Unpack a byte into 8 bits, LSB first: lane `i` carries the `2^i` bit.
    ///
    /// This is the process-boundary convention for byte streams; it matches
    /// the lowercase-automaton bit algebra (`0x20` lives in lane 5).
    #[inline]
    pub fn unpack(byte: u8) -> [Bit; 8] {
        std::array::from_fn(|i| Bit(byte >> i & 1 == 1))
    }

    /// Pack LSB-first bits back into a byte. `None` when more than 8 lanes
    /// are supplied; missing high lanes read as zero.
    pub fn pack(bits: &[Bit]) -> Option<u8> {
        if bits.len() > 8 {
            return None;
        }
        let mut byte = 0u8;
        for (i, b) in bits.iter().enumerate() {
            if b.0 {
                byte |= 1 << i;
            }
        }
        Some(byte)
    }
}

impl fmt::Display for Bit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", u8::from(self.0))
    }
}

impl Ring for Bit {
    const MUL_IDEMPOTENT: bool = true;

    #[inline]
    fn zero() -> Self {
        Bit(false)
    }
    #[inline]
    fn one() -> Self {
        Bit(true)
    }
    #[inline]
    fn add(&self, rhs: &Self) -> Self {
        Bit(self.0 ^ rhs.0)
    }
    #[inline]
    fn neg(&self) -> Self {
        *self
    }
    #[inline]
    fn mul(&self, rhs: &Self) -> Self {
        Bit(self.0 & rhs.0)
    }
    #[inline]
    fn inverse(&self) -> Option<Self> {
        self.0.then_some(Bit(true))
    }
    #[inline]
    fn random<G: Rng + ?Sized>(rng: &mut G) -> Self {
        Bit(rng.gen())
    }
}

// ============================================================================
// GF(2^8) — the Rijndael field
// ============================================================================

/// An element of GF(2⁸) under the Rijndael reduction polynomial
/// `x⁸ + x⁴ + x³ + x + 1`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Gf256(pub u8);

impl Gf256 {
    /// Carry-less multiply-and-reduce (Russian-peasant form).
    fn mul_reduce(mut a: u8, mut b: u8) -> u8 {
        let mut acc = 0u8;
        while b != 0 {
            if b & 1 == 1 {
                acc ^= a;
            }
            let carry = a & 0x80 != 0;
            a <<= 1;
            if carry {
                a ^= 0x1b; // x^8 ≡ x^4 + x^3 + x + 1
            }
            b >>= 1;
        }
        acc
    }

    /// `self^e` by square-and-multiply.
    fn pow(self, mut e: u32) -> Self {
        let mut acc = Gf256(1);
        let mut base = self;
        while e > 0 {
            if e & 1 == 1 {
                acc = Gf256(Self::mul_reduce(acc.0, base.0));
            }
            base = Gf256(Self::mul_reduce(base.0, base.0));
            e >>= 1;
        }
        acc
    }
}

impl fmt::Display for Gf256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02x}", self.0)
    }
}

impl Ring for Gf256 {
    #[inline]
    fn zero() -> Self {
        Gf256(0)
    }
    #[inline]
    fn one() -> Self {
        Gf256(1)
    }
    #[inline]
    fn add(&self, rhs: &Self) -> Self {
        Gf256(self.0 ^ rhs.0)
    }
    #[inline]
    fn neg(&self) -> Self {
        *self
    }
    #[inline]
    fn mul(&self, rhs: &Self) -> Self {
        Gf256(Self::mul_reduce(self.0, rhs.0))
    }
    fn inverse(&self) -> Option<Self> {
        // a^254 = a^-1 in GF(2^8)'s multiplicative group.
        (self.0 != 0).then(|| self.pow(254))
    }
    #[inline]
    fn random<G: Rng + ?Sized>(rng: &mut G) -> Self {
        Gf256(rng.gen())
    }
}

// ============================================================================
// Prime / arkworks fields (feature `prime-rings`)
// ============================================================================

/// Adapter turning any `ark_ff::Field` into a base ring.
///
/// Arkworks fields already carry the whole capability set (`Zero`, `One`,
/// `inverse`, `UniformRand`); this newtype only bridges the trait vocabulary.
/// Blob persistence is not available for these rings (arkworks elements do
/// not implement serde).
#[cfg(feature = "prime-rings")]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Fp<F: ark_ff::Field>(pub F);

#[cfg(feature = "prime-rings")]
impl<F: ark_ff::Field> fmt::Display for Fp<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[cfg(feature = "prime-rings")]
impl<F: ark_ff::Field> Ring for Fp<F> {
    #[inline]
    fn zero() -> Self {
        Fp(F::zero())
    }
    #[inline]
    fn one() -> Self {
        Fp(F::one())
    }
    #[inline]
    fn add(&self, rhs: &Self) -> Self {
        Fp(self.0 + rhs.0)
    }
    #[inline]
    fn neg(&self) -> Self {
        Fp(-self.0)
    }
    #[inline]
    fn mul(&self, rhs: &Self) -> Self {
        Fp(self.0 * rhs.0)
    }
    #[inline]
    fn inverse(&self) -> Option<Self> {
        self.0.inverse().map(Fp)
    }
    #[inline]
    fn random<G: Rng + ?Sized>(rng: &mut G) -> Self {
        Fp(F::rand(rng))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn bit_tables() {
        let (o, l) = (Bit::zero(), Bit::one());
        assert_eq!(o.add(&o), o);
        assert_eq!(o.add(&l), l);
        assert_eq!(l.add(&l), o);
        assert_eq!(l.mul(&l), l);
        assert_eq!(o.mul(&l), o);
        assert_eq!(l.neg(), l);
        assert_eq!(l.inverse(), Some(l));
        assert_eq!(o.inverse(), None);
        assert!(Bit::MUL_IDEMPOTENT);
    }

    #[test]
    fn byte_packing_round_trip() {
        for byte in [0u8, 1, 0x20, 0x41, 0x5a, 0x7f, 0xff] {
            let bits = Bit::unpack(byte);
            assert_eq!(Bit::pack(&bits), Some(byte));
        }
        // Lane 5 carries 0x20.
        assert_eq!(Bit::unpack(0x20)[5], Bit(true));
        assert_eq!(Bit::pack(&[Bit(true); 9]), None);
    }

    #[test]
    fn gf256_known_products() {
        // 0x53 · 0xca = 1 is the classic Rijndael inverse pair.
        assert_eq!(Gf256(0x53).mul(&Gf256(0xca)), Gf256(1));
        assert_eq!(Gf256(0x02).mul(&Gf256(0x87)), Gf256(0x15));
        assert_eq!(Gf256(0x57).mul(&Gf256(0x13)), Gf256(0xfe));
    }

    #[test]
    fn gf256_inverse_law() {
        for a in 1..=255u8 {
            let a = Gf256(a);
            let inv = a.inverse().expect("nonzero element is a unit");
            assert_eq!(a.mul(&inv), Gf256::one(), "a = {a}");
        }
        assert_eq!(Gf256::zero().inverse(), None);
    }

    #[test]
    fn gf256_distributes() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..64 {
            let (a, b, c) = (
                Gf256::random(&mut rng),
                Gf256::random(&mut rng),
                Gf256::random(&mut rng),
            );
            assert_eq!(a.mul(&b.add(&c)), a.mul(&b).add(&a.mul(&c)));
            assert_eq!(a.mul(&b), b.mul(&a));
        }
    }

    #[cfg(feature = "prime-rings")]
    #[test]
    fn prime_field_adapter() {
        type R = Fp<ark_bn254::Fr>;
        let mut rng = StdRng::seed_from_u64(11);
        let a = R::random(&mut rng);
        if !a.is_zero() {
            let inv = a.inverse().expect("nonzero field element");
            assert!(a.mul(&inv).is_one());
        }
        assert_eq!(a.sub(&a), R::zero());
        assert!(!R::MUL_IDEMPOTENT);
    }
}
