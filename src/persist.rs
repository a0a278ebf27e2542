//! Key persistence and fingerprints
//!
//! Automata — including generated key pairs — are persisted as **opaque
//! blobs**: a serde encoding of the polynomial expression trees, with no
//! wire-format promise beyond "round-trips through this crate". Fingerprints
//! are BLAKE3 digests of the blob under a fixed domain-separation tag; they
//! identify a key in logs without disclosing anything about its structure
//! beyond what the blob itself would.
//!
//! Rings must carry serde support for persistence (the shipped `Bit` and
//! `Gf256` do; the arkworks adapter does not). Blob size is proportional to
//! the *unfolded* expression, so persist simplified automata.

#![forbid(unsafe_code)]
#![allow(missing_docs)]

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::automaton::Automaton;
use crate::ring::Ring;

/// Errors surfaced by blob encoding and decoding.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("blob encoding failed: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("blob decoding failed: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Domain-separation tag for automaton fingerprints.
const DIGEST_TAG: &[u8] = b"fapkc.automaton.v1";

/// Serialize an automaton to an opaque blob.
pub fn to_blob<R>(automaton: &Automaton<R>) -> Result<Vec<u8>, PersistError>
where
    R: Ring + Serialize,
{
    serde_json::to_vec(automaton).map_err(PersistError::Encode)
}

/// Reconstruct an automaton from a blob produced by [`to_blob`].
pub fn from_blob<R>(blob: &[u8]) -> Result<Automaton<R>, PersistError>
where
    R: Ring + DeserializeOwned,
{
    serde_json::from_slice(blob).map_err(PersistError::Decode)
}

/// Stable 32-byte fingerprint of an automaton, for logs and key-management
/// sanity checks.
pub fn digest<R>(automaton: &Automaton<R>) -> Result<[u8; 32], PersistError>
where
    R: Ring + Serialize,
{
    let blob = to_blob(automaton)?;
    let mut hasher = blake3::Hasher::new();
    hasher.update(DIGEST_TAG);
    hasher.update(&blob);
    Ok(*hasher.finalize().as_bytes())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poly::PolyVec;
    use crate::ring::Bit;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn blob_round_trip_preserves_the_automaton() {
        let mut rng = StdRng::seed_from_u64(30);
        let (forward, inverse) = Automaton::<Bit>::linear_nodelay_wifa_pair(4, 2, &mut rng);

        let blob = to_blob(&forward).unwrap();
        let restored: Automaton<Bit> = from_blob(&blob).unwrap();
        assert_eq!(restored, forward);

        // The restored key still inverts against the live one.
        let stream: Vec<PolyVec<Bit>> = (0..16)
            .map(|_| {
                let scalars: Vec<Bit> =
                    (0..4).map(|_| crate::ring::Ring::random(&mut rng)).collect();
                PolyVec::from_scalars(&scalars)
            })
            .collect();
        let plain: Vec<Vec<Bit>> = stream.iter().map(|v| v.to_scalars().unwrap()).collect();
        let recovered: Vec<Vec<Bit>> = inverse
            .run(restored.run(stream))
            .map(|v| v.to_scalars().unwrap())
            .collect();
        assert_eq!(recovered, plain);
    }

    #[test]
    fn digests_separate_distinct_keys() {
        let mut rng = StdRng::seed_from_u64(31);
        let (a, _) = Automaton::<Bit>::linear_nodelay_wifa_pair(4, 1, &mut rng);
        let (b, _) = Automaton::<Bit>::linear_nodelay_wifa_pair(4, 1, &mut rng);

        assert_eq!(digest(&a).unwrap(), digest(&a.clone()).unwrap());
        assert_ne!(digest(&a).unwrap(), digest(&b).unwrap());
    }

    #[test]
    fn corrupt_blob_is_rejected() {
        assert!(matches!(
            from_blob::<Bit>(b"not a key blob"),
            Err(PersistError::Decode(_))
        ));
    }
}
