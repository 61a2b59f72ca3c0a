//! Ed25519 curve point.

use curve25519_dalek::constants::ED25519_BASEPOINT_POINT;
use curve25519_dalek::edwards::{CompressedEdwardsY, EdwardsPoint};
use curve25519_dalek::traits::IsIdentity;
use sha2::{Digest, Sha512};
use std::ops::{Add, Neg, Sub};

use super::{GroupError, Scalar};

/// An element of the Ed25519 curve's prime-order subgroup.
#[derive(Clone, Copy)]
pub struct Point(pub(crate) EdwardsPoint);

/// Domain separator for `hash_to_point`'s try-and-increment construction.
/// This is a consensus-critical constant: a real deployment MUST pin it
/// (and the construction below) bit-for-bit.
const HASH_TO_POINT_DOMAIN: &[u8] = b"curvetree.hash_to_point.v1";

/// Number of counter values to try before giving up. In practice the
/// probability a given 64-byte input fails to land on a valid compressed
/// point is ~1/2 per attempt, so this bound is astronomically generous.
const MAX_TRY_INCREMENT_ATTEMPTS: u32 = 256;

impl Point {
    /// The Ed25519 generator.
    pub fn base_point() -> Self {
        Self(ED25519_BASEPOINT_POINT)
    }

    /// The group identity (neutral element). Used only for empty-tree
    /// sentinels and invariant checks — never valid inside a persisted
    /// `OutputTuple`.
    pub fn identity() -> Self {
        Self(EdwardsPoint::default())
    }

    pub fn is_identity(&self) -> bool {
        self.0.is_identity()
    }

    /// Deterministic domain-separated map into the prime-order subgroup via
    /// try-and-increment: hash the domain tag, the input, and an
    /// incrementing counter with SHA-512; interpret the low 32 bytes as a
    /// compressed Edwards point; on successful decompression, clear the
    /// cofactor by multiplying by 8 to guarantee prime-order-subgroup
    /// membership; otherwise increment the counter and retry.
    ///
    /// This is a chain-level constant that MUST be reproduced
    /// bit-for-bit by any compatible implementation.
    pub fn hash_to_point(bytes: &[u8]) -> Self {
        for counter in 0..MAX_TRY_INCREMENT_ATTEMPTS {
            let mut hasher = Sha512::new();
            hasher.update(HASH_TO_POINT_DOMAIN);
            hasher.update(bytes);
            hasher.update(counter.to_le_bytes());
            let digest: [u8; 64] = hasher.finalize().into();
            let mut candidate = [0u8; 32];
            candidate.copy_from_slice(&digest[..32]);

            if let Some(point) = CompressedEdwardsY(candidate).decompress() {
                let cleared = point.mul_by_cofactor();
                if !cleared.is_identity() {
                    return Self(cleared);
                }
            }
        }
        // Reaching this would require ~2^256 consecutive decompression
        // failures; treated as unreachable rather than threaded through
        // every caller as a fallible path.
        unreachable!("hash_to_point exhausted try-and-increment budget")
    }

    pub fn scalar_mul(&self, scalar: &Scalar) -> Self {
        Self(self.0 * scalar.inner())
    }

    /// Canonical 32-byte compressed Edwards-y encoding.
    pub fn to_bytes(self) -> [u8; 32] {
        self.0.compress().to_bytes()
    }

    /// Decodes a canonical 32-byte encoding, rejecting non-canonical or
    /// off-curve bytes.
    pub fn from_canonical_bytes(bytes: &[u8; 32]) -> Result<Self, GroupError> {
        let compressed = CompressedEdwardsY(*bytes);
        let point = compressed
            .decompress()
            .ok_or(GroupError::InvalidEncoding("point not on curve"))?;
        if point.compress().to_bytes() != *bytes {
            return Err(GroupError::InvalidEncoding("point encoding not canonical"));
        }
        Ok(Self(point))
    }
}

impl Add for Point {
    type Output = Point;
    fn add(self, rhs: Point) -> Point {
        Point(self.0 + rhs.0)
    }
}

impl Sub for Point {
    type Output = Point;
    fn sub(self, rhs: Point) -> Point {
        Point(self.0 - rhs.0)
    }
}

impl Neg for Point {
    type Output = Point;
    fn neg(self) -> Point {
        Point(-self.0)
    }
}

impl PartialEq for Point {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}
impl Eq for Point {}

impl std::fmt::Debug for Point {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Point({})", hex::encode(self.to_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_point_is_not_identity() {
        assert!(!Point::base_point().is_identity());
    }

    #[test]
    fn identity_is_identity() {
        assert!(Point::identity().is_identity());
    }

    #[test]
    fn round_trips_through_canonical_bytes() {
        let p = Point::base_point();
        let bytes = p.to_bytes();
        let decoded = Point::from_canonical_bytes(&bytes).expect("canonical");
        assert_eq!(p, decoded);
    }

    #[test]
    fn hash_to_point_is_deterministic() {
        let a = Point::hash_to_point(b"a");
        let b = Point::hash_to_point(b"a");
        assert_eq!(a, b);
    }

    #[test]
    fn hash_to_point_is_not_identity() {
        assert!(!Point::hash_to_point(b"a").is_identity());
    }

    #[test]
    fn hash_to_point_distinguishes_inputs() {
        let a = Point::hash_to_point(b"a");
        let b = Point::hash_to_point(b"b");
        assert_ne!(a, b);
    }

    #[test]
    fn scalar_mul_by_zero_is_identity() {
        let p = Point::base_point().scalar_mul(&Scalar::zero());
        assert!(p.is_identity());
    }
}
