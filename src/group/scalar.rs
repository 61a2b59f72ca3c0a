//! Ed25519 scalar field element.

use curve25519_dalek::scalar::Scalar as DalekScalar;
use sha2::{Digest, Sha512};
use std::ops::{Add, Mul, Neg};

use super::GroupError;

/// An element of the Ed25519 scalar field (integers mod the group order).
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Scalar(pub(crate) DalekScalar);

impl Scalar {
    /// The additive identity.
    pub fn zero() -> Self {
        Self(DalekScalar::ZERO)
    }

    /// The multiplicative identity.
    pub fn one() -> Self {
        Self(DalekScalar::ONE)
    }

    /// Draws a scalar uniformly from `[0, order)` using a cryptographically
    /// strong RNG.
    pub fn random() -> Self {
        Self(DalekScalar::random(&mut rand::thread_rng()))
    }

    /// Reduces a wide (64-byte) SHA-512 digest mod the group order. Used to
    /// build the `H_scalar` construction that the Fiat-Shamir challenge and
    /// key-image hash both rely on. Each input is length-prefixed (8-byte
    /// little-endian) before absorption so that e.g. `["ab", "c"]` and
    /// `["a", "bc"]` hash to distinct digests rather than colliding on their
    /// naive concatenation.
    pub fn hash_to_scalar(domain: &[u8], inputs: &[&[u8]]) -> Self {
        let mut hasher = Sha512::new();
        hasher.update(domain);
        for input in inputs {
            hasher.update((input.len() as u64).to_le_bytes());
            hasher.update(input);
        }
        let digest: [u8; 64] = hasher.finalize().into();
        Self(DalekScalar::from_bytes_mod_order_wide(&digest))
    }

    /// Reduces an arbitrary byte string into a scalar via wide reduction,
    /// used by `OutputTuple::to_field_elements`.
    pub fn from_bytes_mod_order_wide_32(bytes: &[u8; 32]) -> Self {
        let mut wide = [0u8; 64];
        wide[..32].copy_from_slice(bytes);
        Self(DalekScalar::from_bytes_mod_order_wide(&wide))
    }

    /// Canonical 32-byte little-endian encoding.
    pub fn to_bytes(self) -> [u8; 32] {
        self.0.to_bytes()
    }

    /// Decodes a canonical 32-byte encoding. Rejects non-canonical
    /// representations (bytes that do not round-trip through the reduced
    /// form).
    pub fn from_canonical_bytes(bytes: &[u8; 32]) -> Result<Self, GroupError> {
        let candidate = DalekScalar::from_bytes_mod_order(*bytes);
        if &candidate.to_bytes() != bytes {
            return Err(GroupError::InvalidEncoding("scalar not canonical"));
        }
        Ok(Self(candidate))
    }

    pub fn negate(self) -> Self {
        Self(-self.0)
    }

    pub(crate) fn inner(&self) -> &DalekScalar {
        &self.0
    }
}

impl Add for Scalar {
    type Output = Scalar;
    fn add(self, rhs: Scalar) -> Scalar {
        Scalar(self.0 + rhs.0)
    }
}

impl Mul for Scalar {
    type Output = Scalar;
    fn mul(self, rhs: Scalar) -> Scalar {
        Scalar(self.0 * rhs.0)
    }
}

impl Neg for Scalar {
    type Output = Scalar;
    fn neg(self) -> Scalar {
        self.negate()
    }
}

impl std::fmt::Debug for Scalar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Scalar({})", hex::encode(self.to_bytes()))
    }
}
