//! The leaf value: an Output Tuple `(O, I, C)`.

use thiserror::Error;

use crate::group::{GroupError, Point, Scalar};
use crate::tree::config::ELEMENTS_PER_OUTPUT;

/// Canonical wire size: three 32-byte points in field order `O‖I‖C`.
pub const OUTPUT_TUPLE_WIRE_SIZE: usize = 96;

/// Errors constructing or decoding an `OutputTuple`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OutputTupleError {
    #[error("invalid encoding: {0}")]
    InvalidEncoding(#[from] GroupError),
    #[error("invalid tuple length: expected {OUTPUT_TUPLE_WIRE_SIZE} bytes, got {0}")]
    InvalidLength(usize),
    #[error("invalid tuple: one of O, I, C is the identity element")]
    InvalidTuple,
}

/// One shielded output: one-time address `O`, key-image base `I`, and
/// amount commitment `C`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct OutputTuple {
    pub one_time_address: Point,
    pub key_image_base: Point,
    pub amount_commitment: Point,
}

impl OutputTuple {
    pub fn new(one_time_address: Point, key_image_base: Point, amount_commitment: Point) -> Self {
        Self {
            one_time_address,
            key_image_base,
            amount_commitment,
        }
    }

    /// True iff none of `O`, `I`, `C` is the identity element.
    pub fn is_valid(&self) -> bool {
        !self.one_time_address.is_identity()
            && !self.key_image_base.is_identity()
            && !self.amount_commitment.is_identity()
    }

    /// Derives the scalar sequence that feeds the tree's hash
    /// construction. This mapping is a consensus-critical constant;
    /// here it is the wide reduction of each point's canonical
    /// encoding, giving exactly `ELEMENTS_PER_OUTPUT` scalars. A real
    /// deployment MUST source this decomposition from its own chain
    /// specification.
    pub fn to_field_elements(&self) -> [Scalar; ELEMENTS_PER_OUTPUT] {
        [
            Scalar::from_bytes_mod_order_wide_32(&self.one_time_address.to_bytes()),
            Scalar::from_bytes_mod_order_wide_32(&self.key_image_base.to_bytes()),
            Scalar::from_bytes_mod_order_wide_32(&self.amount_commitment.to_bytes()),
        ]
    }

    /// Canonical 96-byte wire encoding: `O‖I‖C`.
    pub fn serialize(&self) -> [u8; OUTPUT_TUPLE_WIRE_SIZE] {
        let mut out = [0u8; OUTPUT_TUPLE_WIRE_SIZE];
        out[0..32].copy_from_slice(&self.one_time_address.to_bytes());
        out[32..64].copy_from_slice(&self.key_image_base.to_bytes());
        out[64..96].copy_from_slice(&self.amount_commitment.to_bytes());
        out
    }

    /// Decodes a 96-byte wire form. Fails if the length is wrong, any
    /// component decodes non-canonically, or the result fails
    /// `is_valid`.
    pub fn deserialize(bytes: &[u8]) -> Result<Self, OutputTupleError> {
        if bytes.len() != OUTPUT_TUPLE_WIRE_SIZE {
            return Err(OutputTupleError::InvalidLength(bytes.len()));
        }
        let mut o = [0u8; 32];
        let mut i = [0u8; 32];
        let mut c = [0u8; 32];
        o.copy_from_slice(&bytes[0..32]);
        i.copy_from_slice(&bytes[32..64]);
        c.copy_from_slice(&bytes[64..96]);

        let tuple = Self::new(
            Point::from_canonical_bytes(&o)?,
            Point::from_canonical_bytes(&i)?,
            Point::from_canonical_bytes(&c)?,
        );
        if !tuple.is_valid() {
            return Err(OutputTupleError::InvalidTuple);
        }
        Ok(tuple)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> OutputTuple {
        OutputTuple::new(
            Point::hash_to_point(b"a"),
            Point::hash_to_point(b"b"),
            Point::hash_to_point(b"c"),
        )
    }

    #[test]
    fn valid_tuple_passes_is_valid() {
        assert!(sample().is_valid());
    }

    #[test]
    fn identity_component_is_invalid() {
        let tuple = OutputTuple::new(Point::identity(), Point::hash_to_point(b"b"), Point::hash_to_point(b"c"));
        assert!(!tuple.is_valid());
    }

    #[test]
    fn serialize_is_96_bytes() {
        assert_eq!(sample().serialize().len(), OUTPUT_TUPLE_WIRE_SIZE);
    }

    #[test]
    fn round_trips_through_wire_form() {
        let tuple = sample();
        let bytes = tuple.serialize();
        let decoded = OutputTuple::deserialize(&bytes).expect("valid tuple");
        assert_eq!(tuple, decoded);
    }

    #[test]
    fn rejects_wrong_length() {
        let bytes = [0u8; 95];
        assert!(matches!(
            OutputTuple::deserialize(&bytes),
            Err(OutputTupleError::InvalidLength(95))
        ));
    }

    #[test]
    fn rejects_identity_component_on_deserialize() {
        let mut bytes = sample().serialize();
        bytes[0..32].copy_from_slice(&Point::identity().to_bytes());
        assert!(matches!(
            OutputTuple::deserialize(&bytes),
            Err(OutputTupleError::InvalidTuple)
        ));
    }

    #[test]
    fn to_field_elements_is_deterministic() {
        let tuple = sample();
        assert_eq!(
            tuple.to_field_elements().map(Scalar::to_bytes),
            tuple.to_field_elements().map(Scalar::to_bytes)
        );
    }
}
