//! Consensus-facing collaborator traits this crate expects external
//! components to implement, plus a test/demo-only stub.
//!
//! This crate owns the tree and the wallet tracking layer; it does not
//! own block application, zero-knowledge proving, or proof verification
//! — those live in the broader consensus engine and are represented here
//! only as the seam this crate calls through.

use crate::group::Point;
use crate::output::OutputTuple;
use crate::wallet::MembershipWitness;

/// Produces `(leaf_index, OutputTuple)` pairs in canonical block-apply
/// order. Implemented by whatever component replays confirmed blocks
/// into this crate's tree.
pub trait OutputSource {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Returns the next unapplied output, or `None` once the source is
    /// caught up to the current chain tip.
    fn next_output(&mut self) -> Result<Option<(u64, OutputTuple)>, Self::Error>;
}

/// Accepts a membership witness and the root it was built against, and
/// returns an opaque proof blob. Implemented by the zero-knowledge
/// prover; this crate never constructs proofs itself.
pub trait ProofSink {
    type Error: std::error::Error + Send + Sync + 'static;

    fn prove(&self, witness: &MembershipWitness, root: Point) -> Result<Vec<u8>, Self::Error>;
}

/// Checks a proof blob against a root and whatever public inputs the
/// surrounding transaction supplies. Implemented by the verifier side of
/// the proving system.
pub trait ProofVerifier {
    type Error: std::error::Error + Send + Sync + 'static;

    fn verify(&self, proof: &[u8], root: Point, public_inputs: &[u8]) -> Result<bool, Self::Error>;
}

/// A placeholder `ProofSink` returning a fixed-shape blob, never a real
/// proof. Exists only for tests and the CLI's demo path — the real
/// proving system lives outside this crate entirely.
#[derive(Debug, Default, Clone, Copy)]
pub struct StubProver;

impl ProofSink for StubProver {
    type Error = std::convert::Infallible;

    fn prove(&self, witness: &MembershipWitness, root: Point) -> Result<Vec<u8>, Self::Error> {
        let mut blob = Vec::with_capacity(4 + 32 + 32);
        blob.extend_from_slice(b"stub");
        blob.extend_from_slice(&root.to_bytes());
        blob.extend_from_slice(&witness.challenge.to_bytes());
        Ok(blob)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::Scalar;
    use crate::tree::TreeBranch;

    fn sample_witness() -> MembershipWitness {
        MembershipWitness {
            re_randomized_address: Point::hash_to_point(b"a"),
            key_image_base: Point::hash_to_point(b"i"),
            re_randomizer_commitment: Point::hash_to_point(b"r"),
            re_randomized_amount_commitment: Point::hash_to_point(b"c"),
            branch: TreeBranch::new(0, vec![]),
            challenge: Scalar::random(),
            response: Scalar::random(),
        }
    }

    #[test]
    fn stub_prover_returns_a_fixed_shape_blob() {
        let prover = StubProver;
        let witness = sample_witness();
        let root = Point::hash_to_point(b"root");
        let blob = prover.prove(&witness, root).unwrap();
        assert_eq!(blob.len(), 4 + 32 + 32);
        assert_eq!(&blob[0..4], b"stub");
    }
}
