//! Membership witness construction: re-randomization and the SA+L
//! short signature a spend attaches alongside a tree branch.

use crate::group::{Point, Scalar};
use crate::tree::{CurveTree, TreeBranch};
use crate::wallet::error::{WalletError, WalletResult};
use crate::wallet::record::{amount_generator, WalletOutputRecord};

/// Everything a spend hands to the external zero-knowledge prover: a
/// re-randomized output, the branch proving its membership, and a short
/// signature proving knowledge of the spending key without revealing
/// which leaf was re-randomized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipWitness {
    /// `O + rG`.
    pub re_randomized_address: Point,
    /// `I`, unchanged by re-randomization.
    pub key_image_base: Point,
    /// `rG`.
    pub re_randomizer_commitment: Point,
    /// `C + rH`.
    pub re_randomized_amount_commitment: Point,
    pub branch: TreeBranch,
    /// SA+L challenge `c = H_scalar(rG || I || O+rG || message_hash)`.
    pub challenge: Scalar,
    /// SA+L response `s = r + c * spend_scalar`.
    pub response: Scalar,
}

/// Builds a [`MembershipWitness`] for `record` against `tree`'s current
/// branch at `record.leaf_index`.
///
/// Refuses (`KeyImageMismatch`) if the record's stored `key_image_base`
/// does not actually equal `hash_to_point(encode(O))` — the tree and the
/// wallet's notion of this output would otherwise silently diverge.
pub fn build_membership_witness(
    record: &WalletOutputRecord,
    message_hash: &[u8],
    tree: &CurveTree,
) -> WalletResult<MembershipWitness> {
    let expected_key_image_base = Point::hash_to_point(&record.tuple.one_time_address.to_bytes());
    if expected_key_image_base != record.tuple.key_image_base {
        let err = WalletError::KeyImageMismatch;
        crate::logging::log_wallet_event("build_witness", record.amount, false, Some(&err.to_string()));
        return Err(err);
    }
    let key_image = record.tuple.key_image_base.scalar_mul(&record.spend_scalar);
    let expected_key_image_hash =
        Scalar::hash_to_scalar(b"curvetree.key_image_hash.v1", &[&key_image.to_bytes()]);
    if expected_key_image_hash != record.key_image_hash {
        let err = WalletError::KeyImageMismatch;
        crate::logging::log_wallet_event("build_witness", record.amount, false, Some(&err.to_string()));
        return Err(err);
    }

    let branch = match tree.get_branch(record.leaf_index)? {
        Some(branch) => branch,
        None => {
            let err = WalletError::TreeMissingLeaf(record.leaf_index);
            crate::logging::log_wallet_event("build_witness", record.amount, false, Some(&err.to_string()));
            return Err(err);
        }
    };

    let r = Scalar::random();
    let base = Point::base_point();
    let re_randomizer_commitment = base.scalar_mul(&r);
    let re_randomized_address = record.tuple.one_time_address + re_randomizer_commitment;
    let re_randomized_amount_commitment = record.tuple.amount_commitment + amount_generator().scalar_mul(&r);

    let challenge = Scalar::hash_to_scalar(
        b"curvetree.sal_signature.v1",
        &[
            &re_randomizer_commitment.to_bytes(),
            &record.tuple.key_image_base.to_bytes(),
            &re_randomized_address.to_bytes(),
            message_hash,
        ],
    );
    let response = r + challenge * record.spend_scalar;

    crate::logging::log_wallet_event("build_witness", record.amount, true, None);
    Ok(MembershipWitness {
        re_randomized_address,
        key_image_base: record.tuple.key_image_base,
        re_randomizer_commitment,
        re_randomized_amount_commitment,
        branch,
        challenge,
        response,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use crate::tree::TreeConfig;
    use crate::wallet::record::Outpoint;
    use std::sync::Arc;

    fn tree_with_owned_leaf() -> (CurveTree, WalletOutputRecord) {
        let tree = CurveTree::new(Arc::new(MemoryStorage::new()), TreeConfig::new(4, 3, 6));
        for seed in 0..42u8 {
            let filler = crate::output::OutputTuple::new(
                Point::hash_to_point(&[b'o', seed]),
                Point::hash_to_point(&[b'i', seed]),
                Point::hash_to_point(&[b'c', seed]),
            );
            tree.add_output(filler).unwrap();
        }
        let record = WalletOutputRecord::derive(
            Outpoint::new([1u8; 32], 0),
            5_000,
            Scalar::random(),
            Scalar::random(),
            42,
            10,
            1_700_000_000,
        );
        let leaf_index = tree.add_output(record.tuple).unwrap();
        assert_eq!(leaf_index, record.leaf_index);
        (tree, record)
    }

    #[test]
    fn witness_re_randomization_is_invertible() {
        let (tree, record) = tree_with_owned_leaf();
        let witness = build_membership_witness(&record, &[0u8; 32], &tree).unwrap();
        assert_eq!(
            witness.re_randomized_address - witness.re_randomizer_commitment,
            record.tuple.one_time_address
        );
        assert_ne!(
            witness.re_randomized_amount_commitment,
            record.tuple.amount_commitment
        );
    }

    #[test]
    fn witness_signature_is_consistent_with_challenge() {
        let (tree, record) = tree_with_owned_leaf();
        let witness = build_membership_witness(&record, b"message", &tree).unwrap();
        // s*G == rG + c*O
        let lhs = Point::base_point().scalar_mul(&witness.response);
        let rhs = witness.re_randomizer_commitment + record.tuple.one_time_address.scalar_mul(&witness.challenge);
        assert_eq!(lhs, rhs);
    }

    #[test]
    fn witness_branch_reconstructs_tree_root() {
        let (tree, record) = tree_with_owned_leaf();
        let witness = build_membership_witness(&record, b"message", &tree).unwrap();
        let root = tree.get_root().unwrap();
        assert_eq!(witness.branch.reconstruct_root(&record.tuple, &tree.config()).unwrap(), root);
    }

    #[test]
    fn mismatched_key_image_base_is_rejected() {
        let (tree, mut record) = tree_with_owned_leaf();
        record.tuple.key_image_base = Point::hash_to_point(b"wrong");
        assert!(matches!(
            build_membership_witness(&record, b"message", &tree),
            Err(WalletError::KeyImageMismatch)
        ));
    }
}
