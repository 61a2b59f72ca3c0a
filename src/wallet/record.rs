//! The wallet's per-leaf bookkeeping record.

use once_cell::sync::OnceCell;

use crate::group::{Point, Scalar};
use crate::output::OutputTuple;

/// Identifies the external transaction output an owned leaf corresponds
/// to. Distinct from `leaf_index` (the tree's internal address) — this
/// is how the wallet recognizes an output it has already scanned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Outpoint {
    pub tx_hash: [u8; 32],
    pub index: u32,
}

impl Outpoint {
    pub fn new(tx_hash: [u8; 32], index: u32) -> Self {
        Self { tx_hash, index }
    }
}

/// The fixed secondary generator `H` used by the amount commitment
/// `C = amount * H + blinding * G`. Domain-separated from `HASH_INIT`
/// and from the base point so none of the three generators used
/// across this crate collide.
pub(crate) fn amount_generator() -> Point {
    static GENERATOR: OnceCell<Point> = OnceCell::new();
    *GENERATOR.get_or_init(|| Point::hash_to_point(b"curvetree.amount_generator.v1"))
}

/// One owned leaf: everything the wallet needs to later spend it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalletOutputRecord {
    pub outpoint: Outpoint,
    pub amount: u64,
    pub spend_scalar: Scalar,
    pub blinding_scalar: Scalar,
    pub tuple: OutputTuple,
    pub leaf_index: u64,
    pub key_image_hash: Scalar,
    pub block_height: u64,
    pub spent: bool,
    pub spending_tx: Option<[u8; 32]>,
    pub discovered_at: u64,
}

impl WalletOutputRecord {
    /// Derives `tuple` and `key_image_hash` from the owning secrets:
    /// `O = spend_scalar * G`, `I = hash_to_point(encode(O))`,
    /// `C = amount * H + blinding * G`,
    /// `key_image_hash = H_scalar(encode(spend_scalar * I))`.
    #[allow(clippy::too_many_arguments)]
    pub fn derive(
        outpoint: Outpoint,
        amount: u64,
        spend_scalar: Scalar,
        blinding_scalar: Scalar,
        leaf_index: u64,
        block_height: u64,
        discovered_at: u64,
    ) -> Self {
        let base = Point::base_point();
        let one_time_address = base.scalar_mul(&spend_scalar);
        let key_image_base = Point::hash_to_point(&one_time_address.to_bytes());
        let amount_scalar = Scalar::from_bytes_mod_order_wide_32(&{
            let mut bytes = [0u8; 32];
            bytes[..8].copy_from_slice(&amount.to_le_bytes());
            bytes
        });
        let amount_commitment =
            amount_generator().scalar_mul(&amount_scalar) + base.scalar_mul(&blinding_scalar);
        let tuple = OutputTuple::new(one_time_address, key_image_base, amount_commitment);

        let key_image = key_image_base.scalar_mul(&spend_scalar);
        let key_image_hash = Scalar::hash_to_scalar(b"curvetree.key_image_hash.v1", &[&key_image.to_bytes()]);

        Self {
            outpoint,
            amount,
            spend_scalar,
            blinding_scalar,
            tuple,
            leaf_index,
            key_image_hash,
            block_height,
            spent: false,
            spending_tx: None,
            discovered_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> WalletOutputRecord {
        WalletOutputRecord::derive(
            Outpoint::new([7u8; 32], 0),
            1_000,
            Scalar::random(),
            Scalar::random(),
            42,
            100,
            1_700_000_000,
        )
    }

    #[test]
    fn derived_tuple_is_valid() {
        assert!(sample_record().tuple.is_valid());
    }

    #[test]
    fn derived_one_time_address_matches_spend_scalar() {
        let record = sample_record();
        assert_eq!(
            record.tuple.one_time_address,
            Point::base_point().scalar_mul(&record.spend_scalar)
        );
    }

    #[test]
    fn derived_key_image_base_matches_hash_to_point_of_address() {
        let record = sample_record();
        assert_eq!(
            record.tuple.key_image_base,
            Point::hash_to_point(&record.tuple.one_time_address.to_bytes())
        );
    }

    #[test]
    fn fresh_record_is_unspent() {
        assert!(!sample_record().spent);
    }
}
