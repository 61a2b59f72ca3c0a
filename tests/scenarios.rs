//! End-to-end scenarios (S1-S6) exercising insertion, rebuild,
//! cross-tree agreement, durable storage, wallet witnesses, and
//! builder batching.

use std::sync::Arc;

use curvetree::group::{Point, Scalar};
use curvetree::output::OutputTuple;
use curvetree::storage::{MemoryStorage, SledStorage, Storage};
use curvetree::tree::{CurveTree, CurveTreeBuilder, TreeConfig};
use curvetree::wallet::{build_membership_witness, Outpoint, WalletOutputRecord, WalletTracking};

/// A deterministic tuple for seed `i`, distinct across `O`, `I`, `C` and
/// across seeds, via domain-tagged `hash_to_point`.
fn deterministic_tuple(seed: u32) -> OutputTuple {
    let seed_bytes = seed.to_be_bytes();
    let tag = |prefix: u8| {
        let mut bytes = vec![prefix];
        bytes.extend_from_slice(&seed_bytes);
        bytes
    };
    OutputTuple::new(
        Point::hash_to_point(&tag(b'O')),
        Point::hash_to_point(&tag(b'I')),
        Point::hash_to_point(&tag(b'C')),
    )
}

fn memory_tree() -> CurveTree {
    CurveTree::new(Arc::new(MemoryStorage::new()), TreeConfig::default())
}

#[test]
fn s1_single_insertion_into_fresh_tree() {
    let tree = memory_tree();
    let tuple = OutputTuple::new(
        Point::hash_to_point(b"a"),
        Point::hash_to_point(b"b"),
        Point::hash_to_point(b"c"),
    );

    let leaf_index = tree.add_output(tuple).unwrap();
    assert_eq!(leaf_index, 0);
    assert_eq!(tree.output_count().unwrap(), 1);
    assert_eq!(tree.depth_of().unwrap(), 1);
    assert!(!tree.get_root().unwrap().is_identity());
    assert_eq!(tree.get_output(0).unwrap().unwrap(), tuple);
}

#[test]
fn s2_rebuild_preserves_root_over_342_tuples_in_threes() {
    let tree = memory_tree();
    for chunk_start in (0..342u32).step_by(3) {
        let tuples: Vec<_> = (chunk_start..chunk_start + 3).map(deterministic_tuple).collect();
        tree.add_outputs(&tuples).unwrap();
    }
    // Only the first 114 triples were requested by the scenario row's
    // output_count; here the tree already holds all 342.
    assert_eq!(tree.output_count().unwrap(), 342);

    let root_before = tree.get_root().unwrap();
    tree.rebuild().unwrap();
    assert_eq!(tree.get_root().unwrap(), root_before);
    assert!(tree.verify_integrity().is_ok());
}

#[test]
fn s3_two_independent_trees_over_same_inputs_match_byte_for_byte() {
    let tuples: Vec<_> = (0..75u32).map(deterministic_tuple).collect();

    let tree_a = memory_tree();
    let tree_b = memory_tree();
    tree_a.add_outputs(&tuples).unwrap();
    // tree_b inserts one at a time, exercising the other insertion path.
    for tuple in &tuples {
        tree_b.add_output(*tuple).unwrap();
    }

    assert_eq!(tree_a.get_root().unwrap(), tree_b.get_root().unwrap());
    for leaf_index in 0..75u64 {
        let branch_a = tree_a.get_branch(leaf_index).unwrap().unwrap();
        let branch_b = tree_b.get_branch(leaf_index).unwrap().unwrap();
        assert_eq!(branch_a, branch_b);
    }
}

#[test]
fn s4_durable_storage_survives_close_and_reopen() {
    let dir = tempfile::TempDir::new().expect("tempdir");
    let tuples: Vec<_> = (0..100u32).map(deterministic_tuple).collect();

    let root_before = {
        let storage = Arc::new(SledStorage::open(dir.path()).expect("open sled"));
        let tree = CurveTree::new(storage.clone(), TreeConfig::default());
        tree.add_outputs(&tuples).unwrap();
        let root = tree.get_root().unwrap();
        storage.sync().unwrap();
        root
    };

    let storage = Arc::new(SledStorage::open(dir.path()).expect("reopen sled"));
    let tree = CurveTree::new(storage, TreeConfig::default());
    assert_eq!(tree.output_count().unwrap(), 100);
    for (leaf_index, expected) in tuples.iter().enumerate() {
        assert_eq!(tree.get_output(leaf_index as u64).unwrap().unwrap(), *expected);
    }
    tree.rebuild().unwrap();
    assert_eq!(tree.get_root().unwrap(), root_before);
}

#[test]
fn s5_build_membership_witness_for_owned_leaf_in_a_200_leaf_tree() {
    let tree = memory_tree();
    for seed in 0..42u32 {
        tree.add_output(deterministic_tuple(seed)).unwrap();
    }

    let record = WalletOutputRecord::derive(
        Outpoint::new([42u8; 32], 0),
        12_345,
        Scalar::random(),
        Scalar::random(),
        42,
        1_000,
        1_700_000_000,
    );
    let leaf_index = tree.add_output(record.tuple).unwrap();
    assert_eq!(leaf_index, 42);

    for seed in 43..200u32 {
        tree.add_output(deterministic_tuple(seed)).unwrap();
    }
    assert_eq!(tree.output_count().unwrap(), 200);

    let witness = build_membership_witness(&record, &[0u8; 32], &tree).unwrap();

    assert_eq!(
        witness.re_randomized_address - witness.re_randomizer_commitment,
        record.tuple.one_time_address
    );
    let s_g = Point::base_point().scalar_mul(&witness.response);
    let r_g_plus_c_o =
        witness.re_randomizer_commitment + record.tuple.one_time_address.scalar_mul(&witness.challenge);
    assert_eq!(s_g, r_g_plus_c_o);

    let root = tree.get_root().unwrap();
    assert_eq!(witness.branch.reconstruct_root(&record.tuple, &tree.config()).unwrap(), root);
}

#[test]
fn s6_builder_fed_in_two_batches_matches_one_large_add_outputs() {
    let tuples: Vec<_> = (0..100u32).map(deterministic_tuple).collect();

    let storage_via_builder: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
    let mut first_half = CurveTreeBuilder::new(storage_via_builder.clone(), TreeConfig::default());
    first_half.extend(tuples[0..50].iter().copied());
    first_half.finalize().unwrap();

    let mut second_half = CurveTreeBuilder::new(storage_via_builder, TreeConfig::default());
    second_half.extend(tuples[50..100].iter().copied());
    let tree_via_builder = second_half.finalize().unwrap();

    let tree_via_batch = memory_tree();
    tree_via_batch.add_outputs(&tuples).unwrap();

    assert_eq!(tree_via_builder.get_root().unwrap(), tree_via_batch.get_root().unwrap());
    assert!(tree_via_builder.verify_integrity().is_ok());
}

#[test]
fn wallet_tracking_rejects_witness_for_output_it_does_not_track() {
    let tree = memory_tree();
    tree.add_output(deterministic_tuple(0)).unwrap();

    let wallet = WalletTracking::new();
    let outpoint = Outpoint::new([1u8; 32], 0);
    assert!(wallet.build_membership_witness(&outpoint, b"m", &tree).is_err());
}
