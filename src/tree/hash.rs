//! The tree's layer hash construction, `H_layer`.
//!
//! Compresses between 1 and `MAX_WIDTH` scalars into one `Point` that
//! is collision-resistant within the group, positional, and seeded so
//! the empty input equals `HASH_INIT`. This is a stub suitable for
//! testing and NOT for deployment — a real chain pins its own
//! generalized Schnorr-style accumulation bit-for-bit.

use once_cell::sync::OnceCell;

use crate::group::{Point, Scalar};
use crate::output::OutputTuple;
use crate::tree::node::TreeNode;

/// Upper bound on how many scalars a single `H_layer` call absorbs.
/// Generous relative to any realistic `NODE_BRANCH_WIDTH`/
/// `LEAF_BRANCH_WIDTH` so callers never need to chunk.
pub const MAX_WIDTH: usize = 64;

/// The fixed "empty" seed. `H_layer(&[])` always equals this.
pub fn hash_init() -> Point {
    static INIT: OnceCell<Point> = OnceCell::new();
    *INIT.get_or_init(|| Point::hash_to_point(b"curvetree.HASH_INIT.v1"))
}

/// The `i`-th independent generator used by the vector Pedersen
/// construction below. Independence from `HASH_INIT` and from the base
/// point follows from `hash_to_point`'s domain separation.
fn generator(i: usize) -> Point {
    static GENERATORS: OnceCell<Vec<Point>> = OnceCell::new();
    let generators = GENERATORS.get_or_init(|| {
        (0..MAX_WIDTH)
            .map(|idx| {
                let mut domain = hash_init().to_bytes().to_vec();
                domain.extend_from_slice(&(idx as u32).to_be_bytes());
                Point::hash_to_point(&domain)
            })
            .collect()
    });
    generators[i]
}

/// Deterministically compresses `inputs` (`1..=MAX_WIDTH` scalars) into
/// one point: `H_layer(xs) = HASH_INIT + sum_i(xs[i] * G_i)`, a vector
/// Pedersen commitment over per-position independent generators.
///
/// - Collision resistance follows from the discrete-log hardness of the
///   Ed25519 group: a collision between two distinct input vectors
///   would yield a nontrivial linear relation among the `G_i`.
/// - It is positional because each position uses a distinct generator:
///   swapping two inputs changes which generator each is multiplied by.
/// - `H_layer(&[]) == HASH_INIT` by construction.
///
/// Panics if `inputs.len() > MAX_WIDTH` — every caller in this crate
/// bounds its input by a configured branch width that is validated
/// against `MAX_WIDTH` at tree construction time.
pub fn h_layer(inputs: &[Scalar]) -> Point {
    assert!(
        inputs.len() <= MAX_WIDTH,
        "h_layer: {} inputs exceeds MAX_WIDTH {MAX_WIDTH}",
        inputs.len()
    );
    let mut acc = hash_init();
    for (i, scalar) in inputs.iter().enumerate() {
        acc = acc + generator(i).scalar_mul(scalar);
    }
    acc
}

/// Combines one output's `ELEMENTS_PER_OUTPUT` field elements into the
/// single scalar that occupies its slot in the leaf-layer accumulator.
/// `to_field_elements` remains the only way an output's *value*
/// influences the tree; this just folds that triple down to the one
/// scalar-per-leaf-slot shape the leaf layer's sibling accounting
/// requires (one scalar per output).
pub fn leaf_slot_scalar(tuple: &OutputTuple) -> Scalar {
    let elements = tuple.to_field_elements();
    let encoded: Vec<[u8; 32]> = elements.iter().map(|s| s.to_bytes()).collect();
    let refs: Vec<&[u8]> = encoded.iter().map(|e| e.as_slice()).collect();
    Scalar::hash_to_scalar(b"curvetree.leaf_slot_scalar.v1", &refs)
}

/// Folds a child node's commitment down to the scalar that occupies its
/// slot in its parent's accumulator.
pub fn child_slot_scalar(node: &TreeNode) -> Scalar {
    Scalar::from_bytes_mod_order_wide_32(&node.hash.to_bytes())
}

/// Incrementally extends an `H_layer` accumulator by one slot.
///
/// `accumulate(base, position, slot)` is exactly `h_layer` of the vector
/// that has `slot` at `position` and whatever vector already produced
/// `base` in every earlier position — the vector Pedersen construction
/// absorbs one input at a time without needing the rest. This lets the
/// tree update a node's commitment on each insertion instead of
/// replaying every prior leaf. Starting from `hash_init()` at
/// `position == 0` reproduces `h_layer(&[slot])` exactly.
pub fn accumulate(base: Point, position: usize, slot: Scalar) -> Point {
    base + generator(position).scalar_mul(&slot)
}
