//! Membership witness: the sibling path from one leaf to the root.

use crate::group::{Point, Scalar};
use crate::output::OutputTuple;
use crate::tree::config::TreeConfig;
use crate::tree::error::{TreeError, TreeResult};
use crate::tree::hash::{child_slot_scalar, h_layer, leaf_slot_scalar};
use crate::tree::node::TreeNode;

/// The sibling scalars needed to recompute the root from one leaf.
///
/// `layers[k]` holds the siblings at layer `k` needed by `H_layer` at
/// layer `k + 1` to re-derive the parent of the node the witness
/// occupies at layer `k`, in ascending position order with the witness's
/// own position omitted. Constructed on demand from storage; never
/// persisted; bounded by `ceil(log_width(output_count))` layers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeBranch {
    pub leaf_index: u64,
    pub layers: Vec<Vec<Scalar>>,
}

impl TreeBranch {
    pub fn new(leaf_index: u64, layers: Vec<Vec<Scalar>>) -> Self {
        Self { leaf_index, layers }
    }

    /// Recombines this branch with the claimed leaf tuple and returns
    /// the root it implies. Callers compare this against
    /// [`crate::tree::CurveTree::get_root`] to verify membership.
    ///
    /// `layers` is attacker-controlled whenever a branch travels outside
    /// this process (e.g. bundled into a membership witness and handed
    /// to an external prover), so each layer's sibling count is checked
    /// against the expected `width - 1` before use rather than trusted —
    /// a short sibling list is reported as `MalformedBranch`, not a panic.
    pub fn reconstruct_root(&self, tuple: &OutputTuple, config: &TreeConfig) -> TreeResult<Point> {
        let mut current_scalar = leaf_slot_scalar(tuple);
        let mut index_at_layer = self.leaf_index;
        let mut parent_point = Point::identity();

        for (layer, siblings) in self.layers.iter().enumerate() {
            let width = if layer == 0 {
                config.leaf_branch_width
            } else {
                config.node_branch_width
            };
            let width = width as usize;
            let expected_siblings = width - 1;
            if siblings.len() != expected_siblings {
                return Err(TreeError::MalformedBranch(layer, expected_siblings, siblings.len()));
            }
            let position = (index_at_layer % width as u64) as usize;

            let mut slots = Vec::with_capacity(width);
            let mut sibling_iter = siblings.iter();
            for slot in 0..width {
                if slot == position {
                    slots.push(current_scalar);
                } else {
                    let sibling = sibling_iter
                        .next()
                        .expect("length checked against width - 1 above");
                    slots.push(*sibling);
                }
            }

            parent_point = h_layer(&slots);
            current_scalar = child_slot_scalar(&TreeNode::new(parent_point, 0));
            index_at_layer /= width as u64;
        }

        Ok(parent_point)
    }
}
