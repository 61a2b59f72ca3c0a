//! The persistent curve tree: incremental insertion, branch extraction,
//! integrity checking, and rebuild.

use std::io::{self, Read, Write};
use std::sync::{Arc, RwLock};

use crate::group::{Point, Scalar};
use crate::output::{OutputTuple, OutputTupleError, OUTPUT_TUPLE_WIRE_SIZE};
use crate::storage::Storage;
use crate::tree::branch::TreeBranch;
use crate::tree::config::TreeConfig;
use crate::tree::error::{TreeError, TreeResult};
use crate::tree::hash::{child_slot_scalar, h_layer, hash_init, leaf_slot_scalar};
use crate::tree::node::{TreeIndex, TreeNode};

/// Metadata key holding the current tree depth (4-byte LE `u32`).
const DEPTH_METADATA_KEY: &str = "depth";

/// Metadata key holding the `save()` root checkpoint (32-byte point).
const ROOT_CHECKPOINT_KEY: &str = "root_checkpoint";

/// Single-byte storage schema version. Bumped whenever the key/value
/// layout in `crate::storage::traits` changes incompatibly.
const SCHEMA_VERSION_KEY: &str = "schema_version";
const SCHEMA_VERSION: u8 = 1;

/// Commit attempts before a storage failure is surfaced: recovered
/// locally by retrying the commit, and only surfaced once retries
/// exhaust.
const COMMIT_RETRY_ATTEMPTS: u32 = 3;

fn ceil_div(a: u64, b: u64) -> u64 {
    (a + b - 1) / b
}

struct TreeState {
    /// Set once a storage read surfaces corruption. While set, all
    /// mutating operations refuse until `rebuild` clears it.
    fatal: bool,
}

/// A curve tree over one [`Storage`] handle.
///
/// Every internal node's commitment is recomputed from its current
/// children on each insertion (not merely appended to), so a leaf's
/// contribution reaches the root immediately even while its ancestors
/// are still growing — a partial node's absent positions behave as
/// zero-valued slots under `H_layer`, the same trick that makes
/// `H_layer(&[]) == HASH_INIT`. Readers (`get_root`, `get_branch`,
/// `verify_integrity`) take a shared lock; writers (`add_output`,
/// `add_outputs`, `rebuild`) take an exclusive one, matching the
/// `wallet -> tree -> storage` lock order the rest of the crate follows.
pub struct CurveTree {
    storage: Arc<dyn Storage>,
    config: TreeConfig,
    state: RwLock<TreeState>,
}

impl CurveTree {
    pub fn new(storage: Arc<dyn Storage>, config: TreeConfig) -> Self {
        Self {
            storage,
            config,
            state: RwLock::new(TreeState { fatal: false }),
        }
    }

    pub fn config(&self) -> TreeConfig {
        self.config
    }

    /// The storage handle backing this tree, for callers (e.g.
    /// [`crate::tree::CurveTreeBuilder`]) that need their own handle to
    /// the same backing store. Cheap: `Arc` clone only.
    pub fn storage_handle(&self) -> Arc<dyn Storage> {
        self.storage.clone()
    }

    fn poisoned() -> TreeError {
        TreeError::Fatal
    }

    fn depth(&self) -> TreeResult<u32> {
        match self.storage.get_metadata(DEPTH_METADATA_KEY)? {
            Some(bytes) if bytes.len() == 4 => {
                let mut buf = [0u8; 4];
                buf.copy_from_slice(&bytes);
                Ok(u32::from_le_bytes(buf))
            }
            _ => Ok(0),
        }
    }

    fn set_depth(&self, depth: u32) -> TreeResult<()> {
        self.storage
            .store_metadata(DEPTH_METADATA_KEY, depth.to_le_bytes().to_vec())?;
        Ok(())
    }

    /// Current tree depth: the number of populated layers, `0` iff the
    /// tree has no outputs, `1` after the first insertion.
    pub fn depth_of(&self) -> TreeResult<u32> {
        let _guard = self.state.read().map_err(|_| Self::poisoned())?;
        self.depth()
    }

    pub fn output_count(&self) -> TreeResult<u64> {
        let _guard = self.state.read().map_err(|_| Self::poisoned())?;
        Ok(self.storage.get_output_count()?)
    }

    /// The tree's current root: `HASH_INIT` if empty, else the single
    /// node's hash at the top-most populated layer.
    pub fn get_root(&self) -> TreeResult<Point> {
        let _guard = self.state.read().map_err(|_| Self::poisoned())?;
        self.root_locked()
    }

    fn root_locked(&self) -> TreeResult<Point> {
        let depth = self.depth()?;
        if depth == 0 {
            return Ok(hash_init());
        }
        let top = TreeIndex::new(depth - 1, 0);
        match self.storage.get_node(top)? {
            Some(node) => Ok(node.hash),
            None => Err(TreeError::IntegrityFailure(
                top,
                "expected root node is missing".to_string(),
            )),
        }
    }

    pub fn get_output(&self, leaf_index: u64) -> TreeResult<Option<OutputTuple>> {
        let _guard = self.state.read().map_err(|_| Self::poisoned())?;
        Ok(self.storage.get_output(leaf_index)?)
    }

    /// Recomputes a node's hash from its currently-populated children,
    /// reading each child fresh from storage. `populated` is the number
    /// of children this node currently has — derivable purely from
    /// position arithmetic under strictly left-to-right insertion, so
    /// this never needs to probe storage to find out how many exist.
    fn recompute_node(&self, layer: u32, node_index: u64, populated: u64) -> TreeResult<TreeNode> {
        let width = if layer == 0 {
            self.config.leaf_branch_width
        } else {
            self.config.node_branch_width
        };
        let group_start = node_index * width;
        let mut slots = Vec::with_capacity(populated as usize);
        for offset in 0..populated {
            let child_index = group_start + offset;
            let scalar = if layer == 0 {
                let tuple = self.storage.get_output(child_index)?.ok_or_else(|| {
                    TreeError::IntegrityFailure(
                        TreeIndex::new(layer, node_index),
                        format!("missing output {child_index}"),
                    )
                })?;
                leaf_slot_scalar(&tuple)
            } else {
                let child = self
                    .storage
                    .get_node(TreeIndex::new(layer - 1, child_index))?
                    .ok_or_else(|| {
                        TreeError::IntegrityFailure(
                            TreeIndex::new(layer, node_index),
                            format!("missing child node at layer {} index {child_index}", layer - 1),
                        )
                    })?;
                child_slot_scalar(&child)
            };
            slots.push(scalar);
        }
        Ok(TreeNode::new(h_layer(&slots), populated))
    }

    /// Absorbs one leaf, updating every ancestor on its path up to the
    /// current (possibly newly-created) top layer.
    fn insert_leaf(&self, leaf_index: u64, tuple: OutputTuple) -> TreeResult<()> {
        self.storage.store_output(leaf_index, tuple)?;

        let leaf_width = self.config.leaf_branch_width;
        let node_width = self.config.node_branch_width;

        let mut layer = 0u32;
        let mut node_index = leaf_index / leaf_width;
        let mut populated = (leaf_index % leaf_width) + 1;

        loop {
            if layer >= self.config.max_depth {
                return Err(TreeError::TreeFull);
            }

            let node = self.recompute_node(layer, node_index, populated)?;
            self.storage.store_node(TreeIndex::new(layer, node_index), node)?;
            if layer + 1 > self.depth()? {
                self.set_depth(layer + 1)?;
            }

            let width = if layer == 0 { leaf_width } else { node_width };
            let is_current_top = layer + 1 == self.depth()?;
            let is_full = populated == width;

            if is_current_top && !is_full {
                return Ok(());
            }
            if is_current_top && is_full {
                // node_index is always 0 at the current top layer under
                // strictly sequential insertion; spawn a new top layer
                // above it.
                crate::logging::log_tree_event("layer_closed", leaf_index + 1, layer + 1, true, None);
                layer += 1;
                node_index = 0;
                populated = 1;
                continue;
            }

            // A higher layer already exists; this node is one of its
            // children, so propagate the updated commitment upward.
            let parent_index = node_index / node_width;
            populated = (node_index % node_width) + 1;
            node_index = parent_index;
            layer += 1;
        }
    }

    /// Retries `commit_batch` a bounded number of times before surfacing
    /// a storage failure, logging each retry and the eventual failure.
    fn commit_with_retry(&self) -> TreeResult<()> {
        let mut attempt = 1u32;
        loop {
            match self.storage.commit_batch() {
                Ok(()) => return Ok(()),
                Err(err) if attempt < COMMIT_RETRY_ATTEMPTS => {
                    tracing::warn!(attempt, error = %err, "retrying storage commit");
                    attempt += 1;
                }
                Err(err) => {
                    let tree_err = TreeError::Storage(err);
                    tracing::error!(kind = "storage_commit_failed", error = %tree_err, "storage commit exhausted retries");
                    return Err(tree_err);
                }
            }
        }
    }

    /// Inserts one output. Returns its leaf index.
    pub fn add_output(&self, tuple: OutputTuple) -> TreeResult<u64> {
        if !tuple.is_valid() {
            return Err(TreeError::InvalidOutput(OutputTupleError::InvalidTuple));
        }
        let mut guard = self.state.write().map_err(|_| Self::poisoned())?;
        if guard.fatal {
            return Err(TreeError::Fatal);
        }

        let leaf_index = self.storage.get_output_count()?;
        if (leaf_index as u128) >= self.config.capacity() {
            return Err(TreeError::TreeFull);
        }

        self.storage.begin_batch()?;
        match self.insert_leaf(leaf_index, tuple) {
            Ok(()) => {
                self.commit_with_retry()?;
                let depth = self.depth().unwrap_or(0);
                crate::logging::log_tree_event("insert", leaf_index + 1, depth, true, None);
                Ok(leaf_index)
            }
            Err(err) => {
                let _ = self.storage.abort_batch();
                mark_fatal(&mut guard, &err);
                let depth = self.depth().unwrap_or(0);
                crate::logging::log_tree_event("insert", leaf_index, depth, false, Some(&err.to_string()));
                Err(err)
            }
        }
    }

    /// Inserts several outputs under one batch. Returns their leaf
    /// indices in insertion order.
    pub fn add_outputs(&self, tuples: &[OutputTuple]) -> TreeResult<Vec<u64>> {
        for tuple in tuples {
            if !tuple.is_valid() {
                return Err(TreeError::InvalidOutput(OutputTupleError::InvalidTuple));
            }
        }
        let mut guard = self.state.write().map_err(|_| Self::poisoned())?;
        if guard.fatal {
            return Err(TreeError::Fatal);
        }

        let mut leaf_index = self.storage.get_output_count()?;
        if leaf_index as u128 + tuples.len() as u128 > self.config.capacity() {
            return Err(TreeError::TreeFull);
        }

        self.storage.begin_batch()?;
        let mut indices = Vec::with_capacity(tuples.len());
        let result = (|| -> TreeResult<()> {
            for tuple in tuples {
                self.insert_leaf(leaf_index, *tuple)?;
                indices.push(leaf_index);
                leaf_index += 1;
            }
            Ok(())
        })();

        match result {
            Ok(()) => {
                self.commit_with_retry()?;
                let depth = self.depth().unwrap_or(0);
                crate::logging::log_tree_event("batch_insert", indices.len() as u64, depth, true, None);
                Ok(indices)
            }
            Err(err) => {
                let _ = self.storage.abort_batch();
                mark_fatal(&mut guard, &err);
                let depth = self.depth().unwrap_or(0);
                crate::logging::log_tree_event(
                    "batch_insert",
                    tuples.len() as u64,
                    depth,
                    false,
                    Some(&err.to_string()),
                );
                Err(err)
            }
        }
    }

    /// The sibling path from `leaf_index` to the current root, or `None`
    /// if `leaf_index` has not been inserted.
    pub fn get_branch(&self, leaf_index: u64) -> TreeResult<Option<TreeBranch>> {
        let _guard = self.state.read().map_err(|_| Self::poisoned())?;
        let output_count = self.storage.get_output_count()?;
        if leaf_index >= output_count {
            return Ok(None);
        }

        let depth = self.depth()?;
        let mut layers = Vec::with_capacity(depth as usize);
        let mut child_global_index = leaf_index;

        for layer in 0..depth {
            let width = if layer == 0 {
                self.config.leaf_branch_width
            } else {
                self.config.node_branch_width
            };
            let containing_node_index = child_global_index / width;
            let position = (child_global_index % width) as usize;
            let group_start = containing_node_index * width;

            let mut siblings = Vec::with_capacity(width as usize - 1);
            for slot in 0..width {
                if slot as usize == position {
                    continue;
                }
                let sibling_global = group_start + slot;
                let scalar = if layer == 0 {
                    match self.storage.get_output(sibling_global)? {
                        Some(tuple) => leaf_slot_scalar(&tuple),
                        None => Scalar::zero(),
                    }
                } else {
                    match self
                        .storage
                        .get_node(TreeIndex::new(layer - 1, sibling_global))?
                    {
                        Some(node) => child_slot_scalar(&node),
                        None => Scalar::zero(),
                    }
                };
                siblings.push(scalar);
            }
            layers.push(siblings);
            child_global_index = containing_node_index;
        }

        Ok(Some(TreeBranch::new(leaf_index, layers)))
    }

    /// Replays every stored node from its children and checks it against
    /// what is persisted, bottom-up.
    pub fn verify_integrity(&self) -> TreeResult<()> {
        let _guard = self.state.read().map_err(|_| Self::poisoned())?;
        self.verify_locked()
    }

    fn verify_locked(&self) -> TreeResult<()> {
        let output_count = self.storage.get_output_count()?;
        if output_count == 0 {
            return Ok(());
        }
        let depth = self.depth()?;
        let mut layer_count = output_count;

        for layer in 0..depth {
            let width = if layer == 0 {
                self.config.leaf_branch_width
            } else {
                self.config.node_branch_width
            };
            let num_nodes = ceil_div(layer_count, width);
            for node_index in 0..num_nodes {
                let idx = TreeIndex::new(layer, node_index);
                let stored = self.storage.get_node(idx)?.ok_or_else(|| {
                    TreeError::IntegrityFailure(idx, "missing node".to_string())
                });
                let stored = match stored {
                    Ok(stored) => stored,
                    Err(err) => {
                        crate::logging::log_tree_event(
                            "integrity_check",
                            output_count,
                            depth,
                            false,
                            Some(&err.to_string()),
                        );
                        return Err(err);
                    }
                };
                let group_start = node_index * width;
                let group_end = ((node_index + 1) * width).min(layer_count);
                let populated = group_end - group_start;
                let recomputed = self.recompute_node(layer, node_index, populated)?;
                if recomputed.hash != stored.hash || recomputed.child_count != stored.child_count {
                    let err = TreeError::IntegrityFailure(
                        idx,
                        "recomputed hash does not match stored node".to_string(),
                    );
                    crate::logging::log_tree_event(
                        "integrity_check",
                        output_count,
                        depth,
                        false,
                        Some(&err.to_string()),
                    );
                    return Err(err);
                }
            }
            layer_count = num_nodes;
        }
        crate::logging::log_tree_event("integrity_check", output_count, depth, true, None);
        Ok(())
    }

    /// Deletes every stored node and reinserts every output from
    /// scratch, verifying the root is unchanged. Clears the fatal flag
    /// on success; sets it on failure (a rebuild that cannot reproduce
    /// the prior root, or errors out partway, leaves the tree in a state
    /// no caller should trust without investigation).
    pub fn rebuild(&self) -> TreeResult<()> {
        let mut guard = self.state.write().map_err(|_| Self::poisoned())?;
        let output_count = self.storage.get_output_count()?;
        let prior_root = if guard.fatal {
            None
        } else {
            Some(self.root_locked()?)
        };

        self.storage.begin_batch()?;
        let result = (|| -> TreeResult<()> {
            self.delete_all_nodes(output_count)?;
            self.set_depth(0)?;
            for leaf_index in 0..output_count {
                let tuple = self.storage.get_output(leaf_index)?.ok_or_else(|| {
                    TreeError::RebuildFailed(format!("missing output {leaf_index}"))
                })?;
                self.insert_leaf(leaf_index, tuple)?;
            }
            Ok(())
        })();

        match result {
            Ok(()) => {
                self.commit_with_retry()?;
                let new_root = self.root_locked()?;
                if let Some(prior) = prior_root {
                    if prior != new_root {
                        guard.fatal = true;
                        let err = TreeError::RebuildFailed("root changed after rebuild".to_string());
                        let depth = self.depth().unwrap_or(0);
                        crate::logging::log_tree_event(
                            "rebuild",
                            output_count,
                            depth,
                            false,
                            Some(&err.to_string()),
                        );
                        return Err(err);
                    }
                }
                guard.fatal = false;
                let depth = self.depth().unwrap_or(0);
                crate::logging::log_tree_event("rebuild", output_count, depth, true, None);
                Ok(())
            }
            Err(err) => {
                let _ = self.storage.abort_batch();
                guard.fatal = true;
                crate::logging::log_tree_event("rebuild", output_count, 0, false, Some(&err.to_string()));
                Err(err)
            }
        }
    }

    fn delete_all_nodes(&self, output_count: u64) -> TreeResult<()> {
        if output_count == 0 {
            return Ok(());
        }
        let mut layer_count = output_count;
        let mut layer = 0u32;
        loop {
            let width = if layer == 0 {
                self.config.leaf_branch_width
            } else {
                self.config.node_branch_width
            };
            let num_nodes = ceil_div(layer_count, width);
            for node_index in 0..num_nodes {
                self.storage.delete_node(TreeIndex::new(layer, node_index))?;
            }
            layer += 1;
            if num_nodes <= 1 {
                break;
            }
            layer_count = num_nodes;
        }
        Ok(())
    }

    /// Writes a root checkpoint to metadata so a later `load()` can
    /// confirm cached state is trustworthy without walking every node.
    pub fn save(&self) -> TreeResult<()> {
        let _guard = self.state.read().map_err(|_| Self::poisoned())?;
        let root = self.root_locked()?;
        self.storage
            .store_metadata(SCHEMA_VERSION_KEY, vec![SCHEMA_VERSION])?;
        self.storage
            .store_metadata(ROOT_CHECKPOINT_KEY, root.to_bytes().to_vec())?;
        self.storage.sync()?;
        Ok(())
    }

    /// Validates a prior [`Self::save`] checkpoint against the tree's
    /// actually-replayed root. A stale or absent-but-expected checkpoint
    /// triggers [`Self::rebuild`] rather than silently carrying on —
    /// cached metadata is never trusted over the replayed state. A
    /// schema version from a future layout is reported, not rebuilt
    /// past.
    pub fn load(&self) -> TreeResult<()> {
        let schema = match self.storage.get_metadata(SCHEMA_VERSION_KEY)? {
            Some(bytes) => bytes,
            None => return Ok(()),
        };
        if schema.len() != 1 || schema[0] != SCHEMA_VERSION {
            let found = schema.first().copied().unwrap_or(0);
            return Err(TreeError::SchemaVersionMismatch(found, SCHEMA_VERSION));
        }

        let checkpoint = match self.storage.get_metadata(ROOT_CHECKPOINT_KEY)? {
            Some(bytes) => bytes,
            None => return Ok(()),
        };
        if checkpoint.len() != 32 {
            return Err(TreeError::CorruptCheckpoint(format!(
                "expected 32-byte root checkpoint, got {} bytes",
                checkpoint.len()
            )));
        }
        let mut buf = [0u8; 32];
        buf.copy_from_slice(&checkpoint);
        let checkpoint_root = Point::from_canonical_bytes(&buf)
            .map_err(|e| TreeError::CorruptCheckpoint(e.to_string()))?;

        let current_root = self.get_root()?;
        if current_root == checkpoint_root {
            return Ok(());
        }
        tracing::warn!(
            kind = "checkpoint_mismatch",
            "root checkpoint does not match replayed state; rebuilding"
        );
        self.rebuild()
    }

    /// Writes every output's 96-byte wire form, in leaf order, to
    /// `writer`. Returns the number of outputs written.
    pub fn export_outputs<W: Write>(&self, mut writer: W) -> TreeResult<u64> {
        let _guard = self.state.read().map_err(|_| Self::poisoned())?;
        let output_count = self.storage.get_output_count()?;
        for leaf_index in 0..output_count {
            let tuple = self.storage.get_output(leaf_index)?.ok_or_else(|| {
                TreeError::IntegrityFailure(
                    TreeIndex::new(0, leaf_index),
                    format!("missing output {leaf_index} during export"),
                )
            })?;
            writer
                .write_all(&tuple.serialize())
                .map_err(export_io_error)?;
        }
        Ok(output_count)
    }

    /// Reads a stream of 96-byte output records produced by
    /// [`Self::export_outputs`] and inserts them in order.
    pub fn import_outputs<R: Read>(&self, mut reader: R) -> TreeResult<u64> {
        let mut buf = [0u8; OUTPUT_TUPLE_WIRE_SIZE];
        let mut tuples = Vec::new();
        loop {
            match reader.read_exact(&mut buf) {
                Ok(()) => {
                    let tuple = OutputTuple::deserialize(&buf)?;
                    tuples.push(tuple);
                }
                Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(err) => return Err(export_io_error(err)),
            }
        }
        let imported = tuples.len() as u64;
        if !tuples.is_empty() {
            self.add_outputs(&tuples)?;
        }
        Ok(imported)
    }
}

fn export_io_error(err: io::Error) -> TreeError {
    TreeError::RebuildFailed(format!("io error: {err}"))
}

fn mark_fatal(state: &mut TreeState, err: &TreeError) {
    if matches!(
        err,
        TreeError::Storage(crate::storage::StorageError::CorruptNode(..))
            | TreeError::Storage(crate::storage::StorageError::CorruptOutput(..))
            | TreeError::IntegrityFailure(..)
    ) {
        state.fatal = true;
    }
}
