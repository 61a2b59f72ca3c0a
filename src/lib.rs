//! Curve Tree — a persistent accumulator over Ed25519 group elements
//! supporting full-chain membership proofs, plus the wallet tracking
//! layer that scans, owns, and spends against it.
//!
//! ## Modules
//!
//! - [`group`] — Ed25519 scalar/point primitives everything else builds on.
//! - [`output`] — the shielded output tuple `(O, I, C)`.
//! - [`tree`] — the curve tree: configuration, hashing, branches, and the
//!   tree itself.
//! - [`storage`] — the pluggable persistent key-value layer behind the tree.
//! - [`wallet`] — owned-output tracking, balances, input selection, and
//!   membership witness construction.
//! - [`interfaces`] — the consensus-facing collaborator traits this crate
//!   expects (`OutputSource`, `ProofSink`, `ProofVerifier`).
//! - [`config`] / [`logging`] / [`common`] — the ambient configuration,
//!   structured logging, and crate-wide error composition.

pub mod common;
pub mod config;
pub mod group;
pub mod interfaces;
pub mod logging;
pub mod output;
pub mod storage;
pub mod tree;
pub mod wallet;

pub use common::{CurveTreeError, Result};
pub use group::{GroupError, Point, Scalar};
pub use interfaces::{OutputSource, ProofSink, ProofVerifier, StubProver};
pub use output::{OutputTuple, OutputTupleError, OUTPUT_TUPLE_WIRE_SIZE};
pub use storage::{MemoryStorage, SledStorage, Storage, StorageError, StorageKind};
pub use tree::{CurveTree, CurveTreeBuilder, TreeBranch, TreeConfig, TreeError, TreeIndex, TreeNode};
pub use wallet::{MembershipWitness, Outpoint, WalletError, WalletOutputRecord, WalletTracking};
