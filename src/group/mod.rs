//! Ed25519 group primitives.
//!
//! Everything downstream of this module — the output tuple, the tree's
//! hash construction, the wallet's key images — is built exclusively out
//! of `Scalar` and `Point`. No other module reaches into
//! `curve25519_dalek` directly; that keeps the one chain-critical piece
//! of algebra (`Point::hash_to_point`) swappable in one place.

mod point;
mod scalar;

pub use point::Point;
pub use scalar::Scalar;

use thiserror::Error;

/// Errors raised decoding bytes into group elements.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GroupError {
    #[error("invalid encoding: {0}")]
    InvalidEncoding(&'static str),
}
