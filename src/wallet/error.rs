//! Errors surfaced by [`crate::wallet::WalletTracking`].

use thiserror::Error;

use crate::tree::TreeError;
use crate::wallet::record::Outpoint;

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("insufficient funds: need {target}, have {available} spendable")]
    InsufficientFunds { target: u64, available: u64 },
    #[error("leaf index {0} is not present in the tree; tree and wallet have diverged")]
    TreeMissingLeaf(u64),
    #[error("output at {0:?} was already marked spent by a different transaction")]
    StaleOutput(Outpoint),
    #[error("output at {0:?} is already tracked")]
    DuplicateOutput(Outpoint),
    #[error("output at {0:?} is not tracked by this wallet")]
    UnknownOutput(Outpoint),
    #[error("computed key image does not match the output's stored key-image relation")]
    KeyImageMismatch,
    #[error(transparent)]
    Tree(#[from] TreeError),
}

pub type WalletResult<T> = Result<T, WalletError>;
