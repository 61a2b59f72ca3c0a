//! The wallet tracking layer: owned-output bookkeeping behind one
//! recursive mutex.

use std::cell::RefCell;
use std::collections::HashMap;

use parking_lot::ReentrantMutex;

use crate::group::Scalar;
use crate::tree::CurveTree;
use crate::wallet::error::{WalletError, WalletResult};
use crate::wallet::record::{Outpoint, WalletOutputRecord};
use crate::wallet::witness::{self, MembershipWitness};

/// Mutable wallet state behind the recursive lock. Confirmations need
/// *some* notion of the current chain height, and the wallet tracking
/// layer takes no chain-handle dependency, so the caller pushes
/// `chain_tip` in via [`WalletTracking::set_chain_tip`] as new blocks
/// are scanned.
struct WalletState {
    records: HashMap<Outpoint, WalletOutputRecord>,
    chain_tip: u64,
}

/// Tracks the outputs a wallet owns: discovery, spend marking, balance
/// queries, input selection, and membership witness construction.
///
/// `WalletTracking` mutations and reads take a recursive wallet mutex:
/// `build_membership_witness` reads tracked state and then calls into
/// the tree while still notionally "inside" the wallet, and a careless
/// caller re-entering from within a callback must not deadlock.
/// `parking_lot::ReentrantMutex` only ever hands out `&T`, so the state
/// it protects is wrapped in a `RefCell` for the interior mutability
/// every write needs.
pub struct WalletTracking {
    state: ReentrantMutex<RefCell<WalletState>>,
}

impl Default for WalletTracking {
    fn default() -> Self {
        Self::new()
    }
}

impl WalletTracking {
    pub fn new() -> Self {
        Self {
            state: ReentrantMutex::new(RefCell::new(WalletState {
                records: HashMap::new(),
                chain_tip: 0,
            })),
        }
    }

    /// Records the current chain height, used by [`Self::spendable_balance`]
    /// and [`Self::pending_balance`] to compute confirmations.
    pub fn set_chain_tip(&self, height: u64) {
        let guard = self.state.lock();
        guard.borrow_mut().chain_tip = height;
    }

    /// Begins tracking a newly-discovered owned output. Rejects a
    /// duplicate outpoint rather than silently overwriting it — a
    /// scanner re-observing the same output is a bug worth surfacing.
    pub fn add_output(&self, record: WalletOutputRecord) -> WalletResult<()> {
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        if state.records.contains_key(&record.outpoint) {
            return Err(WalletError::DuplicateOutput(record.outpoint));
        }
        state.records.insert(record.outpoint, record);
        Ok(())
    }

    /// Marks an output spent by `spending_tx`. Idempotent when called
    /// again with the same `spending_tx`; rejects a second, different
    /// spender as `StaleOutput` (the wallet's view and the chain's view
    /// of this output have diverged).
    pub fn mark_spent(&self, outpoint: Outpoint, spending_tx: [u8; 32]) -> WalletResult<()> {
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        let record = match state.records.get_mut(&outpoint) {
            Some(record) => record,
            None => {
                let err = WalletError::UnknownOutput(outpoint);
                crate::logging::log_wallet_event("spend", 0, false, Some(&err.to_string()));
                return Err(err);
            }
        };
        match record.spending_tx {
            Some(existing) if existing == spending_tx => Ok(()),
            Some(_) => {
                let amount = record.amount;
                let err = WalletError::StaleOutput(outpoint);
                crate::logging::log_wallet_event("spend", amount, false, Some(&err.to_string()));
                Err(err)
            }
            None => {
                record.spent = true;
                record.spending_tx = Some(spending_tx);
                crate::logging::log_wallet_event("spend", record.amount, true, None);
                Ok(())
            }
        }
    }

    pub fn have_output(&self, outpoint: &Outpoint) -> bool {
        let guard = self.state.lock();
        guard.borrow().records.contains_key(outpoint)
    }

    pub fn get_output(&self, outpoint: &Outpoint) -> Option<WalletOutputRecord> {
        let guard = self.state.lock();
        guard.borrow().records.get(outpoint).copied()
    }

    /// True iff some tracked, spent record's key-image hash matches
    /// `key_image_hash`. Lets a caller detect that an output it has not
    /// itself marked spent has nonetheless been spent on-chain.
    pub fn key_image_seen(&self, key_image_hash: Scalar) -> bool {
        let guard = self.state.lock();
        guard
            .borrow()
            .records
            .values()
            .any(|record| record.spent && record.key_image_hash == key_image_hash)
    }

    /// Sum of every tracked output's amount, spent or not.
    pub fn balance(&self) -> u64 {
        let guard = self.state.lock();
        guard.borrow().records.values().map(|r| r.amount).sum()
    }

    fn confirmations(chain_tip: u64, block_height: u64) -> u64 {
        if chain_tip >= block_height {
            chain_tip - block_height + 1
        } else {
            0
        }
    }

    /// Sum of unspent outputs with at least `min_confirmations`
    /// confirmations against the last height set via
    /// [`Self::set_chain_tip`].
    pub fn spendable_balance(&self, min_confirmations: u64) -> u64 {
        let guard = self.state.lock();
        let state = guard.borrow();
        state
            .records
            .values()
            .filter(|r| !r.spent)
            .filter(|r| Self::confirmations(state.chain_tip, r.block_height) >= min_confirmations)
            .map(|r| r.amount)
            .sum()
    }

    /// Sum of unspent outputs with zero confirmations against the last
    /// height set via [`Self::set_chain_tip`] — outputs the wallet has
    /// recorded but the chain tip has not yet caught up to.
    pub fn pending_balance(&self) -> u64 {
        let guard = self.state.lock();
        let state = guard.borrow();
        state
            .records
            .values()
            .filter(|r| !r.spent)
            .filter(|r| Self::confirmations(state.chain_tip, r.block_height) == 0)
            .map(|r| r.amount)
            .sum()
    }

    /// Greedily selects spendable outputs covering `target_amount`:
    /// largest amount first, ties broken by ascending leaf index for
    /// determinism. Fails with `InsufficientFunds` if even every
    /// spendable output together falls short.
    pub fn select_inputs(
        &self,
        target_amount: u64,
        min_confirmations: u64,
    ) -> WalletResult<Vec<WalletOutputRecord>> {
        let guard = self.state.lock();
        let state = guard.borrow();
        let mut candidates: Vec<WalletOutputRecord> = state
            .records
            .values()
            .filter(|r| !r.spent)
            .filter(|r| Self::confirmations(state.chain_tip, r.block_height) >= min_confirmations)
            .copied()
            .collect();
        drop(state);

        candidates.sort_by(|a, b| b.amount.cmp(&a.amount).then(a.leaf_index.cmp(&b.leaf_index)));

        let mut selected = Vec::new();
        let mut accumulated = 0u64;
        for candidate in candidates {
            if accumulated >= target_amount {
                break;
            }
            accumulated = accumulated.saturating_add(candidate.amount);
            selected.push(candidate);
        }

        if accumulated < target_amount {
            return Err(WalletError::InsufficientFunds {
                target: target_amount,
                available: accumulated,
            });
        }
        Ok(selected)
    }

    /// Builds a membership witness for a tracked output. Takes the
    /// wallet lock first, then calls into `tree` — always `wallet ->
    /// tree`, never the reverse, to keep lock ordering consistent.
    pub fn build_membership_witness(
        &self,
        outpoint: &Outpoint,
        message_hash: &[u8],
        tree: &CurveTree,
    ) -> WalletResult<MembershipWitness> {
        let guard = self.state.lock();
        let record = guard
            .borrow()
            .records
            .get(outpoint)
            .copied()
            .ok_or(WalletError::UnknownOutput(*outpoint))?;
        witness::build_membership_witness(&record, message_hash, tree)
    }
}
