//! The wallet tracking layer: owned-output records, spend bookkeeping,
//! balance queries, and membership witness construction.

pub mod error;
pub mod record;
pub mod tracking;
pub mod witness;

pub use error::{WalletError, WalletResult};
pub use record::{Outpoint, WalletOutputRecord};
pub use tracking::WalletTracking;
pub use witness::{build_membership_witness, MembershipWitness};
