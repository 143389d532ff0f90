/// Broadcast of signed transactions, speed-up and cancel
pub mod sender;
/// Lifecycle tracking and chain reconciliation
pub mod tracker;
/// Transaction history types
pub mod types;

pub use sender::TransactionSender;
pub use tracker::{ReconcileOutcome, TransactionTracker};
pub use types::*;

/// Decimal places of the chain's native coin.
pub const NATIVE_TOKEN_DECIMALS: u8 = 18;
