// Payment verification and multi-currency settlement
//
// The flow: a priced action (contest entry, prompt purchase) requests a
// quote -> resolver picks BALANCE or WALLET -> if wallet, the client later
// supplies a transaction signature -> the transfer verifier fetches and
// confirms it -> the ledger credits/debits balances and records the
// signature as consumed, atomically.

pub mod balance;
pub mod ledger;
pub mod ownership;
pub mod resolver;
pub mod settlement;
pub mod types;
pub mod verifier;

pub use ledger::{ ApplyOutcome, LedgerDatabase };
pub use ownership::verify_wallet_ownership;
pub use resolver::resolve_payment_method;
pub use settlement::{ BalanceSettlement, PaymentEngine };
pub use types::*;
pub use verifier::TransferVerifier;
