use thiserror::Error;

/// Errors from the chain-data RPC collaborator
#[derive(Error, Debug)]
pub enum RpcError {
    #[error("Network error: {0}")] Network(#[from] reqwest::Error),

    #[error("RPC error: {0}")] Rpc(String),

    #[error("Invalid response: {0}")] InvalidResponse(String),

    #[error("Config error: {0}")] Config(String),
}

/// Typed outcomes of the payment verification and settlement boundary.
///
/// Rejections are explicit values, never panics. The only variants that
/// represent infrastructure failure (and therefore must not be treated as
/// a user-facing rejection) are `Rpc` and `Database`.
#[derive(Error, Debug)]
pub enum PaymentError {
    /// Signature unresolvable or transaction unconfirmed. Retryable by the caller.
    #[error("Transaction not found or not confirmed yet: {signature}")] NotFound {
        signature: String,
    },

    /// Transferred to the wrong address. Permanent rejection.
    #[error("Transfer recipient {found:?} does not match expected {expected}")] RecipientMismatch {
        expected: String,
        found: Option<String>,
    },

    /// Transferred amount missing or below required. Needs a new transaction.
    #[error("Insufficient transferred amount: {amount} (required at least {required})")] AmountInsufficient {
        amount: f64,
        required: f64,
    },

    /// Two distinct accounts share the largest balance decrease. Rejected
    /// instead of guessing which one funded the transfer.
    #[error("Ambiguous transfer {signature}: multiple accounts share the largest balance decrease")] AmbiguousTransfer {
        signature: String,
    },

    /// Verification requested for a currency that cannot settle on-chain,
    /// or a payment made in a currency the quote does not accept.
    #[error("Currency not accepted for on-chain settlement: {currency}")] UnsupportedCurrency {
        currency: String,
    },

    /// Cryptographic wallet-ownership proof failed. Permanent rejection.
    #[error("Wallet ownership signature invalid")] SignatureInvalid,

    /// Internal-balance debit would go negative. Surfaced as a funding
    /// problem, never coerced to zero.
    #[error("Insufficient {currency} balance: need {required}, have {available}")] LedgerInsufficientBalance {
        currency: String,
        required: f64,
        available: f64,
    },

    #[error("RPC error: {0}")] Rpc(#[from] RpcError),

    #[error("Database error: {0}")] Database(#[from] rusqlite::Error),

    #[error("Storage error: {0}")] Storage(String),
}

impl PaymentError {
    /// Whether the caller may retry the same signature later
    pub fn is_retryable(&self) -> bool {
        match self {
            PaymentError::NotFound { .. } => true,
            PaymentError::Rpc(_) => true,
            PaymentError::Database(_) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        let not_found = PaymentError::NotFound { signature: "sig".to_string() };
        assert!(not_found.is_retryable());

        let mismatch = PaymentError::RecipientMismatch {
            expected: "A".to_string(),
            found: Some("B".to_string()),
        };
        assert!(!mismatch.is_retryable());

        let insufficient = PaymentError::LedgerInsufficientBalance {
            currency: "SOL".to_string(),
            required: 1.0,
            available: 0.5,
        };
        assert!(!insufficient.is_retryable());
    }
}
