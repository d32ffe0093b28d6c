// Core payment domain types

use serde::{ Deserialize, Serialize };

/// A currency tracked by the ledger. Explicit tags, never inferred from
/// amount magnitude: native and token transfers verify through disjoint
/// code paths keyed by the mint address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Currency {
    /// Internal platform unit, never settled on-chain
    Credits,
    /// Native SOL
    Sol,
    /// Tracked SPL token, identified by its mint address
    Token(String),
}

impl Currency {
    /// Stable string code used as the ledger storage key
    pub fn code(&self) -> String {
        match self {
            Currency::Credits => "CREDITS".to_string(),
            Currency::Sol => "SOL".to_string(),
            Currency::Token(mint) => mint.clone(),
        }
    }

    pub fn from_code(code: &str) -> Currency {
        match code {
            "CREDITS" => Currency::Credits,
            "SOL" => Currency::Sol,
            mint => Currency::Token(mint.to_string()),
        }
    }

    /// Whether this currency can settle through an on-chain wallet payment
    pub fn is_on_chain(&self) -> bool {
        !matches!(self, Currency::Credits)
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Result of confirming a transfer from raw transaction data.
/// Produced once per verification call, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferResult {
    pub confirmed: bool,
    pub amount: Option<f64>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub account_keys: Option<Vec<String>>,
}

impl TransferResult {
    /// The result for a transaction that could not be fetched or has no metadata
    pub fn unconfirmed() -> Self {
        Self {
            confirmed: false,
            amount: None,
            from: None,
            to: None,
            account_keys: None,
        }
    }
}

/// A transfer that passed recipient/currency validation. Durable record;
/// at most one per signature is ever consumed for crediting purposes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifiedPayment {
    pub signature: String,
    pub currency: Currency,
    pub amount: f64,
    pub payer: String,
    pub recipient: String,
}

/// How a priced action settles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentMethod {
    /// Debit the user's internal balance
    Balance,
    /// External on-chain wallet payment, verified by signature
    Wallet,
}

/// The set of payment methods the platform configuration permits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllowedMethods {
    pub balance: bool,
    pub wallet: bool,
}

impl AllowedMethods {
    pub fn from_labels(labels: &[String]) -> Self {
        Self {
            balance: labels.iter().any(|l| l == "balance"),
            wallet: labels.iter().any(|l| l == "wallet"),
        }
    }
}

/// Price of an action. No fee or no currency means the action is free
/// and trivially settles from balance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSpec {
    pub amount: f64,
    pub currency: Option<Currency>,
}

impl PriceSpec {
    pub fn free() -> Self {
        Self { amount: 0.0, currency: None }
    }

    pub fn new(amount: f64, currency: Currency) -> Self {
        Self { amount, currency: Some(currency) }
    }

    pub fn is_free(&self) -> bool {
        self.amount <= 0.0 || self.currency.is_none()
    }
}

/// What kind of priced action a payment settles
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SaleKind {
    /// Prompt-marketplace purchase: seller is credited net of commission
    MarketplacePurchase {
        seller_id: String,
    },
    /// Contest entry fee: the prize pool is credited in full, no split
    ContestEntry,
}

/// A priced action awaiting settlement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sale {
    pub buyer_id: String,
    pub kind: SaleKind,
    pub price: PriceSpec,
}

/// Signed balance movements produced by one settlement
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SettlementSplit {
    pub seller_credit: f64,
    pub commission_credit: f64,
    pub pool_credit: f64,
}

/// Result of verify-and-settle. `already_settled` marks the idempotent
/// replay path: the original settlement is returned and no second ledger
/// mutation happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementOutcome {
    pub payment: VerifiedPayment,
    pub split: SettlementSplit,
    pub already_settled: bool,
}
