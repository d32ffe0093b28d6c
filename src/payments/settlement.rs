// Settlement engine - the API consumed by priced actions
//
// Composes the transfer verifier and the ledger: a wallet payment is
// verified against chain data, checked against the sale price, and applied
// to the ledger in the same atomic step that consumes the signature.
// Internal-balance settlements recompute sufficiency at commit time, so a
// quote-time BALANCE decision that went stale surfaces a fresh wallet
// prompt instead of failing silently.

use std::sync::Arc;

use crate::errors::PaymentError;
use crate::global::Configs;
use crate::logger::{ log, LogTag };
use crate::payments::ledger::{ ApplyOutcome, LedgerDatabase };
use crate::payments::ownership;
use crate::payments::resolver::resolve_payment_method;
use crate::payments::types::{
    AllowedMethods,
    Currency,
    PaymentMethod,
    PriceSpec,
    Sale,
    SettlementOutcome,
    SettlementSplit,
    TransferResult,
    VerifiedPayment,
};
use crate::payments::verifier::TransferVerifier;
use crate::rpc::{ ChainClient, RpcClient };

/// Outcome of an internal-balance settlement attempt
#[derive(Debug, Clone, PartialEq)]
pub enum BalanceSettlement {
    /// The buyer's balance covered the price and the sale settled
    Settled(SettlementSplit),
    /// The balance no longer covers the price and wallet payments are
    /// permitted: the caller must surface a fresh on-chain payment prompt
    WalletRequired {
        currency: Currency,
        required: f64,
        available: f64,
    },
}

pub struct PaymentEngine<C: ChainClient> {
    verifier: TransferVerifier<C>,
    ledger: Arc<LedgerDatabase>,
    allowed: AllowedMethods,
}

impl PaymentEngine<RpcClient> {
    /// Build the production engine from the loaded configuration
    pub fn from_configs(configs: &Configs) -> Result<Self, PaymentError> {
        let ledger = LedgerDatabase::new(
            &configs.ledger_db_path,
            configs.default_commission_percent,
            configs.platform_account.clone(),
            configs.prize_pool_account.clone()
        )?;

        Ok(
            Self::new(
                Arc::new(RpcClient::from_configs(configs)),
                Arc::new(ledger),
                AllowedMethods::from_labels(&configs.allowed_payment_methods)
            )
        )
    }
}

impl<C: ChainClient> PaymentEngine<C> {
    pub fn new(chain: Arc<C>, ledger: Arc<LedgerDatabase>, allowed: AllowedMethods) -> Self {
        Self {
            verifier: TransferVerifier::new(chain),
            ledger,
            allowed,
        }
    }

    /// Quote-time payment method decision for a user. Derived, not
    /// persisted: settlement recomputes it before committing.
    pub fn resolve_method(
        &self,
        user_id: &str,
        price: &PriceSpec
    ) -> Result<PaymentMethod, PaymentError> {
        let balances = self.ledger.get_balances(user_id)?;
        Ok(resolve_payment_method(price, &self.allowed, &balances))
    }

    /// Informational transfer confirmation (no ledger interaction)
    pub async fn confirm_transfer(
        &self,
        signature: &str,
        currency: &Currency
    ) -> Result<TransferResult, PaymentError> {
        self.verifier.transfer_result(signature, currency).await
    }

    /// Verify a wallet payment and settle the sale.
    ///
    /// Retried client submissions are the expected path, not an edge case:
    /// an already-consumed signature short-circuits before any chain fetch
    /// or inference and returns the original settlement unchanged.
    pub async fn verify_and_settle(
        &self,
        signature: &str,
        expected_recipient: &str,
        currency: &Currency,
        sale: &Sale
    ) -> Result<SettlementOutcome, PaymentError> {
        if let Some((payment, split)) = self.ledger.find_consumed(signature)? {
            log(
                LogTag::Payments,
                "DEBUG",
                &format!("Signature {} already settled, skipping verification", signature)
            );
            return Ok(SettlementOutcome {
                payment,
                split,
                already_settled: true,
            });
        }

        let payment = self.verifier.verify_transfer(signature, expected_recipient, currency).await?;

        if !sale.price.is_free() {
            if let Some(required_currency) = &sale.price.currency {
                if required_currency != currency {
                    return Err(PaymentError::UnsupportedCurrency {
                        currency: currency.code(),
                    });
                }
            }
            if payment.amount < sale.price.amount {
                return Err(PaymentError::AmountInsufficient {
                    amount: payment.amount,
                    required: sale.price.amount,
                });
            }
        }

        match self.ledger.apply_payment(&payment, sale)? {
            ApplyOutcome::Applied(split) =>
                Ok(SettlementOutcome {
                    payment,
                    split,
                    already_settled: false,
                }),
            // A concurrent attempt won the consumption race; return its
            // settlement rather than re-crediting
            ApplyOutcome::AlreadyConsumed(original, split) =>
                Ok(SettlementOutcome {
                    payment: original,
                    split,
                    already_settled: true,
                }),
        }
    }

    /// Settle a sale from the buyer's internal balance.
    ///
    /// The sufficiency check happens inside the ledger transaction, which
    /// is the recompute-before-commit the quote-time decision requires: a
    /// balance that shrank since quoting fails the debit atomically, and
    /// when wallet payments are permitted that failure becomes a
    /// `WalletRequired` transition instead of an error.
    pub fn settle_from_balance(&self, sale: &Sale) -> Result<BalanceSettlement, PaymentError> {
        if sale.price.is_free() {
            return Ok(
                BalanceSettlement::Settled(SettlementSplit {
                    seller_credit: 0.0,
                    commission_credit: 0.0,
                    pool_credit: 0.0,
                })
            );
        }

        match self.ledger.apply_balance_payment(sale) {
            Ok(split) => Ok(BalanceSettlement::Settled(split)),
            Err(PaymentError::LedgerInsufficientBalance { currency, required, available }) if
                self.allowed.wallet
            => {
                log(
                    LogTag::Payments,
                    "WARNING",
                    &format!(
                        "Balance settlement for {} became insufficient ({} < {}), requiring wallet payment",
                        sale.buyer_id,
                        available,
                        required
                    )
                );
                Ok(BalanceSettlement::WalletRequired {
                    currency: Currency::from_code(&currency),
                    required,
                    available,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Prove control of a wallet via a detached signature over a challenge
    /// message. Used for linking wallets to accounts, never for payments.
    pub fn verify_wallet_ownership(
        &self,
        public_key: &str,
        signature: &str,
        message: &str
    ) -> bool {
        ownership::verify_wallet_ownership(public_key, signature, message)
    }

    /// Typed variant of the ownership check for flows that treat a failed
    /// proof as a permanent rejection
    pub fn require_wallet_ownership(
        &self,
        public_key: &str,
        signature: &str,
        message: &str
    ) -> Result<(), PaymentError> {
        if ownership::verify_wallet_ownership(public_key, signature, message) {
            Ok(())
        } else {
            Err(PaymentError::SignatureInvalid)
        }
    }

    /// The verified payment record of a consumed signature, if any
    pub fn find_settlement(
        &self,
        signature: &str
    ) -> Result<Option<VerifiedPayment>, PaymentError> {
        Ok(self.ledger.find_consumed(signature)?.map(|(payment, _)| payment))
    }
}
