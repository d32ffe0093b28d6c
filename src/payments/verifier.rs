// Transfer verification against raw chain data
//
// Confirms that a claimed transaction signature actually paid the expected
// recipient in the expected currency, and computes the fee-adjusted net
// amount. Verification is a side-effect-free read: it holds no locks and
// touches no ledger state. Replay protection lives at the settlement
// boundary, which short-circuits on consumed signatures before re-running
// inference here.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;

use crate::errors::PaymentError;
use crate::logger::{ log, LogTag };
use crate::payments::balance::{
    account_keys_from_transaction,
    infer_native_transfer,
    infer_token_transfer,
};
use crate::payments::types::{ Currency, TransferResult, VerifiedPayment };
use crate::rpc::{ lamports_to_sol, ChainClient };

pub struct TransferVerifier<C: ChainClient> {
    chain: Arc<C>,
}

impl<C: ChainClient> TransferVerifier<C> {
    pub fn new(chain: Arc<C>) -> Self {
        Self { chain }
    }

    /// Confirm a transfer and report the inferred payer, recipient and
    /// amount. Unfetchable transactions and transactions without metadata
    /// yield `confirmed = false` rather than an error.
    ///
    /// This is informational only: authorization decisions go through
    /// `verify_transfer`, which validates against an expected recipient.
    pub async fn transfer_result(
        &self,
        signature: &str,
        currency: &Currency
    ) -> Result<TransferResult, PaymentError> {
        let Some(tx) = self.chain.fetch_transaction(signature).await? else {
            return Ok(TransferResult::unconfirmed());
        };
        let Some(account_keys) = account_keys_from_transaction(&tx) else {
            return Ok(TransferResult::unconfirmed());
        };
        let Some(meta) = tx.meta.as_ref() else {
            return Ok(TransferResult::unconfirmed());
        };

        let (amount, from, to) = match currency {
            Currency::Credits => {
                return Err(PaymentError::UnsupportedCurrency {
                    currency: currency.code(),
                });
            }
            Currency::Sol => {
                let transfer = infer_native_transfer(&meta.pre_balances, &meta.post_balances);
                // The network fee is always paid by the payer and is not part
                // of the economically transferred amount
                let net_lamports = transfer.decrease_lamports.saturating_sub(meta.fee);
                (
                    lamports_to_sol(net_lamports),
                    account_keys.get(transfer.payer_index).cloned(),
                    transfer.recipient_index.and_then(|i| account_keys.get(i).cloned()),
                )
            }
            Currency::Token(mint) => {
                let transfer = infer_token_transfer(meta, mint, &account_keys);
                // Token-transfer fees are paid in SOL through a separate
                // native balance line, so no fee subtraction here
                (transfer.amount, transfer.sender, transfer.receiver)
            }
        };

        Ok(TransferResult {
            confirmed: true,
            amount: Some(amount),
            from,
            to,
            account_keys: Some(account_keys),
        })
    }

    /// Verify that `signature` transferred a positive amount of `currency`
    /// to `expected_recipient` (case-sensitive address match).
    pub async fn verify_transfer(
        &self,
        signature: &str,
        expected_recipient: &str,
        currency: &Currency
    ) -> Result<VerifiedPayment, PaymentError> {
        log(
            LogTag::Payments,
            "VERIFY",
            &format!("Verifying transfer {} ({} to {})", signature, currency, expected_recipient)
        );

        let tx = self.chain
            .fetch_transaction(signature).await?
            .ok_or_else(|| PaymentError::NotFound { signature: signature.to_string() })?;

        let account_keys = account_keys_from_transaction(&tx).ok_or_else(|| {
            PaymentError::NotFound { signature: signature.to_string() }
        })?;
        let meta = tx.meta
            .as_ref()
            .ok_or_else(|| PaymentError::NotFound { signature: signature.to_string() })?;

        let (amount, payer, recipient) = match currency {
            Currency::Credits => {
                return Err(PaymentError::UnsupportedCurrency {
                    currency: currency.code(),
                });
            }
            Currency::Sol => {
                let transfer = infer_native_transfer(&meta.pre_balances, &meta.post_balances);
                if transfer.payer_ambiguous {
                    return Err(PaymentError::AmbiguousTransfer {
                        signature: signature.to_string(),
                    });
                }
                let net_lamports = transfer.decrease_lamports.saturating_sub(meta.fee);
                (
                    lamports_to_sol(net_lamports),
                    account_keys.get(transfer.payer_index).cloned(),
                    transfer.recipient_index.and_then(|i| account_keys.get(i).cloned()),
                )
            }
            Currency::Token(mint) => {
                let transfer = infer_token_transfer(meta, mint, &account_keys);
                (transfer.amount, transfer.sender, transfer.receiver)
            }
        };

        let recipient = match recipient {
            Some(r) if r == expected_recipient => r,
            found => {
                log(
                    LogTag::Payments,
                    "WARNING",
                    &format!(
                        "Transfer {} recipient mismatch: expected {}, found {:?}",
                        signature,
                        expected_recipient,
                        found
                    )
                );
                return Err(PaymentError::RecipientMismatch {
                    expected: expected_recipient.to_string(),
                    found,
                });
            }
        };

        if amount <= 0.0 {
            return Err(PaymentError::AmountInsufficient { amount, required: 0.0 });
        }

        let payment = VerifiedPayment {
            signature: signature.to_string(),
            currency: currency.clone(),
            amount,
            payer: payer.unwrap_or_else(|| "unknown".to_string()),
            recipient,
        };

        log(
            LogTag::Payments,
            "SUCCESS",
            &format!(
                "Transfer {} confirmed: {} {} from {} to {}",
                signature,
                payment.amount,
                payment.currency,
                payment.payer,
                payment.recipient
            )
        );

        Ok(payment)
    }

    /// Verify multiple transfers concurrently. Each verification is an
    /// independent read, so they run fully in parallel.
    pub async fn verify_transfers_batch(
        &self,
        requests: Vec<(String, String, Currency)>
    ) -> HashMap<String, Result<VerifiedPayment, PaymentError>> {
        let tasks: Vec<_> = requests
            .into_iter()
            .map(|(signature, expected_recipient, currency)| async move {
                let result = self.verify_transfer(
                    &signature,
                    &expected_recipient,
                    &currency
                ).await;
                (signature, result)
            })
            .collect();

        join_all(tasks).await.into_iter().collect()
    }
}
