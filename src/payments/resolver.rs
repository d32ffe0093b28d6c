// Payment-method resolution
//
// Deterministically picks internal-balance or external-wallet settlement for
// a priced action. The decision is derived, never persisted: balances and
// configuration can change between quoting and committing, so the settlement
// engine recomputes it immediately before an internal-balance settlement.

use std::collections::HashMap;

use crate::payments::types::{ AllowedMethods, Currency, PaymentMethod, PriceSpec };

/// Pick the settlement method for a priced action.
///
/// - Free actions settle from balance (nothing to reconcile).
/// - A single-method policy is forced regardless of balance sufficiency:
///   wallet-only means on-chain payment even when the internal balance would
///   cover it, and balance-only means the debit itself fails downstream with
///   an insufficient-funds error rather than silently falling back.
/// - With both permitted, wallet is chosen only when the balance in the
///   required currency is strictly less than the required amount; an exactly
///   sufficient balance settles internally.
pub fn resolve_payment_method(
    price: &PriceSpec,
    allowed: &AllowedMethods,
    balances: &HashMap<Currency, f64>
) -> PaymentMethod {
    if price.is_free() {
        return PaymentMethod::Balance;
    }

    match (allowed.balance, allowed.wallet) {
        (true, false) => {
            return PaymentMethod::Balance;
        }
        (false, true) => {
            return PaymentMethod::Wallet;
        }
        // No methods configured behaves like balance-only
        (false, false) => {
            return PaymentMethod::Balance;
        }
        (true, true) => {}
    }

    let currency = match &price.currency {
        Some(c) => c,
        None => {
            return PaymentMethod::Balance;
        }
    };

    let available = balances.get(currency).copied().unwrap_or(0.0);
    if available < price.amount {
        PaymentMethod::Wallet
    } else {
        PaymentMethod::Balance
    }
}
