// Balance analysis - account key reconstruction and payer/recipient inference
//
// Payer/recipient identification works on the pre/post balance snapshots in
// transaction metadata rather than parsing transfer-instruction semantics.
// The dominant debit/credit pair of a simple transfer is the true payer and
// recipient. This is a heuristic: callers must additionally validate the
// inferred recipient against an expected address before trusting it.

use std::collections::HashMap;

use crate::rpc::{ TokenBalance, TransactionDetails, TransactionMeta };

/// Reconstruct the full index-addressable account list of a transaction.
///
/// Order is mandatory: static account keys, then loaded writable keys, then
/// loaded readonly keys. Indices in `preBalances`/`postBalances` resolve
/// against exactly this concatenation for versioned transactions.
///
/// Returns `None` when the transaction has no metadata, signaling "not found
/// or not yet confirmed" rather than erroring.
pub fn account_keys_from_transaction(tx: &TransactionDetails) -> Option<Vec<String>> {
    let meta = tx.meta.as_ref()?;

    let mut keys = static_account_keys(&tx.transaction.message);

    if let Some(loaded) = &meta.loaded_addresses {
        keys.extend(loaded.writable.iter().cloned());
        keys.extend(loaded.readonly.iter().cloned());
    }

    Some(keys)
}

/// Extract static account keys from a transaction message.
/// The json encoding yields an array of strings; jsonParsed yields an array
/// of objects with a pubkey field. Both are accepted.
fn static_account_keys(message: &serde_json::Value) -> Vec<String> {
    let Some(array) = message.get("accountKeys").and_then(|v| v.as_array()) else {
        return Vec::new();
    };

    let keys: Vec<String> = array
        .iter()
        .filter_map(|v| v.as_str().map(|s| s.to_string()))
        .collect();
    if !keys.is_empty() {
        return keys;
    }

    array
        .iter()
        .filter_map(|v| {
            v.get("pubkey")
                .and_then(|p| p.as_str())
                .map(|s| s.to_string())
        })
        .collect()
}

/// Native-asset transfer inferred from lamport balance deltas
#[derive(Debug, Clone, PartialEq)]
pub struct NativeTransfer {
    /// Account whose balance fell the most. Defaults to index 0 when no
    /// account shows a positive decrease (the net amount then clamps to zero).
    pub payer_index: usize,
    /// True when two distinct accounts share the largest decrease; such a
    /// transaction is rejected upstream instead of guessing the payer.
    pub payer_ambiguous: bool,
    /// Account (excluding the payer) whose balance rose the most
    pub recipient_index: Option<usize>,
    /// The payer-side decrease in lamports, fee included
    pub decrease_lamports: u64,
}

/// Infer payer and recipient of a native transfer from balance snapshots.
///
/// Payer = largest positive `pre[i] - post[i]`; recipient = largest positive
/// `post[i] - pre[i]` over all other indices. A transaction touches many
/// accounts (rent, fee payer, programs); only the dominant pair matters.
pub fn infer_native_transfer(pre_balances: &[u64], post_balances: &[u64]) -> NativeTransfer {
    let len = pre_balances.len().min(post_balances.len());

    let mut payer_index = 0usize;
    let mut payer_ambiguous = false;
    let mut max_decrease = 0u64;

    for i in 0..len {
        let decrease = pre_balances[i].saturating_sub(post_balances[i]);
        if decrease == 0 {
            continue;
        }
        if decrease > max_decrease {
            max_decrease = decrease;
            payer_index = i;
            payer_ambiguous = false;
        } else if decrease == max_decrease {
            payer_ambiguous = true;
        }
    }

    let mut recipient_index = None;
    let mut max_increase = 0u64;

    for i in 0..len {
        if i == payer_index {
            continue;
        }
        let increase = post_balances[i].saturating_sub(pre_balances[i]);
        if increase > max_increase {
            max_increase = increase;
            recipient_index = Some(i);
        }
    }

    NativeTransfer {
        payer_index,
        payer_ambiguous,
        recipient_index,
        decrease_lamports: max_decrease,
    }
}

/// Token transfer of one tracked mint inferred from sparse token-balance lists
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TokenTransfer {
    /// Owner of the token account whose balance fell
    pub sender: Option<String>,
    /// Owner of the token account whose balance rose
    pub receiver: Option<String>,
    /// Transferred amount in UI token units
    pub amount: f64,
    /// Whether any balance entry for the tracked mint was present at all
    pub mint_touched: bool,
}

/// Infer sender, receiver and amount of a token transfer for one mint.
///
/// Pre/post token balances are sparse: only accounts holding a tracked token
/// appear, and only for the token(s) actually touched. Entries are matched
/// by account index; a post entry with no matching pre entry is a token
/// account created during the transaction and counts as a valid receiver,
/// its own amount used when no sender-side amount was found. Entries for
/// other mints are ignored entirely.
pub fn infer_token_transfer(
    meta: &TransactionMeta,
    tracked_mint: &str,
    account_keys: &[String]
) -> TokenTransfer {
    let empty: Vec<TokenBalance> = Vec::new();
    let pre = meta.pre_token_balances.as_ref().unwrap_or(&empty);
    let post = meta.post_token_balances.as_ref().unwrap_or(&empty);

    let pre_map: HashMap<u32, &TokenBalance> = pre
        .iter()
        .filter(|b| b.mint == tracked_mint)
        .map(|b| (b.account_index, b))
        .collect();
    let post_map: HashMap<u32, &TokenBalance> = post
        .iter()
        .filter(|b| b.mint == tracked_mint)
        .map(|b| (b.account_index, b))
        .collect();

    let mut all_indices: Vec<u32> = pre_map.keys().chain(post_map.keys()).copied().collect();
    all_indices.sort_unstable();
    all_indices.dedup();

    let mut result = TokenTransfer::default();
    result.mint_touched = !all_indices.is_empty();

    let mut sent_amount: Option<f64> = None;
    let mut received_amount: Option<f64> = None;

    for index in all_indices {
        let pre_entry = pre_map.get(&index);
        let post_entry = post_map.get(&index);

        let pre_ui = pre_entry.and_then(|b| b.ui_token_amount.ui_amount).unwrap_or(0.0);
        let post_ui = post_entry.and_then(|b| b.ui_token_amount.ui_amount).unwrap_or(0.0);
        let delta = post_ui - pre_ui;

        if delta == 0.0 {
            continue;
        }

        // Attribute the change to the owning wallet, falling back to the
        // token account key itself when the owner field is absent
        let owner = post_entry
            .and_then(|b| b.owner.clone())
            .or_else(|| pre_entry.and_then(|b| b.owner.clone()))
            .or_else(|| account_keys.get(index as usize).cloned());

        if delta < 0.0 {
            let magnitude = delta.abs();
            if sent_amount.map_or(true, |a| magnitude > a) {
                sent_amount = Some(magnitude);
                result.sender = owner;
            }
        } else if received_amount.map_or(true, |a| delta > a) {
            received_amount = Some(delta);
            result.receiver = owner;
        }
    }

    // The sender-side magnitude is authoritative; a freshly created token
    // account has no pre entry, so its own amount stands in when the sender
    // side is missing
    result.amount = sent_amount.or(received_amount).unwrap_or(0.0);

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::{ LoadedAddresses, TransactionData, UiTokenAmount };

    fn tx_with_keys(
        static_keys: Vec<&str>,
        loaded: Option<LoadedAddresses>,
        pre: Vec<u64>,
        post: Vec<u64>
    ) -> TransactionDetails {
        TransactionDetails {
            slot: 1,
            transaction: TransactionData {
                message: serde_json::json!({ "accountKeys": static_keys }),
                signatures: vec!["sig".to_string()],
            },
            meta: Some(TransactionMeta {
                err: None,
                pre_balances: pre,
                post_balances: post,
                pre_token_balances: None,
                post_token_balances: None,
                fee: 5000,
                log_messages: None,
                loaded_addresses: loaded,
            }),
        }
    }

    fn token_entry(index: u32, mint: &str, owner: &str, ui_amount: f64) -> TokenBalance {
        TokenBalance {
            account_index: index,
            mint: mint.to_string(),
            owner: Some(owner.to_string()),
            program_id: None,
            ui_token_amount: UiTokenAmount {
                amount: format!("{}", (ui_amount * 1e6) as u64),
                decimals: 6,
                ui_amount: Some(ui_amount),
                ui_amount_string: Some(format!("{}", ui_amount)),
            },
        }
    }

    #[test]
    fn test_account_keys_concatenation_order() {
        let tx = tx_with_keys(
            vec!["static1", "static2"],
            Some(LoadedAddresses {
                writable: vec!["writable1".to_string()],
                readonly: vec!["readonly1".to_string()],
            }),
            vec![0, 0, 0, 0],
            vec![0, 0, 0, 0]
        );

        let keys = account_keys_from_transaction(&tx).unwrap();
        assert_eq!(keys, vec!["static1", "static2", "writable1", "readonly1"]);
        assert_eq!(keys.len(), tx.meta.as_ref().unwrap().pre_balances.len());
    }

    #[test]
    fn test_account_keys_none_without_meta() {
        let mut tx = tx_with_keys(vec!["a"], None, vec![0], vec![0]);
        tx.meta = None;
        assert!(account_keys_from_transaction(&tx).is_none());
    }

    #[test]
    fn test_account_keys_from_parsed_objects() {
        let tx = TransactionDetails {
            slot: 1,
            transaction: TransactionData {
                message: serde_json::json!({
                    "accountKeys": [
                        { "pubkey": "obj1", "signer": true, "writable": true },
                        { "pubkey": "obj2", "signer": false, "writable": false }
                    ]
                }),
                signatures: vec![],
            },
            meta: Some(TransactionMeta {
                err: None,
                pre_balances: vec![0, 0],
                post_balances: vec![0, 0],
                pre_token_balances: None,
                post_token_balances: None,
                fee: 0,
                log_messages: None,
                loaded_addresses: None,
            }),
        };

        let keys = account_keys_from_transaction(&tx).unwrap();
        assert_eq!(keys, vec!["obj1", "obj2"]);
    }

    #[test]
    fn test_native_inference_two_party_transfer() {
        // Sender pays 2.5 SOL plus the 0.01 SOL fee; receiver gains 2.5 SOL
        let pre = vec![5_000_000_000, 1_000_000_000, 10_000];
        let post = vec![2_490_000_000, 3_500_000_000, 10_000];

        let transfer = infer_native_transfer(&pre, &post);
        assert_eq!(transfer.payer_index, 0);
        assert!(!transfer.payer_ambiguous);
        assert_eq!(transfer.recipient_index, Some(1));
        assert_eq!(transfer.decrease_lamports, 2_510_000_000);
    }

    #[test]
    fn test_native_inference_no_decrease_defaults_to_zero() {
        let pre = vec![100, 200];
        let post = vec![100, 200];

        let transfer = infer_native_transfer(&pre, &post);
        assert_eq!(transfer.payer_index, 0);
        assert_eq!(transfer.decrease_lamports, 0);
        assert_eq!(transfer.recipient_index, None);
    }

    #[test]
    fn test_native_inference_equal_decreases_are_ambiguous() {
        let pre = vec![1_000_000, 1_000_000, 0];
        let post = vec![500_000, 500_000, 1_000_000];

        let transfer = infer_native_transfer(&pre, &post);
        assert!(transfer.payer_ambiguous);
    }

    #[test]
    fn test_native_inference_recipient_excludes_payer_index() {
        // With no positive decrease the payer defaults to index 0; the
        // recipient scan must still skip that index even though it shows
        // the largest increase
        let pre = vec![0, 0];
        let post = vec![100_000_000, 50_000_000];

        let transfer = infer_native_transfer(&pre, &post);
        assert_eq!(transfer.payer_index, 0);
        assert_eq!(transfer.decrease_lamports, 0);
        assert_eq!(transfer.recipient_index, Some(1));
    }

    const USDC: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";

    fn meta_with_token_balances(
        pre: Vec<TokenBalance>,
        post: Vec<TokenBalance>
    ) -> TransactionMeta {
        TransactionMeta {
            err: None,
            pre_balances: vec![],
            post_balances: vec![],
            pre_token_balances: Some(pre),
            post_token_balances: Some(post),
            fee: 5000,
            log_messages: None,
            loaded_addresses: None,
        }
    }

    #[test]
    fn test_token_inference_sender_and_receiver() {
        let meta = meta_with_token_balances(
            vec![token_entry(1, USDC, "alice", 100.0), token_entry(2, USDC, "bob", 5.0)],
            vec![token_entry(1, USDC, "alice", 75.0), token_entry(2, USDC, "bob", 30.0)]
        );

        let transfer = infer_token_transfer(&meta, USDC, &[]);
        assert_eq!(transfer.sender.as_deref(), Some("alice"));
        assert_eq!(transfer.receiver.as_deref(), Some("bob"));
        assert_eq!(transfer.amount, 25.0);
        assert!(transfer.mint_touched);
    }

    #[test]
    fn test_token_inference_fresh_token_account_receiver() {
        // Receiver's token account was created during the transaction:
        // post entry with no matching pre entry
        let meta = meta_with_token_balances(
            vec![],
            vec![token_entry(3, USDC, "carol", 12.5)]
        );

        let transfer = infer_token_transfer(&meta, USDC, &[]);
        assert_eq!(transfer.receiver.as_deref(), Some("carol"));
        assert_eq!(transfer.amount, 12.5);
    }

    #[test]
    fn test_token_inference_ignores_other_mints() {
        let other_mint = "So11111111111111111111111111111111111111112";
        let meta = meta_with_token_balances(
            vec![token_entry(1, other_mint, "alice", 50.0)],
            vec![token_entry(1, other_mint, "alice", 10.0)]
        );

        let transfer = infer_token_transfer(&meta, USDC, &[]);
        assert!(!transfer.mint_touched);
        assert_eq!(transfer.sender, None);
        assert_eq!(transfer.receiver, None);
        assert_eq!(transfer.amount, 0.0);
    }

    #[test]
    fn test_token_inference_owner_fallback_to_account_key() {
        let mut entry = token_entry(0, USDC, "ignored", 0.0);
        entry.owner = None;
        let mut post_entry = token_entry(0, USDC, "ignored", 40.0);
        post_entry.owner = None;

        let meta = meta_with_token_balances(vec![entry], vec![post_entry]);
        let keys = vec!["token_account_key".to_string()];

        let transfer = infer_token_transfer(&meta, USDC, &keys);
        assert_eq!(transfer.receiver.as_deref(), Some("token_account_key"));
    }
}
