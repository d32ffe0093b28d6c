/// Centralized RPC client for Solana chain data
///
/// This module provides the chain-data collaborator used by payment
/// verification: fetch-by-signature transaction lookup and wallet balance
/// reads over JSON-RPC, with fallback to a secondary endpoint on rate limits.
///
/// The verifier itself only depends on the `ChainClient` trait, never on the
/// transport, so tests can substitute a stub.

use crate::logger::{ log, LogTag };
use crate::global::{ Configs, is_debug_rpc_enabled };
use crate::errors::RpcError;
use async_trait::async_trait;
use serde::{ Deserialize, Serialize };

/// Transaction details from RPC
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionDetails {
    pub slot: u64,
    pub transaction: TransactionData,
    pub meta: Option<TransactionMeta>,
}

/// Transaction data structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionData {
    pub message: serde_json::Value,
    pub signatures: Vec<String>,
}

/// Transaction metadata with balance changes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionMeta {
    pub err: Option<serde_json::Value>,
    #[serde(rename = "preBalances")]
    pub pre_balances: Vec<u64>,
    #[serde(rename = "postBalances")]
    pub post_balances: Vec<u64>,
    #[serde(rename = "preTokenBalances")]
    pub pre_token_balances: Option<Vec<TokenBalance>>,
    #[serde(rename = "postTokenBalances")]
    pub post_token_balances: Option<Vec<TokenBalance>>,
    pub fee: u64,
    #[serde(rename = "logMessages")]
    pub log_messages: Option<Vec<String>>,
    /// Addresses resolved at execution time by versioned transactions.
    /// Appended after the static account keys to recover the full
    /// index-addressable account list.
    #[serde(rename = "loadedAddresses")]
    pub loaded_addresses: Option<LoadedAddresses>,
}

/// Lookup-table addresses loaded by a versioned transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadedAddresses {
    pub writable: Vec<String>,
    pub readonly: Vec<String>,
}

/// Token balance information in transaction metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenBalance {
    #[serde(rename = "accountIndex")]
    pub account_index: u32,
    pub mint: String,
    pub owner: Option<String>,
    #[serde(rename = "programId")]
    pub program_id: Option<String>,
    #[serde(rename = "uiTokenAmount")]
    pub ui_token_amount: UiTokenAmount,
}

/// Token amount with UI representation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UiTokenAmount {
    pub amount: String,
    pub decimals: u8,
    #[serde(rename = "uiAmount")]
    pub ui_amount: Option<f64>,
    #[serde(rename = "uiAmountString")]
    pub ui_amount_string: Option<String>,
}

/// Converts lamports to SOL amount
pub fn lamports_to_sol(lamports: u64) -> f64 {
    (lamports as f64) / 1_000_000_000.0
}

/// Converts SOL amount to lamports (1 SOL = 1,000,000,000 lamports)
pub fn sol_to_lamports(sol_amount: f64) -> u64 {
    (sol_amount * 1_000_000_000.0).round() as u64
}

/// Opaque chain-data fetch collaborator
///
/// `fetch_transaction` returns `Ok(None)` when the signature is unknown or
/// the transaction is not yet confirmed; that is a normal retryable outcome,
/// not an error.
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn fetch_transaction(
        &self,
        signature: &str
    ) -> Result<Option<TransactionDetails>, RpcError>;

    async fn fetch_balance(&self, address: &str) -> Result<f64, RpcError>;
}

/// JSON-RPC client over HTTP with rate-limit fallback
pub struct RpcClient {
    rpc_url: String,
    fallback_url: Option<String>,
    client: reqwest::Client,
}

impl RpcClient {
    pub fn new(rpc_url: String, fallback_url: Option<String>) -> Self {
        Self {
            rpc_url,
            fallback_url,
            client: reqwest::Client::new(),
        }
    }

    pub fn from_configs(configs: &Configs) -> Self {
        Self::new(configs.rpc_url.clone(), configs.rpc_fallback_url.clone())
    }

    /// Check if response indicates rate limiting
    fn is_rate_limit_response(response: &reqwest::Response) -> bool {
        response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS
    }

    /// Check if an error message indicates rate limiting
    fn is_rate_limit_error(error_msg: &str) -> bool {
        error_msg.contains("429") || error_msg.contains("Too Many Requests")
    }

    /// POST a JSON-RPC payload, falling back to the secondary endpoint
    /// only on 429/rate-limit responses
    async fn post_rpc(
        &self,
        payload: &serde_json::Value
    ) -> Result<serde_json::Value, RpcError> {
        let mut should_fallback = false;

        match self.client.post(&self.rpc_url).json(payload).send().await {
            Ok(response) => {
                if Self::is_rate_limit_response(&response) {
                    should_fallback = true;
                    log(
                        LogTag::Rpc,
                        "WARNING",
                        "Main RPC returned 429 rate limit, falling back to secondary"
                    );
                } else {
                    return response
                        .json::<serde_json::Value>().await
                        .map_err(|e| RpcError::InvalidResponse(
                            format!("Failed to parse RPC response: {}", e)
                        ));
                }
            }
            Err(e) => {
                let error_msg = e.to_string();
                if Self::is_rate_limit_error(&error_msg) {
                    should_fallback = true;
                    log(
                        LogTag::Rpc,
                        "WARNING",
                        &format!("Main RPC rate limited: {}, falling back to secondary", error_msg)
                    );
                } else {
                    return Err(RpcError::Network(e));
                }
            }
        }

        if should_fallback {
            if let Some(fallback_url) = &self.fallback_url {
                let response = self.client.post(fallback_url).json(payload).send().await?;
                return response
                    .json::<serde_json::Value>().await
                    .map_err(|e| RpcError::InvalidResponse(
                        format!("Failed to parse fallback RPC response: {}", e)
                    ));
            }
        }

        Err(RpcError::Rpc("RPC unavailable: rate limited and no fallback configured".to_string()))
    }
}

#[async_trait]
impl ChainClient for RpcClient {
    /// Gets transaction details from RPC to analyze balance changes.
    /// A null result means the transaction is unknown or not yet confirmed.
    async fn fetch_transaction(
        &self,
        signature: &str
    ) -> Result<Option<TransactionDetails>, RpcError> {
        if is_debug_rpc_enabled() {
            log(LogTag::Rpc, "DEBUG", &format!("Fetching transaction {}", signature));
        }

        let rpc_payload =
            serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "getTransaction",
            "params": [
                signature,
                {
                    "encoding": "json",
                    "maxSupportedTransactionVersion": 0
                }
            ]
        });

        let rpc_response = self.post_rpc(&rpc_payload).await?;

        if let Some(error) = rpc_response.get("error") {
            log(LogTag::Rpc, "ERROR", &format!("RPC error getting transaction: {:?}", error));
            return Err(RpcError::Rpc(format!("RPC error: {:?}", error)));
        }

        let result = rpc_response
            .get("result")
            .ok_or_else(|| RpcError::InvalidResponse("Missing result field".to_string()))?;

        if result.is_null() {
            return Ok(None);
        }

        let transaction_details: TransactionDetails = serde_json
            ::from_value(result.clone())
            .map_err(|e|
                RpcError::InvalidResponse(format!("Failed to parse transaction details: {}", e))
            )?;

        Ok(Some(transaction_details))
    }

    /// Gets the SOL balance of a wallet address
    async fn fetch_balance(&self, address: &str) -> Result<f64, RpcError> {
        let rpc_payload =
            serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "getBalance",
            "params": [address]
        });

        let rpc_response = self.post_rpc(&rpc_payload).await?;

        if let Some(error) = rpc_response.get("error") {
            return Err(RpcError::Rpc(format!("RPC error: {:?}", error)));
        }

        let balance_lamports = rpc_response
            .get("result")
            .and_then(|r| r.get("value"))
            .and_then(|v| v.as_u64())
            .ok_or_else(|| {
                RpcError::InvalidResponse("Missing balance value in response".to_string())
            })?;

        let balance_sol = lamports_to_sol(balance_lamports);

        if is_debug_rpc_enabled() {
            log(
                LogTag::Rpc,
                "DEBUG",
                &format!(
                    "Balance retrieved: {} lamports ({:.6} SOL)",
                    balance_lamports,
                    balance_sol
                )
            );
        }

        Ok(balance_sol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lamports_conversion() {
        assert_eq!(lamports_to_sol(1_000_000_000), 1.0);
        assert_eq!(lamports_to_sol(2_510_000_000), 2.51);
        assert_eq!(sol_to_lamports(0.01), 10_000_000);
    }

    #[test]
    fn test_transaction_details_deserialization() {
        // Shape returned by getTransaction with json encoding
        let raw = serde_json::json!({
            "slot": 12345,
            "transaction": {
                "message": {
                    "accountKeys": ["payer111", "recipient222"]
                },
                "signatures": ["sig1"]
            },
            "meta": {
                "err": null,
                "fee": 5000,
                "preBalances": [1000000000u64, 0u64],
                "postBalances": [899995000u64, 100000000u64],
                "preTokenBalances": [],
                "postTokenBalances": [],
                "logMessages": [],
                "loadedAddresses": {
                    "writable": ["loaded333"],
                    "readonly": []
                }
            }
        });

        let details: TransactionDetails = serde_json::from_value(raw).unwrap();
        let meta = details.meta.unwrap();
        assert_eq!(meta.fee, 5000);
        assert_eq!(meta.pre_balances.len(), 2);
        assert_eq!(meta.loaded_addresses.unwrap().writable, vec!["loaded333"]);
    }

    #[test]
    fn test_rate_limit_error_detection() {
        assert!(RpcClient::is_rate_limit_error("HTTP status 429"));
        assert!(RpcClient::is_rate_limit_error("Too Many Requests"));
        assert!(!RpcClient::is_rate_limit_error("connection refused"));
    }
}
