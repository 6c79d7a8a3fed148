//! Ledger access: recent signatures, parsed transactions, account types
//!
//! `ParsedTransaction` mirrors the `jsonParsed` transaction shape but only
//! keeps what mint extraction reads. Everything is optional; real RPC
//! responses omit or null-out fields freely.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use solana_account_decoder::{UiAccount, UiAccountData, UiAccountEncoding};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_client::GetConfirmedSignaturesForAddress2Config;
use solana_client::rpc_config::{RpcAccountInfoConfig, RpcTransactionConfig};
use solana_client::rpc_request::RpcRequest;
use solana_client::rpc_response::Response;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_transaction_status::UiTransactionEncoding;
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

use crate::error::{Error, Result};

/// What an account referenced by a transaction turned out to be
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountKind {
    Mint,
    TokenAccount { mint: String },
    Other,
}

impl AccountKind {
    /// Classify from the `parsed` object of a jsonParsed account
    pub fn from_parsed(parsed: &Value) -> Self {
        match parsed.get("type").and_then(Value::as_str) {
            Some("mint") => AccountKind::Mint,
            Some("account") => match parsed
                .get("info")
                .and_then(|i| i.get("mint"))
                .and_then(Value::as_str)
            {
                Some(mint) => AccountKind::TokenAccount {
                    mint: mint.to_string(),
                },
                None => AccountKind::Other,
            },
            _ => AccountKind::Other,
        }
    }
}

/// Upstream ledger. Implemented over RPC; mocked in tests.
#[async_trait]
pub trait LedgerSource: Send + Sync {
    /// Most recent signatures touching `program_id`, newest first
    async fn list_signatures(&self, program_id: &str, limit: usize) -> Result<Vec<String>>;

    /// `Ok(None)` when the transaction is not yet indexed
    async fn get_parsed_transaction(&self, signature: &str) -> Result<Option<ParsedTransaction>>;

    /// `Ok(None)` when the account does not exist
    async fn get_account_kind(&self, address: &str) -> Result<Option<AccountKind>>;
}

/// Account key as either a bare string or `{ pubkey, ... }`
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AccountKey {
    Plain(String),
    Parsed { pubkey: String },
}

impl AccountKey {
    pub fn pubkey(&self) -> &str {
        match self {
            AccountKey::Plain(key) => key,
            AccountKey::Parsed { pubkey } => pubkey,
        }
    }
}

/// Instruction (top-level or inner). Only parsed instructions carry a mint.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedInstruction {
    #[serde(default)]
    pub parsed: Option<Value>,
}

impl ParsedInstruction {
    /// `parsed.info.mint`, if present
    pub fn mint(&self) -> Option<&str> {
        self.parsed
            .as_ref()?
            .get("info")?
            .get("mint")?
            .as_str()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InnerInstructions {
    #[serde(default)]
    pub instructions: Vec<ParsedInstruction>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiTokenAmount {
    #[serde(default)]
    pub amount: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenBalance {
    #[serde(default)]
    pub account_index: u32,
    #[serde(default)]
    pub mint: String,
    #[serde(default)]
    pub ui_token_amount: UiTokenAmount,
}

/// Transaction status metadata. List fields may be absent or `null`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionMeta {
    #[serde(default)]
    pub pre_token_balances: Option<Vec<TokenBalance>>,
    #[serde(default)]
    pub post_token_balances: Option<Vec<TokenBalance>>,
    #[serde(default)]
    pub inner_instructions: Option<Vec<InnerInstructions>>,
    #[serde(default)]
    pub log_messages: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedMessage {
    #[serde(default)]
    pub account_keys: Vec<AccountKey>,
    #[serde(default)]
    pub instructions: Vec<ParsedInstruction>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransactionBody {
    #[serde(default)]
    pub signatures: Vec<String>,
    #[serde(default)]
    pub message: ParsedMessage,
}

/// A fetched transaction in the jsonParsed layout
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedTransaction {
    #[serde(default)]
    pub slot: u64,
    #[serde(default)]
    pub block_time: Option<i64>,
    #[serde(default)]
    pub transaction: TransactionBody,
    #[serde(default)]
    pub meta: Option<TransactionMeta>,
}

/// Field counts for the periodic shape log
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TxShape {
    pub pre_balances: usize,
    pub post_balances: usize,
    pub inner: usize,
    pub logs: usize,
    pub keys: usize,
}

impl ParsedTransaction {
    pub fn pre_token_balances(&self) -> &[TokenBalance] {
        self.meta
            .as_ref()
            .and_then(|m| m.pre_token_balances.as_deref())
            .unwrap_or(&[])
    }

    pub fn post_token_balances(&self) -> &[TokenBalance] {
        self.meta
            .as_ref()
            .and_then(|m| m.post_token_balances.as_deref())
            .unwrap_or(&[])
    }

    pub fn inner_instructions(&self) -> impl Iterator<Item = &ParsedInstruction> {
        self.meta
            .as_ref()
            .and_then(|m| m.inner_instructions.as_deref())
            .unwrap_or(&[])
            .iter()
            .flat_map(|ii| ii.instructions.iter())
    }

    pub fn instructions(&self) -> &[ParsedInstruction] {
        &self.transaction.message.instructions
    }

    pub fn log_messages(&self) -> &[String] {
        self.meta
            .as_ref()
            .and_then(|m| m.log_messages.as_deref())
            .unwrap_or(&[])
    }

    pub fn account_keys(&self) -> impl Iterator<Item = &str> {
        self.transaction
            .message
            .account_keys
            .iter()
            .map(AccountKey::pubkey)
    }

    /// Mints whose balance moved, in first-seen order, followed by mints
    /// that appear in the snapshots without moving
    pub fn balance_diff_mints(&self) -> Vec<&str> {
        let pre: HashMap<(u32, &str), &str> = self
            .pre_token_balances()
            .iter()
            .map(|b| ((b.account_index, b.mint.as_str()), b.ui_token_amount.amount.as_str()))
            .collect();
        let post: HashMap<(u32, &str), &str> = self
            .post_token_balances()
            .iter()
            .map(|b| ((b.account_index, b.mint.as_str()), b.ui_token_amount.amount.as_str()))
            .collect();

        let mut changed: Vec<&str> = Vec::new();
        let mut unchanged: Vec<&str> = Vec::new();

        let all = self
            .pre_token_balances()
            .iter()
            .chain(self.post_token_balances().iter());
        for balance in all {
            let key = (balance.account_index, balance.mint.as_str());
            let moved = pre.get(&key) != post.get(&key);
            let mint = balance.mint.as_str();
            if mint.is_empty() {
                continue;
            }
            if moved {
                if !changed.contains(&mint) {
                    changed.push(mint);
                }
            } else if !unchanged.contains(&mint) {
                unchanged.push(mint);
            }
        }

        unchanged.retain(|m| !changed.contains(m));
        changed.extend(unchanged);
        changed
    }

    pub fn shape(&self) -> TxShape {
        TxShape {
            pre_balances: self.pre_token_balances().len(),
            post_balances: self.post_token_balances().len(),
            inner: self
                .meta
                .as_ref()
                .and_then(|m| m.inner_instructions.as_ref())
                .map_or(0, Vec::len),
            logs: self.log_messages().len(),
            keys: self.transaction.message.account_keys.len(),
        }
    }
}

/// `LedgerSource` over Solana JSON-RPC
pub struct RpcLedger {
    client: RpcClient,
    commitment: CommitmentConfig,
}

impl RpcLedger {
    pub fn new(endpoint: &str, commitment: &str, timeout_ms: u64) -> Result<Self> {
        let commitment = CommitmentConfig::from_str(commitment)
            .map_err(|_| Error::Config(format!("invalid commitment: {}", commitment)))?;
        let client = RpcClient::new_with_timeout_and_commitment(
            endpoint.to_string(),
            Duration::from_millis(timeout_ms),
            commitment,
        );
        Ok(Self { client, commitment })
    }
}

#[async_trait]
impl LedgerSource for RpcLedger {
    async fn list_signatures(&self, program_id: &str, limit: usize) -> Result<Vec<String>> {
        let address = Pubkey::from_str(program_id)
            .map_err(|e| Error::Config(format!("invalid program id {}: {}", program_id, e)))?;

        let config = GetConfirmedSignaturesForAddress2Config {
            before: None,
            until: None,
            limit: Some(limit),
            commitment: Some(self.commitment),
        };

        let signatures = self
            .client
            .get_signatures_for_address_with_config(&address, config)
            .await?;

        Ok(signatures.into_iter().map(|s| s.signature).collect())
    }

    async fn get_parsed_transaction(&self, signature: &str) -> Result<Option<ParsedTransaction>> {
        Signature::from_str(signature)
            .map_err(|e| Error::InvalidCandidate(format!("bad signature {}: {}", signature, e)))?;

        let config = RpcTransactionConfig {
            encoding: Some(UiTransactionEncoding::JsonParsed),
            commitment: Some(self.commitment),
            max_supported_transaction_version: Some(0),
        };

        // A null result means "not indexed yet", not an error
        let raw: Option<Value> = self
            .client
            .send(
                RpcRequest::GetTransaction,
                serde_json::json!([signature, config]),
            )
            .await?;

        match raw {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => {
                debug!(signature = %signature, "transaction not found yet");
                Ok(None)
            }
        }
    }

    async fn get_account_kind(&self, address: &str) -> Result<Option<AccountKind>> {
        let config = RpcAccountInfoConfig {
            encoding: Some(UiAccountEncoding::JsonParsed),
            data_slice: None,
            commitment: Some(self.commitment),
            min_context_slot: None,
        };

        let response: Response<Option<UiAccount>> = self
            .client
            .send(
                RpcRequest::GetAccountInfo,
                serde_json::json!([address, config]),
            )
            .await?;

        Ok(response.value.map(|account| match account.data {
            UiAccountData::Json(parsed) => AccountKind::from_parsed(&parsed.parsed),
            _ => AccountKind::Other,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINT_A: &str = "So11111111111111111111111111111111111111112";
    const MINT_B: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";

    fn sample_json() -> Value {
        serde_json::json!({
            "slot": 42,
            "blockTime": 1700000000,
            "transaction": {
                "signatures": ["sig1"],
                "message": {
                    "accountKeys": [
                        {"pubkey": "11111111111111111111111111111111", "signer": false, "writable": false},
                        "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA"
                    ],
                    "instructions": [
                        {"programId": "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA",
                         "parsed": {"type": "initializeMint", "info": {"mint": MINT_B}}},
                        {"programId": "x", "accounts": [0, 1], "data": "abc"}
                    ]
                }
            },
            "meta": {
                "err": null,
                "preTokenBalances": [
                    {"accountIndex": 1, "mint": MINT_A, "uiTokenAmount": {"amount": "100"}},
                    {"accountIndex": 2, "mint": MINT_B, "uiTokenAmount": {"amount": "5"}}
                ],
                "postTokenBalances": [
                    {"accountIndex": 1, "mint": MINT_A, "uiTokenAmount": {"amount": "100"}},
                    {"accountIndex": 2, "mint": MINT_B, "uiTokenAmount": {"amount": "7"}}
                ],
                "innerInstructions": null,
                "logMessages": ["Program log: hello"]
            }
        })
    }

    #[test]
    fn test_deserialize_parsed_transaction() {
        let tx: ParsedTransaction = serde_json::from_value(sample_json()).unwrap();
        assert_eq!(tx.slot, 42);
        assert_eq!(tx.account_keys().count(), 2);
        assert_eq!(tx.instructions()[0].mint(), Some(MINT_B));
        assert_eq!(tx.instructions()[1].mint(), None);
        assert_eq!(tx.inner_instructions().count(), 0);
        assert_eq!(tx.log_messages().len(), 1);
    }

    #[test]
    fn test_balance_diff_puts_moved_mints_first() {
        let tx: ParsedTransaction = serde_json::from_value(sample_json()).unwrap();
        assert_eq!(tx.balance_diff_mints(), vec![MINT_B, MINT_A]);
    }

    #[test]
    fn test_shape_counts() {
        let tx: ParsedTransaction = serde_json::from_value(sample_json()).unwrap();
        let shape = tx.shape();
        assert_eq!(shape.pre_balances, 2);
        assert_eq!(shape.post_balances, 2);
        assert_eq!(shape.inner, 0);
        assert_eq!(shape.logs, 1);
        assert_eq!(shape.keys, 2);
    }

    #[test]
    fn test_empty_transaction_is_tolerated() {
        let tx: ParsedTransaction = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(tx.balance_diff_mints().is_empty());
        assert_eq!(tx.shape(), TxShape::default());
    }

    #[test]
    fn test_account_kind_from_parsed() {
        let mint = serde_json::json!({"type": "mint", "info": {"decimals": 6}});
        assert_eq!(AccountKind::from_parsed(&mint), AccountKind::Mint);

        let account = serde_json::json!({"type": "account", "info": {"mint": MINT_A}});
        assert_eq!(
            AccountKind::from_parsed(&account),
            AccountKind::TokenAccount {
                mint: MINT_A.to_string()
            }
        );

        let other = serde_json::json!({"type": "nonce"});
        assert_eq!(AccountKind::from_parsed(&other), AccountKind::Other);
    }
}
