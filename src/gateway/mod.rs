// Ledger gateway - the only boundary through which the engines touch the
// chain. Reads and the single write primitive are consumed here; everything
// above this trait is ledger-agnostic and mockable.

pub mod solana;
pub mod sponsor;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::AppResult;

pub use solana::{SolanaConfig, SolanaGateway};
pub use sponsor::{EnvSponsorResolver, SponsorResolver};

/// Fresh on-chain view of a single account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountSnapshot {
    pub exists: bool,
    /// Lamports currently held. Zero when the account does not exist.
    pub lamports: u64,
    pub owner: Option<String>,
    pub data_size: Option<u64>,
}

impl AccountSnapshot {
    pub fn missing() -> Self {
        Self {
            exists: false,
            lamports: 0,
            owner: None,
            data_size: None,
        }
    }
}

/// One instruction of a confirmed transaction, in parsed form.
/// `program` is the parser's program label (e.g. "system", "spl-token"),
/// `kind` the parsed instruction type, `info` its payload.
#[derive(Debug, Clone)]
pub struct ParsedInstruction {
    pub program: String,
    pub kind: String,
    pub info: serde_json::Value,
}

/// A transaction signed (fee-paid) by the scanned address, with the effects
/// Discovery inspects for account-creation patterns.
#[derive(Debug, Clone, Default)]
pub struct SignerTransaction {
    pub reference: String,
    pub succeeded: bool,
    pub block_time: Option<DateTime<Utc>>,
    pub fee_payer: Option<String>,
    pub instructions: Vec<ParsedInstruction>,
    /// Token-balance account addresses before / after execution. An address
    /// present only in `post` is treated as created by this transaction.
    pub pre_token_accounts: Vec<String>,
    pub post_token_accounts: Vec<String>,
}

/// Signer history plus the per-transaction fetch failures that did not abort
/// the scan.
#[derive(Debug, Default)]
pub struct SignerHistory {
    pub transactions: Vec<SignerTransaction>,
    pub errors: Vec<String>,
}

/// The only value-transfer actions this service ever submits. Anything else
/// is refused upstream by the reclaim executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReclaimAction {
    /// Atomic close-and-return-balance for a token account.
    CloseTokenAccount {
        account: String,
        destination: String,
    },
    /// Full-balance transfer out of a plain system account.
    TransferAll {
        from: String,
        destination: String,
        lamports: u64,
    },
}

impl ReclaimAction {
    pub fn target(&self) -> &str {
        match self {
            ReclaimAction::CloseTokenAccount { account, .. } => account,
            ReclaimAction::TransferAll { from, .. } => from,
        }
    }
}

#[async_trait]
pub trait LedgerGateway: Send + Sync {
    /// Read one account. A missing account is `AccountSnapshot::missing()`,
    /// not an error.
    async fn get_account(&self, address: &str) -> AppResult<AccountSnapshot>;

    /// Batched read. Every requested address has an entry in the result.
    async fn get_accounts_batch(
        &self,
        addresses: &[String],
    ) -> AppResult<HashMap<String, AccountSnapshot>>;

    /// The `limit` most recent transactions fee-paid by `address`, newest
    /// first. Failed transactions are returned with empty effects.
    async fn get_transactions_for_signer(
        &self,
        address: &str,
        limit: usize,
    ) -> AppResult<SignerHistory>;

    /// Sign and submit a reclaim action, returning the transaction reference.
    async fn submit(&self, action: &ReclaimAction) -> AppResult<String>;

    /// Maximum addresses per batched read.
    fn batch_limit(&self) -> usize {
        100
    }
}
