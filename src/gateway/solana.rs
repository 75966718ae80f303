use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use solana_client::client_error::ClientError;
use solana_client::rpc_client::{GetConfirmedSignaturesForAddress2Config, RpcClient};
use solana_client::rpc_config::RpcTransactionConfig;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature, Signer};
use solana_sdk::transaction::Transaction;
use solana_transaction_status::UiTransactionEncoding;
use tracing::{debug, warn};

use crate::error::{AppError, AppResult, LedgerError, ReclaimError};
use crate::gateway::{
    AccountSnapshot, LedgerGateway, ParsedInstruction, ReclaimAction, SignerHistory,
    SignerTransaction,
};

#[derive(Debug, Clone)]
pub struct SolanaConfig {
    pub rpc_url: String,
    pub commitment: CommitmentConfig,
    /// Minimum delay between consecutive RPC calls (quota friendliness).
    pub call_delay: Duration,
    pub batch_limit: usize,
}

impl Default for SolanaConfig {
    fn default() -> Self {
        Self {
            rpc_url: "https://api.mainnet-beta.solana.com".to_string(),
            commitment: CommitmentConfig::confirmed(),
            call_delay: Duration::from_millis(200),
            batch_limit: 100,
        }
    }
}

/// RPC-backed ledger gateway. All calls are paced through a single mutex so
/// at most one request is in flight and a fixed delay separates calls.
pub struct SolanaGateway {
    config: SolanaConfig,
    client: RpcClient,
    signer: Option<Arc<Keypair>>,
    last_call: tokio::sync::Mutex<Option<Instant>>,
}

impl SolanaGateway {
    pub fn new(config: SolanaConfig, signer: Option<Keypair>) -> Self {
        let client = RpcClient::new_with_commitment(config.rpc_url.clone(), config.commitment);

        Self {
            config,
            client,
            signer: signer.map(Arc::new),
            last_call: tokio::sync::Mutex::new(None),
        }
    }

    /// Sleep out the remainder of the inter-call delay, then stamp this call.
    async fn pace(&self) {
        let mut last = self.last_call.lock().await;
        if let Some(at) = *last {
            let elapsed = at.elapsed();
            if elapsed < self.config.call_delay {
                tokio::time::sleep(self.config.call_delay - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    fn parse_pubkey(address: &str) -> AppResult<Pubkey> {
        Pubkey::from_str(address).map_err(|_| AppError::InvalidAddress(address.to_string()))
    }

    fn map_client_error(error: ClientError) -> LedgerError {
        let text = error.to_string();
        if text.contains("429") || text.contains("Too Many Requests") {
            LedgerError::RateLimited(text)
        } else if text.contains("timed out") || text.contains("timeout") {
            LedgerError::Timeout(text)
        } else {
            LedgerError::Transport(text)
        }
    }

    fn snapshot_from_account(account: Option<solana_sdk::account::Account>) -> AccountSnapshot {
        match account {
            Some(account) => AccountSnapshot {
                exists: true,
                lamports: account.lamports,
                owner: Some(account.owner.to_string()),
                data_size: Some(account.data.len() as u64),
            },
            None => AccountSnapshot::missing(),
        }
    }

    /// Flatten a jsonParsed confirmed transaction into the effect summary the
    /// discovery engine pattern-matches. Going through `serde_json::Value`
    /// keeps this tolerant of fields we never look at.
    fn parse_confirmed(
        reference: &str,
        value: &serde_json::Value,
        block_time: Option<DateTime<Utc>>,
    ) -> SignerTransaction {
        let meta = &value["transaction"]["meta"];
        let message = &value["transaction"]["transaction"]["message"];

        let account_keys: Vec<String> = message["accountKeys"]
            .as_array()
            .map(|keys| {
                keys.iter()
                    .filter_map(|k| k["pubkey"].as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        let fee_payer = message["accountKeys"]
            .as_array()
            .and_then(|keys| {
                keys.iter()
                    .find(|k| k["signer"].as_bool().unwrap_or(false))
                    .or_else(|| keys.first())
            })
            .and_then(|k| k["pubkey"].as_str())
            .map(str::to_string);

        let instructions = message["instructions"]
            .as_array()
            .map(|ixs| {
                ixs.iter()
                    .filter_map(|ix| {
                        let program = ix["program"].as_str()?.to_string();
                        let parsed = &ix["parsed"];
                        let kind = parsed["type"].as_str()?.to_string();
                        Some(ParsedInstruction {
                            program,
                            kind,
                            info: parsed["info"].clone(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        let token_accounts = |balances: &serde_json::Value| -> Vec<String> {
            balances
                .as_array()
                .map(|entries| {
                    entries
                        .iter()
                        .filter_map(|entry| {
                            let index = entry["accountIndex"].as_u64()? as usize;
                            account_keys.get(index).cloned()
                        })
                        .collect()
                })
                .unwrap_or_default()
        };

        SignerTransaction {
            reference: reference.to_string(),
            succeeded: meta["err"].is_null(),
            block_time,
            fee_payer,
            instructions,
            pre_token_accounts: token_accounts(&meta["preTokenBalances"]),
            post_token_accounts: token_accounts(&meta["postTokenBalances"]),
        }
    }

    fn build_instruction(
        action: &ReclaimAction,
        authority: &Pubkey,
    ) -> AppResult<solana_sdk::instruction::Instruction> {
        match action {
            ReclaimAction::CloseTokenAccount {
                account,
                destination,
            } => {
                let account = Self::parse_pubkey(account)?;
                let destination = Self::parse_pubkey(destination)?;
                spl_token::instruction::close_account(
                    &spl_token::id(),
                    &account,
                    &destination,
                    authority,
                    &[],
                )
                .map_err(|e| ReclaimError::Submission(format!("close instruction: {e}")).into())
            }
            ReclaimAction::TransferAll {
                from,
                destination,
                lamports,
            } => {
                let from = Self::parse_pubkey(from)?;
                let destination = Self::parse_pubkey(destination)?;
                Ok(solana_system_interface::instruction::transfer(
                    &from,
                    &destination,
                    *lamports,
                ))
            }
        }
    }

    /// The sponsor keypair is the only key this service holds. A system
    /// transfer requires the drained account itself to sign, so it only
    /// succeeds when the sponsor is that account's signing authority; any
    /// other required signer surfaces as a submission failure, never a panic.
    fn sign_transaction(
        signer: &Keypair,
        instruction: solana_sdk::instruction::Instruction,
        blockhash: solana_sdk::hash::Hash,
    ) -> AppResult<Transaction> {
        let mut transaction = Transaction::new_with_payer(&[instruction], Some(&signer.pubkey()));
        transaction
            .try_sign(&[signer], blockhash)
            .map_err(|e| ReclaimError::Submission(format!("signing failed: {e}")))?;
        Ok(transaction)
    }
}

#[async_trait]
impl LedgerGateway for SolanaGateway {
    async fn get_account(&self, address: &str) -> AppResult<AccountSnapshot> {
        let pubkey = Self::parse_pubkey(address)?;
        self.pace().await;

        let response = self
            .client
            .get_account_with_commitment(&pubkey, self.config.commitment)
            .map_err(Self::map_client_error)?;

        Ok(Self::snapshot_from_account(response.value))
    }

    async fn get_accounts_batch(
        &self,
        addresses: &[String],
    ) -> AppResult<HashMap<String, AccountSnapshot>> {
        let mut snapshots = HashMap::with_capacity(addresses.len());

        for chunk in addresses.chunks(self.config.batch_limit.max(1)) {
            let pubkeys = chunk
                .iter()
                .map(|a| Self::parse_pubkey(a))
                .collect::<AppResult<Vec<_>>>()?;

            self.pace().await;
            let accounts = self
                .client
                .get_multiple_accounts(&pubkeys)
                .map_err(Self::map_client_error)?;

            for (address, account) in chunk.iter().zip(accounts) {
                snapshots.insert(address.clone(), Self::snapshot_from_account(account));
            }
        }

        Ok(snapshots)
    }

    async fn get_transactions_for_signer(
        &self,
        address: &str,
        limit: usize,
    ) -> AppResult<SignerHistory> {
        let pubkey = Self::parse_pubkey(address)?;
        self.pace().await;

        let signatures = self
            .client
            .get_signatures_for_address_with_config(
                &pubkey,
                GetConfirmedSignaturesForAddress2Config {
                    limit: Some(limit.min(1000)),
                    ..Default::default()
                },
            )
            .map_err(Self::map_client_error)?;

        let mut history = SignerHistory::default();

        for info in signatures {
            let block_time = info.block_time.and_then(|t| DateTime::from_timestamp(t, 0));

            // Failed transactions cannot have created anything durable; skip
            // the expensive per-transaction fetch for them.
            if info.err.is_some() {
                history.transactions.push(SignerTransaction {
                    reference: info.signature.clone(),
                    succeeded: false,
                    block_time,
                    ..Default::default()
                });
                continue;
            }

            let signature = match Signature::from_str(&info.signature) {
                Ok(sig) => sig,
                Err(e) => {
                    history.errors.push(
                        LedgerError::Malformed(format!("bad signature {}: {e}", info.signature))
                            .to_string(),
                    );
                    continue;
                }
            };

            self.pace().await;
            let fetched = self.client.get_transaction_with_config(
                &signature,
                RpcTransactionConfig {
                    encoding: Some(UiTransactionEncoding::JsonParsed),
                    commitment: Some(self.config.commitment),
                    max_supported_transaction_version: Some(0),
                },
            );

            match fetched {
                Ok(confirmed) => match serde_json::to_value(&confirmed) {
                    Ok(value) => {
                        history.transactions.push(Self::parse_confirmed(
                            &info.signature,
                            &value,
                            block_time,
                        ));
                    }
                    Err(e) => history.errors.push(
                        LedgerError::Malformed(format!(
                            "unparseable transaction {}: {e}",
                            info.signature
                        ))
                        .to_string(),
                    ),
                },
                Err(e) => {
                    warn!("⚠️ Failed to fetch transaction {}: {e}", info.signature);
                    history
                        .errors
                        .push(format!("fetch failed for {}: {e}", info.signature));
                }
            }
        }

        debug!(
            "Fetched {} signer transactions ({} fetch errors)",
            history.transactions.len(),
            history.errors.len()
        );

        Ok(history)
    }

    async fn submit(&self, action: &ReclaimAction) -> AppResult<String> {
        let signer = self.signer.clone().ok_or_else(|| {
            AppError::Config("signing credential unconfigured: set SPONSOR_KEYPAIR".to_string())
        })?;

        let instruction = Self::build_instruction(action, &signer.pubkey())?;

        self.pace().await;
        let blockhash = self
            .client
            .get_latest_blockhash()
            .map_err(Self::map_client_error)?;

        let transaction = Self::sign_transaction(&signer, instruction, blockhash)?;

        self.pace().await;
        let signature = self
            .client
            .send_and_confirm_transaction(&transaction)
            .map_err(|e| ReclaimError::Submission(e.to_string()))?;

        Ok(signature.to_string())
    }

    fn batch_limit(&self) -> usize {
        self.config.batch_limit
    }
}
