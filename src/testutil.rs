// Shared test fixtures: an in-memory store and scripted gateway/sponsor
// doubles.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqlitePoolOptions;

use crate::error::{AppError, AppResult, LedgerError, ReclaimError};
use crate::gateway::{
    AccountSnapshot, LedgerGateway, ParsedInstruction, ReclaimAction, SignerHistory,
    SignerTransaction, SponsorResolver,
};
use crate::store::{
    AccountKind, AccountStatus, AccountStore, NewTrackedAccount, TrackedAccount, TOKEN_PROGRAM_ID,
};

pub const SPONSOR: &str = "sponsor-address";

/// Fresh in-memory store with migrations applied. A single connection keeps
/// the :memory: database alive for the pool's lifetime.
pub async fn memory_store() -> AccountStore {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("migrations");
    AccountStore::new(pool)
}

/// Insert payload for a token account in the given status.
pub fn tracked(address: &str, status: AccountStatus, deposit: i64) -> NewTrackedAccount {
    let closed_at = matches!(status, AccountStatus::Closed | AccountStatus::Reclaimed)
        .then(Utc::now);
    NewTrackedAccount {
        address: address.to_string(),
        created_at: Utc::now(),
        sponsor_tx_ref: Some("seed-sig".to_string()),
        kind: AccountKind::TokenAccount,
        deposit_lamports: deposit,
        status,
        closed_at,
        owner_program: Some(TOKEN_PROGRAM_ID.to_string()),
        data_size: Some(165),
    }
}

/// Fully-populated row for pure-function tests that never touch the store.
pub fn tracked_row(address: &str, status: AccountStatus, deposit: i64) -> TrackedAccount {
    let seed = tracked(address, status, deposit);
    TrackedAccount {
        id: 1,
        address: seed.address,
        created_at: seed.created_at,
        sponsor_tx_ref: seed.sponsor_tx_ref,
        kind: seed.kind,
        deposit_lamports: seed.deposit_lamports,
        status: seed.status,
        last_checked_at: None,
        closed_at: seed.closed_at,
        owner_program: seed.owner_program,
        data_size: seed.data_size,
        notes: None,
    }
}

pub fn parsed_ix(program: &str, kind: &str, info: serde_json::Value) -> ParsedInstruction {
    ParsedInstruction {
        program: program.to_string(),
        kind: kind.to_string(),
        info,
    }
}

pub struct MockSponsor {
    address: Option<String>,
}

impl MockSponsor {
    pub fn configured() -> Self {
        Self {
            address: Some(SPONSOR.to_string()),
        }
    }

    pub fn unconfigured() -> Self {
        Self { address: None }
    }
}

#[async_trait]
impl SponsorResolver for MockSponsor {
    async fn resolve_sponsor(&self) -> AppResult<String> {
        self.address.clone().ok_or_else(|| {
            AppError::Config(
                "sponsor identity unconfigured: set SPONSOR_ADDRESS or SPONSOR_KEYPAIR".to_string(),
            )
        })
    }
}

/// Scripted ledger. Unknown addresses read as missing accounts; submissions
/// are recorded for later assertion.
#[derive(Default)]
pub struct MockLedger {
    accounts: HashMap<String, AccountSnapshot>,
    history: Vec<SignerTransaction>,
    failing_reads: HashSet<String>,
    failing_submissions: HashSet<String>,
    batch_limit: usize,
    submitted: Mutex<Vec<ReclaimAction>>,
}

impl MockLedger {
    pub fn new() -> Self {
        Self {
            batch_limit: 100,
            ..Default::default()
        }
    }

    pub fn with_account(mut self, address: &str, snapshot: AccountSnapshot) -> Self {
        self.accounts.insert(address.to_string(), snapshot);
        self
    }

    pub fn with_history(mut self, history: Vec<SignerTransaction>) -> Self {
        self.history = history;
        self
    }

    pub fn failing_reads_for(mut self, address: &str) -> Self {
        self.failing_reads.insert(address.to_string());
        self
    }

    pub fn failing_submissions_for(mut self, address: &str) -> Self {
        self.failing_submissions.insert(address.to_string());
        self
    }

    pub fn with_batch_limit(mut self, limit: usize) -> Self {
        self.batch_limit = limit;
        self
    }

    pub fn submitted_actions(&self) -> Vec<ReclaimAction> {
        self.submitted.lock().unwrap().clone()
    }
}

#[async_trait]
impl LedgerGateway for MockLedger {
    async fn get_account(&self, address: &str) -> AppResult<AccountSnapshot> {
        if self.failing_reads.contains(address) {
            return Err(LedgerError::Transport(format!("scripted failure for {address}")).into());
        }
        Ok(self
            .accounts
            .get(address)
            .cloned()
            .unwrap_or_else(AccountSnapshot::missing))
    }

    async fn get_accounts_batch(
        &self,
        addresses: &[String],
    ) -> AppResult<HashMap<String, AccountSnapshot>> {
        if let Some(address) = addresses.iter().find(|a| self.failing_reads.contains(*a)) {
            return Err(LedgerError::Transport(format!("scripted failure for {address}")).into());
        }
        Ok(addresses
            .iter()
            .map(|address| {
                let snapshot = self
                    .accounts
                    .get(address)
                    .cloned()
                    .unwrap_or_else(AccountSnapshot::missing);
                (address.clone(), snapshot)
            })
            .collect())
    }

    async fn get_transactions_for_signer(
        &self,
        _address: &str,
        limit: usize,
    ) -> AppResult<SignerHistory> {
        Ok(SignerHistory {
            transactions: self.history.iter().take(limit).cloned().collect(),
            errors: Vec::new(),
        })
    }

    async fn submit(&self, action: &ReclaimAction) -> AppResult<String> {
        let target = action.target();
        if self.failing_submissions.contains(target) {
            return Err(
                ReclaimError::Submission(format!("scripted failure for {target}")).into(),
            );
        }
        self.submitted.lock().unwrap().push(action.clone());
        Ok(format!("sig-{target}"))
    }

    fn batch_limit(&self) -> usize {
        self.batch_limit
    }
}
