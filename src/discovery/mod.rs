// Discovery engine - seeds the state store from the sponsor's transaction
// history.
//
// Scan flow:
// 1. Resolve the sponsor fee-payer address
// 2. Pull its N most recent transactions, newest first
// 3. Extract account-creation candidates from the parsed effects
// 4. Read current on-chain state for each untracked candidate and persist
//
// Re-running over the same history is a no-op: tracked addresses are counted
// as existing and never re-inserted.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::AppResult;
use crate::gateway::{LedgerGateway, SignerTransaction, SponsorResolver};
use crate::store::{AccountKind, AccountStatus, AccountStore, NewTrackedAccount};

/// Outcome of one discovery cycle. Always returned, never thrown: an
/// unconfigured or unreachable sponsor yields a zero report whose errors
/// carry remediation hints.
#[derive(Debug, Default, Serialize)]
pub struct DiscoveryReport {
    /// Distinct creation candidates seen in the scanned history.
    pub found: usize,
    pub new_accounts: usize,
    pub existing: usize,
    pub errors: Vec<String>,
}

impl DiscoveryReport {
    fn unavailable(errors: Vec<String>) -> Self {
        Self {
            errors,
            ..Default::default()
        }
    }
}

/// A candidate address pulled out of one transaction's effects.
#[derive(Debug, PartialEq, Eq)]
struct Candidate {
    address: String,
    ata_hint: bool,
}

pub struct DiscoveryEngine {
    store: Arc<AccountStore>,
    gateway: Arc<dyn LedgerGateway>,
    sponsor: Arc<dyn SponsorResolver>,
    scan_limit: usize,
}

impl DiscoveryEngine {
    pub fn new(
        store: Arc<AccountStore>,
        gateway: Arc<dyn LedgerGateway>,
        sponsor: Arc<dyn SponsorResolver>,
        scan_limit: usize,
    ) -> Self {
        Self {
            store,
            gateway,
            sponsor,
            scan_limit,
        }
    }

    pub async fn run(&self) -> AppResult<DiscoveryReport> {
        let sponsor = match self.sponsor.resolve_sponsor().await {
            Ok(address) => address,
            Err(e) => {
                warn!("⚠️ Discovery skipped: {e}");
                return Ok(DiscoveryReport::unavailable(vec![
                    e.to_string(),
                    "set SPONSOR_ADDRESS or SPONSOR_KEYPAIR to enable discovery".to_string(),
                ]));
            }
        };

        let history = match self
            .gateway
            .get_transactions_for_signer(&sponsor, self.scan_limit)
            .await
        {
            Ok(history) => history,
            Err(e) => {
                warn!("⚠️ Discovery skipped, sponsor history unreachable: {e}");
                return Ok(DiscoveryReport::unavailable(vec![
                    format!("sponsor history unreachable: {e}"),
                    "check SOLANA_RPC_URL and endpoint rate limits, then retry".to_string(),
                ]));
            }
        };

        let mut report = DiscoveryReport::default();
        report.errors = history.errors;

        let mut seen: HashSet<String> = HashSet::new();
        let mut candidates: Vec<(Candidate, SignerTransaction)> = Vec::new();

        for tx in history.transactions {
            if !tx.succeeded {
                continue;
            }
            // Only transactions the sponsor actually paid for count.
            if tx.fee_payer.as_deref() != Some(sponsor.as_str()) {
                continue;
            }

            for candidate in extract_candidates(&tx) {
                if seen.insert(candidate.address.clone()) {
                    candidates.push((candidate, tx.clone()));
                }
            }
        }

        report.found = candidates.len();

        for (candidate, tx) in candidates {
            match self.track_candidate(&candidate, &tx, &mut report).await {
                Ok(()) => {}
                Err(e) => report
                    .errors
                    .push(format!("failed to track {}: {e}", candidate.address)),
            }
        }

        info!(
            "🔍 Discovery complete: {} found, {} new, {} existing, {} errors",
            report.found,
            report.new_accounts,
            report.existing,
            report.errors.len()
        );

        Ok(report)
    }

    async fn track_candidate(
        &self,
        candidate: &Candidate,
        tx: &SignerTransaction,
        report: &mut DiscoveryReport,
    ) -> AppResult<()> {
        if self.store.get_by_address(&candidate.address).await?.is_some() {
            report.existing += 1;
            return Ok(());
        }

        let snapshot = self.gateway.get_account(&candidate.address).await?;
        let now = Utc::now();

        // Allow-list membership forces Whitelisted from the first insert, so
        // the account is never polled or considered for reclaim.
        let (status, closed_at) = if self.store.is_allow_listed(&candidate.address).await? {
            (AccountStatus::Whitelisted, None)
        } else if snapshot.exists {
            (AccountStatus::Active, None)
        } else {
            (AccountStatus::Closed, Some(now))
        };

        let new = NewTrackedAccount {
            address: candidate.address.clone(),
            created_at: tx.block_time.unwrap_or(now),
            sponsor_tx_ref: Some(tx.reference.clone()),
            kind: AccountKind::classify(snapshot.owner.as_deref(), candidate.ata_hint),
            deposit_lamports: snapshot.lamports as i64,
            status,
            closed_at,
            owner_program: snapshot.owner.clone(),
            data_size: snapshot.data_size.map(|s| s as i64),
        };

        self.store.insert_account(&new).await?;
        report.new_accounts += 1;

        Ok(())
    }
}

/// Account-creation patterns recognized in a transaction's parsed effects.
fn extract_candidates(tx: &SignerTransaction) -> Vec<Candidate> {
    let mut candidates = Vec::new();

    for ix in &tx.instructions {
        let (key, ata_hint) = match (ix.program.as_str(), ix.kind.as_str()) {
            ("system", "createAccount") | ("system", "createAccountWithSeed") => {
                ("newAccount", false)
            }
            ("spl-token", kind) if kind.starts_with("initializeAccount") => ("account", false),
            ("spl-associated-token-account", "create")
            | ("spl-associated-token-account", "createIdempotent") => ("account", true),
            _ => continue,
        };

        if let Some(address) = ix.info[key].as_str() {
            candidates.push(Candidate {
                address: address.to_string(),
                ata_hint,
            });
        }
    }

    // Fallback heuristic: a token-balance account present after execution but
    // absent before it was created by this transaction.
    let pre: HashSet<&str> = tx.pre_token_accounts.iter().map(String::as_str).collect();
    for address in &tx.post_token_accounts {
        if !pre.contains(address.as_str()) {
            candidates.push(Candidate {
                address: address.clone(),
                ata_hint: false,
            });
        }
    }

    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::AccountSnapshot;
    use crate::testutil::{memory_store, parsed_ix, MockLedger, MockSponsor, SPONSOR};

    fn create_tx(reference: &str, new_account: &str) -> SignerTransaction {
        SignerTransaction {
            reference: reference.to_string(),
            succeeded: true,
            fee_payer: Some(SPONSOR.to_string()),
            instructions: vec![parsed_ix(
                "system",
                "createAccount",
                serde_json::json!({ "newAccount": new_account }),
            )],
            ..Default::default()
        }
    }

    fn engine(store: Arc<AccountStore>, ledger: MockLedger) -> DiscoveryEngine {
        DiscoveryEngine::new(
            store,
            Arc::new(ledger),
            Arc::new(MockSponsor::configured()),
            100,
        )
    }

    #[tokio::test]
    async fn discovers_and_classifies_new_accounts() {
        let store = Arc::new(memory_store().await);
        let ledger = MockLedger::new()
            .with_history(vec![create_tx("sig-1", "token-acc")])
            .with_account(
                "token-acc",
                AccountSnapshot {
                    exists: true,
                    lamports: 2_039_280,
                    owner: Some(crate::store::TOKEN_PROGRAM_ID.to_string()),
                    data_size: Some(165),
                },
            );

        let report = engine(store.clone(), ledger).run().await.unwrap();
        assert_eq!(report.found, 1);
        assert_eq!(report.new_accounts, 1);
        assert_eq!(report.existing, 0);
        assert!(report.errors.is_empty());

        let tracked = store.get_by_address("token-acc").await.unwrap().unwrap();
        assert_eq!(tracked.status, AccountStatus::Active);
        assert_eq!(tracked.kind, AccountKind::TokenAccount);
        assert_eq!(tracked.deposit_lamports, 2_039_280);
        assert_eq!(tracked.sponsor_tx_ref.as_deref(), Some("sig-1"));
    }

    #[tokio::test]
    async fn allow_listed_candidate_is_tracked_as_whitelisted() {
        let store = Arc::new(memory_store().await);
        store.allow_list_insert("vip", Some("partner")).await.unwrap();

        let ledger = MockLedger::new()
            .with_history(vec![create_tx("sig-1", "vip")])
            .with_account(
                "vip",
                AccountSnapshot {
                    exists: true,
                    lamports: 2_039_280,
                    owner: Some(crate::store::TOKEN_PROGRAM_ID.to_string()),
                    data_size: Some(165),
                },
            );

        let report = engine(store.clone(), ledger).run().await.unwrap();
        assert_eq!(report.new_accounts, 1);

        let tracked = store.get_by_address("vip").await.unwrap().unwrap();
        assert_eq!(tracked.status, AccountStatus::Whitelisted);
        assert!(tracked.closed_at.is_none());
        assert!(store.list_polled().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn vanished_candidate_starts_closed() {
        let store = Arc::new(memory_store().await);
        let ledger = MockLedger::new().with_history(vec![create_tx("sig-1", "gone")]);

        engine(store.clone(), ledger).run().await.unwrap();

        let tracked = store.get_by_address("gone").await.unwrap().unwrap();
        assert_eq!(tracked.status, AccountStatus::Closed);
        assert!(tracked.closed_at.is_some());
        assert_eq!(tracked.deposit_lamports, 0);
    }

    #[tokio::test]
    async fn second_run_over_same_history_is_a_noop() {
        let store = Arc::new(memory_store().await);
        let history = vec![create_tx("sig-1", "acc-1"), create_tx("sig-2", "acc-2")];

        let ledger = MockLedger::new()
            .with_history(history.clone())
            .with_account("acc-1", AccountSnapshot::missing())
            .with_account(
                "acc-2",
                AccountSnapshot {
                    exists: true,
                    lamports: 900_000,
                    owner: Some(crate::store::SYSTEM_PROGRAM_ID.to_string()),
                    data_size: Some(0),
                },
            );

        let first = engine(store.clone(), ledger).run().await.unwrap();
        assert_eq!(first.new_accounts, 2);

        let before = store.list_all().await.unwrap();

        let ledger = MockLedger::new().with_history(history);
        let second = engine(store.clone(), ledger).run().await.unwrap();
        assert_eq!(second.found, 2);
        assert_eq!(second.new_accounts, 0);
        assert_eq!(second.existing, 2);

        assert_eq!(store.list_all().await.unwrap(), before);
    }

    #[tokio::test]
    async fn skips_failed_and_foreign_fee_payer_transactions() {
        let store = Arc::new(memory_store().await);

        let mut failed = create_tx("sig-1", "from-failed");
        failed.succeeded = false;
        let mut foreign = create_tx("sig-2", "from-foreign");
        foreign.fee_payer = Some("someone-else".to_string());

        let ledger = MockLedger::new().with_history(vec![failed, foreign]);
        let report = engine(store.clone(), ledger).run().await.unwrap();

        assert_eq!(report.found, 0);
        assert!(store.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn ata_create_and_token_balance_fallback_patterns() {
        let store = Arc::new(memory_store().await);

        let tx = SignerTransaction {
            reference: "sig-1".to_string(),
            succeeded: true,
            fee_payer: Some(SPONSOR.to_string()),
            instructions: vec![parsed_ix(
                "spl-associated-token-account",
                "create",
                serde_json::json!({ "account": "ata-acc" }),
            )],
            pre_token_accounts: vec!["old-token".to_string()],
            post_token_accounts: vec!["old-token".to_string(), "fresh-token".to_string()],
            ..Default::default()
        };

        let token_snapshot = AccountSnapshot {
            exists: true,
            lamports: 2_039_280,
            owner: Some(crate::store::TOKEN_PROGRAM_ID.to_string()),
            data_size: Some(165),
        };
        let ledger = MockLedger::new()
            .with_history(vec![tx])
            .with_account("ata-acc", token_snapshot.clone())
            .with_account("fresh-token", token_snapshot);

        let report = engine(store.clone(), ledger).run().await.unwrap();
        assert_eq!(report.found, 2);
        assert_eq!(report.new_accounts, 2);

        let ata = store.get_by_address("ata-acc").await.unwrap().unwrap();
        assert_eq!(ata.kind, AccountKind::AssociatedToken);
        let fallback = store.get_by_address("fresh-token").await.unwrap().unwrap();
        assert_eq!(fallback.kind, AccountKind::TokenAccount);
    }

    #[tokio::test]
    async fn unconfigured_sponsor_yields_zero_report_with_hints() {
        let store = Arc::new(memory_store().await);
        let engine = DiscoveryEngine::new(
            store,
            Arc::new(MockLedger::new()),
            Arc::new(MockSponsor::unconfigured()),
            100,
        );

        let report = engine.run().await.unwrap();
        assert_eq!(report.found, 0);
        assert_eq!(report.new_accounts, 0);
        assert!(report
            .errors
            .iter()
            .any(|e| e.contains("SPONSOR_ADDRESS") || e.contains("SPONSOR_KEYPAIR")));
    }

    #[tokio::test]
    async fn per_account_read_failure_does_not_abort_scan() {
        let store = Arc::new(memory_store().await);
        let ledger = MockLedger::new()
            .with_history(vec![create_tx("sig-1", "bad-read"), create_tx("sig-2", "good")])
            .failing_reads_for("bad-read")
            .with_account(
                "good",
                AccountSnapshot {
                    exists: true,
                    lamports: 1_000,
                    owner: Some(crate::store::SYSTEM_PROGRAM_ID.to_string()),
                    data_size: Some(0),
                },
            );

        let report = engine(store.clone(), ledger).run().await.unwrap();
        assert_eq!(report.found, 2);
        assert_eq!(report.new_accounts, 1);
        assert_eq!(report.errors.len(), 1);
        assert!(store.get_by_address("good").await.unwrap().is_some());
        assert!(store.get_by_address("bad-read").await.unwrap().is_none());
    }
}
