// Reconciliation engine - keeps the state store's view of each tracked
// account in sync with the ledger.
//
// Only Active/Inactive accounts are polled; Closed, Reclaimed and
// Whitelisted are excluded to bound polling cost. Reads are batched up to
// the gateway's batch limit, every account's outcome is persisted before the
// next one is considered, and one account's read failure never aborts the
// pass.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::AppResult;
use crate::gateway::{AccountSnapshot, LedgerGateway};
use crate::store::{AccountStatus, AccountStore, TrackedAccount};

#[derive(Debug, Clone, Serialize)]
pub struct StatusChange {
    pub address: String,
    pub previous: AccountStatus,
    pub new: AccountStatus,
    pub reason: String,
}

#[derive(Debug, Default, Serialize)]
pub struct ReconcileReport {
    pub total_checked: usize,
    pub changes: Vec<StatusChange>,
    pub errors: Vec<String>,
    #[serde(skip)]
    pub duration: Duration,
}

/// What a fresh snapshot means for one stored record. Pure, so the precedence
/// rules are testable without a store or gateway.
#[derive(Debug, PartialEq, Eq)]
enum Outcome {
    /// Terminal status slipped into the working set; nothing to do.
    Skip,
    /// Account no longer exists on-chain.
    Close,
    /// Closed account reappeared on-chain.
    Reopen { lamports: i64 },
    /// Balance fell below the inactivity threshold.
    Deactivate { lamports: i64 },
    /// No status change, balance drifted.
    UpdateBalance { lamports: i64 },
    /// Nothing changed; just record the check time.
    Touch,
}

/// Precedence per rule set, first match wins:
/// terminal → missing → reappeared → balance collapse → balance drift.
fn decide(account: &TrackedAccount, snapshot: &AccountSnapshot, threshold: f64) -> Outcome {
    let lamports = snapshot.lamports as i64;

    if account.status.is_terminal() {
        return Outcome::Skip;
    }
    if !snapshot.exists {
        if account.status == AccountStatus::Closed {
            return Outcome::Touch;
        }
        return Outcome::Close;
    }
    if account.status == AccountStatus::Closed {
        return Outcome::Reopen { lamports };
    }
    if account.status == AccountStatus::Active
        && (lamports as f64) < threshold * (account.deposit_lamports as f64)
    {
        return Outcome::Deactivate { lamports };
    }
    if lamports != account.deposit_lamports {
        return Outcome::UpdateBalance { lamports };
    }
    Outcome::Touch
}

pub struct ReconcileEngine {
    store: Arc<AccountStore>,
    gateway: Arc<dyn LedgerGateway>,
    /// Active -> Inactive when balance drops below this fraction of the
    /// stored deposit.
    inactivity_threshold: f64,
}

impl ReconcileEngine {
    pub fn new(
        store: Arc<AccountStore>,
        gateway: Arc<dyn LedgerGateway>,
        inactivity_threshold: f64,
    ) -> Self {
        Self {
            store,
            gateway,
            inactivity_threshold,
        }
    }

    pub async fn run(&self) -> AppResult<ReconcileReport> {
        let started = Instant::now();
        let mut report = ReconcileReport::default();

        let accounts = self.store.list_polled().await?;

        for chunk in accounts.chunks(self.gateway.batch_limit().max(1)) {
            let addresses: Vec<String> = chunk.iter().map(|a| a.address.clone()).collect();

            let snapshots = match self.gateway.get_accounts_batch(&addresses).await {
                Ok(snapshots) => snapshots,
                Err(e) => {
                    warn!("⚠️ Batched read failed for {} accounts: {e}", chunk.len());
                    for address in &addresses {
                        report.errors.push(format!("read failed for {address}: {e}"));
                    }
                    continue;
                }
            };

            for account in chunk {
                report.total_checked += 1;

                let Some(snapshot) = snapshots.get(&account.address) else {
                    report
                        .errors
                        .push(format!("no snapshot returned for {}", account.address));
                    continue;
                };

                if let Err(e) = self.apply(account, snapshot, &mut report).await {
                    report
                        .errors
                        .push(format!("failed to persist {}: {e}", account.address));
                }
            }
        }

        report.duration = started.elapsed();
        info!(
            "🔄 Reconciliation complete: {} checked, {} status changes, {} errors in {:?}",
            report.total_checked,
            report.changes.len(),
            report.errors.len(),
            report.duration
        );

        Ok(report)
    }

    async fn apply(
        &self,
        account: &TrackedAccount,
        snapshot: &AccountSnapshot,
        report: &mut ReconcileReport,
    ) -> AppResult<()> {
        let now = Utc::now();

        match decide(account, snapshot, self.inactivity_threshold) {
            Outcome::Skip => {}
            Outcome::Close => {
                self.store.mark_closed(&account.address, now).await?;
                report.changes.push(StatusChange {
                    address: account.address.clone(),
                    previous: account.status,
                    new: AccountStatus::Closed,
                    reason: "account no longer exists on-chain".to_string(),
                });
            }
            Outcome::Reopen { lamports } => {
                self.store
                    .mark_reopened(&account.address, lamports, now)
                    .await?;
                report.changes.push(StatusChange {
                    address: account.address.clone(),
                    previous: account.status,
                    new: AccountStatus::Active,
                    reason: "account reappeared on-chain".to_string(),
                });
            }
            Outcome::Deactivate { lamports } => {
                self.store
                    .mark_inactive(&account.address, lamports, now)
                    .await?;
                report.changes.push(StatusChange {
                    address: account.address.clone(),
                    previous: account.status,
                    new: AccountStatus::Inactive,
                    reason: format!(
                        "balance {lamports} fell below {:.0}% of stored deposit {}",
                        self.inactivity_threshold * 100.0,
                        account.deposit_lamports
                    ),
                });
            }
            Outcome::UpdateBalance { lamports } => {
                self.store
                    .record_balance(&account.address, lamports, now)
                    .await?;
            }
            Outcome::Touch => {
                self.store.touch(&account.address, now).await?;
            }
        }

        Ok(())
    }
}
