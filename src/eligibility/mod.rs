// Eligibility policy - the decision function consulted before any reclaim.
//
// The core `evaluate` is pure over one stored record plus a fresh on-chain
// snapshot and the list-membership flags; `EligibilityPolicy::check` wraps it
// with the store/gateway reads and the one permitted side effect (correcting
// a stale status to Closed, surfaced as a warning).

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::debug;

use crate::error::AppResult;
use crate::gateway::{AccountSnapshot, LedgerGateway};
use crate::store::{AccountStatus, AccountStore, TrackedAccount};

#[derive(Debug, Clone)]
pub struct PolicyConfig {
    /// Minimum elapsed time after closure before a reclaim may be attempted.
    pub dormancy_window: Duration,
    /// Deposits below this are not worth a reclaim transaction.
    pub min_threshold: i64,
}

/// Decision output: `eligible` iff `reasons` is empty. Warnings are
/// diagnostics and never block.
#[derive(Debug, Default, Serialize)]
pub struct EligibilityReport {
    pub eligible: bool,
    pub reasons: Vec<String>,
    pub warnings: Vec<String>,
}

impl EligibilityReport {
    fn blocked(reasons: Vec<String>) -> Self {
        Self {
            eligible: false,
            reasons,
            warnings: Vec::new(),
        }
    }
}

/// Pure policy evaluation. All blocking reasons are collected in check order
/// so the report doubles as a diagnostic.
pub fn evaluate(
    account: &TrackedAccount,
    fresh: &AccountSnapshot,
    allow_listed: bool,
    deny_listed: bool,
    now: DateTime<Utc>,
    config: &PolicyConfig,
) -> EligibilityReport {
    let mut reasons = Vec::new();
    let mut warnings = Vec::new();

    if account.status == AccountStatus::Reclaimed {
        reasons.push("deposit already reclaimed".to_string());
    }

    if allow_listed {
        reasons.push("address is on the allow-list; reclaim is permanently blocked".to_string());
    }

    if deny_listed {
        reasons.push("address is on the deny-list".to_string());
    }

    // Fresh existence check. A live account holding at least the threshold is
    // simply not done yet; a vanished account with a stale status gets its
    // status corrected by the caller (warning only).
    let mut effective_closed_at = account.closed_at;
    if fresh.exists {
        if fresh.lamports as i64 >= config.min_threshold {
            reasons.push(format!(
                "account still exists on-chain with balance {}; not yet closed",
                fresh.lamports
            ));
        }
    } else if account.status != AccountStatus::Closed {
        warnings.push(format!(
            "stored status {} is stale: account no longer exists on-chain, corrected to closed",
            account.status
        ));
        effective_closed_at = Some(now);
    }

    match effective_closed_at {
        Some(closed_at) => {
            let elapsed = now - closed_at;
            if elapsed < config.dormancy_window {
                let remaining = config.dormancy_window - elapsed;
                reasons.push(format!(
                    "dormancy window not met; {} day(s) remaining",
                    days_ceil(remaining)
                ));
            }
        }
        None => {
            reasons.push("account is not closed; dormancy window has not started".to_string());
        }
    }

    if account.deposit_lamports < config.min_threshold {
        reasons.push(format!(
            "deposit {} is below the minimum threshold {}",
            account.deposit_lamports, config.min_threshold
        ));
    }

    EligibilityReport {
        eligible: reasons.is_empty(),
        reasons,
        warnings,
    }
}

fn days_ceil(duration: Duration) -> i64 {
    (duration.num_seconds() + 86_399) / 86_400
}

pub struct EligibilityPolicy {
    store: Arc<AccountStore>,
    gateway: Arc<dyn LedgerGateway>,
    config: PolicyConfig,
}

impl EligibilityPolicy {
    pub fn new(
        store: Arc<AccountStore>,
        gateway: Arc<dyn LedgerGateway>,
        config: PolicyConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            config,
        }
    }

    /// Full check for one address: store lookup, list membership, fresh
    /// on-chain read, then the pure evaluation. The only mutation is the
    /// opportunistic stale-status correction, which never zeroes the stored
    /// deposit (that is reconciliation's job, not the policy's).
    pub async fn check(&self, address: &str) -> AppResult<EligibilityReport> {
        let Some(account) = self.store.get_by_address(address).await? else {
            return Ok(EligibilityReport::blocked(vec![format!(
                "account {address} is not tracked in the state store"
            )]));
        };

        let allow_listed = self.store.is_allow_listed(address).await?;
        let deny_listed = self.store.is_deny_listed(address).await?;
        let fresh = self.gateway.get_account(address).await?;

        let now = Utc::now();
        let report = evaluate(&account, &fresh, allow_listed, deny_listed, now, &self.config);

        if !fresh.exists && account.status != AccountStatus::Closed {
            self.store
                .set_status(address, AccountStatus::Closed, Some(now))
                .await?;
        }

        debug!(
            "Eligibility for {address}: eligible={} reasons={:?}",
            report.eligible, report.reasons
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{memory_store, tracked_row, MockLedger};

    fn config(dormancy_days: i64, min_threshold: i64) -> PolicyConfig {
        PolicyConfig {
            dormancy_window: Duration::days(dormancy_days),
            min_threshold,
        }
    }

    fn closed_days_ago(deposit: i64, days: i64) -> TrackedAccount {
        let mut account = tracked_row("acc", AccountStatus::Closed, deposit);
        account.closed_at = Some(Utc::now() - Duration::days(days));
        account
    }

    #[test]
    fn closed_long_enough_with_sufficient_deposit_is_eligible() {
        let account = closed_days_ago(2_039_280, 10);
        let report = evaluate(
            &account,
            &AccountSnapshot::missing(),
            false,
            false,
            Utc::now(),
            &config(7, 100_000),
        );

        assert!(report.eligible, "unexpected reasons: {:?}", report.reasons);
        assert!(report.reasons.is_empty());
    }

    #[test]
    fn longer_dormancy_window_blocks_with_remaining_days() {
        let account = closed_days_ago(2_039_280, 10);
        let report = evaluate(
            &account,
            &AccountSnapshot::missing(),
            false,
            false,
            Utc::now(),
            &config(14, 100_000),
        );

        assert!(!report.eligible);
        assert!(
            report.reasons.iter().any(|r| r.contains("4 day(s) remaining")),
            "reasons: {:?}",
            report.reasons
        );
    }

    #[test]
    fn deny_list_blocks_otherwise_eligible_account() {
        let account = closed_days_ago(2_039_280, 10);
        let report = evaluate(
            &account,
            &AccountSnapshot::missing(),
            false,
            true,
            Utc::now(),
            &config(7, 100_000),
        );

        assert!(!report.eligible);
        assert!(report.reasons.iter().any(|r| r.contains("deny-list")));
    }

    #[test]
    fn allow_list_blocks_regardless_of_balance_and_dormancy() {
        let account = closed_days_ago(i64::MAX / 2, 1000);
        let report = evaluate(
            &account,
            &AccountSnapshot::missing(),
            true,
            false,
            Utc::now(),
            &config(1, 1),
        );

        assert!(!report.eligible);
        assert!(report.reasons.iter().any(|r| r.contains("allow-list")));
    }

    #[test]
    fn live_account_at_threshold_is_not_yet_closed() {
        let account = closed_days_ago(2_039_280, 10);
        let fresh = AccountSnapshot {
            exists: true,
            lamports: 2_039_280,
            owner: None,
            data_size: None,
        };
        let report = evaluate(&account, &fresh, false, false, Utc::now(), &config(7, 100_000));

        assert!(!report.eligible);
        assert!(report.reasons.iter().any(|r| r.contains("not yet closed")));
    }

    #[test]
    fn live_account_below_threshold_can_still_be_eligible() {
        let account = closed_days_ago(2_039_280, 10);
        let fresh = AccountSnapshot {
            exists: true,
            lamports: 50_000,
            owner: None,
            data_size: None,
        };
        let report = evaluate(&account, &fresh, false, false, Utc::now(), &config(7, 100_000));

        assert!(report.eligible, "reasons: {:?}", report.reasons);
    }

    #[test]
    fn stale_status_corrected_with_warning_and_dormancy_restarts() {
        let mut account = tracked_row("acc", AccountStatus::Active, 2_039_280);
        account.closed_at = None;

        let report = evaluate(
            &account,
            &AccountSnapshot::missing(),
            false,
            false,
            Utc::now(),
            &config(7, 100_000),
        );

        assert!(!report.eligible);
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("corrected to closed"));
        assert!(report.reasons.iter().any(|r| r.contains("remaining")));
    }

    #[test]
    fn reclaimed_account_is_never_eligible_again() {
        let mut account = tracked_row("acc", AccountStatus::Reclaimed, 0);
        account.closed_at = Some(Utc::now() - Duration::days(30));

        let report = evaluate(
            &account,
            &AccountSnapshot::missing(),
            false,
            false,
            Utc::now(),
            &config(7, 100_000),
        );

        assert!(!report.eligible);
        assert!(report.reasons.iter().any(|r| r.contains("already reclaimed")));
    }

    #[tokio::test]
    async fn check_corrects_stale_status_in_store() {
        let store = Arc::new(memory_store().await);
        store
            .insert_account(&crate::testutil::tracked("acc", AccountStatus::Active, 500_000))
            .await
            .unwrap();

        let policy = EligibilityPolicy::new(
            store.clone(),
            Arc::new(MockLedger::new()),
            config(7, 100_000),
        );

        let report = policy.check("acc").await.unwrap();
        assert!(!report.eligible);
        assert_eq!(report.warnings.len(), 1);

        let corrected = store.get_by_address("acc").await.unwrap().unwrap();
        assert_eq!(corrected.status, AccountStatus::Closed);
        assert!(corrected.closed_at.is_some());
        // The stored deposit is policy-relevant state and must survive the
        // correction.
        assert_eq!(corrected.deposit_lamports, 500_000);
    }

    #[tokio::test]
    async fn untracked_address_is_blocked_not_an_error() {
        let store = Arc::new(memory_store().await);
        let policy = EligibilityPolicy::new(
            store,
            Arc::new(MockLedger::new()),
            config(7, 100_000),
        );

        let report = policy.check("nobody").await.unwrap();
        assert!(!report.eligible);
        assert!(report.reasons[0].contains("not tracked"));
    }
}
