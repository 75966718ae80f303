// Reclaim executor - the only component that issues value-transfer actions.
//
// Protocol per account: re-evaluate eligibility, re-read the on-chain
// balance, build the kind-specific action, submit (unless dry-run), and
// append exactly one reclaim_log row per attempt. Status flips to Reclaimed
// only after an observed submission success.
//
// Known residual risks, accepted by design:
// - The balance re-read narrows but does not close the staleness window
//   between eligibility evaluation and submission; no on-ledger lock exists.
// - A crash between submission success and the status write leaves the
//   account Closed with a nonzero stored deposit; operators must check the
//   destination balance before any manual re-attempt.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::eligibility::EligibilityPolicy;
use crate::error::{AppResult, ReclaimError};
use crate::gateway::{LedgerGateway, ReclaimAction, SponsorResolver};
use crate::store::{AccountKind, AccountStatus, AccountStore};

/// Outcome of one reclaim attempt against one address.
#[derive(Debug, Default, Serialize)]
pub struct ReclaimResult {
    pub address: String,
    /// False when the eligibility policy blocked the attempt outright.
    pub attempted: bool,
    pub success: bool,
    pub simulated: bool,
    pub amount_reclaimed: i64,
    pub tx_ref: Option<String>,
    pub blocked_reasons: Vec<String>,
    pub error: Option<String>,
}

impl ReclaimResult {
    fn blocked(address: &str, reasons: Vec<String>) -> Self {
        Self {
            address: address.to_string(),
            blocked_reasons: reasons,
            ..Default::default()
        }
    }
}

#[derive(Debug, Default, Serialize)]
pub struct BatchReclaimSummary {
    pub total_attempted: usize,
    pub total_successful: usize,
    pub total_failed: usize,
    pub total_reclaimed_lamports: i64,
    pub results: Vec<ReclaimResult>,
}

pub struct ReclaimExecutor {
    store: Arc<AccountStore>,
    gateway: Arc<dyn LedgerGateway>,
    policy: Arc<EligibilityPolicy>,
    sponsor: Arc<dyn SponsorResolver>,
    /// Explicit destination for reclaimed deposits; defaults to the sponsor
    /// treasury address.
    destination: Option<String>,
    /// Fixed delay between consecutive submissions in a batch. Submissions
    /// are strictly sequential under one signing identity.
    submit_delay: Duration,
}

impl ReclaimExecutor {
    pub fn new(
        store: Arc<AccountStore>,
        gateway: Arc<dyn LedgerGateway>,
        policy: Arc<EligibilityPolicy>,
        sponsor: Arc<dyn SponsorResolver>,
        destination: Option<String>,
        submit_delay: Duration,
    ) -> Self {
        Self {
            store,
            gateway,
            policy,
            sponsor,
            destination,
            submit_delay,
        }
    }

    async fn destination(&self) -> AppResult<String> {
        match &self.destination {
            Some(address) => Ok(address.clone()),
            None => self.sponsor.resolve_sponsor().await,
        }
    }

    /// Reclaim one account's deposit. Never mutates anything when the policy
    /// blocks; otherwise appends exactly one reclaim_log row.
    pub async fn reclaim_account(&self, address: &str, dry_run: bool) -> AppResult<ReclaimResult> {
        let report = self.policy.check(address).await?;
        if !report.eligible {
            return Ok(ReclaimResult::blocked(address, report.reasons));
        }

        let account = self.store.require_by_address(address).await?;
        let destination = self.destination().await?;

        // Final balance re-read immediately before acting.
        let fresh = self.gateway.get_account(address).await?;
        let lamports = fresh.lamports as i64;

        if fresh.lamports == 0 {
            let message = ReclaimError::NothingToReclaim {
                address: address.to_string(),
            }
            .to_string();
            self.store
                .record_reclaim_attempt(address, None, 0, false, Some(&message), &destination)
                .await?;
            return Ok(ReclaimResult {
                address: address.to_string(),
                attempted: true,
                error: Some(message),
                ..Default::default()
            });
        }

        let action = match account.kind {
            AccountKind::TokenAccount | AccountKind::AssociatedToken => {
                ReclaimAction::CloseTokenAccount {
                    account: address.to_string(),
                    destination: destination.clone(),
                }
            }
            AccountKind::SystemAccount => ReclaimAction::TransferAll {
                from: address.to_string(),
                destination: destination.clone(),
                lamports: fresh.lamports,
            },
            // Safety boundary: never attempt a generic close against an
            // unrecognized owning program.
            AccountKind::ProgramData | AccountKind::Unknown => {
                let message = ReclaimError::UnsupportedOwner {
                    address: address.to_string(),
                    owner: account
                        .owner_program
                        .clone()
                        .unwrap_or_else(|| "unknown".to_string()),
                }
                .to_string();
                warn!("🚫 {message}");
                self.store
                    .record_reclaim_attempt(address, None, 0, false, Some(&message), &destination)
                    .await?;
                return Ok(ReclaimResult {
                    address: address.to_string(),
                    attempted: true,
                    error: Some(message),
                    ..Default::default()
                });
            }
        };

        if dry_run {
            let synthetic = format!("simulated-{}", uuid::Uuid::new_v4());
            self.store
                .record_reclaim_attempt(
                    address,
                    Some(&synthetic),
                    lamports,
                    true,
                    None,
                    &destination,
                )
                .await?;
            info!("🧪 Dry-run reclaim of {lamports} lamports from {address} -> {destination}");
            return Ok(ReclaimResult {
                address: address.to_string(),
                attempted: true,
                success: true,
                simulated: true,
                amount_reclaimed: lamports,
                tx_ref: Some(synthetic),
                ..Default::default()
            });
        }

        match self.gateway.submit(&action).await {
            Ok(tx_ref) => {
                self.store
                    .record_reclaim_attempt(
                        address,
                        Some(&tx_ref),
                        lamports,
                        true,
                        None,
                        &destination,
                    )
                    .await?;
                self.store.mark_reclaimed(address).await?;
                info!("💰 Reclaimed {lamports} lamports from {address} (tx: {tx_ref})");
                Ok(ReclaimResult {
                    address: address.to_string(),
                    attempted: true,
                    success: true,
                    amount_reclaimed: lamports,
                    tx_ref: Some(tx_ref),
                    ..Default::default()
                })
            }
            Err(e) => {
                let message = e.to_string();
                error!("❌ Reclaim submission failed for {address}: {message}");
                self.store
                    .record_reclaim_attempt(address, None, 0, false, Some(&message), &destination)
                    .await?;
                // Status untouched: the account stays eligible for the next
                // cycle.
                Ok(ReclaimResult {
                    address: address.to_string(),
                    attempted: true,
                    error: Some(message),
                    ..Default::default()
                })
            }
        }
    }

    /// Batch variant: compute the eligible set once, then run the
    /// single-account protocol sequentially with a fixed inter-submission
    /// delay. One account's failure never aborts the batch.
    pub async fn reclaim_all(&self, dry_run: bool) -> AppResult<BatchReclaimSummary> {
        let candidates = self
            .store
            .list_by_statuses(&[AccountStatus::Closed])
            .await?;

        let mut eligible = Vec::new();
        for candidate in &candidates {
            match self.policy.check(&candidate.address).await {
                Ok(report) if report.eligible => eligible.push(candidate.address.clone()),
                Ok(_) => {}
                Err(e) => warn!(
                    "⚠️ Eligibility check failed for {}: {e}",
                    candidate.address
                ),
            }
        }

        info!(
            "♻️ Batch reclaim: {} eligible of {} closed accounts (dry_run={dry_run})",
            eligible.len(),
            candidates.len()
        );

        let mut summary = BatchReclaimSummary::default();

        for (index, address) in eligible.iter().enumerate() {
            if index > 0 {
                tokio::time::sleep(self.submit_delay).await;
            }

            summary.total_attempted += 1;
            let result = match self.reclaim_account(address, dry_run).await {
                Ok(result) => result,
                Err(e) => ReclaimResult {
                    address: address.clone(),
                    attempted: true,
                    error: Some(e.to_string()),
                    ..Default::default()
                },
            };

            if result.success {
                summary.total_successful += 1;
                summary.total_reclaimed_lamports += result.amount_reclaimed;
            } else {
                summary.total_failed += 1;
            }
            summary.results.push(result);
        }

        info!(
            "♻️ Batch reclaim complete: {}/{} successful, {} lamports",
            summary.total_successful, summary.total_attempted, summary.total_reclaimed_lamports
        );

        Ok(summary)
    }
}
