use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::eligibility::EligibilityPolicy;
use crate::error::AppResult;
use crate::store::{AccountKind, AccountStatus, AccountStore};

#[derive(Debug, Clone, Serialize)]
pub struct EligibleAccount {
    pub address: String,
    pub kind: AccountKind,
    pub deposit_lamports: i64,
    pub closed_at: Option<DateTime<Utc>>,
}

/// Point-in-time view of what could be reclaimed right now. Consumed by the
/// CLI/dashboard collaborators; generating it mutates nothing beyond the
/// policy's stale-status corrections.
#[derive(Debug, Serialize)]
pub struct ReclaimReport {
    pub generated_at: DateTime<Utc>,
    pub evaluated: usize,
    pub eligible: Vec<EligibleAccount>,
    pub total_reclaimable_lamports: i64,
}

pub struct ReportGenerator {
    store: Arc<AccountStore>,
    policy: Arc<EligibilityPolicy>,
}

impl ReportGenerator {
    pub fn new(store: Arc<AccountStore>, policy: Arc<EligibilityPolicy>) -> Self {
        Self { store, policy }
    }

    pub async fn generate(&self) -> AppResult<ReclaimReport> {
        let candidates = self
            .store
            .list_by_statuses(&[AccountStatus::Closed])
            .await?;

        let mut eligible = Vec::new();
        for candidate in &candidates {
            let report = self.policy.check(&candidate.address).await?;
            if report.eligible {
                eligible.push(EligibleAccount {
                    address: candidate.address.clone(),
                    kind: candidate.kind,
                    deposit_lamports: candidate.deposit_lamports,
                    closed_at: candidate.closed_at,
                });
            }
        }

        let total_reclaimable_lamports = eligible.iter().map(|e| e.deposit_lamports).sum();

        Ok(ReclaimReport {
            generated_at: Utc::now(),
            evaluated: candidates.len(),
            eligible,
            total_reclaimable_lamports,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use crate::eligibility::PolicyConfig;
    use crate::testutil::{memory_store, tracked, MockLedger};

    #[tokio::test]
    async fn report_lists_only_eligible_closed_accounts() {
        let store = Arc::new(memory_store().await);

        let mut ripe = tracked("ripe", AccountStatus::Closed, 2_039_280);
        ripe.closed_at = Some(Utc::now() - Duration::days(10));
        store.insert_account(&ripe).await.unwrap();

        let mut young = tracked("young", AccountStatus::Closed, 2_039_280);
        young.closed_at = Some(Utc::now() - Duration::days(1));
        store.insert_account(&young).await.unwrap();

        store
            .insert_account(&tracked("live", AccountStatus::Active, 2_039_280))
            .await
            .unwrap();

        let policy = Arc::new(EligibilityPolicy::new(
            store.clone(),
            Arc::new(MockLedger::new()),
            PolicyConfig {
                dormancy_window: Duration::days(7),
                min_threshold: 100_000,
            },
        ));

        let report = ReportGenerator::new(store, policy).generate().await.unwrap();
        assert_eq!(report.evaluated, 2);
        assert_eq!(report.eligible.len(), 1);
        assert_eq!(report.eligible[0].address, "ripe");
        assert_eq!(report.total_reclaimable_lamports, 2_039_280);
    }
}
