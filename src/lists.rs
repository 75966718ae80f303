use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::error::AppResult;
use crate::gateway::LedgerGateway;
use crate::store::{AccountStatus, AccountStore, ListEntry};

/// Allow/deny list mutators. Allow-listing forces status = Whitelisted and
/// blocks reclaim for as long as the entry exists; deny-listing blocks
/// reclaim without touching status.
pub struct ListService {
    store: Arc<AccountStore>,
    gateway: Arc<dyn LedgerGateway>,
}

impl ListService {
    pub fn new(store: Arc<AccountStore>, gateway: Arc<dyn LedgerGateway>) -> Self {
        Self { store, gateway }
    }

    pub async fn allow(&self, address: &str, reason: Option<&str>) -> AppResult<()> {
        self.store.allow_list_insert(address, reason).await?;

        if let Some(account) = self.store.get_by_address(address).await? {
            // Reclaimed is hard-terminal; the list entry alone records intent.
            if account.status != AccountStatus::Reclaimed {
                self.store
                    .set_status(address, AccountStatus::Whitelisted, None)
                    .await?;
            }
        }

        info!("🛡️ Allow-listed {address}");
        Ok(())
    }

    /// Remove an allow-list entry and restore the account's status from a
    /// fresh ledger read. A re-closed account restarts its dormancy window.
    pub async fn unallow(&self, address: &str) -> AppResult<bool> {
        let removed = self.store.allow_list_delete(address).await?;
        if !removed {
            return Ok(false);
        }

        if let Some(account) = self.store.get_by_address(address).await? {
            if account.status == AccountStatus::Whitelisted {
                let snapshot = self.gateway.get_account(address).await?;
                if snapshot.exists {
                    self.store
                        .mark_reopened(address, snapshot.lamports as i64, Utc::now())
                        .await?;
                } else {
                    self.store.mark_closed(address, Utc::now()).await?;
                }
            }
        }

        info!("🛡️ Removed {address} from the allow-list");
        Ok(true)
    }

    pub async fn deny(&self, address: &str, reason: Option<&str>) -> AppResult<()> {
        self.store.deny_list_insert(address, reason).await?;
        info!("⛔ Deny-listed {address}");
        Ok(())
    }

    pub async fn undeny(&self, address: &str) -> AppResult<bool> {
        self.store.deny_list_delete(address).await
    }

    pub async fn allow_entries(&self) -> AppResult<Vec<ListEntry>> {
        self.store.allow_list_entries().await
    }

    pub async fn deny_entries(&self) -> AppResult<Vec<ListEntry>> {
        self.store.deny_list_entries().await
    }
}
