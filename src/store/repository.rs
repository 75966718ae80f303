use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use super::models::*;
use crate::error::{AppError, AppResult};

/// State store repository - THE source of truth for tracked accounts, the
/// append-only reclaim log and the allow/deny lists. All access goes through
/// parameterized queries against the typed schema.
pub struct AccountStore {
    pub pool: SqlitePool,
}

impl AccountStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // ========== ACCOUNT OPERATIONS ==========

    pub async fn insert_account(&self, new: &NewTrackedAccount) -> AppResult<TrackedAccount> {
        let account = sqlx::query_as::<_, TrackedAccount>(
            r#"
            INSERT INTO accounts
                (address, created_at, sponsor_tx_ref, kind, deposit_lamports,
                 status, last_checked_at, closed_at, owner_program, data_size)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            RETURNING *
            "#,
        )
        .bind(&new.address)
        .bind(new.created_at)
        .bind(&new.sponsor_tx_ref)
        .bind(new.kind)
        .bind(new.deposit_lamports)
        .bind(new.status)
        .bind(Utc::now())
        .bind(new.closed_at)
        .bind(&new.owner_program)
        .bind(new.data_size)
        .fetch_one(&self.pool)
        .await?;

        Ok(account)
    }

    pub async fn get_by_address(&self, address: &str) -> AppResult<Option<TrackedAccount>> {
        let account = sqlx::query_as::<_, TrackedAccount>(
            "SELECT * FROM accounts WHERE address = ?1",
        )
        .bind(address)
        .fetch_optional(&self.pool)
        .await?;

        Ok(account)
    }

    pub async fn require_by_address(&self, address: &str) -> AppResult<TrackedAccount> {
        self.get_by_address(address)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("account {address} is not tracked")))
    }

    pub async fn list_all(&self) -> AppResult<Vec<TrackedAccount>> {
        let accounts =
            sqlx::query_as::<_, TrackedAccount>("SELECT * FROM accounts ORDER BY id")
                .fetch_all(&self.pool)
                .await?;

        Ok(accounts)
    }

    pub async fn list_by_statuses(
        &self,
        statuses: &[AccountStatus],
    ) -> AppResult<Vec<TrackedAccount>> {
        let mut accounts = Vec::new();
        for status in statuses {
            let mut rows = sqlx::query_as::<_, TrackedAccount>(
                "SELECT * FROM accounts WHERE status = ?1 ORDER BY id",
            )
            .bind(status)
            .fetch_all(&self.pool)
            .await?;
            accounts.append(&mut rows);
        }

        Ok(accounts)
    }

    /// Accounts the reconciliation engine polls (Active or Inactive).
    pub async fn list_polled(&self) -> AppResult<Vec<TrackedAccount>> {
        self.list_by_statuses(AccountStatus::polled()).await
    }

    // ========== STATUS TRANSITIONS ==========

    /// Account no longer exists on-chain: Closed, closed_at set, balance
    /// zeroed.
    pub async fn mark_closed(&self, address: &str, when: DateTime<Utc>) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE accounts
            SET status = ?1, closed_at = ?2, deposit_lamports = 0, last_checked_at = ?2
            WHERE address = ?3
            "#,
        )
        .bind(AccountStatus::Closed)
        .bind(when)
        .bind(address)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Closed account reappeared on-chain: back to Active, closed_at cleared.
    pub async fn mark_reopened(
        &self,
        address: &str,
        lamports: i64,
        when: DateTime<Utc>,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE accounts
            SET status = ?1, closed_at = NULL, deposit_lamports = ?2, last_checked_at = ?3
            WHERE address = ?4
            "#,
        )
        .bind(AccountStatus::Active)
        .bind(lamports)
        .bind(when)
        .bind(address)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn mark_inactive(
        &self,
        address: &str,
        lamports: i64,
        when: DateTime<Utc>,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE accounts
            SET status = ?1, deposit_lamports = ?2, last_checked_at = ?3
            WHERE address = ?4
            "#,
        )
        .bind(AccountStatus::Inactive)
        .bind(lamports)
        .bind(when)
        .bind(address)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Balance drifted without a status change.
    pub async fn record_balance(
        &self,
        address: &str,
        lamports: i64,
        when: DateTime<Utc>,
    ) -> AppResult<()> {
        sqlx::query(
            "UPDATE accounts SET deposit_lamports = ?1, last_checked_at = ?2 WHERE address = ?3",
        )
        .bind(lamports)
        .bind(when)
        .bind(address)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn touch(&self, address: &str, when: DateTime<Utc>) -> AppResult<()> {
        sqlx::query("UPDATE accounts SET last_checked_at = ?1 WHERE address = ?2")
            .bind(when)
            .bind(address)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Terminal transition after an observed successful submission. The
    /// closed_at timestamp is retained (closed_at is set iff Closed or
    /// Reclaimed).
    pub async fn mark_reclaimed(&self, address: &str) -> AppResult<()> {
        sqlx::query(
            "UPDATE accounts SET status = ?1, deposit_lamports = 0, last_checked_at = ?2 WHERE address = ?3",
        )
        .bind(AccountStatus::Reclaimed)
        .bind(Utc::now())
        .bind(address)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn set_status(
        &self,
        address: &str,
        status: AccountStatus,
        closed_at: Option<DateTime<Utc>>,
    ) -> AppResult<()> {
        sqlx::query("UPDATE accounts SET status = ?1, closed_at = ?2 WHERE address = ?3")
            .bind(status)
            .bind(closed_at)
            .bind(address)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    // ========== RECLAIM LOG (append-only) ==========

    pub async fn record_reclaim_attempt(
        &self,
        account_address: &str,
        tx_ref: Option<&str>,
        amount_reclaimed: i64,
        success: bool,
        error_message: Option<&str>,
        destination_address: &str,
    ) -> AppResult<ReclaimAttempt> {
        let attempt = sqlx::query_as::<_, ReclaimAttempt>(
            r#"
            INSERT INTO reclaim_log
                (account_address, tx_ref, amount_reclaimed, executed_at,
                 success, error_message, destination_address)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            RETURNING *
            "#,
        )
        .bind(account_address)
        .bind(tx_ref)
        .bind(amount_reclaimed)
        .bind(Utc::now())
        .bind(success)
        .bind(error_message)
        .bind(destination_address)
        .fetch_one(&self.pool)
        .await?;

        Ok(attempt)
    }

    pub async fn reclaim_history(
        &self,
        account_address: Option<&str>,
    ) -> AppResult<Vec<ReclaimAttempt>> {
        let attempts = match account_address {
            Some(address) => {
                sqlx::query_as::<_, ReclaimAttempt>(
                    "SELECT * FROM reclaim_log WHERE account_address = ?1 ORDER BY id",
                )
                .bind(address)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, ReclaimAttempt>("SELECT * FROM reclaim_log ORDER BY id")
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        Ok(attempts)
    }

    pub async fn has_successful_reclaim(&self, account_address: &str) -> AppResult<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM reclaim_log WHERE account_address = ?1 AND success = 1",
        )
        .bind(account_address)
        .fetch_one(&self.pool)
        .await?;

        Ok(count > 0)
    }

    // ========== ALLOW / DENY LISTS ==========

    pub async fn allow_list_insert(&self, address: &str, reason: Option<&str>) -> AppResult<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO allow_list (address, reason, added_at) VALUES (?1, ?2, ?3)",
        )
        .bind(address)
        .bind(reason)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn allow_list_delete(&self, address: &str) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM allow_list WHERE address = ?1")
            .bind(address)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn is_allow_listed(&self, address: &str) -> AppResult<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM allow_list WHERE address = ?1")
            .bind(address)
            .fetch_one(&self.pool)
            .await?;

        Ok(count > 0)
    }

    pub async fn deny_list_insert(&self, address: &str, reason: Option<&str>) -> AppResult<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO deny_list (address, reason, added_at) VALUES (?1, ?2, ?3)",
        )
        .bind(address)
        .bind(reason)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn deny_list_delete(&self, address: &str) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM deny_list WHERE address = ?1")
            .bind(address)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn is_deny_listed(&self, address: &str) -> AppResult<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM deny_list WHERE address = ?1")
            .bind(address)
            .fetch_one(&self.pool)
            .await?;

        Ok(count > 0)
    }

    pub async fn allow_list_entries(&self) -> AppResult<Vec<ListEntry>> {
        let entries =
            sqlx::query_as::<_, ListEntry>("SELECT * FROM allow_list ORDER BY added_at")
                .fetch_all(&self.pool)
                .await?;

        Ok(entries)
    }

    pub async fn deny_list_entries(&self) -> AppResult<Vec<ListEntry>> {
        let entries = sqlx::query_as::<_, ListEntry>("SELECT * FROM deny_list ORDER BY added_at")
            .fetch_all(&self.pool)
            .await?;

        Ok(entries)
    }

    // ========== AGGREGATES ==========

    pub async fn stats(&self) -> AppResult<StoreStats> {
        let buckets = sqlx::query_as::<_, StatusBucket>(
            r#"
            SELECT status,
                   COUNT(*) AS count,
                   COALESCE(SUM(deposit_lamports), 0) AS deposit_lamports
            FROM accounts
            GROUP BY status
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let reclaim_attempts: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM reclaim_log")
            .fetch_one(&self.pool)
            .await?;

        let reclaimed_lamports: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(amount_reclaimed), 0) FROM reclaim_log WHERE success = 1",
        )
        .fetch_one(&self.pool)
        .await?;

        let total_accounts = buckets.iter().map(|b| b.count).sum();
        let total_deposit_lamports = buckets.iter().map(|b| b.deposit_lamports).sum();

        Ok(StoreStats {
            buckets,
            total_accounts,
            total_deposit_lamports,
            reclaim_attempts,
            reclaimed_lamports,
        })
    }
}
