use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, Type};

/// Lifecycle status of a tracked account. Transitions are driven only by the
/// reconciliation engine, the reclaim executor, and explicit list mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Inactive,
    Closed,
    Reclaimed,
    Whitelisted,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Active => "active",
            AccountStatus::Inactive => "inactive",
            AccountStatus::Closed => "closed",
            AccountStatus::Reclaimed => "reclaimed",
            AccountStatus::Whitelisted => "whitelisted",
        }
    }

    /// Statuses the reconciliation engine polls. Closed/Reclaimed/Whitelisted
    /// are excluded to bound polling cost.
    pub fn polled() -> &'static [AccountStatus] {
        &[AccountStatus::Active, AccountStatus::Inactive]
    }

    /// Reclaimed is hard-terminal; Whitelisted is soft-terminal, reversible
    /// only through explicit allow-list removal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, AccountStatus::Reclaimed | AccountStatus::Whitelisted)
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What kind of on-ledger account holds the deposit, classified from the
/// owning program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AccountKind {
    TokenAccount,
    AssociatedToken,
    ProgramData,
    SystemAccount,
    Unknown,
}

pub const SYSTEM_PROGRAM_ID: &str = "11111111111111111111111111111111";
pub const TOKEN_PROGRAM_ID: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";
pub const TOKEN_2022_PROGRAM_ID: &str = "TokenzQdBNbLqP5VEhdkAS6EPFLC1PHnBqCXEpPxuEb";
pub const UPGRADEABLE_LOADER_ID: &str = "BPFLoaderUpgradeab1e11111111111111111111111";

impl AccountKind {
    /// Classify from the owning program. `ata_hint` marks candidates that
    /// came out of an associated-token-account create instruction.
    pub fn classify(owner: Option<&str>, ata_hint: bool) -> Self {
        match owner {
            Some(TOKEN_PROGRAM_ID) | Some(TOKEN_2022_PROGRAM_ID) => {
                if ata_hint {
                    AccountKind::AssociatedToken
                } else {
                    AccountKind::TokenAccount
                }
            }
            Some(SYSTEM_PROGRAM_ID) => AccountKind::SystemAccount,
            Some(UPGRADEABLE_LOADER_ID) => AccountKind::ProgramData,
            _ => AccountKind::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AccountKind::TokenAccount => "token_account",
            AccountKind::AssociatedToken => "associated_token",
            AccountKind::ProgramData => "program_data",
            AccountKind::SystemAccount => "system_account",
            AccountKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for AccountKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One tracked sponsored account. `address` is globally unique; `closed_at`
/// is set iff status is Closed or Reclaimed; Reclaimed implies a zero
/// deposit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct TrackedAccount {
    pub id: i64,
    pub address: String,
    pub created_at: DateTime<Utc>,
    pub sponsor_tx_ref: Option<String>,
    pub kind: AccountKind,
    pub deposit_lamports: i64,
    pub status: AccountStatus,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub owner_program: Option<String>,
    pub data_size: Option<i64>,
    pub notes: Option<String>,
}

/// Insert payload for a newly discovered account.
#[derive(Debug, Clone)]
pub struct NewTrackedAccount {
    pub address: String,
    pub created_at: DateTime<Utc>,
    pub sponsor_tx_ref: Option<String>,
    pub kind: AccountKind,
    pub deposit_lamports: i64,
    pub status: AccountStatus,
    pub closed_at: Option<DateTime<Utc>>,
    pub owner_program: Option<String>,
    pub data_size: Option<i64>,
}

/// One reclaim attempt. Append-only: a row is written per attempt and never
/// updated or deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ReclaimAttempt {
    pub id: i64,
    pub account_address: String,
    pub tx_ref: Option<String>,
    pub amount_reclaimed: i64,
    pub executed_at: DateTime<Utc>,
    pub success: bool,
    pub error_message: Option<String>,
    pub destination_address: String,
}

/// Allow-list / deny-list row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ListEntry {
    pub address: String,
    pub reason: Option<String>,
    pub added_at: DateTime<Utc>,
}

/// Aggregate view for dashboards and operators.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct StatusBucket {
    pub status: AccountStatus,
    pub count: i64,
    pub deposit_lamports: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub buckets: Vec<StatusBucket>,
    pub total_accounts: i64,
    pub total_deposit_lamports: i64,
    pub reclaim_attempts: i64,
    pub reclaimed_lamports: i64,
}
