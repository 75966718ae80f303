use thiserror::Error;

/// Top-level error type for the entire application
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Reclaim error: {0}")]
    Reclaim(#[from] ReclaimError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Transient ledger-transport errors. Recorded, never abort a containing
/// batch; naturally retried on the next scheduled cycle.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("RPC transport failure: {0}")]
    Transport(String),

    #[error("Rate limited by RPC endpoint: {0}")]
    RateLimited(String),

    #[error("RPC call timed out: {0}")]
    Timeout(String),

    #[error("Malformed ledger response: {0}")]
    Malformed(String),
}

/// Reclaim execution errors. `UnsupportedOwner` is permanent and requires
/// operator action; `Submission` leaves the account eligible for the next
/// cycle. Ineligibility is a normal negative decision, not an error.
#[derive(Error, Debug)]
pub enum ReclaimError {
    #[error("Nothing to reclaim for {address}: on-chain balance is zero")]
    NothingToReclaim { address: String },

    #[error("Unsupported account owner {owner} for {address}: manual intervention required")]
    UnsupportedOwner { address: String, owner: String },

    #[error("Submission failed: {0}")]
    Submission(String),
}

impl AppError {
    /// Whether a retry on a later cycle can reasonably succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AppError::Ledger(_) | AppError::Reclaim(ReclaimError::Submission(_))
        )
    }
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        AppError::Internal(format!("Error converting: {:?}", error))
    }
}

/// Result type alias for the application
pub type AppResult<T> = Result<T, AppError>;
