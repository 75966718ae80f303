use std::time::Duration;

/// Process configuration, read from the environment with sane defaults.
/// The sponsor identity and signing key are intentionally optional here:
/// their absence is surfaced as a ConfigurationError by the component that
/// needs them, not at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub solana_rpc_url: String,
    /// Sponsor fee-payer address; overrides the keypair-derived address.
    pub sponsor_address: Option<String>,
    /// Base58 signing key for reclaim submissions.
    pub sponsor_keypair: Option<String>,
    /// Where reclaimed deposits land. Defaults to the sponsor address.
    pub destination_address: Option<String>,
    /// How many of the sponsor's most recent transactions Discovery scans.
    pub scan_limit: usize,
    /// Minimum delay between external ledger calls.
    pub call_delay: Duration,
    /// Delay between consecutive reclaim submissions in a batch.
    pub submit_delay: Duration,
    /// Minimum elapsed time after closure before a reclaim may be attempted.
    pub dormancy_window: chrono::Duration,
    /// Deposits below this are not worth a reclaim transaction.
    pub min_reclaim_lamports: i64,
    /// Active -> Inactive when the on-chain balance drops below this fraction
    /// of the stored deposit. A heuristic, not a correctness guarantee.
    pub inactivity_threshold: f64,
    pub discovery_interval: Duration,
    pub reconcile_interval: Duration,
    /// Run the batch reclaim as the second phase of each reconciliation cycle.
    pub auto_reclaim: bool,
    /// Evaluate and record reclaims without submitting them.
    pub dry_run: bool,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://rent_reaper.db?mode=rwc".to_string()),
            solana_rpc_url: std::env::var("SOLANA_RPC_URL")
                .unwrap_or_else(|_| "https://api.mainnet-beta.solana.com".to_string()),
            sponsor_address: std::env::var("SPONSOR_ADDRESS").ok(),
            sponsor_keypair: std::env::var("SPONSOR_KEYPAIR").ok(),
            destination_address: std::env::var("RECLAIM_DESTINATION").ok(),
            scan_limit: env_parse("DISCOVERY_SCAN_LIMIT", 1000),
            call_delay: Duration::from_millis(env_parse("CALL_DELAY_MS", 200)),
            submit_delay: Duration::from_millis(env_parse("SUBMIT_DELAY_MS", 500)),
            dormancy_window: chrono::Duration::days(env_parse("DORMANCY_DAYS", 7)),
            min_reclaim_lamports: env_parse("MIN_RECLAIM_LAMPORTS", 100_000),
            inactivity_threshold: env_parse("INACTIVITY_THRESHOLD", 0.10),
            discovery_interval: Duration::from_secs(env_parse("DISCOVERY_INTERVAL_SECS", 3600)),
            reconcile_interval: Duration::from_secs(env_parse("RECONCILE_INTERVAL_SECS", 300)),
            auto_reclaim: env_parse("AUTO_RECLAIM", false),
            dry_run: env_parse("DRY_RUN", false),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}
