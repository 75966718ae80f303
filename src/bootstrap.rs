use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::config::Config;
use crate::discovery::DiscoveryEngine;
use crate::eligibility::{EligibilityPolicy, PolicyConfig};
use crate::error::AppResult;
use crate::gateway::sponsor::parse_keypair;
use crate::gateway::{EnvSponsorResolver, SolanaConfig, SolanaGateway};
use crate::lists::ListService;
use crate::monitor::ReconcileEngine;
use crate::reclaim::ReclaimExecutor;
use crate::report::ReportGenerator;
use crate::scheduler::{ReclaimScheduler, ScheduleConfig};
use crate::store::AccountStore;

/// Fully wired application: every component shares the store and gateway
/// through Arc handles.
pub struct App {
    pub store: Arc<AccountStore>,
    pub discovery: Arc<DiscoveryEngine>,
    pub monitor: Arc<ReconcileEngine>,
    pub executor: Arc<ReclaimExecutor>,
    pub reports: Arc<ReportGenerator>,
    pub lists: Arc<ListService>,
    pub scheduler: Arc<ReclaimScheduler>,
}

pub async fn initialize_app(config: &Config) -> AppResult<App> {
    info!("Initializing application components ...");

    let pool = initialize_database(&config.database_url).await?;
    let store = Arc::new(AccountStore::new(pool));

    let signer = match config.sponsor_keypair.as_deref() {
        Some(raw) => match parse_keypair(raw) {
            Some(keypair) => {
                info!("✅ Signing credential loaded");
                Some(keypair)
            }
            None => {
                warn!("⚠️  SPONSOR_KEYPAIR is set but not a valid base58 keypair - submissions disabled");
                None
            }
        },
        None => {
            warn!("⚠️  SPONSOR_KEYPAIR not set - reclaim submissions disabled");
            None
        }
    };

    let gateway = Arc::new(SolanaGateway::new(
        SolanaConfig {
            rpc_url: config.solana_rpc_url.clone(),
            call_delay: config.call_delay,
            ..SolanaConfig::default()
        },
        signer,
    ));
    info!("✅ Ledger gateway initialized: {}", config.solana_rpc_url);

    let sponsor = Arc::new(EnvSponsorResolver::from_config(config));

    let policy = Arc::new(EligibilityPolicy::new(
        store.clone(),
        gateway.clone(),
        PolicyConfig {
            dormancy_window: config.dormancy_window,
            min_threshold: config.min_reclaim_lamports,
        },
    ));

    let discovery = Arc::new(DiscoveryEngine::new(
        store.clone(),
        gateway.clone(),
        sponsor.clone(),
        config.scan_limit,
    ));

    let monitor = Arc::new(ReconcileEngine::new(
        store.clone(),
        gateway.clone(),
        config.inactivity_threshold,
    ));

    let executor = Arc::new(ReclaimExecutor::new(
        store.clone(),
        gateway.clone(),
        policy.clone(),
        sponsor.clone(),
        config.destination_address.clone(),
        config.submit_delay,
    ));

    let reports = Arc::new(ReportGenerator::new(store.clone(), policy.clone()));
    let lists = Arc::new(ListService::new(store.clone(), gateway.clone()));

    let scheduler = Arc::new(ReclaimScheduler::new(
        ScheduleConfig {
            discovery_interval: config.discovery_interval,
            reconcile_interval: config.reconcile_interval,
            auto_reclaim: config.auto_reclaim,
            dry_run: config.dry_run,
        },
        discovery.clone(),
        monitor.clone(),
        executor.clone(),
    ));

    if config.dry_run {
        info!("🧪 Dry-run mode: reclaims are evaluated and logged, never submitted");
    }

    Ok(App {
        store,
        discovery,
        monitor,
        executor,
        reports,
        lists,
        scheduler,
    })
}

async fn initialize_database(database_url: &str) -> AppResult<SqlitePool> {
    info!("📊 Connecting to database...");

    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

    // Single writer: every mutation path is serialized through one connection.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .acquire_timeout(Duration::from_secs(30))
        .connect_with(options)
        .await?;

    info!("🔄 Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;

    info!("✓ Database initialized");
    Ok(pool)
}
