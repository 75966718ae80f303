use async_trait::async_trait;
use solana_sdk::signature::{Keypair, Signer};

use crate::config::Config;
use crate::error::{AppError, AppResult};

/// Resolves the paymaster's fee-payer address. Fails with a configuration
/// error when no identity is available; callers decide whether that is fatal
/// (reclaim) or downgraded to a remediation hint (discovery).
#[async_trait]
pub trait SponsorResolver: Send + Sync {
    async fn resolve_sponsor(&self) -> AppResult<String>;
}

/// Env-backed resolver: an explicit SPONSOR_ADDRESS wins, otherwise the
/// address is derived from the SPONSOR_KEYPAIR signing credential.
pub struct EnvSponsorResolver {
    address: Option<String>,
}

impl EnvSponsorResolver {
    pub fn from_config(config: &Config) -> Self {
        let derived = config
            .sponsor_keypair
            .as_deref()
            .and_then(parse_keypair)
            .map(|kp| kp.pubkey().to_string());

        Self {
            address: config.sponsor_address.clone().or(derived),
        }
    }
}

#[async_trait]
impl SponsorResolver for EnvSponsorResolver {
    async fn resolve_sponsor(&self) -> AppResult<String> {
        self.address.clone().ok_or_else(|| {
            AppError::Config(
                "sponsor identity unconfigured: set SPONSOR_ADDRESS or SPONSOR_KEYPAIR".to_string(),
            )
        })
    }
}

/// Base58 keypair from env material. Invalid material is treated as unset.
pub fn parse_keypair(base58: &str) -> Option<Keypair> {
    let bytes = solana_sdk::bs58::decode(base58).into_vec().ok()?;
    Keypair::from_bytes(&bytes).ok()
}
