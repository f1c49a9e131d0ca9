//! Process configuration, read once from the environment at startup.
//!
//! Business settings (DP percentages, grace hours, rates) are not here: they
//! live in the rule store and can change at runtime.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use tracing::warn;

use umrahops_core::BranchId;
use umrahops_observability::LogFormat;

const DEV_JWT_SECRET: &str = "dev-secret";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub jwt_secret: String,
    pub use_persistent_stores: bool,
    pub database_url: Option<String>,
    pub uploads_root: PathBuf,
    /// `None` disables the background sweep; reads still auto-block.
    pub block_sweep_interval: Option<Duration>,
    /// Branch used for head-office staff who name none.
    pub default_branch_id: Option<BranchId>,
    pub log_format: LogFormat,
}

impl AppConfig {
    /// Local defaults: in-memory stores, uploads under `./uploads`, sweep every minute.
    pub fn local(jwt_secret: impl Into<String>) -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            jwt_secret: jwt_secret.into(),
            use_persistent_stores: false,
            database_url: None,
            uploads_root: PathBuf::from("./uploads"),
            block_sweep_interval: Some(Duration::from_secs(60)),
            default_branch_id: None,
            log_format: LogFormat::default(),
        }
    }

    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let jwt_secret = var("JWT_SECRET").unwrap_or_else(|| {
            warn!("JWT_SECRET not set; using insecure dev default");
            DEV_JWT_SECRET.to_string()
        });
        let mut cfg = Self::local(jwt_secret);

        if let Some(addr) = var("BIND_ADDR") {
            cfg.bind_addr = addr;
        }
        if let Some(flag) = var("USE_PERSISTENT_STORES") {
            cfg.use_persistent_stores = flag
                .trim()
                .parse::<bool>()
                .with_context(|| format!("USE_PERSISTENT_STORES must be true or false, got {flag:?}"))?;
        }
        cfg.database_url = var("DATABASE_URL");
        if let Some(root) = var("UPLOADS_ROOT") {
            cfg.uploads_root = PathBuf::from(root);
        }
        if let Some(secs) = var("BLOCK_SWEEP_INTERVAL_SECS") {
            let secs: u64 = secs
                .trim()
                .parse()
                .with_context(|| format!("BLOCK_SWEEP_INTERVAL_SECS must be a number, got {secs:?}"))?;
            cfg.block_sweep_interval = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Some(branch) = var("DEFAULT_BRANCH_ID") {
            let branch = branch
                .parse::<BranchId>()
                .map_err(|e| anyhow::anyhow!("DEFAULT_BRANCH_ID: {e}"))?;
            cfg.default_branch_id = Some(branch);
        }
        if let Some(format) = var("LOG_FORMAT") {
            cfg.log_format = format.parse()?;
        }

        if cfg.use_persistent_stores && cfg.database_url.is_none() {
            anyhow::bail!("USE_PERSISTENT_STORES=true requires DATABASE_URL");
        }
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_gives_local_defaults() {
        let cfg = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg.jwt_secret, DEV_JWT_SECRET);
        assert_eq!(cfg.bind_addr, "0.0.0.0:8080");
        assert!(!cfg.use_persistent_stores);
        assert_eq!(cfg.block_sweep_interval, Some(Duration::from_secs(60)));
        assert_eq!(cfg.log_format, LogFormat::Json);
    }

    #[test]
    fn zero_interval_disables_the_sweeper() {
        let cfg = AppConfig::from_lookup(lookup(&[("BLOCK_SWEEP_INTERVAL_SECS", "0")])).unwrap();
        assert_eq!(cfg.block_sweep_interval, None);
    }

    #[test]
    fn persistent_stores_need_a_database_url() {
        let err = AppConfig::from_lookup(lookup(&[("USE_PERSISTENT_STORES", "true")])).unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"));

        let cfg = AppConfig::from_lookup(lookup(&[
            ("USE_PERSISTENT_STORES", "true"),
            ("DATABASE_URL", "postgres://localhost/umrahops"),
        ]))
        .unwrap();
        assert!(cfg.use_persistent_stores);
    }

    #[test]
    fn bad_values_are_reported() {
        assert!(AppConfig::from_lookup(lookup(&[("DEFAULT_BRANCH_ID", "nope")])).is_err());
        assert!(AppConfig::from_lookup(lookup(&[("LOG_FORMAT", "xml")])).is_err());
        assert!(AppConfig::from_lookup(lookup(&[("BLOCK_SWEEP_INTERVAL_SECS", "soon")])).is_err());
    }
}
