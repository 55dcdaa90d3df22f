//! Configuration types

use crate::{ConfigError, RetryPolicy};
use secrecy::SecretString;
use std::path::PathBuf;
use std::time::Duration;

/// Public IPFS gateway used for reads when no override is configured.
pub const DEFAULT_GATEWAY_BASE_URL: &str = "https://ipfs.io/ipfs";

/// Upload API used for archive writes when no override is configured.
pub const DEFAULT_ARCHIVE_API_URL: &str = "https://api.nft.storage";

/// Default map size for the embedded LMDB fast store.
pub const DEFAULT_LMDB_MAX_SIZE_MB: usize = 256;

/// Which fast store to connect to.
#[derive(Debug)]
pub enum FastStoreConfig {
    /// Networked Redis instance.
    Redis {
        url: String,
        username: Option<String>,
        password: Option<SecretString>,
    },
    /// Embedded LMDB environment at `path`.
    Lmdb { path: PathBuf, max_size_mb: usize },
    /// Process-local map; contents are lost on exit.
    InMemory,
}

impl FastStoreConfig {
    pub fn redis(url: impl Into<String>) -> Self {
        FastStoreConfig::Redis {
            url: url.into(),
            username: None,
            password: None,
        }
    }

    pub fn lmdb(path: impl Into<PathBuf>) -> Self {
        FastStoreConfig::Lmdb {
            path: path.into(),
            max_size_mb: DEFAULT_LMDB_MAX_SIZE_MB,
        }
    }
}

/// Archive (content-addressed blob store) settings.
#[derive(Debug)]
pub struct ArchiveConfig {
    /// Base URL of the upload API.
    pub api_base_url: String,
    /// Bearer token for the upload API.
    pub api_token: SecretString,
    /// Base URL of the read gateway; addresses are appended as a path segment.
    pub gateway_base_url: String,
    /// HTTP timeout for a single request.
    pub request_timeout: Duration,
}

impl ArchiveConfig {
    /// Create an archive config with default endpoints.
    pub fn new(api_token: impl Into<String>) -> Self {
        Self {
            api_base_url: DEFAULT_ARCHIVE_API_URL.to_string(),
            api_token: SecretString::new(api_token.into().into_boxed_str()),
            gateway_base_url: DEFAULT_GATEWAY_BASE_URL.to_string(),
            request_timeout: crate::retry::DEFAULT_MAX_BACKOFF,
        }
    }

    /// Override the upload API base URL.
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    /// Override the read gateway base URL.
    pub fn with_gateway_base_url(mut self, url: impl Into<String>) -> Self {
        self.gateway_base_url = url.into();
        self
    }

    /// Set the HTTP timeout for a single request.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Master configuration struct.
#[derive(Debug)]
pub struct RipConfig {
    pub fast_store: FastStoreConfig,
    pub archive: ArchiveConfig,
    /// Retry policy for archive reads.
    pub fetch_retry: RetryPolicy,
    /// Retry policy for the background archive upload.
    pub backup_retry: RetryPolicy,
}

impl RipConfig {
    pub fn new(fast_store: FastStoreConfig, archive: ArchiveConfig) -> Self {
        Self {
            fast_store,
            archive,
            fetch_retry: RetryPolicy::default(),
            backup_retry: RetryPolicy::single_attempt(),
        }
    }

    /// Set the archive read retry policy.
    pub fn with_fetch_retry(mut self, policy: RetryPolicy) -> Self {
        self.fetch_retry = policy;
        self
    }

    /// Set the background upload retry policy.
    pub fn with_backup_retry(mut self, policy: RetryPolicy) -> Self {
        self.backup_retry = policy;
        self
    }

    /// Create RipConfig from environment variables.
    ///
    /// # Environment Variables
    /// - `RIPDB_REDIS_URL`: Redis URL; selects the Redis fast store
    /// - `RIPDB_REDIS_USERNAME`, `RIPDB_REDIS_PASSWORD`: optional Redis credentials
    /// - `RIPDB_LMDB_PATH`: LMDB directory; used when no Redis URL is set
    /// - `RIPDB_LMDB_MAX_SIZE_MB`: LMDB map size (default: 256)
    /// - `RIPDB_ARCHIVE_API_KEY`: archive upload token (required)
    /// - `RIPDB_ARCHIVE_API_URL`: upload API base (default: https://api.nft.storage)
    /// - `RIPDB_GATEWAY_BASE_URL`: read gateway base (default: https://ipfs.io/ipfs)
    /// - `RIPDB_ARCHIVE_TIMEOUT_SECS`: per-request timeout (default: 300)
    /// - `RIPDB_FETCH_RETRIES`: attempts per archive read (default: 5)
    /// - `RIPDB_BACKUP_ATTEMPTS`: attempts per background upload (default: 1)
    ///
    /// With neither `RIPDB_REDIS_URL` nor `RIPDB_LMDB_PATH` set, the in-memory
    /// fast store is used.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`RipConfig::from_env`], reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let fast_store = if let Some(url) = var("RIPDB_REDIS_URL") {
            FastStoreConfig::Redis {
                url,
                username: var("RIPDB_REDIS_USERNAME"),
                password: var("RIPDB_REDIS_PASSWORD")
                    .map(|p| SecretString::new(p.into_boxed_str())),
            }
        } else if let Some(path) = var("RIPDB_LMDB_PATH") {
            FastStoreConfig::Lmdb {
                path: PathBuf::from(path),
                max_size_mb: parse_var(&var, "RIPDB_LMDB_MAX_SIZE_MB")?
                    .unwrap_or(DEFAULT_LMDB_MAX_SIZE_MB),
            }
        } else {
            FastStoreConfig::InMemory
        };

        let api_key = var("RIPDB_ARCHIVE_API_KEY").ok_or_else(|| ConfigError::MissingRequired {
            field: "RIPDB_ARCHIVE_API_KEY".to_string(),
        })?;

        let mut archive = ArchiveConfig::new(api_key);
        if let Some(url) = var("RIPDB_ARCHIVE_API_URL") {
            archive = archive.with_api_base_url(url);
        }
        if let Some(url) = var("RIPDB_GATEWAY_BASE_URL") {
            archive = archive.with_gateway_base_url(url);
        }
        if let Some(secs) = parse_var::<u64, _>(&var, "RIPDB_ARCHIVE_TIMEOUT_SECS")? {
            archive = archive.with_request_timeout(Duration::from_secs(secs));
        }

        let mut config = RipConfig::new(fast_store, archive);
        if let Some(attempts) = parse_var(&var, "RIPDB_FETCH_RETRIES")? {
            config.fetch_retry = config.fetch_retry.with_max_attempts(attempts);
        }
        if let Some(attempts) = parse_var(&var, "RIPDB_BACKUP_ATTEMPTS")? {
            config.backup_retry = config.backup_retry.with_max_attempts(attempts);
        }

        config.validate()?;
        Ok(config)
    }

    /// Check that the configuration is internally consistent.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_http_url("archive.api_base_url", &self.archive.api_base_url)?;
        check_http_url("archive.gateway_base_url", &self.archive.gateway_base_url)?;

        if self.archive.request_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "archive.request_timeout".to_string(),
                value: "0".to_string(),
                reason: "timeout must be positive".to_string(),
            });
        }

        match &self.fast_store {
            FastStoreConfig::Redis { url, .. } => {
                if !(url.starts_with("redis://") || url.starts_with("rediss://")) {
                    return Err(ConfigError::InvalidValue {
                        field: "fast_store.url".to_string(),
                        value: url.clone(),
                        reason: "expected a redis:// or rediss:// URL".to_string(),
                    });
                }
            }
            FastStoreConfig::Lmdb { max_size_mb, .. } if *max_size_mb == 0 => {
                return Err(ConfigError::InvalidValue {
                    field: "fast_store.max_size_mb".to_string(),
                    value: "0".to_string(),
                    reason: "map size must be positive".to_string(),
                });
            }
            _ => {}
        }

        Ok(())
    }
}

fn parse_var<T, F>(var: &F, name: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match var(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                field: name.to_string(),
                value: raw.clone(),
                reason: "not a valid number".to_string(),
            }),
    }
}

fn check_http_url(field: &str, url: &str) -> Result<(), ConfigError> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(ConfigError::InvalidValue {
            field: field.to_string(),
            value: url.to_string(),
            reason: "expected an http:// or https:// URL".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn test_minimal_env_uses_defaults() {
        let config = RipConfig::from_lookup(lookup(&[("RIPDB_ARCHIVE_API_KEY", "secret")])).unwrap();
        assert!(matches!(config.fast_store, FastStoreConfig::InMemory));
        assert_eq!(config.archive.gateway_base_url, DEFAULT_GATEWAY_BASE_URL);
        assert_eq!(config.archive.api_base_url, DEFAULT_ARCHIVE_API_URL);
        assert_eq!(config.archive.api_token.expose_secret(), "secret");
        assert_eq!(config.fetch_retry.attempts(), 5);
        assert_eq!(config.backup_retry.attempts(), 1);
    }

    #[test]
    fn test_missing_api_key_is_rejected() {
        let err = RipConfig::from_lookup(lookup(&[])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::MissingRequired {
                field: "RIPDB_ARCHIVE_API_KEY".to_string()
            }
        );
    }

    #[test]
    fn test_redis_with_credentials() {
        let config = RipConfig::from_lookup(lookup(&[
            ("RIPDB_ARCHIVE_API_KEY", "k"),
            ("RIPDB_REDIS_URL", "redis://cache:6379"),
            ("RIPDB_REDIS_USERNAME", "app"),
            ("RIPDB_REDIS_PASSWORD", "hunter2"),
            ("RIPDB_LMDB_PATH", "/ignored"),
        ]))
        .unwrap();

        match config.fast_store {
            FastStoreConfig::Redis {
                url,
                username,
                password,
            } => {
                assert_eq!(url, "redis://cache:6379");
                assert_eq!(username.as_deref(), Some("app"));
                assert_eq!(password.unwrap().expose_secret(), "hunter2");
            }
            other => panic!("expected redis config, got {other:?}"),
        }
    }

    #[test]
    fn test_lmdb_and_overrides() {
        let config = RipConfig::from_lookup(lookup(&[
            ("RIPDB_ARCHIVE_API_KEY", "k"),
            ("RIPDB_LMDB_PATH", "/var/lib/ripdb"),
            ("RIPDB_LMDB_MAX_SIZE_MB", "64"),
            ("RIPDB_GATEWAY_BASE_URL", "https://gateway.example/ipfs"),
            ("RIPDB_ARCHIVE_TIMEOUT_SECS", "30"),
            ("RIPDB_FETCH_RETRIES", "7"),
            ("RIPDB_BACKUP_ATTEMPTS", "3"),
        ]))
        .unwrap();

        match &config.fast_store {
            FastStoreConfig::Lmdb { path, max_size_mb } => {
                assert_eq!(path, &PathBuf::from("/var/lib/ripdb"));
                assert_eq!(*max_size_mb, 64);
            }
            other => panic!("expected lmdb config, got {other:?}"),
        }
        assert_eq!(config.archive.gateway_base_url, "https://gateway.example/ipfs");
        assert_eq!(config.archive.request_timeout, Duration::from_secs(30));
        assert_eq!(config.fetch_retry.attempts(), 7);
        assert_eq!(config.backup_retry.attempts(), 3);
    }

    #[test]
    fn test_invalid_numbers_are_rejected() {
        let err = RipConfig::from_lookup(lookup(&[
            ("RIPDB_ARCHIVE_API_KEY", "k"),
            ("RIPDB_FETCH_RETRIES", "lots"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { field, .. } if field == "RIPDB_FETCH_RETRIES"));
    }

    #[test]
    fn test_validate_rejects_bad_urls() {
        let config = RipConfig::new(
            FastStoreConfig::redis("localhost:6379"),
            ArchiveConfig::new("k"),
        );
        assert!(config.validate().is_err());

        let config = RipConfig::new(
            FastStoreConfig::InMemory,
            ArchiveConfig::new("k").with_gateway_base_url("ipfs.io/ipfs"),
        );
        assert!(config.validate().is_err());

        let config = RipConfig::new(FastStoreConfig::lmdb("/tmp/x"), ArchiveConfig::new("k"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_debug_redacts_token() {
        let config = ArchiveConfig::new("super-secret-token");
        let debug = format!("{:?}", config);
        assert!(!debug.contains("super-secret-token"));
    }
}
