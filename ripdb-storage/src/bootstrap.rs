//! Building an orchestrator from [`RipConfig`].

use std::sync::Arc;

use ripdb_core::{FastStoreConfig, RipConfig, RipResult};

use crate::archive::{ArchiveGateway, HttpBlobTransport};
use crate::fast_store::{FastStore, InMemoryFastStore, LmdbFastStore, RedisFastStore};
use crate::orchestrator::TierOrchestrator;

/// Orchestrator over whichever fast store the configuration selects.
pub type DynTier = TierOrchestrator<dyn FastStore, HttpBlobTransport>;

/// Open the fast store described by `config`.
pub async fn connect_fast_store(config: &FastStoreConfig) -> RipResult<Arc<dyn FastStore>> {
    let store: Arc<dyn FastStore> = match config {
        FastStoreConfig::Redis {
            url,
            username,
            password,
        } => Arc::new(
            RedisFastStore::connect(url, username.as_deref(), password.as_ref()).await?,
        ),
        FastStoreConfig::Lmdb { path, max_size_mb } => {
            tracing::debug!(path = %path.display(), max_size_mb = max_size_mb, "Opening LMDB fast store");
            Arc::new(
                LmdbFastStore::open(path, *max_size_mb)
                    .map_err(ripdb_core::FastStoreError::from)?,
            )
        }
        FastStoreConfig::InMemory => {
            tracing::warn!("Using in-memory fast store; contents are lost on exit");
            Arc::new(InMemoryFastStore::new())
        }
    };
    Ok(store)
}

/// Validate `config` and wire up both tiers.
pub async fn connect(config: &RipConfig) -> RipResult<DynTier> {
    config.validate()?;

    let fast = connect_fast_store(&config.fast_store).await?;
    let transport = Arc::new(HttpBlobTransport::new(&config.archive)?);
    let gateway = ArchiveGateway::new(transport, config.fetch_retry.clone());

    tracing::info!(
        gateway = %config.archive.gateway_base_url,
        fetch_attempts = config.fetch_retry.attempts(),
        backup_attempts = config.backup_retry.attempts(),
        "Tier orchestrator ready"
    );

    Ok(TierOrchestrator::new(fast, gateway).with_backup_retry(config.backup_retry.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ripdb_core::ArchiveConfig;
    use serde_json::{json, Value};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_connect_in_memory() {
        let config = RipConfig::new(FastStoreConfig::InMemory, ArchiveConfig::new("token"));
        let tier = connect(&config).await.unwrap();

        tier.fast_store()
            .set("k", r#"{"cid":"bafkqaaa","data":{"a":1}}"#.to_string())
            .await
            .unwrap();
        let envelope = tier.get::<Value>("k").await.unwrap().unwrap();
        assert_eq!(envelope.data, Some(json!({"a": 1})));
    }

    #[tokio::test]
    async fn test_connect_lmdb() {
        let dir = TempDir::new().expect("TempDir creation should succeed");
        let config = RipConfig::new(
            FastStoreConfig::Lmdb {
                path: dir.path().join("fast"),
                max_size_mb: 10,
            },
            ArchiveConfig::new("token"),
        );
        let tier = connect(&config).await.unwrap();
        assert!(tier.peek::<Value>("absent").await.unwrap().is_none());
        tier.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_rejects_invalid_config() {
        let config = RipConfig::new(
            FastStoreConfig::InMemory,
            ArchiveConfig::new("token").with_gateway_base_url("ftp://nope"),
        );
        let err = connect(&config).await.unwrap_err();
        assert!(matches!(err, ripdb_core::RipError::Config(_)));
    }
}
