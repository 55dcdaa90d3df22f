//! Redis-backed fast store.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, ConnectionInfo, IntoConnectionInfo};
use ripdb_core::FastStoreError;
use secrecy::{ExposeSecret, SecretString};

use super::FastStore;

/// Fast store backed by a Redis server.
///
/// Holds a [`ConnectionManager`], which reconnects transparently after a
/// dropped connection. Each command clones the manager handle, so the store
/// can be shared across tasks without extra locking.
#[derive(Clone)]
pub struct RedisFastStore {
    conn: ConnectionManager,
    endpoint: String,
}

impl RedisFastStore {
    /// Connect to `url`, applying optional credentials on top of any embedded
    /// in the URL.
    pub async fn connect(
        url: &str,
        username: Option<&str>,
        password: Option<&SecretString>,
    ) -> Result<Self, FastStoreError> {
        let info = connection_info(url, username, password)?;
        let endpoint = info.addr.to_string();

        let client = redis::Client::open(info).map_err(|e| FastStoreError::ConnectionFailed {
            reason: e.to_string(),
        })?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| FastStoreError::ConnectionFailed {
                reason: e.to_string(),
            })?;

        tracing::debug!(endpoint = %endpoint, "Connected to Redis fast store");
        Ok(Self { conn, endpoint })
    }
}

/// Parse `url` and overlay explicit credentials.
pub(crate) fn connection_info(
    url: &str,
    username: Option<&str>,
    password: Option<&SecretString>,
) -> Result<ConnectionInfo, FastStoreError> {
    let mut info = url
        .into_connection_info()
        .map_err(|e| FastStoreError::ConnectionFailed {
            reason: format!("invalid Redis URL: {}", e),
        })?;

    if let Some(username) = username {
        info.redis.username = Some(username.to_string());
    }
    if let Some(password) = password {
        info.redis.password = Some(password.expose_secret().to_string());
    }
    Ok(info)
}

#[async_trait]
impl FastStore for RedisFastStore {
    async fn get(&self, key: &str) -> Result<Option<String>, FastStoreError> {
        let mut conn = self.conn.clone();
        conn.get::<_, Option<String>>(key)
            .await
            .map_err(|e| FastStoreError::ReadFailed {
                key: key.to_string(),
                reason: e.to_string(),
            })
    }

    async fn set(&self, key: &str, value: String) -> Result<(), FastStoreError> {
        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>(key, value)
            .await
            .map_err(|e| FastStoreError::WriteFailed {
                key: key.to_string(),
                reason: e.to_string(),
            })
    }
}

impl std::fmt::Debug for RedisFastStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisFastStore")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_info_applies_credentials() {
        let password = SecretString::new("hunter2".to_string().into_boxed_str());
        let info = connection_info("redis://cache:6379/2", Some("app"), Some(&password)).unwrap();

        assert_eq!(info.redis.db, 2);
        assert_eq!(info.redis.username.as_deref(), Some("app"));
        assert_eq!(info.redis.password.as_deref(), Some("hunter2"));
    }

    #[test]
    fn test_connection_info_keeps_url_credentials() {
        let info = connection_info("redis://user:pw@cache:6379", None, None).unwrap();
        assert_eq!(info.redis.username.as_deref(), Some("user"));
        assert_eq!(info.redis.password.as_deref(), Some("pw"));
    }

    #[test]
    fn test_connection_info_rejects_garbage() {
        let err = connection_info("not a url", None, None).unwrap_err();
        assert!(matches!(err, FastStoreError::ConnectionFailed { .. }));
    }
}
