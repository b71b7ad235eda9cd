//! Distributed cache backend on Redis.
//!
//! Values are stored with `SET key payload EX ttl`; reads are plain `GET`.

#[cfg(feature = "redis")]
mod implementation {
    use crate::cache::CacheBackend;
    use crate::{Error, Result};
    use redis::{Client, Commands, Connection};

    /// Redis-backed distributed cache.
    pub struct RedisCacheBackend {
        client: Client,
    }

    impl RedisCacheBackend {
        /// Opens a client for `connection_url`.
        ///
        /// The connection itself is established per operation.
        ///
        /// # Errors
        ///
        /// Returns an error if the URL is invalid.
        pub fn new(connection_url: &str) -> Result<Self> {
            let client = Client::open(connection_url).map_err(|e| Error::OperationFailed {
                operation: "redis_connect".to_string(),
                cause: e.to_string(),
            })?;
            Ok(Self { client })
        }

        fn get_connection(&self) -> Result<Connection> {
            self.client
                .get_connection()
                .map_err(|e| Error::OperationFailed {
                    operation: "redis_get_connection".to_string(),
                    cause: e.to_string(),
                })
        }
    }

    impl CacheBackend for RedisCacheBackend {
        fn name(&self) -> &'static str {
            "redis"
        }

        fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
            let mut conn = self.get_connection()?;
            conn.get(key).map_err(|e| Error::OperationFailed {
                operation: "redis_get".to_string(),
                cause: e.to_string(),
            })
        }

        fn set(&self, key: &str, payload: &[u8], ttl: u64) -> Result<bool> {
            let mut conn = self.get_connection()?;
            // EX 0 is rejected by the server
            let () = conn
                .set_ex(key, payload, ttl.max(1))
                .map_err(|e| Error::OperationFailed {
                    operation: "redis_set".to_string(),
                    cause: e.to_string(),
                })?;
            Ok(true)
        }

        fn delete(&self, key: &str) -> Result<bool> {
            let mut conn = self.get_connection()?;
            let removed: u64 = conn.del(key).map_err(|e| Error::OperationFailed {
                operation: "redis_delete".to_string(),
                cause: e.to_string(),
            })?;
            Ok(removed > 0)
        }
    }
}

#[cfg(feature = "redis")]
pub use implementation::RedisCacheBackend;

#[cfg(not(feature = "redis"))]
mod stub {
    use crate::cache::CacheBackend;
    use crate::{Error, Result};

    /// Stub distributed cache when the `redis` feature is not enabled.
    pub struct RedisCacheBackend;

    impl RedisCacheBackend {
        /// Creates a Redis cache backend (stub).
        ///
        /// # Errors
        ///
        /// Always returns an error because the feature is not enabled.
        pub fn new(_connection_url: &str) -> Result<Self> {
            Err(Error::FeatureNotEnabled("redis".to_string()))
        }
    }

    impl CacheBackend for RedisCacheBackend {
        fn name(&self) -> &'static str {
            "redis"
        }

        fn get(&self, _key: &str) -> Result<Option<Vec<u8>>> {
            Err(Error::FeatureNotEnabled("redis".to_string()))
        }

        fn set(&self, _key: &str, _payload: &[u8], _ttl: u64) -> Result<bool> {
            Err(Error::FeatureNotEnabled("redis".to_string()))
        }

        fn delete(&self, _key: &str) -> Result<bool> {
            Err(Error::FeatureNotEnabled("redis".to_string()))
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_stub_reports_missing_feature() {
            assert!(matches!(
                RedisCacheBackend::new("redis://localhost:6379"),
                Err(Error::FeatureNotEnabled(_))
            ));
        }
    }
}

#[cfg(not(feature = "redis"))]
pub use stub::RedisCacheBackend;
