//! Common test infrastructure for Redis integration tests.

use quill_config::RedisConfig;
use quill_store::{KeyValueStore, RedisStore};
use std::sync::Arc;
use std::time::Duration;
use testcontainers::{runners::AsyncRunner, ContainerAsync};
use testcontainers_modules::redis::{Redis, REDIS_PORT};

/// Redis container wrapper.
///
/// Keeps the container alive for as long as the store is in use.
pub struct TestRedis {
    _container: ContainerAsync<Redis>,
    store: Arc<RedisStore>,
}

impl TestRedis {
    /// Starts a fresh Redis container and connects a store to it.
    pub async fn new() -> Self {
        let container = Redis::default()
            .start()
            .await
            .expect("Failed to start Redis container");

        let port = container
            .get_host_port_ipv4(REDIS_PORT)
            .await
            .expect("Failed to get Redis port");

        let config = RedisConfig {
            url: format!("redis://127.0.0.1:{}", port),
            pool_size: 4,
            enabled: true,
            operation_timeout_ms: 2_000,
        };

        let store = Self::connect_with_retry(&config, 30).await;

        Self {
            _container: container,
            store: Arc::new(store),
        }
    }

    /// Returns the connected store.
    pub fn store(&self) -> &RedisStore {
        &self.store
    }

    /// Returns a handle that can move into spawned tasks.
    pub fn shared(&self) -> Arc<RedisStore> {
        self.store.clone()
    }

    async fn connect_with_retry(config: &RedisConfig, max_attempts: u32) -> RedisStore {
        let store = RedisStore::connect(config)
            .await
            .expect("Failed to build Redis pool");

        let mut attempts = 0;
        loop {
            attempts += 1;
            match store.ping().await {
                Ok(()) => return store,
                Err(e) => {
                    if attempts >= max_attempts {
                        panic!("Redis did not answer after {} attempts: {}", max_attempts, e);
                    }
                    tokio::time::sleep(Duration::from_millis(500)).await;
                }
            }
        }
    }
}
