//! Wire client pool
//!
//! Against AWS S3 one client multiplexes concurrent requests over its
//! connection pool, so a single shared client is enough. Some S3-compatible
//! servers have been observed to hold one socket per client, where
//! throughput improves with a pool of distinct clients.

use std::sync::Arc;

use aws_sdk_s3::Client;
use parking_lot::Mutex;

use crate::config::UploaderConfig;

/// Pool of S3 clients, either one shared instance or an unbounded set of
/// lazily-created ones.
pub struct ClientPool {
    shared: Option<Client>,
    config: aws_sdk_s3::Config,
    pool: Mutex<Vec<Client>>,
}

impl ClientPool {
    /// Create a pool from a finished SDK client configuration. When
    /// `share` is true every `get` returns the same client.
    pub fn new(share: bool, config: aws_sdk_s3::Config) -> Arc<Self> {
        let shared = share.then(|| Client::from_conf(config.clone()));

        Arc::new(ClientPool {
            shared,
            config,
            pool: Mutex::new(Vec::new()),
        })
    }

    /// Create a pool from a loaded AWS configuration, applying the
    /// uploader's addressing and sharing options.
    pub fn from_sdk_config(sdk_config: &aws_config::SdkConfig, config: &UploaderConfig) -> Arc<Self> {
        let mut builder = aws_sdk_s3::config::Builder::from(sdk_config);
        if !config.disable_path_style {
            builder = builder.force_path_style(true);
        }
        Self::new(config.disable_client_pool, builder.build())
    }

    /// Returns a client. Return it via `put` when finished.
    pub fn get(&self) -> Client {
        if let Some(client) = &self.shared {
            return client.clone();
        }

        self.pool
            .lock()
            .pop()
            .unwrap_or_else(|| Client::from_conf(self.config.clone()))
    }

    /// Returns a client to the pool for the next `get`.
    pub fn put(&self, client: Client) {
        if self.shared.is_none() {
            self.pool.lock().push(client);
        }
    }
}
