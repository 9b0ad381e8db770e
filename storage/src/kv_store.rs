//! The persistence collaborator trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::StorageError;

/// Namespaced key-value persistence over JSON records. Called
/// opportunistically after mutations; implementations must tolerate the same
/// key being rewritten often.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn save(&self, namespace: &str, key: &str, record: &Value) -> Result<(), StorageError>;

    async fn load(&self, namespace: &str, key: &str) -> Result<Option<Value>, StorageError>;

    /// Returns true when a record was actually removed.
    async fn remove(&self, namespace: &str, key: &str) -> Result<bool, StorageError>;

    /// Deletes every record in `namespace` last written before `cutoff`;
    /// returns how many went away.
    async fn sweep_older_than(
        &self,
        namespace: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StorageError>;
}
