//! Key-value storage trait.

use crate::error::Result;

/// Namespace-isolated key-value storage.
///
/// Every call is its own transaction. All operations are synchronous to match
/// rusqlite's API; implementations serialize writers internally.
pub trait KeyValueStore: Send + Sync {
    /// Read a value.
    fn get(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>>;

    /// Insert or overwrite a value.
    fn put(&self, namespace: &str, key: &str, value: &[u8]) -> Result<()>;

    /// Delete a value. Returns whether a value was present.
    fn delete(&self, namespace: &str, key: &str) -> Result<bool>;

    /// All entries of a namespace, ordered by key.
    fn scan(&self, namespace: &str) -> Result<Vec<(String, Vec<u8>)>>;
}
