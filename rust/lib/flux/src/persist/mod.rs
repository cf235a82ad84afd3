//! Key/value persistence behind a store.
//!
//! Used in two places only: `commit` with a namespace writes each payload
//! key under `namespace + key`, and component hydration reads the same keys
//! back at mount time.

pub mod memory;
pub mod redb;

pub use self::memory::MemoryStore;
pub use self::redb::RedbStore;

use crate::error::PersistError;
use crate::value::StateValue;

/// Synchronous key/value service holding state values.
pub trait PersistStore: Send + Sync {
    /// Read the value stored under `key`. Returns None if nothing is stored.
    fn get(&self, key: &str) -> Result<Option<StateValue>, PersistError>;

    /// Store `data` under `key`, replacing any previous value.
    fn set(&self, key: &str, data: &StateValue) -> Result<(), PersistError>;
}
