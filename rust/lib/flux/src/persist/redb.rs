use std::path::Path;
use std::sync::Arc;

use redb::{Database, TableDefinition};
use tracing::debug;

use crate::error::PersistError;
use crate::persist::PersistStore;
use crate::value::StateValue;

const TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("flux_state");

/// Persistence backed by a redb file. Values are stored as JSON.
pub struct RedbStore {
    db: Arc<Database>,
}

impl RedbStore {
    /// Open or create a redb database at the given path.
    pub fn open(path: &Path) -> Result<Self, PersistError> {
        let db = Database::create(path).map_err(storage)?;

        // Ensure the table exists by doing a write transaction.
        let write_txn = db.begin_write().map_err(storage)?;
        {
            let _table = write_txn.open_table(TABLE).map_err(storage)?;
        }
        write_txn.commit().map_err(storage)?;

        debug!("RedbStore: opened {:?}", path);
        Ok(Self { db: Arc::new(db) })
    }
}

impl PersistStore for RedbStore {
    fn get(&self, key: &str) -> Result<Option<StateValue>, PersistError> {
        let read_txn = self.db.begin_read().map_err(storage)?;
        let table = read_txn.open_table(TABLE).map_err(storage)?;

        match table.get(key).map_err(storage)? {
            Some(bytes) => serde_json::from_slice(bytes.value())
                .map(Some)
                .map_err(|e| PersistError::Serialization(e.to_string())),
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, data: &StateValue) -> Result<(), PersistError> {
        let bytes =
            serde_json::to_vec(data).map_err(|e| PersistError::Serialization(e.to_string()))?;

        let write_txn = self.db.begin_write().map_err(storage)?;
        {
            let mut table = write_txn.open_table(TABLE).map_err(storage)?;
            table.insert(key, bytes.as_slice()).map_err(storage)?;
        }
        write_txn.commit().map_err(storage)?;
        Ok(())
    }
}

fn storage(e: impl std::fmt::Display) -> PersistError {
    PersistError::Storage(e.to_string())
}
