//! In-process remote store for tests and ephemeral runs

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use super::remote::{parse_batch_timestamp, RemoteAccount, RemoteObject, RemoteStore};
use crate::error::{Error, Result};
use crate::util::now_millis;

#[derive(Debug, Default)]
struct MemoryState {
    account: Option<RemoteAccount>,
    objects: BTreeMap<String, StoredObject>,
    fail_puts: bool,
    fail_lists: bool,
    fail_gets: HashSet<String>,
}

#[derive(Debug, Clone)]
struct StoredObject {
    bytes: Vec<u8>,
    created_at: i64,
}

/// Remote store held in memory. Clones share the same objects, so several
/// catalogs can sync through one instance.
#[derive(Debug, Clone, Default)]
pub struct MemoryRemoteStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryRemoteStore {
    /// A store with a signed-in test account
    #[must_use]
    pub fn new() -> Self {
        let store = Self::default();
        store.set_account(Some(RemoteAccount {
            id: "memory".into(),
            display_name: "In-memory remote".into(),
        }));
        store
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| Error::Storage("memory remote lock poisoned".into()))
    }

    pub fn set_account(&self, account: Option<RemoteAccount>) {
        if let Ok(mut state) = self.lock() {
            state.account = account;
        }
    }

    /// Make every `put_object` fail until reset
    pub fn set_fail_puts(&self, fail: bool) {
        if let Ok(mut state) = self.lock() {
            state.fail_puts = fail;
        }
    }

    pub fn set_fail_lists(&self, fail: bool) {
        if let Ok(mut state) = self.lock() {
            state.fail_lists = fail;
        }
    }

    /// Make `get_object(id)` fail until reset
    pub fn set_fail_get(&self, id: &str, fail: bool) {
        if let Ok(mut state) = self.lock() {
            if fail {
                state.fail_gets.insert(id.to_string());
            } else {
                state.fail_gets.remove(id);
            }
        }
    }

    /// Store an object with an explicit creation time.
    pub fn insert_object(
        &self,
        name: &str,
        bytes: Vec<u8>,
        created_at: i64,
    ) -> Result<RemoteObject> {
        let mut state = self.lock()?;
        state
            .objects
            .insert(name.to_string(), StoredObject { bytes, created_at });
        Ok(RemoteObject {
            id: name.to_string(),
            name: name.to_string(),
            created_at,
        })
    }

    pub fn object_names(&self) -> Vec<String> {
        self.lock()
            .map(|state| state.objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn object_bytes(&self, id: &str) -> Option<Vec<u8>> {
        self.lock()
            .ok()
            .and_then(|state| state.objects.get(id).map(|object| object.bytes.clone()))
    }
}

impl RemoteStore for MemoryRemoteStore {
    async fn account(&self) -> Result<Option<RemoteAccount>> {
        Ok(self.lock()?.account.clone())
    }

    async fn list_objects(&self) -> Result<Vec<RemoteObject>> {
        let state = self.lock()?;
        if state.fail_lists {
            return Err(Error::Storage("memory remote: list failed".into()));
        }
        Ok(state
            .objects
            .iter()
            .map(|(name, object)| RemoteObject {
                id: name.clone(),
                name: name.clone(),
                created_at: object.created_at,
            })
            .collect())
    }

    async fn get_object(&self, id: &str) -> Result<Vec<u8>> {
        let state = self.lock()?;
        if state.fail_gets.contains(id) {
            return Err(Error::Storage(format!("memory remote: get {id} failed")));
        }
        state
            .objects
            .get(id)
            .map(|object| object.bytes.clone())
            .ok_or_else(|| Error::NotFound(format!("remote object {id}")))
    }

    async fn put_object(&self, name: &str, bytes: Vec<u8>) -> Result<RemoteObject> {
        if self.lock()?.fail_puts {
            return Err(Error::Storage(format!("memory remote: put {name} failed")));
        }
        let created_at = parse_batch_timestamp(name).unwrap_or_else(now_millis);
        self.insert_object(name, bytes, created_at)
    }

    async fn delete_object(&self, id: &str) -> Result<()> {
        self.lock()?.objects.remove(id);
        Ok(())
    }
}
