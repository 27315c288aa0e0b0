//! JSON document store shared by every engine.
//!
//! On wasm32 documents live in the Spin key-value store; native builds (the
//! actix binary and the test suite) keep them in an in-process map. All
//! membership toggles and counters go through [`Store::update_json`], which
//! runs the caller's closure inside the store's critical section: the
//! add-or-remove decision and the write are one store-level mutation, not a
//! fetch-decide-save round trip.

use serde::de::DeserializeOwned;
use serde::Serialize;

#[cfg(target_arch = "wasm32")]
pub struct Store {
    inner: spin_sdk::key_value::Store,
}

#[cfg(target_arch = "wasm32")]
impl Store {
    pub fn open_default() -> Store {
        Store {
            inner: spin_sdk::key_value::Store::open_default().expect("KV store must exist"),
        }
    }

    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> anyhow::Result<Option<T>> {
        Ok(self.inner.get_json(key)?)
    }

    pub fn set_json<T: Serialize>(&self, key: &str, value: &T) -> anyhow::Result<()> {
        Ok(self.inner.set_json(key, value)?)
    }

    pub fn delete(&self, key: &str) -> anyhow::Result<()> {
        self.inner.delete(key)?;
        Ok(())
    }

    /// Atomic read-modify-write on one document. The closure sees the current
    /// document (`None` if absent) and may mutate it in place; `Some` is
    /// persisted, `None` deletes an existing document. A Spin component
    /// instance handles one request at a time, so the sequence is not
    /// interleaved with other mutations of the same store.
    pub fn update_json<T, R, F>(&self, key: &str, f: F) -> anyhow::Result<R>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(&mut Option<T>) -> R,
    {
        let mut doc: Option<T> = self.inner.get_json(key)?;
        let existed = doc.is_some();
        let result = f(&mut doc);
        match &doc {
            Some(value) => self.inner.set_json(key, value)?,
            None => {
                if existed {
                    self.inner.delete(key)?;
                }
            }
        }
        Ok(result)
    }
}

#[cfg(not(target_arch = "wasm32"))]
mod native {
    use std::collections::HashMap;
    use std::sync::{Mutex, MutexGuard, OnceLock};

    static MAP: OnceLock<Mutex<HashMap<String, Vec<u8>>>> = OnceLock::new();

    pub(super) fn map() -> MutexGuard<'static, HashMap<String, Vec<u8>>> {
        MAP.get_or_init(|| Mutex::new(HashMap::new()))
            .lock()
            .expect("store lock poisoned")
    }
}

#[cfg(not(target_arch = "wasm32"))]
pub struct Store;

#[cfg(not(target_arch = "wasm32"))]
impl Store {
    pub fn open_default() -> Store {
        Store
    }

    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> anyhow::Result<Option<T>> {
        match native::map().get(key) {
            Some(bytes) => Ok(Some(serde_json::from_slice(bytes)?)),
            None => Ok(None),
        }
    }

    pub fn set_json<T: Serialize>(&self, key: &str, value: &T) -> anyhow::Result<()> {
        let bytes = serde_json::to_vec(value)?;
        native::map().insert(key.to_string(), bytes);
        Ok(())
    }

    pub fn delete(&self, key: &str) -> anyhow::Result<()> {
        native::map().remove(key);
        Ok(())
    }

    /// Atomic read-modify-write on one document; the map lock is held across
    /// the closure.
    pub fn update_json<T, R, F>(&self, key: &str, f: F) -> anyhow::Result<R>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(&mut Option<T>) -> R,
    {
        let mut map = native::map();
        let mut doc: Option<T> = match map.get(key) {
            Some(bytes) => Some(serde_json::from_slice(bytes)?),
            None => None,
        };
        let existed = doc.is_some();
        let result = f(&mut doc);
        match &doc {
            Some(value) => {
                let bytes = serde_json::to_vec(value)?;
                map.insert(key.to_string(), bytes);
            }
            None => {
                if existed {
                    map.remove(key);
                }
            }
        }
        Ok(result)
    }
}
