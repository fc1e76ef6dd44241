//! Process-wide shared store.
//!
//! `MemStorage` outlives every task. It holds values that concurrently running
//! tasks share and provides the transaction primitive that serializes composite
//! operations on host-level resources (a single `/etc/fstab`, a single device).
//!
//! Transactions are exclusive per [`LockScope`]: two transactions on the same
//! scope never overlap, transactions on different scopes run independently.
//! A scope's lock lives only while some transaction holds or waits on it.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use serde_json::Value;
use tracing::debug;

/// Identity of a protected host resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LockScope {
    /// A file on a host, e.g. `node1` + `/etc/fstab`.
    File { host: String, path: String },
    /// A block device on a host.
    Device { host: String, device: String },
    /// Free-form scope for callers that protect something else.
    Named(String),
}

impl LockScope {
    pub fn file(host: impl Into<String>, path: impl Into<String>) -> Self {
        Self::File {
            host: host.into(),
            path: path.into(),
        }
    }

    pub fn device(host: impl Into<String>, device: impl Into<String>) -> Self {
        Self::Device {
            host: host.into(),
            device: device.into(),
        }
    }
}

impl fmt::Display for LockScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File { host, path } => write!(f, "file:{}:{}", host, path),
            Self::Device { host, device } => write!(f, "device:{}:{}", host, device),
            Self::Named(name) => write!(f, "named:{}", name),
        }
    }
}

/// Shared key/value store with scoped exclusive transactions.
#[derive(Default)]
pub struct MemStorage {
    values: RwLock<HashMap<String, Value>>,
    locks: Mutex<HashMap<LockScope, Arc<Mutex<()>>>>,
}

impl MemStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` while holding the exclusive lock for `scope`.
    ///
    /// Blocks until every earlier transaction on the same scope has returned.
    /// The lock is released when `f` returns, whether it succeeded or not, and
    /// `f`'s result is handed back unchanged.
    pub fn tx<T, E, F>(&self, scope: &LockScope, f: F) -> Result<T, E>
    where
        F: FnOnce(&Self) -> Result<T, E>,
    {
        let lock = self.scope_lock(scope);
        let result = {
            // A panic inside an earlier transaction poisons the mutex; the unit
            // payload carries no state, so the lock is still usable.
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            debug!(scope = %scope, "transaction started");
            let result = f(self);
            debug!(scope = %scope, ok = result.is_ok(), "transaction finished");
            result
        };
        self.release_scope(scope, lock);
        result
    }

    fn scope_lock(&self, scope: &LockScope) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(scope.clone()).or_default())
    }

    /// Drop the scope's entry once no other transaction holds or waits on it.
    fn release_scope(&self, scope: &LockScope, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // One reference in the map, one in `lock`.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(scope);
        }
    }

    /// Scopes with a transaction running or waiting.
    #[cfg(test)]
    fn active_scopes(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Store `value`, returning the previous one.
    pub fn set(&self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), value)
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
    }

    pub fn len(&self) -> usize {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for MemStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemStorage")
            .field("values", &self.len())
            .finish_non_exhaustive()
    }
}
