//! Round-robin API credential rotation.
//!
//! The pool owns its cursors and the set of quota-exhausted keys behind one
//! lock, so concurrent workers never pick an invalidated key or skip a slot
//! of the rotation.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::warn;

use crate::error::{DispatchError, DispatchResult};

/// One API key plus the organization to bill it to, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    /// API key.
    pub key: String,
    /// Organization header value.
    pub organization: Option<String>,
}

#[derive(Debug)]
struct PoolState {
    key_cursor: usize,
    org_cursor: usize,
    invalid: HashSet<String>,
}

/// Shared pool of API keys and organizations.
///
/// Cloning yields another handle on the same pool.
#[derive(Debug, Clone)]
pub struct CredentialPool {
    keys: Arc<[String]>,
    orgs: Arc<[String]>,
    state: Arc<Mutex<PoolState>>,
}

impl CredentialPool {
    /// Build a pool. `keys` must not be empty.
    pub fn new(keys: Vec<String>, orgs: Vec<String>) -> DispatchResult<Self> {
        if keys.is_empty() {
            return Err(DispatchError::InvalidConfig(
                "at least one API key is required".to_string(),
            ));
        }
        Ok(Self {
            keys: keys.into(),
            orgs: orgs.into(),
            state: Arc::new(Mutex::new(PoolState {
                // first call advances to index 0
                key_cursor: usize::MAX,
                org_cursor: usize::MAX,
                invalid: HashSet::new(),
            })),
        })
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        // the state stays consistent even if a holder panicked
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Advance the rotation and return the next usable credential.
    ///
    /// Fails with [`DispatchError::AllCredentialsInvalid`] once every key has
    /// been marked invalid.
    pub fn next_credential(&self) -> DispatchResult<Credential> {
        let mut state = self.lock();
        if !self.any_valid(&state) {
            return Err(DispatchError::AllCredentialsInvalid);
        }

        let key = loop {
            state.key_cursor = next_index(state.key_cursor, self.keys.len());
            let candidate = &self.keys[state.key_cursor];
            if !state.invalid.contains(candidate) {
                break candidate.clone();
            }
        };

        let organization = if self.orgs.is_empty() {
            None
        } else {
            state.org_cursor = next_index(state.org_cursor, self.orgs.len());
            Some(self.orgs[state.org_cursor].clone())
        };

        Ok(Credential { key, organization })
    }

    /// Exclude `key` from future rotation.
    pub fn mark_invalid(&self, key: &str) {
        let mut state = self.lock();
        if self.keys.iter().any(|k| k == key) && state.invalid.insert(key.to_string()) {
            warn!(
                key = %redact(key),
                remaining = self.keys.iter().filter(|k| !state.invalid.contains(*k)).count(),
                "insufficient quota, key disabled"
            );
        }
    }

    /// Whether any key is still usable.
    pub fn has_valid(&self) -> bool {
        self.any_valid(&self.lock())
    }

    fn any_valid(&self, state: &PoolState) -> bool {
        self.keys.iter().any(|k| !state.invalid.contains(k))
    }

    /// Number of configured keys.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Always false: a pool holds at least one key.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

fn next_index(cursor: usize, len: usize) -> usize {
    cursor.wrapping_add(1) % len
}

/// Key shortened for logs.
pub fn redact(key: &str) -> String {
    let visible: String = key.chars().rev().take(4).collect::<Vec<_>>().into_iter().rev().collect();
    format!("...{visible}")
}
