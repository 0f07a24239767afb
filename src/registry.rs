use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

/// Set of mailbox identities that currently have a session in the
/// TRANSACTION state. A user may hold at most one entry.
#[derive(Debug, Default)]
pub struct Registry {
    users: Mutex<HashSet<String>>,
}

/// Proof that a session holds `user` in the [`Registry`]. The entry is
/// removed when the lock is dropped.
#[derive(Debug)]
pub struct Lock {
    registry: Arc<Registry>,
    user: String,
}

impl Registry {
    pub fn new() -> Arc<Self> {
        Arc::new(Registry::default())
    }

    /// Identities are compared trimmed and case-folded.
    pub fn normalize(user: &str) -> String {
        user.trim().to_lowercase()
    }

    /// Inserts `user` unless another session already holds it.
    pub fn lock(self: &Arc<Self>, user: &str) -> Option<Lock> {
        let user = Self::normalize(user);
        if !self.users().insert(user.clone()) {
            return None;
        }

        Some(Lock {
            registry: self.clone(),
            user,
        })
    }

    pub fn is_locked(&self, user: &str) -> bool {
        self.users().contains(&Self::normalize(user))
    }

    pub fn len(&self) -> usize {
        self.users().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn users(&self) -> MutexGuard<'_, HashSet<String>> {
        // The set stays consistent even if a holder panicked.
        self.users.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Lock {
    pub fn user(&self) -> &str {
        &self.user
    }
}

impl Drop for Lock {
    fn drop(&mut self) {
        self.registry.users().remove(&self.user);
    }
}
