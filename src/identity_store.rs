// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Persisted identity state
//!
//! Wraps [`LocalStore`] with the two identity slots: the guest-session flag
//! and the cached sign-in credential. Reads fail open: a storage error is
//! logged and treated as "slot absent" so startup never wedges on a bad disk.

use tracing::warn;

use crate::db::LocalStore;
use crate::identity::UserRecord;
use crate::Result;

/// Slot holding `"true"` while a guest session is active.
pub const GUEST_SESSION_KEY: &str = "guestSession";
/// Slot holding the JSON-encoded cached user record.
pub const CACHED_USER_KEY: &str = "authUser";

#[derive(Clone)]
pub struct IdentityStore {
    store: LocalStore,
}

impl IdentityStore {
    pub fn new(store: LocalStore) -> Self {
        Self { store }
    }

    /// Whether a guest session was persisted. Fails open to `false`.
    pub async fn guest_flag(&self) -> bool {
        match self.store.get(GUEST_SESSION_KEY) {
            Ok(value) => value.as_deref() == Some("true"),
            Err(e) => {
                warn!("Failed to read guest session flag: {}", e);
                false
            }
        }
    }

    pub async fn set_guest_flag(&self, active: bool) -> Result<()> {
        if active {
            self.store.set(GUEST_SESSION_KEY, "true")
        } else {
            self.store.remove(GUEST_SESSION_KEY)
        }
    }

    /// The cached credential from the last successful sign-in, if any.
    /// Fails open to `None` on storage or decode errors.
    pub async fn cached_user(&self) -> Option<UserRecord> {
        let raw = match self.store.get(CACHED_USER_KEY) {
            Ok(value) => value?,
            Err(e) => {
                warn!("Failed to read cached credential: {}", e);
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(user) => Some(user),
            Err(e) => {
                warn!("Discarding undecodable cached credential: {}", e);
                None
            }
        }
    }

    pub async fn set_cached_user(&self, user: &UserRecord) -> Result<()> {
        let json = serde_json::to_string(user)?;
        self.store.set(CACHED_USER_KEY, &json)
    }

    pub async fn clear_cached_user(&self) -> Result<()> {
        self.store.remove(CACHED_USER_KEY)
    }

    /// Drop both identity slots.
    pub async fn clear(&self) -> Result<()> {
        self.store.remove(GUEST_SESSION_KEY)?;
        self.store.remove(CACHED_USER_KEY)
    }
}
