// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Detection history
//!
//! Append-only records of past detection results, routed by the identity
//! active at call time: authenticated users write to their remote document,
//! guests write to the local store, signed-out users write nowhere.

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::db::LocalStore;
use crate::identity::Identity;
use crate::users::UserDirectory;
use crate::{Result, ScanError};

/// Local slot holding the guest history as a JSON array.
pub const GUEST_HISTORY_KEY: &str = "guestHistory";

/// A single persisted detection result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: String,
    pub disease: String,
    pub confidence: f64,
    /// Opaque reference to the analyzed image
    pub image: String,
    pub timestamp: DateTime<Utc>,
    pub date: String,
}

/// Create a new history entry stamped with the current time.
pub fn create_entry(disease: String, confidence: f64, image: String) -> HistoryEntry {
    HistoryEntry {
        id: uuid::Uuid::new_v4().to_string(),
        disease,
        confidence,
        image,
        timestamp: Utc::now(),
        date: Local::now().format("%Y-%m-%d").to_string(),
    }
}

/// History manager routing between the remote directory and local storage
#[derive(Clone)]
pub struct HistoryStore {
    directory: Arc<dyn UserDirectory>,
    local: LocalStore,
}

impl HistoryStore {
    pub fn new(directory: Arc<dyn UserDirectory>, local: LocalStore) -> Self {
        Self { directory, local }
    }

    /// Append an entry under the given identity.
    ///
    /// Always additive: the remote backend appends atomically, the local
    /// backend rewrites the full array with the entry pushed on the end.
    /// Signed-out identities resolve successfully without persisting.
    pub async fn append(&self, identity: &Identity, entry: HistoryEntry) -> Result<()> {
        match identity {
            Identity::Authenticated(user) => self.directory.append_history(&user.uid, entry).await,
            Identity::Guest => self.append_local(entry),
            Identity::SignedOut => Ok(()),
        }
    }

    /// All entries for the given identity, in insertion order.
    /// A missing container yields an empty list.
    pub async fn list(&self, identity: &Identity) -> Result<Vec<HistoryEntry>> {
        match identity {
            Identity::Authenticated(user) => self.directory.history(&user.uid).await,
            Identity::Guest => self.read_local(),
            Identity::SignedOut => Ok(Vec::new()),
        }
    }

    /// The most recent `count` entries, newest first.
    pub async fn recent(&self, identity: &Identity, count: usize) -> Result<Vec<HistoryEntry>> {
        let mut entries = self.list(identity).await?;
        entries.reverse();
        entries.truncate(count);
        Ok(entries)
    }

    /// Drop the guest history slot.
    pub fn clear_local(&self) -> Result<()> {
        self.local.remove(GUEST_HISTORY_KEY)
    }

    fn read_local(&self) -> Result<Vec<HistoryEntry>> {
        let raw = match self.local.get(GUEST_HISTORY_KEY)? {
            Some(raw) => raw,
            None => return Ok(Vec::new()),
        };

        serde_json::from_str(&raw)
            .map_err(|e| ScanError::Storage(format!("Undecodable guest history: {}", e)))
    }

    fn append_local(&self, entry: HistoryEntry) -> Result<()> {
        let mut entries = self.read_local()?;
        entries.push(entry);
        let json = serde_json::to_string(&entries)?;
        self.local.set(GUEST_HISTORY_KEY, &json)
    }
}
