// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Remote user directory
//!
//! One document per user, keyed by uid, carrying profile fields and an
//! appendable `history` list. The append is atomic on the server side;
//! this client never reads-modifies-writes the remote list.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

use crate::config::AccountsConfig;
use crate::history::HistoryEntry;
use crate::identity::UserRecord;
use crate::{Result, ScanError};

/// Per-user remote document store.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Create the user's document with an empty history if absent.
    /// Never overwrites an existing document.
    async fn ensure_profile(&self, user: &UserRecord) -> Result<()>;

    /// Create a fresh document for a newly registered user.
    async fn create_profile(&self, user: &UserRecord) -> Result<()>;

    /// Merge profile fields into the user's document, creating it if absent.
    /// Merge semantics: an existing history list is left untouched.
    async fn upsert_profile(&self, user: &UserRecord) -> Result<()>;

    /// Atomically add an entry to the end of the user's history list.
    async fn append_history(&self, uid: &str, entry: HistoryEntry) -> Result<()>;

    /// The user's full history, insertion order. Missing document -> empty.
    async fn history(&self, uid: &str) -> Result<Vec<HistoryEntry>>;
}

#[derive(Serialize)]
struct ProfileDocument<'a> {
    #[serde(rename = "displayName")]
    display_name: &'a str,
    email: &'a str,
    #[serde(rename = "photoURL", skip_serializing_if = "Option::is_none")]
    photo_url: Option<&'a str>,
    #[serde(rename = "createdAt", skip_serializing_if = "Option::is_none")]
    created_at: Option<DateTime<Utc>>,
    #[serde(rename = "lastLoginAt")]
    last_login_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    history: Option<Vec<HistoryEntry>>,
}

impl<'a> ProfileDocument<'a> {
    fn fresh(user: &'a UserRecord) -> Self {
        Self {
            display_name: &user.display_name,
            email: &user.email,
            photo_url: user.photo_url.as_deref(),
            created_at: Some(Utc::now()),
            last_login_at: Utc::now(),
            history: Some(Vec::new()),
        }
    }

    /// Profile fields only; the server merge leaves history alone.
    fn merge(user: &'a UserRecord) -> Self {
        Self {
            display_name: &user.display_name,
            email: &user.email,
            photo_url: user.photo_url.as_deref(),
            created_at: None,
            last_login_at: Utc::now(),
            history: None,
        }
    }
}

/// HTTP user directory client
pub struct HttpUserDirectory {
    client: Client,
    base_url: String,
}

impl HttpUserDirectory {
    pub fn new(config: &AccountsConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        let base_url = config.url.trim_end_matches('/').to_string();

        Self { client, base_url }
    }

    fn user_url(&self, uid: &str) -> String {
        format!("{}/users/{}", self.base_url, uid)
    }
}

#[async_trait]
impl UserDirectory for HttpUserDirectory {
    async fn ensure_profile(&self, user: &UserRecord) -> Result<()> {
        let url = self.user_url(&user.uid);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ScanError::Network(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => {
                debug!("Creating user document for {}", user.uid);
                self.create_profile(user).await
            }
            status if status.is_success() => {
                // Document exists; refresh last-login only
                self.client
                    .patch(&url)
                    .json(&ProfileDocument::merge(user))
                    .send()
                    .await
                    .map_err(|e| ScanError::Network(e.to_string()))?
                    .error_for_status()
                    .map_err(|e| ScanError::Network(e.to_string()))?;
                Ok(())
            }
            status => Err(ScanError::Network(format!(
                "User directory returned status {}",
                status
            ))),
        }
    }

    async fn create_profile(&self, user: &UserRecord) -> Result<()> {
        self.client
            .put(&self.user_url(&user.uid))
            .json(&ProfileDocument::fresh(user))
            .send()
            .await
            .map_err(|e| ScanError::Network(e.to_string()))?
            .error_for_status()
            .map_err(|e| ScanError::Network(e.to_string()))?;
        Ok(())
    }

    async fn upsert_profile(&self, user: &UserRecord) -> Result<()> {
        self.client
            .patch(&self.user_url(&user.uid))
            .json(&ProfileDocument::merge(user))
            .send()
            .await
            .map_err(|e| ScanError::Network(e.to_string()))?
            .error_for_status()
            .map_err(|e| ScanError::Network(e.to_string()))?;
        Ok(())
    }

    async fn append_history(&self, uid: &str, entry: HistoryEntry) -> Result<()> {
        self.client
            .post(format!("{}/history", self.user_url(uid)))
            .json(&entry)
            .send()
            .await
            .map_err(|e| ScanError::Network(e.to_string()))?
            .error_for_status()
            .map_err(|e| ScanError::Network(e.to_string()))?;
        Ok(())
    }

    async fn history(&self, uid: &str) -> Result<Vec<HistoryEntry>> {
        let response = self
            .client
            .get(format!("{}/history", self.user_url(uid)))
            .send()
            .await
            .map_err(|e| ScanError::Network(e.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }

        let response = response
            .error_for_status()
            .map_err(|e| ScanError::Network(e.to_string()))?;

        response
            .json()
            .await
            .map_err(|e| ScanError::MalformedResponse(e.to_string()))
    }
}

#[derive(Default)]
struct StoredProfile {
    user: UserRecord,
    history: Vec<HistoryEntry>,
}

/// In-memory user directory (for testing and offline runs)
#[derive(Default)]
pub struct MemoryUserDirectory {
    profiles: Mutex<HashMap<String, StoredProfile>>,
}

impl MemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a document exists for the uid.
    pub fn contains(&self, uid: &str) -> bool {
        self.profiles.lock().unwrap().contains_key(uid)
    }
}

#[async_trait]
impl UserDirectory for MemoryUserDirectory {
    async fn ensure_profile(&self, user: &UserRecord) -> Result<()> {
        let mut profiles = self.profiles.lock().unwrap();
        profiles
            .entry(user.uid.clone())
            .or_insert_with(|| StoredProfile {
                user: user.clone(),
                history: Vec::new(),
            });
        Ok(())
    }

    async fn create_profile(&self, user: &UserRecord) -> Result<()> {
        let mut profiles = self.profiles.lock().unwrap();
        profiles.insert(
            user.uid.clone(),
            StoredProfile {
                user: user.clone(),
                history: Vec::new(),
            },
        );
        Ok(())
    }

    async fn upsert_profile(&self, user: &UserRecord) -> Result<()> {
        let mut profiles = self.profiles.lock().unwrap();
        let profile = profiles.entry(user.uid.clone()).or_default();
        profile.user = user.clone();
        Ok(())
    }

    async fn append_history(&self, uid: &str, entry: HistoryEntry) -> Result<()> {
        let mut profiles = self.profiles.lock().unwrap();
        let profile = profiles.entry(uid.to_string()).or_default();
        profile.history.push(entry);
        Ok(())
    }

    async fn history(&self, uid: &str) -> Result<Vec<HistoryEntry>> {
        let profiles = self.profiles.lock().unwrap();
        Ok(profiles
            .get(uid)
            .map(|p| p.history.clone())
            .unwrap_or_default())
    }
}
