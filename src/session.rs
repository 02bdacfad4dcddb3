// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Session management
//!
//! Single writer of the process-wide [`Identity`]. Startup reconciles two
//! independent async sources (the provider's cached credential and the
//! persisted guest flag); an authenticated verdict always wins over a stale
//! guest flag. Observers subscribe to the watch channel; they never mutate.

use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::history::HistoryStore;
use crate::identity::{Identity, SessionState, UserRecord};
use crate::identity_store::IdentityStore;
use crate::provider::IdentityProvider;
use crate::users::UserDirectory;
use crate::{AuthError, Result, ScanError};

pub struct SessionManager {
    provider: Arc<dyn IdentityProvider>,
    directory: Arc<dyn UserDirectory>,
    store: IdentityStore,
    state: watch::Sender<SessionState>,
}

impl SessionManager {
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        directory: Arc<dyn UserDirectory>,
        store: IdentityStore,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Initializing);
        Self {
            provider,
            directory,
            store,
            state,
        }
    }

    /// Observe session state changes.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// The current identity. Signed-out while still initializing.
    pub fn identity(&self) -> Identity {
        self.state
            .borrow()
            .identity()
            .cloned()
            .unwrap_or(Identity::SignedOut)
    }

    /// Resolve the initial identity. Both sources are read concurrently,
    /// but no verdict is committed before the provider has answered.
    pub async fn initialize(&self) {
        let (restored, guest_flag) =
            tokio::join!(self.provider.restore_session(), self.store.guest_flag());

        let identity = match restored {
            Some(user) => {
                info!("Restored session for {}", user.uid);
                self.clear_guest_flag().await;
                Identity::Authenticated(user)
            }
            None if guest_flag => Identity::Guest,
            None => Identity::SignedOut,
        };

        self.state.send_replace(SessionState::Resolved(identity));
    }

    pub async fn sign_in_with_email(&self, email: &str, password: &str) -> Result<UserRecord> {
        if email.trim().is_empty() || password.is_empty() {
            return Err(ScanError::Validation(
                "Please fill in all fields".to_string(),
            ));
        }

        let user = self.provider.sign_in(email, password).await?;
        self.directory.ensure_profile(&user).await?;
        self.clear_guest_flag().await;
        self.state
            .send_replace(SessionState::Resolved(Identity::Authenticated(user.clone())));
        Ok(user)
    }

    pub async fn sign_up_with_email(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Result<UserRecord> {
        if email.trim().is_empty() || password.is_empty() || display_name.trim().is_empty() {
            return Err(ScanError::Validation(
                "Please fill in all fields".to_string(),
            ));
        }
        if password.chars().count() < 6 {
            return Err(AuthError::WeakPassword.into());
        }

        let user = self.provider.sign_up(email, password, display_name).await?;
        self.directory.create_profile(&user).await?;
        self.clear_guest_flag().await;
        self.state
            .send_replace(SessionState::Resolved(Identity::Authenticated(user.clone())));
        Ok(user)
    }

    pub async fn sign_in_with_external_provider(&self) -> Result<UserRecord> {
        if !self.provider.external_available() {
            return Err(AuthError::ProviderUnavailable.into());
        }

        let user = self.provider.sign_in_external().await?;
        self.directory.upsert_profile(&user).await?;
        self.clear_guest_flag().await;
        self.state
            .send_replace(SessionState::Resolved(Identity::Authenticated(user.clone())));
        Ok(user)
    }

    /// Start an anonymous local-only session. A storage failure is logged
    /// and the session still becomes a guest session for this process.
    pub async fn continue_as_guest(&self) {
        if let Err(e) = self.store.set_guest_flag(true).await {
            warn!("Failed to persist guest session: {}", e);
        }
        self.state
            .send_replace(SessionState::Resolved(Identity::Guest));
    }

    pub async fn sign_out(&self) {
        if let Err(e) = self.provider.sign_out().await {
            warn!("Provider sign-out failed: {}", e);
        }
        self.clear_guest_flag().await;
        self.state
            .send_replace(SessionState::Resolved(Identity::SignedOut));
    }

    /// Sign out and wipe the guest history as well.
    pub async fn clear_all_sessions(&self, history: &HistoryStore) -> Result<()> {
        self.sign_out().await;
        history.clear_local()
    }

    async fn clear_guest_flag(&self) {
        if let Err(e) = self.store.set_guest_flag(false).await {
            warn!("Failed to clear guest session flag: {}", e);
        }
    }
}
