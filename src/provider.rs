// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Identity provider boundary
//!
//! Credential-based sign-in/sign-up/sign-out plus a federated-credential
//! exchange, behind a capability trait so the session layer never touches
//! the wire directly.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::AccountsConfig;
use crate::error::AuthError;
use crate::identity::UserRecord;
use crate::identity_store::IdentityStore;

/// External identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Resolve the cached credential from the last session, if any.
    /// May take arbitrarily long; callers must await it before committing
    /// to an unauthenticated verdict.
    async fn restore_session(&self) -> Option<UserRecord>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<UserRecord, AuthError>;

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Result<UserRecord, AuthError>;

    /// Whether the platform advertises federated sign-in support.
    fn external_available(&self) -> bool;

    /// Federated-credential exchange. Only called when
    /// [`external_available`](Self::external_available) is true.
    async fn sign_in_external(&self) -> Result<UserRecord, AuthError>;

    async fn sign_out(&self) -> Result<(), AuthError>;
}

#[derive(Serialize)]
struct CredentialRequest<'a> {
    email: &'a str,
    password: &'a str,
    #[serde(rename = "displayName", skip_serializing_if = "Option::is_none")]
    display_name: Option<&'a str>,
}

#[derive(Deserialize)]
struct ErrorReply {
    error: String,
}

/// HTTP identity provider client
pub struct HttpIdentityProvider {
    client: Client,
    base_url: String,
    external_auth_url: Option<String>,
    store: IdentityStore,
}

impl HttpIdentityProvider {
    /// Create a new provider client
    pub fn new(config: &AccountsConfig, store: IdentityStore) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        let base_url = config.url.trim_end_matches('/').to_string();

        Self {
            client,
            base_url,
            external_auth_url: config.external_auth_url.clone(),
            store,
        }
    }

    async fn post_credentials(
        &self,
        path: &str,
        request: &CredentialRequest<'_>,
    ) -> Result<UserRecord, AuthError> {
        let url = format!("{}/{}", self.base_url, path);
        debug!("Account request: {}", path);

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let code = response
                .json::<ErrorReply>()
                .await
                .map(|r| r.error)
                .unwrap_or_default();
            return Err(map_error_code(&code));
        }

        let user: UserRecord = response
            .json()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        if let Err(e) = self.store.set_cached_user(&user).await {
            warn!("Failed to cache credential: {}", e);
        }

        Ok(user)
    }
}

/// Map account-service error codes onto the auth taxonomy.
fn map_error_code(code: &str) -> AuthError {
    match code {
        "user-not-found" => AuthError::AccountNotFound,
        "wrong-password" | "invalid-credential" => AuthError::InvalidCredentials,
        "user-disabled" => AuthError::AccountDisabled,
        "too-many-requests" => AuthError::TooManyAttempts,
        "email-already-in-use" => AuthError::EmailInUse,
        "invalid-email" => AuthError::InvalidEmail,
        "operation-not-allowed" => AuthError::SignupDisabled,
        other => AuthError::Network(format!("Account service rejected request: {}", other)),
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn restore_session(&self) -> Option<UserRecord> {
        self.store.cached_user().await
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<UserRecord, AuthError> {
        let request = CredentialRequest {
            email,
            password,
            display_name: None,
        };
        self.post_credentials("sign-in", &request).await
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Result<UserRecord, AuthError> {
        let request = CredentialRequest {
            email,
            password,
            display_name: Some(display_name),
        };
        self.post_credentials("sign-up", &request).await
    }

    fn external_available(&self) -> bool {
        self.external_auth_url.is_some()
    }

    async fn sign_in_external(&self) -> Result<UserRecord, AuthError> {
        let url = self
            .external_auth_url
            .as_deref()
            .ok_or(AuthError::ProviderUnavailable)?;

        debug!("Federated credential exchange");

        let response = self
            .client
            .post(url)
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let code = response
                .json::<ErrorReply>()
                .await
                .map(|r| r.error)
                .unwrap_or_default();
            return Err(map_error_code(&code));
        }

        let user: UserRecord = response
            .json()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        if let Err(e) = self.store.set_cached_user(&user).await {
            warn!("Failed to cache credential: {}", e);
        }

        Ok(user)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        if let Err(e) = self.store.clear_cached_user().await {
            warn!("Failed to clear cached credential: {}", e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_map_to_taxonomy() {
        assert_eq!(map_error_code("user-not-found"), AuthError::AccountNotFound);
        assert_eq!(map_error_code("wrong-password"), AuthError::InvalidCredentials);
        assert_eq!(map_error_code("user-disabled"), AuthError::AccountDisabled);
        assert_eq!(map_error_code("too-many-requests"), AuthError::TooManyAttempts);
        assert_eq!(map_error_code("email-already-in-use"), AuthError::EmailInUse);
        assert_eq!(map_error_code("invalid-email"), AuthError::InvalidEmail);
        assert_eq!(map_error_code("operation-not-allowed"), AuthError::SignupDisabled);
        assert!(matches!(map_error_code("???"), AuthError::Network(_)));
    }

    #[tokio::test]
    async fn external_unavailable_without_exchange_endpoint() {
        let store = IdentityStore::new(crate::db::LocalStore::in_memory().unwrap());
        let provider = HttpIdentityProvider::new(&AccountsConfig::default(), store);
        assert!(!provider.external_available());
        assert_eq!(
            provider.sign_in_external().await.unwrap_err(),
            AuthError::ProviderUnavailable
        );
    }
}
