// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Error types for Oralscan

use thiserror::Error;

/// Result type alias for Oralscan operations
pub type Result<T> = std::result::Result<T, ScanError>;

/// Authentication failures surfaced by the identity provider.
///
/// Display strings are the user-facing messages; callers show them verbatim.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Incorrect password. Please try again.")]
    InvalidCredentials,

    #[error("No account found with this email. Please sign up first.")]
    AccountNotFound,

    #[error("This account has been disabled.")]
    AccountDisabled,

    #[error("Too many failed attempts. Please try again later.")]
    TooManyAttempts,

    #[error("An account with this email already exists. Please sign in instead.")]
    EmailInUse,

    #[error("Please enter a valid email address.")]
    InvalidEmail,

    #[error("Email/password accounts are not enabled.")]
    SignupDisabled,

    #[error("Password should be at least 6 characters long.")]
    WeakPassword,

    #[error("External sign-in is not available on this platform.")]
    ProviderUnavailable,

    #[error("Sign-in failed: {0}")]
    Network(String),
}

/// Oralscan error types
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("API error: {0}")]
    Api(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("File system error: {0}")]
    FileSystem(#[from] std::io::Error),
}
