// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Configuration management for Oralscan

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main application configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    /// Inference service settings
    pub inference: InferenceConfig,

    /// Account service settings
    #[serde(default)]
    pub accounts: AccountsConfig,

    /// Local storage settings
    #[serde(default)]
    pub database: DatabaseConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct InferenceConfig {
    /// Full URL of the predict endpoint
    pub url: String,
    #[serde(default = "default_inference_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AccountsConfig {
    /// Base URL of the identity/account service
    #[serde(default = "default_accounts_url")]
    pub url: String,

    /// Federated-credential exchange endpoint. Absent means the platform
    /// does not advertise external sign-in support.
    #[serde(default)]
    pub external_auth_url: Option<String>,

    #[serde(default = "default_accounts_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

// Default value functions
fn default_inference_timeout() -> u64 { 60 }
fn default_accounts_timeout() -> u64 { 30 }
fn default_accounts_url() -> String { "http://127.0.0.1:8600".to_string() }
fn default_db_path() -> String { "oralscan.db".to_string() }

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            inference: InferenceConfig {
                url: "http://127.0.0.1:5000/predict".to_string(),
                timeout_secs: default_inference_timeout(),
            },
            accounts: AccountsConfig::default(),
            database: DatabaseConfig::default(),
        }
    }
}

impl Default for AccountsConfig {
    fn default() -> Self {
        Self {
            url: default_accounts_url(),
            external_auth_url: None,
            timeout_secs: default_accounts_timeout(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> crate::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = serde_json::from_str(&content)
                .map_err(|e| crate::ScanError::Config(format!("Failed to parse config: {}", e)))?;
            Ok(config)
        } else {
            tracing::info!("Config file not found at {:?}, using defaults", path);
            Ok(Self::default())
        }
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: &Path) -> crate::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = AppConfig::load(Path::new("/nonexistent/oralscan.json")).unwrap();
        assert_eq!(config.inference.url, "http://127.0.0.1:5000/predict");
        assert!(config.accounts.external_auth_url.is_none());
    }

    #[test]
    fn round_trips_through_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = AppConfig::default();
        config.inference.timeout_secs = 15;
        config.accounts.external_auth_url = Some("http://127.0.0.1:8600/oauth".to_string());
        config.save(&path).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded.inference.timeout_secs, 15);
        assert_eq!(
            loaded.accounts.external_auth_url.as_deref(),
            Some("http://127.0.0.1:8600/oauth")
        );
    }
}
