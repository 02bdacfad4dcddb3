// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Oralscan CLI: oral disease screening from the command line

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use oralscan::config::AppConfig;
use oralscan::db::LocalStore;
use oralscan::history::HistoryStore;
use oralscan::identity::Identity;
use oralscan::identity_store::IdentityStore;
use oralscan::inference::{HttpInferenceClient, ImageRef};
use oralscan::provider::{HttpIdentityProvider, IdentityProvider};
use oralscan::session::SessionManager;
use oralscan::users::{HttpUserDirectory, UserDirectory};
use oralscan::workflow::{AttemptStatus, DetectionWorkflow, FailReason};
use oralscan::{Result, ScanError};

/// Oralscan CLI - Oral disease screening
#[derive(Parser, Debug)]
#[command(name = "oralscan")]
#[command(author = "Jonathan D. A. Jewell <hyperpolymath>")]
#[command(version = "1.0.0")]
#[command(about = "Oral disease screening: sessions, detection, history", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (JSON format)
    #[arg(short, long, default_value = "config.json", global = true)]
    config: PathBuf,

    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable trace logging (most verbose)
    #[arg(long, global = true)]
    trace: bool,

    /// Suppress non-essential output (quiet mode)
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Analyze an oral-cavity image and show the detected conditions
    Scan {
        /// Image to analyze (JPEG)
        image: PathBuf,

        /// Write the detection overlay image here, if the service returns one
        #[arg(long)]
        overlay: Option<PathBuf>,
    },

    /// Session operations
    Auth {
        #[command(subcommand)]
        action: AuthCommands,
    },

    /// Detection history
    History {
        #[command(subcommand)]
        action: HistoryCommands,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },

    /// Show service and session status
    Status,
}

#[derive(Subcommand, Debug)]
enum AuthCommands {
    /// Sign in with email and password
    SignIn {
        email: String,
        password: String,
    },

    /// Create an account
    SignUp {
        email: String,
        password: String,
        /// Display name for the new account
        #[arg(long)]
        name: String,
    },

    /// Continue as an anonymous guest
    Guest,

    /// Sign in through the federated provider
    External,

    /// Sign out and clear the local session
    SignOut,

    /// Show the current identity
    Status,
}

#[derive(Subcommand, Debug)]
enum HistoryCommands {
    /// List recent detections (newest first)
    List {
        /// Number of entries to show
        #[arg(long, default_value = "10")]
        count: usize,
    },

    /// Clear the locally stored guest history
    Clear,
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Generate default configuration file
    Generate {
        /// Output file path
        #[arg(short, long, default_value = "config.json")]
        output: PathBuf,
    },

    /// Validate configuration file
    Validate,
}

struct App {
    config: AppConfig,
    session: SessionManager,
    history: HistoryStore,
}

async fn build_app(config: AppConfig) -> Result<App> {
    let local = LocalStore::open(&config.database.path)?;
    let store = IdentityStore::new(local.clone());

    let provider: Arc<dyn IdentityProvider> =
        Arc::new(HttpIdentityProvider::new(&config.accounts, store.clone()));
    let directory: Arc<dyn UserDirectory> = Arc::new(HttpUserDirectory::new(&config.accounts));

    let session = SessionManager::new(provider, directory.clone(), store);
    session.initialize().await;

    let history = HistoryStore::new(directory, local);

    Ok(App {
        config,
        session,
        history,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    // Load configuration
    let config = AppConfig::load(&cli.config)?;

    match cli.command {
        Commands::Scan { image, overlay } => run_scan(config, image, overlay).await,
        Commands::Auth { action } => run_auth_command(config, action).await,
        Commands::History { action } => run_history_command(config, action).await,
        Commands::Config { action } => run_config_command(config, action, &cli.config).await,
        Commands::Status => run_status(config).await,
    }
}

/// Run one detection attempt end to end
async fn run_scan(config: AppConfig, image: PathBuf, overlay_out: Option<PathBuf>) -> Result<()> {
    if !image.exists() {
        return Err(ScanError::Validation(format!(
            "Image not found: {}",
            image.display()
        )));
    }

    let app = build_app(config).await?;

    let timeout = Duration::from_secs(app.config.inference.timeout_secs);
    let inference = Arc::new(HttpInferenceClient::new(&app.config.inference.url, timeout));
    let workflow = DetectionWorkflow::new(
        inference,
        app.history.clone(),
        app.session.subscribe(),
        timeout,
    );

    info!("Analyzing: {:?}", image);
    workflow
        .pick_from_library(ImageRef::new(image.to_string_lossy()))
        .await?;

    let attempt = workflow.attempt();
    match attempt.status {
        AttemptStatus::Ready => {
            println!("{}", attempt.summary);

            for detection in &attempt.detections {
                println!();
                println!(
                    "{} ({:.1}%)",
                    detection.class_name,
                    detection.confidence * 100.0
                );
                println!("  Treatment: {}", detection.treatment);
                println!("  Recommendation: {}", detection.recommendation);
                println!("  Prevention: {}", detection.prevention);
                println!("  Source: {}", detection.source);
            }

            if let Some(out) = overlay_out {
                match attempt.overlay {
                    Some(bytes) => {
                        std::fs::write(&out, bytes)?;
                        println!("\nOverlay written to {:?}", out);
                    }
                    None => println!("\nNo overlay in the service reply"),
                }
            }
        }
        AttemptStatus::Failed(FailReason::NetworkError) => {
            return Err(ScanError::Network(
                "Could not reach the inference service".to_string(),
            ))
        }
        AttemptStatus::Failed(FailReason::MalformedResponse) => {
            return Err(ScanError::MalformedResponse(
                "The inference service sent an unusable reply".to_string(),
            ))
        }
        status => {
            return Err(ScanError::InvalidState(format!(
                "Attempt ended in unexpected state {:?}",
                status
            )))
        }
    }

    // Let the history append land before the process exits
    workflow.flush_appends().await;
    if let Some(mut notices) = workflow.take_notices() {
        while let Ok(notice) = notices.try_recv() {
            warn!("{:?}", notice);
        }
    }

    Ok(())
}

/// Run session commands
async fn run_auth_command(config: AppConfig, action: AuthCommands) -> Result<()> {
    let app = build_app(config).await?;

    match action {
        AuthCommands::SignIn { email, password } => {
            let user = app.session.sign_in_with_email(&email, &password).await?;
            println!("Signed in as {} <{}>", user.display_name, user.email);
        }
        AuthCommands::SignUp {
            email,
            password,
            name,
        } => {
            let user = app.session.sign_up_with_email(&email, &password, &name).await?;
            println!("Account created for {} <{}>", user.display_name, user.email);
        }
        AuthCommands::Guest => {
            app.session.continue_as_guest().await;
            println!("Continuing as guest. Detections will be stored on this device only.");
        }
        AuthCommands::External => {
            let user = app.session.sign_in_with_external_provider().await?;
            println!("Signed in as {} <{}>", user.display_name, user.email);
        }
        AuthCommands::SignOut => {
            app.session.sign_out().await;
            println!("Signed out");
        }
        AuthCommands::Status => match app.session.identity() {
            Identity::SignedOut => println!("Not signed in"),
            Identity::Guest => println!("Guest session (device-local history)"),
            Identity::Authenticated(user) => {
                println!("Signed in as {} <{}>", user.display_name, user.email)
            }
        },
    }

    Ok(())
}

/// Run history commands
async fn run_history_command(config: AppConfig, action: HistoryCommands) -> Result<()> {
    let app = build_app(config).await?;

    match action {
        HistoryCommands::List { count } => {
            let identity = app.session.identity();
            if !identity.is_logged_in() {
                println!("Sign in or continue as guest to keep a detection history.");
                return Ok(());
            }

            let entries = app.history.recent(&identity, count).await?;
            println!("Recent detections ({} entries):", entries.len());
            for entry in entries {
                println!(
                    "  {} {} ({:.1}%) {}",
                    entry.date,
                    entry.disease,
                    entry.confidence * 100.0,
                    entry.image
                );
            }
        }
        HistoryCommands::Clear => {
            app.history.clear_local()?;
            println!("Guest history cleared");
        }
    }

    Ok(())
}

/// Run config commands
async fn run_config_command(
    config: AppConfig,
    action: ConfigCommands,
    config_path: &Path,
) -> Result<()> {
    match action {
        ConfigCommands::Show => {
            let json = serde_json::to_string_pretty(&config)?;
            println!("{}", json);
        }
        ConfigCommands::Generate { output } => {
            let default_config = AppConfig::default();
            default_config.save(&output)?;
            println!("Generated config at {:?}", output);
        }
        ConfigCommands::Validate => {
            println!("Configuration at {:?} is valid", config_path);
            println!("  Inference endpoint: {}", config.inference.url);
            println!("  Account service: {}", config.accounts.url);
            println!(
                "  External sign-in: {}",
                if config.accounts.external_auth_url.is_some() {
                    "available"
                } else {
                    "unavailable"
                }
            );
            println!("  Database: {}", config.database.path);
        }
    }

    Ok(())
}

/// Run status check
async fn run_status(config: AppConfig) -> Result<()> {
    println!("Oralscan v1.0.0 Status");
    println!("======================");

    let timeout = Duration::from_secs(config.inference.timeout_secs);
    let inference = HttpInferenceClient::new(&config.inference.url, timeout);
    match inference.health_check().await {
        Ok(()) => println!("Inference service: reachable"),
        Err(e) => println!("Inference service: error - {}", e),
    }

    match build_app(config.clone()).await {
        Ok(app) => {
            match app.session.identity() {
                Identity::SignedOut => println!("Session: not signed in"),
                Identity::Guest => println!("Session: guest"),
                Identity::Authenticated(user) => {
                    println!("Session: {} <{}>", user.display_name, user.email)
                }
            }
            println!("Database: {}", app.config.database.path);
        }
        Err(e) => println!("Local storage: error - {}", e),
    }

    println!("\nConfiguration:");
    println!("  Inference endpoint: {}", config.inference.url);
    println!("  Account service: {}", config.accounts.url);

    Ok(())
}
