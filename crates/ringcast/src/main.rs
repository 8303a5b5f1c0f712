// SPDX-FileCopyrightText: 2026 Ringcast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ringcast - real-time story, like and comment fan-out.
//!
//! This is the binary entry point: it runs the event channel gateway and
//! offers a couple of operator helpers around it.

mod serve;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use ringcast_config::{ConfigError, RingcastConfig};
use ringcast_core::{RingcastError, UserId};
use ringcast_gateway::auth::TokenSigner;

/// Ringcast - real-time story, like and comment fan-out.
#[derive(Parser, Debug)]
#[command(name = "ringcast", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the XDG hierarchy.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the event channel gateway until SIGINT or SIGTERM.
    Serve,
    /// Mint a connection token for a user.
    Token {
        /// The user the token authenticates.
        user_id: String,
    },
    /// Load and validate configuration, then print the effective settings.
    CheckConfig {
        /// Also open the view-state database to check it is usable.
        #[arg(long)]
        storage: bool,
    },
}

fn load(path: Option<&std::path::Path>) -> Result<RingcastConfig, Vec<ConfigError>> {
    match path {
        Some(path) => ringcast_config::load_and_validate_path(path),
        None => ringcast_config::load_and_validate(),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(errors) => {
            ringcast_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Serve => serve::run_serve(config).await,
        Commands::Token { user_id } => {
            mint_token(&config, &user_id).map(|token| println!("{token}"))
        }
        Commands::CheckConfig { storage } => check_config(&config, storage),
    };

    if let Err(e) = result {
        eprintln!("ringcast: {e}");
        std::process::exit(1);
    }
}

fn mint_token(config: &RingcastConfig, user_id: &str) -> Result<String, RingcastError> {
    if user_id.trim().is_empty() {
        return Err(RingcastError::Precondition("user id must not be empty".into()));
    }
    let secret = serve::require_secret(config)?;
    TokenSigner::new(secret).issue(&UserId::new(user_id))
}

fn check_config(config: &RingcastConfig, open_storage: bool) -> Result<(), RingcastError> {
    println!("server:  {}:{}", config.server.host, config.server.port);
    println!("queue:   {} frames per connection", config.server.connection_queue);
    println!(
        "auth:    token secret {}, publish endpoint {}",
        if config.auth.token_secret.is_some() { "set" } else { "MISSING" },
        if config.auth.service_token.is_some() { "enabled" } else { "disabled" },
    );
    println!(
        "sync:    poll every {}s, stories live {}h, {} comments per page",
        config.sync.poll_interval_secs, config.sync.story_ttl_hours, config.sync.comment_page_size,
    );
    println!("storage: {}", config.storage.view_state_path);
    if open_storage {
        ringcast_storage::SqliteStorage::open(&config.storage.view_state_path)?;
        println!("storage: ok");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_secret(secret: Option<&str>) -> RingcastConfig {
        let mut config = RingcastConfig::default();
        config.auth.token_secret = secret.map(str::to_string);
        config
    }

    #[test]
    fn cli_parses_token_subcommand() {
        let cli = Cli::try_parse_from(["ringcast", "token", "alice"]).unwrap();
        assert!(matches!(cli.command, Commands::Token { user_id } if user_id == "alice"));
    }

    #[test]
    fn cli_accepts_global_config_flag() {
        let cli =
            Cli::try_parse_from(["ringcast", "check-config", "--config", "/tmp/r.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/r.toml")));
        assert!(matches!(cli.command, Commands::CheckConfig { storage: false }));
    }

    #[test]
    fn cli_requires_a_subcommand() {
        assert!(Cli::try_parse_from(["ringcast"]).is_err());
    }

    #[test]
    fn minted_token_verifies_with_same_secret() {
        let config = config_with_secret(Some("0123456789abcdef-secret"));
        let token = mint_token(&config, "alice").unwrap();
        let signer = TokenSigner::new("0123456789abcdef-secret");
        assert_eq!(signer.verify(&token).unwrap(), UserId::new("alice"));
    }

    #[test]
    fn minting_without_secret_is_a_config_error() {
        let err = mint_token(&config_with_secret(None), "alice").unwrap_err();
        assert!(matches!(err, RingcastError::Config(_)));
    }

    #[test]
    fn minting_for_blank_user_is_refused() {
        let config = config_with_secret(Some("0123456789abcdef-secret"));
        assert!(mint_token(&config, "  ").is_err());
    }

    #[test]
    fn check_config_opens_view_state_storage() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = RingcastConfig::default();
        config.storage.view_state_path = dir
            .path()
            .join("nested")
            .join("view-state.db")
            .display()
            .to_string();
        check_config(&config, true).unwrap();
        assert!(dir.path().join("nested").join("view-state.db").exists());
    }
}
