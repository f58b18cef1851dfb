//! Command-line interface definition for Loopauth
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands to obtain a token, print the consent URL, and forget
//! the stored refresh token.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Loopauth - OAuth2 access tokens for installed applications
///
/// Reuses a stored refresh token when possible and otherwise walks the user
/// through the provider's consent page with a loopback redirect.
#[derive(Parser, Debug, Clone)]
#[command(name = "loopauth")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, default_value = "loopauth.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// OAuth client id (overrides config and environment)
    #[arg(long, global = true)]
    pub client_id: Option<String>,

    /// OAuth client secret (overrides config and environment)
    #[arg(long, global = true)]
    pub client_secret: Option<String>,

    /// Provider-issued client_secret.json to read credentials from
    #[arg(long, global = true)]
    pub client_secret_file: Option<PathBuf>,

    /// Loopback redirect port (0 picks a free port)
    #[arg(long, global = true)]
    pub port: Option<u16>,

    /// Refresh token file path
    #[arg(long, global = true)]
    pub token_path: Option<PathBuf>,

    /// Seconds to wait for the browser redirect (0 waits indefinitely)
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// Print the consent URL instead of launching a browser
    #[arg(long, global = true)]
    pub no_browser: bool,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for Loopauth
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Obtain an access token and print it to stdout
    Token {
        /// Scope to request; repeat for several scopes
        #[arg(short, long = "scope", required = true)]
        scopes: Vec<String>,
    },

    /// Print the consent URL for the configured redirect
    Url {
        /// Scope to request; repeat for several scopes
        #[arg(short, long = "scope", required = true)]
        scopes: Vec<String>,
    },

    /// Delete the stored refresh token
    Forget,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            config: Some("loopauth.yaml".to_string()),
            verbose: false,
            client_id: None,
            client_secret: None,
            client_secret_file: None,
            port: None,
            token_path: None,
            timeout: None,
            no_browser: false,
            command: Commands::Forget,
        }
    }
}
