//! Loopauth - OAuth2 access tokens for installed applications
//!
#![doc = "Loopauth - OAuth2 access tokens for installed applications"]
#![doc = "Main entry point for the loopauth binary."]

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use loopauth::auth::manager::AuthManager;
use loopauth::auth::token_store::RefreshTokenStore;
use loopauth::cli::{Cli, Commands};
use loopauth::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    init_tracing(cli.verbose);

    let config_path = cli.config.as_deref().unwrap_or("loopauth.yaml");
    let config = Config::load(config_path, &cli)?;

    match &cli.command {
        Commands::Token { scopes } => {
            config.validate()?;
            let manager = AuthManager::from_config(&config)?;

            let cancel = CancellationToken::new();
            let on_interrupt = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("Interrupted, aborting authorization");
                    on_interrupt.cancel();
                }
            });

            let grant = manager
                .acquire_cancellable(scopes.as_slice(), &cancel)
                .await?;
            if let Some(e) = &grant.persist_error {
                eprintln!("warning: refresh token was not saved: {e}");
            }
            println!("{}", grant.access_token);
            Ok(())
        }
        Commands::Url { scopes } => {
            config.validate()?;
            let manager = AuthManager::from_config(&config)?;
            if config.redirect.port == 0 {
                tracing::warn!("Port 0 is resolved only when the listener binds; URL uses port 0");
            }
            println!("{}", manager.authorization_url(scopes.as_slice()));
            Ok(())
        }
        Commands::Forget => {
            let store = RefreshTokenStore::new(config.storage.refresh_token_path.clone());
            if store.clear().await? {
                tracing::info!("Removed {}", store.path().display());
            } else {
                tracing::info!("No stored refresh token at {}", store.path().display());
            }
            Ok(())
        }
    }
}

/// Initialize tracing subscriber with environment filter
///
/// Logs go to stderr; stdout carries only command output.
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "loopauth=debug" } else { "loopauth=info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
