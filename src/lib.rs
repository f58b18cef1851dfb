//! Loopauth - OAuth2 access tokens for installed applications
//!
//! This library performs the OAuth2 authorization code grant for a desktop
//! or command-line application: it sends the user's browser to the
//! provider's consent page, catches the redirect on a loopback port,
//! exchanges the code for tokens, and keeps the refresh token in a local
//! file so later runs skip the consent page.
//!
//! # Architecture
//!
//! - `auth`: the flow itself (encoding, listener, token client, store,
//!   browser launch, manager)
//! - `config`: configuration management and validation
//! - `error`: error types and result aliases
//! - `cli`: command-line interface definition
//!
//! # Example
//!
//! ```no_run
//! use loopauth::auth::manager::AuthManager;
//! use loopauth::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("loopauth.yaml", &Default::default())?;
//!     config.validate()?;
//!
//!     let manager = AuthManager::from_config(&config)?;
//!     let token = manager
//!         .get_access_token(&["https://www.googleapis.com/auth/drive.readonly"])
//!         .await?;
//!     println!("{token}");
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod cli;
pub mod config;
pub mod error;

// Re-export commonly used types
pub use auth::client::{ClientCredentials, Endpoints, TokenClient, TokenResponse};
pub use auth::manager::{AccessGrant, AuthManager, FlowSettings, GrantSource};
pub use auth::token_store::RefreshTokenStore;
pub use config::Config;
pub use error::{AuthResult, LoopauthError, Result};
