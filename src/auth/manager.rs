//! End-to-end access token acquisition
//!
//! [`AuthManager::get_access_token`] resolves a token in this order:
//!
//! 1. Load the stored refresh token and exchange it. Any failure on this
//!    path (missing file, unreadable file, revoked or expired token, network
//!    error) falls through to step 2 instead of failing the call.
//! 2. Bind the loopback listener, build the consent URL for the bound port,
//!    launch the browser and wait for the redirect concurrently, exchange
//!    the code, and persist the new refresh token.
//!
//! Errors from step 2 are terminal and surface as
//! [`LoopauthError::Authorization`]. A failure to persist the refresh token
//! does not discard the access token already obtained; it is logged and
//! reported in [`AccessGrant::persist_error`].

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::auth::browser::{BrowserLauncher, LaunchOutcome, PrintOnly, SystemBrowser};
use crate::auth::callback::{CallbackListener, CallbackQuery};
use crate::auth::client::{TokenClient, TokenResponse};
use crate::auth::token_store::RefreshTokenStore;
use crate::config::Config;
use crate::error::{AuthResult, LoopauthError, Result};

/// How long the browser launcher may keep running after the redirect has
/// been captured before it is abandoned.
const LAUNCHER_GRACE: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// FlowSettings
// ---------------------------------------------------------------------------

/// Redirect and wait parameters for the interactive path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowSettings {
    /// Host name used in the redirect URI. The listener always binds
    /// `127.0.0.1`.
    pub redirect_host: String,

    /// Loopback port. `0` binds a free port and the redirect URI follows it.
    pub redirect_port: u16,

    /// Deadline for the browser redirect. `None` waits indefinitely.
    pub callback_timeout: Option<Duration>,
}

impl Default for FlowSettings {
    fn default() -> Self {
        Self {
            redirect_host: "localhost".to_string(),
            redirect_port: 8080,
            callback_timeout: Some(Duration::from_secs(300)),
        }
    }
}

impl FlowSettings {
    /// The redirect URI for `port`, e.g. `http://localhost:8080`.
    ///
    /// # Examples
    ///
    /// ```
    /// use loopauth::auth::manager::FlowSettings;
    ///
    /// let settings = FlowSettings::default();
    /// assert_eq!(settings.redirect_uri(8080), "http://localhost:8080");
    /// ```
    pub fn redirect_uri(&self, port: u16) -> String {
        format!("http://{}:{}", self.redirect_host, port)
    }
}

// ---------------------------------------------------------------------------
// AccessGrant
// ---------------------------------------------------------------------------

/// Which path produced the access token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantSource {
    /// The stored refresh token was accepted.
    CachedRefreshToken,
    /// The user went through the consent page.
    Interactive,
}

/// An access token plus how it was obtained.
#[derive(Debug)]
pub struct AccessGrant {
    /// The bearer access token.
    pub access_token: String,
    /// Which path produced it.
    pub source: GrantSource,
    /// Set when a newly issued refresh token could not be written.
    pub persist_error: Option<LoopauthError>,
}

// ---------------------------------------------------------------------------
// AuthManager
// ---------------------------------------------------------------------------

/// Drives the authorization code flow for one client.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use loopauth::auth::browser::SystemBrowser;
/// use loopauth::auth::client::{ClientCredentials, Endpoints, TokenClient};
/// use loopauth::auth::manager::{AuthManager, FlowSettings};
/// use loopauth::auth::token_store::RefreshTokenStore;
///
/// # async fn example() -> loopauth::error::AuthResult<()> {
/// let client = TokenClient::new(
///     Arc::new(reqwest::Client::new()),
///     ClientCredentials::new("client-id", "client-secret"),
///     Endpoints::google()?,
/// );
/// let manager = AuthManager::new(
///     client,
///     RefreshTokenStore::default(),
///     Arc::new(SystemBrowser::new()),
///     FlowSettings::default(),
/// );
/// let token = manager
///     .get_access_token(&["https://www.googleapis.com/auth/drive.readonly"])
///     .await?;
/// println!("{token}");
/// # Ok(())
/// # }
/// ```
pub struct AuthManager {
    client: TokenClient,
    store: RefreshTokenStore,
    browser: Arc<dyn BrowserLauncher>,
    settings: FlowSettings,
}

impl AuthManager {
    /// Creates a manager from its collaborators.
    pub fn new(
        client: TokenClient,
        store: RefreshTokenStore,
        browser: Arc<dyn BrowserLauncher>,
        settings: FlowSettings,
    ) -> Self {
        Self {
            client,
            store,
            browser,
            settings,
        }
    }

    /// Creates a manager from a validated [`Config`].
    ///
    /// # Errors
    ///
    /// Returns an error if the configured endpoint URLs do not parse or the
    /// HTTP client cannot be built.
    pub fn from_config(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("loopauth/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(LoopauthError::Http)?;
        let client = TokenClient::new(Arc::new(http), config.credentials(), config.endpoints()?);

        let browser: Arc<dyn BrowserLauncher> = if !config.browser.open {
            Arc::new(PrintOnly)
        } else if let Some(program) = &config.browser.command {
            Arc::new(SystemBrowser::with_program(program.clone()))
        } else {
            Arc::new(SystemBrowser::new())
        };

        Ok(Self::new(
            client,
            RefreshTokenStore::new(config.storage.refresh_token_path.clone()),
            browser,
            config.flow_settings(),
        ))
    }

    /// The refresh token store.
    pub fn store(&self) -> &RefreshTokenStore {
        &self.store
    }

    /// The consent URL for the configured port, without binding anything.
    pub fn authorization_url<S: AsRef<str>>(&self, scopes: &[S]) -> String {
        let redirect_uri = self.settings.redirect_uri(self.settings.redirect_port);
        self.client.build_authorization_url(scopes, &redirect_uri)
    }

    /// Returns an access token for `scopes`.
    ///
    /// # Errors
    ///
    /// Returns [`LoopauthError::Authorization`] wrapping the cause when the
    /// interactive path fails (port in use, bad redirect, timeout,
    /// cancellation, rejected code exchange).
    pub async fn get_access_token<S: AsRef<str>>(&self, scopes: &[S]) -> AuthResult<String> {
        self.acquire(scopes).await.map(|grant| grant.access_token)
    }

    /// Like [`get_access_token`](Self::get_access_token) but also reports
    /// which path produced the token and any persistence failure.
    pub async fn acquire<S: AsRef<str>>(&self, scopes: &[S]) -> AuthResult<AccessGrant> {
        self.acquire_cancellable(scopes, &CancellationToken::new()).await
    }

    /// Like [`acquire`](Self::acquire), but cancelling `cancel` aborts a
    /// pending callback wait with [`LoopauthError::Cancelled`].
    ///
    /// The token only governs this call. Later calls on the same manager
    /// are unaffected by it.
    pub async fn acquire_cancellable<S: AsRef<str>>(
        &self,
        scopes: &[S],
        cancel: &CancellationToken,
    ) -> AuthResult<AccessGrant> {
        if let Some(response) = self.try_cached_refresh().await {
            tracing::info!("access token obtained with stored refresh token");
            // Some providers rotate refresh tokens; keep the newest one.
            let persist_error = self.persist(&response).await;
            return Ok(AccessGrant {
                access_token: response.access_token,
                source: GrantSource::CachedRefreshToken,
                persist_error,
            });
        }

        let response = self
            .authorize_interactively(scopes, cancel)
            .await
            .map_err(LoopauthError::into_authorization)?;
        tracing::info!("access token obtained through interactive authorization");

        if response.usable_refresh_token().is_none() {
            tracing::warn!(
                "provider issued no refresh token; the next run will require consent again"
            );
        }
        let persist_error = self.persist(&response).await;

        Ok(AccessGrant {
            access_token: response.access_token,
            source: GrantSource::Interactive,
            persist_error,
        })
    }

    async fn try_cached_refresh(&self) -> Option<TokenResponse> {
        let refresh_token = match self.store.load().await {
            Ok(Some(token)) => token,
            Ok(None) => {
                tracing::info!(path = %self.store.path().display(), "no stored refresh token");
                return None;
            }
            Err(e) => {
                tracing::warn!("could not read stored refresh token: {e}");
                return None;
            }
        };

        match self.client.exchange_refresh_token(&refresh_token).await {
            Ok(response) => Some(response),
            Err(e) => {
                tracing::warn!(
                    "stored refresh token was not accepted, falling back to interactive authorization: {e}"
                );
                None
            }
        }
    }

    async fn authorize_interactively<S: AsRef<str>>(
        &self,
        scopes: &[S],
        cancel: &CancellationToken,
    ) -> AuthResult<TokenResponse> {
        // Bind before the browser navigates so the redirect cannot be refused.
        let listener = CallbackListener::bind(self.settings.redirect_port).await?;
        let redirect_uri = self.settings.redirect_uri(listener.port());
        let url = self.client.build_authorization_url(scopes, &redirect_uri);

        eprintln!("Open the following URL in your browser to authorize access:\n{url}");
        tracing::info!(port = listener.port(), "waiting for authorization redirect");

        let callback = self.launch_and_wait(listener, &url, cancel).await?;

        tracing::info!("authorization code received, exchanging for tokens");
        self.client
            .exchange_authorization_code(callback.code(), &redirect_uri)
            .await
    }

    /// Runs the browser launch and the callback wait concurrently.
    ///
    /// The callback result decides the outcome. The launcher's result is
    /// only logged. Once the wait has ended, successfully or not, the
    /// launcher gets [`LAUNCHER_GRACE`] to exit and is dropped (killed)
    /// after that.
    async fn launch_and_wait(
        &self,
        listener: CallbackListener,
        url: &str,
        cancel: &CancellationToken,
    ) -> AuthResult<CallbackQuery> {
        let launch = self.browser.launch(url);
        let wait = listener.wait_for_code(self.settings.callback_timeout, cancel);
        tokio::pin!(launch);
        tokio::pin!(wait);

        let mut launched = false;
        let callback = loop {
            tokio::select! {
                outcome = &mut launch, if !launched => {
                    report_launch(outcome);
                    launched = true;
                }
                result = &mut wait => break result,
            }
        };

        if !launched {
            match tokio::time::timeout(LAUNCHER_GRACE, &mut launch).await {
                Ok(outcome) => report_launch(outcome),
                Err(_) => tracing::debug!("browser launcher still running, abandoning it"),
            }
        }

        callback
    }

    async fn persist(&self, response: &TokenResponse) -> Option<LoopauthError> {
        let token = response.usable_refresh_token()?;
        match self.store.save(token).await {
            Ok(()) => None,
            Err(e) => {
                tracing::warn!("access token obtained but refresh token was not saved: {e}");
                Some(e)
            }
        }
    }
}

fn report_launch(outcome: std::io::Result<LaunchOutcome>) {
    match outcome {
        Ok(LaunchOutcome::Exited(Some(0))) => tracing::debug!("browser launcher exited cleanly"),
        Ok(LaunchOutcome::Exited(code)) => {
            tracing::warn!(?code, "browser launcher exited with failure; open the URL manually")
        }
        Ok(LaunchOutcome::Skipped) => tracing::debug!("browser launch skipped"),
        Err(e) => tracing::warn!("could not launch browser, open the URL manually: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::client::{ClientCredentials, Endpoints};

    fn manager(settings: FlowSettings) -> AuthManager {
        AuthManager::new(
            TokenClient::new(
                Arc::new(reqwest::Client::new()),
                ClientCredentials::new("CID", "SECRET"),
                Endpoints::google().unwrap(),
            ),
            RefreshTokenStore::new("unused"),
            Arc::new(PrintOnly),
            settings,
        )
    }

    #[test]
    fn test_default_settings_match_google_loopback_convention() {
        let settings = FlowSettings::default();
        assert_eq!(settings.redirect_port, 8080);
        assert_eq!(settings.redirect_uri(settings.redirect_port), "http://localhost:8080");
        assert_eq!(settings.callback_timeout, Some(Duration::from_secs(300)));
    }

    #[test]
    fn test_redirect_uri_uses_custom_host() {
        let settings = FlowSettings {
            redirect_host: "127.0.0.1".to_string(),
            ..FlowSettings::default()
        };
        assert_eq!(settings.redirect_uri(9000), "http://127.0.0.1:9000");
    }

    #[test]
    fn test_authorization_url_uses_configured_port() {
        let url = manager(FlowSettings::default()).authorization_url(&["s"]);
        assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A8080"), "{url}");
    }

    /// Launcher that finishes after `delay` and records that it did.
    struct SlowLauncher {
        delay: Duration,
        finished: std::sync::atomic::AtomicBool,
    }

    #[async_trait::async_trait]
    impl BrowserLauncher for SlowLauncher {
        async fn launch(&self, _url: &str) -> std::io::Result<LaunchOutcome> {
            tokio::time::sleep(self.delay).await;
            self.finished.store(true, std::sync::atomic::Ordering::SeqCst);
            Ok(LaunchOutcome::Exited(Some(0)))
        }
    }

    #[tokio::test]
    async fn test_launcher_is_joined_when_the_wait_fails() {
        let launcher = Arc::new(SlowLauncher {
            delay: Duration::from_millis(200),
            finished: std::sync::atomic::AtomicBool::new(false),
        });
        let manager = AuthManager::new(
            TokenClient::new(
                Arc::new(reqwest::Client::new()),
                ClientCredentials::new("CID", "SECRET"),
                Endpoints::google().unwrap(),
            ),
            RefreshTokenStore::new("unused"),
            launcher.clone(),
            FlowSettings {
                redirect_port: 0,
                callback_timeout: Some(Duration::from_millis(20)),
                ..FlowSettings::default()
            },
        );
        let listener = CallbackListener::bind(0).await.unwrap();

        let err = manager
            .launch_and_wait(listener, "http://unused", &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, LoopauthError::Timeout(_)), "{err:?}");
        assert!(
            launcher.finished.load(std::sync::atomic::Ordering::SeqCst),
            "launcher must run to completion within the grace period"
        );
    }

    #[tokio::test]
    async fn test_cancelled_token_fails_interactive_path_with_cancelled() {
        let settings = FlowSettings {
            redirect_port: 0,
            callback_timeout: None,
            ..FlowSettings::default()
        };
        let manager = manager(settings);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = manager.acquire_cancellable(&["s"], &cancel).await.unwrap_err();
        match err {
            LoopauthError::Authorization(inner) => {
                assert!(matches!(*inner, LoopauthError::Cancelled), "{inner:?}")
            }
            other => panic!("expected Authorization, got {other:?}"),
        }
    }
}
