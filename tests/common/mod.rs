//! Shared helpers for integration tests
//!
//! [`ScriptedBrowser`] stands in for the system browser: when asked to open
//! the consent URL it reads the `redirect_uri` out of it and performs the
//! provider's redirect itself over a real TCP connection.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use loopauth::auth::browser::{BrowserLauncher, LaunchOutcome};
use loopauth::auth::client::{ClientCredentials, Endpoints, TokenClient};
use loopauth::auth::manager::{AuthManager, FlowSettings};
use loopauth::auth::query::decode_query;
use loopauth::auth::token_store::RefreshTokenStore;

/// Browser double that delivers `callback_query` to the redirect URI.
#[derive(Debug, Default)]
pub struct ScriptedBrowser {
    callback_query: String,
    opened: Mutex<Vec<String>>,
    responses: Mutex<Vec<String>>,
}

#[allow(dead_code)]
impl ScriptedBrowser {
    /// Redirects with `?{callback_query}`, e.g. `code=CODE1`.
    pub fn redirecting_with(callback_query: &str) -> Arc<Self> {
        Arc::new(Self {
            callback_query: callback_query.to_string(),
            ..Self::default()
        })
    }

    /// URLs passed to `launch`, in order.
    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }

    /// Raw HTTP responses the listener sent back.
    pub fn responses(&self) -> Vec<String> {
        self.responses.lock().unwrap().clone()
    }
}

#[async_trait]
impl BrowserLauncher for ScriptedBrowser {
    async fn launch(&self, url: &str) -> std::io::Result<LaunchOutcome> {
        self.opened.lock().unwrap().push(url.to_string());

        let (_, query) = url.split_once('?').expect("consent URL has a query");
        let redirect_uri = decode_query(query)
            .remove("redirect_uri")
            .expect("consent URL carries redirect_uri");
        let port = url::Url::parse(&redirect_uri)
            .expect("redirect_uri is a URL")
            .port()
            .expect("redirect_uri has an explicit port");

        let mut stream = TcpStream::connect(("127.0.0.1", port)).await?;
        let request = format!(
            "GET /?{} HTTP/1.1\r\nHost: localhost:{}\r\nAccept: text/html\r\n\r\n",
            self.callback_query, port
        );
        stream.write_all(request.as_bytes()).await?;

        let mut response = String::new();
        stream.read_to_string(&mut response).await?;
        self.responses.lock().unwrap().push(response);

        Ok(LaunchOutcome::Exited(Some(0)))
    }
}

/// Endpoints rooted at a mock server: `/auth`, `/refresh`, `/code`.
#[allow(dead_code)]
pub fn mock_endpoints(base_url: &str) -> Endpoints {
    Endpoints::parse(
        &format!("{base_url}/auth"),
        &format!("{base_url}/refresh"),
        &format!("{base_url}/code"),
    )
    .expect("mock endpoints parse")
}

/// Settings binding a free port with a short callback deadline.
#[allow(dead_code)]
pub fn test_settings() -> FlowSettings {
    FlowSettings {
        redirect_port: 0,
        callback_timeout: Some(std::time::Duration::from_secs(10)),
        ..FlowSettings::default()
    }
}

/// A temp dir and a store inside it.
#[allow(dead_code)]
pub fn temp_store() -> (TempDir, RefreshTokenStore) {
    let dir = TempDir::new().expect("failed to create tempdir");
    let store = RefreshTokenStore::new(dir.path().join(".refreshToken"));
    (dir, store)
}

/// An `AuthManager` for client `CID`/`SECRET` against `base_url`.
#[allow(dead_code)]
pub fn manager_for(
    base_url: &str,
    store: RefreshTokenStore,
    browser: Arc<dyn BrowserLauncher>,
    settings: FlowSettings,
) -> AuthManager {
    let client = TokenClient::new(
        Arc::new(reqwest::Client::new()),
        ClientCredentials::new("CID", "SECRET"),
        mock_endpoints(base_url),
    );
    AuthManager::new(client, store, browser, settings)
}
