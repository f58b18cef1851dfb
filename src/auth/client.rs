//! Token endpoint client for the authorization code grant
//!
//! [`TokenClient`] builds the consent URL the browser is sent to and performs
//! the two token endpoint calls of the flow:
//!
//! - refresh-token grant against [`Endpoints::refresh_token_url`]
//! - authorization-code grant against [`Endpoints::code_token_url`]
//!
//! Both calls POST an `application/x-www-form-urlencoded` body produced by
//! [`encode_query`] and decode a JSON [`TokenResponse`]. Neither call retries;
//! provider error payloads are returned verbatim in
//! [`LoopauthError::TokenEndpoint`].

use std::fmt;
use std::sync::Arc;

use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use url::Url;

use crate::auth::query::encode_query;
use crate::error::{AuthResult, LoopauthError};

/// Google's consent page.
pub const GOOGLE_AUTHORIZATION_URL: &str = "https://accounts.google.com/o/oauth2/auth";

/// Google's token endpoint used for the refresh-token grant.
pub const GOOGLE_REFRESH_TOKEN_URL: &str = "https://www.googleapis.com/oauth2/v4/token";

/// Google's legacy token endpoint used for the authorization-code grant.
pub const GOOGLE_CODE_TOKEN_URL: &str = "https://accounts.google.com/o/oauth2/token";

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

// ---------------------------------------------------------------------------
// ClientCredentials
// ---------------------------------------------------------------------------

/// OAuth client identity issued by the provider for an installed application.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientCredentials {
    /// The public client identifier.
    pub client_id: String,
    /// The client secret. Never logged.
    pub client_secret: String,
}

impl ClientCredentials {
    /// Creates credentials from an id/secret pair.
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }
}

impl fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Endpoints
// ---------------------------------------------------------------------------

/// Provider endpoints used by the flow.
///
/// [`Endpoints::google`] gives the production values. Tests point these at a
/// mock server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// Consent page the browser is sent to.
    pub authorization_url: Url,
    /// Token endpoint for `grant_type=refresh_token`.
    pub refresh_token_url: Url,
    /// Token endpoint for `grant_type=authorization_code`.
    pub code_token_url: Url,
}

impl Endpoints {
    /// Parses the three endpoint URLs.
    ///
    /// # Errors
    ///
    /// Returns [`LoopauthError::Config`] naming the first URL that fails to
    /// parse.
    pub fn parse(authorization: &str, refresh_token: &str, code_token: &str) -> AuthResult<Self> {
        let parse = |name: &str, raw: &str| {
            Url::parse(raw)
                .map_err(|e| LoopauthError::Config(format!("invalid {name} URL '{raw}': {e}")))
        };
        Ok(Self {
            authorization_url: parse("authorization", authorization)?,
            refresh_token_url: parse("refresh token", refresh_token)?,
            code_token_url: parse("code token", code_token)?,
        })
    }

    /// Google's endpoints.
    ///
    /// # Errors
    ///
    /// Returns [`LoopauthError::Config`] if a built-in URL fails to parse.
    pub fn google() -> AuthResult<Self> {
        Self::parse(
            GOOGLE_AUTHORIZATION_URL,
            GOOGLE_REFRESH_TOKEN_URL,
            GOOGLE_CODE_TOKEN_URL,
        )
    }
}

// ---------------------------------------------------------------------------
// TokenResponse
// ---------------------------------------------------------------------------

/// Decoded token endpoint response.
///
/// `refresh_token` is absent on the refresh-token grant: the provider does
/// not rotate it there.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenResponse {
    /// The bearer access token.
    pub access_token: String,

    /// A new refresh token, when the provider issued one.
    #[serde(default)]
    pub refresh_token: Option<String>,
}

impl TokenResponse {
    /// Returns the refresh token when present and non-empty.
    pub fn usable_refresh_token(&self) -> Option<&str> {
        self.refresh_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

// ---------------------------------------------------------------------------
// TokenClient
// ---------------------------------------------------------------------------

/// Talks to the provider's authorization and token endpoints.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use loopauth::auth::client::{ClientCredentials, Endpoints, TokenClient};
///
/// # fn main() -> loopauth::AuthResult<()> {
/// let client = TokenClient::new(
///     Arc::new(reqwest::Client::new()),
///     ClientCredentials::new("CID", "secret"),
///     Endpoints::google()?,
/// );
/// let url = client.build_authorization_url(&["SCOPE1", "SCOPE2"], "http://localhost:8080");
/// assert!(url.contains("client_id=CID"));
/// assert!(url.contains("scope=SCOPE1%20SCOPE2"));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct TokenClient {
    http: Arc<reqwest::Client>,
    credentials: ClientCredentials,
    endpoints: Endpoints,
}

impl TokenClient {
    /// Creates a client sharing the given HTTP connection pool.
    pub fn new(
        http: Arc<reqwest::Client>,
        credentials: ClientCredentials,
        endpoints: Endpoints,
    ) -> Self {
        Self {
            http,
            credentials,
            endpoints,
        }
    }

    /// The client's credentials.
    pub fn credentials(&self) -> &ClientCredentials {
        &self.credentials
    }

    /// The endpoints this client calls.
    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// Builds the consent URL for `scopes`.
    ///
    /// Parameters are `client_id`, `redirect_uri`, `scope` (space-joined, in
    /// the given order), `response_type=code` and `access_type=offline`.
    /// `redirect_uri` must be the exact string later passed to
    /// [`exchange_authorization_code`](Self::exchange_authorization_code).
    pub fn build_authorization_url<S: AsRef<str>>(
        &self,
        scopes: &[S],
        redirect_uri: &str,
    ) -> String {
        let scope = scopes
            .iter()
            .map(AsRef::as_ref)
            .collect::<Vec<_>>()
            .join(" ");

        let query = encode_query(&[
            ("client_id", self.credentials.client_id.as_str()),
            ("redirect_uri", redirect_uri),
            ("scope", scope.as_str()),
            ("response_type", "code"),
            ("access_type", "offline"),
        ]);

        let base = self.endpoints.authorization_url.as_str();
        let separator = if self.endpoints.authorization_url.query().is_some() {
            '&'
        } else {
            '?'
        };
        format!("{base}{separator}{query}")
    }

    /// Exchanges a stored refresh token for a new access token.
    ///
    /// # Errors
    ///
    /// - [`LoopauthError::TokenEndpoint`] on a non-2xx status or a body that
    ///   is not a token response.
    /// - [`LoopauthError::Http`] when the request cannot be sent.
    pub async fn exchange_refresh_token(&self, refresh_token: &str) -> AuthResult<TokenResponse> {
        tracing::debug!(endpoint = %self.endpoints.refresh_token_url, "refresh-token grant");
        let body = encode_query(&[
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ]);
        self.post_form(&self.endpoints.refresh_token_url, body).await
    }

    /// Exchanges an authorization code for tokens.
    ///
    /// `redirect_uri` must be byte-identical to the one used when building
    /// the authorization URL; the provider rejects the exchange otherwise.
    ///
    /// # Errors
    ///
    /// Same as [`exchange_refresh_token`](Self::exchange_refresh_token).
    pub async fn exchange_authorization_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> AuthResult<TokenResponse> {
        tracing::debug!(endpoint = %self.endpoints.code_token_url, "authorization-code grant");
        let body = encode_query(&[
            ("code", code),
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("redirect_uri", redirect_uri),
            ("grant_type", "authorization_code"),
        ]);
        self.post_form(&self.endpoints.code_token_url, body).await
    }

    async fn post_form(&self, endpoint: &Url, body: String) -> AuthResult<TokenResponse> {
        let resp = self
            .http
            .post(endpoint.clone())
            .header(CONTENT_TYPE, FORM_CONTENT_TYPE)
            .body(body)
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;

        if !status.is_success() {
            return Err(LoopauthError::TokenEndpoint {
                status: status.as_u16(),
                body: text,
            });
        }

        serde_json::from_str(&text).map_err(|e| {
            tracing::debug!("undecodable token response: {e}");
            LoopauthError::TokenEndpoint {
                status: status.as_u16(),
                body: text,
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
