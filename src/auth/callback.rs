//! One-shot loopback listener for the authorization redirect
//!
//! The provider sends the user's browser to `http://localhost:<port>/?code=...`.
//! [`CallbackListener`] binds that port before the browser is launched,
//! accepts exactly one connection, parses just the request line, answers with
//! a short page telling the user the window can be closed, and shuts down.
//!
//! The listener socket is owned by the wait future, so every exit path
//! (success, parse failure, timeout, cancellation) drops it and frees the
//! port.

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use crate::auth::query::decode_query;
use crate::error::{AuthResult, LoopauthError};

/// Upper bound on the bytes read from the browser before parsing.
const MAX_REQUEST_BYTES: usize = 8 * 1024;

const SUCCESS_BODY: &str = "You can close this window now.";
const FAILURE_BODY: &str = "Authorization failed. Return to the terminal for details.";

// ---------------------------------------------------------------------------
// CallbackQuery
// ---------------------------------------------------------------------------

/// Query parameters carried by the provider's redirect.
///
/// A `CallbackQuery` always holds an authorization code; redirects without
/// one are rejected while parsing. Other parameters (`state`, `scope`, ...)
/// are kept and available through [`get`](Self::get).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackQuery {
    code: String,
    params: HashMap<String, String>,
}

impl CallbackQuery {
    /// Builds a `CallbackQuery` from an HTTP request target such as
    /// `/?code=abc&scope=x`.
    ///
    /// # Errors
    ///
    /// Returns [`LoopauthError::Callback`] when the provider reported an
    /// `error` or when no non-empty `code` parameter is present.
    ///
    /// # Examples
    ///
    /// ```
    /// use loopauth::auth::callback::CallbackQuery;
    ///
    /// let query = CallbackQuery::from_target("/?code=ABC123&state=xyz").unwrap();
    /// assert_eq!(query.code(), "ABC123");
    /// assert_eq!(query.get("state"), Some("xyz"));
    ///
    /// assert!(CallbackQuery::from_target("/?error=access_denied").is_err());
    /// ```
    pub fn from_target(target: &str) -> AuthResult<Self> {
        let query = target.split_once('?').map(|(_, q)| q).unwrap_or("");
        let params = decode_query(query);

        if let Some(error) = params.get("error") {
            let detail = params
                .get("error_description")
                .map(|d| format!(": {d}"))
                .unwrap_or_default();
            return Err(LoopauthError::Callback(format!(
                "provider returned error '{error}'{detail}"
            )));
        }

        let code = match params.get("code") {
            Some(code) if !code.is_empty() => code.clone(),
            _ => {
                return Err(LoopauthError::Callback(
                    "authorization code missing from callback".to_string(),
                ))
            }
        };

        Ok(Self { code, params })
    }

    /// The authorization code.
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Returns any query parameter from the redirect, decoded.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// All decoded query parameters, including `code`.
    pub fn params(&self) -> &HashMap<String, String> {
        &self.params
    }
}

// ---------------------------------------------------------------------------
// CallbackListener
// ---------------------------------------------------------------------------

/// A bound, not yet accepting, loopback listener.
///
/// Binding and waiting are separate steps so the caller can bind first and
/// only then send the browser to the provider.
///
/// # Examples
///
/// ```no_run
/// use loopauth::auth::callback::CallbackListener;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> loopauth::error::AuthResult<()> {
/// let listener = CallbackListener::bind(8080).await?;
/// // ... launch the browser here ...
/// let query = listener.wait_for_code(None, &CancellationToken::new()).await?;
/// println!("code: {}", query.code());
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct CallbackListener {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl CallbackListener {
    /// Binds `127.0.0.1:<port>`. Port `0` asks the OS for a free port.
    ///
    /// # Errors
    ///
    /// Returns [`LoopauthError::Bind`] when the port is unavailable. This is
    /// not retried; another flow or a stale process most likely holds it.
    pub async fn bind(port: u16) -> AuthResult<Self> {
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| LoopauthError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        let local_addr = listener.local_addr().map_err(|source| LoopauthError::Bind {
            addr: addr.to_string(),
            source,
        })?;

        tracing::debug!(%local_addr, "redirect listener bound");
        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// The address actually bound.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The port actually bound; differs from the requested one when `0` was
    /// requested.
    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Waits for the single redirect and returns its query.
    ///
    /// Consumes the listener. At most one connection is ever accepted.
    ///
    /// # Arguments
    ///
    /// * `timeout` - Deadline for the whole capture. `None` waits forever.
    /// * `cancel` - Aborts the wait when cancelled.
    ///
    /// # Errors
    ///
    /// - [`LoopauthError::MalformedRequest`] if the request line is not
    ///   `GET <target> HTTP/1.x`.
    /// - [`LoopauthError::Callback`] if the connection fails or the redirect
    ///   carries no code.
    /// - [`LoopauthError::Timeout`] when `timeout` elapses.
    /// - [`LoopauthError::Cancelled`] when `cancel` fires.
    pub async fn wait_for_code(
        self,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> AuthResult<CallbackQuery> {
        let capture = capture_one(self.listener);

        let deadline = async {
            match timeout {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                tracing::info!("callback wait cancelled");
                Err(LoopauthError::Cancelled)
            }

            result = capture => result,

            _ = deadline => {
                // `timeout` is Some here: the None branch never completes.
                let limit = timeout.unwrap_or_default();
                tracing::warn!(?limit, "no authorization callback before deadline");
                Err(LoopauthError::Timeout(limit))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Connection handling
// ---------------------------------------------------------------------------

async fn capture_one(listener: TcpListener) -> AuthResult<CallbackQuery> {
    let (mut stream, peer) = listener.accept().await.map_err(|e| {
        LoopauthError::Callback(format!("failed to accept callback connection: {e}"))
    })?;
    // One connection only: stop listening before touching the request.
    drop(listener);
    tracing::debug!(%peer, "accepted callback connection");

    let outcome = match read_request_head(&mut stream).await {
        Ok(head) => parse_request_target(&head).and_then(CallbackQuery::from_target),
        Err(e) => Err(e),
    };

    let response = match &outcome {
        Ok(_) => http_response("200 OK", SUCCESS_BODY),
        Err(_) => http_response("400 Bad Request", FAILURE_BODY),
    };
    if let Err(e) = write_and_close(&mut stream, response.as_bytes()).await {
        tracing::warn!("failed to send callback response to browser: {e}");
    }

    outcome
}

/// Reads until the end of the headers, EOF, or [`MAX_REQUEST_BYTES`].
async fn read_request_head(stream: &mut TcpStream) -> AuthResult<String> {
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];

    loop {
        let n = stream.read(&mut chunk).await.map_err(|e| {
            LoopauthError::Callback(format!("failed to read callback request: {e}"))
        })?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if buf.len() >= MAX_REQUEST_BYTES || buf.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
    }

    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Extracts `<target>` from a `GET <target> HTTP/1.x` request line.
fn parse_request_target(request: &str) -> AuthResult<&str> {
    let line = request.split("\r\n").next().unwrap_or("");
    let parts: Vec<&str> = line.split(' ').collect();

    let [method, target, version] = parts.as_slice() else {
        return Err(LoopauthError::MalformedRequest(format!(
            "expected 'GET <target> HTTP/1.1', got {line:?}"
        )));
    };

    if *method != "GET" {
        return Err(LoopauthError::MalformedRequest(format!(
            "unexpected method {method:?}"
        )));
    }
    if !matches!(*version, "HTTP/1.1" | "HTTP/1.0") {
        return Err(LoopauthError::MalformedRequest(format!(
            "unexpected protocol version {version:?}"
        )));
    }
    if target.is_empty() {
        return Err(LoopauthError::MalformedRequest(
            "empty request target".to_string(),
        ));
    }

    Ok(*target)
}

fn http_response(status: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    )
}

/// Writes the full response and flushes it before shutting the socket down;
/// closing first truncates the page in the browser.
async fn write_and_close(stream: &mut TcpStream, bytes: &[u8]) -> std::io::Result<()> {
    stream.write_all(bytes).await?;
    stream.flush().await?;
    stream.shutdown().await
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
