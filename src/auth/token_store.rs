//! Refresh token persistence in a local file
//!
//! The whole on-disk state of the flow is one file holding the raw refresh
//! token string (`.refreshToken` in the working directory by convention).
//! There is no metadata and no encryption; keep the file out of version
//! control.
//!
//! There is no locking: concurrent writers race and the last one wins.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;

use crate::error::{AuthResult, LoopauthError};

/// Conventional file name for the stored refresh token.
pub const DEFAULT_REFRESH_TOKEN_PATH: &str = ".refreshToken";

/// Reads and writes the refresh token file.
///
/// # Examples
///
/// ```no_run
/// use loopauth::auth::token_store::RefreshTokenStore;
///
/// # async fn example() -> loopauth::error::AuthResult<()> {
/// let store = RefreshTokenStore::new(".refreshToken");
/// if store.load().await?.is_none() {
///     println!("not authorized yet");
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshTokenStore {
    path: PathBuf,
}

impl Default for RefreshTokenStore {
    fn default() -> Self {
        Self::new(DEFAULT_REFRESH_TOKEN_PATH)
    }
}

impl RefreshTokenStore {
    /// Creates a store backed by `path`. Nothing is touched until the first
    /// `load` or `save`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the stored refresh token.
    ///
    /// A missing file is the normal "not yet authorized" state and yields
    /// `Ok(None)`. An empty or whitespace-only file is treated the same way.
    /// One trailing line ending is stripped so hand-edited files work;
    /// otherwise the value is returned exactly as saved.
    ///
    /// # Errors
    ///
    /// Returns [`LoopauthError::Persistence`] for any other read failure.
    pub async fn load(&self) -> AuthResult<Option<String>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => {
                let token = contents
                    .strip_suffix('\n')
                    .map(|t| t.strip_suffix('\r').unwrap_or(t))
                    .unwrap_or(contents.as_str());
                if token.trim().is_empty() {
                    tracing::debug!(path = %self.path.display(), "refresh token file is empty");
                    Ok(None)
                } else {
                    Ok(Some(token.to_string()))
                }
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(self.persistence_error(source)),
        }
    }

    /// Overwrites the file with exactly `token`.
    ///
    /// An empty `token` is ignored so a response without a refresh token
    /// can never wipe a valid stored one. Missing parent directories are
    /// created. On Unix a newly created file is readable by its owner only.
    ///
    /// # Errors
    ///
    /// Returns [`LoopauthError::Persistence`] if the file cannot be written.
    pub async fn save(&self, token: &str) -> AuthResult<()> {
        if token.trim().is_empty() {
            tracing::debug!("ignoring empty refresh token; stored value left untouched");
            return Ok(());
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.persistence_error(e))?;
        }

        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o600);

        let mut file = options
            .open(&self.path)
            .await
            .map_err(|e| self.persistence_error(e))?;
        file.write_all(token.as_bytes())
            .await
            .map_err(|e| self.persistence_error(e))?;
        file.flush().await.map_err(|e| self.persistence_error(e))?;

        tracing::debug!(path = %self.path.display(), "refresh token saved");
        Ok(())
    }

    /// Removes the stored token. Returns whether a file was removed.
    ///
    /// # Errors
    ///
    /// Returns [`LoopauthError::Persistence`] if the file exists but cannot
    /// be removed.
    pub async fn clear(&self) -> AuthResult<bool> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(source) => Err(self.persistence_error(source)),
        }
    }

    fn persistence_error(&self, source: std::io::Error) -> LoopauthError {
        LoopauthError::Persistence {
            path: self.path.clone(),
            source,
        }
    }
}
