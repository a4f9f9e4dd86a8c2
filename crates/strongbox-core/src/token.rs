//! Bearer token storage.
//!
//! The [`TokenStore`] trait is the only way the rest of the client reaches
//! the token. [`FileTokenStore`] keeps it in `~/.strongbox/token`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::TokenError;
use crate::paths;
use crate::secret::AuthToken;

/// Accessor for the persisted bearer token.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Read the stored token. Fails with [`TokenError::NotFound`] if none is stored.
    async fn read(&self) -> Result<AuthToken, TokenError>;

    /// Replace the stored token.
    async fn write(&self, token: &AuthToken) -> Result<(), TokenError>;
}

/// A token store backed by a single file.
///
/// The parent directory is created with mode `0700` and the file with mode
/// `0600` on Unix. An empty file counts as no token.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    /// Create a store at an explicit path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Create a store at the default path (`~/.strongbox/token`).
    pub fn from_default_path() -> Result<Self, TokenError> {
        Ok(Self::new(paths::token_file()?))
    }

    /// Path of the token file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn ensure_parent(&self) -> Result<(), TokenError> {
        let Some(parent) = self.path.parent() else {
            return Ok(());
        };
        if parent.as_os_str().is_empty() {
            return Ok(());
        }
        tokio::fs::create_dir_all(parent).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o700);
            tokio::fs::set_permissions(parent, perms).await?;
        }

        Ok(())
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn read(&self) -> Result<AuthToken, TokenError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(TokenError::NotFound)
            }
            Err(e) => return Err(e.into()),
        };

        let token = AuthToken::new(content);
        if token.is_empty() {
            return Err(TokenError::NotFound);
        }
        Ok(token)
    }

    async fn write(&self, token: &AuthToken) -> Result<(), TokenError> {
        if token.is_empty() {
            return Err(TokenError::Empty);
        }
        self.ensure_parent().await?;

        tokio::fs::write(&self.path, token.expose()).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            tokio::fs::set_permissions(&self.path, perms).await?;
        }

        debug!(path = %self.path.display(), "Stored auth token");
        Ok(())
    }
}

/// A token store held in memory, for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    token: RwLock<Option<AuthToken>>,
}

impl MemoryTokenStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that already holds `token`.
    pub fn with_token(token: impl Into<AuthToken>) -> Self {
        Self {
            token: RwLock::new(Some(token.into())),
        }
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn read(&self) -> Result<AuthToken, TokenError> {
        self.token
            .read()
            .await
            .clone()
            .filter(|t| !t.is_empty())
            .ok_or(TokenError::NotFound)
    }

    async fn write(&self, token: &AuthToken) -> Result<(), TokenError> {
        if token.is_empty() {
            return Err(TokenError::Empty);
        }
        *self.token.write().await = Some(token.clone());
        Ok(())
    }
}
