//! Application services used by the command layer.
//!
//! [`SecretService`] is the single place where a secret's type decides how
//! its content travels: credentials and payment cards are read fully into
//! memory and sent in one message, files and text are streamed as they are
//! read. [`AuthService`] obtains tokens and persists them.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tracing::{debug, info};

use crate::context::CallContext;
use crate::error::{KeeperError, Result};
use crate::secret::AuthToken;
use crate::token::TokenStore;
use crate::types::{validate_name, ByteStream, NewSecret, Secret, SecretType, StreamedSecret, Version};

/// Largest content accepted for a buffered secret type.
pub const MAX_BUFFERED_LEN: u64 = 4 * 1024 * 1024;

/// Remote operations on secrets.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SecretApi: Send + Sync {
    /// Create a secret whose content is sent in one message.
    async fn create_buffered(&self, ctx: &CallContext, secret: &NewSecret, data: Vec<u8>) -> Result<()>;

    /// Create a secret whose content is streamed in chunks.
    async fn create_streamed(
        &self,
        ctx: &CallContext,
        secret: &NewSecret,
        content: ByteStream,
    ) -> Result<()>;

    /// Names of all stored secrets.
    async fn list(&self, ctx: &CallContext) -> Result<Vec<String>>;

    /// Fetch a buffered secret.
    async fn get(&self, ctx: &CallContext, name: &str, version: Version) -> Result<Secret>;

    /// Fetch a streamed secret.
    async fn get_stream(&self, ctx: &CallContext, name: &str, version: Version) -> Result<StreamedSecret>;

    /// Delete every version of a secret.
    async fn delete(&self, ctx: &CallContext, name: &str) -> Result<()>;
}

/// Remote account operations. Both return the issued bearer token.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn register(&self, ctx: &CallContext, login: &str, password: &str) -> Result<AuthToken>;

    async fn login(&self, ctx: &CallContext, login: &str, password: &str) -> Result<AuthToken>;
}

/// Type-aware front door for secret operations.
pub struct SecretService<A> {
    api: A,
}

impl<A: SecretApi> SecretService<A> {
    pub fn new(api: A) -> Self {
        Self { api }
    }

    /// Create a secret, choosing buffered or streamed transfer by its type.
    pub async fn create(&self, ctx: &CallContext, secret: NewSecret, content: ByteStream) -> Result<()> {
        secret.validate()?;

        match secret.secret_type {
            SecretType::Credentials | SecretType::PaymentCard => {
                let data = read_buffered(ctx, content).await?;
                debug!(
                    name = %secret.name,
                    secret_type = %secret.secret_type,
                    bytes = data.len(),
                    "Creating buffered secret"
                );
                self.api.create_buffered(ctx, &secret, data).await?;
            }
            SecretType::File | SecretType::Text => {
                debug!(
                    name = %secret.name,
                    secret_type = %secret.secret_type,
                    "Creating streamed secret"
                );
                self.api.create_streamed(ctx, &secret, content).await?;
            }
            SecretType::Unknown => {
                return Err(KeeperError::InvalidArgument(
                    "cannot create a secret of unknown type".to_string(),
                ));
            }
        }

        info!(name = %secret.name, "Secret created");
        Ok(())
    }

    /// Names of all stored secrets. An empty list is not an error.
    pub async fn list(&self, ctx: &CallContext) -> Result<Vec<String>> {
        self.api.list(ctx).await
    }

    /// Fetch a credentials or payment card secret.
    pub async fn get(&self, ctx: &CallContext, name: &str, version: Version) -> Result<Secret> {
        validate_name(name)?;
        self.api.get(ctx, name, version).await
    }

    /// Fetch a file or text secret as a stream.
    pub async fn get_stream(&self, ctx: &CallContext, name: &str, version: Version) -> Result<StreamedSecret> {
        validate_name(name)?;
        self.api.get_stream(ctx, name, version).await
    }

    /// Delete every version of a secret.
    pub async fn delete(&self, ctx: &CallContext, name: &str) -> Result<()> {
        validate_name(name)?;
        self.api.delete(ctx, name).await?;
        info!(name = %name, "Secret deleted");
        Ok(())
    }
}

async fn read_buffered(ctx: &CallContext, content: ByteStream) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    let mut limited = content.take(MAX_BUFFERED_LEN + 1);
    ctx.guard(async {
        limited.read_to_end(&mut data).await.map_err(KeeperError::from)
    })
    .await?;

    if data.len() as u64 > MAX_BUFFERED_LEN {
        return Err(KeeperError::InvalidArgument(format!(
            "content exceeds {MAX_BUFFERED_LEN} bytes, store it as a file instead"
        )));
    }
    Ok(data)
}

/// Registers and logs in, persisting the issued token.
pub struct AuthService<A> {
    api: A,
    tokens: Arc<dyn TokenStore>,
}

impl<A: AuthApi> AuthService<A> {
    pub fn new(api: A, tokens: Arc<dyn TokenStore>) -> Self {
        Self { api, tokens }
    }

    /// Create an account and store its token.
    pub async fn register(&self, ctx: &CallContext, login: &str, password: &str) -> Result<()> {
        validate_login(login, password)?;
        let token = self.api.register(ctx, login, password).await?;
        self.store(&token).await?;
        info!(login = %login, "Registered");
        Ok(())
    }

    /// Log in and store the token. Nothing is written if login fails.
    pub async fn login(&self, ctx: &CallContext, login: &str, password: &str) -> Result<()> {
        validate_login(login, password)?;
        let token = self.api.login(ctx, login, password).await?;
        self.store(&token).await?;
        info!(login = %login, "Logged in");
        Ok(())
    }

    async fn store(&self, token: &AuthToken) -> Result<()> {
        self.tokens
            .write(token)
            .await
            .map_err(|e| KeeperError::Transport(format!("failed to store token: {e}")))
    }
}

fn validate_login(login: &str, password: &str) -> Result<()> {
    if login.trim().is_empty() {
        return Err(KeeperError::InvalidArgument("login must not be empty".to_string()));
    }
    if password.is_empty() {
        return Err(KeeperError::InvalidArgument("password must not be empty".to_string()));
    }
    Ok(())
}
