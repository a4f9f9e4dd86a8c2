//! Account registration and login.

use async_trait::async_trait;
use strongbox_core::{AuthApi, AuthToken, CallContext, KeeperError, Result};
use tracing::debug;

use crate::transport::{Request, Transport};
use crate::wire::{methods, TokenResponse, UserCredentials};

/// Issues `auth.*` calls. These are the only calls made without a token.
pub struct AuthClient<T> {
    transport: T,
}

impl<T: Transport> AuthClient<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    async fn authenticate(
        &self,
        ctx: &CallContext,
        method: &str,
        login: &str,
        password: &str,
    ) -> Result<AuthToken> {
        let params = serde_json::to_value(UserCredentials {
            login: login.to_string(),
            password: password.to_string(),
        })
        .map_err(|e| KeeperError::InvalidArgument(format!("cannot encode credentials: {e}")))?;

        let value = ctx
            .guard(async {
                self.transport
                    .unary(Request::new(method, params))
                    .await
                    .map_err(KeeperError::from)
            })
            .await?;

        let response: TokenResponse = serde_json::from_value(value)
            .map_err(|e| KeeperError::Protocol(format!("malformed {method} response: {e}")))?;
        let token = AuthToken::new(response.token);
        if token.is_empty() {
            return Err(KeeperError::Protocol("backend issued an empty token".to_string()));
        }

        debug!(method, "Received auth token");
        Ok(token)
    }
}

#[async_trait]
impl<T: Transport> AuthApi for AuthClient<T> {
    async fn register(&self, ctx: &CallContext, login: &str, password: &str) -> Result<AuthToken> {
        self.authenticate(ctx, methods::AUTH_REGISTER, login, password)
            .await
            .map_err(|e| match e {
                KeeperError::AlreadyExists(_) => {
                    KeeperError::AlreadyExists(format!("user '{login}' already exists"))
                }
                other => other,
            })
    }

    async fn login(&self, ctx: &CallContext, login: &str, password: &str) -> Result<AuthToken> {
        self.authenticate(ctx, methods::AUTH_LOGIN, login, password)
            .await
            .map_err(|e| match e {
                KeeperError::InvalidArgument(_) => {
                    KeeperError::InvalidArgument("invalid login or password".to_string())
                }
                other => other,
            })
    }
}
