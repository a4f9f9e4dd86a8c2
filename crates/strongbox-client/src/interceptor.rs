//! Bearer token injection.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use strongbox_core::{TokenError, TokenStore};
use tracing::debug;

use crate::status::Status;
use crate::transport::{DownloadChannel, Request, Transport, UploadChannel, AUTHORIZATION};

/// A [`Transport`] decorator that authenticates every call.
///
/// The current token is read from the store for each call and attached as
/// `authorization: Bearer <token>`. With no stored token the call fails with
/// an unauthenticated status and nothing is sent.
pub struct AuthInterceptor<T> {
    inner: T,
    tokens: Arc<dyn TokenStore>,
}

impl<T: Transport> AuthInterceptor<T> {
    pub fn new(inner: T, tokens: Arc<dyn TokenStore>) -> Self {
        Self { inner, tokens }
    }

    async fn authorize(&self, mut request: Request) -> Result<Request, Status> {
        let token = self.tokens.read().await.map_err(|e| match e {
            TokenError::NotFound => {
                Status::unauthenticated("no token stored, run `strongbox login` first")
            }
            other => Status::unauthenticated(other.to_string()),
        })?;

        request.metadata.insert(AUTHORIZATION, token.bearer());
        debug!(method = %request.method, "Attached bearer token");
        Ok(request)
    }
}

#[async_trait]
impl<T: Transport> Transport for AuthInterceptor<T> {
    async fn unary(&self, request: Request) -> Result<Value, Status> {
        let request = self.authorize(request).await?;
        self.inner.unary(request).await
    }

    async fn open_upload(&self, request: Request) -> Result<UploadChannel, Status> {
        let request = self.authorize(request).await?;
        self.inner.open_upload(request).await
    }

    async fn open_download(&self, request: Request) -> Result<DownloadChannel, Status> {
        let request = self.authorize(request).await?;
        self.inner.open_download(request).await
    }
}
