//! The secret client facade.

use std::num::NonZeroU32;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::Serialize;
use strongbox_core::{
    ByteStream, CallContext, KeeperError, NewSecret, Result, Secret, SecretApi, SecretInfo,
    StreamedSecret, TokenStore, Version,
};
use tracing::debug;

use crate::codec::{self, CHUNK_SIZE};
use crate::interceptor::AuthInterceptor;
use crate::transport::{Request, Transport};
use crate::wire::{methods, SecretList, SecretPayload, SecretRef, WireSecretInfo};

/// Authenticated access to the secret backend.
///
/// Every call goes through an [`AuthInterceptor`], which the client builds
/// itself, so no operation can skip authentication.
pub struct SecretClient<T> {
    transport: AuthInterceptor<T>,
    chunk_size: usize,
}

impl<T: Transport> SecretClient<T> {
    pub fn new(transport: T, tokens: Arc<dyn TokenStore>) -> Self {
        Self {
            transport: AuthInterceptor::new(transport, tokens),
            chunk_size: CHUNK_SIZE,
        }
    }

    /// Override the streaming fragment size.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    async fn call<P, R>(&self, ctx: &CallContext, method: &str, params: P) -> Result<R>
    where
        P: Serialize + Send,
        R: DeserializeOwned,
    {
        let request = Request::new(method, encode_params(method, params)?);
        let value = ctx
            .guard(async { self.transport.unary(request).await.map_err(KeeperError::from) })
            .await?;
        serde_json::from_value(value)
            .map_err(|e| KeeperError::Protocol(format!("malformed {method} response: {e}")))
    }

    /// Latest version of a buffered secret.
    pub async fn get_latest(&self, ctx: &CallContext, name: &str) -> Result<Secret> {
        self.get(ctx, name, Version::Latest).await
    }

    /// A specific version of a buffered secret.
    pub async fn get_by_version(&self, ctx: &CallContext, name: &str, version: NonZeroU32) -> Result<Secret> {
        self.get(ctx, name, Version::Exact(version)).await
    }

    /// Latest version of a streamed secret.
    pub async fn get_latest_stream(&self, ctx: &CallContext, name: &str) -> Result<StreamedSecret> {
        self.get_stream(ctx, name, Version::Latest).await
    }

    /// A specific version of a streamed secret.
    pub async fn get_by_version_stream(
        &self,
        ctx: &CallContext,
        name: &str,
        version: NonZeroU32,
    ) -> Result<StreamedSecret> {
        self.get_stream(ctx, name, Version::Exact(version)).await
    }
}

fn encode_params<P: Serialize>(method: &str, params: P) -> Result<serde_json::Value> {
    serde_json::to_value(params)
        .map_err(|e| KeeperError::InvalidArgument(format!("cannot encode {method} params: {e}")))
}

#[async_trait]
impl<T: Transport> SecretApi for SecretClient<T> {
    async fn create_buffered(&self, ctx: &CallContext, secret: &NewSecret, data: Vec<u8>) -> Result<()> {
        let params = SecretPayload {
            info: WireSecretInfo::from(secret),
            data,
        };
        let _: IgnoredAny = self.call(ctx, methods::SECRETS_CREATE, params).await?;
        Ok(())
    }

    async fn create_streamed(
        &self,
        ctx: &CallContext,
        secret: &NewSecret,
        mut content: ByteStream,
    ) -> Result<()> {
        let request = Request::new(methods::SECRETS_CREATE_STREAM, serde_json::json!({}));
        let channel = ctx
            .guard(async {
                self.transport
                    .open_upload(request)
                    .await
                    .map_err(KeeperError::from)
            })
            .await?;
        codec::upload(ctx, channel, secret, &mut content, self.chunk_size).await
    }

    async fn list(&self, ctx: &CallContext) -> Result<Vec<String>> {
        let list: SecretList = self
            .call(ctx, methods::SECRETS_LIST, serde_json::json!({}))
            .await?;
        debug!(count = list.names.len(), "Listed secrets");
        Ok(list.names)
    }

    async fn get(&self, ctx: &CallContext, name: &str, version: Version) -> Result<Secret> {
        let payload: SecretPayload = self
            .call(ctx, methods::SECRETS_GET, SecretRef::new(name, version))
            .await?;
        Ok(Secret {
            info: SecretInfo::try_from(payload.info)?,
            data: payload.data,
        })
    }

    async fn get_stream(&self, ctx: &CallContext, name: &str, version: Version) -> Result<StreamedSecret> {
        let params = encode_params(methods::SECRETS_GET_STREAM, SecretRef::new(name, version))?;
        let request = Request::new(methods::SECRETS_GET_STREAM, params);
        let channel = ctx
            .guard(async {
                self.transport
                    .open_download(request)
                    .await
                    .map_err(KeeperError::from)
            })
            .await?;

        let (info, reader) = codec::open_reader(ctx, channel).await?;
        debug!(name = %info.name, version = info.version, "Opened secret stream");
        Ok(StreamedSecret {
            info,
            content: Box::new(reader),
        })
    }

    async fn delete(&self, ctx: &CallContext, name: &str) -> Result<()> {
        let _: IgnoredAny = self
            .call(ctx, methods::SECRETS_DELETE, SecretRef::new(name, Version::Latest))
            .await?;
        Ok(())
    }
}
