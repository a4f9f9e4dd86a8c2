//! Wiring between configuration, the connection and the services.

use std::sync::Arc;
use std::time::Duration;

use strongbox_client::{AuthClient, SecretClient, WsTransport};
use strongbox_core::{
    AuthService, CallContext, Config, FileTokenStore, KeeperError, SecretService, TokenStore,
};
use tracing::debug;

use crate::tls;

/// Services bound to one backend connection.
pub struct App {
    pub secrets: SecretService<SecretClient<Arc<WsTransport>>>,
    pub auth: AuthService<AuthClient<Arc<WsTransport>>>,
    root: CallContext,
    timeout: Duration,
}

impl App {
    /// Connect to the configured backend, using the token file in the default location.
    pub async fn connect(config: &Config, root: CallContext) -> anyhow::Result<Self> {
        let tls = match config.tls_cert() {
            Some(path) => Some(tls::client_config(path)?),
            None => None,
        };

        let ctx = root.child().with_timeout(config.call_timeout());
        let transport = ctx
            .guard(async {
                WsTransport::connect(&config.server_url, tls)
                    .await
                    .map_err(KeeperError::from)
            })
            .await?;

        let tokens = FileTokenStore::from_default_path()?;
        debug!(path = %tokens.path().display(), "Using token file");

        Ok(Self::new(
            Arc::new(transport),
            Arc::new(tokens),
            root,
            config.call_timeout(),
        ))
    }

    pub fn new(
        transport: Arc<WsTransport>,
        tokens: Arc<dyn TokenStore>,
        root: CallContext,
        timeout: Duration,
    ) -> Self {
        Self {
            secrets: SecretService::new(SecretClient::new(transport.clone(), tokens.clone())),
            auth: AuthService::new(AuthClient::new(transport), tokens),
            root,
            timeout,
        }
    }

    /// Context for one call: cancelled with the root, bounded by the call timeout.
    pub fn call_context(&self) -> CallContext {
        self.root.child().with_timeout(self.timeout)
    }

    /// Context for a call whose duration depends on someone typing.
    pub fn interactive_context(&self) -> CallContext {
        self.root.child()
    }
}
