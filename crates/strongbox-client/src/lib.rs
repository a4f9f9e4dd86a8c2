//! # strongbox-client
//!
//! RPC client for the Strongbox secret backend.
//!
//! - **Transport**: JSON-RPC 2.0 calls multiplexed over one WebSocket
//! - **Auth middleware**: bearer token attached to every secret call
//! - **Chunked transfer**: `[Info][Data]*` framing for streamed secrets
//! - **Error translation**: transport status mapped onto [`strongbox_core::KeeperError`]
//! - **Facades**: [`SecretClient`] and [`AuthClient`]

pub mod auth;
pub mod client;
pub mod codec;
pub mod interceptor;
pub mod rpc;
pub mod status;
pub mod transport;
pub mod wire;
pub mod ws;

pub use auth::AuthClient;
pub use client::SecretClient;
pub use codec::{SecretStreamReader, CHUNK_SIZE};
pub use interceptor::AuthInterceptor;
pub use status::{Status, StatusCode};
pub use transport::{DownloadChannel, Metadata, Request, Transport, UploadChannel, UploadFrame};
pub use ws::WsTransport;
