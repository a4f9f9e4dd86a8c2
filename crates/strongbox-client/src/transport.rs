//! The call-level transport abstraction.
//!
//! A [`Transport`] issues three shapes of call: a unary request/response, a
//! client-streaming upload, and a server-streaming download. Stream messages
//! travel through bounded channels. An upload waits for its transport; a
//! download's consumer never holds up other calls on the connection.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crate::status::Status;

/// Metadata key carrying the bearer credential.
pub const AUTHORIZATION: &str = "authorization";

/// Capacity of the per-stream message channels.
pub const STREAM_CAPACITY: usize = 8;

/// Key/value metadata attached to a call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata(BTreeMap<String, String>);

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a value, replacing any previous one.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> BTreeMap<String, String> {
        self.0
    }
}

/// An outbound call before it is put on the wire.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: String,
    pub params: Value,
    pub metadata: Metadata,
}

impl Request {
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            method: method.into(),
            params,
            metadata: Metadata::new(),
        }
    }
}

/// A message from an upload to its transport.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadFrame {
    Chunk(Value),
    /// No more chunks. The transport should ask for the acknowledgement.
    Finish,
}

/// Client side of an open upload.
///
/// Dropping the channel before [`close_and_recv`](Self::close_and_recv)
/// abandons the upload. The transport then tells the backend to discard it.
#[derive(Debug)]
pub struct UploadChannel {
    frames: mpsc::Sender<UploadFrame>,
    response: oneshot::Receiver<Result<Value, Status>>,
    settled: Option<Result<Value, Status>>,
}

impl UploadChannel {
    pub fn new(
        frames: mpsc::Sender<UploadFrame>,
        response: oneshot::Receiver<Result<Value, Status>>,
    ) -> Self {
        Self {
            frames,
            response,
            settled: None,
        }
    }

    /// Send one message. Fails if the backend already ended the call.
    pub async fn send(&mut self, message: Value) -> Result<(), Status> {
        self.push(UploadFrame::Chunk(message)).await
    }

    /// Finish sending and wait for the backend's single acknowledgement.
    pub async fn close_and_recv(mut self) -> Result<Value, Status> {
        self.push(UploadFrame::Finish).await?;
        match self.settled.take() {
            Some(outcome) => outcome,
            None => recv_response(&mut self.response).await,
        }
    }

    async fn push(&mut self, frame: UploadFrame) -> Result<(), Status> {
        if let Some(outcome) = &self.settled {
            return Err(early_end(outcome));
        }

        let step = tokio::select! {
            biased;
            outcome = recv_response(&mut self.response) => PushStep::Ended(outcome),
            sent = self.frames.send(frame) => match sent {
                Ok(()) => PushStep::Sent,
                Err(_) => PushStep::Closed,
            },
        };

        let outcome = match step {
            PushStep::Sent => return Ok(()),
            PushStep::Ended(outcome) => outcome,
            // The transport stopped reading, so the call is over. Its response says why.
            PushStep::Closed => recv_response(&mut self.response).await,
        };

        let err = early_end(&outcome);
        self.settled = Some(outcome);
        Err(err)
    }
}

enum PushStep {
    Sent,
    Ended(Result<Value, Status>),
    Closed,
}

async fn recv_response(
    response: &mut oneshot::Receiver<Result<Value, Status>>,
) -> Result<Value, Status> {
    response
        .await
        .unwrap_or_else(|_| Err(Status::unavailable("connection closed before the call completed")))
}

fn early_end(outcome: &Result<Value, Status>) -> Status {
    match outcome {
        Err(status) => status.clone(),
        Ok(_) => Status::internal("backend acknowledged the upload before it was finished"),
    }
}

/// Client side of an open download.
#[derive(Debug)]
pub struct DownloadChannel {
    frames: mpsc::Receiver<Result<Value, Status>>,
}

impl DownloadChannel {
    pub fn new(frames: mpsc::Receiver<Result<Value, Status>>) -> Self {
        Self { frames }
    }

    /// The next message, or `None` once the backend ended the stream normally.
    pub async fn message(&mut self) -> Result<Option<Value>, Status> {
        self.frames.recv().await.transpose()
    }
}

/// A connection capable of issuing calls. Shared by concurrent callers.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one request and wait for its response.
    async fn unary(&self, request: Request) -> Result<Value, Status>;

    /// Open a client-streaming call.
    async fn open_upload(&self, request: Request) -> Result<UploadChannel, Status>;

    /// Open a server-streaming call.
    async fn open_download(&self, request: Request) -> Result<DownloadChannel, Status>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn unary(&self, request: Request) -> Result<Value, Status> {
        (**self).unary(request).await
    }

    async fn open_upload(&self, request: Request) -> Result<UploadChannel, Status> {
        (**self).open_upload(request).await
    }

    async fn open_download(&self, request: Request) -> Result<DownloadChannel, Status> {
        (**self).open_download(request).await
    }
}
