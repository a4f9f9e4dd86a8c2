//! Multiplexed JSON-RPC over a single WebSocket connection.
//!
//! A writer task owns the sink and a reader task owns the stream. Calls are
//! tracked in a concurrent map keyed by request ID, and every incoming
//! response or stream frame is routed to the call that owns it.
//!
//! The reader never waits on a single call. Download frames are queued to a
//! per-download forwarding task, and a download whose consumer falls more
//! than [`MAX_DOWNLOAD_BACKLOG`] frames behind is cancelled.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async_tls_with_config, Connector};
use tracing::{debug, info, warn};

use crate::rpc::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, ServerMessage};
use crate::status::Status;
use crate::transport::{
    DownloadChannel, Request, Transport, UploadChannel, UploadFrame, STREAM_CAPACITY,
};
use crate::wire::{methods, StreamFrame};

/// Capacity of the outbound message queue shared by all calls.
const OUTBOUND_CAPACITY: usize = 64;

/// Frames a download may hold queued ahead of its consumer.
pub const MAX_DOWNLOAD_BACKLOG: usize = 128;

type Frame = Result<Value, Status>;

/// Where the outcome of an in-flight call goes.
enum Pending {
    /// Unary calls and uploads: one response.
    Reply(oneshot::Sender<Frame>),
    /// Downloads: chunks, then the end of the stream.
    Stream(StreamRoute),
}

/// Reader-side handle of a download's forwarding queue.
struct StreamRoute {
    queue: mpsc::UnboundedSender<Frame>,
    backlog: Arc<AtomicUsize>,
    limit: usize,
}

impl StreamRoute {
    fn new(limit: usize) -> (Self, mpsc::UnboundedReceiver<Frame>, Arc<AtomicUsize>) {
        let (queue, queued) = mpsc::unbounded_channel();
        let backlog = Arc::new(AtomicUsize::new(0));
        let route = Self {
            queue,
            backlog: backlog.clone(),
            limit,
        };
        (route, queued, backlog)
    }

    /// Queue a chunk. Returns `false` if the consumer is too far behind.
    fn push(&self, chunk: Value) -> bool {
        if self.backlog.load(Ordering::SeqCst) >= self.limit {
            return false;
        }
        self.backlog.fetch_add(1, Ordering::SeqCst);
        let _ = self.queue.send(Ok(chunk));
        true
    }

    /// End the stream with `status` after the chunks already queued.
    fn fail(self, status: Status) {
        let _ = self.queue.send(Err(status));
    }
}

struct Shared {
    outbound: mpsc::Sender<Message>,
    pending: DashMap<String, Pending>,
    closed: AtomicBool,
}

impl Shared {
    fn register(&self, id: &str, pending: Pending) -> Result<(), Status> {
        self.pending.insert(id.to_string(), pending);
        if self.closed.load(Ordering::SeqCst) {
            self.pending.remove(id);
            return Err(Status::unavailable("connection closed"));
        }
        Ok(())
    }

    async fn send_json<T: Serialize>(&self, message: &T) -> Result<(), Status> {
        let text = serde_json::to_string(message)
            .map_err(|e| Status::internal(format!("cannot encode message: {e}")))?;
        self.outbound
            .send(Message::Text(text))
            .await
            .map_err(|_| Status::unavailable("connection closed"))
    }

    async fn send_frame(&self, method: &str, id: &str, chunk: Option<Value>) -> Result<(), Status> {
        let frame = StreamFrame {
            id: id.to_string(),
            chunk,
        };
        let params = serde_json::to_value(frame)
            .map_err(|e| Status::internal(format!("cannot encode stream frame: {e}")))?;
        self.send_json(&JsonRpcNotification::new(method, params)).await
    }

    /// Send the opening request of a call, forgetting the call if that fails.
    async fn open(&self, id: &str, request: Request) -> Result<(), Status> {
        let message = JsonRpcRequest::new(request.method)
            .with_id(id)
            .with_params(request.params)
            .with_meta(request.metadata.into_inner());
        if let Err(status) = self.send_json(&message).await {
            self.pending.remove(id);
            return Err(status);
        }
        Ok(())
    }

    async fn dispatch(&self, text: &str) {
        let message: ServerMessage = match serde_json::from_str(text) {
            Ok(message) => message,
            Err(e) => {
                warn!("Ignoring malformed message from backend: {}", e);
                return;
            }
        };

        match message {
            ServerMessage::Response(response) => self.complete(response),
            ServerMessage::Notification(note) if note.method == methods::STREAM_CHUNK => {
                let frame = note
                    .params
                    .and_then(|params| serde_json::from_value::<StreamFrame>(params).ok());
                match frame {
                    Some(StreamFrame {
                        id,
                        chunk: Some(chunk),
                    }) => self.deliver(id, chunk).await,
                    _ => warn!("Ignoring malformed stream chunk"),
                }
            }
            ServerMessage::Notification(note) => {
                debug!(method = %note.method, "Ignoring notification");
            }
        }
    }

    fn complete(&self, response: JsonRpcResponse) {
        let Some(id) = response.id.as_ref().and_then(Value::as_str) else {
            warn!("Ignoring response without a string id");
            return;
        };
        let Some((_, pending)) = self.pending.remove(id) else {
            debug!(id, "Response for unknown or abandoned call");
            return;
        };

        let outcome = match response.error {
            Some(error) => Err(Status::from(error)),
            None => Ok(response.result.unwrap_or(Value::Null)),
        };

        match pending {
            Pending::Reply(tx) => {
                let _ = tx.send(outcome);
            }
            Pending::Stream(route) => {
                if let Err(status) = outcome {
                    route.fail(status);
                }
                // Dropping the route ends the stream once its queue drains.
            }
        }
    }

    async fn deliver(&self, id: String, chunk: Value) {
        let accepted = match self.pending.get(&id).as_deref() {
            Some(Pending::Stream(route)) => route.push(chunk),
            Some(Pending::Reply(_)) => {
                warn!(id = %id, "Stream chunk for a call that is not a download");
                return;
            }
            None => return,
        };
        if accepted {
            return;
        }

        if let Some((_, Pending::Stream(route))) = self.pending.remove(&id) {
            warn!(id = %id, "Download consumer fell behind, cancelling");
            route.fail(Status::unavailable("download was not read fast enough"));
            let _ = self.send_frame(methods::STREAM_CANCEL, &id, None).await;
        }
    }

    /// Forget an abandoned download and tell the backend to stop sending.
    async fn abandon(&self, id: &str) {
        if self.pending.remove(id).is_some() {
            debug!(id = %id, "Download abandoned, cancelling");
            let _ = self.send_frame(methods::STREAM_CANCEL, id, None).await;
        }
    }

    fn fail_all(&self, status: Status) {
        self.closed.store(true, Ordering::SeqCst);
        let ids: Vec<String> = self.pending.iter().map(|entry| entry.key().clone()).collect();
        for id in ids {
            match self.pending.remove(&id) {
                Some((_, Pending::Reply(tx))) => {
                    let _ = tx.send(Err(status.clone()));
                }
                Some((_, Pending::Stream(route))) => route.fail(status.clone()),
                None => {}
            }
        }
    }
}

/// Move queued frames of one download into its bounded consumer channel.
async fn forward(
    shared: Arc<Shared>,
    id: String,
    mut queued: mpsc::UnboundedReceiver<Frame>,
    backlog: Arc<AtomicUsize>,
    consumer: mpsc::Sender<Frame>,
) {
    loop {
        let frame = tokio::select! {
            frame = queued.recv() => frame,
            _ = consumer.closed() => {
                shared.abandon(&id).await;
                return;
            }
        };
        let Some(frame) = frame else {
            return;
        };
        if frame.is_ok() {
            backlog.fetch_sub(1, Ordering::SeqCst);
        }
        if consumer.send(frame).await.is_err() {
            shared.abandon(&id).await;
            return;
        }
    }
}

/// Removes a call from the pending map if its future is dropped while armed.
struct PendingGuard<'a> {
    shared: &'a Shared,
    id: &'a str,
    armed: bool,
}

impl<'a> PendingGuard<'a> {
    fn new(shared: &'a Shared, id: &'a str) -> Self {
        Self {
            shared,
            id,
            armed: true,
        }
    }

    /// Keep the entry; the call now lives on past this future.
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.shared.pending.remove(self.id);
        }
    }
}

/// A [`Transport`] over one WebSocket connection, shared by concurrent calls.
pub struct WsTransport {
    shared: Arc<Shared>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl WsTransport {
    /// Connect to `url`. With `tls`, `wss://` connections trust that config's roots.
    pub async fn connect(
        url: &str,
        tls: Option<Arc<rustls::ClientConfig>>,
    ) -> Result<Self, Status> {
        let connector = tls.map(Connector::Rustls);
        let (socket, _) = connect_async_tls_with_config(url, None, false, connector)
            .await
            .map_err(|e| Status::unavailable(format!("cannot connect to {url}: {e}")))?;
        info!("Connected to {}", url);

        let (mut sink, mut stream) = socket.split();
        let (outbound, mut outbound_rx) = mpsc::channel::<Message>(OUTBOUND_CAPACITY);

        let shared = Arc::new(Shared {
            outbound,
            pending: DashMap::new(),
            closed: AtomicBool::new(false),
        });

        let writer = tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                if let Err(e) = sink.send(message).await {
                    warn!("WebSocket write failed: {}", e);
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let reader_shared = shared.clone();
        let reader = tokio::spawn(async move {
            while let Some(message) = stream.next().await {
                match message {
                    Ok(Message::Text(text)) => reader_shared.dispatch(&text).await,
                    Ok(Message::Close(_)) => {
                        debug!("Backend closed the connection");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("WebSocket error: {}", e);
                        break;
                    }
                }
            }
            reader_shared.fail_all(Status::unavailable("connection closed"));
        });

        Ok(Self {
            shared,
            reader,
            writer,
        })
    }

    /// Number of calls waiting for a response.
    pub fn in_flight(&self) -> usize {
        self.shared.pending.len()
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        self.reader.abort();
        self.writer.abort();
        self.shared.fail_all(Status::unavailable("transport dropped"));
    }
}

fn call_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[async_trait]
impl Transport for WsTransport {
    async fn unary(&self, request: Request) -> Result<Value, Status> {
        let id = call_id();
        let (tx, rx) = oneshot::channel();
        self.shared.register(&id, Pending::Reply(tx))?;
        let _guard = PendingGuard::new(&self.shared, &id);

        debug!(id = %id, method = %request.method, "Sending request");
        self.shared.open(&id, request).await?;

        rx.await
            .unwrap_or_else(|_| Err(Status::unavailable("connection closed")))
    }

    async fn open_upload(&self, request: Request) -> Result<UploadChannel, Status> {
        let id = call_id();
        let (reply_tx, reply_rx) = oneshot::channel();
        self.shared.register(&id, Pending::Reply(reply_tx))?;
        let guard = PendingGuard::new(&self.shared, &id);

        debug!(id = %id, method = %request.method, "Opening upload");
        self.shared.open(&id, request).await?;
        guard.disarm();

        let (frames_tx, mut frames_rx) = mpsc::channel(STREAM_CAPACITY);
        let shared = self.shared.clone();
        tokio::spawn(async move {
            loop {
                match frames_rx.recv().await {
                    Some(UploadFrame::Chunk(chunk)) => {
                        if !shared.pending.contains_key(&id) {
                            // Already answered, most likely with an error.
                            return;
                        }
                        if shared
                            .send_frame(methods::STREAM_CHUNK, &id, Some(chunk))
                            .await
                            .is_err()
                        {
                            return;
                        }
                    }
                    Some(UploadFrame::Finish) => {
                        let _ = shared.send_frame(methods::STREAM_END, &id, None).await;
                        return;
                    }
                    None => {
                        if shared.pending.remove(&id).is_some() {
                            debug!(id = %id, "Upload abandoned, cancelling");
                            let _ = shared.send_frame(methods::STREAM_CANCEL, &id, None).await;
                        }
                        return;
                    }
                }
            }
        });

        Ok(UploadChannel::new(frames_tx, reply_rx))
    }

    async fn open_download(&self, request: Request) -> Result<DownloadChannel, Status> {
        let id = call_id();
        let (route, queued, backlog) = StreamRoute::new(MAX_DOWNLOAD_BACKLOG);
        self.shared.register(&id, Pending::Stream(route))?;
        let guard = PendingGuard::new(&self.shared, &id);

        debug!(id = %id, method = %request.method, "Opening download");
        self.shared.open(&id, request).await?;
        guard.disarm();

        let (tx, rx) = mpsc::channel(STREAM_CAPACITY);
        tokio::spawn(forward(self.shared.clone(), id, queued, backlog, tx));

        Ok(DownloadChannel::new(rx))
    }
}
