//! Loopback secret backend for integration tests.
//!
//! [`Backend`] speaks the same JSON-RPC over WebSocket protocol as the real
//! service: accounts with bearer tokens, versioned secrets per account, and
//! `[Info][Data]*` streams in both directions. State lives in memory and
//! disappears with the backend.

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use strongbox_client::rpc::{JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
use strongbox_client::transport::AUTHORIZATION;
use strongbox_client::wire::{
    methods, Chunk, SecretList, SecretPayload, SecretRef, StreamFrame, TokenResponse,
    UserCredentials, WireSecretInfo, WireSecretType,
};
use strongbox_client::{AuthClient, SecretClient, WsTransport, CHUNK_SIZE};
use strongbox_core::{AuthService, SecretService, TokenStore};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Services wired over one connection to a [`Backend`].
pub struct Session {
    pub transport: Arc<WsTransport>,
    pub secrets: SecretService<SecretClient<Arc<WsTransport>>>,
    pub auth: AuthService<AuthClient<Arc<WsTransport>>>,
}

#[derive(Clone)]
struct Stored {
    info: WireSecretInfo,
    data: Vec<u8>,
}

#[derive(Default)]
struct State {
    users: Mutex<HashMap<String, String>>,
    sessions: Mutex<HashMap<String, String>>,
    vault: Mutex<HashMap<String, BTreeMap<String, Vec<Stored>>>>,
    delays: Mutex<HashMap<String, Duration>>,
    chunk_delay: Mutex<Option<Duration>>,
    connections: Mutex<Vec<JoinHandle<()>>>,
    requests: Mutex<Vec<JsonRpcRequest>>,
    data_chunks: AtomicUsize,
    cancellations: AtomicUsize,
}

impl State {
    fn delay_for(&self, method: &str) -> Option<Duration> {
        self.delays.lock().unwrap().get(method).copied()
    }

    fn login_for(&self, request: &JsonRpcRequest) -> Option<String> {
        let token = request.meta.get(AUTHORIZATION)?.strip_prefix("Bearer ")?;
        self.sessions.lock().unwrap().get(token).cloned()
    }

    fn issue_token(&self, login: &str) -> String {
        let token = uuid::Uuid::new_v4().to_string();
        self.sessions
            .lock()
            .unwrap()
            .insert(token.clone(), login.to_string());
        token
    }

    fn store(&self, login: &str, mut info: WireSecretInfo, data: Vec<u8>) -> Result<u32, JsonRpcError> {
        if info.name.trim().is_empty() {
            return Err(JsonRpcError::invalid_params("secret name is required"));
        }
        if info.secret_type == WireSecretType::Unknown {
            return Err(JsonRpcError::invalid_params("unknown secret type"));
        }

        let mut vault = self.vault.lock().unwrap();
        let versions = vault
            .entry(login.to_string())
            .or_default()
            .entry(info.name.clone())
            .or_default();
        let version = versions.len() as u32 + 1;
        info.version = Some(version);
        info.created_at = Some(Utc::now());
        versions.push(Stored { info, data });
        Ok(version)
    }

    fn lookup(&self, login: &str, reference: &SecretRef) -> Result<Stored, JsonRpcError> {
        let vault = self.vault.lock().unwrap();
        let versions = vault
            .get(login)
            .and_then(|secrets| secrets.get(&reference.name))
            .ok_or_else(|| JsonRpcError::not_found(format!("secret '{}'", reference.name)))?;

        let found = match reference.version {
            None | Some(0) => versions.last(),
            Some(n) => versions.get(n as usize - 1),
        };
        found.cloned().ok_or_else(|| {
            JsonRpcError::not_found(format!(
                "secret '{}' version {}",
                reference.name,
                reference.version.unwrap_or(0)
            ))
        })
    }

    fn handle_unary(&self, request: &JsonRpcRequest) -> Result<Value, JsonRpcError> {
        let params = request.params.clone().unwrap_or(Value::Null);

        match request.method.as_str() {
            methods::AUTH_REGISTER => {
                let creds: UserCredentials = parse(params)?;
                if creds.login.is_empty() || creds.password.is_empty() {
                    return Err(JsonRpcError::invalid_params("login and password are required"));
                }
                {
                    let mut users = self.users.lock().unwrap();
                    if users.contains_key(&creds.login) {
                        return Err(JsonRpcError::already_exists("login taken"));
                    }
                    users.insert(creds.login.clone(), creds.password.clone());
                }
                token_response(self.issue_token(&creds.login))
            }
            methods::AUTH_LOGIN => {
                let creds: UserCredentials = parse(params)?;
                let valid = self.users.lock().unwrap().get(&creds.login) == Some(&creds.password);
                if !valid {
                    return Err(JsonRpcError::invalid_params("bad credentials"));
                }
                token_response(self.issue_token(&creds.login))
            }
            method => {
                let login = self
                    .login_for(request)
                    .ok_or_else(|| JsonRpcError::unauthenticated("missing or invalid token"))?;
                self.handle_secret_call(method, &login, params)
            }
        }
    }

    fn handle_secret_call(&self, method: &str, login: &str, params: Value) -> Result<Value, JsonRpcError> {
        match method {
            methods::SECRETS_CREATE => {
                let payload: SecretPayload = parse(params)?;
                self.store(login, payload.info, payload.data)?;
                Ok(json!({}))
            }
            methods::SECRETS_LIST => {
                let names = self
                    .vault
                    .lock()
                    .unwrap()
                    .get(login)
                    .map(|secrets| secrets.keys().cloned().collect())
                    .unwrap_or_default();
                Ok(serde_json::to_value(SecretList { names }).unwrap())
            }
            methods::SECRETS_GET => {
                let reference: SecretRef = parse(params)?;
                let stored = self.lookup(login, &reference)?;
                Ok(serde_json::to_value(SecretPayload {
                    info: stored.info,
                    data: stored.data,
                })
                .unwrap())
            }
            methods::SECRETS_DELETE => {
                let reference: SecretRef = parse(params)?;
                let removed = self
                    .vault
                    .lock()
                    .unwrap()
                    .get_mut(login)
                    .and_then(|secrets| secrets.remove(&reference.name));
                match removed {
                    Some(_) => Ok(json!({})),
                    None => Err(JsonRpcError::not_found(format!("secret '{}'", reference.name))),
                }
            }
            other => Err(JsonRpcError::method_not_found(other)),
        }
    }
}

fn parse<T: serde::de::DeserializeOwned>(params: Value) -> Result<T, JsonRpcError> {
    serde_json::from_value(params).map_err(|e| JsonRpcError::invalid_params(e.to_string()))
}

fn token_response(token: String) -> Result<Value, JsonRpcError> {
    Ok(serde_json::to_value(TokenResponse { token }).unwrap())
}

enum UploadEvent {
    Chunk(Value),
    End,
    Cancel,
}

type Outbound = mpsc::UnboundedSender<String>;

fn reply(out: &Outbound, id: Value, outcome: Result<Value, JsonRpcError>) {
    let response = match outcome {
        Ok(result) => JsonRpcResponse::success(Some(id), result),
        Err(error) => JsonRpcResponse::error(Some(id), error),
    };
    let _ = out.send(serde_json::to_string(&response).unwrap());
}

fn send_chunk(out: &Outbound, id: &str, chunk: &Chunk) {
    let frame = StreamFrame {
        id: id.to_string(),
        chunk: Some(serde_json::to_value(chunk).unwrap()),
    };
    let note = JsonRpcNotification::new(methods::STREAM_CHUNK, serde_json::to_value(frame).unwrap());
    let _ = out.send(serde_json::to_string(&note).unwrap());
}

/// An in-memory backend listening on a loopback port.
pub struct Backend {
    addr: SocketAddr,
    state: Arc<State>,
    accept: JoinHandle<()>,
}

impl Backend {
    /// Bind to an ephemeral loopback port and start accepting connections.
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(State::default());

        let accept_state = state.clone();
        let accept = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let connection = tokio::spawn(serve(accept_state.clone(), stream));
                accept_state.connections.lock().unwrap().push(connection);
            }
        });

        Self { addr, state, accept }
    }

    /// WebSocket URL of this backend.
    pub fn url(&self) -> String {
        format!("ws://{}/rpc", self.addr)
    }

    /// Open a connection and wire the services over it.
    pub async fn session(&self, tokens: Arc<dyn TokenStore>) -> Session {
        let transport = Arc::new(WsTransport::connect(&self.url(), None).await.unwrap());
        Session {
            secrets: SecretService::new(SecretClient::new(transport.clone(), tokens.clone())),
            auth: AuthService::new(AuthClient::new(transport.clone()), tokens),
            transport,
        }
    }

    /// Create an account directly and return a valid token for it.
    pub fn add_user(&self, login: &str, password: &str) -> String {
        self.state
            .users
            .lock()
            .unwrap()
            .insert(login.to_string(), password.to_string());
        self.state.issue_token(login)
    }

    /// Hold back responses to `method` for `delay`.
    pub fn delay(&self, method: &str, delay: Duration) {
        self.state
            .delays
            .lock()
            .unwrap()
            .insert(method.to_string(), delay);
    }

    /// Pause between data chunks of downloads.
    pub fn slow_downloads(&self, delay: Duration) {
        *self.state.chunk_delay.lock().unwrap() = Some(delay);
    }

    /// Number of stored versions of `name` for `login`.
    pub fn versions(&self, login: &str, name: &str) -> usize {
        self.state
            .vault
            .lock()
            .unwrap()
            .get(login)
            .and_then(|secrets| secrets.get(name))
            .map_or(0, Vec::len)
    }

    /// Requests received so far, in arrival order. Stream frames are not included.
    pub fn requests(&self) -> Vec<JsonRpcRequest> {
        self.state.requests.lock().unwrap().clone()
    }

    /// Upload data chunks received so far.
    pub fn data_chunks(&self) -> usize {
        self.state.data_chunks.load(Ordering::SeqCst)
    }

    /// `stream.cancel` frames received so far.
    pub fn cancellations(&self) -> usize {
        self.state.cancellations.load(Ordering::SeqCst)
    }

    /// Drop every open connection.
    pub fn disconnect_all(&self) {
        for connection in self.state.connections.lock().unwrap().drain(..) {
            connection.abort();
        }
    }
}

impl Drop for Backend {
    fn drop(&mut self) {
        self.accept.abort();
        self.disconnect_all();
    }
}

async fn serve(state: Arc<State>, stream: TcpStream) {
    let Ok(socket) = tokio_tungstenite::accept_async(stream).await else {
        return;
    };
    let (mut sink, mut source) = socket.split();

    let (out, mut out_rx) = mpsc::unbounded_channel::<String>();
    let _writer = AbortOnDrop(tokio::spawn(async move {
        while let Some(text) = out_rx.recv().await {
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    }));

    let mut uploads: HashMap<String, mpsc::UnboundedSender<UploadEvent>> = HashMap::new();
    let mut downloads: HashMap<String, CancellationToken> = HashMap::new();

    while let Some(Ok(message)) = source.next().await {
        let Message::Text(text) = message else {
            continue;
        };
        let request: JsonRpcRequest = match serde_json::from_str(&text) {
            Ok(request) => request,
            Err(e) => {
                reply(&out, Value::Null, Err(JsonRpcError::parse_error(e.to_string())));
                continue;
            }
        };

        let Some(id) = request.id.clone() else {
            on_stream_frame(&state, &request, &mut uploads, &mut downloads);
            continue;
        };
        let id_str = request.id_str().unwrap_or_default().to_string();
        state.requests.lock().unwrap().push(request.clone());
        debug!(id = %id_str, method = %request.method, "Backend received request");

        match request.method.as_str() {
            methods::SECRETS_CREATE_STREAM => {
                let Some(login) = state.login_for(&request) else {
                    reply(&out, id, Err(JsonRpcError::unauthenticated("missing or invalid token")));
                    continue;
                };
                let (tx, rx) = mpsc::unbounded_channel();
                uploads.insert(id_str, tx);
                tokio::spawn(receive_upload(state.clone(), login, id, rx, out.clone()));
            }
            methods::SECRETS_GET_STREAM => {
                let Some(login) = state.login_for(&request) else {
                    reply(&out, id, Err(JsonRpcError::unauthenticated("missing or invalid token")));
                    continue;
                };
                let cancel = CancellationToken::new();
                downloads.insert(id_str, cancel.clone());
                tokio::spawn(send_download(
                    state.clone(),
                    login,
                    id,
                    request.params.clone().unwrap_or(Value::Null),
                    out.clone(),
                    cancel,
                ));
            }
            _ => {
                let state = state.clone();
                let out = out.clone();
                tokio::spawn(async move {
                    if let Some(delay) = state.delay_for(&request.method) {
                        tokio::time::sleep(delay).await;
                    }
                    let outcome = state.handle_unary(&request);
                    reply(&out, id, outcome);
                });
            }
        }
    }

    for (_, cancel) in downloads {
        cancel.cancel();
    }
}

/// Stops the connection's writer, closing the socket, when the connection task ends.
struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn on_stream_frame(
    state: &State,
    note: &JsonRpcRequest,
    uploads: &mut HashMap<String, mpsc::UnboundedSender<UploadEvent>>,
    downloads: &mut HashMap<String, CancellationToken>,
) {
    let Some(frame) = note
        .params
        .clone()
        .and_then(|params| serde_json::from_value::<StreamFrame>(params).ok())
    else {
        return;
    };

    match note.method.as_str() {
        methods::STREAM_CHUNK => {
            if let (Some(tx), Some(chunk)) = (uploads.get(&frame.id), frame.chunk) {
                let _ = tx.send(UploadEvent::Chunk(chunk));
            }
        }
        methods::STREAM_END => {
            if let Some(tx) = uploads.remove(&frame.id) {
                let _ = tx.send(UploadEvent::End);
            }
        }
        methods::STREAM_CANCEL => {
            state.cancellations.fetch_add(1, Ordering::SeqCst);
            if let Some(tx) = uploads.remove(&frame.id) {
                let _ = tx.send(UploadEvent::Cancel);
            }
            if let Some(cancel) = downloads.remove(&frame.id) {
                cancel.cancel();
            }
        }
        _ => {}
    }
}

async fn receive_upload(
    state: Arc<State>,
    login: String,
    id: Value,
    mut events: mpsc::UnboundedReceiver<UploadEvent>,
    out: Outbound,
) {
    let mut info: Option<WireSecretInfo> = None;
    let mut data = Vec::new();

    while let Some(event) = events.recv().await {
        match event {
            UploadEvent::Chunk(value) => match serde_json::from_value::<Chunk>(value) {
                Ok(Chunk::Info(first)) if info.is_none() => info = Some(first),
                Ok(Chunk::Info(_)) => {
                    reply(&out, id, Err(JsonRpcError::invalid_params("second info chunk")));
                    return;
                }
                Ok(Chunk::Data { data: bytes }) => {
                    if info.is_none() {
                        reply(&out, id, Err(JsonRpcError::invalid_params("data before info")));
                        return;
                    }
                    state.data_chunks.fetch_add(1, Ordering::SeqCst);
                    data.extend_from_slice(&bytes);
                }
                Err(e) => {
                    reply(&out, id, Err(JsonRpcError::invalid_params(e.to_string())));
                    return;
                }
            },
            UploadEvent::End => {
                if let Some(delay) = state.delay_for(methods::SECRETS_CREATE_STREAM) {
                    tokio::time::sleep(delay).await;
                }
                let outcome = match info.take() {
                    Some(info) => state.store(&login, info, data).map(|_| json!({})),
                    None => Err(JsonRpcError::invalid_params("stream ended without info")),
                };
                reply(&out, id, outcome);
                return;
            }
            UploadEvent::Cancel => return,
        }
    }
}

async fn send_download(
    state: Arc<State>,
    login: String,
    id: Value,
    params: Value,
    out: Outbound,
    cancel: CancellationToken,
) {
    if let Some(delay) = state.delay_for(methods::SECRETS_GET_STREAM) {
        tokio::time::sleep(delay).await;
    }

    let stored = match parse::<SecretRef>(params).and_then(|reference| state.lookup(&login, &reference)) {
        Ok(stored) => stored,
        Err(error) => {
            reply(&out, id, Err(error));
            return;
        }
    };

    let id_str = id.as_str().unwrap_or_default().to_string();
    send_chunk(&out, &id_str, &Chunk::Info(stored.info));

    let chunk_delay = *state.chunk_delay.lock().unwrap();
    for piece in stored.data.chunks(CHUNK_SIZE) {
        if let Some(delay) = chunk_delay {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        if cancel.is_cancelled() {
            return;
        }
        send_chunk(&out, &id_str, &Chunk::Data { data: piece.to_vec() });
    }

    reply(&out, id, Ok(json!({})));
}
