//! Chunked transfer of streamed secrets.
//!
//! Every streamed transfer is `[Info][Data]*`: exactly one metadata message
//! first, then zero or more content fragments of at most [`CHUNK_SIZE`]
//! bytes. [`upload`] produces that sequence from a byte source and
//! [`SecretStreamReader`] turns a received one back into bytes.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use serde_json::Value;
use strongbox_core::{CallContext, KeeperError, NewSecret, Result, SecretInfo};
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};
use tracing::debug;

use crate::transport::{DownloadChannel, UploadChannel};
use crate::wire::{Chunk, WireSecretInfo};

/// Largest content fragment in one message.
pub const CHUNK_SIZE: usize = 512 * 1024;

/// Stream `source` as a new secret over an open upload channel.
///
/// Sends one Info message, then one Data message per `chunk_size` bytes
/// (the last one may be shorter), then waits for the acknowledgement. Any
/// read or send failure abandons the whole upload.
pub async fn upload<R>(
    ctx: &CallContext,
    mut channel: UploadChannel,
    secret: &NewSecret,
    source: &mut R,
    chunk_size: usize,
) -> Result<()>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let chunk_size = chunk_size.max(1);

    let info = encode(&Chunk::Info(WireSecretInfo::from(secret)))?;
    ctx.guard(async { channel.send(info).await.map_err(KeeperError::from) })
        .await?;

    let mut buf = vec![0u8; chunk_size];
    let mut chunks = 0usize;
    let mut total = 0usize;
    loop {
        let filled = ctx.guard(fill(source, &mut buf)).await?;
        if filled == 0 {
            break;
        }

        let data = encode(&Chunk::Data {
            data: buf[..filled].to_vec(),
        })?;
        ctx.guard(async { channel.send(data).await.map_err(KeeperError::from) })
            .await?;
        chunks += 1;
        total += filled;

        if filled < chunk_size {
            break;
        }
    }

    ctx.guard(async { channel.close_and_recv().await.map_err(KeeperError::from) })
        .await?;
    debug!(name = %secret.name, chunks, bytes = total, "Upload acknowledged");
    Ok(())
}

/// Read until `buf` is full or the source ends. Returns the bytes read.
async fn fill<R>(source: &mut R, buf: &mut [u8]) -> Result<usize>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = source.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

fn encode(chunk: &Chunk) -> Result<Value> {
    serde_json::to_value(chunk)
        .map_err(|e| KeeperError::Protocol(format!("cannot encode {} chunk: {e}", chunk.kind())))
}

fn decode(message: Value) -> Result<Chunk> {
    serde_json::from_value(message)
        .map_err(|e| KeeperError::Protocol(format!("malformed chunk: {e}")))
}

/// Read the leading Info message of a download and return a reader for the rest.
///
/// Fails with a protocol error, before any content is read, if the stream
/// is empty or starts with anything other than Info.
pub async fn open_reader(
    ctx: &CallContext,
    mut channel: DownloadChannel,
) -> Result<(SecretInfo, SecretStreamReader)> {
    let first = ctx
        .guard(async { channel.message().await.map_err(KeeperError::from) })
        .await?;

    let info = match first.map(decode).transpose()? {
        Some(Chunk::Info(info)) => SecretInfo::try_from(info)?,
        Some(Chunk::Data { .. }) | None => {
            return Err(KeeperError::Protocol(
                "first message must carry secret metadata".to_string(),
            ))
        }
    };

    Ok((info, SecretStreamReader::new(ctx.clone(), channel)))
}

/// A forward-only byte stream over the Data messages of a download.
///
/// Holds at most one fragment at a time. A read returns buffered bytes
/// first and only fetches the next message once the buffer is empty. Reads
/// never return more than requested. The end of the channel is end of file.
pub struct SecretStreamReader {
    fragments: BoxStream<'static, Result<Bytes>>,
    buffer: Bytes,
    done: bool,
    failed: Option<KeeperError>,
}

impl SecretStreamReader {
    fn new(ctx: CallContext, channel: DownloadChannel) -> Self {
        let fragments = stream::unfold(Some((channel, ctx)), |state| async move {
            let (mut channel, ctx) = state?;
            let next = ctx
                .guard(async { channel.message().await.map_err(KeeperError::from) })
                .await;

            match next {
                Ok(None) => None,
                Ok(Some(message)) => match decode(message) {
                    Ok(Chunk::Data { data }) => Some((Ok(Bytes::from(data)), Some((channel, ctx)))),
                    Ok(Chunk::Info(_)) => Some((
                        Err(KeeperError::Protocol(
                            "unexpected info message after stream start".to_string(),
                        )),
                        None,
                    )),
                    Err(e) => Some((Err(e), None)),
                },
                Err(e) => Some((Err(e), None)),
            }
        });

        Self {
            fragments: fragments.boxed(),
            buffer: Bytes::new(),
            done: false,
            failed: None,
        }
    }
}

impl AsyncRead for SecretStreamReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        loop {
            if let Some(err) = &this.failed {
                return Poll::Ready(Err(err.clone().into()));
            }

            if !this.buffer.is_empty() {
                let n = buf.remaining().min(this.buffer.len());
                let bytes = this.buffer.split_to(n);
                buf.put_slice(&bytes);
                return Poll::Ready(Ok(()));
            }

            if this.done {
                return Poll::Ready(Ok(()));
            }

            match this.fragments.poll_next_unpin(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Some(Ok(fragment))) => this.buffer = fragment,
                Poll::Ready(Some(Err(e))) => this.failed = Some(e),
                Poll::Ready(None) => this.done = true,
            }
        }
    }
}
