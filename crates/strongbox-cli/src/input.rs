//! Reading input from the person at the terminal.
//!
//! Free-form text is handed to the uploader through a bounded pipe: a
//! producer task reads lines and pushes them into a channel while the upload
//! drains the other end, so typed text is never collected in full first.

use std::io::{self, Write};

use bytes::Bytes;
use futures::StreamExt;
use strongbox_core::ByteStream;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::io::StreamReader;
use zeroize::Zeroizing;

/// Line that ends interactive text input.
pub const END_MARKER: &str = "end";

/// Lines buffered between the producer and the upload.
const PIPE_CAPACITY: usize = 16;

/// Start a producer that copies lines from `source` until `marker` or end of input.
///
/// Returns the consumer end as a byte stream and the producer's handle, which
/// resolves to the number of lines forwarded. The consumer sees end of input
/// once the producer stops. A read error on `source` reaches the consumer as
/// a read error rather than a silent end.
pub fn spawn_text_pipe<R>(source: R, marker: &'static str) -> (ByteStream, JoinHandle<io::Result<usize>>)
where
    R: AsyncBufRead + Send + Unpin + 'static,
{
    let (tx, rx) = mpsc::channel::<io::Result<Bytes>>(PIPE_CAPACITY);

    let producer = tokio::spawn(async move {
        let mut source = source;
        let mut forwarded = 0;
        loop {
            let mut line = Vec::new();
            match source.read_until(b'\n', &mut line).await {
                Ok(0) => break,
                Ok(_) if is_marker(&line, marker) => break,
                Ok(_) => {
                    if !line.ends_with(b"\n") {
                        line.push(b'\n');
                    }
                    if tx.send(Ok(Bytes::from(line))).await.is_err() {
                        return Err(io::Error::new(
                            io::ErrorKind::BrokenPipe,
                            "upload stopped reading input",
                        ));
                    }
                    forwarded += 1;
                }
                Err(e) => {
                    let _ = tx.send(Err(io::Error::new(e.kind(), e.to_string()))).await;
                    return Err(e);
                }
            }
        }
        Ok(forwarded)
    });

    let chunks = futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|chunk| (chunk, rx))
    })
    .boxed();

    (Box::new(StreamReader::new(chunks)), producer)
}

/// Lines are raw bytes; only a line that reads as `marker` once trimmed ends input.
fn is_marker(line: &[u8], marker: &str) -> bool {
    std::str::from_utf8(line).map_or(false, |text| text.trim() == marker)
}

/// Prompt for a password without echo.
pub fn read_password(prompt: &str) -> anyhow::Result<Zeroizing<String>> {
    let password = rpassword::prompt_password(prompt)
        .map_err(|e| anyhow::anyhow!("Failed to read password: {}", e))?;
    Ok(Zeroizing::new(password))
}

/// Use `given` if present, otherwise prompt for it without echo.
pub fn password_or_prompt(given: Option<String>, prompt: &str) -> anyhow::Result<Zeroizing<String>> {
    match given {
        Some(password) => Ok(Zeroizing::new(password)),
        None => read_password(prompt),
    }
}

/// Ask a yes/no question on stderr and read the answer from stdin.
pub fn confirm(question: &str) -> anyhow::Result<bool> {
    eprint!("{} {} ", console::style("?").for_stderr().yellow().bold(), question);
    eprint!("{}", console::style("(y/n) ").for_stderr().dim());
    io::stderr().flush()?;

    let mut answer = String::new();
    io::stdin().read_line(&mut answer)?;
    Ok(is_yes(&answer))
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
