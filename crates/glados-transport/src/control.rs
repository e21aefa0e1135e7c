//! Local control socket.
//!
//! A Unix domain socket that turns framed requests into
//! [`Event::Injection`] events. One connection carries one request, read to
//! EOF. The frame is `<name-length>:<plugin-name><payload>`, for example
//! `10:PDReminderhello` addresses `PDReminder` with payload `hello`.
//! Each connection is served on its own task and cancelled with the
//! listener; requests are capped at 64 KiB.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use glados_core::{Event, EventSender};

/// Errors raised by the control socket.
#[derive(Error, Debug)]
pub enum ControlError {
    /// The request does not follow the `<len>:<name><payload>` framing.
    #[error("malformed control request: {0}")]
    Malformed(String),

    /// Socket I/O failed.
    #[error("control socket I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Splits a request into `(plugin name, payload)`.
pub fn parse_request(raw: &str) -> Result<(String, String), ControlError> {
    let (len, rest) = raw
        .split_once(':')
        .ok_or_else(|| ControlError::Malformed("missing length prefix".to_string()))?;
    let len: usize = len
        .trim()
        .parse()
        .map_err(|_| ControlError::Malformed(format!("invalid name length {len:?}")))?;
    if len == 0 {
        return Err(ControlError::Malformed("empty plugin name".to_string()));
    }
    if !rest.is_char_boundary(len.min(rest.len())) || rest.len() < len {
        return Err(ControlError::Malformed(format!(
            "name length {len} exceeds request"
        )));
    }
    let (name, payload) = rest.split_at(len);
    Ok((name.to_string(), payload.to_string()))
}

/// Builds a request frame.
pub fn encode_request(plugin: &str, payload: &str) -> String {
    format!("{}:{}{}", plugin.len(), plugin, payload)
}

/// Sends one request to the socket at `path`.
pub async fn send_request(path: &Path, plugin: &str, payload: &str) -> Result<(), ControlError> {
    let mut stream = UnixStream::connect(path).await?;
    stream
        .write_all(encode_request(plugin, payload).as_bytes())
        .await?;
    stream.shutdown().await?;
    Ok(())
}

/// Requests larger than this are cut off before parsing.
const MAX_REQUEST_BYTES: u64 = 64 * 1024;

/// A client gets this long to send its request and close its write half.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

async fn read_request(stream: UnixStream) -> Result<Vec<u8>, ControlError> {
    let mut buf = Vec::new();
    stream.take(MAX_REQUEST_BYTES).read_to_end(&mut buf).await?;
    Ok(buf)
}

/// Serves one connection; runs on its own task so a slow client never
/// holds up the listener.
async fn serve(stream: UnixStream, events: EventSender, token: CancellationToken) {
    let buf = tokio::select! {
        _ = token.cancelled() => return,
        read = timeout(REQUEST_TIMEOUT, read_request(stream)) => match read {
            Ok(Ok(buf)) => buf,
            Ok(Err(e)) => {
                warn!(error = %e, "Failed to read control request");
                return;
            }
            Err(_) => {
                warn!(timeout = ?REQUEST_TIMEOUT, "Control client sent no complete request");
                return;
            }
        },
    };
    let raw = String::from_utf8_lossy(&buf);
    match parse_request(&raw) {
        Ok((plugin, payload)) => {
            debug!(plugin = %plugin, len = payload.len(), "Control request received");
            let _ = events.send(Event::Injection { plugin, payload });
        }
        Err(e) => warn!(error = %e, "Dropping control request"),
    }
}

/// Handle to the listener task.
pub struct ControlSocket {
    path: PathBuf,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ControlSocket {
    /// Binds the socket at `path`, replacing a stale socket file, and starts
    /// accepting requests.
    pub fn bind(path: impl Into<PathBuf>, events: EventSender) -> Result<Self, ControlError> {
        let path = path.into();
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        let listener = UnixListener::bind(&path)?;
        info!(path = %path.display(), "Control socket listening");

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    accepted = listener.accept() => match accepted {
                        Ok((stream, _)) => {
                            tokio::spawn(serve(stream, events.clone(), token.child_token()));
                        }
                        Err(e) => warn!(error = %e, "Control socket accept failed"),
                    },
                }
            }
        });

        Ok(Self {
            path,
            cancel,
            task: Some(task),
        })
    }

    /// Path of the socket file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stops listening and removes the socket file. Safe to call twice.
    pub async fn stop(&mut self) {
        self.cancel.cancel();
        let Some(task) = self.task.take() else {
            return;
        };
        if let Err(e) = task.await {
            warn!(error = %e, "Control socket task failed");
        }
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %e, "Failed to remove control socket");
            }
        }
    }
}

impl Drop for ControlSocket {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
