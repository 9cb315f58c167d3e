//! Newline-delimited JSON-RPC transport
//!
//! Works over any byte stream pair: a child process's stdin/stdout for local
//! servers, or both halves of a TCP socket.

use crate::core::protocol::{JsonRpcRequest, JsonRpcResponse, RequestId};
use crate::transport::traits::Transport;
use crate::utils::errors::{GatewayError, GatewayResult};
use async_trait::async_trait;
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader};
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec, LinesCodecError};
use tracing::{debug, error, info, warn};

type PendingMap = Arc<DashMap<RequestId, oneshot::Sender<JsonRpcResponse>>>;
type LineSink = FramedWrite<Box<dyn AsyncWrite + Send + Unpin>, LinesCodec>;

pub struct LineTransport {
    label: String,
    sink: Mutex<LineSink>,
    pending: PendingMap,
    connected: Arc<watch::Sender<bool>>,
    next_id: AtomicI64,
    child: Mutex<Option<Child>>,
    reader: JoinHandle<()>,
}

impl LineTransport {
    /// Wrap an already-open byte stream pair.
    pub fn new<R, W>(label: impl Into<String>, reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self::from_parts(label.into(), reader, writer, None)
    }

    /// Spawn a local server process and talk to it over stdio.
    pub async fn spawn_process(
        label: impl Into<String>,
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
    ) -> GatewayResult<Self> {
        let label = label.into();
        let mut child = Command::new(command)
            .args(args)
            .envs(env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| GatewayError::Transport(format!("Failed to spawn '{}': {}", command, e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| GatewayError::Transport("Failed to open stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| GatewayError::Transport("Failed to open stdout".to_string()))?;

        if let Some(stderr) = child.stderr.take() {
            let server = label.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(server = %server, "stderr: {}", line);
                }
            });
        }

        info!("Spawned server process '{}' for {}", command, label);
        Ok(Self::from_parts(label, stdout, stdin, Some(child)))
    }

    /// Connect to a server listening on a TCP socket.
    pub async fn connect_tcp(label: impl Into<String>, address: &str) -> GatewayResult<Self> {
        let stream = TcpStream::connect(address)
            .await
            .map_err(|e| GatewayError::Transport(format!("Failed to connect to {}: {}", address, e)))?;
        let (reader, writer) = stream.into_split();
        Ok(Self::from_parts(label.into(), reader, writer, None))
    }

    fn from_parts<R, W>(label: String, reader: R, writer: W, child: Option<Child>) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let pending: PendingMap = Arc::new(DashMap::new());
        let (connected, _) = watch::channel(true);
        let connected = Arc::new(connected);

        let lines = FramedRead::new(reader, LinesCodec::new());
        let reader = tokio::spawn(read_loop(
            label.clone(),
            lines,
            pending.clone(),
            connected.clone(),
        ));

        let writer: Box<dyn AsyncWrite + Send + Unpin> = Box::new(writer);

        Self {
            label,
            sink: Mutex::new(FramedWrite::new(writer, LinesCodec::new())),
            pending,
            connected,
            next_id: AtomicI64::new(1),
            child: Mutex::new(child),
            reader,
        }
    }

    /// Number of requests still waiting for a response
    pub fn pending_requests(&self) -> usize {
        self.pending.len()
    }

    async fn write_line(&self, line: String) -> GatewayResult<()> {
        let mut sink = self.sink.lock().await;
        sink.send(line).await.map_err(codec_error)
    }
}

async fn read_loop<R>(
    label: String,
    mut lines: FramedRead<R, LinesCodec>,
    pending: PendingMap,
    connected: Arc<watch::Sender<bool>>,
) where
    R: AsyncRead + Unpin,
{
    while let Some(line) = lines.next().await {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!("Read error on '{}': {}", label, e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        debug!("Received from '{}': {}", label, line);

        let value: Value = match serde_json::from_str(&line) {
            Ok(value) => value,
            Err(e) => {
                warn!("Failed to parse message from '{}': {}", label, e);
                continue;
            }
        };

        // Server-initiated requests and notifications carry a method.
        if value.get("method").is_some() {
            debug!("Ignoring server-initiated message on '{}'", label);
            continue;
        }

        match serde_json::from_value::<JsonRpcResponse>(value) {
            Ok(response) => match response.id.clone() {
                Some(id) => {
                    if let Some((_, tx)) = pending.remove(&id) {
                        let _ = tx.send(response);
                    } else {
                        warn!("Received response with unknown id on '{}': {:?}", label, id);
                    }
                }
                None => debug!("Received response without id on '{}', ignoring", label),
            },
            Err(e) => warn!("Malformed response on '{}': {}", label, e),
        }
    }

    info!("Transport '{}' reader ended", label);
    connected.send_replace(false);
    pending.clear();
}

fn codec_error(e: LinesCodecError) -> GatewayError {
    match e {
        LinesCodecError::Io(e) => GatewayError::Io(e),
        other => GatewayError::Transport(other.to_string()),
    }
}

/// Removes a pending entry when the waiting caller goes away (e.g. timed out).
struct PendingGuard<'a> {
    pending: &'a PendingMap,
    id: RequestId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.remove(&self.id);
    }
}

#[async_trait]
impl Transport for LineTransport {
    async fn send_request(&self, mut request: JsonRpcRequest) -> GatewayResult<JsonRpcResponse> {
        if !self.is_connected().await {
            return Err(GatewayError::Transport(format!(
                "Transport '{}' not connected",
                self.label
            )));
        }

        let id = match request.id.clone() {
            Some(id) => id,
            None => {
                let id = RequestId::Number(self.next_id.fetch_add(1, Ordering::SeqCst));
                request.id = Some(id.clone());
                id
            }
        };

        let (tx, rx) = oneshot::channel();
        self.pending.insert(id.clone(), tx);
        let _guard = PendingGuard {
            pending: &self.pending,
            id,
        };
        // The reader clears `pending` when it exits; an entry added after that would never resolve.
        if !self.is_connected().await {
            return Err(GatewayError::Transport(format!(
                "Transport '{}' not connected",
                self.label
            )));
        }

        let line = serde_json::to_string(&request)?;
        debug!("Sending to '{}': {}", self.label, line);
        self.write_line(line).await?;

        rx.await
            .map_err(|_| GatewayError::Transport("Response channel closed".to_string()))
    }

    async fn send_notification(&self, mut request: JsonRpcRequest) -> GatewayResult<()> {
        if !self.is_connected().await {
            return Err(GatewayError::Transport(format!(
                "Transport '{}' not connected",
                self.label
            )));
        }

        request.id = None;
        let line = serde_json::to_string(&request)?;
        debug!("Sending notification to '{}': {}", self.label, line);
        self.write_line(line).await
    }

    async fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    async fn close(&self) -> GatewayResult<()> {
        {
            let mut sink = self.sink.lock().await;
            if let Err(e) = SinkExt::<String>::close(&mut *sink).await {
                debug!("Error closing writer for '{}': {}", self.label, e);
            }
        }

        if let Some(mut child) = self.child.lock().await.take() {
            if let Err(e) = child.start_kill() {
                warn!("Failed to kill child process for '{}': {}", self.label, e);
            }
            match tokio::time::timeout(Duration::from_secs(5), child.wait()).await {
                Ok(Ok(status)) => info!("Server process for '{}' exited with: {:?}", self.label, status),
                Ok(Err(e)) => error!("Failed to wait for '{}': {}", self.label, e),
                Err(_) => warn!("Timeout waiting for server process '{}'", self.label),
            }
        }

        self.reader.abort();
        self.connected.send_replace(false);
        self.pending.clear();
        Ok(())
    }

    async fn closed(&self) {
        let mut rx = self.connected.subscribe();
        loop {
            let connected = *rx.borrow_and_update();
            if !connected {
                break;
            }
            if rx.changed().await.is_err() {
                break;
            }
        }
    }
}

impl Drop for LineTransport {
    fn drop(&mut self) {
        self.reader.abort();
    }
}
