//! Line-JSON transport over a child process's stdio.

use async_trait::async_trait;
use cadence_core::agent::{AgentTransport, LaunchedAgent, TransportEvent};
use cadence_core::protocol::{EventFramer, OutboundMessage};
use cadence_core::{CadenceError, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin};
use tokio::sync::{Mutex, mpsc, oneshot};

const READ_CHUNK: usize = 8 * 1024;

/// Write side of a spawned agent.
///
/// Three background tasks serve each process: a stdout reader that frames
/// chunks into records, a stderr drain, and a waiter that owns the child and
/// reports its exit. `Exited` is always the last event on the channel.
pub struct ProcessTransport {
    session_id: String,
    stdin: Mutex<Option<ChildStdin>>,
    kill: Mutex<Option<oneshot::Sender<()>>>,
    alive: Arc<AtomicBool>,
}

impl ProcessTransport {
    /// Takes ownership of `child` (spawned with piped stdio) and starts its tasks.
    pub fn start(session_id: impl Into<String>, mut child: Child) -> Result<LaunchedAgent> {
        let session_id = session_id.into();
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| CadenceError::transport("agent stdin is not piped"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| CadenceError::transport("agent stdout is not piped"))?;
        let stderr = child.stderr.take();

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (kill_tx, kill_rx) = oneshot::channel();
        let (exit_tx, exit_rx) = oneshot::channel();
        let alive = Arc::new(AtomicBool::new(true));

        tokio::spawn(wait_for_exit(session_id.clone(), child, kill_rx, exit_tx));
        tokio::spawn(read_stdout(
            session_id.clone(),
            stdout,
            events_tx,
            exit_rx,
            alive.clone(),
        ));
        if let Some(stderr) = stderr {
            tokio::spawn(drain_stderr(session_id.clone(), stderr));
        }

        tracing::info!("[Agent] {} transport started", session_id);

        let transport = Arc::new(Self {
            session_id,
            stdin: Mutex::new(Some(stdin)),
            kill: Mutex::new(Some(kill_tx)),
            alive,
        });

        Ok(LaunchedAgent {
            transport,
            events: events_rx,
        })
    }
}

#[async_trait]
impl AgentTransport for ProcessTransport {
    async fn send(&self, message: &OutboundMessage) -> Result<()> {
        if !self.is_alive() {
            return Err(CadenceError::transport(format!(
                "agent for session {} is not running",
                self.session_id
            )));
        }
        let line = message.to_line()?;

        let mut guard = self.stdin.lock().await;
        let stdin = guard
            .as_mut()
            .ok_or_else(|| CadenceError::transport("agent stdin is closed"))?;
        stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| CadenceError::transport(format!("write to agent failed: {}", e)))?;
        stdin
            .flush()
            .await
            .map_err(|e| CadenceError::transport(format!("flush to agent failed: {}", e)))?;

        tracing::debug!("[Agent] {} <- {} bytes", self.session_id, line.len());
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        // Closing stdin first lets a well-behaved agent exit on its own.
        self.stdin.lock().await.take();
        if let Some(kill) = self.kill.lock().await.take() {
            let _ = kill.send(());
            tracing::info!("[Agent] {} shutdown requested", self.session_id);
        }
        Ok(())
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }
}

async fn wait_for_exit(
    session_id: String,
    mut child: Child,
    kill_rx: oneshot::Receiver<()>,
    exit_tx: oneshot::Sender<Option<i32>>,
) {
    let status = tokio::select! {
        status = child.wait() => status,
        _ = kill_rx => {
            if let Err(e) = child.kill().await {
                tracing::warn!("[Agent] {} kill failed: {}", session_id, e);
            }
            child.wait().await
        }
    };

    let code = match status {
        Ok(status) => status.code(),
        Err(e) => {
            tracing::error!("[Agent] {} wait failed: {}", session_id, e);
            None
        }
    };
    tracing::info!("[Agent] {} exited with {:?}", session_id, code);
    let _ = exit_tx.send(code);
}

async fn read_stdout<R>(
    session_id: String,
    mut stdout: R,
    events: mpsc::UnboundedSender<TransportEvent>,
    exit_rx: oneshot::Receiver<Option<i32>>,
    alive: Arc<AtomicBool>,
) where
    R: AsyncRead + Unpin,
{
    let mut framer = EventFramer::new();
    let mut buf = vec![0u8; READ_CHUNK];

    loop {
        match stdout.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                for frame in framer.push(&buf[..n]) {
                    if events.send(TransportEvent::Frame(frame)).is_err() {
                        tracing::debug!("[Agent] {} event receiver dropped", session_id);
                        return;
                    }
                }
            }
            Err(e) => {
                tracing::warn!("[Agent] {} stdout read failed: {}", session_id, e);
                break;
            }
        }
    }

    for frame in framer.finish() {
        let _ = events.send(TransportEvent::Frame(frame));
    }

    let code = exit_rx.await.unwrap_or(None);
    alive.store(false, Ordering::SeqCst);
    let _ = events.send(TransportEvent::Exited { code });
}

async fn drain_stderr<R>(session_id: String, stderr: R)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if !line.trim().is_empty() => {
                tracing::warn!("[Agent] {} stderr: {}", session_id, line);
            }
            Ok(Some(_)) => {}
            Ok(None) => break,
            Err(e) => {
                tracing::debug!("[Agent] {} stderr closed: {}", session_id, e);
                break;
            }
        }
    }
}
