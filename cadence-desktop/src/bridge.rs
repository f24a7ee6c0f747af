//! Line-JSON bridge between the UI process and the application.
//!
//! Every input line is a request `{"id", "command", "args"}` and gets exactly
//! one response `{"id", "ok"}` or `{"id", "error"}`. Session events and
//! diagnostics are written between responses as they happen. Requests are
//! handled one at a time in arrival order.

use std::io;
use std::sync::Arc;

use cadence_core::CadenceError;
use cadence_core::session::UiEvent;
use cadence_execution::DiagnosticEvent;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::app::AppContext;
use crate::commands;

#[derive(Debug, Deserialize)]
struct Request {
    #[serde(default)]
    id: Value,
    command: String,
    #[serde(default)]
    args: Value,
}

fn response(id: Value, result: Result<Value, CadenceError>) -> Value {
    match result {
        Ok(value) => json!({ "id": id, "ok": value }),
        Err(error) => json!({
            "id": id,
            "error": { "message": error.to_string(), "detail": error },
        }),
    }
}

fn to_line(value: &Value) -> Option<String> {
    match serde_json::to_string(value) {
        Ok(line) => Some(line),
        Err(e) => {
            tracing::error!("[Bridge] failed to encode outgoing message: {}", e);
            None
        }
    }
}

fn forward<T, F>(
    mut rx: mpsc::UnboundedReceiver<T>,
    lines: mpsc::UnboundedSender<String>,
    encode: F,
) -> JoinHandle<()>
where
    T: Send + 'static,
    F: Fn(T) -> Value + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(item) = rx.recv().await {
            if let Some(line) = to_line(&encode(item)) {
                if lines.send(line).is_err() {
                    break;
                }
            }
        }
    })
}

/// Serves requests from `input` until it closes, then hands `output` back.
pub async fn serve<R, W>(
    ctx: Arc<AppContext>,
    input: R,
    output: W,
    ui_events: mpsc::UnboundedReceiver<UiEvent>,
    diagnostics: Option<mpsc::UnboundedReceiver<DiagnosticEvent>>,
) -> io::Result<W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (line_tx, mut line_rx) = mpsc::unbounded_channel::<String>();

    let writer = tokio::spawn(async move {
        let mut output = output;
        while let Some(line) = line_rx.recv().await {
            output.write_all(line.as_bytes()).await?;
            output.write_all(b"\n").await?;
            output.flush().await?;
        }
        Ok::<W, io::Error>(output)
    });

    let mut forwarders = vec![forward(ui_events, line_tx.clone(), |event| {
        serde_json::to_value(event).unwrap_or(Value::Null)
    })];
    if let Some(diagnostics) = diagnostics {
        forwarders.push(forward(diagnostics, line_tx.clone(), |diagnostic| {
            json!({ "event": "diagnostic", "payload": diagnostic })
        }));
    }

    let mut lines = BufReader::new(input).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let reply = match serde_json::from_str::<Request>(&line) {
            Ok(request) => {
                tracing::debug!("[Bridge] {} (id {})", request.command, request.id);
                let result = commands::dispatch(&ctx, &request.command, request.args).await;
                if let Err(e) = &result {
                    tracing::debug!("[Bridge] {} failed: {}", request.command, e);
                }
                response(request.id, result)
            }
            Err(e) => {
                tracing::warn!("[Bridge] malformed request: {}", e);
                response(
                    Value::Null,
                    Err(CadenceError::invalid_input(format!("Malformed request: {}", e))),
                )
            }
        };

        if let Some(line) = to_line(&reply) {
            if line_tx.send(line).is_err() {
                break;
            }
        }
    }

    tracing::info!("[Bridge] input closed");
    for forwarder in forwarders {
        forwarder.abort();
        let _ = forwarder.await;
    }
    drop(line_tx);

    writer
        .await
        .map_err(|e| io::Error::other(format!("writer task failed: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::bootstrap_with_launcher;
    use async_trait::async_trait;
    use cadence_application::ChannelEventSink;
    use cadence_core::Result;
    use cadence_core::agent::{
        AgentLauncher, AgentTransport, LaunchRequest, LaunchedAgent, TransportEvent,
    };
    use cadence_core::config::AppConfig;
    use cadence_core::protocol::OutboundMessage;
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct SilentTransport;

    #[async_trait]
    impl AgentTransport for SilentTransport {
        async fn send(&self, _message: &OutboundMessage) -> Result<()> {
            Ok(())
        }

        async fn shutdown(&self) -> Result<()> {
            Ok(())
        }

        fn is_alive(&self) -> bool {
            true
        }
    }

    // Keeps event senders alive so sessions never see their agent exit
    #[derive(Default)]
    struct SilentLauncher {
        senders: Mutex<Vec<mpsc::UnboundedSender<TransportEvent>>>,
    }

    #[async_trait]
    impl AgentLauncher for SilentLauncher {
        async fn launch(&self, _request: &LaunchRequest) -> Result<LaunchedAgent> {
            let (tx, rx) = mpsc::unbounded_channel();
            self.senders.lock().unwrap().push(tx);
            Ok(LaunchedAgent {
                transport: Arc::new(SilentTransport),
                events: rx,
            })
        }

        async fn is_available(&self) -> bool {
            true
        }
    }

    async fn run(dir: &TempDir, input: &'static str) -> Vec<Value> {
        let mut config = AppConfig::default();
        config.storage.database_path = Some(
            dir.path()
                .join("cadence.db")
                .to_string_lossy()
                .into_owned(),
        );
        config.agent.working_directory = Some(dir.path().to_string_lossy().into_owned());

        let (sink, ui_events) = ChannelEventSink::channel();
        let launcher = Arc::new(SilentLauncher::default());
        let boot = bootstrap_with_launcher(config, sink, launcher).await.unwrap();

        let output = serve(
            Arc::new(boot.context),
            input.as_bytes(),
            Vec::new(),
            ui_events,
            None,
        )
        .await
        .unwrap();

        String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .filter(|value: &Value| value.get("id").is_some())
            .collect()
    }

    #[tokio::test]
    async fn every_request_gets_one_response_in_order() {
        let dir = TempDir::new().unwrap();
        let responses = run(
            &dir,
            concat!(
                "{\"id\":1,\"command\":\"list_sessions\"}\n",
                "\n",
                "{\"id\":2,\"command\":\"open_session\"}\n",
                "{\"id\":3,\"command\":\"list_sessions\"}\n",
            ),
        )
        .await;

        assert_eq!(responses.len(), 3);
        assert_eq!(responses[0]["id"], 1);
        assert_eq!(responses[0]["ok"], json!([]));
        assert_eq!(responses[1]["ok"]["status"], "idle");
        assert_eq!(responses[2]["ok"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn errors_carry_message_and_typed_detail() {
        let dir = TempDir::new().unwrap();
        let responses = run(
            &dir,
            concat!(
                "{\"id\":\"a\",\"command\":\"no_such_command\"}\n",
                "not json\n",
                "{\"id\":\"b\",\"command\":\"send_message\",\"args\":{\"sessionId\":\"x\",\"content\":\"hi\"}}\n",
                "{\"id\":\"c\",\"command\":\"enqueue\",\"args\":{\"sessionId\":\"x\"}}\n",
            ),
        )
        .await;

        assert_eq!(responses.len(), 4);
        assert!(responses[0]["error"]["detail"]["InvalidInput"].is_string());
        assert_eq!(responses[1]["id"], Value::Null);
        assert!(responses[1]["error"]["message"].is_string());
        assert_eq!(responses[2]["error"]["detail"]["NotFound"]["entity_type"], "Session");
        assert!(responses[3]["error"]["detail"]["InvalidInput"].is_string());
    }

    #[tokio::test]
    async fn queue_commands_work_without_a_live_session() {
        let dir = TempDir::new().unwrap();
        let responses = run(
            &dir,
            concat!(
                "{\"id\":1,\"command\":\"enqueue\",\"args\":{\"sessionId\":\"s\",\"content\":\"one\"}}\n",
                "{\"id\":2,\"command\":\"enqueue\",\"args\":{\"sessionId\":\"s\",\"content\":\"two\"}}\n",
                "{\"id\":3,\"command\":\"list_queue\",\"args\":{\"sessionId\":\"s\"}}\n",
                "{\"id\":4,\"command\":\"clear_queue\",\"args\":{\"sessionId\":\"s\"}}\n",
                "{\"id\":5,\"command\":\"list_queue\",\"args\":{\"sessionId\":\"s\"}}\n",
            ),
        )
        .await;

        let listed = responses[2]["ok"].as_array().unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0]["content"], "one");
        assert_eq!(responses[3]["ok"], 2);
        assert_eq!(responses[4]["ok"], json!([]));
    }
}
