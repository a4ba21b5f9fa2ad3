//! Stdio MCP server: reads newline-delimited JSON-RPC and routes requests.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::protocol::{RpcRequest, RpcResponse};
use crate::error::{PeekError, ToolResult};
use crate::server::tools::{self, ToolContext};

const PROTOCOL_VERSION: &str = "2024-11-05";

/// Per-session state shared by request tasks.
pub struct ServerState {
    ctx: ToolContext,
    /// In-flight `tools/call` requests, keyed by serialized request id.
    in_flight: Mutex<HashMap<String, CancellationToken>>,
}

impl ServerState {
    pub fn new(ctx: ToolContext) -> Self {
        Self {
            ctx,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Track a cancellable call. Runs on the read loop so a cancellation
    /// arriving on the next line always finds it.
    async fn register(&self, req: &RpcRequest) -> Option<CancellationToken> {
        if req.method != "tools/call" {
            return None;
        }
        let key = req.id_key()?;
        let token = CancellationToken::new();
        self.in_flight.lock().await.insert(key, token.clone());
        Some(token)
    }

    async fn finish(&self, req: &RpcRequest) {
        if let Some(key) = req.id_key() {
            self.in_flight.lock().await.remove(&key);
        }
    }

    async fn cancel(&self, params: &Value) {
        let Some(request_id) = params.get("requestId") else {
            return;
        };
        let key = request_id.to_string();
        match self.in_flight.lock().await.remove(&key) {
            Some(token) => {
                tracing::info!(request_id = %key, "Cancelling tool call");
                token.cancel();
            }
            None => tracing::debug!(request_id = %key, "Cancel for unknown or finished request"),
        }
    }

    async fn cancel_all(&self) {
        for (_, token) in self.in_flight.lock().await.drain() {
            token.cancel();
        }
    }
}

/// Serve one session until EOF on `reader` or until `shutdown` fires.
///
/// Each request runs as its own task; responses are written by a single
/// writer task in completion order.
pub async fn serve<R, W>(
    reader: R,
    writer: W,
    ctx: ToolContext,
    shutdown: CancellationToken,
) -> anyhow::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let state = Arc::new(ServerState::new(ctx));
    let mut lines = BufReader::new(reader).lines();

    // Channel for writing responses to the transport
    let (write_tx, mut write_rx) = mpsc::channel::<String>(64);

    let writer_handle = tokio::spawn(async move {
        let mut writer = BufWriter::new(writer);
        while let Some(msg) = write_rx.recv().await {
            if let Err(e) = async {
                writer.write_all(msg.as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await?;
                Ok::<(), std::io::Error>(())
            }
            .await
            {
                tracing::error!("Write error: {}", e);
                break;
            }
        }
    });

    let mut tasks = JoinSet::new();
    let mut read_error = None;

    loop {
        reap_finished(&mut tasks);

        let line = tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!("Shutdown requested, cancelling in-flight calls");
                state.cancel_all().await;
                break;
            }
            next = lines.next_line() => match next {
                Ok(Some(line)) => line,
                Ok(None) => break, // EOF
                Err(e) => {
                    read_error = Some(e);
                    break;
                }
            },
        };

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        match serde_json::from_str::<Value>(trimmed) {
            Err(e) => {
                let resp = RpcResponse::from_peek_error(Value::Null, PeekError::ParseError(e.to_string()));
                send(&write_tx, &resp).await;
            }
            Ok(Value::Array(batch)) if batch.is_empty() => {
                let resp = RpcResponse::from_peek_error(
                    Value::Null,
                    PeekError::InvalidRequest("empty batch".into()),
                );
                send(&write_tx, &resp).await;
            }
            Ok(Value::Array(batch)) => {
                // JSON-RPC 2.0 batch: items run in parallel, answered as one array
                let mut handles = Vec::with_capacity(batch.len());
                for item in batch {
                    let st = state.clone();
                    handles.push(match parse_request(item) {
                        Ok(req) => {
                            let token = st.register(&req).await;
                            tokio::spawn(async move { handle_request(req, &st, token).await })
                        }
                        Err(resp) => tokio::spawn(async move { Some(resp) }),
                    });
                }

                let tx = write_tx.clone();
                tasks.spawn(async move {
                    let mut responses = Vec::with_capacity(handles.len());
                    for handle in handles {
                        match handle.await {
                            Ok(Some(resp)) => responses.push(resp),
                            Ok(None) => {}
                            Err(e) => responses.push(RpcResponse::from_peek_error(
                                Value::Null,
                                PeekError::Internal(anyhow::anyhow!("request task failed: {}", e)),
                            )),
                        }
                    }
                    // A batch of notifications gets no reply at all
                    if !responses.is_empty() {
                        send(&tx, &responses).await;
                    }
                });
            }
            Ok(value) => match parse_request(value) {
                Ok(req) => {
                    let token = state.register(&req).await;
                    let st = state.clone();
                    let tx = write_tx.clone();
                    tasks.spawn(async move {
                        if let Some(resp) = handle_request(req, &st, token).await {
                            send(&tx, &resp).await;
                        }
                    });
                }
                Err(resp) => send(&write_tx, &resp).await,
            },
        }
    }

    // Let in-flight requests finish (cancelled ones return immediately)
    while tasks.join_next().await.is_some() {}

    drop(write_tx);
    let _ = writer_handle.await;

    match read_error {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

/// Drop finished request tasks so a long session does not accumulate them.
fn reap_finished(tasks: &mut JoinSet<()>) -> usize {
    let mut reaped = 0;
    while let Some(joined) = tasks.try_join_next() {
        if let Err(e) = joined {
            tracing::error!("Request task failed: {}", e);
        }
        reaped += 1;
    }
    reaped
}

fn parse_request(value: Value) -> Result<RpcRequest, RpcResponse> {
    let id = value.get("id").cloned().unwrap_or(Value::Null);
    serde_json::from_value::<RpcRequest>(value)
        .map_err(|e| RpcResponse::from_peek_error(id, PeekError::InvalidRequest(e.to_string())))
}

async fn send<T: serde::Serialize>(tx: &mpsc::Sender<String>, msg: &T) {
    match serde_json::to_string(msg) {
        Ok(out) => {
            let _ = tx.send(out).await;
        }
        Err(e) => tracing::error!("Failed to serialize response: {}", e),
    }
}

/// Route one request. `None` means nothing is written back: notifications
/// and cancelled calls.
async fn handle_request(
    req: RpcRequest,
    state: &ServerState,
    token: Option<CancellationToken>,
) -> Option<RpcResponse> {
    let id = req.id.clone().unwrap_or(Value::Null);

    let response = match req.method.as_str() {
        "initialize" => RpcResponse::success(
            id,
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "serverInfo": {
                    "name": "peek",
                    "version": env!("CARGO_PKG_VERSION")
                },
                "capabilities": {
                    "tools": { "listChanged": false }
                }
            }),
        ),
        "initialized" | "notifications/initialized" => return None,
        "notifications/cancelled" => {
            state.cancel(&req.params).await;
            return None;
        }
        "ping" => RpcResponse::success(id, json!({})),
        "tools/list" => RpcResponse::success(id, json!({ "tools": tools::tools_list() })),
        "tools/call" => {
            let response = handle_tools_call(id, &req.params, &state.ctx, token).await;
            state.finish(&req).await;
            response?
        }
        _ => RpcResponse::from_peek_error(id, PeekError::MethodNotFound(req.method.clone())),
    };

    if req.is_notification() {
        None
    } else {
        Some(response)
    }
}

async fn handle_tools_call(
    id: Value,
    params: &Value,
    ctx: &ToolContext,
    token: Option<CancellationToken>,
) -> Option<RpcResponse> {
    let Some(name) = params.get("name").and_then(|v| v.as_str()) else {
        return Some(RpcResponse::from_peek_error(
            id,
            PeekError::InvalidParams("Missing tool name".into()),
        ));
    };
    let args = params.get("arguments").cloned().unwrap_or(json!({}));

    let call = tools::dispatch(name, &args, ctx);
    let outcome = match token {
        Some(token) => tokio::select! {
            biased;
            _ = token.cancelled() => {
                tracing::info!(tool = name, "Tool call cancelled");
                return None;
            }
            result = call => result,
        },
        None => call.await,
    };

    Some(match outcome {
        Ok(result) => RpcResponse::success(id, tool_content(result)),
        Err(e) => RpcResponse::from_peek_error(id, e),
    })
}

/// MCP content envelope for a tool result.
fn tool_content(result: ToolResult) -> Value {
    let is_error = result.is_error();
    let text = result.into_text();
    if is_error {
        json!({
            "content": [{"type": "text", "text": text}],
            "isError": true
        })
    } else {
        json!({ "content": [{"type": "text", "text": text}] })
    }
}
