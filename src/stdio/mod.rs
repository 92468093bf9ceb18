//! Line-delimited standard-I/O transport: one JSON request per line
//! (`{id, tool, input}`), one JSON response per line (`{id, output}` or
//! `{id, error}`). Requests are dispatched concurrently; the writer is
//! serialized so responses never interleave mid-line.

use crate::exec::runner::ToolRunner;
use crate::metrics::MetricsRegistry;
use crate::tools::base::ToolInput;
use crate::tools::registry::ToolRegistry;
use anyhow::Result;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
struct StdioRequest {
    #[serde(default)]
    id: Value,
    tool: String,
    input: ToolInput,
}

pub struct StdioServer {
    registry: Arc<ToolRegistry>,
    runner: Arc<ToolRunner>,
    metrics: Arc<MetricsRegistry>,
}

impl StdioServer {
    pub fn new(
        registry: Arc<ToolRegistry>,
        runner: Arc<ToolRunner>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            registry,
            runner,
            metrics,
        }
    }

    /// Serve stdin/stdout until EOF or shutdown.
    pub async fn serve(&self, shutdown: tokio::sync::watch::Receiver<bool>) -> Result<()> {
        let reader = BufReader::new(tokio::io::stdin());
        let writer = tokio::io::stdout();
        self.serve_streams(reader, writer, shutdown).await
    }

    /// Transport loop over arbitrary streams (tests use in-memory pipes).
    pub async fn serve_streams<R, W>(
        &self,
        reader: R,
        writer: W,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
    ) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let writer = Arc::new(Mutex::new(writer));
        let mut lines = reader.lines();
        let mut tasks: JoinSet<()> = JoinSet::new();

        info!("stdio.serving");
        loop {
            tokio::select! {
                line = lines.next_line() => match line {
                    Ok(Some(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        self.dispatch(line, writer.clone(), &mut tasks);
                    }
                    Ok(None) => {
                        info!("stdio.eof");
                        break;
                    }
                    Err(e) => {
                        warn!("stdio.read_error error={}", e);
                        break;
                    }
                },
                _ = shutdown.changed() => {
                    info!("stdio.shutdown_signal");
                    break;
                }
            }
        }

        // Let inflight requests finish writing their responses
        while tasks.join_next().await.is_some() {}
        Ok(())
    }

    fn dispatch<W>(&self, line: String, writer: Arc<Mutex<W>>, tasks: &mut JoinSet<()>)
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let request: StdioRequest = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(e) => {
                // Echo the caller's id when the frame is at least valid JSON
                let id = serde_json::from_str::<Value>(&line)
                    .ok()
                    .and_then(|v| v.get("id").cloned())
                    .unwrap_or(Value::Null);
                let response = json!({"id": id, "error": format!("invalid request: {}", e)});
                tasks.spawn(async move {
                    write_line(&writer, &response).await;
                });
                return;
            }
        };

        let registry = self.registry.clone();
        let runner = self.runner.clone();
        let metrics = self.metrics.clone();
        tasks.spawn(async move {
            let response = match registry.get(&request.tool) {
                None => {
                    json!({"id": request.id, "error": format!("Tool {} not found", request.tool)})
                }
                Some(_) if !registry.is_enabled(&request.tool) => {
                    json!({"id": request.id, "error": format!("Tool {} is disabled", request.tool)})
                }
                Some(tool) => {
                    metrics.system.record_request();
                    let output = runner.run(tool.as_ref(), request.input).await;
                    if output.error_type.is_some() {
                        metrics.system.record_error();
                    }
                    json!({"id": request.id, "output": output})
                }
            };
            write_line(&writer, &response).await;
        });
    }
}

async fn write_line<W: AsyncWrite + Unpin>(writer: &Mutex<W>, response: &Value) {
    let mut line = response.to_string();
    line.push('\n');
    let mut writer = writer.lock().await;
    if let Err(e) = writer.write_all(line.as_bytes()).await {
        warn!("stdio.write_error error={}", e);
        return;
    }
    if let Err(e) = writer.flush().await {
        warn!("stdio.flush_error error={}", e);
    }
}
