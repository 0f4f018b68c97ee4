//! Line-delimited JSON-RPC server exposing the `search_web` tool.
//!
//! One request per input line, one response per output line. Responses go to the
//! output stream; transport failures (malformed lines, read timeouts) are reported as
//! `-32603` frames on the error stream and the loop keeps going. End of input is a
//! clean shutdown.

mod envelope;
pub mod governor;
pub mod protocol;

use governor::{Governor, Phase};
use protocol::{
    error_codes, search_web_tool, CallToolParams, InitializeResult, ProtocolError, Request,
    RequestId, Response, SearchArgs, SEARCH_WEB,
};
use simple_search_core::{SearchOutcome, SearchProvider};
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Longest wait for the next request line.
    pub read_timeout: Duration,
    /// Longest a single tool call may run.
    pub call_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(30),
            call_timeout: Duration::from_secs(45),
        }
    }
}

pub struct Server<P> {
    provider: P,
    config: ServerConfig,
    governor: Governor,
}

impl<P: SearchProvider> Server<P> {
    pub fn new(provider: P, config: ServerConfig) -> Self {
        Self {
            provider,
            config,
            governor: Governor::new(),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Serve until `input` reaches end of stream.
    ///
    /// Only a failure to write a frame ends the loop with an error.
    pub async fn serve<R, W, E>(
        &mut self,
        input: R,
        mut output: W,
        mut errors: E,
    ) -> Result<(), ProtocolError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
        E: AsyncWrite + Unpin,
    {
        tracing::info!(provider = self.provider.name(), "serving requests");
        // `next_line` keeps a partially received line buffered across a read timeout.
        let mut lines = input.lines();
        loop {
            let read = self
                .governor
                .with_deadline(Phase::Read, self.config.read_timeout, lines.next_line())
                .await;
            let line = match read {
                Ok(Ok(Some(line))) => line,
                Ok(Ok(None)) => {
                    tracing::info!("input closed; shutting down");
                    return Ok(());
                }
                Ok(Err(e)) if e.kind() == std::io::ErrorKind::InvalidData => {
                    tracing::warn!(error = %e, "unreadable request line");
                    let err = ProtocolError::Parse(e.to_string());
                    write_frame(&mut errors, &Response::internal_error(None, err.to_string()))
                        .await?;
                    continue;
                }
                Ok(Err(e)) => {
                    tracing::error!(error = %e, "reading input failed; shutting down");
                    return Ok(());
                }
                Err(timed_out) => {
                    tracing::warn!(%timed_out, "no request before read deadline");
                    write_frame(
                        &mut errors,
                        &Response::internal_error(None, timed_out.to_string()),
                    )
                    .await?;
                    continue;
                }
            };

            if line.trim().is_empty() {
                continue;
            }

            let request = match Request::parse(&line) {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(error = %e, "rejecting request line");
                    let id = Request::recover_id(&line);
                    write_frame(&mut errors, &Response::internal_error(id, e.to_string())).await?;
                    continue;
                }
            };

            match self.dispatch(&request).await {
                Ok(Some(response)) => write_frame(&mut output, &response).await?,
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(method = %request.method, error = %e, "request failed");
                    write_frame(
                        &mut errors,
                        &Response::internal_error(request.id.clone(), e.to_string()),
                    )
                    .await?;
                }
            }
        }
    }

    async fn dispatch(&mut self, request: &Request) -> Result<Option<Response>, ProtocolError> {
        let id = request.id.clone();
        tracing::debug!(method = %request.method, id = ?id, "request");
        match request.method.as_str() {
            "initialize" => Ok(Some(Response::success(
                id,
                serde_json::to_value(InitializeResult::current())?,
            ))),
            "ping" => Ok(Some(Response::success(id, serde_json::json!({})))),
            "tools/list" => Ok(Some(Response::success(
                id,
                serde_json::json!({ "tools": [search_web_tool()] }),
            ))),
            "tools/call" => self.call_tool(id, request).await.map(Some),
            other => match id {
                None => {
                    if other.starts_with("notifications/") {
                        tracing::debug!(method = other, "notification");
                    } else {
                        tracing::warn!(method = other, "ignoring unknown notification");
                    }
                    Ok(None)
                }
                Some(_) => {
                    tracing::warn!(method = other, "method not found");
                    Ok(Some(Response::error(
                        id,
                        error_codes::METHOD_NOT_FOUND,
                        format!("Method not found: {other}"),
                    )))
                }
            },
        }
    }

    async fn call_tool(
        &mut self,
        id: Option<RequestId>,
        request: &Request,
    ) -> Result<Response, ProtocolError> {
        let params: CallToolParams =
            serde_json::from_value(serde_json::Value::Object(request.params()))
                .map_err(|e| ProtocolError::InvalidParams(e.to_string()))?;
        if params.name != SEARCH_WEB {
            tracing::warn!(tool = %params.name, "unknown tool");
            return Ok(Response::error(
                id,
                error_codes::INVALID_PARAMS,
                format!("Unknown tool: {}", params.name),
            ));
        }
        let args: SearchArgs = serde_json::from_value(serde_json::Value::Object(
            params.arguments.unwrap_or_default(),
        ))
        .map_err(|e| ProtocolError::InvalidParams(e.to_string()))?;

        let outcome = match self
            .governor
            .with_deadline(
                Phase::Call,
                self.config.call_timeout,
                self.provider.search(&args.query),
            )
            .await
        {
            Ok(outcome) => outcome,
            Err(timed_out) => {
                tracing::warn!(query = %args.query, %timed_out, "search abandoned");
                SearchOutcome::failure(args.query.as_str(), timed_out)
            }
        };
        let text = envelope::outcome_text(&outcome);
        Ok(Response::success(id, envelope::text_result(&text)))
    }
}

async fn write_frame<W>(out: &mut W, response: &Response) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    let mut line = serde_json::to_string(response)?;
    line.push('\n');
    out.write_all(line.as_bytes()).await?;
    out.flush().await?;
    Ok(())
}

/// Serve on the process's standard streams.
pub async fn serve_stdio<P: SearchProvider>(
    provider: P,
    config: ServerConfig,
) -> Result<(), ProtocolError> {
    let mut server = Server::new(provider, config);
    server
        .serve(
            BufReader::new(tokio::io::stdin()),
            tokio::io::stdout(),
            tokio::io::stderr(),
        )
        .await
}
