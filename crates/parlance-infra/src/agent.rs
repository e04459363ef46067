//! HTTP client for the external agent capability.
//!
//! The agent endpoint takes a JSON invocation and answers with a newline-
//! delimited JSON stream; each line is `{"content": "..."}` carrying the
//! cumulative response so far. The last line before EOF is the complete
//! answer.

use std::time::Duration;

use futures_util::StreamExt;
use parlance_core::agent::{AgentExecutor, AgentRequest, AgentStream};
use parlance_types::AgentError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Agent executions can run long; generous end-to-end timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// [`AgentExecutor`] over a streaming HTTP endpoint.
pub struct HttpAgent {
    client: reqwest::Client,
    endpoint: String,
}

#[derive(Serialize)]
struct AgentInvocation<'a> {
    prompt: &'a str,
    user_id: &'a str,
    chat_id: Uuid,
    session_id: Uuid,
}

#[derive(Deserialize)]
struct AgentChunk {
    content: String,
}

impl HttpAgent {
    pub fn new(endpoint: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self { client, endpoint }
    }
}

fn parse_chunk(line: &str) -> Result<String, AgentError> {
    serde_json::from_str::<AgentChunk>(line)
        .map(|chunk| chunk.content)
        .map_err(|e| AgentError::Stream(format!("malformed agent chunk: {e}")))
}

impl AgentExecutor for HttpAgent {
    fn name(&self) -> &str {
        "http"
    }

    fn execute(&self, request: AgentRequest) -> AgentStream {
        let client = self.client.clone();
        let endpoint = self.endpoint.clone();

        Box::pin(async_stream::stream! {
            let invocation = AgentInvocation {
                prompt: &request.prompt,
                user_id: &request.user_id,
                chat_id: request.chat_id,
                session_id: request.session_id,
            };

            let response = match client.post(&endpoint).json(&invocation).send().await {
                Ok(response) => response,
                Err(err) => {
                    yield Err(AgentError::Invocation(err.to_string()));
                    return;
                }
            };
            let response = match response.error_for_status() {
                Ok(response) => response,
                Err(err) => {
                    yield Err(AgentError::Invocation(err.to_string()));
                    return;
                }
            };

            let mut body = response.bytes_stream();
            let mut buf: Vec<u8> = Vec::new();
            while let Some(chunk) = body.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(err) => {
                        yield Err(AgentError::Stream(err.to_string()));
                        return;
                    }
                };
                buf.extend_from_slice(&chunk);

                while let Some(pos) = buf.iter().position(|&b| b == b'\n') {
                    let line_bytes: Vec<u8> = buf.drain(..=pos).collect();
                    let line = String::from_utf8_lossy(&line_bytes);
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    match parse_chunk(line) {
                        Ok(content) => yield Ok(content),
                        Err(err) => {
                            yield Err(err);
                            return;
                        }
                    }
                }
            }

            // A final line without a trailing newline is still a chunk.
            let tail = String::from_utf8_lossy(&buf);
            let tail = tail.trim();
            if !tail.is_empty() {
                match parse_chunk(tail) {
                    Ok(content) => yield Ok(content),
                    Err(err) => yield Err(err),
                }
            }
        })
    }
}
