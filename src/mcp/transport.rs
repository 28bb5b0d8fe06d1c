use reqwest::header::{HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Response, StatusCode};
use serde::Serialize;
use eventsource_stream::{EventStreamError, Eventsource};
use futures_util::{Stream, StreamExt};
use serde_json::Value;
use std::fmt;
use std::pin::pin;
use std::sync::Mutex;
use std::time::Duration;

use crate::config::McpConfig;
use crate::error::McpError;

use super::protocol::{JsonRpcMessage, JsonRpcNotification, JsonRpcRequest};

pub const SESSION_ID_HEADER: &str = "mcp-session-id";
pub const PROTOCOL_VERSION_HEADER: &str = "mcp-protocol-version";

const ACCEPT_BOTH: &str = "application/json, text/event-stream";

/// MCP streamable HTTP transport: one POST per JSON-RPC message.
pub struct StreamableHttpTransport {
    http: Client,
    url: String,
    bearer_token: String,
    session_id: Mutex<Option<String>>,
    protocol_version: Mutex<Option<String>>,
}

impl StreamableHttpTransport {
    pub fn new(url: &str, bearer_token: &str, settings: &McpConfig) -> Result<Self, McpError> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(settings.connect_timeout_secs))
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()?;

        Ok(StreamableHttpTransport {
            http,
            url: url.to_string(),
            bearer_token: bearer_token.to_string(),
            session_id: Mutex::new(None),
            protocol_version: Mutex::new(None),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn session_id(&self) -> Option<String> {
        self.session_id.lock().ok().and_then(|id| id.clone())
    }

    /// Record the negotiated protocol version; sent on every later request.
    pub fn set_protocol_version(&self, version: &str) {
        if let Ok(mut slot) = self.protocol_version.lock() {
            *slot = Some(version.to_string());
        }
    }

    fn post<T: Serialize>(&self, body: &T) -> reqwest::RequestBuilder {
        let mut builder = self
            .http
            .post(&self.url)
            .bearer_auth(&self.bearer_token)
            .header(ACCEPT, ACCEPT_BOTH)
            .json(body);

        if let Some(id) = self.session_id() {
            builder = builder.header(SESSION_ID_HEADER, id);
        }
        if let Some(version) = self.protocol_version.lock().ok().and_then(|v| v.clone()) {
            builder = builder.header(PROTOCOL_VERSION_HEADER, version);
        }
        builder
    }

    /// Send a request and wait for the response carrying the same id.
    pub async fn request(&self, request: &JsonRpcRequest) -> Result<Value, McpError> {
        tracing::debug!(method = %request.method, id = request.id, "mcp request");

        let response = self.post(request).send().await?;
        let response = check_status(response).await?;

        if let Some(id) = response
            .headers()
            .get(SESSION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            if let Ok(mut slot) = self.session_id.lock() {
                if slot.is_none() {
                    tracing::debug!(session_id = id, "mcp session established");
                }
                *slot = Some(id.to_string());
            }
        }

        let is_event_stream = response
            .headers()
            .get(CONTENT_TYPE)
            .map(is_event_stream)
            .unwrap_or(false);

        let message = if is_event_stream {
            find_in_event_stream(response.bytes_stream(), request.id).await?
        } else {
            let message: JsonRpcMessage = serde_json::from_str(&response.text().await?)?;
            if !message.answers(request.id) {
                return Err(McpError::Protocol(format!(
                    "response does not answer request {}",
                    request.id
                )));
            }
            message
        };

        if let Some(err) = message.error {
            return Err(McpError::Rpc {
                code: err.code,
                message: err.message,
            });
        }

        message
            .result
            .ok_or_else(|| McpError::Protocol("response has neither result nor error".to_string()))
    }

    pub async fn notify(&self, notification: &JsonRpcNotification) -> Result<(), McpError> {
        tracing::debug!(method = %notification.method, "mcp notification");
        let response = self.post(notification).send().await?;
        check_status(response).await?;
        Ok(())
    }

    /// Terminate the server-side session. Servers that do not support
    /// explicit termination answer 405, which is fine.
    pub async fn terminate(&self) -> Result<(), McpError> {
        let Some(id) = self.session_id() else {
            return Ok(());
        };

        let response = self
            .http
            .delete(&self.url)
            .bearer_auth(&self.bearer_token)
            .header(SESSION_ID_HEADER, id)
            .send()
            .await?;

        if response.status() == StatusCode::METHOD_NOT_ALLOWED {
            return Ok(());
        }
        check_status(response).await?;
        Ok(())
    }
}

fn is_event_stream(value: &HeaderValue) -> bool {
    value
        .to_str()
        .map(|v| v.trim_start().starts_with("text/event-stream"))
        .unwrap_or(false)
}

async fn check_status(response: Response) -> Result<Response, McpError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(McpError::Unauthorized(status.as_u16()));
    }
    let body = response.text().await.unwrap_or_default();
    Err(McpError::Http {
        status: status.as_u16(),
        body,
    })
}

/// Read events until one answers `id`; the rest of the stream is dropped.
///
/// Servers may keep the stream open after the response, so this must not
/// wait for the body to end.
async fn find_in_event_stream<S, B, E>(stream: S, id: u64) -> Result<JsonRpcMessage, McpError>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Into<McpError> + fmt::Display,
{
    let mut events = pin!(stream.eventsource());

    while let Some(event) = events.next().await {
        let event = match event {
            Ok(event) => event,
            Err(EventStreamError::Transport(e)) => return Err(e.into()),
            Err(e) => return Err(McpError::Protocol(format!("invalid event stream: {}", e))),
        };
        if event.data.is_empty() {
            continue;
        }

        let message: JsonRpcMessage = match serde_json::from_str(&event.data) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(error = %e, "skipping undecodable SSE event");
                continue;
            }
        };
        if message.answers(id) {
            return Ok(message);
        }
        if let Some(method) = &message.method {
            tracing::debug!(%method, "ignoring server message on response stream");
        }
    }

    Err(McpError::Protocol(format!(
        "event stream ended without a response to request {}",
        id
    )))
}
