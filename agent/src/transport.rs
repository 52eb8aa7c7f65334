//! How protocol messages reach the server.

use anyhow::{Context, Result};
use async_trait::async_trait;
use puddle_server::{ProtocolHandler, Request, Response};
use std::sync::Arc;
use tracing::trace;

/// Delivers one request and returns the server's ordered responses.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &Request) -> Result<Vec<Response>>;
}

/// JSON over HTTP to a running `puddle-server`.
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTransport {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &Request) -> Result<Vec<Response>> {
        trace!(kind = request.kind(), "POST {}", self.endpoint);
        let responses = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .with_context(|| format!("Failed to reach {}", self.endpoint))?
            .error_for_status()?
            .json::<Vec<Response>>()
            .await
            .context("Failed to decode server responses")?;
        Ok(responses)
    }
}

/// Calls an in-process handler directly.
pub struct LocalTransport {
    handler: Arc<ProtocolHandler>,
}

impl LocalTransport {
    pub fn new(handler: Arc<ProtocolHandler>) -> Self {
        Self { handler }
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn send(&self, request: &Request) -> Result<Vec<Response>> {
        Ok(self.handler.handle(request.clone()))
    }
}
