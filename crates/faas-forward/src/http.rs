use async_trait::async_trait;
use faas_worker_common::{OutboundRequest, SandboxResponse, SandboxTransport, TransportError};
use reqwest::header::{CONNECTION, CONTENT_TYPE};
use reqwest::{Client, Method};

/// Reaches sandboxes over plain HTTP. Connections are never reused between
/// attempts.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> reqwest::Result<Self> {
        let client = Client::builder().pool_max_idle_per_host(0).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl SandboxTransport for HttpTransport {
    async fn send(&self, request: OutboundRequest) -> Result<SandboxResponse, TransportError> {
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;

        let mut builder = self
            .client
            .request(method, &request.url)
            .header(CONNECTION, "close")
            .body(request.body);
        if let Some(content_type) = &request.content_type {
            builder = builder.header(CONTENT_TYPE, content_type);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_builder() {
                TransportError::InvalidRequest(e.to_string())
            } else {
                TransportError::Connect(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::Body(e.to_string()))?;

        Ok(SandboxResponse {
            status,
            headers,
            body,
        })
    }
}
