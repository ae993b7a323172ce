use std::sync::Arc;

use crate::{config::FetchConfig, error::FetchError, image_ref::ImageRef};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("timed out")]
    Timeout,

    #[error("status {0}")]
    Status(u16),

    #[error("{0}")]
    Other(String),
}

/// One GET per call; retries live in [`Fetcher`], not here.
pub trait Transport: Send + Sync {
    fn get(&self, url: &str) -> Result<Vec<u8>, TransportError>;
}

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn new(config: &FetchConfig) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn get(&self, url: &str) -> Result<Vec<u8>, TransportError> {
        let resp = self.client.get(url).send().map_err(classify)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }
        let body = resp.bytes().map_err(classify)?;
        Ok(body.to_vec())
    }
}

fn classify(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Other(err.to_string())
    }
}

/// Resolves URLs to decoded images, retrying timeouts up to `max_retries` times.
#[derive(Clone)]
pub struct Fetcher {
    transport: Arc<dyn Transport>,
    config: FetchConfig,
}

impl std::fmt::Debug for Fetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fetcher")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Fetcher {
    pub fn new(config: FetchConfig) -> Result<Self, FetchError> {
        let transport = HttpTransport::new(&config)?;
        Ok(Self::with_transport(Arc::new(transport), config))
    }

    pub fn with_transport(transport: Arc<dyn Transport>, config: FetchConfig) -> Self {
        Self { transport, config }
    }

    pub fn fetch(&self, url: &str) -> Result<ImageRef, FetchError> {
        let bytes = self.fetch_bytes(url)?;
        ImageRef::decode(&bytes).map_err(|e| FetchError::Decode(format!("{e:#}")))
    }

    pub fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let max_attempts = self.config.max_attempts();
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            tracing::debug!(url, attempt, max_attempts, "fetch attempt");
            match self.transport.get(url) {
                Ok(bytes) => return Ok(bytes),
                Err(TransportError::Timeout) if attempt < max_attempts => {
                    tracing::warn!(url, attempt, "fetch timed out, retrying");
                }
                Err(TransportError::Timeout) => {
                    return Err(FetchError::Timeout { attempts: attempt });
                }
                Err(TransportError::Status(code)) => return Err(FetchError::Status(code)),
                Err(TransportError::Other(msg)) => return Err(FetchError::Transport(msg)),
            }
        }
    }
}
