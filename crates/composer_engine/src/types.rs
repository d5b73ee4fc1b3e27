use thiserror::Error;

/// Error talking to a generation provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// Network trouble, rate limiting or a server error; retried on the next tick.
    #[error("transient provider error: {0}")]
    Transient(String),
    /// The provider rejected the request for good.
    #[error("provider failure: {0}")]
    Failure(String),
    #[error("undecodable provider response: {0}")]
    Decode(String),
    #[error("no provider configured for {0}")]
    NotConfigured(String),
}

impl ProviderError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Transient(_) | ProviderError::Decode(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("http status {0}")]
    HttpStatus(u16),
    #[error("timeout")]
    Timeout,
    #[error("network error: {0}")]
    Network(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuotaError {
    #[error("quota service unreachable: {0}")]
    Network(String),
    #[error("quota service returned http status {0}")]
    HttpStatus(u16),
    #[error("undecodable quota response: {0}")]
    Decode(String),
}

pub(crate) fn map_reqwest_error(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() || err.is_connect() {
        return ProviderError::Transient(err.to_string());
    }
    if err.is_decode() {
        return ProviderError::Decode(err.to_string());
    }
    ProviderError::Transient(err.to_string())
}

/// Classifies a non-success HTTP status.
pub(crate) fn status_error(status: reqwest::StatusCode, body: &str) -> ProviderError {
    let message = if body.trim().is_empty() {
        status.to_string()
    } else {
        format!("{status}: {}", body.trim())
    };
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS
        || status == reqwest::StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
    {
        ProviderError::Transient(message)
    } else {
        ProviderError::Failure(message)
    }
}
