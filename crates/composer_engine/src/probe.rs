use std::time::Duration;

use engine_logging::engine_debug;
use reqwest::header::RANGE;
use reqwest::StatusCode;

use crate::types::ProbeError;

/// Checks that a result URL is actually fetchable before it is accepted.
#[async_trait::async_trait]
pub trait LivenessProbe: Send + Sync {
    async fn probe(&self, url: &str) -> Result<(), ProbeError>;
}

/// Accepts every URL without a request.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProbe;

#[async_trait::async_trait]
impl LivenessProbe for NoProbe {
    async fn probe(&self, _url: &str) -> Result<(), ProbeError> {
        Ok(())
    }
}

/// `HEAD` first; servers that refuse it get a single-byte ranged `GET`.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new(timeout: Duration) -> Result<Self, ProbeError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| ProbeError::Network(err.to_string()))?;
        Ok(Self { client })
    }

    async fn ranged_get(&self, url: reqwest::Url) -> Result<(), ProbeError> {
        let response = self
            .client
            .get(url)
            .header(RANGE, "bytes=0-0")
            .send()
            .await
            .map_err(map_probe_error)?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(ProbeError::HttpStatus(status.as_u16()))
        }
    }
}

#[async_trait::async_trait]
impl LivenessProbe for HttpProbe {
    async fn probe(&self, url: &str) -> Result<(), ProbeError> {
        let parsed =
            reqwest::Url::parse(url).map_err(|err| ProbeError::InvalidUrl(err.to_string()))?;
        let head = self
            .client
            .head(parsed.clone())
            .send()
            .await
            .map_err(map_probe_error)?;
        let status = head.status();
        if status.is_success() {
            return Ok(());
        }
        if matches!(
            status,
            StatusCode::METHOD_NOT_ALLOWED | StatusCode::FORBIDDEN | StatusCode::NOT_IMPLEMENTED
        ) {
            engine_debug!("HEAD {} answered {}; retrying with ranged GET", url, status);
            return self.ranged_get(parsed).await;
        }
        Err(ProbeError::HttpStatus(status.as_u16()))
    }
}

fn map_probe_error(err: reqwest::Error) -> ProbeError {
    if err.is_timeout() {
        ProbeError::Timeout
    } else {
        ProbeError::Network(err.to_string())
    }
}
