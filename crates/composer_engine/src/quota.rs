use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use composer_core::QuotaDecision;
use engine_logging::engine_debug;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::types::QuotaError;

/// Credit check performed before any job is created.
#[async_trait::async_trait]
pub trait QuotaGate: Send + Sync {
    async fn try_consume(&self, feature_key: &str) -> Result<QuotaDecision, QuotaError>;
}

/// Which quota gate the host runs with.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum QuotaSettings {
    #[default]
    Unlimited,
    /// A local pool of credits, one per generation.
    Credits(u64),
    Http {
        endpoint: String,
        api_token: Option<String>,
    },
}

impl QuotaSettings {
    pub fn build(&self) -> Result<Box<dyn QuotaGate>, QuotaError> {
        Ok(match self {
            QuotaSettings::Unlimited => Box::new(UnlimitedQuota),
            QuotaSettings::Credits(credits) => Box::new(CreditBudget::new(*credits)),
            QuotaSettings::Http {
                endpoint,
                api_token,
            } => Box::new(HttpQuotaGate::new(endpoint.clone(), api_token.clone())?),
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UnlimitedQuota;

#[async_trait::async_trait]
impl QuotaGate for UnlimitedQuota {
    async fn try_consume(&self, _feature_key: &str) -> Result<QuotaDecision, QuotaError> {
        Ok(QuotaDecision::granted())
    }
}

#[derive(Debug, Default)]
pub struct CreditBudget {
    remaining: AtomicU64,
}

impl CreditBudget {
    pub fn new(credits: u64) -> Self {
        Self {
            remaining: AtomicU64::new(credits),
        }
    }

    pub fn remaining(&self) -> u64 {
        self.remaining.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl QuotaGate for CreditBudget {
    async fn try_consume(&self, feature_key: &str) -> Result<QuotaDecision, QuotaError> {
        let spent = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1));
        Ok(match spent {
            Ok(left) => {
                engine_debug!("{} consumed a credit; {} left", feature_key, left - 1);
                QuotaDecision::granted()
            }
            Err(_) => QuotaDecision::denied(format!("no credits left for {feature_key}")),
        })
    }
}

/// Remote credit service answering `{"success": bool, "error"?: string}`.
#[derive(Debug, Clone)]
pub struct HttpQuotaGate {
    endpoint: String,
    api_token: Option<String>,
    client: reqwest::Client,
}

impl HttpQuotaGate {
    pub fn new(endpoint: String, api_token: Option<String>) -> Result<Self, QuotaError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|err| QuotaError::Network(err.to_string()))?;
        Ok(Self {
            endpoint,
            api_token,
            client,
        })
    }
}

#[async_trait::async_trait]
impl QuotaGate for HttpQuotaGate {
    async fn try_consume(&self, feature_key: &str) -> Result<QuotaDecision, QuotaError> {
        let mut builder = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .body(json!({ "featureKey": feature_key }).to_string());
        if let Some(token) = self.api_token.as_deref() {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        let response = builder
            .send()
            .await
            .map_err(|err| QuotaError::Network(err.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| QuotaError::Network(err.to_string()))?;
        if status == reqwest::StatusCode::PAYMENT_REQUIRED {
            return Ok(QuotaDecision::denied(decision_error(&body)));
        }
        if !status.is_success() {
            return Err(QuotaError::HttpStatus(status.as_u16()));
        }
        let value: Value =
            serde_json::from_str(&body).map_err(|err| QuotaError::Decode(err.to_string()))?;
        let success = value
            .get("success")
            .and_then(Value::as_bool)
            .ok_or_else(|| QuotaError::Decode(format!("missing success flag in {value}")))?;
        Ok(if success {
            QuotaDecision::granted()
        } else {
            QuotaDecision::denied(decision_error(&body))
        })
    }
}

fn decision_error(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| value.get("error").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| "quota exhausted".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn credit_budget_denies_when_spent() {
        let budget = CreditBudget::new(1);
        assert!(budget.try_consume("generate-image").await.unwrap().success);
        let denied = budget.try_consume("generate-image").await.unwrap();
        assert!(!denied.success);
        assert_eq!(budget.remaining(), 0);
    }
}
