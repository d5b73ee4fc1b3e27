use std::sync::Arc;

use composer_core::{PollOutcome, PollReport, PollTarget};
use engine_logging::{engine_debug, engine_warn};
use futures_util::future::join_all;

use crate::normalize::normalize;
use crate::probe::LivenessProbe;
use crate::provider::ProviderSet;
use crate::types::ProviderError;

/// Checks every due job concurrently and reports back in target order.
///
/// Each job is isolated: a failing provider only affects its own report.
#[derive(Clone)]
pub struct Poller {
    providers: ProviderSet,
    probe: Arc<dyn LivenessProbe>,
}

impl Poller {
    pub fn new(providers: ProviderSet, probe: Arc<dyn LivenessProbe>) -> Self {
        Self { providers, probe }
    }

    pub fn providers(&self) -> &ProviderSet {
        &self.providers
    }

    /// Polls the targets whose provider minimum delay has elapsed at `now_ms`.
    pub async fn poll(&self, targets: Vec<PollTarget>, now_ms: u64) -> Vec<PollReport> {
        let due: Vec<PollTarget> = targets
            .into_iter()
            .filter(|target| self.is_due(target, now_ms))
            .collect();
        join_all(due.into_iter().map(|target| self.check(target))).await
    }

    fn is_due(&self, target: &PollTarget, now_ms: u64) -> bool {
        let Some(provider) = self.providers.get(target.provider) else {
            return true;
        };
        let min_delay = u64::try_from(provider.min_poll_delay().as_millis()).unwrap_or(u64::MAX);
        match target.last_polled_at_ms {
            Some(last) if min_delay > 0 && now_ms.saturating_sub(last) < min_delay => {
                engine_debug!("job {} not due for another poll yet", target.job_id);
                false
            }
            _ => true,
        }
    }

    async fn check(&self, target: PollTarget) -> PollReport {
        let result = self.check_target(&target).await;
        PollReport {
            job_id: target.job_id,
            result,
        }
    }

    async fn check_target(&self, target: &PollTarget) -> Result<PollOutcome, String> {
        let provider = self.providers.get(target.provider);
        let probe_results = provider.as_ref().is_some_and(|p| p.probe_results());

        let outcome = if let Some(url) = target.result_url.as_deref() {
            PollOutcome::Succeeded {
                url: url.to_string(),
            }
        } else {
            let provider = provider
                .ok_or_else(|| ProviderError::NotConfigured(target.provider.to_string()).to_string())?;
            let Some(task) = target.remote_task_id.as_deref() else {
                return Ok(PollOutcome::Failed {
                    reason: "job has no remote task to poll".to_string(),
                });
            };
            match provider.check_status(task).await {
                Ok(body) => normalize(target.provider, &body),
                Err(ProviderError::Failure(reason)) => PollOutcome::Failed { reason },
                Err(err) => return Err(err.to_string()),
            }
        };

        match outcome {
            PollOutcome::Succeeded { url } if probe_results => {
                match self.probe.probe(&url).await {
                    Ok(()) => Ok(PollOutcome::Succeeded { url }),
                    Err(err) => {
                        engine_warn!("result of {} not fetchable yet ({}); still pending", target.job_id, err);
                        Ok(PollOutcome::Pending)
                    }
                }
            }
            other => Ok(other),
        }
    }
}

impl std::fmt::Debug for Poller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Poller")
            .field("providers", &self.providers)
            .finish_non_exhaustive()
    }
}
