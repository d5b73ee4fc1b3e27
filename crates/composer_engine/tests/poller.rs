use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use composer_core::{
    GenerationRequest, JobId, PollOutcome, PollTarget, ProviderKind, Submission,
};
use composer_engine::{
    GenerationProvider, LivenessProbe, NoProbe, Poller, ProbeError, ProviderError, ProviderSet,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

/// Answers status checks from a script keyed by task id.
struct ScriptedProvider {
    kind: ProviderKind,
    answers: HashMap<String, Result<Value, ProviderError>>,
    min_delay: Duration,
    probe: bool,
    calls: Mutex<Vec<String>>,
    delays: HashMap<String, Duration>,
}

impl ScriptedProvider {
    fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            answers: HashMap::new(),
            min_delay: Duration::ZERO,
            probe: false,
            calls: Mutex::new(Vec::new()),
            delays: HashMap::new(),
        }
    }

    fn answer(mut self, task: &str, answer: Result<Value, ProviderError>) -> Self {
        self.answers.insert(task.to_string(), answer);
        self
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl GenerationProvider for ScriptedProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn min_poll_delay(&self) -> Duration {
        self.min_delay
    }

    fn probe_results(&self) -> bool {
        self.probe
    }

    async fn submit(&self, _request: &GenerationRequest) -> Result<Submission, ProviderError> {
        Err(ProviderError::Failure("not scripted".into()))
    }

    async fn check_status(&self, remote_task_id: &str) -> Result<Value, ProviderError> {
        self.calls.lock().unwrap().push(remote_task_id.to_string());
        if let Some(delay) = self.delays.get(remote_task_id) {
            tokio::time::sleep(*delay).await;
        }
        self.answers
            .get(remote_task_id)
            .cloned()
            .unwrap_or_else(|| Ok(json!({})))
    }
}

struct RejectingProbe;

#[async_trait::async_trait]
impl LivenessProbe for RejectingProbe {
    async fn probe(&self, _url: &str) -> Result<(), ProbeError> {
        Err(ProbeError::HttpStatus(404))
    }
}

fn target(job: &str, provider: ProviderKind, task: Option<&str>, url: Option<&str>) -> PollTarget {
    PollTarget {
        job_id: JobId::from(job),
        provider,
        remote_task_id: task.map(str::to_string),
        result_url: url.map(str::to_string),
        last_polled_at_ms: None,
    }
}

#[tokio::test]
async fn one_failing_provider_does_not_affect_others() {
    let image = Arc::new(
        ScriptedProvider::new(ProviderKind::ImageProviderB)
            .answer("ok", Ok(json!({"status": "COMPLETED", "images": [{"url": "https://x/1.png"}]}))),
    );
    let audio = Arc::new(
        ScriptedProvider::new(ProviderKind::AudioProviderA)
            .answer("down", Err(ProviderError::Transient("connection reset".into())))
            .answer("bad", Err(ProviderError::Failure("rejected".into()))),
    );
    let providers = ProviderSet::new().with(image).with(audio);
    let poller = Poller::new(providers, Arc::new(NoProbe));

    let reports = poller
        .poll(
            vec![
                target("job-a", ProviderKind::AudioProviderA, Some("down"), None),
                target("job-b", ProviderKind::ImageProviderB, Some("ok"), None),
                target("job-c", ProviderKind::AudioProviderA, Some("bad"), None),
            ],
            1_000,
        )
        .await;

    let ids: Vec<_> = reports.iter().map(|r| r.job_id.as_str().to_string()).collect();
    assert_eq!(ids, vec!["job-a", "job-b", "job-c"]);
    assert!(reports[0].result.is_err());
    assert_eq!(
        reports[1].result,
        Ok(PollOutcome::Succeeded {
            url: "https://x/1.png".into()
        })
    );
    assert_eq!(
        reports[2].result,
        Ok(PollOutcome::Failed {
            reason: "rejected".into()
        })
    );
}

#[tokio::test]
async fn reports_keep_target_order_when_completion_order_differs() {
    let mut slow = ScriptedProvider::new(ProviderKind::VideoProvider)
        .answer("first", Ok(json!({"data": {"state": "generating"}})))
        .answer("second", Ok(json!({"data": {"state": "generating"}})));
    slow.delays.insert("first".into(), Duration::from_millis(50));
    let poller = Poller::new(ProviderSet::new().with(Arc::new(slow)), Arc::new(NoProbe));

    let reports = poller
        .poll(
            vec![
                target("job-1", ProviderKind::VideoProvider, Some("first"), None),
                target("job-2", ProviderKind::VideoProvider, Some("second"), None),
            ],
            0,
        )
        .await;
    let ids: Vec<_> = reports.iter().map(|r| r.job_id.as_str().to_string()).collect();
    assert_eq!(ids, vec!["job-1", "job-2"]);
}

#[tokio::test]
async fn minimum_delay_skips_recently_polled_jobs() {
    let mut provider = ScriptedProvider::new(ProviderKind::AudioProviderC);
    provider.min_delay = Duration::from_secs(10);
    let provider = Arc::new(provider);
    let poller = Poller::new(ProviderSet::new().with(provider.clone()), Arc::new(NoProbe));

    let mut recent = target("job-recent", ProviderKind::AudioProviderC, Some("r"), None);
    recent.last_polled_at_ms = Some(95_000);
    let mut stale = target("job-stale", ProviderKind::AudioProviderC, Some("s"), None);
    stale.last_polled_at_ms = Some(80_000);
    let fresh = target("job-fresh", ProviderKind::AudioProviderC, Some("f"), None);

    let reports = poller.poll(vec![recent, stale, fresh], 100_000).await;
    let ids: Vec<_> = reports.iter().map(|r| r.job_id.as_str().to_string()).collect();
    assert_eq!(ids, vec!["job-stale", "job-fresh"]);
    assert_eq!(provider.calls(), vec!["s".to_string(), "f".to_string()]);
}

#[tokio::test]
async fn direct_result_url_needs_no_remote_call() {
    let provider = Arc::new(ScriptedProvider::new(ProviderKind::InfographicProvider));
    let poller = Poller::new(ProviderSet::new().with(provider.clone()), Arc::new(NoProbe));

    let reports = poller
        .poll(
            vec![target(
                "job-i",
                ProviderKind::InfographicProvider,
                None,
                Some("https://x/chart.png"),
            )],
            0,
        )
        .await;
    assert_eq!(
        reports[0].result,
        Ok(PollOutcome::Succeeded {
            url: "https://x/chart.png".into()
        })
    );
    assert!(provider.calls().is_empty());
}

#[tokio::test]
async fn failed_probe_keeps_job_pending() {
    let mut provider = ScriptedProvider::new(ProviderKind::ImageProviderA).answer(
        "T1",
        Ok(json!({"data": {"successFlag": 1, "response": {"resultUrls": ["https://x/late.png"]}}})),
    );
    provider.probe = true;
    let poller = Poller::new(ProviderSet::new().with(Arc::new(provider)), Arc::new(RejectingProbe));

    let reports = poller
        .poll(vec![target("job-p", ProviderKind::ImageProviderA, Some("T1"), None)], 0)
        .await;
    assert_eq!(reports[0].result, Ok(PollOutcome::Pending));
}

#[tokio::test]
async fn unconfigured_provider_is_reported_as_error() {
    let poller = Poller::new(ProviderSet::new(), Arc::new(NoProbe));
    let reports = poller
        .poll(vec![target("job-x", ProviderKind::AudioProviderB, Some("T2"), None)], 0)
        .await;
    assert!(reports[0].result.is_err());
}
