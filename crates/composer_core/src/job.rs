use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::dedup::DedupKey;
use crate::document::SelectionToken;

/// Opaque job identifier: creation millis (base 36) plus a random suffix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(String);

impl JobId {
    pub(crate) fn generate(now_ms: u64) -> Self {
        let suffix: u32 = rand::random();
        Self(format!("job-{}-{suffix:08x}", to_base36(now_ms)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

/// Identifier of a generation request that has not become a job yet.
pub type RequestId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProviderKind {
    #[serde(rename = "image-provider-A")]
    ImageProviderA,
    #[serde(rename = "image-provider-B")]
    ImageProviderB,
    #[serde(rename = "video-provider")]
    VideoProvider,
    #[serde(rename = "audio-provider-A")]
    AudioProviderA,
    #[serde(rename = "audio-provider-B")]
    AudioProviderB,
    #[serde(rename = "audio-provider-C")]
    AudioProviderC,
    #[serde(rename = "infographic-provider")]
    InfographicProvider,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 7] = [
        ProviderKind::ImageProviderA,
        ProviderKind::ImageProviderB,
        ProviderKind::VideoProvider,
        ProviderKind::AudioProviderA,
        ProviderKind::AudioProviderB,
        ProviderKind::AudioProviderC,
        ProviderKind::InfographicProvider,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::ImageProviderA => "image-provider-A",
            ProviderKind::ImageProviderB => "image-provider-B",
            ProviderKind::VideoProvider => "video-provider",
            ProviderKind::AudioProviderA => "audio-provider-A",
            ProviderKind::AudioProviderB => "audio-provider-B",
            ProviderKind::AudioProviderC => "audio-provider-C",
            ProviderKind::InfographicProvider => "infographic-provider",
        }
    }

    /// The only kind of asset this provider produces.
    pub fn kind(self) -> JobKind {
        match self {
            ProviderKind::ImageProviderA | ProviderKind::ImageProviderB => JobKind::Image,
            ProviderKind::VideoProvider => JobKind::Video,
            ProviderKind::AudioProviderA
            | ProviderKind::AudioProviderB
            | ProviderKind::AudioProviderC => JobKind::Audio,
            ProviderKind::InfographicProvider => JobKind::Infographic,
        }
    }

    /// Key passed to the quota gate before a request is submitted.
    pub fn feature_key(self) -> &'static str {
        match self.kind() {
            JobKind::Image => "generate-image",
            JobKind::Video => "generate-video",
            JobKind::Audio => "generate-audio",
            JobKind::Infographic => "generate-infographic",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProviderKind::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown provider {s:?}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobKind {
    Image,
    Video,
    Audio,
    Infographic,
}

impl JobKind {
    pub fn as_str(self) -> &'static str {
        match self {
            JobKind::Image => "image",
            JobKind::Video => "video",
            JobKind::Audio => "audio",
            JobKind::Infographic => "infographic",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Job lifecycle. Ordering follows the only allowed direction of travel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Queued,
    Polling,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn rank(self) -> u8 {
        match self {
            JobStatus::Queued => 0,
            JobStatus::Polling => 1,
            JobStatus::Completed | JobStatus::Failed => 2,
        }
    }

    pub fn is_terminal(self) -> bool {
        self.rank() == 2
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InsertionMode {
    AtCaret,
    AfterSelection,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertionIntent {
    pub mode: InsertionMode,
    /// Element planted at trigger time for `AtCaret` jobs.
    pub placeholder_id: Option<String>,
    /// Selection captured at trigger time for `AfterSelection` jobs.
    pub selection: Option<SelectionToken>,
}

impl InsertionIntent {
    pub fn at_caret(placeholder_id: Option<String>) -> Self {
        Self {
            mode: InsertionMode::AtCaret,
            placeholder_id,
            selection: None,
        }
    }

    pub fn after_selection(selection: SelectionToken) -> Self {
        Self {
            mode: InsertionMode::AfterSelection,
            placeholder_id: None,
            selection: Some(selection),
        }
    }
}

/// A user-triggered generation action, before quota and submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub provider: ProviderKind,
    pub prompt: String,
    /// Voice or style parameters; part of the dedup fingerprint.
    pub style: Option<String>,
    pub mode: InsertionMode,
}

impl GenerationRequest {
    pub fn new(provider: ProviderKind, prompt: impl Into<String>, mode: InsertionMode) -> Self {
        Self {
            provider,
            prompt: prompt.into(),
            style: None,
            mode,
        }
    }

    pub fn with_style(mut self, style: impl Into<String>) -> Self {
        self.style = Some(style.into());
        self
    }

    pub fn kind(&self) -> JobKind {
        self.provider.kind()
    }

    pub fn dedup_key(&self) -> DedupKey {
        DedupKey::for_request(
            self.provider,
            self.kind(),
            self.style.as_deref().unwrap_or(""),
            &self.prompt,
        )
    }
}

/// What a provider handed back when the request was submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    RemoteTask(String),
    Ready(String),
}

/// Everything needed to register a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    pub provider: ProviderKind,
    pub kind: JobKind,
    pub remote_task_id: Option<String>,
    pub result_url: Option<String>,
    pub insertion_intent: InsertionIntent,
    pub dedup_key: DedupKey,
}

impl JobSpec {
    pub fn from_submission(
        request: &GenerationRequest,
        submission: Submission,
        insertion_intent: InsertionIntent,
        dedup_key: DedupKey,
    ) -> Self {
        let (remote_task_id, result_url) = match submission {
            Submission::RemoteTask(task) => (Some(task), None),
            Submission::Ready(url) => (None, Some(url)),
        };
        Self {
            provider: request.provider,
            kind: request.kind(),
            remote_task_id,
            result_url,
            insertion_intent,
            dedup_key,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub id: JobId,
    pub provider: ProviderKind,
    pub kind: JobKind,
    pub remote_task_id: Option<String>,
    pub result_url: Option<String>,
    pub status: JobStatus,
    pub attempts: u32,
    pub insertion_intent: InsertionIntent,
    pub dedup_key: DedupKey,
    pub created_at_ms: u64,
    pub last_polled_at_ms: Option<u64>,
    pub failure: Option<FailureReason>,
    /// Set once the outcome has been inserted or reported.
    pub applied: bool,
}

impl Job {
    pub fn is_resolved(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn outcome(&self) -> Option<JobOutcome> {
        match self.status {
            JobStatus::Completed => self
                .result_url
                .clone()
                .map(|url| JobOutcome::Succeeded { url }),
            JobStatus::Failed => self
                .failure
                .clone()
                .map(|reason| JobOutcome::Failed { reason }),
            JobStatus::Queued | JobStatus::Polling => None,
        }
    }
}

/// Normalized provider status for one poll of one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Pending,
    Succeeded { url: String },
    Failed { reason: String },
}

/// Final outcome recorded on a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Succeeded { url: String },
    Failed { reason: FailureReason },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    Provider(String),
    Timeout,
    InsertionTargetLost,
    QuotaDenied(String),
    SubmitFailed(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Provider(reason) => write!(f, "provider failure: {reason}"),
            FailureReason::Timeout => write!(f, "timeout"),
            FailureReason::InsertionTargetLost => write!(f, "insertion target lost"),
            FailureReason::QuotaDenied(reason) => write!(f, "quota denied: {reason}"),
            FailureReason::SubmitFailed(reason) => write!(f, "submission failed: {reason}"),
        }
    }
}

/// A pending job as the poller needs to see it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollTarget {
    pub job_id: JobId,
    pub provider: ProviderKind,
    pub remote_task_id: Option<String>,
    pub result_url: Option<String>,
    pub last_polled_at_ms: Option<u64>,
}

/// One job's observation from a poll tick. `Err` carries a transient fault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollReport {
    pub job_id: JobId,
    pub result: Result<PollOutcome, String>,
}

impl PollReport {
    pub fn pending(job_id: JobId) -> Self {
        Self {
            job_id,
            result: Ok(PollOutcome::Pending),
        }
    }
}
