use crate::job::{GenerationRequest, JobId, PollReport, RequestId, Submission};
use crate::protocol::SurfaceEvent;
use crate::run_guard::RunToken;

/// Answer of the quota collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaDecision {
    pub success: bool,
    pub error: Option<String>,
}

impl QuotaDecision {
    pub fn granted() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn denied(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkSuggestion {
    pub text: String,
    pub href: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Msg {
    /// Validated envelope from the rendering surface.
    Surface(SurfaceEvent),
    /// Document replaced or edited on the host side.
    HostEdited { html: String },
    TitleChanged(String),
    /// User triggered a generation action.
    GenerateRequested(GenerationRequest),
    QuotaChecked {
        request_id: RequestId,
        decision: QuotaDecision,
    },
    Submitted {
        request_id: RequestId,
        result: Result<Submission, String>,
        at_ms: u64,
    },
    /// One scheduled poll tick; reports may arrive in any order.
    PollTick { at_ms: u64, reports: Vec<PollReport> },
    /// User applied a result by hand, racing the scheduled tick.
    ApplyNow { job_id: JobId, url: String },
    /// Save the surface selection before focus leaves it.
    CaptureSelection,
    Format {
        command: String,
        value: Option<String>,
    },
    ResizeSelected { width_percent: u8 },
    DeleteSelected,
    StartAutoLink { text: String },
    AutoLinkFinished {
        token: RunToken,
        result: Result<Vec<LinkSuggestion>, String>,
    },
    RecordingStarted,
    RecordingStopped,
    RecordingCancelled,
    TranscriptionFinished {
        token: RunToken,
        result: Result<String, String>,
    },
    /// Tear down all jobs and runs.
    Dispose,
    NoOp,
}
