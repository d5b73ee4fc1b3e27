use crate::job::{GenerationRequest, RequestId};
use crate::protocol::HostCommand;
use crate::run_guard::RunToken;
use crate::JobId;

/// Side effects requested by [`crate::update`]; executed by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Deliver a command to the rendering surface.
    Send(HostCommand),
    ConsumeQuota {
        request_id: RequestId,
        feature_key: String,
    },
    SubmitGeneration {
        request_id: RequestId,
        request: GenerationRequest,
    },
    SuggestLinks {
        token: RunToken,
        text: String,
    },
    Transcribe {
        token: RunToken,
    },
    Notify(Notification),
    /// Debounced by the engine before reaching the document store.
    PersistDocument {
        title: String,
        html: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
}

/// Transient, dismissible message for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
    pub job_id: Option<JobId>,
}

impl Notification {
    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Warning,
            message: message.into(),
            job_id: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Error,
            message: message.into(),
            job_id: None,
        }
    }

    pub fn for_job(mut self, job_id: JobId) -> Self {
        self.job_id = Some(job_id);
        self
    }
}
