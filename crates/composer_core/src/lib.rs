//! Composer core: pure orchestrator state machine for background generation
//! jobs and the live-preview sync protocol.
mod config;
mod dedup;
mod document;
mod effect;
mod job;
mod msg;
pub mod protocol;
mod registry;
pub mod resolver;
mod run_guard;
mod state;
mod update;
mod view_model;

pub use config::{AttemptCeilings, OrchestratorConfig};
pub use dedup::{normalize_url_for_dedupe, DedupKey, DedupStore};
pub use document::{
    contains_element, count_dedup_key, DocumentSync, Interaction, SavedSelection,
    SelectedElement, SelectionState, SelectionToken, DEDUP_ATTRIBUTE,
};
pub use effect::{Effect, Notification, NotificationLevel};
pub use job::{
    FailureReason, GenerationRequest, InsertionIntent, InsertionMode, Job, JobId, JobKind,
    JobOutcome, JobSpec, JobStatus, PollOutcome, PollReport, PollTarget, ProviderKind, RequestId,
    Submission,
};
pub use msg::{LinkSuggestion, Msg, QuotaDecision};
pub use protocol::{HostCommand, ProtocolError, SurfaceEvent};
pub use registry::{AttemptVerdict, JobError, JobRegistry, Resolution};
pub use run_guard::{RunCategory, RunGuard, RunToken, RunVerdict};
pub use state::{OrchestratorState, PendingRequest, RecordingState, RequestStage};
pub use update::update;
pub use view_model::{JobRowView, OrchestratorView};
