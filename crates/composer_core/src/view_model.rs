use crate::document::Interaction;
use crate::job::{JobId, JobKind, JobStatus, ProviderKind};
use crate::state::RecordingState;

#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorView {
    pub jobs: Vec<JobRowView>,
    pub pending_count: usize,
    pub history_count: usize,
    pub in_flight_requests: usize,
    pub document_revision: u64,
    pub surface_ready: bool,
    pub selected_element_id: Option<String>,
    pub saved_selection_text: Option<String>,
    pub last_interaction: Option<Interaction>,
    pub recording: RecordingState,
    pub poll_tick: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRowView {
    pub job_id: JobId,
    pub provider: ProviderKind,
    pub kind: JobKind,
    pub status: JobStatus,
    pub attempts: u32,
    pub result_url: Option<String>,
}
