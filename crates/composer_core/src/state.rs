use std::collections::BTreeMap;

use crate::config::OrchestratorConfig;
use crate::dedup::{DedupKey, DedupStore};
use crate::document::{DocumentSync, Interaction, SelectedElement, SelectionState};
use crate::job::{GenerationRequest, InsertionIntent, PollTarget, RequestId};
use crate::registry::JobRegistry;
use crate::run_guard::{RunGuard, RunToken};
use crate::view_model::{JobRowView, OrchestratorView};

/// A generation request waiting for quota or for the provider to accept it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequest {
    pub request: GenerationRequest,
    pub dedup_key: DedupKey,
    pub intent: InsertionIntent,
    pub stage: RequestStage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStage {
    AwaitingQuota,
    Submitting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordingState {
    #[default]
    Idle,
    Active(RunToken),
    Transcribing(RunToken),
}

/// Everything the orchestrator owns. Mutated only through [`crate::update`].
#[derive(Debug)]
pub struct OrchestratorState {
    pub(crate) config: OrchestratorConfig,
    pub(crate) registry: JobRegistry,
    pub(crate) dedup: DedupStore,
    pub(crate) runs: RunGuard,
    pub(crate) document: DocumentSync,
    pub(crate) selection: SelectionState,
    pub(crate) selected: Option<SelectedElement>,
    pub(crate) last_interaction: Option<Interaction>,
    pub(crate) requests: BTreeMap<RequestId, PendingRequest>,
    pub(crate) next_request_id: RequestId,
    pub(crate) recording: RecordingState,
    pub(crate) poll_tick: u64,
    pub(crate) disposed: bool,
}

impl OrchestratorState {
    pub fn new(config: OrchestratorConfig, title: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            registry: JobRegistry::new(config.attempt_ceilings, config.history_capacity),
            dedup: DedupStore::new(config.dedup_capacity),
            runs: RunGuard::new(),
            document: DocumentSync::new(title, html),
            selection: SelectionState::default(),
            selected: None,
            last_interaction: None,
            requests: BTreeMap::new(),
            next_request_id: 1,
            recording: RecordingState::Idle,
            poll_tick: 0,
            disposed: false,
            config,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    pub fn dedup(&self) -> &DedupStore {
        &self.dedup
    }

    pub fn document(&self) -> &DocumentSync {
        &self.document
    }

    pub fn selection(&self) -> &SelectionState {
        &self.selection
    }

    pub fn recording(&self) -> RecordingState {
        self.recording
    }

    pub fn pending_request(&self, request_id: RequestId) -> Option<&PendingRequest> {
        self.requests.get(&request_id)
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Pending jobs in registry order, as the poller needs them.
    pub fn poll_targets(&self) -> Vec<PollTarget> {
        if self.disposed {
            return Vec::new();
        }
        self.registry.poll_targets()
    }

    /// Whether a poll tick has anything to do, including sweeping resolved jobs.
    pub fn needs_tick(&self) -> bool {
        !self.disposed && !self.registry.is_empty()
    }

    pub fn view(&self) -> OrchestratorView {
        OrchestratorView {
            jobs: self
                .registry
                .jobs()
                .iter()
                .map(|job| JobRowView {
                    job_id: job.id.clone(),
                    provider: job.provider,
                    kind: job.kind,
                    status: job.status,
                    attempts: job.attempts,
                    result_url: job.result_url.clone(),
                })
                .collect(),
            pending_count: self.registry.list_pending().len(),
            history_count: self.registry.history().count(),
            in_flight_requests: self.requests.len(),
            document_revision: self.document.revision(),
            surface_ready: self.document.is_surface_ready(),
            selected_element_id: self.selected.as_ref().map(|s| s.id.clone()),
            saved_selection_text: self.selection.saved().map(|s| s.text.clone()),
            last_interaction: self.last_interaction.clone(),
            recording: self.recording,
            poll_tick: self.poll_tick,
        }
    }

    pub(crate) fn allocate_request_id(&mut self) -> RequestId {
        let id = self.next_request_id;
        self.next_request_id += 1;
        id
    }
}
