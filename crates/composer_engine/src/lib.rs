//! Composer engine: async collaborators and the orchestrator event loop.
mod collaborators;
pub mod normalize;
mod orchestrator;
mod persist;
mod poller;
mod probe;
mod provider;
mod quota;
mod transport;
mod types;

pub use collaborators::{LinkSuggester, LogNotifier, Notifier, Transcriber, Unconfigured};
pub use normalize::normalize;
pub use orchestrator::{now_ms, Collaborators, Orchestrator, OrchestratorHandle};
pub use persist::{
    ensure_document_dir, save_with_retry, AtomicFileWriter, DocumentStore, FileDocumentStore,
    PersistError, RetryPolicy,
};
pub use poller::Poller;
pub use probe::{HttpProbe, LivenessProbe, NoProbe};
pub use provider::{
    submission_from, GenerationProvider, HttpProvider, ProviderSet, ProviderSettings,
};
pub use quota::{CreditBudget, HttpQuotaGate, QuotaGate, QuotaSettings, UnlimitedQuota};
pub use transport::{
    read_inbound, ChannelSink, InboundLine, JsonLinesSink, SurfaceSink, TransportError,
};
pub use types::{ProbeError, ProviderError, QuotaError};
