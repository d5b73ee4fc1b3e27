use std::sync::Arc;

use composer_core::{
    update, Effect, GenerationRequest, JobId, Msg, Notification, OrchestratorConfig,
    OrchestratorState, OrchestratorView, Submission, SurfaceEvent,
};
use engine_logging::{engine_debug, engine_info, engine_warn};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::collaborators::{LinkSuggester, LogNotifier, Notifier, Transcriber, Unconfigured};
use crate::persist::{save_with_retry, DocumentStore, RetryPolicy};
use crate::poller::Poller;
use crate::probe::{LivenessProbe, NoProbe};
use crate::provider::ProviderSet;
use crate::quota::QuotaGate;
use crate::transport::SurfaceSink;
use crate::types::ProviderError;

/// External services the orchestrator talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub providers: ProviderSet,
    pub probe: Arc<dyn LivenessProbe>,
    pub quota: Arc<dyn QuotaGate>,
    pub store: Arc<dyn DocumentStore>,
    pub notifier: Arc<dyn Notifier>,
    pub links: Arc<dyn LinkSuggester>,
    pub transcriber: Arc<dyn Transcriber>,
}

impl Collaborators {
    pub fn new(
        providers: ProviderSet,
        quota: Arc<dyn QuotaGate>,
        store: Arc<dyn DocumentStore>,
    ) -> Self {
        Self {
            providers,
            probe: Arc::new(NoProbe),
            quota,
            store,
            notifier: Arc::new(LogNotifier),
            links: Arc::new(Unconfigured),
            transcriber: Arc::new(Unconfigured),
        }
    }

    pub fn with_probe(mut self, probe: Arc<dyn LivenessProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_links(mut self, links: Arc<dyn LinkSuggester>) -> Self {
        self.links = links;
        self
    }

    pub fn with_transcriber(mut self, transcriber: Arc<dyn Transcriber>) -> Self {
        self.transcriber = transcriber;
        self
    }
}

/// Cloneable front door to a running [`Orchestrator`].
#[derive(Debug, Clone)]
pub struct OrchestratorHandle {
    tx: mpsc::UnboundedSender<Msg>,
    cancel: CancellationToken,
    view: watch::Receiver<OrchestratorView>,
}

impl OrchestratorHandle {
    /// Queues a message; `false` once the orchestrator has stopped.
    pub fn send(&self, msg: Msg) -> bool {
        self.tx.send(msg).is_ok()
    }

    pub fn surface_event(&self, event: SurfaceEvent) -> bool {
        self.send(Msg::Surface(event))
    }

    pub fn generate(&self, request: GenerationRequest) -> bool {
        self.send(Msg::GenerateRequested(request))
    }

    pub fn apply_now(&self, job_id: JobId, url: impl Into<String>) -> bool {
        self.send(Msg::ApplyNow {
            job_id,
            url: url.into(),
        })
    }

    pub fn host_edit(&self, html: impl Into<String>) -> bool {
        self.send(Msg::HostEdited { html: html.into() })
    }

    pub fn set_title(&self, title: impl Into<String>) -> bool {
        self.send(Msg::TitleChanged(title.into()))
    }

    pub fn view(&self) -> OrchestratorView {
        self.view.borrow().clone()
    }

    /// Receiver that observes the view after every handled message.
    pub fn subscribe(&self) -> watch::Receiver<OrchestratorView> {
        self.view.clone()
    }

    /// Stops the event loop; a pending save is flushed before `run` returns.
    pub fn dispose(&self) {
        self.cancel.cancel();
    }

    pub fn is_disposed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Owns the core state and runs the single event loop that applies messages,
/// fires poll ticks and executes effects.
pub struct Orchestrator {
    state: OrchestratorState,
    collaborators: Collaborators,
    tx: mpsc::UnboundedSender<Msg>,
    rx: mpsc::UnboundedReceiver<Msg>,
    cancel: CancellationToken,
    view_tx: watch::Sender<OrchestratorView>,
}

impl Orchestrator {
    pub fn new(
        config: OrchestratorConfig,
        title: impl Into<String>,
        html: impl Into<String>,
        collaborators: Collaborators,
    ) -> (Self, OrchestratorHandle) {
        let state = OrchestratorState::new(config, title, html);
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let (view_tx, view_rx) = watch::channel(state.view());
        let handle = OrchestratorHandle {
            tx: tx.clone(),
            cancel: cancel.clone(),
            view: view_rx,
        };
        let orchestrator = Self {
            state,
            collaborators,
            tx,
            rx,
            cancel,
            view_tx,
        };
        (orchestrator, handle)
    }

    /// Runs until disposed and returns the final state.
    pub async fn run(self, sink: Arc<dyn SurfaceSink>) -> OrchestratorState {
        let Orchestrator {
            mut state,
            collaborators,
            tx,
            mut rx,
            cancel,
            view_tx,
        } = self;
        let config = state.config().clone();
        let mut driver = Driver {
            poller: Poller::new(collaborators.providers.clone(), collaborators.probe.clone()),
            collaborators,
            tx,
            sink,
            retry: RetryPolicy {
                attempts: config.persist_retry_attempts,
                base_backoff: config.persist_backoff(),
            },
            debounce: config.persist_debounce(),
            pending_save: None,
            save_deadline: None,
            save_task: None,
            tick_in_flight: false,
        };

        let mut interval = tokio::time::interval(config.poll_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        engine_info!("orchestrator started; polling every {:?}", config.poll_interval());

        loop {
            let save_deadline = driver.save_deadline;
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                Some(msg) = rx.recv() => {
                    state = driver.dispatch(state, msg);
                    let _ = view_tx.send(state.view());
                    if state.is_disposed() {
                        break;
                    }
                }
                _ = interval.tick() => driver.start_tick(&state),
                _ = save_timer(save_deadline) => driver.start_save(),
            }
        }

        if !state.is_disposed() {
            state = driver.dispatch(state, Msg::Dispose);
        }
        driver.flush_saves().await;
        let _ = view_tx.send(state.view());
        engine_info!("orchestrator stopped");
        state
    }
}

async fn save_timer(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Wall-clock milliseconds since the epoch.
pub fn now_ms() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or_default()
}

struct Driver {
    collaborators: Collaborators,
    poller: Poller,
    tx: mpsc::UnboundedSender<Msg>,
    sink: Arc<dyn SurfaceSink>,
    retry: RetryPolicy,
    debounce: std::time::Duration,
    pending_save: Option<(String, String)>,
    save_deadline: Option<Instant>,
    save_task: Option<JoinHandle<()>>,
    tick_in_flight: bool,
}

impl Driver {
    fn dispatch(&mut self, state: OrchestratorState, msg: Msg) -> OrchestratorState {
        if matches!(msg, Msg::PollTick { .. }) {
            self.tick_in_flight = false;
        }
        let (state, effects) = update(state, msg);
        for effect in effects {
            self.execute(effect);
        }
        state
    }

    fn start_tick(&mut self, state: &OrchestratorState) {
        if self.tick_in_flight || !state.needs_tick() {
            return;
        }
        self.tick_in_flight = true;
        let targets = state.poll_targets();
        let poller = self.poller.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let at_ms = now_ms();
            let reports = poller.poll(targets, at_ms).await;
            let _ = tx.send(Msg::PollTick { at_ms, reports });
        });
    }

    fn execute(&mut self, effect: Effect) {
        match effect {
            Effect::Send(command) => {
                if let Err(err) = self.sink.deliver(&command) {
                    engine_warn!("failed to deliver {}: {}", command.type_name(), err);
                }
            }
            Effect::ConsumeQuota {
                request_id,
                feature_key,
            } => {
                let quota = self.collaborators.quota.clone();
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    let decision = match quota.try_consume(&feature_key).await {
                        Ok(decision) => decision,
                        Err(err) => composer_core::QuotaDecision::denied(err.to_string()),
                    };
                    let _ = tx.send(Msg::QuotaChecked {
                        request_id,
                        decision,
                    });
                });
            }
            Effect::SubmitGeneration {
                request_id,
                request,
            } => {
                let provider = self.collaborators.providers.get(request.provider);
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    let result: Result<Submission, ProviderError> = match provider {
                        Some(provider) => provider.submit(&request).await,
                        None => Err(ProviderError::NotConfigured(request.provider.to_string())),
                    };
                    let _ = tx.send(Msg::Submitted {
                        request_id,
                        result: result.map_err(|err| err.to_string()),
                        at_ms: now_ms(),
                    });
                });
            }
            Effect::SuggestLinks { token, text } => {
                let links = self.collaborators.links.clone();
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    let result = links.suggest(&text).await;
                    let _ = tx.send(Msg::AutoLinkFinished { token, result });
                });
            }
            Effect::Transcribe { token } => {
                let transcriber = self.collaborators.transcriber.clone();
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    let result = transcriber.transcribe().await;
                    let _ = tx.send(Msg::TranscriptionFinished { token, result });
                });
            }
            Effect::Notify(notification) => self.collaborators.notifier.notify(&notification),
            Effect::PersistDocument { title, html } => {
                self.pending_save = Some((title, html));
                self.save_deadline = Some(Instant::now() + self.debounce);
            }
        }
    }

    /// Debounce elapsed: hand the latest document to the store in the background.
    fn start_save(&mut self) {
        self.save_deadline = None;
        let Some((title, html)) = self.pending_save.take() else {
            return;
        };
        if self.save_task.as_ref().is_some_and(|task| !task.is_finished()) {
            engine_debug!("previous save still running; queueing the newer document");
            self.pending_save = Some((title, html));
            self.save_deadline = Some(Instant::now() + self.debounce);
            return;
        }
        let store = self.collaborators.store.clone();
        let notifier = self.collaborators.notifier.clone();
        let retry = self.retry;
        self.save_task = Some(tokio::spawn(async move {
            save_document(store, notifier.as_ref(), &title, &html, retry).await;
        }));
    }

    /// Waits for a running save, then writes whatever is still pending.
    async fn flush_saves(&mut self) {
        if let Some(task) = self.save_task.take() {
            let _ = task.await;
        }
        self.save_deadline = None;
        if let Some((title, html)) = self.pending_save.take() {
            save_document(
                self.collaborators.store.clone(),
                self.collaborators.notifier.as_ref(),
                &title,
                &html,
                self.retry,
            )
            .await;
        }
    }
}

async fn save_document(
    store: Arc<dyn DocumentStore>,
    notifier: &dyn Notifier,
    title: &str,
    html: &str,
    retry: RetryPolicy,
) {
    if let Err(err) = save_with_retry(store, title, html, retry).await {
        notifier.notify(&Notification::warning(format!(
            "The document could not be saved: {err}"
        )));
    }
}
