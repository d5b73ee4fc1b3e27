use std::collections::BTreeMap;

use engine_logging::{engine_debug, engine_info, engine_warn};

use crate::dedup::DedupKey;
use crate::document::{Interaction, SelectedElement};
use crate::job::{
    FailureReason, InsertionIntent, InsertionMode, JobId, JobOutcome, JobSpec, PollOutcome,
    PollReport, RequestId, Submission,
};
use crate::msg::{LinkSuggestion, QuotaDecision};
use crate::protocol::{HostCommand, SurfaceEvent};
use crate::registry::{timeout_outcome, AttemptVerdict, JobError, Resolution};
use crate::resolver::{self, placeholder_html, placeholder_id_for, text_fragment};
use crate::run_guard::{RunCategory, RunToken, RunVerdict};
use crate::state::{PendingRequest, RecordingState, RequestStage};
use crate::{Effect, Msg, Notification, OrchestratorState};

/// Pure update function: applies a message to state and returns any effects.
///
/// After every message the document reaction runs: a pending host-side change
/// is pushed down (unless it was the surface's own snapshot) and a dirty
/// document is handed to persistence.
pub fn update(mut state: OrchestratorState, msg: Msg) -> (OrchestratorState, Vec<Effect>) {
    if state.disposed && !matches!(msg, Msg::NoOp) {
        engine_debug!("orchestrator disposed; ignoring {:?}", msg);
        return (state, Vec::new());
    }

    let mut effects = Vec::new();
    match msg {
        Msg::Surface(event) => on_surface_event(&mut state, event),
        Msg::HostEdited { html } => state.document.host_edit(html),
        Msg::TitleChanged(title) => state.document.set_title(title),
        Msg::GenerateRequested(request) => on_generate(&mut state, request, &mut effects),
        Msg::QuotaChecked {
            request_id,
            decision,
        } => on_quota(&mut state, request_id, decision, &mut effects),
        Msg::Submitted {
            request_id,
            result,
            at_ms,
        } => on_submitted(&mut state, request_id, result, at_ms, &mut effects),
        Msg::PollTick { at_ms, reports } => on_poll_tick(&mut state, at_ms, reports, &mut effects),
        Msg::ApplyNow { job_id, url } => {
            if state.registry.get(&job_id).is_some() {
                apply_outcome(&mut state, &job_id, JobOutcome::Succeeded { url }, &mut effects);
            } else {
                engine_warn!("apply requested for unknown or swept job {}", job_id);
            }
        }
        Msg::CaptureSelection => effects.push(Effect::Send(HostCommand::QuerySelection)),
        Msg::Format { command, value } => {
            effects.push(Effect::Send(HostCommand::FormatCommand { command, value }))
        }
        Msg::ResizeSelected { width_percent } => {
            if let Some(selected) = state.selected.as_mut() {
                let width = width_percent.clamp(5, 100);
                selected.width_percent = Some(f32::from(width));
                let mut styles = BTreeMap::new();
                styles.insert("width".to_string(), format!("{width}%"));
                styles.insert("height".to_string(), "auto".to_string());
                effects.push(Effect::Send(HostCommand::UpdateStyle {
                    id: selected.id.clone(),
                    styles,
                }));
            }
        }
        Msg::DeleteSelected => {
            if let Some(selected) = state.selected.take() {
                effects.push(Effect::Send(HostCommand::DeleteElement { id: selected.id }));
            }
        }
        Msg::StartAutoLink { text } => {
            let token = state.runs.start_run(RunCategory::AutoLink);
            engine_info!("auto-link run {} started", token.seq);
            effects.push(Effect::SuggestLinks { token, text });
        }
        Msg::AutoLinkFinished { token, result } => {
            on_auto_link_finished(&mut state, token, result, &mut effects)
        }
        Msg::RecordingStarted => {
            let token = state.runs.start_run(RunCategory::Recording);
            state.recording = RecordingState::Active(token);
        }
        Msg::RecordingStopped => {
            // Leave the active state before the transcription call is issued.
            if let RecordingState::Active(token) = state.recording {
                state.recording = RecordingState::Transcribing(token);
                effects.push(Effect::Transcribe { token });
            }
        }
        Msg::RecordingCancelled => {
            state.runs.cancel(RunCategory::Recording);
            state.recording = RecordingState::Idle;
        }
        Msg::TranscriptionFinished { token, result } => {
            on_transcription_finished(&mut state, token, result, &mut effects)
        }
        Msg::Dispose => {
            engine_info!(
                "disposing orchestrator with {} jobs and {} requests",
                state.registry.len(),
                state.requests.len()
            );
            state.registry.clear();
            state.requests.clear();
            state.runs.cancel(RunCategory::AutoLink);
            state.runs.cancel(RunCategory::Recording);
            state.recording = RecordingState::Idle;
            state.disposed = true;
        }
        Msg::NoOp => {}
    }

    if let Some(command) = state.document.take_push() {
        effects.push(Effect::Send(command));
    }
    if state.document.consume_dirty() {
        effects.push(Effect::PersistDocument {
            title: state.document.title().to_string(),
            html: state.document.html().to_string(),
        });
    }

    (state, effects)
}

fn on_surface_event(state: &mut OrchestratorState, event: SurfaceEvent) {
    match event {
        SurfaceEvent::Ready => {
            engine_info!("surface ready");
            state.document.mark_ready();
        }
        SurfaceEvent::DocumentChanged { html } => {
            if state.document.accept_snapshot(html) {
                if let Some(selected) = &state.selected {
                    if !state.document.contains_element(&selected.id) {
                        state.selected = None;
                    }
                }
            }
        }
        SurfaceEvent::ElementSelected {
            id,
            kind,
            width_percent,
        } => {
            state.selected = Some(SelectedElement {
                id,
                kind,
                width_percent,
            });
        }
        SurfaceEvent::ElementDeselected { id } => {
            if state.selected.as_ref().is_some_and(|s| s.id == id) {
                state.selected = None;
            }
        }
        SurfaceEvent::Interaction { text, x, y } => {
            state.last_interaction = Some(Interaction { text, x, y });
        }
        SurfaceEvent::SelectionCaptured { text, element_id } => {
            let token = state.selection.save(text, element_id);
            engine_debug!("selection saved as {:?}", token);
        }
    }
}

fn on_generate(
    state: &mut OrchestratorState,
    request: crate::GenerationRequest,
    effects: &mut Vec<Effect>,
) {
    let dedup_key = request.dedup_key();
    if state.dedup.has_key(&dedup_key) {
        engine_debug!("duplicate generation request collapsed key={}", dedup_key);
        return;
    }

    let request_id = state.allocate_request_id();
    let intent = match request.mode {
        // Planted only once quota is granted.
        InsertionMode::AtCaret => InsertionIntent::at_caret(Some(placeholder_id_for(request_id))),
        InsertionMode::AfterSelection => match state.selection.saved() {
            Some(saved) => InsertionIntent::after_selection(saved.token),
            None => {
                effects.push(Effect::Notify(Notification::warning(
                    "Select some text before generating content after it.",
                )));
                return;
            }
        },
    };

    engine_info!(
        "request {} provider={} kind={} mode={:?}",
        request_id,
        request.provider,
        request.kind(),
        request.mode
    );
    state.dedup.remember(dedup_key.clone());
    effects.push(Effect::ConsumeQuota {
        request_id,
        feature_key: request.provider.feature_key().to_string(),
    });
    state.requests.insert(
        request_id,
        PendingRequest {
            request,
            dedup_key,
            intent,
            stage: RequestStage::AwaitingQuota,
        },
    );
}

fn on_quota(
    state: &mut OrchestratorState,
    request_id: RequestId,
    decision: QuotaDecision,
    effects: &mut Vec<Effect>,
) {
    let Some(pending) = state.requests.get_mut(&request_id) else {
        engine_warn!("quota answer for unknown request {}", request_id);
        return;
    };
    if pending.stage != RequestStage::AwaitingQuota {
        engine_warn!("duplicate quota answer for request {}", request_id);
        return;
    }
    if !decision.success {
        let reason = decision
            .error
            .unwrap_or_else(|| "not enough credits".to_string());
        abandon_request(state, request_id, FailureReason::QuotaDenied(reason), effects);
        return;
    }
    pending.stage = RequestStage::Submitting;
    if let Some(placeholder_id) = &pending.intent.placeholder_id {
        effects.push(Effect::Send(HostCommand::InsertFragment {
            html: placeholder_html(placeholder_id, pending.request.kind()),
            mode: InsertionMode::AtCaret,
            placeholder_id: None,
        }));
    }
    effects.push(Effect::SubmitGeneration {
        request_id,
        request: pending.request.clone(),
    });
}

fn on_submitted(
    state: &mut OrchestratorState,
    request_id: RequestId,
    result: Result<Submission, String>,
    at_ms: u64,
    effects: &mut Vec<Effect>,
) {
    let Some(pending) = state.requests.get(&request_id) else {
        engine_warn!("submission result for unknown request {}", request_id);
        return;
    };
    let submission = match result {
        Ok(submission) => submission,
        Err(message) => {
            abandon_request(state, request_id, FailureReason::SubmitFailed(message), effects);
            return;
        }
    };
    let spec = JobSpec::from_submission(
        &pending.request,
        submission,
        pending.intent.clone(),
        pending.dedup_key.clone(),
    );
    match state.registry.enqueue(spec, at_ms) {
        Ok(job_id) => {
            engine_info!("request {} became job {}", request_id, job_id);
            state.requests.remove(&request_id);
        }
        Err(err) => {
            engine_warn!("request {} rejected: {}", request_id, err);
            abandon_request(
                state,
                request_id,
                FailureReason::SubmitFailed(err.to_string()),
                effects,
            );
        }
    }
}

/// Drops a request that never became a job, undoing what was planted for it.
fn abandon_request(
    state: &mut OrchestratorState,
    request_id: RequestId,
    reason: FailureReason,
    effects: &mut Vec<Effect>,
) {
    let Some(pending) = state.requests.remove(&request_id) else {
        return;
    };
    engine_info!("request {} abandoned: {}", request_id, reason);
    state.dedup.forget(&pending.dedup_key);
    if pending.stage != RequestStage::AwaitingQuota {
        if let Some(placeholder) = pending.intent.placeholder_id {
            effects.push(Effect::Send(HostCommand::DeleteElement { id: placeholder }));
        }
    }
    let message = match &reason {
        FailureReason::QuotaDenied(error) => format!("Generation not started: {error}"),
        other => format!("{} generation failed: {other}", pending.request.kind()),
    };
    effects.push(Effect::Notify(Notification::error(message)));
}

fn on_poll_tick(
    state: &mut OrchestratorState,
    at_ms: u64,
    mut reports: Vec<PollReport>,
    effects: &mut Vec<Effect>,
) {
    state.poll_tick += 1;
    engine_logging::set_poll_tick(state.poll_tick);

    let swept = state.registry.sweep_resolved();
    if !swept.is_empty() {
        engine_debug!("swept {} resolved jobs", swept.len());
    }

    // Apply in registry order regardless of completion order.
    reports.sort_by_key(|report| state.registry.position(&report.job_id).unwrap_or(usize::MAX));

    for report in reports {
        let verdict = match state.registry.record_attempt(&report.job_id, at_ms) {
            Ok(verdict) => verdict,
            Err(JobError::JobAlreadyResolved(id)) => {
                engine_debug!("job {} resolved before its report arrived", id);
                continue;
            }
            Err(err) => {
                engine_warn!("dropping report: {}", err);
                continue;
            }
        };
        let outcome = match report.result {
            Ok(PollOutcome::Succeeded { url }) => Some(JobOutcome::Succeeded { url }),
            Ok(PollOutcome::Failed { reason }) => Some(JobOutcome::Failed {
                reason: FailureReason::Provider(reason),
            }),
            Ok(PollOutcome::Pending) => None,
            Err(message) => {
                engine_warn!("transient error polling {}: {}", report.job_id, message);
                None
            }
        };
        let outcome = match (outcome, verdict) {
            (Some(outcome), _) => outcome,
            (None, AttemptVerdict::CeilingExceeded) => timeout_outcome(),
            (None, AttemptVerdict::WithinBudget) => continue,
        };
        apply_outcome(state, &report.job_id, outcome, effects);
    }

    engine_logging::clear_poll_tick();
}

/// Where a successful result ends up once the document has been checked.
enum Placement {
    Insert(resolver::Insertion),
    /// The asset is already in the document; only the placeholder goes.
    AlreadyPresent,
}

/// Resolves a job and applies its result: insertion on success, one
/// notification on failure. A repeated resolution applies nothing.
///
/// A success whose insertion target is gone resolves as
/// `Failed { InsertionTargetLost }`.
fn apply_outcome(
    state: &mut OrchestratorState,
    job_id: &JobId,
    outcome: JobOutcome,
    effects: &mut Vec<Effect>,
) {
    let Some(job) = state.registry.get(job_id).cloned() else {
        engine_warn!("outcome for unknown or swept job {}", job_id);
        return;
    };
    let (outcome, placement) = match outcome {
        JobOutcome::Succeeded { url } => match place_result(state, &job, &url) {
            Ok(placement) => (JobOutcome::Succeeded { url }, Some(placement)),
            Err(err) => {
                engine_warn!("job {}: {}", job.id, err);
                let reason = FailureReason::InsertionTargetLost;
                (JobOutcome::Failed { reason }, None)
            }
        },
        failed @ JobOutcome::Failed { .. } => (failed, None),
    };

    match state.registry.mark_resolved(job_id, outcome.clone()) {
        Ok(Resolution::Resolved) => {}
        Ok(Resolution::Unchanged) => {
            engine_debug!("job {} already resolved with this outcome", job_id);
            return;
        }
        Err(err) => {
            engine_warn!("{}", err);
            return;
        }
    }
    state.dedup.forget(&job.dedup_key);

    match (outcome, placement) {
        (JobOutcome::Succeeded { .. }, Some(Placement::Insert(insertion))) => {
            engine_info!(
                "inserting {} for job {} as {}",
                job.kind,
                job.id,
                insertion.fragment.element_id
            );
            state.dedup.remember(insertion.fragment.dedup_key);
            effects.extend(insertion.commands.into_iter().map(Effect::Send));
        }
        (JobOutcome::Succeeded { .. }, _) => {
            engine_info!("job {} result already in document; skipping insert", job.id);
            remove_placeholder(state, &job, effects);
            effects.push(Effect::Notify(
                Notification::warning(format!(
                    "The generated {} is already in the document.",
                    job.kind
                ))
                .for_job(job.id.clone()),
            ));
        }
        (JobOutcome::Failed { reason }, _) => {
            remove_placeholder(state, &job, effects);
            let notification = match &reason {
                FailureReason::InsertionTargetLost => Notification::warning(format!(
                    "The {} finished but its spot in the document is gone ({reason}).",
                    job.kind
                )),
                _ => Notification::error(format!("{} generation failed: {reason}", job.kind)),
            };
            effects.push(Effect::Notify(notification.for_job(job.id.clone())));
        }
    }
    state.registry.mark_applied(job_id);
}

fn place_result(
    state: &OrchestratorState,
    job: &crate::Job,
    url: &str,
) -> Result<Placement, resolver::InsertionError> {
    let asset_key = DedupKey::for_asset(url);
    if state.dedup.has_key(&asset_key) || state.document.count_dedup_key(asset_key.as_str()) > 0 {
        return Ok(Placement::AlreadyPresent);
    }
    resolver::resolve(job, url, &state.document, &state.selection).map(Placement::Insert)
}

fn remove_placeholder(state: &OrchestratorState, job: &crate::Job, effects: &mut Vec<Effect>) {
    if let Some(placeholder) = &job.insertion_intent.placeholder_id {
        if state.document.contains_element(placeholder) {
            effects.push(Effect::Send(HostCommand::DeleteElement {
                id: placeholder.clone(),
            }));
        }
    }
}

fn on_auto_link_finished(
    state: &mut OrchestratorState,
    token: RunToken,
    result: Result<Vec<LinkSuggestion>, String>,
    effects: &mut Vec<Effect>,
) {
    if state.runs.complete(&token) == RunVerdict::Stale {
        engine_debug!("stale auto-link run {} discarded", token.seq);
        return;
    }
    match result {
        Ok(links) => {
            engine_info!("auto-link run {} produced {} links", token.seq, links.len());
            effects.extend(links.into_iter().map(|link| {
                Effect::Send(HostCommand::WrapLink {
                    text: link.text,
                    href: link.href,
                })
            }));
        }
        Err(message) => effects.push(Effect::Notify(Notification::warning(format!(
            "Link suggestions failed: {message}"
        )))),
    }
}

fn on_transcription_finished(
    state: &mut OrchestratorState,
    token: RunToken,
    result: Result<String, String>,
    effects: &mut Vec<Effect>,
) {
    if state.runs.complete(&token) == RunVerdict::Stale {
        engine_debug!("stale recording run {} discarded", token.seq);
        return;
    }
    state.recording = RecordingState::Idle;
    match result {
        Ok(text) if text.trim().is_empty() => {}
        Ok(text) => effects.push(Effect::Send(HostCommand::InsertFragment {
            html: text_fragment(text.trim()),
            mode: InsertionMode::AtCaret,
            placeholder_id: None,
        })),
        Err(message) => effects.push(Effect::Notify(Notification::warning(format!(
            "Transcription failed: {message}"
        )))),
    }
}
