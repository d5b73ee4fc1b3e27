use composer_core::{
    update, Effect, GenerationRequest, HostCommand, InsertionMode, LinkSuggestion, Msg,
    OrchestratorConfig, OrchestratorState, ProviderKind, RecordingState, RunToken, SurfaceEvent,
};

fn ready_state() -> OrchestratorState {
    let state = OrchestratorState::new(OrchestratorConfig::default(), "Doc", "<p>rust and tokio</p>");
    let (state, _) = update(state, Msg::Surface(SurfaceEvent::Ready));
    state
}

fn start_auto_link(state: OrchestratorState, text: &str) -> (OrchestratorState, RunToken) {
    let (state, effects) = update(state, Msg::StartAutoLink { text: text.into() });
    let token = effects
        .iter()
        .find_map(|effect| match effect {
            Effect::SuggestLinks { token, .. } => Some(*token),
            _ => None,
        })
        .expect("suggest effect");
    (state, token)
}

fn link(text: &str, href: &str) -> LinkSuggestion {
    LinkSuggestion {
        text: text.into(),
        href: href.into(),
    }
}

fn wrapped(effects: &[Effect]) -> Vec<String> {
    effects
        .iter()
        .filter_map(|effect| match effect {
            Effect::Send(HostCommand::WrapLink { href, .. }) => Some(href.clone()),
            _ => None,
        })
        .collect()
}

#[test]
fn stale_auto_link_result_is_discarded() {
    let (state, first) = start_auto_link(ready_state(), "rust and tokio");
    let (state, second) = start_auto_link(state, "rust and tokio");

    let (state, effects) = update(
        state,
        Msg::AutoLinkFinished {
            token: second,
            result: Ok(vec![link("tokio", "https://tokio.rs")]),
        },
    );
    assert_eq!(wrapped(&effects), vec!["https://tokio.rs".to_string()]);

    let (_state, effects) = update(
        state,
        Msg::AutoLinkFinished {
            token: first,
            result: Ok(vec![link("rust", "https://rust-lang.org")]),
        },
    );
    assert!(effects.is_empty());
}

#[test]
fn auto_link_result_applies_once() {
    let (state, token) = start_auto_link(ready_state(), "rust");
    let result = Ok(vec![link("rust", "https://rust-lang.org")]);
    let (state, effects) = update(
        state,
        Msg::AutoLinkFinished {
            token,
            result: result.clone(),
        },
    );
    assert_eq!(wrapped(&effects).len(), 1);
    let (_state, effects) = update(state, Msg::AutoLinkFinished { token, result });
    assert!(wrapped(&effects).is_empty());
}

#[test]
fn stopping_recording_leaves_active_before_transcribing() {
    let (state, _) = update(ready_state(), Msg::RecordingStarted);
    let token = match state.recording() {
        RecordingState::Active(token) => token,
        other => panic!("expected active recording, got {other:?}"),
    };

    let (state, effects) = update(state, Msg::RecordingStopped);
    assert_eq!(state.recording(), RecordingState::Transcribing(token));
    assert_eq!(effects, vec![Effect::Transcribe { token }]);

    let (state, effects) = update(
        state,
        Msg::TranscriptionFinished {
            token,
            result: Ok("hello <world>".into()),
        },
    );
    assert_eq!(state.recording(), RecordingState::Idle);
    assert_eq!(
        effects,
        vec![Effect::Send(HostCommand::InsertFragment {
            html: "<span>hello &lt;world&gt;</span>".into(),
            mode: InsertionMode::AtCaret,
            placeholder_id: None,
        })]
    );
}

#[test]
fn cancelled_recording_discards_transcription() {
    let (state, _) = update(ready_state(), Msg::RecordingStarted);
    let (state, effects) = update(state, Msg::RecordingStopped);
    let token = match effects.as_slice() {
        [Effect::Transcribe { token }] => *token,
        other => panic!("unexpected effects {other:?}"),
    };
    let (state, _) = update(state, Msg::RecordingCancelled);
    assert_eq!(state.recording(), RecordingState::Idle);

    let (_state, effects) = update(
        state,
        Msg::TranscriptionFinished {
            token,
            result: Ok("late text".into()),
        },
    );
    assert!(effects.is_empty());
}

#[test]
fn restarted_recording_supersedes_previous_session() {
    let (state, _) = update(ready_state(), Msg::RecordingStarted);
    let (state, effects) = update(state, Msg::RecordingStopped);
    let old = match effects.as_slice() {
        [Effect::Transcribe { token }] => *token,
        other => panic!("unexpected effects {other:?}"),
    };
    let (state, _) = update(state, Msg::RecordingStarted);

    let (state, effects) = update(
        state,
        Msg::TranscriptionFinished {
            token: old,
            result: Ok("old".into()),
        },
    );
    assert!(effects.is_empty());
    assert!(matches!(state.recording(), RecordingState::Active(_)));
}

#[test]
fn stop_without_active_recording_is_ignored() {
    let (state, effects) = update(ready_state(), Msg::RecordingStopped);
    assert!(effects.is_empty());
    assert_eq!(state.recording(), RecordingState::Idle);
}

#[test]
fn dispose_drops_jobs_and_ignores_later_messages() {
    let request = GenerationRequest::new(ProviderKind::ImageProviderA, "x", InsertionMode::AtCaret);
    let (state, _) = update(ready_state(), Msg::GenerateRequested(request.clone()));
    let (state, _) = update(state, Msg::Dispose);
    assert!(state.is_disposed());
    assert_eq!(state.view().in_flight_requests, 0);
    assert!(state.poll_targets().is_empty());

    let (_state, effects) = update(state, Msg::GenerateRequested(request));
    assert!(effects.is_empty());
}
