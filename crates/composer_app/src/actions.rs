use composer_core::{GenerationRequest, InsertionMode, JobId, Msg, ProviderKind};
use serde::Deserialize;

/// Host-side control line, e.g. `{"action":"generate","provider":"video-provider","prompt":"..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum HostAction {
    #[serde(rename_all = "camelCase")]
    Generate {
        provider: ProviderKind,
        prompt: String,
        #[serde(default)]
        style: Option<String>,
        #[serde(default = "default_mode")]
        mode: InsertionMode,
    },
    #[serde(rename_all = "camelCase")]
    ApplyNow { job_id: JobId, url: String },
    HostEdit { html: String },
    SetTitle { title: String },
    CaptureSelection,
    Format {
        command: String,
        #[serde(default)]
        value: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    ResizeSelected { width_percent: u8 },
    DeleteSelected,
    AutoLink { text: String },
    RecordingStart,
    RecordingStop,
    RecordingCancel,
    Quit,
}

fn default_mode() -> InsertionMode {
    InsertionMode::AtCaret
}

impl HostAction {
    /// The orchestrator message for this action; `None` for `quit`.
    pub fn into_msg(self) -> Option<Msg> {
        let msg = match self {
            HostAction::Generate {
                provider,
                prompt,
                style,
                mode,
            } => Msg::GenerateRequested(GenerationRequest {
                provider,
                prompt,
                style,
                mode,
            }),
            HostAction::ApplyNow { job_id, url } => Msg::ApplyNow { job_id, url },
            HostAction::HostEdit { html } => Msg::HostEdited { html },
            HostAction::SetTitle { title } => Msg::TitleChanged(title),
            HostAction::CaptureSelection => Msg::CaptureSelection,
            HostAction::Format { command, value } => Msg::Format { command, value },
            HostAction::ResizeSelected { width_percent } => Msg::ResizeSelected { width_percent },
            HostAction::DeleteSelected => Msg::DeleteSelected,
            HostAction::AutoLink { text } => Msg::StartAutoLink { text },
            HostAction::RecordingStart => Msg::RecordingStarted,
            HostAction::RecordingStop => Msg::RecordingStopped,
            HostAction::RecordingCancel => Msg::RecordingCancelled,
            HostAction::Quit => return None,
        };
        Some(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> HostAction {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn generate_defaults_to_caret_insertion() {
        let action = parse(json!({
            "action": "generate",
            "provider": "audio-provider-B",
            "prompt": "a sea shanty",
            "style": "folk"
        }));
        assert_eq!(
            action.into_msg(),
            Some(Msg::GenerateRequested(
                GenerationRequest::new(ProviderKind::AudioProviderB, "a sea shanty", InsertionMode::AtCaret)
                    .with_style("folk")
            ))
        );
    }

    #[test]
    fn camel_case_payloads() {
        assert_eq!(
            parse(json!({"action": "apply-now", "jobId": "job-1", "url": "https://x/a.png"})).into_msg(),
            Some(Msg::ApplyNow {
                job_id: JobId::from("job-1"),
                url: "https://x/a.png".into()
            })
        );
        assert_eq!(
            parse(json!({"action": "resize-selected", "widthPercent": 40})).into_msg(),
            Some(Msg::ResizeSelected { width_percent: 40 })
        );
        assert_eq!(
            parse(json!({"action": "generate", "provider": "video-provider", "prompt": "x", "mode": "after-selection"})),
            HostAction::Generate {
                provider: ProviderKind::VideoProvider,
                prompt: "x".into(),
                style: None,
                mode: InsertionMode::AfterSelection,
            }
        );
    }

    #[test]
    fn quit_has_no_message() {
        assert_eq!(parse(json!({"action": "quit"})).into_msg(), None);
    }

    #[test]
    fn unknown_action_is_rejected() {
        assert!(serde_json::from_value::<HostAction>(json!({"action": "explode"})).is_err());
    }
}
