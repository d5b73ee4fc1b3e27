//! Maps each provider's status document onto [`PollOutcome`].
//!
//! Unknown status values count as pending; the attempt ceiling bounds them.
use composer_core::{PollOutcome, ProviderKind};
use serde_json::Value;

struct Vocabulary {
    status: &'static str,
    pending: &'static [&'static str],
    success: &'static [&'static str],
    /// A leading `*` matches by suffix.
    failure: &'static [&'static str],
    url: &'static [&'static str],
}

const IMAGE_A: Vocabulary = Vocabulary {
    status: "/data/successFlag",
    pending: &["0"],
    success: &["1"],
    failure: &["2", "3"],
    url: &["/data/response/resultUrls/0"],
};

const IMAGE_B: Vocabulary = Vocabulary {
    status: "/status",
    pending: &["IN_QUEUE", "IN_PROGRESS"],
    success: &["COMPLETED"],
    failure: &["ERROR", "FAILED"],
    url: &["/images/0/url"],
};

const VIDEO: Vocabulary = Vocabulary {
    status: "/data/state",
    pending: &["waiting", "queuing", "generating"],
    success: &["success"],
    failure: &["fail"],
    url: &["/data/resultUrls/0"],
};

const AUDIO_A: Vocabulary = Vocabulary {
    status: "/status",
    pending: &["queued", "processing"],
    success: &["completed"],
    failure: &["failed"],
    url: &["/audio_url"],
};

const AUDIO_B: Vocabulary = Vocabulary {
    status: "/data/status",
    pending: &["PENDING", "TEXT_SUCCESS", "FIRST_SUCCESS"],
    success: &["SUCCESS"],
    failure: &["*_FAILED", "ERROR"],
    url: &["/data/response/sunoData/0/audioUrl"],
};

const AUDIO_C: Vocabulary = Vocabulary {
    status: "/state",
    pending: &["pending", "running"],
    success: &["done"],
    failure: &["error"],
    url: &["/output/url"],
};

const INFOGRAPHIC: Vocabulary = Vocabulary {
    status: "/status",
    pending: &["processing"],
    success: &["ready"],
    failure: &["failed"],
    url: &["/result/imageUrl"],
};

/// Nested provider fields come before top-level `msg`, which some envelopes
/// use for the transport status ("success") rather than the task error.
const ERROR_POINTERS: &[&str] = &["/data/failMsg", "/error", "/errorMessage", "/msg"];

fn vocabulary(provider: ProviderKind) -> &'static Vocabulary {
    match provider {
        ProviderKind::ImageProviderA => &IMAGE_A,
        ProviderKind::ImageProviderB => &IMAGE_B,
        ProviderKind::VideoProvider => &VIDEO,
        ProviderKind::AudioProviderA => &AUDIO_A,
        ProviderKind::AudioProviderB => &AUDIO_B,
        ProviderKind::AudioProviderC => &AUDIO_C,
        ProviderKind::InfographicProvider => &INFOGRAPHIC,
    }
}

/// Translates a raw status response into a poll outcome.
pub fn normalize(provider: ProviderKind, body: &Value) -> PollOutcome {
    let vocabulary = vocabulary(provider);
    let Some(status) = body.pointer(vocabulary.status).and_then(scalar_text) else {
        return PollOutcome::Pending;
    };

    if matches_any(vocabulary.success, &status) {
        return match result_url(provider, vocabulary, body) {
            Some(url) => PollOutcome::Succeeded { url },
            None => PollOutcome::Failed {
                reason: format!("{provider} reported {status} without a result url"),
            },
        };
    }
    if matches_any(vocabulary.failure, &status) {
        let reason = error_text(body).unwrap_or_else(|| format!("{provider} reported {status}"));
        return PollOutcome::Failed { reason };
    }
    if !matches_any(vocabulary.pending, &status) {
        engine_logging::engine_debug!("{} returned unknown status {:?}; still pending", provider, status);
    }
    PollOutcome::Pending
}

fn matches_any(patterns: &[&str], status: &str) -> bool {
    patterns.iter().any(|pattern| match pattern.strip_prefix('*') {
        Some(suffix) => status.ends_with(suffix),
        None => *pattern == status,
    })
}

fn result_url(provider: ProviderKind, vocabulary: &Vocabulary, body: &Value) -> Option<String> {
    let direct = vocabulary
        .url
        .iter()
        .find_map(|pointer| body.pointer(pointer).and_then(non_empty_text));
    if direct.is_some() || provider != ProviderKind::VideoProvider {
        return direct;
    }
    // The video provider may nest its result as a JSON document inside a string.
    let nested = body.pointer("/data/resultJson")?;
    let parsed;
    let nested = match nested {
        Value::String(raw) => {
            parsed = serde_json::from_str::<Value>(raw).ok()?;
            &parsed
        }
        other => other,
    };
    nested.pointer("/resultUrls/0").and_then(non_empty_text)
}

fn error_text(body: &Value) -> Option<String> {
    ERROR_POINTERS
        .iter()
        .find_map(|pointer| body.pointer(pointer).and_then(non_empty_text))
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.trim().to_string()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

fn non_empty_text(value: &Value) -> Option<String> {
    value
        .as_str()
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn ok(url: &str) -> PollOutcome {
        PollOutcome::Succeeded { url: url.into() }
    }

    fn failed(reason: &str) -> PollOutcome {
        PollOutcome::Failed {
            reason: reason.into(),
        }
    }

    #[test]
    fn image_provider_a_uses_success_flag() {
        let kind = ProviderKind::ImageProviderA;
        assert_eq!(normalize(kind, &json!({"data": {"successFlag": 0}})), PollOutcome::Pending);
        assert_eq!(
            normalize(
                kind,
                &json!({"data": {"successFlag": 1, "response": {"resultUrls": ["https://x/a.png"]}}})
            ),
            ok("https://x/a.png")
        );
        assert_eq!(
            normalize(kind, &json!({"data": {"successFlag": 2, "failMsg": "nsfw"}})),
            failed("nsfw")
        );
        assert_eq!(
            normalize(kind, &json!({"data": {"successFlag": 3}})),
            failed("image-provider-A reported 3")
        );
    }

    #[test]
    fn task_error_wins_over_envelope_message() {
        let body = json!({
            "code": 200,
            "msg": "success",
            "data": {"successFlag": 2, "failMsg": "prompt rejected"}
        });
        assert_eq!(
            normalize(ProviderKind::ImageProviderA, &body),
            failed("prompt rejected")
        );
    }

    #[test]
    fn image_provider_b_reads_status_strings() {
        let kind = ProviderKind::ImageProviderB;
        assert_eq!(normalize(kind, &json!({"status": "IN_QUEUE"})), PollOutcome::Pending);
        assert_eq!(
            normalize(kind, &json!({"status": "COMPLETED", "images": [{"url": "https://x/b.png"}]})),
            ok("https://x/b.png")
        );
        assert_eq!(
            normalize(kind, &json!({"status": "ERROR", "error": "quota"})),
            failed("quota")
        );
    }

    #[test]
    fn video_provider_falls_back_to_result_json_string() {
        let kind = ProviderKind::VideoProvider;
        assert_eq!(normalize(kind, &json!({"data": {"state": "queuing"}})), PollOutcome::Pending);
        let body = json!({
            "data": {
                "state": "success",
                "resultJson": "{\"resultUrls\":[\"https://x/v.mp4\"]}"
            }
        });
        assert_eq!(normalize(kind, &body), ok("https://x/v.mp4"));
        assert_eq!(
            normalize(kind, &json!({"data": {"state": "success"}})),
            failed("video-provider reported success without a result url")
        );
    }

    #[test]
    fn audio_vocabularies() {
        assert_eq!(
            normalize(
                ProviderKind::AudioProviderA,
                &json!({"status": "completed", "audio_url": "https://x/a.mp3"})
            ),
            ok("https://x/a.mp3")
        );
        assert_eq!(
            normalize(ProviderKind::AudioProviderB, &json!({"data": {"status": "TEXT_SUCCESS"}})),
            PollOutcome::Pending
        );
        assert_eq!(
            normalize(
                ProviderKind::AudioProviderB,
                &json!({"data": {"status": "CREATE_TASK_FAILED"}, "msg": "bad lyrics"})
            ),
            failed("bad lyrics")
        );
        assert_eq!(
            normalize(
                ProviderKind::AudioProviderC,
                &json!({"state": "done", "output": {"url": "https://x/c.wav"}})
            ),
            ok("https://x/c.wav")
        );
    }

    #[test]
    fn infographic_ready() {
        assert_eq!(
            normalize(
                ProviderKind::InfographicProvider,
                &json!({"status": "ready", "result": {"imageUrl": "https://x/i.png"}})
            ),
            ok("https://x/i.png")
        );
    }

    #[test]
    fn unknown_or_missing_status_is_pending() {
        assert_eq!(
            normalize(ProviderKind::AudioProviderC, &json!({"state": "thinking"})),
            PollOutcome::Pending
        );
        assert_eq!(normalize(ProviderKind::AudioProviderA, &json!({})), PollOutcome::Pending);
    }
}
