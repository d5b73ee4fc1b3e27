use thiserror::Error;

use crate::dedup::DedupKey;
use crate::document::{DocumentSync, SelectionState, DEDUP_ATTRIBUTE};
use crate::job::{InsertionMode, Job, JobKind, RequestId};
use crate::protocol::HostCommand;

/// HTML for a resolved asset, tagged with a stable id and its dedup key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub element_id: String,
    pub dedup_key: DedupKey,
    pub html: String,
}

/// Commands that place a fragment into the surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Insertion {
    pub fragment: Fragment,
    pub commands: Vec<HostCommand>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InsertionError {
    #[error("placeholder {0} is no longer in the document")]
    PlaceholderLost(String),
    #[error("the selection captured for this job is gone")]
    SelectionLost,
}

pub fn element_id_for(job: &Job) -> String {
    format!("gen-{}", job.id)
}

pub fn placeholder_id_for(request_id: RequestId) -> String {
    format!("ph-{request_id}")
}

/// Builds the placeholder planted at the caret while a job runs.
pub fn placeholder_html(placeholder_id: &str, kind: JobKind) -> String {
    format!(
        r#"<div id="{id}" class="generation-placeholder" data-kind="{kind}" contenteditable="false" style="padding:12px;border:1px dashed #c4c4c4;border-radius:6px;color:#777;">Generating {kind}…</div>"#,
        id = escape_attr(placeholder_id),
        kind = kind.as_str(),
    )
}

/// Builds the kind-specific fragment for a finished job.
pub fn build_fragment(job: &Job, url: &str) -> Fragment {
    let element_id = element_id_for(job);
    let dedup_key = DedupKey::for_asset(url);
    let id = escape_attr(&element_id);
    let key = escape_attr(dedup_key.as_str());
    let src = escape_attr(url);
    let attr = DEDUP_ATTRIBUTE;
    let html = match job.kind {
        JobKind::Image => format!(
            r#"<img id="{id}" {attr}="{key}" src="{src}" alt="" style="max-width:100%;height:auto;" />"#
        ),
        JobKind::Video => format!(
            r#"<div id="{id}" class="video-embed" {attr}="{key}" contenteditable="false" style="width:100%;"><video src="{src}" controls preload="metadata" style="width:100%;"></video></div>"#
        ),
        JobKind::Audio => format!(
            r#"<audio id="{id}" {attr}="{key}" src="{src}" controls preload="none"></audio>"#
        ),
        JobKind::Infographic => format!(
            r#"<figure id="{id}" class="infographic" {attr}="{key}" style="margin:1em 0;"><img src="{src}" alt="infographic" style="width:100%;height:auto;" /></figure>"#
        ),
    };
    Fragment {
        element_id,
        dedup_key,
        html,
    }
}

/// Decides where a finished job goes. Never falls back to another position:
/// a lost target drops the insertion.
pub fn resolve(
    job: &Job,
    url: &str,
    document: &DocumentSync,
    selection: &SelectionState,
) -> Result<Insertion, InsertionError> {
    let intent = &job.insertion_intent;
    let fragment = build_fragment(job, url);
    let commands = match intent.mode {
        InsertionMode::AtCaret => match intent.placeholder_id.as_deref() {
            Some(placeholder) => {
                if !document.contains_element(placeholder) {
                    return Err(InsertionError::PlaceholderLost(placeholder.to_string()));
                }
                vec![HostCommand::InsertFragment {
                    html: fragment.html.clone(),
                    mode: InsertionMode::AtCaret,
                    placeholder_id: Some(placeholder.to_string()),
                }]
            }
            None => vec![HostCommand::InsertFragment {
                html: fragment.html.clone(),
                mode: InsertionMode::AtCaret,
                placeholder_id: None,
            }],
        },
        InsertionMode::AfterSelection => {
            let restorable = intent
                .selection
                .is_some_and(|token| selection.is_restorable(token));
            if !restorable {
                return Err(InsertionError::SelectionLost);
            }
            vec![
                HostCommand::RestoreSelection,
                HostCommand::InsertFragment {
                    html: fragment.html.clone(),
                    mode: InsertionMode::AfterSelection,
                    placeholder_id: None,
                },
            ]
        }
    };
    Ok(Insertion { fragment, commands })
}

/// Wraps plain text (a transcription, say) so it can travel as a fragment.
pub fn text_fragment(text: &str) -> String {
    format!("<span>{}</span>", escape_text(text))
}

pub fn escape_attr(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

fn escape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}
