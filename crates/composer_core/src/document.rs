use scraper::{ElementRef, Html};

use crate::protocol::{ElementKind, HostCommand};

/// Attribute carried by generated fragments so duplicates can be spotted in a snapshot.
pub const DEDUP_ATTRIBUTE: &str = "data-dedup-key";

/// Host-side authority over the document HTML plus the echo-suppression state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentSync {
    title: String,
    html: String,
    surface_ready: bool,
    /// Content changed since the host last reacted to it.
    content_changed: bool,
    /// The last change came up from the surface and must not be pushed back down.
    skip_next_push: bool,
    dirty: bool,
    revision: u64,
}

impl DocumentSync {
    pub fn new(title: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            html: html.into(),
            surface_ready: false,
            content_changed: false,
            skip_next_push: false,
            dirty: false,
            revision: 0,
        }
    }

    pub fn html(&self) -> &str {
        &self.html
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn is_surface_ready(&self) -> bool {
        self.surface_ready
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        let title = title.into();
        if title != self.title {
            self.title = title;
            self.dirty = true;
        }
    }

    /// A change made on the host side (load, external edit); pushed down on the next reaction.
    pub fn host_edit(&mut self, html: impl Into<String>) {
        let html = html.into();
        if html == self.html {
            return;
        }
        self.html = html;
        self.skip_next_push = false;
        self.content_changed = true;
        self.touch();
    }

    /// Applies a `document-changed` snapshot. Returns `false` if it matched the current copy.
    pub fn accept_snapshot(&mut self, html: impl Into<String>) -> bool {
        let html = html.into();
        if html == self.html {
            return false;
        }
        self.html = html;
        self.content_changed = true;
        self.skip_next_push = true;
        self.touch();
        true
    }

    /// The surface finished loading; it needs the full document once.
    pub fn mark_ready(&mut self) {
        self.surface_ready = true;
        self.skip_next_push = false;
        self.content_changed = true;
    }

    /// Host reaction to a content change: push the document down unless the
    /// change was the surface's own snapshot.
    pub fn take_push(&mut self) -> Option<HostCommand> {
        if !self.content_changed {
            return None;
        }
        if self.skip_next_push {
            self.skip_next_push = false;
            self.content_changed = false;
            return None;
        }
        if !self.surface_ready {
            return None;
        }
        self.content_changed = false;
        Some(HostCommand::SetDocument {
            html: self.html.clone(),
        })
    }

    pub fn consume_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    pub fn contains_element(&self, id: &str) -> bool {
        contains_element(&self.html, id)
    }

    pub fn count_dedup_key(&self, key: &str) -> usize {
        count_dedup_key(&self.html, key)
    }

    fn touch(&mut self) {
        self.dirty = true;
        self.revision += 1;
    }
}

/// Whether an element with this `id` exists in the HTML.
pub fn contains_element(html: &str, id: &str) -> bool {
    let fragment = Html::parse_fragment(html);
    let found = fragment
        .root_element()
        .descendants()
        .filter_map(ElementRef::wrap)
        .any(|element| element.value().id() == Some(id));
    found
}

/// Number of elements tagged with the given dedup key.
pub fn count_dedup_key(html: &str, key: &str) -> usize {
    let fragment = Html::parse_fragment(html);
    let count = fragment
        .root_element()
        .descendants()
        .filter_map(ElementRef::wrap)
        .filter(|element| element.value().attr(DEDUP_ATTRIBUTE) == Some(key))
        .count();
    count
}

/// Opaque handle for a range saved inside the surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SelectionToken(u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedSelection {
    pub token: SelectionToken,
    pub text: String,
    pub element_id: Option<String>,
}

/// The surface holds at most one saved range; a newer capture replaces it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionState {
    saved: Option<SavedSelection>,
    next_token: u64,
}

impl SelectionState {
    pub fn save(&mut self, text: impl Into<String>, element_id: Option<String>) -> SelectionToken {
        self.next_token += 1;
        let token = SelectionToken(self.next_token);
        self.saved = Some(SavedSelection {
            token,
            text: text.into(),
            element_id,
        });
        token
    }

    pub fn saved(&self) -> Option<&SavedSelection> {
        self.saved.as_ref()
    }

    /// The range behind `token` is still the one the surface would restore.
    pub fn is_restorable(&self, token: SelectionToken) -> bool {
        self.saved.as_ref().is_some_and(|saved| saved.token == token)
    }

    pub fn clear(&mut self) {
        self.saved = None;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectedElement {
    pub id: String,
    pub kind: ElementKind,
    pub width_percent: Option<f32>,
}

/// Context-menu or double-click position with the text under it.
#[derive(Debug, Clone, PartialEq)]
pub struct Interaction {
    pub text: String,
    pub x: f64,
    pub y: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_elements_by_id_and_dedup_key() {
        let html = r#"<p>a</p><div id="ph-1">x</div><img id="gen-1" data-dedup-key="asset-1" src="a">"#;
        assert!(contains_element(html, "ph-1"));
        assert!(!contains_element(html, "ph-2"));
        assert_eq!(count_dedup_key(html, "asset-1"), 1);
        assert_eq!(count_dedup_key(html, "asset-2"), 0);
    }

    #[test]
    fn host_edit_before_ready_is_pushed_on_ready() {
        let mut doc = DocumentSync::new("t", "");
        doc.host_edit("<p>a</p>");
        assert_eq!(doc.take_push(), None);
        doc.mark_ready();
        assert_eq!(
            doc.take_push(),
            Some(HostCommand::SetDocument {
                html: "<p>a</p>".into()
            })
        );
        assert_eq!(doc.take_push(), None);
    }

    #[test]
    fn snapshot_is_not_echoed_back() {
        let mut doc = DocumentSync::new("t", "<p>a</p>");
        doc.mark_ready();
        doc.take_push();

        assert!(doc.accept_snapshot("<p>b</p>"));
        assert_eq!(doc.take_push(), None);
        assert_eq!(doc.html(), "<p>b</p>");

        // The flag is consumed: the next host edit goes down again.
        doc.host_edit("<p>c</p>");
        assert!(doc.take_push().is_some());
    }

    #[test]
    fn identical_snapshot_arms_nothing() {
        let mut doc = DocumentSync::new("t", "<p>a</p>");
        doc.mark_ready();
        doc.take_push();
        assert!(!doc.accept_snapshot("<p>a</p>"));
        doc.host_edit("<p>b</p>");
        assert!(doc.take_push().is_some());
    }

    #[test]
    fn newer_selection_invalidates_older_token() {
        let mut selection = SelectionState::default();
        let first = selection.save("one", None);
        assert!(selection.is_restorable(first));
        let second = selection.save("two", Some("p1".into()));
        assert!(!selection.is_restorable(first));
        assert!(selection.is_restorable(second));
        selection.clear();
        assert!(!selection.is_restorable(second));
    }
}
