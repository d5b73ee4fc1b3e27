use std::collections::HashMap;

/// Named long-running actions that can be restarted or cancelled mid-flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunCategory {
    AutoLink,
    Recording,
}

/// Sequence token handed out by [`RunGuard::start_run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RunToken {
    pub category: RunCategory,
    pub seq: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunVerdict {
    /// The token is current; the caller may apply its result.
    Current,
    /// A newer run superseded this one, or it already completed.
    Stale,
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    seq: u64,
    running: bool,
}

/// Per-category sequence tokens used to discard superseded completions.
#[derive(Debug, Clone, Default)]
pub struct RunGuard {
    next_seq: u64,
    slots: HashMap<RunCategory, Slot>,
}

impl RunGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issues a new token; any previous token of the category becomes stale.
    pub fn start_run(&mut self, category: RunCategory) -> RunToken {
        self.next_seq += 1;
        self.slots.insert(
            category,
            Slot {
                seq: self.next_seq,
                running: true,
            },
        );
        RunToken {
            category,
            seq: self.next_seq,
        }
    }

    pub fn is_current(&self, token: &RunToken) -> bool {
        self.slots
            .get(&token.category)
            .is_some_and(|slot| slot.running && slot.seq == token.seq)
    }

    /// Settles a run. Only the first completion of the current token is `Current`.
    pub fn complete(&mut self, token: &RunToken) -> RunVerdict {
        if !self.is_current(token) {
            return RunVerdict::Stale;
        }
        if let Some(slot) = self.slots.get_mut(&token.category) {
            slot.running = false;
        }
        RunVerdict::Current
    }

    /// Invalidates whatever run of the category is in flight.
    pub fn cancel(&mut self, category: RunCategory) {
        self.next_seq += 1;
        self.slots.insert(
            category,
            Slot {
                seq: self.next_seq,
                running: false,
            },
        );
    }

    pub fn is_running(&self, category: RunCategory) -> bool {
        self.slots.get(&category).is_some_and(|slot| slot.running)
    }
}
