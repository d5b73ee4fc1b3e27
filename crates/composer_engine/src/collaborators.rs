use composer_core::{LinkSuggestion, Notification, NotificationLevel};

/// Transient notification channel towards the user.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: &Notification);
}

/// Sends notifications to the log under the `composer::notify` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: &Notification) {
        let level = match notification.level {
            NotificationLevel::Info => log::Level::Info,
            NotificationLevel::Warning => log::Level::Warn,
            NotificationLevel::Error => log::Level::Error,
        };
        match &notification.job_id {
            Some(job) => log::log!(target: "composer::notify", level, "[{job}] {}", notification.message),
            None => log::log!(target: "composer::notify", level, "{}", notification.message),
        }
    }
}

/// Produces hyperlink suggestions for a stretch of text.
#[async_trait::async_trait]
pub trait LinkSuggester: Send + Sync {
    async fn suggest(&self, text: &str) -> Result<Vec<LinkSuggestion>, String>;
}

/// Turns the recording that just stopped into text.
#[async_trait::async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self) -> Result<String, String>;
}

/// Stand-in for a collaborator the host was started without.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unconfigured;

#[async_trait::async_trait]
impl LinkSuggester for Unconfigured {
    async fn suggest(&self, _text: &str) -> Result<Vec<LinkSuggestion>, String> {
        Err("link suggestions are not configured".to_string())
    }
}

#[async_trait::async_trait]
impl Transcriber for Unconfigured {
    async fn transcribe(&self) -> Result<String, String> {
        Err("transcription is not configured".to_string())
    }
}
