//! Human-readable status messages surfaced to whatever front end drives the core.

use std::sync::mpsc::{Receiver, Sender, channel};

/// Severity of a status message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusTone {
    Busy,
    Info,
    Warning,
    Error,
}

/// A single status update.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusMessage {
    pub text: String,
    pub tone: StatusTone,
}

/// Cloneable sink that logs a status update and forwards it to the front end.
///
/// A reporter without a channel only logs, which keeps headless tools and tests quiet.
#[derive(Clone, Debug, Default)]
pub struct StatusReporter {
    tx: Option<Sender<StatusMessage>>,
}

impl StatusReporter {
    /// Create a reporter plus the receiving end the front end polls.
    pub fn channel() -> (Self, Receiver<StatusMessage>) {
        let (tx, rx) = channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// Reporter that only writes to the log.
    pub fn silent() -> Self {
        Self { tx: None }
    }

    pub fn report(&self, text: impl Into<String>, tone: StatusTone) {
        let text = text.into();
        match tone {
            StatusTone::Busy | StatusTone::Info => tracing::info!("{text}"),
            StatusTone::Warning => tracing::warn!("{text}"),
            StatusTone::Error => tracing::error!("{text}"),
        }
        if let Some(tx) = &self.tx {
            let _ = tx.send(StatusMessage { text, tone });
        }
    }

    pub fn busy(&self, text: impl Into<String>) {
        self.report(text, StatusTone::Busy);
    }

    pub fn info(&self, text: impl Into<String>) {
        self.report(text, StatusTone::Info);
    }

    pub fn warn(&self, text: impl Into<String>) {
        self.report(text, StatusTone::Warning);
    }

    pub fn error(&self, text: impl Into<String>) {
        self.report(text, StatusTone::Error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forwards_messages_in_order() {
        let (reporter, rx) = StatusReporter::channel();
        reporter.busy("Loading model");
        reporter.error("Model load failed");
        let messages: Vec<_> = rx.try_iter().collect();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].tone, StatusTone::Busy);
        assert_eq!(messages[1].text, "Model load failed");
    }

    #[test]
    fn silent_reporter_drops_messages() {
        StatusReporter::silent().info("nobody listening");
    }
}
