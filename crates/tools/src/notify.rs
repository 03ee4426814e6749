//! Notification emitter.
//!
//! Fire-and-forget events pushed to the protocol layer outside the
//! request/response cycle. Delivery failure is dropped, never retried, and
//! never surfaces to the tool call that triggered it.

use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// A formatted console log line was captured.
    ConsoleMessage { line: String },
    /// The resource listing changed (new or replaced screenshot).
    ResourcesListChanged,
}

#[derive(Clone)]
pub struct Notifier {
    tx: mpsc::UnboundedSender<Notification>,
}

impl Notifier {
    /// Create an emitter and the receiver the server drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn console_message(&self, line: String) {
        let _ = self.tx.send(Notification::ConsoleMessage { line });
    }

    pub fn resources_list_changed(&self) {
        let _ = self.tx.send(Notification::ResourcesListChanged);
    }
}
