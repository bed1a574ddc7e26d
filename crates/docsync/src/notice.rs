use tokio::sync::broadcast;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Error,
}

/// A user-facing toast
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
    pub causes: Vec<String>,
    pub dismissible: bool,
}

/// Fan-out of notices to whatever renders them
pub struct NoticeCenter {
    tx: broadcast::Sender<Notice>,
}

impl NoticeCenter {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self { tx }
    }

    /// Transient acknowledgment
    pub fn success(&self, message: impl Into<String>) {
        self.emit(Notice {
            level: NoticeLevel::Success,
            message: message.into(),
            causes: Vec::new(),
            dismissible: false,
        });
    }

    /// Dismissible error listing its causes
    pub fn error(&self, message: impl Into<String>, causes: Vec<String>) {
        self.emit(Notice {
            level: NoticeLevel::Error,
            message: message.into(),
            causes,
            dismissible: true,
        });
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.tx.subscribe()
    }

    fn emit(&self, notice: Notice) {
        if self.tx.send(notice).is_err() {
            debug!("Notice dropped, nobody is listening");
        }
    }
}

impl Default for NoticeCenter {
    fn default() -> Self {
        Self::new()
    }
}
