use crate::core::{CanonicalEvent, EventSender, StreamError};

pub const UPLOAD_EVENT: &str = "ftpUpload";

/// Hook for an embedded FTP server: every stored file becomes an alarm of the uploading camera.
///
/// The binary does not start an FTP server. Whoever embeds one calls `file_uploaded` from its
/// upload callback with a sender from the shared event queue.
#[derive(Debug, Clone)]
pub struct UploadNotifier {
    events: EventSender,
}

impl UploadNotifier {
    pub fn new(events: EventSender) -> Self {
        Self { events }
    }

    pub async fn file_uploaded(&self, login_user: &str, path: &str) -> Result<(), StreamError> {
        tracing::debug!("FTP upload by {}: {}", login_user, path);
        self.events
            .emit(CanonicalEvent::new(login_user, UPLOAD_EVENT, path))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::event_queue;

    #[tokio::test]
    async fn upload_becomes_event() {
        let (sender, mut rx) = event_queue(1);
        let notifier = UploadNotifier::new(sender);

        notifier.file_uploaded("frontdoor", "/frontdoor/2024-02-11/snap.jpg").await.unwrap();

        assert_eq!(
            rx.recv().await.unwrap(),
            CanonicalEvent::new("frontdoor", "ftpUpload", "/frontdoor/2024-02-11/snap.jpg")
        );
    }
}
