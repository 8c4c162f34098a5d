//! Outbound chat transport.
//!
//! The notifier and the command handler only know [`Transport`].  The
//! production implementation is the Telegram Bot API client in
//! [`telegram`].

pub mod telegram;

pub use telegram::TelegramClient;

use async_trait::async_trait;

use crate::error::TransportError;

/// Longest text message the transport accepts.
pub const TEXT_LIMIT: usize = 4096;
/// Longest photo caption the transport accepts.
pub const CAPTION_LIMIT: usize = 1024;

/// Sends HTML-formatted messages to a recipient.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send_text(&self, recipient: &str, html: &str) -> Result<(), TransportError>;

    async fn send_photo(
        &self,
        recipient: &str,
        image_url: &str,
        caption: &str,
    ) -> Result<(), TransportError>;
}

#[cfg(test)]
pub mod fake {
    //! Recording [`Transport`] for tests.

    use std::collections::HashSet;
    use std::sync::Mutex;

    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Sent {
        Text { to: String, html: String },
        Photo { to: String, image_url: String, caption: String },
    }

    impl Sent {
        pub fn recipient(&self) -> &str {
            match self {
                Sent::Text { to, .. } | Sent::Photo { to, .. } => to,
            }
        }
    }

    #[derive(Default)]
    pub struct RecordingTransport {
        sent: Mutex<Vec<Sent>>,
        failing: Mutex<HashSet<String>>,
    }

    impl RecordingTransport {
        /// Every delivery to `recipient` fails from now on.
        pub fn fail_for(&self, recipient: &str) {
            self.failing.lock().unwrap().insert(recipient.to_string());
        }

        pub fn sent(&self) -> Vec<Sent> {
            self.sent.lock().unwrap().clone()
        }

        fn check(&self, recipient: &str) -> Result<(), TransportError> {
            if self.failing.lock().unwrap().contains(recipient) {
                return Err(TransportError::Api("Forbidden: bot was blocked by the user".into()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn send_text(&self, recipient: &str, html: &str) -> Result<(), TransportError> {
            self.check(recipient)?;
            self.sent.lock().unwrap().push(Sent::Text {
                to: recipient.to_string(),
                html: html.to_string(),
            });
            Ok(())
        }

        async fn send_photo(
            &self,
            recipient: &str,
            image_url: &str,
            caption: &str,
        ) -> Result<(), TransportError> {
            self.check(recipient)?;
            self.sent.lock().unwrap().push(Sent::Photo {
                to: recipient.to_string(),
                image_url: image_url.to_string(),
                caption: caption.to_string(),
            });
            Ok(())
        }
    }
}
