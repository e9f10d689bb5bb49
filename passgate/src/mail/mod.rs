//! Outgoing mail: the transport seam and the messages the flows send.
//!
//! The core renders a message and hands it to a [`Mailer`]. Delivery is the
//! transport's business; the token is already stored by the time `send` is
//! called, so a failed send never loses it.

use async_trait::async_trait;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;

pub mod templates;

pub use templates::MailComposer;

/// A rendered message ready for a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Transport failures
#[derive(Debug, Error)]
pub enum MailError {
    #[error("Mail transport unavailable: {0}")]
    Unavailable(String),

    #[error("Mail rejected by transport: {0}")]
    Rejected(String),
}

/// Mail delivery abstraction
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Deliver a message or report why it could not be delivered
    async fn send(&self, mail: &OutgoingMail) -> Result<(), MailError>;
}

/// Development transport that logs instead of sending.
///
/// Only the recipient and subject are logged; bodies carry links.
#[derive(Debug, Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), MailError> {
        log::info!("Mail to {} with subject '{}' (log transport)", mail.to, mail.subject);
        Ok(())
    }
}

/// Transport that keeps every message in memory.
///
/// Clones share the same outbox. Can be switched into a failing mode to
/// exercise delivery errors.
#[derive(Debug, Clone, Default)]
pub struct RecordingMailer {
    outbox: Arc<Mutex<Vec<OutgoingMail>>>,
    failing: Arc<Mutex<bool>>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every message sent so far
    pub fn sent(&self) -> Vec<OutgoingMail> {
        self.outbox
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Most recent message, if any
    pub fn last(&self) -> Option<OutgoingMail> {
        self.outbox
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }

    /// Make subsequent sends fail (or succeed again)
    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap_or_else(PoisonError::into_inner) = failing;
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), MailError> {
        if *self.failing.lock().unwrap_or_else(PoisonError::into_inner) {
            return Err(MailError::Unavailable("recording mailer set to fail".to_string()));
        }
        self.outbox
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(mail.clone());
        Ok(())
    }
}
