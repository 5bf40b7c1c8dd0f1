//! The two edges of the daemon: where messages come from and where drafts go.

pub mod maildir;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::entities::{Draft, DraftError, Message};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("unreadable message {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: mailparse::MailParseError,
    },
    #[error(transparent)]
    Draft(#[from] DraftError),
    #[error("invalid address: {0}")]
    Address(#[from] lettre::address::AddressError),
    #[error("could not build message: {0}")]
    Build(#[from] lettre::error::Error),
    #[error("smtp relay failed: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}

/// Source of newly arrived messages. Each call returns only messages that
/// no earlier call returned.
#[async_trait]
pub trait Receiver: Send {
    async fn fetch(&mut self) -> Result<Vec<Message>, TransportError>;
}

/// Sink for finished drafts. Implementations must refuse drafts that are
/// not ready, and should make the sent message visible to a later fetch.
#[async_trait]
pub trait Sender: Send {
    async fn send(&mut self, draft: &Draft) -> Result<(), TransportError>;
}

#[derive(Debug, Default)]
struct Mailbox {
    messages: Vec<Message>,
    fetched: usize,
}

/// In-memory transport that delivers everything it sends back to itself.
/// Clones share one mailbox, so one clone can receive while another sends.
#[derive(Debug, Clone, Default)]
pub struct Loopback {
    mailbox: Arc<Mutex<Mailbox>>,
}

impl Loopback {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops an incoming message into the mailbox.
    pub async fn deliver(&self, message: Message) {
        self.mailbox.lock().await.messages.push(message);
    }

    /// Every message the mailbox has seen, in arrival order.
    pub async fn messages(&self) -> Vec<Message> {
        self.mailbox.lock().await.messages.clone()
    }
}

#[async_trait]
impl Receiver for Loopback {
    async fn fetch(&mut self) -> Result<Vec<Message>, TransportError> {
        let mut mailbox = self.mailbox.lock().await;
        let fresh = mailbox.messages[mailbox.fetched..].to_vec();
        mailbox.fetched = mailbox.messages.len();
        Ok(fresh)
    }
}

#[async_trait]
impl Sender for Loopback {
    async fn send(&mut self, draft: &Draft) -> Result<(), TransportError> {
        let message = draft.to_message(Utc::now())?;
        self.mailbox.lock().await.messages.push(message);
        Ok(())
    }
}
