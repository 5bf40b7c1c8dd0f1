use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::metadata::EventTag;

/// A message as it appears in the log: either received from a participant
/// or previously sent by the daemon itself. Never mutated once logged.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
    /// Raw `X-Social-Event` header value. Only present on messages the
    /// daemon sent, and only meaningful once decoded.
    pub event_tag: Option<String>,
}

impl Message {
    pub fn new(from: &str, to: &[&str], subject: &str, body: &str) -> Self {
        Message {
            from: from.to_string(),
            to: to.iter().map(|addr| addr.to_string()).collect(),
            subject: subject.to_string(),
            body: body.to_string(),
            created_at: Utc::now(),
            event_tag: None,
        }
    }

    pub fn at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn with_event_tag(mut self, token: &str) -> Self {
        self.event_tag = Some(token.to_string());
        self
    }

    /// Decoded tag, if the message carries one the codec recognizes.
    pub fn tag(&self) -> Option<EventTag> {
        self.event_tag.as_deref().and_then(crate::metadata::recognize)
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum DraftError {
    #[error("draft is not ready to send: {0}")]
    NotReady(&'static str),
}

/// An outbound message still being assembled.
#[derive(Debug, Clone, PartialEq)]
pub struct Draft {
    pub from: Option<String>,
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
    pub tag: Option<EventTag>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Draft {
    pub fn new(now: DateTime<Utc>) -> Self {
        Draft {
            from: None,
            to: Vec::new(),
            subject: String::new(),
            body: String::new(),
            tag: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn from_addr(mut self, from: &str) -> Self {
        self.from = Some(from.to_string());
        self
    }

    pub fn to_addr(mut self, to: &str) -> Self {
        if !self.to.iter().any(|existing| existing == to) {
            self.to.push(to.to_string());
        }
        self
    }

    pub fn subject(mut self, subject: &str) -> Self {
        self.subject = subject.to_string();
        self
    }

    pub fn body(mut self, body: &str) -> Self {
        self.body = body.to_string();
        self
    }

    pub fn tagged(mut self, tag: EventTag) -> Self {
        self.tag = Some(tag);
        self
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }

    pub fn is_ready(&self) -> bool {
        self.missing_field().is_none()
    }

    fn missing_field(&self) -> Option<&'static str> {
        if self.from.as_deref().map_or(true, str::is_empty) {
            Some("sender")
        } else if self.to.is_empty() {
            Some("recipients")
        } else if self.subject.trim().is_empty() {
            Some("subject")
        } else if self.body.trim().is_empty() {
            Some("body")
        } else {
            None
        }
    }

    /// Commits the draft, stamping the encoded event tag.
    pub fn to_message(&self, sent_at: DateTime<Utc>) -> Result<Message, DraftError> {
        if let Some(field) = self.missing_field() {
            return Err(DraftError::NotReady(field));
        }
        Ok(Message {
            from: self.from.clone().unwrap_or_default(),
            to: self.to.clone(),
            subject: self.subject.clone(),
            body: self.body.clone(),
            created_at: sent_at,
            event_tag: self.tag.as_ref().map(crate::metadata::encode),
        })
    }
}

/// A participant account. Derived by replay, never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub name: String,
    pub address: String,
}

impl Account {
    pub fn new(name: &str, address: &str) -> Self {
        Account {
            name: name.to_string(),
            address: address.to_string(),
        }
    }
}
