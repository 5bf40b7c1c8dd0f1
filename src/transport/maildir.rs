//! A mailbox kept as a directory of `.eml` files.
//!
//! This is the layout a plain SMTP server dumps received mail in: one file
//! per message, `From`/`To`/`Subject` headers, a blank line and the body.
//! The receiver reads files in name order and remembers which ones it
//! already returned. The sender writes every sent message into the same
//! directory, tagged, so the next fetch picks it up.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use mailparse::{parse_mail, MailAddr, MailHeaderMap, ParsedMail};
use tokio::io::AsyncWriteExt;

use super::{Receiver, Sender, TransportError};
use crate::entities::{Draft, Message};
use crate::metadata::HEADER_NAME;
use crate::smtp_client::SmtpRelay;

const EXTENSION: &str = "eml";

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

pub struct MailDirReceiver {
    dir: PathBuf,
    seen: HashSet<String>,
}

impl MailDirReceiver {
    pub async fn open(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(MailDirReceiver {
            dir,
            seen: HashSet::new(),
        })
    }

    async fn unseen_files(&self) -> std::io::Result<Vec<(String, PathBuf)>> {
        let mut files = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if !self.seen.contains(&name) {
                files.push((name, path));
            }
        }
        files.sort();
        Ok(files)
    }
}

#[async_trait]
impl Receiver for MailDirReceiver {
    async fn fetch(&mut self) -> Result<Vec<Message>, TransportError> {
        let mut messages = Vec::new();
        for (name, path) in self.unseen_files().await? {
            let raw = tokio::fs::read(&path).await?;
            let modified = tokio::fs::metadata(&path)
                .await
                .and_then(|meta| meta.modified())
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());
            match parse_message(&raw, modified) {
                Ok(message) => messages.push(message),
                // a half-written or foreign file must not stall the mailbox
                Err(source) => warn!(
                    "{}",
                    TransportError::Parse {
                        path: path.clone(),
                        source
                    }
                ),
            }
            self.seen.insert(name);
        }
        if !messages.is_empty() {
            debug!("fetched {} messages from {}", messages.len(), self.dir.display());
        }
        Ok(messages)
    }
}

pub struct MailDirSender {
    dir: PathBuf,
    relay: Option<SmtpRelay>,
}

impl MailDirSender {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        MailDirSender {
            dir: dir.into(),
            relay: None,
        }
    }

    /// Also hand every sent message to an SMTP relay before filing it.
    pub fn with_relay(mut self, relay: SmtpRelay) -> Self {
        self.relay = Some(relay);
        self
    }
}

#[async_trait]
impl Sender for MailDirSender {
    async fn send(&mut self, draft: &Draft) -> Result<(), TransportError> {
        let message = draft.to_message(Utc::now())?;
        if let Some(relay) = &self.relay {
            relay.relay(&message).await?;
        }
        let path = store_message(&self.dir, &message).await?;
        info!(
            "sent \"{}\" to {} ({})",
            message.subject,
            message.to.join(", "),
            path.display()
        );
        Ok(())
    }
}

/// Writes `message` into the mail directory and returns the file's path.
pub async fn store_message(dir: &Path, message: &Message) -> std::io::Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let sequence = SEQUENCE.fetch_add(1, Ordering::Relaxed);
    let first = message.to.first().map(String::as_str).unwrap_or("unknown");
    let filename = format!(
        "{}-{:06}-{}.{}",
        Utc::now().format("%Y%m%d%H%M%S%6f"),
        sequence,
        first.replace('@', "_at_").replace(['/', '\\'], "_"),
        EXTENSION
    );
    let path = dir.join(filename);

    let mut file = tokio::fs::File::create(&path).await?;
    file.write_all(render_message(message).as_bytes()).await?;
    file.flush().await?;
    Ok(path)
}

pub fn render_message(message: &Message) -> String {
    let mut raw = String::new();
    raw.push_str(&format!("From: {}\r\n", message.from));
    raw.push_str(&format!("To: {}\r\n", message.to.join(", ")));
    raw.push_str(&format!("Subject: {}\r\n", encode_header_text(&message.subject)));
    raw.push_str(&format!("Date: {}\r\n", message.created_at.to_rfc2822()));
    if let Some(token) = &message.event_tag {
        // continuation lines of a folded header start with whitespace
        raw.push_str(&format!("{}: {}\r\n", HEADER_NAME, token.replace("\r\n", "\r\n ")));
    }
    raw.push_str("MIME-Version: 1.0\r\n");
    raw.push_str("Content-Type: text/plain; charset=utf-8\r\n");
    raw.push_str("Content-Transfer-Encoding: 8bit\r\n");
    raw.push_str("\r\n");
    raw.push_str(&message.body.replace("\r\n", "\n").replace('\n', "\r\n"));
    raw
}

fn encode_header_text(text: &str) -> String {
    if text.is_ascii() {
        text.to_string()
    } else {
        format!("=?utf-8?b?{}?=", general_purpose::STANDARD.encode(text.as_bytes()))
    }
}

/// Parses a stored message. `fallback_date` is used when the message has no
/// readable `Date` header.
pub fn parse_message(
    raw: &[u8],
    fallback_date: DateTime<Utc>,
) -> Result<Message, mailparse::MailParseError> {
    let parsed = parse_mail(raw)?;
    let headers = &parsed.headers;

    let from = headers.get_first_value("From").unwrap_or_default();
    let to = headers
        .get_first_value("To")
        .map(|value| split_addresses(&value))
        .unwrap_or_default();
    let subject = headers.get_first_value("Subject").unwrap_or_default();
    let created_at = headers
        .get_first_value("Date")
        .and_then(|date| mailparse::dateparse(&date).ok())
        .and_then(|timestamp| DateTime::from_timestamp(timestamp, 0))
        .unwrap_or(fallback_date);
    let event_tag = headers.get_first_value(HEADER_NAME);
    let body = plain_text_body(&parsed)?;

    Ok(Message {
        from: from.trim().to_string(),
        to,
        subject: subject.trim().to_string(),
        body,
        created_at,
        event_tag,
    })
}

// Prefer a text/plain part, then text/html with the tags stripped, then the
// top-level body.
fn plain_text_body(parsed: &ParsedMail) -> Result<String, mailparse::MailParseError> {
    if let Some(plain) = parsed
        .subparts
        .iter()
        .find(|part| part.ctype.mimetype == "text/plain")
    {
        return Ok(plain.get_body()?.trim_end().to_string());
    }
    if let Some(html) = parsed
        .subparts
        .iter()
        .find(|part| part.ctype.mimetype == "text/html")
    {
        return Ok(strip_tags(&html.get_body()?).trim().to_string());
    }
    Ok(parsed.get_body()?.trim_end().to_string())
}

fn strip_tags(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => text.push(c),
            _ => {}
        }
    }
    text
}

fn split_addresses(value: &str) -> Vec<String> {
    match mailparse::addrparse(value) {
        Ok(list) => list
            .iter()
            .flat_map(|addr| match addr {
                MailAddr::Single(single) => vec![single.addr.clone()],
                MailAddr::Group(group) => group.addrs.iter().map(|a| a.addr.clone()).collect(),
            })
            .collect(),
        Err(_) => value
            .split(',')
            .map(|part| part.trim().trim_matches(|c| c == '<' || c == '>').to_string())
            .filter(|part| !part.is_empty())
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{encode, EventKind, EventTag};
    use chrono::TimeZone;

    fn sample() -> Message {
        Message::new(
            "h@test.com",
            &["h@test.com", "f@test.com"],
            "New post from José",
            "line one\nline two",
        )
        .at(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap())
        .with_event_tag(&encode(&EventTag::keyed(
            EventKind::NewPostNotification,
            &"k".repeat(90),
        )))
    }

    #[test]
    fn rendered_messages_parse_back() {
        let message = sample();
        let raw = render_message(&message);
        let parsed = parse_message(raw.as_bytes(), Utc::now()).unwrap();

        assert_eq!(parsed.from, message.from);
        assert_eq!(parsed.to, message.to);
        assert_eq!(parsed.subject, message.subject);
        assert_eq!(parsed.created_at, message.created_at);
        assert_eq!(parsed.body.replace("\r\n", "\n"), message.body);
        assert_eq!(parsed.tag(), message.tag());
    }

    #[test]
    fn plain_server_files_are_readable() {
        // what a bare SMTP DATA dump looks like
        let raw = "From: <x@test.com>\r\nTo: <h@test.com>\r\nSubject: $\r\n\r\n$ help\r\n";
        let fallback = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let parsed = parse_message(raw.as_bytes(), fallback).unwrap();
        assert_eq!(parsed.from, "<x@test.com>");
        assert_eq!(parsed.to, vec!["h@test.com"]);
        assert_eq!(parsed.body, "$ help");
        assert_eq!(parsed.created_at, fallback);
        assert_eq!(parsed.event_tag, None);
    }

    #[test]
    fn multipart_messages_prefer_plain_text() {
        let raw = concat!(
            "From: x@test.com\r\n",
            "To: h@test.com\r\n",
            "Subject: $\r\n",
            "Content-Type: multipart/alternative; boundary=\"b\"\r\n",
            "\r\n",
            "--b\r\n",
            "Content-Type: text/html\r\n\r\n",
            "<p>$ adduser</p>\r\n",
            "--b\r\n",
            "Content-Type: text/plain\r\n\r\n",
            "$ help\r\n",
            "--b--\r\n"
        );
        let parsed = parse_message(raw.as_bytes(), Utc::now()).unwrap();
        assert_eq!(parsed.body.trim(), "$ help");
    }

    #[tokio::test]
    async fn receiver_returns_new_files_once_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut receiver = MailDirReceiver::open(dir.path()).await.unwrap();
        assert!(receiver.fetch().await.unwrap().is_empty());

        std::fs::write(
            dir.path().join("2-b.eml"),
            "From: b@test.com\r\nTo: h@test.com\r\nSubject: $\r\n\r\nsecond",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("1-a.eml"),
            "From: a@test.com\r\nTo: h@test.com\r\nSubject: $\r\n\r\nfirst",
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not mail").unwrap();

        let fetched = receiver.fetch().await.unwrap();
        let bodies: Vec<&str> = fetched.iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, vec!["first", "second"]);
        assert!(receiver.fetch().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn sent_drafts_are_filed_for_the_next_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let mut receiver = MailDirReceiver::open(dir.path()).await.unwrap();
        let mut sender = MailDirSender::new(dir.path());

        let draft = Draft::new(Utc::now())
            .from_addr("h@test.com")
            .to_addr("h@test.com")
            .subject("Welcome")
            .body("hello")
            .tagged(EventTag::new(EventKind::Welcome));
        sender.send(&draft).await.unwrap();

        let fetched = receiver.fetch().await.unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].tag(), Some(EventTag::new(EventKind::Welcome)));
        assert_eq!(fetched[0].body, "hello");
    }
}
