//! Event tags and their header-safe encoding.
//!
//! A tag is serialized as compact JSON and then escaped so it can travel as
//! a single `X-Social-Event` header value: bytes outside `!`..`~` and the
//! escape character itself become `=XX`, and output is soft-broken with
//! `=\r\n` so no line exceeds 76 characters.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const HEADER_NAME: &str = "X-Social-Event";

const ESCAPE: u8 = b'=';
const MAX_LINE: usize = 76;
const SOFT_BREAK: &str = "=\r\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    Welcome,
    Help,
    NewPostNotification,
    NewLikeNotification,
    NewCommentNotification,
    NewFollowerNotification,
    Invite,
    AdduserResponse,
    FollowResponse,
    UnfollowResponse,
}

impl EventKind {
    pub const ALL: [EventKind; 10] = [
        EventKind::Welcome,
        EventKind::Help,
        EventKind::NewPostNotification,
        EventKind::NewLikeNotification,
        EventKind::NewCommentNotification,
        EventKind::NewFollowerNotification,
        EventKind::Invite,
        EventKind::AdduserResponse,
        EventKind::FollowResponse,
        EventKind::UnfollowResponse,
    ];
}

/// What produced a sent message, and for which triggering condition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventTag {
    pub kind: EventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

impl EventTag {
    pub fn new(kind: EventKind) -> Self {
        EventTag { kind, key: None }
    }

    pub fn keyed(kind: EventKind, key: &str) -> Self {
        EventTag {
            kind,
            key: Some(key.to_string()),
        }
    }
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid escape sequence at offset {0}")]
    InvalidEscape(usize),
    #[error("escape sequence truncated at end of input")]
    Truncated,
    #[error("payload is not utf-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("payload is not an event tag: {0}")]
    Payload(#[from] serde_json::Error),
}

pub fn encode(tag: &EventTag) -> String {
    let payload = serde_json::json!(tag).to_string();
    escape(payload.as_bytes())
}

pub fn decode(token: &str) -> Result<EventTag, DecodeError> {
    let joined = remove_soft_breaks(token);
    let bytes = unescape(&joined)?;
    let payload = String::from_utf8(bytes)?;
    Ok(serde_json::from_str(&payload)?)
}

/// Tolerant form of [`decode`]: anything unreadable is simply not a tag.
pub fn recognize(token: &str) -> Option<EventTag> {
    decode(token).ok()
}

/// Joins a token onto one line, for transports that fold headers themselves.
pub fn single_line(token: &str) -> String {
    remove_soft_breaks(token)
}

fn escape(payload: &[u8]) -> String {
    let mut out = String::with_capacity(payload.len() * 2);
    let mut line_len = 0;
    for &byte in payload {
        let piece = if byte == ESCAPE || !(b'!'..=b'~').contains(&byte) {
            format!("={:02X}", byte)
        } else {
            (byte as char).to_string()
        };
        // leave room for the trailing escape of the soft break
        if line_len + piece.len() > MAX_LINE - 1 {
            out.push_str(SOFT_BREAK);
            line_len = 0;
        }
        out.push_str(&piece);
        line_len += piece.len();
    }
    out
}

// A soft break is the escape character followed by whitespace. Header
// unfolding may have turned `=\r\n` into `=\r\n `, `= ` or a bare `=` at the
// end, so any run of whitespace counts.
fn remove_soft_breaks(token: &str) -> String {
    let bytes = token.trim().as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == ESCAPE {
            let run = bytes[i + 1..]
                .iter()
                .take_while(|b| b.is_ascii_whitespace())
                .count();
            if run > 0 {
                i += 1 + run;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn unescape(joined: &str) -> Result<Vec<u8>, DecodeError> {
    let bytes = joined.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let byte = bytes[i];
        if byte != ESCAPE {
            if !byte.is_ascii_whitespace() {
                out.push(byte);
            }
            i += 1;
            continue;
        }
        let hex = bytes.get(i + 1..i + 3).ok_or(DecodeError::Truncated)?;
        if !hex.iter().all(u8::is_ascii_hexdigit) {
            return Err(DecodeError::InvalidEscape(i));
        }
        out.push(hex_value(hex[0]) << 4 | hex_value(hex[1]));
        i += 3;
    }
    Ok(out)
}

fn hex_value(digit: u8) -> u8 {
    match digit {
        b'0'..=b'9' => digit - b'0',
        b'a'..=b'f' => digit - b'a' + 10,
        _ => digit - b'A' + 10,
    }
}
