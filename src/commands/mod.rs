//! Turns a logged message into one of the few shapes the daemon reacts to.
//!
//! Everything here is plain text matching on subject and body. Nothing is
//! ever rejected loudly; a message that fits no shape is `Unrecognized`.

use base64::{engine::general_purpose, Engine as _};

use crate::entities::Message;

pub const SIGIL: char = '$';
/// Subject under which the host publishes posts.
pub const POST_SUBJECT: &str = "$";
pub const COMMAND_SUBJECTS: [&str; 3] = ["$", "cmd", "command"];
pub const LIKE_PREFIX: &str = "like:";
pub const COMMENT_PREFIX: &str = "comment:";

const REFERENCE_CHARS: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    AddUser { name: Option<String> },
    Invite { follower: Option<String> },
    Follow,
    Unfollow { target: Option<String> },
    Unknown(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classified {
    Command(Command),
    Like { reference: String },
    Comment { reference: String },
    Post,
    Unrecognized,
}

pub fn classify(message: &Message, host: &str) -> Classified {
    let subject = message.subject.trim();

    if let Some(reference) = strip_prefix_ignore_case(subject, LIKE_PREFIX) {
        return reaction(reference, |reference| Classified::Like { reference });
    }
    if let Some(reference) = strip_prefix_ignore_case(subject, COMMENT_PREFIX) {
        return reaction(reference, |reference| Classified::Comment { reference });
    }

    if !is_command_subject(subject) {
        return Classified::Unrecognized;
    }

    if let Some(line) = command_line(&message.body) {
        return Classified::Command(parse_command(line, &message.body));
    }

    if subject == POST_SUBJECT
        && normalize_address(&message.from) == normalize_address(host)
        && !message.body.trim().is_empty()
    {
        return Classified::Post;
    }

    Classified::Unrecognized
}

pub fn is_command_subject(subject: &str) -> bool {
    COMMAND_SUBJECTS
        .iter()
        .any(|marker| subject.eq_ignore_ascii_case(marker))
}

/// The first non-blank line of the body, if it starts with the sigil.
pub fn command_line(body: &str) -> Option<&str> {
    body.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .filter(|line| line.starts_with(SIGIL))
}

fn parse_command(line: &str, body: &str) -> Command {
    let mut words = line.trim_start_matches(SIGIL).split_whitespace();
    let verb = match words.next() {
        Some(verb) => verb.to_ascii_lowercase(),
        None => return Command::Unknown(String::new()),
    };
    let args: Vec<&str> = words.collect();

    match verb.as_str() {
        "help" => Command::Help,
        "adduser" => {
            let inline = args.join(" ");
            let name = if inline.is_empty() {
                name_from_body(body)
            } else {
                Some(inline)
            };
            Command::AddUser { name }
        }
        "invite" => Command::Invite {
            follower: flag_value(&args, "--addfollower")
                .or_else(|| args.iter().find(|arg| !arg.starts_with("--")).copied())
                .map(normalize_address),
        },
        "follow" => Command::Follow,
        "unfollow" => Command::Unfollow {
            target: args.first().map(|arg| normalize_address(arg)),
        },
        _ => Command::Unknown(verb),
    }
}

fn name_from_body(body: &str) -> Option<String> {
    body.lines()
        .map(str::trim)
        .skip_while(|line| !line.starts_with(SIGIL))
        .skip(1)
        .find(|line| !line.is_empty() && !line.starts_with(SIGIL))
        .map(str::to_string)
}

fn flag_value<'a>(args: &[&'a str], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|arg| arg.eq_ignore_ascii_case(flag))
        .and_then(|at| args.get(at + 1))
        .filter(|value| !value.starts_with("--"))
        .copied()
}

fn reaction(reference: &str, make: impl FnOnce(String) -> Classified) -> Classified {
    let reference = reference.trim();
    if reference.is_empty() || decode_reference(reference).is_none() {
        return Classified::Unrecognized;
    }
    make(reference.to_string())
}

fn strip_prefix_ignore_case<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let head = text.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix).then(|| &text[prefix.len()..])
}

pub fn normalize_address(address: &str) -> String {
    let address = address.trim();
    let address = match (address.rfind('<'), address.rfind('>')) {
        (Some(open), Some(close)) if open < close => &address[open + 1..close],
        _ => address,
    };
    address.trim().to_ascii_lowercase()
}

/// Opaque reference to a post: url-safe base64 of its first characters.
pub fn post_reference(post: &str) -> String {
    let prefix: String = post.trim().chars().take(REFERENCE_CHARS).collect();
    general_purpose::URL_SAFE_NO_PAD.encode(prefix.as_bytes())
}

pub fn decode_reference(reference: &str) -> Option<String> {
    let bytes = general_purpose::URL_SAFE_NO_PAD.decode(reference).ok()?;
    String::from_utf8(bytes).ok()
}
