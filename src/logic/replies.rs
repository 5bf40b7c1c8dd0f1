//! Bodies of the messages the daemon writes.

use crate::commands::{post_reference, COMMENT_PREFIX, LIKE_PREFIX, POST_SUBJECT};
use crate::entities::{Account, Message};
use crate::templates::signature;

pub const WELCOME_SUBJECT: &str = "Welcome to mailsocial";

pub fn help(host: &str) -> String {
    let commands = [
        ("$ help", "show this message"),
        ("$ adduser <name>", "create your account"),
        ("$ follow", "follow this mailbox"),
        ("$ unfollow", "stop following this mailbox"),
        (
            "$ invite --addfollower <address>",
            "add a follower (owner only)",
        ),
    ];

    let mut body = String::from("Available commands:\n\n");
    for (command, what) in commands {
        body.push_str(&format!(
            "  {:<34} {}\n    {}\n",
            command,
            what,
            mailto(host, POST_SUBJECT, command)
        ));
    }
    body.push_str(&format!(
        "\nAnything else sent by the owner to {} with the subject \"{}\" is published as a post.\n\n",
        host, POST_SUBJECT
    ));
    body.push_str(&signature());
    body
}

pub fn account_created(account: &Account) -> String {
    format!(
        "Account created.\n\n  name:    {}\n  address: {}\n\n{}",
        account.name,
        account.address,
        signature()
    )
}

pub fn invited(host_name: &str, host: &str, follower: &str) -> String {
    format!(
        "{} now follows {} <{}>.\nNew posts will be delivered to {}.\n\nTo stop, write \"$ unfollow\":\n  {}\n\n{}",
        follower,
        host_name,
        host,
        follower,
        mailto(host, POST_SUBJECT, "$ unfollow"),
        signature()
    )
}

pub fn permission_denied(command: &str) -> String {
    format!(
        "permission denied: only the owner of this mailbox may use \"{}\".\n\n{}",
        command,
        signature()
    )
}

pub fn followed(host_name: &str, host: &str) -> String {
    format!(
        "You now follow {} <{}>.\n\n{}",
        host_name,
        host,
        signature()
    )
}

pub fn new_follower(follower: &str) -> String {
    format!("{} started following you.\n\n{}", follower, signature())
}

pub fn unfollowed(follower: &str, host: &str) -> String {
    format!(
        "{} no longer follows {}.\n\n{}",
        follower,
        host,
        signature()
    )
}

pub fn post_notification(host_name: &str, host: &str, post: &str) -> String {
    let reference = post_reference(post);
    format!(
        "{} wrote:\n\n{}\n\nlike:    {}\ncomment: {}\n\n{}",
        host_name,
        quote(post),
        mailto(host, &format!("{}{}", LIKE_PREFIX, reference), ""),
        mailto(host, &format!("{}{}", COMMENT_PREFIX, reference), ""),
        signature()
    )
}

pub fn post_subject(host_name: &str) -> String {
    format!("New post from {}", host_name)
}

pub fn reaction_notification(verb: &str, reaction: &Message, post: &str) -> String {
    let mut body = format!("{} {} your post:\n\n{}\n", reaction.from, verb, quote(post));
    let said = reaction.body.trim();
    if !said.is_empty() {
        body.push_str(&format!("\nThey wrote:\n\n{}\n", quote(said)));
    }
    body.push('\n');
    body.push_str(&signature());
    body
}

pub(crate) fn quote(text: &str) -> String {
    text.trim()
        .lines()
        .map(|line| format!("> {}", line))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn mailto(to: &str, subject: &str, body: &str) -> String {
    let mut link = format!("mailto:{}?subject={}", to, percent_encode(subject));
    if !body.is_empty() {
        link.push_str("&body=");
        link.push_str(&percent_encode(body));
    }
    link
}

fn percent_encode(text: &str) -> String {
    text.bytes()
        .map(|b| match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b':' | b'@' => {
                (b as char).to_string()
            }
            _ => format!("%{:02X}", b),
        })
        .collect()
}
