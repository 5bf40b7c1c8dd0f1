//! The replay engine.
//!
//! A [`Processor`] is built from the host address and the whole message
//! log. Construction replays every message in log order, rebuilds accounts
//! and the follow graph, and queues one draft for every event that no
//! earlier sent message acknowledges. There is no cursor: whether a reply
//! already went out is read from the event tags of sent messages in the
//! log, so replaying the same log always yields the same result.

pub mod replies;

use std::collections::{HashMap, HashSet, VecDeque};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};

use crate::commands::{self, classify, normalize_address, Classified, Command};
use crate::entities::{Draft, Message};
use crate::metadata::{EventKind, EventTag};
use crate::social::{derive_username, SocialSnapshot};
use crate::templates::WelcomeTemplate;

/// Drafts produced by one replay pass, in the order they were produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Outbox {
    drafts: VecDeque<Draft>,
}

impl Outbox {
    fn push(&mut self, draft: Draft) {
        self.drafts.push_back(draft);
    }

    pub fn front(&self) -> Option<&Draft> {
        self.drafts.front()
    }

    pub fn front_mut(&mut self) -> Option<&mut Draft> {
        self.drafts.front_mut()
    }

    /// Removes the oldest draft, normally right after it was sent.
    pub fn pop_front(&mut self) -> Option<Draft> {
        self.drafts.pop_front()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Draft> {
        self.drafts.iter()
    }

    pub fn len(&self) -> usize {
        self.drafts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drafts.is_empty()
    }
}

/// A message already sent under some tag, kept for content comparison.
struct Acknowledged {
    tag: EventTag,
    body: String,
}

pub struct Processor {
    host: String,
    now: DateTime<Utc>,
    outbox: Outbox,
    snapshot: SocialSnapshot,
    acknowledged: Vec<Acknowledged>,
    acknowledged_tags: HashSet<EventTag>,
    occurrences: HashMap<(String, &'static str), usize>,
}

impl Processor {
    /// Replays `log`. Every draft is stamped with the time of the message
    /// that triggered it, so the result depends on nothing but the log.
    pub fn new(host: &str, log: &[Message], welcome: Option<&WelcomeTemplate>) -> Self {
        let mut processor = Processor {
            host: normalize_address(host),
            now: log.last().map(|message| message.created_at).unwrap_or_default(),
            outbox: Outbox::default(),
            snapshot: SocialSnapshot::default(),
            acknowledged: Vec::new(),
            acknowledged_tags: HashSet::new(),
            occurrences: HashMap::new(),
        };

        let tags: Vec<Option<EventTag>> = log.iter().map(Message::tag).collect();
        for (message, tag) in log.iter().zip(&tags) {
            if let Some(tag) = tag {
                processor.acknowledge(tag.clone(), &message.body);
            }
        }

        processor.welcome(welcome);

        let classified: Vec<Classified> = log
            .iter()
            .zip(&tags)
            .map(|(message, tag)| match tag {
                Some(_) => Classified::Unrecognized,
                None => classify(message, &processor.host),
            })
            .collect();
        let posts: Vec<&Message> = log
            .iter()
            .zip(&classified)
            .filter(|(_, class)| **class == Classified::Post)
            .map(|(message, _)| message)
            .collect();

        for (message, class) in log.iter().zip(classified.iter()) {
            processor.now = message.created_at;
            processor.dispatch(message, class, &posts);
        }

        debug!(
            "replayed {} messages: {} drafts, {} accounts",
            log.len(),
            processor.outbox.len(),
            processor.snapshot.accounts.len()
        );
        processor
    }

    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    pub fn outbox_mut(&mut self) -> &mut Outbox {
        &mut self.outbox
    }

    pub fn snapshot(&self) -> &SocialSnapshot {
        &self.snapshot
    }

    pub fn into_parts(self) -> (Outbox, SocialSnapshot) {
        (self.outbox, self.snapshot)
    }

    fn dispatch(&mut self, message: &Message, class: &Classified, posts: &[&Message]) {
        match class {
            Classified::Command(Command::Help) => self.help(message),
            Classified::Command(Command::AddUser { name }) => self.add_user(message, name.as_deref()),
            Classified::Command(Command::Invite { follower }) => {
                self.invite(message, follower.as_deref())
            }
            Classified::Command(Command::Follow) => self.follow(message),
            Classified::Command(Command::Unfollow { target }) => {
                self.unfollow(message, target.as_deref())
            }
            Classified::Command(Command::Unknown(verb)) => {
                debug!("ignoring unknown command {:?} from {}", verb, message.from)
            }
            Classified::Post => self.post(message),
            Classified::Like { reference } => {
                self.reaction(message, reference, posts, EventKind::NewLikeNotification)
            }
            Classified::Comment { reference } => {
                self.reaction(message, reference, posts, EventKind::NewCommentNotification)
            }
            Classified::Unrecognized => {}
        }
    }

    fn welcome(&mut self, template: Option<&WelcomeTemplate>) {
        let tag = EventTag::new(EventKind::Welcome);
        if self.is_acknowledged(&tag) {
            return;
        }
        let template = match template {
            Some(template) => template,
            None => {
                debug!("no welcome template configured");
                return;
            }
        };
        match template.render(&self.host) {
            Ok(body) => {
                let draft = self
                    .reply_to(&self.host)
                    .subject(replies::WELCOME_SUBJECT)
                    .body(&body)
                    .tagged(tag);
                self.emit(draft);
            }
            Err(e) => warn!(
                "welcome template {} unavailable, skipping welcome: {}",
                template.path().display(),
                e
            ),
        }
    }

    fn help(&mut self, message: &Message) {
        let sender = normalize_address(&message.from);
        let tag = EventTag::keyed(EventKind::Help, &sender);
        if self.is_acknowledged(&tag) {
            return;
        }
        let draft = self
            .reply_to(&sender)
            .subject("mailsocial help")
            .body(&replies::help(&self.host))
            .tagged(tag);
        self.emit(draft);
    }

    fn add_user(&mut self, message: &Message, name: Option<&str>) {
        let sender = normalize_address(&message.from);
        let name = match name {
            Some(name) => name.to_string(),
            None => derive_username(&sender),
        };
        let (account, created) = self.snapshot.accounts.add(&sender, &name);
        let account = account.clone();
        if created {
            info!("account {} <{}> created", account.name, account.address);
        }

        if sender != self.host {
            debug!("adduser from {} recorded without confirmation", sender);
            return;
        }
        let tag = EventTag::keyed(EventKind::AdduserResponse, &sender);
        if self.is_acknowledged(&tag) {
            return;
        }
        let draft = self
            .reply_to(&sender)
            .subject("Account created")
            .body(&replies::account_created(&account))
            .tagged(tag);
        self.emit(draft);
    }

    fn invite(&mut self, message: &Message, follower: Option<&str>) {
        let sender = normalize_address(&message.from);
        if sender != self.host {
            let tag = EventTag::keyed(EventKind::Invite, &format!("denied:{}", sender));
            if !self.is_acknowledged(&tag) {
                let draft = self
                    .reply_to(&sender)
                    .subject("Invitation refused")
                    .body(&replies::permission_denied("$ invite"))
                    .tagged(tag);
                self.emit(draft);
            }
            return;
        }

        let follower = match follower {
            Some(follower) if !follower.is_empty() => follower.to_string(),
            _ => {
                warn!("invite from {} names no follower, skipping", sender);
                return;
            }
        };
        if let Err(e) = self.snapshot.graph.follow(&follower, &self.host) {
            warn!("invite skipped: {}", e);
            return;
        }

        let tag = EventTag::keyed(EventKind::Invite, &follower);
        if self.is_acknowledged(&tag) {
            return;
        }
        let host_name = self.host_name();
        let draft = self
            .reply_to(&self.host)
            .to_addr(&follower)
            .subject(&format!("{} invited you to follow them", host_name))
            .body(&replies::invited(&host_name, &self.host, &follower))
            .tagged(tag);
        self.emit(draft);
    }

    fn follow(&mut self, message: &Message) {
        let sender = normalize_address(&message.from);
        let nth = self.occurrence(&sender, "follow");
        let added = match self.snapshot.graph.follow(&sender, &self.host) {
            Ok(added) => added,
            Err(e) => {
                warn!("follow skipped: {}", e);
                return;
            }
        };

        let key = format!("{}#{}", sender, nth);
        let host_name = self.host_name();
        let response = EventTag::keyed(EventKind::FollowResponse, &key);
        if !self.is_acknowledged(&response) {
            let draft = self
                .reply_to(&sender)
                .subject(&format!("You now follow {}", host_name))
                .body(&replies::followed(&host_name, &self.host))
                .tagged(response);
            self.emit(draft);
        }
        if !added {
            debug!("{} already follows {}", sender, self.host);
            return;
        }
        let notification = EventTag::keyed(EventKind::NewFollowerNotification, &key);
        if !self.is_acknowledged(&notification) {
            let draft = self
                .reply_to(&self.host)
                .subject("New follower")
                .body(&replies::new_follower(&sender))
                .tagged(notification);
            self.emit(draft);
        }
    }

    fn unfollow(&mut self, message: &Message, target: Option<&str>) {
        let sender = normalize_address(&message.from);
        let nth = self.occurrence(&sender, "unfollow");
        let follower = if sender == self.host {
            match target {
                Some(target) if !target.is_empty() => target.to_string(),
                _ => {
                    warn!("unfollow from host names no follower, skipping");
                    return;
                }
            }
        } else {
            sender.clone()
        };

        if !self.snapshot.graph.unfollow(&follower, &self.host) {
            debug!("{} was not following {}", follower, self.host);
        }

        let key = format!("{}:{}#{}", sender, follower, nth);
        let tag = EventTag::keyed(EventKind::UnfollowResponse, &key);
        if self.is_acknowledged(&tag) {
            return;
        }
        let draft = self
            .reply_to(&sender)
            .subject("Unfollowed")
            .body(&replies::unfollowed(&follower, &self.host))
            .tagged(tag);
        self.emit(draft);
    }

    fn post(&mut self, message: &Message) {
        let post = message.body.trim().to_string();
        let reference = commands::post_reference(&post);
        let host_name = self.host_name();

        let mut recipients = vec![self.host.clone()];
        recipients.extend(
            self.snapshot
                .graph
                .followers_of(&self.host)
                .map(str::to_string),
        );

        for recipient in recipients {
            let tag = EventTag::keyed(
                EventKind::NewPostNotification,
                &format!("{}:{}", reference, recipient),
            );
            if self.is_post_announced(&tag, &post) {
                continue;
            }
            let draft = self
                .reply_to(&recipient)
                .subject(&replies::post_subject(&host_name))
                .body(&replies::post_notification(&host_name, &self.host, &post))
                .tagged(tag);
            self.emit(draft);
        }
    }

    fn reaction(&mut self, message: &Message, reference: &str, posts: &[&Message], kind: EventKind) {
        let tag = EventTag::new(kind);
        if self.is_acknowledged(&tag) {
            return;
        }
        let post = match original_post(reference, posts) {
            Some(post) => post.body.trim().to_string(),
            None => {
                warn!("reaction from {} refers to no known post", message.from);
                return;
            }
        };
        let (verb, subject) = match kind {
            EventKind::NewCommentNotification => ("commented on", "New comment"),
            _ => ("liked", "New like"),
        };
        let draft = self
            .reply_to(&self.host)
            .subject(subject)
            .body(&replies::reaction_notification(verb, message, &post))
            .tagged(tag);
        self.emit(draft);
    }

    fn reply_to(&self, recipient: &str) -> Draft {
        Draft::new(self.now).from_addr(&self.host).to_addr(recipient)
    }

    fn host_name(&self) -> String {
        match self.snapshot.accounts.get(&self.host) {
            Some(account) => account.name.clone(),
            None => derive_username(&self.host),
        }
    }

    fn occurrence(&mut self, sender: &str, verb: &'static str) -> usize {
        let count = self
            .occurrences
            .entry((sender.to_string(), verb))
            .or_insert(0);
        *count += 1;
        *count
    }

    fn acknowledge(&mut self, tag: EventTag, body: &str) {
        self.acknowledged_tags.insert(tag.clone());
        self.acknowledged.push(Acknowledged {
            tag,
            body: body.replace("\r\n", "\n"),
        });
    }

    fn is_acknowledged(&self, tag: &EventTag) -> bool {
        self.acknowledged_tags.contains(tag)
    }

    // Two posts can share a reference prefix, so the quoted text decides.
    // The quote always sits between blank lines in a notification.
    fn is_post_announced(&self, tag: &EventTag, post: &str) -> bool {
        if !self.is_acknowledged(tag) {
            return false;
        }
        let quoted = format!("\n\n{}\n\n", replies::quote(post).replace("\r\n", "\n"));
        self.acknowledged
            .iter()
            .any(|sent| &sent.tag == tag && sent.body.contains(&quoted))
    }

    fn emit(&mut self, draft: Draft) {
        if let Some(tag) = draft.tag.clone() {
            self.acknowledge(tag, &draft.body);
        }
        self.outbox.push(draft);
    }
}

/// The most recent post starting with the referenced text, falling back to
/// the most recent post overall.
fn original_post<'a>(reference: &str, posts: &[&'a Message]) -> Option<&'a Message> {
    let latest = |candidates: Vec<&'a Message>| {
        candidates
            .into_iter()
            .enumerate()
            .max_by_key(|(position, post)| (post.created_at, *position))
            .map(|(_, post)| post)
    };
    let prefix = commands::decode_reference(reference).unwrap_or_default();
    let matching: Vec<&Message> = posts
        .iter()
        .copied()
        .filter(|post| !prefix.is_empty() && post.body.trim().starts_with(prefix.as_str()))
        .collect();
    latest(matching).or_else(|| latest(posts.to_vec()))
}

/// Accounts and follow graph as of the end of `log`, without any replies.
pub fn derive_state(host: &str, log: &[Message]) -> SocialSnapshot {
    let (_, snapshot) = Processor::new(host, log, None).into_parts();
    snapshot
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const HOST: &str = "h@test.com";

    fn clock() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn cmd(from: &str, body: &str) -> Message {
        Message::new(from, &[HOST], "$", body).at(clock())
    }

    fn replay(log: &[Message]) -> Processor {
        Processor::new(HOST, log, None)
    }

    /// Appends every queued draft to the log, the way a loopback sender would.
    fn deliver(log: &mut Vec<Message>, processor: &Processor) {
        for draft in processor.outbox().iter() {
            log.push(draft.to_message(clock()).unwrap());
        }
    }

    fn kinds(outbox: &Outbox) -> Vec<EventKind> {
        outbox.iter().filter_map(|d| d.tag.as_ref().map(|t| t.kind)).collect()
    }

    #[test]
    fn welcome_needs_a_template_and_is_sent_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("welcome.txt");
        std::fs::write(&path, "hello {{host}}").unwrap();
        let template = WelcomeTemplate::new(&path);

        let first = Processor::new(HOST, &[], Some(&template));
        assert_eq!(kinds(first.outbox()), vec![EventKind::Welcome]);
        let draft = first.outbox().front().unwrap();
        assert_eq!(draft.to, vec![HOST]);
        assert_eq!(draft.body, "hello h@test.com");

        let mut log = Vec::new();
        deliver(&mut log, &first);
        let second = Processor::new(HOST, &log, Some(&template));
        assert!(second.outbox().is_empty());
    }

    #[test]
    fn missing_welcome_template_is_skipped() {
        let template = WelcomeTemplate::new("/nonexistent/welcome.txt");
        let processor = Processor::new(HOST, &[cmd(HOST, "$ help")], Some(&template));
        assert_eq!(kinds(processor.outbox()), vec![EventKind::Help]);
    }

    #[test]
    fn adduser_from_host_is_confirmed_once() {
        let mut log = vec![cmd(HOST, "$ adduser"), cmd(HOST, "$ adduser Other Name")];
        let first = replay(&log);
        assert_eq!(kinds(first.outbox()), vec![EventKind::AdduserResponse]);
        assert_eq!(first.snapshot().accounts.get(HOST).unwrap().name, "H M.");

        deliver(&mut log, &first);
        log.push(cmd(HOST, "$ adduser"));
        let second = replay(&log);
        assert!(second.outbox().is_empty());
        assert_eq!(second.snapshot().accounts.len(), 1);
    }

    #[test]
    fn adduser_from_others_creates_silently() {
        let processor = replay(&[cmd("Ada <ada@test.com>", "$ adduser Ada")]);
        assert!(processor.outbox().is_empty());
        assert_eq!(
            processor.snapshot().accounts.get("ada@test.com").unwrap().name,
            "Ada"
        );
    }

    #[test]
    fn invite_updates_graph_even_when_already_answered() {
        let mut log = vec![cmd(HOST, "$ invite --addfollower f@test.com")];
        let first = replay(&log);
        assert_eq!(kinds(first.outbox()), vec![EventKind::Invite]);
        assert_eq!(first.outbox().front().unwrap().to, vec![HOST, "f@test.com"]);

        deliver(&mut log, &first);
        log.push(cmd(HOST, "$ invite --addfollower f@test.com"));
        let second = replay(&log);
        assert!(second.outbox().is_empty());
        assert_eq!(
            second.snapshot().graph.followers_of(HOST).collect::<Vec<_>>(),
            vec!["f@test.com"]
        );
    }

    #[test]
    fn malformed_and_unauthorized_invites() {
        let processor = replay(&[
            cmd(HOST, "$ invite --addfollower"),
            cmd(HOST, "$ invite h@test.com"),
            cmd("x@test.com", "$ invite --addfollower y@test.com"),
            cmd("x@test.com", "$ invite --addfollower z@test.com"),
        ]);
        assert_eq!(kinds(processor.outbox()), vec![EventKind::Invite]);
        let refusal = processor.outbox().front().unwrap();
        assert_eq!(refusal.to, vec!["x@test.com"]);
        assert!(refusal.body.starts_with("permission denied"));
        assert_eq!(processor.snapshot().graph, Default::default());
    }

    #[test]
    fn posts_fan_out_to_host_and_followers() {
        let mut log = vec![
            cmd(HOST, "$ invite --addfollower a@test.com"),
            cmd(HOST, "$ invite --addfollower b@test.com"),
            cmd(HOST, "$ invite --addfollower c@test.com"),
            cmd(HOST, "first post"),
        ];
        let first = replay(&log);
        let notifications: Vec<&Draft> = first
            .outbox()
            .iter()
            .filter(|d| d.tag.as_ref().unwrap().kind == EventKind::NewPostNotification)
            .collect();
        assert_eq!(notifications.len(), 4);
        let mut recipients: Vec<&str> = notifications.iter().map(|d| d.to[0].as_str()).collect();
        recipients.sort();
        assert_eq!(recipients, vec!["a@test.com", "b@test.com", "c@test.com", HOST]);
        assert!(notifications.iter().all(|d| d.body.contains("> first post")));

        deliver(&mut log, &first);
        assert!(replay(&log).outbox().is_empty());
    }

    #[test]
    fn posts_sharing_a_prefix_are_announced_separately() {
        let shared = "x".repeat(40);
        let log = vec![
            cmd(HOST, &format!("{} one", shared)),
            cmd(HOST, &format!("{} two", shared)),
            cmd(HOST, &format!("{} one", shared)),
        ];
        let mut delivered = Vec::new();
        let first = replay(&log);
        assert_eq!(kinds(first.outbox()).len(), 2);

        delivered.extend(log.iter().cloned());
        deliver(&mut delivered, &first);
        assert!(replay(&delivered).outbox().is_empty());
    }

    #[test]
    fn later_followers_miss_earlier_posts() {
        let processor = replay(&[
            cmd(HOST, "old news"),
            cmd(HOST, "$ invite --addfollower f@test.com"),
        ]);
        let post_recipients: Vec<&str> = processor
            .outbox()
            .iter()
            .filter(|d| d.tag.as_ref().unwrap().kind == EventKind::NewPostNotification)
            .map(|d| d.to[0].as_str())
            .collect();
        assert_eq!(post_recipients, vec![HOST]);
    }

    #[test]
    fn likes_and_comments_notify_the_host_once() {
        let reference = commands::post_reference("hello");
        let like = |from: &str| {
            Message::new(from, &[HOST], &format!("like:{}", reference), "").at(clock())
        };
        let mut log = vec![
            cmd(HOST, "hello"),
            like("f@test.com"),
            like("g@test.com"),
            Message::new("f@test.com", &[HOST], &format!("comment:{}", reference), "nice one")
                .at(clock()),
        ];
        let first = replay(&log);
        assert_eq!(
            kinds(first.outbox()),
            vec![
                EventKind::NewPostNotification,
                EventKind::NewLikeNotification,
                EventKind::NewCommentNotification
            ]
        );
        let comment = first.outbox().iter().last().unwrap();
        assert_eq!(comment.to, vec![HOST]);
        assert!(comment.body.contains("> hello"));
        assert!(comment.body.contains("> nice one"));

        deliver(&mut log, &first);
        log.push(like("k@test.com"));
        assert!(replay(&log).outbox().is_empty());
    }

    #[test]
    fn reactions_without_posts_are_ignored() {
        let reference = commands::post_reference("ghost");
        let processor = replay(&[Message::new(
            "f@test.com",
            &[HOST],
            &format!("like:{}", reference),
            "",
        )]);
        assert!(processor.outbox().is_empty());
    }

    #[test]
    fn reactions_find_the_referenced_post() {
        let older = Message::new(HOST, &[HOST], "$", "about cats").at(clock());
        let newer = Message::new(HOST, &[HOST], "$", "about dogs")
            .at(clock() + chrono::Duration::minutes(5));
        let posts = vec![&older, &newer];

        let cats = commands::post_reference("about cats");
        assert_eq!(original_post(&cats, &posts).unwrap().body, "about cats");
        let unknown = commands::post_reference("about birds");
        assert_eq!(original_post(&unknown, &posts).unwrap().body, "about dogs");
    }

    #[test]
    fn follow_and_unfollow_round_trip() {
        let mut log = vec![cmd("f@test.com", "$ follow"), cmd(HOST, "$ follow")];
        let first = replay(&log);
        assert_eq!(
            kinds(first.outbox()),
            vec![EventKind::FollowResponse, EventKind::NewFollowerNotification]
        );
        assert!(first.snapshot().graph.is_following("f@test.com", HOST));

        deliver(&mut log, &first);
        log.push(cmd("f@test.com", "$ unfollow"));
        let second = replay(&log);
        assert_eq!(kinds(second.outbox()), vec![EventKind::UnfollowResponse]);
        assert!(!second.snapshot().graph.is_following("f@test.com", HOST));

        deliver(&mut log, &second);
        log.push(cmd("f@test.com", "$ follow"));
        let third = replay(&log);
        assert_eq!(
            kinds(third.outbox()),
            vec![EventKind::FollowResponse, EventKind::NewFollowerNotification]
        );
    }

    #[test]
    fn repeated_follow_does_not_renotify_the_host() {
        let log = vec![cmd("f@test.com", "$ follow"), cmd("f@test.com", "$ follow")];
        let processor = replay(&log);
        assert_eq!(
            kinds(processor.outbox()),
            vec![
                EventKind::FollowResponse,
                EventKind::NewFollowerNotification,
                EventKind::FollowResponse
            ]
        );
    }

    #[test]
    fn host_unfollow_does_not_swallow_a_later_self_unfollow() {
        let mut log = vec![
            cmd(HOST, "$ invite --addfollower f@test.com"),
            cmd(HOST, "$ unfollow f@test.com"),
        ];
        let first = replay(&log);
        assert_eq!(
            kinds(first.outbox()),
            vec![EventKind::Invite, EventKind::UnfollowResponse]
        );
        assert!(!first.snapshot().graph.is_following("f@test.com", HOST));

        deliver(&mut log, &first);
        log.push(cmd("f@test.com", "$ follow"));
        log.push(cmd("f@test.com", "$ unfollow"));
        let second = replay(&log);
        assert_eq!(
            kinds(second.outbox()),
            vec![
                EventKind::FollowResponse,
                EventKind::NewFollowerNotification,
                EventKind::UnfollowResponse
            ]
        );
        let response = second.outbox().iter().last().unwrap();
        assert_eq!(response.to, vec!["f@test.com"]);
        assert!(!second.snapshot().graph.is_following("f@test.com", HOST));
    }

    #[test]
    fn own_output_is_never_replayed_as_input() {
        let reply = Draft::new(clock())
            .from_addr(HOST)
            .to_addr(HOST)
            .subject("$")
            .body("$ help")
            .tagged(EventTag::keyed(EventKind::Help, "someone@test.com"))
            .to_message(clock())
            .unwrap();
        assert!(replay(&[reply]).outbox().is_empty());
    }

    #[test]
    fn drafts_carry_the_time_of_their_trigger() {
        let later = clock() + chrono::Duration::minutes(3);
        let log = vec![
            cmd(HOST, "$ adduser"),
            Message::new("g@test.com", &[HOST], "$", "$ help").at(later),
        ];
        let processor = replay(&log);
        let stamps: Vec<DateTime<Utc>> = processor.outbox().iter().map(|d| d.created_at).collect();
        assert_eq!(stamps, vec![clock(), later]);
        assert!(processor.outbox().iter().all(|d| d.updated_at == d.created_at));
    }

    #[test]
    fn replay_is_deterministic() {
        let log = vec![
            cmd(HOST, "$ adduser"),
            cmd(HOST, "$ invite --addfollower f@test.com"),
            cmd("g@test.com", "$ follow"),
            cmd(HOST, "hello"),
            cmd("g@test.com", "$ help"),
        ];
        let a = replay(&log);
        std::thread::sleep(std::time::Duration::from_millis(5));
        let b = replay(&log);
        assert_eq!(a.outbox(), b.outbox());
        assert_eq!(a.snapshot(), b.snapshot());
        assert_eq!(derive_state(HOST, &log), *a.snapshot());
    }
}
