//! The run cycle that drives the replay engine against a transport.

use std::time::Duration;

use chrono::Utc;
use log::{debug, error, info};
use thiserror::Error;

use crate::commands::normalize_address;
use crate::entities::Message;
use crate::logic::Processor;
use crate::social::{SocialSnapshot, SocialState};
use crate::templates::WelcomeTemplate;
use crate::transport::{Receiver, Sender, TransportError};

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("transport failed: {0}")]
    Transport(#[from] TransportError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonState {
    Idle,
    Running,
}

/// What one cycle did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub received: usize,
    pub sent: usize,
}

pub struct Daemon<R, S, K> {
    host: String,
    receiver: R,
    sender: S,
    social: K,
    welcome: Option<WelcomeTemplate>,
    log: Vec<Message>,
    snapshot: SocialSnapshot,
    state: DaemonState,
}

impl<R, S, K> Daemon<R, S, K>
where
    R: Receiver,
    S: Sender,
    K: SocialState,
{
    pub fn new(host: &str, receiver: R, sender: S, social: K) -> Self {
        Daemon {
            host: normalize_address(host),
            receiver,
            sender,
            social,
            welcome: None,
            log: Vec::new(),
            snapshot: SocialSnapshot::default(),
            state: DaemonState::Idle,
        }
    }

    pub fn with_welcome_template(mut self, template: WelcomeTemplate) -> Self {
        self.welcome = Some(template);
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Every message received so far, sent ones included once fetched back.
    pub fn log(&self) -> &[Message] {
        &self.log
    }

    pub fn state(&self) -> DaemonState {
        self.state
    }

    /// Accounts and follow graph as of the last completed replay.
    pub fn snapshot(&self) -> &SocialSnapshot {
        &self.snapshot
    }

    pub fn social(&self) -> &K {
        &self.social
    }

    /// Runs one cycle. A transport error aborts the cycle; whatever was
    /// appended to the log so far stays, and the next cycle starts over
    /// from the whole log.
    pub async fn run(&mut self) -> Result<CycleReport, DaemonError> {
        self.state = DaemonState::Running;
        let result = self.cycle().await;
        self.state = DaemonState::Idle;
        result
    }

    async fn cycle(&mut self) -> Result<CycleReport, DaemonError> {
        let mut report = CycleReport::default();
        report.received += self.fetch().await?;

        let mut processor = Processor::new(&self.host, &self.log, self.welcome.as_ref());
        let outbox = processor.outbox_mut();
        while let Some(draft) = outbox.front_mut() {
            // drafts carry their trigger's time; record when they actually went out
            draft.touch(Utc::now());
            self.sender.send(draft).await?;
            outbox.pop_front();
            report.sent += 1;
        }
        let (_, snapshot) = processor.into_parts();
        self.snapshot = snapshot;

        report.received += self.fetch().await?;

        if let Some(account) = self.snapshot.accounts.first() {
            self.social.set(account.clone());
        }
        if report.sent > 0 {
            info!(
                "cycle done: {} received, {} sent, log has {} messages",
                report.received,
                report.sent,
                self.log.len()
            );
        } else {
            debug!("cycle done: {} received, nothing to send", report.received);
        }
        Ok(report)
    }

    async fn fetch(&mut self) -> Result<usize, TransportError> {
        let fresh = self.receiver.fetch().await?;
        let count = fresh.len();
        self.log.extend(fresh);
        Ok(count)
    }

    /// Runs a cycle every `interval` until the task is dropped. Failed
    /// cycles are logged and retried on the next tick.
    pub async fn run_forever(&mut self, interval: Duration) {
        loop {
            if let Err(e) = self.run().await {
                error!("cycle failed, retrying in {:?}: {}", interval, e);
            }
            tokio::time::sleep(interval).await;
        }
    }
}
