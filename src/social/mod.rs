use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;

use crate::entities::Account;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("{0} cannot follow itself")]
    SelfFollow(String),
}

/// Accounts in the order replay created them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Accounts {
    accounts: Vec<Account>,
}

impl Accounts {
    /// Creates the account unless one already exists for the address.
    /// Returns the account and whether it was created by this call.
    pub fn add(&mut self, address: &str, name: &str) -> (&Account, bool) {
        match self.accounts.iter().position(|a| a.address == address) {
            Some(at) => (&self.accounts[at], false),
            None => {
                self.accounts.push(Account::new(name, address));
                let created = self.accounts.len() - 1;
                (&self.accounts[created], true)
            }
        }
    }

    pub fn get(&self, address: &str) -> Option<&Account> {
        self.accounts.iter().find(|a| a.address == address)
    }

    pub fn first(&self) -> Option<&Account> {
        self.accounts.first()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Account> {
        self.accounts.iter()
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

/// Who follows whom. Both directions are kept in step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FollowGraph {
    following: BTreeMap<String, BTreeSet<String>>,
    followers: BTreeMap<String, BTreeSet<String>>,
}

impl FollowGraph {
    /// Returns `Ok(false)` when the edge already existed.
    pub fn follow(&mut self, follower: &str, followee: &str) -> Result<bool, GraphError> {
        if follower == followee {
            return Err(GraphError::SelfFollow(follower.to_string()));
        }
        let added = self
            .following
            .entry(follower.to_string())
            .or_default()
            .insert(followee.to_string());
        self.followers
            .entry(followee.to_string())
            .or_default()
            .insert(follower.to_string());
        Ok(added)
    }

    pub fn unfollow(&mut self, follower: &str, followee: &str) -> bool {
        let removed = self
            .following
            .get_mut(follower)
            .map_or(false, |set| set.remove(followee));
        if let Some(set) = self.followers.get_mut(followee) {
            set.remove(follower);
        }
        self.following.retain(|_, set| !set.is_empty());
        self.followers.retain(|_, set| !set.is_empty());
        removed
    }

    pub fn is_following(&self, follower: &str, followee: &str) -> bool {
        self.following
            .get(follower)
            .map_or(false, |set| set.contains(followee))
    }

    pub fn followers_of(&self, address: &str) -> impl Iterator<Item = &str> {
        self.followers
            .get(address)
            .into_iter()
            .flat_map(|set| set.iter().map(String::as_str))
    }

    pub fn following_of(&self, address: &str) -> impl Iterator<Item = &str> {
        self.following
            .get(address)
            .into_iter()
            .flat_map(|set| set.iter().map(String::as_str))
    }
}

/// Everything replay derives from the log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SocialSnapshot {
    pub accounts: Accounts,
    pub graph: FollowGraph,
}

/// Display name for an address that never supplied one: the capitalized
/// local part, then a letter picked from the domain's second-level label.
pub fn derive_username(address: &str) -> String {
    let (local, domain) = address.split_once('@').unwrap_or((address, ""));

    let mut chars = local.chars();
    let capitalized: String = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    };

    let labels: Vec<&str> = domain.split('.').filter(|l| !l.is_empty()).collect();
    let label = match labels.len() {
        0 => "",
        1 => labels[0],
        n => labels[n - 2],
    };
    let sum: u32 = label
        .chars()
        .filter(char::is_ascii_alphabetic)
        .map(|c| (c.to_ascii_lowercase() as u32) - ('a' as u32) + 1)
        .sum();
    let letter = (b'A' + (sum % 26) as u8) as char;

    format!("{} {}.", capitalized, letter)
}

/// Receives the account the daemon publishes after each cycle.
pub trait SocialState {
    fn get(&self) -> Option<Account>;
    fn set(&mut self, account: Account);
}

/// Shared in-memory sink; clones observe the same account.
#[derive(Debug, Clone, Default)]
pub struct SharedSocialState {
    current: Arc<Mutex<Option<Account>>>,
}

impl SharedSocialState {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SocialState for SharedSocialState {
    fn get(&self) -> Option<Account> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set(&mut self, account: Account) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(account);
    }
}
