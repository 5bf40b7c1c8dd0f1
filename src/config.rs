use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::commands::normalize_address;
use crate::smtp_client::SmtpSettings;

pub const DEFAULT_MAIL_DIR: &str = "./emails";
pub const DEFAULT_WELCOME_TEMPLATE: &str = "./templates/welcome.txt";
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} has an invalid value {value:?}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub mail_dir: PathBuf,
    pub welcome_template: PathBuf,
    pub poll_interval: Duration,
    pub smtp: Option<SmtpSettings>,
}

impl Config {
    /// Reads the process environment. Call `dotenv()` first to pick up `.env`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let host = get("HOST_ADDRESS").ok_or(ConfigError::Missing("HOST_ADDRESS"))?;
        let host = normalize_address(&host);
        if !host.contains('@') {
            return Err(ConfigError::Invalid {
                name: "HOST_ADDRESS",
                value: host,
            });
        }

        let poll_interval = match get("POLL_INTERVAL_SECS") {
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    return Err(ConfigError::Invalid {
                        name: "POLL_INTERVAL_SECS",
                        value: raw,
                    })
                }
            },
            None => Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
        };

        let smtp = get("SMTP_RELAY").map(|relay| SmtpSettings {
            host: relay,
            username: get("SMTP_USERNAME"),
            password: get("SMTP_PASSWORD"),
        });

        Ok(Config {
            host,
            mail_dir: PathBuf::from(get("MAIL_DIR").unwrap_or_else(|| DEFAULT_MAIL_DIR.to_string())),
            welcome_template: PathBuf::from(
                get("WELCOME_TEMPLATE").unwrap_or_else(|| DEFAULT_WELCOME_TEMPLATE.to_string()),
            ),
            poll_interval,
            smtp,
        })
    }
}
