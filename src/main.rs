/*
mailsocial daemon.

Watches a mail directory, replays everything in it and answers the
commands and posts it finds. Replies are written back into the same
directory (and handed to SMTP_RELAY when set).

Run from the project root:

cargo run --bin mailsocial_daemon -- [OPTIONS]

OPTIONS:
    -H, --host <ADDRESS>      Mailbox address this daemon answers for (HOST_ADDRESS)
    -d, --mail-dir <DIR>      Directory of .eml files (MAIL_DIR, default ./emails)
    -t, --template <FILE>     Welcome template (WELCOME_TEMPLATE)
    -i, --interval <SECS>     Seconds between cycles (POLL_INTERVAL_SECS, default 30)
        --once                Run a single cycle and exit

Flags override the environment and .env file.
*/

use std::fmt;
use std::time::Duration;

use clap::{Arg, Command};
use dotenv::dotenv;
use log::{error, info};

use mailsocial::config::{Config, ConfigError};
use mailsocial::daemon::{Daemon, DaemonError};
use mailsocial::smtp_client::SmtpRelay;
use mailsocial::social::SharedSocialState;
use mailsocial::templates::WelcomeTemplate;
use mailsocial::transport::maildir::{MailDirReceiver, MailDirSender};
use mailsocial::transport::TransportError;

#[derive(Debug)]
struct MainError(String);

impl fmt::Display for MainError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for MainError {}

impl From<std::io::Error> for MainError {
    fn from(err: std::io::Error) -> Self {
        MainError(err.to_string())
    }
}

impl From<ConfigError> for MainError {
    fn from(err: ConfigError) -> Self {
        MainError(err.to_string())
    }
}

impl From<TransportError> for MainError {
    fn from(err: TransportError) -> Self {
        MainError(err.to_string())
    }
}

impl From<DaemonError> for MainError {
    fn from(err: DaemonError) -> Self {
        MainError(err.to_string())
    }
}

fn apply_flags(config: &mut Config, matches: &clap::ArgMatches) -> Result<(), MainError> {
    if let Some(dir) = matches.value_of("mail-dir") {
        config.mail_dir = dir.into();
    }
    if let Some(template) = matches.value_of("template") {
        config.welcome_template = template.into();
    }
    if let Some(secs) = matches.value_of("interval") {
        let secs: u64 = secs
            .parse()
            .map_err(|_| MainError(format!("invalid --interval {:?}", secs)))?;
        config.poll_interval = Duration::from_secs(secs.max(1));
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), MainError> {
    dotenv().ok();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let matches = Command::new("mailsocial_daemon")
        .version(mailsocial::templates::VERSION)
        .about("Runs a social network over a mailbox")
        .arg(
            Arg::new("host")
                .short('H')
                .long("host")
                .value_name("ADDRESS")
                .help("Mailbox address this daemon answers for")
                .takes_value(true),
        )
        .arg(
            Arg::new("mail-dir")
                .short('d')
                .long("mail-dir")
                .value_name("DIR")
                .help("Directory of .eml files")
                .takes_value(true),
        )
        .arg(
            Arg::new("template")
                .short('t')
                .long("template")
                .value_name("FILE")
                .help("Welcome message template")
                .takes_value(true),
        )
        .arg(
            Arg::new("interval")
                .short('i')
                .long("interval")
                .value_name("SECS")
                .help("Seconds between cycles")
                .takes_value(true),
        )
        .arg(
            Arg::new("once")
                .long("once")
                .help("Run a single cycle and exit"),
        )
        .get_matches();

    // --host stands in for HOST_ADDRESS so the flag alone is enough
    let host_flag = matches.value_of("host").map(str::to_string);
    let mut config = Config::from_lookup(|name| match (name, &host_flag) {
        ("HOST_ADDRESS", Some(host)) => Some(host.clone()),
        _ => std::env::var(name).ok(),
    })?;
    apply_flags(&mut config, &matches)?;

    let receiver = MailDirReceiver::open(&config.mail_dir).await?;
    let mut sender = MailDirSender::new(&config.mail_dir);
    if let Some(smtp) = &config.smtp {
        sender = sender.with_relay(SmtpRelay::connect(smtp)?);
    }

    info!(
        "mailsocial {} serving {} from {}",
        mailsocial::templates::VERSION,
        config.host,
        config.mail_dir.display()
    );

    let mut daemon = Daemon::new(&config.host, receiver, sender, SharedSocialState::new())
        .with_welcome_template(WelcomeTemplate::new(&config.welcome_template));

    if matches.is_present("once") {
        let report = daemon.run().await?;
        info!("received {}, sent {}", report.received, report.sent);
        return Ok(());
    }

    tokio::select! {
        _ = daemon.run_forever(config.poll_interval) => {}
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!("could not listen for shutdown: {}", e);
            }
            info!("shutting down");
        }
    }

    Ok(())
}
