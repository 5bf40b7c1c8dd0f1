/*
Drops a message into the daemon's mail directory, as if it had arrived
over SMTP.

cargo run --bin mailsocial_client -- [OPTIONS]

OPTIONS:
    -f, --from <FROM>        Sender address
    -t, --to <TO>            Recipient address (HOST_ADDRESS when omitted)
    -s, --subject <SUBJECT>  Subject, "$" for commands and posts
    -b, --body <BODY>        Body, e.g. "$ help"
    -d, --mail-dir <DIR>     Mail directory (MAIL_DIR, default ./emails)

Example usage:
cargo run --bin mailsocial_client -- \
    --from "h@example.com" \
    --subject '$' \
    --body '$ invite --addfollower f@example.com'
*/

use std::env;
use std::path::PathBuf;

use chrono::Utc;
use clap::{Arg, Command};
use dotenv::dotenv;

use mailsocial::config::DEFAULT_MAIL_DIR;
use mailsocial::entities::Message;
use mailsocial::transport::maildir::store_message;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    let matches = Command::new("mailsocial_client")
        .version(mailsocial::templates::VERSION)
        .about("Writes a message into a mailsocial mail directory")
        .arg(
            Arg::new("from")
                .short('f')
                .long("from")
                .value_name("FROM")
                .help("Sets the sender email address")
                .required(true)
                .takes_value(true),
        )
        .arg(
            Arg::new("to")
                .short('t')
                .long("to")
                .value_name("TO")
                .help("Sets the recipient email address")
                .takes_value(true),
        )
        .arg(
            Arg::new("subject")
                .short('s')
                .long("subject")
                .value_name("SUBJECT")
                .help("Sets the email subject")
                .default_value("$")
                .takes_value(true),
        )
        .arg(
            Arg::new("body")
                .short('b')
                .long("body")
                .value_name("BODY")
                .help("Sets the email body")
                .required(true)
                .takes_value(true),
        )
        .arg(
            Arg::new("mail-dir")
                .short('d')
                .long("mail-dir")
                .value_name("DIR")
                .help("Mail directory the daemon watches")
                .takes_value(true),
        )
        .get_matches();

    let from = matches.value_of("from").unwrap_or_default();
    let to = match matches.value_of("to") {
        Some(to) => to.to_string(),
        None => env::var("HOST_ADDRESS").map_err(|_| "--to or HOST_ADDRESS must be set")?,
    };
    let subject = matches.value_of("subject").unwrap_or("$");
    let body = matches.value_of("body").unwrap_or_default();
    let mail_dir = matches
        .value_of("mail-dir")
        .map(PathBuf::from)
        .or_else(|| env::var("MAIL_DIR").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_MAIL_DIR));

    let message = Message::new(from, &[to.as_str()], subject, body).at(Utc::now());
    let path = store_message(&mail_dir, &message).await?;
    println!("Message written to {}", path.display());

    Ok(())
}
