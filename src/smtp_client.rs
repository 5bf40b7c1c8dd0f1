/*
Outgoing SMTP relay.

Mail written by the daemon is always filed into the local mail directory.
When SMTP_RELAY is set it is also handed to that relay, so followers on
other hosts actually receive it:

    SMTP_RELAY=smtp.example.com
    SMTP_USERNAME=...
    SMTP_PASSWORD=...

The relay speaks submission with STARTTLS/TLS as negotiated by lettre.
The event tag travels in the X-Social-Event header, unwrapped to one line.
*/

use std::time::SystemTime;

use lettre::message::header::{ContentType, Header, HeaderName, HeaderValue};
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use log::{debug, info};

use crate::entities::Message;
use crate::metadata::{single_line, HEADER_NAME};
use crate::transport::TransportError;

#[derive(Debug, Clone)]
pub struct SmtpSettings {
    pub host: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Clone)]
pub struct SmtpRelay {
    host: String,
    mailer: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpRelay {
    pub fn connect(settings: &SmtpSettings) -> Result<Self, TransportError> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(&settings.host)?;
        if let (Some(username), Some(password)) = (&settings.username, &settings.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }
        info!("relaying outgoing mail through {}", settings.host);
        Ok(SmtpRelay {
            host: settings.host.clone(),
            mailer: builder.build(),
        })
    }

    pub async fn relay(&self, message: &Message) -> Result<(), TransportError> {
        let email = build_email(message)?;
        let response = self.mailer.send(email).await?;
        debug!(
            "{} accepted \"{}\": {:?}",
            self.host,
            message.subject,
            response.code()
        );
        Ok(())
    }
}

/// Turns a log message into a lettre message ready for submission.
pub fn build_email(message: &Message) -> Result<lettre::Message, TransportError> {
    let mut builder = lettre::Message::builder()
        .from(message.from.parse::<Mailbox>()?)
        .subject(message.subject.clone())
        .date(SystemTime::from(message.created_at))
        .header(ContentType::TEXT_PLAIN);
    for to in &message.to {
        builder = builder.to(to.parse::<Mailbox>()?);
    }
    if let Some(token) = &message.event_tag {
        builder = builder.header(SocialEventHeader(single_line(token)));
    }
    Ok(builder.body(message.body.clone())?)
}

#[derive(Debug, Clone, PartialEq)]
pub struct SocialEventHeader(pub String);

impl Header for SocialEventHeader {
    fn name() -> HeaderName {
        HeaderName::new_from_ascii_str(HEADER_NAME)
    }

    fn parse(s: &str) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        Ok(SocialEventHeader(s.trim().to_string()))
    }

    fn display(&self) -> HeaderValue {
        HeaderValue::new(Self::name(), self.0.clone())
    }
}
