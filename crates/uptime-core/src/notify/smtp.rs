use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use super::{EmailMessage, Mailer, NotifyError};

/// SMTP relay settings for outgoing alert mail.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from_addr: String,
    /// STARTTLS upgrade on a plaintext port (587); false uses implicit TLS
    /// (465).
    pub starttls: bool,
}

/// Production mailer on an async lettre SMTP transport.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> Result<Self, NotifyError> {
        let from: Mailbox = config
            .from_addr
            .parse()
            .map_err(|e| NotifyError::Transport(format!("invalid from address: {e}")))?;

        let builder = if config.starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
        }
        .map_err(|e| NotifyError::Transport(e.to_string()))?;

        let transport = builder
            .port(config.port)
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ))
            .build();

        Ok(Self { transport, from })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), NotifyError> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(message.subject.clone())
            .header(ContentType::TEXT_PLAIN);
        for recipient in &message.recipients {
            let mailbox: Mailbox = recipient
                .parse()
                .map_err(|e| NotifyError::Recipients(format!("'{recipient}': {e}")))?;
            builder = builder.to(mailbox);
        }
        let email = builder
            .body(message.body.clone())
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        self.transport
            .send(email)
            .await
            .map(|_| ())
            .map_err(classify_smtp_error)
    }
}

/// Split SMTP failures into authentication, server response, and transport
/// classes. Auth rejections come back as 534/535.
fn classify_smtp_error(error: lettre::transport::smtp::Error) -> NotifyError {
    match error.status() {
        Some(code) => {
            let code_str = code.to_string();
            if code_str.starts_with("534") || code_str.starts_with("535") {
                NotifyError::SmtpAuth(error.to_string())
            } else {
                NotifyError::Smtp(error.to_string())
            }
        }
        None => NotifyError::Transport(error.to_string()),
    }
}
