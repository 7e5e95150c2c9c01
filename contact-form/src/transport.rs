use crate::{
    mailer::{ContactEmail, MailDispatch, MailError},
    secrets::SecretRepository,
};
use async_once_cell::OnceCell;
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::{Credentials, Mechanism},
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use serde::Deserialize;
use std::borrow::Cow;
use tracing::info;

pub const SMTP_CREDENTIALS_NAME: &str = "contact-form-smtp-credentials";

const SMTP_URL: &str = "smtps://email-smtp.eu-north-1.amazonaws.com";
const MAIL_FROM: &str = "Web contact form <noreply@localhost>";

#[derive(Deserialize)]
struct SmtpCredentials {
    #[serde(rename = "SMTP_USERNAME")]
    username: String,
    #[serde(rename = "SMTP_PASSWORD")]
    password: String,
}

/// Sends contact emails over SMTP. The connection pool is created on first
/// use and kept for later requests.
pub struct SmtpMailer<SecretRepositoryT: SecretRepository> {
    secrets_repository: SecretRepositoryT,
    transport: OnceCell<AsyncSmtpTransport<Tokio1Executor>>,
}

impl<SecretRepositoryT: SecretRepository> SmtpMailer<SecretRepositoryT> {
    pub fn new(secrets_repository: SecretRepositoryT) -> Self {
        Self {
            secrets_repository,
            transport: Default::default(),
        }
    }

    fn build_message(&self, email: &ContactEmail, receiver: &str) -> Result<Message, MailError> {
        let receiver: Mailbox = receiver
            .parse()
            .map_err(|_| MailError::InvalidReceiver(receiver.into()))?;
        // From stays the configured address; the visitor is only a Reply-To.
        let mut builder = Message::builder().from(Self::default_from()?);
        if let Some(sender) = email.sender.mailbox() {
            builder = builder.reply_to(sender);
        }
        builder
            .to(receiver)
            .subject(email.subject.as_str())
            .header(ContentType::TEXT_HTML)
            .body(email.content.clone())
            .map_err(MailError::BuildMessage)
    }

    async fn initialise_transport(
        &self,
    ) -> Result<AsyncSmtpTransport<Tokio1Executor>, lambda_http::Error> {
        let smtp_url = Self::smtp_url();
        info!("Connecting to SMTP server at {smtp_url}");

        // Credentials are only sent over TLS. A misconfigured plain connection
        // is then rejected by the server instead of leaking them.
        let credentials = if smtp_url.starts_with("smtps://") {
            let parsed: SmtpCredentials = self
                .secrets_repository
                .get_secret(SMTP_CREDENTIALS_NAME)
                .await?;
            Some(Credentials::new(parsed.username, parsed.password))
        } else {
            None
        };

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::from_url(&smtp_url)?
            .authentication(vec![Mechanism::Plain]);
        if let Some(credentials) = credentials {
            builder = builder.credentials(credentials);
        }
        Ok(builder.build())
    }

    fn smtp_url() -> Cow<'static, str> {
        std::env::var("SMTP_URL")
            .map(Cow::Owned)
            .unwrap_or(SMTP_URL.into())
    }

    fn default_from() -> Result<Mailbox, MailError> {
        let from: Cow<'static, str> = std::env::var("MAIL_FROM")
            .map(Cow::Owned)
            .unwrap_or(MAIL_FROM.into());
        from.parse()
            .map_err(|_| MailError::InvalidSender(from.into_owned()))
    }
}

#[async_trait]
impl<SecretRepositoryT: SecretRepository> MailDispatch for SmtpMailer<SecretRepositoryT> {
    async fn send(&self, email: &ContactEmail, receiver: &str) -> Result<(), MailError> {
        let message = self.build_message(email, receiver)?;
        let transport = self
            .transport
            .get_or_try_init(self.initialise_transport())
            .await
            .map_err(|error| MailError::Connect(error.to_string()))?;
        transport.send(message).await.map_err(MailError::Send)?;
        info!("Sent contact form email to {receiver}");
        Ok(())
    }
}
