use crate::{error::ContactFormError, registry::Field, request::SubmittedData};
use async_trait::async_trait;
use lettre::message::Mailbox;
use serde::Serialize;
use serde_json::Value;
use tinytemplate::{error::Error, format, TinyTemplate};

const NAME_KEY: &str = "name";
const FIRST_NAME_KEY: &str = "firstname";
const LAST_NAME_KEY: &str = "lastname";
const EMAIL_KEY: &str = "email";
const SUBJECT_KEY: &str = "subject";

const DEFAULT_SUBJECT: &str = "Contact";
const EMPTY_VALUE_PLACEHOLDER: &str = "--";
const CONTENT_TYPE_HEADER: &str = "Content-Type: text/html; charset=UTF-8";

const BODY_TEMPLATE_NAME: &str = "body";
const BODY_TEMPLATE: &str = "<html><body>{{ for line in lines }}<p>{{ if line.label }}<strong>{line.label}</strong> {{ endif }}{line.value | render_line_breaks}</p>{{ endfor }}</body></html>";

#[derive(Serialize)]
struct BodyContext<'a> {
    lines: Vec<BodyLine<'a>>,
}

#[derive(Serialize)]
struct BodyLine<'a> {
    label: Option<&'a str>,
    value: &'a str,
}

/// Formats submitted data into an email.
pub struct Mailer<'a> {
    fields: &'a [&'a Field],
    data: &'a SubmittedData,
}

impl<'a> Mailer<'a> {
    pub fn new(fields: &'a [&'a Field], data: &'a SubmittedData) -> Self {
        Self { fields, data }
    }

    pub fn compose(&self) -> Result<ContactEmail, ContactFormError> {
        Ok(ContactEmail {
            subject: self.subject(),
            content: self.content()?,
            sender: self.sender(),
        })
    }

    pub fn subject(&self) -> String {
        self.data
            .get(SUBJECT_KEY)
            .unwrap_or(DEFAULT_SUBJECT)
            .to_string()
    }

    /// HTML body listing every field in order. Fails when a configured field
    /// is absent from the submission.
    pub fn content(&self) -> Result<String, ContactFormError> {
        let mut lines = Vec::with_capacity(self.fields.len());
        for field in self.fields {
            let Some(value) = self.data.get(&field.name) else {
                return Err(ContactFormError::MissingField(field.name.clone()));
            };
            lines.push(BodyLine {
                label: field.label.as_deref().filter(|label| !label.is_empty()),
                value: if value.is_empty() {
                    EMPTY_VALUE_PLACEHOLDER
                } else {
                    value
                },
            });
        }
        render_body(&BodyContext { lines })
            .map_err(|error| ContactFormError::Template(error.to_string()))
    }

    pub fn sender(&self) -> Sender {
        let name = match (
            self.data.non_blank(FIRST_NAME_KEY),
            self.data.non_blank(LAST_NAME_KEY),
        ) {
            (Some(first), Some(last)) => Some(strip_line_breaks(&format!("{last} {first}"))),
            _ => self.data.non_blank(NAME_KEY).map(strip_line_breaks),
        };
        Sender {
            name,
            email: self.data.non_blank(EMAIL_KEY).map(strip_line_breaks),
        }
    }
}

fn render_body(context: &BodyContext) -> Result<String, Error> {
    let mut tt = TinyTemplate::new();
    tt.add_formatter("render_line_breaks", render_line_breaks);
    tt.add_template(BODY_TEMPLATE_NAME, BODY_TEMPLATE)?;
    tt.render(BODY_TEMPLATE_NAME, context)
}

fn render_line_breaks(value: &Value, output: &mut String) -> Result<(), Error> {
    let mut formatted = String::new();
    format(value, &mut formatted)?;
    output.push_str(&formatted.replace("\r\n", "\n").replace('\n', "<br>"));
    Ok(())
}

/// Prevents header injection through submitted names and addresses.
fn strip_line_breaks(value: &str) -> String {
    value.replace(['\r', '\n'], "")
}

/// Who the message claims to come from, as submitted.
#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Sender {
    pub name: Option<String>,
    pub email: Option<String>,
}

impl Sender {
    pub fn from_header(&self) -> Option<String> {
        match (self.name.as_deref(), self.email.as_deref()) {
            (Some(name), Some(email)) => Some(format!("From: {name} <{email}>")),
            (Some(name), None) => Some(format!("From: <{name}>")),
            (None, Some(email)) => Some(format!("From: {email}")),
            (None, None) => None,
        }
    }

    /// The sender as a mailbox, when an address was given and parses.
    pub fn mailbox(&self) -> Option<Mailbox> {
        let address = self.email.as_deref()?.parse().ok()?;
        Some(Mailbox::new(self.name.clone(), address))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactEmail {
    pub subject: String,
    pub content: String,
    pub sender: Sender,
}

impl ContactEmail {
    pub fn headers(&self) -> Vec<String> {
        std::iter::once(CONTENT_TYPE_HEADER.to_string())
            .chain(self.sender.from_header())
            .collect()
    }

    pub fn preview(&self) -> MailPreview {
        MailPreview {
            subject: self.subject.clone(),
            content: self.content.clone(),
            headers: self.headers(),
        }
    }

    /// Sends the email, or only describes it when previewing.
    pub async fn deliver<M: MailDispatch + ?Sized>(
        &self,
        delivery: Delivery,
        receiver: &str,
        dispatcher: &M,
    ) -> Result<Option<MailPreview>, ContactFormError> {
        match delivery {
            Delivery::Preview => Ok(Some(self.preview())),
            Delivery::Send => {
                dispatcher.send(self, receiver).await?;
                Ok(None)
            }
        }
    }
}

/// What would have been sent, returned to the browser in test environments.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct MailPreview {
    pub subject: String,
    pub content: String,
    pub headers: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Send,
    Preview,
}

#[async_trait]
pub trait MailDispatch: Send + Sync {
    async fn send(&self, email: &ContactEmail, receiver: &str) -> Result<(), MailError>;
}

#[derive(Debug)]
pub enum MailError {
    InvalidReceiver(String),
    InvalidSender(String),
    BuildMessage(lettre::error::Error),
    Connect(String),
    Send(lettre::transport::smtp::Error),
}

impl std::fmt::Display for MailError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MailError::InvalidReceiver(receiver) => write!(f, "Invalid receiver {receiver}"),
            MailError::InvalidSender(sender) => write!(f, "Invalid sender {sender}"),
            MailError::BuildMessage(error) => write!(f, "Error building message: {error}"),
            MailError::Connect(error) => write!(f, "Unable to connect to SMTP server: {error}"),
            MailError::Send(error) => write!(f, "Error sending message: {error}"),
        }
    }
}

impl std::error::Error for MailError {}
