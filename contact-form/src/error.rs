use crate::{
    handler::ContactFormResponse, mailer::MailError, security::SecurityFailure,
    validator::ValidationErrors,
};
use tracing::{error, info, warn};

#[derive(Debug)]
pub enum ContactFormError {
    Forbidden(SecurityFailure),
    Invalid(ValidationErrors),
    /// A configured field is absent from the submission.
    MissingField(String),
    Template(String),
    Transport(MailError),
    UnknownForm(String),
}

impl ContactFormError {
    pub fn log(&self) {
        match self {
            ContactFormError::Forbidden(failure) => {
                warn!("Rejected contact form submission: {failure}");
            }
            ContactFormError::Invalid(errors) => {
                let fields: Vec<&str> = errors.names().collect();
                info!("Contact form submission failed validation: {fields:?}");
            }
            ContactFormError::MissingField(name) => {
                error!("Configuration error: field {name} is missing from submission");
            }
            ContactFormError::Template(description) => {
                error!("Error rendering contact form email: {description}");
            }
            ContactFormError::Transport(error) => {
                error!("Internal error sending contact form email: {error}");
            }
            ContactFormError::UnknownForm(key) => {
                warn!("Submission for unknown contact form {key:?}");
            }
        }
    }

    pub fn into_response(self) -> ContactFormResponse {
        match self {
            ContactFormError::Forbidden(_) => ContactFormResponse::forbidden(),
            ContactFormError::Invalid(errors) => ContactFormResponse::bad_request(errors),
            ContactFormError::UnknownForm(_) => ContactFormResponse::unknown_form(),
            ContactFormError::MissingField(_)
            | ContactFormError::Template(_)
            | ContactFormError::Transport(_) => ContactFormResponse::internal_error(),
        }
    }
}

impl From<MailError> for ContactFormError {
    fn from(error: MailError) -> Self {
        ContactFormError::Transport(error)
    }
}

impl From<SecurityFailure> for ContactFormError {
    fn from(failure: SecurityFailure) -> Self {
        ContactFormError::Forbidden(failure)
    }
}

impl std::fmt::Display for ContactFormError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContactFormError::Forbidden(failure) => write!(f, "Forbidden: {failure}"),
            ContactFormError::Invalid(errors) => {
                write!(f, "Validation failed for {} field(s)", errors.len())
            }
            ContactFormError::MissingField(name) => write!(f, "{name} is missing"),
            ContactFormError::Template(description) => write!(f, "Template error: {description}"),
            ContactFormError::Transport(error) => write!(f, "Transport error: {error}"),
            ContactFormError::UnknownForm(key) => write!(f, "Unknown form {key}"),
        }
    }
}

impl std::error::Error for ContactFormError {}
