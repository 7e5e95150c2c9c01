use crate::{
    error::ContactFormError,
    form::ContactForm,
    mailer::{Delivery, MailDispatch, MailPreview, Mailer},
    registry::Field,
    request::RequestContext,
    validator::{ValidationErrors, Validator},
};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::info;

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ResponseBody {
    pub message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<ValidationErrors>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<MailPreview>,
}

impl ResponseBody {
    fn message(message: &'static str) -> Self {
        Self {
            message,
            success: None,
            errors: None,
            data: None,
        }
    }
}

/// The single JSON reply to a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactFormResponse {
    pub status: StatusCode,
    pub body: ResponseBody,
}

impl ContactFormResponse {
    pub fn success(preview: Option<MailPreview>) -> Self {
        Self {
            status: StatusCode::OK,
            body: ResponseBody {
                success: Some(1),
                data: preview,
                ..ResponseBody::message("Success")
            },
        }
    }

    pub fn forbidden() -> Self {
        Self {
            status: StatusCode::FORBIDDEN,
            body: ResponseBody::message("Forbidden"),
        }
    }

    pub fn bad_request(errors: ValidationErrors) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: ResponseBody {
                errors: Some(errors),
                ..ResponseBody::message("Bad Request")
            },
        }
    }

    /// A body that could not be decoded as a form submission.
    pub fn malformed() -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: ResponseBody::message("Bad Request"),
        }
    }

    pub fn unknown_form() -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: ResponseBody::message("Unknown form"),
        }
    }

    pub fn internal_error() -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: ResponseBody::message("Internal Server Error"),
        }
    }
}

impl IntoResponse for ContactFormResponse {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

/// Runs one submission through the security check, validation and delivery.
pub struct RequestHandler<'a, M: MailDispatch + ?Sized> {
    form: &'a ContactForm,
    dispatcher: &'a M,
}

impl<'a, M: MailDispatch + ?Sized> RequestHandler<'a, M> {
    pub fn new(form: &'a ContactForm, dispatcher: &'a M) -> Self {
        Self { form, dispatcher }
    }

    pub async fn handle(&self, context: &RequestContext) -> ContactFormResponse {
        match self.process(context).await {
            Ok(preview) => ContactFormResponse::success(preview),
            Err(error) => {
                error.log();
                error.into_response()
            }
        }
    }

    async fn process(
        &self,
        context: &RequestContext,
    ) -> Result<Option<MailPreview>, ContactFormError> {
        self.form.security().verify(&context.data)?;

        let fields: Vec<&Field> = self.form.registry().data_fields().collect();
        let mut validator = Validator::new(&context.data);
        validator.check(fields.iter().copied());
        if !validator.is_valid() {
            return Err(ContactFormError::Invalid(validator.into_errors()));
        }

        let email = Mailer::new(&fields, &context.data).compose()?;
        let delivery = if context.is_test_environment() {
            Delivery::Preview
        } else {
            Delivery::Send
        };
        let preview = email
            .deliver(delivery, self.form.receiver(), self.dispatcher)
            .await?;
        info!("Processed submission for contact form {}", self.form.id());
        Ok(preview)
    }
}

#[cfg(test)]
mod tests {
    use super::{ContactFormResponse, RequestHandler};
    use crate::{
        form::ContactForm,
        mailer::{ContactEmail, MailDispatch, MailError},
        registry::{Field, FieldOptions},
        request::{RequestContext, SubmittedData},
        security::{NonceSigner, HONEYPOT_FIELD_NAME},
    };
    use async_trait::async_trait;
    use axum::http::StatusCode;
    use googletest::prelude::*;
    use std::sync::Mutex;

    const NONCE_KEY: &str = "arbitrary nonce key";
    const RECEIVER: &str = "owner@example.com";

    #[derive(Default)]
    struct RecordingDispatch {
        sent: Mutex<Vec<ContactEmail>>,
        fail: bool,
    }

    #[async_trait]
    impl MailDispatch for RecordingDispatch {
        async fn send(
            &self,
            email: &ContactEmail,
            _receiver: &str,
        ) -> std::result::Result<(), MailError> {
            if self.fail {
                return Err(MailError::Connect("connection refused".into()));
            }
            self.sent.lock().unwrap().push(email.clone());
            Ok(())
        }
    }

    fn form() -> ContactForm {
        let mut form = ContactForm::new("contact", RECEIVER, NonceSigner::new(NONCE_KEY));
        for field in [
            Field::new("text", "firstname").with_options(FieldOptions::default().required()),
            Field::new("text", "lastname").with_options(FieldOptions::default().required()),
            Field::new("email", "email").with_options(FieldOptions::default().required()),
            Field::new("tel", "phone")
                .with_options(FieldOptions::default().required_with("email")),
            Field::new("textarea", "message").with_options(FieldOptions::default().required()),
        ] {
            form.add_field(field).unwrap();
        }
        form
    }

    struct Submission {
        host: &'static str,
        values: Vec<(String, String)>,
    }

    impl Submission {
        fn arbitrary(form: &ContactForm) -> Self {
            let security = form.security();
            Self {
                host: "example.com",
                values: vec![
                    (security.nonce_field().into(), security.create_nonce()),
                    (HONEYPOT_FIELD_NAME.into(), "".into()),
                    ("firstname".into(), "Jane".into()),
                    ("lastname".into(), "Doe".into()),
                    ("email".into(), "jane@doe.com".into()),
                    ("phone".into(), "".into()),
                    ("message".into(), "Hello".into()),
                ],
            }
        }

        fn with(mut self, name: &str, value: &str) -> Self {
            self.values.retain(|(key, _)| key != name);
            self.values.push((name.into(), value.into()));
            self
        }

        fn without(mut self, name: &str) -> Self {
            self.values.retain(|(key, _)| key != name);
            self
        }

        fn on_host(self, host: &'static str) -> Self {
            Self { host, ..self }
        }

        fn into_context(self) -> RequestContext {
            RequestContext::new(
                Some(self.host.into()),
                self.values.into_iter().collect::<SubmittedData>(),
            )
        }
    }

    async fn handle(form: &ContactForm, submission: Submission) -> ContactFormResponse {
        let dispatcher = RecordingDispatch::default();
        RequestHandler::new(form, &dispatcher)
            .handle(&submission.into_context())
            .await
    }

    #[tokio::test]
    async fn returns_403_when_nonce_is_missing() -> Result<()> {
        let form = form();
        let submission = Submission::arbitrary(&form).without("contact_nonce");

        verify_that!(handle(&form, submission).await, eq(ContactFormResponse::forbidden()))
    }

    #[tokio::test]
    async fn returns_403_when_nonce_is_from_another_key() -> Result<()> {
        let form = form();
        let foreign_nonce = NonceSigner::new("another key").create("send-contact");
        let submission = Submission::arbitrary(&form).with("contact_nonce", &foreign_nonce);

        verify_that!(handle(&form, submission).await, eq(ContactFormResponse::forbidden()))
    }

    #[tokio::test]
    async fn returns_403_when_honeypot_is_filled() -> Result<()> {
        let form = form();
        let submission = Submission::arbitrary(&form).with(HONEYPOT_FIELD_NAME, "spam");

        verify_that!(handle(&form, submission).await, eq(ContactFormResponse::forbidden()))
    }

    #[googletest::test]
    #[tokio::test]
    async fn returns_400_listing_every_invalid_field() {
        let form = form();
        let submission = Submission::arbitrary(&form)
            .with("firstname", "")
            .with("email", "not-an-email")
            .with("phone", "123");

        let response = handle(&form, submission).await;

        expect_that!(response.status, eq(StatusCode::BAD_REQUEST));
        expect_that!(response.body.message, eq("Bad Request"));
        let names: Vec<String> = response
            .body
            .errors
            .as_ref()
            .map(|errors| errors.names().map(String::from).collect())
            .unwrap_or_default();
        expect_that!(
            names,
            eq(vec!["email".to_string(), "firstname".to_string(), "phone".to_string()])
        );
    }

    #[googletest::test]
    #[tokio::test]
    async fn sends_mail_and_returns_success() {
        let form = form();
        let dispatcher = RecordingDispatch::default();

        let response = RequestHandler::new(&form, &dispatcher)
            .handle(&Submission::arbitrary(&form).into_context())
            .await;

        let sent = dispatcher.sent.lock().unwrap().clone();
        expect_that!(response, eq(ContactFormResponse::success(None)));
        expect_that!(
            sent,
            elements_are![field!(ContactEmail.subject, eq("Contact"))]
        );
    }

    #[googletest::test]
    #[tokio::test]
    async fn returns_preview_in_test_environment() {
        let form = form();
        let dispatcher = RecordingDispatch::default();

        let response = RequestHandler::new(&form, &dispatcher)
            .handle(
                &Submission::arbitrary(&form)
                    .on_host("localhost:8080")
                    .into_context(),
            )
            .await;

        let sent = dispatcher.sent.lock().unwrap().clone();
        expect_that!(response.status, eq(StatusCode::OK));
        expect_that!(response.body.success, some(eq(1)));
        expect_that!(
            response.body.data.as_ref().map(|preview| preview.headers.clone()),
            some(contains(eq("From: Doe Jane <jane@doe.com>")))
        );
        expect_that!(sent, empty());
    }

    #[tokio::test]
    async fn returns_500_when_configured_field_is_not_submitted() -> Result<()> {
        let form = form();
        let submission = Submission::arbitrary(&form).without("phone");

        verify_that!(
            handle(&form, submission).await,
            eq(ContactFormResponse::internal_error())
        )
    }

    #[tokio::test]
    async fn returns_500_when_transport_fails() -> Result<()> {
        let form = form();
        let dispatcher = RecordingDispatch {
            fail: true,
            ..Default::default()
        };

        let response = RequestHandler::new(&form, &dispatcher)
            .handle(&Submission::arbitrary(&form).into_context())
            .await;

        verify_that!(response, eq(ContactFormResponse::internal_error()))
    }

    #[test]
    fn serializes_only_present_members() -> Result<()> {
        verify_that!(
            serde_json::to_string(&ContactFormResponse::forbidden().body).unwrap(),
            eq(r#"{"message":"Forbidden"}"#)
        )?;
        verify_that!(
            serde_json::to_string(&ContactFormResponse::success(None).body).unwrap(),
            eq(r#"{"message":"Success","success":1}"#)
        )
    }
}
