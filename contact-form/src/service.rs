use crate::{
    error::ContactFormError,
    form::ContactForm,
    handler::{ContactFormResponse, RequestHandler},
    mailer::MailDispatch,
    request::{RequestContext, SubmittedData},
    security::AJAX_KEY_FIELD_NAME,
};
use axum::{
    extract::{rejection::FormRejection, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Form, Router,
};
use std::sync::Arc;
use tracing::{error, warn};

/// Field appended by the front-end script to route a submission.
pub const ACTION_FIELD_NAME: &str = "action";
pub const FORM_SCRIPT_PATH: &str = "/assets/form-contact.js";

const FORM_SCRIPT: &str = include_str!("../assets/form-contact.js");

/// The registered forms and the transport their submissions are mailed with.
pub struct ContactFormService<M: MailDispatch> {
    forms: Vec<ContactForm>,
    dispatcher: M,
    endpoint: String,
}

impl<M: MailDispatch + 'static> ContactFormService<M> {
    pub fn new(dispatcher: M, endpoint: impl Into<String>) -> Self {
        Self {
            forms: Vec::new(),
            dispatcher,
            endpoint: endpoint.into(),
        }
    }

    /// Registers a form. A form with the same identifier is replaced.
    pub fn register(&mut self, form: ContactForm) {
        self.forms.retain(|existing| existing.id() != form.id());
        self.forms.push(form);
    }

    pub fn with_forms(mut self, forms: impl IntoIterator<Item = ContactForm>) -> Self {
        for form in forms {
            self.register(form);
        }
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn form_by_id(&self, id: &str) -> Option<&ContactForm> {
        self.forms.iter().find(|form| form.id() == id)
    }

    pub fn form_by_dispatch_key(&self, key: &str) -> Option<&ContactForm> {
        self.forms
            .iter()
            .find(|form| form.security().ajax_key() == key)
    }

    /// Routes a submission to the form named by its `action` field, falling
    /// back to the hidden dispatch key input.
    pub async fn dispatch(&self, context: &RequestContext) -> ContactFormResponse {
        let key = context
            .data
            .non_blank(ACTION_FIELD_NAME)
            .or_else(|| context.data.non_blank(AJAX_KEY_FIELD_NAME))
            .unwrap_or_default();
        let Some(form) = self.form_by_dispatch_key(key) else {
            let error = ContactFormError::UnknownForm(key.into());
            error.log();
            return error.into_response();
        };
        RequestHandler::new(form, &self.dispatcher)
            .handle(context)
            .await
    }

    pub fn router(self) -> Router {
        let endpoint = self.endpoint.clone();
        Router::new()
            .route(&endpoint, post(submit::<M>))
            .route("/forms/:id", get(render_form::<M>))
            .route(FORM_SCRIPT_PATH, get(form_script))
            .with_state(Arc::new(self))
    }
}

async fn submit<M: MailDispatch + 'static>(
    State(service): State<Arc<ContactFormService<M>>>,
    headers: HeaderMap,
    form: Result<Form<SubmittedData>, FormRejection>,
) -> ContactFormResponse {
    let data = match form {
        Ok(Form(data)) => data,
        Err(rejection) => {
            warn!("Rejected undecodable contact form submission: {rejection}");
            return ContactFormResponse::malformed();
        }
    };
    let host = headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .map(String::from);
    service.dispatch(&RequestContext::new(host, data)).await
}

async fn render_form<M: MailDispatch + 'static>(
    State(service): State<Arc<ContactFormService<M>>>,
    Path(id): Path<String>,
) -> Response {
    let Some(form) = service.form_by_id(&id) else {
        return (StatusCode::NOT_FOUND, "Unknown form").into_response();
    };
    match form.render(service.endpoint()) {
        Ok(markup) => Html(markup).into_response(),
        Err(render_error) => {
            error!("Unable to render contact form {id}: {render_error}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn form_script() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/javascript; charset=utf-8")],
        FORM_SCRIPT,
    )
}
