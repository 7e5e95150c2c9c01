use crate::{
    registry::{Button, Field, FieldRegistry, FieldType, FormEntry, Group},
    security::{SecurityFields, SecurityHelper},
};
use serde::{Deserialize, Serialize};
use tinytemplate::{error::Error, TinyTemplate};

const FORM_TEMPLATE_NAME: &str = "form";
const FORM_TEMPLATE: &str = r#"<form id="{id}" class="form-contact{{ if class }} {class}{{ endif }}" data-endpoint="{endpoint}">{security | unescaped}{entries | unescaped}</form>"#;
const SECURITY_TEMPLATE_NAME: &str = "security";
const SECURITY_TEMPLATE: &str = r#"<input type="hidden" id="{nonce_field}" name="{nonce_field}" value="{nonce}"><input type="text" name="{honeypot_field}" class="form-contact-honeypot" tabindex="-1" autocomplete="off"><input type="hidden" name="{ajax_key_field}" value="{ajax_key}">"#;
const LABEL_TEMPLATE_NAME: &str = "label";
const LABEL_TEMPLATE: &str =
    r#"<label{{ if class }} class="{class}"{{ endif }} for="{target}">{label}</label>"#;
const INPUT_TEMPLATE_NAME: &str = "input";
const INPUT_TEMPLATE: &str = r#"<input{{ if class }} class="{class}"{{ endif }} type="{field_type}" name="{name}" id="{target}"{{ if pattern }} pattern="{pattern}"{{ endif }}{{ if placeholder }} placeholder="{placeholder}"{{ endif }}{{ if value }} value="{value}"{{ endif }}{{ if required }} required{{ endif }}>"#;
const TEXTAREA_TEMPLATE_NAME: &str = "textarea";
const TEXTAREA_TEMPLATE: &str = r#"<textarea{{ if class }} class="{class}"{{ endif }} name="{name}" id="{target}"{{ if placeholder }} placeholder="{placeholder}"{{ endif }}{{ if rows }} rows="{rows}"{{ endif }}{{ if required }} required{{ endif }}>{{ if value }}{value}{{ endif }}</textarea>"#;
const BUTTON_TEMPLATE_NAME: &str = "button";
const BUTTON_TEMPLATE: &str = r#"<button id="{id}-button" class="{class}" type="submit">{title}<div id="{id}-loader" class="form-contact-loader"><span class="form-contact-spinner"></span></div><div id="{id}-success" class="form-contact-success">&check;</div></button>"#;

const BUTTON_CLASS: &str = "form-contact-button";
const DEFAULT_BUTTON_TITLE: &str = "→";

/// Presentation options of the `<form>` element itself.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct FormOptions {
    pub class: Option<String>,
}

#[derive(Serialize)]
struct FormContext<'a> {
    id: &'a str,
    class: Option<&'a str>,
    endpoint: &'a str,
    security: String,
    entries: String,
}

#[derive(Serialize)]
struct SecurityContext<'a> {
    nonce_field: &'a str,
    nonce: &'a str,
    honeypot_field: &'a str,
    ajax_key_field: &'a str,
    ajax_key: &'a str,
}

impl<'a> From<&'a SecurityFields> for SecurityContext<'a> {
    fn from(fields: &'a SecurityFields) -> Self {
        Self {
            nonce_field: &fields.nonce_field,
            nonce: &fields.nonce,
            honeypot_field: fields.honeypot_field,
            ajax_key_field: fields.ajax_key_field,
            ajax_key: &fields.ajax_key,
        }
    }
}

#[derive(Serialize)]
struct LabelContext<'a> {
    class: Option<&'a str>,
    target: &'a str,
    label: &'a str,
}

#[derive(Serialize)]
struct InputContext<'a> {
    class: Option<&'a str>,
    field_type: &'a str,
    name: &'a str,
    target: &'a str,
    pattern: Option<&'a str>,
    placeholder: Option<&'a str>,
    rows: Option<u32>,
    value: Option<&'a str>,
    required: bool,
}

#[derive(Serialize)]
struct ButtonContext<'a> {
    id: &'a str,
    class: String,
    title: &'a str,
}

/// Turns a form's registry into markup.
pub struct Renderer<'a> {
    form_id: &'a str,
    options: &'a FormOptions,
    registry: &'a FieldRegistry,
    security: &'a SecurityHelper,
}

impl<'a> Renderer<'a> {
    pub fn new(
        form_id: &'a str,
        options: &'a FormOptions,
        registry: &'a FieldRegistry,
        security: &'a SecurityHelper,
    ) -> Self {
        Self {
            form_id,
            options,
            registry,
            security,
        }
    }

    /// Renders the complete form; `endpoint` is where the script posts it.
    pub fn render(&self, endpoint: &str) -> Result<String, RenderError> {
        let tt = templates()?;
        let security_fields = self.security.security_fields();
        let security = tt.render(
            SECURITY_TEMPLATE_NAME,
            &SecurityContext::from(&security_fields),
        )?;
        let mut entries = String::new();
        for entry in self.registry.entries() {
            match entry {
                FormEntry::Field(field) if self.registry.is_grouped(&field.name) => {}
                FormEntry::Field(field) => entries.push_str(&self.render_field(&tt, field)?),
                FormEntry::Group(group) => entries.push_str(&self.render_group(&tt, group)?),
                FormEntry::Button(button) => entries.push_str(&self.render_button(&tt, button)?),
            }
        }
        Ok(tt.render(
            FORM_TEMPLATE_NAME,
            &FormContext {
                id: self.form_id,
                class: self.options.class.as_deref(),
                endpoint,
                security,
                entries,
            },
        )?)
    }

    fn render_field(&self, tt: &TinyTemplate, field: &Field) -> Result<String, RenderError> {
        let options = &field.options;
        let target = format!("{}-{}", self.form_id, field.name);
        let context = InputContext {
            class: options.input_class.as_deref(),
            field_type: field.field_type.as_str(),
            name: &field.name,
            target: &target,
            pattern: options.pattern.as_deref(),
            placeholder: options.placeholder.as_deref(),
            rows: options.rows,
            value: options.default.as_deref(),
            required: options
                .required
                .as_ref()
                .is_some_and(|required| required.is_html_required()),
        };
        let template = match field.field_type {
            FieldType::Textarea => TEXTAREA_TEMPLATE_NAME,
            _ => INPUT_TEMPLATE_NAME,
        };
        let mut html = tt.render(template, &context)?;
        if let Some(label) = field.label.as_deref().filter(|label| !label.is_empty()) {
            let label = tt.render(
                LABEL_TEMPLATE_NAME,
                &LabelContext {
                    class: options.label_class.as_deref(),
                    target: &target,
                    label,
                },
            )?;
            html.insert_str(0, &label);
        }
        Ok(match options.wrapper.as_deref() {
            Some(wrapper) => wrapper.replace("%field", &html),
            None => html,
        })
    }

    fn render_group(&self, tt: &TinyTemplate, group: &Group) -> Result<String, RenderError> {
        let mut html = String::new();
        for field in &group.fields {
            html.push_str(&self.render_field(tt, field)?);
        }
        Ok(group.wrapper.replace("%fields", &html))
    }

    fn render_button(&self, tt: &TinyTemplate, button: &Button) -> Result<String, RenderError> {
        let class = match button.options.class.as_deref() {
            Some(class) => format!("{class} {BUTTON_CLASS}").trim().to_string(),
            None => BUTTON_CLASS.to_string(),
        };
        let html = tt.render(
            BUTTON_TEMPLATE_NAME,
            &ButtonContext {
                id: self.form_id,
                class,
                title: button
                    .title
                    .as_deref()
                    .filter(|title| !title.is_empty())
                    .unwrap_or(DEFAULT_BUTTON_TITLE),
            },
        )?;
        Ok(match button.options.wrapper.as_deref() {
            Some(wrapper) => wrapper.replace("%button", &html),
            None => html,
        })
    }
}

fn templates() -> Result<TinyTemplate<'static>, RenderError> {
    let mut tt = TinyTemplate::new();
    tt.add_template(FORM_TEMPLATE_NAME, FORM_TEMPLATE)?;
    tt.add_template(SECURITY_TEMPLATE_NAME, SECURITY_TEMPLATE)?;
    tt.add_template(LABEL_TEMPLATE_NAME, LABEL_TEMPLATE)?;
    tt.add_template(INPUT_TEMPLATE_NAME, INPUT_TEMPLATE)?;
    tt.add_template(TEXTAREA_TEMPLATE_NAME, TEXTAREA_TEMPLATE)?;
    tt.add_template(BUTTON_TEMPLATE_NAME, BUTTON_TEMPLATE)?;
    Ok(tt)
}

#[derive(Debug)]
pub struct RenderError(Error);

impl From<Error> for RenderError {
    fn from(error: Error) -> Self {
        Self(error)
    }
}

impl std::fmt::Display for RenderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Error rendering form: {}", self.0)
    }
}

impl std::error::Error for RenderError {}
