use crate::{
    form::ContactForm,
    registry::{Field, FormEntry},
    render::FormOptions,
    security::NonceSigner,
};
use anyhow::{bail, Context};
use lettre::message::Mailbox;
use serde::Deserialize;

const DEFAULT_ENDPOINT: &str = "/contact";
const BUNDLED_FORMS: &str = include_str!("../assets/forms.json");

/// Process settings read from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Where rendered forms post their submissions.
    pub endpoint: String,
    /// Address to listen on. Without it the service runs as a Lambda function.
    pub listen: Option<String>,
    pub forms_config: Option<String>,
}

impl Settings {
    pub fn from_env() -> Self {
        Self {
            endpoint: std::env::var("CONTACT_FORM_ENDPOINT")
                .unwrap_or_else(|_| DEFAULT_ENDPOINT.into()),
            listen: std::env::var("CONTACT_FORM_LISTEN").ok(),
            forms_config: std::env::var("CONTACT_FORMS_CONFIG").ok(),
        }
    }

    /// Reads the configured form definitions, or the bundled ones when no
    /// path is set.
    pub fn load_forms(&self) -> anyhow::Result<FormsConfig> {
        match self.forms_config.as_deref() {
            Some(path) => {
                let contents = std::fs::read_to_string(path)
                    .with_context(|| format!("Reading form definitions from {path}"))?;
                FormsConfig::parse(&contents)
                    .with_context(|| format!("Parsing form definitions in {path}"))
            }
            None => FormsConfig::parse(BUNDLED_FORMS).context("Parsing bundled form definitions"),
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct FormsConfig {
    pub forms: Vec<FormDefinition>,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct FormDefinition {
    pub id: String,
    pub receiver: String,
    #[serde(default)]
    pub options: FormOptions,
    #[serde(default)]
    pub entries: Vec<FormEntry>,
}

impl FormsConfig {
    pub fn parse(contents: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(contents)?)
    }

    pub fn build(&self, signer: &NonceSigner) -> anyhow::Result<Vec<ContactForm>> {
        let mut forms: Vec<ContactForm> = Vec::with_capacity(self.forms.len());
        for definition in &self.forms {
            if forms.iter().any(|form| form.id() == definition.id) {
                bail!("Duplicate form {}", definition.id);
            }
            forms.push(
                definition
                    .build(signer)
                    .with_context(|| format!("Building form {}", definition.id))?,
            );
        }
        Ok(forms)
    }
}

impl FormDefinition {
    fn build(&self, signer: &NonceSigner) -> anyhow::Result<ContactForm> {
        self.receiver
            .parse::<Mailbox>()
            .with_context(|| format!("Invalid receiver {}", self.receiver))?;
        let mut form = ContactForm::new(&self.id, &self.receiver, signer.clone())
            .with_options(self.options.clone());
        for entry in &self.entries {
            match entry {
                FormEntry::Field(field) => {
                    form.add_field(field.clone())?;
                }
                FormEntry::Group(group) => {
                    let fields = group
                        .fields
                        .iter()
                        .map(|field| form.add_field(field.clone()))
                        .collect::<Result<Vec<Field>, _>>()?;
                    form.group_fields(group.wrapper.clone(), fields);
                }
                FormEntry::Button(button) => form.add_button(button.clone()),
            }
        }
        Ok(form)
    }
}

#[cfg(test)]
mod tests {
    use super::{FormsConfig, Settings, BUNDLED_FORMS};
    use crate::{registry::FormEntry, security::NonceSigner};
    use googletest::prelude::*;

    fn signer() -> NonceSigner {
        NonceSigner::new("arbitrary key")
    }

    #[test]
    fn bundled_forms_build() -> Result<()> {
        let forms = FormsConfig::parse(BUNDLED_FORMS)
            .unwrap()
            .build(&signer())
            .unwrap();

        verify_that!(
            forms.iter().map(|form| form.id()).collect::<Vec<_>>(),
            contains(eq("contact"))
        )
    }

    #[test]
    fn adds_group_fields_as_data_fields() -> Result<()> {
        let config = FormsConfig::parse(
            r#"{"forms": [{
                "id": "contact",
                "receiver": "owner@example.com",
                "entries": [
                    {"kind": "group", "wrapper": "<div>%fields</div>", "fields": [
                        {"type": "text", "name": "firstname"},
                        {"type": "text", "name": "lastname"}
                    ]},
                    {"kind": "field", "type": "email", "name": "email"},
                    {"kind": "button", "title": "Send"}
                ]
            }]}"#,
        )
        .unwrap();

        let forms = config.build(&signer()).unwrap();
        let registry = forms[0].registry();
        let names: Vec<&str> = registry.data_fields().map(|f| f.name.as_str()).collect();

        verify_that!(names, eq(vec!["firstname", "lastname", "email"]))?;
        verify_that!(registry.is_grouped("lastname"), eq(true))?;
        verify_that!(
            matches!(registry.entries().last(), Some(FormEntry::Button(_))),
            eq(true)
        )
    }

    #[test]
    fn rejects_invalid_receiver() -> Result<()> {
        let config = FormsConfig::parse(
            r#"{"forms": [{"id": "contact", "receiver": "nobody", "entries": []}]}"#,
        )
        .unwrap();

        verify_that!(config.build(&signer()).is_err(), eq(true))
    }

    #[test]
    fn rejects_duplicate_field_names() -> Result<()> {
        let config = FormsConfig::parse(
            r#"{"forms": [{"id": "contact", "receiver": "owner@example.com", "entries": [
                {"kind": "field", "type": "text", "name": "name"},
                {"kind": "field", "type": "text", "name": "name"}
            ]}]}"#,
        )
        .unwrap();

        verify_that!(config.build(&signer()).is_err(), eq(true))
    }

    #[test]
    fn rejects_duplicate_form_ids() -> Result<()> {
        let config = FormsConfig::parse(
            r#"{"forms": [
                {"id": "contact", "receiver": "owner@example.com"},
                {"id": "contact", "receiver": "owner@example.com"}
            ]}"#,
        )
        .unwrap();

        verify_that!(config.build(&signer()).is_err(), eq(true))
    }

    #[test]
    fn reports_unreadable_config_path() -> Result<()> {
        let settings = Settings {
            endpoint: "/contact".into(),
            listen: None,
            forms_config: Some("/nonexistent/forms.json".into()),
        };

        verify_that!(settings.load_forms().is_err(), eq(true))
    }
}
