use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// HTML input type of a field. Types without dedicated handling keep their
/// name and render as a plain `<input>`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(from = "String", into = "String")]
pub enum FieldType {
    Text,
    Email,
    Tel,
    Textarea,
    Other(String),
}

impl FieldType {
    pub fn as_str(&self) -> &str {
        match self {
            FieldType::Text => "text",
            FieldType::Email => "email",
            FieldType::Tel => "tel",
            FieldType::Textarea => "textarea",
            FieldType::Other(name) => name,
        }
    }
}

impl From<String> for FieldType {
    fn from(name: String) -> Self {
        match name.as_str() {
            "text" => FieldType::Text,
            "email" => FieldType::Email,
            "tel" => FieldType::Tel,
            "textarea" => FieldType::Textarea,
            _ => FieldType::Other(name),
        }
    }
}

impl From<&str> for FieldType {
    fn from(name: &str) -> Self {
        FieldType::from(name.to_string())
    }
}

impl From<FieldType> for String {
    fn from(field_type: FieldType) -> Self {
        field_type.as_str().into()
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The `required` option: either a plain flag or the name of another key
/// whose presence also satisfies the requirement (for compound inputs).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum Required {
    Flag(bool),
    Alias(String),
}

impl Required {
    pub fn is_required(&self) -> bool {
        !matches!(self, Required::Flag(false))
    }

    pub fn alias(&self) -> Option<&str> {
        match self {
            Required::Alias(key) => Some(key),
            Required::Flag(_) => None,
        }
    }

    /// Only a literal `true` becomes the HTML `required` attribute.
    pub fn is_html_required(&self) -> bool {
        matches!(self, Required::Flag(true))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct FieldOptions {
    pub required: Option<Required>,
    pub default: Option<String>,
    pub pattern: Option<String>,
    /// Markup around the field; `%field` marks the insertion point.
    pub wrapper: Option<String>,
    pub label_class: Option<String>,
    pub input_class: Option<String>,
    pub placeholder: Option<String>,
    pub rows: Option<u32>,
}

impl FieldOptions {
    pub fn is_required(&self) -> bool {
        self.required.as_ref().is_some_and(Required::is_required)
    }

    pub fn required(self) -> Self {
        Self {
            required: Some(Required::Flag(true)),
            ..self
        }
    }

    pub fn required_with(self, alias: impl Into<String>) -> Self {
        Self {
            required: Some(Required::Alias(alias.into())),
            ..self
        }
    }

    pub fn with_default(self, default: impl Into<String>) -> Self {
        Self {
            default: Some(default.into()),
            ..self
        }
    }

    pub fn with_pattern(self, pattern: impl Into<String>) -> Self {
        Self {
            pattern: Some(pattern.into()),
            ..self
        }
    }

    pub fn with_wrapper(self, wrapper: impl Into<String>) -> Self {
        Self {
            wrapper: Some(wrapper.into()),
            ..self
        }
    }

    pub fn with_label_class(self, class: impl Into<String>) -> Self {
        Self {
            label_class: Some(class.into()),
            ..self
        }
    }

    pub fn with_input_class(self, class: impl Into<String>) -> Self {
        Self {
            input_class: Some(class.into()),
            ..self
        }
    }

    pub fn with_placeholder(self, placeholder: impl Into<String>) -> Self {
        Self {
            placeholder: Some(placeholder.into()),
            ..self
        }
    }

    pub fn with_rows(self, rows: u32) -> Self {
        Self {
            rows: Some(rows),
            ..self
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Field {
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub name: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub options: FieldOptions,
}

impl Field {
    pub fn new(field_type: impl Into<FieldType>, name: impl Into<String>) -> Self {
        Self {
            field_type: field_type.into(),
            name: name.into(),
            label: None,
            options: FieldOptions::default(),
        }
    }

    pub fn with_label(self, label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            ..self
        }
    }

    pub fn with_options(self, options: FieldOptions) -> Self {
        Self { options, ..self }
    }
}

/// Fields rendered together inside one wrapper; `%fields` marks the
/// insertion point.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub wrapper: String,
    pub fields: Vec<Field>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct ButtonOptions {
    pub class: Option<String>,
    /// Markup around the button; `%button` marks the insertion point.
    pub wrapper: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Button {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub options: ButtonOptions,
}

impl Button {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            options: ButtonOptions::default(),
        }
    }

    pub fn with_class(self, class: impl Into<String>) -> Self {
        Self {
            options: ButtonOptions {
                class: Some(class.into()),
                ..self.options
            },
            ..self
        }
    }

    pub fn with_wrapper(self, wrapper: impl Into<String>) -> Self {
        Self {
            options: ButtonOptions {
                wrapper: Some(wrapper.into()),
                ..self.options
            },
            ..self
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum FormEntry {
    Field(Field),
    Group(Group),
    Button(Button),
}

/// Field, group and button definitions of a form, in the order they were
/// added.
#[derive(Debug, Clone, Default)]
pub struct FieldRegistry {
    entries: Vec<FormEntry>,
    grouped: HashSet<String>,
}

impl FieldRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a data field and returns a copy of it for use in
    /// [`FieldRegistry::group_fields`].
    pub fn add_field(&mut self, field: Field) -> Result<Field, RegistryError> {
        if self.data_fields().any(|existing| existing.name == field.name) {
            return Err(RegistryError::DuplicateField(field.name));
        }
        self.entries.push(FormEntry::Field(field.clone()));
        Ok(field)
    }

    /// Renders the given fields together at this position. Top-level entries
    /// for these fields are then skipped when rendering.
    pub fn group_fields(&mut self, wrapper: impl Into<String>, fields: Vec<Field>) {
        self.grouped
            .extend(fields.iter().map(|field| field.name.clone()));
        self.entries.push(FormEntry::Group(Group {
            wrapper: wrapper.into(),
            fields,
        }));
    }

    pub fn add_button(&mut self, button: Button) {
        self.entries.push(FormEntry::Button(button));
    }

    pub fn entries(&self) -> &[FormEntry] {
        &self.entries
    }

    pub fn is_grouped(&self, name: &str) -> bool {
        self.grouped.contains(name)
    }

    /// The fields whose values are validated and mailed.
    pub fn data_fields(&self) -> impl Iterator<Item = &Field> {
        self.entries.iter().filter_map(|entry| match entry {
            FormEntry::Field(field) => Some(field),
            FormEntry::Group(_) | FormEntry::Button(_) => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    DuplicateField(String),
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::DuplicateField(name) => write!(f, "Duplicate field {name}"),
        }
    }
}

impl std::error::Error for RegistryError {}
