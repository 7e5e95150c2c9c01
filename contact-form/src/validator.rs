use crate::{
    registry::{Field, FieldType},
    request::SubmittedData,
};
use lettre::Address;
use regex::Regex;
use serde::Serialize;
use std::{collections::BTreeMap, sync::LazyLock};

/// Ten digits starting with 0, optionally spaced in pairs: `01 23 45 67 89`.
static PHONE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^0[1-9](?:\s?[0-9]{2}){4}$").unwrap());

/// Field names with an error, each flagged with `1` on the wire.
#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, u8>);

impl ValidationErrors {
    pub fn add(&mut self, name: impl Into<String>) {
        self.0.insert(name.into(), 1);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

pub struct Validator<'a> {
    data: &'a SubmittedData,
    errors: ValidationErrors,
}

impl<'a> Validator<'a> {
    pub fn new(data: &'a SubmittedData) -> Self {
        Self {
            data,
            errors: ValidationErrors::default(),
        }
    }

    pub fn check<'f>(&mut self, fields: impl IntoIterator<Item = &'f Field>) {
        for field in fields {
            self.check_field(field);
        }
    }

    /// Only fields carrying a `required` option are checked, including
    /// `required: false`, which still enables the format check.
    fn check_field(&mut self, field: &Field) {
        let Some(required) = field.options.required.as_ref() else {
            return;
        };
        let data = self.data;
        let value = data.non_blank(&field.name);
        let alias_is_blank = required.alias().map_or(true, |alias| data.is_blank(alias));
        if required.is_required() && value.is_none() && alias_is_blank {
            self.errors.add(&field.name);
            return;
        }
        let Some(value) = value else {
            return;
        };
        let is_valid = match field.field_type {
            FieldType::Email => is_email(value),
            FieldType::Tel => is_phone(value),
            _ => true,
        };
        if !is_valid {
            self.errors.add(&field.name);
        }
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn is_field_valid(&self, name: &str) -> bool {
        !self.errors.contains(name)
    }

    pub fn errors(&self) -> &ValidationErrors {
        &self.errors
    }

    pub fn into_errors(self) -> ValidationErrors {
        self.errors
    }
}

pub fn is_email(value: &str) -> bool {
    value.parse::<Address>().is_ok()
}

pub fn is_phone(value: &str) -> bool {
    PHONE_REGEX.is_match(value)
}
