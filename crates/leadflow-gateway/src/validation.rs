// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Structured lead body validation.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};

use leadflow_core::ContactFields;

static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email pattern"));

/// Optional free-text fields accepted alongside `name` and `email`.
const OPTIONAL_TEXT: [&str; 6] = ["phone", "company", "role", "address", "city", "notes"];

/// One rejected field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    fn new(field: &str, message: &str) -> Self {
        Self {
            field: field.to_string(),
            message: message.to_string(),
        }
    }
}

/// A body that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct LeadSubmission {
    pub fields: ContactFields,
    /// `source` from the body, if given.
    pub source: Option<String>,
    /// The body exactly as submitted, unknown keys included.
    pub raw: Value,
}

/// Read an optional string. `null` counts as absent.
fn optional_str<'a>(
    body: &'a Map<String, Value>,
    field: &str,
    errors: &mut Vec<FieldError>,
) -> Option<&'a str> {
    match body.get(field) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.as_str()),
        Some(_) => {
            errors.push(FieldError::new(field, "must be a string"));
            None
        }
    }
}

fn non_empty(s: Option<&str>) -> Option<String> {
    s.filter(|s| !s.trim().is_empty()).map(str::to_string)
}

/// Check a decoded request body, collecting every field error.
pub fn validate(body: Value) -> Result<LeadSubmission, Vec<FieldError>> {
    let Value::Object(map) = &body else {
        return Err(vec![FieldError::new("body", "must be a JSON object")]);
    };
    let mut errors = Vec::new();

    let name = match map.get("name") {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        Some(Value::String(_)) | None | Some(Value::Null) => {
            errors.push(FieldError::new("name", "is required"));
            String::new()
        }
        Some(_) => {
            errors.push(FieldError::new("name", "must be a string"));
            String::new()
        }
    };

    let email = optional_str(map, "email", &mut errors);
    if email.is_some_and(|e| !e.is_empty() && !EMAIL.is_match(e)) {
        errors.push(FieldError::new("email", "must be a valid email address"));
    }

    let source = optional_str(map, "source", &mut errors);
    if source.is_some_and(str::is_empty) {
        errors.push(FieldError::new("source", "must not be empty"));
    }

    let text = OPTIONAL_TEXT.map(|field| optional_str(map, field, &mut errors));

    if !errors.is_empty() {
        return Err(errors);
    }

    let [phone, company, role, address, city, _notes] = text;
    let fields = ContactFields {
        name,
        email: non_empty(email),
        phone: non_empty(phone),
        company: non_empty(company),
        role: non_empty(role),
        address: non_empty(address),
        city: non_empty(city),
    };
    let source = non_empty(source);

    Ok(LeadSubmission {
        fields,
        source,
        raw: body,
    })
}
