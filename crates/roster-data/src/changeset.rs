//! Rider attribute changesets.
//!
//! [`RiderAttrs`] carries untrusted input. [`RiderAttrs::apply`] casts and
//! normalises it onto an optional base rider and reports every problem at once
//! as [`ValidationErrors`]. Uniqueness is checked by the store, which alone can
//! see the other rows.
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{model::Rider, phone::canonical_phone};

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+$").expect("email pattern is valid"));

const MAX_NAME_LEN: usize = 255;

pub const BLANK: &str = "can't be blank";
pub const INVALID_FORMAT: &str = "has invalid format";
pub const TAKEN: &str = "has already been taken";

/// Attributes supplied for creating or updating a rider. `None` means
/// "not supplied": required on create, unchanged on update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiderAttrs {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl RiderAttrs {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    /// Cast these attributes over `base` (or nothing, on create) into a
    /// candidate rider carrying `id`.
    pub fn apply(&self, base: Option<&Rider>, id: u64) -> Result<Rider, ValidationErrors> {
        let mut errors = ValidationErrors::default();

        let name = match (&self.name, base) {
            (Some(name), _) => {
                let name = name.trim();
                if name.is_empty() {
                    errors.add("name", BLANK);
                } else if name.chars().count() > MAX_NAME_LEN {
                    errors.add(
                        "name",
                        format!("should be at most {MAX_NAME_LEN} character(s)"),
                    );
                }
                name.to_string()
            }
            (None, Some(base)) => base.name.clone(),
            (None, None) => {
                errors.add("name", BLANK);
                String::new()
            }
        };

        let email = match (&self.email, base) {
            (Some(email), _) => {
                let email = email.trim().to_lowercase();
                if email.is_empty() {
                    errors.add("email", BLANK);
                } else if !EMAIL_RE.is_match(&email) {
                    errors.add("email", INVALID_FORMAT);
                }
                email
            }
            (None, Some(base)) => base.email.clone(),
            (None, None) => {
                errors.add("email", BLANK);
                String::new()
            }
        };

        let phone = match (&self.phone, base) {
            (Some(phone), _) if phone.trim().is_empty() => {
                errors.add("phone", BLANK);
                String::new()
            }
            (Some(phone), _) => canonical_phone(phone).unwrap_or_else(|e| {
                errors.add("phone", e.to_string());
                String::new()
            }),
            (None, Some(base)) => base.phone.clone(),
            (None, None) => {
                errors.add("phone", BLANK);
                String::new()
            }
        };

        if errors.is_empty() {
            Ok(Rider {
                id,
                name,
                email,
                phone,
            })
        } else {
            Err(errors)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

/// Every problem found with a changeset, in field order. Serialize-only: field
/// names are the changeset's own static names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationErrors {
    errors: Vec<FieldError>,
}

impl ValidationErrors {
    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.errors.push(FieldError {
            field,
            message: message.into(),
        });
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Messages recorded against `field`.
    #[must_use]
    pub fn on(&self, field: &str) -> Vec<&str> {
        self.errors
            .iter()
            .filter(|e| e.field == field)
            .map(|e| e.message.as_str())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldError> {
        self.errors.iter()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, e) in self.errors.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}: {}", e.field, e.message)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}
