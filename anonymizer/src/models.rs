//! Core data models for the anonymizer
//!
//! `IdentityBundle` is the ephemeral value that the generator produces and the
//! record store consumes. It is never persisted on its own.

use std::collections::BTreeMap;
use std::fmt;

// ─────────────────────────────────────────────────────────────────────────────
// FIELDS
// ─────────────────────────────────────────────────────────────────────────────

/// A named identity field on a generated bundle
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Field {
    Login,
    Password,
    Nicename,
    Email,
    Url,
    DisplayName,
    FirstName,
    LastName,
    Nickname,
    Description,
}

impl Field {
    pub const ALL: [Field; 10] = [
        Field::Login,
        Field::Password,
        Field::Nicename,
        Field::Email,
        Field::Url,
        Field::DisplayName,
        Field::FirstName,
        Field::LastName,
        Field::Nickname,
        Field::Description,
    ];

    /// Stable key used in progress output and by transforms
    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Login => "user_login",
            Field::Password => "user_pass",
            Field::Nicename => "user_nicename",
            Field::Email => "user_email",
            Field::Url => "user_url",
            Field::DisplayName => "display_name",
            Field::FirstName => "first_name",
            Field::LastName => "last_name",
            Field::Nickname => "nickname",
            Field::Description => "description",
        }
    }

    pub fn from_key(key: &str) -> Option<Field> {
        Field::ALL.iter().copied().find(|f| f.as_str() == key)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// IDENTITY BUNDLE
// ─────────────────────────────────────────────────────────────────────────────

/// Replacement identity for a single record.
///
/// `fields` holds the core identity columns; `meta` holds contact-method keys
/// (always empty strings) plus anything a transform chooses to add.
/// Transforms may add, override or remove entries in either map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityBundle {
    pub fields: BTreeMap<Field, String>,
    pub meta: BTreeMap<String, String>,
}

impl IdentityBundle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, field: Field) -> Option<&str> {
        self.fields.get(&field).map(String::as_str)
    }

    pub fn set(&mut self, field: Field, value: impl Into<String>) -> &mut Self {
        self.fields.insert(field, value.into());
        self
    }

    pub fn remove(&mut self, field: Field) -> Option<String> {
        self.fields.remove(&field)
    }

    pub fn set_meta(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    pub fn login(&self) -> Option<&str> {
        self.get(Field::Login)
    }

    pub fn email(&self) -> Option<&str> {
        self.get(Field::Email)
    }

    pub fn url(&self) -> Option<&str> {
        self.get(Field::Url)
    }

    pub fn display_name(&self) -> Option<&str> {
        self.get(Field::DisplayName)
    }
}
