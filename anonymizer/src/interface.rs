//! Anonymizer public interface
//!
//! Shared types, error enums and the collaborator traits the batch iterator,
//! generator and merge step are written against.

use std::collections::BTreeSet;
use std::fmt;

use thiserror::Error;

use crate::models::IdentityBundle;

/// Primary key of a user or comment row
pub type RecordId = i64;

// ═══════════════════════════════════════════════════════════════════════════════
// ENUMS
// ═══════════════════════════════════════════════════════════════════════════════

/// Which collection of identity records is being anonymized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    User,
    Comment,
}

impl RecordKind {
    pub fn label(&self) -> &'static str {
        match self {
            RecordKind::User => "user",
            RecordKind::Comment => "comment",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RECORDS (Structs)
// ═══════════════════════════════════════════════════════════════════════════════

/// One page request against the record store.
///
/// Exclusions are applied by the store's query, so a short or empty page
/// always reflects the remaining data rather than filtered-out rows.
#[derive(Debug, Clone, Copy)]
pub struct PageQuery<'a> {
    pub excluded: &'a BTreeSet<RecordId>,
    pub offset: u64,
    pub limit: u64,
}

/// Per-call options for a user update
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Write `user_login` even though the regular update path treats it as immutable.
    /// Scoped to the single call it is passed to.
    pub override_login: bool,
}

impl UpdateOptions {
    pub fn force_login() -> Self {
        Self { override_login: true }
    }
}

/// Result of visiting one record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    Updated { id: RecordId },
    Failed { id: RecordId, reason: String },
}

impl RecordOutcome {
    pub fn id(&self) -> RecordId {
        match self {
            RecordOutcome::Updated { id } | RecordOutcome::Failed { id, .. } => *id,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RecordOutcome::Updated { .. })
    }
}

/// Totals for one complete pass over a collection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    /// Pages fetched, including the terminating empty page
    pub pages: u64,
    pub visited: u64,
    pub succeeded: u64,
    pub failed: u64,
}

impl Summary {
    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ERRORS
// ═══════════════════════════════════════════════════════════════════════════════

/// Fatal errors: any of these halts the run
#[derive(Debug, Error)]
pub enum AnonymizerError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Word list '{name}' unusable: {reason}")]
    WordList { name: String, reason: String },
    #[error("No adjective starts with '{initial}' (last name '{last_name}')")]
    NoAlliterativeMatch { initial: char, last_name: String },
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("{0}")]
    PluginInactive(String),
}

/// Per-record failure reported by the store. Counted and skipped, never fatal.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("record {0} not found")]
    NotFound(RecordId),
    #[error("uniqueness conflict: {0}")]
    Conflict(String),
    #[error("invalid data: {0}")]
    Invalid(String),
    #[error("store rejected update: {0}")]
    Store(String),
}

impl From<crate::database::DatabaseError> for AnonymizerError {
    fn from(e: crate::database::DatabaseError) -> Self {
        AnonymizerError::DatabaseError(e.to_string())
    }
}

impl From<crate::database::DatabaseError> for RecordError {
    fn from(e: crate::database::DatabaseError) -> Self {
        use crate::database::DatabaseError;
        match e {
            DatabaseError::NotFound(id) => RecordError::NotFound(id),
            DatabaseError::Sqlite(rusqlite::Error::SqliteFailure(code, msg))
                if code.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                RecordError::Conflict(msg.unwrap_or_else(|| code.to_string()))
            }
            other => RecordError::Store(other.to_string()),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// COLLABORATORS
// ═══════════════════════════════════════════════════════════════════════════════

/// Paginated read and per-record update access to identity records.
pub trait RecordStore {
    /// IDs of `kind` in ascending order, skipping `query.excluded`.
    fn fetch_ids(&self, kind: RecordKind, query: &PageQuery<'_>) -> Result<Vec<RecordId>, AnonymizerError>;

    fn update_user(&self, id: RecordId, bundle: &IdentityBundle, options: UpdateOptions) -> Result<(), RecordError>;

    fn update_comment(&self, id: RecordId, bundle: &IdentityBundle) -> Result<(), RecordError>;
}

/// Source of named word lists ("adjectives", "nouns")
pub trait WordListSource {
    fn load(&self, name: &str) -> Result<Vec<String>, AnonymizerError>;
}

/// Host-configured contact-method keys (each one is blanked on anonymization)
pub trait ContactMethodRegistry {
    fn contact_methods(&self) -> Vec<String>;
}

impl ContactMethodRegistry for Vec<String> {
    fn contact_methods(&self) -> Vec<String> {
        self.clone()
    }
}

impl ContactMethodRegistry for [&str] {
    fn contact_methods(&self) -> Vec<String> {
        self.iter().map(|s| s.to_string()).collect()
    }
}
