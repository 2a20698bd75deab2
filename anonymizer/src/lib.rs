//! Anonymizer Core - replaces personal data in a CMS database with fabricated identities
//!
//! Users and comment authors are visited in ID-ordered pages and each one is given a
//! fresh adjective + noun identity ("Hazy Heron", `hazyheron…@example.com`).
//! The bulk deletes for signups, activity logs and form entries live in [`admin`].

pub mod admin;
pub mod anonymize;
pub mod batch;
pub mod database;
pub mod generator;
pub mod interface;
pub mod models;
mod store;
pub mod words;

pub use anonymize::{anonymize_all, anonymize_comment, anonymize_user};
pub use batch::{BatchIterator, VisitError, DEFAULT_BATCH_SIZE, MAX_BATCH_SIZE};
pub use database::{Database, TablePrefix};
pub use generator::{IdentityGenerator, LoginSuffix};
pub use interface::*;
pub use models::{Field, IdentityBundle};
pub use words::{BundledSource, DirectorySource, WordLists};
