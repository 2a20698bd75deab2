//! `RecordStore` backed by the SQLite database

use crate::database::Database;
use crate::interface::{AnonymizerError, PageQuery, RecordError, RecordId, RecordKind, RecordStore, UpdateOptions};
use crate::models::IdentityBundle;

impl RecordStore for Database {
    fn fetch_ids(&self, kind: RecordKind, query: &PageQuery<'_>) -> Result<Vec<RecordId>, AnonymizerError> {
        Ok(Database::fetch_ids(self, kind, query)?)
    }

    fn update_user(&self, id: RecordId, bundle: &IdentityBundle, options: UpdateOptions) -> Result<(), RecordError> {
        Ok(Database::update_user(self, id, bundle, options)?)
    }

    fn update_comment(&self, id: RecordId, bundle: &IdentityBundle) -> Result<(), RecordError> {
        Ok(Database::update_comment(self, id, bundle)?)
    }
}
