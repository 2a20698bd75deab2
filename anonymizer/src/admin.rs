//! Bulk administrative deletes: signups, logging-plugin tables, form entries.
//!
//! No anonymization happens here; rows are removed in batches with an optional
//! pause between batches so a large table doesn't monopolise the database.

use std::thread;
use std::time::Duration;

use crate::batch::MAX_BATCH_SIZE;
use crate::database::Database;
use crate::interface::AnonymizerError;

/// Activity-log tables written by the logging plugin (network-wide)
pub const DEFAULT_LOGGING_TABLES: &[&str] = &["stream", "stream_meta"];

/// Form-submission tables (per site). The first one is the primary entries table.
pub const DEFAULT_FORM_ENTRY_TABLES: &[&str] = &["gf_entry", "gf_entry_meta", "gf_entry_notes"];

#[derive(Debug, Clone)]
pub struct BulkDelete {
    pub batch_size: u64,
    pub pause: Option<Duration>,
}

impl Default for BulkDelete {
    fn default() -> Self {
        Self { batch_size: 1000, pause: None }
    }
}

impl BulkDelete {
    /// Delete every row of `table`, one batch at a time. Returns rows deleted.
    fn drain(&self, db: &Database, table: &str) -> Result<usize, AnonymizerError> {
        if self.batch_size == 0 {
            return Err(AnonymizerError::InvalidInput("batch size must be at least 1".to_string()));
        }
        if self.batch_size > MAX_BATCH_SIZE {
            return Err(AnonymizerError::InvalidInput(format!(
                "batch size {} exceeds the maximum of {}",
                self.batch_size, MAX_BATCH_SIZE
            )));
        }
        let mut total = 0;
        loop {
            let deleted = db.delete_batch(table, self.batch_size)?;
            total += deleted;
            tracing::debug!(table, deleted, total, "deleted batch");
            if deleted == 0 {
                break;
            }
            if let Some(pause) = self.pause {
                thread::sleep(pause);
            }
        }
        tracing::info!(table, total, "table emptied");
        Ok(total)
    }

    /// Remove pending network signups.
    pub fn delete_signups(&self, db: &Database) -> Result<usize, AnonymizerError> {
        let table = db.prefix().global("signups");
        if !db.table_exists(&table)? {
            return Err(AnonymizerError::PluginInactive(format!(
                "Signups table '{}' not found. Is this a multisite install?",
                table
            )));
        }
        self.drain(db, &table)
    }

    /// Empty every logging table that exists. Fails if none do.
    pub fn truncate_logs<T: AsRef<str>>(&self, db: &Database, tables: &[T]) -> Result<usize, AnonymizerError> {
        let mut found = false;
        let mut total = 0;
        for name in tables {
            let table = db.prefix().global(name.as_ref());
            if db.table_exists(&table)? {
                found = true;
                total += self.drain(db, &table)?;
            }
        }
        if !found {
            return Err(AnonymizerError::PluginInactive(
                "Logging tables not found. Is the plugin active?".to_string(),
            ));
        }
        Ok(total)
    }

    /// Delete all form entries and their meta/notes without printing any entry data.
    pub fn delete_form_entries<T: AsRef<str>>(&self, db: &Database, tables: &[T]) -> Result<usize, AnonymizerError> {
        let primary = tables
            .first()
            .map(|t| db.prefix().site(t.as_ref()))
            .ok_or_else(|| AnonymizerError::InvalidInput("no form entry tables configured".to_string()))?;
        if !db.table_exists(&primary)? {
            return Err(AnonymizerError::PluginInactive(format!(
                "Form entries table '{}' not found. Is the plugin active?",
                primary
            )));
        }

        let mut total = 0;
        // Children first so nothing references a deleted entry in between
        for name in tables.iter().rev() {
            let table = db.prefix().site(name.as_ref());
            if db.table_exists(&table)? {
                total += self.drain(db, &table)?;
            }
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db_with_tables(tables: &[&str], rows: usize) -> Database {
        let db = Database::open_in_memory().unwrap();
        let conn = db.get_conn().unwrap();
        for table in tables {
            conn.execute_batch(&format!("CREATE TABLE {table} (id INTEGER PRIMARY KEY, payload TEXT)"))
                .unwrap();
            for i in 0..rows {
                conn.execute(&format!("INSERT INTO {table} (payload) VALUES (?1)"), [format!("row {i}")])
                    .unwrap();
            }
        }
        db
    }

    fn small_batches() -> BulkDelete {
        BulkDelete { batch_size: 4, pause: None }
    }

    #[test]
    fn test_delete_form_entries() {
        let db = db_with_tables(&["wp_gf_entry", "wp_gf_entry_meta"], 10);
        let deleted = small_batches().delete_form_entries(&db, DEFAULT_FORM_ENTRY_TABLES).unwrap();
        assert_eq!(deleted, 20);
        assert_eq!(small_batches().delete_form_entries(&db, DEFAULT_FORM_ENTRY_TABLES).unwrap(), 0);
    }

    #[test]
    fn test_form_plugin_inactive() {
        let db = Database::open_in_memory().unwrap();
        let err = small_batches().delete_form_entries(&db, DEFAULT_FORM_ENTRY_TABLES).unwrap_err();
        assert!(matches!(err, AnonymizerError::PluginInactive(_)));
        assert!(err.to_string().contains("wp_gf_entry"));
    }

    #[test]
    fn test_truncate_logs_skips_missing_tables() {
        let db = db_with_tables(&["wp_stream"], 9);
        assert_eq!(small_batches().truncate_logs(&db, DEFAULT_LOGGING_TABLES).unwrap(), 9);
    }

    #[test]
    fn test_truncate_logs_without_plugin() {
        let db = Database::open_in_memory().unwrap();
        let err = small_batches().truncate_logs(&db, DEFAULT_LOGGING_TABLES).unwrap_err();
        assert!(matches!(err, AnonymizerError::PluginInactive(_)));
    }

    #[test]
    fn test_delete_signups() {
        let db = Database::open_in_memory().unwrap();
        {
            let conn = db.get_conn().unwrap();
            conn.execute_batch(
                "INSERT INTO wp_signups (user_login, user_email) VALUES ('a', 'a@corp.test'), ('b', 'b@corp.test')",
            )
            .unwrap();
        }
        assert_eq!(small_batches().delete_signups(&db).unwrap(), 2);
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let db = db_with_tables(&["wp_stream"], 1);
        let bulk = BulkDelete { batch_size: 0, pause: None };
        assert!(bulk.truncate_logs(&db, DEFAULT_LOGGING_TABLES).is_err());
    }

    #[test]
    fn test_oversized_batch_rejected() {
        let db = db_with_tables(&["wp_stream"], 3);
        let bulk = BulkDelete { batch_size: 1u64 << 63, pause: None };
        assert!(matches!(
            bulk.truncate_logs(&db, DEFAULT_LOGGING_TABLES),
            Err(AnonymizerError::InvalidInput(_))
        ));
    }
}
