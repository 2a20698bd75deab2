//! SQLite database layer for CMS identity records
//!
//! Tables follow the host CMS layout (`users`, `usermeta`, `comments`, ...) behind a
//! configurable table prefix. Multi-site installs keep users global and give each
//! site its own `<prefix><site_id>_` tables.
//! Uses r2d2 connection pooling; the anonymizer itself only ever holds one connection at a time.

use crate::interface::{PageQuery, RecordId, RecordKind, UpdateOptions};
use crate::models::{Field, IdentityBundle};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use std::collections::BTreeSet;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("Record {0} not found")]
    NotFound(RecordId),
    #[error("Invalid table prefix '{0}' (expected [A-Za-z0-9_]+)")]
    InvalidPrefix(String),
    #[error("Table '{0}' does not exist")]
    MissingTable(String),
    #[error("{name} {value} is out of range for SQLite")]
    OutOfRange { name: &'static str, value: u64 },
}

pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// SQLite binds integers as i64; anything larger would wrap negative.
fn sql_int(name: &'static str, value: u64) -> DatabaseResult<i64> {
    i64::try_from(value).map_err(|_| DatabaseError::OutOfRange { name, value })
}

/// Table naming for one site of a (possibly multi-site) install
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TablePrefix {
    base: String,
    site_id: Option<u32>,
}

impl TablePrefix {
    pub fn new(base: &str, site_id: Option<u32>) -> DatabaseResult<Self> {
        let valid = !base.is_empty()
            && base.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid {
            return Err(DatabaseError::InvalidPrefix(base.to_string()));
        }
        Ok(Self { base: base.to_string(), site_id })
    }

    /// Network-wide table (users, usermeta, signups)
    pub fn global(&self, table: &str) -> String {
        format!("{}{}", self.base, table)
    }

    /// Per-site table. Site 1 is the main site and uses the bare prefix.
    pub fn site(&self, table: &str) -> String {
        match self.site_id {
            Some(id) if id > 1 => format!("{}{}_{}", self.base, id, table),
            _ => format!("{}{}", self.base, table),
        }
    }
}

impl Default for TablePrefix {
    fn default() -> Self {
        Self { base: "wp_".to_string(), site_id: None }
    }
}

/// Where a bundle field is persisted for users
enum UserColumn {
    Row(&'static str),
    Meta(&'static str),
}

fn user_column(field: Field) -> UserColumn {
    match field {
        Field::Login => UserColumn::Row("user_login"),
        Field::Password => UserColumn::Row("user_pass"),
        Field::Nicename => UserColumn::Row("user_nicename"),
        Field::Email => UserColumn::Row("user_email"),
        Field::Url => UserColumn::Row("user_url"),
        Field::DisplayName => UserColumn::Row("display_name"),
        Field::FirstName => UserColumn::Meta("first_name"),
        Field::LastName => UserColumn::Meta("last_name"),
        Field::Nickname => UserColumn::Meta("nickname"),
        Field::Description => UserColumn::Meta("description"),
    }
}

/// Database wrapper using connection pooling
pub struct Database {
    pool: Pool<SqliteConnectionManager>,
    prefix: TablePrefix,
}

impl Database {
    /// Open an existing database. No schema is created.
    pub fn open<P: AsRef<Path>>(path: P, prefix: TablePrefix) -> DatabaseResult<Self> {
        let manager = SqliteConnectionManager::file(path)
            .with_init(|conn| {
                conn.execute_batch("
                    PRAGMA journal_mode=WAL;
                    PRAGMA synchronous=NORMAL;
                    PRAGMA busy_timeout=5000;
                ")?;
                Ok(())
            });

        let pool = Pool::builder()
            .max_size(2)
            .build(manager)?;

        Ok(Self { pool, prefix })
    }

    /// Open an in-memory database with the core schema installed (for testing)
    #[cfg(test)]
    pub fn open_in_memory() -> DatabaseResult<Self> {
        let manager = SqliteConnectionManager::memory();

        // In-memory needs single connection to maintain state
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)?;

        let db = Self { pool, prefix: TablePrefix::default() };
        db.install_schema()?;
        Ok(db)
    }

    pub fn prefix(&self) -> &TablePrefix {
        &self.prefix
    }

    /// Get a connection from the pool
    pub(crate) fn get_conn(&self) -> DatabaseResult<PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }

    /// Create the users, usermeta, comments and signups tables if missing.
    /// Used to bootstrap fixtures; production databases already carry the host schema.
    pub fn install_schema(&self) -> DatabaseResult<()> {
        let conn = self.get_conn()?;
        let users = self.prefix.global("users");
        let usermeta = self.prefix.global("usermeta");
        let signups = self.prefix.global("signups");
        let comments = self.prefix.site("comments");

        conn.execute_batch(&format!(r#"
            CREATE TABLE IF NOT EXISTS {users} (
                ID INTEGER PRIMARY KEY AUTOINCREMENT,
                user_login TEXT NOT NULL UNIQUE,
                user_pass TEXT NOT NULL DEFAULT '',
                user_nicename TEXT NOT NULL DEFAULT '',
                user_email TEXT NOT NULL DEFAULT '',
                user_url TEXT NOT NULL DEFAULT '',
                display_name TEXT NOT NULL DEFAULT ''
            );

            CREATE TABLE IF NOT EXISTS {usermeta} (
                umeta_id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL DEFAULT 0,
                meta_key TEXT,
                meta_value TEXT
            );

            CREATE TABLE IF NOT EXISTS {comments} (
                comment_ID INTEGER PRIMARY KEY AUTOINCREMENT,
                comment_author TEXT NOT NULL DEFAULT '',
                comment_author_email TEXT NOT NULL DEFAULT '',
                comment_author_url TEXT NOT NULL DEFAULT '',
                comment_author_IP TEXT NOT NULL DEFAULT '',
                comment_agent TEXT NOT NULL DEFAULT '',
                comment_content TEXT NOT NULL DEFAULT '',
                user_id INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS {signups} (
                signup_id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_login TEXT NOT NULL DEFAULT '',
                user_email TEXT NOT NULL DEFAULT ''
            );

            CREATE INDEX IF NOT EXISTS idx_{usermeta}_user ON {usermeta}(user_id);
            CREATE INDEX IF NOT EXISTS idx_{usermeta}_key ON {usermeta}(meta_key);
        "#))?;

        Ok(())
    }

    /// Table name and primary key column for a record kind
    fn record_table(&self, kind: RecordKind) -> (String, &'static str) {
        match kind {
            RecordKind::User => (self.prefix.global("users"), "ID"),
            RecordKind::Comment => (self.prefix.site("comments"), "comment_ID"),
        }
    }

    /// `WHERE <col> NOT IN (?, ...)` for the exclusion set, or an empty string
    fn exclusion_clause(column: &str, excluded: &BTreeSet<RecordId>) -> String {
        if excluded.is_empty() {
            return String::new();
        }
        let placeholders = excluded.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        format!("WHERE {} NOT IN ({})", column, placeholders)
    }

    /// Fetch one page of record IDs in ascending order, excluding `query.excluded`
    pub fn fetch_ids(&self, kind: RecordKind, query: &PageQuery<'_>) -> DatabaseResult<Vec<RecordId>> {
        let conn = self.get_conn()?;
        let (table, id_col) = self.record_table(kind);
        let sql = format!(
            "SELECT {id_col} FROM {table} {} ORDER BY {id_col} ASC LIMIT ? OFFSET ?",
            Self::exclusion_clause(id_col, query.excluded)
        );

        let mut params: Vec<rusqlite::types::Value> =
            query.excluded.iter().map(|&id| id.into()).collect();
        params.push(sql_int("limit", query.limit)?.into());
        params.push(sql_int("offset", query.offset)?.into());

        let mut stmt = conn.prepare(&sql)?;
        let ids = stmt
            .query_map(rusqlite::params_from_iter(params), |row| row.get(0))?
            .collect::<Result<Vec<RecordId>, _>>()?;
        Ok(ids)
    }

    /// Count records of `kind` that are not excluded
    pub fn count_records(&self, kind: RecordKind, excluded: &BTreeSet<RecordId>) -> DatabaseResult<u64> {
        let conn = self.get_conn()?;
        let (table, id_col) = self.record_table(kind);
        let sql = format!(
            "SELECT COUNT(*) FROM {table} {}",
            Self::exclusion_clause(id_col, excluded)
        );
        let params: Vec<rusqlite::types::Value> = excluded.iter().map(|&id| id.into()).collect();
        let count: i64 = conn.query_row(&sql, rusqlite::params_from_iter(params), |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Insert a bare user row (fixtures and tests). Returns the new ID.
    pub fn insert_user(&self, login: &str, email: &str, display_name: &str) -> DatabaseResult<RecordId> {
        let conn = self.get_conn()?;
        let users = self.prefix.global("users");
        conn.execute(
            &format!(
                "INSERT INTO {users} (user_login, user_nicename, user_email, display_name) VALUES (?1, ?1, ?2, ?3)"
            ),
            params![login, email, display_name],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Insert a comment row (fixtures and tests). Returns the new ID.
    pub fn insert_comment(&self, author: &str, email: &str, ip: &str) -> DatabaseResult<RecordId> {
        let conn = self.get_conn()?;
        let comments = self.prefix.site("comments");
        conn.execute(
            &format!(
                "INSERT INTO {comments} (comment_author, comment_author_email, comment_author_IP) VALUES (?1, ?2, ?3)"
            ),
            params![author, email, ip],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Apply an identity bundle to a user row and its meta.
    ///
    /// `user_login` is immutable on the regular update path: it is only written when
    /// `options.override_login` is set. All writes happen in one transaction.
    pub fn update_user(&self, id: RecordId, bundle: &IdentityBundle, options: UpdateOptions) -> DatabaseResult<()> {
        let conn = self.get_conn()?;
        let users = self.prefix.global("users");
        let usermeta = self.prefix.global("usermeta");
        let tx = conn.unchecked_transaction()?;

        let exists: bool = tx.query_row(
            &format!("SELECT COUNT(*) FROM {users} WHERE ID = ?1"),
            [id],
            |row| Ok(row.get::<_, i64>(0)? > 0),
        )?;
        if !exists {
            return Err(DatabaseError::NotFound(id));
        }

        let mut columns: Vec<&'static str> = Vec::new();
        let mut values: Vec<rusqlite::types::Value> = Vec::new();
        let mut meta: Vec<(&str, &str)> = Vec::new();

        for (field, value) in &bundle.fields {
            match user_column(*field) {
                UserColumn::Row("user_login") if !options.override_login => {}
                UserColumn::Row(column) => {
                    columns.push(column);
                    values.push(value.clone().into());
                }
                UserColumn::Meta(key) => meta.push((key, value.as_str())),
            }
        }
        meta.extend(bundle.meta.iter().map(|(k, v)| (k.as_str(), v.as_str())));

        if !columns.is_empty() {
            let assignments = columns
                .iter()
                .map(|c| format!("{} = ?", c))
                .collect::<Vec<_>>()
                .join(", ");
            values.push(id.into());
            tx.execute(
                &format!("UPDATE {users} SET {assignments} WHERE ID = ?"),
                rusqlite::params_from_iter(values),
            )?;
        }

        for (key, value) in meta {
            let updated = tx.execute(
                &format!("UPDATE {usermeta} SET meta_value = ?1 WHERE user_id = ?2 AND meta_key = ?3"),
                params![value, id, key],
            )?;
            if updated == 0 {
                tx.execute(
                    &format!("INSERT INTO {usermeta} (user_id, meta_key, meta_value) VALUES (?1, ?2, ?3)"),
                    params![id, key, value],
                )?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    /// Apply an identity bundle to a comment's author fields.
    /// Author IP and user agent are cleared.
    pub fn update_comment(&self, id: RecordId, bundle: &IdentityBundle) -> DatabaseResult<()> {
        let conn = self.get_conn()?;
        let comments = self.prefix.site("comments");
        let updated = conn.execute(
            &format!(
                r#"UPDATE {comments}
                   SET comment_author = ?1, comment_author_email = ?2, comment_author_url = ?3,
                       comment_author_IP = '', comment_agent = ''
                   WHERE comment_ID = ?4"#
            ),
            params![
                bundle.display_name().unwrap_or(""),
                bundle.email().unwrap_or(""),
                bundle.url().unwrap_or(""),
                id,
            ],
        )?;
        if updated == 0 {
            return Err(DatabaseError::NotFound(id));
        }
        Ok(())
    }

    /// Read a user's login, email and display name
    pub fn fetch_user(&self, id: RecordId) -> DatabaseResult<Option<(String, String, String)>> {
        let conn = self.get_conn()?;
        let users = self.prefix.global("users");
        let result = conn.query_row(
            &format!("SELECT user_login, user_email, display_name FROM {users} WHERE ID = ?1"),
            [id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        );
        match result {
            Ok(row) => Ok(Some(row)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Read a single meta value for a user
    pub fn fetch_user_meta(&self, id: RecordId, key: &str) -> DatabaseResult<Option<String>> {
        let conn = self.get_conn()?;
        let usermeta = self.prefix.global("usermeta");
        let result = conn.query_row(
            &format!("SELECT meta_value FROM {usermeta} WHERE user_id = ?1 AND meta_key = ?2 LIMIT 1"),
            params![id, key],
            |row| row.get(0),
        );
        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Read a comment's author, email, url and IP
    pub fn fetch_comment(&self, id: RecordId) -> DatabaseResult<Option<(String, String, String, String)>> {
        let conn = self.get_conn()?;
        let comments = self.prefix.site("comments");
        let result = conn.query_row(
            &format!(
                "SELECT comment_author, comment_author_email, comment_author_url, comment_author_IP FROM {comments} WHERE comment_ID = ?1"
            ),
            [id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        );
        match result {
            Ok(row) => Ok(Some(row)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Check whether a fully-qualified table exists
    pub fn table_exists(&self, table: &str) -> DatabaseResult<bool> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [table],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Delete up to `limit` rows from a fully-qualified table. Returns the number removed.
    pub fn delete_batch(&self, table: &str, limit: u64) -> DatabaseResult<usize> {
        let limit = sql_int("limit", limit)?;
        if !self.table_exists(table)? {
            return Err(DatabaseError::MissingTable(table.to_string()));
        }
        let conn = self.get_conn()?;
        // Table names can't be bound; callers pass names built from the validated prefix.
        let table = table.replace('"', "");
        let deleted = conn.execute(
            &format!(r#"DELETE FROM "{table}" WHERE rowid IN (SELECT rowid FROM "{table}" LIMIT ?1)"#),
            [limit],
        )?;
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded(count: usize) -> Database {
        let db = Database::open_in_memory().unwrap();
        for i in 0..count {
            db.insert_user(&format!("user{}", i), &format!("user{}@corp.test", i), "Real Name")
                .unwrap();
        }
        db
    }

    #[test]
    fn test_prefix_validation() {
        assert!(TablePrefix::new("wp_", None).is_ok());
        assert!(TablePrefix::new("wp_; DROP", None).is_err());
        assert!(TablePrefix::new("", None).is_err());
    }

    #[test]
    fn test_site_tables() {
        let main = TablePrefix::new("wp_", Some(1)).unwrap();
        let sub = TablePrefix::new("wp_", Some(3)).unwrap();
        assert_eq!(main.site("comments"), "wp_comments");
        assert_eq!(sub.site("comments"), "wp_3_comments");
        assert_eq!(sub.global("users"), "wp_users");
    }

    #[test]
    fn test_fetch_ids_pages_in_order() {
        let db = seeded(7);
        let none = BTreeSet::new();
        let first = db
            .fetch_ids(RecordKind::User, &PageQuery { excluded: &none, offset: 0, limit: 5 })
            .unwrap();
        let second = db
            .fetch_ids(RecordKind::User, &PageQuery { excluded: &none, offset: 5, limit: 5 })
            .unwrap();
        let third = db
            .fetch_ids(RecordKind::User, &PageQuery { excluded: &none, offset: 10, limit: 5 })
            .unwrap();
        assert_eq!(first, vec![1, 2, 3, 4, 5]);
        assert_eq!(second, vec![6, 7]);
        assert!(third.is_empty());
    }

    #[test]
    fn test_fetch_ids_excludes_in_query() {
        let db = seeded(6);
        let excluded: BTreeSet<RecordId> = [1, 2, 3].into_iter().collect();
        let page = db
            .fetch_ids(RecordKind::User, &PageQuery { excluded: &excluded, offset: 0, limit: 3 })
            .unwrap();
        // A full page even though the first three rows are excluded
        assert_eq!(page, vec![4, 5, 6]);
        assert_eq!(db.count_records(RecordKind::User, &excluded).unwrap(), 3);
    }

    #[test]
    fn test_update_user_ignores_login_without_override() {
        let db = seeded(1);
        let mut bundle = IdentityBundle::new();
        bundle
            .set(Field::Login, "hazyheron")
            .set(Field::Email, "hazyheron@example.com")
            .set(Field::FirstName, "Hazy");

        db.update_user(1, &bundle, UpdateOptions::default()).unwrap();
        let (login, email, _) = db.fetch_user(1).unwrap().unwrap();
        assert_eq!(login, "user0");
        assert_eq!(email, "hazyheron@example.com");
        assert_eq!(db.fetch_user_meta(1, "first_name").unwrap().as_deref(), Some("Hazy"));
    }

    #[test]
    fn test_update_user_writes_login_with_override() {
        let db = seeded(1);
        let mut bundle = IdentityBundle::new();
        bundle.set(Field::Login, "hazyheron");

        db.update_user(1, &bundle, UpdateOptions::force_login()).unwrap();
        let (login, _, _) = db.fetch_user(1).unwrap().unwrap();
        assert_eq!(login, "hazyheron");
    }

    #[test]
    fn test_update_user_upserts_meta() {
        let db = seeded(1);
        let mut bundle = IdentityBundle::new();
        bundle.set_meta("jabber", "someone@chat.test");
        db.update_user(1, &bundle, UpdateOptions::default()).unwrap();

        bundle.set_meta("jabber", "");
        db.update_user(1, &bundle, UpdateOptions::default()).unwrap();

        let conn = db.get_conn().unwrap();
        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM wp_usermeta WHERE meta_key = 'jabber'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(rows, 1);
        drop(conn);
        assert_eq!(db.fetch_user_meta(1, "jabber").unwrap().as_deref(), Some(""));
    }

    #[test]
    fn test_update_missing_user_is_not_found() {
        let db = seeded(0);
        let err = db.update_user(42, &IdentityBundle::new(), UpdateOptions::default()).unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound(42)));
    }

    #[test]
    fn test_login_collision_is_constraint_error() {
        let db = seeded(2);
        let mut bundle = IdentityBundle::new();
        bundle.set(Field::Login, "user0");
        let err = db.update_user(2, &bundle, UpdateOptions::force_login()).unwrap_err();
        let record_err = crate::interface::RecordError::from(err);
        assert!(matches!(record_err, crate::interface::RecordError::Conflict(_)));
    }

    #[test]
    fn test_update_comment_clears_ip() {
        let db = seeded(0);
        let id = db.insert_comment("Real Person", "real@corp.test", "10.1.2.3").unwrap();
        let mut bundle = IdentityBundle::new();
        bundle
            .set(Field::DisplayName, "Hazy Heron")
            .set(Field::Email, "hazyheron@example.com")
            .set(Field::Url, "http://example.com/hazy-heron");

        db.update_comment(id, &bundle).unwrap();
        let (author, email, url, ip) = db.fetch_comment(id).unwrap().unwrap();
        assert_eq!(author, "Hazy Heron");
        assert_eq!(email, "hazyheron@example.com");
        assert_eq!(url, "http://example.com/hazy-heron");
        assert_eq!(ip, "");
    }

    #[test]
    fn test_delete_batch() {
        let db = seeded(3);
        assert_eq!(db.delete_batch("wp_users", 2).unwrap(), 2);
        assert_eq!(db.delete_batch("wp_users", 2).unwrap(), 1);
        assert_eq!(db.delete_batch("wp_users", 2).unwrap(), 0);
        assert!(matches!(db.delete_batch("wp_gf_entry", 2), Err(DatabaseError::MissingTable(_))));
    }

    #[test]
    fn test_unbindable_paging_values_rejected() {
        let db = seeded(3);
        let excluded = BTreeSet::new();
        let query = PageQuery { excluded: &excluded, offset: 0, limit: 1u64 << 63 };
        assert!(matches!(
            db.fetch_ids(RecordKind::User, &query),
            Err(DatabaseError::OutOfRange { name: "limit", .. })
        ));
        let query = PageQuery { excluded: &excluded, offset: u64::MAX, limit: 10 };
        assert!(matches!(
            db.fetch_ids(RecordKind::User, &query),
            Err(DatabaseError::OutOfRange { name: "offset", .. })
        ));
        assert!(matches!(db.delete_batch("wp_users", u64::MAX), Err(DatabaseError::OutOfRange { .. })));
        assert_eq!(db.count_records(RecordKind::User, &excluded).unwrap(), 3);
    }
}
