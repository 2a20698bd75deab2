//! Optional JSON settings file. Command-line flags win over anything set here.

use std::fs;
use std::path::{Path, PathBuf};

use anonymizer::admin::{DEFAULT_FORM_ENTRY_TABLES, DEFAULT_LOGGING_TABLES};
use anonymizer::{LoginSuffix, DEFAULT_BATCH_SIZE};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Contact methods a stock install registers
const DEFAULT_CONTACT_METHODS: &[&str] = &["aim", "yim", "jabber"];

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    pub db_path: Option<PathBuf>,
    pub table_prefix: String,
    pub site_id: Option<u32>,
    pub batch_size: u64,
    /// Users never anonymized. Defaults to the install owner (ID 1).
    pub excluded_users: Vec<i64>,
    pub login_suffix: LoginSuffix,
    pub contact_methods: Vec<String>,
    pub logging_tables: Vec<String>,
    pub form_entry_tables: Vec<String>,
    pub words_dir: Option<PathBuf>,
    /// Sleep between pages, in milliseconds. 0 disables pacing.
    pub pause_ms: u64,
    pub delete_batch_size: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            db_path: None,
            table_prefix: "wp_".to_string(),
            site_id: None,
            batch_size: DEFAULT_BATCH_SIZE,
            excluded_users: vec![1],
            login_suffix: LoginSuffix::default(),
            contact_methods: to_strings(DEFAULT_CONTACT_METHODS),
            logging_tables: to_strings(DEFAULT_LOGGING_TABLES),
            form_entry_tables: to_strings(DEFAULT_FORM_ENTRY_TABLES),
            words_dir: None,
            pause_ms: 0,
            delete_batch_size: 1000,
        }
    }
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Settings {
    /// Read settings from `path`, or fall back to defaults when no file is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let settings: Settings = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_file() {
        let settings = Settings::load(None).unwrap();
        assert_eq!(settings.batch_size, 25);
        assert_eq!(settings.excluded_users, vec![1]);
        assert_eq!(settings.login_suffix, LoginSuffix::Timestamp);
        assert_eq!(settings.contact_methods, vec!["aim", "yim", "jabber"]);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("anonymizer.json");
        fs::write(
            &path,
            r#"{ "batchSize": 100, "loginSuffix": "random", "excludedUsers": [1, 7], "siteId": 3 }"#,
        )
        .unwrap();

        let settings = Settings::load(Some(&path)).unwrap();
        assert_eq!(settings.batch_size, 100);
        assert_eq!(settings.login_suffix, LoginSuffix::Random);
        assert_eq!(settings.excluded_users, vec![1, 7]);
        assert_eq!(settings.site_id, Some(3));
        assert_eq!(settings.table_prefix, "wp_");
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Settings::load(Some(&dir.path().join("nope.json"))).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "{ batchSize: ").unwrap();
        assert!(Settings::load(Some(&path)).is_err());
    }
}
