use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{RefError, Result};
use crate::format::RefStorageFormat;

pub const CONFIG_FILE: &str = "config.toml";

/// Repository configuration read from `<repo>/config.toml`.
///
/// ```toml
/// [refs]
/// default_format = "table"
///
/// [fsck]
/// danglingRef = "warn"
///
/// [list]
/// format = "%(refname:short)"
/// sort = ["-refname"]
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RepoConfig {
    pub refs: RefsConfig,
    /// Violation id to severity name, interpreted by the verifier.
    pub fsck: BTreeMap<String, String>,
    pub list: ListConfig,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RefsConfig {
    /// Format of newly initialized databases.
    pub default_format: RefStorageFormat,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ListConfig {
    /// Template used when none is given on the command line.
    pub format: Option<String>,
    /// Sort keys used when none are given on the command line.
    pub sort: Vec<String>,
}

impl RepoConfig {
    /// Parse a configuration file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(content) => Self::parse(&content),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Load `config.toml` from a repository directory.
    pub fn load_from_repo(repo: &Path) -> Result<Self> {
        Self::load(&repo.join(CONFIG_FILE))
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| RefError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = RepoConfig::default();
        assert_eq!(c.refs.default_format, RefStorageFormat::Files);
        assert!(c.fsck.is_empty());
        assert!(c.list.format.is_none());
        assert!(c.list.sort.is_empty());
    }

    #[test]
    fn parse_all_sections() {
        let c = RepoConfig::parse(
            r#"
            [refs]
            default_format = "table"

            [fsck]
            danglingRef = "warn"
            badRefName = "ignore"

            [list]
            format = "%(refname:short)"
            sort = ["-refname", "objectname"]
            "#,
        )
        .unwrap();
        assert_eq!(c.refs.default_format, RefStorageFormat::Table);
        assert_eq!(c.fsck.get("danglingRef").map(String::as_str), Some("warn"));
        assert_eq!(c.list.format.as_deref(), Some("%(refname:short)"));
        assert_eq!(c.list.sort, vec!["-refname", "objectname"]);
    }

    #[test]
    fn unknown_format_is_a_config_error() {
        let err = RepoConfig::parse("[refs]\ndefault_format = \"reftable\"\n").unwrap_err();
        assert!(matches!(err, RefError::Config(_)));
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(RepoConfig::load_from_repo(dir.path()).unwrap(), RepoConfig::default());
    }
}
