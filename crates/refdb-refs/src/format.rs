use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RefError;

/// Identifies a storage backend implementation.
///
/// The name is what users pass on the command line and what the database
/// pointer file records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefStorageFormat {
    /// One file per ref plus a compacted `packed-refs` table.
    Files,
    /// A single sorted table file.
    Table,
}

impl RefStorageFormat {
    pub const ALL: [RefStorageFormat; 2] = [RefStorageFormat::Files, RefStorageFormat::Table];

    pub fn name(&self) -> &'static str {
        match self {
            RefStorageFormat::Files => "files",
            RefStorageFormat::Table => "table",
        }
    }

    pub fn by_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.name() == name)
    }
}

impl Default for RefStorageFormat {
    fn default() -> Self {
        Self::Files
    }
}

impl fmt::Display for RefStorageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RefStorageFormat {
    type Err = RefError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::by_name(s).ok_or_else(|| RefError::UnknownFormat(s.to_string()))
    }
}
