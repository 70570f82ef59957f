//! Validated names used by the storage backends.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A commit identifier. Wraps the git object id so it cannot be confused
/// with blob or tree ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommitId(pub(crate) git2::Oid);

impl CommitId {
    pub(crate) fn raw(&self) -> git2::Oid {
        self.0
    }

    /// Seven character abbreviation, as printed by `git log --oneline`.
    pub fn short(&self) -> String {
        self.0.to_string()[..7].to_string()
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A validated table name.
///
/// Table names become directory names in the Git backend, so they are
/// restricted the same way on every backend:
/// - 1-64 characters
/// - ASCII alphanumerics, underscores, hyphens
/// - must start with a letter or underscore
/// - cannot be a reserved name
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TableName(String);

impl TableName {
    const RESERVED: &'static [&'static str] = &["_meta", "_system", "_git"];

    /// Create a new TableName, validating the input.
    pub fn new(name: impl Into<String>) -> Result<Self, InvalidNameError> {
        let name = name.into();
        Self::validate(&name)?;
        Ok(Self(name))
    }

    fn validate(name: &str) -> Result<(), InvalidNameError> {
        let Some(first) = name.chars().next() else {
            return Err(InvalidNameError::Empty);
        };

        if name.len() > 64 {
            return Err(InvalidNameError::TooLong(name.len()));
        }

        if !first.is_ascii_alphabetic() && first != '_' {
            return Err(InvalidNameError::InvalidStart(first));
        }

        check_charset(name)?;

        if Self::RESERVED.contains(&name.to_lowercase().as_str()) {
            return Err(InvalidNameError::Reserved(name.to_string()));
        }

        Ok(())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TableName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A validated row key (primary key).
///
/// Keys are used as file names by the Git backend; they are typically
/// generated ULIDs.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RowKey(String);

impl RowKey {
    pub fn new(key: impl Into<String>) -> Result<Self, InvalidNameError> {
        let key = key.into();
        if key.is_empty() {
            return Err(InvalidNameError::Empty);
        }
        if key.len() > 128 {
            return Err(InvalidNameError::TooLong(key.len()));
        }
        check_charset(&key)?;
        Ok(Self(key))
    }

    /// Generate a new ULID-based row key.
    pub fn generate() -> Self {
        Self(ulid::Ulid::new().to_string().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File name of the row blob inside its table directory.
    pub(crate) fn file_name(&self) -> String {
        format!("{}.json", self.0)
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RowKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn check_charset(value: &str) -> Result<(), InvalidNameError> {
    for (position, c) in value.chars().enumerate() {
        if !c.is_ascii_alphanumeric() && c != '_' && c != '-' {
            return Err(InvalidNameError::InvalidCharacter { char: c, position });
        }
    }
    Ok(())
}

/// Git author/committer identity used by the Git backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitSignature {
    pub name: String,
    pub email: String,
}

impl GitSignature {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }

    pub(crate) fn to_git2_signature(&self) -> Result<git2::Signature<'static>, git2::Error> {
        git2::Signature::now(&self.name, &self.email)
    }
}

impl Default for GitSignature {
    fn default() -> Self {
        Self::new("txscope", "txscope@localhost")
    }
}

/// Error type for invalid table, row or backend names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidNameError {
    Empty,
    TooLong(usize),
    InvalidStart(char),
    InvalidCharacter { char: char, position: usize },
    Reserved(String),
}

impl fmt::Display for InvalidNameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "name cannot be empty"),
            Self::TooLong(len) => write!(f, "name too long: {} characters", len),
            Self::InvalidStart(c) => write!(f, "name cannot start with '{}'", c),
            Self::InvalidCharacter { char, position } => {
                write!(f, "invalid character '{}' at position {}", char, position)
            }
            Self::Reserved(name) => write!(f, "'{}' is a reserved name", name),
        }
    }
}

impl std::error::Error for InvalidNameError {}
